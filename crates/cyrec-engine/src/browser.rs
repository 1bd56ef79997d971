use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    #[error("No browser extension connected")]
    NotConnected,
    #[error("No active tab")]
    NoActiveTab,
    #[error("Script injection failed: {0}")]
    Injection(String),
    #[error("{0}")]
    Other(String),
}

/// Browser capabilities the session controller drives.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Tab the user is currently looking at.
    async fn active_tab(&self) -> Result<i64, BrowserError>;

    /// Injects the event-capture content script into `tab_id`.
    async fn inject_capture_script(&self, tab_id: i64) -> Result<(), BrowserError>;

    /// Sets the toolbar badge label.
    async fn set_badge(&self, text: &str) -> Result<(), BrowserError>;
}

#[async_trait]
impl<T: Browser + ?Sized> Browser for std::sync::Arc<T> {
    async fn active_tab(&self) -> Result<i64, BrowserError> {
        (**self).active_tab().await
    }

    async fn inject_capture_script(&self, tab_id: i64) -> Result<(), BrowserError> {
        (**self).inject_capture_script(tab_id).await
    }

    async fn set_badge(&self, text: &str) -> Result<(), BrowserError> {
        (**self).set_badge(text).await
    }
}
