use crate::protocol::BridgeCommand;
use async_trait::async_trait;
use cyrec_engine::browser::{Browser, BrowserError};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

const COMMAND_CAPACITY: usize = 100;

/// [`Browser`] implemented by relaying commands to connected extensions.
#[derive(Clone)]
pub struct ExtensionBrowser {
    command_tx: broadcast::Sender<BridgeCommand>,
    active_tab: Arc<RwLock<Option<i64>>>,
}

impl Default for ExtensionBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionBrowser {
    pub fn new() -> Self {
        let (command_tx, _) = broadcast::channel(COMMAND_CAPACITY);
        Self {
            command_tx,
            active_tab: Arc::new(RwLock::new(None)),
        }
    }

    /// One receiver exists per live extension connection.
    pub fn is_connected(&self) -> bool {
        self.command_tx.receiver_count() > 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeCommand> {
        self.command_tx.subscribe()
    }

    pub async fn set_active_tab(&self, tab_id: i64) {
        debug!("Active tab is now {}", tab_id);
        *self.active_tab.write().await = Some(tab_id);
    }

    fn send(&self, command: BridgeCommand) -> Result<(), BrowserError> {
        self.command_tx
            .send(command)
            .map(|_| ())
            .map_err(|_| BrowserError::NotConnected)
    }
}

#[async_trait]
impl Browser for ExtensionBrowser {
    async fn active_tab(&self) -> Result<i64, BrowserError> {
        if !self.is_connected() {
            return Err(BrowserError::NotConnected);
        }
        self.active_tab.read().await.ok_or(BrowserError::NoActiveTab)
    }

    async fn inject_capture_script(&self, tab_id: i64) -> Result<(), BrowserError> {
        self.send(BridgeCommand::InjectScript { tab_id })
    }

    async fn set_badge(&self, text: &str) -> Result<(), BrowserError> {
        self.send(BridgeCommand::SetBadge {
            text: text.to_string(),
        })
    }
}
