//! Ordered message channel between a page's capture context and the orchestrator.
//!
//! One channel exists per page visit. Closing is an observable event on both
//! ends rather than an error: the orchestrator sees [`PortEvent::Disconnected`]
//! and the page sees [`PagePort::closed`] resolve.

use cyrec_common::protocol::CapturedEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel {0} is closed")]
    Closed(String),
}

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Metadata about the page that opened a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub id: u64,
    /// Host name of the page at connect time.
    pub name: String,
    pub sender_url: Option<String>,
    pub tab_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    Message(CapturedEvent),
    Disconnected,
}

/// Page end of a channel.
#[derive(Debug)]
pub struct PagePort {
    info: PortInfo,
    tx: mpsc::UnboundedSender<CapturedEvent>,
    closed: watch::Receiver<bool>,
}

/// Orchestrator end of a channel.
#[derive(Debug)]
pub struct ConnectedPort {
    info: PortInfo,
    rx: mpsc::UnboundedReceiver<CapturedEvent>,
    closed: watch::Sender<bool>,
    finished: bool,
}

/// Opens a channel named after the page host.
pub fn connect(
    name: impl Into<String>,
    sender_url: Option<String>,
    tab_id: Option<i64>,
) -> (PagePort, ConnectedPort) {
    let info = PortInfo {
        id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
        name: name.into(),
        sender_url,
        tab_id,
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = watch::channel(false);
    (
        PagePort {
            info: info.clone(),
            tx,
            closed: closed_rx,
        },
        ConnectedPort {
            info,
            rx,
            closed: closed_tx,
            finished: false,
        },
    )
}

impl PagePort {
    pub fn info(&self) -> &PortInfo {
        &self.info
    }

    pub fn post_message(&self, event: CapturedEvent) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed(self.info.name.clone()));
        }
        self.tx
            .send(event)
            .map_err(|_| ChannelError::Closed(self.info.name.clone()))
    }

    pub fn is_closed(&self) -> bool {
        // A dropped orchestrator end counts as closed.
        *self.closed.borrow() || self.closed.has_changed().is_err() || self.tx.is_closed()
    }

    /// Resolves once the orchestrator disconnects or goes away.
    pub async fn closed(&self) {
        self.closed_signal().wait().await
    }

    /// Owned version of [`PagePort::closed`] that can be moved into a task.
    pub fn closed_signal(&self) -> ClosedSignal {
        ClosedSignal(self.closed.clone())
    }
}

#[derive(Debug)]
pub struct ClosedSignal(watch::Receiver<bool>);

impl ClosedSignal {
    pub async fn wait(mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

impl ConnectedPort {
    pub fn info(&self) -> &PortInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Tears the channel down. Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let _ = self.closed.send(true);
        self.rx.close();
    }

    pub fn is_disconnected(&self) -> bool {
        self.finished
    }

    /// Next message in send order, then a single `Disconnected`, then pending forever.
    pub async fn recv(&mut self) -> PortEvent {
        if self.finished {
            return std::future::pending().await;
        }
        match self.rx.recv().await {
            Some(event) => PortEvent::Message(event),
            None => {
                self.finished = true;
                let _ = self.closed.send(true);
                PortEvent::Disconnected
            }
        }
    }
}

impl Drop for ConnectedPort {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyrec_common::protocol::EventKind;

    fn click(selector: &str) -> CapturedEvent {
        CapturedEvent::new(selector, EventKind::Click, "A", "")
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (page, mut port) = connect("example.com", None, Some(3));
        page.post_message(click("#1")).unwrap();
        page.post_message(click("#2")).unwrap();
        assert_eq!(port.recv().await, PortEvent::Message(click("#1")));
        assert_eq!(port.recv().await, PortEvent::Message(click("#2")));
        drop(page);
        assert_eq!(port.recv().await, PortEvent::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_observable_and_idempotent() {
        let (page, mut port) = connect("example.com", None, None);
        port.disconnect();
        port.disconnect();
        page.closed().await;
        assert!(page.is_closed());
        assert!(matches!(
            page.post_message(click("#late")),
            Err(ChannelError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_dropping_orchestrator_end_closes_page_end() {
        let (page, port) = connect("example.com", None, None);
        drop(port);
        page.closed().await;
        assert!(page.post_message(click("#x")).is_err());
    }
}
