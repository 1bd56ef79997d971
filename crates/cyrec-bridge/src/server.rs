//! WebSocket endpoint the browser extension connects to.
//!
//! Each extension connection relays content-script channels into the session
//! controller, forwards navigation and UI events, and pushes browser commands
//! and storage changes back out.

use crate::browser::ExtensionBrowser;
use crate::protocol::{BridgeCommand, ExtensionMessage};
use cyrec_engine::channel::{self, PagePort};
use cyrec_engine::protocol::keys;
use cyrec_engine::session::{SessionEvent, SessionHandle};
use cyrec_engine::storage::{KeyValueStore, StorageChange, StorageError};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, error, info, warn};

/// Keys pushed to every extension as soon as it connects.
const SYNCED_KEYS: [&str; 4] = [
    keys::RECORDING_STATE,
    keys::CODE_BLOCKS,
    keys::SELECTOR_PREFERENCE_LIST,
    keys::SELECTOR_OPTIONAL_ATTRIBUTES,
];

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to bind bridge socket: {0}")]
    Bind(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct BridgeServer<S: ?Sized> {
    port: u16,
    browser: ExtensionBrowser,
    session: SessionHandle,
    storage: Arc<S>,
}

/// A started server. Dropping it does not stop the accept loop.
pub struct RunningBridge {
    pub local_addr: SocketAddr,
    pub accept_task: JoinHandle<()>,
}

impl<S> BridgeServer<S>
where
    S: KeyValueStore + ?Sized + 'static,
{
    pub fn new(port: u16, browser: ExtensionBrowser, session: SessionHandle, storage: Arc<S>) -> Self {
        Self {
            port,
            browser,
            session,
            storage,
        }
    }

    /// Binds on localhost and spawns the accept loop. Port `0` picks a free port.
    pub async fn start(self) -> Result<RunningBridge, BridgeError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Bridge listening on: {}", local_addr);

        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        break;
                    }
                };
                info!("Accepted TCP connection from: {}", peer);
                let connection = Connection {
                    browser: self.browser.clone(),
                    session: self.session.clone(),
                    storage: self.storage.clone(),
                    ports: HashMap::new(),
                };
                tokio::spawn(connection.serve(stream));
            }
        });

        Ok(RunningBridge {
            local_addr,
            accept_task,
        })
    }
}

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// A relayed channel that closed: the extension's port id plus the channel's own id.
#[derive(Debug, Clone, Copy)]
struct ClosedPort {
    port_id: u64,
    channel_id: u64,
}

struct Connection<S: ?Sized> {
    browser: ExtensionBrowser,
    session: SessionHandle,
    storage: Arc<S>,
    /// Extension port id -> page end of the relayed channel.
    ports: HashMap<u64, PagePort>,
}

impl<S> Connection<S>
where
    S: KeyValueStore + ?Sized + 'static,
{
    async fn serve(mut self, stream: TcpStream) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("Error during the websocket handshake occurred: {}", e);
                return;
            }
        };
        info!("New WebSocket connection: established");
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let mut commands = self.browser.subscribe();
        let mut changes = self.storage.subscribe();
        let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<ClosedPort>();

        if let Err(e) = self.send_snapshot(&mut ws_sender).await {
            error!("Failed to send initial state: {}", e);
            return;
        }

        loop {
            let outgoing = tokio::select! {
                command = commands.recv() => match command {
                    Ok(command) => Some(command),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Extension connection skipped {} commands", n);
                        None
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                change = changes.recv() => match change {
                    Ok(StorageChange { key, value }) => Some(BridgeCommand::StorageChanged { key, value }),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Extension connection skipped {} storage changes", n);
                        None
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(closed) = closed_rx.recv() => {
                    // Only ports the session closed; the extension already knows about the rest.
                    self.remove_closed(closed)
                        .map(|port_id| BridgeCommand::DisconnectPort { port_id })
                }
                msg = ws_receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ExtensionMessage>(&text) {
                            Ok(message) => {
                                if !self.handle_message(message, &closed_tx).await {
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("Failed to parse message from extension: {} | Text: {}", e, text);
                            }
                        }
                        None
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => None,
                },
            };

            if let Some(command) = outgoing {
                if let Err(e) = send_command(&mut ws_sender, &command).await {
                    error!("Failed to send message to WS: {}", e);
                    break;
                }
            }
        }

        // Dropping the page ends tells the session every relayed channel is gone.
        self.ports.clear();
    }

    async fn send_snapshot(&self, ws_sender: &mut WsSink) -> Result<(), BridgeError> {
        for key in SYNCED_KEYS {
            if let Some(value) = self.storage.get(key).await? {
                let command = BridgeCommand::StorageChanged {
                    key: key.to_string(),
                    value,
                };
                send_command(ws_sender, &command).await?;
            }
        }
        Ok(())
    }

    /// Drops the map entry only if it still holds the channel that closed,
    /// so a reused extension port id keeps its replacement channel.
    fn remove_closed(&mut self, closed: ClosedPort) -> Option<u64> {
        let current = self.ports.get(&closed.port_id)?;
        if current.info().id != closed.channel_id {
            return None;
        }
        self.ports.remove(&closed.port_id);
        Some(closed.port_id)
    }

    /// Returns `false` once the session controller is gone.
    async fn handle_message(
        &mut self,
        message: ExtensionMessage,
        closed_tx: &mpsc::UnboundedSender<ClosedPort>,
    ) -> bool {
        let forwarded = match message {
            ExtensionMessage::PortConnected {
                port_id,
                name,
                url,
                tab_id,
            } => {
                let (page, port) = channel::connect(name, url, tab_id);
                let closed = ClosedPort {
                    port_id,
                    channel_id: page.info().id,
                };
                let signal = page.closed_signal();
                let closed_tx = closed_tx.clone();
                tokio::spawn(async move {
                    signal.wait().await;
                    let _ = closed_tx.send(closed);
                });
                if self.ports.insert(port_id, page).is_some() {
                    warn!("Extension reused port id {}; replacing channel", port_id);
                }
                self.session.send(SessionEvent::PortConnected(port))
            }
            ExtensionMessage::PortMessage { port_id, event } => {
                match self.ports.get(&port_id) {
                    Some(page) => {
                        if let Err(e) = page.post_message(event) {
                            debug!("Dropping event for port {}: {}", port_id, e);
                        }
                    }
                    None => warn!("Event for unknown port {}", port_id),
                }
                Ok(())
            }
            ExtensionMessage::PortDisconnected { port_id } => {
                self.ports.remove(&port_id);
                Ok(())
            }
            ExtensionMessage::BeforeNavigate(details) => {
                self.session.send(SessionEvent::NavigationBegins(details))
            }
            ExtensionMessage::Committed(details) => {
                self.session.send(SessionEvent::NavigationCommitted(details))
            }
            ExtensionMessage::DomContentLoaded(details) => {
                self.session.send(SessionEvent::PageLoaded(details))
            }
            ExtensionMessage::TabActivated { tab_id } => {
                self.browser.set_active_tab(tab_id).await;
                Ok(())
            }
            ExtensionMessage::Control { command } => self.session.control(command),
        };

        match forwarded {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to forward extension message: {}", e);
                false
            }
        }
    }
}

async fn send_command(ws_sender: &mut WsSink, command: &BridgeCommand) -> Result<(), BridgeError> {
    let json = serde_json::to_string(command)?;
    ws_sender.send(Message::Text(json)).await?;
    Ok(())
}
