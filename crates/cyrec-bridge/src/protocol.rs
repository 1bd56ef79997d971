//! JSON messages exchanged with the browser extension over the WebSocket.

use cyrec_engine::protocol::{CapturedEvent, ControlAction, NavigationDetails};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extension -> bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionMessage {
    /// A content script opened a channel. `port_id` is chosen by the extension.
    PortConnected {
        port_id: u64,
        name: String,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        tab_id: Option<i64>,
    },
    PortMessage {
        port_id: u64,
        event: CapturedEvent,
    },
    PortDisconnected {
        port_id: u64,
    },
    BeforeNavigate(NavigationDetails),
    Committed(NavigationDetails),
    DomContentLoaded(NavigationDetails),
    TabActivated {
        tab_id: i64,
    },
    /// Popup or panel command.
    Control {
        command: ControlAction,
    },
}

/// Bridge -> extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BridgeCommand {
    InjectScript { tab_id: i64 },
    SetBadge { text: String },
    DisconnectPort { port_id: u64 },
    /// Mirrors a shared storage write so the extension UI can re-render.
    StorageChanged { key: String, value: Value },
}
