//! Page-side event capture.
//!
//! Owns the "am I watching this page" lifecycle: opens the channel on load,
//! keeps one capturing listener per event kind on the document, filters out
//! synthetic events and forwards normalized records to the orchestrator.

use crate::channel::PagePort;
use cyrec_common::protocol::{CapturedEvent, EventKind};
use cyrec_common::selector::{ElementView, SelectorResolver, SelectorStrategy};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub passive: bool,
}

/// Capturing phase, never calls `preventDefault`.
pub const RECORDER_LISTENER: ListenerOptions = ListenerOptions {
    capture: true,
    passive: true,
};

/// The page document the capture layer attaches to.
pub trait DocumentHost {
    type Element: ElementView + ?Sized;

    fn hostname(&self) -> String;

    fn url(&self) -> String;

    fn add_event_listener(&mut self, kind: EventKind, options: ListenerOptions);

    fn remove_event_listener(&mut self, kind: EventKind, options: ListenerOptions);
}

/// Opens the page end of a channel to the orchestrator.
pub trait PortConnector {
    fn connect(&self, name: &str, url: &str) -> PagePort;
}

/// A native DOM event as delivered to the listener.
pub struct NativeEvent<'a, E: ?Sized> {
    /// DOM event type, e.g. `"dblclick"`.
    pub event_type: &'a str,
    pub is_trusted: bool,
    pub target: &'a E,
    /// `KeyboardEvent.key` for keyboard events.
    pub key: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Sent,
    Untrusted,
    Unsupported,
    Unresolved,
    SendFailed,
    Detached,
}

pub struct EventCapture<D: DocumentHost, S> {
    document: D,
    resolver: SelectorResolver<S>,
    port: PagePort,
    attached: bool,
}

impl<D, S> EventCapture<D, S>
where
    D: DocumentHost,
    S: SelectorStrategy<D::Element>,
{
    /// Runs on script load: opens the channel and attaches the listeners.
    pub fn load<C: PortConnector + ?Sized>(
        document: D,
        resolver: SelectorResolver<S>,
        connector: &C,
    ) -> Self {
        let host = document.hostname();
        let port = connector.connect(&host, &document.url());
        info!("Event capture loaded on {}", host);
        let mut capture = Self {
            document,
            resolver,
            port,
            attached: false,
        };
        capture.attach();
        capture
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn port(&self) -> &PagePort {
        &self.port
    }

    pub fn update_selector_lists(&mut self, preferred: Vec<String>, optional: Vec<String>) {
        self.resolver.update_lists(preferred, optional);
    }

    fn attach(&mut self) {
        if self.attached {
            return;
        }
        for kind in EventKind::LISTENED {
            self.document.add_event_listener(kind, RECORDER_LISTENER);
        }
        self.attached = true;
    }

    /// Removes every listener. Safe to call repeatedly.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        for kind in EventKind::LISTENED {
            self.document.remove_event_listener(kind, RECORDER_LISTENER);
        }
        self.attached = false;
        debug!("Event capture detached from {}", self.port.info().name);
    }

    /// Waits for the orchestrator to drop the channel, then detaches.
    pub async fn run_until_disconnected(&mut self) {
        self.port.closed().await;
        self.detach();
    }

    pub fn handle_event(&mut self, event: &NativeEvent<'_, D::Element>) -> CaptureOutcome {
        if self.port.is_closed() {
            self.detach();
        }
        if !self.attached {
            return CaptureOutcome::Detached;
        }
        if !event.is_trusted {
            debug!("Ignoring synthetic {} event", event.event_type);
            return CaptureOutcome::Untrusted;
        }

        let kind = EventKind::from_dom_type(event.event_type);
        if kind == EventKind::Unsupported {
            return CaptureOutcome::Unsupported;
        }

        let selector = match self.resolver.resolve(event.target) {
            Ok(selector) => selector,
            Err(e) => {
                warn!("Skipping {} event: {}", event.event_type, e);
                return CaptureOutcome::Unresolved;
            }
        };

        let record = build_record(selector, kind, event);
        match self.port.post_message(record) {
            Ok(()) => CaptureOutcome::Sent,
            Err(e) => {
                error!("Failed to send captured event: {}", e);
                CaptureOutcome::SendFailed
            }
        }
    }
}

fn build_record<E: ElementView + ?Sized>(
    selector: String,
    kind: EventKind,
    event: &NativeEvent<'_, E>,
) -> CapturedEvent {
    let target = event.target;
    let mut record = CapturedEvent::new(selector, kind, target.tag_name(), target.value());
    if let Some(href) = target.href() {
        record = record.with_href(href);
    }
    if let Some(id) = target.attribute("id") {
        record = record.with_element_id(id);
    }
    if record.is_input() {
        record = record.with_input_kind(target.input_type().unwrap_or_else(|| "text".into()));
    }
    if let Some(key) = event.key {
        record = record.with_key(key);
    }
    record
}
