//! Orchestrator-side recording session.
//!
//! A single task owns the controller and handles one event at a time, so
//! block mutations and state transitions never interleave.

use crate::browser::Browser;
use crate::capture::PortConnector;
use crate::channel::{self, ConnectedPort, PagePort, PortEvent};
use crate::storage::KeyValueStore;
use crate::store::{BlockStore, StoreError};
use cyrec_common::protocol::{
    CapturedEvent, CodeBlock, ControlAction, EventKind, NavigationDetails, RecordingState,
    TransitionQualifier,
};
use cyrec_common::translator::EventTranslator;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Session controller is no longer running")]
    Closed,
}

/// Everything the controller reacts to besides channel messages.
#[derive(Debug)]
pub enum SessionEvent {
    Control(ControlAction),
    NavigationBegins(NavigationDetails),
    NavigationCommitted(NavigationDetails),
    PageLoaded(NavigationDetails),
    PortConnected(ConnectedPort),
}

/// Cloneable sender feeding a running controller.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.tx.send(event).map_err(|_| SessionError::Closed)
    }

    pub fn control(&self, action: ControlAction) -> Result<(), SessionError> {
        self.send(SessionEvent::Control(action))
    }
}

impl PortConnector for SessionHandle {
    fn connect(&self, name: &str, url: &str) -> PagePort {
        let (page, port) = channel::connect(name, Some(url.to_string()), None);
        if self.send(SessionEvent::PortConnected(port)).is_err() {
            // The port was dropped with the event, so the page sees it closed.
            warn!("Session controller gone; channel {} closed immediately", name);
        }
        page
    }
}

pub struct SessionController<B, S: ?Sized> {
    browser: B,
    blocks: BlockStore<S>,
    translator: EventTranslator,
    checkpoints: bool,
    active_port: Option<ConnectedPort>,
    original_host: String,
    last_url: String,
    watching_navigation: bool,
}

impl<B, S> SessionController<B, S>
where
    B: Browser,
    S: KeyValueStore + ?Sized,
{
    pub fn new(browser: B, storage: Arc<S>) -> Self {
        Self {
            browser,
            blocks: BlockStore::new(storage),
            translator: EventTranslator::default(),
            checkpoints: true,
            active_port: None,
            original_host: String::new(),
            last_url: String::new(),
            watching_navigation: false,
        }
    }

    pub fn with_translator(mut self, translator: EventTranslator) -> Self {
        self.translator = translator;
        self
    }

    /// Toggles the URL assertion appended on same-site navigations.
    pub fn with_checkpoints(mut self, enabled: bool) -> Self {
        self.checkpoints = enabled;
        self
    }

    pub fn blocks(&self) -> &BlockStore<S> {
        &self.blocks
    }

    pub async fn state(&self) -> Result<RecordingState, SessionError> {
        Ok(self.blocks.state().await?)
    }

    pub fn original_host(&self) -> &str {
        &self.original_host
    }

    pub fn is_watching_navigation(&self) -> bool {
        self.watching_navigation
    }

    pub fn has_active_port(&self) -> bool {
        self.active_port
            .as_ref()
            .is_some_and(|port| !port.is_disconnected())
    }

    /// Processes events until every [`SessionHandle`] is dropped.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        info!("Session controller running");
        loop {
            let next = {
                let port = &mut self.active_port;
                // Page messages first: anything the page sent before a
                // navigation or control event must be recorded before it.
                tokio::select! {
                    biased;
                    port_event = next_port_event(port) => Next::Port(port_event),
                    event = events.recv() => Next::Event(event),
                }
            };

            let result = match next {
                Next::Event(Some(event)) => self.handle(event).await,
                Next::Event(None) => break,
                Next::Port(PortEvent::Message(event)) => self.channel_message(event).await,
                Next::Port(PortEvent::Disconnected) => {
                    if let Some(port) = self.active_port.take() {
                        debug!("Channel {} closed by page", port.name());
                    }
                    Ok(())
                }
            };
            if let Err(e) = result {
                error!("Session event failed: {}", e);
            }
        }
        self.disconnect_active_port();
        info!("Session controller stopped");
    }

    pub async fn handle(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::Control(action) => self.handle_control(action).await,
            SessionEvent::NavigationBegins(details) => {
                self.navigation_begins(&details);
                Ok(())
            }
            SessionEvent::NavigationCommitted(details) => {
                self.navigation_committed(&details).await
            }
            SessionEvent::PageLoaded(details) => {
                self.page_loaded(&details).await;
                Ok(())
            }
            SessionEvent::PortConnected(port) => self.port_connected(port).await,
        }
    }

    /// Applies a UI command. Block edits bypass the recording state machine.
    pub async fn handle_control(&mut self, action: ControlAction) -> Result<(), SessionError> {
        debug!("Control action: {:?}", action);
        match action {
            ControlAction::Start => self.start().await,
            ControlAction::Resume => self.resume().await,
            ControlAction::Pause => self.pause().await,
            ControlAction::Reset => self.reset().await,
            ControlAction::Add { block } => Ok(self.blocks.append(block).await?),
            ControlAction::Move { from, to } => Ok(self.blocks.move_block(from, to).await?),
            ControlAction::Delete { index } => {
                self.blocks.delete(index).await?;
                Ok(())
            }
        }
    }

    pub async fn start(&mut self) -> Result<(), SessionError> {
        info!("Recording started");
        self.begin_recording().await
    }

    pub async fn resume(&mut self) -> Result<(), SessionError> {
        info!("Recording resumed");
        self.begin_recording().await
    }

    pub async fn pause(&mut self) -> Result<(), SessionError> {
        let state = self.blocks.state().await?;
        if state != RecordingState::On {
            warn!("Ignoring pause while recording is {}", state);
            return Ok(());
        }
        info!("Recording paused");
        self.pause_sequence().await
    }

    pub async fn reset(&mut self) -> Result<(), SessionError> {
        info!("Recording reset");
        self.disconnect_active_port();
        self.watching_navigation = false;
        self.original_host.clear();
        self.last_url.clear();
        self.blocks.reset().await?;
        self.update_badge(RecordingState::Off).await;
        Ok(())
    }

    /// The page is about to be torn down; drop its channel first.
    pub fn navigation_begins(&mut self, details: &NavigationDetails) {
        if !self.watching_navigation || !details.is_top_level() {
            return;
        }
        self.disconnect_active_port();
    }

    pub async fn navigation_committed(
        &mut self,
        details: &NavigationDetails,
    ) -> Result<(), SessionError> {
        if !self.watching_navigation {
            return Ok(());
        }

        let same_host = self.is_original_host(&details.url);
        let leaves_flow = details.is_top_level()
            && (!same_host
                || details.has_qualifier(TransitionQualifier::ForwardBack)
                || details.has_qualifier(TransitionQualifier::FromAddressBar));

        if leaves_flow {
            info!("Navigation to {} leaves the recorded flow", details.url);
            return self.pause_sequence().await;
        }
        if !same_host {
            return Ok(());
        }

        let state = self.blocks.state().await?;
        if state != RecordingState::On {
            debug!("Navigation to {} ignored while {}", details.url, state);
            return Ok(());
        }
        if !self.checkpoints {
            return Ok(());
        }

        match self.translator.checkpoint(&details.url) {
            Ok(block) => self.blocks.append(block).await?,
            Err(e) => warn!("No checkpoint for navigation: {}", e),
        }
        Ok(())
    }

    /// Content scripts do not survive a page load, so inject again.
    pub async fn page_loaded(&mut self, details: &NavigationDetails) {
        if !self.watching_navigation || !details.is_top_level() {
            return;
        }
        self.inject(details.tab_id).await;
    }

    pub async fn port_connected(&mut self, port: ConnectedPort) -> Result<(), SessionError> {
        let info = port.info().clone();
        debug!("Channel {} connected from {:?}", info.name, info.sender_url);
        self.active_port = Some(port);

        let state = self.blocks.state().await?;
        if self.watching_navigation || state == RecordingState::Off {
            return Ok(());
        }

        self.original_host = info.name.clone();
        self.watching_navigation = true;

        if let Some(url) = info.sender_url {
            if url != self.last_url {
                self.last_url = url;
                if state == RecordingState::On {
                    let block = self.translator.visit(&self.last_url);
                    self.blocks.append(block).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn channel_message(&mut self, event: CapturedEvent) -> Result<(), SessionError> {
        let state = self.blocks.state().await?;
        if state != RecordingState::On {
            debug!(
                "Dropping {} on {}: recording is {}",
                event.action.dom_type(),
                event.selector,
                state
            );
            return Ok(());
        }
        if let Err(e) = event.validate() {
            warn!("Dropping malformed event: {}", e);
            return Ok(());
        }

        let Some(block) = self.translator.translate(&event) else {
            return Ok(());
        };
        self.record(event.action, block).await
    }

    async fn record(&self, action: EventKind, block: CodeBlock) -> Result<(), SessionError> {
        if action == EventKind::DoubleClick {
            // The two clicks that preceded the double click are part of it.
            self.blocks.replace_last_two_with_one(block).await?;
        } else {
            self.blocks.append(block).await?;
        }
        Ok(())
    }

    async fn begin_recording(&mut self) -> Result<(), SessionError> {
        match self.browser.active_tab().await {
            Ok(tab_id) => self.inject(tab_id).await,
            Err(e) => error!("Cannot inject capture script: {}", e),
        }
        self.blocks.set_state(RecordingState::On).await?;
        self.update_badge(RecordingState::On).await;
        Ok(())
    }

    async fn pause_sequence(&mut self) -> Result<(), SessionError> {
        self.disconnect_active_port();
        self.watching_navigation = false;
        self.original_host.clear();
        self.blocks.set_state(RecordingState::Paused).await?;
        self.update_badge(RecordingState::Paused).await;
        Ok(())
    }

    async fn inject(&self, tab_id: i64) {
        match self.browser.inject_capture_script(tab_id).await {
            Ok(()) => debug!("Capture script injected into tab {}", tab_id),
            Err(e) => error!("Capture script injection into tab {} failed: {}", tab_id, e),
        }
    }

    async fn update_badge(&self, state: RecordingState) {
        if let Err(e) = self.browser.set_badge(state.badge()).await {
            warn!("Failed to update badge: {}", e);
        }
    }

    fn disconnect_active_port(&mut self) {
        if let Some(mut port) = self.active_port.take() {
            port.disconnect();
        }
    }

    fn is_original_host(&self, url: &str) -> bool {
        if self.original_host.is_empty() {
            return false;
        }
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(&self.original_host)))
            .unwrap_or(false)
    }
}

enum Next {
    Event(Option<SessionEvent>),
    Port(PortEvent),
}

async fn next_port_event(port: &mut Option<ConnectedPort>) -> PortEvent {
    match port {
        Some(port) => port.recv().await,
        None => std::future::pending().await,
    }
}
