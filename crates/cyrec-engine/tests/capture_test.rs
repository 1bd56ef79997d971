use async_trait::async_trait;
use cyrec_engine::browser::{Browser, BrowserError};
use cyrec_engine::capture::{
    CaptureOutcome, DocumentHost, EventCapture, ListenerOptions, NativeEvent, PortConnector,
    RECORDER_LISTENER,
};
use cyrec_engine::channel::{self, ConnectedPort, PagePort, PortEvent};
use cyrec_engine::protocol::{ControlAction, EventKind, RecordingState};
use cyrec_engine::selector::{ElementView, FinderConfig, SelectorError, SelectorResolver};
use cyrec_engine::session::{SessionController, SessionHandle};
use cyrec_engine::storage::MemoryStore;
use cyrec_engine::store::BlockStore;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct FakeElement {
    tag: &'static str,
    attrs: HashMap<&'static str, &'static str>,
    value: &'static str,
}

impl FakeElement {
    fn new(tag: &'static str, attrs: &[(&'static str, &'static str)]) -> Self {
        Self {
            tag,
            attrs: attrs.iter().copied().collect(),
            value: "",
        }
    }

    fn with_value(mut self, value: &'static str) -> Self {
        self.value = value;
        self
    }
}

impl ElementView for FakeElement {
    fn tag_name(&self) -> String {
        self.tag.to_string()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attrs.get(name).map(|v| v.to_string())
    }

    fn value(&self) -> String {
        self.value.to_string()
    }

    fn input_type(&self) -> Option<String> {
        self.attribute("type")
    }
}

#[derive(Default)]
struct FakeDocument {
    listeners: Vec<(EventKind, ListenerOptions)>,
}

impl DocumentHost for FakeDocument {
    type Element = FakeElement;

    fn hostname(&self) -> String {
        "example.com".into()
    }

    fn url(&self) -> String {
        "https://example.com/login".into()
    }

    fn add_event_listener(&mut self, kind: EventKind, options: ListenerOptions) {
        self.listeners.push((kind, options));
    }

    fn remove_event_listener(&mut self, kind: EventKind, options: ListenerOptions) {
        self.listeners.retain(|l| *l != (kind, options));
    }
}

#[derive(Default)]
struct TestConnector {
    port: RefCell<Option<ConnectedPort>>,
}

impl PortConnector for TestConnector {
    fn connect(&self, name: &str, url: &str) -> PagePort {
        let (page, port) = channel::connect(name, Some(url.to_string()), None);
        *self.port.borrow_mut() = Some(port);
        page
    }
}

impl TestConnector {
    fn take(&self) -> ConnectedPort {
        self.port.borrow_mut().take().unwrap()
    }
}

type Strategy = fn(&FakeElement, &FinderConfig) -> Result<String, SelectorError>;

fn tag_path(el: &FakeElement, _: &FinderConfig) -> Result<String, SelectorError> {
    Ok(format!("body > {}", el.tag.to_lowercase()))
}

fn unresolvable(_: &FakeElement, _: &FinderConfig) -> Result<String, SelectorError> {
    Err(SelectorError::Unresolved("detached node".into()))
}

fn load(strategy: Strategy) -> (EventCapture<FakeDocument, Strategy>, ConnectedPort) {
    let resolver = SelectorResolver::new(
        strategy,
        vec!["data-cy".into(), "id".into()],
        vec!["name".into()],
    );
    let connector = TestConnector::default();
    let capture = EventCapture::load(FakeDocument::default(), resolver, &connector);
    (capture, connector.take())
}

fn native<'a>(event_type: &'a str, target: &'a FakeElement) -> NativeEvent<'a, FakeElement> {
    NativeEvent {
        event_type,
        is_trusted: true,
        target,
        key: None,
    }
}

async fn nothing_sent(port: &mut ConnectedPort) -> bool {
    tokio::time::timeout(Duration::from_millis(20), port.recv())
        .await
        .is_err()
}

#[tokio::test]
async fn test_load_opens_channel_and_attaches_listeners() {
    let (capture, port) = load(tag_path);
    assert_eq!(port.name(), "example.com");
    assert_eq!(port.info().sender_url.as_deref(), Some("https://example.com/login"));
    assert!(capture.is_attached());

    let listeners = &capture.document().listeners;
    assert_eq!(listeners.len(), EventKind::LISTENED.len());
    for kind in EventKind::LISTENED {
        assert!(listeners.contains(&(kind, RECORDER_LISTENER)));
    }
    assert!(RECORDER_LISTENER.capture && RECORDER_LISTENER.passive);
}

#[tokio::test]
async fn test_untrusted_events_are_never_sent() {
    let (mut capture, mut port) = load(tag_path);
    let button = FakeElement::new("BUTTON", &[("id", "go")]);
    let mut event = native("click", &button);
    event.is_trusted = false;

    assert_eq!(capture.handle_event(&event), CaptureOutcome::Untrusted);
    assert!(nothing_sent(&mut port).await);
}

#[tokio::test]
async fn test_click_record() {
    let (mut capture, mut port) = load(tag_path);
    let link = FakeElement::new(
        "A",
        &[("data-cy", "nav-home"), ("id", "home"), ("href", "https://example.com/")],
    );

    assert_eq!(capture.handle_event(&native("click", &link)), CaptureOutcome::Sent);
    let PortEvent::Message(record) = port.recv().await else {
        panic!("Expected a captured event");
    };
    assert_eq!(record.selector, "[data-cy=nav-home]");
    assert_eq!(record.action, EventKind::Click);
    assert_eq!(record.tag_name, "A");
    assert_eq!(record.element_id.as_deref(), Some("home"));
    assert_eq!(record.href_target.as_deref(), Some("https://example.com/"));
    assert!(record.pressed_key.is_none());
    assert!(record.input_kind.is_none());
    assert!(record.validate().is_ok());
}

#[tokio::test]
async fn test_change_and_keydown_records() {
    let (mut capture, mut port) = load(tag_path);
    let input = FakeElement::new("INPUT", &[("type", "email"), ("name", "email")])
        .with_value("me@example.com");

    assert_eq!(capture.handle_event(&native("change", &input)), CaptureOutcome::Sent);
    let PortEvent::Message(change) = port.recv().await else {
        panic!("Expected a captured event");
    };
    assert_eq!(change.selector, "body > input");
    assert_eq!(change.value, "me@example.com");
    assert_eq!(change.input_kind.as_deref(), Some("email"));
    assert!(change.element_id.is_none());

    let mut keydown = native("keydown", &input);
    keydown.key = Some("Backspace");
    assert_eq!(capture.handle_event(&keydown), CaptureOutcome::Sent);
    let PortEvent::Message(key) = port.recv().await else {
        panic!("Expected a captured event");
    };
    assert_eq!(key.action, EventKind::KeyDown);
    assert_eq!(key.pressed_key.as_deref(), Some("Backspace"));
}

#[tokio::test]
async fn test_edited_selector_lists_apply_to_next_event() {
    let (mut capture, mut port) = load(tag_path);
    let field = FakeElement::new("INPUT", &[("data-test", "email"), ("type", "email")]);

    assert_eq!(capture.handle_event(&native("click", &field)), CaptureOutcome::Sent);
    let PortEvent::Message(before) = port.recv().await else {
        panic!("Expected a captured event");
    };
    assert_eq!(before.selector, "body > input");

    capture.update_selector_lists(vec!["data-test".into()], vec!["name".into()]);
    assert_eq!(capture.handle_event(&native("click", &field)), CaptureOutcome::Sent);
    let PortEvent::Message(after) = port.recv().await else {
        panic!("Expected a captured event");
    };
    assert_eq!(after.selector, "[data-test=email]");
}

#[tokio::test]
async fn test_unsupported_and_unresolved_events() {
    let (mut capture, mut port) = load(tag_path);
    let div = FakeElement::new("DIV", &[]);
    assert_eq!(
        capture.handle_event(&native("mouseover", &div)),
        CaptureOutcome::Unsupported
    );

    let (mut failing, mut failing_port) = load(unresolvable);
    assert_eq!(
        failing.handle_event(&native("click", &div)),
        CaptureOutcome::Unresolved
    );
    assert!(nothing_sent(&mut port).await);
    assert!(nothing_sent(&mut failing_port).await);
}

#[tokio::test]
async fn test_disconnect_detaches_listeners() {
    let (mut capture, mut port) = load(tag_path);
    port.disconnect();
    capture.run_until_disconnected().await;
    assert!(!capture.is_attached());
    assert!(capture.document().listeners.is_empty());

    capture.detach();
    let button = FakeElement::new("BUTTON", &[]);
    assert_eq!(
        capture.handle_event(&native("click", &button)),
        CaptureOutcome::Detached
    );
}

#[tokio::test]
async fn test_event_after_silent_disconnect_is_not_sent() {
    let (mut capture, port) = load(tag_path);
    drop(port);
    let button = FakeElement::new("BUTTON", &[("id", "go")]);
    assert_eq!(
        capture.handle_event(&native("click", &button)),
        CaptureOutcome::Detached
    );
    assert!(!capture.is_attached());
}

struct QuietBrowser;

#[async_trait]
impl Browser for QuietBrowser {
    async fn active_tab(&self) -> Result<i64, BrowserError> {
        Err(BrowserError::NoActiveTab)
    }

    async fn inject_capture_script(&self, _tab_id: i64) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn set_badge(&self, _text: &str) -> Result<(), BrowserError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_page_to_session_pipeline() {
    let storage = Arc::new(MemoryStore::new());
    let blocks = BlockStore::new(storage.clone());
    let (handle, events) = SessionHandle::channel();
    let task = tokio::spawn(SessionController::new(QuietBrowser, storage.clone()).run(events));

    handle.control(ControlAction::Start).unwrap();
    let resolver = SelectorResolver::new(tag_path as Strategy, vec!["id".into()], Vec::new());
    let mut capture = EventCapture::load(FakeDocument::default(), resolver, &handle);

    let button = FakeElement::new("BUTTON", &[("id", "save")]);
    assert_eq!(capture.handle_event(&native("click", &button)), CaptureOutcome::Sent);

    let mut recorded = Vec::new();
    for _ in 0..100 {
        recorded = blocks.blocks().await.unwrap();
        if recorded.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let statements: Vec<_> = recorded.into_iter().map(|b| b.statement).collect();
    assert_eq!(
        statements,
        ["cy.visit('https://example.com/login')", "cy.get('[id=save]').click()"]
    );
    assert_eq!(blocks.state().await.unwrap(), RecordingState::On);

    handle.control(ControlAction::Pause).unwrap();
    capture.run_until_disconnected().await;
    assert!(!capture.is_attached());

    drop(handle);
    task.await.unwrap();
}
