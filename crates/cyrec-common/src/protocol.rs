use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted storage keys shared by the orchestrator and the UI surfaces.
pub mod keys {
    pub const RECORDING_STATE: &str = "recording-state";
    pub const CODE_BLOCKS: &str = "code-blocks";
    pub const SELECTOR_PREFERENCE_LIST: &str = "selector-preference-list";
    pub const SELECTOR_OPTIONAL_ATTRIBUTES: &str = "selector-optional-attributes";
}

/// Attribute names offered for selector generation, in priority order.
pub const DEFAULT_SELECTOR_ATTRIBUTES: &[&str] = &[
    "utid",
    "id",
    "class",
    "data-href",
    "data-cy",
    "data-test",
    "data-testid",
    "test-id",
];

pub fn default_selector_attributes() -> Vec<String> {
    DEFAULT_SELECTOR_ATTRIBUTES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// DOM event kinds the recorder listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    #[serde(rename = "dblclick")]
    DoubleClick,
    #[serde(rename = "keydown")]
    KeyDown,
    Change,
    Submit,
    /// Any event type the recorder does not understand.
    #[serde(other)]
    Unsupported,
}

impl EventKind {
    /// Every kind a listener is registered for.
    pub const LISTENED: [EventKind; 5] = [
        EventKind::Click,
        EventKind::DoubleClick,
        EventKind::KeyDown,
        EventKind::Change,
        EventKind::Submit,
    ];

    /// Maps a native DOM event type name (`"dblclick"`, `"keydown"`, ...).
    pub fn from_dom_type(name: &str) -> Self {
        match name {
            "click" => EventKind::Click,
            "dblclick" => EventKind::DoubleClick,
            "keydown" => EventKind::KeyDown,
            "change" => EventKind::Change,
            "submit" => EventKind::Submit,
            _ => EventKind::Unsupported,
        }
    }

    pub fn dom_type(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::DoubleClick => "dblclick",
            EventKind::KeyDown => "keydown",
            EventKind::Change => "change",
            EventKind::Submit => "submit",
            EventKind::Unsupported => "unsupported",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Captured event has an empty selector")]
    EmptySelector,
    #[error("Key press events must carry the pressed key")]
    MissingKey,
    #[error("Only key press events may carry a pressed key (got {0:?})")]
    UnexpectedKey(EventKind),
    #[error("Input kind is only valid on INPUT elements (got {0})")]
    UnexpectedInputKind(String),
}

/// One user interaction normalized by the page-side capture layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub selector: String,
    pub action: EventKind,
    #[serde(rename = "tag")]
    pub tag_name: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(rename = "key", default, skip_serializing_if = "Option::is_none")]
    pub pressed_key: Option<String>,
    #[serde(rename = "href", default, skip_serializing_if = "Option::is_none")]
    pub href_target: Option<String>,
    #[serde(
        rename = "inputType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub input_kind: Option<String>,
}

impl CapturedEvent {
    pub fn new(
        selector: impl Into<String>,
        action: EventKind,
        tag_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            selector: selector.into(),
            action,
            tag_name: tag_name.into(),
            value: value.into(),
            element_id: None,
            pressed_key: None,
            href_target: None,
            input_kind: None,
        }
    }

    /// Sets the pressed key. Ignored unless the event is a key press.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        if self.action == EventKind::KeyDown {
            self.pressed_key = Some(key.into());
        }
        self
    }

    /// Sets the input kind. Ignored unless the element is an `INPUT`.
    pub fn with_input_kind(mut self, kind: impl Into<String>) -> Self {
        if self.is_input() {
            self.input_kind = Some(kind.into());
        }
        self
    }

    pub fn with_element_id(mut self, id: impl Into<String>) -> Self {
        self.element_id = Some(id.into());
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href_target = Some(href.into());
        self
    }

    pub fn is_input(&self) -> bool {
        self.tag_name.eq_ignore_ascii_case("INPUT")
    }

    /// Checks the field co-determination rules for records received over the wire.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.selector.is_empty() {
            return Err(ProtocolError::EmptySelector);
        }
        match (self.action, &self.pressed_key) {
            (EventKind::KeyDown, None) => return Err(ProtocolError::MissingKey),
            (kind, Some(_)) if kind != EventKind::KeyDown => {
                return Err(ProtocolError::UnexpectedKey(kind));
            }
            _ => {}
        }
        if self.input_kind.is_some() && !self.is_input() {
            return Err(ProtocolError::UnexpectedInputKind(self.tag_name.clone()));
        }
        Ok(())
    }
}

/// A generated statement together with its natural-language explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    #[serde(rename = "code")]
    pub statement: String,
    #[serde(rename = "prompt")]
    pub explanation: String,
}

impl CodeBlock {
    pub fn new(statement: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            explanation: explanation.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Off,
    On,
    Paused,
}

impl RecordingState {
    /// Badge text mirroring the state.
    pub fn badge(&self) -> &'static str {
        match self {
            RecordingState::Off => "",
            RecordingState::On => "rec",
            RecordingState::Paused => "wait",
        }
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordingState::Off => "off",
            RecordingState::On => "on",
            RecordingState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Commands sent by the UI surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Reset,
    Add { block: CodeBlock },
    Move { from: usize, to: usize },
    Delete { index: usize },
}

/// Which half of each block an export renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Code,
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionQualifier {
    ClientRedirect,
    ServerRedirect,
    ForwardBack,
    FromAddressBar,
    #[serde(other)]
    Other,
}

/// Navigation lifecycle details reported by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationDetails {
    pub tab_id: i64,
    /// `0` is the top-level frame.
    pub frame_id: i64,
    pub url: String,
    #[serde(default)]
    pub transition_qualifiers: Vec<TransitionQualifier>,
}

impl NavigationDetails {
    pub fn new(tab_id: i64, frame_id: i64, url: impl Into<String>) -> Self {
        Self {
            tab_id,
            frame_id,
            url: url.into(),
            transition_qualifiers: Vec::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: TransitionQualifier) -> Self {
        self.transition_qualifiers.push(qualifier);
        self
    }

    pub fn is_top_level(&self) -> bool {
        self.frame_id == 0
    }

    pub fn has_qualifier(&self, qualifier: TransitionQualifier) -> bool {
        self.transition_qualifiers.contains(&qualifier)
    }
}
