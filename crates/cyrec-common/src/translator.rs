use crate::formatter::{CodeDialect, CypressDialect};
use crate::protocol::{CapturedEvent, CodeBlock, EventKind};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Keys whose presses are recorded on their own. Everything else is covered
/// by the change event that follows the typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKey {
    Backspace,
    Escape,
    ArrowUp,
    ArrowRight,
    ArrowDown,
    ArrowLeft,
}

impl SpecialKey {
    /// Looks up a `KeyboardEvent.key` name.
    pub fn from_key_name(name: &str) -> Option<Self> {
        match name {
            "Backspace" => Some(SpecialKey::Backspace),
            "Escape" => Some(SpecialKey::Escape),
            "ArrowUp" => Some(SpecialKey::ArrowUp),
            "ArrowRight" => Some(SpecialKey::ArrowRight),
            "ArrowDown" => Some(SpecialKey::ArrowDown),
            "ArrowLeft" => Some(SpecialKey::ArrowLeft),
            _ => None,
        }
    }
}

/// A recordable step, independent of the dialect used to render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Click { selector: String },
    DoubleClick { selector: String },
    PressKey { selector: String, key: SpecialKey },
    TypeText { selector: String, text: String },
    Submit { selector: String },
    AssertUrlContains { url: String },
    Visit { url: String },
}

/// Input kinds that toggle state rather than hold typed text.
const TOGGLE_INPUT_KINDS: &[&str] = &["checkbox", "radio"];

/// Classifies a captured event. `None` means the event is not worth a step.
pub fn classify(event: &CapturedEvent) -> Option<Step> {
    let selector = event.selector.clone();
    match event.action {
        EventKind::Click => Some(Step::Click { selector }),
        EventKind::DoubleClick => Some(Step::DoubleClick { selector }),
        EventKind::KeyDown => {
            let key = event
                .pressed_key
                .as_deref()
                .and_then(SpecialKey::from_key_name)?;
            Some(Step::PressKey { selector, key })
        }
        EventKind::Change => {
            let is_toggle = event
                .input_kind
                .as_deref()
                .is_some_and(|kind| TOGGLE_INPUT_KINDS.contains(&kind));
            if is_toggle {
                return None;
            }
            Some(Step::TypeText {
                selector,
                text: event.value.clone(),
            })
        }
        EventKind::Submit => Some(Step::Submit { selector }),
        EventKind::Unsupported => None,
    }
}

/// `origin + pathname` of a URL; query string and fragment are dropped.
pub fn origin_and_path(url: &str) -> Result<String, TranslationError> {
    let parsed = Url::parse(url).map_err(|e| TranslationError::InvalidUrl(format!("{url}: {e}")))?;
    Ok(format!(
        "{}{}",
        parsed.origin().ascii_serialization(),
        parsed.path()
    ))
}

/// Turns captured events into code blocks through a pluggable dialect.
pub struct EventTranslator {
    dialect: Box<dyn CodeDialect>,
}

impl Default for EventTranslator {
    fn default() -> Self {
        Self::new(Box::new(CypressDialect))
    }
}

impl EventTranslator {
    pub fn new(dialect: Box<dyn CodeDialect>) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &dyn CodeDialect {
        self.dialect.as_ref()
    }

    /// Translates one event. Returns `None` for events that produce no block.
    pub fn translate(&self, event: &CapturedEvent) -> Option<CodeBlock> {
        classify(event).map(|step| self.dialect.render(&step))
    }

    /// Checkpoint asserting the page landed on `url` (ignoring query and fragment).
    pub fn checkpoint(&self, url: &str) -> Result<CodeBlock, TranslationError> {
        let url = origin_and_path(url)?;
        Ok(self.dialect.render(&Step::AssertUrlContains { url }))
    }

    pub fn visit(&self, url: &str) -> CodeBlock {
        self.dialect.render(&Step::Visit {
            url: url.to_string(),
        })
    }
}

/// Translates with the reference dialect.
pub fn translate(event: &CapturedEvent) -> Option<CodeBlock> {
    let step = classify(event)?;
    Some(CypressDialect.render(&step))
}
