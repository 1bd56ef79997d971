//! Stable selector resolution for captured elements.
//!
//! Preferred attributes are tried first, in order. When none is present the
//! general unique-selector algorithm is asked for a path, restricted to the
//! optional attribute list.

use thiserror::Error;

/// Read-only view of a DOM element.
pub trait ElementView {
    /// Upper-case tag name, e.g. `INPUT`.
    fn tag_name(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Current form value; empty when the element has none.
    fn value(&self) -> String;

    /// `type` of an input element.
    fn input_type(&self) -> Option<String>;

    /// Resolved `href` of the element, if it carries an `href` attribute.
    fn href(&self) -> Option<String> {
        self.attribute("href")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("No selector could be generated: {0}")]
    Unresolved(String),
}

/// Settings handed to the general selector algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderConfig {
    /// Only these attributes may appear in generated selectors.
    pub optional_attributes: Vec<String>,
    pub seed_min_length: usize,
    pub optimized_min_length: usize,
    pub threshold: usize,
    pub max_number_of_tries: usize,
    /// `None` disables the timeout.
    pub timeout_ms: Option<u64>,
}

impl FinderConfig {
    pub fn new(optional_attributes: Vec<String>) -> Self {
        Self {
            optional_attributes,
            seed_min_length: 1,
            optimized_min_length: 2,
            threshold: 1_000,
            max_number_of_tries: 10_000,
            timeout_ms: None,
        }
    }

    pub fn accepts_class(&self, _name: &str) -> bool {
        true
    }

    pub fn accepts_id(&self, _name: &str) -> bool {
        true
    }

    pub fn accepts_tag(&self, _name: &str) -> bool {
        true
    }

    pub fn accepts_attribute(&self, name: &str) -> bool {
        self.optional_attributes.iter().any(|a| a == name)
    }
}

/// The general unique-selector algorithm.
pub trait SelectorStrategy<E: ?Sized> {
    fn compute_selector(&self, element: &E, config: &FinderConfig) -> Result<String, SelectorError>;
}

impl<E: ?Sized, F> SelectorStrategy<E> for F
where
    F: Fn(&E, &FinderConfig) -> Result<String, SelectorError>,
{
    fn compute_selector(&self, element: &E, config: &FinderConfig) -> Result<String, SelectorError> {
        self(element, config)
    }
}

/// Builds `[name=value]` from the first preferred attribute present on the element.
pub fn preferred_selector<E: ElementView + ?Sized>(element: &E, preferred: &[String]) -> Option<String> {
    preferred.iter().find_map(|name| {
        element
            .attribute(name)
            .map(|value| format!("[{name}={value}]"))
    })
}

pub struct SelectorResolver<S> {
    strategy: S,
    preferred: Vec<String>,
    finder: FinderConfig,
}

impl<S> SelectorResolver<S> {
    pub fn new(strategy: S, preferred: Vec<String>, optional_attributes: Vec<String>) -> Self {
        Self {
            strategy,
            preferred,
            finder: FinderConfig::new(optional_attributes),
        }
    }

    pub fn preferred(&self) -> &[String] {
        &self.preferred
    }

    pub fn finder_config(&self) -> &FinderConfig {
        &self.finder
    }

    /// Replaces both attribute lists, e.g. after the user edits them.
    pub fn update_lists(&mut self, preferred: Vec<String>, optional_attributes: Vec<String>) {
        self.preferred = preferred;
        self.finder.optional_attributes = optional_attributes;
    }

    pub fn resolve<E>(&self, element: &E) -> Result<String, SelectorError>
    where
        E: ElementView + ?Sized,
        S: SelectorStrategy<E>,
    {
        if let Some(selector) = preferred_selector(element, &self.preferred) {
            return Ok(selector);
        }
        let selector = self.strategy.compute_selector(element, &self.finder)?;
        if selector.trim().is_empty() {
            return Err(SelectorError::Unresolved(format!(
                "empty selector for <{}>",
                element.tag_name().to_ascii_lowercase()
            )));
        }
        Ok(selector)
    }
}
