use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// How a selector string is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorKind {
    /// Element tag name, e.g. `canvas`
    Tag,
    /// CSS selector, e.g. `input[type='file']`
    Css,
}

impl SelectorKind {
    /// Express `selector` as a CSS selector
    pub fn to_css(self, selector: &str) -> DriverResult<String> {
        match self {
            SelectorKind::Tag => {
                let valid = !selector.is_empty()
                    && selector.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
                if valid {
                    Ok(selector.to_ascii_lowercase())
                } else {
                    Err(DriverError::InvalidSelector(selector.to_string()))
                }
            }
            SelectorKind::Css => {
                if selector.trim().is_empty() {
                    Err(DriverError::InvalidSelector(selector.to_string()))
                } else {
                    Ok(selector.to_string())
                }
            }
        }
    }
}

/// Opaque reference to an element found by a driver.
///
/// Handles are only meaningful to the driver that issued them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub(crate) id: usize,
    pub selector: String,
    pub kind: SelectorKind,
}

impl ElementHandle {
    pub fn new(id: usize, selector: impl Into<String>, kind: SelectorKind) -> Self {
        Self {
            id,
            selector: selector.into(),
            kind,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

/// Elements behind the handles of the most recent lookup.
///
/// Each lookup replaces the previous batch, so memory stays bounded by the
/// largest single result. Ids keep increasing across batches; a handle from
/// an earlier batch resolves to nothing instead of to an unrelated element.
#[derive(Debug)]
pub struct ElementTable<T> {
    base: usize,
    items: Vec<T>,
}

impl<T> Default for ElementTable<T> {
    fn default() -> Self {
        Self {
            base: 0,
            items: Vec::new(),
        }
    }
}

impl<T> ElementTable<T> {
    /// Replace the tracked elements, returning the ids issued for them
    pub fn replace(&mut self, found: impl IntoIterator<Item = T>) -> Range<usize> {
        self.base += self.items.len();
        self.items.clear();
        self.items.extend(found);
        self.base..self.base + self.items.len()
    }

    pub fn get(&self, id: usize) -> Option<&T> {
        id.checked_sub(self.base).and_then(|i| self.items.get(i))
    }

    /// Forget every element; outstanding ids become stale
    pub fn clear(&mut self) {
        self.replace(std::iter::empty());
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of probing for a single element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(ElementHandle),
    /// Nothing matched; a normal outcome when probing optional affordances
    NotFound { selector: String },
}

impl Lookup {
    pub fn found(self) -> Option<ElementHandle> {
        match self {
            Lookup::Found(handle) => Some(handle),
            Lookup::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Observable predicate polled by a settle wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleCondition {
    /// At least one element matches
    ElementPresent { selector: String, kind: SelectorKind },
    /// At least `min` elements match
    MinElements {
        selector: String,
        kind: SelectorKind,
        min: usize,
    },
}

impl SettleCondition {
    pub fn present(selector: impl Into<String>, kind: SelectorKind) -> Self {
        SettleCondition::ElementPresent {
            selector: selector.into(),
            kind,
        }
    }

    pub fn min_elements(selector: impl Into<String>, kind: SelectorKind, min: usize) -> Self {
        SettleCondition::MinElements {
            selector: selector.into(),
            kind,
            min,
        }
    }

    /// Evaluate the condition against a driver
    pub fn holds<D: super::UiDriver + ?Sized>(&self, driver: &mut D) -> DriverResult<bool> {
        match self {
            SettleCondition::ElementPresent { selector, kind } => {
                Ok(driver.find_element(selector, *kind)?.is_found())
            }
            SettleCondition::MinElements { selector, kind, min } => {
                Ok(driver.find_all_elements(selector, *kind)?.len() >= *min)
            }
        }
    }
}

/// How a settle wait ended. None of these are failures; callers treat the
/// state afterwards as probably settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The condition held after this long
    ConditionMet(Duration),
    /// The ceiling elapsed without the condition holding
    CeilingReached(Duration),
    /// No condition was given; slept for the full duration
    Slept(Duration),
}

impl Settled {
    pub fn condition_met(&self) -> bool {
        matches!(self, Settled::ConditionMet(_))
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Error types for UI driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    /// No automation session is attached
    #[error("no automation session attached")]
    NotAttached,

    /// The browser could not be launched or connected
    #[error("failed to start automation session: {0}")]
    Launch(String),

    /// The application entry point could not be loaded
    #[error("{endpoint} is unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// A selector that cannot be expressed for its kind
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    /// A handle that this driver did not issue (or no longer tracks)
    #[error("unknown element handle #{0}")]
    StaleElement(usize),

    /// Any other failure reported by the automation protocol
    #[error("automation protocol error: {0}")]
    Protocol(String),

    /// Local file problem (file inputs, screenshots)
    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
