//! Error types
//!
//! Data errors (malformed input, I/O) and API misuse errors share one
//! enum; `is_misuse()` tells them apart.

use crate::reader::events::{EventKind, Location};
use std::borrow::Cow;
use thiserror::Error;

pub type Result<T, E = XmlError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum XmlError {
    /// Well-formedness violation
    #[error("malformed XML at {location}: {message}")]
    Malformed {
        message: Cow<'static, str>,
        location: Location,
    },

    /// Two attributes of one start tag resolve to the same (URI, local name)
    #[error("duplicate attribute '{name}' at {location}")]
    DuplicateAttribute { name: String, location: Location },

    /// Element or attribute prefix without an in-scope declaration
    #[error("undeclared namespace prefix '{prefix}' at {location}")]
    UndeclaredPrefix { prefix: String, location: Location },

    /// Attempt to rebind a namespace binding marked permanent
    #[error("namespace prefix '{prefix}' is permanently bound to '{uri}'")]
    PermanentBinding { prefix: String, uri: String },

    /// The byte source misbehaved (e.g. returned no bytes without EOF)
    #[error("input source anomaly: {0}")]
    IoAnomaly(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Tokenizer and cursor engine disagree about nesting
    #[error("structural inconsistency: {0}")]
    Structural(String),

    /// The reader already failed; parsing cannot continue
    #[error("parsing was aborted by an earlier error")]
    Aborted,

    /// Cursor used in a state that does not allow the operation
    #[error("invalid cursor state: {0}")]
    InvalidCursorState(String),

    /// Attribute collector accessed before `resolve()`
    #[error("attributes accessed before namespace resolution")]
    NotResolved,

    /// Text requested while not positioned on a text event
    #[error("not positioned on a text event (current: {0:?})")]
    NotTextPositioned(Option<EventKind>),
}

impl XmlError {
    pub fn malformed(message: impl Into<Cow<'static, str>>, location: Location) -> Self {
        XmlError::Malformed {
            message: message.into(),
            location,
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        XmlError::InvalidCursorState(message.into())
    }

    /// True for errors caused by the calling code rather than the input
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            XmlError::InvalidCursorState(_) | XmlError::NotResolved | XmlError::NotTextPositioned(_)
        )
    }

    /// Location of the offending input, when known
    pub fn location(&self) -> Option<Location> {
        match self {
            XmlError::Malformed { location, .. }
            | XmlError::DuplicateAttribute { location, .. }
            | XmlError::UndeclaredPrefix { location, .. } => Some(*location).filter(Location::is_known),
            _ => None,
        }
    }

    /// Fill in the location of errors raised without one
    pub fn at(mut self, at: Location) -> Self {
        match &mut self {
            XmlError::Malformed { location, .. }
            | XmlError::DuplicateAttribute { location, .. }
            | XmlError::UndeclaredPrefix { location, .. } => {
                if !location.is_known() {
                    *location = at;
                }
            }
            _ => {}
        }
        self
    }
}
