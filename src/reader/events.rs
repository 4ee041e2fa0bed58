//! XML Event Types
//!
//! Event kinds, qualified names and source locations shared by the
//! tokenizer, the stream reader and the cursor engine.

use std::fmt;
use std::sync::Arc;

/// Kind of the event a reader or cursor is positioned on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Element start tag (also reported for `<empty/>` tags)
    StartElement,
    /// Element end tag (synthesized for `<empty/>` tags)
    EndElement,
    /// Character data that is not whitespace-only
    Characters,
    /// CDATA section content
    CData,
    /// Comment content
    Comment,
    /// Processing instruction: <?target data?>
    ProcessingInstruction,
    /// Unexpanded entity reference (non-expanding mode)
    EntityReference,
    /// Initial state of every reader
    StartDocument,
    /// End of input, reported once
    EndDocument,
    /// Whitespace-only character data
    Space,
    /// DOCTYPE declaration
    Dtd,
}

impl EventKind {
    /// All event kinds, in declaration order
    pub const ALL: [EventKind; 11] = [
        EventKind::StartElement,
        EventKind::EndElement,
        EventKind::Characters,
        EventKind::CData,
        EventKind::Comment,
        EventKind::ProcessingInstruction,
        EventKind::EntityReference,
        EventKind::StartDocument,
        EventKind::EndDocument,
        EventKind::Space,
        EventKind::Dtd,
    ];

    /// Single-bit mask for this kind, used by kind-set filters
    #[inline]
    pub const fn mask(self) -> u16 {
        1 << (self as u16)
    }

    /// Check if this is a start or end element
    #[inline]
    pub fn is_element(self) -> bool {
        matches!(self, EventKind::StartElement | EventKind::EndElement)
    }

    /// Check if this event carries character content
    #[inline]
    pub fn is_text(self) -> bool {
        matches!(self, EventKind::Characters | EventKind::CData | EventKind::Space)
    }
}

/// Position of an event in the input
///
/// Lines and columns are 1-based, columns count bytes. A line of 0
/// marks an unknown location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
    /// Absolute byte offset from the start of input
    pub offset: u64,
}

impl Location {
    /// Placeholder for errors raised away from the input (e.g. by the
    /// attribute collector); the reader fills in the real position.
    pub const UNKNOWN: Location = Location { line: 0, column: 0, offset: 0 };

    pub const fn new(line: u32, column: u32, offset: u64) -> Self {
        Location { line, column, offset }
    }

    #[inline]
    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "line {}, column {} (offset {})", self.line, self.column, self.offset)
        } else {
            f.write_str("unknown position")
        }
    }
}

/// Namespace-qualified name of an element or attribute
///
/// `namespace` is `None` for names in no namespace; an empty URI is
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<Arc<str>>,
    pub local: Arc<str>,
    pub namespace: Option<Arc<str>>,
}

impl QName {
    /// Create an unresolved name (no namespace URI yet)
    pub fn new(prefix: Option<Arc<str>>, local: Arc<str>) -> Self {
        QName {
            prefix,
            local,
            namespace: None,
        }
    }

    /// Create a name in a namespace, without a prefix
    pub fn with_namespace(namespace: &str, local: &str) -> Self {
        QName {
            prefix: None,
            local: Arc::from(local),
            namespace: if namespace.is_empty() { None } else { Some(Arc::from(namespace)) },
        }
    }

    #[inline]
    pub fn local_name(&self) -> &str {
        &self.local
    }

    #[inline]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    #[inline]
    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Check the namespace and local name, ignoring the prefix
    pub fn matches(&self, namespace: Option<&str>, local: &str) -> bool {
        &*self.local == local && self.namespace.as_deref() == namespace
    }

    /// Check whether the raw (prefix, local) form equals another name's
    pub fn same_raw_name(&self, other: &QName) -> bool {
        self.local == other.local && self.prefix == other.prefix
    }
}

impl fmt::Display for QName {
    /// Writes the name as it appeared in the document (`prefix:local`)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{}:{}", p, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Content of the `<?xml ...?>` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<bool>,
}

impl Default for XmlDeclaration {
    fn default() -> Self {
        XmlDeclaration {
            version: "1.0".to_string(),
            encoding: None,
            standalone: None,
        }
    }
}

/// DOCTYPE declaration data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoctypeInfo {
    pub root_name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Raw text between `[` and `]`, if present
    pub internal_subset: Option<String>,
}
