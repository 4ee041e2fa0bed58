//! Cursor Filters
//!
//! A filter decides, per event, whether a cursor surfaces it. Rejected
//! events are consumed silently; filtering never shows up as a state.

use crate::core::attributes::AttributeCollector;
use crate::reader::events::{EventKind, Location, QName};
use crate::reader::stream::StreamReader;
use std::fmt;
use std::sync::Arc;

/// Read-only view of the event being filtered
pub struct CursorView<'a> {
    reader: &'a StreamReader,
    depth: u32,
}

impl<'a> CursorView<'a> {
    pub(crate) fn new(reader: &'a StreamReader, depth: u32) -> Self {
        CursorView { reader, depth }
    }

    pub fn kind(&self) -> EventKind {
        self.reader.event_kind()
    }

    /// Depth the cursor would report for this event
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn location(&self) -> Location {
        self.reader.location()
    }

    pub fn name(&self) -> Option<&'a QName> {
        self.reader.name()
    }

    pub fn local_name(&self) -> Option<&'a str> {
        self.reader.local_name()
    }

    pub fn prefix(&self) -> Option<&'a str> {
        self.reader.prefix()
    }

    pub fn namespace_uri(&self) -> Option<&'a str> {
        self.reader.namespace_uri()
    }

    pub fn attributes(&self) -> Option<&'a AttributeCollector> {
        self.reader.attributes().ok()
    }

    pub fn attribute_value_by_name(&self, namespace: Option<&str>, local: &str) -> Option<&'a str> {
        self.attributes()?.get_by_name(namespace, local).ok().flatten()
    }

    pub fn text(&self) -> Option<&'a str> {
        self.reader.text().ok()
    }

    pub fn is_whitespace(&self) -> bool {
        self.reader.is_whitespace()
    }
}

/// Event predicate used by cursors
pub trait CursorFilter {
    fn accept(&self, kind: EventKind, view: &CursorView<'_>) -> bool;
}

impl<F> CursorFilter for F
where
    F: Fn(EventKind, &CursorView<'_>) -> bool,
{
    fn accept(&self, kind: EventKind, view: &CursorView<'_>) -> bool {
        self(kind, view)
    }
}

/// Accepts events whose kind is in a bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSet(u16);

impl KindSet {
    pub const fn empty() -> Self {
        KindSet(0)
    }

    pub const fn with(self, kind: EventKind) -> Self {
        KindSet(self.0 | kind.mask())
    }

    pub const fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.mask() != 0
    }
}

impl FromIterator<EventKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        iter.into_iter().fold(KindSet::empty(), KindSet::with)
    }
}

impl CursorFilter for KindSet {
    fn accept(&self, kind: EventKind, _view: &CursorView<'_>) -> bool {
        self.contains(kind)
    }
}

const ELEMENTS: KindSet = KindSet::empty()
    .with(EventKind::StartElement)
    .with(EventKind::EndElement);

const TEXT: KindSet = KindSet::empty()
    .with(EventKind::Characters)
    .with(EventKind::CData)
    .with(EventKind::Space)
    .with(EventKind::EntityReference);

/// Shared, cloneable cursor filter
#[derive(Clone)]
pub struct Filter(Arc<dyn CursorFilter + Send + Sync>);

impl Filter {
    pub fn new<F: CursorFilter + Send + Sync + 'static>(filter: F) -> Self {
        Filter(Arc::new(filter))
    }

    /// Filter from a closure
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(EventKind, &CursorView<'_>) -> bool + Send + Sync + 'static,
    {
        Filter::new(f)
    }

    /// Start and end elements only
    pub fn elements() -> Self {
        Filter::new(ELEMENTS)
    }

    /// Character data: text, CDATA, whitespace and entity references
    pub fn text() -> Self {
        Filter::new(TEXT)
    }

    /// Elements and character data; comments, PIs and DTD are dropped
    pub fn mixed() -> Self {
        Filter::new(KindSet(ELEMENTS.0 | TEXT.0))
    }

    /// Everything except whitespace-only text
    pub fn non_whitespace() -> Self {
        Filter::from_fn(|kind, view| match kind {
            EventKind::Space => false,
            EventKind::Characters | EventKind::CData => !view.is_whitespace(),
            _ => true,
        })
    }

    /// Events of the given kinds
    pub fn kinds(kinds: &[EventKind]) -> Self {
        Filter::new(kinds.iter().copied().collect::<KindSet>())
    }

    /// Start elements with the given local name (any namespace), plus all
    /// end elements so flattening cursors keep their structure
    pub fn element_named(local: &str) -> Self {
        let local: Arc<str> = Arc::from(local);
        Filter::from_fn(move |kind, view| match kind {
            EventKind::StartElement => view.local_name() == Some(&*local),
            EventKind::EndElement => true,
            _ => false,
        })
    }

    pub fn and(self, other: Filter) -> Self {
        Filter::from_fn(move |kind, view| self.accept(kind, view) && other.accept(kind, view))
    }

    pub fn or(self, other: Filter) -> Self {
        Filter::from_fn(move |kind, view| self.accept(kind, view) || other.accept(kind, view))
    }

    pub fn negate(self) -> Self {
        Filter::from_fn(move |kind, view| !self.accept(kind, view))
    }

    #[inline]
    pub fn accept(&self, kind: EventKind, view: &CursorView<'_>) -> bool {
        self.0.accept(kind, view)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter(..)")
    }
}

impl From<KindSet> for Filter {
    fn from(kinds: KindSet) -> Self {
        Filter::new(kinds)
    }
}
