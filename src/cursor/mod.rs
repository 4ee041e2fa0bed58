//! Cursor Engine
//!
//! Hierarchical cursors over one `StreamReader`. A cursor covers one
//! scope: the whole document for the root cursor, the content of an
//! element for child cursors. Nested cursors surface the direct
//! children of their scope and skip the subtree of every child element
//! automatically; flattening cursors surface every descendant event,
//! end elements included, except the end of their own scope.
//!
//! Cursors live in an arena owned by `CursorTree` and are addressed by
//! generation-checked `CursorId` handles. A parent owns its (single)
//! child; the child keeps the parent's slot index. Only the deepest
//! active cursor can read the current event: opening a child moves a
//! cursor to `HasChild`, and advancing it again releases the child and
//! skips whatever the child left unread.

pub mod filter;
pub mod tracking;

pub use filter::{CursorFilter, CursorView, Filter, KindSet};
pub use tracking::{TrackedElement, Tracking};

use crate::core::attributes::AttributeRef;
use crate::error::{Result, XmlError};
use crate::reader::events::{EventKind, Location, QName};
use crate::reader::stream::StreamReader;
use std::sync::Arc;
use tracking::{StartInfo, Tracker};

/// Handle to a cursor in a `CursorTree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId {
    index: u32,
    generation: u32,
}

impl CursorId {
    /// Slot index and generation, for handing the id across an FFI boundary
    pub fn to_raw(self) -> (u32, u32) {
        (self.index, self.generation)
    }

    pub fn from_raw(index: u32, generation: u32) -> Self {
        CursorId { index, generation }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Direct children of the scope; child subtrees are skipped
    Nested,
    /// All descendants of the scope
    Flattening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created, not yet advanced
    Initial,
    /// Positioned on an event
    Active,
    /// A child cursor owns traversal
    HasChild,
    /// Scope exhausted or skipped; terminal
    Closed,
}

#[derive(Debug)]
struct CursorRecord {
    mode: TraversalMode,
    state: CursorState,
    filter: Option<Filter>,
    parent: Option<u32>,
    child: Option<CursorId>,
    /// Reader depth of the element owning the scope (0 for the document)
    base_depth: u32,
    /// Depth reported for direct children of the scope
    level: u32,
    /// Nesting of the current event below the scope (flattening only)
    nesting: u32,
    current: Option<EventKind>,
    /// Reader depth of an element whose remaining subtree must be
    /// consumed before this cursor reads on
    skip_depth: Option<u32>,
    node_count: u64,
    element_count: u64,
    tracker: Tracker,
}

impl CursorRecord {
    fn new(mode: TraversalMode, filter: Option<Filter>, base_depth: u32, level: u32, tracker: Tracker) -> Self {
        CursorRecord {
            mode,
            state: CursorState::Initial,
            filter,
            parent: None,
            child: None,
            base_depth,
            level,
            nesting: 0,
            current: None,
            skip_depth: None,
            node_count: 0,
            element_count: 0,
            tracker,
        }
    }

    fn depth(&self) -> u32 {
        self.level + self.nesting
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<CursorRecord>,
}

/// Arena of cursors sharing one stream reader
#[derive(Debug)]
pub struct CursorTree {
    reader: StreamReader,
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<CursorId>,
    /// Set by structural errors; the reader tracks its own failures
    failed: bool,
}

impl CursorTree {
    pub fn new(reader: StreamReader) -> Self {
        CursorTree {
            reader,
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            failed: false,
        }
    }

    /// The underlying reader (declaration, DOCTYPE, entities, namespaces)
    pub fn reader(&self) -> &StreamReader {
        &self.reader
    }

    pub fn into_reader(self) -> StreamReader {
        self.reader
    }

    /// Number of live cursors
    pub fn live_cursors(&self) -> usize {
        self.slots.iter().filter(|s| s.record.is_some()).count()
    }

    // ============================================================================
    // Arena
    // ============================================================================

    fn alloc(&mut self, record: CursorRecord) -> CursorId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.record = Some(record);
                CursorId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                CursorId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        if slot.record.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
        }
    }

    fn index_of(&self, id: CursorId) -> Option<u32> {
        let slot = self.slots.get(id.index as usize)?;
        (slot.generation == id.generation && slot.record.is_some()).then_some(id.index)
    }

    fn record(&self, index: u32) -> &CursorRecord {
        match &self.slots[index as usize].record {
            Some(record) => record,
            None => unreachable!("cursor slot {} checked live", index),
        }
    }

    fn record_mut(&mut self, index: u32) -> &mut CursorRecord {
        match &mut self.slots[index as usize].record {
            Some(record) => record,
            None => unreachable!("cursor slot {} checked live", index),
        }
    }

    fn live(&self, id: CursorId) -> Result<u32> {
        self.index_of(id)
            .ok_or_else(|| XmlError::invalid_state(format!("stale cursor handle {:?}", id)))
    }

    /// Release the child chain below `index`
    fn release_children(&mut self, index: u32) {
        let mut next = self.record_mut(index).child.take();
        while let Some(child) = next {
            let Some(child_index) = self.index_of(child) else {
                break;
            };
            next = self.record_mut(child_index).child.take();
            self.release(child_index);
        }
    }

    fn check_failed(&self) -> Result<()> {
        if self.failed {
            return Err(XmlError::Aborted);
        }
        Ok(())
    }

    fn structural(&mut self, message: String) -> XmlError {
        self.failed = true;
        log::debug!(target: "rustystax::cursor", "structural error: {}", message);
        XmlError::Structural(message)
    }

    // ============================================================================
    // Creation
    // ============================================================================

    fn create_root(&mut self, mode: TraversalMode, filter: Option<Filter>) -> Result<CursorId> {
        if self.root.is_some() {
            return Err(XmlError::invalid_state("root cursor already created"));
        }
        if self.reader.event_kind() != EventKind::StartDocument {
            return Err(XmlError::invalid_state("root cursor requires an unread reader"));
        }
        let id = self.alloc(CursorRecord::new(mode, filter, 0, 1, Tracker::default()));
        self.root = Some(id);
        Ok(id)
    }

    /// Nested cursor over the document: prolog, root element, epilog
    pub fn root_cursor(&mut self, filter: Option<Filter>) -> Result<CursorId> {
        self.create_root(TraversalMode::Nested, filter)
    }

    /// Flattening cursor over the whole document
    pub fn root_flattening_cursor(&mut self, filter: Option<Filter>) -> Result<CursorId> {
        self.create_root(TraversalMode::Flattening, filter)
    }

    /// Nested cursor that only surfaces the root element
    pub fn root_element_cursor(&mut self) -> Result<CursorId> {
        self.root_cursor(Some(Filter::elements()))
    }

    fn open_child(&mut self, id: CursorId, mode: TraversalMode, filter: Option<Filter>) -> Result<CursorId> {
        self.check_failed()?;
        let index = self.live(id)?;
        let parent = self.record(index);
        match parent.state {
            CursorState::Active => {}
            CursorState::HasChild => {
                return Err(XmlError::invalid_state("cursor already has an open child cursor"));
            }
            state => {
                return Err(XmlError::invalid_state(format!(
                    "child cursor requires an active cursor, cursor is {:?}",
                    state
                )));
            }
        }
        if parent.current != Some(EventKind::StartElement) {
            return Err(XmlError::invalid_state(format!(
                "child cursor requires StartElement, cursor is on {:?}",
                parent.current
            )));
        }
        self.check_positioned(index)?;

        let element_depth = self.reader.depth();
        let tracker = Tracker::new(parent.tracker.mode(), parent.tracker.last().cloned());
        let level = parent.depth() + 1;
        let mut record = CursorRecord::new(mode, filter, element_depth, level, tracker);
        record.parent = Some(index);
        let child = self.alloc(record);

        let parent = self.record_mut(index);
        parent.state = CursorState::HasChild;
        parent.child = Some(child);
        parent.skip_depth = Some(element_depth);
        log::trace!(target: "rustystax::cursor", "open {:?} child {:?} of {:?}", mode, child, id);
        Ok(child)
    }

    /// Nested cursor over the content of the current StartElement
    pub fn child_cursor(&mut self, id: CursorId, filter: Option<Filter>) -> Result<CursorId> {
        self.open_child(id, TraversalMode::Nested, filter)
    }

    /// Flattening cursor over the content of the current StartElement
    pub fn descendant_cursor(&mut self, id: CursorId, filter: Option<Filter>) -> Result<CursorId> {
        self.open_child(id, TraversalMode::Flattening, filter)
    }

    pub fn child_element_cursor(&mut self, id: CursorId) -> Result<CursorId> {
        self.child_cursor(id, Some(Filter::elements()))
    }

    pub fn child_mixed_cursor(&mut self, id: CursorId) -> Result<CursorId> {
        self.child_cursor(id, Some(Filter::mixed()))
    }

    pub fn descendant_element_cursor(&mut self, id: CursorId) -> Result<CursorId> {
        self.descendant_cursor(id, Some(Filter::elements()))
    }

    // ============================================================================
    // Traversal
    // ============================================================================

    /// Move the cursor to its next accepted event. Returns `None` once
    /// the scope is exhausted; closed or stale cursors keep returning
    /// `None`.
    pub fn advance(&mut self, id: CursorId) -> Result<Option<EventKind>> {
        let Some(index) = self.index_of(id) else {
            return Ok(None);
        };
        if self.record(index).state == CursorState::Closed {
            return Ok(None);
        }
        self.check_failed()?;

        self.release_children(index);
        let (mode, base, filter) = {
            let r = self.record(index);
            (r.mode, r.base_depth, r.filter.clone())
        };

        // A flattening cursor still owes the end tag of a skipped subtree
        let mut pending_end = false;
        if let Some(depth) = self.record_mut(index).skip_depth.take() {
            self.skip_to_end(depth)?;
            pending_end = mode == TraversalMode::Flattening;
        }

        loop {
            let kind = if pending_end {
                pending_end = false;
                self.reader.event_kind()
            } else {
                self.reader.next()?
            };
            let depth = self.reader.depth();

            match kind {
                EventKind::EndDocument if base == 0 => return Ok(self.close(index)),
                EventKind::EndDocument => {
                    return Err(self.structural(format!(
                        "end of document inside element scope at depth {}",
                        base
                    )))
                }
                EventKind::EndElement if depth == base => return Ok(self.close(index)),
                EventKind::EndElement if depth < base || mode == TraversalMode::Nested => {
                    return Err(self.structural(format!(
                        "end tag </{}> at depth {} in scope at depth {}",
                        self.reader.name().map(QName::to_string).unwrap_or_default(),
                        depth,
                        base
                    )))
                }
                _ => {}
            }

            let nesting = match (mode, kind) {
                (TraversalMode::Nested, _) => 0,
                (_, EventKind::StartElement | EventKind::EndElement) => depth - base - 1,
                _ => depth - base,
            };
            let event_depth = self.record(index).level + nesting;
            let accepted = filter
                .as_ref()
                .map_or(true, |f| f.accept(kind, &CursorView::new(&self.reader, event_depth)));

            if kind == EventKind::StartElement {
                let record = self.slots[index as usize].record.as_mut();
                if let (Some(record), Some(name)) = (record, self.reader.name()) {
                    let node_index = record.node_count + u64::from(accepted);
                    let element_index = record.element_count + u64::from(accepted);
                    record.tracker.on_start(StartInfo {
                        name,
                        nesting: nesting as usize,
                        visible: accepted,
                        node_index,
                        element_index,
                        depth: event_depth,
                    });
                }
            }

            if !accepted {
                if kind == EventKind::StartElement && mode == TraversalMode::Nested {
                    self.skip_to_end(depth)?;
                }
                continue;
            }

            let record = self.record_mut(index);
            record.state = CursorState::Active;
            record.current = Some(kind);
            record.nesting = nesting;
            record.node_count += 1;
            if kind == EventKind::StartElement {
                record.element_count += 1;
                if mode == TraversalMode::Nested {
                    record.skip_depth = Some(depth);
                }
            }
            log::trace!(target: "rustystax::cursor", "{:?} -> {:?} depth {}", id, kind, event_depth);
            return Ok(Some(kind));
        }
    }

    fn close(&mut self, index: u32) -> Option<EventKind> {
        let record = self.record_mut(index);
        record.state = CursorState::Closed;
        record.current = None;
        record.skip_depth = None;
        log::debug!(target: "rustystax::cursor", "scope at depth {} closed", record.base_depth);
        None
    }

    /// Consume events until the EndElement at reader depth `depth`
    fn skip_to_end(&mut self, depth: u32) -> Result<()> {
        loop {
            if self.reader.event_kind() == EventKind::EndElement && self.reader.depth() == depth {
                return Ok(());
            }
            if self.reader.next()? == EventKind::EndDocument {
                return Err(self.structural(format!(
                    "end of document while skipping element at depth {}",
                    depth
                )));
            }
        }
    }

    /// Close the cursor and its children, discarding the rest of its scope
    pub fn skip_subtree(&mut self, id: CursorId) -> Result<()> {
        let index = self.live(id)?;
        if self.record(index).state == CursorState::Closed {
            return Ok(());
        }
        self.check_failed()?;
        self.release_children(index);

        let base = self.record(index).base_depth;
        if base == 0 {
            while self.reader.event_kind() != EventKind::EndDocument {
                self.reader.next()?;
            }
        } else {
            self.skip_to_end(base)?;
        }
        self.close(index);
        Ok(())
    }

    /// Concatenated character data of the current element's subtree. The
    /// subtree is consumed; the cursor then only supports `advance`.
    pub fn collect_descendant_text(&mut self, id: CursorId, include_whitespace: bool) -> Result<String> {
        let index = self.active(id)?;
        if self.record(index).current != Some(EventKind::StartElement) {
            return Err(XmlError::invalid_state("collect_descendant_text requires StartElement"));
        }
        let depth = self.reader.depth();
        self.record_mut(index).skip_depth = Some(depth);

        let mut out = String::new();
        loop {
            match self.reader.next()? {
                EventKind::EndElement if self.reader.depth() == depth => return Ok(out),
                EventKind::Characters | EventKind::CData | EventKind::EntityReference => {
                    out.push_str(self.reader.text()?);
                }
                EventKind::Space if include_whitespace => out.push_str(self.reader.text()?),
                EventKind::EndDocument => {
                    return Err(self.structural("end of document inside element".to_string()))
                }
                _ => {}
            }
        }
    }

    // ============================================================================
    // Queries
    // ============================================================================

    /// State of the cursor; stale handles report `Closed`
    pub fn state(&self, id: CursorId) -> CursorState {
        self.index_of(id)
            .map_or(CursorState::Closed, |i| self.record(i).state)
    }

    pub fn is_closed(&self, id: CursorId) -> bool {
        self.state(id) == CursorState::Closed
    }

    pub fn mode(&self, id: CursorId) -> Result<TraversalMode> {
        Ok(self.record(self.live(id)?).mode)
    }

    /// Nested cursors: parent depth + 1. Flattening cursors add the
    /// nesting of the current event below their scope.
    pub fn depth(&self, id: CursorId) -> Result<u32> {
        Ok(self.record(self.live(id)?).depth())
    }

    pub fn parent(&self, id: CursorId) -> Result<Option<CursorId>> {
        let record = self.record(self.live(id)?);
        Ok(record.parent.map(|index| CursorId {
            index,
            generation: self.slots[index as usize].generation,
        }))
    }

    /// The open child cursor, if any
    pub fn child(&self, id: CursorId) -> Result<Option<CursorId>> {
        Ok(self.record(self.live(id)?).child)
    }

    /// Number of events surfaced so far
    pub fn node_count(&self, id: CursorId) -> Result<u64> {
        Ok(self.record(self.live(id)?).node_count)
    }

    /// Number of StartElement events surfaced so far
    pub fn element_count(&self, id: CursorId) -> Result<u64> {
        Ok(self.record(self.live(id)?).element_count)
    }

    /// Change tracking granularity; applies from the next element on and
    /// is inherited by child cursors opened afterwards
    pub fn set_tracking(&mut self, id: CursorId, tracking: Tracking) -> Result<()> {
        let index = self.live(id)?;
        self.record_mut(index).tracker.set_mode(tracking);
        Ok(())
    }

    pub fn tracking(&self, id: CursorId) -> Result<Tracking> {
        Ok(self.record(self.live(id)?).tracker.mode())
    }

    /// Most recent element snapshot taken by this cursor
    pub fn tracked_element(&self, id: CursorId) -> Result<Option<Arc<TrackedElement>>> {
        Ok(self.record(self.live(id)?).tracker.last().cloned())
    }

    /// Snapshot of the element owning this cursor's scope
    pub fn parent_tracked_element(&self, id: CursorId) -> Result<Option<Arc<TrackedElement>>> {
        Ok(self.record(self.live(id)?).tracker.inherited().cloned())
    }

    // ============================================================================
    // Current event accessors
    // ============================================================================

    /// Index of a live cursor that may read the current event
    fn active(&self, id: CursorId) -> Result<u32> {
        let index = self.live(id)?;
        match self.record(index).state {
            CursorState::Active => {}
            CursorState::HasChild => {
                return Err(XmlError::invalid_state(
                    "cursor has an open child cursor; only the deepest cursor can read",
                ))
            }
            CursorState::Initial => return Err(XmlError::invalid_state("cursor not advanced yet")),
            CursorState::Closed => return Err(XmlError::invalid_state("cursor is closed")),
        }
        self.check_positioned(index)?;
        Ok(index)
    }

    fn check_positioned(&self, index: u32) -> Result<()> {
        if self.record(index).current != Some(self.reader.event_kind()) {
            return Err(XmlError::invalid_state(
                "reader has moved past the cursor's current event",
            ));
        }
        Ok(())
    }

    pub fn current_event(&self, id: CursorId) -> Result<EventKind> {
        self.active(id)?;
        Ok(self.reader.event_kind())
    }

    /// Text of the current text, comment, PI or entity event
    pub fn current_text(&self, id: CursorId) -> Result<&str> {
        self.active(id)?;
        self.reader.text()
    }

    pub fn is_whitespace(&self, id: CursorId) -> Result<bool> {
        self.active(id)?;
        Ok(self.reader.is_whitespace())
    }

    pub fn qname(&self, id: CursorId) -> Result<&QName> {
        self.active(id)?;
        self.reader.name().ok_or_else(|| {
            XmlError::invalid_state(format!("no element name on {:?}", self.reader.event_kind()))
        })
    }

    pub fn local_name(&self, id: CursorId) -> Result<&str> {
        Ok(self.qname(id)?.local_name())
    }

    pub fn prefix(&self, id: CursorId) -> Result<Option<&str>> {
        Ok(self.qname(id)?.prefix())
    }

    pub fn namespace_uri(&self, id: CursorId) -> Result<Option<&str>> {
        Ok(self.qname(id)?.namespace_uri())
    }

    pub fn attribute_count(&self, id: CursorId) -> Result<usize> {
        self.active(id)?;
        Ok(self.reader.attributes()?.len())
    }

    pub fn attribute(&self, id: CursorId, index: usize) -> Result<Option<AttributeRef<'_>>> {
        self.active(id)?;
        self.reader.attribute(index)
    }

    pub fn attribute_value(&self, id: CursorId, index: usize) -> Result<Option<&str>> {
        self.active(id)?;
        self.reader.attribute_value(index)
    }

    pub fn attribute_value_by_name(&self, id: CursorId, namespace: Option<&str>, local: &str) -> Result<Option<&str>> {
        self.active(id)?;
        self.reader.attribute_value_by_name(namespace, local)
    }

    pub fn pi_target(&self, id: CursorId) -> Result<Option<&str>> {
        self.active(id)?;
        Ok(self.reader.pi_target())
    }

    pub fn entity_name(&self, id: CursorId) -> Result<Option<&str>> {
        self.active(id)?;
        Ok(self.reader.entity_name())
    }

    pub fn location(&self, id: CursorId) -> Result<Location> {
        self.active(id)?;
        Ok(self.reader.location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderConfig;
    use crate::reader::buffered::SliceSource;

    fn tree(input: &str) -> CursorTree {
        let reader = StreamReader::new(Box::new(SliceSource::new(input)), ReaderConfig::default());
        CursorTree::new(reader)
    }

    /// (kind, local name) of every event a cursor surfaces
    fn drain(tree: &mut CursorTree, id: CursorId) -> Vec<(EventKind, String)> {
        let mut out = Vec::new();
        while let Some(kind) = tree.advance(id).unwrap() {
            let name = match kind {
                EventKind::StartElement | EventKind::EndElement => tree.local_name(id).unwrap().to_string(),
                _ => tree.current_text(id).map(str::to_string).unwrap_or_default(),
            };
            out.push((kind, name));
        }
        out
    }

    #[test]
    fn test_nested_children_only() {
        let mut t = tree("<root><a x='1' y='2'/>text<b><c/></b></root>");
        let root = t.root_element_cursor().unwrap();
        assert_eq!(t.advance(root).unwrap(), Some(EventKind::StartElement));
        let kids = t.child_element_cursor(root).unwrap();
        assert_eq!(
            drain(&mut t, kids),
            vec![(EventKind::StartElement, "a".into()), (EventKind::StartElement, "b".into())]
        );
        assert!(t.is_closed(kids));
        assert_eq!(t.advance(root).unwrap(), None);
    }

    #[test]
    fn test_flattening_surfaces_inner_ends() {
        let mut t = tree("<root><a x='1' y='2'/>text<b/></root>");
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let all = t.descendant_element_cursor(root).unwrap();
        assert_eq!(
            drain(&mut t, all),
            vec![
                (EventKind::StartElement, "a".into()),
                (EventKind::EndElement, "a".into()),
                (EventKind::StartElement, "b".into()),
                (EventKind::EndElement, "b".into()),
            ]
        );
    }

    #[test]
    fn test_attributes_through_cursor() {
        let mut t = tree("<root><a x='1' y='2'/></root>");
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let kids = t.child_element_cursor(root).unwrap();
        t.advance(kids).unwrap();
        assert_eq!(t.attribute_count(kids).unwrap(), 2);
        assert_eq!(t.attribute_value(kids, 0).unwrap(), Some("1"));
        assert_eq!(t.attribute_value_by_name(kids, None, "y").unwrap(), Some("2"));
        assert_eq!(t.attribute(kids, 1).unwrap().unwrap().name.local_name(), "y");
    }

    #[test]
    fn test_closed_advance_is_idempotent() {
        let mut t = tree("<r/>");
        let root = t.root_cursor(None).unwrap();
        assert_eq!(t.advance(root).unwrap(), Some(EventKind::StartElement));
        assert_eq!(t.advance(root).unwrap(), None);
        for _ in 0..3 {
            assert_eq!(t.advance(root).unwrap(), None);
            assert_eq!(t.state(root), CursorState::Closed);
        }
    }

    #[test]
    fn test_states() {
        let mut t = tree("<r><a/></r>");
        let root = t.root_cursor(None).unwrap();
        assert_eq!(t.state(root), CursorState::Initial);
        t.advance(root).unwrap();
        assert_eq!(t.state(root), CursorState::Active);
        let child = t.child_cursor(root, None).unwrap();
        assert_eq!(t.state(root), CursorState::HasChild);
        assert_eq!(t.state(child), CursorState::Initial);
        assert_eq!(t.parent(child).unwrap(), Some(root));
        assert_eq!(t.child(root).unwrap(), Some(child));
    }

    #[test]
    fn test_parent_cannot_read_while_child_open() {
        let mut t = tree("<r><a/></r>");
        let root = t.root_cursor(None).unwrap();
        t.advance(root).unwrap();
        let _child = t.child_cursor(root, None).unwrap();
        let err = t.local_name(root).unwrap_err();
        assert!(err.is_misuse());
        assert!(t.child_cursor(root, None).unwrap_err().is_misuse());
    }

    #[test]
    fn test_child_requires_start_element() {
        let mut t = tree("<!-- c --><r/>");
        let root = t.root_cursor(None).unwrap();
        assert!(t.child_cursor(root, None).unwrap_err().is_misuse());
        assert_eq!(t.advance(root).unwrap(), Some(EventKind::Comment));
        assert!(matches!(t.child_cursor(root, None), Err(XmlError::InvalidCursorState(_))));
    }

    #[test]
    fn test_advancing_parent_releases_child() {
        let mut t = tree("<r><a><x/><y/></a><b/></r>");
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let kids = t.child_element_cursor(root).unwrap();
        t.advance(kids).unwrap();
        let grandkids = t.child_element_cursor(kids).unwrap();
        t.advance(grandkids).unwrap();
        assert_eq!(t.local_name(grandkids).unwrap(), "x");

        // Parent advance closes the grandchild and skips <y/>
        assert_eq!(t.advance(kids).unwrap(), Some(EventKind::StartElement));
        assert_eq!(t.local_name(kids).unwrap(), "b");
        assert_eq!(t.state(grandkids), CursorState::Closed);
        assert_eq!(t.advance(grandkids).unwrap(), None);
        assert!(t.depth(grandkids).unwrap_err().is_misuse());
    }

    #[test]
    fn test_skip_then_read_matches_plain_traversal() {
        let input = "<r><a><x/>t</a><b k='v'/><c/></r>";

        let mut plain = tree(input);
        let root = plain.root_element_cursor().unwrap();
        plain.advance(root).unwrap();
        let kids = plain.child_element_cursor(root).unwrap();
        let expected = drain(&mut plain, kids);

        let mut t = tree(input);
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let kids = t.child_element_cursor(root).unwrap();
        let mut seen = Vec::new();
        while let Some(kind) = t.advance(kids).unwrap() {
            seen.push((kind, t.local_name(kids).unwrap().to_string()));
            let child = t.child_cursor(kids, None).unwrap();
            t.skip_subtree(child).unwrap();
            assert!(t.is_closed(child));
        }
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_skip_subtree() {
        let mut t = tree("<r><a><deep><deeper/></deep></a><b/></r>");
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let kids = t.child_element_cursor(root).unwrap();
        t.advance(kids).unwrap();
        t.skip_subtree(kids).unwrap();
        assert!(t.is_closed(kids));
        t.skip_subtree(kids).unwrap();
        assert_eq!(t.advance(root).unwrap(), None);
    }

    #[test]
    fn test_skip_root() {
        let mut t = tree("<r><a/></r><!-- tail -->");
        let root = t.root_cursor(None).unwrap();
        t.skip_subtree(root).unwrap();
        assert!(t.is_closed(root));
        assert_eq!(t.reader().event_kind(), EventKind::EndDocument);
    }

    #[test]
    fn test_depths() {
        let mut t = tree("<r><a><b/></a></r>");
        let root = t.root_cursor(None).unwrap();
        assert_eq!(t.depth(root).unwrap(), 1);
        t.advance(root).unwrap();
        let nested = t.child_cursor(root, None).unwrap();
        assert_eq!(t.depth(nested).unwrap(), 2);
        t.advance(nested).unwrap();
        let flat = t.descendant_cursor(nested, None).unwrap();
        t.advance(flat).unwrap();
        assert_eq!(t.local_name(flat).unwrap(), "b");
        assert_eq!(t.depth(flat).unwrap(), 3);
        t.advance(flat).unwrap();
        assert_eq!(t.current_event(flat).unwrap(), EventKind::EndElement);
        assert_eq!(t.depth(flat).unwrap(), 3);
        assert_eq!(t.advance(flat).unwrap(), None);
    }

    #[test]
    fn test_flattening_nesting_depths() {
        let mut t = tree("<r><a><b>t</b></a></r>");
        let root = t.root_flattening_cursor(None).unwrap();
        let mut depths = Vec::new();
        while let Some(kind) = t.advance(root).unwrap() {
            depths.push((kind, t.depth(root).unwrap()));
        }
        use EventKind::*;
        assert_eq!(
            depths,
            vec![
                (StartElement, 1),
                (StartElement, 2),
                (StartElement, 3),
                (Characters, 4),
                (EndElement, 3),
                (EndElement, 2),
                (EndElement, 1),
            ]
        );
    }

    #[test]
    fn test_flattening_surfaces_end_of_skipped_child() {
        let mut t = tree("<r><x><y/></x><z/></r>");
        let root = t.root_flattening_cursor(None).unwrap();
        let mut seen = Vec::new();
        while let Some(kind) = t.advance(root).unwrap() {
            let name = t.local_name(root).unwrap().to_string();
            if kind == EventKind::StartElement && name == "x" {
                let child = t.child_cursor(root, None).unwrap();
                t.skip_subtree(child).unwrap();
            }
            seen.push((kind, name, t.depth(root).unwrap()));
        }
        use EventKind::*;
        assert_eq!(
            seen,
            vec![
                (StartElement, "r".to_string(), 1),
                (StartElement, "x".to_string(), 2),
                (EndElement, "x".to_string(), 2),
                (StartElement, "z".to_string(), 2),
                (EndElement, "z".to_string(), 2),
                (EndElement, "r".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_flattening_end_after_collected_text() {
        let mut t = tree("<r><p>a<b>c</b></p><q/></r>");
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let flat = t.descendant_element_cursor(root).unwrap();
        assert_eq!(t.advance(flat).unwrap(), Some(EventKind::StartElement));
        assert_eq!(t.collect_descendant_text(flat, false).unwrap(), "ac");
        assert_eq!(t.advance(flat).unwrap(), Some(EventKind::EndElement));
        assert_eq!(t.local_name(flat).unwrap(), "p");
        assert_eq!(t.node_count(flat).unwrap(), 2);
        assert_eq!(t.advance(flat).unwrap(), Some(EventKind::StartElement));
        assert_eq!(t.local_name(flat).unwrap(), "q");
    }

    #[test]
    fn test_filter_is_transparent() {
        let mut t = tree("<r><!-- c -->a<x/>b</r>");
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let text = t.child_cursor(root, Some(Filter::text())).unwrap();
        assert_eq!(
            drain(&mut t, text),
            vec![(EventKind::Characters, "a".into()), (EventKind::Characters, "b".into())]
        );
        assert_eq!(t.node_count(text).unwrap(), 2);
        assert_eq!(t.element_count(text).unwrap(), 0);
    }

    #[test]
    fn test_current_text_requires_text() {
        let mut t = tree("<r/>");
        let root = t.root_cursor(None).unwrap();
        t.advance(root).unwrap();
        assert!(matches!(t.current_text(root), Err(XmlError::NotTextPositioned(_))));
    }

    #[test]
    fn test_collect_descendant_text() {
        let mut t = tree("<r><p>Hello <b>big</b> world<![CDATA[!]]></p><q/></r>");
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let kids = t.child_element_cursor(root).unwrap();
        t.advance(kids).unwrap();
        assert_eq!(t.collect_descendant_text(kids, true).unwrap(), "Hello big world!");
        assert!(t.local_name(kids).unwrap_err().is_misuse());
        assert_eq!(t.advance(kids).unwrap(), Some(EventKind::StartElement));
        assert_eq!(t.local_name(kids).unwrap(), "q");
    }

    #[test]
    fn test_single_root_cursor() {
        let mut t = tree("<r/>");
        t.root_cursor(None).unwrap();
        assert!(t.root_flattening_cursor(None).unwrap_err().is_misuse());
    }

    #[test]
    fn test_tracking_inherited_by_children() {
        let mut t = tree("<r><a/><b/><c/></r>");
        let root = t.root_element_cursor().unwrap();
        t.set_tracking(root, Tracking::VisibleSiblings).unwrap();
        t.advance(root).unwrap();
        let kids = t.child_element_cursor(root).unwrap();
        assert_eq!(t.tracking(kids).unwrap(), Tracking::VisibleSiblings);
        assert_eq!(t.parent_tracked_element(kids).unwrap().unwrap().local_name(), "r");

        while t.advance(kids).unwrap().is_some() {}
        let last = t.tracked_element(kids).unwrap().unwrap();
        assert_eq!(last.local_name(), "c");
        assert_eq!(last.previous_sibling().unwrap().local_name(), "b");
        assert_eq!(last.parent().unwrap().local_name(), "r");
        assert_eq!(last.element_index(), 3);
        assert_eq!(last.path(), "/r/c");
    }

    #[test]
    fn test_structural_error_on_unclosed_scope() {
        let mut t = tree("<r><a>");
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let kids = t.child_cursor(root, None).unwrap();
        t.advance(kids).unwrap();
        assert!(matches!(t.advance(kids), Err(XmlError::Malformed { .. })));
        assert!(matches!(t.advance(root), Err(XmlError::Aborted)));
    }

    #[test]
    fn test_stale_handle_reuse() {
        let mut t = tree("<r><a/><b/></r>");
        let root = t.root_element_cursor().unwrap();
        t.advance(root).unwrap();
        let first = t.child_cursor(root, None).unwrap();
        t.advance(root).unwrap();
        // The freed slot may be reused, but the old handle stays dead
        let (index, generation) = first.to_raw();
        let stale = CursorId::from_raw(index, generation);
        assert_eq!(t.advance(stale).unwrap(), None);
        assert!(t.depth(stale).unwrap_err().is_misuse());
        assert_eq!(t.live_cursors(), 1);
    }
}
