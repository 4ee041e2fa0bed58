//! Element Tracking
//!
//! Optional snapshots of visited elements. A snapshot links back to its
//! parent and, depending on granularity, to its previous sibling; links
//! only ever point backwards in document order, so what stays alive is
//! the ancestor chain plus the sibling chains hanging off it.

use crate::reader::events::QName;
use std::sync::Arc;

/// How much element history a cursor records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tracking {
    /// No snapshots
    #[default]
    None,
    /// Snapshots of surfaced elements with parent links only
    Parents,
    /// Parent links plus links to the previous surfaced sibling
    VisibleSiblings,
    /// Like `VisibleSiblings`, but elements rejected by the filter are
    /// recorded (and linked) too
    AllSiblings,
}

/// Immutable snapshot of one element
#[derive(Debug)]
pub struct TrackedElement {
    name: QName,
    node_index: u64,
    element_index: u64,
    depth: u32,
    parent: Option<Arc<TrackedElement>>,
    previous_sibling: Option<Arc<TrackedElement>>,
}

impl TrackedElement {
    pub fn qname(&self) -> &QName {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        self.name.local_name()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.prefix()
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        self.name.namespace_uri()
    }

    /// Position among the nodes surfaced by the tracking cursor (1-based)
    pub fn node_index(&self) -> u64 {
        self.node_index
    }

    /// Position among the elements surfaced by the tracking cursor (1-based)
    pub fn element_index(&self) -> u64 {
        self.element_index
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent(&self) -> Option<&Arc<TrackedElement>> {
        self.parent.as_ref()
    }

    pub fn previous_sibling(&self) -> Option<&Arc<TrackedElement>> {
        self.previous_sibling.as_ref()
    }

    /// Parent, grandparent, ... up to the outermost tracked ancestor
    pub fn ancestors(&self) -> impl Iterator<Item = &Arc<TrackedElement>> {
        std::iter::successors(self.parent.as_ref(), |p| p.parent.as_ref())
    }

    /// `/a/b/c` style path of local names through the tracked ancestors
    pub fn path(&self) -> String {
        let mut names: Vec<&str> = self.ancestors().map(|a| a.local_name()).collect();
        names.reverse();
        names.push(self.local_name());
        let mut out = String::new();
        for name in names {
            out.push('/');
            out.push_str(name);
        }
        out
    }
}

/// Per-cursor tracking state
#[derive(Debug, Clone, Default)]
pub(crate) struct Tracker {
    mode: Tracking,
    /// Snapshot of the element whose scope the cursor covers
    inherited: Option<Arc<TrackedElement>>,
    /// Open elements by nesting level (None where not tracked)
    open: Vec<Option<Arc<TrackedElement>>>,
    /// Last tracked element per nesting level
    last_sibling: Vec<Option<Arc<TrackedElement>>>,
    last: Option<Arc<TrackedElement>>,
}

/// Data for a new snapshot
pub(crate) struct StartInfo<'a> {
    pub name: &'a QName,
    pub nesting: usize,
    pub visible: bool,
    pub node_index: u64,
    pub element_index: u64,
    pub depth: u32,
}

impl Tracker {
    pub fn new(mode: Tracking, inherited: Option<Arc<TrackedElement>>) -> Self {
        Tracker {
            mode,
            inherited,
            ..Tracker::default()
        }
    }

    pub fn mode(&self) -> Tracking {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Tracking) {
        self.mode = mode;
    }

    pub fn inherited(&self) -> Option<&Arc<TrackedElement>> {
        self.inherited.as_ref()
    }

    /// Most recent snapshot taken by this cursor
    pub fn last(&self) -> Option<&Arc<TrackedElement>> {
        self.last.as_ref()
    }

    /// Record a StartElement read by the cursor (surfaced or not)
    pub fn on_start(&mut self, info: StartInfo<'_>) {
        let track = match self.mode {
            Tracking::None => false,
            Tracking::Parents | Tracking::VisibleSiblings => info.visible,
            Tracking::AllSiblings => true,
        };
        let level = info.nesting;
        self.open.truncate(level);
        self.last_sibling.truncate(level + 1);
        if !track {
            self.open.push(None);
            return;
        }

        let parent = self
            .open
            .iter()
            .rev()
            .flatten()
            .next()
            .or(self.inherited.as_ref())
            .cloned();
        let previous_sibling = match self.mode {
            Tracking::Parents => None,
            _ => self.last_sibling.get(level).cloned().flatten(),
        };

        let snapshot = Arc::new(TrackedElement {
            name: info.name.clone(),
            node_index: info.node_index,
            element_index: info.element_index,
            depth: info.depth,
            parent,
            previous_sibling,
        });
        self.open.push(Some(Arc::clone(&snapshot)));
        self.last_sibling.resize(level + 1, None);
        self.last_sibling[level] = Some(Arc::clone(&snapshot));
        self.last = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(local: &str) -> QName {
        QName::new(None, Arc::from(local))
    }

    fn start(tracker: &mut Tracker, local: &str, nesting: usize, visible: bool) {
        let name = name(local);
        tracker.on_start(StartInfo {
            name: &name,
            nesting,
            visible,
            node_index: 0,
            element_index: 0,
            depth: nesting as u32 + 1,
        });
    }

    #[test]
    fn test_none_records_nothing() {
        let mut t = Tracker::new(Tracking::None, None);
        start(&mut t, "a", 0, true);
        assert!(t.last().is_none());
    }

    #[test]
    fn test_parent_links() {
        let mut t = Tracker::new(Tracking::Parents, None);
        start(&mut t, "a", 0, true);
        start(&mut t, "b", 1, true);
        start(&mut t, "c", 2, true);
        let c = t.last().unwrap();
        assert_eq!(c.path(), "/a/b/c");
        assert!(c.previous_sibling().is_none());
    }

    #[test]
    fn test_visible_siblings_skip_filtered() {
        let mut t = Tracker::new(Tracking::VisibleSiblings, None);
        start(&mut t, "a", 0, true);
        start(&mut t, "hidden", 0, false);
        start(&mut t, "b", 0, true);
        let b = t.last().unwrap();
        assert_eq!(b.previous_sibling().unwrap().local_name(), "a");
    }

    #[test]
    fn test_all_siblings_include_filtered() {
        let mut t = Tracker::new(Tracking::AllSiblings, None);
        start(&mut t, "a", 0, true);
        start(&mut t, "hidden", 0, false);
        start(&mut t, "b", 0, true);
        let b = t.last().unwrap();
        assert_eq!(b.previous_sibling().unwrap().local_name(), "hidden");
    }

    #[test]
    fn test_untracked_parent_is_not_linked() {
        let mut t = Tracker::new(Tracking::VisibleSiblings, None);
        start(&mut t, "a", 0, true);
        start(&mut t, "hidden", 0, false);
        start(&mut t, "child", 1, true);
        let child = t.last().unwrap();
        // "a" is a sibling of the untracked parent, never an ancestor
        assert!(child.parent().is_none());
        assert!(child.previous_sibling().is_none());
    }

    #[test]
    fn test_inherited_parent() {
        let mut outer = Tracker::new(Tracking::Parents, None);
        start(&mut outer, "root", 0, true);
        let mut inner = Tracker::new(Tracking::Parents, outer.last().cloned());
        start(&mut inner, "item", 0, true);
        assert_eq!(inner.last().unwrap().path(), "/root/item");
        assert_eq!(inner.inherited().unwrap().local_name(), "root");
    }

    #[test]
    fn test_deeper_siblings_reset_on_new_parent() {
        let mut t = Tracker::new(Tracking::VisibleSiblings, None);
        start(&mut t, "p1", 0, true);
        start(&mut t, "c1", 1, true);
        start(&mut t, "p2", 0, true);
        start(&mut t, "c2", 1, true);
        let c2 = t.last().unwrap();
        assert!(c2.previous_sibling().is_none());
        assert_eq!(c2.parent().unwrap().local_name(), "p2");
    }
}
