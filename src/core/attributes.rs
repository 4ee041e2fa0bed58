//! XML Attribute Collection
//!
//! Collects the attributes of one start tag as the tokenizer scans them,
//! then resolves their namespaces and builds a by-name lookup index.
//!
//! All values share a single byte buffer delimited by start offsets, and
//! every buffer survives `begin_element()` with its capacity intact, so a
//! steady-state document allocates nothing per tag.
//!
//! Small attribute sets (up to `LINEAR_SCAN_MAX`) are searched linearly.
//! Larger sets get an index living in one `Vec<u32>`:
//!
//! ```text
//! [ primary slots: index + 1, 0 = empty | spill: (hash, index) pairs ... ]
//! ```
//!
//! The primary region is a power of two kept at most 80% full. A
//! colliding entry goes to the spill region, which grows by a fixed
//! increment when exhausted.

use super::namespace::NamespaceContext;
use crate::error::{Result, XmlError};
use crate::reader::events::{Location, QName};
use std::sync::Arc;

/// Attribute sets up to this size skip the hash index
pub const LINEAR_SCAN_MAX: usize = 3;

/// Smallest primary region
const MIN_PRIMARY_SLOTS: usize = 4;

/// Spill region growth, in (hash, index) pairs
const SPILL_INCREMENT: usize = 8;

/// One resolved attribute
#[derive(Debug, Clone, Copy)]
pub struct AttributeRef<'a> {
    pub name: &'a QName,
    pub value: &'a str,
}

/// Receives the (possibly segmented) value of one attribute
pub struct ValueSink<'a> {
    buf: &'a mut Vec<u8>,
}

impl ValueSink<'_> {
    #[inline]
    pub fn push(&mut self, b: u8) {
        self.buf.push(b);
    }

    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn push_str(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn push_char(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }
}

/// Namespace declaration (`xmlns` / `xmlns:p`) found on a start tag
#[derive(Debug, Clone, Copy)]
pub struct NamespaceDeclaration<'a> {
    /// None for the default namespace
    pub prefix: Option<&'a str>,
    pub uri: &'a str,
}

/// Reusable per-tag attribute collector
#[derive(Debug, Default)]
pub struct AttributeCollector {
    names: Vec<QName>,
    /// Start offset of each value in `values`
    value_starts: Vec<usize>,
    /// Raw value bytes while collecting
    values: Vec<u8>,
    /// Validated value text once resolved
    text: String,

    ns_prefixes: Vec<Option<Arc<str>>>,
    ns_starts: Vec<usize>,
    ns_values: Vec<u8>,

    /// Hash index: primary slots followed by spill pairs
    index: Vec<u32>,
    primary: usize,
    spill_len: usize,
    resolved: bool,
}

impl AttributeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new start tag, keeping allocated capacity
    pub fn begin_element(&mut self) {
        self.names.clear();
        self.value_starts.clear();
        if self.text.capacity() > self.values.capacity() {
            self.values = std::mem::take(&mut self.text).into_bytes();
        }
        self.text.clear();
        self.values.clear();
        self.ns_prefixes.clear();
        self.ns_starts.clear();
        self.ns_values.clear();
        self.primary = 0;
        self.spill_len = 0;
        self.resolved = false;
    }

    /// Register an attribute and return the sink for its value
    pub fn add_raw(&mut self, prefix: Option<Arc<str>>, local: Arc<str>) -> ValueSink<'_> {
        debug_assert!(!self.resolved, "add_raw after resolve");
        self.names.push(QName::new(prefix, local));
        self.value_starts.push(self.values.len());
        ValueSink { buf: &mut self.values }
    }

    /// Register a namespace declaration; `None` declares the default
    pub fn add_namespace_declaration(&mut self, prefix: Option<Arc<str>>) -> ValueSink<'_> {
        self.ns_prefixes.push(prefix);
        self.ns_starts.push(self.ns_values.len());
        ValueSink { buf: &mut self.ns_values }
    }

    /// Number of attributes (namespace declarations excluded)
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn namespace_declaration_count(&self) -> usize {
        self.ns_prefixes.len()
    }

    /// Namespace declaration `i`, available before `resolve()`
    pub fn namespace_declaration(&self, i: usize) -> Result<Option<NamespaceDeclaration<'_>>> {
        let Some(prefix) = self.ns_prefixes.get(i) else {
            return Ok(None);
        };
        let end = self.ns_starts.get(i + 1).copied().unwrap_or(self.ns_values.len());
        let uri = std::str::from_utf8(&self.ns_values[self.ns_starts[i]..end])
            .map_err(|_| XmlError::malformed("invalid UTF-8 in namespace declaration", Location::UNKNOWN))?;
        Ok(Some(NamespaceDeclaration {
            prefix: prefix.as_deref(),
            uri,
        }))
    }

    /// Resolve attribute namespaces against `namespaces` and build the
    /// lookup index. Unprefixed attributes are in no namespace.
    pub fn resolve(&mut self, namespaces: &NamespaceContext) -> Result<()> {
        if self.resolved {
            return Ok(());
        }
        self.check_declaration_duplicates()?;

        for name in &mut self.names {
            name.namespace = match &name.prefix {
                Some(prefix) => Some(Arc::clone(namespaces.resolve_prefix(prefix).ok_or_else(|| {
                    XmlError::UndeclaredPrefix {
                        prefix: prefix.to_string(),
                        location: Location::UNKNOWN,
                    }
                })?)),
                None => None,
            };
        }

        for i in 0..self.names.len() {
            let (start, end) = self.value_bounds(i);
            if std::str::from_utf8(&self.values[start..end]).is_err() {
                return Err(XmlError::malformed(
                    format!("invalid UTF-8 in value of attribute '{}'", self.names[i]),
                    Location::UNKNOWN,
                ));
            }
        }
        // Every value is valid on its own, so the whole buffer is too
        self.text = String::from_utf8(std::mem::take(&mut self.values))
            .map_err(|_| XmlError::malformed("invalid UTF-8 in attribute values", Location::UNKNOWN))?;

        if self.names.len() <= LINEAR_SCAN_MAX {
            for i in 1..self.names.len() {
                if let Some(j) = self.names[..i].iter().position(|n| Self::same_key(n, &self.names[i])) {
                    return Err(self.duplicate(j, i));
                }
            }
        } else {
            self.build_index()?;
        }

        self.resolved = true;
        Ok(())
    }

    fn check_declaration_duplicates(&self) -> Result<()> {
        for i in 1..self.ns_prefixes.len() {
            if self.ns_prefixes[..i].contains(&self.ns_prefixes[i]) {
                let name = match &self.ns_prefixes[i] {
                    Some(p) => format!("xmlns:{}", p),
                    None => "xmlns".to_string(),
                };
                return Err(XmlError::DuplicateAttribute {
                    name,
                    location: Location::UNKNOWN,
                });
            }
        }
        Ok(())
    }

    fn duplicate(&self, first: usize, second: usize) -> XmlError {
        log::trace!(
            target: "rustystax::attributes",
            "attribute {} repeats attribute {} ('{}')",
            second,
            first,
            self.names[second]
        );
        XmlError::DuplicateAttribute {
            name: self.names[second].to_string(),
            location: Location::UNKNOWN,
        }
    }

    #[inline]
    fn same_key(a: &QName, b: &QName) -> bool {
        a.local == b.local && a.namespace == b.namespace
    }

    #[inline]
    fn value_bounds(&self, i: usize) -> (usize, usize) {
        let end = self.value_starts.get(i + 1).copied().unwrap_or(self.value_len());
        (self.value_starts[i], end)
    }

    /// Values sit in `values` while collecting and in `text` once
    /// resolved; the other buffer is empty.
    #[inline]
    fn value_len(&self) -> usize {
        self.values.len() + self.text.len()
    }

    fn build_index(&mut self) -> Result<()> {
        let n = self.names.len();
        let mut primary = MIN_PRIMARY_SLOTS;
        // Load factor <= 80%
        while n * 5 > primary * 4 {
            primary <<= 1;
        }
        self.primary = primary;
        self.spill_len = 0;
        self.index.clear();
        self.index.resize(primary + 2 * SPILL_INCREMENT, 0);

        let mask = primary - 1;
        for i in 0..n {
            let hash = hash_key(self.names[i].namespace.as_deref(), &self.names[i].local);
            let slot = hash as usize & mask;
            let occupant = self.index[slot];
            if occupant == 0 {
                self.index[slot] = i as u32 + 1;
                continue;
            }

            let occupant = occupant as usize - 1;
            if Self::same_key(&self.names[occupant], &self.names[i]) {
                return Err(self.duplicate(occupant, i));
            }
            if let Some(j) = self.spill_find(hash, self.names[i].namespace.as_deref(), &self.names[i].local) {
                return Err(self.duplicate(j, i));
            }

            let at = primary + 2 * self.spill_len;
            if at + 2 > self.index.len() {
                self.index.resize(self.index.len() + 2 * SPILL_INCREMENT, 0);
            }
            self.index[at] = hash;
            self.index[at + 1] = i as u32;
            self.spill_len += 1;
        }
        Ok(())
    }

    fn spill_find(&self, hash: u32, namespace: Option<&str>, local: &str) -> Option<usize> {
        let spill = &self.index[self.primary..self.primary + 2 * self.spill_len];
        spill
            .chunks_exact(2)
            .filter(|pair| pair[0] == hash)
            .map(|pair| pair[1] as usize)
            .find(|&i| self.names[i].matches(namespace, local))
    }

    /// Index of the attribute with the given namespace and local name
    pub fn find_index(&self, namespace: Option<&str>, local: &str) -> Result<Option<usize>> {
        if !self.resolved {
            return Err(XmlError::NotResolved);
        }
        if self.names.len() <= LINEAR_SCAN_MAX {
            return Ok(self.names.iter().position(|n| n.matches(namespace, local)));
        }

        let hash = hash_key(namespace, local);
        let slot = self.index[hash as usize & (self.primary - 1)];
        if slot != 0 && self.names[slot as usize - 1].matches(namespace, local) {
            return Ok(Some(slot as usize - 1));
        }
        Ok(self.spill_find(hash, namespace, local))
    }

    /// Attribute at `index` in document order
    pub fn get(&self, index: usize) -> Result<Option<AttributeRef<'_>>> {
        if !self.resolved {
            return Err(XmlError::NotResolved);
        }
        if index >= self.names.len() {
            return Ok(None);
        }
        let (start, end) = self.value_bounds(index);
        Ok(Some(AttributeRef {
            name: &self.names[index],
            value: &self.text[start..end],
        }))
    }

    /// Value of the attribute with the given namespace and local name
    pub fn get_by_name(&self, namespace: Option<&str>, local: &str) -> Result<Option<&str>> {
        match self.find_index(namespace, local)? {
            Some(i) => Ok(self.get(i)?.map(|a| a.value)),
            None => Ok(None),
        }
    }

    /// Value of the attribute with the given raw name (`prefix:local`)
    pub fn get_by_qname(&self, qname: &str) -> Result<Option<&str>> {
        if !self.resolved {
            return Err(XmlError::NotResolved);
        }
        let found = self.names.iter().position(|n| match (&n.prefix, qname.split_once(':')) {
            (Some(p), Some((qp, ql))) => &**p == qp && &*n.local == ql,
            (None, None) => &*n.local == qname,
            (None, Some(_)) => &*n.local == qname,
            (Some(_), None) => false,
        });
        match found {
            Some(i) => Ok(self.get(i)?.map(|a| a.value)),
            None => Ok(None),
        }
    }

    /// Attributes in document order
    pub fn iter(&self) -> Result<impl Iterator<Item = AttributeRef<'_>> + '_> {
        if !self.resolved {
            return Err(XmlError::NotResolved);
        }
        Ok((0..self.names.len()).map(move |i| {
            let (start, end) = self.value_bounds(i);
            AttributeRef {
                name: &self.names[i],
                value: &self.text[start..end],
            }
        }))
    }
}

/// FNV-1a over the local name and namespace URI
#[inline]
fn hash_key(namespace: Option<&str>, local: &str) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET;
    for &b in local.as_bytes() {
        hash = (hash ^ b as u32).wrapping_mul(PRIME);
    }
    if let Some(uri) = namespace {
        // Separator keeps ("ab", "c") and ("a", "bc") apart
        hash = (hash ^ 0xff).wrapping_mul(PRIME);
        for &b in uri.as_bytes() {
            hash = (hash ^ b as u32).wrapping_mul(PRIME);
        }
    }
    hash
}
