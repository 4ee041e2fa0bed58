//! Namespace Resolution
//!
//! Stack-based namespace context for XML namespace handling. The
//! predefined `xml` and `xmlns` bindings (and the empty default) are
//! constants consulted before any scope; application bindings declared
//! permanent can never be rebound.

use crate::error::{Result, XmlError};
use crate::reader::events::Location;
use std::collections::HashSet;
use std::sync::Arc;

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
}

/// Namespace binding (prefix -> URI). An empty prefix is the default
/// namespace; an empty URI unbinds the default namespace.
#[derive(Debug, Clone)]
struct NsBinding {
    prefix: Arc<str>,
    uri: Arc<str>,
    depth: u32,
}

/// Stack-based namespace context
#[derive(Debug)]
pub struct NamespaceContext {
    /// Stack of namespace bindings
    bindings: Vec<NsBinding>,
    /// Bindings that may never be rebound
    permanent: Vec<(Arc<str>, Arc<str>)>,
    /// Current element depth
    depth: u32,
    xml_uri: Arc<str>,
    xmlns_uri: Arc<str>,
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceContext {
    pub fn new() -> Self {
        NamespaceContext {
            bindings: Vec::with_capacity(16),
            permanent: Vec::new(),
            depth: 0,
            xml_uri: Arc::from(ns::XML),
            xmlns_uri: Arc::from(ns::XMLNS),
        }
    }

    /// Enter a new element scope
    pub fn push_scope(&mut self) {
        self.depth += 1;
    }

    /// Leave an element scope, removing any bindings declared in it
    pub fn pop_scope(&mut self) {
        while let Some(binding) = self.bindings.last() {
            if binding.depth < self.depth {
                break;
            }
            self.bindings.pop();
        }
        self.depth = self.depth.saturating_sub(1);
    }

    /// Declare a binding in the current scope. An empty prefix declares
    /// the default namespace; an empty URI for it removes the default.
    pub fn declare(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if Self::check_binding(prefix, uri)? {
            return Ok(());
        }
        if let Some((_, bound)) = self.permanent.iter().find(|(p, _)| &**p == prefix) {
            if &**bound != uri {
                return Err(XmlError::PermanentBinding {
                    prefix: prefix.to_string(),
                    uri: bound.to_string(),
                });
            }
        }

        let depth = self.depth;
        // Last declaration wins within one scope
        if let Some(existing) = self
            .bindings
            .iter_mut()
            .rev()
            .take_while(|b| b.depth == depth)
            .find(|b| &*b.prefix == prefix)
        {
            existing.uri = Arc::from(uri);
            return Ok(());
        }

        self.bindings.push(NsBinding {
            prefix: Arc::from(prefix),
            uri: Arc::from(uri),
            depth,
        });
        Ok(())
    }

    /// Declare a global binding that no scope may rebind to another URI
    pub fn declare_permanent(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if Self::check_binding(prefix, uri)? {
            return Ok(());
        }
        if uri.is_empty() {
            return Err(XmlError::malformed(
                "permanent binding requires a namespace URI",
                Location::UNKNOWN,
            ));
        }
        match self.permanent.iter().find(|(p, _)| &**p == prefix) {
            Some((_, bound)) if &**bound == uri => Ok(()),
            Some((_, bound)) => Err(XmlError::PermanentBinding {
                prefix: prefix.to_string(),
                uri: bound.to_string(),
            }),
            None => {
                self.permanent.push((Arc::from(prefix), Arc::from(uri)));
                Ok(())
            }
        }
    }

    /// Reject bindings forbidden by Namespaces in XML. Returns true for
    /// the redundant (but legal) `xml` self-binding.
    fn check_binding(prefix: &str, uri: &str) -> Result<bool> {
        let message = match (prefix, uri) {
            ("xml", ns::XML) => return Ok(true),
            ("xml", _) => "prefix 'xml' cannot be bound to a different namespace",
            ("xmlns", _) => "prefix 'xmlns' cannot be declared",
            (_, ns::XML) | (_, ns::XMLNS) => "reserved namespace URI cannot be bound",
            (p, "") if !p.is_empty() => "prefixed namespace declaration cannot be empty",
            _ => return Ok(false),
        };
        Err(XmlError::malformed(message, Location::UNKNOWN))
    }

    /// Resolve a prefix to a namespace URI. The empty prefix resolves
    /// the default namespace.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&Arc<str>> {
        match prefix {
            "" => return self.resolve_default(),
            "xml" => return Some(&self.xml_uri),
            "xmlns" => return Some(&self.xmlns_uri),
            _ => {}
        }
        self.lookup(prefix)
    }

    /// Resolve the default namespace
    pub fn resolve_default(&self) -> Option<&Arc<str>> {
        self.lookup("").filter(|uri| !uri.is_empty())
    }

    fn lookup(&self, prefix: &str) -> Option<&Arc<str>> {
        // Search from most recent to oldest
        self.bindings
            .iter()
            .rev()
            .find(|b| &*b.prefix == prefix)
            .map(|b| &b.uri)
            .or_else(|| self.permanent.iter().find(|(p, _)| &**p == prefix).map(|(_, u)| u))
    }

    /// Find a prefix currently bound to `uri`. Bindings shadowed by an
    /// inner declaration of the same prefix are skipped. `""` denotes
    /// the default namespace.
    pub fn resolve_uri(&self, uri: &str) -> Option<&str> {
        match uri {
            "" => return None,
            ns::XML => return Some("xml"),
            ns::XMLNS => return Some("xmlns"),
            _ => {}
        }
        let scoped = self.bindings.iter().rev().map(|b| (&b.prefix, &b.uri));
        let permanent = self.permanent.iter().map(|(p, u)| (p, u));
        scoped
            .chain(permanent)
            .filter(|(_, bound)| &***bound == uri)
            .find(|(prefix, bound)| self.resolve_prefix(prefix).is_some_and(|active| Arc::ptr_eq(active, bound)))
            .map(|(prefix, _)| &**prefix)
    }

    /// All bindings visible at the current scope, innermost first. An
    /// unbound default namespace is omitted.
    pub fn active_bindings(&self) -> Vec<(Arc<str>, Arc<str>)> {
        let mut seen_prefixes = HashSet::new();
        self.bindings
            .iter()
            .rev()
            .map(|b| (&b.prefix, &b.uri))
            .chain(self.permanent.iter().map(|(p, u)| (p, u)))
            .filter(|(prefix, _)| seen_prefixes.insert(Arc::clone(prefix)))
            .filter(|(_, uri)| !uri.is_empty())
            .map(|(p, u)| (Arc::clone(p), Arc::clone(u)))
            .collect()
    }

    /// Bindings declared by the innermost scope, in declaration order
    pub fn current_declarations(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        let depth = self.depth;
        let first = self
            .bindings
            .iter()
            .rposition(|b| b.depth < depth)
            .map_or(0, |i| i + 1);
        self.bindings[first..].iter().map(|b| (&*b.prefix, &*b.uri))
    }

    /// Get current depth
    pub fn depth(&self) -> u32 {
        self.depth
    }
}
