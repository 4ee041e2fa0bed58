//! Stream Reader
//!
//! Pull parser over the tokenizer. Adds what a token stream alone does
//! not know: the element stack (tag matching, single root, prolog and
//! epilog rules), namespace scopes, attribute resolution and the
//! synthetic end event of `<empty/>` elements.
//!
//! The reader starts positioned on `StartDocument`. Each `next()`
//! overwrites the current event; payload accessors borrow the reader's
//! buffers and are valid until the following `next()`.

use crate::config::ReaderConfig;
use crate::core::attributes::{AttributeCollector, AttributeRef, NamespaceDeclaration};
use crate::core::entities::{EntityDeclaration, EntityRegistry};
use crate::core::namespace::NamespaceContext;
use crate::core::tokenizer::{TokenKind, Tokenizer};
use crate::error::{Result, XmlError};
use crate::reader::buffered::ByteSource;
use crate::reader::events::{DoctypeInfo, EventKind, Location, QName, XmlDeclaration};
use std::sync::Arc;

/// Streaming pull reader producing one event per `next()`
pub struct StreamReader {
    tokenizer: Tokenizer,
    attrs: AttributeCollector,
    namespaces: NamespaceContext,
    namespace_aware: bool,

    /// Resolved names of the open elements
    elements: Vec<QName>,
    kind: EventKind,
    name: Option<QName>,
    location: Location,

    /// `<empty/>` was reported as StartElement; EndElement comes next
    pending_end: bool,
    /// Current event is an EndElement whose scope is popped on the next advance
    pending_pop: bool,
    seen_root: bool,
    root_closed: bool,
    seen_doctype: bool,
    failed: bool,
}

impl StreamReader {
    pub fn new(source: Box<dyn ByteSource + Send>, config: ReaderConfig) -> Self {
        StreamReader {
            tokenizer: Tokenizer::new(source, &config),
            attrs: AttributeCollector::new(),
            namespaces: NamespaceContext::new(),
            namespace_aware: config.namespace_aware,
            elements: Vec::new(),
            kind: EventKind::StartDocument,
            name: None,
            location: Location::new(1, 1, 0),
            pending_end: false,
            pending_pop: false,
            seen_root: false,
            root_closed: false,
            seen_doctype: false,
            failed: false,
        }
    }

    /// Advance to the next event and return its kind.
    ///
    /// After `EndDocument` further calls keep returning `EndDocument`.
    /// After an error every call fails with `Aborted`.
    pub fn next(&mut self) -> Result<EventKind> {
        if self.failed {
            return Err(XmlError::Aborted);
        }
        if self.kind == EventKind::EndDocument {
            return Ok(EventKind::EndDocument);
        }
        match self.advance() {
            Ok(kind) => {
                self.kind = kind;
                log::trace!(target: "rustystax::reader", "{:?} at {} depth {}", kind, self.location, self.depth());
                Ok(kind)
            }
            Err(e) => {
                self.failed = true;
                log::debug!(target: "rustystax::reader", "parse aborted: {}", e);
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<EventKind> {
        if self.pending_pop {
            self.pending_pop = false;
            self.elements.pop();
            self.namespaces.pop_scope();
            if self.elements.is_empty() {
                self.root_closed = true;
            }
        }

        if self.pending_end {
            self.pending_end = false;
            self.pending_pop = true;
            return Ok(EventKind::EndElement);
        }

        self.name = None;
        loop {
            let token = self.tokenizer.next_token(&mut self.attrs)?;
            self.location = self.tokenizer.location();
            let kind = match token {
                TokenKind::StartTag | TokenKind::EmptyTag => {
                    self.start_element()?;
                    self.pending_end = token == TokenKind::EmptyTag;
                    EventKind::StartElement
                }
                TokenKind::EndTag => {
                    self.end_element()?;
                    EventKind::EndElement
                }
                TokenKind::Text => {
                    let whitespace = self.tokenizer.is_whitespace();
                    if self.elements.is_empty() {
                        if !whitespace {
                            return Err(self.malformed(if self.root_closed {
                                "text after the root element"
                            } else {
                                "text before the root element"
                            }));
                        }
                        EventKind::Space
                    } else if whitespace {
                        EventKind::Space
                    } else {
                        EventKind::Characters
                    }
                }
                TokenKind::CData => {
                    self.require_open_element("CDATA section")?;
                    EventKind::CData
                }
                TokenKind::EntityReference => {
                    self.require_open_element("entity reference")?;
                    EventKind::EntityReference
                }
                TokenKind::Comment => EventKind::Comment,
                TokenKind::ProcessingInstruction => EventKind::ProcessingInstruction,
                // Available through xml_declaration(); not an event of its own
                TokenKind::XmlDeclaration => continue,
                TokenKind::DocType => {
                    if self.seen_root {
                        return Err(self.malformed("DOCTYPE declaration after the root element"));
                    }
                    if self.seen_doctype {
                        return Err(self.malformed("more than one DOCTYPE declaration"));
                    }
                    self.seen_doctype = true;
                    EventKind::Dtd
                }
                TokenKind::Eof => {
                    if let Some(open) = self.elements.last() {
                        return Err(XmlError::malformed(
                            format!("unexpected end of input: element <{}> is not closed", open),
                            self.tokenizer.position(),
                        ));
                    }
                    if !self.seen_root {
                        return Err(self.malformed("document has no root element"));
                    }
                    EventKind::EndDocument
                }
            };
            return Ok(kind);
        }
    }

    fn malformed(&self, message: &'static str) -> XmlError {
        XmlError::malformed(message, self.location)
    }

    fn require_open_element(&self, what: &str) -> Result<()> {
        if self.elements.is_empty() {
            return Err(XmlError::malformed(format!("{} outside the root element", what), self.location));
        }
        Ok(())
    }

    fn start_element(&mut self) -> Result<()> {
        if self.root_closed {
            return Err(self.malformed("document has more than one root element"));
        }
        self.seen_root = true;
        let location = self.location;

        self.namespaces.push_scope();
        // Scope is pushed before anything can fail so that element and
        // scope stacks stay aligned for the error path too.
        let Some(raw) = self.tokenizer.name().cloned() else {
            return Err(XmlError::Structural("start tag without a name".to_string()));
        };
        let mut name = raw;
        self.elements.push(name.clone());

        if self.namespace_aware {
            for i in 0..self.attrs.namespace_declaration_count() {
                if let Some(NamespaceDeclaration { prefix, uri }) = self.attrs.namespace_declaration(i)? {
                    self.namespaces
                        .declare(prefix.unwrap_or(""), uri)
                        .map_err(|e| e.at(location))?;
                }
            }
            name.namespace = match name.prefix.as_deref() {
                Some("xmlns") => {
                    return Err(XmlError::malformed("element name cannot use the 'xmlns' prefix", location))
                }
                Some(prefix) => match self.namespaces.resolve_prefix(prefix) {
                    Some(uri) => Some(Arc::clone(uri)),
                    None => {
                        return Err(XmlError::UndeclaredPrefix {
                            prefix: prefix.to_string(),
                            location,
                        })
                    }
                },
                None => self.namespaces.resolve_default().cloned(),
            };
        }
        self.attrs.resolve(&self.namespaces).map_err(|e| e.at(location))?;

        if let Some(top) = self.elements.last_mut() {
            *top = name.clone();
        }
        self.name = Some(name);
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        let Some(raw) = self.tokenizer.name() else {
            return Err(XmlError::Structural("end tag without a name".to_string()));
        };
        let Some(open) = self.elements.last() else {
            return Err(XmlError::malformed(
                format!("unexpected end tag </{}> with no open element", raw),
                self.location,
            ));
        };
        if !open.same_raw_name(raw) {
            return Err(XmlError::malformed(
                format!("mismatched end tag: expected </{}>, found </{}>", open, raw),
                self.location,
            ));
        }
        self.name = Some(open.clone());
        self.pending_pop = true;
        Ok(())
    }

    /// Skip whitespace, comments, PIs and DOCTYPE up to the next start or
    /// end tag. Other content is malformed for this call.
    pub fn next_tag(&mut self) -> Result<EventKind> {
        loop {
            match self.next()? {
                kind @ (EventKind::StartElement | EventKind::EndElement) => return Ok(kind),
                EventKind::Space | EventKind::Comment | EventKind::ProcessingInstruction | EventKind::Dtd => {}
                EventKind::CData if self.tokenizer.is_whitespace() => {}
                other => {
                    let err = XmlError::malformed(
                        format!("expected start or end tag, found {:?}", other),
                        self.location,
                    );
                    self.failed = true;
                    return Err(err);
                }
            }
        }
    }

    /// From a StartElement, consume everything up to and including its
    /// matching EndElement
    pub fn skip_element(&mut self) -> Result<()> {
        if self.kind != EventKind::StartElement {
            return Err(XmlError::invalid_state(format!(
                "skip_element requires StartElement, reader is on {:?}",
                self.kind
            )));
        }
        let depth = self.depth();
        loop {
            if self.next()? == EventKind::EndElement && self.depth() == depth {
                return Ok(());
            }
        }
    }

    /// From a StartElement of a text-only element, read its text and stop
    /// on the matching EndElement. Comments and PIs are skipped; a child
    /// element is malformed for this call.
    pub fn element_text(&mut self) -> Result<String> {
        if self.kind != EventKind::StartElement {
            return Err(XmlError::invalid_state(format!(
                "element_text requires StartElement, reader is on {:?}",
                self.kind
            )));
        }
        let mut out = String::new();
        loop {
            match self.next()? {
                EventKind::Characters | EventKind::CData | EventKind::Space | EventKind::EntityReference => {
                    out.push_str(self.tokenizer.text());
                }
                EventKind::Comment | EventKind::ProcessingInstruction => {}
                EventKind::EndElement => return Ok(out),
                other => {
                    self.failed = true;
                    return Err(XmlError::malformed(
                        format!("element_text: unexpected {:?} in text-only element", other),
                        self.location,
                    ));
                }
            }
        }
    }

    #[inline]
    pub fn event_kind(&self) -> EventKind {
        self.kind
    }

    /// Location of the first byte of the current event
    #[inline]
    pub fn location(&self) -> Location {
        self.location
    }

    /// Number of open elements, including the current one on both its
    /// StartElement and EndElement
    #[inline]
    pub fn depth(&self) -> u32 {
        self.elements.len() as u32
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Name of the current StartElement or EndElement
    pub fn name(&self) -> Option<&QName> {
        match self.kind {
            EventKind::StartElement | EventKind::EndElement => self.name.as_ref(),
            _ => None,
        }
    }

    pub fn local_name(&self) -> Option<&str> {
        self.name().map(QName::local_name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name().and_then(QName::prefix)
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        self.name().and_then(QName::namespace_uri)
    }

    /// True if the current text event is whitespace only
    pub fn is_whitespace(&self) -> bool {
        self.kind == EventKind::Space
            || (matches!(self.kind, EventKind::Characters | EventKind::CData) && self.tokenizer.is_whitespace())
    }

    /// Text of the current event: character data, comment content, PI
    /// data, entity replacement text or the DTD internal subset
    pub fn text(&self) -> Result<&str> {
        match self.kind {
            EventKind::Characters
            | EventKind::CData
            | EventKind::Space
            | EventKind::Comment
            | EventKind::ProcessingInstruction
            | EventKind::EntityReference => Ok(self.tokenizer.text()),
            EventKind::Dtd => Ok(self
                .tokenizer
                .doctype()
                .and_then(|d| d.internal_subset.as_deref())
                .unwrap_or("")),
            other => Err(XmlError::NotTextPositioned(Some(other))),
        }
    }

    pub fn pi_target(&self) -> Option<&str> {
        match self.kind {
            EventKind::ProcessingInstruction => self.tokenizer.pi_target().map(|t| &**t),
            _ => None,
        }
    }

    pub fn pi_data(&self) -> Option<&str> {
        match self.kind {
            EventKind::ProcessingInstruction => Some(self.tokenizer.text()),
            _ => None,
        }
    }

    pub fn entity_name(&self) -> Option<&str> {
        match self.kind {
            EventKind::EntityReference => self.tokenizer.entity_name().map(|n| &**n),
            _ => None,
        }
    }

    /// Declaration of the current entity reference, if it was declared
    pub fn entity_declaration(&self) -> Option<&Arc<EntityDeclaration>> {
        match self.kind {
            EventKind::EntityReference => self.tokenizer.entity_declaration(),
            _ => None,
        }
    }

    /// Attributes of the current StartElement
    fn start_attributes(&self) -> Option<&AttributeCollector> {
        (self.kind == EventKind::StartElement).then_some(&self.attrs)
    }

    /// Attribute collector of the current StartElement
    pub fn attributes(&self) -> Result<&AttributeCollector> {
        self.start_attributes().ok_or_else(|| {
            XmlError::invalid_state(format!("attributes requested on {:?}", self.kind))
        })
    }

    /// Number of attributes; 0 when not on a StartElement
    pub fn attribute_count(&self) -> usize {
        self.start_attributes().map_or(0, AttributeCollector::len)
    }

    pub fn attribute(&self, index: usize) -> Result<Option<AttributeRef<'_>>> {
        self.attributes()?.get(index)
    }

    pub fn attribute_value(&self, index: usize) -> Result<Option<&str>> {
        Ok(self.attributes()?.get(index)?.map(|a| a.value))
    }

    pub fn attribute_value_by_name(&self, namespace: Option<&str>, local: &str) -> Result<Option<&str>> {
        self.attributes()?.get_by_name(namespace, local)
    }

    /// Namespace declarations made on the current StartElement
    pub fn namespace_declarations(&self) -> Result<Vec<NamespaceDeclaration<'_>>> {
        let attrs = self.attributes()?;
        let mut out = Vec::with_capacity(attrs.namespace_declaration_count());
        for i in 0..attrs.namespace_declaration_count() {
            if let Some(decl) = attrs.namespace_declaration(i)? {
                out.push(decl);
            }
        }
        Ok(out)
    }

    /// Namespace bindings in scope at the current event
    pub fn namespace_context(&self) -> &NamespaceContext {
        &self.namespaces
    }

    /// Register application-level namespace bindings that can never be
    /// rebound by the document
    pub fn declare_permanent_namespace(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.namespaces.declare_permanent(prefix, uri)
    }

    /// The `<?xml ...?>` declaration, once the reader has moved past it
    pub fn xml_declaration(&self) -> Option<&XmlDeclaration> {
        self.tokenizer.xml_declaration()
    }

    pub fn doctype(&self) -> Option<&DoctypeInfo> {
        self.tokenizer.doctype()
    }

    pub fn entities(&self) -> &EntityRegistry {
        self.tokenizer.entities()
    }

    /// Pre-register an entity. Returns false if the name is already
    /// declared (the first declaration wins).
    pub fn register_entity(&mut self, decl: EntityDeclaration) -> bool {
        self.tokenizer.entities_mut().declare(decl)
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("location", &self.location)
            .field("depth", &self.depth())
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::buffered::SliceSource;

    fn reader(input: &str) -> StreamReader {
        StreamReader::new(Box::new(SliceSource::new(input)), ReaderConfig::default())
    }

    fn events(input: &str) -> Result<Vec<(EventKind, Option<String>)>> {
        let mut r = reader(input);
        let mut out = Vec::new();
        loop {
            let kind = r.next()?;
            out.push((kind, r.local_name().map(str::to_string)));
            if kind == EventKind::EndDocument {
                return Ok(out);
            }
        }
    }

    #[test]
    fn test_event_sequence() {
        use EventKind::*;
        let evs = events("<?xml version='1.0'?><!-- c --><root><a x='1'/>text<b>t</b></root>\n").unwrap();
        let kinds: Vec<_> = evs.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                Comment, StartElement, StartElement, EndElement, Characters, StartElement, Characters, EndElement,
                EndElement, Space, EndDocument
            ]
        );
        assert_eq!(evs[2].1.as_deref(), Some("a"));
        assert_eq!(evs[3].1.as_deref(), Some("a"));
    }

    #[test]
    fn test_starts_on_start_document() {
        let r = reader("<r/>");
        assert_eq!(r.event_kind(), EventKind::StartDocument);
        assert_eq!(r.depth(), 0);
    }

    #[test]
    fn test_depth_includes_current_element() {
        let mut r = reader("<a><b/></a>");
        assert_eq!(r.next().unwrap(), EventKind::StartElement);
        assert_eq!(r.depth(), 1);
        assert_eq!(r.next().unwrap(), EventKind::StartElement);
        assert_eq!(r.depth(), 2);
        assert_eq!(r.next().unwrap(), EventKind::EndElement);
        assert_eq!(r.depth(), 2);
        assert_eq!(r.next().unwrap(), EventKind::EndElement);
        assert_eq!(r.depth(), 1);
        assert_eq!(r.next().unwrap(), EventKind::EndDocument);
        assert_eq!(r.depth(), 0);
        assert_eq!(r.next().unwrap(), EventKind::EndDocument);
    }

    #[test]
    fn test_namespace_scopes() {
        let mut r = reader("<p:e xmlns:p='urn:x' xmlns='urn:d'><p:c/><d/></p:e>");
        r.next().unwrap();
        assert_eq!(r.namespace_uri(), Some("urn:x"));
        assert_eq!(r.namespace_declarations().unwrap().len(), 2);

        r.next().unwrap();
        assert_eq!(r.local_name(), Some("c"));
        assert_eq!(r.namespace_context().resolve_prefix("p").map(|u| &**u), Some("urn:x"));
        r.next().unwrap();
        r.next().unwrap();
        assert_eq!(r.namespace_uri(), Some("urn:d"));
        r.next().unwrap();
        r.next().unwrap();
        assert_eq!(r.event_kind(), EventKind::EndElement);
        assert_eq!(r.namespace_uri(), Some("urn:x"));
        r.next().unwrap();
        assert!(r.namespace_context().resolve_prefix("p").is_none());
    }

    #[test]
    fn test_default_namespace_unbinding() {
        let mut r = reader("<a xmlns='urn:a'><b xmlns=''/></a>");
        r.next().unwrap();
        assert_eq!(r.namespace_uri(), Some("urn:a"));
        r.next().unwrap();
        assert_eq!(r.namespace_uri(), None);
    }

    #[test]
    fn test_attributes() {
        let mut r = reader("<e xmlns:p='urn:p' a='1' p:b='2'/>");
        r.next().unwrap();
        assert_eq!(r.attribute_count(), 2);
        assert_eq!(r.attribute_value(0).unwrap(), Some("1"));
        assert_eq!(r.attribute_value_by_name(Some("urn:p"), "b").unwrap(), Some("2"));
        let attr = r.attribute(1).unwrap().unwrap();
        assert_eq!(attr.name.prefix(), Some("p"));
        r.next().unwrap();
        assert_eq!(r.attribute_count(), 0);
        assert!(r.attribute(0).unwrap_err().is_misuse());
    }

    #[test]
    fn test_well_formedness() {
        assert!(events("<a></b>").is_err());
        assert!(events("<a>").is_err());
        assert!(events("</a>").is_err());
        assert!(events("<a/><b/>").is_err());
        assert!(events("text<a/>").is_err());
        assert!(events("<a/>text").is_err());
        assert!(events("").is_err());
        assert!(events("<!-- only a comment -->").is_err());
        assert!(events("<a/><!DOCTYPE a>").is_err());
        assert!(events("<!DOCTYPE a><!DOCTYPE a><a/>").is_err());
        assert!(events("<p:a/>").is_err());
        assert!(events("<a xmlns:p=''/>").is_err());
    }

    #[test]
    fn test_errors_are_sticky() {
        let mut r = reader("<a></b><c/>");
        r.next().unwrap();
        assert!(matches!(r.next(), Err(XmlError::Malformed { .. })));
        assert!(matches!(r.next(), Err(XmlError::Aborted)));
    }

    #[test]
    fn test_duplicate_attribute() {
        let mut r = reader("<e a=\"1\" a=\"2\"/>");
        assert!(matches!(r.next(), Err(XmlError::DuplicateAttribute { .. })));
    }

    #[test]
    fn test_undeclared_attribute_prefix() {
        let mut r = reader("<e q:a='1'/>");
        match r.next() {
            Err(XmlError::UndeclaredPrefix { prefix, location }) => {
                assert_eq!(prefix, "q");
                assert!(location.is_known());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_next_tag() {
        let mut r = reader("<a>\n  <!-- c -->\n  <b/>\n</a>");
        assert_eq!(r.next_tag().unwrap(), EventKind::StartElement);
        assert_eq!(r.next_tag().unwrap(), EventKind::StartElement);
        assert_eq!(r.local_name(), Some("b"));
        assert_eq!(r.next_tag().unwrap(), EventKind::EndElement);
        assert_eq!(r.next_tag().unwrap(), EventKind::EndElement);
        assert_eq!(r.local_name(), Some("a"));

        let mut r = reader("<a>text</a>");
        r.next_tag().unwrap();
        assert!(r.next_tag().is_err());
    }

    #[test]
    fn test_skip_element() {
        let mut r = reader("<r><a><b>x</b><a/></a><c/></r>");
        r.next().unwrap();
        r.next().unwrap();
        r.skip_element().unwrap();
        assert_eq!(r.event_kind(), EventKind::EndElement);
        assert_eq!(r.local_name(), Some("a"));
        r.next().unwrap();
        assert_eq!(r.local_name(), Some("c"));
        assert!(reader("<r/>").skip_element().unwrap_err().is_misuse());
    }

    #[test]
    fn test_element_text() {
        let mut r = reader("<r>a<!-- c -->b<![CDATA[<c>]]>&amp;</r>");
        r.next().unwrap();
        assert_eq!(r.element_text().unwrap(), "ab<c>&");
        assert_eq!(r.event_kind(), EventKind::EndElement);

        let mut r = reader("<r>a<x/></r>");
        r.next().unwrap();
        assert!(r.element_text().is_err());
    }

    #[test]
    fn test_processing_instruction_and_doctype() {
        let mut r = reader("<!DOCTYPE r SYSTEM 'r.dtd' [<!ENTITY e 'v'>]><?pi data?><r/>");
        assert_eq!(r.next().unwrap(), EventKind::Dtd);
        assert_eq!(r.doctype().unwrap().system_id.as_deref(), Some("r.dtd"));
        assert_eq!(r.text().unwrap(), "<!ENTITY e 'v'>");
        assert_eq!(r.entities().len(), 1);
        assert_eq!(r.next().unwrap(), EventKind::ProcessingInstruction);
        assert_eq!(r.pi_target(), Some("pi"));
        assert_eq!(r.pi_data(), Some("data"));
        assert!(r.local_name().is_none());
    }

    #[test]
    fn test_registered_entity() {
        let mut r = reader("<r>&co;</r>");
        assert!(r.register_entity(EntityDeclaration::internal("co", "Acme")));
        assert!(!r.register_entity(EntityDeclaration::internal("co", "Other")));
        r.next().unwrap();
        assert_eq!(r.element_text().unwrap(), "Acme");
    }

    #[test]
    fn test_entity_reference_event() {
        let config = ReaderConfig::new().expand_entities(false);
        let mut r = StreamReader::new(Box::new(SliceSource::new("<r>&ext;</r>")), config);
        r.next().unwrap();
        assert_eq!(r.next().unwrap(), EventKind::EntityReference);
        assert_eq!(r.entity_name(), Some("ext"));
        assert!(r.entity_declaration().is_none());
        assert_eq!(r.text().unwrap(), "");
    }

    #[test]
    fn test_text_requires_text_event() {
        let mut r = reader("<r/>");
        r.next().unwrap();
        assert!(matches!(
            r.text(),
            Err(XmlError::NotTextPositioned(Some(EventKind::StartElement)))
        ));
    }

    #[test]
    fn test_permanent_namespace() {
        let mut r = reader("<r xmlns:g='urn:other'/>");
        r.declare_permanent_namespace("g", "urn:global").unwrap();
        assert!(matches!(r.next(), Err(XmlError::PermanentBinding { .. })));
    }

    #[test]
    fn test_error_location() {
        let mut r = reader("<r>\n<a></b></r>");
        r.next().unwrap();
        r.next().unwrap();
        r.next().unwrap();
        let err = r.next().unwrap_err();
        let loc = err.location().unwrap();
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 4);
    }

    #[test]
    fn test_error_location_after_carriage_returns() {
        let mut r = reader("<r>\r<a>\r</b></r>");
        r.next().unwrap();
        r.next().unwrap();
        r.next().unwrap();
        r.next().unwrap();
        let err = r.next().unwrap_err();
        let loc = err.location().unwrap();
        assert_eq!(loc.line, 3);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn test_xmlns_element_prefix_rejected() {
        let mut r = reader("<xmlns:a/>");
        assert!(matches!(r.next(), Err(XmlError::Malformed { .. })));

        let config = ReaderConfig::new().namespace_aware(false);
        let mut r = StreamReader::new(Box::new(SliceSource::new("<xmlns:a/>")), config);
        assert_eq!(r.next().unwrap(), EventKind::StartElement);
    }
}
