//! XML Tokenizer - State machine for XML token extraction
//!
//! Implements a pull-parser style tokenizer over a streaming `Scanner`:
//! - Element start/end tags (attributes go straight into an `AttributeCollector`)
//! - Text content, with entity expansion and newline normalization
//! - CDATA sections
//! - Comments
//! - Processing instructions and the XML declaration
//! - DOCTYPE declarations (internal subset entities are registered)
//! - Entity references that are not expanded
//!
//! Token payloads live in reusable buffers owned by the tokenizer and
//! stay valid until the next call to `next_token`.

use super::attributes::{AttributeCollector, ValueSink};
use super::dtd::parse_internal_subset;
use super::entities::{decode_char_ref, predefined_entity, validate_xml_content, EntityDeclaration, EntityRegistry};
use super::names::NameCache;
use super::scanner::{is_whitespace, Scanner};
use crate::config::{EntityResolver, ReaderConfig};
use crate::error::{Result, XmlError};
use crate::reader::buffered::ByteSource;
use crate::reader::events::{DoctypeInfo, Location, QName, XmlDeclaration};
use memchr::{memchr, memmem};
use std::sync::Arc;

/// Upper bound on the bytes produced by expanding entities in one
/// text run or attribute value
pub const MAX_ENTITY_EXPANSION: usize = 1 << 24;

/// Type of XML token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Element start tag: <element>
    StartTag,
    /// Empty element: <element/>
    EmptyTag,
    /// Element end tag: </element>
    EndTag,
    /// Text content
    Text,
    /// CDATA section: <![CDATA[...]]>
    CData,
    /// Comment: <!--...-->
    Comment,
    /// Processing instruction: <?target ...?>
    ProcessingInstruction,
    /// XML declaration: <?xml ...?>
    XmlDeclaration,
    /// DOCTYPE declaration
    DocType,
    /// Entity reference left unexpanded
    EntityReference,
    /// End of file
    Eof,
}

/// Reference found after `&`
enum Reference {
    Char(char),
    Named(Arc<str>),
}

/// Entity reference consumed while a text run was being collected
struct PendingReference {
    name: Arc<str>,
    decl: Option<Arc<EntityDeclaration>>,
    location: Location,
}

/// Streaming XML tokenizer
pub struct Tokenizer {
    scanner: Scanner,
    names: NameCache,
    entities: EntityRegistry,
    namespace_aware: bool,
    expand_entities: bool,
    resolver: Option<EntityResolver>,

    kind: TokenKind,
    location: Location,
    name: Option<QName>,
    /// Text, CDATA, comment or PI data of the current token
    payload: String,
    whitespace_only: bool,
    pi_target: Option<Arc<str>>,
    entity_name: Option<Arc<str>>,
    entity_decl: Option<Arc<EntityDeclaration>>,
    xml_declaration: Option<XmlDeclaration>,
    doctype: Option<DoctypeInfo>,
    pending: Option<PendingReference>,
    /// Offset of the first byte after an optional byte order mark; None
    /// until the first token is read
    document_start: Option<u64>,

    /// Scratch buffers
    raw: Vec<u8>,
    name_buf: Vec<u8>,
    expansion: Vec<u8>,
}

impl Tokenizer {
    pub fn new(source: Box<dyn ByteSource + Send>, config: &ReaderConfig) -> Self {
        Tokenizer {
            scanner: Scanner::new(source, config.buffer_size),
            names: NameCache::new(config.name_cache_capacity),
            entities: EntityRegistry::new(),
            namespace_aware: config.namespace_aware,
            expand_entities: config.expand_entities,
            resolver: config.entity_resolver.clone(),
            kind: TokenKind::Eof,
            location: Location::new(1, 1, 0),
            name: None,
            payload: String::new(),
            whitespace_only: false,
            pi_target: None,
            entity_name: None,
            entity_decl: None,
            xml_declaration: None,
            doctype: None,
            pending: None,
            document_start: None,
            raw: Vec::new(),
            name_buf: Vec::new(),
            expansion: Vec::new(),
        }
    }

    /// Kind of the current token
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Location of the first byte of the current token
    pub fn location(&self) -> Location {
        self.location
    }

    /// Location of the next unread byte
    pub fn position(&self) -> Location {
        self.scanner.location()
    }

    /// Raw (unresolved) name of the current tag
    pub fn name(&self) -> Option<&QName> {
        self.name.as_ref()
    }

    /// Payload of the current text, CDATA, comment, PI or entity token
    pub fn text(&self) -> &str {
        &self.payload
    }

    /// True if the current text token is whitespace only
    pub fn is_whitespace(&self) -> bool {
        self.whitespace_only
    }

    pub fn pi_target(&self) -> Option<&Arc<str>> {
        self.pi_target.as_ref()
    }

    pub fn entity_name(&self) -> Option<&Arc<str>> {
        self.entity_name.as_ref()
    }

    pub fn entity_declaration(&self) -> Option<&Arc<EntityDeclaration>> {
        self.entity_decl.as_ref()
    }

    pub fn xml_declaration(&self) -> Option<&XmlDeclaration> {
        self.xml_declaration.as_ref()
    }

    pub fn doctype(&self) -> Option<&DoctypeInfo> {
        self.doctype.as_ref()
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityRegistry {
        &mut self.entities
    }

    fn error(&self, message: impl Into<std::borrow::Cow<'static, str>>) -> XmlError {
        XmlError::malformed(message, self.scanner.location())
    }

    fn truncated(&self, what: &str) -> XmlError {
        self.error(format!("unexpected end of input in {}", what))
    }

    fn reset_token(&mut self) {
        self.name = None;
        self.whitespace_only = false;
        self.pi_target = None;
        self.entity_name = None;
        self.entity_decl = None;
        self.payload.clear();
    }

    /// Hand the payload allocation out for reuse as a byte buffer
    fn take_payload_buffer(&mut self) -> Vec<u8> {
        let mut buf = std::mem::take(&mut self.payload).into_bytes();
        buf.clear();
        buf
    }

    fn set_payload(&mut self, buf: Vec<u8>, what: &str) -> Result<()> {
        if let Err(msg) = validate_xml_content(&buf) {
            return Err(XmlError::malformed(format!("{} in {}", msg, what), self.location));
        }
        self.payload = String::from_utf8(buf)
            .map_err(|_| XmlError::malformed(format!("invalid UTF-8 in {}", what), self.location))?;
        Ok(())
    }

    /// Advance to the next token. Attributes of start tags are written
    /// into `attrs` (which is reset first).
    pub fn next_token(&mut self, attrs: &mut AttributeCollector) -> Result<TokenKind> {
        self.reset_token();

        if self.document_start.is_none() {
            if self.scanner.starts_with(b"\xEF\xBB\xBF")? {
                self.scanner.advance(3);
            }
            self.document_start = Some(self.scanner.offset());
        }

        if let Some(pending) = self.pending.take() {
            self.location = pending.location;
            self.set_entity_reference(pending.name, pending.decl);
            return Ok(self.finish(TokenKind::EntityReference));
        }

        loop {
            self.location = self.scanner.location();
            let kind = match self.scanner.peek()? {
                None => TokenKind::Eof,
                Some(b'<') => self.parse_markup(attrs)?,
                Some(_) => match self.parse_text()? {
                    Some(kind) => kind,
                    // Text run that expanded to nothing
                    None => continue,
                },
            };
            return Ok(self.finish(kind));
        }
    }

    fn finish(&mut self, kind: TokenKind) -> TokenKind {
        self.kind = kind;
        log::trace!(target: "rustystax::tokenizer", "{:?} at {}", kind, self.location);
        kind
    }

    fn set_entity_reference(&mut self, name: Arc<str>, decl: Option<Arc<EntityDeclaration>>) {
        self.payload.clear();
        if let Some(text) = decl.as_ref().and_then(|d| d.replacement.as_deref()) {
            self.payload.push_str(text);
        }
        self.entity_name = Some(name);
        self.entity_decl = decl;
    }

    /// Parse markup starting with '<'
    fn parse_markup(&mut self, attrs: &mut AttributeCollector) -> Result<TokenKind> {
        if !self.scanner.ensure(2)? {
            return Err(self.truncated("markup"));
        }
        match self.scanner.peek_at(1)? {
            Some(b'/') => self.parse_end_tag(),
            Some(b'!') => self.parse_bang_markup(),
            Some(b'?') => self.parse_pi(),
            _ => self.parse_start_tag(attrs),
        }
    }

    /// Read a name and intern it, split into (prefix, local) when
    /// namespace processing is on
    fn read_qname(&mut self, what: &str) -> Result<QName> {
        let mut buf = std::mem::take(&mut self.name_buf);
        let found = self.scanner.read_name(&mut buf);
        let result = match found {
            Ok(true) => self.intern_qname(&buf, what),
            Ok(false) => Err(self.error(format!("invalid {} name", what))),
            Err(e) => Err(e),
        };
        self.name_buf = buf;
        result
    }

    fn intern_qname(&mut self, raw: &[u8], what: &str) -> Result<QName> {
        if self.namespace_aware {
            if let Some(colon) = memchr(b':', raw) {
                let (prefix, local) = (&raw[..colon], &raw[colon + 1..]);
                if prefix.is_empty() || local.is_empty() || memchr(b':', local).is_some() {
                    return Err(self.error(format!(
                        "invalid qualified {} name '{}'",
                        what,
                        String::from_utf8_lossy(raw)
                    )));
                }
                let prefix = self.intern(prefix, what)?;
                let local = self.intern(local, what)?;
                return Ok(QName::new(Some(prefix), local));
            }
        }
        Ok(QName::new(None, self.intern(raw, what)?))
    }

    fn intern(&mut self, raw: &[u8], what: &str) -> Result<Arc<str>> {
        match self.names.intern_bytes(raw) {
            Some(name) => Ok(name),
            None => Err(self.error(format!("invalid UTF-8 in {} name", what))),
        }
    }

    /// Parse a start tag or empty element tag
    fn parse_start_tag(&mut self, attrs: &mut AttributeCollector) -> Result<TokenKind> {
        self.scanner.advance(1); // Skip '<'
        let name = self.read_qname("element")?;
        attrs.begin_element();

        loop {
            let had_ws = self.scanner.skip_whitespace()? > 0;
            match self.scanner.peek()? {
                None => return Err(self.truncated("start tag")),
                Some(b'>') => {
                    self.scanner.advance(1);
                    self.name = Some(name);
                    return Ok(TokenKind::StartTag);
                }
                Some(b'/') => {
                    if self.scanner.peek_at(1)? != Some(b'>') {
                        return Err(self.error("expected '>' after '/' in empty element tag"));
                    }
                    self.scanner.advance(2);
                    self.name = Some(name);
                    return Ok(TokenKind::EmptyTag);
                }
                Some(_) if !had_ws => {
                    return Err(self.error("whitespace required between attributes"));
                }
                Some(_) => self.parse_attribute(attrs)?,
            }
        }
    }

    /// Parse one `name="value"` pair into the collector
    fn parse_attribute(&mut self, attrs: &mut AttributeCollector) -> Result<()> {
        let name = self.read_qname("attribute")?;
        self.scanner.skip_whitespace()?;
        if self.scanner.next_byte()? != Some(b'=') {
            return Err(self.error(format!("expected '=' after attribute name '{}'", name)));
        }
        self.scanner.skip_whitespace()?;
        let quote = match self.scanner.next_byte()? {
            Some(q @ (b'"' | b'\'')) => q,
            Some(_) => return Err(self.error(format!("value of attribute '{}' must be quoted", name))),
            None => return Err(self.truncated("start tag")),
        };

        let mut sink = if self.namespace_aware && name.prefix.is_none() && &*name.local == "xmlns" {
            attrs.add_namespace_declaration(None)
        } else if self.namespace_aware && name.prefix.as_deref() == Some("xmlns") {
            attrs.add_namespace_declaration(Some(name.local))
        } else {
            attrs.add_raw(name.prefix, name.local)
        };
        self.read_attribute_value(quote, &mut sink)
    }

    fn read_attribute_value(&mut self, quote: u8, sink: &mut ValueSink<'_>) -> Result<()> {
        let mut raw = std::mem::take(&mut self.raw);
        let result = self.read_attribute_value_into(quote, sink, &mut raw);
        self.raw = raw;
        result
    }

    fn read_attribute_value_into(&mut self, quote: u8, sink: &mut ValueSink<'_>, raw: &mut Vec<u8>) -> Result<()> {
        let mut expanded = 0usize;
        loop {
            raw.clear();
            let delimiter = self.scanner.read_until3(quote, b'<', b'&', raw)?;
            normalize_attribute_whitespace(raw, sink);
            match delimiter {
                None => return Err(self.truncated("attribute value")),
                Some(b'<') => return Err(self.error("'<' not allowed in attribute value")),
                Some(b'&') => {
                    let location = self.scanner.location();
                    match self.read_reference()? {
                        Reference::Char(c) => sink.push_char(c),
                        Reference::Named(name) => {
                            if let Some(text) = predefined_entity(name.as_bytes()) {
                                sink.push_str(text);
                                continue;
                            }
                            match self.entities.lookup(&name).cloned() {
                                Some(decl) => {
                                    let mut out = std::mem::take(&mut self.expansion);
                                    out.clear();
                                    let mut stack = Vec::new();
                                    let result = self.expand(&decl, &mut out, &mut stack, true, location);
                                    expanded += out.len();
                                    sink.extend(&out);
                                    self.expansion = out;
                                    result?;
                                    if expanded > MAX_ENTITY_EXPANSION {
                                        return Err(XmlError::malformed("entity expansion limit exceeded", location));
                                    }
                                }
                                None if !self.expand_entities => {
                                    log::warn!(
                                        target: "rustystax::tokenizer",
                                        "undeclared entity '{}' in attribute value at {} kept verbatim",
                                        name,
                                        location
                                    );
                                    sink.push(b'&');
                                    sink.push_str(&name);
                                    sink.push(b';');
                                }
                                None => {
                                    return Err(XmlError::malformed(
                                        format!("undeclared entity '{}'", name),
                                        location,
                                    ))
                                }
                            }
                        }
                    }
                }
                Some(_) => {
                    // Closing quote
                    self.scanner.advance(1);
                    return Ok(());
                }
            }
        }
    }

    /// Parse a reference after '&'. The scanner is positioned on '&'.
    fn read_reference(&mut self) -> Result<Reference> {
        self.scanner.advance(1); // Skip '&'
        let mut buf = std::mem::take(&mut self.name_buf);
        let result = self.read_reference_into(&mut buf);
        self.name_buf = buf;
        result
    }

    fn read_reference_into(&mut self, buf: &mut Vec<u8>) -> Result<Reference> {
        if self.scanner.peek()? == Some(b'#') {
            self.scanner.advance(1);
            buf.clear();
            while let Some(b) = self.scanner.peek()? {
                if !b.is_ascii_alphanumeric() || buf.len() > 16 {
                    break;
                }
                buf.push(b);
                self.scanner.advance(1);
            }
            if self.scanner.next_byte()? != Some(b';') {
                return Err(self.error("character reference must end with ';'"));
            }
            return decode_char_ref(buf).map(Reference::Char).ok_or_else(|| {
                self.error(format!("invalid character reference '&#{};'", String::from_utf8_lossy(buf)))
            });
        }

        if !self.scanner.read_name(buf)? {
            return Err(self.error("invalid entity reference"));
        }
        if self.scanner.next_byte()? != Some(b';') {
            return Err(self.error("entity reference must end with ';'"));
        }
        let name = self.intern(buf, "entity")?;
        Ok(Reference::Named(name))
    }

    /// Append the replacement text of `decl` to `out`, expanding nested
    /// references. Replacement text is character data; markup in it is
    /// not interpreted. Returns false for an external entity the resolver
    /// did not provide.
    fn expand(
        &self,
        decl: &EntityDeclaration,
        out: &mut Vec<u8>,
        stack: &mut Vec<Arc<str>>,
        in_attribute: bool,
        location: Location,
    ) -> Result<bool> {
        if !decl.is_parsed() {
            return Err(XmlError::malformed(
                format!("reference to unparsed entity '{}'", decl.name),
                location,
            ));
        }
        if stack.iter().any(|n| *n == decl.name) {
            return Err(XmlError::malformed(
                format!("recursive reference to entity '{}'", decl.name),
                location,
            ));
        }

        let resolved;
        let text: &str = match &decl.replacement {
            Some(text) => text.as_str(),
            None if in_attribute => {
                return Err(XmlError::malformed(
                    format!("external entity '{}' referenced in attribute value", decl.name),
                    location,
                ))
            }
            None => match self.resolver.as_ref().and_then(|resolve| resolve(decl)) {
                Some(text) => {
                    resolved = text;
                    resolved.as_str()
                }
                None => return Ok(false),
            },
        };

        stack.push(Arc::clone(&decl.name));
        let bytes = text.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            let Some(amp) = memchr(b'&', &bytes[pos..]) else {
                push_replacement(&bytes[pos..], out, in_attribute, location)?;
                break;
            };
            push_replacement(&bytes[pos..pos + amp], out, in_attribute, location)?;
            pos += amp + 1;

            let semi = memchr(b';', &bytes[pos..]).ok_or_else(|| {
                XmlError::malformed(format!("unterminated reference in entity '{}'", decl.name), location)
            })?;
            let body = &bytes[pos..pos + semi];
            pos += semi + 1;

            if let Some(code) = body.strip_prefix(b"#") {
                let c = decode_char_ref(code).ok_or_else(|| {
                    XmlError::malformed(format!("invalid character reference in entity '{}'", decl.name), location)
                })?;
                let mut utf8 = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            } else if let Some(text) = predefined_entity(body) {
                out.extend_from_slice(text.as_bytes());
            } else {
                let name = String::from_utf8_lossy(body);
                let nested = self.entities.lookup(&name).ok_or_else(|| {
                    XmlError::malformed(format!("undeclared entity '{}' in entity '{}'", name, decl.name), location)
                })?;
                if !self.expand(nested, out, stack, in_attribute, location)? {
                    return Err(XmlError::malformed(
                        format!("unresolved external entity '{}' in entity '{}'", name, decl.name),
                        location,
                    ));
                }
            }

            if out.len() > MAX_ENTITY_EXPANSION {
                return Err(XmlError::malformed("entity expansion limit exceeded", location));
            }
        }
        stack.pop();
        Ok(true)
    }

    /// Parse an end tag
    fn parse_end_tag(&mut self) -> Result<TokenKind> {
        self.scanner.advance(2); // Skip '</'
        let name = self.read_qname("element")?;
        self.scanner.skip_whitespace()?;
        match self.scanner.next_byte()? {
            Some(b'>') => {
                self.name = Some(name);
                Ok(TokenKind::EndTag)
            }
            Some(_) => Err(self.error(format!("end tag '{}' cannot have attributes or other content", name))),
            None => Err(self.truncated("end tag")),
        }
    }

    /// Parse markup starting with '<!' (comment, CDATA, DOCTYPE)
    fn parse_bang_markup(&mut self) -> Result<TokenKind> {
        if self.scanner.starts_with(b"<!--")? {
            self.parse_comment()
        } else if self.scanner.starts_with(b"<![CDATA[")? {
            self.parse_cdata()
        } else if self.scanner.starts_with(b"<!DOCTYPE")? {
            self.parse_doctype()
        } else {
            Err(self.error("invalid declaration - expected comment, CDATA, or DOCTYPE"))
        }
    }

    /// Parse a comment <!--...-->
    fn parse_comment(&mut self) -> Result<TokenKind> {
        self.scanner.advance(4);
        let mut raw = std::mem::take(&mut self.raw);
        raw.clear();
        let found = self.scanner.read_until_seq(b"--", &mut raw);
        let result = match found {
            Ok(true) => match self.scanner.next_byte() {
                Ok(Some(b'>')) => {
                    let mut buf = self.take_payload_buffer();
                    normalize_newlines(&raw, &mut buf);
                    self.set_payload(buf, "comment")
                }
                Ok(Some(_)) => Err(self.error("comment cannot contain '--'")),
                Ok(None) => Err(self.truncated("comment")),
                Err(e) => Err(e),
            },
            Ok(false) => Err(self.truncated("comment")),
            Err(e) => Err(e),
        };
        self.raw = raw;
        result.map(|()| TokenKind::Comment)
    }

    /// Parse a CDATA section <![CDATA[...]]>
    fn parse_cdata(&mut self) -> Result<TokenKind> {
        self.scanner.advance(9);
        let mut raw = std::mem::take(&mut self.raw);
        raw.clear();
        let result = match self.scanner.read_until_seq(b"]]>", &mut raw) {
            Ok(true) => {
                let mut buf = self.take_payload_buffer();
                normalize_newlines(&raw, &mut buf);
                self.set_payload(buf, "CDATA section")
            }
            Ok(false) => Err(self.truncated("CDATA section")),
            Err(e) => Err(e),
        };
        self.raw = raw;
        self.whitespace_only = self.payload.bytes().all(is_whitespace);
        result.map(|()| TokenKind::CData)
    }

    /// Parse a processing instruction or the XML declaration
    fn parse_pi(&mut self) -> Result<TokenKind> {
        let at_start = Some(self.scanner.offset()) == self.document_start;
        self.scanner.advance(2); // Skip '<?'

        let mut buf = std::mem::take(&mut self.name_buf);
        let found = self.scanner.read_name(&mut buf);
        let target = match found {
            Ok(true) => self.intern(&buf, "processing instruction target"),
            Ok(false) => Err(self.error("invalid processing instruction target")),
            Err(e) => Err(e),
        };
        self.name_buf = buf;
        let target = target?;

        let is_xml_decl = target.eq_ignore_ascii_case("xml");
        if is_xml_decl && (!at_start || &*target != "xml") {
            return Err(XmlError::malformed(
                "processing instruction target 'xml' is reserved (XML declaration must be at the very start)",
                self.location,
            ));
        }

        let mut raw = std::mem::take(&mut self.raw);
        raw.clear();
        let result = self.read_pi_data(&mut raw);
        let result = result.and_then(|()| {
            if is_xml_decl {
                let decl = parse_xml_declaration(&raw).map_err(|msg| XmlError::malformed(msg, self.location))?;
                if let Some(encoding) = &decl.encoding {
                    if !is_utf8_compatible(encoding) {
                        log::warn!(
                            target: "rustystax::tokenizer",
                            "declared encoding '{}' ignored, input is read as UTF-8",
                            encoding
                        );
                    }
                }
                self.xml_declaration = Some(decl);
                Ok(TokenKind::XmlDeclaration)
            } else {
                let mut buf = self.take_payload_buffer();
                normalize_newlines(&raw, &mut buf);
                self.set_payload(buf, "processing instruction")?;
                self.pi_target = Some(target);
                Ok(TokenKind::ProcessingInstruction)
            }
        });
        self.raw = raw;
        result
    }

    fn read_pi_data(&mut self, raw: &mut Vec<u8>) -> Result<()> {
        if self.scanner.starts_with(b"?>")? {
            self.scanner.advance(2);
            return Ok(());
        }
        if self.scanner.skip_whitespace()? == 0 {
            return Err(self.error("invalid character after processing instruction target"));
        }
        if !self.scanner.read_until_seq(b"?>", raw)? {
            return Err(self.truncated("processing instruction"));
        }
        Ok(())
    }

    /// Parse a DOCTYPE declaration
    fn parse_doctype(&mut self) -> Result<TokenKind> {
        self.scanner.advance(9); // Skip '<!DOCTYPE'
        if self.scanner.skip_whitespace()? == 0 {
            return Err(self.error("whitespace required after '<!DOCTYPE'"));
        }

        let mut info = DoctypeInfo::default();
        let mut buf = std::mem::take(&mut self.name_buf);
        let found = self.scanner.read_name(&mut buf);
        self.name_buf = buf;
        if !found? {
            return Err(self.error("invalid DOCTYPE root element name"));
        }
        info.root_name = String::from_utf8(self.name_buf.clone())
            .map_err(|_| self.error("invalid UTF-8 in DOCTYPE name"))?;

        let had_ws = self.scanner.skip_whitespace()? > 0;
        if self.scanner.starts_with(b"SYSTEM")? || self.scanner.starts_with(b"PUBLIC")? {
            if !had_ws {
                return Err(self.error("whitespace required before external identifier"));
            }
            let public = self.scanner.starts_with(b"PUBLIC")?;
            self.scanner.advance(6);
            self.scanner.skip_whitespace()?;
            if public {
                info.public_id = Some(self.read_quoted("public identifier")?);
                if self.scanner.skip_whitespace()? == 0 {
                    return Err(self.error("whitespace required between public and system identifier"));
                }
            }
            info.system_id = Some(self.read_quoted("system identifier")?);
            self.scanner.skip_whitespace()?;
        }

        if self.scanner.peek()? == Some(b'[') {
            self.scanner.advance(1);
            let subset_location = self.scanner.location();
            let mut raw = std::mem::take(&mut self.raw);
            raw.clear();
            let result = self.read_internal_subset(&mut raw);
            let subset = result.and_then(|()| {
                String::from_utf8(raw.clone()).map_err(|_| self.error("invalid UTF-8 in DOCTYPE internal subset"))
            });
            self.raw = raw;
            let subset = subset?;
            parse_internal_subset(&subset, &mut self.entities)
                .map_err(|msg| XmlError::malformed(msg, subset_location))?;
            info.internal_subset = Some(subset);
            self.scanner.skip_whitespace()?;
        }

        match self.scanner.next_byte()? {
            Some(b'>') => {}
            Some(_) => return Err(self.error("malformed DOCTYPE declaration")),
            None => return Err(self.truncated("DOCTYPE declaration")),
        }
        self.doctype = Some(info);
        Ok(TokenKind::DocType)
    }

    fn read_quoted(&mut self, what: &str) -> Result<String> {
        let quote = match self.scanner.next_byte()? {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.error(format!("{} must be quoted", what))),
        };
        let mut raw = Vec::new();
        if self.scanner.read_until2(quote, quote, &mut raw)?.is_none() {
            return Err(self.truncated(what));
        }
        self.scanner.advance(1);
        String::from_utf8(raw).map_err(|_| self.error(format!("invalid UTF-8 in {}", what)))
    }

    /// Collect the internal subset up to its closing ']', skipping over
    /// quoted literals, comments and PIs
    fn read_internal_subset(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut quote: Option<u8> = None;
        loop {
            let Some(b) = self.scanner.next_byte()? else {
                return Err(self.truncated("DOCTYPE internal subset"));
            };
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None => match b {
                    b'"' | b'\'' => quote = Some(b),
                    b']' => return Ok(()),
                    b'<' if self.scanner.starts_with(b"!--")? => {
                        out.extend_from_slice(b"<!--");
                        self.scanner.advance(3);
                        if !self.scanner.read_until_seq(b"-->", out)? {
                            return Err(self.truncated("comment"));
                        }
                        out.extend_from_slice(b"-->");
                        continue;
                    }
                    b'<' if self.scanner.starts_with(b"?")? => {
                        out.extend_from_slice(b"<?");
                        self.scanner.advance(1);
                        if !self.scanner.read_until_seq(b"?>", out)? {
                            return Err(self.truncated("processing instruction"));
                        }
                        out.extend_from_slice(b"?>");
                        continue;
                    }
                    _ => {}
                },
            }
            out.push(b);
        }
    }

    /// Parse a text run. Returns None if the run turned out empty.
    fn parse_text(&mut self) -> Result<Option<TokenKind>> {
        let mut buf = self.take_payload_buffer();
        let mut raw = std::mem::take(&mut self.raw);
        let result = self.collect_text(&mut buf, &mut raw);
        self.raw = raw;

        let entity = match result {
            Ok(entity) => entity,
            Err(e) => {
                self.payload = String::new();
                return Err(e);
            }
        };

        if buf.is_empty() {
            self.payload = String::from_utf8(buf).unwrap_or_default();
            return Ok(match entity {
                Some(reference) => {
                    self.location = reference.location;
                    self.set_entity_reference(reference.name, reference.decl);
                    Some(TokenKind::EntityReference)
                }
                None => None,
            });
        }

        self.whitespace_only = buf.iter().all(|&b| is_whitespace(b));
        self.set_payload(buf, "text")?;
        self.pending = entity;
        Ok(Some(TokenKind::Text))
    }

    /// Collect character data into `out` until markup, end of input, or
    /// an entity reference that must be surfaced (returned).
    fn collect_text(&mut self, out: &mut Vec<u8>, raw: &mut Vec<u8>) -> Result<Option<PendingReference>> {
        let mut stack = Vec::new();
        loop {
            raw.clear();
            let delimiter = self.scanner.read_until2(b'<', b'&', raw)?;
            if memmem::find(raw, b"]]>").is_some() {
                return Err(self.error("text content cannot contain ']]>'"));
            }
            normalize_newlines(raw, out);

            if delimiter != Some(b'&') {
                return Ok(None);
            }

            let location = self.scanner.location();
            let name = match self.read_reference()? {
                Reference::Char(c) => {
                    let mut utf8 = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                    continue;
                }
                Reference::Named(name) => name,
            };
            if let Some(text) = predefined_entity(name.as_bytes()) {
                out.extend_from_slice(text.as_bytes());
                continue;
            }

            let decl = self.entities.lookup(&name).cloned();
            if !self.expand_entities {
                match &decl {
                    Some(d) if !d.is_parsed() => {
                        return Err(XmlError::malformed(
                            format!("reference to unparsed entity '{}'", name),
                            location,
                        ))
                    }
                    Some(_) => {}
                    None => log::warn!(
                        target: "rustystax::tokenizer",
                        "undeclared entity '{}' at {} reported unexpanded",
                        name,
                        location
                    ),
                }
                return Ok(Some(PendingReference { name, decl, location }));
            }

            let Some(decl) = decl else {
                return Err(XmlError::malformed(format!("undeclared entity '{}'", name), location));
            };
            stack.clear();
            if !self.expand(&decl, out, &mut stack, false, location)? {
                return Ok(Some(PendingReference {
                    name,
                    decl: Some(decl),
                    location,
                }));
            }
            if out.len() > MAX_ENTITY_EXPANSION {
                return Err(XmlError::malformed("entity expansion limit exceeded", location));
            }
        }
    }
}

/// Append `raw` to `out` with `\r\n` and lone `\r` turned into `\n`
pub fn normalize_newlines(raw: &[u8], out: &mut Vec<u8>) {
    let mut rest = raw;
    while let Some(cr) = memchr(b'\r', rest) {
        out.extend_from_slice(&rest[..cr]);
        out.push(b'\n');
        rest = &rest[cr + 1..];
        if rest.first() == Some(&b'\n') {
            rest = &rest[1..];
        }
    }
    out.extend_from_slice(rest);
}

/// Attribute value normalization: tab, CR and LF become a space, with
/// `\r\n` counting as one line break
fn normalize_attribute_whitespace(raw: &[u8], sink: &mut ValueSink<'_>) {
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'\r' => {
                sink.push(b' ');
                if raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\t' | b'\n' => sink.push(b' '),
            b => sink.push(b),
        }
        i += 1;
    }
}

/// Literal part of entity replacement text
fn push_replacement(bytes: &[u8], out: &mut Vec<u8>, in_attribute: bool, location: Location) -> Result<()> {
    if !in_attribute {
        normalize_newlines(bytes, out);
        return Ok(());
    }
    if memchr(b'<', bytes).is_some() {
        return Err(XmlError::malformed(
            "'<' not allowed in attribute value (via entity replacement)",
            location,
        ));
    }
    out.extend(bytes.iter().map(|&b| if matches!(b, b'\t' | b'\n' | b'\r') { b' ' } else { b }));
    Ok(())
}

fn is_utf8_compatible(encoding: &str) -> bool {
    ["utf-8", "utf8", "us-ascii", "ascii"]
        .iter()
        .any(|e| encoding.eq_ignore_ascii_case(e))
}

fn skip_ws(content: &[u8]) -> &[u8] {
    let start = content.iter().position(|&b| !is_whitespace(b)).unwrap_or(content.len());
    &content[start..]
}

/// Parse `name = "value"` at the start of `content`, returning the value
/// and the rest. Returns None if `content` does not start with `name`.
fn pseudo_attribute<'c>(content: &'c [u8], name: &str) -> Result<Option<(&'c [u8], &'c [u8])>, String> {
    let Some(rest) = content.strip_prefix(name.as_bytes()) else {
        return Ok(None);
    };
    let rest = skip_ws(rest);
    let Some(rest) = rest.strip_prefix(b"=") else {
        return Err(format!("{} attribute must have '='", name));
    };
    let rest = skip_ws(rest);
    let quote = match rest.first() {
        Some(&q @ (b'"' | b'\'')) => q,
        _ => return Err(format!("{} value must be quoted", name)),
    };
    let rest = &rest[1..];
    let end = memchr(quote, rest).ok_or_else(|| format!("{} value not properly terminated", name))?;
    Ok(Some((&rest[..end], &rest[end + 1..])))
}

/// Parse the content of `<?xml ...?>` (everything after the target)
pub fn parse_xml_declaration(content: &[u8]) -> Result<XmlDeclaration, String> {
    let mut decl = XmlDeclaration::default();
    let content = skip_ws(content);

    let (version, rest) =
        pseudo_attribute(content, "version")?.ok_or("XML declaration must have version attribute")?;
    // VersionNum ::= '1.' [0-9]+
    if version.len() < 3 || !version.starts_with(b"1.") || !version[2..].iter().all(u8::is_ascii_digit) {
        return Err("XML declaration version must be '1.' followed by digits".to_string());
    }
    decl.version = String::from_utf8_lossy(version).into_owned();

    let mut rest = rest;
    let mut seen_ws = rest.first().is_some_and(|&b| is_whitespace(b));
    rest = skip_ws(rest);

    if let Some((encoding, after)) = pseudo_attribute(rest, "encoding")? {
        if !seen_ws {
            return Err("whitespace required before encoding in XML declaration".to_string());
        }
        // EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
        let valid = encoding.first().is_some_and(u8::is_ascii_alphabetic)
            && encoding.iter().all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
        if !valid {
            return Err("invalid encoding name in XML declaration".to_string());
        }
        decl.encoding = Some(String::from_utf8_lossy(encoding).into_owned());
        seen_ws = after.first().is_some_and(|&b| is_whitespace(b));
        rest = skip_ws(after);
    }

    if let Some((standalone, after)) = pseudo_attribute(rest, "standalone")? {
        if !seen_ws {
            return Err("whitespace required before standalone in XML declaration".to_string());
        }
        decl.standalone = match standalone {
            b"yes" => Some(true),
            b"no" => Some(false),
            _ => return Err("standalone value must be 'yes' or 'no'".to_string()),
        };
        rest = skip_ws(after);
    }

    if !rest.is_empty() {
        return Err("unknown attribute in XML declaration (only version, encoding, standalone allowed)".to_string());
    }
    Ok(decl)
}
