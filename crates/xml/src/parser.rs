//! Builds an owned tree from quick-xml events.
//!
//! Strict mode rejects anything that is not well-formed. Lenient mode
//! auto-closes elements left open at end of input or skipped over by an end
//! tag, drops stray end tags and keeps unknown entities as literal text.

use crate::error::XmlError;
use crate::tree::{Attribute, Element, Node, Span};
use log::trace;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event as XmlEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub lenient: bool,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self { lenient: false }
    }

    pub fn lenient() -> Self {
        Self { lenient: true }
    }
}

/// Parses a complete document with exactly one root element.
///
/// Declarations, processing instructions, comments and a leading byte order
/// mark are skipped. Spans of every element are recorded.
pub fn parse_document(source: &str) -> Result<Element, XmlError> {
    let nodes = parse_nodes(source, ParseOptions::strict())?;
    let mut root = None;
    for node in nodes {
        match node {
            Node::Element(el) if root.is_none() => root = Some(el),
            Node::Element(el) => return Err(XmlError::MultipleRoots(el.name)),
            Node::Text(t) if t.trim().is_empty() => {}
            Node::Text(_) => return Err(XmlError::StrayText),
        }
    }
    root.ok_or(XmlError::MissingRoot)
}

/// Parses a sequence of sibling nodes, such as a question body.
pub fn parse_fragment(source: &str, options: ParseOptions) -> Result<Vec<Node>, XmlError> {
    parse_nodes(source, options)
}

fn parse_nodes(source: &str, options: ParseOptions) -> Result<Vec<Node>, XmlError> {
    let mut reader = Reader::from_str(source);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        if options.lenient {
            config.check_end_names = false;
            config.allow_unmatched_ends = true;
        }
    }

    let mut builder = TreeBuilder::new(options);
    let mut buf = Vec::new();

    loop {
        let pos = reader.buffer_position() as usize;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|source| XmlError::Syntax {
                position: reader.error_position(),
                source,
            })?;
        let after = reader.buffer_position() as usize;

        match event {
            XmlEvent::Start(e) => {
                let mut el = builder.element_from(&e)?;
                el.span = Some(Span {
                    start: pos,
                    content_start: after,
                    content_end: after,
                    end: after,
                });
                builder.stack.push(el);
            }
            XmlEvent::Empty(e) => {
                let mut el = builder.element_from(&e)?;
                el.span = Some(Span {
                    start: pos,
                    content_start: after,
                    content_end: after,
                    end: after,
                });
                builder.append(Node::Element(el));
            }
            XmlEvent::Text(e) => {
                let raw = std::str::from_utf8(e.as_ref())?;
                builder.text(raw);
            }
            XmlEvent::CData(e) => {
                let raw = std::str::from_utf8(e.as_ref())?;
                builder.text(raw);
            }
            XmlEvent::GeneralRef(r) => {
                let name = std::str::from_utf8(&r)?;
                builder.entity(name)?;
            }
            XmlEvent::End(e) => {
                let name = std::str::from_utf8(e.name().as_ref())?.to_owned();
                builder.close(&name, pos, after);
            }
            XmlEvent::Eof => break,
            _ => (),
        }
        buf.clear();
    }

    builder.finish(source.len())
}

struct TreeBuilder {
    options: ParseOptions,
    stack: Vec<Element>,
    roots: Vec<Node>,
}

impl TreeBuilder {
    fn new(options: ParseOptions) -> Self {
        Self {
            options,
            stack: Vec::new(),
            roots: Vec::new(),
        }
    }

    fn element_from(&self, start: &BytesStart<'_>) -> Result<Element, XmlError> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes().with_checks(!self.options.lenient) {
            let attr = match attr {
                Ok(attr) => attr,
                Err(_) if self.options.lenient => continue,
                Err(e) => return Err(e.into()),
            };
            let key = std::str::from_utf8(attr.key.as_ref())?.to_owned();
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) if self.options.lenient => String::from_utf8_lossy(&attr.value).into_owned(),
                Err(e) => return Err(e.into()),
            };
            attributes.push(Attribute { name: key, value });
        }
        Ok(Element {
            name,
            attributes,
            children: Vec::new(),
            span: None,
        })
    }

    fn children(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(top) => &mut top.children,
            None => &mut self.roots,
        }
    }

    fn append(&mut self, node: Node) {
        self.children().push(node);
    }

    /// Appends text, merging with a preceding text node.
    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let children = self.children();
        if let Some(Node::Text(prev)) = children.last_mut() {
            prev.push_str(text);
        } else {
            children.push(Node::Text(text.to_owned()));
        }
    }

    fn entity(&mut self, name: &str) -> Result<(), XmlError> {
        match resolve_entity(name) {
            Some(resolved) => {
                self.text(&resolved);
                Ok(())
            }
            None if self.options.lenient => {
                self.text(&format!("&{name};"));
                Ok(())
            }
            None => Err(XmlError::UnknownEntity(name.to_owned())),
        }
    }

    fn close(&mut self, name: &str, pos: usize, after: usize) {
        let Some(depth) = self.stack.iter().rposition(|el| el.name == name) else {
            trace!("Ignoring stray end tag </{}>", name);
            return;
        };
        // Anything opened after the matching element is closed implicitly.
        while self.stack.len() > depth + 1 {
            self.pop(pos, pos);
        }
        self.pop(pos, after);
    }

    fn pop(&mut self, content_end: usize, end: usize) {
        if let Some(mut el) = self.stack.pop() {
            if let Some(span) = el.span.as_mut() {
                span.content_end = content_end;
                span.end = end;
            }
            self.append(Node::Element(el));
        }
    }

    fn finish(mut self, len: usize) -> Result<Vec<Node>, XmlError> {
        if let Some(open) = self.stack.last() {
            if !self.options.lenient {
                return Err(XmlError::Unclosed(open.name.clone()));
            }
            while !self.stack.is_empty() {
                self.pop(len, len);
            }
        }
        Ok(self.roots)
    }
}

/// Resolves a predefined or numeric character reference.
fn resolve_entity(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_document_with_spans() {
        let src = r#"<?xml version="1.0"?><HWPML><HEAD Sec="1"/><BODY><P>a</P></BODY></HWPML>"#;
        let root = parse_document(src).unwrap();
        assert_eq!(root.name, "HWPML");

        let head = root.child("HEAD").unwrap();
        let span = head.span.unwrap();
        assert_eq!(&src[span.start..span.end], r#"<HEAD Sec="1"/>"#);
        assert!(span.is_self_closing());

        let body = root.child("BODY").unwrap();
        let span = body.span.unwrap();
        assert_eq!(&src[span.start..span.end], "<BODY><P>a</P></BODY>");
        assert_eq!(&src[span.content_start..span.content_end], "<P>a</P>");
    }

    #[test]
    fn entities_are_resolved_into_text() {
        let nodes = parse_fragment("<CHAR>a &lt; b &amp;&#65;&#x42;</CHAR>", ParseOptions::strict())
            .unwrap();
        let el = nodes[0].as_element().unwrap();
        assert_eq!(el.text_content(), "a < b &AB");
        assert_eq!(el.children.len(), 1);
    }

    #[test]
    fn attribute_values_are_unescaped() {
        let nodes = parse_fragment(r#"<X A="1 &amp; 2"/>"#, ParseOptions::strict()).unwrap();
        assert_eq!(nodes[0].as_element().unwrap().attr("A"), Some("1 & 2"));
    }

    #[test]
    fn strict_mode_rejects_unclosed_elements() {
        let result = parse_fragment("<P><TEXT>", ParseOptions::strict());
        assert!(matches!(result, Err(XmlError::Unclosed(name)) if name == "TEXT"));
    }

    #[test]
    fn lenient_mode_closes_and_skips() {
        let nodes = parse_fragment("<P><TEXT><CHAR>x</TEXT></B></P><P>", ParseOptions::lenient())
            .unwrap();
        assert_eq!(nodes.len(), 2);
        let p = nodes[0].as_element().unwrap();
        let text = p.child("TEXT").unwrap();
        assert_eq!(text.child("CHAR").unwrap().text_content(), "x");
        assert!(nodes[1].is_element("P"));
    }

    #[test]
    fn lenient_mode_keeps_unknown_entities_literally() {
        let nodes = parse_fragment("<C>&nbsp;</C>", ParseOptions::lenient()).unwrap();
        assert_eq!(nodes[0].as_element().unwrap().text_content(), "&nbsp;");
        assert!(parse_fragment("<C>&nbsp;</C>", ParseOptions::strict()).is_err());
    }

    #[test]
    fn document_requires_single_root() {
        assert!(matches!(parse_document("<A/><B/>"), Err(XmlError::MultipleRoots(n)) if n == "B"));
        assert!(matches!(parse_document("  "), Err(XmlError::MissingRoot)));
    }
}
