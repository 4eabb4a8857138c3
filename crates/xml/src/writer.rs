//! Serialises owned trees back to markup.
//!
//! Elements without children are written as empty tags (`<X/>`).

use crate::error::XmlError;
use crate::tree::{Element, Node};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use std::io::Write;

pub fn write_element(element: &Element) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    emit_element(&mut writer, element)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

pub fn write_nodes(nodes: &[Node]) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    for node in nodes {
        emit(&mut writer, node)?;
    }
    Ok(String::from_utf8(writer.into_inner())?)
}

fn emit<W: Write>(writer: &mut Writer<W>, node: &Node) -> Result<(), XmlError> {
    match node {
        Node::Text(text) => {
            writer.write_event(XmlEvent::Text(BytesText::new(text)))?;
        }
        Node::Element(el) => emit_element(writer, el)?,
    }
    Ok(())
}

fn emit_element<W: Write>(writer: &mut Writer<W>, el: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(el.name.as_str());
    for attr in &el.attributes {
        start.push_attribute((attr.name.as_str(), attr.value.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(XmlEvent::Empty(start))?;
    } else {
        writer.write_event(XmlEvent::Start(start))?;
        for child in &el.children {
            emit(writer, child)?;
        }
        writer.write_event(XmlEvent::End(BytesEnd::new(el.name.as_str())))?;
    }
    Ok(())
}
