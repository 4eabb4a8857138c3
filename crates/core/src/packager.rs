//! Writes the merged parts back into the template's bytes.
//!
//! Only `MAPPINGTABLE`, `BODY` and `BINDATASTORAGE` are re-serialised. Every
//! other byte between the root's start and end tags is copied from the
//! template source unchanged.

use crate::error::PackageError;
use crate::template::TemplateDocument;
use quire_xml::{Element, Node, Span, parse_document, write_element};
use std::ops::Range;

/// The declaration every output document starts with.
pub const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no" ?>"#;

/// The parts a merge replaces.
#[derive(Debug, Clone, Copy)]
pub struct PackageParts<'a> {
    pub mapping: &'a Element,
    pub body: &'a Element,
    /// `None` leaves the template's binary storage as it is.
    pub storage: Option<&'a Element>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Splice {
    range: Range<usize>,
    text: String,
}

impl Splice {
    fn replace(span: Span, text: String) -> Self {
        Self {
            range: span.start..span.end,
            text,
        }
    }

    fn insert(at: usize, text: String) -> Self {
        Self { range: at..at, text }
    }
}

pub struct Packager<'a> {
    template: &'a TemplateDocument,
}

impl<'a> Packager<'a> {
    pub fn new(template: &'a TemplateDocument) -> Self {
        Self { template }
    }

    /// Produces the output document bytes.
    ///
    /// The result is parsed again strictly before it is returned.
    pub fn package(&self, parts: PackageParts<'_>) -> Result<Vec<u8>, PackageError> {
        let splices = self.plan(parts)?;
        let root = span_of(self.template.root())?;
        let out = apply(self.template.source(), root.start..root.end, splices)?;
        parse_document(&out).map_err(PackageError::Output)?;
        log::info!(
            "packaged '{}' into {} bytes",
            self.template.name(),
            out.len()
        );
        Ok(out.into_bytes())
    }

    fn plan(&self, parts: PackageParts<'_>) -> Result<Vec<Splice>, PackageError> {
        let root = self.template.root();
        let body = root.child("BODY").ok_or(PackageError::MissingBody)?;
        let body_span = span_of(body)?;
        let mut splices = vec![Splice::replace(body_span, write_element(parts.body)?)];

        match root.child("HEAD") {
            Some(head) => splices.push(replace_or_insert(
                head,
                "MAPPINGTABLE",
                &["DOCSUMMARY", "DOCSETTING"],
                parts.mapping,
            )?),
            None => {
                let head = Element::new("HEAD").with_child(parts.mapping.clone());
                splices.push(Splice::insert(body_span.start, write_element(&head)?));
            }
        }

        if let Some(storage) = parts.storage {
            match root.child("TAIL") {
                Some(tail) => splices.push(replace_or_insert(tail, "BINDATASTORAGE", &[], storage)?),
                None => {
                    let tail = Element::new("TAIL").with_child(storage.clone());
                    splices.push(Splice::insert(body_span.end, write_element(&tail)?));
                }
            }
        }
        Ok(splices)
    }
}

/// Replaces `parent`'s child named `name` with `part`, or inserts `part`
/// after the last sibling listed in `after`.
fn replace_or_insert(parent: &Element, name: &str, after: &[&str], part: &Element) -> Result<Splice, PackageError> {
    if let Some(existing) = parent.child(name) {
        return Ok(Splice::replace(span_of(existing)?, write_element(part)?));
    }
    let span = span_of(parent)?;
    if span.is_self_closing() {
        let mut rebuilt = parent.clone();
        rebuilt.clear_spans();
        rebuilt.children.push(Node::Element(part.clone()));
        return Ok(Splice::replace(span, write_element(&rebuilt)?));
    }

    let anchor = parent
        .elements()
        .filter(|el| after.contains(&el.name.as_str()))
        .last()
        .map(span_of)
        .transpose()?;
    let at = anchor.map_or(span.content_start, |s| s.end);
    Ok(Splice::insert(at, write_element(part)?))
}

fn span_of(element: &Element) -> Result<Span, PackageError> {
    element
        .span
        .ok_or_else(|| PackageError::Unlocated(element.name.clone()))
}

/// Copies `window` of `source` with the splices applied, after the
/// declaration.
fn apply(source: &str, window: Range<usize>, mut splices: Vec<Splice>) -> Result<String, PackageError> {
    splices.sort_by_key(|s| (s.range.start, s.range.end));
    let mut out = String::with_capacity(DECLARATION.len() + source.len());
    out.push_str(DECLARATION);

    let mut cursor = window.start;
    for splice in splices {
        if splice.range.start < cursor {
            return Err(PackageError::OverlappingSplice(splice.range.start));
        }
        out.push_str(&source[cursor..splice.range.start]);
        out.push_str(&splice.text);
        cursor = splice.range.end;
    }
    out.push_str(&source[cursor..window.end]);
    Ok(out)
}
