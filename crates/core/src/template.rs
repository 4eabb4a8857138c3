//! The baseline document questions are merged into.
//!
//! A template is parsed once with source spans so the packager can leave
//! every part the merge does not replace byte-identical.

use crate::config::PackagingConfig;
use crate::definitions::DefinitionIndex;
use crate::error::PackageError;
use crate::schema::is_paragraph_container;
use chrono::NaiveDate;
use quire_xml::repair::strip_bom;
use quire_xml::{Element, Node, NodePath, parse_document};

#[derive(Debug, Clone)]
pub struct TemplateDocument {
    name: String,
    source: String,
    root: Element,
}

impl TemplateDocument {
    /// Decodes and parses template bytes. A byte order mark is dropped
    /// before parsing, so spans index into [`TemplateDocument::source`].
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self, PackageError> {
        let text = std::str::from_utf8(bytes).map_err(|source| PackageError::Encoding {
            name: name.to_string(),
            source,
        })?;
        let source = strip_bom(text).to_string();
        let root = parse_document(&source).map_err(|source| PackageError::Template {
            name: name.to_string(),
            source,
        })?;
        if root.name != "HWPML" {
            return Err(PackageError::UnexpectedRoot(root.name));
        }
        log::debug!("parsed template '{name}' ({} bytes)", source.len());
        Ok(Self {
            name: name.to_string(),
            source,
            root,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn head(&self) -> Option<&Element> {
        self.root.child("HEAD")
    }

    pub fn mapping_table(&self) -> Option<&Element> {
        self.head()?.child("MAPPINGTABLE")
    }

    pub fn body(&self) -> Option<&Element> {
        self.root.child("BODY")
    }

    pub fn tail(&self) -> Option<&Element> {
        self.root.child("TAIL")
    }

    pub fn binary_storage(&self) -> Option<&Element> {
        self.tail()?.child("BINDATASTORAGE")
    }

    /// Ids and signatures of everything the template defines.
    pub fn definition_index(&self) -> DefinitionIndex {
        DefinitionIndex::from_header(self.mapping_table(), self.binary_storage())
    }

    /// Highest shape instance id used anywhere in the template.
    pub fn max_instance_id(&self) -> Option<u32> {
        let mut max = None;
        self.root.visit(&mut |el| {
            if el.name == "SHAPEOBJECT" {
                if let Some(id) = el.attr("InstId").and_then(|v| v.trim().parse::<u32>().ok()) {
                    max = Some(max.map_or(id, |m: u32| m.max(id)));
                }
            }
        });
        max
    }
}

/// Formats the document date, defaulting to today.
pub fn format_date(date: Option<NaiveDate>, config: &PackagingConfig) -> String {
    let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
    date.format(&config.date_format).to_string()
}

/// Replaces the title and date placeholders in every text node.
///
/// Returns the number of placeholders replaced.
pub fn substitute_metadata(body: &mut Element, title: &str, date: &str, config: &PackagingConfig) -> usize {
    let mut replaced = 0;
    body.visit_mut(&mut |el| {
        for node in &mut el.children {
            let Node::Text(text) = node else {
                continue;
            };
            for (placeholder, value) in [(&config.title_placeholder, title), (&config.date_placeholder, date)] {
                if placeholder.is_empty() {
                    continue;
                }
                let hits = text.matches(placeholder.as_str()).count();
                if hits > 0 {
                    *text = text.replace(placeholder.as_str(), value);
                    replaced += hits;
                }
            }
        }
    });
    replaced
}

/// Where assembled content goes inside the template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionPoint {
    /// Path from `BODY` to the paragraph container.
    pub container: NodePath,
    pub container_name: String,
    /// Child index the content is inserted at.
    pub index: usize,
    /// What is left of the anchor paragraph once the anchor text is gone.
    pub prelude: Vec<Node>,
}

/// Finds the anchor and removes its paragraph from `body`.
///
/// The anchor paragraph is the nearest ancestor of the anchor text that
/// sits directly in a `SECTION` or `PARALIST`, however deep. Without an
/// anchor the content goes at the end of the last `SECTION`.
pub fn locate_insertion(body: &mut Element, anchor: &str) -> Result<InsertionPoint, PackageError> {
    let found = (!anchor.is_empty())
        .then(|| {
            body.find_path(&|el| {
                el.children
                    .iter()
                    .any(|n| n.as_text().is_some_and(|t| t.contains(anchor)))
            })
        })
        .flatten();

    let Some(path) = found else {
        let index = body
            .children
            .iter()
            .rposition(|n| n.is_element("SECTION"))
            .ok_or(PackageError::MissingBody)?;
        log::warn!("no content anchor '{anchor}' in template, appending to the last section");
        let len = body.children[index].as_element().map_or(0, |s| s.children.len());
        return Ok(InsertionPoint {
            container: vec![index],
            container_name: "SECTION".to_string(),
            index: len,
            prelude: Vec::new(),
        });
    };

    let depth = (0..path.len())
        .rev()
        .find(|&depth| {
            body.at_path(&path[..depth])
                .is_some_and(|parent| is_paragraph_container(&parent.name))
        })
        .ok_or(PackageError::MissingBody)?;
    let container_path = path[..depth].to_vec();
    let index = path[depth];
    let container = body.at_path_mut(&container_path).ok_or(PackageError::MissingBody)?;
    let container_name = container.name.clone();

    let mut prelude = Vec::new();
    if let Node::Element(mut paragraph) = container.children.remove(index) {
        remove_anchor(&mut paragraph, anchor);
        if has_content(&paragraph) {
            prelude.push(Node::Element(paragraph));
        }
    }
    log::debug!(
        "content anchor found in <{container_name}> at depth {}",
        container_path.len()
    );
    Ok(InsertionPoint {
        container: container_path,
        container_name,
        index,
        prelude,
    })
}

/// Puts `nodes` into `body` at `point`.
pub fn insert_content(body: &mut Element, point: &InsertionPoint, nodes: Vec<Node>) -> Result<(), PackageError> {
    let container = body.at_path_mut(&point.container).ok_or(PackageError::MissingBody)?;
    let index = point.index.min(container.children.len());
    container.children.splice(index..index, nodes);
    Ok(())
}

fn remove_anchor(paragraph: &mut Element, anchor: &str) {
    paragraph.visit_mut(&mut |el| {
        for node in &mut el.children {
            if let Node::Text(text) = node {
                if text.contains(anchor) {
                    *text = text.replace(anchor, "");
                }
            }
        }
    });
    prune_empty_runs(paragraph);
}

/// Drops empty text nodes and the character runs they leave empty.
fn prune_empty_runs(el: &mut Element) {
    for child in el.elements_mut() {
        prune_empty_runs(child);
    }
    el.children.retain(|n| match n {
        Node::Text(t) => !t.is_empty(),
        Node::Element(child) => child.name != "CHAR" || !child.children.is_empty(),
    });
}

/// Whether a paragraph holds visible text or any control besides runs.
fn has_content(paragraph: &Element) -> bool {
    if !paragraph.text_content().trim().is_empty() {
        return true;
    }
    let mut found = false;
    paragraph.visit(&mut |el| {
        if !matches!(el.name.as_str(), "P" | "TEXT" | "CHAR") && el.name != paragraph.name {
            found = true;
        }
    });
    found
}
