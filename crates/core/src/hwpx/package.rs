//! The HWPX template package and the document built from it.
//!
//! The section part is always rewritten. The header is rewritten only when
//! definitions were added and the manifest only when images were, so a
//! merge that brings nothing new leaves both byte-identical.

use super::assemble::{HwpxAssembler, locate_anchor, max_paragraph_id};
use super::container::{BIN_DATA_DIR, HEADER_PART, HwpxContainer, MANIFEST_PART, SECTION_PART};
use super::owpml::{
    self, FONT_FACE, font_lang, is, is_null_reference, lang_value, list_name, local_name, qualified,
    references_of,
};
use super::session::{HeaderIndex, HwpxSession, HwpxSessionOutput, item_name, item_number};
use crate::assembler::{QuestionBlock, QuestionSlot};
use crate::config::{MergeConfig, ReferencePolicy};
use crate::dedup::BinaryRegistry;
use crate::definitions::DefinitionSet;
use crate::error::PackageError;
use crate::template::substitute_metadata;
use crate::validator::{IntegrityReport, Origin, Violation};
use quire_types::{DefinitionCategory, FontLang};
use quire_xml::{Element, Node, parse_document, write_element};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>"#;
const DEFAULT_PARAGRAPH: &str = "hp:p";

/// A template package with its header, first section and manifest parsed.
#[derive(Debug, Clone)]
pub struct HwpxTemplate {
    name: String,
    container: HwpxContainer,
    header: Element,
    section: Element,
    manifest: Option<Element>,
}

impl HwpxTemplate {
    pub fn open(name: &str, bytes: Vec<u8>) -> Result<Self, PackageError> {
        let container = HwpxContainer::open(bytes)?;
        let header = parse_part(&container, HEADER_PART)?;
        let section = parse_part(&container, SECTION_PART)?;
        if !is(&section.name, owpml::SECTION) {
            return Err(PackageError::UnexpectedPartRoot {
                part: SECTION_PART.to_string(),
                expected: owpml::SECTION,
                found: section.name,
            });
        }
        let manifest = if container.contains(MANIFEST_PART) {
            Some(parse_part(&container, MANIFEST_PART)?)
        } else {
            None
        };
        log::debug!(
            "opened package template '{name}' with {} entries",
            container.names().len()
        );
        Ok(Self {
            name: name.to_string(),
            container,
            header,
            section,
            manifest,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> &HwpxContainer {
        &self.container
    }

    pub fn header(&self) -> &Element {
        &self.header
    }

    pub fn section(&self) -> &Element {
        &self.section
    }

    /// Largest `image{n}` the package already uses, in the manifest or as
    /// a stored file.
    pub fn max_item(&self) -> Option<u32> {
        let mut max = None;
        let mut note = |n: u32| max = Some(max.map_or(n, |m: u32| m.max(n)));
        if let Some(manifest) = &self.manifest {
            manifest.visit(&mut |el| {
                if is(&el.name, owpml::MANIFEST_ITEM) {
                    if let Some(n) = el.attr("id").and_then(item_number) {
                        note(n);
                    }
                }
            });
        }
        for name in self.container.names() {
            let stem = name
                .strip_prefix(BIN_DATA_DIR)
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|file| file.split_once('.').map_or(file, |(stem, _)| stem));
            if let Some(n) = stem.and_then(item_number) {
                note(n);
            }
        }
        max
    }

    pub fn session(&self, policy: ReferencePolicy) -> HwpxSession {
        HwpxSession::new(HeaderIndex::from_header(&self.header), self.max_item(), policy)
    }

    /// Lays the blocks into the section and merges the session's
    /// definitions and images into the header and manifest.
    pub fn compose(
        &self,
        output: &HwpxSessionOutput,
        blocks: Vec<QuestionBlock>,
        title: &str,
        date: &str,
        config: &MergeConfig,
    ) -> Result<HwpxDraft, PackageError> {
        let manifest = match (&self.manifest, output.binaries.is_empty()) {
            (_, true) => None,
            (Some(manifest), false) => Some(manifest.clone()),
            (None, false) => return Err(PackageError::MissingPart(MANIFEST_PART.to_string())),
        };

        let mut section = self.section.clone();
        substitute_metadata(&mut section, title, date, &config.packaging);
        let point = locate_anchor(&mut section, &config.packaging.anchor);
        let paragraph_name = section
            .elements()
            .find(|el| is(&el.name, owpml::PARAGRAPH))
            .map_or_else(|| DEFAULT_PARAGRAPH.to_string(), |el| el.name.clone());
        let first_id = max_paragraph_id(&section).map_or(0, |max| max.saturating_add(1));
        let assembled = HwpxAssembler::new(&config.assembly, paragraph_name).assemble(blocks, first_id);

        let start = point.index.min(section.children.len());
        let content = start..start + assembled.nodes.len();
        section.children.splice(start..start, assembled.nodes);

        let header = (!output.definitions.is_empty()).then(|| merge_header(&self.header, &output.definitions));
        let (manifest, bin_entries) = match manifest {
            Some(mut manifest) => {
                let entries = merge_manifest(&mut manifest, &output.binaries);
                (Some(manifest), entries)
            }
            None => (None, Vec::new()),
        };

        Ok(HwpxDraft {
            header,
            section,
            manifest,
            bin_entries,
            content,
            slots: assembled.slots,
            added: output.definitions.clone(),
        })
    }
}

fn parse_part(container: &HwpxContainer, name: &str) -> Result<Element, PackageError> {
    let text = container.read_text(name)?;
    let mut root = parse_document(&text).map_err(|source| PackageError::Template {
        name: name.to_string(),
        source,
    })?;
    root.clear_spans();
    Ok(root)
}

/// A merged document not yet written out.
#[derive(Debug, Clone)]
pub struct HwpxDraft {
    /// The merged header, when definitions were added.
    pub header: Option<Element>,
    pub section: Element,
    /// The merged manifest, when images were added.
    pub manifest: Option<Element>,
    pub bin_entries: Vec<(String, Vec<u8>)>,
    /// Section children that were inserted.
    pub content: Range<usize>,
    /// Question slots, relative to `content`.
    pub slots: Vec<QuestionSlot>,
    pub added: DefinitionSet,
}

impl HwpxDraft {
    /// Checks every header reference and image item of the section and of
    /// the added definitions. Template content only yields warnings.
    pub fn validate(&self, template: &HwpxTemplate) -> IntegrityReport {
        let header = self.header.as_ref().unwrap_or(&template.header);
        let index = HeaderIndex::from_header(header);
        let mut items = BTreeSet::new();
        if let Some(manifest) = self.manifest.as_ref().or(template.manifest.as_ref()) {
            manifest.visit(&mut |el| {
                if is(&el.name, owpml::MANIFEST_ITEM) {
                    if let Some(id) = el.attr("id") {
                        items.insert(id.to_string());
                    }
                }
            });
        }
        let mut checker = ReferenceChecker {
            index: &index,
            items: &items,
            violations: Vec::new(),
        };

        for (category, entry) in self.added.iter() {
            let origin = Origin::Fragment(entry.origin.0.clone());
            log::trace!("checking added {category} {}", entry.id);
            checker.check(&entry.element, &origin);
        }
        for (position, node) in self.section.children.iter().enumerate() {
            if self.content.contains(&position) {
                continue;
            }
            if let Node::Element(el) = node {
                checker.check(el, &Origin::Template);
            }
        }
        for slot in self.slots.iter().filter(|slot| !slot.degraded) {
            let range = self.content.start + slot.range.start..self.content.start + slot.range.end;
            let origin = Origin::Fragment(slot.question.clone());
            for node in &self.section.children[range] {
                if let Node::Element(el) = node {
                    checker.check(el, &origin);
                }
            }
        }
        IntegrityReport {
            violations: checker.violations,
        }
    }

    /// Writes the package: rewritten parts in place, new images appended,
    /// every other entry copied from the template.
    pub fn package(&self, template: &HwpxTemplate) -> Result<Vec<u8>, PackageError> {
        let mut replaced = BTreeMap::new();
        replaced.insert(SECTION_PART.to_string(), serialize(&self.section)?);
        if let Some(header) = &self.header {
            replaced.insert(HEADER_PART.to_string(), serialize(header)?);
        }
        if let Some(manifest) = &self.manifest {
            replaced.insert(MANIFEST_PART.to_string(), serialize(manifest)?);
        }
        template.container.repack(&replaced, &self.bin_entries)
    }
}

/// Markup of a part, re-parsed strictly before it is accepted.
fn serialize(root: &Element) -> Result<Vec<u8>, PackageError> {
    let text = format!("{XML_DECLARATION}{}", write_element(root)?);
    parse_document(&text).map_err(PackageError::Output)?;
    Ok(text.into_bytes())
}

struct ReferenceChecker<'a> {
    index: &'a HeaderIndex,
    items: &'a BTreeSet<String>,
    violations: Vec<Violation>,
}

impl ReferenceChecker<'_> {
    fn check(&mut self, element: &Element, origin: &Origin) {
        element.visit(&mut |el| {
            for reference in references_of(&el.name) {
                let Some(value) = el.attr(reference.attribute).filter(|v| !is_null_reference(v)) else {
                    continue;
                };
                let defined = value
                    .trim()
                    .parse::<u32>()
                    .is_ok_and(|id| self.index.contains(reference.category, id));
                if !defined {
                    self.violations.push(Violation::UnresolvedReference {
                        origin: origin.clone(),
                        element: el.name.clone(),
                        attribute: reference.attribute.to_string(),
                        category: reference.category,
                        value: value.to_string(),
                    });
                }
            }
            if is(&el.name, owpml::IMAGE) {
                if let Some(value) = el.attr(owpml::BINARY_REF).filter(|v| !is_null_reference(v)) {
                    if !self.items.contains(value.trim()) {
                        self.violations.push(Violation::UnresolvedReference {
                            origin: origin.clone(),
                            element: el.name.clone(),
                            attribute: owpml::BINARY_REF.to_string(),
                            category: DefinitionCategory::BinItem,
                            value: value.to_string(),
                        });
                    }
                }
            }
        });
    }
}

/// The template header with every added entry appended to its list and
/// the list counts corrected.
pub fn merge_header(header: &Element, added: &DefinitionSet) -> Element {
    let mut header = header.clone();
    if let Some(ref_list) = ensure_child(&mut header, owpml::REF_LIST) {
        merge_entries(ref_list, added);
    }
    log::debug!("merged {} definitions into the header", added.len());
    header
}

fn merge_entries(ref_list: &mut Element, added: &DefinitionSet) {
    let mut touched = BTreeSet::new();
    for (category, entry) in added.iter() {
        let Some(list_local) = list_name(category) else {
            continue;
        };
        let Some(list) = ensure_child(ref_list, list_local) else {
            continue;
        };
        let mut element = entry.element.clone();
        adopt_prefix(&mut element, &list.name);
        match category {
            DefinitionCategory::FontFace(lang) => {
                let Some(face) = font_face(list, lang) else {
                    continue;
                };
                face.children.push(Node::Element(element));
                let count = face.elements().count();
                face.set_attr("fontCnt", count);
            }
            _ => list.children.push(Node::Element(element)),
        }
        touched.insert(list_local);
    }
    for list in ref_list.elements_mut() {
        if touched.iter().any(|touched| *touched == local_name(&list.name)) {
            let count = list.elements().count();
            list.set_attr("itemCnt", count);
        }
    }
}

/// The child of `parent` with the given local name, created if absent.
fn ensure_child<'a>(parent: &'a mut Element, local: &str) -> Option<&'a mut Element> {
    let index = match parent
        .children
        .iter()
        .position(|n| n.as_element().is_some_and(|el| is(&el.name, local)))
    {
        Some(index) => index,
        None => {
            let child = Element::new(qualified(&parent.name, local));
            parent.children.push(Node::Element(child));
            parent.children.len() - 1
        }
    };
    parent.children.get_mut(index).and_then(Node::as_element_mut)
}

fn font_face(faces: &mut Element, lang: FontLang) -> Option<&mut Element> {
    let index = match faces.children.iter().position(|n| {
        n.as_element()
            .is_some_and(|el| is(&el.name, FONT_FACE) && el.attr("lang").and_then(font_lang) == Some(lang))
    }) {
        Some(index) => index,
        None => {
            let face = Element::new(qualified(&faces.name, FONT_FACE))
                .with_attr("lang", lang_value(lang))
                .with_attr("fontCnt", 0);
            faces.children.push(Node::Element(face));
            faces.children.len() - 1
        }
    };
    faces.children.get_mut(index).and_then(Node::as_element_mut)
}

fn prefix_of(name: &str) -> Option<&str> {
    name.split_once(':').map(|(prefix, _)| prefix)
}

/// Renames elements that share the root's namespace prefix to the prefix
/// `like` uses.
fn adopt_prefix(element: &mut Element, like: &str) {
    let from = prefix_of(&element.name).map(str::to_string);
    if from.as_deref() == prefix_of(like) {
        return;
    }
    element.visit_mut(&mut |el| {
        if prefix_of(&el.name) == from.as_deref() {
            el.name = qualified(like, local_name(&el.name));
        }
    });
}

/// Adds a manifest item per stored image and returns the files to add.
pub fn merge_manifest(package: &mut Element, binaries: &BinaryRegistry) -> Vec<(String, Vec<u8>)> {
    let path = if is(&package.name, owpml::MANIFEST) {
        Some(Vec::new())
    } else {
        package.find_path(&|el| is(&el.name, owpml::MANIFEST))
    };
    let manifest = match path {
        Some(path) => package.at_path_mut(&path),
        None => ensure_child(package, owpml::MANIFEST),
    };
    let Some(manifest) = manifest else {
        return Vec::new();
    };

    let mut entries = Vec::with_capacity(binaries.len());
    for resource in binaries.resources() {
        let id = item_name(resource.item_id);
        let href = format!("{BIN_DATA_DIR}/{id}.{}", resource.format.as_str());
        let item = Element::new(qualified(&manifest.name, owpml::MANIFEST_ITEM))
            .with_attr("id", &id)
            .with_attr("href", &href)
            .with_attr("media-type", resource.format.media_type())
            .with_attr("isEmbeded", 1);
        manifest.children.push(Node::Element(item));
        entries.push((href, resource.bytes.clone()));
    }
    entries
}
