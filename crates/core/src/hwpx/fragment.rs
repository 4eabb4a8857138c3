//! Preparing a fetched question for an HWPX merge.
//!
//! The record's markup holds section paragraphs (bare or inside a `sec`
//! root), its definitions hold a `head`/`refList` subset, and its payloads
//! are keyed by the `binaryItemIDRef` the images use.

use super::owpml::{self, is, is_null_reference, local_name};
use crate::config::{MissingBinaryPolicy, SanitizerConfig};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{FragmentFault, Stage};
use crate::sanitizer::extract::decode_supplied;
use crate::sanitizer::{DecodedBinary, Degraded, parse_with_repair};
use quire_traits::FragmentRecord;
use quire_types::{DefinitionCategory, LocalId, QuestionId};
use quire_xml::repair::collapse_double_escapes;
use quire_xml::{Element, Node};
use std::collections::HashMap;

/// Header entries a question brings, by category and local id.
#[derive(Debug, Clone, Default)]
pub struct OwpmlDefinitions {
    entries: HashMap<(DefinitionCategory, LocalId), Element>,
}

impl OwpmlDefinitions {
    pub fn collect(&mut self, element: &Element) {
        owpml::for_each_entry(element, &mut |category, id, entry| {
            self.entries.insert((category, LocalId::from(id)), entry.clone());
        });
    }

    pub fn get(&self, category: DefinitionCategory, local: &LocalId) -> Option<&Element> {
        self.entries.get(&(category, local.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct HwpxFragment {
    pub question: QuestionId,
    pub paragraphs: Vec<Element>,
    pub definitions: OwpmlDefinitions,
    pub binaries: HashMap<LocalId, DecodedBinary>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses and cleans one question. Unusable questions come back degraded.
pub fn prepare(
    question: &QuestionId,
    record: &FragmentRecord,
    config: &SanitizerConfig,
) -> Result<HwpxFragment, Degraded> {
    try_prepare(question, record, config).map_err(|fault| {
        log::warn!("question {question} degraded: {fault}");
        Degraded {
            question: question.clone(),
            stage: Stage::Sanitize,
            fault,
        }
    })
}

fn try_prepare(
    question: &QuestionId,
    record: &FragmentRecord,
    config: &SanitizerConfig,
) -> Result<HwpxFragment, FragmentFault> {
    let mut diagnostics = Diagnostics::default();
    let nodes = parse_with_repair(&record.markup, &mut diagnostics).map_err(FragmentFault::Unparseable)?;

    let mut definitions = OwpmlDefinitions::default();
    if let Some(text) = &record.definitions {
        let parsed = parse_with_repair(text, &mut diagnostics).map_err(FragmentFault::BadDefinitions)?;
        for el in parsed.iter().filter_map(Node::as_element) {
            definitions.collect(el);
        }
    }

    let mut paragraphs = Vec::new();
    collect_paragraphs(nodes, &mut paragraphs, &mut definitions, &mut diagnostics);
    for paragraph in &mut paragraphs {
        clean(paragraph, config, &mut diagnostics);
    }

    let mut binaries = HashMap::new();
    for payload in &record.binaries {
        let bytes = decode_supplied(payload).map_err(|message| FragmentFault::UndecodableBinary {
            id: payload.local_id.clone(),
            message,
        })?;
        binaries.insert(
            payload.local_id.clone(),
            DecodedBinary {
                format: payload.format.clone(),
                bytes,
            },
        );
    }
    for paragraph in &mut paragraphs {
        check_images(paragraph, &binaries, config.missing_binary, &mut diagnostics)?;
    }

    log::debug!(
        "prepared {question}: {} paragraphs, {} definitions, {} binaries",
        paragraphs.len(),
        definitions.len(),
        binaries.len()
    );
    Ok(HwpxFragment {
        question: question.clone(),
        paragraphs,
        definitions,
        binaries,
        diagnostics: diagnostics.into_vec(),
    })
}

fn collect_paragraphs(
    nodes: Vec<Node>,
    out: &mut Vec<Element>,
    definitions: &mut OwpmlDefinitions,
    diagnostics: &mut Diagnostics,
) {
    for node in nodes {
        match node {
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Text(_) => diagnostics.push(Diagnostic::DroppedText {
                parent: owpml::SECTION.to_string(),
            }),
            Node::Element(el) => match local_name(&el.name) {
                owpml::PARAGRAPH => out.push(el),
                "head" | owpml::REF_LIST => definitions.collect(&el),
                owpml::SECTION => collect_paragraphs(el.children, out, definitions, diagnostics),
                _ => {
                    diagnostics.push(Diagnostic::UnwrappedElement {
                        element: el.name.clone(),
                    });
                    collect_paragraphs(el.children, out, definitions, diagnostics);
                }
            },
        }
    }
}

/// Drops page setup and configured elements, namespace declarations and
/// forced breaks.
fn clean(element: &mut Element, config: &SanitizerConfig, diagnostics: &mut Diagnostics) {
    element.attributes.retain(|a| a.name != "xmlns" && !a.name.starts_with("xmlns:"));
    if config.strip_breaks && is(&element.name, owpml::PARAGRAPH) {
        for attr in ["pageBreak", "columnBreak"] {
            if element.attr(attr).is_some_and(|v| v != "0") {
                element.set_attr(attr, "0");
            }
        }
    }
    element.children.retain_mut(|node| match node {
        Node::Element(child) => {
            let local = local_name(&child.name);
            if matches!(local, owpml::SECTION_PROPERTIES | "colPr") {
                return false;
            }
            if config.dropped_elements.contains(local) {
                diagnostics.push(Diagnostic::DroppedElement {
                    element: child.name.clone(),
                });
                return false;
            }
            clean(child, config, diagnostics);
            !(is(&child.name, "ctrl") && child.children.is_empty())
        }
        Node::Text(text) => {
            if config.collapse_double_escapes {
                let collapsed = collapse_double_escapes(text).into_owned();
                *text = collapsed;
            }
            true
        }
    });
}

/// Applies the missing-binary policy to every picture below `element`.
fn check_images(
    element: &mut Element,
    binaries: &HashMap<LocalId, DecodedBinary>,
    policy: MissingBinaryPolicy,
    diagnostics: &mut Diagnostics,
) -> Result<(), FragmentFault> {
    let mut fault = None;
    element.children.retain_mut(|node| {
        let Node::Element(child) = node else {
            return true;
        };
        if fault.is_some() {
            return true;
        }
        if is(&child.name, owpml::PICTURE) || is(&child.name, owpml::IMAGE) {
            let Some(missing) = missing_binary(child, binaries) else {
                return true;
            };
            return match policy {
                MissingBinaryPolicy::Degrade => {
                    fault = Some(FragmentFault::MissingBinary(missing));
                    true
                }
                MissingBinaryPolicy::DropPicture => {
                    diagnostics.push(Diagnostic::DroppedPicture { binary: missing });
                    false
                }
            };
        }
        if let Err(err) = check_images(child, binaries, policy, diagnostics) {
            fault = Some(err);
        }
        true
    });
    fault.map_or(Ok(()), Err)
}

fn missing_binary(element: &Element, binaries: &HashMap<LocalId, DecodedBinary>) -> Option<LocalId> {
    let mut missing = None;
    element.visit(&mut |el| {
        if missing.is_some() || !is(&el.name, owpml::IMAGE) {
            return;
        }
        if let Some(value) = el.attr(owpml::BINARY_REF).filter(|v| !is_null_reference(v)) {
            let local = LocalId::from(value.trim());
            if !binaries.contains_key(&local) {
                missing = Some(local);
            }
        }
    });
    missing
}
