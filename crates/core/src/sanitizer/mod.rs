//! Fragment sanitising.
//!
//! A fragment goes through four passes:
//!
//! 1. parse, retrying once on repaired markup in lenient mode
//! 2. clean: drop, unwrap or keep every element per the [`ElementPolicy`]
//!    and strip bookkeeping attributes
//! 3. restructure until every element sits under a legal parent
//!    ([`nesting`])
//! 4. pull header references out into [`PendingRef`]s ([`extract`])
//!
//! Nothing here touches global state; fragments sanitise independently.

pub(crate) mod extract;
mod nesting;

use crate::config::SanitizerConfig;
use crate::definitions::FragmentDefinitions;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{FragmentFault, Stage};
use crate::schema::{ElementKind, ElementPolicy, TagPolicy, classify, is_header_part};
use quire_traits::FragmentRecord;
use quire_types::{BinaryFormat, DefinitionCategory, LocalId, QuestionId};
use quire_xml::repair::{collapse_double_escapes, repair_markup};
use quire_xml::{Element, Node, NodePath, ParseOptions, parse_fragment};
use std::collections::HashMap;

pub use extract::binary_target;

/// What a removed reference pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Definition {
        category: DefinitionCategory,
        local: LocalId,
    },
    /// A binary, keyed by the fragment's storage id.
    Binary { data: LocalId },
}

/// A reference attribute left empty until the session rewrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRef {
    pub path: NodePath,
    pub attribute: &'static str,
    pub target: RefTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBinary {
    pub format: BinaryFormat,
    pub bytes: Vec<u8>,
}

/// A fragment ready for id rewriting.
#[derive(Debug, Clone)]
pub struct SanitizedFragment {
    pub question: QuestionId,
    /// Top-level paragraphs.
    pub body: Vec<Node>,
    pub references: Vec<PendingRef>,
    pub definitions: FragmentDefinitions,
    pub binaries: HashMap<LocalId, DecodedBinary>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A fragment that will be replaced by a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degraded {
    pub question: QuestionId,
    pub stage: Stage,
    pub fault: FragmentFault,
}

#[derive(Debug, Clone)]
pub enum FragmentOutcome {
    Sanitized(SanitizedFragment),
    Degraded(Degraded),
}

impl FragmentOutcome {
    pub fn question(&self) -> &QuestionId {
        match self {
            FragmentOutcome::Sanitized(f) => &f.question,
            FragmentOutcome::Degraded(d) => &d.question,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, FragmentOutcome::Degraded(_))
    }
}

#[derive(Debug, Clone)]
pub struct Sanitizer {
    config: SanitizerConfig,
    policy: ElementPolicy,
}

impl Sanitizer {
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            config: config.clone(),
            policy: ElementPolicy::new(config),
        }
    }

    /// Sanitises one fragment. Never fails; unusable fragments come back
    /// as [`FragmentOutcome::Degraded`].
    pub fn sanitize(&self, question: &QuestionId, record: &FragmentRecord) -> FragmentOutcome {
        match self.try_sanitize(question, record) {
            Ok(fragment) => {
                log::debug!(
                    "sanitized {question}: {} paragraphs, {} references, {} binaries",
                    fragment.body.len(),
                    fragment.references.len(),
                    fragment.binaries.len()
                );
                FragmentOutcome::Sanitized(fragment)
            }
            Err(fault) => {
                log::warn!("question {question} degraded: {fault}");
                FragmentOutcome::Degraded(Degraded {
                    question: question.clone(),
                    stage: Stage::Sanitize,
                    fault,
                })
            }
        }
    }

    fn try_sanitize(
        &self,
        question: &QuestionId,
        record: &FragmentRecord,
    ) -> Result<SanitizedFragment, FragmentFault> {
        let mut diagnostics = Diagnostics::default();
        let nodes = parse_with_repair(&record.markup, &mut diagnostics)
            .map_err(FragmentFault::Unparseable)?;

        let mut definitions = FragmentDefinitions::default();
        let mut storage = Vec::new();
        extract::collect_header_parts(&nodes, &mut definitions, &mut storage);
        if let Some(text) = &record.definitions {
            let parsed = parse_with_repair(text, &mut diagnostics)
                .map_err(FragmentFault::BadDefinitions)?;
            extract::collect_header_parts(&parsed, &mut definitions, &mut storage);
        }
        let binaries = extract::decode_binaries(&record.binaries, &storage, &definitions)?;

        let cleaned = self.clean(nodes, &mut diagnostics);
        let mut body = nesting::repair_body(cleaned, self.config.note_placement, &mut diagnostics);
        extract::check_binaries(
            &mut body,
            &definitions,
            &binaries,
            self.config.missing_binary,
            &mut diagnostics,
        )?;
        let references = extract::take_references(&mut body, &definitions);

        Ok(SanitizedFragment {
            question: question.clone(),
            body,
            references,
            definitions,
            binaries,
            diagnostics: diagnostics.into_vec(),
        })
    }

    fn clean(&self, nodes: Vec<Node>, diagnostics: &mut Diagnostics) -> Vec<Node> {
        let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Text(text) => {
                    let text = if self.config.collapse_double_escapes {
                        collapse_double_escapes(&text).into_owned()
                    } else {
                        text
                    };
                    push_text(&mut out, text);
                }
                Node::Element(mut el) => match self.policy.decide(&el.name) {
                    TagPolicy::Drop => {
                        if !matches!(classify(&el.name), ElementKind::Wrapper(_))
                            && !is_header_part(&el.name)
                        {
                            diagnostics.push(Diagnostic::DroppedElement { element: el.name });
                        }
                    }
                    TagPolicy::Unwrap => {
                        if !matches!(classify(&el.name), ElementKind::Wrapper(_)) {
                            diagnostics.push(Diagnostic::UnwrappedElement {
                                element: el.name.clone(),
                            });
                        }
                        for child in self.clean(el.children, diagnostics) {
                            match child {
                                Node::Text(text) => push_text(&mut out, text),
                                element => out.push(element),
                            }
                        }
                    }
                    TagPolicy::Keep => {
                        el.span = None;
                        self.clean_attributes(&mut el);
                        let children = std::mem::take(&mut el.children);
                        el.children = self.clean(children, diagnostics);
                        if el.name == "PICTURE" {
                            extract::move_picture_binary(&mut el);
                        }
                        out.push(Node::Element(el));
                    }
                },
            }
        }
        out
    }

    fn clean_attributes(&self, el: &mut Element) {
        let keeps_binary_alias = matches!(el.name.as_str(), "IMAGE" | "PICTURE");
        el.attributes.retain(|attr| {
            if keeps_binary_alias && attr.name == "data-hml-bin-id" {
                return true;
            }
            !crate::schema::is_bookkeeping_attr(&attr.name)
        });
        if self.config.strip_breaks && el.name == "P" {
            el.attributes
                .retain(|attr| !crate::schema::BREAK_ATTRS.contains(&attr.name.as_str()));
        }
        if self.config.collapse_double_escapes {
            for attr in &mut el.attributes {
                if let std::borrow::Cow::Owned(decoded) = collapse_double_escapes(&attr.value) {
                    attr.value = decoded;
                }
            }
        }
    }
}

/// Appends text, merging with a preceding text node.
fn push_text(out: &mut Vec<Node>, text: String) {
    if let Some(Node::Text(last)) = out.last_mut() {
        last.push_str(&text);
    } else {
        out.push(Node::Text(text));
    }
}

/// Strict parse, then one lenient retry on repaired markup.
pub(crate) fn parse_with_repair(markup: &str, diagnostics: &mut Diagnostics) -> Result<Vec<Node>, String> {
    match parse_fragment(markup, ParseOptions::strict()) {
        Ok(nodes) => Ok(nodes),
        Err(strict) => {
            log::debug!("strict parse failed, retrying on repaired markup: {strict}");
            let repaired = repair_markup(markup);
            let nodes = parse_fragment(&repaired, ParseOptions::lenient())
                .map_err(|lenient| format!("{strict}; after repair: {lenient}"))?;
            diagnostics.push(Diagnostic::RepairedMarkup {
                reason: strict.to_string(),
            });
            Ok(nodes)
        }
    }
}
