//! Body assembly: question blocks in request order, each numbered, with
//! placeholders standing in for degraded questions.

use crate::config::AssemblyConfig;
use crate::sanitizer::Degraded;
use once_cell::sync::Lazy;
use quire_types::QuestionId;
use quire_xml::{Element, Node};
use regex::Regex;
use std::ops::Range;

/// A question number the fragment author typed by hand: `3.`, `3)`, `(3)`.
static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\(\d{1,3}\)\s*|\d{1,3}\s*[.)．](?:\s+|$))").expect("valid leading number regex")
});

#[derive(Debug, Clone)]
pub enum QuestionContent {
    /// Rewritten paragraphs.
    Merged(Vec<Node>),
    Placeholder(Degraded),
}

#[derive(Debug, Clone)]
pub struct QuestionBlock {
    pub question: QuestionId,
    pub content: QuestionContent,
}

/// Where a question ended up in the assembled content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSlot {
    pub question: QuestionId,
    pub number: u32,
    /// Paragraph range within [`AssembledBody::nodes`], spacers excluded.
    pub range: Range<usize>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AssembledBody {
    pub nodes: Vec<Node>,
    pub slots: Vec<QuestionSlot>,
    /// Number of leading nodes kept from the template's anchor paragraph.
    pub prelude_len: usize,
}

pub struct BodyAssembler<'a> {
    config: &'a AssemblyConfig,
}

impl<'a> BodyAssembler<'a> {
    pub fn new(config: &'a AssemblyConfig) -> Self {
        Self { config }
    }

    /// Lays out `prelude` followed by every block in order.
    pub fn assemble(&self, prelude: Vec<Node>, blocks: Vec<QuestionBlock>) -> AssembledBody {
        let prelude_len = prelude.len();
        let mut nodes = prelude;
        let mut slots = Vec::with_capacity(blocks.len());
        let numbering = &self.config.numbering;

        for (position, block) in blocks.into_iter().enumerate() {
            let number = numbering
                .start
                .saturating_add(u32::try_from(position).unwrap_or(u32::MAX));
            let (mut paragraphs, degraded) = match block.content {
                QuestionContent::Merged(paragraphs) => (paragraphs, false),
                QuestionContent::Placeholder(degraded) => {
                    (vec![Node::Element(self.placeholder(&degraded))], true)
                }
            };
            if paragraphs.is_empty() {
                paragraphs.push(Node::Element(empty_paragraph()));
            }
            if numbering.enabled {
                if let Some(first) = paragraphs.iter_mut().find_map(Node::as_element_mut) {
                    if numbering.strip_existing && !degraded {
                        strip_leading_number(first);
                    }
                    self.insert_marker(first, number);
                }
            }

            let start = nodes.len();
            nodes.extend(paragraphs);
            slots.push(QuestionSlot {
                question: block.question,
                number,
                range: start..nodes.len(),
                degraded,
            });
            nodes.extend((0..self.config.spacer_paragraphs).map(|_| Node::Element(empty_paragraph())));
        }

        log::debug!(
            "assembled {} questions into {} paragraphs",
            slots.len(),
            nodes.len() - prelude_len
        );
        AssembledBody {
            nodes,
            slots,
            prelude_len,
        }
    }

    fn placeholder(&self, degraded: &Degraded) -> Element {
        let text = self
            .config
            .placeholder_text
            .replace("{id}", degraded.question.as_str())
            .replace("{reason}", &degraded.fault.to_string());
        Element::new("P").with_child(
            Element::new("TEXT").with_child(Element::new("CHAR").with_text(text)),
        )
    }

    /// Prepends a run holding the question number.
    fn insert_marker(&self, paragraph: &mut Element, number: u32) {
        let numbering = &self.config.numbering;
        let char_shape = numbering.char_shape.map(|id| id.to_string()).or_else(|| {
            paragraph
                .child("TEXT")
                .and_then(|run| run.attr("CharShape"))
                .map(str::to_string)
        });
        let mut run = Element::new("TEXT");
        if let Some(shape) = char_shape {
            run.set_attr("CharShape", shape);
        }
        let label = numbering.format.replace("{n}", &number.to_string());
        run.children.push(Node::Element(Element::new("CHAR").with_text(label)));
        paragraph.children.insert(0, Node::Element(run));
    }
}

fn empty_paragraph() -> Element {
    Element::new("P").with_child(Element::new("TEXT"))
}

/// Removes a typed question number from the first visible text.
///
/// Only text that comes before any object is considered.
fn strip_leading_number(paragraph: &mut Element) -> bool {
    for run in paragraph.elements_mut().filter(|el| el.name == "TEXT") {
        for item in run.elements_mut() {
            if item.name != "CHAR" {
                return false;
            }
            for node in &mut item.children {
                match node {
                    Node::Text(text) if text.trim().is_empty() => continue,
                    Node::Text(text) => return strip_typed_number(text),
                    Node::Element(_) => return false,
                }
            }
        }
    }
    false
}

/// Removes a typed question number from the start of `text`.
pub(crate) fn strip_typed_number(text: &mut String) -> bool {
    let Some(found) = LEADING_NUMBER.find(text) else {
        return false;
    };
    text.replace_range(..found.end(), "");
    true
}
