//! Section assembly: question paragraphs laid out in request order inside
//! the template's `sec`.

use super::owpml::{self, is, qualified};
use crate::assembler::{AssembledBody, QuestionBlock, QuestionContent, QuestionSlot, strip_typed_number};
use crate::config::AssemblyConfig;
use crate::sanitizer::Degraded;
use quire_xml::{Element, Node};

/// Where assembled paragraphs go in the section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInsertion {
    /// Child index of the section the content is inserted at.
    pub index: usize,
    /// Whether the anchor was found.
    pub anchored: bool,
}

/// Removes the anchor text from the section and returns where content
/// goes.
///
/// The anchor paragraph stays when it still carries section setup or
/// text, and content follows it; otherwise the content replaces it.
/// Without an anchor the content goes at the end of the section.
pub fn locate_anchor(section: &mut Element, anchor: &str) -> SectionInsertion {
    let found = (!anchor.is_empty())
        .then(|| {
            section.children.iter().position(|node| {
                node.as_element()
                    .is_some_and(|p| is(&p.name, owpml::PARAGRAPH) && p.text_content().contains(anchor))
            })
        })
        .flatten();
    let Some(index) = found else {
        log::warn!("no content anchor '{anchor}' in section, appending at the end");
        return SectionInsertion {
            index: section.children.len(),
            anchored: false,
        };
    };

    let keep = match section.children.get_mut(index).and_then(Node::as_element_mut) {
        Some(paragraph) => {
            remove_anchor(paragraph, anchor);
            has_content(paragraph)
        }
        None => false,
    };
    if keep {
        SectionInsertion {
            index: index + 1,
            anchored: true,
        }
    } else {
        section.children.remove(index);
        SectionInsertion { index, anchored: true }
    }
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
        el.children.retain(|n| !matches!(n, Node::Text(t) if t.is_empty()));
    });
}

/// Whether a paragraph still shows anything besides empty runs.
fn has_content(paragraph: &Element) -> bool {
    if !paragraph.text_content().trim().is_empty() {
        return true;
    }
    let mut found = false;
    paragraph.visit(&mut |el| {
        let local = owpml::local_name(&el.name);
        if !matches!(local, owpml::PARAGRAPH | owpml::RUN | owpml::TEXT | "linesegarray" | "lineseg") {
            found = true;
        }
    });
    found
}

/// Largest numeric paragraph id below `element`.
pub fn max_paragraph_id(element: &Element) -> Option<u32> {
    let mut max = None;
    element.visit(&mut |el| {
        if is(&el.name, owpml::PARAGRAPH) {
            if let Some(id) = el.attr("id").and_then(|v| v.trim().parse::<u32>().ok()) {
                max = Some(max.map_or(id, |m: u32| m.max(id)));
            }
        }
    });
    max
}

pub struct HwpxAssembler<'a> {
    config: &'a AssemblyConfig,
    /// A paragraph element name of the template, such as `hp:p`.
    paragraph_name: String,
}

impl<'a> HwpxAssembler<'a> {
    pub fn new(config: &'a AssemblyConfig, paragraph_name: impl Into<String>) -> Self {
        Self {
            config,
            paragraph_name: paragraph_name.into(),
        }
    }

    /// Lays out every block in order. Paragraph ids count up from
    /// `first_paragraph_id`.
    pub fn assemble(&self, blocks: Vec<QuestionBlock>, first_paragraph_id: u32) -> AssembledBody {
        let numbering = &self.config.numbering;
        let mut nodes = Vec::new();
        let mut slots = Vec::with_capacity(blocks.len());

        for (position, block) in blocks.into_iter().enumerate() {
            let number = numbering
                .start
                .saturating_add(u32::try_from(position).unwrap_or(u32::MAX));
            let (mut paragraphs, degraded) = match block.content {
                QuestionContent::Merged(paragraphs) => (paragraphs, false),
                QuestionContent::Placeholder(degraded) => (vec![Node::Element(self.placeholder(&degraded))], true),
            };
            if paragraphs.is_empty() {
                paragraphs.push(Node::Element(self.paragraph(None)));
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
            nodes.extend((0..self.config.spacer_paragraphs).map(|_| Node::Element(self.paragraph(None))));
        }

        let mut next_id = first_paragraph_id;
        for node in &mut nodes {
            if let Node::Element(el) = node {
                el.visit_mut(&mut |el| {
                    if is(&el.name, owpml::PARAGRAPH) {
                        el.set_attr("id", next_id);
                        next_id = next_id.saturating_add(1);
                    }
                });
            }
        }

        log::debug!("assembled {} questions into {} paragraphs", slots.len(), nodes.len());
        AssembledBody {
            nodes,
            slots,
            prelude_len: 0,
        }
    }

    fn name(&self, local: &str) -> String {
        qualified(&self.paragraph_name, local)
    }

    /// A plain paragraph with one run, holding `text` if given.
    fn paragraph(&self, text: Option<String>) -> Element {
        let mut run = Element::new(self.name(owpml::RUN)).with_attr("charPrIDRef", 0);
        if let Some(text) = text {
            run = run.with_child(Element::new(self.name(owpml::TEXT)).with_text(text));
        }
        Element::new(self.paragraph_name.as_str())
            .with_attr("id", 0)
            .with_attr("paraPrIDRef", 0)
            .with_attr("styleIDRef", 0)
            .with_attr("pageBreak", 0)
            .with_attr("columnBreak", 0)
            .with_attr("merged", 0)
            .with_child(run)
    }

    fn placeholder(&self, degraded: &Degraded) -> Element {
        let text = self
            .config
            .placeholder_text
            .replace("{id}", degraded.question.as_str())
            .replace("{reason}", &degraded.fault.to_string());
        self.paragraph(Some(text))
    }

    /// Prepends a run holding the question number.
    fn insert_marker(&self, paragraph: &mut Element, number: u32) {
        let numbering = &self.config.numbering;
        let char_shape = numbering.char_shape.map(|id| id.to_string()).or_else(|| {
            paragraph
                .elements()
                .find(|el| is(&el.name, owpml::RUN))
                .and_then(|run| run.attr("charPrIDRef"))
                .map(str::to_string)
        });
        let mut run = Element::new(self.name(owpml::RUN));
        run.set_attr("charPrIDRef", char_shape.unwrap_or_else(|| "0".to_string()));
        let label = numbering.format.replace("{n}", &number.to_string());
        run.children.push(Node::Element(Element::new(self.name(owpml::TEXT)).with_text(label)));
        paragraph.children.insert(0, Node::Element(run));
    }
}

/// Removes a typed question number from the first text of a paragraph.
/// Text after an object is left alone.
fn strip_leading_number(paragraph: &mut Element) -> bool {
    for run in paragraph.elements_mut().filter(|el| is(&el.name, owpml::RUN)) {
        for item in run.elements_mut() {
            if !is(&item.name, owpml::TEXT) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FragmentFault, Stage};
    use quire_types::QuestionId;
    use quire_xml::{ParseOptions, parse_document, parse_fragment, write_nodes};

    fn block(id: &str, markup: &str) -> QuestionBlock {
        QuestionBlock {
            question: QuestionId::from(id),
            content: QuestionContent::Merged(parse_fragment(markup, ParseOptions::strict()).unwrap()),
        }
    }

    fn config(spacers: usize) -> AssemblyConfig {
        AssemblyConfig {
            spacer_paragraphs: spacers,
            ..AssemblyConfig::default()
        }
    }

    #[test]
    fn questions_are_numbered_and_renumbered() {
        let config = config(0);
        let body = HwpxAssembler::new(&config, "hp:p").assemble(
            vec![
                block("a", r#"<hp:p id="0"><hp:run charPrIDRef="4"><hp:t>3. first</hp:t></hp:run></hp:p>"#),
                block("b", r#"<hp:p id="0"><hp:run charPrIDRef="2"><hp:t>second</hp:t></hp:run></hp:p>"#),
            ],
            10,
        );
        assert_eq!(
            write_nodes(&body.nodes).unwrap(),
            concat!(
                r#"<hp:p id="10"><hp:run charPrIDRef="4"><hp:t>1. </hp:t></hp:run><hp:run charPrIDRef="4"><hp:t>first</hp:t></hp:run></hp:p>"#,
                r#"<hp:p id="11"><hp:run charPrIDRef="2"><hp:t>2. </hp:t></hp:run><hp:run charPrIDRef="2"><hp:t>second</hp:t></hp:run></hp:p>"#,
            )
        );
        assert_eq!(body.slots[1].range, 1..2);
    }

    #[test]
    fn numbers_after_an_object_are_kept() {
        let config = config(0);
        let body = HwpxAssembler::new(&config, "hp:p").assemble(
            vec![block(
                "a",
                r#"<hp:p><hp:run charPrIDRef="0"><hp:pic/><hp:t>4. Describe the figure.</hp:t></hp:run></hp:p>"#,
            )],
            0,
        );
        assert!(write_nodes(&body.nodes).unwrap().contains("<hp:t>4. Describe the figure.</hp:t>"));
    }

    #[test]
    fn degraded_questions_become_placeholders() {
        let config = config(1);
        let degraded = Degraded {
            question: QuestionId::from("q9"),
            stage: Stage::Sanitize,
            fault: FragmentFault::Unparseable("bad".to_string()),
        };
        let body = HwpxAssembler::new(&config, "hp:p").assemble(
            vec![QuestionBlock {
                question: QuestionId::from("q9"),
                content: QuestionContent::Placeholder(degraded),
            }],
            0,
        );
        assert_eq!(body.nodes.len(), 2);
        assert!(body.slots[0].degraded);
        let placeholder = body.nodes[0].as_element().unwrap();
        assert!(placeholder.text_content().starts_with("1. "));
        assert!(placeholder.text_content().contains("q9"));
        assert_eq!(body.nodes[1].as_element().unwrap().attr("id"), Some("1"));
    }

    #[test]
    fn anchor_paragraph_with_section_setup_is_kept() {
        let mut section = parse_document(
            r#"<hs:sec><hp:p id="0"><hp:run><hp:secPr/><hp:t>{{CONTENT_HERE}}</hp:t></hp:run></hp:p><hp:p id="1"><hp:run><hp:t>end</hp:t></hp:run></hp:p></hs:sec>"#,
        )
        .unwrap();
        let point = locate_anchor(&mut section, "{{CONTENT_HERE}}");
        assert_eq!(point, SectionInsertion { index: 1, anchored: true });
        assert!(!section.children[0].as_element().unwrap().text_content().contains("CONTENT"));
        assert_eq!(max_paragraph_id(&section), Some(1));
    }

    #[test]
    fn bare_anchor_paragraph_is_replaced() {
        let mut section = parse_document(
            r#"<hs:sec><hp:p id="0"><hp:run><hp:t>intro</hp:t></hp:run></hp:p><hp:p id="1"><hp:run><hp:t>{{CONTENT_HERE}}</hp:t></hp:run></hp:p></hs:sec>"#,
        )
        .unwrap();
        let point = locate_anchor(&mut section, "{{CONTENT_HERE}}");
        assert_eq!(point, SectionInsertion { index: 1, anchored: true });
        assert_eq!(section.children.len(), 1);
    }

    #[test]
    fn missing_anchor_appends() {
        let mut section = parse_document(r#"<hs:sec><hp:p id="0"/></hs:sec>"#).unwrap();
        let point = locate_anchor(&mut section, "{{CONTENT_HERE}}");
        assert_eq!(point, SectionInsertion { index: 1, anchored: false });
    }
}
