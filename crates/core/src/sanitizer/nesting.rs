//! Structural repairs: wrap, hoist, unwrap and relocate until every
//! element sits under a parent that may hold it.

use crate::config::NotePlacement;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::{BodyTag, is_char_content, is_inline, is_legal_child, is_note};
use quire_xml::{Element, Node};
use std::collections::VecDeque;

/// Default picture frame size in HWPUNIT (about 50mm x 36mm).
const PICTURE_WIDTH: u32 = 17700;
const PICTURE_HEIGHT: u32 = 12960;

/// Repairs the top level of a fragment into a list of paragraphs.
pub(super) fn repair_body(
    nodes: Vec<Node>,
    placement: NotePlacement,
    diagnostics: &mut Diagnostics,
) -> Vec<Node> {
    let mut repairer = Repairer {
        placement,
        diagnostics,
        trailing: Vec::new(),
    };
    let mut body = repairer.paragraph_list("SECTION", nodes);
    body.append(&mut repairer.trailing);
    body
}

struct Repairer<'d> {
    placement: NotePlacement,
    diagnostics: &'d mut Diagnostics,
    /// Note paragraphs waiting for the end of the question.
    trailing: Vec<Node>,
}

/// How a node fits under a paragraph or run.
enum Fit {
    Paragraph,
    Run,
    /// Belongs inside a run: text, characters, inline objects, notes.
    Inline,
    Foreign,
}

fn fit(node: &Node) -> Fit {
    let Node::Element(el) = node else {
        return Fit::Inline;
    };
    match BodyTag::from_name(&el.name) {
        Some(BodyTag::Paragraph) => Fit::Paragraph,
        Some(BodyTag::Text) => Fit::Run,
        Some(tag)
            if tag == BodyTag::Char
                || tag == BodyTag::Image
                || is_inline(tag)
                || is_char_content(tag)
                || is_note(tag) =>
        {
            Fit::Inline
        }
        Some(_) => Fit::Foreign,
        // Unknown names only survive cleaning when explicitly allowed.
        None => Fit::Inline,
    }
}

impl Repairer<'_> {
    fn unwrapped(&mut self, el: Element, queue: &mut VecDeque<Node>) {
        self.diagnostics.push(Diagnostic::UnwrappedElement {
            element: el.name,
        });
        for child in el.children.into_iter().rev() {
            queue.push_front(child);
        }
    }

    fn wrapped(&mut self, wrapper: &str, parent: &str) {
        self.diagnostics.push(Diagnostic::WrappedContent {
            wrapper: wrapper.to_string(),
            parent: parent.to_string(),
        });
    }

    /// Children of a paragraph container.
    fn paragraph_list(&mut self, parent: &str, nodes: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut loose = Vec::new();
        let mut queue: VecDeque<Node> = nodes.into();

        while let Some(node) = queue.pop_front() {
            if node.is_blank_text() {
                continue;
            }
            match fit(&node) {
                Fit::Paragraph => {
                    self.flush_paragraph(parent, &mut loose, &mut out);
                    if let Node::Element(el) = node {
                        self.paragraph(el, &mut out);
                    }
                }
                Fit::Run | Fit::Inline => loose.push(node),
                Fit::Foreign => {
                    if let Node::Element(el) = node {
                        self.unwrapped(el, &mut queue);
                    }
                }
            }
        }
        self.flush_paragraph(parent, &mut loose, &mut out);
        out
    }

    fn flush_paragraph(&mut self, parent: &str, loose: &mut Vec<Node>, out: &mut Vec<Node>) {
        if loose.is_empty() {
            return;
        }
        self.wrapped("P", parent);
        let mut paragraph = Element::new("P");
        paragraph.children = std::mem::take(loose);
        self.paragraph(paragraph, out);
    }

    /// Repairs a paragraph and emits it with its relocated notes.
    fn paragraph(&mut self, mut el: Element, out: &mut Vec<Node>) {
        let children = std::mem::take(&mut el.children);
        el.children = self.run_list(children);

        let mut notes = Vec::new();
        for run in el.elements_mut() {
            let (moved, kept): (Vec<Node>, Vec<Node>) = std::mem::take(&mut run.children)
                .into_iter()
                .partition(is_note_node);
            run.children = kept;
            for note in moved {
                if let Node::Element(note) = note {
                    self.diagnostics.push(Diagnostic::RelocatedNote {
                        element: note.name.clone(),
                    });
                    notes.extend(note_paragraphs(note));
                }
            }
        }

        let paragraph = Node::Element(el);
        match self.placement {
            NotePlacement::AfterOrigin => {
                out.push(paragraph);
                out.extend(notes);
            }
            NotePlacement::BeforeOrigin => {
                out.extend(notes);
                out.push(paragraph);
            }
            NotePlacement::EndOfQuestion => {
                out.push(paragraph);
                self.trailing.extend(notes);
            }
        }
    }

    /// Children of a paragraph: runs only.
    fn run_list(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut loose = Vec::new();
        let mut queue: VecDeque<Node> = nodes.into();

        while let Some(node) = queue.pop_front() {
            if node.is_blank_text() && loose.is_empty() {
                continue;
            }
            match fit(&node) {
                Fit::Run => {
                    self.flush_run(&mut loose, &mut out);
                    if let Node::Element(el) = node {
                        out.push(Node::Element(self.run(el)));
                    }
                }
                Fit::Inline => loose.push(node),
                Fit::Paragraph | Fit::Foreign => {
                    if let Node::Element(el) = node {
                        self.unwrapped(el, &mut queue);
                    }
                }
            }
        }
        self.flush_run(&mut loose, &mut out);
        out
    }

    fn flush_run(&mut self, loose: &mut Vec<Node>, out: &mut Vec<Node>) {
        while loose.last().is_some_and(Node::is_blank_text) {
            loose.pop();
        }
        if loose.is_empty() {
            return;
        }
        self.wrapped("TEXT", "P");
        let mut run = Element::new("TEXT");
        run.children = std::mem::take(loose);
        out.push(Node::Element(self.run(run)));
    }

    /// A run: character groups and inline objects.
    fn run(&mut self, mut el: Element) -> Element {
        let mut out = Vec::new();
        let mut chars = Vec::new();
        let mut queue: VecDeque<Node> = std::mem::take(&mut el.children).into();

        while let Some(node) = queue.pop_front() {
            let element = match node {
                Node::Text(text) => {
                    if !text.trim().is_empty() || !chars.is_empty() {
                        chars.push(Node::Text(text));
                    }
                    continue;
                }
                Node::Element(element) => element,
            };
            match BodyTag::from_name(&element.name) {
                Some(BodyTag::Char) => {
                    self.flush_chars(&mut chars, &mut out);
                    out.extend(self.char_group(element));
                }
                Some(tag) if is_char_content(tag) => chars.push(Node::Element(element)),
                Some(BodyTag::Image) => {
                    self.flush_chars(&mut chars, &mut out);
                    out.push(Node::Element(self.synthesized_picture(element)));
                }
                Some(tag) if is_inline(tag) || is_note(tag) => {
                    self.flush_chars(&mut chars, &mut out);
                    out.push(Node::Element(self.element(element)));
                }
                None => {
                    self.flush_chars(&mut chars, &mut out);
                    out.push(Node::Element(self.element(element)));
                }
                Some(_) => self.unwrapped(element, &mut queue),
            }
        }
        self.flush_chars(&mut chars, &mut out);
        el.children = out;
        el
    }

    fn flush_chars(&mut self, chars: &mut Vec<Node>, out: &mut Vec<Node>) {
        if chars.is_empty() {
            return;
        }
        self.wrapped("CHAR", "TEXT");
        let mut group = Element::new("CHAR");
        group.children = std::mem::take(chars);
        out.push(Node::Element(group));
    }

    /// A character group, split around any object found inside it.
    fn char_group(&mut self, mut el: Element) -> Vec<Node> {
        let template = Element {
            name: el.name.clone(),
            attributes: el.attributes.clone(),
            children: Vec::new(),
            span: None,
        };
        let mut out = Vec::new();
        let mut current = template.clone();
        let mut queue: VecDeque<Node> = std::mem::take(&mut el.children).into();

        while let Some(node) = queue.pop_front() {
            let element = match node {
                Node::Text(text) => {
                    current.children.push(Node::Text(text));
                    continue;
                }
                Node::Element(element) => element,
            };
            match BodyTag::from_name(&element.name) {
                Some(tag) if is_char_content(tag) => current.children.push(Node::Element(element)),
                Some(tag) if tag == BodyTag::Image || is_inline(tag) || is_note(tag) => {
                    self.diagnostics.push(Diagnostic::HoistedObject {
                        element: element.name.clone(),
                    });
                    if !current.children.is_empty() {
                        out.push(Node::Element(std::mem::replace(&mut current, template.clone())));
                    }
                    let object = if tag == BodyTag::Image {
                        self.synthesized_picture(element)
                    } else {
                        self.element(element)
                    };
                    out.push(Node::Element(object));
                }
                _ => self.unwrapped(element, &mut queue),
            }
        }
        if !current.children.is_empty() || out.is_empty() {
            out.push(Node::Element(current));
        }
        out
    }

    /// Repairs any element below run level, dispatching on its name.
    fn element(&mut self, mut el: Element) -> Element {
        let children = std::mem::take(&mut el.children);
        el.children = match el.name.as_str() {
            "PARALIST" => self.paragraph_list("PARALIST", children),
            "TABLE" => self.table(children),
            "ROW" => self.constrained("ROW", children),
            "CELL" => self.cell(children),
            "PICTURE" => self.picture(children),
            "ENDNOTE" | "FOOTNOTE" => self.note(&el.name, children),
            "EQUATION" => self.constrained("EQUATION", children),
            "CHAR" | "TEXT" | "P" => children,
            _ => children
                .into_iter()
                .map(|node| match node {
                    Node::Element(child) => Node::Element(self.element(child)),
                    text => text,
                })
                .collect(),
        };
        if el.name == "IMAGE" {
            apply_image_defaults(&mut el);
        }
        el
    }

    /// Keeps legal children, unwraps the rest, drops stray text.
    fn constrained(&mut self, parent: &str, nodes: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut queue: VecDeque<Node> = nodes.into();
        while let Some(node) = queue.pop_front() {
            match node {
                Node::Text(text) if text.trim().is_empty() => {}
                Node::Text(_) => self.diagnostics.push(Diagnostic::DroppedText {
                    parent: parent.to_string(),
                }),
                Node::Element(el) if is_legal_child(parent, &el.name) => {
                    out.push(Node::Element(self.element(el)));
                }
                Node::Element(el) => self.unwrapped(el, &mut queue),
            }
        }
        out
    }

    fn table(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut cells = Vec::new();
        let mut queue: VecDeque<Node> = nodes.into();

        while let Some(node) = queue.pop_front() {
            match node {
                Node::Text(text) if text.trim().is_empty() => {}
                Node::Text(_) => self.diagnostics.push(Diagnostic::DroppedText {
                    parent: "TABLE".to_string(),
                }),
                Node::Element(el) if el.name == "CELL" => cells.push(Node::Element(el)),
                Node::Element(el) if is_legal_child("TABLE", &el.name) => {
                    self.flush_row(&mut cells, &mut out);
                    out.push(Node::Element(self.element(el)));
                }
                Node::Element(el) => self.unwrapped(el, &mut queue),
            }
        }
        self.flush_row(&mut cells, &mut out);
        out
    }

    fn flush_row(&mut self, cells: &mut Vec<Node>, out: &mut Vec<Node>) {
        if cells.is_empty() {
            return;
        }
        self.wrapped("ROW", "TABLE");
        let mut row = Element::new("ROW");
        row.children = std::mem::take(cells);
        out.push(Node::Element(self.element(row)));
    }

    /// A cell holds exactly one paragraph list; loose content joins it.
    fn cell(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        let mut list: Option<Element> = None;
        let mut content = Vec::new();
        let mut loose = false;
        for node in nodes {
            match node {
                Node::Element(el) if el.name == "PARALIST" => {
                    let mut el = el;
                    content.append(&mut el.children);
                    list.get_or_insert(el);
                }
                Node::Text(text) if text.trim().is_empty() => {}
                other => {
                    loose = true;
                    content.push(other);
                }
            }
        }
        if loose {
            self.wrapped("PARALIST", "CELL");
        }
        if list.is_none() && content.is_empty() {
            return Vec::new();
        }
        let mut list = list.unwrap_or_else(|| Element::new("PARALIST"));
        list.children = self.paragraph_list("PARALIST", content);
        vec![Node::Element(list)]
    }

    fn note(&mut self, name: &str, nodes: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut paragraphs = Vec::new();
        for node in nodes {
            match node {
                Node::Element(el) if el.name == "PARALIST" => {
                    out.push(Node::Element(self.element(el)));
                }
                Node::Element(el) if el.name == "AUTONUMFORMAT" => out.push(Node::Element(el)),
                Node::Text(text) if text.trim().is_empty() => {}
                other => paragraphs.push(other),
            }
        }
        if !paragraphs.is_empty() {
            self.wrapped("PARALIST", name);
            let mut list = Element::new("PARALIST");
            list.children = self.paragraph_list("PARALIST", paragraphs);
            out.push(Node::Element(list));
        }
        out
    }

    fn picture(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        let mut children = self.constrained("PICTURE", nodes);
        ensure_picture_parts(&mut children);
        children
    }

    fn synthesized_picture(&mut self, image: Element) -> Element {
        self.diagnostics.push(Diagnostic::SynthesizedPicture);
        let picture = Element::new("PICTURE")
            .with_attr("Reverse", "false")
            .with_child(image);
        self.element(picture)
    }
}

fn is_note_node(node: &Node) -> bool {
    node.as_element()
        .and_then(|el| BodyTag::from_name(&el.name))
        .is_some_and(is_note)
}

/// Paragraphs a note carries, already repaired.
fn note_paragraphs(note: Element) -> Vec<Node> {
    note.children
        .into_iter()
        .filter_map(|n| match n {
            Node::Element(el) if el.name == "PARALIST" => Some(el.children),
            _ => None,
        })
        .flatten()
        .collect()
}

fn apply_image_defaults(image: &mut Element) {
    image.set_attr_if_missing("Effect", "RealPic");
    image.set_attr_if_missing("Alpha", 0);
    image.set_attr_if_missing("Bright", 0);
    image.set_attr_if_missing("Contrast", 0);
}

fn child_index(children: &[Node], name: &str) -> Option<usize> {
    children.iter().position(|n| n.is_element(name))
}

/// Gives a picture the frame it needs to be laid out inline: an object
/// header with size and character-anchored position, a shape component,
/// and image rectangle and clip matching the frame size.
fn ensure_picture_parts(children: &mut Vec<Node>) {
    let object_at = match child_index(children, "SHAPEOBJECT") {
        Some(index) => index,
        None => {
            let object = Element::new("SHAPEOBJECT")
                .with_attr("Lock", "false")
                .with_attr("NumberingType", "Figure")
                .with_attr("ZOrder", 0);
            children.insert(0, Node::Element(object));
            0
        }
    };

    let (width, height) = {
        let Some(object) = children[object_at].as_element_mut() else {
            return;
        };
        if object.child("SIZE").is_none() {
            object.children.push(Node::Element(
                Element::new("SIZE")
                    .with_attr("Width", PICTURE_WIDTH)
                    .with_attr("Height", PICTURE_HEIGHT)
                    .with_attr("WidthRelTo", "Absolute")
                    .with_attr("HeightRelTo", "Absolute")
                    .with_attr("Protect", "false"),
            ));
        }
        match object.child_mut("POSITION") {
            Some(position) => position.set_attr("TreatAsChar", "true"),
            None => object.children.push(Node::Element(
                Element::new("POSITION")
                    .with_attr("TreatAsChar", "true")
                    .with_attr("AffectLSpacing", "false")
                    .with_attr("VertRelTo", "Para")
                    .with_attr("HorzRelTo", "Column")
                    .with_attr("VertAlign", "Top")
                    .with_attr("HorzAlign", "Left")
                    .with_attr("VertOffset", 0)
                    .with_attr("HorzOffset", 0)
                    .with_attr("FlowWithText", "true")
                    .with_attr("AllowOverlap", "false"),
            )),
        }
        let size = object.child("SIZE");
        let dimension = |name: &str, default: u32| {
            size.and_then(|s| s.attr(name))
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(default)
        };
        (dimension("Width", PICTURE_WIDTH), dimension("Height", PICTURE_HEIGHT))
    };

    let mut after = object_at + 1;
    if child_index(children, "SHAPECOMPONENT").is_none() {
        children.insert(
            after,
            Node::Element(
                Element::new("SHAPECOMPONENT")
                    .with_attr("OriWidth", width)
                    .with_attr("OriHeight", height)
                    .with_attr("XPos", 0)
                    .with_attr("YPos", 0)
                    .with_attr("GroupLevel", 0),
            ),
        );
    }
    if let Some(index) = child_index(children, "SHAPECOMPONENT") {
        after = index + 1;
    }
    if child_index(children, "IMAGERECT").is_none() {
        children.insert(
            after,
            Node::Element(
                Element::new("IMAGERECT")
                    .with_attr("X0", 0)
                    .with_attr("Y0", 0)
                    .with_attr("X1", width)
                    .with_attr("Y1", 0)
                    .with_attr("X2", width)
                    .with_attr("Y2", height)
                    .with_attr("X3", 0)
                    .with_attr("Y3", height),
            ),
        );
    }
    if let Some(index) = child_index(children, "IMAGERECT") {
        after = index + 1;
    }
    if child_index(children, "IMAGECLIP").is_none() {
        children.insert(
            after,
            Node::Element(
                Element::new("IMAGECLIP")
                    .with_attr("Left", 0)
                    .with_attr("Top", 0)
                    .with_attr("Right", width)
                    .with_attr("Bottom", height),
            ),
        );
    }
}
