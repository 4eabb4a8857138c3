//! Post-merge integrity gate.
//!
//! Every reference attribute must resolve against the merged header and
//! every constrained element must only hold legal children. Problems in
//! content that came from the template are reported as warnings; problems
//! in fragment content or in newly added definitions are fatal.

use crate::definitions::{DefinitionIndex, DefinitionSet, for_each_entry};
use crate::schema::{is_element_only, is_legal_child, is_null_reference, references_of};
use quire_types::{DefinitionCategory, GlobalId, QuestionId};
use quire_xml::{Element, Node};
use serde::Serialize;
use std::fmt;

/// Who owns the content a violation was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "owner", content = "question", rename_all = "kebab-case")]
pub enum Origin {
    Template,
    Fragment(QuestionId),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Template => f.write_str("template"),
            Origin::Fragment(question) => write!(f, "question {question}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Violation {
    /// A reference whose id is not defined in the merged header.
    UnresolvedReference {
        origin: Origin,
        element: String,
        attribute: String,
        category: DefinitionCategory,
        value: String,
    },
    /// An element or text node under a parent that may not hold it.
    IllegalNesting {
        origin: Origin,
        parent: String,
        child: String,
    },
}

impl Violation {
    pub fn origin(&self) -> &Origin {
        match self {
            Violation::UnresolvedReference { origin, .. } | Violation::IllegalNesting { origin, .. } => {
                origin
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.origin(), Origin::Fragment(_))
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::UnresolvedReference {
                origin,
                element,
                attribute,
                category,
                value,
            } => write!(
                f,
                "{origin}: <{element} {attribute}=\"{value}\"> names no {category}"
            ),
            Violation::IllegalNesting {
                origin,
                parent,
                child,
            } => write!(f, "{origin}: <{child}> is not allowed inside <{parent}>"),
        }
    }
}

/// Every violation found, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    pub fn fatal(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_fatal())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_fatal())
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal().next().is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fatal = self.fatal().count();
        write!(
            f,
            "{fatal} fatal, {} warning(s)",
            self.violations.len() - fatal
        )?;
        for violation in self.fatal() {
            write!(f, "\n  {violation}")?;
        }
        Ok(())
    }
}

pub struct Validator<'a> {
    index: &'a DefinitionIndex,
    report: IntegrityReport,
}

impl<'a> Validator<'a> {
    /// `index` must describe the merged header, not the template's.
    pub fn new(index: &'a DefinitionIndex) -> Self {
        Self {
            index,
            report: IntegrityReport::default(),
        }
    }

    /// Checks `nodes` as the children of an element named `container`.
    pub fn check_body(&mut self, container: &str, nodes: &[Node], origin: &Origin) {
        for node in nodes {
            match node {
                Node::Element(el) => {
                    if !is_legal_child(container, &el.name) {
                        self.nesting(origin, container, &el.name);
                    }
                    self.check_references(el, origin);
                    self.check_body(&el.name, &el.children, origin);
                }
                Node::Text(text) => {
                    if is_element_only(container) && !text.trim().is_empty() {
                        self.nesting(origin, container, "#text");
                    }
                }
            }
        }
    }

    /// Checks references between header definitions.
    ///
    /// Entries listed in `added` are attributed to the question that
    /// brought them; everything else belongs to the template.
    pub fn check_header(&mut self, mapping: Option<&Element>, added: &DefinitionSet) {
        let Some(mapping) = mapping else {
            return;
        };
        let mut entries = Vec::new();
        for_each_entry(mapping, &mut |category, id, element| {
            entries.push((category, id, element));
        });
        for (category, id, element) in entries {
            let origin = added
                .origin_of(category, GlobalId::new(id))
                .map_or(Origin::Template, |q| Origin::Fragment(q.clone()));
            if category == DefinitionCategory::BinItem && element.attr("Type") == Some("Link") {
                continue;
            }
            element.visit(&mut |el| self.check_references(el, &origin));
        }
    }

    fn check_references(&mut self, element: &Element, origin: &Origin) {
        for reference in references_of(&element.name) {
            let Some(value) = element.attr(reference.attribute) else {
                continue;
            };
            if is_null_reference(value) {
                continue;
            }
            let resolved = value
                .trim()
                .parse::<u32>()
                .is_ok_and(|id| self.index.contains(reference.category, id));
            if !resolved {
                self.report.violations.push(Violation::UnresolvedReference {
                    origin: origin.clone(),
                    element: element.name.clone(),
                    attribute: reference.attribute.to_string(),
                    category: reference.category,
                    value: value.to_string(),
                });
            }
        }
    }

    fn nesting(&mut self, origin: &Origin, parent: &str, child: &str) {
        self.report.violations.push(Violation::IllegalNesting {
            origin: origin.clone(),
            parent: parent.to_string(),
            child: child.to_string(),
        });
    }

    pub fn finish(self) -> IntegrityReport {
        let report = self.report;
        if !report.is_clean() {
            log::debug!("integrity check: {report}");
        }
        report
    }
}
