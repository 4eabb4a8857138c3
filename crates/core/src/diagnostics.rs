//! Non-fatal findings recorded while a fragment is processed.

use quire_types::{DefinitionCategory, LocalId};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Diagnostic {
    /// Strict parsing failed and the repaired markup was used.
    RepairedMarkup { reason: String },
    DroppedElement { element: String },
    UnwrappedElement { element: String },
    /// Loose content was wrapped so it could sit under `parent`.
    WrappedContent { wrapper: String, parent: String },
    DroppedText { parent: String },
    /// An object nested in a character run was moved out of it.
    HoistedObject { element: String },
    RelocatedNote { element: String },
    /// A bare image was given a picture container.
    SynthesizedPicture,
    DroppedPicture { binary: LocalId },
    /// A local reference had no definition; `fallback` is true when it was
    /// pointed at the template's definition with the same id.
    UnresolvedReference {
        category: DefinitionCategory,
        local: LocalId,
        fallback: bool,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::RepairedMarkup { reason } => write!(f, "markup repaired ({reason})"),
            Diagnostic::DroppedElement { element } => write!(f, "dropped <{element}>"),
            Diagnostic::UnwrappedElement { element } => write!(f, "unwrapped <{element}>"),
            Diagnostic::WrappedContent { wrapper, parent } => {
                write!(f, "wrapped loose content of <{parent}> in <{wrapper}>")
            }
            Diagnostic::DroppedText { parent } => write!(f, "dropped stray text in <{parent}>"),
            Diagnostic::HoistedObject { element } => {
                write!(f, "moved <{element}> out of a character run")
            }
            Diagnostic::RelocatedNote { element } => {
                write!(f, "moved <{element}> paragraphs out of the text run")
            }
            Diagnostic::SynthesizedPicture => f.write_str("wrapped a bare image in a picture"),
            Diagnostic::DroppedPicture { binary } => {
                write!(f, "dropped a picture whose binary '{binary}' is missing")
            }
            Diagnostic::UnresolvedReference {
                category,
                local,
                fallback: true,
            } => write!(f, "{category} {local} not supplied, using the template's"),
            Diagnostic::UnresolvedReference {
                category, local, ..
            } => write!(f, "{category} {local} not supplied, reference removed"),
        }
    }
}

/// An ordered, duplicate-free list of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if !self.0.contains(&diagnostic) {
            self.0.push(diagnostic);
        }
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
