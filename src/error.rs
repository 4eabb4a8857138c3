// src/error.rs
use quire_core::validator::IntegrityReport;
use quire_core::{PackageError, Stage, StorageError};
use quire_traits::SourceError;
use quire_types::QuestionId;
use thiserror::Error;

/// A merge that produced no document.
///
/// Degraded questions are not errors; they are listed in the
/// [`MergeReport`](crate::MergeReport) of a successful merge.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file is invalid: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Fetching question {question} failed: {source}")]
    Fetch {
        question: QuestionId,
        #[source]
        source: SourceError,
    },

    #[error("Loading template '{name}' failed: {source}")]
    TemplateSource {
        name: String,
        #[source]
        source: SourceError,
    },

    #[error("Template is unusable: {0}")]
    Template(#[source] PackageError),

    #[error("Integrity check failed: {0}")]
    Integrity(IntegrityReport),

    #[error("Writing binary storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Packaging failed: {0}")]
    Package(#[from] PackageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    /// The pipeline stage that failed, if the failure happened inside a merge.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            MergeError::Fetch { .. } => Some(Stage::Fetch),
            MergeError::TemplateSource { .. } | MergeError::Template(_) => Some(Stage::Template),
            MergeError::Integrity(_) => Some(Stage::Validate),
            MergeError::Storage(_) => Some(Stage::WriteBinaries),
            MergeError::Package(_) => Some(Stage::Package),
            MergeError::Config(_) | MergeError::ConfigParse(_) | MergeError::Io(_) => None,
        }
    }

    /// The question the failure is attributed to, where there is one.
    pub fn question(&self) -> Option<&QuestionId> {
        match self {
            MergeError::Fetch { question, .. } => Some(question),
            _ => None,
        }
    }
}
