//! # quire
//!
//! Reassembles exam documents from independently authored HML question
//! fragments. The heavy lifting lives in `quire-core`; this crate wires
//! fragment and template sources into a [`MergeEngine`] and reports what
//! happened to every question.

pub mod error;
pub mod pipeline;

pub use error::MergeError;
pub use pipeline::{
    DegradedQuestion, MergeEngine, MergeEngineBuilder, MergeOutput, MergeReport, MergeRequest,
    QuestionWarning, load_config,
};

pub use quire_core::{Diagnostic, MergeConfig, Stage};
pub use quire_resource::{FilesystemFragmentSource, FilesystemTemplateSource};
pub use quire_traits::{
    BinaryPayload, FragmentRecord, FragmentSource, InMemoryFragmentSource, InMemoryTemplateSource,
    SourceError, TemplateSource,
};
pub use quire_types::{BinaryFormat, PayloadEncoding, QuestionId};
