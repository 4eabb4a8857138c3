//! # quire-core
//!
//! Platform-agnostic document reassembly for HML exam papers.
//!
//! This crate turns independently authored question fragments into content
//! that can be spliced into a template document:
//! - **sanitizer**: parse, repair and normalise fragment markup
//! - **allocator** / **dedup**: session-scoped global ids and binary dedup
//! - **definitions**: header indexing and `MAPPINGTABLE` merging
//! - **session**: rewrites fragment references to global ids
//! - **assembler**: numbered question blocks in caller order
//! - **validator**: post-merge reference and nesting checks
//! - **binstore**: binary storage encoding with size verification
//! - **template** / **packager**: template parsing and byte-preserving output
//! - **hwpx**: the same merge for HWPX zip packages
//!
//! ## Design Principle
//!
//! This crate has **no platform dependencies**: no filesystem access and no
//! threads. Fragments and templates come in through the traits of
//! `quire-traits`; the caller decides where they live.

pub use quire_traits as traits;
pub use quire_types as types;
pub use quire_xml as xml;

pub mod allocator;
pub mod assembler;
pub mod binstore;
pub mod config;
pub mod definitions;
pub mod dedup;
pub mod diagnostics;
pub mod error;
pub mod hwpx;
pub mod packager;
pub mod sanitizer;
pub mod schema;
pub mod session;
pub mod template;
pub mod validator;

pub use allocator::IdAllocator;
pub use assembler::{AssembledBody, BodyAssembler, QuestionBlock, QuestionContent, QuestionSlot};
pub use binstore::{BinaryStorage, BinaryWriter};
pub use config::{
    AssemblyConfig, BinaryConfig, MergeConfig, MissingBinaryPolicy, NotePlacement, NumberingConfig,
    PackagingConfig, ReferencePolicy, SanitizerConfig,
};
pub use definitions::{DefinitionIndex, DefinitionSet};
pub use dedup::BinaryRegistry;
pub use diagnostics::Diagnostic;
pub use error::{FragmentFault, PackageError, Stage, StorageError};
pub use packager::{PackageParts, Packager};
pub use sanitizer::{Degraded, FragmentOutcome, SanitizedFragment, Sanitizer};
pub use session::{MergeSession, RewrittenFragment, SessionOutput};
pub use template::{InsertionPoint, TemplateDocument};
pub use validator::{IntegrityReport, Origin, Validator, Violation};
