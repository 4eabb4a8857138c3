//! Error types for the merge stages.
//!
//! Fragment-level problems are values (`FragmentFault`) carried by a
//! degraded fragment. Storage and packaging problems are fatal errors.

use quire_types::{GlobalId, LocalId};
use quire_xml::XmlError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The pipeline stage an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Fetch,
    Template,
    Sanitize,
    Allocate,
    Assemble,
    Validate,
    WriteBinaries,
    Package,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Template => "template",
            Stage::Sanitize => "sanitize",
            Stage::Allocate => "allocate",
            Stage::Assemble => "assemble",
            Stage::Validate => "validate",
            Stage::WriteBinaries => "write-binaries",
            Stage::Package => "package",
        };
        f.write_str(name)
    }
}

/// Why a single fragment was replaced by a placeholder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FragmentFault {
    #[error("markup could not be parsed even after repair: {0}")]
    Unparseable(String),

    #[error("definitions could not be parsed: {0}")]
    BadDefinitions(String),

    #[error("binary '{0}' is referenced but not supplied")]
    MissingBinary(LocalId),

    #[error("binary '{id}' could not be decoded: {message}")]
    UndecodableBinary { id: LocalId, message: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("binary data {id}: declared size {declared} does not match decoded length {actual}")]
    SizeMismatch {
        id: GlobalId,
        declared: usize,
        actual: usize,
    },

    #[error("binary data {id} does not decode back to its original bytes")]
    RoundTrip { id: GlobalId },

    #[error("binary index has {items} entries but storage has {blobs}")]
    Cardinality { items: usize, blobs: usize },

    #[error("binary item {expected} expected at this position, found {found}")]
    ItemOrder { expected: GlobalId, found: GlobalId },

    #[error("compression failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("base64 decoding failed: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("template '{name}' is not valid UTF-8: {source}")]
    Encoding {
        name: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("template '{name}' is not well-formed: {source}")]
    Template {
        name: String,
        #[source]
        source: XmlError,
    },

    #[error("template root must be <HWPML>, found <{0}>")]
    UnexpectedRoot(String),

    #[error("template has no BODY/SECTION to insert content into")]
    MissingBody,

    #[error("assembled output is not well-formed: {0}")]
    Output(#[source] XmlError),

    #[error("template element <{0}> has no source position")]
    Unlocated(String),

    #[error("splice regions overlap at byte {0}")]
    OverlappingSplice(usize),

    #[error("serialisation failed: {0}")]
    Xml(#[from] XmlError),

    #[error("package is not a readable archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("package part '{0}' is missing")]
    MissingPart(String),

    #[error("package part '{name}' is not valid UTF-8")]
    PartEncoding { name: String },

    #[error("package part '{part}' must have a <{expected}> root, found <{found}>")]
    UnexpectedPartRoot {
        part: String,
        expected: &'static str,
        found: String,
    },

    #[error("writing package failed: {0}")]
    Io(#[from] std::io::Error),
}
