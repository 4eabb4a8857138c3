//! FragmentSource trait for fetching question fragments by id.
//!
//! The merge engine never talks to a database directly. It asks a
//! `FragmentSource` for the raw markup and attachments of each question.

use crate::error::SourceError;
use quire_types::{BinaryFormat, LocalId, PayloadEncoding, QuestionId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

/// One binary attachment of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPayload {
    /// The id the fragment markup uses to refer to this payload.
    pub local_id: LocalId,
    pub format: BinaryFormat,
    pub encoding: PayloadEncoding,
    pub bytes: Vec<u8>,
}

impl BinaryPayload {
    /// A payload whose bytes are the binary itself.
    pub fn raw(local_id: impl Into<LocalId>, format: BinaryFormat, bytes: Vec<u8>) -> Self {
        Self {
            local_id: local_id.into(),
            format,
            encoding: PayloadEncoding::Raw,
            bytes,
        }
    }

    /// A payload carried as base64 text.
    pub fn base64(local_id: impl Into<LocalId>, format: BinaryFormat, text: &str) -> Self {
        Self {
            local_id: local_id.into(),
            format,
            encoding: PayloadEncoding::Base64,
            bytes: text.as_bytes().to_vec(),
        }
    }
}

/// Everything a fragment source knows about one question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentRecord {
    /// Body markup of the question.
    pub markup: String,
    /// Optional `MAPPINGTABLE`-shaped markup with fragment-local definitions.
    pub definitions: Option<String>,
    pub binaries: Vec<BinaryPayload>,
}

impl FragmentRecord {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            ..Self::default()
        }
    }

    pub fn with_definitions(mut self, definitions: impl Into<String>) -> Self {
        self.definitions = Some(definitions.into());
        self
    }

    pub fn with_binary(mut self, payload: BinaryPayload) -> Self {
        self.binaries.push(payload);
        self
    }
}

/// A read-only store of question fragments.
///
/// Implementations must be safe to share between concurrent merges.
pub trait FragmentSource: Send + Sync + Debug {
    /// Fetch a fragment by its question id.
    fn fetch(&self, id: &QuestionId) -> Result<FragmentRecord, SourceError>;

    /// Check if a fragment exists.
    fn contains(&self, id: &QuestionId) -> bool;

    /// Returns a human-readable name for this source (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// An in-memory fragment source.
///
/// Fragments must be inserted before use.
#[derive(Debug, Default)]
pub struct InMemoryFragmentSource {
    fragments: RwLock<HashMap<QuestionId, Arc<FragmentRecord>>>,
}

impl InMemoryFragmentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a fragment.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::LoadFailed` if the internal lock is poisoned.
    pub fn insert(
        &self,
        id: impl Into<QuestionId>,
        record: FragmentRecord,
    ) -> Result<(), SourceError> {
        let id = id.into();
        let mut fragments = self
            .fragments
            .write()
            .map_err(|_| SourceError::poisoned(id.as_str()))?;
        fragments.insert(id, Arc::new(record));
        Ok(())
    }

    /// Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.fragments.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FragmentSource for InMemoryFragmentSource {
    fn fetch(&self, id: &QuestionId) -> Result<FragmentRecord, SourceError> {
        let fragments = self
            .fragments
            .read()
            .map_err(|_| SourceError::poisoned(id.as_str()))?;
        fragments
            .get(id)
            .map(|record| record.as_ref().clone())
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    fn contains(&self, id: &QuestionId) -> bool {
        self.fragments
            .read()
            .map(|f| f.contains_key(id))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "InMemoryFragmentSource"
    }
}
