//! TemplateSource trait for resolving baseline documents by name.

use crate::error::SourceError;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

/// Shared template bytes (reference-counted).
pub type SharedTemplateData = Arc<Vec<u8>>;

/// A read-only store of named template documents.
pub trait TemplateSource: Send + Sync + Debug {
    /// Resolve a template name to its bytes.
    fn load(&self, name: &str) -> Result<SharedTemplateData, SourceError>;

    /// Check if a template exists.
    fn exists(&self, name: &str) -> bool;

    /// Returns a human-readable name for this source (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// An in-memory template source.
#[derive(Debug, Default)]
pub struct InMemoryTemplateSource {
    templates: RwLock<HashMap<String, SharedTemplateData>>,
}

impl InMemoryTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template under a name.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::LoadFailed` if the internal lock is poisoned.
    pub fn add(&self, name: impl Into<String>, data: Vec<u8>) -> Result<(), SourceError> {
        let name = name.into();
        let mut templates = self
            .templates
            .write()
            .map_err(|_| SourceError::poisoned(&name))?;
        templates.insert(name, Arc::new(data));
        Ok(())
    }
}

impl TemplateSource for InMemoryTemplateSource {
    fn load(&self, name: &str) -> Result<SharedTemplateData, SourceError> {
        let templates = self
            .templates
            .read()
            .map_err(|_| SourceError::poisoned(name))?;
        templates
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }

    fn exists(&self, name: &str) -> bool {
        self.templates
            .read()
            .map(|t| t.contains_key(name))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "InMemoryTemplateSource"
    }
}
