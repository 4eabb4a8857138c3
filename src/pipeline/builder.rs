// src/pipeline/builder.rs
use super::config::load_config;
use super::engine::MergeEngine;
use crate::error::MergeError;
use quire_core::{MergeConfig, MissingBinaryPolicy, NotePlacement, NumberingConfig, ReferencePolicy};
use quire_resource::{FilesystemFragmentSource, FilesystemTemplateSource};
use quire_traits::{FragmentSource, TemplateSource};
use std::path::Path;
use std::sync::Arc;

/// A builder for creating a `MergeEngine`.
#[derive(Debug, Default)]
pub struct MergeEngineBuilder {
    fragments: Option<Arc<dyn FragmentSource>>,
    templates: Option<Arc<dyn TemplateSource>>,
    config: MergeConfig,
}

impl MergeEngineBuilder {
    /// Creates a new `MergeEngineBuilder` with default settings and no sources.
    pub fn new() -> Self { Default::default() }

    /// Sets the store questions are fetched from.
    pub fn with_fragment_source(mut self, source: impl FragmentSource + 'static) -> Self {
        self.fragments = Some(Arc::new(source));
        self
    }

    /// Shares an existing fragment store between several engines.
    pub fn with_shared_fragment_source(mut self, source: Arc<dyn FragmentSource>) -> Self {
        self.fragments = Some(source);
        self
    }

    /// Sets the store templates are loaded from.
    pub fn with_template_source(mut self, source: impl TemplateSource + 'static) -> Self {
        self.templates = Some(Arc::new(source));
        self
    }

    pub fn with_shared_template_source(mut self, source: Arc<dyn TemplateSource>) -> Self {
        self.templates = Some(source);
        self
    }

    /// Reads fragments from a directory. See `FilesystemFragmentSource` for the layout.
    pub fn with_fragment_dir<P: AsRef<Path>>(self, path: P) -> Self {
        self.with_fragment_source(FilesystemFragmentSource::new(path))
    }

    /// Reads templates from a directory, one file per template name.
    pub fn with_template_dir<P: AsRef<Path>>(self, path: P) -> Self {
        self.with_template_source(FilesystemTemplateSource::new(path))
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: MergeConfig) -> Self { self.config = config; self }

    /// Loads the configuration from a JSON file.
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, MergeError> {
        self.config = load_config(path)?;
        Ok(self)
    }

    pub fn with_numbering(mut self, numbering: NumberingConfig) -> Self { self.config.assembly.numbering = numbering; self }

    /// Where endnote and footnote paragraphs are moved to.
    pub fn with_note_placement(mut self, placement: NotePlacement) -> Self { self.config.sanitizer.note_placement = placement; self }

    pub fn with_missing_binary_policy(mut self, policy: MissingBinaryPolicy) -> Self { self.config.sanitizer.missing_binary = policy; self }

    pub fn with_reference_policy(mut self, policy: ReferencePolicy) -> Self { self.config.sanitizer.unresolved_reference = policy; self }

    /// Empty paragraphs placed after each question.
    pub fn with_spacer_paragraphs(mut self, count: usize) -> Self { self.config.assembly.spacer_paragraphs = count; self }

    /// Consumes the builder and creates the `MergeEngine`.
    pub fn build(self) -> Result<MergeEngine, MergeError> {
        let fragments = self.fragments.ok_or_else(|| {
            MergeError::Config(
                "No fragment source has been configured. Use `with_fragment_source` or `with_fragment_dir`."
                    .to_string(),
            )
        })?;
        let templates = self.templates.ok_or_else(|| {
            MergeError::Config(
                "No template source has been configured. Use `with_template_source` or `with_template_dir`."
                    .to_string(),
            )
        })?;
        log::info!(
            "merge engine ready (fragments: {}, templates: {})",
            fragments.name(),
            templates.name()
        );
        Ok(MergeEngine::new(fragments, templates, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_traits::{InMemoryFragmentSource, InMemoryTemplateSource};

    #[test]
    fn build_requires_both_sources() {
        let err = MergeEngineBuilder::new()
            .with_fragment_source(InMemoryFragmentSource::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, MergeError::Config(msg) if msg.contains("template source")));

        let err = MergeEngineBuilder::new()
            .with_template_source(InMemoryTemplateSource::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, MergeError::Config(msg) if msg.contains("fragment source")));
    }

    #[test]
    fn setters_reach_the_config() {
        let engine = MergeEngineBuilder::new()
            .with_fragment_source(InMemoryFragmentSource::new())
            .with_template_source(InMemoryTemplateSource::new())
            .with_note_placement(NotePlacement::BeforeOrigin)
            .with_spacer_paragraphs(0)
            .with_reference_policy(ReferencePolicy::Strip)
            .build()
            .unwrap();
        let config = engine.config();
        assert_eq!(config.sanitizer.note_placement, NotePlacement::BeforeOrigin);
        assert_eq!(config.assembly.spacer_paragraphs, 0);
        assert_eq!(config.sanitizer.unresolved_reference, ReferencePolicy::Strip);
    }
}
