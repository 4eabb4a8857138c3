//! Configuration for the merge stages.
//!
//! Every struct deserialises with defaults for missing fields, so a config
//! file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where relocated endnote/footnote paragraphs go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotePlacement {
    /// Directly after the paragraph that held the note.
    #[default]
    AfterOrigin,
    /// Directly before the paragraph that held the note.
    BeforeOrigin,
    /// After the last paragraph of the question.
    EndOfQuestion,
}

/// What to do when a picture references a binary the fragment did not supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingBinaryPolicy {
    /// Replace the whole question with a placeholder.
    #[default]
    Degrade,
    /// Remove the picture and keep the rest of the question.
    DropPicture,
}

/// What to do with a reference to a definition the fragment did not supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferencePolicy {
    /// Point at the template definition with the same id, if there is one.
    #[default]
    TemplateFallback,
    /// Remove the reference attribute.
    Strip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Body elements kept as-is. `None` keeps the built-in vocabulary.
    pub allowed_elements: Option<BTreeSet<String>>,
    /// Elements removed together with their subtree.
    pub dropped_elements: BTreeSet<String>,
    /// Remove `ColumnBreak`/`PageBreak` paragraph attributes.
    pub strip_breaks: bool,
    /// Decode text that arrived escaped twice.
    pub collapse_double_escapes: bool,
    pub note_placement: NotePlacement,
    pub missing_binary: MissingBinaryPolicy,
    pub unresolved_reference: ReferencePolicy,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            allowed_elements: None,
            dropped_elements: crate::schema::LAYOUT_CONTROLS
                .iter()
                .map(|tag| tag.to_string())
                .chain(["COLBREAK".to_string()])
                .collect(),
            strip_breaks: true,
            collapse_double_escapes: true,
            note_placement: NotePlacement::default(),
            missing_binary: MissingBinaryPolicy::default(),
            unresolved_reference: ReferencePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    pub enabled: bool,
    /// Marker text; `{n}` is replaced by the question number.
    pub format: String,
    pub start: u32,
    /// Remove a number the fragment already starts with.
    pub strip_existing: bool,
    /// Character shape of the marker run. Falls back to the first run's.
    pub char_shape: Option<u32>,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: "{n}. ".to_string(),
            start: 1,
            strip_existing: true,
            char_shape: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub numbering: NumberingConfig,
    /// Empty paragraphs inserted after each question.
    pub spacer_paragraphs: usize,
    /// Text of a degraded question; `{id}` and `{reason}` are substituted.
    pub placeholder_text: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            numbering: NumberingConfig::default(),
            spacer_paragraphs: 1,
            placeholder_text: "[question {id} unavailable: {reason}]".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryConfig {
    /// Formats stored deflated when that makes them smaller.
    pub compress_formats: BTreeSet<String>,
    /// Base64 line width in the storage section; 0 disables wrapping.
    pub line_width: usize,
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            compress_formats: ["bmp", "wmf", "emf", "svg", "tif", "tiff"]
                .into_iter()
                .map(String::from)
                .collect(),
            line_width: 76,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// Text marking where question content goes.
    pub anchor: String,
    pub title_placeholder: String,
    pub date_placeholder: String,
    /// chrono format string for the date substitution.
    pub date_format: String,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            anchor: "{{CONTENT_HERE}}".to_string(),
            title_placeholder: "{{TITLE}}".to_string(),
            date_placeholder: "{{DATE}}".to_string(),
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

/// All merge settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub sanitizer: SanitizerConfig,
    pub assembly: AssemblyConfig,
    pub binaries: BinaryConfig,
    pub packaging: PackagingConfig,
}

impl MergeConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
