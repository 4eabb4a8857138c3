//! Directory-backed fragment source.
//!
//! Layout under the base directory, per question id:
//!
//! ```text
//! <id>.xml                    markup only
//! <id>/content.xml            markup
//! <id>/definitions.xml        optional MAPPINGTABLE-shaped definitions
//! <id>/bin/<local>.<ext>      raw binary
//! <id>/bin/<local>.<ext>.b64  base64 text
//! <id>/bin/<local>.<ext>.b64z base64 text of a raw deflate stream
//! ```

use crate::root::SafeRoot;
use log::debug;
use quire_traits::{BinaryPayload, FragmentRecord, FragmentSource, SourceError};
use quire_types::{BinaryFormat, LocalId, PayloadEncoding, QuestionId};
use std::path::Path;

#[derive(Debug)]
pub struct FilesystemFragmentSource {
    root: SafeRoot,
}

impl FilesystemFragmentSource {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            root: SafeRoot::new(base_path),
        }
    }

    pub fn base(&self) -> &Path {
        self.root.base()
    }

    fn checked_id(id: &QuestionId) -> Result<&str, SourceError> {
        let id = id.as_str();
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
            return Err(SourceError::InvalidId(id.to_string()));
        }
        Ok(id)
    }

    fn read_text(&self, path: &str) -> Result<String, SourceError> {
        let bytes = self.root.read(path)?;
        String::from_utf8(bytes).map_err(|e| SourceError::LoadFailed {
            id: path.to_string(),
            message: e.to_string(),
        })
    }

    fn read_optional_text(&self, path: &str) -> Result<Option<String>, SourceError> {
        match self.read_text(path) {
            Ok(text) => Ok(Some(text)),
            Err(SourceError::NotFound(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    fn read_binaries(&self, id: &str) -> Result<Vec<BinaryPayload>, SourceError> {
        let Some(dir) = self.root.resolve(&format!("{id}/bin")) else {
            return Ok(Vec::new());
        };
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
            .collect();
        names.sort();

        let mut payloads = Vec::with_capacity(names.len());
        for name in names {
            let Some((local_id, format, encoding)) = parse_binary_name(&name) else {
                debug!("Skipping unrecognised binary file '{}' of fragment {}", name, id);
                continue;
            };
            let bytes = self.root.read(&format!("{id}/bin/{name}"))?;
            payloads.push(BinaryPayload {
                local_id,
                format,
                encoding,
                bytes,
            });
        }
        Ok(payloads)
    }
}

/// Splits `<local>.<ext>[.b64|.b64z]` into its parts.
fn parse_binary_name(name: &str) -> Option<(LocalId, BinaryFormat, PayloadEncoding)> {
    let (stem, encoding) = if let Some(stem) = name.strip_suffix(".b64z") {
        (stem, PayloadEncoding::Base64Deflate)
    } else if let Some(stem) = name.strip_suffix(".b64") {
        (stem, PayloadEncoding::Base64)
    } else {
        (name, PayloadEncoding::Raw)
    };
    let (local, ext) = stem.rsplit_once('.')?;
    if local.is_empty() || ext.is_empty() {
        return None;
    }
    Some((LocalId::from(local), BinaryFormat::from_tag(ext), encoding))
}

impl FragmentSource for FilesystemFragmentSource {
    fn fetch(&self, id: &QuestionId) -> Result<FragmentRecord, SourceError> {
        let id = Self::checked_id(id)?;

        if let Some(markup) = self.read_optional_text(&format!("{id}/content.xml"))? {
            let definitions = self.read_optional_text(&format!("{id}/definitions.xml"))?;
            let binaries = self.read_binaries(id)?;
            debug!(
                "Loaded fragment {} from directory ({} binaries)",
                id,
                binaries.len()
            );
            return Ok(FragmentRecord {
                markup,
                definitions,
                binaries,
            });
        }

        match self.read_text(&format!("{id}.xml")) {
            Ok(markup) => Ok(FragmentRecord::new(markup)),
            Err(SourceError::NotFound(_)) => Err(SourceError::NotFound(id.to_string())),
            Err(other) => Err(other),
        }
    }

    fn contains(&self, id: &QuestionId) -> bool {
        let Ok(id) = Self::checked_id(id) else {
            return false;
        };
        [format!("{id}/content.xml"), format!("{id}.xml")]
            .iter()
            .any(|p| self.root.resolve(p).is_some_and(|p| p.is_file()))
    }

    fn name(&self) -> &'static str {
        "FilesystemFragmentSource"
    }
}
