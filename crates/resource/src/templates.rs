use crate::root::SafeRoot;
use quire_traits::{SharedTemplateData, SourceError, TemplateSource};
use std::path::Path;
use std::sync::Arc;

/// A template source backed by a directory of `.hml` files.
///
/// A template named `exam` resolves to `exam`, falling back to `exam.hml`.
#[derive(Debug)]
pub struct FilesystemTemplateSource {
    root: SafeRoot,
}

impl FilesystemTemplateSource {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            root: SafeRoot::new(base_path),
        }
    }

    pub fn base(&self) -> &Path {
        self.root.base()
    }

    fn candidates(name: &str) -> [String; 2] {
        [name.to_string(), format!("{name}.hml")]
    }
}

impl TemplateSource for FilesystemTemplateSource {
    fn load(&self, name: &str) -> Result<SharedTemplateData, SourceError> {
        for candidate in Self::candidates(name) {
            match self.root.read(&candidate) {
                Ok(bytes) => return Ok(Arc::new(bytes)),
                Err(SourceError::NotFound(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(SourceError::NotFound(name.to_string()))
    }

    fn exists(&self, name: &str) -> bool {
        Self::candidates(name)
            .iter()
            .any(|c| self.root.resolve(c).is_some_and(|p| p.is_file()))
    }

    fn name(&self) -> &'static str {
        "FilesystemTemplateSource"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_with_and_without_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("exam.hml"), b"<HWPML/>").unwrap();

        let source = FilesystemTemplateSource::new(dir.path());
        assert_eq!(source.load("exam").unwrap().as_slice(), b"<HWPML/>");
        assert_eq!(source.load("exam.hml").unwrap().as_slice(), b"<HWPML/>");
        assert!(source.exists("exam"));
    }

    #[test]
    fn missing_template_is_not_found() {
        let dir = tempdir().unwrap();
        let source = FilesystemTemplateSource::new(dir.path());
        assert!(matches!(source.load("none"), Err(SourceError::NotFound(_))));
    }

    #[test]
    fn blocks_path_traversal() {
        let dir = tempdir().unwrap();
        let source = FilesystemTemplateSource::new(dir.path());
        assert!(source.load("../../etc/passwd").is_err());
        assert!(!source.exists("../secret"));
    }
}
