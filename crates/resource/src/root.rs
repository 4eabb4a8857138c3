//! Base-directory path resolution shared by the filesystem sources.
//!
//! All resolved paths must stay within the base directory, so ids such as
//! `../../../etc/passwd` never reach the filesystem.

use quire_traits::SourceError;
use std::path::{Component, Path, PathBuf};

#[derive(Debug)]
pub(crate) struct SafeRoot {
    base_path: PathBuf,
    /// Canonicalized base path for security checks
    canonical_base: Option<PathBuf>,
}

impl SafeRoot {
    pub(crate) fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let base = base_path.as_ref().to_path_buf();
        // May fail if the directory doesn't exist yet
        let canonical = base.canonicalize().ok();
        Self {
            base_path: base,
            canonical_base: canonical,
        }
    }

    pub(crate) fn base(&self) -> &Path {
        &self.base_path
    }

    /// Resolves a relative path below the base directory.
    ///
    /// Returns `None` if the path would escape the base directory.
    pub(crate) fn resolve(&self, path: &str) -> Option<PathBuf> {
        if path.is_empty() || Path::new(path).is_absolute() {
            return None;
        }

        let full_path = self.base_path.join(path);

        if let Ok(canonical) = full_path.canonicalize()
            && let Some(ref base) = self.canonical_base
        {
            return canonical.starts_with(base).then_some(canonical);
        }

        // Nonexistent paths: reject any parent component outright
        if Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return None;
        }

        Some(full_path)
    }

    /// Reads a file below the base directory.
    pub(crate) fn read(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        let full_path = self
            .resolve(path)
            .ok_or_else(|| SourceError::InvalidId(format!("{} (path traversal blocked)", path)))?;

        std::fs::read(&full_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(path.to_string())
            } else {
                SourceError::LoadFailed {
                    id: path.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        let dir = tempdir().unwrap();
        let root = SafeRoot::new(dir.path());

        assert!(root.resolve("../../../etc/passwd").is_none());
        assert!(root.resolve("/etc/passwd").is_none());
        assert!(root.resolve("foo/../../bar").is_none());
        assert!(root.resolve("").is_none());
    }

    #[test]
    fn resolves_nested_existing_paths() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("q1")).unwrap();
        std::fs::write(dir.path().join("q1/content.xml"), b"<P/>").unwrap();

        let root = SafeRoot::new(dir.path());
        assert_eq!(root.read("q1/content.xml").unwrap(), b"<P/>");
        assert!(matches!(root.read("q2/content.xml"), Err(SourceError::NotFound(_))));
    }
}
