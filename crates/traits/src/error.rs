use thiserror::Error;

/// Error type for fragment and template lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to load '{id}': {message}")]
    LoadFailed { id: String, message: String },

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

impl SourceError {
    pub(crate) fn poisoned(id: &str) -> Self {
        SourceError::LoadFailed {
            id: id.to_string(),
            message: "source store lock poisoned".to_string(),
        }
    }
}
