//! Shared port traits and boundary types for lcovmerge's hexagonal architecture.

use thiserror::Error;

/// Failure to read a file through a [`SourceReader`].
///
/// Callers treat both variants as fatal for the record being processed;
/// they differ only in the message surfaced to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceReadError {
    /// The file does not exist.
    #[error("{path}: {message}")]
    NotFound { path: String, message: String },

    /// The file exists but could not be read.
    #[error("{path}: {message}")]
    Io { path: String, message: String },
}

impl SourceReadError {
    /// Path the failed read was attempted on.
    pub fn path(&self) -> &str {
        match self {
            SourceReadError::NotFound { path, .. } | SourceReadError::Io { path, .. } => path,
        }
    }

    /// Whether the file was missing rather than unreadable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceReadError::NotFound { .. })
    }
}

/// Port for reading whole files: tracefiles and the sources they describe.
pub trait SourceReader {
    /// Returns the full content of `path`.
    fn read_file(&self, path: &str) -> Result<Vec<u8>, SourceReadError>;
}

impl<R: SourceReader + ?Sized> SourceReader for &R {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, SourceReadError> {
        (**self).read_file(path)
    }
}
