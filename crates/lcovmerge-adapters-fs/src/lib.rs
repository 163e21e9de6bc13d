//! Source reader adapters.
//!
//! [`FsSourceReader`] reads from the host filesystem, resolving relative
//! paths against a root directory. [`MemorySourceReader`] serves files from
//! memory and can simulate I/O failures; the merge engine's tests and the
//! fuzz target run against it.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use lcovmerge_ports::{SourceReadError, SourceReader};

// ============================================================================
// Host Filesystem
// ============================================================================

/// Filesystem-backed reader rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsSourceReader {
    root: PathBuf,
}

impl FsSourceReader {
    /// Create a new filesystem reader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory relative paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.root.join(path)
        }
    }
}

impl Default for FsSourceReader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl SourceReader for FsSourceReader {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, SourceReadError> {
        let full_path = self.resolve(path);
        tracing::trace!(path = %full_path.display(), "reading file");
        std::fs::read(&full_path).map_err(|e| io_error(path, &e))
    }
}

fn io_error(path: &str, err: &io::Error) -> SourceReadError {
    match err.kind() {
        io::ErrorKind::NotFound => SourceReadError::NotFound {
            path: path.to_string(),
            message: err.to_string(),
        },
        _ => SourceReadError::Io {
            path: path.to_string(),
            message: err.to_string(),
        },
    }
}

// ============================================================================
// In-Memory Filesystem
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryEntry {
    content: Vec<u8>,
    error: Option<String>,
}

/// In-memory reader with per-file error injection.
#[derive(Debug, Default)]
pub struct MemorySourceReader {
    files: BTreeMap<String, MemoryEntry>,
    reads: Cell<usize>,
}

impl MemorySourceReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file. Replacing clears any injected error.
    pub fn push_file(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(
            path.into(),
            MemoryEntry {
                content: content.into(),
                error: None,
            },
        );
    }

    /// Builder form of [`push_file`](Self::push_file).
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.push_file(path, content);
        self
    }

    /// Make reads of an existing or new `path` fail with an I/O error.
    pub fn set_io_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        let entry = self.files.entry(path.into()).or_insert(MemoryEntry {
            content: Vec::new(),
            error: None,
        });
        entry.error = Some(message.into());
    }

    /// Number of `read_file` calls served so far, including failed ones.
    pub fn read_count(&self) -> usize {
        self.reads.get()
    }
}

impl SourceReader for MemorySourceReader {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, SourceReadError> {
        self.reads.set(self.reads.get() + 1);
        match self.files.get(path) {
            Some(MemoryEntry {
                error: Some(message),
                ..
            }) => Err(SourceReadError::Io {
                path: path.to_string(),
                message: message.clone(),
            }),
            Some(entry) => Ok(entry.content.clone()),
            None => Err(SourceReadError::NotFound {
                path: path.to_string(),
                message: "No such file or directory".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_relative_and_absolute_paths() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file_path = src.join("lib.c");
        std::fs::write(&file_path, "line1\nline2\n").unwrap();

        let reader = FsSourceReader::new(temp.path());
        assert_eq!(reader.read_file("src/lib.c").unwrap(), b"line1\nline2\n");

        let abs_path = file_path.to_string_lossy().to_string();
        assert_eq!(reader.read_file(&abs_path).unwrap(), b"line1\nline2\n");
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let reader = FsSourceReader::new(temp.path());
        let err = reader.read_file("nope.c").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.path(), "nope.c");
    }

    #[test]
    fn directory_is_io_error() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("dir")).unwrap();
        let reader = FsSourceReader::new(temp.path());
        let err = reader.read_file("dir").unwrap_err();
        assert!(!err.is_not_found());
    }

    #[test]
    fn memory_reader_serves_and_fails() {
        let mut reader = MemorySourceReader::new().with_file("/a.c", "int a;\n");
        assert_eq!(reader.read_file("/a.c").unwrap(), b"int a;\n");
        assert!(reader.read_file("/b.c").unwrap_err().is_not_found());

        reader.set_io_error("/a.c", "Permission denied");
        let err = reader.read_file("/a.c").unwrap_err();
        assert_eq!(
            err,
            SourceReadError::Io {
                path: "/a.c".to_string(),
                message: "Permission denied".to_string()
            }
        );
        assert_eq!(reader.read_count(), 3);

        reader.push_file("/a.c", "int b;\n");
        assert_eq!(reader.read_file("/a.c").unwrap(), b"int b;\n");
    }
}
