use std::io;
use std::path::PathBuf;

use crate::error::DirectoryError;

/// Resolves and checks a tool's source directory.
///
/// The registry takes this as a dependency so callers can swap in their own
/// rules (or a fake in tests).
pub trait DirectoryValidator: Send + Sync {
    /// Return the absolute, resolved form of `path` if it names an existing
    /// directory.
    fn validate(&self, path: &str) -> Result<PathBuf, DirectoryError>;
}

impl<F> DirectoryValidator for F
where
    F: Fn(&str) -> Result<PathBuf, DirectoryError> + Send + Sync,
{
    fn validate(&self, path: &str) -> Result<PathBuf, DirectoryError> {
        self(path)
    }
}

/// Validator backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDirectoryValidator;

impl DirectoryValidator for FsDirectoryValidator {
    fn validate(&self, path: &str) -> Result<PathBuf, DirectoryError> {
        let raw = PathBuf::from(path);
        if path.is_empty() {
            return Err(DirectoryError::InvalidPath {
                path: raw,
                reason: "path is empty".to_string(),
            });
        }

        // Follows symlinks and collapses `.`/`..`; relative input is taken
        // from the current directory. A missing component or a file in the
        // middle of the path both mean the target does not exist.
        let resolved = match std::fs::canonicalize(&raw) {
            Ok(resolved) => resolved,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                return Err(DirectoryError::DirectoryNotFound(raw));
            }
            Err(e) => {
                return Err(DirectoryError::InvalidPath {
                    path: raw,
                    reason: e.to_string(),
                });
            }
        };

        let metadata = std::fs::metadata(&resolved).map_err(|e| DirectoryError::InvalidPath {
            path: raw.clone(),
            reason: e.to_string(),
        })?;

        if !metadata.is_dir() {
            return Err(DirectoryError::NotADirectory(raw));
        }

        // Tool rows store the path as text
        if resolved.to_str().is_none() {
            return Err(DirectoryError::InvalidPath {
                path: raw,
                reason: "resolved path is not valid UTF-8".to_string(),
            });
        }

        Ok(resolved)
    }
}
