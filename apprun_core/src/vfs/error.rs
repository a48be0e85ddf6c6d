use super::path::VirtualPath;
use std::path::PathBuf;

/// Errors from virtual filesystem operations
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("No such file or directory: {0}")]
    NotFound(VirtualPath),

    #[error("Not a directory: {0}")]
    NotADirectory(VirtualPath),

    #[error("Path '{0}' is only reachable through read-only mounts")]
    ReadOnly(VirtualPath),

    #[error("Cannot mount '{path:?}': {reason}")]
    InvalidMountSource { path: PathBuf, reason: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: VirtualPath,
        #[source]
        source: std::io::Error,
    },

    #[error("File '{0}' is not valid UTF-8")]
    InvalidUtf8(VirtualPath),
}

impl VfsError {
    pub(super) fn io(path: &VirtualPath, source: std::io::Error) -> Self {
        VfsError::Io {
            path: path.clone(),
            source,
        }
    }
}
