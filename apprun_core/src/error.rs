use crate::archive::ArchiveError;
use crate::vfs::VfsError;
use apprun_bridge::BridgeError;

/// Errors surfaced by [`crate::AppRunner`] to the embedding host.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Bad archive path or not an application archive. Fails the call, not
    /// the session.
    #[error("{0}")]
    Argument(String),

    /// The entry module does not exist. Startup cannot continue.
    #[error("No {module} found in application")]
    EntryPointNotFound { module: String },

    #[error("Instance info has not been set")]
    InstanceInfoMissing,

    #[error("Main loop is not running")]
    MainLoopClosed,

    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Application entry function failed: {0:#}")]
    Application(anyhow::Error),
}

impl From<ArchiveError> for RunnerError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NotFound(path) => RunnerError::Argument(format!("No such file: {path}")),
            ArchiveError::InvalidArchive { path, reason } => {
                RunnerError::Argument(format!("Not an application archive: {path} ({reason})"))
            }
            ArchiveError::Vfs(e) => RunnerError::Vfs(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;
