//! # apprun core
//!
//! Session bootstrap for packaged applications: the host hands the runner an
//! archive and a window configuration, and the runner sandboxes the virtual
//! filesystem, mounts the archive, and starts the application's entry module
//! once both are in place.
//!
//! ## Modules
//!
//! - **`runner`**: [`AppRunner`], the host-to-core call surface, and its main
//!   loop.
//! - **`vfs`**: the virtual filesystem the application sees.
//! - **`sandbox`**: restricts the virtual filesystem before the archive is
//!   mounted.
//! - **`archive`**: archive loading, metadata decoding and mounting.
//! - **`host_dir`**: per-host install directory names.
//! - **`prc`**: configuration pages.
//! - **`window`**: window configuration.
//! - **`importer`**: entry module lookup.
//! - **`context`**: the [`AppContext`] handed to entry functions.
//! - **`config`**: [`RunnerConfig`].
//! - **`shell`**: the `apprun` command line.

pub mod archive;
pub mod config;
pub mod context;
pub mod error;
pub mod host_dir;
pub mod importer;
pub mod prc;
pub mod runner;
pub mod sandbox;
pub mod session;
pub mod shell;
pub mod utils;
pub mod vfs;
pub mod window;

pub use config::RunnerConfig;
pub use context::{AppContext, global_runner};
pub use error::{Result, RunnerError};
pub use host_dir::HostDirHasher;
pub use runner::{AppRunner, AppRunnerBuilder, MainMessage};

// Re-exported so embedders need a single dependency.
pub use apprun_bridge;
pub use apprun_common;
