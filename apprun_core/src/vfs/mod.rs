//! # Virtual Filesystem
//!
//! A process-local namespace assembled from mounts. The sandbox uses it to
//! decide what the hosted application can see: after sandboxing, only the
//! explicitly mounted directories and the application archive are reachable
//! through it.
//!
//! ## Resolution
//!
//! - Paths are `/`-separated and normalized lexically; relative paths resolve
//!   against the virtual current directory.
//! - Mounts are consulted newest first, so a later mount shadows an earlier one
//!   for the same path. Directory listings merge every mount that covers the
//!   directory.
//! - Parents of mount points exist implicitly as directories.
//!
//! This is a cooperative boundary, not kernel enforcement: code that opens host
//! files directly bypasses it.

mod core;
mod error;
mod path;
mod source;
mod types;

pub use core::VirtualFileSystem;
pub use error::VfsError;
pub use path::VirtualPath;
pub use source::{DirectorySource, MountSource, ReadSeek};
pub use types::{MountFlags, MountInfo, WalkEntry};
