//! Per-session state reported by the host.

use crate::archive::MountRecord;
use crate::archive::metadata::PackageDescriptor;
use crate::host_dir::HostDirHasher;
use apprun_bridge::InstanceId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A package the host preloaded before starting the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub platform: String,
    pub version: String,
    pub host: String,
    pub install_dir: PathBuf,
}

/// Snapshot of the session as seen by the application.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub session_id: Option<i64>,
    /// Root of the local runtime install, from `set_instance_info`.
    pub root_dir: Option<PathBuf>,
    pub instance_id: Option<InstanceId>,
    /// Web tokens in the order the host supplied them.
    pub tokens: Vec<(String, String)>,
    pub argv: Vec<String>,
    pub full_disk_access: bool,
    pub packages: Vec<PackageRecord>,
    pub package: Option<PackageDescriptor>,
    pub archive: Option<MountRecord>,
    pub window_opened: bool,
}

impl SessionInfo {
    /// Value of web token `name`; the last occurrence wins.
    pub fn token(&self, name: &str) -> Option<&str> {
        self.tokens
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn host_dir_hasher(&self) -> Option<HostDirHasher> {
        self.root_dir
            .as_ref()
            .map(|root| HostDirHasher::new(root.to_string_lossy().into_owned()))
    }
}
