//! # Sandboxed Application Environment
//!
//! Restricts what the hosted application can reach through the virtual
//! filesystem before its archive is mounted.
//!
//! ## Layout
//!
//! Without full disk access every existing mount (including the host root) is
//! dropped and only these host directories are mounted back, each at its own
//! virtual location:
//!
//! - the trusted module-search directories, read-only;
//! - the temporary, user-data and shared-data directories plus the working
//!   directory, read-write.
//!
//! Directories are de-duplicated by canonical path and missing ones are
//! skipped. The mount point is then prepended to the module and asset search
//! paths and becomes the virtual current directory.
//!
//! ## Security Model
//!
//! The restriction applies to code that goes through the injected
//! [`VirtualFileSystem`]. Code that opens host files directly is not confined.
//! Initialization runs at most once per session; the layout cannot be changed
//! afterwards.

use crate::vfs::{MountFlags, VfsError, VirtualFileSystem, VirtualPath};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Host directories made reachable when sandboxing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxLayout {
    /// Mounted read-only.
    pub trusted: Vec<PathBuf>,
    /// Mounted read-write.
    pub writable: Vec<PathBuf>,
}

impl SandboxLayout {
    /// The platform's standard writable directories plus `trusted`.
    pub fn from_platform(trusted: &[PathBuf]) -> Self {
        let mut writable = vec![std::env::temp_dir()];
        writable.extend(dirs::data_dir());
        writable.extend(shared_data_dir());
        writable.extend(std::env::current_dir().ok());
        Self {
            trusted: trusted.to_vec(),
            writable,
        }
    }
}

/// Machine-wide application data directory.
fn shared_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("PROGRAMDATA").map(PathBuf::from)
    }
    #[cfg(target_os = "macos")]
    {
        Some(PathBuf::from("/Library/Application Support"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        Some(PathBuf::from("/var/lib"))
    }
}

#[derive(Debug)]
pub struct SandboxEnvironment {
    initialized: AtomicBool,
    mount_point: VirtualPath,
    search_path: RwLock<Vec<VirtualPath>>,
    asset_path: RwLock<Vec<VirtualPath>>,
}

impl SandboxEnvironment {
    pub fn new(mount_point: &str, module_search_path: &[PathBuf]) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            mount_point: VirtualPath::new(mount_point),
            search_path: RwLock::new(
                module_search_path
                    .iter()
                    .map(|dir| VirtualPath::from_os_path(dir))
                    .collect(),
            ),
            asset_path: RwLock::new(Vec::new()),
        }
    }

    pub fn mount_point(&self) -> &VirtualPath {
        &self.mount_point
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Module search path, first entry searched first.
    pub fn module_search_path(&self) -> Vec<VirtualPath> {
        self.search_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn asset_path(&self) -> Vec<VirtualPath> {
        self.asset_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set up the environment. Returns `Ok(false)` when it already ran.
    ///
    /// A mount failure of an existing directory is returned as is; the
    /// environment is then left partially configured and is not retried.
    pub fn initialize(
        &self,
        vfs: &VirtualFileSystem,
        layout: &SandboxLayout,
        full_disk_access: bool,
    ) -> Result<bool, VfsError> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sandbox already initialized");
            return Ok(false);
        }

        if !full_disk_access {
            vfs.unmount_all();
            // Each group is de-duplicated on its own. A writable directory
            // that is also trusted gets both mounts, and the later read-write
            // one shadows the read-only one.
            let mut seen = HashSet::new();
            for dir in &layout.trusted {
                mount_if_present(vfs, dir, MountFlags::READ_ONLY, &mut seen)?;
            }
            let mut seen = HashSet::new();
            for dir in &layout.writable {
                mount_if_present(vfs, dir, MountFlags::READ_WRITE, &mut seen)?;
            }
        }

        self.search_path
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, self.mount_point.clone());
        self.asset_path
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, self.mount_point.clone());

        if !full_disk_access {
            vfs.chdir(self.mount_point.as_str());
        }

        info!(
            full_disk_access,
            mounts = vfs.mounts().len(),
            cwd = %vfs.cwd(),
            "Sandbox initialized"
        );
        Ok(true)
    }
}

fn mount_if_present(
    vfs: &VirtualFileSystem,
    dir: &Path,
    flags: MountFlags,
    seen: &mut HashSet<PathBuf>,
) -> Result<(), VfsError> {
    let Ok(canonical) = dir.canonicalize() else {
        debug!(dir = %dir.display(), "Skipping missing sandbox directory");
        return Ok(());
    };
    if !canonical.is_dir() {
        debug!(dir = %dir.display(), "Skipping non-directory sandbox entry");
        return Ok(());
    }
    if !seen.insert(canonical.clone()) {
        return Ok(());
    }
    let target = if dir.is_absolute() {
        VirtualPath::from_os_path(dir)
    } else {
        VirtualPath::from_os_path(&canonical)
    };
    vfs.mount_directory(&canonical, target.as_str(), flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_disk_access_keeps_mounts_and_cwd() {
        let vfs = VirtualFileSystem::with_host_root();
        let cwd = vfs.cwd();
        let sandbox = SandboxEnvironment::new("/mf", &[]);

        assert!(sandbox.initialize(&vfs, &SandboxLayout::default(), true).unwrap());
        assert_eq!(vfs.mounts().len(), 1);
        assert_eq!(vfs.cwd(), cwd);
        assert_eq!(sandbox.module_search_path(), vec![VirtualPath::new("/mf")]);
        assert_eq!(sandbox.asset_path(), vec![VirtualPath::new("/mf")]);
    }

    #[test]
    fn test_missing_and_duplicate_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SandboxLayout {
            trusted: vec![dir.path().to_path_buf(), dir.path().join("missing")],
            writable: vec![dir.path().join("."), dir.path().to_path_buf()],
        };
        let vfs = VirtualFileSystem::with_host_root();
        let sandbox = SandboxEnvironment::new("/mf", &[]);
        sandbox.initialize(&vfs, &layout, false).unwrap();

        let mounts = vfs.mounts();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts.iter().filter(|m| m.flags.read_only).count(), 1);
        assert_eq!(mounts[0].mount_point, mounts[1].mount_point);
        assert_eq!(vfs.cwd().as_str(), "/mf");
    }
}
