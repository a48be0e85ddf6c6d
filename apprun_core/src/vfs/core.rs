use super::error::VfsError;
use super::path::VirtualPath;
use super::source::{DirectorySource, MountSource, ReadSeek};
use super::types::{MountFlags, MountInfo, WalkEntry};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Clone)]
struct Mount {
    point: VirtualPath,
    source: Arc<dyn MountSource>,
    flags: MountFlags,
}

#[derive(Debug)]
struct VfsState {
    mounts: Vec<Mount>,
    cwd: VirtualPath,
}

/// The process-local mount namespace.
///
/// Shared behind an `Arc` between the runner and the hosted application. All
/// methods take `&self`; the mount table lives behind a lock that is never
/// held across source I/O.
#[derive(Debug)]
pub struct VirtualFileSystem {
    state: RwLock<VfsState>,
}

impl Default for VirtualFileSystem {
    fn default() -> Self {
        Self::with_host_root()
    }
}

impl VirtualFileSystem {
    /// No mounts, cwd at `/`.
    pub fn new_empty() -> Self {
        Self {
            state: RwLock::new(VfsState {
                mounts: Vec::new(),
                cwd: VirtualPath::root(),
            }),
        }
    }

    /// The unsandboxed view: host `/` mounted read-write at `/`, cwd taken from
    /// the process working directory.
    pub fn with_host_root() -> Self {
        let cwd = std::env::current_dir()
            .map(|dir| VirtualPath::from_os_path(&dir))
            .unwrap_or_else(|_| VirtualPath::root());
        Self {
            state: RwLock::new(VfsState {
                mounts: vec![Mount {
                    point: VirtualPath::root(),
                    source: Arc::new(DirectorySource::new("/")),
                    flags: MountFlags::READ_WRITE,
                }],
                cwd,
            }),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, VfsState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, VfsState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mount host directory `host_dir` at `mount_point`.
    pub fn mount_directory(
        &self,
        host_dir: &Path,
        mount_point: &str,
        flags: MountFlags,
    ) -> Result<(), VfsError> {
        let canonical = host_dir
            .canonicalize()
            .map_err(|e| VfsError::InvalidMountSource {
                path: host_dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        if !canonical.is_dir() {
            return Err(VfsError::InvalidMountSource {
                path: host_dir.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        self.mount_source(Arc::new(DirectorySource::new(canonical)), mount_point, flags);
        Ok(())
    }

    pub fn mount_source(&self, source: Arc<dyn MountSource>, mount_point: &str, flags: MountFlags) {
        let mut state = self.write_state();
        let point = VirtualPath::resolve(&state.cwd, mount_point);
        debug!(
            mount_point = %point,
            source = %source.describe(),
            read_only = flags.read_only,
            "Mounting"
        );
        state.mounts.push(Mount {
            point,
            source,
            flags,
        });
    }

    /// Drop every mount, leaving an empty namespace.
    pub fn unmount_all(&self) {
        let mut state = self.write_state();
        debug!(count = state.mounts.len(), "Unmounting all mounts");
        state.mounts.clear();
    }

    /// The mount table, oldest mount first.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.read_state()
            .mounts
            .iter()
            .map(|mount| MountInfo {
                mount_point: mount.point.clone(),
                source: mount.source.describe(),
                flags: mount.flags,
            })
            .collect()
    }

    /// Change the virtual current directory. Lexical only: the target does not
    /// have to exist yet.
    pub fn chdir(&self, path: &str) {
        let mut state = self.write_state();
        let next = VirtualPath::resolve(&state.cwd, path);
        state.cwd = next;
    }

    pub fn cwd(&self) -> VirtualPath {
        self.read_state().cwd.clone()
    }

    /// Absolute virtual form of `path`.
    pub fn resolve(&self, path: &str) -> VirtualPath {
        VirtualPath::resolve(&self.read_state().cwd, path)
    }

    /// Mounts covering `path`, newest first, paired with the path relative to
    /// each mount point.
    fn candidates(&self, path: &VirtualPath) -> Vec<(Mount, String)> {
        self.read_state()
            .mounts
            .iter()
            .rev()
            .filter_map(|mount| {
                path.relative_to(&mount.point)
                    .map(|rel| (mount.clone(), rel.to_string()))
            })
            .collect()
    }

    /// True when `path` is a mount point or an ancestor of one.
    fn is_implicit_directory(&self, path: &VirtualPath) -> bool {
        self.read_state()
            .mounts
            .iter()
            .any(|mount| mount.point.relative_to(path).is_some())
    }

    pub fn exists(&self, path: &str) -> bool {
        let path = self.resolve(path);
        self.is_implicit_directory(&path)
            || self
                .candidates(&path)
                .iter()
                .any(|(mount, rel)| mount.source.exists(rel))
    }

    pub fn is_directory(&self, path: &str) -> bool {
        let path = self.resolve(path);
        self.is_implicit_directory(&path)
            || self
                .candidates(&path)
                .iter()
                .any(|(mount, rel)| mount.source.is_directory(rel))
    }

    pub fn open_read(&self, path: &str) -> Result<Box<dyn ReadSeek>, VfsError> {
        let path = self.resolve(path);
        for (mount, rel) in self.candidates(&path) {
            if mount.source.exists(&rel) && !mount.source.is_directory(&rel) {
                return mount
                    .source
                    .open_read(&rel)
                    .map_err(|e| VfsError::io(&path, e));
            }
        }
        Err(VfsError::NotFound(path))
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, VfsError> {
        let path = self.resolve(path);
        for (mount, rel) in self.candidates(&path) {
            if mount.source.exists(&rel) && !mount.source.is_directory(&rel) {
                return mount.source.read(&rel).map_err(|e| VfsError::io(&path, e));
            }
        }
        Err(VfsError::NotFound(path))
    }

    pub fn read_to_string(&self, path: &str) -> Result<String, VfsError> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|_| VfsError::InvalidUtf8(self.resolve(path)))
    }

    /// Write through the newest mount whose copy of the parent directory
    /// exists.
    pub fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), VfsError> {
        let path = self.resolve(path);
        let Some(parent) = path.parent() else {
            let err = io::Error::new(io::ErrorKind::InvalidInput, "cannot write to the root");
            return Err(VfsError::io(&path, err));
        };
        for (mount, rel) in self.candidates(&path) {
            if rel.is_empty() {
                continue;
            }
            let parent_rel = rel.rsplit_once('/').map_or("", |(dir, _)| dir);
            if !mount.source.is_directory(parent_rel) {
                continue;
            }
            if mount.flags.read_only {
                return Err(VfsError::ReadOnly(path));
            }
            return mount
                .source
                .write(&rel, contents)
                .map_err(|e| VfsError::io(&path, e));
        }
        Err(VfsError::NotFound(parent))
    }

    /// Sorted, de-duplicated names in directory `path`, merged across every
    /// mount that covers it.
    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, VfsError> {
        let path = self.resolve(path);
        let mut names = BTreeSet::new();
        let mut found = false;

        for (mount, rel) in self.candidates(&path) {
            if !mount.source.is_directory(&rel) {
                continue;
            }
            found = true;
            let entries = mount.source.list(&rel).map_err(|e| VfsError::io(&path, e))?;
            names.extend(entries);
        }

        for mount in &self.read_state().mounts {
            if let Some(rest) = mount.point.relative_to(&path) {
                found = true;
                if let Some(first) = rest.split('/').find(|s| !s.is_empty()) {
                    names.insert(first.to_string());
                }
            }
        }

        if !found {
            return Err(if self.exists(path.as_str()) {
                VfsError::NotADirectory(path)
            } else {
                VfsError::NotFound(path)
            });
        }
        Ok(names.into_iter().collect())
    }

    /// Top-down traversal rooted at `path`, children visited in sorted order.
    pub fn walk(&self, path: &str) -> Result<Vec<WalkEntry>, VfsError> {
        let root = self.resolve(path);
        let mut entries = Vec::new();
        let mut stack = vec![root];

        while let Some(dir) = stack.pop() {
            let mut dirs = Vec::new();
            let mut files = Vec::new();
            for name in self.list_dir(dir.as_str())? {
                if self.is_directory(dir.join(&name).as_str()) {
                    dirs.push(name);
                } else {
                    files.push(name);
                }
            }
            for name in dirs.iter().rev() {
                stack.push(dir.join(name));
            }
            entries.push(WalkEntry { dir, dirs, files });
        }
        Ok(entries)
    }

    /// Host location backing `path`, if it is served from a host directory.
    pub fn os_path(&self, path: &str) -> Option<PathBuf> {
        let path = self.resolve(path);
        self.candidates(&path)
            .into_iter()
            .find(|(mount, rel)| mount.source.exists(rel))
            .and_then(|(mount, rel)| mount.source.os_path(&rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, tempfile::TempDir) {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::create_dir(a.path().join("lib")).unwrap();
        fs::write(a.path().join("lib/shared.txt"), b"from a").unwrap();
        fs::write(b.path().join("shared.txt"), b"from b").unwrap();
        fs::write(b.path().join("only_b.txt"), b"b").unwrap();
        (a, b)
    }

    #[test]
    fn test_empty_namespace_has_only_root() {
        let vfs = VirtualFileSystem::new_empty();
        assert!(!vfs.exists("/tmp"));
        assert!(matches!(vfs.read_file("/etc/hosts"), Err(VfsError::NotFound(_))));
        assert!(matches!(vfs.list_dir("/"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_later_mount_shadows_earlier() {
        let (a, b) = fixture();
        let vfs = VirtualFileSystem::new_empty();
        vfs.mount_directory(&a.path().join("lib"), "/data", MountFlags::READ_ONLY)
            .unwrap();
        vfs.mount_directory(b.path(), "/data", MountFlags::READ_ONLY)
            .unwrap();

        assert_eq!(vfs.read_to_string("/data/shared.txt").unwrap(), "from b");
        assert_eq!(
            vfs.list_dir("/data").unwrap(),
            vec!["only_b.txt".to_string(), "shared.txt".to_string()]
        );
    }

    #[test]
    fn test_mount_point_parents_are_directories() {
        let (a, _b) = fixture();
        let vfs = VirtualFileSystem::new_empty();
        vfs.mount_directory(a.path(), "/deep/nested/point", MountFlags::READ_WRITE)
            .unwrap();

        assert!(vfs.is_directory("/deep"));
        assert!(vfs.is_directory("/deep/nested"));
        assert_eq!(vfs.list_dir("/").unwrap(), vec!["deep".to_string()]);
        assert!(vfs.exists("/deep/nested/point/lib/shared.txt"));
    }

    #[test]
    fn test_write_rejected_on_read_only_mount() {
        let (a, _b) = fixture();
        let vfs = VirtualFileSystem::new_empty();
        vfs.mount_directory(a.path(), "/ro", MountFlags::READ_ONLY)
            .unwrap();
        assert!(matches!(
            vfs.write_file("/ro/new.txt", b"x"),
            Err(VfsError::ReadOnly(_))
        ));
        assert!(!a.path().join("new.txt").exists());
    }

    #[test]
    fn test_write_and_relative_paths_follow_cwd() {
        let (a, _b) = fixture();
        let vfs = VirtualFileSystem::new_empty();
        vfs.mount_directory(a.path(), "/rw", MountFlags::READ_WRITE)
            .unwrap();
        vfs.chdir("/rw/lib");

        vfs.write_file("out.txt", b"written").unwrap();
        assert_eq!(fs::read(a.path().join("lib/out.txt")).unwrap(), b"written");
        assert_eq!(vfs.read_to_string("../lib/out.txt").unwrap(), "written");
        assert_eq!(
            vfs.os_path("out.txt"),
            Some(a.path().canonicalize().unwrap().join("lib/out.txt"))
        );
    }

    #[test]
    fn test_mount_nonexistent_directory_fails() {
        let vfs = VirtualFileSystem::new_empty();
        let err = vfs
            .mount_directory(Path::new("/definitely/not/here"), "/x", MountFlags::READ_ONLY)
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidMountSource { .. }));
        assert!(vfs.mounts().is_empty());
    }

    #[test]
    fn test_walk_is_top_down() {
        let (a, _b) = fixture();
        let vfs = VirtualFileSystem::new_empty();
        vfs.mount_directory(a.path(), "/w", MountFlags::READ_ONLY)
            .unwrap();

        let entries = vfs.walk("/w").unwrap();
        assert_eq!(entries[0].dir.as_str(), "/w");
        assert_eq!(entries[0].dirs, vec!["lib".to_string()]);
        assert_eq!(entries[1].dir.as_str(), "/w/lib");
        assert_eq!(entries[1].files, vec!["shared.txt".to_string()]);
    }
}
