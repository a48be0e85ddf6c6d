use super::path::VirtualPath;

/// Access mode of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MountFlags {
    pub read_only: bool,
}

impl MountFlags {
    pub const READ_ONLY: MountFlags = MountFlags { read_only: true };
    pub const READ_WRITE: MountFlags = MountFlags { read_only: false };
}

/// Snapshot of one entry in the mount table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MountInfo {
    pub mount_point: VirtualPath,
    /// Human-readable description of what backs the mount.
    pub source: String,
    pub flags: MountFlags,
}

/// One directory visited by [`super::VirtualFileSystem::walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub dir: VirtualPath,
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}
