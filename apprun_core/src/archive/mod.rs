//! # Application Archives
//!
//! An application ships as a single zip container. [`ArchiveHandle::load`]
//! opens and validates it through the virtual filesystem and decodes the
//! optional metadata file; [`ArchiveHandle::mount`] exposes the contents
//! read-only under the mount point and applies the configuration files found
//! at the top level of the archive.
//!
//! Configuration files are discovered from the archive's own entry list, not
//! by scanning the mount point, so files contributed by other mounts are never
//! picked up. They are applied in central-directory order.

pub mod metadata;

use crate::prc::{ConfigPageManager, PageId};
use crate::vfs::{MountFlags, MountSource, ReadSeek, VfsError, VirtualFileSystem, VirtualPath};
use metadata::{MetadataDocument, PackageDescriptor};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use zip::ZipArchive;
use zip::result::ZipError;

/// Well-known metadata file at the archive root.
pub const METADATA_FILE: &str = "p3d_info.xml";

/// Extension of configuration files applied on mount.
pub const CONFIG_EXTENSION: &str = "prc";

// Upper bound on the buffer reserved from an entry's declared size.
const MAX_READ_RESERVE: u64 = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("No such file: {0}")]
    NotFound(VirtualPath),

    #[error("Not a valid application archive: {path}: {reason}")]
    InvalidArchive { path: VirtualPath, reason: String },

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// Result of mounting an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub mount_point: VirtualPath,
    pub archive: VirtualPath,
    /// Pages loaded from the archive's configuration files, in load order.
    pub config_pages: Vec<PageId>,
}

/// An opened, validated archive and its decoded metadata.
#[derive(Debug)]
pub struct ArchiveHandle {
    path: VirtualPath,
    source: Arc<ArchiveSource>,
    metadata: Option<MetadataDocument>,
    package: Option<PackageDescriptor>,
}

impl ArchiveHandle {
    /// Open `path`, resolved through `vfs`.
    pub fn load(vfs: &VirtualFileSystem, path: &str) -> Result<Self, ArchiveError> {
        let resolved = vfs.resolve(path);
        if !vfs.exists(resolved.as_str()) {
            return Err(ArchiveError::NotFound(resolved));
        }

        let invalid = |reason: String| ArchiveError::InvalidArchive {
            path: resolved.clone(),
            reason,
        };
        let reader = vfs
            .open_read(resolved.as_str())
            .map_err(|e| invalid(e.to_string()))?;
        let source = ArchiveSource::open(reader, resolved.to_string())
            .map_err(|e| invalid(e.to_string()))?;

        let metadata = match source.read_entry(METADATA_FILE) {
            Some(Ok(bytes)) => MetadataDocument::decode(&bytes),
            Some(Err(e)) => {
                debug!(error = %e, "Metadata file unreadable, ignoring");
                None
            }
            None => None,
        };
        let package = metadata
            .as_ref()
            .and_then(MetadataDocument::package_descriptor);

        info!(
            archive = %resolved,
            entries = source.file_names().len(),
            has_metadata = metadata.is_some(),
            has_package = package.is_some(),
            "Opened application archive"
        );

        Ok(Self {
            path: resolved,
            source: Arc::new(source),
            metadata,
            package,
        })
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    pub fn metadata(&self) -> Option<&MetadataDocument> {
        self.metadata.as_ref()
    }

    pub fn package(&self) -> Option<&PackageDescriptor> {
        self.package.as_ref()
    }

    /// File entries in central-directory order.
    pub fn subfile_names(&self) -> &[String] {
        self.source.file_names()
    }

    /// Top-level configuration files, in central-directory order.
    pub fn config_files(&self) -> Vec<&str> {
        self.subfile_names()
            .iter()
            .map(String::as_str)
            .filter(|name| is_top_level_config(name))
            .collect()
    }

    /// Mount read-only at `mount_point` and load every top-level configuration
    /// file, read back through the mount, as a page named after its mounted
    /// path.
    ///
    /// Once the archive is mounted this cannot fail: a configuration file that
    /// cannot be read is skipped with a warning, and bytes that are not UTF-8
    /// are decoded lossily.
    pub fn mount(
        self,
        vfs: &VirtualFileSystem,
        mount_point: &str,
        pages: &ConfigPageManager,
    ) -> MountRecord {
        let mount_point = vfs.resolve(mount_point);
        let config_files: Vec<String> = self.config_files().into_iter().map(String::from).collect();

        vfs.mount_source(self.source, mount_point.as_str(), MountFlags::READ_ONLY);

        let mut config_pages = Vec::with_capacity(config_files.len());
        for name in config_files {
            let page_path = mount_point.join(&name);
            match vfs.read_file(page_path.as_str()) {
                Ok(bytes) => {
                    let data = String::from_utf8_lossy(&bytes);
                    config_pages.push(pages.load_page(page_path.as_str(), &data));
                }
                Err(e) => warn!(file = %page_path, error = %e, "Skipping unreadable config file"),
            }
        }

        info!(
            archive = %self.path,
            mount_point = %mount_point,
            config_pages = config_pages.len(),
            "Mounted application archive"
        );

        MountRecord {
            mount_point,
            archive: self.path,
            config_pages,
        }
    }
}

fn is_top_level_config(name: &str) -> bool {
    !name.contains('/')
        && name
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext == CONFIG_EXTENSION)
}

/// Initial buffer size for an entry declaring `size` bytes. The declared size
/// comes from the archive and is not trusted.
fn read_reserve(size: u64) -> usize {
    usize::try_from(size.min(MAX_READ_RESERVE)).unwrap_or(0)
}

fn zip_to_io(err: ZipError) -> io::Error {
    match err {
        ZipError::Io(e) => e,
        ZipError::FileNotFound => io::Error::new(io::ErrorKind::NotFound, err),
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

/// Read-only mount source over a zip container.
pub struct ArchiveSource {
    label: String,
    archive: Mutex<ZipArchive<Box<dyn ReadSeek>>>,
    names: Vec<String>,
    files: BTreeMap<String, usize>,
    dirs: BTreeSet<String>,
}

impl std::fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSource")
            .field("label", &self.label)
            .field("files", &self.names.len())
            .field("dirs", &self.dirs.len())
            .finish()
    }
}

impl ArchiveSource {
    /// Read the central directory of `reader`.
    pub fn open(reader: Box<dyn ReadSeek>, label: impl Into<String>) -> Result<Self, ZipError> {
        let mut archive = ZipArchive::new(reader)?;
        let mut names = Vec::with_capacity(archive.len());
        let mut files = BTreeMap::new();
        let mut dirs = BTreeSet::new();

        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            let name = entry.name().trim_matches('/').to_string();
            let is_dir = entry.is_dir();
            drop(entry);

            if name.is_empty() {
                continue;
            }
            let mut parent = name.as_str();
            while let Some((dir, _)) = parent.rsplit_once('/') {
                dirs.insert(dir.to_string());
                parent = dir;
            }
            if is_dir {
                dirs.insert(name);
            } else if !files.contains_key(&name) {
                files.insert(name.clone(), index);
                names.push(name);
            }
        }

        Ok(Self {
            label: label.into(),
            archive: Mutex::new(archive),
            names,
            files,
            dirs,
        })
    }

    pub fn file_names(&self) -> &[String] {
        &self.names
    }

    /// Contents of entry `name`, or `None` when there is no such file.
    pub fn read_entry(&self, name: &str) -> Option<io::Result<Vec<u8>>> {
        let index = *self.files.get(name)?;
        let mut archive = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let result = archive.by_index(index).map_err(zip_to_io).and_then(|mut entry| {
            let mut buf = Vec::with_capacity(read_reserve(entry.size()));
            entry.read_to_end(&mut buf)?;
            Ok(buf)
        });
        Some(result)
    }
}

impl MountSource for ArchiveSource {
    fn describe(&self) -> String {
        format!("archive {}", self.label)
    }

    fn exists(&self, rel: &str) -> bool {
        rel.is_empty() || self.files.contains_key(rel) || self.dirs.contains(rel)
    }

    fn is_directory(&self, rel: &str) -> bool {
        rel.is_empty() || self.dirs.contains(rel)
    }

    fn open_read(&self, rel: &str) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(Cursor::new(self.read(rel)?)))
    }

    fn read(&self, rel: &str) -> io::Result<Vec<u8>> {
        self.read_entry(rel).unwrap_or_else(|| {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{rel} not in {}", self.label),
            ))
        })
    }

    fn list(&self, rel: &str) -> io::Result<Vec<String>> {
        if !self.is_directory(rel) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{rel} is not a directory in {}", self.label),
            ));
        }
        let child_of = |path: &str| -> Option<String> {
            let rest = if rel.is_empty() {
                path
            } else {
                path.strip_prefix(rel)?.strip_prefix('/')?
            };
            (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
        };
        let children: BTreeSet<String> = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .filter_map(|path| child_of(path))
            .collect();
        Ok(children.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_archive_source_tree() {
        let bytes = zip_bytes(&[
            ("main.py", "x"),
            ("game/levels/one.txt", "1"),
            ("game/start.py", "y"),
        ]);
        let source = ArchiveSource::open(Box::new(Cursor::new(bytes)), "test").unwrap();

        assert_eq!(source.file_names(), ["main.py", "game/levels/one.txt", "game/start.py"]);
        assert!(source.is_directory("game/levels"));
        assert!(source.exists("game/start.py"));
        assert!(!source.is_directory("game/start.py"));
        assert_eq!(source.list("").unwrap(), vec!["game", "main.py"]);
        assert_eq!(source.list("game").unwrap(), vec!["levels", "start.py"]);
        assert_eq!(source.read("game/levels/one.txt").unwrap(), b"1");
        assert!(source.read_entry("missing").is_none());
    }

    #[test]
    fn test_declared_size_does_not_drive_allocation() {
        assert_eq!(read_reserve(0), 0);
        assert_eq!(read_reserve(512), 512);
        assert_eq!(read_reserve(u64::MAX), 1 << 20);
        assert_eq!(read_reserve(0xFFFF_FFFE), 1 << 20);
    }

    #[test]
    fn test_top_level_config_detection() {
        assert!(is_top_level_config("default.prc"));
        assert!(!is_top_level_config("etc/default.prc"));
        assert!(!is_top_level_config("default.prc.bak"));
        assert!(!is_top_level_config(".prc"));
    }
}
