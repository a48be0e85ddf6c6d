use std::fmt::Debug;
use std::fs;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

/// A readable, seekable byte stream handed out by [`MountSource::open_read`].
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Backing store for one mount.
///
/// Paths passed in are relative to the mount point, `/`-separated, without a
/// leading slash; `""` names the mount root.
pub trait MountSource: Send + Sync + Debug {
    /// Shown in mount listings and logs.
    fn describe(&self) -> String;

    fn exists(&self, rel: &str) -> bool;

    fn is_directory(&self, rel: &str) -> bool;

    fn open_read(&self, rel: &str) -> io::Result<Box<dyn ReadSeek>>;

    fn read(&self, rel: &str) -> io::Result<Vec<u8>> {
        let mut reader = self.open_read(rel)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Names of the immediate children of directory `rel`.
    fn list(&self, rel: &str) -> io::Result<Vec<String>>;

    fn write(&self, _rel: &str, _contents: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "source does not support writing",
        ))
    }

    /// Host location of `rel`, for sources backed by the host filesystem.
    fn os_path(&self, _rel: &str) -> Option<PathBuf> {
        None
    }
}

/// A host directory exposed through the virtual filesystem.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }
}

impl MountSource for DirectorySource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn exists(&self, rel: &str) -> bool {
        self.host_path(rel).exists()
    }

    fn is_directory(&self, rel: &str) -> bool {
        self.host_path(rel).is_dir()
    }

    fn open_read(&self, rel: &str) -> io::Result<Box<dyn ReadSeek>> {
        let path = self.host_path(rel);
        if path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        Ok(Box::new(fs::File::open(path)?))
    }

    fn read(&self, rel: &str) -> io::Result<Vec<u8>> {
        fs::read(self.host_path(rel))
    }

    fn list(&self, rel: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.host_path(rel))? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn write(&self, rel: &str, contents: &[u8]) -> io::Result<()> {
        fs::write(self.host_path(rel), contents)
    }

    fn os_path(&self, rel: &str) -> Option<PathBuf> {
        Some(self.host_path(rel))
    }
}
