use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// An absolute, lexically normalized path in the virtual namespace.
///
/// Always starts with `/`, never ends with one (except the root itself), and
/// contains no `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VirtualPath(String);

impl VirtualPath {
    pub fn root() -> Self {
        VirtualPath("/".to_string())
    }

    /// Normalize `path`, treating relative input as rooted at `/`.
    pub fn new(path: &str) -> Self {
        Self::normalize("", path)
    }

    /// Resolve `path` against `base` unless it is already absolute.
    pub fn resolve(base: &VirtualPath, path: &str) -> Self {
        if path.starts_with('/') {
            Self::new(path)
        } else {
            Self::normalize(base.as_str(), path)
        }
    }

    /// Convert a host path into the virtual form used when a host directory is
    /// mounted at its own location (`C:\data` becomes `/c/data`).
    pub fn from_os_path(path: &Path) -> Self {
        let raw = path.to_string_lossy().replace('\\', "/");
        let bytes = raw.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            let drive = (bytes[0] as char).to_ascii_lowercase();
            return Self::new(&format!("/{}/{}", drive, &raw[2..]));
        }
        Self::new(&raw)
    }

    fn normalize(base: &str, path: &str) -> Self {
        let mut stack: Vec<&str> = Vec::new();
        for segment in base.split('/').chain(path.split('/')) {
            match segment {
                "" | "." => {}
                ".." => {
                    stack.pop();
                }
                s => stack.push(s),
            }
        }
        VirtualPath(format!("/{}", stack.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path segments, root excluded.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn join(&self, relative: &str) -> Self {
        Self::normalize(self.as_str(), relative)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let cut = self.0.rfind('/').unwrap_or(0);
        Some(if cut == 0 {
            Self::root()
        } else {
            VirtualPath(self.0[..cut].to_string())
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// The part of `self` below `base`: `""` when equal, `None` when `self` is
    /// not inside `base`.
    pub fn relative_to(&self, base: &VirtualPath) -> Option<&str> {
        if base.is_root() {
            return Some(&self.0[1..]);
        }
        let rest = self.0.strip_prefix(base.as_str())?;
        if rest.is_empty() {
            Some("")
        } else {
            rest.strip_prefix('/')
        }
    }

    /// True if `self` lies strictly below `ancestor`.
    pub fn is_strictly_below(&self, ancestor: &VirtualPath) -> bool {
        self.relative_to(ancestor).is_some_and(|rest| !rest.is_empty())
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VirtualPath {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<VirtualPath> for String {
    fn from(value: VirtualPath) -> Self {
        value.0
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
