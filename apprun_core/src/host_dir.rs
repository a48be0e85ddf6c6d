//! Host directory derivation.
//!
//! Every package host gets its own install directory under the runtime root,
//! named after the host URL. The name must agree byte-for-byte with the native
//! plugin, which computes the same directory independently, so the parsing
//! below is deliberately hand-rolled rather than going through a URL parser.
//!
//! ```text
//! http://example.com:80/app  ->  <root>/example.com_3985e660f24ffeb7
//! file:///opt/runtime        ->  <root>/<32 hex digits>
//! ```

use md5::{Digest, Md5};
use std::path::PathBuf;

/// Hex digits kept after the hostname. Half of the digest: the hostname
/// already disambiguates.
const SHORT_HASH_HEX_LEN: usize = 16;

/// Derives per-host install directories under a fixed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDirHasher {
    root_dir: String,
}

impl HostDirHasher {
    pub fn new(root_dir: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    /// The install directory for `host_url`, as a string.
    pub fn hash(&self, host_url: &str) -> String {
        let digest = md5_hex(host_url);
        let hostname = extract_hostname(host_url);

        let mut host_dir = String::with_capacity(self.root_dir.len() + hostname.len() + 34);
        host_dir.push_str(&self.root_dir);
        host_dir.push('/');
        if hostname.is_empty() {
            host_dir.push_str(&digest);
        } else {
            host_dir.push_str(hostname);
            host_dir.push('_');
            host_dir.push_str(&digest[..SHORT_HASH_HEX_LEN]);
        }
        host_dir
    }

    pub fn host_dir(&self, host_url: &str) -> PathBuf {
        PathBuf::from(self.hash(host_url))
    }
}

/// The bare hostname of `url`: no scheme, credentials, port or path.
///
/// Empty when the URL has no `://`. When no `/` follows the authority, the
/// authority runs to the end of the string.
pub fn extract_hostname(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return "";
    };
    let mut start = scheme_end + 3;
    let mut end = find_from(url, start, '/').unwrap_or(url.len());

    if let Some(at) = find_from(url, start, '@')
        && at < end
    {
        start = at + 1;
    }

    if let Some(colon) = find_from(url, start, ':')
        && colon < end
    {
        end = colon;
    }

    &url[start..end]
}

fn find_from(haystack: &str, from: usize, needle: char) -> Option<usize> {
    haystack[from..].find(needle).map(|i| from + i)
}

/// Lowercase hex of the MD5 digest of the whole URL string.
fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_hostname_variants() {
        assert_eq!(extract_hostname("http://example.com:80/app"), "example.com");
        assert_eq!(
            extract_hostname("https://user:pw@download.example.org:8443/packages/"),
            "download.example.org"
        );
        assert_eq!(extract_hostname("http://localhost"), "localhost");
        assert_eq!(extract_hostname("file:///opt/runtime"), "");
        assert_eq!(extract_hostname("no-scheme-here"), "");
        // An '@' after the path does not count as a credentials separator.
        assert_eq!(extract_hostname("http://host/a@b:c"), "host");
    }

    #[test]
    fn test_md5_hex_matches_known_digest() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
