//! Host directory vectors. These names must agree byte-for-byte with the
//! native plugin's own computation.

use apprun_core::HostDirHasher;
use std::path::PathBuf;

#[test]
fn test_hostname_keeps_half_of_the_digest() {
    let hasher = HostDirHasher::new("root");
    assert_eq!(
        hasher.hash("http://example.com:80/app"),
        "root/example.com_3985e660f24ffeb7"
    );
    assert_eq!(
        hasher.hash("https://user:pw@download.example.org:8443/packages/"),
        "root/download.example.org_02f3633464122bdc"
    );
    assert_eq!(hasher.hash("http://localhost"), "root/localhost_86a9106ae6553765");
}

#[test]
fn test_no_hostname_keeps_full_digest() {
    let hasher = HostDirHasher::new("/var/cache/runtime");
    assert_eq!(
        hasher.hash("file:///opt/panda"),
        "/var/cache/runtime/960c46d391802b3496f4665f0bef05ca"
    );
    assert_eq!(
        hasher.hash("no-scheme-here"),
        "/var/cache/runtime/bb5186a30582b3d6a2c4ea7e19698a1a"
    );
    assert_eq!(hasher.hash(""), "/var/cache/runtime/d41d8cd98f00b204e9800998ecf8427e");
}

#[test]
fn test_output_shape() {
    let hasher = HostDirHasher::new("r");
    for url in [
        "http://a.example/x",
        "https://b.example:443/",
        "ftp://user@c.example",
    ] {
        let dir = hasher.hash(url);
        let (host, digest) = dir["r/".len()..].rsplit_once('_').unwrap();
        assert!(!host.is_empty(), "{url}");
        assert_eq!(digest.len(), 16, "{url}");
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
    assert_eq!(hasher.host_dir("http://localhost"), PathBuf::from("r/localhost_86a9106ae6553765"));
}

#[test]
fn test_deterministic() {
    let a = HostDirHasher::new("root");
    let b = HostDirHasher::new("root");
    let url = "http://runtime.example.net/stable/";
    assert_eq!(a.hash(url), b.hash(url));
    assert_ne!(a.hash(url), a.hash("http://runtime.example.net/beta/"));
}
