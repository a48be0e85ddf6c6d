//! Shared fixtures for apprun_core integration tests.
#![allow(dead_code)]

use apprun_core::AppRunner;
use apprun_core::RunnerConfig;
use apprun_core::apprun_bridge::{FnRequestHandler, HostRequest};
use apprun_core::importer::ModuleRegistry;
use apprun_core::sandbox::SandboxLayout;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;

/// Write a zip archive named `name` into `dir`.
pub fn write_archive(dir: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
    let entries: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(entry, contents)| (*entry, contents.as_bytes()))
        .collect();
    write_archive_bytes(dir, name, &entries)
}

/// Like [`write_archive`], with raw entry contents.
pub fn write_archive_bytes(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (entry, contents) in entries {
        writer
            .start_file(*entry, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap();
    path
}

pub fn metadata(attributes: &str) -> String {
    format!(r#"<?xml version="1.0" encoding="utf-8"?><package {attributes}/>"#)
}

/// Config with a short stop delay so tests finish quickly.
pub fn test_config() -> RunnerConfig {
    RunnerConfig {
        stop_delay_ms: 10,
        script_timeout_secs: 5,
        ..Default::default()
    }
}

/// A runner whose sandbox only keeps `writable` reachable.
pub fn build_runner(writable: &Path, registry: ModuleRegistry) -> Arc<AppRunner> {
    AppRunner::builder(test_config())
        .sandbox_layout(SandboxLayout {
            trusted: Vec::new(),
            writable: vec![writable.to_path_buf()],
        })
        .importer(Arc::new(registry))
        .build()
}

/// Install a handler on `runner` that records every notification.
pub fn record_notifications(runner: &AppRunner) -> Arc<Mutex<Vec<String>>> {
    let notes = Arc::new(Mutex::new(Vec::new()));
    let sink = notes.clone();
    runner.set_request_handler(Arc::new(FnRequestHandler::new(
        move |_instance, request: HostRequest| {
            if let HostRequest::Notify { message } = request {
                sink.lock().unwrap().push(message);
            }
            Ok(None)
        },
    )));
    notes
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}
