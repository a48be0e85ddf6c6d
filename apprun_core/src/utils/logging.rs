//! # Logging Initialization
//!
//! [`init_logging`] installs the process-wide `tracing` subscriber. It runs its
//! body once; later calls are no-ops.
//!
//! - **Filter**: `RUST_LOG` when set, otherwise the requested level for all
//!   crates with `debug` for the runner crates.
//! - **File output**: with `log_to_file`, a daily rolling `apprun.log` in the
//!   user cache directory (located with `directories`), without ANSI colors.
//! - **Stderr fallback**: used when file output is not requested, the cache
//!   directory cannot be determined or created, or the appender fails to open.
//!
//! The embedding host may already own a subscriber; installation failures are
//! therefore ignored rather than reported.

use anyhow::Result;
use directories::ProjectDirs;
use std::io::stderr;
use std::path::PathBuf;
use std::sync::Once;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

const LOG_FILE_PREFIX: &str = "apprun.log";

pub fn init_test_logging() {
    let _ = init_logging("trace", false);
}

/// Directory the rolling log file is written to.
pub fn log_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "AppRun", "apprun").map(|dirs| dirs.cache_dir().to_path_buf())
}

fn file_appender() -> Option<RollingFileAppender> {
    let dir = log_dir()?;
    std::fs::create_dir_all(&dir).ok()?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(&dir)
        .ok()
}

pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{log_level},apprun_core=debug,apprun_bridge=debug,apprun_common=debug"
            ))
        });

        let appender = if log_to_file { file_appender() } else { None };
        match appender {
            Some(appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let installed = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .try_init()
                    .is_ok();
                if installed {
                    // Flushes on drop; the subscriber lives for the whole process.
                    Box::leak(Box::new(guard));
                }
            }
            None => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(stderr).with_ansi(true))
                    .try_init();
            }
        }
    });

    Ok(())
}
