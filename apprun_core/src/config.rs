//! Runner configuration.
//!
//! Defaults cover the conventional layout. A TOML file can override any field
//! and a few environment variables override the file:
//!
//! | Variable | Field |
//! |---|---|
//! | `APPRUN_SCRIPT_TIMEOUT_SECS` | `script_timeout_secs` (`0` waits forever) |
//! | `APPRUN_STOP_DELAY_MS` | `stop_delay_ms` |
//! | `APPRUN_MODULE_PATH` | `module_search_path` (platform path-list syntax) |

use apprun_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_SCRIPT_TIMEOUT_SECS: &str = "APPRUN_SCRIPT_TIMEOUT_SECS";
pub const ENV_STOP_DELAY_MS: &str = "APPRUN_STOP_DELAY_MS";
pub const ENV_MODULE_PATH: &str = "APPRUN_MODULE_PATH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Virtual path the application archive is mounted at.
    pub mount_point: String,
    /// Entry module used when the package descriptor names none.
    pub default_entry_module: String,
    /// How long a blocking script request waits for its response.
    pub script_timeout_secs: u64,
    /// Delay between `stop()` and main-loop exit.
    pub stop_delay_ms: u64,
    /// Capacity of the main-loop message queue.
    pub main_queue_capacity: usize,
    /// Trusted host directories searched for modules. Mounted read-only at
    /// their own virtual location when sandboxed.
    pub module_search_path: Vec<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            mount_point: "/mf".to_string(),
            default_entry_module: "main".to_string(),
            script_timeout_secs: 60,
            stop_delay_ms: 500,
            main_queue_capacity: 64,
            module_search_path: Vec::new(),
        }
    }
}

impl RunnerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load a TOML file; missing fields keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(secs) = env_number(ENV_SCRIPT_TIMEOUT_SECS)? {
            self.script_timeout_secs = secs;
        }
        if let Some(ms) = env_number(ENV_STOP_DELAY_MS)? {
            self.stop_delay_ms = ms;
        }
        if let Some(paths) = std::env::var_os(ENV_MODULE_PATH) {
            self.module_search_path = std::env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        Ok(())
    }

    /// `None` means wait indefinitely.
    pub fn script_timeout(&self) -> Option<Duration> {
        (self.script_timeout_secs > 0).then(|| Duration::from_secs(self.script_timeout_secs))
    }

    pub fn stop_delay(&self) -> Duration {
        Duration::from_millis(self.stop_delay_ms)
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            response_timeout: self.script_timeout(),
        }
    }
}

fn env_number(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidEnv { var, value })
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.mount_point, "/mf");
        assert_eq!(config.default_entry_module, "main");
        assert_eq!(config.script_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.stop_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let config = RunnerConfig {
            script_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.script_timeout(), None);
        assert_eq!(config.bridge_config().response_timeout, None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RunnerConfig = toml::from_str("stop_delay_ms = 10\nmount_point = \"/app\"\n").unwrap();
        assert_eq!(config.stop_delay_ms, 10);
        assert_eq!(config.mount_point, "/app");
        assert_eq!(config.script_timeout_secs, 60);
        assert!(toml::from_str::<RunnerConfig>("unknown = 1").is_err());
    }
}
