//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXSYNC_CONFIG` (environment variable)
//! 2. `~/.config/mboxsync/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxsync\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::parser::mbox::MAX_MESSAGE_SIZE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Input and output locations.
    pub paths: PathsConfig,
    /// Payload dump behavior.
    pub dump: DumpConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Input and output locations. Relative paths resolve against the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// MBOX archive to import.
    pub mailbox: PathBuf,
    /// SQLite store.
    pub store: PathBuf,
    /// Root directory for dumped payloads.
    pub dump_dir: PathBuf,
}

/// Payload dump behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Dump payloads after syncing.
    pub enabled: bool,
    /// Only dump messages with no receipt linked in the store.
    pub pending_only: bool,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    pub max_message_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            mailbox: PathBuf::from("receipts.mbox"),
            store: PathBuf::from("receipts.db"),
            dump_dir: PathBuf::from("dump"),
        }
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pending_only: true,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXSYNC_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mboxsync").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxsync")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mboxsync.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.paths.mailbox, PathBuf::from("receipts.mbox"));
        assert_eq!(cfg.paths.store, PathBuf::from("receipts.db"));
        assert_eq!(cfg.paths.dump_dir, PathBuf::from("dump"));
        assert!(cfg.dump.enabled);
        assert!(cfg.dump.pending_only);
        assert_eq!(cfg.performance.max_message_size, MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.paths.mailbox, cfg.paths.mailbox);
        assert_eq!(parsed.dump.pending_only, cfg.dump.pending_only);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[paths]
mailbox = "/var/mail/receipts"

[dump]
pending_only = false
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.paths.mailbox, PathBuf::from("/var/mail/receipts"));
        assert!(!cfg.dump.pending_only);
        assert!(cfg.dump.enabled);
        assert_eq!(cfg.paths.store, PathBuf::from("receipts.db"));
    }

    #[test]
    fn test_log_file_uses_cache_dir_override() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/mboxsync-test"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/mboxsync-test/mboxsync.log")
        );
    }
}
