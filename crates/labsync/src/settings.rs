//! Tool settings (`labsync.toml`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use labsync_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Environment variable naming the settings file
pub const SETTINGS_ENV: &str = "LABSYNC_CONFIG";

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sync: SyncSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

/// Host sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Hosts processed in parallel; 0 is sequential
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default)]
    pub debug_configs: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            debug_configs: false,
        }
    }
}

/// Retry queue backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetrySettings {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            multiplier: self.multiplier,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_parallel() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    9
}

fn default_base_delay_secs() -> u64 {
    5
}

fn default_max_delay_secs() -> u64 {
    120
}

fn default_multiplier() -> f64 {
    2.0
}

impl Settings {
    /// Load settings from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Settings file to use, if any
    ///
    /// An explicit path (flag or `LABSYNC_CONFIG`) wins; otherwise the first
    /// existing file among `./labsync.toml`, `/etc/labsync/labsync.toml` and
    /// the user config directory.
    #[must_use]
    pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let paths = [
            Some(PathBuf::from("labsync.toml")),
            Some(PathBuf::from("/etc/labsync/labsync.toml")),
            dirs::config_dir().map(|p| p.join("labsync/labsync.toml")),
        ];
        paths.into_iter().flatten().find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.sync.parallel, 10);
        assert_eq!(settings.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_override() {
        let settings: Settings = toml::from_str(
            r#"
log_level = "debug"

[sync]
parallel = 0

[retry]
max_attempts = 3
base_delay_secs = 1
"#,
        )
        .unwrap();

        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.sync.parallel, 0);
        assert!(!settings.sync.debug_configs);
        let policy = settings.retry.policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(120));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = Path::new("/tmp/custom-labsync.toml");
        assert_eq!(Settings::discover(Some(path)), Some(path.to_path_buf()));
    }
}
