//! Runtime connection settings.
//!
//! Settings describe how to reach the container engine, not what to run in
//! it. They are discovered in this order:
//! 1. `$TESTBARREL_CONFIG`
//! 2. Current directory: `./testbarrel.toml`
//! 3. User config: `~/.testbarrel/config.toml`
//! 4. Built-in defaults
//!
//! Environment overrides (`TESTBARREL_*`) are applied on top of whichever
//! source was used.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Variable pointing at an explicit settings file.
pub const CONFIG_PATH_VAR: &str = "TESTBARREL_CONFIG";
/// Overrides [`RuntimeSettings::docker_host`].
pub const DOCKER_HOST_VAR: &str = "TESTBARREL_DOCKER_HOST";
/// Overrides [`RuntimeSettings::connect_timeout_secs`].
pub const CONNECT_TIMEOUT_VAR: &str = "TESTBARREL_CONNECT_TIMEOUT";
/// Overrides [`RuntimeSettings::auto_pull`].
pub const AUTO_PULL_VAR: &str = "TESTBARREL_AUTO_PULL";
/// Overrides [`RuntimeSettings::name_prefix`].
pub const NAME_PREFIX_VAR: &str = "TESTBARREL_NAME_PREFIX";

/// Settings file name looked up in the current directory.
pub const LOCAL_CONFIG_FILE_NAME: &str = "testbarrel.toml";
/// Directory under `$HOME` holding the user settings file.
pub const USER_CONFIG_DIR_NAME: &str = ".testbarrel";
/// Settings file name inside [`USER_CONFIG_DIR_NAME`].
pub const USER_CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Settings file could not be read
    #[error("failed to read settings file {path:?}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for [`RuntimeSettings`]
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override holds an unusable value
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },
}

/// How to reach and drive the container engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Engine endpoint (`unix:///path`, `tcp://host:port`). Local defaults
    /// with a Podman fallback are tried when unset.
    pub docker_host: Option<String>,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Grace period in seconds before a container is killed on terminate
    pub stop_timeout_secs: i64,
    /// Pull images that are missing locally before creating containers
    pub auto_pull: bool,
    /// Prefix of generated container names. Fixture networks are always
    /// named `testbarrel-net-<uuid>`.
    pub name_prefix: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            docker_host: None,
            connect_timeout_secs: 120,
            stop_timeout_secs: 10,
            auto_pull: true,
            name_prefix: "testbarrel".to_string(),
        }
    }
}

impl RuntimeSettings {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid TOML for these settings.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `TESTBARREL_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric or boolean override cannot be parsed.
    pub fn apply_env_overrides(self) -> Result<Self, SettingsError> {
        self.apply_overrides(|var| env::var(var).ok())
    }

    fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        if let Some(host) = lookup(DOCKER_HOST_VAR).filter(|v| !v.is_empty()) {
            self.docker_host = Some(host);
        }

        if let Some(value) = lookup(CONNECT_TIMEOUT_VAR) {
            self.connect_timeout_secs =
                value.trim().parse().map_err(|_| SettingsError::InvalidEnv {
                    var: CONNECT_TIMEOUT_VAR,
                    value,
                })?;
        }

        if let Some(value) = lookup(AUTO_PULL_VAR) {
            self.auto_pull = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(SettingsError::InvalidEnv {
                        var: AUTO_PULL_VAR,
                        value,
                    });
                }
            };
        }

        if let Some(prefix) = lookup(NAME_PREFIX_VAR).filter(|v| !v.is_empty()) {
            self.name_prefix = prefix;
        }

        Ok(self)
    }

    /// Discover settings through the lookup hierarchy and apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns error if a discovered file is unreadable or invalid, or an
    /// environment override is malformed.
    pub fn discover() -> Result<Self, SettingsError> {
        let settings = match Self::find_config_file() {
            Some(path) => {
                info!("Loading runtime settings from: {:?}", path);
                Self::from_toml_file(path)?
            }
            None => {
                debug!("No runtime settings file found, using defaults");
                Self::default()
            }
        };

        settings.apply_env_overrides()
    }

    /// First existing settings file in the lookup hierarchy.
    pub fn find_config_file() -> Option<PathBuf> {
        Self::config_candidates()
            .into_iter()
            .inspect(|candidate| debug!("Checking for settings file: {:?}", candidate))
            .find(|candidate| candidate.is_file())
    }

    fn config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(explicit) = env::var(CONFIG_PATH_VAR) {
            candidates.push(PathBuf::from(explicit));
        }

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join(LOCAL_CONFIG_FILE_NAME));
        }

        if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
            candidates.push(
                PathBuf::from(home)
                    .join(USER_CONFIG_DIR_NAME)
                    .join(USER_CONFIG_FILE_NAME),
            );
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = RuntimeSettings::default();
        assert!(settings.docker_host.is_none());
        assert_eq!(settings.connect_timeout_secs, 120);
        assert!(settings.auto_pull);
        assert_eq!(settings.name_prefix, "testbarrel");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = RuntimeSettings::from_toml_str(
            r#"
            docker_host = "tcp://127.0.0.1:2375"
            auto_pull = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.docker_host.as_deref(), Some("tcp://127.0.0.1:2375"));
        assert!(!settings.auto_pull);
        assert_eq!(settings.stop_timeout_secs, 10);
    }

    #[test]
    fn test_settings_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCAL_CONFIG_FILE_NAME);

        let settings = RuntimeSettings {
            name_prefix: "ci".to_string(),
            ..Default::default()
        };
        fs::write(&path, toml::to_string_pretty(&settings).unwrap()).unwrap();

        let loaded = RuntimeSettings::from_toml_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = RuntimeSettings::from_toml_file(temp_dir.path().join("absent.toml"));
        assert!(matches!(result, Err(SettingsError::Io { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let settings = RuntimeSettings::default()
            .apply_overrides(lookup(&[
                (DOCKER_HOST_VAR, "unix:///run/user/1000/podman/podman.sock"),
                (CONNECT_TIMEOUT_VAR, "15"),
                (AUTO_PULL_VAR, "no"),
                (NAME_PREFIX_VAR, "ci"),
            ]))
            .unwrap();

        assert_eq!(
            settings.docker_host.as_deref(),
            Some("unix:///run/user/1000/podman/podman.sock")
        );
        assert_eq!(settings.connect_timeout_secs, 15);
        assert!(!settings.auto_pull);
        assert_eq!(settings.name_prefix, "ci");
    }

    #[test]
    fn test_invalid_env_override() {
        let result = RuntimeSettings::default().apply_overrides(lookup(&[(AUTO_PULL_VAR, "maybe")]));
        assert!(matches!(
            result,
            Err(SettingsError::InvalidEnv {
                var: AUTO_PULL_VAR,
                ..
            })
        ));
    }
}
