use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::manager::DEFAULT_COOLDOWN_SECS;
use crate::session::{Identity, Session};
use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Which task store backs the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_json_path")]
    pub json_path: String,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub identity: Option<Identity>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            database_path: default_database_path(),
            json_path: default_json_path(),
            cooldown_secs: default_cooldown_secs(),
            log_level: default_log_level(),
            config_version: Some(CURRENT_CONFIG_VERSION),
            identity: None,
        }
    }
}

// Default value functions
fn default_database_path() -> String {
    data_file_for_profile(utils::Profile::Prod, "tasks.db")
}

fn default_json_path() -> String {
    data_file_for_profile(utils::Profile::Prod, "tasks.json")
}

fn default_cooldown_secs() -> i64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

fn data_file_for_profile(profile: utils::Profile, file: &str) -> String {
    if let Some(data_dir) = utils::get_data_dir(profile) {
        data_dir.join(file).to_string_lossy().to_string()
    } else {
        format!("~/.local/share/{}/{}", profile.app_name(), file)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Invalid setting: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from an explicit path, creating it with defaults if missing
    pub fn load_from(config_path: &Path, profile: utils::Profile) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let config: Config = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let mut config = Config {
                database_path: data_file_for_profile(profile, "tasks.db"),
                json_path: data_file_for_profile(profile, "tasks.json"),
                ..Config::default()
            };
            let save_result = config.save_to(config_path);
            if let Err(ref e) = save_result {
                tracing::error!(path = %config_path.display(), error = %e, "failed to save config file");
            }
            save_result?;
            Ok(config)
        }
    }

    /// Save configuration to an explicit path
    pub fn save_to(&mut self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, toml_string).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile).ok_or_else(|| {
            ConfigError::ConfigDirError("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cooldown_secs < 0 {
            return Err(ConfigError::InvalidValue(format!(
                "cooldown_secs must not be negative (got {})",
                self.cooldown_secs
            )));
        }
        Ok(())
    }

    /// Get the expanded database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    /// Get the expanded JSON store path (with ~ expansion)
    pub fn get_json_path(&self) -> PathBuf {
        utils::expand_path(&self.json_path)
    }

    pub fn cooldown(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(self.cooldown_secs)
    }

    /// The session described by the stored identity
    pub fn session(&self) -> Session {
        match self.identity {
            Some(ref identity) => Session::signed_in(identity.clone()),
            None => Session::anonymous(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        let config = Config::load_from(&path, utils::Profile::Dev).unwrap();
        assert!(path.exists());
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.cooldown_secs, 3);
        assert_eq!(config.log_level, "warn");
        assert!(config.identity.is_none());
        assert!(config.session().require().is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "backend = \"json\"\njson_path = \"/tmp/board.json\"\n\n[identity]\nuser_id = \"U1\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path, utils::Profile::Prod).unwrap();
        assert_eq!(config.backend, Backend::Json);
        assert_eq!(config.get_json_path(), PathBuf::from("/tmp/board.json"));
        assert_eq!(config.cooldown(), chrono::TimeDelta::seconds(3));
        assert_eq!(config.session().require().unwrap().user_id.as_str(), "U1");
    }

    #[test]
    fn test_identity_survives_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::load_from(&path, utils::Profile::Dev).unwrap();
        config.identity = Some(Identity::new("U7").with_email("u7@example.com"));
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path, utils::Profile::Dev).unwrap();
        assert_eq!(reloaded.identity, config.identity);
    }

    #[test]
    fn test_negative_cooldown_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "cooldown_secs = -1\n").unwrap();
        assert!(matches!(
            Config::load_from(&path, utils::Profile::Prod),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
