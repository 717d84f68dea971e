use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::fs;

/// Configuration bundled into every context at build time
pub const BUNDLED_CONFIG: &str = include_str!("../extension.toml");

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtensionConfig {
    #[serde(default)]
    pub storage: StorageKeys,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Slot names used in the synchronized storage area
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorageKeys {
    #[serde(default = "default_settings_key")]
    pub settings: String,
    #[serde(default = "default_last_sync_key")]
    pub last_sync: String,
    #[serde(default = "default_cache_key")]
    pub cache: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            settings: default_settings_key(),
            last_sync: default_last_sync_key(),
            cache: default_cache_key(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow::anyhow!("Invalid log level: {}", self.level))
    }
}

fn default_settings_key() -> String {
    "settings".to_string()
}

fn default_last_sync_key() -> String {
    "lastSync".to_string()
}

fn default_cache_key() -> String {
    "cache".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ExtensionConfig {
    /// Parse the configuration compiled into the extension
    pub fn bundled() -> Result<Self> {
        Self::from_toml(BUNDLED_CONFIG).context("Failed to parse bundled config")
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let keys = [
            ("settings", &self.storage.settings),
            ("last_sync", &self.storage.last_sync),
            ("cache", &self.storage.cache),
        ];

        for (name, key) in &keys {
            if key.trim().is_empty() {
                anyhow::bail!("Storage key '{}' must not be empty", name);
            }
        }

        for (i, (name, key)) in keys.iter().enumerate() {
            if let Some((other, _)) = keys[i + 1..].iter().find(|(_, k)| k == key) {
                anyhow::bail!(
                    "Storage keys '{}' and '{}' share the slot '{}'",
                    name,
                    other,
                    key
                );
            }
        }

        self.logging.level_filter()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_config_matches_defaults() {
        let config = ExtensionConfig::bundled().unwrap();
        assert_eq!(config, ExtensionConfig::default());
        assert_eq!(config.logging.level_filter().unwrap(), LevelFilter::Info);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = ExtensionConfig::from_toml("[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(config.storage, StorageKeys::default());
        assert_eq!(config.logging.level_filter().unwrap(), LevelFilter::Debug);
    }

    #[test]
    fn test_rejects_shared_slots() {
        let err = ExtensionConfig::from_toml("[storage]\nsettings = \"cache\"\n").unwrap_err();
        assert!(err.to_string().contains("share the slot"));
    }

    #[test]
    fn test_rejects_empty_key_and_bad_level() {
        assert!(ExtensionConfig::from_toml("[storage]\nsettings = \" \"\n").is_err());
        assert!(ExtensionConfig::from_toml("[logging]\nlevel = \"loud\"\n").is_err());
    }
}
