//! Settings persistence and the command allowlist store.
//!
//! Settings live in a TOML file under the platform config directory. The
//! allowlist section records base command names the user approved with
//! "remember this decision"; the confirmation manager appends to it through
//! the [`AllowlistStore`] boundary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::events::ConfirmationChoice;
use crate::error::CoreError;

/// On-disk settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub compression: CompressionSettings,
    #[serde(default)]
    pub confirmation: ConfirmationSettings,
    /// Base command names pre-approved to bypass confirmation.
    #[serde(default)]
    pub allowed_commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// Token budget for the conversation.
    pub max_tokens: usize,
    /// Most recent messages always preserved verbatim.
    pub preserve_recent: usize,
    /// Fraction of the budget at which compression becomes advisable.
    pub intelligent_threshold: f64,
    /// Fraction of the budget at which compression is unconditional.
    pub force_threshold: f64,
    /// Minimum seconds between advisory compressions.
    pub min_interval_secs: u64,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            max_tokens: 100_000,
            preserve_recent: 10,
            intelligent_threshold: 0.8,
            force_threshold: 0.95,
            min_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSettings {
    /// Milliseconds to wait for a human response.
    pub timeout_ms: u64,
    /// Choice applied when a confirmation times out.
    pub default_choice: Option<ConfirmationChoice>,
    /// Whether the UI offers "approve and remember".
    pub show_remember_option: bool,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            default_choice: None,
            show_remember_option: true,
        }
    }
}

impl Settings {
    /// Default settings path: `<config_dir>/pincer/settings.toml`.
    pub fn default_path() -> Result<PathBuf, CoreError> {
        let base = dirs::config_dir().ok_or(CoreError::NoConfigDir)?;
        Ok(base.join("pincer").join("settings.toml"))
    }

    /// Load settings, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|source| CoreError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist settings, creating parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

impl From<CompressionSettings> for crate::agent::compressor::CompressionConfig {
    fn from(settings: CompressionSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            preserve_recent: settings.preserve_recent,
            intelligent_threshold: settings.intelligent_threshold,
            force_threshold: settings.force_threshold,
            min_interval: std::time::Duration::from_secs(settings.min_interval_secs),
        }
    }
}

/// Persisted set of command names pre-approved to bypass confirmation.
pub trait AllowlistStore: Send + Sync {
    fn allowlist(&self) -> Vec<String>;
    fn append(&self, name: &str) -> Result<(), CoreError>;
}

/// Allowlist store over the TOML settings file.
pub struct FileAllowlistStore {
    path: PathBuf,
}

impl FileAllowlistStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AllowlistStore for FileAllowlistStore {
    fn allowlist(&self) -> Vec<String> {
        match Settings::load(&self.path) {
            Ok(settings) => settings.allowed_commands,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to load allowlist");
                Vec::new()
            }
        }
    }

    fn append(&self, name: &str) -> Result<(), CoreError> {
        let mut settings = Settings::load(&self.path)?;
        if settings.allowed_commands.iter().any(|c| c == name) {
            return Ok(());
        }
        settings.allowed_commands.push(name.to_string());
        settings.save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_roundtrip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.allowed_commands.push("cargo".to_string());
        settings.confirmation.default_choice = Some(ConfirmationChoice::Deny);
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.allowed_commands, vec!["cargo"]);
        assert_eq!(
            loaded.confirmation.default_choice,
            Some(ConfirmationChoice::Deny)
        );
        assert!((loaded.compression.force_threshold - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.toml")).unwrap();
        assert!(settings.allowed_commands.is_empty());
        assert_eq!(settings.compression.preserve_recent, 10);
    }

    #[test]
    fn allowlist_append_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAllowlistStore::new(dir.path().join("settings.toml"));

        store.append("cargo").unwrap();
        store.append("cargo").unwrap();
        store.append("git").unwrap();

        assert_eq!(store.allowlist(), vec!["cargo", "git"]);
    }
}
