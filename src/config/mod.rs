//! Global configuration, the bundled catalog, and per-app configuration
//! entries.

pub mod state;

use std::path::PathBuf;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::fs;
use crate::forge::Channel;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read configuration from {path}")]
    #[diagnostic(code(my_unicorn::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration at {path} is not valid JSON")]
    #[diagnostic(code(my_unicorn::config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(my_unicorn::config::io))]
    Io(#[from] std::io::Error),
}

/// How verification should be attempted for an app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Digest,
    ChecksumFile,
    Skip,
}

/// How the app's icon should be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconMethod {
    Extraction,
    Download,
    None,
}

/// Where an [`AppConfig`] was sourced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Catalog,
    Url,
}

/// Verification directives for one app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub method: VerificationMethod,
    #[serde(default)]
    pub checksum_file_name: Option<String>,
    #[serde(default)]
    pub algorithm: Option<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            method: VerificationMethod::Digest,
            checksum_file_name: None,
            algorithm: None,
        }
    }
}

/// Icon directives for one app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconConfig {
    pub method: IconMethod,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            method: IconMethod::Extraction,
            filename: None,
            download_url: None,
        }
    }
}

/// Catalog entry or user-supplied URL record describing one installable
/// application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub source: SourceKind,
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_channel")]
    pub channel: Channel,
    /// Final filename (without extension) the AppImage is renamed to.
    #[serde(default)]
    pub rename: Option<String>,
    #[serde(default)]
    pub preferred_suffixes: Vec<String>,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub icon: IconConfig,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

fn default_channel() -> Channel {
    Channel::Stable
}

impl AppConfig {
    /// Builds an ad-hoc config for a bare repository URL install, using
    /// defaults for naming/verification/icon.
    pub fn from_url(owner: &str, repo: &str) -> Self {
        Self {
            name: repo.to_string(),
            source: SourceKind::Url,
            owner: owner.to_string(),
            repo: repo.to_string(),
            channel: Channel::Stable,
            rename: None,
            preferred_suffixes: Vec::new(),
            verification: VerificationConfig::default(),
            icon: IconConfig::default(),
            description: String::new(),
            categories: Vec::new(),
        }
    }

    /// The filename (without extension) used for the installed AppImage.
    pub fn install_name(&self) -> String {
        crate::sanitize_filename(self.rename.as_deref().unwrap_or(&self.name))
    }
}

/// The bundled set of curated [`AppConfig`] definitions, keyed by
/// lowercase app name.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Catalog {
    apps: std::collections::BTreeMap<String, AppConfig>,
}

impl Catalog {
    pub fn new(apps: Vec<AppConfig>) -> Self {
        Self {
            apps: apps
                .into_iter()
                .map(|a| (a.name.to_ascii_lowercase(), a))
                .collect(),
        }
    }

    /// Case-insensitive catalog lookup.
    pub fn lookup(&self, key: &str) -> Option<&AppConfig> {
        self.apps.get(&key.to_ascii_lowercase())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(|s| s.as_str())
    }

    #[instrument(skip(self))]
    pub async fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path).await {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no catalog file present, using empty catalog");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Global settings: install/icon/backup/download directories, cache TTL,
/// concurrency, backup retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub install_dir: PathBuf,
    pub icon_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub download_dir: PathBuf,
    pub desktop_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub config_dir: PathBuf,
    #[serde(default = "default_ttl_hours")]
    pub cache_ttl_hours: u32,
    #[serde(default = "default_concurrency")]
    pub max_concurrent_downloads: usize,
    #[serde(default = "default_backup_retention")]
    pub backup_retention_count: usize,
}

fn default_ttl_hours() -> u32 {
    24
}

fn default_concurrency() -> usize {
    3
}

fn default_backup_retention() -> usize {
    3
}

impl GlobalConfig {
    /// Builds config rooted at the platform's XDG-style directories.
    pub fn using_data_dir() -> Self {
        let dirs = &*crate::DIRS;
        let config_dir = dirs.config_dir().to_path_buf();
        let data_dir = dirs.data_local_dir().to_path_buf();
        let cache_dir = dirs.cache_dir().to_path_buf();

        Self {
            install_dir: data_dir.join("apps"),
            icon_dir: data_dir.join("icons"),
            backup_dir: data_dir.join("backups"),
            download_dir: cache_dir.join("downloads"),
            desktop_dir: dirs
                .data_dir()
                .parent()
                .map(|p| p.join("applications"))
                .unwrap_or_else(|| data_dir.join("applications")),
            cache_dir: cache_dir.join("releases"),
            config_dir,
            cache_ttl_hours: default_ttl_hours(),
            max_concurrent_downloads: default_concurrency(),
            backup_retention_count: default_backup_retention(),
        }
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// Directory holding per-app `AppState` JSON records, rooted under the
    /// config directory (`apps/<app_name>.json`), independent of where
    /// installed AppImages themselves live.
    pub fn state_dir(&self) -> PathBuf {
        self.config_dir.join("apps")
    }

    #[instrument(skip(self))]
    pub async fn load_or_default() -> Result<Self, ConfigError> {
        let defaults = Self::using_data_dir();
        let path = defaults.config_file_path();

        match fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no global config present, using defaults");
                Ok(defaults)
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    #[instrument(skip(self))]
    pub async fn save(&self) -> Result<(), ConfigError> {
        let path = self.config_file_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        match fs::rename(&tmp, &path).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(?path, error = %e, "failed to persist global config");
                Err(e.into())
            }
        }
    }

    pub async fn ensure_directories(&self) -> Result<(), std::io::Error> {
        tokio::try_join!(
            fs::create_dir_all(&self.install_dir),
            fs::create_dir_all(&self.icon_dir),
            fs::create_dir_all(&self.backup_dir),
            fs::create_dir_all(&self.download_dir),
            fs::create_dir_all(&self.desktop_dir),
            fs::create_dir_all(&self.cache_dir),
            fs::create_dir_all(&self.config_dir),
            fs::create_dir_all(self.state_dir()),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_url_defaults_to_digest_verification_and_icon_extraction() {
        let app = AppConfig::from_url("acme", "widget");
        assert_eq!(app.source, SourceKind::Url);
        assert_eq!(app.verification.method, VerificationMethod::Digest);
        assert_eq!(app.icon.method, IconMethod::Extraction);
        assert_eq!(app.install_name(), "widget");
    }

    #[test]
    fn install_name_prefers_rename_over_app_name() {
        let mut app = AppConfig::from_url("acme", "widget");
        app.rename = Some("Widget App!".to_string());
        assert_eq!(app.install_name(), "Widget App-");
    }

    #[test]
    fn catalog_lookup_is_case_insensitive() {
        let app = AppConfig::from_url("acme", "Obsidian");
        let catalog = Catalog::new(vec![AppConfig {
            name: "Obsidian".to_string(),
            ..app
        }]);
        assert!(catalog.lookup("obsidian").is_some());
        assert!(catalog.lookup("OBSIDIAN").is_some());
        assert!(catalog.lookup("missing").is_none());
    }

    #[test]
    fn global_config_derives_state_dir_and_config_file_path_under_config_dir() {
        let config = GlobalConfig {
            install_dir: PathBuf::from("/apps"),
            icon_dir: PathBuf::from("/icons"),
            backup_dir: PathBuf::from("/backups"),
            download_dir: PathBuf::from("/downloads"),
            desktop_dir: PathBuf::from("/applications"),
            cache_dir: PathBuf::from("/cache"),
            config_dir: PathBuf::from("/config"),
            cache_ttl_hours: 24,
            max_concurrent_downloads: 3,
            backup_retention_count: 3,
        };
        assert_eq!(config.state_dir(), PathBuf::from("/config/apps"));
        assert_eq!(config.config_file_path(), PathBuf::from("/config/config.json"));
    }
}
