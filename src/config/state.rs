//! Per-app JSON records of installed version, path, verification outcome,
//! icon metadata, source, and overrides.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::{AppConfig, SourceKind};
use crate::fs;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    #[error("state file for {app_name} is not valid JSON")]
    #[diagnostic(code(my_unicorn::state::parse))]
    Parse {
        app_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to atomically write state file for {app_name}")]
    #[diagnostic(code(my_unicorn::state::write))]
    Write {
        app_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(my_unicorn::state::io))]
    Io(#[from] std::io::Error),

    #[error("state file for {app_name} failed validation: {reason}")]
    #[diagnostic(code(my_unicorn::state::invalid))]
    Validate { app_name: String, reason: String },
}

/// One verification method's recorded outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodRecord {
    pub method: String,
    pub passed: bool,
}

/// Summary of the last verification run for an installed app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationSummary {
    pub passed: bool,
    pub methods: Vec<MethodRecord>,
    #[serde(default)]
    pub warning: Option<String>,
}

/// Record of whether/how an icon was installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IconRecord {
    pub installed: bool,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Persisted record of an installed application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppState {
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    pub name: String,
    pub source: SourceKind,
    #[serde(default)]
    pub catalog_ref: Option<String>,
    pub installed_version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub installed_at: OffsetDateTime,
    pub installed_path: PathBuf,
    pub verification: VerificationSummary,
    pub icon: IconRecord,
    /// Full snapshot of the effective `AppConfig` at install time, present
    /// only for URL installs.
    #[serde(default)]
    pub overrides: Option<AppConfig>,
}

fn current_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl AppState {
    pub fn validate(&self) -> Result<(), String> {
        match self.source {
            SourceKind::Catalog => {
                if self.catalog_ref.is_none() {
                    return Err("catalog installs require catalog_ref".to_string());
                }
                if self.overrides.is_some() {
                    return Err("catalog installs must not carry overrides".to_string());
                }
            }
            SourceKind::Url => {
                if self.catalog_ref.is_some() {
                    return Err("url installs must not carry catalog_ref".to_string());
                }
                if self.overrides.is_none() {
                    return Err("url installs require overrides".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Loads, saves, lists, and deletes [`AppState`] files under `apps_dir`,
/// one JSON file per canonical app name. Atomic write-then-rename; reads
/// tolerate absence.
#[derive(Debug, Clone)]
pub struct StateManager {
    apps_dir: PathBuf,
}

impl StateManager {
    pub fn new(apps_dir: PathBuf) -> Self {
        Self { apps_dir }
    }

    fn path_for(&self, app_name: &str) -> PathBuf {
        self.apps_dir.join(format!("{}.json", crate::sanitize_filename(app_name)))
    }

    /// Loads the state for `app_name`, or `None` if it has never been
    /// installed.
    #[instrument(skip(self))]
    pub async fn load(&self, app_name: &str) -> Result<Option<AppState>, StateError> {
        let path = self.path_for(app_name);
        match fs::read_to_string(&path).await {
            Ok(text) => {
                let state: AppState =
                    serde_json::from_str(&text).map_err(|source| StateError::Parse {
                        app_name: app_name.to_string(),
                        source,
                    })?;
                state.validate().map_err(|reason| StateError::Validate {
                    app_name: app_name.to_string(),
                    reason,
                })?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(source.into()),
        }
    }

    /// Atomically writes `state`, replacing any existing record.
    #[instrument(skip(self, state))]
    pub async fn save(&self, state: &AppState) -> Result<(), StateError> {
        fs::create_dir_all(&self.apps_dir).await?;

        let json = serde_json::to_string_pretty(state).map_err(|source| StateError::Parse {
            app_name: state.name.clone(),
            source,
        })?;

        let path = self.path_for(&state.name);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await.map_err(|source| StateError::Write {
            app_name: state.name.clone(),
            source,
        })?;

        debug!(app = state.name, "state file saved");
        Ok(())
    }

    /// Deletes the state file for `app_name`. Tolerates absence.
    #[instrument(skip(self))]
    pub async fn delete(&self, app_name: &str) -> Result<(), StateError> {
        let path = self.path_for(app_name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(app = app_name, error = %e, "failed to delete state file");
                Err(e.into())
            }
        }
    }

    /// Lists every currently installed app's canonical name, derived from
    /// the JSON filenames present in the apps directory.
    pub async fn list(&self) -> Result<Vec<String>, StateError> {
        let mut names = Vec::new();

        let mut dir = match fs::read_dir(&self.apps_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    pub fn path_exists_and_executable(path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(name: &str) -> AppState {
        AppState {
            schema_version: SCHEMA_VERSION,
            name: name.to_string(),
            source: SourceKind::Catalog,
            catalog_ref: Some(name.to_string()),
            installed_version: "1.0.0".to_string(),
            installed_at: OffsetDateTime::UNIX_EPOCH,
            installed_path: PathBuf::from("/tmp/fake.AppImage"),
            verification: VerificationSummary {
                passed: true,
                methods: vec![],
                warning: None,
            },
            icon: IconRecord {
                installed: false,
                path: None,
                method: None,
                error: None,
            },
            overrides: None,
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path().to_path_buf());
        let state = sample_state("obsidian");

        manager.save(&state).await.unwrap();
        let loaded = manager.load("obsidian").await.unwrap().unwrap();
        assert_eq!(loaded.name, "obsidian");
        assert_eq!(loaded.installed_version, "1.0.0");
    }

    #[tokio::test]
    async fn load_missing_app_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path().to_path_buf());
        assert!(manager.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_then_load_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path().to_path_buf());
        let state = sample_state("obsidian");

        manager.save(&state).await.unwrap();
        manager.delete("obsidian").await.unwrap();
        assert!(manager.load("obsidian").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_installed_app_names() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path().to_path_buf());

        manager.save(&sample_state("obsidian")).await.unwrap();
        manager.save(&sample_state("joplin")).await.unwrap();

        let names = manager.list().await.unwrap();
        assert_eq!(names, vec!["joplin".to_string(), "obsidian".to_string()]);
    }

    #[test]
    fn validate_rejects_catalog_state_with_overrides() {
        let mut state = sample_state("obsidian");
        state.overrides = Some(AppConfig::from_url("foo", "bar"));
        assert!(state.validate().is_err());
    }

    #[tokio::test]
    async fn load_rejects_invalid_state_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path().to_path_buf());
        let mut state = sample_state("obsidian");
        state.overrides = Some(AppConfig::from_url("foo", "bar"));

        manager.save(&state).await.unwrap();
        let err = manager.load("obsidian").await.unwrap_err();
        assert!(matches!(err, StateError::Validate { .. }));
    }

    #[tokio::test]
    async fn load_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path().to_path_buf());
        tokio::fs::write(
            dir.path().join("obsidian.json"),
            r#"{"name": "obsidian", "source": "catalog", "catalog_ref": "obsidian",
                "installed_version": "1.0.0", "installed_at": "1970-01-01T00:00:00Z",
                "installed_path": "/tmp/fake.AppImage",
                "verification": {"passed": true, "methods": []},
                "icon": {"installed": false},
                "unexpected_field": true}"#,
        )
        .await
        .unwrap();

        assert!(manager.load("obsidian").await.is_err());
    }
}
