//! Post-download processor: the fixed pipeline that runs after a
//! successful download (verify → chmod → backup → move → icon →
//! desktop → state → prune).

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::config::state::{AppState, IconRecord, MethodRecord, StateManager, VerificationSummary};
use crate::config::{AppConfig, GlobalConfig, SourceKind};
use crate::desktop::{self, DesktopEntrySpec};
use crate::fs;
use crate::forge::{Asset, Release};
use crate::progress::{ProgressReporter, TaskKind};
use crate::verify::{VerificationError, Verifier};

/// Whether the processor is running as part of a fresh install or an
/// update of an already-installed app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Install,
    Update,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ProcessError {
    #[error("verification failed")]
    #[diagnostic(transparent)]
    Verification(#[from] VerificationError),

    #[error("failed to move the downloaded file into place")]
    #[diagnostic(code(my_unicorn::process::install))]
    Install(#[source] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(my_unicorn::process::state_write))]
    StateWrite(#[from] crate::config::state::StateError),
}

/// The result of running the post-download pipeline on one downloaded
/// file.
#[derive(Debug)]
pub struct ProcessResult {
    pub success: bool,
    pub install_path: Option<PathBuf>,
    pub verification_passed: bool,
    pub verification_warning: Option<String>,
    pub icon_installed: bool,
    pub desktop_written: bool,
    pub warnings: Vec<String>,
}

/// Runs the fixed post-download pipeline.
pub struct PostDownloadProcessor {
    verifier: Verifier,
    config: GlobalConfig,
    state_manager: StateManager,
}

impl PostDownloadProcessor {
    pub fn new(config: GlobalConfig) -> Self {
        let state_manager = StateManager::new(config.state_dir());
        Self {
            verifier: Verifier::new(),
            config,
            state_manager,
        }
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state_manager
    }

    /// Runs the pipeline for a single downloaded file. Steps 1-4 are
    /// blocking; a failure there aborts with `Err`. Steps 5-6 and 8
    /// (icon, desktop entry, backup pruning) are best-effort and are
    /// folded into `warnings` instead of aborting the install. Step 7
    /// (state write) is not best-effort and propagates its error.
    #[instrument(skip(self, app_config, release, reporter))]
    pub async fn process(
        &self,
        downloaded_path: &Path,
        asset: &Asset,
        release: &Release,
        app_config: &AppConfig,
        operation: OperationType,
        reporter: &dyn ProgressReporter,
    ) -> Result<ProcessResult, ProcessError> {
        // Step 1: verify.
        let verification = self
            .verifier
            .verify(downloaded_path, asset, release, app_config, reporter)
            .await?;

        // Step 2: chmod +x.
        self.chmod_executable(downloaded_path).await.map_err(ProcessError::Install)?;

        let mut warnings = Vec::new();
        if let Some(w) = &verification.warning {
            warnings.push(w.clone());
        }

        // Step 3: backup prior install (update only).
        if operation == OperationType::Update
            && let Some(existing) = self.state_manager.load(&app_config.name).await?
            && existing.installed_path.exists()
        {
            if let Err(e) = self.backup_prior(&existing.installed_path, &app_config.name).await {
                warn!(error = %e, "failed to back up prior install");
                warnings.push(format!("backup failed: {e}"));
            }
        }

        // Step 4: move into place.
        let install_path = self
            .move_into_place(downloaded_path, app_config)
            .await
            .map_err(ProcessError::Install)?;

        // Step 5: extract/download icon (best-effort).
        let icon_record = self.handle_icon(&install_path, app_config, reporter).await;
        if let Some(err) = &icon_record.error {
            warnings.push(err.clone());
        }

        // Step 6: write desktop entry (best-effort).
        let desktop_written = match self
            .write_desktop_entry(&install_path, app_config, release, icon_record.path.as_deref())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to write desktop entry");
                warnings.push(format!("desktop entry failed: {e}"));
                false
            }
        };

        // Step 7: write AppState. Unlike icon/desktop steps this is not
        // best-effort: a missing state record leaves the app invisible to
        // `list`/`update`, so failures here propagate.
        let state = AppState {
            schema_version: 1,
            name: app_config.name.clone(),
            source: app_config.source,
            catalog_ref: match app_config.source {
                SourceKind::Catalog => Some(app_config.name.clone()),
                SourceKind::Url => None,
            },
            installed_version: release.version.clone(),
            installed_at: OffsetDateTime::now_utc(),
            installed_path: install_path.clone(),
            verification: VerificationSummary {
                passed: verification.passed,
                methods: verification
                    .methods
                    .iter()
                    .map(|(name, result)| MethodRecord {
                        method: name.clone(),
                        passed: result.passed,
                    })
                    .collect(),
                warning: verification.warning.clone(),
            },
            icon: icon_record,
            overrides: match app_config.source {
                SourceKind::Catalog => None,
                SourceKind::Url => Some(app_config.clone()),
            },
        };
        self.state_manager.save(&state).await?;

        // Step 8: prune backups (best-effort, update only).
        if operation == OperationType::Update {
            if let Err(e) = self.prune_backups(&app_config.name).await {
                warn!(error = %e, "failed to prune backups");
                warnings.push(format!("backup prune failed: {e}"));
            }
        }

        Ok(ProcessResult {
            success: true,
            install_path: Some(install_path),
            verification_passed: verification.passed,
            verification_warning: verification.warning,
            icon_installed: state.icon.installed,
            desktop_written,
            warnings,
        })
    }

    async fn chmod_executable(&self, path: &Path) -> std::io::Result<()> {
        let metadata = fs::metadata(path).await?;
        let mut permissions = metadata.permissions();
        let mode = permissions.mode() | 0o111;
        permissions.set_mode(mode);
        fs::set_permissions(path, permissions).await
    }

    async fn backup_prior(&self, installed_path: &Path, app_name: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.config.backup_dir).await?;
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let backup_name = format!("{}-{timestamp}.AppImage", crate::sanitize_filename(app_name));
        let backup_path = self.config.backup_dir.join(backup_name);
        fs::rename(installed_path, backup_path).await
    }

    async fn move_into_place(&self, downloaded_path: &Path, app_config: &AppConfig) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.config.install_dir).await?;
        let dest = self
            .config
            .install_dir
            .join(format!("{}.AppImage", app_config.install_name()));
        fs::rename(downloaded_path, &dest).await?;
        Ok(dest)
    }

    async fn handle_icon(
        &self,
        install_path: &Path,
        app_config: &AppConfig,
        reporter: &dyn ProgressReporter,
    ) -> IconRecord {
        use crate::config::IconMethod;

        match app_config.icon.method {
            IconMethod::None => IconRecord {
                installed: false,
                path: None,
                method: None,
                error: None,
            },
            IconMethod::Download => {
                let Some(url) = &app_config.icon.download_url else {
                    return IconRecord {
                        installed: false,
                        path: None,
                        method: Some("download".to_string()),
                        error: Some("no icon download URL configured".to_string()),
                    };
                };
                let dest = self.config.icon_dir.join(format!("{}.png", app_config.name));
                let service = crate::download::DownloadService::new();
                match service.download_file(url, &dest, &app_config.name, reporter).await {
                    Ok(()) => IconRecord {
                        installed: true,
                        path: Some(dest),
                        method: Some("download".to_string()),
                        error: None,
                    },
                    Err(e) => IconRecord {
                        installed: false,
                        path: None,
                        method: Some("download".to_string()),
                        error: Some(e.to_string()),
                    },
                }
            }
            IconMethod::Extraction => match self.extract_icon(install_path, app_config).await {
                Ok(path) => IconRecord {
                    installed: true,
                    path: Some(path),
                    method: Some("extraction".to_string()),
                    error: None,
                },
                Err(e) => {
                    debug!(error = %e, "icon extraction failed, continuing without an icon");
                    IconRecord {
                        installed: false,
                        path: None,
                        method: Some("extraction".to_string()),
                        error: Some(e.to_string()),
                    }
                }
            },
        }
    }

    /// Extracts the embedded icon by shelling out to the AppImage's own
    /// `--appimage-extract` flag rather than parsing squashfs directly.
    async fn extract_icon(&self, install_path: &Path, app_config: &AppConfig) -> std::io::Result<PathBuf> {
        let work_dir = tempfile::tempdir()?;

        let status = tokio::process::Command::new(install_path)
            .arg("--appimage-extract")
            .current_dir(work_dir.path())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(std::io::Error::other("appimage extraction exited non-zero"));
        }

        let extracted_root = work_dir.path().join("squashfs-root");
        let candidate_names = [".DirIcon", "icon.png", "icon.svg"];

        let mut found = None;
        for name in candidate_names {
            let candidate = extracted_root.join(name);
            if fs::metadata(&candidate).await.is_ok() {
                found = Some(candidate);
                break;
            }
        }

        let Some(source_icon) = found else {
            return Err(std::io::Error::other("no icon found in extracted payload"));
        };

        fs::create_dir_all(&self.config.icon_dir).await?;
        let dest = self.config.icon_dir.join(format!("{}.png", app_config.name));
        fs::copy(&source_icon, &dest).await?;

        Ok(dest)
    }

    async fn write_desktop_entry(
        &self,
        install_path: &Path,
        app_config: &AppConfig,
        release: &Release,
        icon_path: Option<&Path>,
    ) -> Result<(), desktop::DesktopError> {
        let spec = DesktopEntrySpec {
            app_name: &app_config.name,
            display_name: &app_config.name,
            appimage_path: install_path,
            icon_path,
            categories: &app_config.categories,
            version: &release.version,
        };
        desktop::write_desktop_entry(&self.config.desktop_dir, &spec).await?;
        Ok(())
    }

    async fn prune_backups(&self, app_name: &str) -> std::io::Result<()> {
        let prefix = crate::sanitize_filename(app_name);
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&self.config.backup_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&format!("{prefix}-")) {
                let modified = entry.metadata().await?.modified()?;
                entries.push((modified, entry.path()));
            }
        }

        entries.sort_by_key(|(modified, _)| *modified);

        let retention = self.config.backup_retention_count;
        if entries.len() > retention {
            for (_, path) in &entries[..entries.len() - retention] {
                fs::remove_file(path).await?;
            }
        }

        Ok(())
    }
}
