//! Top-level install/update coordinator: target resolution, bounded
//! concurrency, result aggregation.

use std::sync::Arc;

use futures::future::join_all;
use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::ReleaseCache;
use crate::config::state::StateManager;
use crate::config::{AppConfig, Catalog, GlobalConfig, SourceKind};
use crate::download::DownloadService;
use crate::forge::ForgeClient;
use crate::process::{OperationType, PostDownloadProcessor};
use crate::progress::{NoopReporter, ProgressReporter, TaskKind};
use crate::selector::{self, InstallationSource};

#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    #[error("failed to read global configuration")]
    #[diagnostic(code(my_unicorn::orchestrator::config))]
    Config(#[from] crate::config::ConfigError),
}

/// The result of one worker's attempt to install or update a single
/// target.
#[derive(Debug)]
pub struct TargetResult {
    pub target: String,
    pub name: Option<String>,
    pub success: bool,
    pub asset_bytes: Option<u64>,
    pub error_reason: Option<String>,
}

/// Aggregate result of an install run.
#[derive(Debug, Default)]
pub struct InstallSummary {
    pub results: Vec<TargetResult>,
}

impl InstallSummary {
    pub fn exit_code(&self) -> i32 {
        if self.results.iter().all(|r| r.success) { 0 } else { 1 }
    }
}

/// Per-app update-check outcome.
#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub app_name: String,
    pub current_version: String,
    pub latest_version: String,
    pub has_update: bool,
    pub release_url: String,
    pub prerelease: bool,
    /// The forge's original tag string, or `None` when `latest_version` is
    /// the literal `"unknown"` (no release could be resolved).
    pub original_tag: Option<String>,
    /// Cached so `update --force`/apply does not refetch what the check
    /// already resolved.
    pub cached_release: Option<crate::forge::Release>,
    pub cached_app_config: Option<AppConfig>,
    pub error_reason: Option<String>,
}

impl UpdateInfo {
    pub fn is_success(&self) -> bool {
        self.error_reason.is_none()
    }
}

/// Aggregate result of an update run.
#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub updated: Vec<TargetResult>,
    pub failed: Vec<TargetResult>,
    pub up_to_date: Vec<String>,
    pub invalid_apps: Vec<String>,
    pub update_infos: Vec<UpdateInfo>,
}

impl UpdateSummary {
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() && self.invalid_apps.is_empty() { 0 } else { 1 }
    }
}

/// Options controlling an install run.
pub struct InstallOptions {
    pub concurrent: Option<usize>,
    pub verify_downloads: bool,
    pub no_desktop: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            concurrent: None,
            verify_downloads: true,
            no_desktop: false,
        }
    }
}

/// Options controlling an update run.
#[derive(Default)]
pub struct UpdateOptions {
    pub refresh_cache: bool,
    pub force: bool,
    pub check_only: bool,
}

/// The constructed service graph: leaves (cache, config, state) wired
/// into composites (download, verifier, processor). Owns cleanup at the
/// end of a run.
pub struct Orchestrator {
    config: GlobalConfig,
    catalog: Catalog,
    forge: ForgeClient,
    cache: ReleaseCache,
    download: DownloadService,
    processor: Arc<PostDownloadProcessor>,
    state_manager: StateManager,
    reporter: Arc<dyn ProgressReporter>,
}

impl Orchestrator {
    pub fn new(config: GlobalConfig, catalog: Catalog, reporter: Arc<dyn ProgressReporter>) -> Self {
        let cache = ReleaseCache::new(config.cache_dir.clone(), config.cache_ttl_hours);
        let state_manager = StateManager::new(config.state_dir());
        let processor = Arc::new(PostDownloadProcessor::new(config.clone()));

        Self {
            config,
            catalog,
            forge: ForgeClient::new(),
            cache,
            download: DownloadService::new(),
            processor,
            state_manager,
            reporter,
        }
    }

    /// Resolves a target string (catalog key or `owner/repo` URL-ish
    /// string) to an `AppConfig`.
    fn resolve_target(&self, target: &str) -> AppConfig {
        if let Some(app) = self.catalog.lookup(target) {
            return app.clone();
        }

        let trimmed = target
            .trim_start_matches("https://github.com/")
            .trim_start_matches("github.com/")
            .trim_end_matches('/');

        if let Some((owner, repo)) = trimmed.split_once('/') {
            AppConfig::from_url(owner, repo)
        } else {
            AppConfig::from_url("unknown", trimmed)
        }
    }

    async fn resolve_release(
        &self,
        app_config: &AppConfig,
        refresh_cache: bool,
    ) -> Option<crate::forge::Release> {
        if !refresh_cache
            && let Some(cached) = self.cache.get(&app_config.owner, &app_config.repo, app_config.channel, false).await
        {
            return Some(cached);
        }

        let api_task = self.reporter.add_task(
            &app_config.name,
            TaskKind::ApiFetching,
            None,
            Some(format!("Fetching {}", app_config.name)),
            None,
            None,
            None,
        );

        let fetched = self
            .forge
            .get_latest_release(&app_config.owner, &app_config.repo, app_config.channel)
            .await;

        self.reporter.finish_task(&api_task, fetched.is_ok(), None);

        match fetched {
            Ok(Some(mut release)) => {
                // Filter before caching: only platform-relevant assets persist.
                let compatible: Vec<_> = selector::platform_compatible_assets(&release)
                    .into_iter()
                    .cloned()
                    .collect();
                let checksum_files: Vec<_> = selector::select_checksum_files(&release)
                    .into_iter()
                    .cloned()
                    .collect();
                release.assets = compatible.into_iter().chain(checksum_files).collect();

                self.cache
                    .put(&app_config.owner, &app_config.repo, app_config.channel, release.clone())
                    .await;
                Some(release)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(app = app_config.name, error = %e, "release resolution failed");
                None
            }
        }
    }

    async fn install_one(
        &self,
        target: String,
        app_config: AppConfig,
        operation: OperationType,
        cancel_token: CancellationToken,
    ) -> TargetResult {
        let Some(release) = self.resolve_release(&app_config, false).await else {
            return TargetResult {
                target,
                name: Some(app_config.name.clone()),
                success: false,
                asset_bytes: None,
                error_reason: Some("no release found for this target".to_string()),
            };
        };

        let installation_source = match app_config.source {
            SourceKind::Catalog => InstallationSource::Catalog,
            SourceKind::Url => InstallationSource::Url,
        };

        let Some(asset) =
            selector::select_appimage_for_platform(&release, &app_config.preferred_suffixes, installation_source)
        else {
            return TargetResult {
                target,
                name: Some(app_config.name.clone()),
                success: false,
                asset_bytes: None,
                error_reason: Some("no compatible AppImage asset found".to_string()),
            };
        };

        let asset_bytes = Some(asset.size);

        let download_result = cancel_token
            .run_until_cancelled(self.download.download_appimage(
                &asset.download_url,
                &asset.name,
                &self.config.download_dir,
                self.reporter.as_ref(),
            ))
            .await;

        let Some(download_result) = download_result else {
            return TargetResult {
                target,
                name: Some(app_config.name.clone()),
                success: false,
                asset_bytes,
                error_reason: Some("cancelled".to_string()),
            };
        };

        let downloaded_path = match download_result {
            Ok(path) => path,
            Err(e) => {
                return TargetResult {
                    target,
                    name: Some(app_config.name.clone()),
                    success: false,
                    asset_bytes,
                    error_reason: Some(e.to_string()),
                };
            }
        };

        match self
            .processor
            .process(&downloaded_path, asset, &release, &app_config, operation, self.reporter.as_ref())
            .await
        {
            Ok(result) => TargetResult {
                target,
                name: Some(app_config.name.clone()),
                success: result.success,
                asset_bytes,
                error_reason: None,
            },
            Err(e) => {
                let _ = crate::fs::remove_file(&downloaded_path).await;
                TargetResult {
                    target,
                    name: Some(app_config.name.clone()),
                    success: false,
                    asset_bytes,
                    error_reason: Some(e.to_string()),
                }
            }
        }
    }

    /// Runs an install across `targets`, bounded by `options.concurrent`
    /// (falling back to the global config's `max_concurrent_downloads`).
    #[instrument(skip(self, targets, cancel_token))]
    pub async fn install(
        &self,
        targets: Vec<String>,
        options: InstallOptions,
        cancel_token: CancellationToken,
    ) -> InstallSummary {
        let mut deduped = Vec::new();
        for target in targets {
            if !deduped.contains(&target) {
                deduped.push(target);
            }
        }

        let limit = options.concurrent.unwrap_or(self.config.max_concurrent_downloads).max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        info!(count = deduped.len(), limit, "starting install run");

        let futures = deduped.into_iter().map(|target| {
            let semaphore = semaphore.clone();
            let cancel_token = cancel_token.clone();
            let app_config = self.resolve_target(&target);

            async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                self.install_one(target, app_config, OperationType::Install, cancel_token).await
            }
        });

        let results = join_all(futures).await;
        InstallSummary { results }
    }

    /// Runs an update across either `target_names` or all installed apps.
    #[instrument(skip(self, target_names, cancel_token))]
    pub async fn update(
        &self,
        target_names: Option<Vec<String>>,
        options: UpdateOptions,
        cancel_token: CancellationToken,
    ) -> Result<UpdateSummary, OrchestratorError> {
        let installed = self.state_manager.list().await.unwrap_or_default();
        let mut summary = UpdateSummary::default();

        let to_check: Vec<String> = match target_names {
            Some(names) => {
                for name in &names {
                    let matched = installed.iter().any(|i| i.eq_ignore_ascii_case(name));
                    if !matched {
                        summary.invalid_apps.push(name.clone());
                    }
                }
                names
                    .into_iter()
                    .filter(|n| installed.iter().any(|i| i.eq_ignore_ascii_case(n)))
                    .collect()
            }
            None => installed,
        };

        let mut to_update = Vec::new();

        for name in to_check {
            let Ok(Some(state)) = self.state_manager.load(&name).await else {
                continue;
            };

            let app_config = state
                .overrides
                .clone()
                .or_else(|| self.catalog.lookup(&name).cloned())
                .unwrap_or_else(|| AppConfig::from_url("unknown", &name));

            let release = self.resolve_release(&app_config, options.refresh_cache).await;

            let Some(release) = release else {
                summary.update_infos.push(UpdateInfo {
                    app_name: name.clone(),
                    current_version: state.installed_version.clone(),
                    latest_version: "unknown".to_string(),
                    has_update: false,
                    release_url: String::new(),
                    prerelease: false,
                    original_tag: None,
                    cached_release: None,
                    cached_app_config: Some(app_config),
                    error_reason: Some("could not resolve latest release".to_string()),
                });
                continue;
            };

            let has_update = crate::forge::version::has_update(&state.installed_version, &release.version);
            let release_url = format!(
                "https://github.com/{}/{}/releases/tag/{}",
                release.owner, release.repo, release.tag_name
            );

            summary.update_infos.push(UpdateInfo {
                app_name: name.clone(),
                current_version: state.installed_version.clone(),
                latest_version: release.version.clone(),
                has_update,
                release_url,
                prerelease: release.prerelease,
                original_tag: Some(release.tag_name.clone()),
                cached_release: Some(release.clone()),
                cached_app_config: Some(app_config.clone()),
                error_reason: None,
            });

            if has_update {
                to_update.push((name, app_config));
            } else {
                summary.up_to_date.push(name);
            }
        }

        if to_update.is_empty() && !options.force {
            debug!("no apps require updating");
            return Ok(summary);
        }

        if options.check_only {
            return Ok(summary);
        }

        let limit = self.config.max_concurrent_downloads.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        let futures = to_update.into_iter().map(|(name, app_config)| {
            let semaphore = semaphore.clone();
            let cancel_token = cancel_token.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                self.install_one(name, app_config, OperationType::Update, cancel_token).await
            }
        });

        for result in join_all(futures).await {
            if result.success {
                summary.updated.push(result);
            } else {
                summary.failed.push(result);
            }
        }

        Ok(summary)
    }
}

/// Default, silent reporter used when no explicit reporter is provided.
pub fn default_reporter() -> Arc<dyn ProgressReporter> {
    Arc::new(NoopReporter)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use httpmock::prelude::*;
    use sha2::{Digest as _, Sha256};
    use time::OffsetDateTime;

    use super::*;
    use crate::config::state::{AppState, IconRecord, MethodRecord, VerificationSummary};
    use crate::config::{IconConfig, IconMethod, VerificationConfig};
    use crate::forge::{Asset, Channel, Digest, DigestAlgorithm, Release};

    struct Fixture {
        _dir: tempfile::TempDir,
        config: GlobalConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let config = GlobalConfig {
            install_dir: root.join("apps"),
            icon_dir: root.join("icons"),
            backup_dir: root.join("backups"),
            download_dir: root.join("downloads"),
            desktop_dir: root.join("applications"),
            cache_dir: root.join("cache"),
            config_dir: root.join("config"),
            cache_ttl_hours: 24,
            max_concurrent_downloads: 3,
            backup_retention_count: 2,
        };
        Fixture { _dir: dir, config }
    }

    fn app_config(name: &str, source: SourceKind) -> AppConfig {
        AppConfig {
            name: name.to_string(),
            source,
            owner: "acme".to_string(),
            repo: name.to_string(),
            channel: Channel::Stable,
            rename: None,
            preferred_suffixes: Vec::new(),
            verification: VerificationConfig::default(),
            icon: IconConfig {
                method: IconMethod::None,
                filename: None,
                download_url: None,
            },
            description: String::new(),
            categories: Vec::new(),
        }
    }

    fn release_with(owner: &str, repo: &str, version: &str, assets: Vec<Asset>) -> Release {
        Release {
            owner: owner.to_string(),
            repo: repo.to_string(),
            version: version.to_string(),
            prerelease: false,
            tag_name: format!("v{version}"),
            assets,
            checksum_files: Vec::new(),
            published_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::default();
        hasher.update(bytes);
        data_encoding::HEXLOWER.encode(&hasher.finalize())
    }

    #[tokio::test]
    async fn happy_path_catalog_install_records_passing_verification() {
        let server = MockServer::start();
        let fx = fixture();
        let payload = b"fake appimage contents for obsidian";
        let digest_hex = sha256_hex(payload);

        let asset_mock = server.mock(|when, then| {
            when.method(GET).path("/obsidian-1.10.6.AppImage");
            then.status(200).body(payload.to_vec());
        });
        let sums_mock = server.mock(|when, then| {
            when.method(GET).path("/SHA256SUMS");
            then.status(200).body(format!("{digest_hex}  obsidian-1.10.6.AppImage\n"));
        });

        let asset = Asset {
            name: "obsidian-1.10.6.AppImage".to_string(),
            size: payload.len() as u64,
            download_url: server.url("/obsidian-1.10.6.AppImage"),
            digest: Some(Digest {
                algorithm: DigestAlgorithm::Sha256,
                hex: digest_hex,
            }),
        };
        let sums_asset = Asset {
            name: "SHA256SUMS".to_string(),
            size: 0,
            download_url: server.url("/SHA256SUMS"),
            digest: None,
        };
        let release = release_with("acme", "obsidian", "1.10.6", vec![asset, sums_asset]);

        let catalog = Catalog::new(vec![app_config("obsidian", SourceKind::Catalog)]);
        let orchestrator = Orchestrator::new(fx.config.clone(), catalog, default_reporter());
        orchestrator.cache.put("acme", "obsidian", Channel::Stable, release).await;

        let summary = orchestrator
            .install(vec!["obsidian".to_string()], InstallOptions::default(), CancellationToken::new())
            .await;

        assert_eq!(summary.results.len(), 1);
        let result = &summary.results[0];
        assert!(result.success, "install failed: {:?}", result.error_reason);

        let state = orchestrator.state_manager.load("obsidian").await.unwrap().unwrap();
        assert_eq!(state.installed_version, "1.10.6");
        assert_eq!(state.installed_path, fx.config.install_dir.join("obsidian.AppImage"));
        assert!(state.verification.passed);
        assert!(state.verification.warning.is_none());

        let methods: BTreeMap<_, _> = state
            .verification
            .methods
            .iter()
            .map(|m| (m.method.clone(), m.passed))
            .collect();
        assert_eq!(methods.get("digest"), Some(&true));
        assert_eq!(methods.get("checksum_file"), Some(&true));

        let desktop_contents =
            std::fs::read_to_string(fx.config.desktop_dir.join("obsidian.desktop")).unwrap();
        assert!(desktop_contents.contains(&format!(
            "Exec={}",
            fx.config.install_dir.join("obsidian.AppImage").display()
        )));

        asset_mock.assert();
        sums_mock.assert();
    }

    #[tokio::test]
    async fn mismatched_checksum_file_warns_partial_but_still_succeeds() {
        let server = MockServer::start();
        let fx = fixture();
        let payload = b"obsidian binary payload, second revision";
        let digest_hex = sha256_hex(payload);
        let wrong_hex = "0".repeat(64);

        server.mock(|when, then| {
            when.method(GET).path("/obsidian-1.10.6.AppImage");
            then.status(200).body(payload.to_vec());
        });
        server.mock(|when, then| {
            when.method(GET).path("/SHA256SUMS");
            then.status(200).body(format!("{wrong_hex}  obsidian-1.10.6.AppImage\n"));
        });

        let asset = Asset {
            name: "obsidian-1.10.6.AppImage".to_string(),
            size: payload.len() as u64,
            download_url: server.url("/obsidian-1.10.6.AppImage"),
            digest: Some(Digest {
                algorithm: DigestAlgorithm::Sha256,
                hex: digest_hex,
            }),
        };
        let sums_asset = Asset {
            name: "SHA256SUMS".to_string(),
            size: 0,
            download_url: server.url("/SHA256SUMS"),
            digest: None,
        };
        let release = release_with("acme", "obsidian", "1.10.6", vec![asset, sums_asset]);

        let catalog = Catalog::new(vec![app_config("obsidian", SourceKind::Catalog)]);
        let orchestrator = Orchestrator::new(fx.config.clone(), catalog, default_reporter());
        orchestrator.cache.put("acme", "obsidian", Channel::Stable, release).await;

        let summary = orchestrator
            .install(vec!["obsidian".to_string()], InstallOptions::default(), CancellationToken::new())
            .await;

        let result = &summary.results[0];
        assert!(result.success, "install failed: {:?}", result.error_reason);

        let state = orchestrator.state_manager.load("obsidian").await.unwrap().unwrap();
        assert!(state.verification.passed);
        let methods: BTreeMap<_, _> = state
            .verification
            .methods
            .iter()
            .map(|m| (m.method.clone(), m.passed))
            .collect();
        assert_eq!(methods.get("digest"), Some(&true));
        assert_eq!(methods.get("checksum_file"), Some(&false));
        assert!(state.verification.warning.as_deref().unwrap_or("").contains("Partial"));
    }

    #[tokio::test]
    async fn failed_verification_leaves_no_state_and_removes_the_download() {
        let server = MockServer::start();
        let fx = fixture();
        let payload = b"obsidian binary payload, third revision";

        server.mock(|when, then| {
            when.method(GET).path("/obsidian-1.10.6.AppImage");
            then.status(200).body(payload.to_vec());
        });
        server.mock(|when, then| {
            when.method(GET).path("/SHA256SUMS");
            then.status(200).body(format!("{}  obsidian-1.10.6.AppImage\n", "1".repeat(64)));
        });

        let asset = Asset {
            name: "obsidian-1.10.6.AppImage".to_string(),
            size: payload.len() as u64,
            download_url: server.url("/obsidian-1.10.6.AppImage"),
            digest: Some(Digest {
                algorithm: DigestAlgorithm::Sha256,
                hex: "2".repeat(64),
            }),
        };
        let sums_asset = Asset {
            name: "SHA256SUMS".to_string(),
            size: 0,
            download_url: server.url("/SHA256SUMS"),
            digest: None,
        };
        let release = release_with("acme", "obsidian", "1.10.6", vec![asset, sums_asset]);

        let catalog = Catalog::new(vec![app_config("obsidian", SourceKind::Catalog)]);
        let orchestrator = Orchestrator::new(fx.config.clone(), catalog, default_reporter());
        orchestrator.cache.put("acme", "obsidian", Channel::Stable, release).await;

        let summary = orchestrator
            .install(vec!["obsidian".to_string()], InstallOptions::default(), CancellationToken::new())
            .await;

        let result = &summary.results[0];
        assert!(!result.success);
        assert!(result.error_reason.as_deref().unwrap_or("").contains("verification"));
        assert!(orchestrator.state_manager.load("obsidian").await.unwrap().is_none());
        assert!(!fx.config.download_dir.join("obsidian-1.10.6.AppImage").exists());
        assert!(!fx.config.install_dir.join("obsidian.AppImage").exists());
    }

    #[tokio::test]
    async fn update_backs_up_prior_install_and_prunes_old_backups() {
        let server = MockServer::start();
        let fx = fixture();

        std::fs::create_dir_all(&fx.config.install_dir).unwrap();
        let old_path = fx.config.install_dir.join("obsidian.AppImage");
        std::fs::write(&old_path, b"old contents").unwrap();

        std::fs::create_dir_all(&fx.config.backup_dir).unwrap();
        std::fs::write(fx.config.backup_dir.join("obsidian-1000000000.AppImage"), b"backup one").unwrap();
        std::fs::write(fx.config.backup_dir.join("obsidian-1000000100.AppImage"), b"backup two").unwrap();

        let catalog = Catalog::new(vec![app_config("obsidian", SourceKind::Catalog)]);
        let orchestrator = Orchestrator::new(fx.config.clone(), catalog, default_reporter());

        let existing_state = AppState {
            schema_version: 1,
            name: "obsidian".to_string(),
            source: SourceKind::Catalog,
            catalog_ref: Some("obsidian".to_string()),
            installed_version: "1.10.5".to_string(),
            installed_at: OffsetDateTime::UNIX_EPOCH,
            installed_path: old_path.clone(),
            verification: VerificationSummary {
                passed: true,
                methods: vec![MethodRecord {
                    method: "digest".to_string(),
                    passed: true,
                }],
                warning: None,
            },
            icon: IconRecord {
                installed: false,
                path: None,
                method: None,
                error: None,
            },
            overrides: None,
        };
        orchestrator.state_manager.save(&existing_state).await.unwrap();

        let payload = b"new appimage contents";
        let digest_hex = sha256_hex(payload);
        let mock = server.mock(|when, then| {
            when.method(GET).path("/obsidian-1.10.6.AppImage");
            then.status(200).body(payload.to_vec());
        });

        let asset = Asset {
            name: "obsidian-1.10.6.AppImage".to_string(),
            size: payload.len() as u64,
            download_url: server.url("/obsidian-1.10.6.AppImage"),
            digest: Some(Digest {
                algorithm: DigestAlgorithm::Sha256,
                hex: digest_hex,
            }),
        };
        let release = release_with("acme", "obsidian", "1.10.6", vec![asset]);
        orchestrator.cache.put("acme", "obsidian", Channel::Stable, release).await;

        let summary = orchestrator
            .update(Some(vec!["obsidian".to_string()]), UpdateOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.updated.len(), 1, "failed: {:?}", summary.failed);
        assert!(!old_path.exists(), "prior install should have been renamed away");

        let state = orchestrator.state_manager.load("obsidian").await.unwrap().unwrap();
        assert_eq!(state.installed_version, "1.10.6");

        let backups: Vec<_> = std::fs::read_dir(&fx.config.backup_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("obsidian-"))
            .collect();
        assert_eq!(backups.len(), fx.config.backup_retention_count);

        mock.assert();
    }

    #[tokio::test]
    async fn url_install_without_any_checksum_still_succeeds_with_a_warning() {
        let server = MockServer::start();
        let fx = fixture();
        let payload = b"widget binary payload";

        server.mock(|when, then| {
            when.method(GET).path("/widget-2.0.0.AppImage");
            then.status(200).body(payload.to_vec());
        });

        let asset = Asset {
            name: "widget-2.0.0.AppImage".to_string(),
            size: payload.len() as u64,
            download_url: server.url("/widget-2.0.0.AppImage"),
            digest: None,
        };
        let release = release_with("acme", "widget", "2.0.0", vec![asset]);

        let mut app = app_config("widget-app", SourceKind::Url);
        app.repo = "widget".to_string();
        let catalog = Catalog::new(vec![app]);
        let orchestrator = Orchestrator::new(fx.config.clone(), catalog, default_reporter());
        orchestrator.cache.put("acme", "widget", Channel::Stable, release).await;

        let summary = orchestrator
            .install(vec!["widget-app".to_string()], InstallOptions::default(), CancellationToken::new())
            .await;

        let result = &summary.results[0];
        assert!(result.success, "install failed: {:?}", result.error_reason);

        let state = orchestrator.state_manager.load("widget-app").await.unwrap().unwrap();
        assert!(state.verification.passed);
        assert!(state.verification.warning.as_deref().unwrap_or("").contains("unable to verify"));
        assert!(matches!(state.source, SourceKind::Url));
        assert!(state.overrides.is_some());
    }
}
