//! Concurrent verification: digest and checksum-file methods running in
//! parallel, with partial-success semantics.

pub mod checksum_file;

use std::collections::BTreeMap;
use std::path::Path;

use data_encoding::HEXLOWER;
use miette::Diagnostic;
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha512};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, instrument, trace};

use crate::config::AppConfig;
use crate::download::DownloadService;
use crate::fs;
use crate::forge::{Asset, Release};
use crate::progress::{ProgressReporter, TaskKind};
use crate::selector;
use checksum_file::Algorithm;

const COARSE_UPDATE_THRESHOLD_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error, Diagnostic)]
pub enum VerificationError {
    #[error("all attempted verification methods failed for {asset_name}")]
    #[diagnostic(code(my_unicorn::verify::all_methods_failed))]
    AllMethodsFailed { asset_name: String },

    #[error("failed to download checksum file")]
    #[diagnostic(code(my_unicorn::verify::checksum_download))]
    ChecksumDownload(#[from] crate::download::DownloadError),

    #[error(transparent)]
    #[diagnostic(code(my_unicorn::verify::io))]
    Io(#[from] std::io::Error),
}

/// The outcome of a single verification method.
#[derive(Debug, Clone)]
pub struct MethodResult {
    pub passed: bool,
    pub hash: Option<String>,
    pub algorithm: Option<String>,
    pub details: Option<String>,
}

/// The aggregate outcome of verifying a downloaded file.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub passed: bool,
    pub methods: BTreeMap<String, MethodResult>,
    pub warning: Option<String>,
    pub updated_config: AppConfig,
}

/// Runs digest and/or checksum-file verification for a downloaded file.
#[derive(Clone)]
pub struct Verifier {
    download: DownloadService,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier {
    pub fn new() -> Self {
        Self {
            download: DownloadService::new(),
        }
    }

    /// Verifies `file_path` against `asset`'s digest and/or a relevant
    /// checksum file from `release`, following the skip/execute/gather
    /// policy.
    #[instrument(skip(self, file_path, release, config, reporter))]
    pub async fn verify(
        &self,
        file_path: &Path,
        asset: &Asset,
        release: &Release,
        config: &AppConfig,
        reporter: &dyn ProgressReporter,
    ) -> Result<VerificationResult, VerificationError> {
        let has_digest = asset.digest.is_some();
        let checksum_candidates = selector::select_checksum_files(release);
        let has_checksum_files = !checksum_candidates.is_empty();

        let mut updated_config = config.clone();

        if config.verification.method == crate::config::VerificationMethod::Skip
            && !has_digest
            && !has_checksum_files
        {
            return Ok(VerificationResult {
                passed: true,
                methods: BTreeMap::new(),
                warning: Some("no verification methods available".to_string()),
                updated_config,
            });
        }

        let task_id = reporter.add_task(
            &asset.name,
            TaskKind::Verification,
            file_size(file_path).await.ok(),
            Some("Verifying".to_string()),
            None,
            None,
            None,
        );

        let digest_fut = async {
            if has_digest {
                Some(self.verify_digest(file_path, asset, &task_id, reporter).await)
            } else {
                None
            }
        };

        let checksum_fut = async {
            if has_checksum_files {
                Some(
                    self.verify_checksum_file(file_path, asset, &checksum_candidates, &task_id, reporter)
                        .await,
                )
            } else {
                None
            }
        };

        let (digest_result, checksum_result) = tokio::join!(digest_fut, checksum_fut);

        let mut methods = BTreeMap::new();
        if let Some(result) = digest_result {
            if result.passed {
                updated_config.verification.method = crate::config::VerificationMethod::Digest;
            }
            methods.insert("digest".to_string(), result);
        }
        if let Some(result) = checksum_result {
            if result.passed {
                updated_config.verification.method = crate::config::VerificationMethod::ChecksumFile;
                if let Some(name) = result.details.clone() {
                    updated_config.verification.checksum_file_name = Some(name);
                }
            }
            methods.insert("checksum_file".to_string(), result);
        }

        let attempted = methods.len();
        let passed = attempted == 0 || methods.values().any(|m| m.passed);
        let any_failed = methods.values().any(|m| !m.passed);

        reporter.finish_task(&task_id, passed, None);

        if attempted > 0 && !passed {
            return Err(VerificationError::AllMethodsFailed {
                asset_name: asset.name.clone(),
            });
        }

        let warning = if passed && any_failed {
            let passed_count = methods.values().filter(|m| m.passed).count();
            Some(format!("Partial verification: only {passed_count} passed"))
        } else if attempted == 0 {
            Some("unable to verify: no checksum provided".to_string())
        } else {
            None
        };

        Ok(VerificationResult {
            passed,
            methods,
            warning,
            updated_config,
        })
    }

    async fn verify_digest(
        &self,
        file_path: &Path,
        asset: &Asset,
        task_id: &crate::progress::TaskId,
        reporter: &dyn ProgressReporter,
    ) -> MethodResult {
        let Some((algo_name, expected_hex)) = asset.parsed_digest() else {
            return MethodResult {
                passed: false,
                hash: None,
                algorithm: None,
                details: Some("asset had no digest to parse".to_string()),
            };
        };

        let actual_hex = match stream_hash(file_path, algo_name, task_id, reporter).await {
            Ok(hash) => hash,
            Err(e) => {
                return MethodResult {
                    passed: false,
                    hash: None,
                    algorithm: Some(algo_name.to_string()),
                    details: Some(format!("hashing failed: {e}")),
                };
            }
        };

        let passed = actual_hex.eq_ignore_ascii_case(expected_hex);
        trace!(algo_name, passed, "digest verification complete");

        MethodResult {
            passed,
            hash: Some(actual_hex),
            algorithm: Some(algo_name.to_string()),
            details: None,
        }
    }

    async fn verify_checksum_file(
        &self,
        file_path: &Path,
        asset: &Asset,
        candidates: &[&Asset],
        task_id: &crate::progress::TaskId,
        reporter: &dyn ProgressReporter,
    ) -> MethodResult {
        // Priority: YAML manifest > paired SHA256SUMS/SHA512SUMS > BSD-style.
        let chosen = candidates
            .iter()
            .find(|a| a.name.to_ascii_lowercase().ends_with(".yml") || a.name.to_ascii_lowercase().ends_with(".yaml"))
            .or_else(|| {
                candidates.iter().find(|a| {
                    let lower = a.name.to_ascii_lowercase();
                    lower == "sha256sums" || lower == "sha512sums"
                })
            })
            .or_else(|| candidates.first());

        let Some(chosen) = chosen else {
            return MethodResult {
                passed: false,
                hash: None,
                algorithm: None,
                details: Some("no checksum file candidate".to_string()),
            };
        };

        let content = match self.download.download_checksum_file(&chosen.download_url).await {
            Ok(text) => text,
            Err(e) => {
                return MethodResult {
                    passed: false,
                    hash: None,
                    algorithm: None,
                    details: Some(format!("download of {} failed: {e}", chosen.name)),
                };
            }
        };

        let lower_name = chosen.name.to_ascii_lowercase();
        let expected_hex = if lower_name.ends_with(".yml") || lower_name.ends_with(".yaml") {
            checksum_file::parse_yaml_manifest(&content)
                .into_iter()
                .find(|entry| entry.filename == asset.name)
                .map(|entry| (entry.algorithm, entry.hex_digest))
        } else {
            let algorithm = Algorithm::from_filename_hint(&chosen.name);
            checksum_file::extract_checksum(&content, &asset.name, algorithm).map(|hex| (algorithm, hex))
        };

        let Some((algorithm, expected_hex)) = expected_hex else {
            return MethodResult {
                passed: false,
                hash: None,
                algorithm: None,
                details: Some(format!("{} had no entry for {}", chosen.name, asset.name)),
            };
        };

        let algo_name = match algorithm {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
            Algorithm::Sha1 => "sha1",
            Algorithm::Md5 => "md5",
        };

        let actual_hex = match stream_hash(file_path, algo_name, task_id, reporter).await {
            Ok(hash) => hash,
            Err(e) => {
                return MethodResult {
                    passed: false,
                    hash: None,
                    algorithm: Some(algo_name.to_string()),
                    details: Some(format!("hashing failed: {e}")),
                };
            }
        };

        MethodResult {
            passed: actual_hex.eq_ignore_ascii_case(&expected_hex),
            hash: Some(actual_hex),
            algorithm: Some(algo_name.to_string()),
            details: Some(chosen.name.clone()),
        }
    }
}

async fn file_size(path: &Path) -> std::io::Result<u64> {
    Ok(fs::metadata(path).await?.len())
}

async fn stream_hash(
    path: &Path,
    algorithm: &str,
    task_id: &crate::progress::TaskId,
    reporter: &dyn ProgressReporter,
) -> std::io::Result<String> {
    let file = fs::File::open(path).await?;
    let total = file.metadata().await?.len();
    let large = total >= COARSE_UPDATE_THRESHOLD_BYTES;
    let update_every = (total / 10).max(1);

    let mut reader = BufReader::new(file);
    reader.seek(std::io::SeekFrom::Start(0)).await?;

    let mut buf = vec![0u8; 64 * 1024];
    let mut read = 0u64;
    let mut last_update = 0u64;

    enum Hasher {
        Sha256(Sha256),
        Sha512(Sha512),
        Sha1(Sha1),
        Md5(md5::Context),
    }

    let mut hasher = match algorithm {
        "sha512" => Hasher::Sha512(Sha512::default()),
        "sha1" => Hasher::Sha1(Sha1::default()),
        "md5" => Hasher::Md5(md5::Context::new()),
        _ => Hasher::Sha256(Sha256::default()),
    };

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        match &mut hasher {
            Hasher::Sha256(h) => h.update(&buf[..n]),
            Hasher::Sha512(h) => h.update(&buf[..n]),
            Hasher::Sha1(h) => h.update(&buf[..n]),
            Hasher::Md5(ctx) => ctx.consume(&buf[..n]),
        }
        read += n as u64;

        if !large || read - last_update >= update_every {
            reporter.update_task(task_id, Some(read), Some(total), None);
            last_update = read;
        }
    }

    let hex = match hasher {
        Hasher::Sha256(h) => HEXLOWER.encode(&h.finalize()),
        Hasher::Sha512(h) => HEXLOWER.encode(&h.finalize()),
        Hasher::Sha1(h) => HEXLOWER.encode(&h.finalize()),
        Hasher::Md5(ctx) => HEXLOWER.encode(&*ctx.compute()),
    };

    debug!(algorithm, read, "stream hash complete");
    Ok(hex)
}
