//! On-disk TTL cache of filtered `Release` objects keyed by
//! `(owner, repo, channel)`, plus per-release checksum-file payloads.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::fs;
use crate::forge::{Channel, ChecksumFile, Release};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(with = "time::serde::rfc3339")]
    cached_at: OffsetDateTime,
    ttl_hours: u32,
    release: Release,
    #[serde(default)]
    checksum_files: std::collections::BTreeMap<String, ChecksumFile>,
}

/// Aggregate cache statistics returned by [`ReleaseCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub fresh: usize,
    pub expired: usize,
    pub corrupted: usize,
    pub ttl_hours: u32,
    pub cache_directory: PathBuf,
}

/// An on-disk, content-addressed cache of releases. Never contacts the
/// forge; failures to read or write are logged and swallowed rather than
/// propagated, since the caller can always re-fetch.
#[derive(Debug, Clone)]
pub struct ReleaseCache {
    directory: PathBuf,
    default_ttl_hours: u32,
}

fn key(owner: &str, repo: &str, channel: Channel) -> String {
    format!("{owner}_{repo}_{}", channel.as_ref())
}

impl ReleaseCache {
    pub fn new(directory: PathBuf, default_ttl_hours: u32) -> Self {
        Self {
            directory,
            default_ttl_hours,
        }
    }

    fn entry_path(&self, owner: &str, repo: &str, channel: Channel) -> PathBuf {
        self.directory.join(format!("{}.json", key(owner, repo, channel)))
    }

    /// Returns the cached release if present and within its TTL (or
    /// `ignore_ttl` is set). A malformed entry on disk is silently
    /// deleted and treated as a miss.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        owner: &str,
        repo: &str,
        channel: Channel,
        ignore_ttl: bool,
    ) -> Option<Release> {
        let path = self.entry_path(owner, repo, channel);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(?path, error = %e, "cache read failed");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&text) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(?path, error = %e, "cache entry corrupted, deleting");
                let _ = fs::remove_file(&path).await;
                return None;
            }
        };

        let age_hours = (OffsetDateTime::now_utc() - entry.cached_at).whole_hours();
        if !ignore_ttl && age_hours >= entry.ttl_hours as i64 {
            debug!(?path, age_hours, ttl = entry.ttl_hours, "cache entry expired");
            return None;
        }

        Some(entry.release)
    }

    /// Writes `release` (already selector-filtered by the caller) to the
    /// cache. Atomic write-then-rename. Failures are logged and
    /// swallowed: the next fetch simply repopulates the cache.
    #[instrument(skip(self, release))]
    pub async fn put(&self, owner: &str, repo: &str, channel: Channel, release: Release) {
        let path = self.entry_path(owner, repo, channel);
        let entry = CacheEntry {
            cached_at: OffsetDateTime::now_utc(),
            ttl_hours: self.default_ttl_hours,
            release,
            checksum_files: std::collections::BTreeMap::new(),
        };

        if let Err(e) = self.write_entry(&path, &entry).await {
            warn!(?path, error = %e, "failed to write cache entry");
        }
    }

    async fn write_entry(&self, path: &std::path::Path, entry: &CacheEntry) -> std::io::Result<()> {
        fs::create_dir_all(&self.directory).await?;
        let json = serde_json::to_string_pretty(entry)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await
    }

    /// Extends an existing cache entry with a parsed checksum manifest,
    /// keyed by source URL. Returns `false` if no entry exists for the
    /// given release, or the entry's version does not match `version`.
    #[instrument(skip(self, file))]
    pub async fn store_checksum_file(
        &self,
        owner: &str,
        repo: &str,
        channel: Channel,
        version: &str,
        file: ChecksumFile,
    ) -> bool {
        let path = self.entry_path(owner, repo, channel);
        let Ok(text) = fs::read_to_string(&path).await else {
            return false;
        };
        let Ok(mut entry) = serde_json::from_str::<CacheEntry>(&text) else {
            return false;
        };
        if entry.release.version != version {
            return false;
        }

        entry
            .checksum_files
            .insert(file.source_url.clone(), file);

        self.write_entry(&path, &entry).await.is_ok()
    }

    pub async fn has_checksum_file(
        &self,
        owner: &str,
        repo: &str,
        channel: Channel,
        source_url: &str,
    ) -> bool {
        self.get_checksum_file(owner, repo, channel, source_url)
            .await
            .is_some()
    }

    pub async fn get_checksum_file(
        &self,
        owner: &str,
        repo: &str,
        channel: Channel,
        source_url: &str,
    ) -> Option<ChecksumFile> {
        let path = self.entry_path(owner, repo, channel);
        let text = fs::read_to_string(&path).await.ok()?;
        let entry: CacheEntry = serde_json::from_str(&text).ok()?;
        entry.checksum_files.get(source_url).cloned()
    }

    /// Walks the cache directory, dropping files older than `max_age_days`
    /// or whose JSON cannot be parsed.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self, max_age_days: u32) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let should_remove = match fs::read_to_string(&path).await {
                Ok(text) => match serde_json::from_str::<CacheEntry>(&text) {
                    Ok(entry) => {
                        let age_days =
                            (OffsetDateTime::now_utc() - entry.cached_at).whole_days();
                        age_days >= max_age_days as i64
                    }
                    Err(_) => true,
                },
                Err(_) => true,
            };

            if should_remove {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Aggregate statistics over every entry on disk.
    pub async fn stats(&self) -> std::io::Result<CacheStats> {
        let mut stats = CacheStats {
            total: 0,
            fresh: 0,
            expired: 0,
            corrupted: 0,
            ttl_hours: self.default_ttl_hours,
            cache_directory: self.directory.clone(),
        };

        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e),
        };

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            stats.total += 1;

            match fs::read_to_string(&path).await {
                Ok(text) => match serde_json::from_str::<CacheEntry>(&text) {
                    Ok(entry) => {
                        let age_hours =
                            (OffsetDateTime::now_utc() - entry.cached_at).whole_hours();
                        if age_hours >= entry.ttl_hours as i64 {
                            stats.expired += 1;
                        } else {
                            stats.fresh += 1;
                        }
                    }
                    Err(_) => stats.corrupted += 1,
                },
                Err(_) => stats.corrupted += 1,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_release(owner: &str, repo: &str) -> Release {
        Release {
            owner: owner.to_string(),
            repo: repo.to_string(),
            version: "1.0.0".to_string(),
            prerelease: false,
            tag_name: "v1.0.0".to_string(),
            assets: vec![],
            checksum_files: vec![],
            published_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(dir.path().to_path_buf(), 24);
        let release = sample_release("foo", "bar");

        cache.put("foo", "bar", Channel::Stable, release.clone()).await;
        let fetched = cache.get("foo", "bar", Channel::Stable, false).await;

        assert_eq!(fetched.map(|r| r.version), Some(release.version));
    }

    #[tokio::test]
    async fn expired_entry_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(dir.path().to_path_buf(), 0);
        cache
            .put("foo", "bar", Channel::Stable, sample_release("foo", "bar"))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let fetched = cache.get("foo", "bar", Channel::Stable, false).await;
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn checksum_file_round_trip_requires_matching_version() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReleaseCache::new(dir.path().to_path_buf(), 24);
        cache
            .put("foo", "bar", Channel::Stable, sample_release("foo", "bar"))
            .await;

        let file = ChecksumFile {
            source_url: "https://example.com/SHA256SUMS".to_string(),
            filename: "SHA256SUMS".to_string(),
            algorithm: "sha256".to_string(),
            digests: Default::default(),
        };

        let stored = cache
            .store_checksum_file("foo", "bar", Channel::Stable, "1.0.0", file.clone())
            .await;
        assert!(stored);

        assert!(
            cache
                .has_checksum_file("foo", "bar", Channel::Stable, &file.source_url)
                .await
        );

        let mismatched = cache
            .store_checksum_file("foo", "bar", Channel::Stable, "2.0.0", file)
            .await;
        assert!(!mismatched);
    }
}
