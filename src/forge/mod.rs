//! Forge API client: resolves `(owner, repo, channel)` to a [`Release`].

pub mod auth;
pub mod version;

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use octocrab::Octocrab;
use octocrab::models::repos::Release as RawRelease;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument, trace, warn};

static APP_USER_AGENT: &str = concat!(
    "my-unicorn/",
    env!("CARGO_PKG_NAME"),
    "@",
    env!("CARGO_PKG_VERSION"),
);

/// Which release a forge lookup should resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    /// The single latest non-prerelease release.
    Stable,
    /// The topmost entry in the release list, prerelease or not.
    Prerelease,
    /// Whichever release is most recent by publish timestamp.
    Latest,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// The hash algorithm a forge-supplied asset digest uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// A parsed `<algorithm>:<hex>` asset digest, carried as a value type
/// rather than a raw string once past the forge client boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub algorithm: DigestAlgorithm,
    pub hex: String,
}

impl std::str::FromStr for Digest {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algo, hex) = s.split_once(':').ok_or(())?;
        let algorithm = DigestAlgorithm::parse(algo).ok_or(())?;
        Ok(Self {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_ref(), self.hex)
    }
}

impl Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|()| serde::de::Error::custom(format!("unrecognized digest {raw:?}")))
    }
}

/// A single downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub size: u64,
    pub download_url: String,
    /// Parsed from the forge's `<algorithm>:<hex>` digest string, when
    /// present and recognized.
    pub digest: Option<Digest>,
}

impl Asset {
    fn from_raw(raw: &octocrab::models::repos::Asset) -> Self {
        Self {
            name: raw.name.clone(),
            size: raw.size as u64,
            download_url: raw.browser_download_url.to_string(),
            digest: raw.digest.as_deref().and_then(|d| d.parse().ok()),
        }
    }

    /// Splits the digest into `(algorithm, hex)`.
    pub fn parsed_digest(&self) -> Option<(&str, &str)> {
        self.digest.as_ref().map(|d| (d.algorithm.as_ref(), d.hex.as_str()))
    }
}

/// A parsed checksum manifest downloaded during verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumFile {
    pub source_url: String,
    pub filename: String,
    pub algorithm: String,
    pub digests: std::collections::BTreeMap<String, String>,
}

/// One published version of a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub owner: String,
    pub repo: String,
    /// Normalized version (leading `v` stripped, prerelease canonicalized).
    pub version: String,
    pub prerelease: bool,
    /// Original tag string, preserved for URL reconstruction.
    pub tag_name: String,
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub checksum_files: Vec<ChecksumFile>,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
}

impl Release {
    fn from_raw(owner: &str, repo: &str, raw: &RawRelease) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            version: version::normalize(&raw.tag_name),
            prerelease: raw.prerelease,
            tag_name: raw.tag_name.clone(),
            assets: raw.assets.iter().map(Asset::from_raw).collect(),
            checksum_files: Vec::new(),
            published_at: raw
                .published_at
                .map(|t| {
                    OffsetDateTime::from_unix_timestamp(t.timestamp())
                        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
                })
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ForgeError {
    #[error("request to {owner}/{repo} was rate-limited, resets at {reset_at}")]
    #[diagnostic(code(my_unicorn::forge::rate_limited))]
    #[diagnostic(help("wait until the reset time or set an authentication token"))]
    RateLimit {
        owner: String,
        repo: String,
        reset_at: String,
    },

    #[error("forge request to {owner}/{repo} failed with a non-success status")]
    #[diagnostic(code(my_unicorn::forge::non_success))]
    NonSuccess { owner: String, repo: String },

    #[error("no releases found for {owner}/{repo} on channel {channel}")]
    #[diagnostic(code(my_unicorn::forge::no_releases))]
    NoReleases {
        owner: String,
        repo: String,
        channel: Channel,
    },

    #[error("network request to the forge failed")]
    #[diagnostic(code(my_unicorn::forge::network))]
    Network(#[from] octocrab::Error),
}

/// Client for querying a forge's release API.
#[derive(Clone)]
pub struct ForgeClient {
    gh_client: Arc<Octocrab>,
}

impl fmt::Debug for ForgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForgeClient").finish_non_exhaustive()
    }
}

impl Default for ForgeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ForgeClient {
    /// Builds a client, authenticating with a token resolved from the
    /// environment or, failing that, a credential file (see [`auth`]).
    pub fn new() -> Self {
        Self::with_token(auth::resolve_token())
    }

    pub fn with_token(token: Option<String>) -> Self {
        let mut builder = Octocrab::builder().user_agent(APP_USER_AGENT.to_string());
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }
        let gh_client = builder.build().unwrap_or_else(|_| octocrab::Octocrab::default());

        Self {
            gh_client: Arc::new(gh_client),
        }
    }

    /// Resolves `(owner, repo, channel)` to a [`Release`], or `None` on a
    /// 404 (no matching release exists).
    #[instrument(skip(self))]
    pub async fn get_latest_release(
        &self,
        owner: &str,
        repo: &str,
        channel: Channel,
    ) -> Result<Option<Release>, ForgeError> {
        debug!(owner, repo, %channel, "resolving release");

        let result = match channel {
            Channel::Stable => {
                self.gh_client
                    .repos(owner, repo)
                    .releases()
                    .get_latest()
                    .await
            }
            Channel::Prerelease | Channel::Latest => {
                let page = self
                    .gh_client
                    .repos(owner, repo)
                    .releases()
                    .list()
                    .per_page(10)
                    .send()
                    .await?;

                let chosen = if channel == Channel::Latest {
                    page.items
                        .into_iter()
                        .max_by_key(|r| r.published_at.map(|t| t.timestamp()).unwrap_or(0))
                } else {
                    page.items.into_iter().next()
                };

                return Ok(chosen.map(|raw| Release::from_raw(owner, repo, &raw)));
            }
        };

        match result {
            Ok(raw) => Ok(Some(Release::from_raw(owner, repo, &raw))),
            Err(octocrab::Error::GitHub { source, .. }) if is_rate_limited(&source) => {
                warn!(owner, repo, "forge rate limit hit");
                Err(ForgeError::RateLimit {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    reset_at: "unknown".to_string(),
                })
            }
            Err(octocrab::Error::GitHub { source, .. }) if source.status_code.as_u16() == 404 => {
                trace!(owner, repo, "no release found");
                Ok(None)
            }
            Err(other) => Err(ForgeError::Network(other)),
        }
    }

    /// Fetches a specific tagged release.
    #[instrument(skip(self))]
    pub async fn get_release(
        &self,
        owner: &str,
        repo: &str,
        tag_name: &str,
    ) -> Result<Option<Release>, ForgeError> {
        match self
            .gh_client
            .repos(owner, repo)
            .releases()
            .get_by_tag(tag_name)
            .await
        {
            Ok(raw) => Ok(Some(Release::from_raw(owner, repo, &raw))),
            Err(octocrab::Error::GitHub { source, .. }) if source.status_code.as_u16() == 404 => {
                Ok(None)
            }
            Err(other) => Err(ForgeError::Network(other)),
        }
    }
}

fn is_rate_limited(source: &octocrab::GitHubError) -> bool {
    source.status_code.as_u16() == 403
        && source
            .message
            .to_ascii_lowercase()
            .contains("rate limit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_round_trips_through_display_and_parse() {
        let digest: Digest = "sha256:deadbeef".parse().unwrap();
        assert_eq!(digest.algorithm, DigestAlgorithm::Sha256);
        assert_eq!(digest.hex, "deadbeef");
        assert_eq!(digest.to_string(), "sha256:deadbeef");
    }

    #[test]
    fn digest_parse_rejects_unknown_algorithm() {
        assert!("blake3:deadbeef".parse::<Digest>().is_err());
        assert!("deadbeef".parse::<Digest>().is_err());
    }

    #[test]
    fn channel_displays_as_lowercase() {
        assert_eq!(Channel::Stable.to_string(), "stable");
        assert_eq!(Channel::Prerelease.to_string(), "prerelease");
    }

    #[test]
    fn client_builds_without_a_token() {
        // Exercises the credential-resolution path with no env var or
        // credential file present; must not panic even when unauthenticated.
        let _client = ForgeClient::with_token(None);
    }
}
