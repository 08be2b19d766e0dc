//! Pure filter+rank over a release's assets: platform compatibility,
//! preferred-suffix ranking, checksum-file relevance.

use regex::Regex;

use crate::forge::{Asset, Release};

const REJECTED_WINDOWS: &[&str] = &["win64", "win32", "windows"];
const REJECTED_MACOS_WORDS: &[&str] = &["mac", "darwin", "osx", "apple"];
const REJECTED_ARCHES: &[&str] = &["arm64", "aarch64", "armhf", "armv7l", "armv6"];
const REJECTED_EXPERIMENTAL: &[&str] = &["nightly-experimental", "canary", "experimental"];

const CHECKSUM_EXTENSIONS: &[&str] = &[
    ".sha256",
    ".sha256sum",
    ".sha512",
    ".sha512sum",
    ".md5sum",
    ".digest",
];
const CHECKSUM_MANIFEST_NAMES: &[&str] = &["sha256sums", "sha512sums"];
const UNSTABLE_MARKERS: &[&str] = &["alpha", "beta", "rc", "nightly", "dev"];

fn standalone_word(haystack: &str, word: &str) -> bool {
    let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
    Regex::new(&pattern)
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

fn ends_with_ci(name: &str, suffix: &str) -> bool {
    name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
}

fn contains_ci(name: &str, needle: &str) -> bool {
    name.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

/// True iff the filename is a platform-compatible Linux AppImage: ends in
/// `.AppImage` and matches none of the rejected platform markers.
pub fn is_platform_compatible(filename: &str) -> bool {
    if !ends_with_ci(filename, ".AppImage") {
        return false;
    }

    if REJECTED_WINDOWS.iter().any(|m| contains_ci(filename, m))
        || contains_ci(filename, ".exe")
        || contains_ci(filename, ".msi")
    {
        return false;
    }

    if contains_ci(filename, ".dmg")
        || contains_ci(filename, ".pkg")
        || REJECTED_MACOS_WORDS
            .iter()
            .any(|w| standalone_word(filename, w))
    {
        return false;
    }

    if REJECTED_ARCHES.iter().any(|a| contains_ci(filename, a)) {
        return false;
    }

    if contains_ci(filename, "-src-")
        || contains_ci(filename, "-source-")
        || ends_with_ci(filename, ".src.tar.gz")
        || ends_with_ci(filename, ".src.tar.xz")
    {
        return false;
    }

    if REJECTED_EXPERIMENTAL.iter().any(|m| contains_ci(filename, m)) {
        return false;
    }

    true
}

/// True iff the filename is recognized as a checksum manifest.
pub fn is_checksum_file(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    CHECKSUM_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        || CHECKSUM_MANIFEST_NAMES.contains(&lower.as_str())
        || (lower.ends_with(".yml") || lower.ends_with(".yaml"))
            && lower.contains("latest")
            && lower.contains("linux")
}

/// True iff an already-identified checksum file is relevant to the given
/// set of platform-compatible AppImage candidates.
pub fn is_relevant_checksum_file(filename: &str, appimage_candidates: &[&str]) -> bool {
    let lower = filename.to_ascii_lowercase();

    if CHECKSUM_MANIFEST_NAMES.contains(&lower.as_str()) {
        return true;
    }

    if lower.ends_with(".yml") || lower.ends_with(".yaml") {
        return lower.contains("linux");
    }

    appimage_candidates
        .iter()
        .any(|candidate| lower.starts_with(&candidate.to_ascii_lowercase()))
}

/// Returns every asset in `release` recognized as platform-compatible.
pub fn platform_compatible_assets(release: &Release) -> Vec<&Asset> {
    release
        .assets
        .iter()
        .filter(|a| is_platform_compatible(&a.name))
        .collect()
}

/// Returns every asset in `release` recognized as a relevant checksum file.
pub fn select_checksum_files<'a>(release: &'a Release) -> Vec<&'a Asset> {
    let appimage_names: Vec<&str> = platform_compatible_assets(release)
        .into_iter()
        .map(|a| a.name.as_str())
        .collect();

    release
        .assets
        .iter()
        .filter(|a| {
            is_checksum_file(&a.name) && is_relevant_checksum_file(&a.name, &appimage_names)
        })
        .collect()
}

/// Where a target came from: controls whether unstable-version markers are
/// filtered out of candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationSource {
    Catalog,
    Url,
}

/// Selects the single AppImage asset to install from `release`.
///
/// 1. Filters to platform-compatible AppImages.
/// 2. If `preferred_suffixes` is non-empty, ranks candidates by the first
///    suffix (in order) whose match is found.
/// 3. For `installation_source = Url`, drops candidates with an unstable
///    marker in the filename.
/// 4. Returns the first remaining candidate, or `None`.
pub fn select_appimage_for_platform<'a>(
    release: &'a Release,
    preferred_suffixes: &[String],
    installation_source: InstallationSource,
) -> Option<&'a Asset> {
    let mut candidates = platform_compatible_assets(release);

    if installation_source == InstallationSource::Url {
        candidates.retain(|a| {
            !UNSTABLE_MARKERS
                .iter()
                .any(|marker| contains_ci(&a.name, marker))
        });
    }

    if candidates.is_empty() {
        return None;
    }

    if !preferred_suffixes.is_empty() {
        for suffix in preferred_suffixes {
            if let Some(asset) = candidates.iter().find(|a| ends_with_ci(&a.name, suffix)) {
                return Some(asset);
            }
        }
    }

    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_windows_and_macos_markers() {
        assert!(!is_platform_compatible("app-Win64.exe"));
        assert!(!is_platform_compatible("app-darwin.dmg"));
        assert!(!is_platform_compatible("app-mac.AppImage"));
    }

    #[test]
    fn accepts_macro_as_not_a_macos_marker() {
        assert!(is_platform_compatible("macro-recorder-x86_64.AppImage"));
    }

    #[test]
    fn rejects_arm_architectures() {
        assert!(!is_platform_compatible("app-aarch64.AppImage"));
        assert!(!is_platform_compatible("app-armhf.AppImage"));
    }

    #[test]
    fn accepts_plain_and_x86_64_appimages() {
        assert!(is_platform_compatible("app.AppImage"));
        assert!(is_platform_compatible("app-x86_64.AppImage"));
        assert!(is_platform_compatible("app-amd64.AppImage"));
    }

    #[test]
    fn recognizes_checksum_manifests() {
        assert!(is_checksum_file("app.AppImage.sha256"));
        assert!(is_checksum_file("SHA256SUMS"));
        assert!(is_checksum_file("latest-linux.yml"));
        assert!(!is_checksum_file("app.AppImage"));
    }
}
