//! Checksum-file parsing: traditional, BSD, and YAML manifest shapes.
//!
//! The traditional and BSD patterns are translated directly from the
//! reference implementation's detection/extraction regexes.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use serde::Deserialize;

/// Which hash algorithm a checksum entry uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha1,
    Md5,
    Sha256,
    Sha512,
}

impl Algorithm {
    pub fn hex_len(self) -> usize {
        match self {
            Algorithm::Sha1 => 40,
            Algorithm::Md5 => 32,
            Algorithm::Sha256 => 64,
            Algorithm::Sha512 => 128,
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "SHA256" => Some(Algorithm::Sha256),
            "SHA512" => Some(Algorithm::Sha512),
            "SHA1" => Some(Algorithm::Sha1),
            "MD5" => Some(Algorithm::Md5),
            _ => None,
        }
    }

    /// The BSD-format keyword this algorithm is announced under.
    pub fn keyword(self) -> &'static str {
        match self {
            Algorithm::Sha1 => "SHA1",
            Algorithm::Md5 => "MD5",
            Algorithm::Sha256 => "SHA256",
            Algorithm::Sha512 => "SHA512",
        }
    }

    /// Algorithm-from-filename heuristic, used only when the checksum
    /// file itself does not declare one.
    pub fn from_filename_hint(filename: &str) -> Algorithm {
        let lower = filename.to_ascii_lowercase();
        if lower.contains("sha512") {
            Algorithm::Sha512
        } else if lower.contains("sha256") {
            Algorithm::Sha256
        } else if lower.ends_with(".sha1") || lower.contains(".sha1.") {
            Algorithm::Sha1
        } else if lower.ends_with(".md5") || lower.contains(".md5.") {
            Algorithm::Md5
        } else {
            Algorithm::Sha256
        }
    }
}

fn hex_pattern(len: usize) -> String {
    format!("[a-fA-F0-9]{{{len}}}")
}

/// Extracts the checksum for `filename` from traditional-format content:
/// `<hex>  [*]<filename>`, tolerating a leading asterisk (binary-mode
/// marker), comments (`#`), and blank lines.
pub fn extract_from_standard_format(content: &str, filename: &str, algorithm: Algorithm) -> Option<String> {
    let pattern = format!(
        r"(?m)^({})\s+\*?{}\s*$",
        hex_pattern(algorithm.hex_len()),
        regex::escape(filename)
    );
    let re = Regex::new(&pattern).ok()?;

    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#') && !line.trim().is_empty())
        .find_map(|line| {
            re.captures(line)
                .map(|caps| caps[1].to_ascii_lowercase())
        })
}

/// Extracts the checksum for `filename` from BSD-format content:
/// `ALGO (filename) = hex`.
pub fn extract_from_bsd_format(content: &str, filename: &str, algorithm: Algorithm) -> Option<String> {
    let pattern = format!(
        r"(?i){}\s*\({}\)\s*=\s*({})",
        algorithm.keyword(),
        regex::escape(filename),
        hex_pattern(algorithm.hex_len())
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(content)
        .map(|caps| caps[1].to_ascii_lowercase())
}

static BARE_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]+$").expect("pattern valid"));

/// Extracts a checksum for `filename` from `content`, trying the
/// traditional format, then BSD format, then falling back to treating the
/// whole (trimmed) content as a bare hash if its length matches.
pub fn extract_checksum(content: &str, filename: &str, algorithm: Algorithm) -> Option<String> {
    if let Some(hash) = extract_from_standard_format(content, filename, algorithm) {
        return Some(hash);
    }
    if let Some(hash) = extract_from_bsd_format(content, filename, algorithm) {
        return Some(hash);
    }

    let trimmed = content.trim();
    if trimmed.len() == algorithm.hex_len() && BARE_HASH_RE.is_match(trimmed) {
        return Some(trimmed.to_ascii_lowercase());
    }

    None
}

#[derive(Debug, Deserialize)]
struct YamlSingleFile {
    path: String,
    sha512: Option<String>,
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YamlFileEntry {
    url: String,
    sha512: Option<String>,
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YamlFilesManifest {
    files: Vec<YamlFileEntry>,
}

/// One entry parsed out of a YAML checksum manifest (electron-builder
/// style `latest-linux.yml`): filename, algorithm, and hex digest.
pub struct YamlEntry {
    pub filename: String,
    pub algorithm: Algorithm,
    pub hex_digest: String,
}

fn base64_to_hex(value: &str) -> Option<String> {
    let bytes = BASE64.decode(value.trim()).ok()?;
    Some(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

/// Parses a YAML checksum manifest in either the single-file shape
/// (`path` + `sha256`/`sha512`) or the `files:` array shape (`url` +
/// `sha256`/`sha512` per entry). SHA-512 is preferred when both keys are
/// present. Entries with malformed base64 are skipped.
pub fn parse_yaml_manifest(content: &str) -> Vec<YamlEntry> {
    if let Ok(single) = serde_yaml::from_str::<YamlSingleFile>(content) {
        let (algorithm, raw) = pick_digest(single.sha512.as_deref(), single.sha256.as_deref());
        if let Some((algorithm, raw)) = algorithm.zip(raw) {
            if let Some(hex_digest) = base64_to_hex(raw) {
                return vec![YamlEntry {
                    filename: single.path,
                    algorithm,
                    hex_digest,
                }];
            }
        }
        return vec![];
    }

    if let Ok(manifest) = serde_yaml::from_str::<YamlFilesManifest>(content) {
        return manifest
            .files
            .into_iter()
            .filter_map(|entry| {
                let (algorithm, raw) = pick_digest(entry.sha512.as_deref(), entry.sha256.as_deref());
                let (algorithm, raw) = algorithm.zip(raw)?;
                let hex_digest = base64_to_hex(raw)?;
                let filename = entry.url.rsplit('/').next().unwrap_or(&entry.url).to_string();
                Some(YamlEntry {
                    filename,
                    algorithm,
                    hex_digest,
                })
            })
            .collect();
    }

    vec![]
}

fn pick_digest<'a>(sha512: Option<&'a str>, sha256: Option<&'a str>) -> (Option<Algorithm>, Option<&'a str>) {
    if let Some(v) = sha512 {
        (Some(Algorithm::Sha512), Some(v))
    } else if let Some(v) = sha256 {
        (Some(Algorithm::Sha256), Some(v))
    } else {
        (None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_standard_format_with_asterisk() {
        let content = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef *app.AppImage\n";
        let hash = extract_from_standard_format(content, "app.AppImage", Algorithm::Sha256);
        assert_eq!(
            hash.as_deref(),
            Some("deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef")
        );
    }

    #[test]
    fn extracts_from_bsd_format() {
        let content = "SHA256 (app.AppImage) = deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
        let hash = extract_from_bsd_format(content, "app.AppImage", Algorithm::Sha256);
        assert!(hash.is_some());
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let content = "# comment\n\nabc123\n";
        let hash = extract_from_standard_format(content, "app.AppImage", Algorithm::Sha256);
        assert!(hash.is_none());
    }

    #[test]
    fn algorithm_from_filename_hint() {
        assert_eq!(Algorithm::from_filename_hint("app.sha512"), Algorithm::Sha512);
        assert_eq!(Algorithm::from_filename_hint("app.sha256"), Algorithm::Sha256);
        assert_eq!(Algorithm::from_filename_hint("latest-linux.yml"), Algorithm::Sha256);
    }

    #[test]
    fn parses_yaml_single_file_manifest() {
        let content = "path: app.AppImage\nsha512: ZGVhZGJlZWY=\n";
        let entries = parse_yaml_manifest(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "app.AppImage");
        assert_eq!(entries[0].algorithm, Algorithm::Sha512);
    }

    #[test]
    fn parses_yaml_files_array_manifest() {
        let content = "files:\n  - url: https://example.com/app.AppImage\n    sha256: ZGVhZGJlZWY=\n";
        let entries = parse_yaml_manifest(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "app.AppImage");
        assert_eq!(entries[0].algorithm, Algorithm::Sha256);
    }
}
