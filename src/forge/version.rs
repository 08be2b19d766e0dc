//! PEP-440-style version normalization and comparison.
//!
//! Forge tags look like `v1.10.6`, `1.10.6-alpha`, or `1.10.6-rc.2`. This
//! module strips the leading `v` and rewrites the prerelease suffix into a
//! canonical short form (`-alpha` → `a0`, `-beta.3` → `b3`, `-rc.2` → `rc2`)
//! so that normalized strings compare correctly in release order.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

static PRERELEASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<base>[0-9][0-9.]*)-?(?P<kind>alpha|beta|rc)\.?(?P<num>[0-9]+)?$")
        .expect("prerelease pattern is valid")
});

/// Strips a leading `v`/`V` and rewrites prerelease suffixes into the
/// canonical `a0`/`b3`/`rc2` form. Idempotent: re-normalizing an already
/// normalized string is a no-op.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);

    if let Some(caps) = PRERELEASE_RE.captures(stripped) {
        let base = &caps["base"];
        let kind = caps["kind"].to_ascii_lowercase();
        let kind = match kind.as_str() {
            "alpha" => "a",
            "beta" => "b",
            "rc" => "rc",
            other => other,
        };
        let num = caps.name("num").map(|m| m.as_str()).unwrap_or("0");
        return format!("{base}{kind}{num}");
    }

    stripped.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParsedVersion<'a> {
    release: &'a str,
    prerelease_kind: Option<&'a str>,
    prerelease_num: u64,
}

fn parse(normalized: &str) -> ParsedVersion<'_> {
    for (idx, ch) in normalized.char_indices() {
        if ch == 'a' || ch == 'b' || (ch == 'r' && normalized[idx..].starts_with("rc")) {
            let (release, rest) = normalized.split_at(idx);
            let (kind, num_str) = if let Some(stripped) = rest.strip_prefix("rc") {
                ("rc", stripped)
            } else {
                (&rest[..1], &rest[1..])
            };
            if let Ok(num) = num_str.parse::<u64>() {
                return ParsedVersion {
                    release,
                    prerelease_kind: Some(kind),
                    prerelease_num: num,
                };
            }
        }
    }

    ParsedVersion {
        release: normalized,
        prerelease_kind: None,
        prerelease_num: 0,
    }
}

fn release_segments(release: &str) -> Vec<u64> {
    release
        .split('.')
        .map(|segment| segment.parse::<u64>().unwrap_or(0))
        .collect()
}

fn prerelease_rank(kind: Option<&str>) -> u8 {
    match kind {
        None => 2,
        Some("rc") => 1,
        Some("b") => 0,
        // "a" and anything unrecognized sort before "b"/"rc".
        _ => -1i8 as u8,
    }
}

/// Orders two normalized version strings. A release with no prerelease
/// suffix is always greater than one with a suffix and the same release
/// segment (`1.0.0` > `1.0.0rc2` > `1.0.0b1` > `1.0.0a0`).
pub fn compare(a: &str, b: &str) -> Ordering {
    let pa = parse(a);
    let pb = parse(b);

    let segs_a = release_segments(pa.release);
    let segs_b = release_segments(pb.release);

    match segs_a.cmp(&segs_b) {
        Ordering::Equal => {}
        other => return other,
    }

    match prerelease_rank(pa.prerelease_kind).cmp(&prerelease_rank(pb.prerelease_kind)) {
        Ordering::Equal => pa.prerelease_num.cmp(&pb.prerelease_num),
        other => other,
    }
}

/// True iff `current`'s normalized form is strictly less than `latest`'s.
pub fn has_update(current: &str, latest: &str) -> bool {
    compare(&normalize(current), &normalize(latest)) == Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_v_prefix() {
        assert_eq!(normalize("v1.0.0"), "1.0.0");
        assert_eq!(normalize("1.0.0"), "1.0.0");
    }

    #[test]
    fn normalize_canonicalizes_prerelease_suffix() {
        assert_eq!(normalize("1.0.0-alpha"), "1.0.0a0");
        assert_eq!(normalize("1.0.0-beta.3"), "1.0.0b3");
        assert_eq!(normalize("1.0.0-rc.2"), "1.0.0rc2");
        assert_eq!(normalize("2.0.0-beta1"), "2.0.0b1");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["v1.0.0", "1.0.0-alpha", "1.0.0-rc.2", "2.0.0-beta1"] {
            let once = normalize(raw);
            let twice = normalize(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn ordering_matches_sample_set() {
        let sample = [
            "v1.0.0",
            "1.0.0",
            "v1.0.0-alpha",
            "1.0.0a0",
            "1.0.0-rc.2",
            "1.0.0rc2",
            "2.0.0-beta1",
            "2.0.0b1",
        ];
        let normalized: Vec<String> = sample.iter().map(|s| normalize(s)).collect();

        assert_eq!(normalized[0], normalized[1]);
        assert_eq!(normalized[2], normalized[3]);
        assert_eq!(normalized[4], normalized[5]);
        assert_eq!(normalized[6], normalized[7]);

        assert_eq!(compare(&normalized[3], &normalized[0]), Ordering::Less);
        assert_eq!(compare(&normalized[3], &normalized[4]), Ordering::Less);
        assert_eq!(compare(&normalized[4], &normalized[0]), Ordering::Less);
        assert_eq!(compare(&normalized[0], &normalized[6]), Ordering::Less);
    }

    #[test]
    fn has_update_detects_newer_release() {
        assert!(has_update("1.10.5", "1.10.6"));
        assert!(!has_update("1.10.6", "1.10.5"));
        assert!(!has_update("1.10.6", "1.10.6"));
    }
}
