//! # my-unicorn
//!
//! Support library for installing and updating AppImage applications from
//! forge releases (GitHub-shaped release APIs). Given a catalog entry or a
//! bare repository URL, this crate resolves the latest compatible release,
//! downloads the matching AppImage asset, verifies it against a digest or
//! checksum file, and installs it with an extracted icon and a desktop
//! launcher entry.
//!
//! ## Core modules
//!
//! - [`forge`]: forge API client and version normalization.
//! - [`cache`]: on-disk TTL cache of releases and checksum files.
//! - [`selector`]: pure asset-selection rules.
//! - [`download`]: streaming HTTP download service.
//! - [`verify`]: digest and checksum-file verification.
//! - [`config`]: global configuration, catalog, and per-app state.
//! - [`process`]: the post-download install pipeline.
//! - [`desktop`]: freedesktop `.desktop` entry writer.
//! - [`progress`]: the progress-reporter protocol and implementations.
//! - [`orchestrator`]: the top-level install/update coordinator.
//!
//! ## CLI module
//!
//! (Cargo feature: `cli` [default])
//!
//! The [`cli`] module wraps the above into commands suitable for a `clap`
//! binary: prompts, progress bars, and colored summaries.

use std::sync::LazyLock;

use directories::ProjectDirs;

pub(crate) use fs_err::tokio as fs;

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod desktop;
pub mod download;
pub mod forge;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod selector;
pub mod verify;

/// Platform-specific application directories (config, cache, data).
pub static DIRS: LazyLock<ProjectDirs> = LazyLock::new(|| {
    ProjectDirs::from("io", "my-unicorn", "my-unicorn").expect("home directory must be available")
});

/// Sanitizes a string for use as a filename component: keeps alphanumerics,
/// `-`, `_`, and `.`; replaces anything else with `-`.
pub(crate) fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
