//! Freedesktop `.desktop` entry writer.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::fs;

#[derive(Debug, Error, Diagnostic)]
pub enum DesktopError {
    #[error(transparent)]
    #[diagnostic(code(my_unicorn::desktop::io))]
    Io(#[from] std::io::Error),
}

/// Everything needed to render a `.desktop` launcher entry.
pub struct DesktopEntrySpec<'a> {
    pub app_name: &'a str,
    pub display_name: &'a str,
    pub appimage_path: &'a Path,
    pub icon_path: Option<&'a Path>,
    pub categories: &'a [String],
    pub version: &'a str,
}

/// Emits a `[Desktop Entry]` file into `desktop_dir`, named
/// `{app_name}.desktop`, with `0644` permissions.
#[instrument(skip(spec))]
pub async fn write_desktop_entry(
    desktop_dir: &Path,
    spec: &DesktopEntrySpec<'_>,
) -> Result<PathBuf, DesktopError> {
    fs::create_dir_all(desktop_dir).await?;

    let icon_value = spec
        .icon_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| spec.app_name.to_string());

    let categories = if spec.categories.is_empty() {
        "Utility;".to_string()
    } else {
        format!("{};", spec.categories.join(";"))
    };

    let contents = format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name={name}\n\
         Exec={exec}\n\
         Icon={icon}\n\
         Categories={categories}\n\
         Terminal=false\n\
         X-AppImage-Version={version}\n",
        name = spec.display_name,
        exec = spec.appimage_path.display(),
        icon = icon_value,
        categories = categories,
        version = spec.version,
    );

    let path = desktop_dir.join(format!("{}.desktop", crate::sanitize_filename(spec.app_name)));
    let tmp = path.with_extension("desktop.tmp");
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, &path).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o644);
        fs::set_permissions(&path, permissions).await?;
    }

    debug!(?path, "desktop entry written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_expected_fields() {
        let dir = tempfile::tempdir().unwrap();
        let appimage = PathBuf::from("/opt/apps/obsidian.AppImage");
        let spec = DesktopEntrySpec {
            app_name: "obsidian",
            display_name: "Obsidian",
            appimage_path: &appimage,
            icon_path: None,
            categories: &["Office".to_string()],
            version: "1.10.6",
        };

        let path = write_desktop_entry(dir.path(), &spec).await.unwrap();
        let contents = std::fs::read_to_string(path).unwrap();

        assert!(contents.contains("Type=Application"));
        assert!(contents.contains("Name=Obsidian"));
        assert!(contents.contains("Exec=/opt/apps/obsidian.AppImage"));
        assert!(contents.contains("Categories=Office;"));
    }
}
