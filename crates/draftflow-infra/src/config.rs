//! Theme configuration loading.
//!
//! Themes live as TOML files under `<data dir>/themes/`. A missing
//! directory yields the built-in `editorial` theme so a fresh install
//! works without any setup.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use draftflow_types::config::ThemeConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid theme file '{path}': {detail}")]
    Parse { path: String, detail: String },
}

/// Data directory: `DRAFTFLOW_DATA_DIR` or `~/.draftflow`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DRAFTFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".draftflow")
}

/// Load every theme file under `<dir>/themes/`, falling back to the
/// default theme when none exist.
pub fn load_themes(dir: &Path) -> Result<Vec<ThemeConfig>, ConfigError> {
    let themes_dir = dir.join("themes");
    if !themes_dir.is_dir() {
        info!("no themes directory, using built-in 'editorial' theme");
        return Ok(vec![ThemeConfig::named("editorial")]);
    }

    let mut themes = Vec::new();
    for entry in std::fs::read_dir(&themes_dir)? {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "toml") {
            continue;
        }
        let raw = std::fs::read_to_string(&path)?;
        let config: ThemeConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        info!(theme = %config.theme, path = %path.display(), "theme loaded");
        themes.push(config);
    }

    if themes.is_empty() {
        themes.push(ThemeConfig::named("editorial"));
    }
    Ok(themes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let themes = load_themes(dir.path()).unwrap();
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].theme, "editorial");
    }

    #[test]
    fn loads_theme_files() {
        let dir = tempfile::tempdir().unwrap();
        let themes_dir = dir.path().join("themes");
        std::fs::create_dir_all(&themes_dir).unwrap();
        std::fs::write(
            themes_dir.join("tech.toml"),
            "theme = \"tech-brief\"\nmax_revisions = 5\n",
        )
        .unwrap();
        std::fs::write(themes_dir.join("notes.txt"), "ignored").unwrap();

        let themes = load_themes(dir.path()).unwrap();
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].theme, "tech-brief");
        assert_eq!(themes[0].max_revisions, 5);
    }

    #[test]
    fn invalid_theme_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let themes_dir = dir.path().join("themes");
        std::fs::create_dir_all(&themes_dir).unwrap();
        std::fs::write(themes_dir.join("bad.toml"), "max_revisions = \"three\"").unwrap();
        assert!(matches!(
            load_themes(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
