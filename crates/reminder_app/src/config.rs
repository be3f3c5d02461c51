use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

pub const DEFAULT_SETTINGS_FILE: &str = ".reminders.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub notes_root: PathBuf,
    /// Defaults to [`DEFAULT_SETTINGS_FILE`] inside the notes root.
    pub settings_path: Option<PathBuf>,
    pub watch: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("REMINDER_NOTES_ROOT") {
            if !root.trim().is_empty() {
                config.notes_root = PathBuf::from(root);
            }
        }
        if let Ok(path) = std::env::var("REMINDER_SETTINGS_PATH") {
            if !path.trim().is_empty() {
                config.settings_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(flag) = std::env::var("REMINDER_WATCH") {
            if let Some(value) = parse_flag(&flag) {
                config.watch = value;
            }
        }
        Ok(config)
    }

    /// Canonicalizes the notes root and settings location, creating the
    /// settings directory if needed.
    pub fn resolve(&self) -> Result<ResolvedPaths> {
        let notes_root = std::fs::canonicalize(&self.notes_root).with_context(|| {
            format!("notes root {} is not accessible", self.notes_root.display())
        })?;
        let settings = match &self.settings_path {
            Some(path) => path.clone(),
            None => notes_root.join(DEFAULT_SETTINGS_FILE),
        };
        let settings = canonical_settings_path(&settings)?;
        info!(
            notes_root = %notes_root.display(),
            settings = %settings.display(),
            "resolved reminder paths"
        );
        Ok(ResolvedPaths {
            notes_root,
            settings,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            notes_root: PathBuf::from("."),
            settings_path: None,
            watch: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub notes_root: PathBuf,
    pub settings: PathBuf,
}

fn canonical_settings_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .with_context(|| format!("settings path {} has no file name", path.display()))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("unable to create {}", parent.display()))?;
    let parent = std::fs::canonicalize(&parent)
        .with_context(|| format!("settings directory {} is not accessible", parent.display()))?;
    Ok(parent.join(file_name))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn settings_default_to_file_inside_notes_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            notes_root: temp.path().to_path_buf(),
            ..AppConfig::default()
        };
        let resolved = config.resolve().expect("resolve");
        let root = std::fs::canonicalize(temp.path()).expect("canonical root");
        assert_eq!(resolved.notes_root, root);
        assert_eq!(resolved.settings, root.join(DEFAULT_SETTINGS_FILE));
    }

    #[test]
    fn explicit_settings_directory_is_created() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            notes_root: temp.path().to_path_buf(),
            settings_path: Some(temp.path().join("state/reminders.json")),
            watch: false,
        };
        let resolved = config.resolve().expect("resolve");
        assert!(temp.path().join("state").is_dir());
        assert!(resolved.settings.ends_with("state/reminders.json"));
    }

    #[test]
    fn missing_notes_root_is_an_error() {
        let config = AppConfig {
            notes_root: PathBuf::from("/definitely/not/here"),
            ..AppConfig::default()
        };
        assert!(config.resolve().is_err());
    }
}
