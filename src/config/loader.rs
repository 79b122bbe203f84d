//! Settings file location and serialization.

use crate::config::Settings;
use crate::error::SettingsError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name under the user's config directory
pub const APP_DIR_NAME: &str = "lattest";

/// Get the default settings path: <config_dir>/lattest/settings.json
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        SettingsError::ValidationFailed("Cannot determine config directory".to_string())
    })?;
    Ok(config_dir.join(APP_DIR_NAME).join("settings.json"))
}

/// Load settings from a JSON file. Fails on a missing or malformed file.
pub fn load_settings_from_file(path: &Path) -> Result<Settings, SettingsError> {
    validate_settings_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SettingsError::FileNotFound(format!("Settings file not found at: {}", path.display()))
        } else {
            SettingsError::IoError(e)
        }
    })?;

    let settings: Settings = serde_json::from_str(&content)?;
    Ok(settings)
}

/// Save settings as pretty JSON, creating parent directories.
pub fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    validate_settings_path(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json_content = serde_json::to_string_pretty(settings)?;
    fs::write(path, json_content)?;
    Ok(())
}

/// Validate settings path (.json extension required).
pub fn validate_settings_path(path: &Path) -> Result<(), SettingsError> {
    if path.as_os_str().is_empty() {
        return Err(SettingsError::ValidationFailed(
            "Settings path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "json" => Ok(()),
        Some(ext) => Err(SettingsError::ValidationFailed(format!(
            "Settings file must have .json extension, got .{}",
            ext.to_string_lossy()
        ))),
        None => Err(SettingsError::ValidationFailed(
            "Settings file must have .json extension".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::histogram::EdgePolicy;
    use tempfile::TempDir;

    #[test]
    fn test_default_path_shape() {
        if let Ok(path) = default_settings_path() {
            assert!(path.ends_with("lattest/settings.json"));
        }
    }

    #[test]
    fn test_save_and_load_settings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/settings.json");

        let mut original = Settings::default();
        original.period_ms = 2;
        original.bin_count = 64;
        original.edge_policy = EdgePolicy::Separate;
        original.realtime.fifo_priority = Some(80);

        save_settings_to_file(&original, &path).expect("Failed to save settings");
        assert!(path.exists(), "Settings file should exist after save");

        let loaded = load_settings_from_file(&path).expect("Failed to load settings");
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_settings_from_file(&temp_dir.path().join("absent.json"));
        assert!(matches!(result, Err(SettingsError::FileNotFound(_))));
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_settings_from_file(&path), Err(SettingsError::InvalidJson(_))));
    }

    #[test]
    fn test_validate_settings_path() {
        assert!(validate_settings_path(Path::new("settings.json")).is_ok());
        assert!(validate_settings_path(Path::new("settings.toml")).is_err());
        assert!(validate_settings_path(Path::new("settings")).is_err());
        assert!(validate_settings_path(Path::new("")).is_err());
    }
}
