use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};
use crate::uploader::yapi_client::AuthCookies;

/// Remote target configuration: server, credentials and the cached session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub url: String,
    pub account: String,
    pub password: String,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub cookies: Option<String>,
    /// Epoch millis at which the cached cookies stop being valid.
    #[serde(default)]
    pub cookies_ttl: Option<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: String::new(),
            account: String::new(),
            password: String::new(),
            project_id: None,
            cookies: None,
            cookies_ttl: None,
        }
    }
}

fn settings_dir() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::config("Could not find config directory"))?
        .join("yapi-uploader");

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}

pub fn default_settings_path() -> AppResult<PathBuf> {
    Ok(settings_dir()?.join("settings.json"))
}

pub fn load_settings(path: &Path) -> AppResult<Settings> {
    if path.exists() {
        let raw = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("Failed to parse settings file: {}. Using defaults.", e);
            Settings::default()
        });
        Ok(settings)
    } else {
        let settings = Settings::default();
        save_settings(path, &settings)?;
        Ok(settings)
    }
}

/// Write the settings file via a temp file and rename, so a concurrent
/// reader never observes a half-written file. The previous file is kept
/// as a `.bak` copy.
pub fn save_settings(path: &Path, settings: &Settings) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    if path.exists() {
        let backup_path = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup_path) {
            log::warn!("Failed to create settings backup: {}", e);
        }
    }

    let raw = serde_json::to_string_pretty(settings)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, raw)?;
    fs::rename(&temp_path, path)?;

    log::debug!("Settings saved to {}", path.display());
    Ok(())
}

pub fn validate_settings(settings: &Settings) -> AppResult<()> {
    let url = settings.url.trim();
    if url.is_empty() {
        return Err(AppError::validation("url", "Server URL is required"));
    }

    let url_pattern = Regex::new(r"^https?://[^\s]+$").unwrap();
    if !url_pattern.is_match(url) {
        return Err(AppError::validation(
            "url",
            "Server URL must be an http(s) URL",
        ));
    }

    if settings.account.trim().is_empty() {
        return Err(AppError::validation("account", "Account is required"));
    }

    if settings.password.trim().is_empty() {
        return Err(AppError::validation("password", "Password is required"));
    }

    if let Some(project_id) = settings.project_id {
        if project_id <= 0 {
            return Err(AppError::validation(
                "project_id",
                "Project id must be positive",
            ));
        }
    }

    Ok(())
}

/// Destination for refreshed session cookies after a batch.
pub trait SessionStore: Send + Sync {
    fn persist_cookies(&self, cookies: &AuthCookies) -> AppResult<()>;
}

/// Writes cookies back into the settings file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SessionStore for FileSessionStore {
    fn persist_cookies(&self, cookies: &AuthCookies) -> AppResult<()> {
        let mut settings = load_settings(&self.path)?;
        settings.cookies = Some(cookies.cookies.clone());
        settings.cookies_ttl = Some(cookies.ttl);
        save_settings(&self.path, &settings)?;

        log::info!("Session cookies persisted to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_settings() -> Settings {
        Settings {
            url: "https://yapi.example.com".to_string(),
            account: "dev@example.com".to_string(),
            password: "secret".to_string(),
            project_id: Some(42),
            cookies: None,
            cookies_ttl: None,
        }
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");

        let settings = sample_settings();
        save_settings(&path, &settings).expect("save");

        let loaded = load_settings(&path).expect("load");
        assert_eq!(loaded.url, settings.url);
        assert_eq!(loaded.project_id, Some(42));
        assert!(loaded.cookies.is_none());
    }

    #[test]
    fn test_load_missing_file_creates_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");

        let loaded = load_settings(&path).expect("load");
        assert!(loaded.url.is_empty());
        assert!(path.exists(), "default settings file should be written");
    }

    #[test]
    fn test_load_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").expect("write");

        let loaded = load_settings(&path).expect("load");
        assert!(loaded.account.is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");

        save_settings(&path, &sample_settings()).expect("save");
        save_settings(&path, &sample_settings()).expect("save again");

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert!(path.with_extension("json.bak").exists());
    }

    #[test]
    fn test_validate_settings() {
        assert!(validate_settings(&sample_settings()).is_ok());

        let mut settings = sample_settings();
        settings.url = "not-a-url".to_string();
        assert!(matches!(
            validate_settings(&settings),
            Err(AppError::Validation { .. })
        ));

        let mut settings = sample_settings();
        settings.account = "  ".to_string();
        assert!(validate_settings(&settings).is_err());

        let mut settings = sample_settings();
        settings.password = String::new();
        assert!(validate_settings(&settings).is_err());

        let mut settings = sample_settings();
        settings.project_id = Some(0);
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_file_session_store_updates_cookie_fields_only() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");
        save_settings(&path, &sample_settings()).expect("save");

        let store = FileSessionStore::new(path.clone());
        let cookies = AuthCookies {
            cookies: "_yapi_token=abc; _yapi_uid=7".to_string(),
            ttl: 1_700_000_000_000,
        };
        store.persist_cookies(&cookies).expect("persist");

        let loaded = load_settings(&path).expect("load");
        assert_eq!(loaded.cookies.as_deref(), Some("_yapi_token=abc; _yapi_uid=7"));
        assert_eq!(loaded.cookies_ttl, Some(1_700_000_000_000));
        assert_eq!(loaded.url, "https://yapi.example.com");
        assert_eq!(loaded.project_id, Some(42));
    }
}
