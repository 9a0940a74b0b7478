use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::DEFAULT_BASE_URL;
use crate::error::AppError;

pub const SERVICE_NAME: &str = "cursor-pulse";
pub const SESSION_ENV_VAR: &str = "CURSOR_SESSION_TOKEN";
const SESSION_KEY_NAME: &str = "dashboard-session";
const DEFAULT_BAR_WINDOW_DAYS: u32 = 14;

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("CURSOR_PULSE_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "cursorpulse", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".cursor-pulse"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub bar_window_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            bar_window_days: DEFAULT_BAR_WINDOW_DAYS,
        }
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("data"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn db_path() -> Result<PathBuf, AppError> {
    Ok(data_dir()?.join("cache.sqlite"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(data_dir()?)?;
    Ok(())
}

fn normalize_config(config: &mut AppConfig) -> bool {
    let mut changed = false;

    if config.bar_window_days == 0 {
        config.bar_window_days = DEFAULT_BAR_WINDOW_DAYS;
        changed = true;
    }

    let trimmed = config.base_url.trim();
    if trimmed.is_empty() {
        config.base_url = DEFAULT_BASE_URL.to_string();
        changed = true;
    } else if trimmed != config.base_url {
        config.base_url = trimmed.to_string();
        changed = true;
    }

    changed
}

pub fn load_config() -> Result<AppConfig, AppError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(&path)?;
    let mut parsed: AppConfig = toml::from_str(&raw)?;
    if normalize_config(&mut parsed) {
        save_config(&parsed)?;
    }

    Ok(parsed)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn set_session_cookie(value: &str) -> Result<(), AppError> {
    let entry = keyring::Entry::new(SERVICE_NAME, SESSION_KEY_NAME)?;
    entry.set_password(value)?;
    Ok(())
}

pub fn clear_session_cookie() -> Result<(), AppError> {
    let entry = keyring::Entry::new(SERVICE_NAME, SESSION_KEY_NAME)?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(AppError::Keyring(e)),
    }
}

// The dashboard rides on the browser session; here the cookie comes from the
// keyring or the environment, and its absence surfaces later as a 401 on the
// fetch channels rather than an upfront error.
pub fn get_session_cookie() -> Option<String> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, SESSION_KEY_NAME) {
        if let Ok(value) = entry.get_password() {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }

    match std::env::var(SESSION_ENV_VAR) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}
