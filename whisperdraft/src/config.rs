//! Server configuration.
//!
//! Read from the process environment after an optional `.env` file. Default
//! settings come from a TOML file (`WHISPERDRAFT_SETTINGS_FILE`), falling back
//! to the built-in example.

use serde::Deserialize;
use shared_types::{Settings, SettingsPatch};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::completion::DEFAULT_BASE_URL;
use crate::settings::{apply_patch, SettingsError};

const BUILTIN_SETTINGS_TOML: &str = include_str!("../config/whisperdraft.example.toml");

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_PATH: &str = "data/whisperdraft.db";
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bind address {value:?}: {reason}")]
    InvalidBind { value: String, reason: String },
    #[error("invalid value for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("failed to read settings file {path}: {reason}")]
    SettingsFile { path: String, reason: String },
    #[error("settings file {path} rejected: {source}")]
    InvalidSettings {
        path: String,
        #[source]
        source: SettingsError,
    },
}

/// Default settings as written in TOML (snake_case keys).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub auto_save_interval_ms: Option<u64>,
    pub max_diff_queue: Option<usize>,
    pub system_prompt: Option<String>,
    pub ai_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl SettingsFile {
    /// Merge over `settings` with the same validation as a runtime update.
    pub fn apply(self, settings: Settings) -> Result<Settings, SettingsError> {
        apply_patch(settings, self.into())
    }
}

impl From<SettingsFile> for SettingsPatch {
    fn from(file: SettingsFile) -> Self {
        SettingsPatch {
            auto_save_interval_ms: file.auto_save_interval_ms,
            max_diff_queue: file.max_diff_queue,
            system_prompt: file.system_prompt,
            openai_api_key: None,
            ai_model: file.ai_model,
            max_tokens: file.max_tokens,
            temperature: file.temperature,
        }
    }
}

pub fn built_in_settings() -> Settings {
    let parsed = toml::from_str::<SettingsFile>(BUILTIN_SETTINGS_TOML)
        .map_err(|e| e.to_string())
        .and_then(|file| file.apply(Settings::default()).map_err(|e| e.to_string()));
    match parsed {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(error = %err, "Failed to load built-in settings");
            Settings::default()
        }
    }
}

pub fn load_settings_file(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SettingsFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let file: SettingsFile = toml::from_str(&content).map_err(|e| ConfigError::SettingsFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    file.apply(Settings::default())
        .map_err(|source| ConfigError::InvalidSettings {
            path: path.display().to_string(),
            source,
        })
}

#[derive(Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// SQLite path, or `:memory:`.
    pub db_path: String,
    /// Key held by the server for callers without their own.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub http_timeout: Duration,
    pub storage_quota_bytes: Option<usize>,
    pub mock_ai: bool,
    pub autosave: bool,
    pub allowed_origins: Vec<String>,
    /// Defaults for settings the user has not changed.
    pub settings: Settings,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("db_path", &self.db_path)
            .field("has_openai_api_key", &self.openai_api_key.is_some())
            .field("openai_base_url", &self.openai_base_url)
            .field("http_timeout", &self.http_timeout)
            .field("storage_quota_bytes", &self.storage_quota_bytes)
            .field("mock_ai", &self.mock_ai)
            .field("autosave", &self.autosave)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

fn flag(value: Option<String>, default: bool) -> bool {
    value
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            v != "0" && v != "false" && v != "no" && v != "off"
        })
        .unwrap_or(default)
}

fn number<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let bind_raw = get("WHISPERDRAFT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidBind {
                value: bind_raw.clone(),
                reason: e.to_string(),
            })?;

        let settings = match get("WHISPERDRAFT_SETTINGS_FILE") {
            Some(path) => load_settings_file(Path::new(path.trim()))?,
            None => built_in_settings(),
        };

        let allowed_origins = get("WHISPERDRAFT_ALLOWED_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                DEFAULT_ALLOWED_ORIGINS
                    .iter()
                    .map(|origin| origin.to_string())
                    .collect()
            });

        Ok(Self {
            bind,
            db_path: get("WHISPERDRAFT_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            openai_api_key: get("OPENAI_API_KEY").map(|key| key.trim().to_string()),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http_timeout: Duration::from_millis(
                number("WHISPERDRAFT_HTTP_TIMEOUT_MS", get("WHISPERDRAFT_HTTP_TIMEOUT_MS"))?
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
            ),
            storage_quota_bytes: number(
                "WHISPERDRAFT_STORAGE_QUOTA_BYTES",
                get("WHISPERDRAFT_STORAGE_QUOTA_BYTES"),
            )?,
            mock_ai: flag(get("WHISPERDRAFT_MOCK_AI"), false),
            autosave: flag(get("WHISPERDRAFT_AUTOSAVE"), true),
            allowed_origins,
            settings,
        })
    }
}

/// Load `.env` from the working directory or the nearest ancestor holding
/// one.
pub fn load_env_file() -> Option<PathBuf> {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return None;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.is_file() {
            match dotenvy::from_path(&candidate) {
                Ok(()) => {
                    tracing::info!(path = %candidate.display(), "Loaded environment from .env");
                    return Some(candidate);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Failed to load .env file"
                    );
                    return None;
                }
            }
        }

        if !current.pop() {
            break;
        }
    }

    tracing::info!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
    None
}
