/// `load_config` module: resolves the run configuration from the environment and an optional YAML file.
///
/// Secrets (client id, username, password) only ever come from the environment.
/// Non-secret settings may come from a YAML file passed with `--config`; an
/// environment variable, when set, overrides the corresponding file value.
///
/// # Environment
/// - `ESEIS_SCRAPPER_OUT_DIR`: output directory (required unless the file sets `output_dir`)
/// - `ESEIS_CLIENT_ID`, `ESEIS_USERNAME`, `ESEIS_PASSWORD`: required
/// - `ESEIS_BASE_URL`, `ESEIS_BASE_WEB_URL`: optional, with production defaults
///
/// # Errors
/// All errors use `anyhow::Error` and name the missing variable or the
/// offending file, so the CLI can print them as-is.
use anyhow::{anyhow, Result};
use eseis_sync_core::browser::ChromeOptions;
use eseis_sync_core::config::{
    ApiConfig, Credentials, SyncConfig, DEFAULT_BASE_URL, DEFAULT_SERGIC_OFFER,
    DEFAULT_WEB_BASE_URL,
};
use eseis_sync_core::error::ErrorPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const OUT_DIR_VAR: &str = "ESEIS_SCRAPPER_OUT_DIR";
pub const CLIENT_ID_VAR: &str = "ESEIS_CLIENT_ID";
pub const USERNAME_VAR: &str = "ESEIS_USERNAME";
pub const PASSWORD_VAR: &str = "ESEIS_PASSWORD";
pub const BASE_URL_VAR: &str = "ESEIS_BASE_URL";
pub const BASE_WEB_URL_VAR: &str = "ESEIS_BASE_WEB_URL";

/// Non-secret settings accepted in the YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    pub base_url: Option<String>,
    pub web_base_url: Option<String>,
    pub sergic_offer: Option<String>,
    pub on_item_error: Option<ErrorPolicy>,
    pub snapshots: Option<bool>,
    pub headless: Option<bool>,
    pub readiness_timeout_secs: Option<u64>,
}

/// Everything the `sync` command needs.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub sync: SyncConfig,
    pub chrome: ChromeOptions,
}

pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let file = match path {
        Some(path) => read_file_config(path)?,
        None => {
            info!("No config file given, using environment only");
            FileConfig::default()
        }
    };

    let output_dir = optional_env(OUT_DIR_VAR)
        .map(PathBuf::from)
        .or(file.output_dir)
        .ok_or_else(|| {
            error!(var = OUT_DIR_VAR, "Output directory not configured");
            anyhow!("{OUT_DIR_VAR} must be set (or output_dir given in the config file)")
        })?;

    let api = ApiConfig {
        client_id: required_env(CLIENT_ID_VAR)?,
        base_url: optional_env(BASE_URL_VAR)
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        web_base_url: optional_env(BASE_WEB_URL_VAR)
            .or(file.web_base_url)
            .unwrap_or_else(|| DEFAULT_WEB_BASE_URL.to_string()),
    };
    let credentials = Credentials {
        username: required_env(USERNAME_VAR)?,
        password: required_env(PASSWORD_VAR)?,
    };

    let mut chrome = ChromeOptions::default();
    if let Some(headless) = file.headless {
        chrome.headless = headless;
    }
    chrome.readiness_timeout = file.readiness_timeout_secs.map(Duration::from_secs);

    let sync = SyncConfig {
        output_dir,
        api,
        credentials,
        sergic_offer: file
            .sergic_offer
            .unwrap_or_else(|| DEFAULT_SERGIC_OFFER.to_string()),
        on_item_error: file.on_item_error.unwrap_or_default(),
        snapshots: file.snapshots.unwrap_or(true),
    };
    Ok(CliConfig { sync, chrome })
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path, e));
        }
    };
    match serde_yaml::from_str::<Option<FileConfig>>(&content) {
        Ok(parsed) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            Ok(parsed.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
            Err(anyhow!("Failed to parse config YAML {:?}: {e}", path))
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            info!(var = name, "Using value from environment");
            Some(value)
        }
        _ => None,
    }
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            info!(var = name, "Found required environment variable");
            Ok(value)
        }
        _ => {
            error!(var = name, "Missing required environment variable");
            Err(anyhow!("Missing required environment variable {name}"))
        }
    }
}
