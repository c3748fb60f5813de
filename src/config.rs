// Upload job configuration.
//
// The config is a JSON document, usually `bundle-deploy.json` next to the
// build, describing which app and environment to publish to and where the
// static files live. The pipeline only ever reads it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::UploadError;

/// Config file looked up in the current directory when none is given.
pub const CONFIG_FILE_NAME: &str = "bundle-deploy.json";

/// Fallback config file in the user's home directory.
pub const HOME_CONFIG_FILE_NAME: &str = ".bundle-deploy.json";

/// Environment variable that overrides `access_token` from the file.
pub const ACCESS_TOKEN_ENV: &str = "BUNDLE_DEPLOY_ACCESS_TOKEN";

/// Archive name used when the bundle is built from `static_path`.
pub const DEFAULT_BUNDLE_NAME: &str = "build.zip";

/// Describes one upload job.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub app_id: String,
    pub environment: String,
    pub api_version: String,
    pub access_token: String,
    /// Base URL of the API, including the trailing `/` (method names are
    /// appended verbatim).
    pub api_host: String,
    pub static_path: PathBuf,
    /// Endpoint name to file path relative to `static_path`.
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    /// Pre-built archive to upload instead of packing `static_path`.
    #[serde(default, alias = "bundleFile")]
    pub bundle_file: Option<PathBuf>,
    #[serde(default = "default_bundle_name")]
    pub bundle_name: String,
    /// Directory used to resolve `bundle_file` and the output archive.
    /// Defaults to the process working directory.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_bundle_name() -> String {
    DEFAULT_BUNDLE_NAME.to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    30
}

impl UploadConfig {
    /// Parse a JSON config file and apply the environment override for the
    /// access token.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: UploadConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.is_empty() {
                config.access_token = token;
            }
        }
        Ok(config)
    }

    /// Pick the config file to load: the explicit path if given, otherwise
    /// `./bundle-deploy.json`, otherwise `~/.bundle-deploy.json`.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        let local = std::env::current_dir()
            .context("Failed to read current directory")?
            .join(CONFIG_FILE_NAME);
        if local.is_file() {
            return Ok(local);
        }
        if let Some(home) = dirs::home_dir() {
            let global = home.join(HOME_CONFIG_FILE_NAME);
            if global.is_file() {
                return Ok(global);
            }
        }
        anyhow::bail!(
            "No config file found: pass --config or create {}",
            CONFIG_FILE_NAME
        )
    }

    /// Reject configs the pipeline cannot possibly run with.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.app_id.trim().is_empty() {
            return Err(UploadError::InvalidConfig("app_id is empty".into()));
        }
        if self.static_path.as_os_str().is_empty() {
            return Err(UploadError::InvalidConfig("static_path is empty".into()));
        }
        if self.bundle_name.trim().is_empty() {
            return Err(UploadError::InvalidConfig("bundle_name is empty".into()));
        }
        let host = self.api_host.trim();
        if host.is_empty() {
            return Err(UploadError::InvalidConfig("api_host is empty".into()));
        }
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(UploadError::InvalidConfig(format!(
                "api_host must be an http(s) URL, got {host}"
            )));
        }
        Ok(())
    }

    /// Directory against which relative bundle paths are resolved.
    pub fn work_dir(&self) -> Result<PathBuf, UploadError> {
        match &self.work_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(|e| UploadError::not_accessible(".", e)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
