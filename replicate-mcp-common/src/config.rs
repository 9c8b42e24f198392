//! Configuration module for loading environment variables and settings.

use crate::auth::{API_TOKEN_ENV, ApiToken};
use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Default Replicate API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";

/// Default model version (stability-ai/sdxl).
pub const DEFAULT_MODEL_VERSION: &str =
    "c221b2b8ef527988fb59bf24a8b97c4561f1c671f73bd389f866bfb27c061316";

/// Default directory for saved images, relative to the working directory.
pub const DEFAULT_IMAGES_DIR: &str = "generated_images";

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default bound on one full generation, including polling.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 300;

/// Default upper bound on a downloaded image (50 MiB).
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Replicate API token (required)
    pub api_token: ApiToken,
    /// Replicate API base URL
    pub api_base_url: String,
    /// Model version hash used for predictions
    pub model_version: String,
    /// Directory where saved images and their metadata live
    pub images_dir: PathBuf,
    /// Timeout for a single HTTP request
    pub request_timeout_secs: u64,
    /// Timeout for a whole generation
    pub generation_timeout_secs: u64,
    /// Largest image body accepted by save
    pub max_download_bytes: u64,
    /// HTTP server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables and .env file.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingEnvVar` if REPLICATE_API_TOKEN is not set,
    /// or `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_token = get(API_TOKEN_ENV)
            .map(ApiToken::new)
            .ok_or_else(|| ConfigError::missing_env_var(API_TOKEN_ENV))?;

        let api_base_url = get("REPLICATE_API_BASE")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let model_version =
            get("REPLICATE_MODEL_VERSION").unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string());

        let images_dir = get("IMAGES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGES_DIR));

        let request_timeout_secs =
            parse_positive(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let generation_timeout_secs =
            parse_positive(&get, "GENERATION_TIMEOUT_SECS", DEFAULT_GENERATION_TIMEOUT_SECS)?;
        let max_download_bytes =
            parse_positive(&get, "MAX_DOWNLOAD_BYTES", DEFAULT_MAX_DOWNLOAD_BYTES)?;

        let port = match get("PORT") {
            Some(p) => p
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_value("PORT", format!("'{}' is not a port number", p)))?,
            None => 8080,
        };

        Ok(Self {
            api_token,
            api_base_url,
            model_version,
            images_dir,
            request_timeout_secs,
            generation_timeout_secs,
            max_download_bytes,
            port,
        })
    }

    /// Create a configuration with defaults for everything but the token.
    pub fn with_token(api_token: ApiToken) -> Self {
        Self {
            api_token,
            api_base_url: DEFAULT_API_BASE.to_string(),
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            images_dir: PathBuf::from(DEFAULT_IMAGES_DIR),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            generation_timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            port: 8080,
        }
    }

    /// Get the Replicate endpoint URL for a given API path.
    pub fn replicate_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }

    /// Per-request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whole-generation timeout as a `Duration`.
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

fn parse_positive<G>(get: &G, key: &str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(ConfigError::invalid_value(key, "must be greater than zero")),
            Ok(v) => Ok(v),
            Err(_) => Err(ConfigError::invalid_value(
                key,
                format!("'{}' is not a positive integer", raw),
            )),
        },
    }
}
