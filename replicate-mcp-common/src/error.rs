//! Error types for the common library.
//!
//! This module provides a unified error hierarchy using `thiserror` so the
//! inference client, the image store, and the MCP adapter report failures the
//! same way.
//!
//! # Error Categories
//!
//! - `ConfigError`: Missing or invalid configuration (fatal at startup)
//! - `InferenceError`: The Replicate prediction could not be completed
//! - `Error::Fetch`: Downloading a generated image failed
//! - `Error::Storage`: The local image directory could not be written or read
//! - `Error::NotFound`: The requested image identifier does not exist
//! - `Error::Validation`: Malformed input
//! - `Error::Timeout`: A remote call exceeded its time bound

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Unified error type for the common library.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (missing env vars, invalid values)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote image generation failed
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Downloading image bytes failed
    ///
    /// `status_code` is `None` when no HTTP response was received.
    #[error("Failed to fetch {url}{}: {message}", .status_code.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Fetch {
        /// The URL being downloaded
        url: String,
        /// HTTP status code, if a response was received
        status_code: Option<u16>,
        /// Description of the failure
        message: String,
    },

    /// Local persistence failed
    #[error("Storage error at {path}: {message}")]
    Storage {
        /// The file or directory involved
        path: String,
        /// Description of the failure
        message: String,
    },

    /// No image with the requested identifier exists
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation timeout errors
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
}

impl Error {
    /// Create a new fetch error.
    ///
    /// # Example
    ///
    /// ```
    /// use replicate_mcp_common::error::Error;
    ///
    /// let err = Error::fetch("https://example.test/img.png", Some(404), "Not Found");
    /// assert!(err.to_string().contains("example.test"));
    /// assert!(err.to_string().contains("404"));
    /// ```
    pub fn fetch(url: impl Into<String>, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Error::Fetch {
            url: url.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Create a new storage error for the given path.
    ///
    /// # Example
    ///
    /// ```
    /// use replicate_mcp_common::error::Error;
    ///
    /// let err = Error::storage("generated_images/abc.png", "No space left on device");
    /// assert!(err.to_string().contains("abc.png"));
    /// ```
    pub fn storage(path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        Error::Storage {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a new not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Error::NotFound(id.into())
    }

    /// Create a new validation error.
    ///
    /// # Example
    ///
    /// ```
    /// use replicate_mcp_common::error::Error;
    ///
    /// let err = Error::validation("prompt cannot be empty");
    /// assert!(err.to_string().contains("prompt cannot be empty"));
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Create a new timeout error.
    pub fn timeout(seconds: u64) -> Self {
        Error::Timeout(seconds)
    }

    /// The category this error is reported under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Inference(_) => ErrorKind::Inference,
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::Storage { .. } => ErrorKind::Storage,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

/// Stable, machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Inference,
    Fetch,
    Storage,
    NotFound,
    Validation,
    Timeout,
}

impl ErrorKind {
    /// Snake-case name sent to MCP hosts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config_error",
            ErrorKind::Inference => "inference_error",
            ErrorKind::Fetch => "fetch_error",
            ErrorKind::Storage => "storage_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Timeout => "timeout_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration errors.
///
/// These occur while loading configuration from environment variables and
/// are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Required environment variable {0} is not set")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl ConfigError {
    /// Create a new missing environment variable error.
    pub fn missing_env_var(name: impl Into<String>) -> Self {
        ConfigError::MissingEnvVar(name.into())
    }

    /// Create a new invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue(name.into(), reason.into())
    }
}

/// Failures reported by the inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The API token was rejected
    #[error("Replicate rejected the API token (HTTP {status_code}): {message}")]
    Unauthorized {
        /// 401 or 403
        status_code: u16,
        /// Response body
        message: String,
    },

    /// Too many requests
    #[error("Replicate rate limit exceeded{}", .retry_after_secs.map(|s| format!(", retry after {} seconds", s)).unwrap_or_default())]
    RateLimited {
        /// Value of the `Retry-After` header, when present
        retry_after_secs: Option<u64>,
    },

    /// Any other unsuccessful API response
    #[error("API error for {endpoint} (HTTP {status_code}): {message}")]
    Api {
        /// The API endpoint that was called
        endpoint: String,
        /// HTTP status code, 0 if the request never got a response
        status_code: u16,
        /// Error message from the API or describing the failure
        message: String,
    },

    /// The prediction reached a failed or canceled state
    #[error("Prediction {prediction_id} {status}: {message}")]
    PredictionFailed {
        /// Replicate prediction id
        prediction_id: String,
        /// Terminal status (`failed` or `canceled`)
        status: String,
        /// Error reported by the model
        message: String,
    },

    /// The prediction succeeded but produced no image URL
    #[error("Prediction {0} succeeded without an output image")]
    EmptyOutput(String),
}

impl InferenceError {
    /// Create a new API error with endpoint, status code, and message.
    ///
    /// # Example
    ///
    /// ```
    /// use replicate_mcp_common::error::InferenceError;
    ///
    /// let err = InferenceError::api(
    ///     "https://api.replicate.com/v1/predictions",
    ///     500,
    ///     "Internal server error"
    /// );
    /// assert!(err.to_string().contains("api.replicate.com"));
    /// assert!(err.to_string().contains("500"));
    /// ```
    pub fn api(endpoint: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        InferenceError::Api {
            endpoint: endpoint.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Map an unsuccessful HTTP status to the matching inference error.
    pub fn from_status(
        endpoint: impl Into<String>,
        status_code: u16,
        retry_after_secs: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        match status_code {
            401 | 403 => InferenceError::Unauthorized {
                status_code,
                message: message.into(),
            },
            429 => InferenceError::RateLimited { retry_after_secs },
            _ => InferenceError::api(endpoint, status_code, message),
        }
    }
}

/// Result type alias using the unified Error type.
pub type Result<T> = std::result::Result<T, Error>;
