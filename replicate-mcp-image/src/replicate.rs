//! Replicate predictions client.
//!
//! Image generation is delegated to a Replicate-hosted Stable Diffusion XL
//! model. A prediction is created with `Prefer: wait` so short jobs finish in
//! one round trip; anything still running afterwards is polled with capped
//! exponential backoff until it reaches a terminal state. The whole call is
//! bounded by the configured generation timeout.

use async_trait::async_trait;
use replicate_mcp_common::config::Config;
use replicate_mcp_common::error::{Error, InferenceError};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Model served by the default version hash.
pub const DEFAULT_MODEL: &str = "stability-ai/sdxl";

/// Polling configuration for predictions that outlive the synchronous wait.
pub const POLL_INITIAL_DELAY_MS: u64 = 1000;
pub const POLL_MAX_DELAY_MS: u64 = 5000;
pub const POLL_BACKOFF_MULTIPLIER: f64 = 1.5;

/// Upper bound for the `Prefer: wait` header accepted by Replicate.
pub const MAX_SYNC_WAIT_SECS: u64 = 60;

/// Model input for one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
}

/// A finished generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Temporary URL of the generated image
    pub url: String,
    /// Replicate prediction id
    pub prediction_id: String,
}

/// Remote image generation.
///
/// One call, one outcome: implementations must not retry.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, Error>;
}

/// [`InferenceClient`] backed by the Replicate HTTP API.
pub struct ReplicateClient {
    config: Config,
    http: reqwest::Client,
    poll_initial_delay: Duration,
    poll_max_delay: Duration,
}

impl ReplicateClient {
    /// Create a client sharing the given HTTP connection pool.
    pub fn new(config: Config, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            poll_initial_delay: Duration::from_millis(POLL_INITIAL_DELAY_MS),
            poll_max_delay: Duration::from_millis(POLL_MAX_DELAY_MS),
        }
    }

    /// Override the polling schedule.
    pub fn with_poll_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_initial_delay = initial;
        self.poll_max_delay = max.max(initial);
        self
    }

    /// Endpoint used to create predictions.
    pub fn predictions_endpoint(&self) -> String {
        self.config.replicate_endpoint("predictions")
    }

    /// Seconds requested in the `Prefer: wait` header.
    ///
    /// Kept below the request timeout so the server answers before the
    /// client gives up on the connection.
    fn sync_wait_secs(&self) -> u64 {
        self.config
            .request_timeout_secs
            .saturating_sub(1)
            .clamp(1, MAX_SYNC_WAIT_SECS)
    }

    #[instrument(level = "info", name = "replicate_generate", skip(self, request), fields(width = request.width, height = request.height))]
    async fn run_prediction(&self, request: &GenerationRequest) -> Result<GeneratedImage, Error> {
        let mut prediction = self.create_prediction(request).await?;
        info!(prediction_id = %prediction.id, status = ?prediction.status, "Prediction created");

        let mut delay = self.poll_initial_delay;
        let mut attempts: u32 = 0;

        while !prediction.status.is_terminal() {
            tokio::time::sleep(delay).await;
            attempts += 1;

            let poll_url = prediction.poll_url(&self.config);
            debug!(url = %poll_url, attempt = attempts, "Polling prediction");
            prediction = self.get_prediction(&poll_url).await?;

            delay = delay.mul_f64(POLL_BACKOFF_MULTIPLIER).min(self.poll_max_delay);
            debug!(
                prediction_id = %prediction.id,
                status = ?prediction.status,
                next_delay_ms = delay.as_millis() as u64,
                "Prediction still in progress"
            );
        }

        let image = prediction.into_generated_image()?;
        info!(prediction_id = %image.prediction_id, attempts, "Prediction succeeded");
        Ok(image)
    }

    async fn create_prediction(&self, request: &GenerationRequest) -> Result<Prediction, Error> {
        let endpoint = self.predictions_endpoint();
        debug!(endpoint = %endpoint, version = %self.config.model_version, "Creating prediction");

        let body = CreatePredictionRequest {
            version: &self.config.model_version,
            input: request,
        };

        let builder = self
            .http
            .post(&endpoint)
            .header(reqwest::header::AUTHORIZATION, self.config.api_token.bearer())
            .header("Prefer", format!("wait={}", self.sync_wait_secs()))
            .json(&body);

        self.send(builder, &endpoint).await
    }

    async fn get_prediction(&self, url: &str) -> Result<Prediction, Error> {
        let builder = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.config.api_token.bearer());

        self.send(builder, url).await
    }

    async fn send(&self, builder: reqwest::RequestBuilder, endpoint: &str) -> Result<Prediction, Error> {
        let response = builder
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(self.config.request_timeout_secs)
                } else {
                    InferenceError::api(endpoint, 0, format!("Request failed: {}", e)).into()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::from_status(
                endpoint,
                status.as_u16(),
                retry_after,
                api_error_detail(&body),
            )
            .into());
        }

        response.json::<Prediction>().await.map_err(|e| {
            InferenceError::api(endpoint, status.as_u16(), format!("Failed to parse response: {}", e)).into()
        })
    }
}

#[async_trait]
impl InferenceClient for ReplicateClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, Error> {
        tokio::time::timeout(self.config.generation_timeout(), self.run_prediction(request))
            .await
            .map_err(|_| Error::timeout(self.config.generation_timeout_secs))?
    }
}

/// Replicate puts a human-readable reason in `detail`; fall back to the raw body.
fn api_error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

// =============================================================================
// API Request/Response Types
// =============================================================================

/// Body of `POST /predictions`.
#[derive(Debug, Serialize)]
struct CreatePredictionRequest<'a> {
    version: &'a str,
    input: &'a GenerationRequest,
}

/// Prediction resource.
#[derive(Debug, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

/// Links returned with a prediction.
#[derive(Debug, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

/// Lifecycle state of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    /// Whether polling can stop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded
                | PredictionStatus::Failed
                | PredictionStatus::Canceled
                | PredictionStatus::Aborted
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Starting => "starting",
            PredictionStatus::Processing => "processing",
            PredictionStatus::Succeeded => "succeeded",
            PredictionStatus::Failed => "failed",
            PredictionStatus::Canceled => "canceled",
            PredictionStatus::Aborted => "aborted",
            PredictionStatus::Unknown => "unknown",
        }
    }
}

/// Whether `candidate` is on the same origin as `base` and below its path.
fn is_under_base(candidate: &str, base: &str) -> bool {
    let (Ok(candidate), Ok(base)) = (Url::parse(candidate), Url::parse(base)) else {
        return false;
    };
    if candidate.scheme() != base.scheme()
        || candidate.host_str() != base.host_str()
        || candidate.port_or_known_default() != base.port_or_known_default()
    {
        return false;
    }

    let prefix = base.path().trim_end_matches('/');
    let path = candidate.path();
    prefix.is_empty() || path == prefix || path.starts_with(&format!("{}/", prefix))
}

impl Prediction {
    /// URL to poll for this prediction.
    ///
    /// The advertised `urls.get` is only followed when it points at the
    /// configured API base, so the token is never sent elsewhere.
    pub fn poll_url(&self, config: &Config) -> String {
        match self.urls.as_ref().and_then(|u| u.get.as_deref()) {
            Some(url) if is_under_base(url, &config.api_base_url) => url.to_string(),
            _ => config.replicate_endpoint(&format!("predictions/{}", self.id)),
        }
    }

    /// First image URL in the output. SDXL returns an array of URLs; some
    /// models return a single string.
    pub fn first_output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }

    fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(msg)) => msg.clone(),
            Some(Value::Null) | None => "no error reported".to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Convert a terminal prediction into its result.
    pub fn into_generated_image(self) -> Result<GeneratedImage, Error> {
        match self.status {
            PredictionStatus::Succeeded => match self.first_output_url() {
                Some(url) => Ok(GeneratedImage {
                    url,
                    prediction_id: self.id,
                }),
                None => Err(InferenceError::EmptyOutput(self.id).into()),
            },
            status => Err(InferenceError::PredictionFailed {
                message: self.error_message(),
                prediction_id: self.id,
                status: status.as_str().to_string(),
            }
            .into()),
        }
    }
}
