//! Image handler for the MCP Image server.
//!
//! This module provides the `ImageHandler` struct and parameter types for
//! text-to-image generation on Replicate and for the local image library.

use crate::replicate::{GeneratedImage, GenerationRequest, InferenceClient, ReplicateClient};
use crate::store::{ImageRecord, ImageStore, SaveOptions, normalize_custom_filename, validate_image_url};
use crate::thumbnail::{self, THUMBNAIL_MAX_EDGE};
use replicate_mcp_common::config::Config;
use replicate_mcp_common::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default image width in pixels.
pub const DEFAULT_WIDTH: u32 = 768;

/// Default image height in pixels.
pub const DEFAULT_HEIGHT: u32 = 768;

/// Default number of denoising steps.
pub const DEFAULT_NUM_INFERENCE_STEPS: u32 = 50;

/// Default classifier-free guidance scale.
pub const DEFAULT_GUIDANCE_SCALE: f64 = 7.5;

/// Smallest accepted width or height.
pub const MIN_DIMENSION: u32 = 128;

/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = 1536;

/// Width and height must be multiples of this.
pub const DIMENSION_MULTIPLE: u32 = 8;

pub const MIN_INFERENCE_STEPS: u32 = 1;
pub const MAX_INFERENCE_STEPS: u32 = 500;

pub const MIN_GUIDANCE_SCALE: f64 = 1.0;
pub const MAX_GUIDANCE_SCALE: f64 = 50.0;

/// Text-to-image generation parameters.
///
/// Defaults are already applied; see `ImageGenerateToolParams` for the
/// caller-facing shape.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImageGenerateParams {
    /// Text prompt describing the image to generate.
    pub prompt: String,

    /// What to avoid in the generated image.
    #[serde(default)]
    pub negative_prompt: String,

    /// Width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Number of denoising steps.
    #[serde(default = "default_num_inference_steps")]
    pub num_inference_steps: u32,

    /// Classifier-free guidance scale.
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_num_inference_steps() -> u32 {
    DEFAULT_NUM_INFERENCE_STEPS
}

fn default_guidance_scale() -> f64 {
    DEFAULT_GUIDANCE_SCALE
}

impl ImageGenerateParams {
    /// Parameters for `prompt` with every default applied.
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: String::new(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            num_inference_steps: DEFAULT_NUM_INFERENCE_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
        }
    }

    /// Validate the parameters against the model constraints.
    ///
    /// # Returns
    /// - `Ok(())` if all parameters are valid
    /// - `Err(Vec<ValidationError>)` with all validation errors
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.prompt.trim().is_empty() {
            errors.push(ValidationError::new("prompt", "Prompt cannot be empty"));
        }

        for (field, value) in [("width", self.width), ("height", self.height)] {
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                errors.push(ValidationError::new(
                    field,
                    format!(
                        "{} must be between {} and {}, got {}",
                        field, MIN_DIMENSION, MAX_DIMENSION, value
                    ),
                ));
            } else if value % DIMENSION_MULTIPLE != 0 {
                errors.push(ValidationError::new(
                    field,
                    format!("{} must be a multiple of {}, got {}", field, DIMENSION_MULTIPLE, value),
                ));
            }
        }

        if !(MIN_INFERENCE_STEPS..=MAX_INFERENCE_STEPS).contains(&self.num_inference_steps) {
            errors.push(ValidationError::new(
                "num_inference_steps",
                format!(
                    "num_inference_steps must be between {} and {}, got {}",
                    MIN_INFERENCE_STEPS, MAX_INFERENCE_STEPS, self.num_inference_steps
                ),
            ));
        }

        // NaN fails the range check
        if !(MIN_GUIDANCE_SCALE..=MAX_GUIDANCE_SCALE).contains(&self.guidance_scale) {
            errors.push(ValidationError::new(
                "guidance_scale",
                format!(
                    "guidance_scale must be between {} and {}, got {}",
                    MIN_GUIDANCE_SCALE, MAX_GUIDANCE_SCALE, self.guidance_scale
                ),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Model input for these parameters.
    pub fn to_request(&self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            width: self.width,
            height: self.height,
            num_inference_steps: self.num_inference_steps,
            guidance_scale: self.guidance_scale,
        }
    }
}

/// Parameters for saving a generated image.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SaveImageParams {
    /// URL of the image to download.
    pub image_url: String,

    /// Prompt the image was generated from.
    pub prompt: String,

    /// File name for the stored binary; `.png` is appended when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_filename: Option<String>,
}

impl SaveImageParams {
    /// Validate the save parameters.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = validate_image_url(&self.image_url) {
            errors.push(ValidationError::new("image_url", validation_message(e)));
        }

        if self.prompt.trim().is_empty() {
            errors.push(ValidationError::new("prompt", "Prompt cannot be empty"));
        }

        if let Some(name) = &self.custom_filename {
            if let Err(e) = normalize_custom_filename(name) {
                errors.push(ValidationError::new("custom_filename", validation_message(e)));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn validation_message(err: Error) -> String {
    match err {
        Error::Validation(message) => message,
        other => other.to_string(),
    }
}

/// Validation error details for handler parameters.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn into_validation_error(errors: Vec<ValidationError>) -> Error {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    Error::validation(messages.join("; "))
}

/// A catalog entry with its optional preview.
#[derive(Debug, Clone)]
pub struct ListedImage {
    pub record: ImageRecord,
    /// PNG thumbnail, absent when disabled or when the binary could not be decoded
    pub thumbnail: Option<Vec<u8>>,
}

/// Image handler.
///
/// Owns the inference client and the image store.
pub struct ImageHandler {
    /// Application configuration.
    pub config: Config,
    /// Remote generation backend.
    pub inference: Arc<dyn InferenceClient>,
    /// Saved images.
    pub store: ImageStore,
}

impl ImageHandler {
    /// Create a new ImageHandler with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the images directory cannot be created.
    #[instrument(level = "debug", name = "image_handler_new", skip_all)]
    pub async fn new(config: Config) -> Result<Self, Error> {
        debug!("Initializing ImageHandler");

        let http = reqwest::Client::new();
        let store = ImageStore::open(&config, http.clone()).await?;
        let inference = Arc::new(ReplicateClient::new(config.clone(), http));

        Ok(Self {
            config,
            inference,
            store,
        })
    }

    /// Create a new ImageHandler with provided dependencies.
    pub fn with_deps(config: Config, inference: Arc<dyn InferenceClient>, store: ImageStore) -> Self {
        Self {
            config,
            inference,
            store,
        }
    }

    /// Generate an image from a text prompt.
    ///
    /// Invalid parameters are rejected before any remote call is made.
    #[instrument(level = "info", name = "generate_image", skip(self, params), fields(width = params.width, height = params.height, steps = params.num_inference_steps))]
    pub async fn generate_image(&self, params: ImageGenerateParams) -> Result<GeneratedImage, Error> {
        params.validate().map_err(into_validation_error)?;

        info!("Generating image with Replicate");
        let image = self.inference.generate(&params.to_request()).await?;
        info!(prediction_id = %image.prediction_id, "Image generated");
        Ok(image)
    }

    /// Download and persist a generated image.
    #[instrument(level = "info", name = "save_image", skip(self, params), fields(url = %params.image_url))]
    pub async fn save_image(&self, params: SaveImageParams) -> Result<ImageRecord, Error> {
        params.validate().map_err(into_validation_error)?;

        let options = SaveOptions {
            custom_filename: params.custom_filename,
        };
        self.store.save(&params.image_url, &params.prompt, options).await
    }

    /// All valid saved images, oldest first.
    pub async fn list_records(&self) -> Result<Vec<ImageRecord>, Error> {
        self.store.catalog().list().await
    }

    /// Saved images with optional thumbnails.
    ///
    /// A thumbnail that cannot be produced is logged and left out; the entry
    /// itself is still listed.
    #[instrument(level = "info", name = "list_saved_images", skip(self))]
    pub async fn list_saved_images(&self, include_thumbnails: bool) -> Result<Vec<ListedImage>, Error> {
        let records = self.list_records().await?;
        let mut listed = Vec::with_capacity(records.len());

        for record in records {
            let thumbnail = if include_thumbnails {
                self.thumbnail(&record).await
            } else {
                None
            };
            listed.push(ListedImage { record, thumbnail });
        }

        info!(count = listed.len(), "Listed saved images");
        Ok(listed)
    }

    async fn thumbnail(&self, record: &ImageRecord) -> Option<Vec<u8>> {
        let bytes = match tokio::fs::read(&record.binary_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(id = %record.id, error = %e, "Failed to read image for thumbnail");
                return None;
            }
        };
        match thumbnail::render_png_blocking(bytes, THUMBNAIL_MAX_EDGE).await {
            Ok(thumb) => Some(thumb),
            Err(e) => {
                warn!(id = %record.id, error = %e, "Failed to render thumbnail");
                None
            }
        }
    }

    /// Record and binary of a saved image.
    pub async fn read_image(&self, id: &str) -> Result<(ImageRecord, Vec<u8>), Error> {
        self.store.read(id).await
    }
}
