//! MCP Resources for the Image server.
//!
//! - `replicate://model` - the model and its parameter limits
//! - `image://<id>` - one resource per saved image

use crate::handler::{
    DEFAULT_GUIDANCE_SCALE, DEFAULT_HEIGHT, DEFAULT_NUM_INFERENCE_STEPS, DEFAULT_WIDTH,
    DIMENSION_MULTIPLE, MAX_DIMENSION, MAX_GUIDANCE_SCALE, MAX_INFERENCE_STEPS, MIN_DIMENSION,
    MIN_GUIDANCE_SCALE, MIN_INFERENCE_STEPS,
};
use crate::replicate::DEFAULT_MODEL;
use crate::store::{IMAGE_MIME_TYPE, ImageRecord};
use replicate_mcp_common::config::Config;
use serde::Serialize;

/// Scheme prefix of saved-image resources.
pub const IMAGE_URI_PREFIX: &str = "image://";

/// Alternate prefix accepted on read.
const INTERNAL_IMAGE_URI_PREFIX: &str = "image://internal/";

/// URI of the model description resource.
pub const MODEL_RESOURCE_URI: &str = "replicate://model";

/// Description of the configured model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Model name on Replicate
    pub model: &'static str,
    /// Version hash predictions are created against
    pub version: String,
    pub output_mime_type: &'static str,
    pub defaults: ParameterDefaults,
    pub limits: ParameterLimits,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterDefaults {
    pub negative_prompt: &'static str,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterLimits {
    pub min_dimension: u32,
    pub max_dimension: u32,
    /// Width and height must be multiples of this
    pub dimension_multiple: u32,
    pub min_inference_steps: u32,
    pub max_inference_steps: u32,
    pub min_guidance_scale: f64,
    pub max_guidance_scale: f64,
}

/// Describe the model `config` points at.
pub fn model_info(config: &Config) -> ModelInfo {
    ModelInfo {
        model: DEFAULT_MODEL,
        version: config.model_version.clone(),
        output_mime_type: IMAGE_MIME_TYPE,
        defaults: ParameterDefaults {
            negative_prompt: "",
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            num_inference_steps: DEFAULT_NUM_INFERENCE_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
        },
        limits: ParameterLimits {
            min_dimension: MIN_DIMENSION,
            max_dimension: MAX_DIMENSION,
            dimension_multiple: DIMENSION_MULTIPLE,
            min_inference_steps: MIN_INFERENCE_STEPS,
            max_inference_steps: MAX_INFERENCE_STEPS,
            min_guidance_scale: MIN_GUIDANCE_SCALE,
            max_guidance_scale: MAX_GUIDANCE_SCALE,
        },
    }
}

/// Get model resource as JSON string.
pub fn model_resource_json(config: &Config) -> String {
    serde_json::to_string_pretty(&model_info(config)).unwrap_or_else(|_| "{}".to_string())
}

/// Resource URI of a saved image.
pub fn image_uri(id: &str) -> String {
    format!("{}{}", IMAGE_URI_PREFIX, id)
}

/// Extract the image id from `image://<id>` or `image://internal/<id>`.
pub fn parse_image_uri(uri: &str) -> Option<&str> {
    let id = uri
        .strip_prefix(INTERNAL_IMAGE_URI_PREFIX)
        .or_else(|| uri.strip_prefix(IMAGE_URI_PREFIX))?;
    if id.is_empty() { None } else { Some(id) }
}

/// Display name of an image resource.
pub fn image_resource_name(record: &ImageRecord) -> String {
    format!("Image: {}", record.prompt)
}

/// Description of an image resource.
pub fn image_resource_description(record: &ImageRecord) -> String {
    format!("Generated on {}", record.created_at.to_rfc3339())
}
