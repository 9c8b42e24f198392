//! MCP Server implementation for the Image server.
//!
//! This module provides the MCP server handler that exposes:
//! - `generate-image`, `save-image` and `list-saved-images` tools
//! - the `generate-image` prompt template
//! - `replicate://model` and one `image://<id>` resource per saved image

use crate::handler::{
    ImageGenerateParams, ImageHandler, ListedImage, SaveImageParams, DEFAULT_GUIDANCE_SCALE,
    DEFAULT_HEIGHT, DEFAULT_NUM_INFERENCE_STEPS, DEFAULT_WIDTH,
};
use crate::prompts::{self, GENERATE_IMAGE_PROMPT, ImageStyle, STYLE_ARGUMENT};
use crate::replicate::GeneratedImage;
use crate::resources::{self, MODEL_RESOURCE_URI};
use crate::store::ImageRecord;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use replicate_mcp_common::config::Config;
use replicate_mcp_common::error::Error;
use rmcp::{
    model::{
        CallToolResult, Content, GetPromptResult, JsonObject, ListPromptsResult,
        ListResourcesResult, Prompt, PromptArgument, PromptMessage, PromptMessageRole,
        RawResource, ReadResourceResult, Resource, ResourceContents, ServerCapabilities,
        ServerInfo,
    },
    ErrorData as McpError, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const GENERATE_IMAGE_TOOL: &str = "generate-image";
pub const SAVE_IMAGE_TOOL: &str = "save-image";
pub const LIST_SAVED_IMAGES_TOOL: &str = "list-saved-images";

/// MCP Server for image generation.
#[derive(Clone)]
pub struct ImageServer {
    /// Handler, created on first use
    handler: Arc<OnceCell<ImageHandler>>,
    /// Server configuration
    config: Config,
}

/// Tool parameters wrapper for generate-image.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImageGenerateToolParams {
    /// Text prompt describing the image to generate
    pub prompt: String,
    /// What to avoid in the generated image (default: empty)
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Width in pixels, 128-1536 and a multiple of 8 (default: 768)
    #[serde(default)]
    pub width: Option<u32>,
    /// Height in pixels, 128-1536 and a multiple of 8 (default: 768)
    #[serde(default)]
    pub height: Option<u32>,
    /// Number of denoising steps, 1-500 (default: 50)
    #[serde(default)]
    pub num_inference_steps: Option<u32>,
    /// Classifier-free guidance scale, 1-50 (default: 7.5)
    #[serde(default)]
    pub guidance_scale: Option<f64>,
}

impl From<ImageGenerateToolParams> for ImageGenerateParams {
    fn from(params: ImageGenerateToolParams) -> Self {
        Self {
            prompt: params.prompt,
            negative_prompt: params.negative_prompt.unwrap_or_default(),
            width: params.width.unwrap_or(DEFAULT_WIDTH),
            height: params.height.unwrap_or(DEFAULT_HEIGHT),
            num_inference_steps: params.num_inference_steps.unwrap_or(DEFAULT_NUM_INFERENCE_STEPS),
            guidance_scale: params.guidance_scale.unwrap_or(DEFAULT_GUIDANCE_SCALE),
        }
    }
}

/// Tool parameters wrapper for save-image.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SaveImageToolParams {
    /// URL of the generated image, as returned by generate-image
    pub image_url: String,
    /// Prompt the image was generated from
    pub prompt: String,
    /// File name for the stored image (letters, digits, '.', '_', '-')
    #[serde(default)]
    pub custom_filename: Option<String>,
}

impl From<SaveImageToolParams> for SaveImageParams {
    fn from(params: SaveImageToolParams) -> Self {
        Self {
            image_url: params.image_url,
            prompt: params.prompt,
            custom_filename: params.custom_filename.filter(|name| !name.trim().is_empty()),
        }
    }
}

/// Tool parameters wrapper for list-saved-images.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListSavedImagesToolParams {
    /// Attach a PNG thumbnail to every entry (default: true)
    #[serde(default)]
    pub include_thumbnails: Option<bool>,
}

impl ImageServer {
    /// Create a new ImageServer with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            handler: Arc::new(OnceCell::new()),
            config,
        }
    }

    /// Create a server around an already-built handler.
    pub fn with_handler(handler: ImageHandler) -> Self {
        let config = handler.config.clone();
        Self {
            handler: Arc::new(OnceCell::new_with(Some(handler))),
            config,
        }
    }

    /// The handler, initialized lazily on first use.
    async fn handler(&self) -> Result<&ImageHandler, McpError> {
        self.handler
            .get_or_try_init(|| ImageHandler::new(self.config.clone()))
            .await
            .map_err(|e| McpError::internal_error(format!("Failed to initialize handler: {}", e), None))
    }

    /// Generate an image from a text prompt.
    pub async fn generate_image(&self, params: ImageGenerateToolParams) -> Result<CallToolResult, McpError> {
        info!(prompt = %params.prompt, "Generating image");
        let handler = self.handler().await?;

        match handler.generate_image(params.into()).await {
            Ok(image) => Ok(CallToolResult::success(generated_content(&image))),
            Err(e) => tool_failure(GENERATE_IMAGE_TOOL, e),
        }
    }

    /// Download a generated image into the local library.
    pub async fn save_image(&self, params: SaveImageToolParams) -> Result<CallToolResult, McpError> {
        info!(url = %params.image_url, "Saving image");
        let handler = self.handler().await?;

        match handler.save_image(params.into()).await {
            Ok(record) => Ok(CallToolResult::success(saved_content(&record))),
            Err(e) => tool_failure(SAVE_IMAGE_TOOL, e),
        }
    }

    /// List saved images with optional thumbnails.
    pub async fn list_saved_images(&self, params: ListSavedImagesToolParams) -> Result<CallToolResult, McpError> {
        let include_thumbnails = params.include_thumbnails.unwrap_or(true);
        debug!(include_thumbnails, "Listing saved images");
        let handler = self.handler().await?;

        match handler.list_saved_images(include_thumbnails).await {
            Ok(listed) => Ok(CallToolResult::success(listing_content(&listed))),
            Err(e) => tool_failure(LIST_SAVED_IMAGES_TOOL, e),
        }
    }

    /// Render the prompt template `name`.
    pub fn prompt(&self, name: &str, arguments: Option<&JsonObject>) -> Result<GetPromptResult, McpError> {
        if name != GENERATE_IMAGE_PROMPT {
            return Err(McpError::invalid_params(format!("Unknown prompt: {}", name), None));
        }

        let style = match arguments.and_then(|args| args.get(STYLE_ARGUMENT)) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.as_str()),
            Some(other) => {
                return Err(McpError::invalid_params(
                    format!("style must be a string, got {}", other),
                    None,
                ));
            }
        };
        let style = prompts::resolve_style(style)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        Ok(GetPromptResult {
            description: Some(format!("Generate an image in the {} style", style)),
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, style.message())],
        })
    }

    /// Every listable resource: the model description, then saved images oldest first.
    pub async fn resource_entries(&self) -> Result<Vec<Resource>, McpError> {
        let handler = self.handler().await?;
        let records = handler
            .list_records()
            .await
            .map_err(|e| McpError::internal_error(format!("Failed to list images: {}", e), None))?;

        let mut entries = Vec::with_capacity(records.len() + 1);
        entries.push(resource(
            MODEL_RESOURCE_URI.to_string(),
            "Replicate Model".to_string(),
            "Model version and parameter limits used for generation".to_string(),
            "application/json",
            None,
        ));
        entries.extend(records.iter().map(|record| {
            resource(
                record.uri(),
                resources::image_resource_name(record),
                resources::image_resource_description(record),
                &record.mime_type,
                u32::try_from(record.size_bytes).ok(),
            )
        }));
        Ok(entries)
    }

    /// Read the resource at `uri`.
    pub async fn read_uri(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        if uri == MODEL_RESOURCE_URI {
            return Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(
                    resources::model_resource_json(&self.config),
                    uri.to_string(),
                )],
            });
        }

        let Some(id) = resources::parse_image_uri(uri) else {
            return Err(McpError::resource_not_found(format!("Unknown resource: {}", uri), None));
        };

        let handler = self.handler().await?;
        match handler.read_image(id).await {
            Ok((record, bytes)) => Ok(ReadResourceResult {
                contents: vec![blob_contents(uri, &record.mime_type, &bytes)?],
            }),
            Err(Error::NotFound(_)) => Err(McpError::resource_not_found(
                format!("Image not found: {}", id),
                Some(json!({ "uri": uri })),
            )),
            Err(e) => Err(McpError::internal_error(format!("Failed to read image: {}", e), None)),
        }
    }
}

/// Map a handler error onto the tool-call outcome.
///
/// Bad arguments are a protocol error; everything else is a failed tool
/// execution the model can read and react to.
fn tool_failure(tool: &str, err: Error) -> Result<CallToolResult, McpError> {
    let kind = err.kind();
    warn!(tool, kind = kind.as_str(), error = %err, "Tool call failed");
    match err {
        Error::Validation(message) => Err(McpError::invalid_params(
            message,
            Some(json!({ "kind": kind.as_str() })),
        )),
        other => Ok(CallToolResult::error(vec![Content::text(format!(
            "{}: {}",
            kind.as_str(),
            other
        ))])),
    }
}

fn generated_content(image: &GeneratedImage) -> Vec<Content> {
    vec![
        Content::text("Image generated."),
        Content::text(format!("Image URL: {}", image.url)),
        Content::text(format!(
            "Prediction ID: {}\nThe URL is temporary. Use {} to keep the image.",
            image.prediction_id, SAVE_IMAGE_TOOL
        )),
    ]
}

fn saved_content(record: &ImageRecord) -> Vec<Content> {
    vec![Content::text(format!(
        "Image saved.\nID: {}\nPrompt: {}\nLocation: {}\nResource: {}",
        record.id,
        record.prompt,
        record.binary_path.display(),
        record.uri()
    ))]
}

fn listing_content(listed: &[ListedImage]) -> Vec<Content> {
    if listed.is_empty() {
        return vec![Content::text("No saved images.")];
    }

    let mut content = Vec::with_capacity(listed.len() * 2 + 1);
    content.push(Content::text(format!("Found {} saved image(s):", listed.len())));
    for entry in listed {
        let record = &entry.record;
        content.push(Content::text(format!(
            "ID: {}\nPrompt: {}\nCreated: {}\nLocation: {}\nResource: {}",
            record.id,
            record.prompt,
            record.created_at.to_rfc3339(),
            record.binary_path.display(),
            record.uri()
        )));
        if let Some(thumbnail) = &entry.thumbnail {
            content.push(Content::image(BASE64.encode(thumbnail), "image/png"));
        }
    }
    content
}

fn resource(uri: String, name: String, description: String, mime_type: &str, size: Option<u32>) -> Resource {
    Resource {
        raw: RawResource {
            uri,
            name,
            title: None,
            description: Some(description),
            mime_type: Some(mime_type.to_string()),
            size,
            icons: None,
            meta: None,
        },
        annotations: None,
    }
}

fn blob_contents(uri: &str, mime_type: &str, bytes: &[u8]) -> Result<ResourceContents, McpError> {
    serde_json::from_value(json!({
        "uri": uri,
        "mimeType": mime_type,
        "blob": BASE64.encode(bytes),
    }))
    .map_err(|e| McpError::internal_error(format!("Failed to encode resource: {}", e), None))
}

fn tool(name: &'static str, description: &'static str, schema: schemars::schema::RootSchema) -> rmcp::model::Tool {
    let input_schema = match serde_json::to_value(&schema).unwrap_or_default() {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };
    rmcp::model::Tool {
        name: Cow::Borrowed(name),
        description: Some(Cow::Borrowed(description)),
        input_schema,
        annotations: None,
        icons: None,
        meta: None,
        output_schema: None,
        title: None,
    }
}

fn parse_arguments<T: serde::de::DeserializeOwned>(arguments: Option<JsonObject>) -> Result<T, McpError> {
    serde_json::from_value(serde_json::Value::Object(arguments.unwrap_or_default()))
        .map_err(|e| McpError::invalid_params(format!("Invalid parameters: {}", e), None))
}

impl ServerHandler for ImageServer {
    fn get_info(&self) -> ServerInfo {
        let mut capabilities = ServerCapabilities::builder()
            .enable_tools()
            .enable_resources()
            .enable_prompts()
            .build();
        if let Some(resources) = capabilities.resources.as_mut() {
            resources.list_changed = Some(true);
        }

        ServerInfo {
            instructions: Some(
                "Image generation server backed by Stable Diffusion XL on Replicate. \
                 Use generate-image to create an image from a prompt, save-image to keep it \
                 in the local library, and list-saved-images to browse saved images. \
                 Saved images are also readable as image://<id> resources."
                    .to_string(),
            ),
            capabilities,
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<rmcp::model::ListToolsResult, McpError>> + Send + '_ {
        async move {
            use schemars::schema_for;

            Ok(rmcp::model::ListToolsResult {
                tools: vec![
                    tool(
                        GENERATE_IMAGE_TOOL,
                        "Generate an image from a text prompt with Stable Diffusion XL on Replicate. \
                         Returns a temporary URL; use save-image to keep the result.",
                        schema_for!(ImageGenerateToolParams),
                    ),
                    tool(
                        SAVE_IMAGE_TOOL,
                        "Download a generated image by URL and store it in the local image library \
                         together with its prompt. Returns the new image id and resource URI.",
                        schema_for!(SaveImageToolParams),
                    ),
                    tool(
                        LIST_SAVED_IMAGES_TOOL,
                        "List every saved image with its prompt, creation time and location, \
                         optionally with PNG thumbnails.",
                        schema_for!(ListSavedImagesToolParams),
                    ),
                ],
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn call_tool(
        &self,
        params: rmcp::model::CallToolRequestParam,
        context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            match params.name.as_ref() {
                GENERATE_IMAGE_TOOL => {
                    let tool_params: ImageGenerateToolParams = parse_arguments(params.arguments)?;
                    self.generate_image(tool_params).await
                }
                SAVE_IMAGE_TOOL => {
                    let tool_params: SaveImageToolParams = parse_arguments(params.arguments)?;
                    let result = self.save_image(tool_params).await?;
                    if result.is_error != Some(true) {
                        if let Err(e) = context.peer.notify_resource_list_changed().await {
                            warn!(error = %e, "Failed to send resource list change notification");
                        }
                    }
                    Ok(result)
                }
                LIST_SAVED_IMAGES_TOOL => {
                    let tool_params: ListSavedImagesToolParams = parse_arguments(params.arguments)?;
                    self.list_saved_images(tool_params).await
                }
                _ => Err(McpError::invalid_params(format!("Unknown tool: {}", params.name), None)),
            }
        }
    }

    fn list_prompts(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListPromptsResult, McpError>> + Send + '_ {
        async move {
            let style = PromptArgument {
                name: STYLE_ARGUMENT.to_string(),
                title: None,
                description: Some(format!("Image style: {}", ImageStyle::choices())),
                required: Some(false),
            };

            Ok(ListPromptsResult {
                prompts: vec![Prompt::new(
                    GENERATE_IMAGE_PROMPT,
                    Some("Start an image generation request in a chosen style"),
                    Some(vec![style]),
                )],
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn get_prompt(
        &self,
        params: rmcp::model::GetPromptRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<GetPromptResult, McpError>> + Send + '_ {
        async move { self.prompt(&params.name, params.arguments.as_ref()) }
    }

    fn list_resources(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async move {
            debug!("Listing resources");
            Ok(ListResourcesResult {
                resources: self.resource_entries().await?,
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn read_resource(
        &self,
        params: rmcp::model::ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            debug!(uri = %params.uri, "Reading resource");
            self.read_uri(&params.uri).await
        }
    }
}
