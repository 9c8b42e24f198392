//! Shared helpers for building a server around a temporary image library.

use async_trait::async_trait;
use replicate_mcp_common::auth::ApiToken;
use replicate_mcp_common::config::Config;
use replicate_mcp_common::error::Error;
use replicate_mcp_image::{
    GeneratedImage, GenerationRequest, ImageHandler, ImageServer, ImageStore, InferenceClient,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Configuration with a dummy token and the library in `dir`.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::with_token(ApiToken::new("r8_workspace_tests"));
    config.images_dir = dir.path().to_path_buf();
    config
}

/// Inference backend that always returns the same URL.
pub struct StaticInference {
    pub url: String,
    pub calls: AtomicUsize,
}

impl StaticInference {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for StaticInference {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedImage, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedImage {
            url: self.url.clone(),
            prediction_id: "pred-workspace".to_string(),
        })
    }
}

/// Server whose handler uses `inference` and a library in `dir`.
pub async fn server_with(dir: &TempDir, inference: Arc<dyn InferenceClient>) -> ImageServer {
    let config = test_config(dir);
    let store = ImageStore::open(&config, reqwest::Client::new()).await.unwrap();
    ImageServer::with_handler(ImageHandler::with_deps(config, inference, store))
}

/// A decodable PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 120, 200])));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
