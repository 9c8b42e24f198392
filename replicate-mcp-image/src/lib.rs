//! Replicate MCP Image Server Library
//!
//! Text-to-image generation with Stable Diffusion XL on Replicate, plus a
//! local library of saved images exposed as MCP tools, prompts and resources.

pub mod catalog;
pub mod handler;
pub mod prompts;
pub mod replicate;
pub mod resources;
pub mod server;
pub mod store;
pub mod thumbnail;

pub use catalog::Catalog;
pub use handler::{ImageGenerateParams, ImageHandler, ListedImage, SaveImageParams};
pub use replicate::{GeneratedImage, GenerationRequest, InferenceClient, ReplicateClient};
pub use server::ImageServer;
pub use store::{ImageRecord, ImageStore, SaveOptions};
