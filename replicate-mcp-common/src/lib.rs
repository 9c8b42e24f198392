//! Replicate MCP Common Library
//!
//! Configuration, the API credential, the error taxonomy, transport
//! selection, the server runner, and tracing setup shared by the Replicate
//! MCP image server.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod tracing;
pub mod transport;


pub use auth::ApiToken;
pub use config::Config;
pub use error::{ConfigError, Error, ErrorKind, InferenceError, Result};
pub use server::{McpServerBuilder, ServerError, shutdown_channel};
pub use transport::{Transport, TransportArgs, TransportMode};
