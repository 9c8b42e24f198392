//! Tracing initialization.
//!
//! Logs always go to stderr. With the stdio transport stdout carries MCP
//! frames, so anything written there would corrupt the protocol stream.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log level and filtering, for example
//!   `RUST_LOG=replicate_mcp_image=debug` or `RUST_LOG=warn,replicate_mcp_common=debug`.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Initialize the global subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize tracing, returning an error if already initialized.
pub fn try_init_tracing(default_level: &str) -> Result<(), ()> {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .try_init()
        .map_err(|_| ())
}
