//! Workspace-level integration tests for the Replicate MCP image server.
//!
//! These tests verify:
//! - The server starts and advertises tools, prompts and resources
//! - Tool schemas are well formed
//! - Invalid input is rejected before any side effect
//! - Tool, prompt and resource outputs have the expected MCP shape

pub mod input_validation;
pub mod output_format;
pub mod server_startup;
pub mod tool_schema;

#[cfg(test)]
pub(crate) mod fixtures;
