//! Error kinds surfaced by the adapter library.
//!
//! Library code returns [`AdapterError`]; the `fleetctl mcp` front-end wraps
//! these in `anyhow` with context like the rest of the binary.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// No node of the wrapped tree matches the requested path.
    #[error("command not found: '{0}'")]
    CommandNotFound(String),

    /// Tool name does not carry the configured prefix.
    #[error("unknown tool '{name}' (expected the '{prefix}_' prefix)")]
    UnknownTool { name: String, prefix: String },

    #[error("tool '{tool}' requires the '{parameter}' parameter ({hint})")]
    MissingRequiredParameter {
        tool: String,
        parameter: String,
        hint: String,
    },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("command '{command}' failed with exit code {exit_code}: {stderr}")]
    ExecutionFailure {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A synthesized tool definition could not be turned into a protocol tool.
    #[error("schema for tool '{0}' is not a JSON object; tool skipped")]
    SchemaGenerationSkipped(String),

    #[error("failed to read resource '{uri}': {message}")]
    ResourceRead { uri: String, message: String },

    #[error("invalid resource URI '{uri}': {reason}")]
    InvalidResourceUri { uri: String, reason: String },

    /// Output redirection for in-process execution could not be set up.
    #[error("output capture failed: {0}")]
    Capture(#[source] std::io::Error),

    #[error("config file '{}': {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    pub fn command_not_found(path: &[String]) -> Self {
        AdapterError::CommandNotFound(path.join(" "))
    }
}
