//! Error types for the ToolRelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error enum.

use std::time::Duration;

use thiserror::Error;

/// Failures raised by a completion service, either before streaming starts
/// or as an item inside the fragment stream.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by completion service, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed stream chunk: {0}")]
    MalformedChunk(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Completion service not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures raised by a tool provider.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {limit:?}")]
    Timeout { tool_name: String, limit: Duration },

    #[error("Tool provider transport error ({provider}): {reason}")]
    Transport { provider: String, reason: String },
}
