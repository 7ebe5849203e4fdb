// Error types for the SDK
//
// Each layer gets its own enum; handler code returns anyhow::Error which is
// carried unchanged through PatternError::Handler.

use soma_durable::{DurableClientError, StepError};
use thiserror::Error;

/// Errors from the task/message API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (connection refused, timeout, ...)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Task does not exist
    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    /// Response body could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Check whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::TaskNotFound(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Errors raised by pattern engines
#[derive(Debug, Error)]
pub enum PatternError {
    /// A durable step (history fetch, message send, awakeable) failed
    #[error("durable step failed: {0}")]
    Step(#[from] StepError),

    /// The handler returned an error
    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),

    /// The chat loop finished without an outcome
    #[error("chat pattern finished without achieving its goal")]
    GoalNotAchieved,
}

impl PatternError {
    /// Create a handler error
    pub fn handler(error: impl Into<anyhow::Error>) -> Self {
        Self::Handler(error.into())
    }
}

/// Errors from the durable MCP client
#[derive(Debug, Error)]
pub enum McpError {
    /// Establishing the session failed
    #[error("failed to connect to MCP server at {url}: {message}")]
    Connect { url: String, message: String },

    /// The client was used outside its scope
    #[error("MCP session {0} is closed")]
    SessionClosed(String),

    /// The durable step wrapping the call failed
    #[error("MCP call failed: {0}")]
    Step(#[from] StepError),
}

impl From<DurableClientError> for McpError {
    fn from(error: DurableClientError) -> Self {
        match error {
            DurableClientError::Closed(name) => Self::SessionClosed(name),
            DurableClientError::Step(step) => Self::Step(step),
        }
    }
}

/// Errors from registries
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Function not registered
    #[error("unknown function {function} for provider {provider}")]
    UnknownFunction { provider: String, function: String },

    /// Agent not registered
    #[error("unknown agent {0}")]
    UnknownAgent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retryable() {
        let server = ApiError::Status {
            status: 503,
            body: "unavailable".into(),
        };
        let client = ApiError::Status {
            status: 400,
            body: "bad request".into(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_mcp_error_from_client_error() {
        let error: McpError = DurableClientError::Closed("mcp-tools".into()).into();
        assert!(matches!(error, McpError::SessionClosed(name) if name == "mcp-tools"));
    }

    #[test]
    fn test_handler_error_keeps_context() {
        let error = PatternError::handler(anyhow::anyhow!("root cause").context("turn 2"));
        assert_eq!(error.to_string(), "handler failed: turn 2: root cause");
    }
}
