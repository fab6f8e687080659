use std::time::Duration;

use thiserror::Error;
use toolrelay_core::error::{CompletionError, ToolError};

use crate::accumulator::StreamProtocolError;
use crate::arguments::ArgumentParseError;

/// Why a task stopped without a final answer.
///
/// Every variant is fatal for the task. Providers have already been
/// released by the time the caller sees one.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Stream protocol error: {0}")]
    Stream(#[from] StreamProtocolError),

    #[error(transparent)]
    Arguments(#[from] ArgumentParseError),

    #[error("Tool provider failed: {0}")]
    Tool(#[from] ToolError),

    #[error("Completion request failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("Gave up after {rounds} rounds without a final answer")]
    RoundLimit { rounds: u32 },

    #[error("Round {round} timed out after {limit:?}")]
    Timeout { round: u32, limit: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_keeps_its_detail() {
        let err = AgentError::from(ToolError::ExecutionFailed {
            tool_name: "read_file".into(),
            reason: "permission denied".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("read_file"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn round_limit_reports_count() {
        let err = AgentError::RoundLimit { rounds: 25 };
        assert_eq!(err.to_string(), "Gave up after 25 rounds without a final answer");
    }

    #[test]
    fn sub_second_timeouts_keep_their_unit() {
        let err = AgentError::Timeout {
            round: 2,
            limit: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Round 2 timed out after 250ms");

        let err = AgentError::from(ToolError::Timeout {
            tool_name: "search".into(),
            limit: Duration::from_millis(1500),
        });
        assert!(err.to_string().contains("after 1.5s"));
    }
}
