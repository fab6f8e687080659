//! Completion service trait: the abstraction over streaming LLM backends.
//!
//! A completion service receives the whole conversation plus the declared
//! tool set and returns one assistant turn as a finite, ordered stream of
//! fragments. Reassembling those fragments is the agent's job, so services
//! pass tool-call deltas through exactly as they arrive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::CompletionError;
use crate::message::Message;
use crate::tool::ToolDescriptor;

/// One request for a streamed assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o", "kimi-k2-0905-preview")
    pub model: String,

    /// The full conversation so far
    pub messages: Vec<Message>,

    /// Tools the model may call this round
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A partial tool call carried by one stream chunk.
///
/// `index` positions the call within the turn. Every other field is a
/// fragment to be appended to what earlier chunks delivered for that index.
/// A delta without an index violates the stream protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    /// Convenience constructor for a delta at a known index.
    pub fn at(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// A single fragment in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Partial tool call deltas, in wire order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,

    /// Whether this is the final chunk of the turn
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A chunk carrying only a content delta.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying only tool-call deltas.
    pub fn tool_deltas(deltas: Vec<ToolCallDelta>) -> Self {
        Self {
            tool_calls: deltas,
            ..Self::default()
        }
    }

    /// The terminal chunk of a turn.
    pub fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }
}

/// Receiving half of a streamed turn.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<StreamChunk, CompletionError>>;

/// The completion service contract.
///
/// The agent loop calls `stream()` once per round without knowing which
/// backend answers it.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// A human-readable name for this service (e.g., "openai", "moonshot").
    fn name(&self) -> &str;

    /// Send a request and get a stream of response chunks.
    ///
    /// The stream ends after a chunk with `done == true`, or with an `Err`
    /// item if the service failed mid-turn.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<ChunkReceiver, CompletionError>;
}
