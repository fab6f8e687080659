//! Tool provider trait: the abstraction over external tool capabilities.
//!
//! A provider exposes a fixed set of tools, executes them with structured
//! arguments, and is released with `close()` when the task ends. The agent
//! holds providers by `Arc` for the lifetime of one task; connecting them
//! is the caller's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// A tool declaration, sent to the model so it knows what it may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// The tool name (should be unique across all providers of a task)
    pub name: String,

    /// Description of what the tool does
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's input
    #[serde(default = "empty_object_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object" })
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// One content element of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Anything else a provider may return (resources, audio, ...).
    #[serde(other)]
    Other,
}

/// The payload returned by a successful invocation.
///
/// `is_error` marks a tool-level failure the tool chose to report as
/// content for the model; transport and protocol failures are `ToolError`s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default)]
    pub content: Vec<ToolContent>,

    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolOutput {
    /// An output with a single text element.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// The text of the first content element, if that element is text.
    pub fn primary_text(&self) -> Option<&str> {
        match self.content.first() {
            Some(ToolContent::Text { text }) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// The tool provider contract.
///
/// Every tool source (an MCP server, an in-process toolset, a test fake)
/// implements this trait. `list_tools` must be stable for the provider's
/// lifetime.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// A human-readable name for this provider (used in logs and errors).
    fn name(&self) -> &str;

    /// The tools this provider declares.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError>;

    /// Execute one of this provider's tools.
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Release the provider. Called at most once per task.
    async fn close(&self) -> std::result::Result<(), ToolError>;
}
