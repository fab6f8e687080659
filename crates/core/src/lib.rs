//! # ToolRelay Core
//!
//! Domain types, traits, and error definitions for the ToolRelay agent.
//! This crate has **no transport dependencies**. It defines the contracts
//! that the agent loop consumes and that concrete collaborators implement.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`CompletionService`]: streams model turns
//! - [`ToolProvider`]: declares and executes tools
//! - [`AgentObserver`]: receives progress reports
//!
//! Implementations live in their own crates (`toolrelay-providers`,
//! `toolrelay-mcp`), so the loop can be tested against scripted fakes.

pub mod error;
pub mod message;
pub mod observer;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{CompletionError, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use observer::{AgentObserver, NoopObserver, TracingObserver};
pub use provider::{CompletionRequest, CompletionService, StreamChunk, ToolCallDelta};
pub use tool::{ToolContent, ToolDescriptor, ToolOutput, ToolProvider};
