//! Reassembles one streamed turn.
//!
//! Services deliver tool calls as indexed deltas: the first delta for an
//! index usually carries the id and name, later ones carry slices of the
//! argument text. The accumulator keeps one slot per index and concatenates
//! every piece in arrival order. Argument text is never interpreted here.

use thiserror::Error;
use toolrelay_core::error::CompletionError;
use toolrelay_core::message::MessageToolCall;
use toolrelay_core::observer::AgentObserver;
use toolrelay_core::provider::{ChunkReceiver, StreamChunk};

use crate::error::AgentError;

/// Highest number of tool calls accepted in a single turn.
pub const DEFAULT_MAX_SLOTS: usize = 128;

/// The stream violated the fragment protocol. Fatal for the round.
#[derive(Debug, Clone, Error)]
pub enum StreamProtocolError {
    #[error("tool call delta has no index")]
    MissingIndex,

    #[error("tool call index {index} exceeds the limit of {max} calls per turn")]
    IndexOutOfRange { index: usize, max: usize },

    #[error("completion stream failed: {0}")]
    Service(#[from] CompletionError),

    #[error("completion stream ended before its final chunk")]
    Truncated,
}

/// A tool call under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One complete assistant turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Turn {
    pub text: String,
    pub tool_calls: Vec<MessageToolCall>,
}

impl Turn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug)]
pub struct StreamAccumulator {
    text: String,
    slots: Vec<ToolCallFragment>,
    max_slots: usize,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::with_max_slots(DEFAULT_MAX_SLOTS)
    }

    pub fn with_max_slots(max_slots: usize) -> Self {
        Self {
            text: String::new(),
            slots: Vec::new(),
            max_slots,
        }
    }

    /// Fold one chunk into the turn.
    ///
    /// The chunk is validated before anything is applied, so a rejected
    /// chunk leaves the accumulator unchanged.
    pub fn push(&mut self, chunk: &StreamChunk) -> Result<(), StreamProtocolError> {
        for delta in &chunk.tool_calls {
            let index = delta.index.ok_or(StreamProtocolError::MissingIndex)?;
            if index >= self.max_slots {
                return Err(StreamProtocolError::IndexOutOfRange {
                    index,
                    max: self.max_slots,
                });
            }
        }

        if let Some(content) = &chunk.content {
            self.text.push_str(content);
        }

        for delta in &chunk.tool_calls {
            let Some(index) = delta.index else { continue };
            while self.slots.len() <= index {
                let next = self.slots.len();
                self.slots.push(ToolCallFragment {
                    index: next,
                    ..ToolCallFragment::default()
                });
            }

            let slot = &mut self.slots[index];
            if let Some(id) = delta.id.as_deref() {
                slot.id.push_str(id);
            }
            if let Some(name) = delta.name.as_deref() {
                slot.name.push_str(name);
            }
            if let Some(arguments) = delta.arguments.as_deref() {
                slot.arguments.push_str(arguments);
            }
        }

        Ok(())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn slots(&self) -> &[ToolCallFragment] {
        &self.slots
    }

    /// Close the turn. Slots become tool calls verbatim, in index order.
    pub fn finish(self) -> Turn {
        Turn {
            text: self.text,
            tool_calls: self
                .slots
                .into_iter()
                .map(|slot| MessageToolCall {
                    id: slot.id,
                    name: slot.name,
                    arguments: slot.arguments,
                })
                .collect(),
        }
    }
}

/// Drain a completion stream into a [`Turn`], one chunk at a time.
///
/// Content and argument deltas are reported to `observer` as they arrive.
pub async fn collect(
    mut rx: ChunkReceiver,
    observer: &dyn AgentObserver,
) -> Result<Turn, AgentError> {
    let mut acc = StreamAccumulator::new();

    while let Some(item) = rx.recv().await {
        let chunk = item.map_err(StreamProtocolError::Service)?;
        acc.push(&chunk)?;

        if let Some(content) = chunk.content.as_deref().filter(|c| !c.is_empty()) {
            observer.text_delta(content);
        }
        for delta in &chunk.tool_calls {
            if let (Some(index), Some(arguments)) = (delta.index, delta.arguments.as_deref()) {
                if !arguments.is_empty() {
                    observer.argument_delta(index, arguments);
                }
            }
        }

        if chunk.done {
            return Ok(acc.finish());
        }
    }

    Err(StreamProtocolError::Truncated.into())
}
