//! The tool-calling agent loop for ToolRelay.
//!
//! One task runs as a sequence of rounds:
//!
//! 1. **Request** a turn from the completion service with the whole
//!    conversation and every declared tool
//! 2. **Accumulate** the streamed fragments into text plus complete tool calls
//! 3. **Append** the assistant message
//! 4. **If tool calls**: resolve each call's arguments, dispatch it to the
//!    provider that declares the tool, append the result, and go to step 1
//! 5. **If text only**: release the providers and return the text
//!
//! Providers are released exactly once, on success and on every failure path.

pub mod accumulator;
pub mod arguments;
pub mod dispatcher;
pub mod error;
pub mod loop_runner;

pub use accumulator::{StreamAccumulator, StreamProtocolError, ToolCallFragment, Turn, collect};
pub use arguments::{ArgumentParseError, ToolArguments, resolve_arguments};
pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use error::AgentError;
pub use loop_runner::{AgentLoop, ArgumentErrorPolicy, LoopState};
