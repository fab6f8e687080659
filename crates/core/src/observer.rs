//! Progress observers for the agent loop.
//!
//! Instead of a process-wide logger, each loop is handed an observer at
//! construction. The loop reports streamed text, streamed argument text,
//! tool calls, and tool results to it. Observers never influence control
//! flow or conversation state.

use crate::message::MessageToolCall;

/// Receives progress reports from the agent loop.
///
/// All methods default to doing nothing, so implementors only override
/// what they display.
pub trait AgentObserver: Send + Sync {
    /// A new round is about to request a turn.
    fn round_started(&self, _round: u32) {}

    /// A content delta arrived from the completion service.
    fn text_delta(&self, _delta: &str) {}

    /// An argument fragment arrived for the tool call at `index`.
    fn argument_delta(&self, _index: usize, _delta: &str) {}

    /// A tool call is about to be dispatched.
    fn tool_call(&self, _call: &MessageToolCall) {}

    /// A tool result (or synthetic failure text) was appended.
    fn tool_result(&self, _call: &MessageToolCall, _content: &str, _success: bool) {}

    /// The loop reached a terminal turn.
    fn finished(&self, _rounds: u32, _text: &str) {}
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AgentObserver for NoopObserver {}

/// Forwards reports to `tracing` at debug/trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AgentObserver for TracingObserver {
    fn round_started(&self, round: u32) {
        tracing::debug!(round, "Requesting turn");
    }

    fn text_delta(&self, delta: &str) {
        tracing::trace!(delta = %delta, "Content delta");
    }

    fn argument_delta(&self, index: usize, delta: &str) {
        tracing::trace!(index, delta = %delta, "Argument delta");
    }

    fn tool_call(&self, call: &MessageToolCall) {
        tracing::info!(
            tool = %call.name,
            call_id = %call.id,
            arguments = %call.arguments,
            "Calling tool"
        );
    }

    fn tool_result(&self, call: &MessageToolCall, content: &str, success: bool) {
        tracing::info!(
            tool = %call.name,
            call_id = %call.id,
            success,
            bytes = content.len(),
            "Tool result appended"
        );
    }

    fn finished(&self, rounds: u32, text: &str) {
        tracing::info!(rounds, chars = text.len(), "Agent finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting {
        deltas: Mutex<Vec<String>>,
    }

    impl AgentObserver for Collecting {
        fn text_delta(&self, delta: &str) {
            self.deltas.lock().unwrap().push(delta.to_string());
        }
    }

    #[test]
    fn default_methods_are_noops() {
        let observer = Collecting::default();
        observer.round_started(1);
        observer.argument_delta(0, "{");
        observer.text_delta("hi");
        assert_eq!(*observer.deltas.lock().unwrap(), vec!["hi".to_string()]);
    }

    #[test]
    fn observers_are_object_safe() {
        let observers: Vec<Box<dyn AgentObserver>> =
            vec![Box::new(NoopObserver), Box::new(TracingObserver)];
        for o in &observers {
            o.finished(1, "done");
        }
    }
}
