//! The agent reasoning loop implementation.

use std::sync::Arc;
use std::time::Duration;

use toolrelay_core::error::ToolError;
use toolrelay_core::message::{Conversation, Message, MessageToolCall};
use toolrelay_core::observer::AgentObserver;
use toolrelay_core::provider::{CompletionRequest, CompletionService};
use tracing::{debug, info, warn};

use crate::accumulator::{Turn, collect};
use crate::arguments::resolve_arguments;
use crate::dispatcher::ToolDispatcher;
use crate::error::AgentError;

/// Where the loop is between rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// A turn must be requested from the completion service.
    AwaitingTurn,
    /// The last turn asked for these tools, to be run in order.
    HasToolCalls(Vec<MessageToolCall>),
    /// The last turn was plain text.
    Terminal(String),
}

/// What to do with a tool call whose arguments do not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgumentErrorPolicy {
    /// Stop the task with [`AgentError::Arguments`].
    #[default]
    Abort,
    /// Answer the call with the parse error and let the model retry.
    Report,
}

/// Drives one task: request a turn, run its tool calls, repeat.
///
/// An `AgentLoop` owns the dispatcher for a single task. Providers are
/// released when [`run`](Self::run) returns, whatever the outcome.
pub struct AgentLoop {
    service: Arc<dyn CompletionService>,
    dispatcher: ToolDispatcher,
    observer: Arc<dyn AgentObserver>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    max_rounds: u32,
    round_timeout: Option<Duration>,
    tool_timeout: Option<Duration>,
    argument_errors: ArgumentErrorPolicy,
}

impl AgentLoop {
    pub fn new(
        service: Arc<dyn CompletionService>,
        dispatcher: ToolDispatcher,
        model: impl Into<String>,
        observer: Arc<dyn AgentObserver>,
    ) -> Self {
        Self {
            service,
            dispatcher,
            observer,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            max_rounds: 25,
            round_timeout: None,
            tool_timeout: None,
            argument_errors: ArgumentErrorPolicy::default(),
        }
    }

    /// Set the maximum number of completion requests per task.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Bound the time one streamed turn may take.
    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = Some(timeout);
        self
    }

    /// Bound the time one tool invocation may take.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn with_argument_errors(mut self, policy: ArgumentErrorPolicy) -> Self {
        self.argument_errors = policy;
        self
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// The starting conversation for a task: optional system prompt, then the user prompt.
    pub fn task(system: Option<&str>, user: &str) -> Conversation {
        let mut conversation = Conversation::new();
        if let Some(system) = system {
            conversation.push(Message::system(system));
        }
        conversation.push(Message::user(user));
        conversation
    }

    /// Build the conversation for a task and run it to completion.
    pub async fn run_task(
        &self,
        system: Option<&str>,
        user: &str,
    ) -> (Result<String, AgentError>, Conversation) {
        let mut conversation = Self::task(system, user);
        let result = self.run(&mut conversation).await;
        (result, conversation)
    }

    /// Run rounds until the model answers without tool calls.
    ///
    /// Every exit path releases the tool providers before returning.
    pub async fn run(&self, conversation: &mut Conversation) -> Result<String, AgentError> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            tools = self.dispatcher.tool_count(),
            "Starting task"
        );

        let result = self.drive(conversation).await;
        self.dispatcher.close_all().await;

        if let Err(e) = &result {
            warn!(conversation_id = %conversation.id, error = %e, "Task failed");
        }
        result
    }

    async fn drive(&self, conversation: &mut Conversation) -> Result<String, AgentError> {
        let mut round = 0;
        let mut state = LoopState::AwaitingTurn;

        loop {
            state = match state {
                LoopState::AwaitingTurn => {
                    if round >= self.max_rounds {
                        return Err(AgentError::RoundLimit { rounds: round });
                    }
                    round += 1;
                    self.observer.round_started(round);

                    let Turn { text, tool_calls } = self.request_turn(conversation, round).await?;
                    debug!(
                        conversation_id = %conversation.id,
                        round,
                        tool_calls = tool_calls.len(),
                        "Turn complete"
                    );

                    let next = if tool_calls.is_empty() {
                        LoopState::Terminal(text.clone())
                    } else {
                        LoopState::HasToolCalls(tool_calls.clone())
                    };
                    conversation.push(Message::assistant_with_calls(text, tool_calls));
                    next
                }
                LoopState::HasToolCalls(calls) => {
                    for call in &calls {
                        self.run_tool_call(conversation, call).await?;
                    }
                    LoopState::AwaitingTurn
                }
                LoopState::Terminal(text) => {
                    self.observer.finished(round, &text);
                    return Ok(text);
                }
            };
        }
    }

    async fn request_turn(
        &self,
        conversation: &Conversation,
        round: u32,
    ) -> Result<Turn, AgentError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: conversation.messages().to_vec(),
            tools: self.dispatcher.definitions(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let turn = self.stream_turn(request);
        match self.round_timeout {
            Some(limit) => tokio::time::timeout(limit, turn).await.map_err(|_| {
                AgentError::Timeout { round, limit }
            })?,
            None => turn.await,
        }
    }

    async fn stream_turn(&self, request: CompletionRequest) -> Result<Turn, AgentError> {
        let rx = self.service.stream(request).await?;
        collect(rx, self.observer.as_ref()).await
    }

    /// Resolve, dispatch, and record one tool call.
    async fn run_tool_call(
        &self,
        conversation: &mut Conversation,
        call: &MessageToolCall,
    ) -> Result<(), AgentError> {
        self.observer.tool_call(call);

        let arguments = match resolve_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(e) if self.argument_errors == ArgumentErrorPolicy::Report => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Reporting bad arguments to the model");
                let text = e.to_string();
                self.observer.tool_result(call, &text, false);
                conversation.push(Message::tool_result(&call.id, text));
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let dispatch = self.dispatcher.dispatch(call, arguments);
        let outcome = match self.tool_timeout {
            Some(limit) => tokio::time::timeout(limit, dispatch)
                .await
                .map_err(|_| ToolError::Timeout {
                    tool_name: call.name.clone(),
                    limit,
                })??,
            None => dispatch.await?,
        };

        let success = outcome.succeeded();
        let text = outcome.into_text();
        self.observer.tool_result(call, &text, success);
        conversation.push(Message::tool_result(&call.id, text));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use toolrelay_core::error::CompletionError;
    use toolrelay_core::observer::NoopObserver;
    use toolrelay_core::provider::{ChunkReceiver, StreamChunk};

    /// Answers every request with the same text.
    struct EchoService {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionService for EchoService {
        fn name(&self) -> &str {
            "echo"
        }

        async fn stream(&self, request: CompletionRequest) -> Result<ChunkReceiver, CompletionError> {
            self.requests.lock().unwrap().push(request);
            let (tx, rx) = mpsc::channel(4);
            tx.send(Ok(StreamChunk::text("pong"))).await.unwrap();
            tx.send(Ok(StreamChunk::done())).await.unwrap();
            Ok(rx)
        }
    }

    /// Never finishes a turn.
    struct StalledService;

    #[async_trait]
    impl CompletionService for StalledService {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn stream(&self, _request: CompletionRequest) -> Result<ChunkReceiver, CompletionError> {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                drop(tx);
            });
            Ok(rx)
        }
    }

    async fn empty_dispatcher() -> ToolDispatcher {
        ToolDispatcher::connect(Vec::new()).await.unwrap()
    }

    #[test]
    fn task_puts_system_before_user() {
        let conversation = AgentLoop::task(Some("be brief"), "hi");
        let roles: Vec<&str> = conversation.messages().iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user"]);

        let conversation = AgentLoop::task(None, "hi");
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn text_turn_terminates_in_one_round() {
        let service = Arc::new(EchoService {
            requests: Mutex::new(Vec::new()),
        });
        let agent = AgentLoop::new(service.clone(), empty_dispatcher().await, "m", Arc::new(NoopObserver))
            .with_temperature(0.2)
            .with_max_tokens(64);

        let (result, conversation) = agent.run_task(None, "ping").await;
        assert_eq!(result.unwrap(), "pong");
        assert_eq!(conversation.len(), 2);
        assert!(agent.dispatcher().is_closed());

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "m");
        assert_eq!(requests[0].temperature, Some(0.2));
        assert_eq!(requests[0].max_tokens, Some(64));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_round_times_out() {
        let agent = AgentLoop::new(
            Arc::new(StalledService),
            empty_dispatcher().await,
            "m",
            Arc::new(NoopObserver),
        )
        .with_round_timeout(Duration::from_secs(30));

        let (result, _) = agent.run_task(None, "hello?").await;
        assert!(matches!(
            result,
            Err(AgentError::Timeout { round: 1, limit }) if limit == Duration::from_secs(30)
        ));
        assert!(agent.dispatcher().is_closed());
    }

    #[tokio::test]
    async fn zero_rounds_is_an_immediate_limit() {
        let service = Arc::new(EchoService {
            requests: Mutex::new(Vec::new()),
        });
        let agent = AgentLoop::new(service.clone(), empty_dispatcher().await, "m", Arc::new(NoopObserver))
            .with_max_rounds(0);

        let (result, conversation) = agent.run_task(None, "ping").await;
        assert!(matches!(result, Err(AgentError::RoundLimit { rounds: 0 })));
        assert_eq!(conversation.len(), 1);
        assert!(service.requests.lock().unwrap().is_empty());
    }
}
