//! Routes tool calls to the provider that declares them.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use toolrelay_core::error::ToolError;
use toolrelay_core::message::MessageToolCall;
use toolrelay_core::tool::{ToolDescriptor, ToolProvider};
use tracing::{debug, warn};

use crate::arguments::ToolArguments;

/// What the model gets told about one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The provider answered. `is_error` is the tool's own failure flag.
    Completed { text: String, is_error: bool },
    /// The provider answered without any text content.
    NoTextContent,
    /// No provider declares this tool.
    Unavailable { name: String },
}

impl DispatchOutcome {
    /// Whether the tool ran and reported success.
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed { is_error: false, .. })
    }

    /// The content of the tool message for this outcome.
    pub fn into_text(self) -> String {
        match self {
            Self::Completed { text, .. } => text,
            Self::NoTextContent => "Tool returned no text content".into(),
            Self::Unavailable { name } => format!("Tool not found: {name}"),
        }
    }
}

/// The tool registry for one task.
///
/// Tool lists are fetched once at connect time. When two providers declare
/// the same name, the one registered first wins.
pub struct ToolDispatcher {
    providers: Vec<Arc<dyn ToolProvider>>,
    /// Declared tools in registration order, with the owning provider's index
    tools: Vec<(ToolDescriptor, usize)>,
    by_name: HashMap<String, usize>,
    closed: AtomicBool,
}

impl ToolDispatcher {
    /// Collect the declared tools of every provider, in order.
    ///
    /// If a provider cannot list its tools, all providers are released and
    /// the error is returned.
    pub async fn connect(providers: Vec<Arc<dyn ToolProvider>>) -> Result<Self, ToolError> {
        let mut dispatcher = Self {
            providers,
            tools: Vec::new(),
            by_name: HashMap::new(),
            closed: AtomicBool::new(false),
        };

        for (idx, provider) in dispatcher.providers.iter().enumerate() {
            let declared = match provider.list_tools().await {
                Ok(declared) => declared,
                Err(e) => {
                    dispatcher.close_all().await;
                    return Err(e);
                }
            };
            debug!(provider = %provider.name(), tools = declared.len(), "Registered provider");

            for tool in declared {
                match dispatcher.by_name.entry(tool.name.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(idx);
                    }
                    Entry::Occupied(existing) => {
                        warn!(
                            tool = %tool.name,
                            kept = %dispatcher.providers[*existing.get()].name(),
                            shadowed = %provider.name(),
                            "Duplicate tool name, first provider wins"
                        );
                    }
                }
                dispatcher.tools.push((tool, idx));
            }
        }

        Ok(dispatcher)
    }

    /// Every declared tool, in provider registration order.
    pub fn definitions(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|(tool, _)| tool.clone()).collect()
    }

    /// Declared tools paired with the name of the provider that owns them.
    pub fn catalog(&self) -> impl Iterator<Item = (&str, &ToolDescriptor)> {
        self.tools
            .iter()
            .map(|(tool, idx)| (self.providers[*idx].name(), tool))
    }

    /// The provider that handles `name`, if any.
    pub fn resolve(&self, name: &str) -> Option<&Arc<dyn ToolProvider>> {
        self.by_name.get(name).map(|idx| &self.providers[*idx])
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Invoke the tool named by `call`.
    ///
    /// An unknown tool is not an error: the outcome tells the model so it
    /// can pick another tool. Provider failures are returned as errors.
    pub async fn dispatch(
        &self,
        call: &MessageToolCall,
        arguments: ToolArguments,
    ) -> Result<DispatchOutcome, ToolError> {
        let Some(provider) = self.resolve(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Model called an undeclared tool");
            return Ok(DispatchOutcome::Unavailable {
                name: call.name.clone(),
            });
        };

        debug!(tool = %call.name, provider = %provider.name(), "Dispatching tool call");
        let output = provider.invoke(&call.name, arguments.into_inner()).await?;

        Ok(match output.primary_text() {
            Some(text) => DispatchOutcome::Completed {
                text: text.to_string(),
                is_error: output.is_error,
            },
            None => DispatchOutcome::NoTextContent,
        })
    }

    /// Release every provider. Only the first call has any effect.
    ///
    /// A provider that fails to close is logged and skipped.
    pub async fn close_all(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for provider in &self.providers {
            if let Err(e) = provider.close().await {
                warn!(provider = %provider.name(), error = %e, "Failed to close tool provider");
            }
        }
        debug!(providers = self.providers.len(), "Tool providers released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::resolve_arguments;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use toolrelay_core::tool::{ToolContent, ToolOutput};

    struct FakeProvider {
        name: String,
        tools: Vec<&'static str>,
        output: ToolOutput,
        fail_close: bool,
        fail_list: bool,
        closes: AtomicUsize,
        calls: Mutex<Vec<(String, Map<String, Value>)>>,
    }

    impl FakeProvider {
        fn new(name: &str, tools: Vec<&'static str>) -> Self {
            Self {
                name: name.into(),
                tools,
                output: ToolOutput::text(format!("from {name}")),
                fail_close: false,
                fail_list: false,
                closes: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ToolProvider for FakeProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
            if self.fail_list {
                return Err(ToolError::Transport {
                    provider: self.name.clone(),
                    reason: "not initialized".into(),
                });
            }
            Ok(self
                .tools
                .iter()
                .map(|t| ToolDescriptor::new(*t, "", serde_json::json!({"type": "object"})))
                .collect())
        }

        async fn invoke(
            &self,
            tool_name: &str,
            arguments: Map<String, Value>,
        ) -> Result<ToolOutput, ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push((tool_name.to_string(), arguments));
            Ok(self.output.clone())
        }

        async fn close(&self) -> Result<(), ToolError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(ToolError::Transport {
                    provider: self.name.clone(),
                    reason: "already gone".into(),
                });
            }
            Ok(())
        }
    }

    fn call(name: &str) -> MessageToolCall {
        MessageToolCall {
            id: format!("call_{name}"),
            name: name.into(),
            arguments: "{}".into(),
        }
    }

    #[tokio::test]
    async fn first_registered_provider_wins() {
        let a = Arc::new(FakeProvider::new("a", vec!["search", "read"]));
        let b = Arc::new(FakeProvider::new("b", vec!["read", "write"]));
        let dispatcher = ToolDispatcher::connect(vec![a.clone(), b.clone()]).await.unwrap();

        assert_eq!(dispatcher.resolve("read").unwrap().name(), "a");
        assert_eq!(dispatcher.resolve("write").unwrap().name(), "b");

        let names: Vec<String> = dispatcher.definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["search", "read", "read", "write"]);

        let outcome = dispatcher
            .dispatch(&call("read"), resolve_arguments(r#"{"p":1}"#).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.into_text(), "from a");
        assert_eq!(a.calls.lock().unwrap()[0].1["p"], 1);
        assert!(b.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_unavailable() {
        let dispatcher = ToolDispatcher::connect(vec![Arc::new(FakeProvider::new("a", vec!["x"]))])
            .await
            .unwrap();
        let outcome = dispatcher
            .dispatch(&call("nope"), ToolArguments::default())
            .await
            .unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.into_text(), "Tool not found: nope");
    }

    #[tokio::test]
    async fn output_without_text_gets_placeholder() {
        let mut provider = FakeProvider::new("img", vec!["screenshot"]);
        provider.output = ToolOutput {
            content: vec![ToolContent::Image {
                data: "AAAA".into(),
                mime_type: "image/png".into(),
            }],
            is_error: false,
        };
        let dispatcher = ToolDispatcher::connect(vec![Arc::new(provider)]).await.unwrap();

        let outcome = dispatcher
            .dispatch(&call("screenshot"), ToolArguments::default())
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::NoTextContent);
        assert_eq!(outcome.into_text(), "Tool returned no text content");
    }

    #[tokio::test]
    async fn tool_reported_error_is_not_success() {
        let mut provider = FakeProvider::new("fs", vec!["read"]);
        provider.output = ToolOutput {
            is_error: true,
            ..ToolOutput::text("ENOENT")
        };
        let dispatcher = ToolDispatcher::connect(vec![Arc::new(provider)]).await.unwrap();
        let outcome = dispatcher
            .dispatch(&call("read"), ToolArguments::default())
            .await
            .unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.into_text(), "ENOENT");
    }

    #[tokio::test]
    async fn close_all_is_idempotent_and_survives_failures() {
        let mut failing = FakeProvider::new("a", vec![]);
        failing.fail_close = true;
        let a = Arc::new(failing);
        let b = Arc::new(FakeProvider::new("b", vec![]));
        let dispatcher = ToolDispatcher::connect(vec![a.clone(), b.clone()]).await.unwrap();

        dispatcher.close_all().await;
        dispatcher.close_all().await;

        assert!(dispatcher.is_closed());
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_listing_releases_everything() {
        let a = Arc::new(FakeProvider::new("a", vec!["x"]));
        let mut broken = FakeProvider::new("b", vec![]);
        broken.fail_list = true;
        let b = Arc::new(broken);

        let result = ToolDispatcher::connect(vec![a.clone(), b.clone()]).await;
        assert!(matches!(result, Err(ToolError::Transport { .. })));
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);
    }
}
