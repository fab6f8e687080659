//! Model Context Protocol tool provider for ToolRelay.
//!
//! Launches an MCP server as a child process and talks newline-delimited
//! JSON-RPC 2.0 over its stdin/stdout. The resulting [`McpStdioProvider`]
//! implements `toolrelay_core::ToolProvider`, so the agent can route tool
//! calls to it without knowing about the transport.

pub mod connection;
pub mod protocol;
pub mod provider;

pub use connection::{McpConnection, McpError};
pub use provider::McpStdioProvider;

use std::future::Future;
use std::sync::Arc;

use toolrelay_config::McpServerConfig;
use toolrelay_core::error::ToolError;
use toolrelay_core::tool::ToolProvider;

/// Spawn and handshake every configured server, in configuration order.
///
/// If any server fails to start, the ones already running are closed
/// before the error is returned.
pub async fn connect_all(
    servers: &[McpServerConfig],
) -> Result<Vec<Arc<dyn ToolProvider>>, ToolError> {
    start_all(servers, |server| async move {
        McpStdioProvider::spawn(server)
            .await
            .map(|provider| Arc::new(provider) as Arc<dyn ToolProvider>)
    })
    .await
}

async fn start_all<'a, F, Fut>(
    servers: &'a [McpServerConfig],
    mut launch: F,
) -> Result<Vec<Arc<dyn ToolProvider>>, ToolError>
where
    F: FnMut(&'a McpServerConfig) -> Fut,
    Fut: Future<Output = Result<Arc<dyn ToolProvider>, ToolError>>,
{
    let mut providers: Vec<Arc<dyn ToolProvider>> = Vec::with_capacity(servers.len());

    for server in servers {
        match launch(server).await {
            Ok(provider) => providers.push(provider),
            Err(e) => {
                for started in &providers {
                    if let Err(close_err) = started.close().await {
                        tracing::warn!(provider = %started.name(), error = %close_err, "Close failed");
                    }
                }
                return Err(e);
            }
        }
    }

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use toolrelay_core::tool::{ToolDescriptor, ToolOutput};

    struct CountingProvider {
        name: String,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl ToolProvider for CountingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
            Ok(Vec::new())
        }

        async fn invoke(&self, _tool: &str, _args: Map<String, Value>) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(""))
        }

        async fn close(&self) -> Result<(), ToolError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn server(name: &str) -> McpServerConfig {
        McpServerConfig {
            name: name.into(),
            command: format!("{name}-server"),
            args: vec![],
            env: Default::default(),
            request_timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn failed_start_closes_servers_already_running() {
        let servers = vec![server("alpha"), server("beta"), server("gamma"), server("delta")];
        let started: Mutex<Vec<Arc<CountingProvider>>> = Mutex::new(Vec::new());
        let attempted = Mutex::new(Vec::new());

        let result = start_all(&servers, |config| {
            attempted.lock().unwrap().push(config.name.clone());
            let outcome = if config.name == "gamma" {
                Err(ToolError::Transport {
                    provider: config.name.clone(),
                    reason: "failed to launch".into(),
                })
            } else {
                let provider = Arc::new(CountingProvider {
                    name: config.name.clone(),
                    closes: AtomicUsize::new(0),
                });
                started.lock().unwrap().push(provider.clone());
                Ok(provider as Arc<dyn ToolProvider>)
            };
            async move { outcome }
        })
        .await;

        match result {
            Err(ToolError::Transport { provider, .. }) => assert_eq!(provider, "gamma"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("start should fail"),
        }
        assert_eq!(*attempted.lock().unwrap(), vec!["alpha", "beta", "gamma"]);

        let started = started.lock().unwrap();
        assert_eq!(started.len(), 2);
        for provider in started.iter() {
            assert_eq!(provider.closes.load(Ordering::SeqCst), 1, "{}", provider.name);
        }
    }

    #[tokio::test]
    async fn all_servers_start_in_configuration_order() {
        let servers = vec![server("alpha"), server("beta")];
        let providers = start_all(&servers, |config| {
            let provider: Arc<dyn ToolProvider> = Arc::new(CountingProvider {
                name: config.name.clone(),
                closes: AtomicUsize::new(0),
            });
            async move { Ok(provider) }
        })
        .await
        .unwrap();

        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn no_servers_means_no_providers() {
        assert!(connect_all(&[]).await.unwrap().is_empty());
    }
}
