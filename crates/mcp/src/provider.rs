//! `ToolProvider` implementation backed by an MCP server on stdio.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use toolrelay_config::McpServerConfig;
use toolrelay_core::error::ToolError;
use toolrelay_core::tool::{ToolDescriptor, ToolOutput, ToolProvider};

use crate::connection::{McpConnection, McpError};
use crate::protocol::{InitializeResult, ServerInfo, ToolsListResult, initialize_params};

const CLIENT_NAME: &str = "toolrelay";
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on `tools/list` pages, in case a server keeps returning a cursor.
const MAX_LIST_PAGES: usize = 64;

/// One MCP server, connected and initialized.
///
/// The tool list is fetched once during the handshake and served from
/// memory afterwards.
pub struct McpStdioProvider {
    name: String,
    connection: McpConnection,
    child: Mutex<Option<Child>>,
    tools: Vec<ToolDescriptor>,
    server_info: ServerInfo,
}

impl McpStdioProvider {
    /// Launch the configured command and complete the MCP handshake.
    pub async fn spawn(config: &McpServerConfig) -> Result<Self, ToolError> {
        info!(server = %config.name, command = %config.command, "Starting MCP server");

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Transport {
                provider: config.name.clone(),
                reason: format!("failed to launch '{}': {e}", config.command),
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ToolError::Transport {
                provider: config.name.clone(),
                reason: "child process has no stdio pipes".into(),
            });
        };

        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let mut provider = Self::connect(&config.name, stdout, stdin, timeout).await?;
        provider.child = Mutex::new(Some(child));
        Ok(provider)
    }

    /// Handshake over an already-open pair of streams.
    pub async fn connect<R, W>(
        name: &str,
        reader: R,
        writer: W,
        request_timeout: Duration,
    ) -> Result<Self, ToolError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let connection = McpConnection::new(name, reader, writer, request_timeout);

        match handshake(&connection).await {
            Ok((server_info, tools)) => {
                info!(
                    server = %name,
                    remote = %server_info.name,
                    tools = tools.len(),
                    "MCP server ready"
                );
                Ok(Self {
                    name: name.to_string(),
                    connection,
                    child: Mutex::new(None),
                    tools,
                    server_info,
                })
            }
            Err(e) => {
                connection.shutdown().await;
                Err(to_tool_error(name, None, e))
            }
        }
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

async fn handshake(
    connection: &McpConnection,
) -> Result<(ServerInfo, Vec<ToolDescriptor>), McpError> {
    let init = connection
        .request(
            "initialize",
            Some(initialize_params(CLIENT_NAME, env!("CARGO_PKG_VERSION"))),
        )
        .await?;
    let init: InitializeResult = parse_result("initialize", init)?;
    debug!(
        server = %connection.name(),
        protocol = %init.protocol_version,
        "Initialized"
    );

    connection.notify("notifications/initialized", None).await?;

    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_LIST_PAGES {
        let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
        let page: ToolsListResult =
            parse_result("tools/list", connection.request("tools/list", params).await?)?;
        tools.extend(page.tools);

        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    Ok((init.server_info.unwrap_or_default(), tools))
}

fn parse_result<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T, McpError> {
    serde_json::from_value(value).map_err(|e| McpError::Protocol {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

fn to_tool_error(provider: &str, tool: Option<&str>, err: McpError) -> ToolError {
    match err {
        McpError::Rpc { code, message } => ToolError::ExecutionFailed {
            tool_name: tool.unwrap_or(provider).to_string(),
            reason: format!("{message} (code {code})"),
        },
        McpError::Timeout { limit, .. } => ToolError::Timeout {
            tool_name: tool.unwrap_or(provider).to_string(),
            limit,
        },
        other => ToolError::Transport {
            provider: provider.to_string(),
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl ToolProvider for McpStdioProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError> {
        Ok(self.tools.clone())
    }

    async fn invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> std::result::Result<ToolOutput, ToolError> {
        debug!(server = %self.name, tool = %tool_name, "Calling MCP tool");

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": Value::Object(arguments),
        });
        let result = self
            .connection
            .request("tools/call", Some(params))
            .await
            .map_err(|e| to_tool_error(&self.name, Some(tool_name), e))?;

        parse_result("tools/call", result).map_err(|e| to_tool_error(&self.name, Some(tool_name), e))
    }

    async fn close(&self) -> std::result::Result<(), ToolError> {
        self.connection.shutdown().await;

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(CHILD_EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %self.name, %status, "MCP server exited");
                Ok(())
            }
            Ok(Err(e)) => Err(ToolError::Transport {
                provider: self.name.clone(),
                reason: format!("waiting for exit: {e}"),
            }),
            Err(_) => {
                warn!(server = %self.name, "MCP server did not exit, killing it");
                child.kill().await.map_err(|e| ToolError::Transport {
                    provider: self.name.clone(),
                    reason: format!("kill failed: {e}"),
                })
            }
        }
    }
}
