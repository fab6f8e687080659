pub mod init;
pub mod run;
pub mod tools;

use anyhow::Context;
use toolrelay_agent::ToolDispatcher;
use toolrelay_config::AppConfig;

/// Launch every configured MCP server and index their tools.
pub async fn connect_tools(config: &AppConfig) -> anyhow::Result<ToolDispatcher> {
    let providers = toolrelay_mcp::connect_all(&config.mcp_servers)
        .await
        .context("Failed to start MCP servers")?;
    let dispatcher = ToolDispatcher::connect(providers)
        .await
        .context("Failed to list tools")?;
    tracing::debug!(
        providers = dispatcher.provider_count(),
        tools = dispatcher.tool_count(),
        "Tools ready"
    );
    Ok(dispatcher)
}

/// Load the config file plus environment overrides.
pub fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().with_context(|| {
        format!(
            "Failed to load config from {}",
            AppConfig::config_dir().join("config.toml").display()
        )
    })
}
