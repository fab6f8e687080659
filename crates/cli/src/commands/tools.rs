//! `toolrelay tools`: show what the configured servers offer.

use toolrelay_agent::ToolDispatcher;

pub async fn run(json: bool) -> anyhow::Result<()> {
    let config = super::load_config()?;
    if config.mcp_servers.is_empty() {
        eprintln!(
            "No MCP servers configured. Add [[mcp_servers]] entries to {}",
            toolrelay_config::AppConfig::config_dir()
                .join("config.toml")
                .display()
        );
        return Ok(());
    }

    let dispatcher = super::connect_tools(&config).await?;
    let listing = if json {
        render_json(&dispatcher)
    } else {
        Ok(render_table(&dispatcher))
    };
    dispatcher.close_all().await;

    println!("{}", listing?);
    Ok(())
}

fn render_json(dispatcher: &ToolDispatcher) -> anyhow::Result<String> {
    let tools: Vec<serde_json::Value> = dispatcher
        .catalog()
        .map(|(server, tool)| {
            serde_json::json!({
                "server": server,
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&tools)?)
}

fn render_table(dispatcher: &ToolDispatcher) -> String {
    let mut out = String::new();
    for (server, tool) in dispatcher.catalog() {
        // A later server's tool with a taken name is never called.
        let shadowed = dispatcher
            .resolve(&tool.name)
            .is_some_and(|owner| owner.name() != server);
        let marker = if shadowed { " (shadowed)" } else { "" };
        out.push_str(&format!("{server:<16} {}{marker}\n", tool.name));
        if !tool.description.is_empty() {
            out.push_str(&format!("{:<16}   {}\n", "", tool.description));
        }
    }
    out.trim_end().to_string()
}
