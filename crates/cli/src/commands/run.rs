//! `toolrelay run`: one task, start to finish.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use toolrelay_agent::{AgentLoop, ArgumentErrorPolicy, ToolDispatcher};
use toolrelay_config::{AppConfig, ArgumentErrorMode};
use toolrelay_core::message::MessageToolCall;
use toolrelay_core::observer::AgentObserver;
use toolrelay_core::provider::CompletionService;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// The task prompt (read from stdin when omitted)
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// System prompt (overrides `system_prompt` in config)
    #[arg(short, long)]
    pub system: Option<String>,

    /// Model identifier (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Maximum number of rounds before giving up
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Echo the model's text to stdout as it streams
    #[arg(long)]
    pub stream: bool,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = super::load_config()?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(max_rounds) = args.max_rounds {
        config.agent.max_rounds = max_rounds;
    }
    config.validate()?;

    let service = toolrelay_providers::build_from_config(&config).with_context(|| {
        format!(
            "Add api_key to {} or set OPENAI_API_KEY",
            AppConfig::config_dir().join("config.toml").display()
        )
    })?;

    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => read_prompt().await?,
    };
    if prompt.trim().is_empty() {
        bail!("Nothing to do: the prompt is empty");
    }

    let dispatcher = super::connect_tools(&config).await?;
    let observer = Arc::new(ConsoleObserver { stream: args.stream });
    let agent = build_agent(&config, Arc::new(service), dispatcher, observer);

    let system = args.system.or_else(|| config.system_prompt.clone());
    let (result, conversation) = agent.run_task(system.as_deref(), &prompt).await;
    let answer = result.with_context(|| {
        format!("Task stopped after {} messages", conversation.len())
    })?;

    if args.stream {
        println!();
    } else {
        println!("{answer}");
    }
    Ok(())
}

/// Configure a loop from the `[agent]` settings.
pub fn build_agent(
    config: &AppConfig,
    service: Arc<dyn CompletionService>,
    dispatcher: ToolDispatcher,
    observer: Arc<dyn AgentObserver>,
) -> AgentLoop {
    let settings = &config.agent;
    let mut agent = AgentLoop::new(service, dispatcher, config.model.clone(), observer)
        .with_max_rounds(settings.max_rounds)
        .with_argument_errors(argument_policy(settings.argument_errors));

    if let Some(temperature) = config.temperature {
        agent = agent.with_temperature(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        agent = agent.with_max_tokens(max_tokens);
    }
    if settings.round_timeout_secs > 0 {
        agent = agent.with_round_timeout(Duration::from_secs(settings.round_timeout_secs));
    }
    if settings.tool_timeout_secs > 0 {
        agent = agent.with_tool_timeout(Duration::from_secs(settings.tool_timeout_secs));
    }
    agent
}

fn argument_policy(mode: ArgumentErrorMode) -> ArgumentErrorPolicy {
    match mode {
        ArgumentErrorMode::Abort => ArgumentErrorPolicy::Abort,
        ArgumentErrorMode::Report => ArgumentErrorPolicy::Report,
    }
}

async fn read_prompt() -> anyhow::Result<String> {
    eprint!("Task > ");
    std::io::stderr().flush()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines
        .next_line()
        .await
        .context("Failed to read prompt from stdin")?;
    Ok(line.unwrap_or_default())
}

/// Shows tool activity on stderr, and optionally the streamed text on stdout.
struct ConsoleObserver {
    stream: bool,
}

impl AgentObserver for ConsoleObserver {
    fn text_delta(&self, delta: &str) {
        if self.stream {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
    }

    fn tool_call(&self, call: &MessageToolCall) {
        eprintln!("  → {} {}", call.name, call.arguments);
    }

    fn tool_result(&self, call: &MessageToolCall, content: &str, success: bool) {
        let status = if success { "ok" } else { "failed" };
        eprintln!("  ← {} {status} ({} chars)", call.name, content.chars().count());
    }
}
