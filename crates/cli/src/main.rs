//! ToolRelay CLI: the main entry point.
//!
//! Commands:
//! - `run`: Run one task against the configured model and MCP servers
//! - `tools`: List the tools the configured servers declare
//! - `init`: Write a default config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolrelay",
    about = "ToolRelay: stream a model's tool calls to MCP servers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single task to completion
    Run(commands::run::RunArgs),

    /// List the tools declared by the configured MCP servers
    Tools {
        /// Print the tool set as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the answer.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::Tools { json } => commands::tools::run(json).await?,
        Commands::Init { force } => commands::init::run(force)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "toolrelay",
            "-v",
            "run",
            "--prompt",
            "list my files",
            "--model",
            "kimi-k2-0905-preview",
            "--max-rounds",
            "5",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.prompt.as_deref(), Some("list my files"));
                assert_eq!(args.model.as_deref(), Some("kimi-k2-0905-preview"));
                assert_eq!(args.max_rounds, Some(5));
                assert!(args.system.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn prompt_is_optional() {
        let cli = Cli::try_parse_from(["toolrelay", "run"]).unwrap();
        assert!(matches!(cli.command, Commands::Run(ref args) if args.prompt.is_none()));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["toolrelay", "gateway"]).is_err());
    }
}
