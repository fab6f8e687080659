//! `toolrelay init`: write a starter config.

use std::path::{Path, PathBuf};

use anyhow::Context;
use toolrelay_config::AppConfig;

pub fn run(force: bool) -> anyhow::Result<()> {
    let dir = AppConfig::config_dir();
    match write_default_config(&dir, force)? {
        Some(path) => {
            println!("Created {}", path.display());
            println!("Next: add your API key and [[mcp_servers]] entries, then run `toolrelay run`.");
        }
        None => {
            println!(
                "Config already exists at {} (use --force to overwrite)",
                dir.join("config.toml").display()
            );
        }
    }
    Ok(())
}

/// Write `config.toml` under `dir`. Returns `None` if one exists and `force` is off.
pub fn write_default_config(dir: &Path, force: bool) -> anyhow::Result<Option<PathBuf>> {
    let path = dir.join("config.toml");
    if path.exists() && !force {
        return Ok(None);
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::write(&path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}
