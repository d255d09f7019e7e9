use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::OutputConfig;
use crate::config::Config;

/// Runtime files that should never be committed.
const GITIGNORE_ENTRIES: &[&str] = &[".reflex/.state/", ".reflex/hook_log.jsonl"];

#[derive(Args)]
pub struct InitArgs {
    /// Directory to initialize (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Overwrite existing configuration
    #[arg(long)]
    force: bool,
}

#[derive(Serialize)]
struct InitOutput {
    status: String,
    path: String,
    config: String,
    gitignore_updated: bool,
}

pub async fn run(args: InitArgs, output: OutputConfig) -> Result<()> {
    let project_root = args
        .path
        .canonicalize()
        .with_context(|| format!("Invalid path: {}", args.path.display()))?;

    let data_dir = Config::data_dir(&project_root);
    let config_path = Config::config_path(&project_root);

    if config_path.exists() && !args.force {
        if output.json {
            let json_output = InitOutput {
                status: "already_initialized".to_string(),
                path: data_dir.display().to_string(),
                config: config_path.display().to_string(),
                gitignore_updated: false,
            };
            println!("{}", serde_json::to_string_pretty(&json_output)?);
            return Ok(());
        }
        bail!(
            "Reflex already initialized in {}. Use --force to reinitialize.",
            data_dir.display()
        );
    }

    Config::default().save(&config_path)?;

    if output.verbose && !output.quiet && !output.json {
        println!("  Creating config: {}", config_path.display());
    }

    let gitignore_updated = update_gitignore(&project_root)?;
    if gitignore_updated && output.verbose && !output.quiet && !output.json {
        println!("  Updated .gitignore");
    }

    if output.json {
        let json_output = InitOutput {
            status: "initialized".to_string(),
            path: data_dir.display().to_string(),
            config: config_path.display().to_string(),
            gitignore_updated,
        };
        println!("{}", serde_json::to_string_pretty(&json_output)?);
    } else if !output.quiet {
        println!("{} Reflex initialized in {}", "✓".green(), data_dir.display());
        println!("  Config: {}", config_path.display());
        println!("\nNext steps:");
        println!("  {} to see what can be routed", "reflex-context registry".cyan());
        println!("  {} to enable the hook", "reflex-context hook install".cyan());
    }

    Ok(())
}

/// Append the runtime entries to an existing `.gitignore`. Returns true if it changed.
fn update_gitignore(project_root: &Path) -> Result<bool> {
    let gitignore_path = project_root.join(".gitignore");
    if !gitignore_path.exists() {
        return Ok(false);
    }
    let content = std::fs::read_to_string(&gitignore_path)
        .with_context(|| format!("Failed to read {}", gitignore_path.display()))?;
    let missing: Vec<&str> = GITIGNORE_ENTRIES
        .iter()
        .copied()
        .filter(|entry| !content.lines().any(|l| l.trim() == *entry))
        .collect();
    if missing.is_empty() {
        return Ok(false);
    }

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&gitignore_path)
        .with_context(|| format!("Failed to open {}", gitignore_path.display()))?;
    writeln!(file, "\n# Reflex session state")?;
    for entry in missing {
        writeln!(file, "{entry}")?;
    }
    Ok(true)
}
