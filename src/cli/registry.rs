use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::OutputConfig;
use crate::config::Config;
use crate::registry::{self, Registry, RoutableItem};

#[derive(Args)]
pub struct RegistryArgs {
    /// Project directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,
}

#[derive(Serialize)]
struct RegistryOutput<'a> {
    mode: String,
    count: usize,
    #[serde(flatten)]
    registry: &'a Registry,
}

pub async fn run(args: RegistryArgs, output: OutputConfig) -> Result<()> {
    let project_root = args
        .path
        .canonicalize()
        .with_context(|| format!("Invalid path: {}", args.path.display()))?;

    let config = Config::load_or_default(&project_root);
    let registry = registry::build(&project_root, &config.registry);
    let mode = format!("{:?}", config.registry.mode).to_lowercase();

    if output.json {
        let json_output = RegistryOutput {
            mode,
            count: registry.len(),
            registry: &registry,
        };
        println!("{}", serde_json::to_string_pretty(&json_output)?);
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    if registry.is_empty() {
        println!(
            "{} No routable docs or skills found ({} mode)",
            "!".yellow(),
            mode
        );
        println!(
            "  Add {} and {} frontmatter to markdown docs, or SKILL.md files under .claude/skills/",
            "summary".cyan(),
            "read_when".cyan()
        );
        return Ok(());
    }

    println!(
        "{} {} docs, {} skills ({} mode)",
        "✓".green(),
        registry.docs.len(),
        registry.skills.len(),
        mode
    );

    let mut section = "";
    for item in registry.items() {
        match item {
            RoutableItem::Doc(doc) => {
                if section != "docs" {
                    section = "docs";
                    println!("\n{}", "Docs".bold());
                }
                println!("  {} {}", doc.path.cyan(), doc.summary.dimmed());
                if output.verbose {
                    for when in &doc.read_when {
                        println!("      read when: {when}");
                    }
                }
            }
            RoutableItem::Skill(skill) => {
                if section != "skills" {
                    section = "skills";
                    println!("\n{}", "Skills".bold());
                }
                println!("  /{} {}", skill.name.cyan(), skill.description.dimmed());
                if output.verbose {
                    for when in &skill.use_when {
                        println!("      use when: {when}");
                    }
                }
            }
        }
    }

    Ok(())
}
