mod hook;
mod init;
mod log;
mod registry;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reflex-context")]
#[command(about = "Route relevant project docs and skills into agent prompts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Show detailed progress
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .reflex/config.toml
    Init(init::InitArgs),

    /// Claude Code hook handlers and installation
    Hook(hook::HookArgs),

    /// List the docs and skills the hook can route to
    Registry(registry::RegistryArgs),

    /// Show recent hook decisions
    Log(log::LogArgs),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let output = OutputConfig {
            json: self.json,
            quiet: self.quiet,
            verbose: self.verbose,
        };

        match self.command {
            Commands::Init(args) => init::run(args, output).await,
            Commands::Hook(args) => hook::run(args, output).await,
            Commands::Registry(args) => registry::run(args, output).await,
            Commands::Log(args) => log::run(args, output).await,
        }
    }
}

/// Output configuration passed to all commands
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
}
