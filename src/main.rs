use anyhow::Result;
use clap::Parser;

mod cli;
mod config;
mod frontmatter;
mod journal;
mod pipeline;
mod registry;
mod router;
mod session;
mod transcript;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to hook directives; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    cli.run().await
}
