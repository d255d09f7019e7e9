use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::OutputConfig;
use crate::journal::{self, JournalEntry};

#[derive(Args)]
pub struct LogArgs {
    /// Number of most recent entries to show
    #[arg(long, short = 'n', default_value = "20")]
    last: usize,

    /// Project directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,
}

#[derive(Serialize)]
struct LogOutput {
    count: usize,
    entries: Vec<JournalEntry>,
}

pub async fn run(args: LogArgs, output: OutputConfig) -> Result<()> {
    let project_root = args
        .path
        .canonicalize()
        .with_context(|| format!("Invalid path: {}", args.path.display()))?;

    let entries = journal::read_last(&project_root, args.last);

    if output.json {
        let json_output = LogOutput {
            count: entries.len(),
            entries,
        };
        println!("{}", serde_json::to_string_pretty(&json_output)?);
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    if entries.is_empty() {
        println!("No hook activity recorded yet.");
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:<17} {:>4} {:>4} {:>7}  {}",
        "TIME".bold(),
        "SESSION".bold(),
        "STATUS".bold(),
        "MSGS".bold(),
        "REG".bold(),
        "MS".bold(),
        "ROUTED".bold()
    );
    for entry in &entries {
        print_row(entry);
    }

    Ok(())
}

fn print_row(entry: &JournalEntry) {
    let status = match (&entry.status[..], &entry.reason) {
        ("injected", _) => "injected".green(),
        (_, Some(reason)) => reason.as_str().yellow(),
        (other, None) => other.normal(),
    };
    let routed: Vec<String> = entry
        .docs
        .iter()
        .cloned()
        .chain(entry.skills.iter().map(|s| format!("/{s}")))
        .collect();
    println!(
        "{:<20} {:<12} {:<17} {:>4} {:>4} {:>7}  {}",
        short_time(&entry.ts),
        short_session(&entry.session),
        status,
        entry.message_count,
        entry.registry_size,
        entry.duration_ms,
        routed.join(", ").cyan()
    );
}

/// Render an RFC3339 stamp as local `YYYY-MM-DD HH:MM:SS`, or pass it through.
fn short_time(ts: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| ts.to_string())
}

fn short_session(session: &str) -> String {
    crate::transcript::truncate_chars(session, 12)
}
