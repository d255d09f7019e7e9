use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::OutputConfig;
use crate::config::{Config, HooksConfig};
use crate::journal;
use crate::pipeline::{self, HookInput, Outcome};
use crate::router::RouterClient;
use crate::session::SessionStore;

/// Prefix shared by every command this tool installs.
const HOOK_COMMAND_PREFIX: &str = "reflex-context hook ";

#[derive(Args)]
pub struct HookArgs {
    #[command(subcommand)]
    command: HookCommands,
}

#[derive(Subcommand)]
enum HookCommands {
    /// Install Claude Code hooks into settings.json
    Install(InstallArgs),

    /// Remove reflex hooks from Claude Code settings
    Uninstall(UninstallArgs),

    /// Show installed hooks, config and session state
    Status(StatusArgs),

    /// Handle UserPromptSubmit events (internal, called by Claude Code)
    InjectContext(InjectContextArgs),

    /// Handle SessionStart/SessionEnd events (internal, called by Claude Code)
    SessionCleanup(SessionCleanupArgs),
}

#[derive(Args)]
struct InstallArgs {
    /// Install globally (~/.claude/settings.json) instead of project-local
    #[arg(long)]
    global: bool,
}

#[derive(Args)]
struct UninstallArgs {
    /// Uninstall from global settings instead of project-local
    #[arg(long)]
    global: bool,
}

#[derive(Args)]
struct StatusArgs {
    /// Directory to check (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,
}

#[derive(Args)]
struct InjectContextArgs {}

#[derive(Args)]
struct SessionCleanupArgs {}

#[derive(Serialize)]
struct HookStatusOutput {
    hooks_installed: bool,
    config: HooksConfig,
    router: String,
    registry_mode: String,
    session_count: usize,
    journal_entries: usize,
    last_activity: Option<String>,
}

pub async fn run(args: HookArgs, output: OutputConfig) -> Result<()> {
    match args.command {
        HookCommands::Install(a) => run_install(&a, output),
        HookCommands::Uninstall(a) => run_uninstall(&a, output),
        HookCommands::Status(a) => run_status(&a, output),
        HookCommands::InjectContext(a) => run_inject_context(a, output).await,
        HookCommands::SessionCleanup(a) => run_session_cleanup(a, output),
    }
}

/// Resolve the target settings.json path.
/// --global → ~/.claude/settings.json
/// otherwise → <git-root>/.claude/settings.json
fn resolve_settings_path(global: bool) -> Result<PathBuf> {
    if global {
        let home = std::env::var("HOME").context("HOME not set")?;
        Ok(PathBuf::from(home).join(".claude").join("settings.json"))
    } else {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .context("Failed to run git rev-parse")?;
        if !output.status.success() {
            anyhow::bail!("Not in a git repository. Use --global or run from a git repo.");
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(PathBuf::from(root).join(".claude").join("settings.json"))
    }
}

/// Hook groups this tool owns, keyed by event name.
fn reflex_hook_entries() -> Vec<(&'static str, serde_json::Value)> {
    let cleanup = json!({
        "hooks": [
            {
                "type": "command",
                "command": "reflex-context hook session-cleanup",
                "timeout": 5
            }
        ]
    });
    vec![
        (
            "UserPromptSubmit",
            json!({
                "hooks": [
                    {
                        "type": "command",
                        "command": "reflex-context hook inject-context",
                        "timeout": 20,
                        "statusMessage": "Routing project docs..."
                    }
                ]
            }),
        ),
        ("SessionStart", cleanup.clone()),
        ("SessionEnd", cleanup),
    ]
}

/// Check if a hook group entry contains a reflex command.
fn is_reflex_hook_group(group: &serde_json::Value) -> bool {
    group
        .get("hooks")
        .and_then(|h| h.as_array())
        .is_some_and(|hooks| {
            hooks.iter().any(|h| {
                h.get("command")
                    .and_then(|c| c.as_str())
                    .is_some_and(|c| c.starts_with(HOOK_COMMAND_PREFIX))
            })
        })
}

/// Merge reflex hooks into an existing settings object.
/// Preserves non-reflex hooks in each event array.
fn merge_hooks(settings: &mut serde_json::Value) {
    if !settings.is_object() {
        *settings = json!({});
    }
    if !settings.get("hooks").is_some_and(serde_json::Value::is_object) {
        settings["hooks"] = json!({});
    }

    for (event_name, group) in reflex_hook_entries() {
        let slot = &mut settings["hooks"][event_name];
        match slot.as_array_mut() {
            Some(arr) => {
                // Drop old reflex entries, then append the current one
                arr.retain(|entry| !is_reflex_hook_group(entry));
                arr.push(group);
            }
            None => *slot = json!([group]),
        }
    }
}

/// Remove reflex hooks from a settings object.
/// Returns true if any hooks were removed.
fn remove_reflex_hooks(settings: &mut serde_json::Value) -> bool {
    let mut removed = false;
    let Some(obj) = settings.as_object_mut() else {
        return false;
    };
    if let Some(hooks) = obj.get_mut("hooks").and_then(|h| h.as_object_mut()) {
        for entries in hooks.values_mut() {
            if let Some(arr) = entries.as_array_mut() {
                let before = arr.len();
                arr.retain(|entry| !is_reflex_hook_group(entry));
                removed |= arr.len() < before;
            }
        }
        // Clean up empty event arrays
        hooks.retain(|_, v| v.as_array().map_or(true, |a| !a.is_empty()));
    }
    if obj
        .get("hooks")
        .and_then(|h| h.as_object())
        .is_some_and(serde_json::Map::is_empty)
    {
        obj.remove("hooks");
    }
    removed
}

/// Check whether reflex hooks are present in a settings.json Value.
fn has_reflex_hooks(settings: &serde_json::Value) -> bool {
    settings
        .get("hooks")
        .and_then(|h| h.as_object())
        .is_some_and(|hooks| {
            hooks
                .values()
                .filter_map(|entries| entries.as_array())
                .any(|arr| arr.iter().any(is_reflex_hook_group))
        })
}

/// Read a settings.json file, returning empty object if missing.
fn read_settings(path: &Path) -> Result<serde_json::Value> {
    if !path.exists() {
        return Ok(json!({}));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write settings.json, creating parent directories as needed.
fn write_settings(path: &Path, settings: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn run_install(args: &InstallArgs, output: OutputConfig) -> Result<()> {
    let settings_path = resolve_settings_path(args.global)?;

    let mut settings = read_settings(&settings_path)?;
    merge_hooks(&mut settings);
    write_settings(&settings_path, &settings)?;

    if output.json {
        let result = json!({
            "status": "installed",
            "path": settings_path.display().to_string(),
            "global": args.global,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !output.quiet {
        let scope = if args.global { "global" } else { "project" };
        println!("{} Reflex hooks installed ({})", "✓".green(), scope.cyan());
        println!("  Location: {}", settings_path.display().to_string().dimmed());
        println!("  UserPromptSubmit:        {}", "inject-context".cyan());
        println!("  SessionStart/SessionEnd: {}", "session-cleanup".cyan());
    }

    Ok(())
}

fn run_uninstall(args: &UninstallArgs, output: OutputConfig) -> Result<()> {
    let settings_path = resolve_settings_path(args.global)?;

    if !settings_path.exists() {
        if output.json {
            let result = json!({
                "status": "not_installed",
                "path": settings_path.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !output.quiet {
            println!("No hooks to remove ({})", settings_path.display());
        }
        return Ok(());
    }

    let mut settings = read_settings(&settings_path)?;
    let removed = remove_reflex_hooks(&mut settings);
    write_settings(&settings_path, &settings)?;

    if output.json {
        let result = json!({
            "status": if removed { "uninstalled" } else { "not_installed" },
            "path": settings_path.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !output.quiet {
        if removed {
            println!(
                "{} Reflex hooks removed from {}",
                "✓".green(),
                settings_path.display()
            );
        } else {
            println!("No reflex hooks found in {}", settings_path.display());
        }
    }

    Ok(())
}

fn run_status(args: &StatusArgs, output: OutputConfig) -> Result<()> {
    let project_root = args
        .path
        .canonicalize()
        .with_context(|| format!("Invalid path: {}", args.path.display()))?;

    let config = Config::load_or_default(&project_root);

    let project_settings = project_root.join(".claude").join("settings.json");
    let hooks_installed = read_settings(&project_settings)
        .map(|s| has_reflex_hooks(&s))
        .unwrap_or(false);

    let router = RouterClient::from_config(&config.router);
    let session_count = SessionStore::for_project(&project_root).count();
    let entries = journal::read_all(&project_root);
    let last_activity = entries.last().map(|e| e.ts.clone());

    let status = HookStatusOutput {
        hooks_installed,
        config: config.hooks.clone(),
        router: router.program().display().to_string(),
        registry_mode: format!("{:?}", config.registry.mode).to_lowercase(),
        session_count,
        journal_entries: entries.len(),
        last_activity,
    };

    if output.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if !output.quiet {
        let hooks_cfg = &status.config;
        println!("{} Hook configuration", "⚡".bold());
        println!();
        println!("  Lookback:         {} turns", hooks_cfg.lookback.to_string().cyan());
        println!("  Noise threshold:  {} chars", hooks_cfg.noise_threshold.to_string().cyan());
        println!(
            "  Thinking turns:   {}",
            if hooks_cfg.include_thinking { "included".green() } else { "excluded".yellow() }
        );
        println!("  Clean on:         {}", hooks_cfg.clean_sources.join(", ").cyan());
        println!("  Registry mode:    {}", status.registry_mode.cyan());
        println!("  Router:           {}", status.router.cyan());
        println!();
        let hooks_str = if status.hooks_installed { "installed".green() } else { "not installed".yellow() };
        println!("  Claude Code hooks: {}", hooks_str);
        println!();
        println!("{} Activity", "📊".bold());
        println!();
        println!("  Sessions tracked: {}", status.session_count.to_string().cyan());
        println!("  Journal entries:  {}", status.journal_entries.to_string().cyan());
        match &status.last_activity {
            Some(ts) => println!("  Last activity:    {}", ts.cyan()),
            None => println!("  Last activity:    {}", "never".dimmed()),
        }
    }

    Ok(())
}

async fn run_inject_context(_args: InjectContextArgs, _output: OutputConfig) -> Result<()> {
    // Never block user prompts: any error exits silently
    match inject_context_inner().await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("reflex-context inject-context: {:#}", e);
            Ok(())
        }
    }
}

/// Hook response envelope understood by Claude Code.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HookResponse {
    hook_specific_output: HookSpecificOutput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HookSpecificOutput {
    hook_event_name: String,
    additional_context: String,
}

fn read_hook_input() -> Result<HookInput> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("Failed to read stdin")?;
    serde_json::from_str(&raw).context("Failed to parse stdin JSON")
}

async fn inject_context_inner() -> Result<()> {
    let started = std::time::Instant::now();

    let input = read_hook_input()?;
    let project_root = input.project_root();
    let config = Config::load_or_default(&project_root);
    let router = RouterClient::from_config(&config.router);

    let invocation = pipeline::inject_context(&input, &project_root, &config, &router).await;
    tracing::debug!(outcome = ?invocation.outcome, session = %invocation.session_key, "hook done");

    if config.hooks.journal && invocation.should_journal() {
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        journal::append(&project_root, &journal::entry(&invocation, elapsed));
    }

    if let Outcome::Injected(injection) = &invocation.outcome {
        let response = HookResponse {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: pipeline::PROMPT_EVENT.to_string(),
                additional_context: injection.directive(),
            },
        };
        println!("{}", serde_json::to_string(&response)?);
    }

    Ok(())
}

fn run_session_cleanup(_args: SessionCleanupArgs, _output: OutputConfig) -> Result<()> {
    // Never block session start or exit
    match session_cleanup_inner() {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("reflex-context session-cleanup: {:#}", e);
            Ok(())
        }
    }
}

/// Whether a lifecycle event should wipe injection history.
///
/// `compact` keeps state so docs already in the summary are not re-injected.
fn should_clean(event: &str, source: &str, clean_sources: &[String]) -> bool {
    match event {
        "SessionEnd" => true,
        "SessionStart" => clean_sources.iter().any(|s| s == source),
        _ => false,
    }
}

fn session_cleanup_inner() -> Result<()> {
    let input = read_hook_input()?;
    let project_root = input.project_root();
    let config = Config::load_or_default(&project_root);

    if !should_clean(&input.hook_event_name, &input.source, &config.hooks.clean_sources) {
        tracing::debug!(
            "keeping session state for {} ({})",
            input.hook_event_name,
            input.source
        );
        return Ok(());
    }

    let store = SessionStore::for_project(&project_root);
    store.delete_all()?;
    tracing::debug!("cleared session state in {}", store.dir().display());
    Ok(())
}
