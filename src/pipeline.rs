//! One `UserPromptSubmit` invocation, end to end.
//!
//! registry → transcript window → session state → router → state update.
//! Nothing here returns an error: every degraded path ends in
//! [`Outcome::Skipped`] so the caller only has to decide what to print.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::registry;
use crate::router::{Router, RoutingRequest};
use crate::session::{self, SessionStore};
use crate::transcript::{self, WindowOptions};

/// The only hook event that triggers injection.
pub const PROMPT_EVENT: &str = "UserPromptSubmit";

/// Env var the host sets to the project directory.
pub const PROJECT_DIR_ENV: &str = "CLAUDE_PROJECT_DIR";

/// Hook payload read from stdin (subset of fields we need).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub hook_event_name: String,
    /// The prompt being submitted
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub session_id: String,
    /// JSONL transcript of the conversation so far
    #[serde(default)]
    pub transcript_path: String,
    /// SessionStart trigger: startup, resume, clear or compact
    #[serde(default)]
    pub source: String,
}

impl HookInput {
    pub fn session_key(&self) -> String {
        session::session_key(&self.transcript_path, &self.session_id)
    }

    /// Project root: `cwd` from the payload, then `CLAUDE_PROJECT_DIR`, then the process cwd.
    pub fn project_root(&self) -> PathBuf {
        resolve_project_root(&self.cwd, std::env::var(PROJECT_DIR_ENV).ok().as_deref())
    }
}

pub fn resolve_project_root(cwd: &str, project_dir_env: Option<&str>) -> PathBuf {
    [Some(cwd), project_dir_env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    WrongEvent,
    EmptyRegistry,
    NothingRelevant,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WrongEvent => "wrong_event",
            Self::EmptyRegistry => "empty_registry",
            Self::NothingRelevant => "nothing_relevant",
        }
    }
}

/// Docs and skills chosen for this turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Injection {
    pub docs: Vec<String>,
    pub skills: Vec<String>,
}

impl Injection {
    /// Directive text, one line per non-empty category.
    pub fn directive(&self) -> String {
        let mut lines = Vec::new();
        if !self.docs.is_empty() {
            lines.push(format!("Read before responding: {}", self.docs.join(", ")));
        }
        if !self.skills.is_empty() {
            let skills: Vec<String> = self.skills.iter().map(|s| format!("/{s}")).collect();
            lines.push(format!("Use skill: {}", skills.join(", ")));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    Injected(Injection),
}

/// Outcome plus the numbers worth journaling.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub outcome: Outcome,
    pub session_key: String,
    pub message_count: usize,
    pub registry_size: usize,
}

impl Invocation {
    fn skipped(reason: SkipReason, session_key: String) -> Self {
        Self {
            outcome: Outcome::Skipped(reason),
            session_key,
            message_count: 0,
            registry_size: 0,
        }
    }

    /// Runs that stop before routing leave no trace on disk.
    pub fn should_journal(&self) -> bool {
        !matches!(
            self.outcome,
            Outcome::Skipped(SkipReason::WrongEvent | SkipReason::EmptyRegistry)
        )
    }
}

/// Run the injection pipeline for one prompt.
pub async fn inject_context<R: Router>(
    input: &HookInput,
    project_root: &Path,
    config: &Config,
    router: &R,
) -> Invocation {
    let session_key = input.session_key();

    if input.hook_event_name != PROMPT_EVENT {
        tracing::debug!("ignoring event {:?}", input.hook_event_name);
        return Invocation::skipped(SkipReason::WrongEvent, session_key);
    }

    let registry = registry::build(project_root, &config.registry);
    if registry.is_empty() {
        tracing::debug!("no routable docs or skills under {}", project_root.display());
        return Invocation::skipped(SkipReason::EmptyRegistry, session_key);
    }
    let registry_size = registry.len();

    let opts = WindowOptions::from(&config.hooks);
    let mut messages = if input.transcript_path.trim().is_empty() {
        Vec::new()
    } else {
        transcript::build_window(Path::new(&input.transcript_path), &opts)
    };
    if let Some(turn) = opts.user_turn(&input.prompt) {
        messages.push(turn);
    }
    let message_count = messages.len();

    let store = SessionStore::for_project(project_root);
    let mut state = store.load(&session_key);

    let request = RoutingRequest {
        messages,
        registry,
        session: state.clone(),
        metadata: serde_json::Map::new(),
    };
    let response = router.route(&request).await.restrict_to(&request.registry);

    let mut invocation = Invocation {
        outcome: Outcome::Skipped(SkipReason::NothingRelevant),
        session_key,
        message_count,
        registry_size,
    };
    if response.is_empty() {
        return invocation;
    }

    if state.merge(&response) {
        if let Err(e) = store.save(&invocation.session_key, &state) {
            tracing::warn!("failed to save session state: {:#}", e);
        }
    }

    invocation.outcome = Outcome::Injected(Injection {
        docs: response.docs,
        skills: response.skills,
    });
    invocation
}
