//! Client for the external `reflex route` decision process.
//!
//! The router gets the routing request as JSON on stdin and answers with
//! `{"docs": [...], "skills": [...]}` on stdout. Every failure is typed as a
//! [`RouterError`] internally and collapsed to an empty response by
//! [`Router::route`], so the worst case for the hook is injecting nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::config::RouterConfig;
use crate::registry::Registry;
use crate::session::SessionState;
use crate::transcript::Turn;

/// Env var that names the router binary, overriding config.
pub const ROUTER_BIN_ENV: &str = "REFLEX_BIN";

/// Longest stderr excerpt kept in a failure report.
const STDERR_EXCERPT_CHARS: usize = 200;

/// Everything the router needs to make a decision.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingRequest {
    pub messages: Vec<Turn>,
    pub registry: Registry,
    pub session: SessionState,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Identifiers the router judged relevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingResponse {
    #[serde(default)]
    pub docs: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl RoutingResponse {
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty() && self.skills.is_empty()
    }

    /// Drop identifiers the registry doesn't know and duplicates, keeping router order.
    pub fn restrict_to(self, registry: &Registry) -> Self {
        fn keep(ids: Vec<String>, known: impl Fn(&str) -> bool) -> Vec<String> {
            let mut seen = HashSet::new();
            ids.into_iter()
                .filter(|id| {
                    if !known(id) {
                        tracing::debug!("router returned unknown id {:?}", id);
                        return false;
                    }
                    seen.insert(id.clone())
                })
                .collect()
        }
        Self {
            docs: keep(self.docs, |id| registry.has_doc(id)),
            skills: keep(self.skills, |id| registry.has_skill(id)),
        }
    }
}

/// Why a routing round trip produced no usable answer.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("router binary `{0}` not found (install it or set REFLEX_BIN)")]
    NotFound(String),

    #[error("failed to start router: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("router I/O failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("router timed out after {0:?}")]
    Timeout(Duration),

    #[error("router exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("router returned malformed output: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("failed to encode routing request: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A decision engine mapping conversation + registry to relevant items.
#[allow(async_fn_in_trait)]
pub trait Router {
    async fn try_route(&self, request: &RoutingRequest) -> Result<RoutingResponse, RouterError>;

    /// Route, degrading every failure to an empty response.
    async fn route(&self, request: &RoutingRequest) -> RoutingResponse {
        match self.try_route(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("route failed: {}", e);
                RoutingResponse::default()
            }
        }
    }
}

/// Runs the router as a child process.
#[derive(Debug, Clone)]
pub struct RouterClient {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl RouterClient {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Client for the configured router, honouring `REFLEX_BIN`.
    pub fn from_config(config: &RouterConfig) -> Self {
        let env_override = std::env::var(ROUTER_BIN_ENV).ok();
        let program = resolve_program(
            env_override.as_deref(),
            &config.command,
            std::env::var_os("PATH").as_deref(),
            home_dir().as_deref(),
        );
        Self::new(program, config.args.clone(), config.timeout())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Router for RouterClient {
    async fn try_route(&self, request: &RoutingRequest) -> Result<RoutingResponse, RouterError> {
        let payload = serde_json::to_vec(request).map_err(RouterError::Encode)?;

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    RouterError::NotFound(self.program.display().to_string())
                }
                _ => RouterError::Spawn(e),
            })?;

        tracing::debug!(program = %self.program.display(), bytes = payload.len(), "routing");

        let stdin = child.stdin.take();
        // Dropping the child on timeout kills it (kill_on_drop)
        let round_trip = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&payload).await {
                    // A router that exits without draining stdin may still answer
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    other => other.map_err(RouterError::Io)?,
                }
            }
            child.wait_with_output().await.map_err(RouterError::Io)
        };

        let output = tokio::time::timeout(self.timeout, round_trip)
            .await
            .map_err(|_| RouterError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RouterError::Failed {
                status: output.status.to_string(),
                stderr: crate::transcript::truncate_chars(stderr.trim(), STDERR_EXCERPT_CHARS),
            });
        }

        parse_response(&output.stdout)
    }
}

/// Parse router stdout into a response.
pub fn parse_response(stdout: &[u8]) -> Result<RoutingResponse, RouterError> {
    let text = String::from_utf8_lossy(stdout);
    serde_json::from_str(text.trim()).map_err(RouterError::Malformed)
}

/// Directories checked for a bare router command that isn't on `PATH`.
fn fallback_dirs(home: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = home {
        dirs.push(home.join("go").join("bin"));
        dirs.push(home.join(".local").join("bin"));
    }
    dirs.push(PathBuf::from("/opt/homebrew/bin"));
    dirs.push(PathBuf::from("/usr/local/bin"));
    dirs
}

/// Pick the router executable.
///
/// An explicit override wins. A configured command containing a path
/// separator is used as-is. A bare name is searched on `path_var`, then in a
/// few common install locations, and otherwise left bare so that spawning
/// reports it as not found.
pub fn resolve_program(
    env_override: Option<&str>,
    command: &str,
    path_var: Option<&std::ffi::OsStr>,
    home: Option<&Path>,
) -> PathBuf {
    if let Some(bin) = env_override.map(str::trim).filter(|b| !b.is_empty()) {
        return PathBuf::from(bin);
    }
    if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        return PathBuf::from(command);
    }
    let on_path = path_var
        .map(|p| std::env::split_paths(p).collect::<Vec<_>>())
        .unwrap_or_default();
    on_path
        .into_iter()
        .chain(fallback_dirs(home))
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(command))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}
