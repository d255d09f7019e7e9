//! Per-session injection history.
//!
//! One JSON file per session key under `.reflex/.state/`. Loading never
//! fails; saving goes through a temp file and a rename so a crash mid-write
//! can only lose the update in flight.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::router::RoutingResponse;

/// Key used when neither a transcript path nor a session id is available.
pub const DEFAULT_SESSION_KEY: &str = "default";

/// What has already been injected this session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub docs_read: BTreeSet<String>,
    #[serde(default)]
    pub skills_used: BTreeSet<String>,
}

impl SessionState {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.docs_read.is_empty() && self.skills_used.is_empty()
    }

    /// Union the routed identifiers into the history. Returns true if anything was new.
    pub fn merge(&mut self, response: &RoutingResponse) -> bool {
        let mut changed = false;
        for doc in &response.docs {
            changed |= self.docs_read.insert(doc.clone());
        }
        for skill in &response.skills {
            changed |= self.skills_used.insert(skill.clone());
        }
        changed
    }
}

/// Derive a stable session key.
///
/// Preference: transcript file stem, then the hook's session id, then
/// [`DEFAULT_SESSION_KEY`]. The result is always safe to use as a filename.
pub fn session_key(transcript_path: &str, session_id: &str) -> String {
    let stem = Path::new(transcript_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let raw = [stem, session_id.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION_KEY);
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File-backed key-value store of [`SessionState`]s.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the project's `.reflex/.state/`.
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(crate::config::Config::state_dir(project_root))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Load the state for `key`. Missing or corrupt files yield an empty state.
    pub fn load(&self, key: &str) -> SessionState {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return SessionState::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("discarding corrupt session state {}: {}", path.display(), e);
            SessionState::default()
        })
    }

    /// Persist the state for `key`, replacing any previous file.
    pub fn save(&self, key: &str, state: &SessionState) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory {}", self.dir.display()))?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        let json = serde_json::to_string(state).context("Failed to serialize session state")?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))
    }

    /// Remove every session's state. Succeeds if nothing was there.
    pub fn delete_all(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove state directory {}", self.dir.display())),
        }
    }

    /// Number of stored session files.
    pub fn count(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
                    .count()
            })
            .unwrap_or(0)
    }
}
