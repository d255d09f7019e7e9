use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::pipeline::{Invocation, Outcome};

/// Rewrite the journal once it grows past this many bytes.
const MAX_JOURNAL_BYTES: u64 = 500 * 1024;

/// Entries kept when the journal is rewritten.
const KEEP_ENTRIES: usize = 500;

/// One hook decision, written to `.reflex/hook_log.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// RFC3339 timestamp
    pub ts: String,
    pub session: String,
    /// "injected" or "skipped"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub registry_size: usize,
    #[serde(default)]
    pub docs: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

/// Create a journal entry for a finished invocation, stamped now.
pub fn entry(invocation: &Invocation, duration_ms: u64) -> JournalEntry {
    let (status, reason, docs, skills) = match &invocation.outcome {
        Outcome::Injected(i) => ("injected", None, i.docs.clone(), i.skills.clone()),
        Outcome::Skipped(r) => ("skipped", Some(r.as_str().to_string()), Vec::new(), Vec::new()),
    };
    JournalEntry {
        ts: chrono::Utc::now().to_rfc3339(),
        session: invocation.session_key.clone(),
        status: status.to_string(),
        reason,
        message_count: invocation.message_count,
        registry_size: invocation.registry_size,
        docs,
        skills,
        duration_ms,
    }
}

/// Append an entry to the project journal.
///
/// Best-effort: I/O errors are logged at debug level and otherwise ignored.
pub fn append(project_root: &Path, entry: &JournalEntry) {
    let path = Config::journal_path(project_root);

    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let Ok(line) = serde_json::to_string(entry) else {
        return;
    };

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{}", line) {
                tracing::debug!("journal append failed: {}", e);
                return;
            }
        }
        Err(e) => {
            tracing::debug!("cannot open journal {}: {}", path.display(), e);
            return;
        }
    }

    rotate(&path, MAX_JOURNAL_BYTES, KEEP_ENTRIES);
}

/// Shrink the file at `path` to its last `keep` lines once it exceeds `max_bytes`.
fn rotate(path: &Path, max_bytes: u64, keep: usize) {
    let too_big = std::fs::metadata(path)
        .map(|m| m.len() > max_bytes)
        .unwrap_or(false);
    if !too_big {
        return;
    }
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = &lines[lines.len().saturating_sub(keep)..];
    let mut rewritten = tail.join("\n");
    rewritten.push('\n');
    if let Err(e) = std::fs::write(path, rewritten) {
        tracing::debug!("journal rotation failed: {}", e);
    }
}

/// Read all journal entries, oldest first. Unparseable lines are skipped.
pub fn read_all(project_root: &Path) -> Vec<JournalEntry> {
    let Ok(content) = std::fs::read_to_string(Config::journal_path(project_root)) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}

/// The most recent `n` entries, oldest first.
pub fn read_last(project_root: &Path, n: usize) -> Vec<JournalEntry> {
    let mut all = read_all(project_root);
    let skip = all.len().saturating_sub(n);
    all.drain(..skip);
    all
}
