//! Recent-conversation window extraction from a Claude Code transcript.
//!
//! The transcript is an append-only JSONL file that grows for the whole
//! session, so it is scanned from the newest line backward and the scan stops
//! as soon as the window is full.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::config::HooksConfig;

/// Tags that mark system-injected content rather than something the user typed.
pub const NOISE_MARKERS: &[&str] = &[
    "<local-command-caveat>",
    "<command-name>",
    "<local-command-stdout>",
    "<system-reminder>",
    "<injected-project-context>",
    "<user-prompt-submit-hook>",
];

/// Record types that are bookkeeping, never conversation.
const SKIPPED_RECORD_TYPES: &[&str] = &["progress", "file-history-snapshot", "system"];

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    User,
    Assistant,
    Thinking,
}

/// One conversational message passed to the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(rename = "type")]
    pub kind: TurnKind,
    pub text: String,
}

/// Knobs for window extraction, derived from `[hooks]` config.
#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub lookback: usize,
    pub max_turn_chars: usize,
    pub max_thinking_chars: usize,
    pub include_thinking: bool,
    pub noise_threshold: usize,
}

impl From<&HooksConfig> for WindowOptions {
    fn from(cfg: &HooksConfig) -> Self {
        Self {
            lookback: cfg.lookback,
            max_turn_chars: cfg.max_turn_chars,
            max_thinking_chars: cfg.max_thinking_chars,
            include_thinking: cfg.include_thinking,
            noise_threshold: cfg.noise_threshold,
        }
    }
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self::from(&HooksConfig::default())
    }
}

impl WindowOptions {
    /// Build a user turn from free text, applying the noise filter and cap.
    pub fn user_turn(&self, text: &str) -> Option<Turn> {
        let text = text.trim();
        if text.is_empty() || is_noise(text, self.noise_threshold) {
            return None;
        }
        Some(Turn {
            kind: TurnKind::User,
            text: truncate_chars(text, self.max_turn_chars),
        })
    }

    fn assistant_turn(&self, text: &str) -> Option<Turn> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Turn {
            kind: TurnKind::Assistant,
            text: truncate_chars(text, self.max_turn_chars),
        })
    }

    fn thinking_turn(&self, text: &str) -> Option<Turn> {
        let text = text.trim();
        if !self.include_thinking || text.is_empty() {
            return None;
        }
        Some(Turn {
            kind: TurnKind::Thinking,
            text: truncate_chars(text, self.max_thinking_chars),
        })
    }
}

/// Return true if `text` is system-injected noise rather than a real message.
///
/// Noise either starts with a marker, or is a large blob (over `threshold`
/// chars) with a marker somewhere inside it.
pub fn is_noise(text: &str, threshold: usize) -> bool {
    let trimmed = text.trim();
    if NOISE_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
        return true;
    }
    trimmed.chars().count() > threshold && NOISE_MARKERS.iter().any(|m| trimmed.contains(m))
}

/// Keep at most `max` chars, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Read the transcript at `path` and return its last `lookback` turns, oldest first.
///
/// A missing or unreadable transcript yields an empty window.
pub fn build_window(path: &Path, opts: &WindowOptions) -> Vec<Turn> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!("transcript {} unreadable: {}", path.display(), e);
            return Vec::new();
        }
    };
    window_from_lines(content.lines(), opts)
}

/// Window extraction over already-read lines (oldest line first).
pub fn window_from_lines<'a, I>(lines: I, opts: &WindowOptions) -> Vec<Turn>
where
    I: DoubleEndedIterator<Item = &'a str>,
{
    if opts.lookback == 0 {
        return Vec::new();
    }

    // Collected newest-entry-first; each entry's turns stay in block order
    let mut newest_first: Vec<Vec<Turn>> = Vec::new();
    let mut collected = 0;

    for line in lines.rev() {
        if collected >= opts.lookback {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let turns = turns_from_record(&record, opts);
        if turns.is_empty() {
            continue;
        }
        collected += turns.len();
        newest_first.push(turns);
    }

    let mut window: Vec<Turn> = newest_first.into_iter().rev().flatten().collect();
    if window.len() > opts.lookback {
        window.drain(..window.len() - opts.lookback);
    }
    window
}

/// Extract the turns carried by a single transcript record.
fn turns_from_record(record: &Value, opts: &WindowOptions) -> Vec<Turn> {
    let record_type = record.get("type").and_then(Value::as_str).unwrap_or("");
    if SKIPPED_RECORD_TYPES.contains(&record_type) {
        return Vec::new();
    }

    let Some(message) = record.get("message") else {
        return Vec::new();
    };
    let role = message.get("role").and_then(Value::as_str).unwrap_or("");
    let content = message.get("content").unwrap_or(&Value::Null);

    match (record_type, role) {
        ("user", "user") => user_turns(content, opts),
        ("assistant", "assistant") => assistant_turns(content, opts),
        _ => Vec::new(),
    }
}

fn user_turns(content: &Value, opts: &WindowOptions) -> Vec<Turn> {
    match content {
        Value::String(text) => opts.user_turn(text).into_iter().collect(),
        Value::Array(blocks) => {
            // Tool results ride on user records but aren't conversation
            if blocks.iter().any(|b| block_type(b) == "tool_result") {
                return Vec::new();
            }
            blocks
                .iter()
                .filter(|b| block_type(b) == "text")
                .filter_map(|b| opts.user_turn(block_str(b, "text")))
                .collect()
        }
        _ => Vec::new(),
    }
}

fn assistant_turns(content: &Value, opts: &WindowOptions) -> Vec<Turn> {
    let Value::Array(blocks) = content else {
        return Vec::new();
    };
    blocks
        .iter()
        .filter_map(|b| match block_type(b) {
            "text" => opts.assistant_turn(block_str(b, "text")),
            "thinking" => opts.thinking_turn(block_str(b, "thinking")),
            _ => None,
        })
        .collect()
}

fn block_type(block: &Value) -> &str {
    block_str(block, "type")
}

fn block_str<'a>(block: &'a Value, field: &str) -> &'a str {
    block.get(field).and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn user(text: &str) -> String {
        json!({"type": "user", "message": {"role": "user", "content": text}}).to_string()
    }

    fn user_blocks(blocks: Value) -> String {
        json!({"type": "user", "message": {"role": "user", "content": blocks}}).to_string()
    }

    fn assistant(blocks: Value) -> String {
        json!({"type": "assistant", "message": {"role": "assistant", "content": blocks}})
            .to_string()
    }

    fn window(lines: &[String], opts: &WindowOptions) -> Vec<Turn> {
        window_from_lines(lines.iter().map(String::as_str), opts)
    }

    fn texts(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_window_is_chronological() {
        let lines = vec![
            user("first"),
            assistant(json!([{"type": "text", "text": "second"}])),
            user("third"),
        ];
        let turns = window(&lines, &WindowOptions::default());
        assert_eq!(texts(&turns), vec!["first", "second", "third"]);
        assert_eq!(turns[1].kind, TurnKind::Assistant);
    }

    #[test]
    fn test_window_bounded_to_lookback() {
        let lines: Vec<String> = (0..25).map(|i| user(&format!("msg {i}"))).collect();
        let opts = WindowOptions {
            lookback: 5,
            ..WindowOptions::default()
        };
        let turns = window(&lines, &opts);
        assert_eq!(texts(&turns), vec!["msg 20", "msg 21", "msg 22", "msg 23", "msg 24"]);
    }

    #[test]
    fn test_multi_block_entry_keeps_block_order_and_bound() {
        let lines = vec![
            user("old"),
            assistant(json!([
                {"type": "text", "text": "a"},
                {"type": "text", "text": "b"},
                {"type": "text", "text": "c"}
            ])),
        ];
        let opts = WindowOptions {
            lookback: 2,
            ..WindowOptions::default()
        };
        let turns = window(&lines, &opts);
        assert_eq!(texts(&turns), vec!["b", "c"]);
    }

    #[test]
    fn test_bookkeeping_records_skipped() {
        let lines = vec![
            user("real"),
            json!({"type": "progress", "message": {"role": "user", "content": "p"}}).to_string(),
            json!({"type": "file-history-snapshot", "snapshot": {}}).to_string(),
            json!({"type": "system", "message": {"role": "user", "content": "s"}}).to_string(),
        ];
        let opts = WindowOptions {
            lookback: 1,
            ..WindowOptions::default()
        };
        assert_eq!(texts(&window(&lines, &opts)), vec!["real"]);
    }

    #[test]
    fn test_tool_result_entry_skipped_entirely() {
        let lines = vec![user_blocks(json!([
            {"type": "tool_result", "tool_use_id": "t1", "content": "ok"},
            {"type": "text", "text": "should not appear"}
        ]))];
        assert!(window(&lines, &WindowOptions::default()).is_empty());
    }

    #[test]
    fn test_user_text_blocks_filtered_individually() {
        let lines = vec![user_blocks(json!([
            {"type": "text", "text": "<system-reminder>ignore me</system-reminder>"},
            {"type": "text", "text": "   "},
            {"type": "image", "source": {}},
            {"type": "text", "text": "keep me"}
        ]))];
        assert_eq!(texts(&window(&lines, &WindowOptions::default())), vec!["keep me"]);
    }

    #[test]
    fn test_noise_and_empty_strings_skipped() {
        let lines = vec![
            user("<command-name>/clear</command-name>"),
            user("  <local-command-caveat>Caveat</local-command-caveat>"),
            user("   "),
            user("  hello  "),
        ];
        assert_eq!(texts(&window(&lines, &WindowOptions::default())), vec!["hello"]);
    }

    #[test]
    fn test_role_mismatch_skipped() {
        let lines = vec![
            json!({"type": "user", "message": {"role": "assistant", "content": "x"}}).to_string(),
            json!({"type": "assistant", "message": {"role": "assistant", "content": "plain"}})
                .to_string(),
        ];
        assert!(window(&lines, &WindowOptions::default()).is_empty());
    }

    #[test]
    fn test_thinking_excluded_by_default() {
        let lines = vec![assistant(json!([
            {"type": "thinking", "thinking": "internal"},
            {"type": "text", "text": "visible"}
        ]))];
        let turns = window(&lines, &WindowOptions::default());
        assert_eq!(texts(&turns), vec!["visible"]);
    }

    #[test]
    fn test_thinking_included_when_enabled() {
        let long = "t".repeat(1500);
        let lines = vec![assistant(json!([
            {"type": "thinking", "thinking": long},
            {"type": "text", "text": "visible"}
        ]))];
        let opts = WindowOptions {
            include_thinking: true,
            ..WindowOptions::default()
        };
        let turns = window(&lines, &opts);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].kind, TurnKind::Thinking);
        assert_eq!(turns[0].text.chars().count(), 1000);
        assert_eq!(turns[1].kind, TurnKind::Assistant);
    }

    #[test]
    fn test_turns_truncated() {
        let lines = vec![user(&"x".repeat(2500))];
        let turns = window(&lines, &WindowOptions::default());
        assert_eq!(turns[0].text.len(), 2000);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let lines = vec![user("before"), "{not json".to_string(), String::new()];
        assert_eq!(texts(&window(&lines, &WindowOptions::default())), vec!["before"]);
    }

    #[test]
    fn test_is_noise_prefix_regardless_of_length() {
        for marker in NOISE_MARKERS {
            assert!(is_noise(&format!("{marker}short"), 2000));
            assert!(is_noise(&format!("  {marker}{}", "y".repeat(4000)), 2000));
        }
    }

    #[test]
    fn test_is_noise_large_blob_with_embedded_marker() {
        let small = format!("see this {}", "<system-reminder>");
        assert!(!is_noise(&small, 2000));

        let large = format!("{} <system-reminder>x</system-reminder>", "a".repeat(2100));
        assert!(is_noise(&large, 2000));
        // Same text under a higher threshold is a real message
        assert!(!is_noise(&large, 5000));
    }

    #[test]
    fn test_is_noise_threshold_boundary() {
        let marker = "<system-reminder>";
        let pad = 2000 - marker.chars().count() - 1;
        let at_limit = format!("{} {marker}", "a".repeat(pad));
        assert_eq!(at_limit.chars().count(), 2000);
        assert!(!is_noise(&at_limit, 2000));

        let over_limit = format!("{} {marker}", "a".repeat(pad + 1));
        assert!(is_noise(&over_limit, 2000));
    }

    #[test]
    fn test_large_text_without_marker_is_not_noise() {
        assert!(!is_noise(&"plain ".repeat(1000), 2000));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_user_turn_helper() {
        let opts = WindowOptions::default();
        assert_eq!(
            opts.user_turn("  let's edit the login endpoint "),
            Some(Turn {
                kind: TurnKind::User,
                text: "let's edit the login endpoint".to_string()
            })
        );
        assert!(opts.user_turn("<user-prompt-submit-hook>x").is_none());
        assert!(opts.user_turn("").is_none());
    }

    #[test]
    fn test_build_window_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", user("from disk")).unwrap();
        let turns = build_window(file.path(), &WindowOptions::default());
        assert_eq!(texts(&turns), vec!["from disk"]);
    }

    #[test]
    fn test_build_window_missing_file() {
        let turns = build_window(Path::new("/nonexistent/transcript.jsonl"), &WindowOptions::default());
        assert!(turns.is_empty());
    }

    #[test]
    fn test_turn_serialization() {
        let turn = Turn {
            kind: TurnKind::Thinking,
            text: "hmm".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&turn).unwrap(),
            r#"{"type":"thinking","text":"hmm"}"#
        );
    }
}
