#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary project plus a scratch dir for transcripts and router stubs.
pub struct TestProject {
    pub dir: TempDir,
    pub scratch: TempDir,
}

impl TestProject {
    /// Create a new temp directory with a git repo initialized.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let scratch = TempDir::new().expect("failed to create scratch dir");
        std::process::Command::new("git")
            .args(["init", "--initial-branch=main"])
            .current_dir(dir.path())
            .output()
            .expect("failed to git init");
        Self { dir, scratch }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_str(&self) -> &str {
        self.dir.path().to_str().expect("temp path is not UTF-8")
    }

    /// Write a file relative to the project root, creating parent dirs as needed.
    pub fn write_file(&self, relative_path: &str, content: &str) {
        let full = self.dir.path().join(relative_path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        std::fs::write(&full, content).expect("failed to write file");
    }

    /// Write a routable doc with `summary` and `read_when` frontmatter.
    pub fn write_doc(&self, relative_path: &str, summary: &str, read_when: &[&str]) {
        let mut content = format!("---\nsummary: {summary}\nread_when:\n");
        for when in read_when {
            content.push_str(&format!("  - {when}\n"));
        }
        content.push_str("---\n\n# Notes\n");
        self.write_file(relative_path, &content);
    }

    /// Write a skill under `.claude/skills/<name>/SKILL.md`.
    pub fn write_skill(&self, name: &str, description: &str) {
        self.write_file(
            &format!(".claude/skills/{name}/SKILL.md"),
            &format!("---\nname: {name}\ndescription: {description}\n---\n\nSteps.\n"),
        );
    }

    /// Write a transcript (one JSON record per line) and return its path.
    pub fn write_transcript(&self, name: &str, records: &[serde_json::Value]) -> PathBuf {
        let path = self.scratch.path().join(format!("{name}.jsonl"));
        let body: String = records.iter().map(|r| format!("{r}\n")).collect();
        std::fs::write(&path, body).expect("failed to write transcript");
        path
    }

    /// Install a router stub that records its stdin and prints `response`.
    pub fn router_stub(&self, response: &str) -> PathBuf {
        let bin = self.scratch.path().join("reflex");
        let script = format!(
            "#!/bin/sh\ncat > '{request}'\necho \"$1\" > '{args}'\ncat <<'EOF'\n{response}\nEOF\n",
            request = self.router_request_path().display(),
            args = self.scratch.path().join("router_args").display(),
        );
        std::fs::write(&bin, script).expect("failed to write router stub");
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755))
            .expect("failed to chmod router stub");
        bin
    }

    /// Where the stub saves the request it received.
    pub fn router_request_path(&self) -> PathBuf {
        self.scratch.path().join("router_request.json")
    }

    pub fn router_was_called(&self) -> bool {
        self.router_request_path().exists()
    }

    pub fn router_request(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(self.router_request_path())
            .expect("router was never called");
        serde_json::from_str(&raw).expect("router received invalid JSON")
    }

    pub fn state_file(&self, key: &str) -> PathBuf {
        self.path()
            .join(".reflex")
            .join(".state")
            .join(format!("{key}.json"))
    }

    /// Return the path to the reflex-context binary (built via cargo).
    pub fn bin() -> PathBuf {
        PathBuf::from(env!("CARGO_BIN_EXE_reflex-context"))
    }
}

/// A user transcript record with plain string content.
pub fn user_record(text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "user",
        "message": { "role": "user", "content": text }
    })
}

/// An assistant transcript record with one text block.
pub fn assistant_record(text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "assistant",
        "message": { "role": "assistant", "content": [ { "type": "text", "text": text } ] }
    })
}
