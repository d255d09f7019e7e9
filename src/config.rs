use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for reflex-context
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub hooks: HooksConfig,
    pub registry: RegistryConfig,
    pub router: RouterConfig,
}

/// Configuration for the Claude Code hook handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// How many recent transcript turns to pass to the router
    pub lookback: usize,
    /// Character cap for user and assistant turns
    pub max_turn_chars: usize,
    /// Character cap for thinking turns (only used when `include_thinking` is set)
    pub max_thinking_chars: usize,
    /// Pass assistant reasoning blocks to the router as `thinking` turns
    pub include_thinking: bool,
    /// Texts longer than this (in chars) are noise if they contain any injected marker
    pub noise_threshold: usize,
    /// SessionStart sources that wipe the injection history.
    /// `compact` is absent: docs already in the compacted summary stay recorded.
    pub clean_sources: Vec<String>,
    /// Append every routing decision to `.reflex/hook_log.jsonl`
    pub journal: bool,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            lookback: 10,
            max_turn_chars: 2000,
            max_thinking_chars: 1000,
            include_thinking: false,
            noise_threshold: 2000,
            clean_sources: vec!["startup".into(), "clear".into()],
            journal: true,
        }
    }
}

/// How the registry of docs and skills is discovered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryMode {
    /// Walk the project tree for frontmatter-tagged docs and SKILL.md files
    #[default]
    Scan,
    /// Load an explicit YAML manifest
    Manifest,
}

/// Configuration for registry discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub mode: RegistryMode,
    /// Manifest path, relative to the project root (manifest mode only)
    pub manifest: String,
    /// File extensions eligible as docs
    pub extensions: Vec<String>,
    /// Directory names pruned from every walk
    pub skip_dirs: Vec<String>,
    /// Project-relative directories holding `<skill>/SKILL.md` files
    pub skills_dirs: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mode: RegistryMode::default(),
            manifest: ".reflex/registry.yaml".into(),
            extensions: vec!["md".into()],
            skip_dirs: [
                ".git",
                "node_modules",
                ".next",
                "dist",
                "build",
                "__pycache__",
                ".venv",
                "venv",
                ".tox",
                "coverage",
                ".turbo",
                "vendor",
                "target",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            skills_dirs: vec![".claude/skills".into(), ".openclaw/skills".into()],
        }
    }
}

/// Configuration for the external router process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Router executable. Overridden by the `REFLEX_BIN` env var.
    pub command: String,
    /// Arguments passed before the request is written to stdin
    pub args: Vec<String>,
    /// Hard limit for one routing round trip
    pub timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            command: "reflex".into(),
            args: vec!["route".into()],
            timeout_secs: 15,
        }
    }
}

impl RouterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load the project config, falling back to defaults.
    ///
    /// The hook must work in projects that never ran `init`, so a missing file
    /// is silent and a malformed one only warns.
    pub fn load_or_default(project_root: &Path) -> Self {
        let path = Self::config_path(project_root);
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Get the path to the reflex data directory for a project
    pub fn data_dir(project_root: &Path) -> PathBuf {
        project_root.join(".reflex")
    }

    /// Get the config file path for a project
    pub fn config_path(project_root: &Path) -> PathBuf {
        Self::data_dir(project_root).join("config.toml")
    }

    /// Get the per-session injection state directory
    pub fn state_dir(project_root: &Path) -> PathBuf {
        Self::data_dir(project_root).join(".state")
    }

    /// Get the activity journal path
    pub fn journal_path(project_root: &Path) -> PathBuf {
        Self::data_dir(project_root).join("hook_log.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hooks_config_defaults() {
        let config = Config::default();
        assert_eq!(config.hooks.lookback, 10);
        assert_eq!(config.hooks.max_turn_chars, 2000);
        assert_eq!(config.hooks.max_thinking_chars, 1000);
        assert!(!config.hooks.include_thinking);
        assert_eq!(config.hooks.noise_threshold, 2000);
        assert_eq!(config.hooks.clean_sources, vec!["startup", "clear"]);
        assert!(config.hooks.journal);
    }

    #[test]
    fn test_registry_config_defaults() {
        let config = Config::default();
        assert_eq!(config.registry.mode, RegistryMode::Scan);
        assert_eq!(config.registry.manifest, ".reflex/registry.yaml");
        assert_eq!(config.registry.extensions, vec!["md"]);
        assert!(config.registry.skip_dirs.iter().any(|d| d == "node_modules"));
        assert!(config.registry.skip_dirs.iter().any(|d| d == ".git"));
        assert_eq!(
            config.registry.skills_dirs,
            vec![".claude/skills", ".openclaw/skills"]
        );
    }

    #[test]
    fn test_router_config_defaults() {
        let config = Config::default();
        assert_eq!(config.router.command, "reflex");
        assert_eq!(config.router.args, vec!["route"]);
        assert_eq!(config.router.timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[hooks]
lookback = 4
noise_threshold = 5000

[registry]
mode = "manifest"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hooks.lookback, 4);
        assert_eq!(config.hooks.noise_threshold, 5000);
        // Unspecified fields keep their defaults
        assert_eq!(config.hooks.max_turn_chars, 2000);
        assert_eq!(config.registry.mode, RegistryMode::Manifest);
        assert_eq!(config.registry.manifest, ".reflex/registry.yaml");
        assert_eq!(config.router.timeout_secs, 15);
    }

    #[test]
    fn test_parse_router_config() {
        let toml_str = r#"
[router]
command = "/opt/reflex/bin/reflex"
args = ["route", "--config", "ci.yaml"]
timeout_secs = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.router.command, "/opt/reflex/bin/reflex");
        assert_eq!(config.router.args, vec!["route", "--config", "ci.yaml"]);
        assert_eq!(config.router.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let toml_str = r#"
[registry]
mode = "crawl"
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = Config::config_path(tmp.path());

        let mut config = Config::default();
        config.hooks.include_thinking = true;
        config.registry.mode = RegistryMode::Manifest;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(loaded.hooks.include_thinking);
        assert_eq!(loaded.registry.mode, RegistryMode::Manifest);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(tmp.path());
        assert_eq!(config.hooks.lookback, 10);
    }

    #[test]
    fn test_load_or_default_malformed_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = Config::config_path(tmp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[hooks\nlookback = ").unwrap();

        let config = Config::load_or_default(tmp.path());
        assert_eq!(config.hooks.lookback, 10);
        assert_eq!(config.router.command, "reflex");
    }

    #[test]
    fn test_paths() {
        let root = Path::new("/work/project");
        assert_eq!(Config::data_dir(root), PathBuf::from("/work/project/.reflex"));
        assert_eq!(
            Config::config_path(root),
            PathBuf::from("/work/project/.reflex/config.toml")
        );
        assert_eq!(
            Config::state_dir(root),
            PathBuf::from("/work/project/.reflex/.state")
        );
        assert_eq!(
            Config::journal_path(root),
            PathBuf::from("/work/project/.reflex/hook_log.jsonl")
        );
    }
}
