//! Discovery of routable docs and skills.
//!
//! Two strategies, chosen by `[registry].mode`:
//! - scan: walk the project for frontmatter-tagged docs and `SKILL.md` files
//! - manifest: read `.reflex/registry.yaml` with explicit entries and scan directives
//!
//! The registry is rebuilt on every hook invocation and building it never
//! fails: unreadable files, missing directories and a malformed manifest all
//! contribute nothing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::{RegistryConfig, RegistryMode};
use crate::frontmatter::{self, Frontmatter};

/// Filename that marks a skill definition.
pub const SKILL_FILENAME: &str = "SKILL.md";

/// Index-style files that manifest scan directives never pick up.
const SCAN_EXCLUDED_FILENAMES: &[&str] = &["readme.md", "index.md"];

/// A project document the agent can be told to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doc {
    /// Project-relative, `/`-separated
    pub path: String,
    pub summary: String,
    pub read_when: Vec<String>,
}

/// A reusable skill the agent can be told to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub use_when: Vec<String>,
}

/// Anything the router can select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutableItem {
    Doc(Doc),
    Skill(Skill),
}

impl RoutableItem {
    /// Identifier the router answers with: doc path or skill name.
    pub fn id(&self) -> &str {
        match self {
            RoutableItem::Doc(d) => &d.path,
            RoutableItem::Skill(s) => &s.name,
        }
    }
}

impl Doc {
    /// Build a doc from frontmatter. `summary` and `read_when` are both required.
    pub fn from_frontmatter(path: String, fm: &Frontmatter) -> Option<Self> {
        let summary = fm.scalar("summary")?;
        let read_when = fm.list("read_when");
        if read_when.is_empty() {
            return None;
        }
        Some(Self {
            path,
            summary: summary.to_string(),
            read_when,
        })
    }
}

impl Skill {
    /// Build a skill from frontmatter. `name` and `description` are required;
    /// `summary` stands in for a missing description.
    pub fn from_frontmatter(fm: &Frontmatter) -> Option<Self> {
        let name = fm.scalar("name")?;
        let description = fm.scalar("description").or_else(|| fm.scalar("summary"))?;
        Some(Self {
            name: name.to_string(),
            description: description.to_string(),
            use_when: fm.list("use_when"),
        })
    }
}

/// The docs and skills available for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub docs: Vec<Doc>,
    #[serde(default)]
    pub skills: Vec<Skill>,
}

impl Registry {
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty() && self.skills.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len() + self.skills.len()
    }

    pub fn has_doc(&self, path: &str) -> bool {
        self.docs.iter().any(|d| d.path == path)
    }

    pub fn has_skill(&self, name: &str) -> bool {
        self.skills.iter().any(|s| s.name == name)
    }

    /// Add an item unless one with the same identifier is already present.
    /// Returns whether the item was added.
    pub fn insert(&mut self, item: RoutableItem) -> bool {
        let duplicate = match &item {
            RoutableItem::Doc(doc) => self.has_doc(&doc.path),
            RoutableItem::Skill(skill) => self.has_skill(&skill.name),
        };
        if duplicate {
            tracing::debug!("skipping duplicate registry entry {:?}", item.id());
            return false;
        }
        match item {
            RoutableItem::Doc(doc) => self.docs.push(doc),
            RoutableItem::Skill(skill) => self.skills.push(skill),
        }
        true
    }

    /// Iterate over every item, docs first.
    pub fn items(&self) -> impl Iterator<Item = RoutableItem> + '_ {
        self.docs
            .iter()
            .cloned()
            .map(RoutableItem::Doc)
            .chain(self.skills.iter().cloned().map(RoutableItem::Skill))
    }
}

/// Build the registry for `project_root` using the configured strategy.
pub fn build(project_root: &Path, config: &RegistryConfig) -> Registry {
    let registry = match config.mode {
        RegistryMode::Scan => scan_project(project_root, config),
        RegistryMode::Manifest => {
            load_manifest(project_root, &project_root.join(&config.manifest), config)
        }
    };
    tracing::debug!(
        docs = registry.docs.len(),
        skills = registry.skills.len(),
        "registry built"
    );
    registry
}

// ─── scan mode ──────────────────────────────────────────────────────────────

/// Discover docs anywhere in the project plus skills under the skills dirs.
pub fn scan_project(project_root: &Path, config: &RegistryConfig) -> Registry {
    let mut registry = Registry::default();
    let skills_dirs: Vec<PathBuf> = config
        .skills_dirs
        .iter()
        .map(|d| project_root.join(d))
        .collect();

    for path in walk_files(project_root, &config.skip_dirs) {
        if !has_eligible_extension(&path, &config.extensions) {
            continue;
        }
        // Skill files are skills, not docs
        if skills_dirs.iter().any(|dir| path.starts_with(dir)) {
            continue;
        }
        if let Some(doc) = read_doc(project_root, &path) {
            registry.insert(RoutableItem::Doc(doc));
        }
    }

    for dir in &skills_dirs {
        for path in walk_files(dir, &config.skip_dirs) {
            if path.file_name().is_some_and(|n| n == SKILL_FILENAME) {
                if let Some(skill) = read_skill(&path) {
                    registry.insert(RoutableItem::Skill(skill));
                }
            }
        }
    }

    registry
}

/// Walk `root` in file-name order, pruning `skip_dirs`. A missing root yields nothing.
fn walk_files(root: &Path, skip_dirs: &[String]) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e, skip_dirs))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(DirEntry::into_path)
        .collect()
}

fn is_skipped_dir(entry: &DirEntry, skip_dirs: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| skip_dirs.iter().any(|d| d == name))
}

fn has_eligible_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
}

fn read_frontmatter(path: &Path) -> Option<Frontmatter> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let fm = frontmatter::parse(&String::from_utf8_lossy(&bytes));
            (!fm.is_empty()).then_some(fm)
        }
        Err(e) => {
            tracing::debug!("skipping unreadable {}: {}", path.display(), e);
            None
        }
    }
}

fn read_doc(project_root: &Path, path: &Path) -> Option<Doc> {
    let fm = read_frontmatter(path)?;
    Doc::from_frontmatter(relative_id(project_root, path), &fm)
}

fn read_skill(path: &Path) -> Option<Skill> {
    Skill::from_frontmatter(&read_frontmatter(path)?)
}

/// Project-relative path with `/` separators.
fn relative_id(project_root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(project_root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ─── manifest mode ──────────────────────────────────────────────────────────

/// Declarative registry file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Manifest {
    docs: Vec<ManifestDoc>,
    skills: Vec<ManifestSkill>,
    scan: Vec<ScanDirective>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestDoc {
    path: String,
    summary: String,
    read_when: Option<OneOrMany>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestSkill {
    name: String,
    description: String,
    use_when: Option<OneOrMany>,
}

/// `read_when: x` and `read_when: [x, y]` are both accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(value: Option<Self>) -> Vec<String> {
        match value {
            None => Vec::new(),
            Some(OneOrMany::One(s)) if s.trim().is_empty() => Vec::new(),
            Some(OneOrMany::One(s)) => vec![s],
            Some(OneOrMany::Many(v)) => v,
        }
    }
}

/// Auto-populate entries of one type from a sub-path.
#[derive(Debug, Deserialize)]
struct ScanDirective {
    path: String,
    #[serde(rename = "type")]
    kind: ScanKind,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ScanKind {
    Doc,
    Skill,
}

impl ManifestDoc {
    fn validate(self) -> Option<Doc> {
        let path = self.path.trim();
        let summary = self.summary.trim();
        if path.is_empty() || summary.is_empty() {
            return None;
        }
        Some(Doc {
            path: path.to_string(),
            summary: summary.to_string(),
            read_when: OneOrMany::into_vec(self.read_when),
        })
    }
}

impl ManifestSkill {
    fn validate(self) -> Option<Skill> {
        let name = self.name.trim();
        let description = self.description.trim();
        if name.is_empty() || description.is_empty() {
            return None;
        }
        Some(Skill {
            name: name.to_string(),
            description: description.to_string(),
            use_when: OneOrMany::into_vec(self.use_when),
        })
    }
}

/// Load the manifest at `manifest_path`. Missing or malformed → empty registry.
pub fn load_manifest(project_root: &Path, manifest_path: &Path, config: &RegistryConfig) -> Registry {
    let content = match std::fs::read_to_string(manifest_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!("no registry manifest at {}: {}", manifest_path.display(), e);
            return Registry::default();
        }
    };
    let manifest: Manifest = if content.trim().is_empty() {
        Manifest::default()
    } else {
        match serde_yaml::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("ignoring malformed manifest {}: {}", manifest_path.display(), e);
                return Registry::default();
            }
        }
    };

    let mut registry = Registry::default();
    for doc in manifest.docs.into_iter().filter_map(ManifestDoc::validate) {
        registry.insert(RoutableItem::Doc(doc));
    }
    for skill in manifest.skills.into_iter().filter_map(ManifestSkill::validate) {
        registry.insert(RoutableItem::Skill(skill));
    }
    for directive in &manifest.scan {
        apply_scan_directive(project_root, directive, config, &mut registry);
    }
    registry
}

fn apply_scan_directive(
    project_root: &Path,
    directive: &ScanDirective,
    config: &RegistryConfig,
    registry: &mut Registry,
) {
    let dir = project_root.join(directive.path.trim_matches('/'));
    for path in walk_files(&dir, &config.skip_dirs) {
        if !has_eligible_extension(&path, &config.extensions) || is_index_file(&path) {
            continue;
        }
        let item = match directive.kind {
            ScanKind::Doc => read_doc(project_root, &path).map(RoutableItem::Doc),
            ScanKind::Skill => read_skill(&path).map(RoutableItem::Skill),
        };
        if let Some(item) = item {
            registry.insert(item);
        }
    }
}

fn is_index_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| SCAN_EXCLUDED_FILENAMES.contains(&n.to_ascii_lowercase().as_str()))
}
