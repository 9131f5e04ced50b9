//! Skill discovery and resolution.
//!
//! A skill is a user-authored prompt/procedure defined by a `SKILL.md`
//! file, discovered from the filesystem and selectable by name. Skills
//! carry an origin scope (project > personal > system > unknown) that
//! decides precedence when names collide, and may restrict which tools
//! the agent can run while they are active.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub mod allowlist;
pub mod frontmatter;
pub mod prompt;
pub mod render;
pub mod slash;

pub use allowlist::{is_tool_allowed, join_allowed_tools_env, parse_allowed_tools_env, EXEMPT_TOOL};
pub use prompt::{build_prompt_block, PromptBlock};
pub use render::{render_for_invocation, Rendered};
pub use slash::parse_slash_command;

/// The canonical filename for a skill definition.
pub const SKILL_FILE_NAME: &str = "SKILL.md";

/// Env var overriding all default discovery directories (path-list).
pub const SKILL_DIRS_ENV: &str = "SKILL_DIRS";

/// Env var appending extra system-scope discovery roots (path-list).
pub const SYSTEM_SKILL_DIRS_ENV: &str = "SYSTEM_SKILL_DIRS";

/// The built-in system-scope skills root.
pub const SYSTEM_SKILLS_ROOT: &str = "/etc/gearloop/skills";

/// Default cap on skill metadata injected into prompts.
pub const DEFAULT_PROMPT_BLOCK_MAX_BYTES: usize = 8 * 1024;

/// Default cap on content returned by `read_skill` and invocation
/// rendering.
pub const DEFAULT_SKILL_READ_MAX_BYTES: usize = 64 * 1024;

/// Failures of skill resolution and reading.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill not found: {0}")]
    NotFound(String),

    #[error("ambiguous skill reference, candidates: {0}")]
    Ambiguous(String),

    #[error("skill {name:?} has user-invocable=false")]
    NotUserInvocable { name: String },

    #[error("failed to read skill file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The origin tier of a skill, for precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    Unknown,
    System,
    Personal,
    Project,
}

impl Scope {
    pub fn rank(&self) -> u64 {
        match self {
            Self::Project => 3,
            Self::Personal => 2,
            Self::System => 1,
            Self::Unknown => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Personal => "personal",
            Self::System => "system",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discoverable skill. Identity is the normalized absolute path.
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Absolute, normalized path of the SKILL.md file.
    pub path: PathBuf,
    pub scope: Scope,
    /// Free-form invocation hint from the front matter.
    pub invocation: String,
    pub user_invocable: bool,
    pub disable_model_invocation: bool,
    /// Allowed-tools patterns, in author order. Empty means
    /// unconstrained.
    pub allowed_tools: Vec<String>,
    /// Discovery encounter index, used as the precedence tiebreaker
    /// within a scope.
    pub source_order: usize,
}

impl Skill {
    /// Precedence score: higher wins.
    pub fn precedence_score(&self) -> u64 {
        self.scope.rank() * 1_000_000 + self.source_order as u64
    }
}

/// Scan search directories recursively for SKILL.md files.
///
/// Entries resolving to the same real path are deduplicated; unreadable
/// files are skipped. The result is sorted by name then path.
pub fn discover(search_dirs: &[PathBuf]) -> Vec<Skill> {
    let dirs = normalize_paths(search_dirs);
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut out: Vec<Skill> = Vec::new();
    let mut order = 0usize;

    for root in &dirs {
        if !root.is_dir() {
            continue;
        }
        let mut files = Vec::new();
        collect_skill_files(root, &mut files);
        for path in files {
            let resolved = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if !seen.insert(resolved) {
                continue;
            }
            match parse_skill(&path, root, order) {
                Some(skill) => {
                    out.push(skill);
                    order += 1;
                }
                None => continue,
            }
        }
    }

    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    debug!(count = out.len(), "skill discovery complete");
    out
}

/// Depth-first lexical walk collecting SKILL.md files.
fn collect_skill_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_skill_files(&path, out);
        } else if path.file_name().and_then(|n| n.to_str()) == Some(SKILL_FILE_NAME) {
            out.push(path);
        }
    }
}

fn parse_skill(path: &Path, root: &Path, source_order: usize) -> Option<Skill> {
    let data = std::fs::read_to_string(path).ok()?;
    let (front, body) = frontmatter::parse(&data);

    let mut name = front.name.trim().to_string();
    if name.is_empty() {
        name = infer_skill_name(path, root);
    }

    let mut description = front.description.trim().to_string();
    if description.is_empty() {
        description = infer_description(&body);
    }
    if description.is_empty() {
        description = "No description.".into();
    }

    let abs = absolutize(path);
    let scope = classify_scope(&abs);

    Some(Skill {
        name,
        description,
        path: abs,
        scope,
        invocation: front.invocation,
        user_invocable: front.user_invocable,
        disable_model_invocation: front.disable_model_invocation,
        allowed_tools: front.allowed_tools,
        source_order,
    })
}

fn infer_skill_name(path: &Path, root: &Path) -> String {
    let dir = path.parent().unwrap_or(root);
    match dir.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => {
            rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/")
        }
        _ => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "skill".into()),
    }
}

fn infer_description(body: &str) -> String {
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.chars().count() > 160 {
            return line.chars().take(160).collect::<String>() + "...";
        }
        return line.to_string();
    }
    String::new()
}

/// Classify a skill path into its origin scope.
pub fn classify_scope(path: &Path) -> Scope {
    let mut system_roots = vec![PathBuf::from(SYSTEM_SKILLS_ROOT)];
    if let Ok(raw) = std::env::var(SYSTEM_SKILL_DIRS_ENV) {
        system_roots.extend(parse_paths(&raw));
    }
    if system_roots.iter().any(|root| path.starts_with(root)) {
        return Scope::System;
    }

    if personal_roots().iter().any(|root| path.starts_with(root)) {
        return Scope::Personal;
    }

    if has_segment_pair(path, ".agents", "skills") || has_segment_pair(path, ".codex", "skills") {
        return Scope::Project;
    }

    Scope::Unknown
}

/// Skill roots under the current user's home directory.
pub fn personal_roots() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    vec![
        home.join(".agents").join("skills"),
        home.join(".codex").join("skills"),
        home.join(".codex").join("superpowers").join("skills"),
        home.join(".claude").join("skills"),
    ]
}

fn has_segment_pair(path: &Path, first: &str, second: &str) -> bool {
    let parts: Vec<&std::ffi::OsStr> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(os) => Some(os),
            _ => None,
        })
        .collect();
    parts
        .windows(2)
        .any(|w| w[0] == first && w[1] == second)
}

/// Built-in skill search directories for a working directory.
///
/// `SKILL_DIRS` overrides everything; otherwise every directory from the
/// repository root down to the work dir contributes `.agents/skills` and
/// `.codex/skills`, followed by the personal home roots and the system
/// root (plus `SYSTEM_SKILL_DIRS` extras).
pub fn default_search_dirs(work_dir: &Path) -> Vec<PathBuf> {
    if let Ok(raw) = std::env::var(SKILL_DIRS_ENV) {
        if !raw.trim().is_empty() {
            return normalize_paths(&parse_paths(&raw));
        }
    }

    let mut dirs: Vec<PathBuf> = Vec::new();
    if !work_dir.as_os_str().is_empty() {
        let work_dir = absolutize(work_dir);
        let root = find_repo_root(&work_dir);
        for dir in dirs_from_root(&root, &work_dir) {
            dirs.push(dir.join(".agents").join("skills"));
            dirs.push(dir.join(".codex").join("skills"));
        }
    }

    dirs.extend(personal_roots());

    dirs.push(PathBuf::from(SYSTEM_SKILLS_ROOT));
    if let Ok(raw) = std::env::var(SYSTEM_SKILL_DIRS_ENV) {
        dirs.extend(parse_paths(&raw));
    }

    normalize_paths(&dirs)
}

/// Pick the single skill a `/name` invocation refers to.
///
/// Exact name match first, then case-insensitive. Among multiple
/// candidates the highest precedence score wins; ties break toward the
/// lexicographically smaller path.
pub fn resolve_for_invocation(skills: &[Skill], name: &str) -> Result<Skill, SkillError> {
    let mut candidates = resolve_by_name(skills, name);
    if candidates.is_empty() {
        return Err(SkillError::NotFound(name.to_string()));
    }
    candidates.sort_by(|a, b| {
        b.precedence_score()
            .cmp(&a.precedence_score())
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(candidates.remove(0))
}

/// All skills matching a name, exact first, else case-insensitive.
pub fn resolve_by_name(skills: &[Skill], name: &str) -> Vec<Skill> {
    let name = name.trim();
    if name.is_empty() {
        return Vec::new();
    }

    let exact: Vec<Skill> = skills.iter().filter(|s| s.name == name).cloned().collect();
    if !exact.is_empty() {
        return exact;
    }

    let lower = name.to_lowercase();
    skills
        .iter()
        .filter(|s| s.name.to_lowercase() == lower)
        .cloned()
        .collect()
}

/// All skills whose normalized path matches.
pub fn resolve_by_path(skills: &[Skill], path: &Path) -> Vec<Skill> {
    if path.as_os_str().is_empty() {
        return Vec::new();
    }
    let clean = absolutize(path);
    let resolved = std::fs::canonicalize(&clean).unwrap_or_else(|_| clean.clone());

    skills
        .iter()
        .filter(|s| {
            s.path == clean
                || std::fs::canonicalize(&s.path)
                    .map(|p| p == resolved)
                    .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Filter skills by a case-insensitive name/description query.
pub fn filter_by_query(skills: &[Skill], query: &str) -> Vec<Skill> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return skills.to_vec();
    }
    skills
        .iter()
        .filter(|s| {
            s.name.to_lowercase().contains(&query)
                || s.description.to_lowercase().contains(&query)
        })
        .cloned()
        .collect()
}

/// Read a SKILL.md file with a byte cap. Returns the content and
/// whether the cap was hit.
pub fn read_file(path: &Path, max_bytes: usize) -> Result<(String, bool), SkillError> {
    let max_bytes = if max_bytes == 0 {
        DEFAULT_SKILL_READ_MAX_BYTES
    } else {
        max_bytes
    };
    let data = std::fs::read_to_string(path).map_err(|source| SkillError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if data.len() <= max_bytes {
        return Ok((data, false));
    }
    let cut = floor_char_boundary(&data, max_bytes);
    Ok((data[..cut].to_string(), true))
}

/// Render candidate paths for an ambiguous skill reference.
pub fn join_ambiguous_paths(skills: &[Skill]) -> String {
    skills
        .iter()
        .map(|s| s.path.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a path-list env value on commas, newlines, or the platform
/// list separator.
pub fn parse_paths(raw: &str) -> Vec<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let parts: Vec<&str> = if raw.contains(',') || raw.contains('\n') {
        raw.split(|c| c == ',' || c == '\n').collect()
    } else {
        raw.split(':').collect()
    };
    normalize_paths(&parts.into_iter().map(PathBuf::from).collect::<Vec<_>>())
}

fn normalize_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let text = path.to_string_lossy();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let expanded = if let Some(rest) = text.strip_prefix('~') {
            match dirs::home_dir() {
                Some(home) => home.join(rest.trim_start_matches(std::path::MAIN_SEPARATOR)),
                None => PathBuf::from(text),
            }
        } else {
            PathBuf::from(text)
        };
        if seen.insert(expanded.clone()) {
            out.push(expanded);
        }
    }
    out
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Walk upward until a directory containing `.git` is found.
fn find_repo_root(work_dir: &Path) -> PathBuf {
    let mut dir = work_dir.to_path_buf();
    loop {
        if dir.join(".git").exists() {
            return dir;
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => return work_dir.to_path_buf(),
        }
    }
}

fn dirs_from_root(root: &Path, work_dir: &Path) -> Vec<PathBuf> {
    let Ok(rel) = work_dir.strip_prefix(root) else {
        return vec![work_dir.to_path_buf()];
    };
    let mut dirs = vec![root.to_path_buf()];
    let mut cur = root.to_path_buf();
    for part in rel.components() {
        cur = cur.join(part);
        dirs.push(cur.clone());
    }
    dirs
}

pub(crate) fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
