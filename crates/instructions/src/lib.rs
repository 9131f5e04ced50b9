//! Layered repository instruction loading.
//!
//! Instructions are discovered from the repository root down to the
//! working directory. For each directory layer, the first readable
//! non-blank candidate file is loaded (at most one per directory), and
//! the sections are concatenated root-first so that deeper, more
//! specific guidance appears later and can override broader prose.
//!
//! The repository root is the nearest ancestor containing a `.git`
//! entry; when none exists, the working directory itself is the root.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub mod soul;

/// Default cap on merged instruction content, to avoid prompt bloat.
pub const DEFAULT_MAX_BYTES: usize = 32 * 1024;

/// Candidate file names tried per directory layer, in priority order.
pub const DEFAULT_CANDIDATE_FILES: &[&str] = &["AGENT.md", "AGENTS.md", "CLAUDE.md"];

/// Options for instruction discovery.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Candidate file names checked in order for each directory layer.
    /// Empty means [`DEFAULT_CANDIDATE_FILES`].
    pub candidate_files: Vec<String>,

    /// Cap on the total serialized content. Zero means
    /// [`DEFAULT_MAX_BYTES`].
    pub max_bytes: usize,
}

/// The output of instruction discovery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadResult {
    /// Merged markdown sections, `## <relpath>` headed, blank-line joined.
    pub content: String,

    /// Source file paths relative to the repository root, in load order.
    pub sources: Vec<String>,

    /// Whether the content hit the byte cap.
    pub truncated: bool,
}

/// Discover and merge repository instructions from root to `work_dir`.
pub fn load(work_dir: &Path, opts: &LoadOptions) -> LoadResult {
    if work_dir.as_os_str().is_empty() {
        return LoadResult::default();
    }

    let work_dir = absolutize(work_dir);
    let root = find_repo_root(&work_dir);
    let dirs = dirs_from_root(&root, &work_dir);

    let candidates: Vec<String> = if opts.candidate_files.is_empty() {
        DEFAULT_CANDIDATE_FILES.iter().map(|s| s.to_string()).collect()
    } else {
        opts.candidate_files.clone()
    };

    let max_bytes = if opts.max_bytes == 0 {
        DEFAULT_MAX_BYTES
    } else {
        opts.max_bytes
    };

    let mut remaining = max_bytes;
    let mut parts: Vec<String> = Vec::with_capacity(dirs.len());
    let mut sources: Vec<String> = Vec::with_capacity(dirs.len());
    let mut seen_resolved: HashSet<PathBuf> = HashSet::new();
    let mut truncated = false;

    for dir in &dirs {
        for filename in &candidates {
            let path = dir.join(filename);
            let Ok(data) = std::fs::read_to_string(&path) else {
                continue;
            };

            let content = data.trim();
            if content.is_empty() {
                continue;
            }

            let resolved = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if seen_resolved.contains(&resolved) {
                continue;
            }

            let rel_path = rel_to_root(&root, &path);
            let section = format!("## {rel_path}\n{content}");

            let (appended, was_truncated) =
                append_within_limit(&mut parts, section, &mut remaining);
            if was_truncated {
                truncated = true;
            }
            if appended {
                sources.push(rel_path);
                seen_resolved.insert(resolved);
            }
            break;
        }
        if truncated || remaining == 0 {
            break;
        }
    }

    LoadResult {
        content: parts.join("\n\n"),
        sources,
        truncated,
    }
}

fn append_within_limit(
    parts: &mut Vec<String>,
    section: String,
    remaining: &mut usize,
) -> (bool, bool) {
    if *remaining == 0 {
        return (false, true);
    }

    let separator_len = if parts.is_empty() { 0 } else { 2 };
    let needed = separator_len + section.len();

    if needed <= *remaining {
        parts.push(section);
        *remaining -= needed;
        return (true, false);
    }

    // Partial section if there is room after the separator.
    let available = remaining.saturating_sub(separator_len);
    if available > 0 {
        let cut = floor_char_boundary(&section, available.min(section.len()));
        if cut > 0 {
            parts.push(section[..cut].to_string());
            *remaining -= separator_len + cut;
            return (true, true);
        }
    }

    (false, true)
}

/// Largest byte index `<= max` that falls on a char boundary of `s`.
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

pub(crate) fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Walk upward from `work_dir` until a directory containing `.git` is
/// found. Falls back to `work_dir` itself.
pub fn find_repo_root(work_dir: &Path) -> PathBuf {
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

/// Directories from `root` down to `work_dir`, both inclusive.
pub fn dirs_from_root(root: &Path, work_dir: &Path) -> Vec<PathBuf> {
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

fn rel_to_root(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn repo_with_git() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        dir
    }

    #[test]
    fn loads_layers_root_to_leaf() {
        let repo = repo_with_git();
        let sub = repo.path().join("services").join("api");
        fs::create_dir_all(&sub).unwrap();
        fs::write(repo.path().join("AGENT.md"), "root guidance").unwrap();
        fs::write(sub.join("AGENTS.md"), "api guidance").unwrap();

        let result = load(&sub, &LoadOptions::default());
        assert!(!result.truncated);
        assert_eq!(
            result.sources,
            vec!["AGENT.md".to_string(), "services/api/AGENTS.md".to_string()]
        );

        let root_pos = result.content.find("root guidance").unwrap();
        let leaf_pos = result.content.find("api guidance").unwrap();
        assert!(root_pos < leaf_pos, "deeper section must come later");
        assert!(result.content.starts_with("## AGENT.md\n"));
    }

    #[test]
    fn one_file_per_directory_in_candidate_order() {
        let repo = repo_with_git();
        fs::write(repo.path().join("AGENT.md"), "primary").unwrap();
        fs::write(repo.path().join("AGENTS.md"), "secondary").unwrap();

        let result = load(repo.path(), &LoadOptions::default());
        assert_eq!(result.sources, vec!["AGENT.md".to_string()]);
        assert!(result.content.contains("primary"));
        assert!(!result.content.contains("secondary"));
    }

    #[test]
    fn blank_candidate_falls_through_to_next() {
        let repo = repo_with_git();
        fs::write(repo.path().join("AGENT.md"), "   \n  ").unwrap();
        fs::write(repo.path().join("AGENTS.md"), "fallback content").unwrap();

        let result = load(repo.path(), &LoadOptions::default());
        assert_eq!(result.sources, vec!["AGENTS.md".to_string()]);
        assert!(result.content.contains("fallback content"));
    }

    #[test]
    fn byte_cap_truncates_with_partial_section() {
        let repo = repo_with_git();
        fs::write(repo.path().join("AGENT.md"), "a".repeat(4096)).unwrap();

        let result = load(
            repo.path(),
            &LoadOptions {
                max_bytes: 64,
                ..Default::default()
            },
        );
        assert!(result.truncated);
        assert_eq!(result.content.len(), 64);
        assert_eq!(result.sources.len(), 1);
    }

    #[test]
    fn custom_candidate_override() {
        let repo = repo_with_git();
        fs::write(repo.path().join("AGENT.md"), "default file").unwrap();
        fs::write(repo.path().join("NOTES.md"), "custom file").unwrap();

        let result = load(
            repo.path(),
            &LoadOptions {
                candidate_files: vec!["NOTES.md".into()],
                ..Default::default()
            },
        );
        assert_eq!(result.sources, vec!["NOTES.md".to_string()]);
        assert!(result.content.contains("custom file"));
    }

    #[test]
    fn no_marker_uses_work_dir_as_root() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("AGENT.md"), "local only").unwrap();

        let result = load(dir.path(), &LoadOptions::default());
        assert_eq!(result.sources, vec!["AGENT.md".to_string()]);
    }

    #[test]
    fn empty_work_dir_yields_empty_result() {
        let result = load(Path::new(""), &LoadOptions::default());
        assert_eq!(result, LoadResult::default());
    }

    #[test]
    fn repeated_loads_are_byte_identical() {
        let repo = repo_with_git();
        let sub = repo.path().join("pkg");
        fs::create_dir_all(&sub).unwrap();
        fs::write(repo.path().join("AGENT.md"), "root").unwrap();
        fs::write(sub.join("AGENT.md"), "pkg").unwrap();

        let first = load(&sub, &LoadOptions::default());
        let second = load(&sub, &LoadOptions::default());
        assert_eq!(first, second);
    }

    #[test]
    fn dirs_from_root_enumerates_path() {
        let root = Path::new("/repo");
        let leaf = Path::new("/repo/a/b");
        let dirs = dirs_from_root(root, leaf);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/repo"),
                PathBuf::from("/repo/a"),
                PathBuf::from("/repo/a/b"),
            ]
        );
    }

    #[test]
    fn floor_char_boundary_respects_utf8() {
        let s = "héllo";
        // 'é' is two bytes starting at index 1.
        assert_eq!(floor_char_boundary(s, 2), 1);
        assert_eq!(floor_char_boundary(s, 3), 3);
        assert_eq!(floor_char_boundary(s, 100), s.len());
    }
}
