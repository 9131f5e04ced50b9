//! SOUL persona file loading.
//!
//! A SOUL.md file defines the agent's character and behavioral
//! directives. An explicit path short-circuits discovery; otherwise the
//! working directory is probed first, then the repository root.

use std::path::{Path, PathBuf};

use crate::{absolutize, find_repo_root, floor_char_boundary};

/// The default SOUL file name.
pub const DEFAULT_FILE_NAME: &str = "SOUL.md";

/// Default cap on loaded SOUL content.
pub const DEFAULT_MAX_BYTES: usize = 16 * 1024;

/// Options for SOUL loading.
#[derive(Debug, Clone, Default)]
pub struct SoulOptions {
    /// Explicit path to the SOUL file. When set, only this path is
    /// tried (no discovery).
    pub file: Option<PathBuf>,

    /// Cap on the loaded content. Zero means [`DEFAULT_MAX_BYTES`].
    pub max_bytes: usize,
}

/// The output of SOUL loading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoulResult {
    /// The SOUL content, trimmed. Empty means absent.
    pub content: String,

    /// The resolved file path (empty if not found).
    pub source: PathBuf,

    /// Whether the content hit the byte cap.
    pub truncated: bool,
}

/// Load the SOUL persona content for a working directory.
pub fn load(work_dir: &Path, opts: &SoulOptions) -> SoulResult {
    let max_bytes = if opts.max_bytes == 0 {
        DEFAULT_MAX_BYTES
    } else {
        opts.max_bytes
    };

    if let Some(file) = &opts.file {
        return read_soul_file(file, max_bytes);
    }

    if work_dir.as_os_str().is_empty() {
        return SoulResult::default();
    }

    let work_dir = absolutize(work_dir);

    let result = read_soul_file(&work_dir.join(DEFAULT_FILE_NAME), max_bytes);
    if !result.content.is_empty() {
        return result;
    }

    let root = find_repo_root(&work_dir);
    if root != work_dir {
        let result = read_soul_file(&root.join(DEFAULT_FILE_NAME), max_bytes);
        if !result.content.is_empty() {
            return result;
        }
    }

    SoulResult::default()
}

fn read_soul_file(path: &Path, max_bytes: usize) -> SoulResult {
    let Ok(data) = std::fs::read_to_string(path) else {
        return SoulResult::default();
    };

    let mut content = data.trim().to_string();
    if content.is_empty() {
        return SoulResult::default();
    }

    let mut truncated = false;
    if content.len() > max_bytes {
        let cut = floor_char_boundary(&content, max_bytes);
        content.truncate(cut);
        truncated = true;
    }

    SoulResult {
        content,
        source: path.to_path_buf(),
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn explicit_file_short_circuits_discovery() {
        let dir = TempDir::new().unwrap();
        let persona = dir.path().join("persona.md");
        fs::write(&persona, "Be terse.").unwrap();
        // A discoverable SOUL.md that must be ignored.
        fs::write(dir.path().join("SOUL.md"), "Be verbose.").unwrap();

        let result = load(
            dir.path(),
            &SoulOptions {
                file: Some(persona.clone()),
                ..Default::default()
            },
        );
        assert_eq!(result.content, "Be terse.");
        assert_eq!(result.source, persona);
    }

    #[test]
    fn probes_work_dir_then_repo_root() {
        let repo = TempDir::new().unwrap();
        fs::create_dir(repo.path().join(".git")).unwrap();
        let sub = repo.path().join("svc");
        fs::create_dir(&sub).unwrap();
        fs::write(repo.path().join("SOUL.md"), "root persona").unwrap();

        let result = load(&sub, &SoulOptions::default());
        assert_eq!(result.content, "root persona");

        fs::write(sub.join("SOUL.md"), "leaf persona").unwrap();
        let result = load(&sub, &SoulOptions::default());
        assert_eq!(result.content, "leaf persona");
    }

    #[test]
    fn empty_file_is_absent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("SOUL.md"), "  \n\t").unwrap();

        let result = load(dir.path(), &SoulOptions::default());
        assert_eq!(result, SoulResult::default());
    }

    #[test]
    fn missing_explicit_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let result = load(
            dir.path(),
            &SoulOptions {
                file: Some(dir.path().join("nope.md")),
                ..Default::default()
            },
        );
        assert_eq!(result, SoulResult::default());
    }

    #[test]
    fn content_is_capped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("SOUL.md"), "x".repeat(64)).unwrap();

        let result = load(
            dir.path(),
            &SoulOptions {
                max_bytes: 16,
                ..Default::default()
            },
        );
        assert!(result.truncated);
        assert_eq!(result.content.len(), 16);
    }
}
