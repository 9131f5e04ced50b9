//! Allowed-tools policy matching.
//!
//! Skill authors write patterns in several dialects (Claude-style
//! capitalized names, `prefix:*` globs, plain tool names); the agent's
//! tools use snake_case names. Matching normalizes both sides and maps
//! a small set of semantic aliases onto the built-in tool names.

/// Tool name that is always exempt from allowlist enforcement, so a
/// user can switch skills even under a restrictive policy.
pub const EXEMPT_TOOL: &str = "use_skill";

const SKILL_TOOLS: [&str; 3] = ["list_skills", "read_skill", "use_skill"];

/// Whether `tool` may run under the given patterns.
///
/// An empty pattern list means unconstrained.
pub fn is_tool_allowed(tool: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let tool = tool.trim().to_ascii_lowercase();
    patterns.iter().any(|p| pattern_matches(&tool, p))
}

fn pattern_matches(tool: &str, raw_pattern: &str) -> bool {
    let pattern = normalize_pattern(raw_pattern);
    if pattern.is_empty() {
        return false;
    }
    if pattern == "*" {
        return true;
    }

    // `prefix:*` is shorthand for `prefix_*` (e.g. `git:*` -> `git_*`).
    if let Some(prefix) = pattern.strip_suffix(":*") {
        return tool.starts_with(&format!("{prefix}_"));
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return tool.starts_with(prefix);
    }

    match pattern.as_str() {
        "bash" => tool == "bash",
        "git" => tool.starts_with("git_"),
        "read" | "grep" | "glob" | "ls" => tool == "read_file" || tool == "list_files",
        "write" | "edit" => tool == "write_file",
        "skill" | "skills" => SKILL_TOOLS.contains(&tool),
        _ => tool == pattern,
    }
}

/// Lowercase, strip surrounding quotes, and drop any trailing `(...)`
/// argument suffix (`Bash(git add:*)` -> `bash`).
fn normalize_pattern(raw: &str) -> String {
    let mut pattern = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if pattern.ends_with(')') {
        if let Some(open) = pattern.find('(') {
            pattern = pattern[..open].trim_end();
        }
    }
    pattern.to_ascii_lowercase()
}

/// Parse the newline- or comma-joined env representation back into a
/// pattern list.
pub fn parse_allowed_tools_env(raw: &str) -> Vec<String> {
    raw.split(|c| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Join patterns for storage in the tool context environment.
pub fn join_allowed_tools_env(patterns: &[String]) -> String {
    patterns
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_patterns_allow_everything() {
        assert!(is_tool_allowed("write_file", &[]));
    }

    #[test]
    fn star_allows_everything() {
        assert!(is_tool_allowed("anything", &patterns(&["*"])));
    }

    #[test]
    fn literal_match_is_case_insensitive() {
        assert!(is_tool_allowed("bash", &patterns(&["Bash"])));
        assert!(is_tool_allowed("read_file", &patterns(&["read_file"])));
        assert!(!is_tool_allowed("write_file", &patterns(&["Bash", "Read"])));
    }

    #[test]
    fn prefix_star_matches() {
        assert!(is_tool_allowed("git_commit", &patterns(&["git*"])));
        assert!(is_tool_allowed("git_commit", &patterns(&["git_*"])));
        assert!(!is_tool_allowed("bash", &patterns(&["git*"])));
    }

    #[test]
    fn colon_star_is_underscore_prefix() {
        assert!(is_tool_allowed("git_commit", &patterns(&["git:*"])));
        assert!(!is_tool_allowed("github_issue", &patterns(&["git:*"])));
        assert!(is_tool_allowed("fs_read", &patterns(&["fs:*"])));
    }

    #[test]
    fn argument_suffix_is_stripped() {
        assert!(is_tool_allowed("bash", &patterns(&["Bash(git add:*)"])));
    }

    #[test]
    fn read_aliases_map_to_file_tools() {
        for alias in ["Read", "Grep", "Glob", "LS"] {
            assert!(is_tool_allowed("read_file", &patterns(&[alias])), "{alias}");
            assert!(is_tool_allowed("list_files", &patterns(&[alias])), "{alias}");
            assert!(!is_tool_allowed("write_file", &patterns(&[alias])), "{alias}");
        }
    }

    #[test]
    fn write_aliases_map_to_write_file() {
        for alias in ["Write", "Edit"] {
            assert!(is_tool_allowed("write_file", &patterns(&[alias])), "{alias}");
            assert!(!is_tool_allowed("read_file", &patterns(&[alias])), "{alias}");
        }
    }

    #[test]
    fn git_alias_matches_git_tools() {
        assert!(is_tool_allowed("git_status", &patterns(&["git"])));
        assert!(!is_tool_allowed("bash", &patterns(&["git"])));
    }

    #[test]
    fn skill_alias_matches_skill_tools() {
        for tool in ["list_skills", "read_skill", "use_skill"] {
            assert!(is_tool_allowed(tool, &patterns(&["skills"])), "{tool}");
            assert!(is_tool_allowed(tool, &patterns(&["Skill"])), "{tool}");
        }
        assert!(!is_tool_allowed("bash", &patterns(&["skills"])));
    }

    #[test]
    fn quoted_patterns_are_unwrapped() {
        assert!(is_tool_allowed("bash", &patterns(&["\"Bash\""])));
        assert!(is_tool_allowed("git_log", &patterns(&["'git:*'"])));
    }

    #[test]
    fn env_round_trip() {
        let list = patterns(&["Bash", "git:*", "Read"]);
        let joined = join_allowed_tools_env(&list);
        assert_eq!(joined, "Bash\ngit:*\nRead");
        assert_eq!(parse_allowed_tools_env(&joined), list);
        assert_eq!(parse_allowed_tools_env("a, b,\nc"), patterns(&["a", "b", "c"]));
    }
}
