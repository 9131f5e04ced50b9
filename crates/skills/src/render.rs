//! Skill body rendering for invocation.
//!
//! Rendering strips the front matter and substitutes the argument and
//! session placeholders. When the invocation carries arguments but the
//! body has no placeholder for them, the arguments are appended as a
//! trailing block so they are never silently dropped.

use crate::frontmatter;
use crate::{read_file, Skill, SkillError};

/// A rendered skill body.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub rendered: String,
    pub truncated: bool,
}

/// Render a skill body for invocation with the given arguments.
pub fn render_for_invocation(
    skill: &Skill,
    args: &str,
    session_id: &str,
    max_bytes: usize,
) -> Result<Rendered, SkillError> {
    let (raw, truncated) = read_file(&skill.path, max_bytes)?;
    let capped = raw.trim();

    let (_, body) = frontmatter::parse(capped);
    let body = body.trim();

    let args = args.trim();
    let session_id = session_id.trim();

    let had_arguments_placeholder =
        body.contains("${ARGUMENTS}") || body.contains("$ARGUMENTS");

    let mut rendered = body
        .replace("${ARGUMENTS}", args)
        .replace("$ARGUMENTS", args)
        .replace("${CLAUDE_SESSION_ID}", session_id);

    if !args.is_empty() && !had_arguments_placeholder {
        if !rendered.is_empty() {
            rendered.push_str("\n\n");
        }
        rendered.push_str("ARGUMENTS:\n");
        rendered.push_str(args);
    }

    Ok(Rendered { rendered, truncated })
}
