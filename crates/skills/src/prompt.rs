//! Skill metadata block for system prompts.
//!
//! Discovered skills are surfaced to the model as a bounded markdown
//! block of one-line summaries: progressive disclosure keeps full
//! SKILL.md bodies out of the prompt until the model asks for them.

use std::collections::HashMap;

use crate::{floor_char_boundary, Skill, DEFAULT_PROMPT_BLOCK_MAX_BYTES};

const MAX_DESCRIPTION_CHARS: usize = 180;

/// A rendered metadata block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptBlock {
    pub content: String,
    pub skill_count: usize,
    pub truncated: bool,
}

/// Render skill metadata for prompt injection, bounded by `max_bytes`.
///
/// Duplicate names (case-insensitive) are collapsed to the candidate
/// with the highest precedence; skills marked `disable-model-invocation`
/// are omitted entirely.
pub fn build_prompt_block(skills: &[Skill], max_bytes: usize) -> PromptBlock {
    let visible = canonicalize(skills);
    if visible.is_empty() {
        return PromptBlock::default();
    }
    let max_bytes = if max_bytes == 0 {
        DEFAULT_PROMPT_BLOCK_MAX_BYTES
    } else {
        max_bytes
    };

    let header = concat!(
        "## Available Skills\n",
        "\n",
        "Skills use progressive disclosure: start from this metadata, then call `read_skill` to load the full `SKILL.md` only when needed.\n",
        "Use `list_skills` to refresh discovery if paths change during execution.\n",
        "\n",
    );

    let mut content = String::with_capacity(max_bytes.min(16 * 1024));
    let mut remaining = max_bytes;
    let mut truncated = false;
    let mut count = 0usize;

    let mut write_capped = |content: &mut String, text: &str, remaining: &mut usize| -> bool {
        if *remaining == 0 {
            return false;
        }
        if text.len() <= *remaining {
            content.push_str(text);
            *remaining -= text.len();
            true
        } else {
            let cut = floor_char_boundary(text, *remaining);
            content.push_str(&text[..cut]);
            *remaining = 0;
            false
        }
    };

    if !write_capped(&mut content, header, &mut remaining) {
        truncated = true;
    }

    for skill in &visible {
        let mut desc = skill.description.trim().to_string();
        if desc.is_empty() {
            desc = "No description.".into();
        }
        if desc.chars().count() > MAX_DESCRIPTION_CHARS {
            desc = desc.chars().take(MAX_DESCRIPTION_CHARS).collect::<String>() + "...";
        }
        let line = format!(
            "- `{}` [{}]: {} (path: `{}`)\n",
            skill.name,
            skill.scope,
            desc,
            skill.path.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"),
        );
        if remaining == 0 {
            truncated = true;
            break;
        }
        if !write_capped(&mut content, &line, &mut remaining) {
            truncated = true;
            break;
        }
        count += 1;
    }

    PromptBlock {
        content: content.trim().to_string(),
        skill_count: count,
        truncated,
    }
}

/// Collapse duplicate names, keeping the highest-precedence candidate,
/// and drop model-hidden skills. Output is ordered by name then path.
fn canonicalize(skills: &[Skill]) -> Vec<Skill> {
    let mut best: HashMap<String, &Skill> = HashMap::new();
    for skill in skills {
        if skill.disable_model_invocation {
            continue;
        }
        let key = skill.name.to_ascii_lowercase();
        match best.get(&key) {
            Some(current) if !wins(skill, current) => {}
            _ => {
                best.insert(key, skill);
            }
        }
    }

    let mut out: Vec<Skill> = best.into_values().cloned().collect();
    out.sort_by(|a, b| {
        a.name
            .to_ascii_lowercase()
            .cmp(&b.name.to_ascii_lowercase())
            .then_with(|| a.path.cmp(&b.path))
    });
    out
}

fn wins(challenger: &Skill, incumbent: &Skill) -> bool {
    let (cs, is) = (challenger.precedence_score(), incumbent.precedence_score());
    if cs != is {
        return cs > is;
    }
    challenger.path < incumbent.path
}
