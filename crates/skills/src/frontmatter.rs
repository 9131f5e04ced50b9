//! SKILL.md front matter parsing.
//!
//! Front matter is a `---`-delimited block of `key: value` lines at the
//! top of the file, a deliberate YAML subset: scalars, quoted strings,
//! booleans, and `- item` lists. Unknown keys are ignored; a malformed
//! block is treated as body text.

/// Parsed front matter fields, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    pub name: String,
    pub description: String,
    pub invocation: String,
    pub user_invocable: bool,
    pub disable_model_invocation: bool,
    pub allowed_tools: Vec<String>,
}

impl Default for FrontMatter {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            invocation: String::new(),
            user_invocable: true,
            disable_model_invocation: false,
            allowed_tools: Vec::new(),
        }
    }
}

/// Parse front matter from raw SKILL.md content.
///
/// Returns the parsed fields and the body (everything after the closing
/// `---`, or the whole text when no front matter is present).
pub fn parse(data: &str) -> (FrontMatter, String) {
    let text = data.replace("\r\n", "\n");
    let mut front = FrontMatter::default();

    let Some(rest) = text.strip_prefix("---\n") else {
        return (front, text);
    };
    let Some(end) = rest.find("\n---\n") else {
        return (front, text);
    };

    let block = &rest[..end];
    let body = rest[end + "\n---\n".len()..].to_string();

    let lines: Vec<&str> = block.lines().collect();
    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx].trim();
        idx += 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = unquote(value.trim());

        match key.as_str() {
            "name" => front.name = value,
            "description" => front.description = value,
            "invocation" => front.invocation = value,
            "user-invocable" => {
                if let Some(flag) = parse_bool(&value) {
                    front.user_invocable = flag;
                }
            }
            "disable-model-invocation" => {
                if let Some(flag) = parse_bool(&value) {
                    front.disable_model_invocation = flag;
                }
            }
            "allowed-tools" => {
                if value.is_empty() {
                    // YAML-style list on the following lines.
                    while idx < lines.len() {
                        let item = lines[idx].trim();
                        let Some(entry) = item.strip_prefix("- ") else {
                            break;
                        };
                        idx += 1;
                        let entry = unquote(entry.trim());
                        if !entry.is_empty() {
                            front.allowed_tools.push(entry);
                        }
                    }
                } else {
                    front.allowed_tools.extend(
                        value
                            .split(',')
                            .map(|s| unquote(s.trim()))
                            .filter(|s| !s.is_empty()),
                    );
                }
            }
            _ => {}
        }
    }

    (front, body)
}

fn unquote(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
