//! Slash-command parsing for explicit skill invocation.
//!
//! A user message whose first token is `/name` is an invocation of the
//! skill `name`; everything after the token is the argument text.
//! Names are restricted to `[A-Za-z0-9_./-]`; anything else means the
//! message is not a skill command and falls through untouched.

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')
}

/// Parse a `/name args` command from a user message.
///
/// Returns `(name, arguments)` when the message is a well-formed slash
/// command, `None` otherwise.
pub fn parse_slash_command(text: &str) -> Option<(String, String)> {
    let trimmed = text.trim_start();
    let rest = trimmed.strip_prefix('/')?;

    let name_len: usize = rest
        .chars()
        .take_while(|c| is_name_char(*c))
        .map(char::len_utf8)
        .sum();
    if name_len == 0 {
        return None;
    }
    let (name, tail) = rest.split_at(name_len);

    // The token must end at whitespace or end of message.
    if let Some(next) = tail.chars().next() {
        if !next.is_whitespace() {
            return None;
        }
    }

    Some((name.to_string(), tail.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_arguments() {
        assert_eq!(
            parse_slash_command("/deploy staging"),
            Some(("deploy".into(), "staging".into()))
        );
    }

    #[test]
    fn parses_bare_command() {
        assert_eq!(parse_slash_command("/review"), Some(("review".into(), String::new())));
    }

    #[test]
    fn arguments_keep_interior_whitespace() {
        assert_eq!(
            parse_slash_command("/run  a  b c "),
            Some(("run".into(), "a  b c".into()))
        );
    }

    #[test]
    fn allows_name_charset() {
        assert_eq!(
            parse_slash_command("/ops/roll-back.v2_1 now"),
            Some(("ops/roll-back.v2_1".into(), "now".into()))
        );
    }

    #[test]
    fn non_slash_messages_fall_through() {
        assert_eq!(parse_slash_command("deploy staging"), None);
        assert_eq!(parse_slash_command(""), None);
    }

    #[test]
    fn invalid_token_is_not_a_command() {
        assert_eq!(parse_slash_command("/"), None);
        assert_eq!(parse_slash_command("/bad!name args"), None);
    }

    #[test]
    fn leading_whitespace_is_tolerated() {
        assert_eq!(
            parse_slash_command("  /deploy staging"),
            Some(("deploy".into(), "staging".into()))
        );
    }
}
