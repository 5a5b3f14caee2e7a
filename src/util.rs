//! Small shared helpers.

/// Quote a value for use in a POSIX shell `export` statement.
///
/// Values made only of safe characters pass through unquoted; everything
/// else is single-quoted, with embedded single quotes rewritten to the
/// `'\''` sequence.
pub fn shell_single_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/' | b':'));
    if safe {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_values_pass_through() {
        assert_eq!(shell_single_quote("8080"), "8080");
        assert_eq!(shell_single_quote("/usr/local/bin"), "/usr/local/bin");
        assert_eq!(shell_single_quote("a-b_c.d:e"), "a-b_c.d:e");
    }

    #[test]
    fn empty_value_is_quoted() {
        assert_eq!(shell_single_quote(""), "''");
    }

    #[test]
    fn spaces_force_quoting() {
        assert_eq!(shell_single_quote("hello world"), "'hello world'");
    }

    #[test]
    fn dollar_signs_are_not_expanded_by_the_shell() {
        assert_eq!(shell_single_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn embedded_single_quote_round_trips() {
        assert_eq!(shell_single_quote("it's"), "'it'\\''s'");
    }
}
