//! Inline environment-file interpreter.
//!
//! `build_env` and `deploy_env` hooks are plain-text assignment lists, not
//! shell scripts. The grammar is deliberately narrow so its behavior stays
//! auditable: one `NAME=value` per line (an `export ` prefix is tolerated),
//! `#` comments, single/double quoting of the whole value, and
//! `$NAME` / `${NAME}` / `${NAME:-default}` substitution. Defaults may
//! reference variables with the `$NAME` form; a nested `${...}` inside a
//! default is rejected as malformed.

use std::collections::BTreeMap;
use std::collections::btree_map;

/// A point-in-time snapshot of a process environment.
///
/// Created once per phase invocation, mutated only by inline stages, and
/// copied by value into every child process. The runner never writes back
/// into its own global environment, which keeps repeated phase invocations
/// independent of each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSet {
    vars: BTreeMap<String, String>,
}

impl EnvironmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the calling process's environment.
    pub fn from_process_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<(String, String)> for EnvironmentSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Evaluation failure for an inline environment file. Carries the 1-based
/// line number so operators can find the offending statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvEvalError {
    #[error("line {line}: not an assignment: `{text}`")]
    NotAssignment { line: usize, text: String },

    #[error("line {line}: invalid variable name in `{text}`")]
    BadName { line: usize, text: String },

    #[error("line {line}: unterminated quote in `{text}`")]
    UnterminatedQuote { line: usize, text: String },

    #[error("line {line}: unterminated `${{...}}` substitution in `{text}`")]
    UnterminatedSubst { line: usize, text: String },
}

/// Evaluate `content` against `env`, merging every assignment in order.
///
/// Returns the names that were assigned (first-assignment order, deduped).
/// Any malformed statement aborts evaluation; `env` may already contain
/// assignments from lines preceding the malformed one, so callers must
/// treat an `Err` as fatal for the whole phase.
pub fn apply(content: &str, env: &mut EnvironmentSet) -> Result<Vec<String>, EnvEvalError> {
    let mut assigned: Vec<String> = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let stmt = raw.trim();
        if stmt.is_empty() || stmt.starts_with('#') {
            continue;
        }
        let stmt = stmt
            .strip_prefix("export ")
            .map_or(stmt, str::trim_start);
        let Some((name, value)) = stmt.split_once('=') else {
            return Err(EnvEvalError::NotAssignment {
                line,
                text: stmt.to_string(),
            });
        };
        if !is_valid_name(name) {
            return Err(EnvEvalError::BadName {
                line,
                text: stmt.to_string(),
            });
        }
        let expanded = expand_value(value, env, line)?;
        env.set(name, expanded);
        if !assigned.iter().any(|n| n == name) {
            assigned.push(name.to_string());
        }
    }
    Ok(assigned)
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Expand one value. Single quotes suppress substitution; double quotes and
/// bare values substitute. Quotes are only recognized around the whole
/// value.
fn expand_value(value: &str, env: &EnvironmentSet, line: usize) -> Result<String, EnvEvalError> {
    if let Some(rest) = value.strip_prefix('\'') {
        return strip_closing_quote(rest, '\'', value, line).map(str::to_string);
    }
    if let Some(rest) = value.strip_prefix('"') {
        let inner = strip_closing_quote(rest, '"', value, line)?;
        return substitute(inner, env, line);
    }
    substitute(value, env, line)
}

fn strip_closing_quote<'a>(
    rest: &'a str,
    quote: char,
    original: &str,
    line: usize,
) -> Result<&'a str, EnvEvalError> {
    match rest.find(quote) {
        Some(pos) if pos == rest.len() - quote.len_utf8() => Ok(&rest[..pos]),
        _ => Err(EnvEvalError::UnterminatedQuote {
            line,
            text: original.to_string(),
        }),
    }
}

fn substitute(input: &str, env: &EnvironmentSet, line: usize) -> Result<String, EnvEvalError> {
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let rest = &input[i..];
        let Some(c) = rest.chars().next() else {
            break;
        };
        if c != '$' {
            out.push(c);
            i += c.len_utf8();
            continue;
        }
        let after = &rest[1..];
        if let Some(body_and_rest) = after.strip_prefix('{') {
            let Some(end) = body_and_rest.find('}') else {
                return Err(EnvEvalError::UnterminatedSubst {
                    line,
                    text: input.to_string(),
                });
            };
            let body = &body_and_rest[..end];
            let (name, default) = match body.split_once(":-") {
                Some((n, d)) => (n, Some(d)),
                None => (body, None),
            };
            if !is_valid_name(name) {
                return Err(EnvEvalError::BadName {
                    line,
                    text: input.to_string(),
                });
            }
            match env.get(name) {
                Some(v) if !v.is_empty() => out.push_str(v),
                _ => {
                    if let Some(d) = default {
                        out.push_str(&substitute(d, env, line)?);
                    }
                }
            }
            // consumed: "${" + body + "}"
            i += 2 + end + 1;
        } else {
            let name_len = after
                .char_indices()
                .take_while(|&(pos, ch)| {
                    if pos == 0 {
                        ch.is_ascii_alphabetic() || ch == '_'
                    } else {
                        ch.is_ascii_alphanumeric() || ch == '_'
                    }
                })
                .count();
            if name_len == 0 {
                out.push('$');
                i += 1;
            } else {
                let name = &after[..name_len];
                out.push_str(env.get(name).unwrap_or(""));
                i += 1 + name_len;
            }
        }
    }
    Ok(out)
}
