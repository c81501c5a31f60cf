//! Shell command write classification.
//!
//! Decides whether a literal command string mutates the workspace or system
//! state. The interceptor consults this when the execution mode restricts
//! writes; commands are split into pipeline/sequence segments first so that
//! `ls -la && git status` stays read-only while `ls && rm x` does not.

use once_cell::sync::Lazy;
use regex::Regex;

/// Judges whether a literal command string is a mutating operation.
pub trait CommandClassifier: Send + Sync {
    fn is_write_operation(&self, command: &str) -> bool;
}

/// In-place edit flags make otherwise read-only filters into writers.
static SED_IN_PLACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsed\b[^|;&]*\s-i\b").unwrap());

/// Commands that always mutate, regardless of arguments.
const MUTATING_COMMANDS: &[&str] = &[
    "rm", "rmdir", "mkdir", "mv", "cp", "touch", "chmod", "chown", "ln", "tee", "dd", "truncate",
    "install", "tar", "unzip", "patch", "npm", "yarn", "pnpm", "bun", "pip", "cargo", "make",
    "cmake", "ninja",
];

/// Git subcommands that are safe to run without mutating the repository.
const READ_ONLY_GIT_SUBCOMMANDS: &[&str] = &[
    "status",
    "diff",
    "show",
    "log",
    "grep",
    "blame",
    "rev-parse",
    "ls-files",
];

/// Default classifier implementing the table-driven policy above.
#[derive(Debug, Default)]
pub struct ShellClassifier;

impl ShellClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl CommandClassifier for ShellClassifier {
    fn is_write_operation(&self, command: &str) -> bool {
        split_segments(command)
            .iter()
            .any(|segment| segment_mutates(segment))
    }
}

/// Split a command line on unquoted `;`, `|`, `||`, `&`, `&&`.
fn split_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }

        match ch {
            '\\' if !in_single => {
                current.push(ch);
                escaped = true;
            }
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(ch);
            }
            ';' | '|' | '&' if !in_single && !in_double => {
                if matches!(chars.peek(), Some(next) if *next == ch) {
                    let _ = chars.next();
                }
                push_segment(&mut segments, &mut current);
            }
            _ => current.push(ch),
        }
    }

    push_segment(&mut segments, &mut current);
    segments
}

fn push_segment(segments: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
    current.clear();
}

fn segment_mutates(segment: &str) -> bool {
    if has_unquoted_output_redirect(segment) {
        return true;
    }
    if SED_IN_PLACE.is_match(segment) {
        return true;
    }

    let tokens = tokenize(segment);
    let tokens = skip_env_assignments(&tokens);
    let Some(command) = tokens.first().map(|t| t.to_ascii_lowercase()) else {
        return false;
    };

    if MUTATING_COMMANDS.contains(&command.as_str()) {
        return true;
    }

    if command == "git" {
        let subcommand = tokens.get(1).map(|s| s.to_ascii_lowercase());
        return match subcommand.as_deref() {
            Some(sub) => !READ_ONLY_GIT_SUBCOMMANDS.contains(&sub),
            None => false,
        };
    }

    false
}

fn tokenize(segment: &str) -> Vec<String> {
    shell_words::split(segment).unwrap_or_else(|_| {
        segment
            .split_whitespace()
            .map(ToString::to_string)
            .collect()
    })
}

fn is_env_assignment(token: &str) -> bool {
    let Some((key, _)) = token.split_once('=') else {
        return false;
    };
    !key.is_empty() && key.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn skip_env_assignments(tokens: &[String]) -> &[String] {
    let mut idx = 0;
    while idx < tokens.len() && is_env_assignment(&tokens[idx]) {
        idx += 1;
    }
    &tokens[idx..]
}

fn has_unquoted_output_redirect(segment: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for ch in segment.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if !in_single => escaped = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '>' if !in_single && !in_double => return true,
            _ => {}
        }
    }

    false
}
