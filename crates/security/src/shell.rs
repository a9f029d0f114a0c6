//! Shell command classification for the permission gate.
//!
//! A compound command is split into sub-commands on `|`, `||`, `&&`, `&`,
//! `;` and newlines outside of quotes. Each sub-command is then matched
//! against a destructive pattern set and a read-only allow-list.

use regex::{Regex, RegexSet};
use std::sync::LazyLock;

static DESTRUCTIVE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // recursive or forced delete
        r"\brm\s+(-[a-zA-Z]*[fr]|--force|--recursive)",
        r"\bRemove-Item\s+.*-Recurse",
        // privilege escalation
        r"\bsudo\b",
        r"\bdoas\b",
        // filesystem formatting
        r"\bmkfs(\.\w+)?\b",
        r"^format\s",
        // raw device writes
        r"\bdd\s+if=",
        r">\s*/dev/(sd|nvme|hd|disk)",
        // ownership or mode changes on absolute paths
        r"\b(chmod|chown)\s+.*/",
    ])
    .expect("destructive patterns are valid")
});

static READ_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(ls|pwd|cat|head|tail|wc|echo|which|type|file|stat|du|df|env|printenv|git\s+(status|log|diff|branch|show|remote|tag))\b",
    )
    .expect("read-only pattern is valid")
});

/// Split a compound command on `|`, `||`, `&&`, `&`, `;` and newlines,
/// respecting single and double quotes. Parts are trimmed and empty parts
/// dropped. The `&` of a redirect such as `2>&1` or `&>` does not split.
pub fn split_shell_commands(command: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(ch);
            }
            _ if in_single || in_double => current.push(ch),
            '|' => {
                if chars.peek() == Some(&'|') {
                    chars.next();
                }
                parts.push(std::mem::take(&mut current));
            }
            '&' if current.ends_with('>') || chars.peek() == Some(&'>') => current.push(ch),
            '&' => {
                if chars.peek() == Some(&'&') {
                    chars.next();
                }
                parts.push(std::mem::take(&mut current));
            }
            ';' | '\n' => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Whether a single sub-command matches the destructive pattern set.
pub fn is_destructive(sub_command: &str) -> bool {
    DESTRUCTIVE.is_match(sub_command.trim())
}

/// Whether a single sub-command only reads. Output redirection and command
/// or process substitution disqualify it.
pub fn is_read_only(sub_command: &str) -> bool {
    let c = sub_command.trim();
    READ_ONLY.is_match(c) && !runs_or_writes_elsewhere(c)
}

/// Unquoted `>`, `<(` or `>(`, or a `$(` or backtick outside single quotes
/// (double quotes still expand those).
fn runs_or_writes_elsewhere(command: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = command.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            _ if in_single => {}
            '`' => return true,
            '$' if chars.peek() == Some(&'(') => return true,
            _ if in_double => {}
            '>' => return true,
            '<' if chars.peek() == Some(&'(') => return true,
            _ => {}
        }
    }
    false
}
