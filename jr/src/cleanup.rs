//! Lexical cleanup: the second repair attempt
//!
//! Rewrites only what sits outside string literals, apart from raw control
//! characters inside strings, which are escaped or dropped.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)(?:```|\z)").expect("valid fenced block regex")
});

/// Apply every lexical fix and return the cleaned text
pub fn lexical_cleanup(text: &str) -> String {
    debug!(len = text.len(), "lexical_cleanup: called");
    let payload = extract_payload(text);
    normalize(payload)
}

/// Narrow `text` to the JSON payload: fenced block contents, minus leading
/// and trailing prose around the outermost object or array
fn extract_payload(text: &str) -> &str {
    let mut payload = text.trim();

    if payload.contains("```")
        && let Some(inner) = FENCED_BLOCK.captures(payload).and_then(|caps| caps.get(1))
    {
        payload = inner.as_str().trim();
    }

    match payload.find(['{', '[']) {
        Some(start) => payload = &payload[start..],
        None => return payload,
    }

    if let Some(end) = balancing_closer(payload) {
        payload = &payload[..end];
    }

    payload
}

/// Byte offset just past the closer that balances the opener at `text[0]`
///
/// Closers that do not match the innermost open container are skipped, so
/// stray brackets are left for structural repair. `None` when the payload
/// never balances, which is the truncated case.
fn balancing_closer(text: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    let mut open: Vec<char> = Vec::new();

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' if open.last() == Some(&c) => {
                open.pop();
                if open.is_empty() {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-')
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace() && !c.is_control())
}

/// String-aware pass: control characters, trailing commas, bare keys
fn normalize(payload: &str) -> String {
    let chars: Vec<char> = payload.chars().collect();
    let mut out = String::with_capacity(payload.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut last_significant: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
            } else if c == '\\' {
                escaped = true;
                out.push(c);
            } else if c == '"' {
                in_string = false;
                last_significant = Some('"');
                out.push(c);
            } else {
                match c {
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c if c.is_control() => {}
                    c => out.push(c),
                }
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' if matches!(next_significant(&chars, i + 1), Some('}' | ']')) => {}
            c if is_ident_start(c) && matches!(last_significant, Some('{' | ',')) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if next_significant(&chars, i) == Some(':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                last_significant = ident.chars().last();
                continue;
            }
            '\n' | '\r' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => {
                if !c.is_whitespace() {
                    last_significant = Some(c);
                }
                out.push(c);
            }
        }
        i += 1;
    }

    out
}
