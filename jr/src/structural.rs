//! Structural repair of truncated JSON
//!
//! One left-to-right scan records the open containers; the repair then
//! drops the incomplete trailing fragment and closes what is still open,
//! innermost first.

use serde_json::Value;
use tracing::debug;

/// Key of the array whose elements are cut whole rather than half-closed
pub const RECOMMENDATIONS_KEY: &str = "recommendations";

/// Transient scanner state for one repair call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairState {
    /// Scanner is inside a string literal
    pub in_string: bool,

    /// Previous character was an unconsumed backslash
    pub escaped: bool,

    /// Unmatched `{` outside string literals
    pub open_braces: usize,

    /// Unmatched `[` outside string literals
    pub open_brackets: usize,
}

impl RepairState {
    fn open(&mut self, kind: ContainerKind) {
        match kind {
            ContainerKind::Object => self.open_braces += 1,
            ContainerKind::Array => self.open_brackets += 1,
        }
    }

    fn close(&mut self, kind: ContainerKind) {
        match kind {
            ContainerKind::Object => self.open_braces = self.open_braces.saturating_sub(1),
            ContainerKind::Array => self.open_brackets = self.open_brackets.saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContainerKind {
    Object,
    Array,
}

impl ContainerKind {
    fn from_delimiter(c: char) -> Self {
        if matches!(c, '{' | '}') { Self::Object } else { Self::Array }
    }

    fn closer(self) -> char {
        match self {
            Self::Object => '}',
            Self::Array => ']',
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OpenContainer {
    pub kind: ContainerKind,
    /// Byte offset of the opening delimiter in the scanned text
    pub offset: usize,
    /// Property name this container is the value of
    pub key: Option<String>,
    /// For arrays: byte offset just past the last complete element
    pub last_complete_end: Option<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct Scan {
    /// Input with stray closers removed
    pub text: String,
    pub state: RepairState,
    pub stack: Vec<OpenContainer>,
    /// Byte offsets of every opening quote in `text`
    pub string_starts: Vec<usize>,
}

pub(crate) fn scan(input: &str) -> Scan {
    let mut scan = Scan {
        text: String::with_capacity(input.len() + 8),
        ..Default::default()
    };
    let mut literal = String::new();
    let mut pending_string: Option<String> = None;
    let mut pending_key: Option<String> = None;

    for c in input.chars() {
        if scan.state.in_string {
            scan.text.push(c);
            if scan.state.escaped {
                scan.state.escaped = false;
                literal.push(c);
            } else if c == '\\' {
                scan.state.escaped = true;
            } else if c == '"' {
                scan.state.in_string = false;
                pending_string = Some(std::mem::take(&mut literal));
            } else {
                literal.push(c);
            }
            continue;
        }

        match c {
            '"' => {
                scan.state.in_string = true;
                scan.string_starts.push(scan.text.len());
                literal.clear();
                scan.text.push(c);
            }
            '{' | '[' => {
                let kind = ContainerKind::from_delimiter(c);
                let key = match scan.stack.last() {
                    Some(top) if top.kind == ContainerKind::Object => pending_key.take(),
                    _ => None,
                };
                pending_key = None;
                pending_string = None;
                scan.stack.push(OpenContainer {
                    kind,
                    offset: scan.text.len(),
                    key,
                    last_complete_end: None,
                });
                scan.state.open(kind);
                scan.text.push(c);
            }
            '}' | ']' => {
                let kind = ContainerKind::from_delimiter(c);
                if scan.stack.last().is_some_and(|top| top.kind == kind) {
                    scan.stack.pop();
                    scan.state.close(kind);
                    scan.text.push(c);
                    let end = scan.text.len();
                    if let Some(parent) = scan.stack.last_mut()
                        && parent.kind == ContainerKind::Array
                    {
                        parent.last_complete_end = Some(end);
                    }
                    pending_key = None;
                    pending_string = None;
                }
            }
            ':' => {
                if scan.stack.last().is_some_and(|top| top.kind == ContainerKind::Object) {
                    pending_key = pending_string.take();
                }
                scan.text.push(c);
            }
            ',' => {
                let end = scan.text.len();
                if let Some(top) = scan.stack.last_mut()
                    && top.kind == ContainerKind::Array
                {
                    top.last_complete_end = Some(end);
                }
                pending_key = None;
                pending_string = None;
                scan.text.push(c);
            }
            _ => scan.text.push(c),
        }
    }

    scan
}

/// Scanner state after a full pass over `text`
pub fn scan_state(text: &str) -> RepairState {
    scan(text).state
}

/// Close a truncated document: terminate an open string, drop the
/// incomplete trailing fragment, then balance brackets and braces
pub fn structural_repair(text: &str) -> String {
    let scan = scan(text);
    debug!(state = ?scan.state, depth = scan.stack.len(), "structural_repair: called");

    if let Some(cut) = cut_recommendations(&scan) {
        debug!("structural_repair: truncated inside a recommendation");
        return cut;
    }

    let Scan {
        mut text,
        state,
        stack,
        string_starts,
    } = scan;

    if state.in_string {
        terminate_string(&mut text, state.escaped);
    }
    strip_incomplete_tail(&mut text, &stack, &string_starts);
    close_containers(&mut text, &stack);
    text
}

/// Close every container left open at the end of `text`
pub(crate) fn close_open_structures(text: &str) -> String {
    let scan = scan(text);
    let mut out = scan.text;
    if scan.state.in_string {
        out.push('"');
    }
    close_containers(&mut out, &scan.stack);
    out
}

fn close_containers(text: &mut String, stack: &[OpenContainer]) {
    for container in stack.iter().rev() {
        text.push(container.kind.closer());
    }
}

/// Truncation inside an element of a recommendations array: keep the
/// complete elements only
fn cut_recommendations(scan: &Scan) -> Option<String> {
    let index = scan.stack.iter().rposition(|container| {
        container.kind == ContainerKind::Array && container.key.as_deref() == Some(RECOMMENDATIONS_KEY)
    })?;

    let inside_element = index + 1 < scan.stack.len() || scan.state.in_string;
    if !inside_element {
        return None;
    }

    let array = &scan.stack[index];
    let cut = array.last_complete_end.unwrap_or(array.offset + 1);
    let mut text = scan.text[..cut].to_string();
    close_containers(&mut text, &scan.stack[..=index]);
    Some(text)
}

/// True when the backslash at `pos` starts an escape sequence
fn is_escape_start(bytes: &[u8], pos: usize) -> bool {
    bytes[..=pos].iter().rev().take_while(|b| **b == b'\\').count() % 2 == 1
}

/// Offset of a `\u` escape with fewer than four hex digits at the end
fn partial_unicode_escape(bytes: &[u8]) -> Option<usize> {
    (0..4).find_map(|digits| {
        let u_pos = bytes.len().checked_sub(digits + 1)?;
        let slash = u_pos.checked_sub(1)?;
        let matches = bytes[slash] == b'\\'
            && bytes[u_pos] == b'u'
            && bytes[u_pos + 1..].iter().all(|b| b.is_ascii_hexdigit())
            && is_escape_start(bytes, slash);
        matches.then_some(slash)
    })
}

/// Offset of a complete `\uD800`-`\uDBFF` escape ending the text
fn trailing_high_surrogate(bytes: &[u8]) -> Option<usize> {
    let start = bytes.len().checked_sub(6)?;
    let tail = &bytes[start..];
    let is_high = tail[0] == b'\\'
        && tail[1] == b'u'
        && tail[2..].iter().all(|b| b.is_ascii_hexdigit())
        && matches!(tail[2], b'd' | b'D')
        && matches!(tail[3], b'8' | b'9' | b'a' | b'b' | b'A' | b'B');
    (is_high && is_escape_start(bytes, start)).then_some(start)
}

fn terminate_string(text: &mut String, escaped: bool) {
    if escaped {
        text.pop();
    }
    loop {
        let bytes = text.as_bytes();
        let Some(pos) = partial_unicode_escape(bytes).or_else(|| trailing_high_surrogate(bytes)) else {
            break;
        };
        text.truncate(pos);
    }
    text.push('"');
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_')
}

/// A bare token that is not a literal, or a number that may have been cut
fn is_incomplete_token(token: &str, at_raw_end: bool) -> bool {
    match serde_json::from_str::<Value>(token) {
        Ok(Value::Number(_)) => at_raw_end,
        Ok(_) => false,
        Err(_) => true,
    }
}

/// Start of the string literal whose closing quote is the last byte before `end`
fn string_start(string_starts: &[usize], end: usize) -> Option<usize> {
    string_starts.iter().rev().copied().find(|start| start + 1 < end)
}

fn is_key_position(text: &str, start: usize) -> bool {
    matches!(text[..start].trim_end().chars().next_back(), Some('{' | ','))
}

fn strip_incomplete_tail(text: &mut String, stack: &[OpenContainer], string_starts: &[usize]) {
    let in_object = stack.last().is_some_and(|top| top.kind == ContainerKind::Object);
    let mut at_raw_end = !text.ends_with(char::is_whitespace);

    loop {
        let trimmed = text.trim_end().len();
        text.truncate(trimmed);
        let Some(last) = text.chars().next_back() else {
            break;
        };

        let cut = match last {
            ',' => Some(text.len() - 1),
            ':' => {
                let colon = text.len() - 1;
                let before = text[..colon].trim_end().len();
                if text[..before].ends_with('"') {
                    string_start(string_starts, before).or(Some(colon))
                } else {
                    Some(colon)
                }
            }
            '"' => string_start(string_starts, text.len()).filter(|&start| in_object && is_key_position(text, start)),
            c if is_token_char(c) => {
                let start = text
                    .char_indices()
                    .rev()
                    .take_while(|(_, c)| is_token_char(*c))
                    .last()
                    .map_or(text.len(), |(i, _)| i);
                is_incomplete_token(&text[start..], at_raw_end).then_some(start)
            }
            _ => None,
        };

        match cut {
            Some(pos) => {
                text.truncate(pos);
                at_raw_end = false;
            }
            None => break,
        }
    }
}
