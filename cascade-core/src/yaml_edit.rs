//! Text-preserving scalar editing for block-style YAML.
//!
//! serde_yaml can read a document but re-serializing it drops comments,
//! quoting and key order. Manifests live in git and every byte outside the
//! edited scalar shows up in a diff, so writes go through [`set_scalar`],
//! which locates the scalar by path and splices only its bytes. Reads go
//! through serde_yaml via [`get_string`].
//!
//! Supported layout: block mappings and block sequences (including the
//! compact `key:\n- item` form and mappings that start on a `- ` line).
//! Missing keys are created with the sibling indentation. Keys inside a flow
//! mapping that opens and closes on one line (`source: {repoURL: x, path: y}`)
//! are edited in place. Traversing through an existing scalar, a flow
//! sequence or a multi-line flow mapping is a [`CoreError::Mutation`].

use std::fmt;

use serde_yaml::Value;

use crate::error::CoreError;

/// One step of a path into a YAML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSegment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Renders a path as `spec.source.targetRevision` / `releases[2].version`.
pub struct DisplayPath<'a, 'b>(pub &'a [PathSegment<'b>]);

impl fmt::Display for DisplayPath<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                PathSegment::Key(k) if i == 0 => write!(f, "{k}")?,
                PathSegment::Key(k) => write!(f, ".{k}")?,
                PathSegment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Look up the node at `path`.
pub fn lookup<'v>(value: &'v Value, path: &[PathSegment<'_>]) -> Option<&'v Value> {
    path.iter().try_fold(value, |node, seg| match seg {
        PathSegment::Key(k) => node.get(*k),
        PathSegment::Index(n) => node.get(*n),
    })
}

/// The scalar at `path` rendered as a string; empty when absent or not a scalar.
pub fn get_string(value: &Value, path: &[PathSegment<'_>]) -> String {
    match lookup(value, path) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Set the scalar at `path` to the string `value`, returning the new text.
///
/// Only the bytes of the target scalar change (plus inserted lines when part
/// of the path has to be created).
pub fn set_scalar(text: &str, path: &[PathSegment<'_>], value: &str) -> Result<String, CoreError> {
    let lines = split_lines(text);
    let fail = |message: &str| CoreError::Mutation {
        path: DisplayPath(path).to_string(),
        message: message.to_string(),
    };
    if path.is_empty() {
        return Err(fail("empty path"));
    }

    let mut region = match top_region(&lines) {
        Some(region) => region,
        None => return Err(fail("document is empty")),
    };

    for (depth, seg) in path.iter().enumerate() {
        let last = depth + 1 == path.len();
        match *seg {
            PathSegment::Key(key) => {
                if region.is_sequence(&lines) {
                    return Err(fail(&format!("expected a mapping at '{key}' but found a sequence")));
                }
                let Some(entry) = find_key(&lines, &region, key) else {
                    return create_path(text, &lines, &region, &path[depth..], value)
                        .map_err(|m| fail(&m));
                };
                let span = inline_value(&lines[entry.line], entry.value_col);
                if last {
                    if span.style == Style::Empty && child_region(&lines, &region, entry.line, entry.col).has_content(&lines) {
                        return Err(fail("target is a collection, not a scalar"));
                    }
                    return replace(text, &lines[entry.line], span, value).map_err(|m| fail(&m));
                }
                match span.style {
                    Style::Empty => {}
                    Style::Flow if lines[entry.line].text[span.start..].starts_with('{') => {
                        return set_in_flow(text, &lines[entry.line], span.start, &path[depth + 1..], value)
                            .map_err(|m| fail(&m));
                    }
                    _ => {
                        let held = describe(&lines[entry.line].text[span.start..]);
                        return Err(fail(&format!("'{key}' holds {held}, cannot descend into it")));
                    }
                }
                let child = child_region(&lines, &region, entry.line, entry.col);
                if !child.has_content(&lines) {
                    let anchor = Region {
                        start: entry.line + 1,
                        end: entry.line + 1,
                        col: entry.col + 2,
                        first: None,
                    };
                    return create_path(text, &lines, &anchor, &path[depth + 1..], value)
                        .map_err(|m| fail(&m));
                }
                region = child.with_content_col(&lines);
            }
            PathSegment::Index(n) => {
                if !region.is_sequence(&lines) {
                    return Err(fail(&format!("expected a sequence at index {n}")));
                }
                let Some(item) = sequence_items(&lines, &region).into_iter().nth(n) else {
                    return Err(fail(&format!("index {n} is out of range")));
                };
                let item_end = block_end(&lines, item.line + 1, region.end, region.col, false);
                let line = &lines[item.line];
                let rest_empty = line.text[item.content_col.min(line.text.len())..]
                    .trim()
                    .is_empty()
                    || line.text[item.content_col.min(line.text.len())..]
                        .trim_start()
                        .starts_with('#');
                if last {
                    if rest_empty {
                        return Err(fail("sequence item is not a scalar"));
                    }
                    let span = inline_value(line, item.content_col);
                    return replace(text, line, span, value).map_err(|m| fail(&m));
                }
                if !rest_empty {
                    let span = inline_value(line, item.content_col);
                    if line.text[span.start..].starts_with('{') {
                        return set_in_flow(text, line, span.start, &path[depth + 1..], value)
                            .map_err(|m| fail(&m));
                    }
                }
                region = if rest_empty {
                    Region {
                        start: item.line + 1,
                        end: item_end,
                        col: 0,
                        first: None,
                    }
                    .with_content_col(&lines)
                } else {
                    Region {
                        start: item.line,
                        end: item_end,
                        col: item.content_col,
                        first: Some(item.content_col),
                    }
                };
            }
        }
    }
    Err(fail("path did not resolve to a scalar"))
}

// ---------------------------------------------------------------------------
// Line model
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Line<'a> {
    /// Line text without its terminator.
    text: &'a str,
    /// `"\n"`, `"\r\n"` or `""` for a final unterminated line.
    ending: &'a str,
    /// Byte offset of the line in the full text.
    start: usize,
    indent: usize,
    content: bool,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for raw in text.split_inclusive('\n') {
        let (body, ending) = match raw.strip_suffix("\r\n") {
            Some(body) => (body, "\r\n"),
            None => match raw.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (raw, ""),
            },
        };
        let trimmed = body.trim_start_matches(' ');
        let indent = body.len() - trimmed.len();
        let content = !(trimmed.trim().is_empty()
            || trimmed.starts_with('#')
            || (indent == 0 && (body.starts_with("---") || body.starts_with("...") || body.starts_with('%'))));
        lines.push(Line {
            text: body,
            ending,
            start,
            indent,
            content,
        });
        start += raw.len();
    }
    lines
}

/// A run of lines whose entries start at column `col`. When `first` is set,
/// the entry on line `start` begins at that column (after a `- `).
#[derive(Debug, Clone, Copy)]
struct Region {
    start: usize,
    end: usize,
    col: usize,
    first: Option<usize>,
}

impl Region {
    fn has_content(&self, lines: &[Line<'_>]) -> bool {
        (self.start..self.end).any(|i| lines[i].content)
    }

    fn with_content_col(mut self, lines: &[Line<'_>]) -> Self {
        if let Some(i) = (self.start..self.end).find(|&i| lines[i].content) {
            self.col = lines[i].indent;
        }
        self
    }

    /// Column where the entry on line `i` starts, if line `i` begins an entry.
    fn entry_col(&self, lines: &[Line<'_>], i: usize) -> Option<usize> {
        if i == self.start {
            if let Some(first) = self.first {
                return Some(first);
            }
        }
        (lines[i].content && lines[i].indent == self.col).then_some(self.col)
    }

    fn is_sequence(&self, lines: &[Line<'_>]) -> bool {
        (self.start..self.end)
            .find_map(|i| self.entry_col(lines, i).map(|c| is_dash(&lines[i].text[c..])))
            .unwrap_or(false)
    }
}

fn top_region(lines: &[Line<'_>]) -> Option<Region> {
    let first = lines.iter().position(|l| l.content)?;
    Some(Region {
        start: first,
        end: lines.len(),
        col: lines[first].indent,
        first: None,
    })
}

fn is_dash(s: &str) -> bool {
    s == "-" || s.starts_with("- ") || s.starts_with("-\t")
}

/// First line in `from..limit` that closes a block opened at `col`.
///
/// When `allow_same_col_dash` is set, `- ` lines at `col` stay inside the
/// block (compact sequences under a mapping key).
fn block_end(lines: &[Line<'_>], from: usize, limit: usize, col: usize, allow_same_col_dash: bool) -> usize {
    (from..limit)
        .find(|&i| {
            let line = &lines[i];
            line.content
                && (line.indent < col
                    || (line.indent == col && !(allow_same_col_dash && is_dash(&line.text[col..]))))
        })
        .unwrap_or(limit)
}

fn child_region(lines: &[Line<'_>], parent: &Region, key_line: usize, key_col: usize) -> Region {
    let end = block_end(lines, key_line + 1, parent.end, key_col, true);
    Region {
        start: key_line + 1,
        end,
        col: key_col + 2,
        first: None,
    }
}

// ---------------------------------------------------------------------------
// Keys and sequence items
// ---------------------------------------------------------------------------

struct KeyEntry {
    line: usize,
    col: usize,
    /// Column just after the `:` separator.
    value_col: usize,
}

fn find_key(lines: &[Line<'_>], region: &Region, key: &str) -> Option<KeyEntry> {
    (region.start..region.end).find_map(|i| {
        let col = region.entry_col(lines, i)?;
        let (parsed, value_col) = parse_key(&lines[i].text[col..])?;
        (parsed == key).then_some(KeyEntry {
            line: i,
            col,
            value_col: col + value_col,
        })
    })
}

/// Parses `key:` at the start of `s`, returning the key and the offset after the colon.
fn parse_key(s: &str) -> Option<(String, usize)> {
    if is_dash(s) {
        return None;
    }
    let bytes = s.as_bytes();
    let (key, after) = match bytes.first()? {
        q @ (b'"' | b'\'') => {
            let close = find_closing_quote(s, *q as char)?;
            let inner = &s[1..close];
            let key = if *q == b'"' {
                inner.replace("\\\"", "\"")
            } else {
                inner.replace("''", "'")
            };
            (key, close + 1)
        }
        _ => {
            let colon = s
                .char_indices()
                .find(|&(i, c)| c == ':' && matches!(bytes.get(i + 1), None | Some(b' ' | b'\t')))
                .map(|(i, _)| i)?;
            (s[..colon].trim_end().to_string(), colon)
        }
    };
    let rest = &s[after..];
    let pad = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    rest[pad..].starts_with(':').then(|| (key, after + pad + 1))
}

fn find_closing_quote(s: &str, quote: char) -> Option<usize> {
    let mut chars = s.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if quote == '"' && c == '\\' {
            chars.next();
            continue;
        }
        if c == quote {
            if quote == '\'' && matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                continue;
            }
            return Some(i);
        }
    }
    None
}

struct SeqItem {
    line: usize,
    /// Column of the item's content after `- `.
    content_col: usize,
}

fn sequence_items(lines: &[Line<'_>], region: &Region) -> Vec<SeqItem> {
    (region.start..region.end)
        .filter_map(|i| {
            let col = region.entry_col(lines, i)?;
            let rest = &lines[i].text[col..];
            if !is_dash(rest) {
                return None;
            }
            let after = &rest[1..];
            let pad = after.len() - after.trim_start_matches([' ', '\t']).len();
            Some(SeqItem {
                line: i,
                content_col: col + 1 + pad,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scalar spans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Plain,
    Double,
    Single,
    /// No value token; `start == end` is the insertion point.
    Empty,
    Block,
    Flow,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    /// Byte offsets relative to the line start.
    start: usize,
    end: usize,
    style: Style,
}

fn inline_value(line: &Line<'_>, from: usize) -> Span {
    let text = line.text;
    let from = from.min(text.len());
    let mut start = from + (text[from..].len() - text[from..].trim_start_matches([' ', '\t']).len());
    // Skip tags and anchors that precede the scalar.
    while start < text.len() && matches!(text.as_bytes()[start], b'!' | b'&') {
        let token_end = text[start..].find([' ', '\t']).map(|i| start + i).unwrap_or(text.len());
        let next = &text[token_end..];
        start = token_end + (next.len() - next.trim_start_matches([' ', '\t']).len());
    }
    let rest = &text[start..];
    let span = |end: usize, style: Style| Span { start, end, style };
    match rest.chars().next() {
        None | Some('#') => Span {
            start: from,
            end: from,
            style: Style::Empty,
        },
        Some('"') => match find_closing_quote(rest, '"') {
            Some(close) => span(start + close + 1, Style::Double),
            None => span(text.len(), Style::Flow),
        },
        Some('\'') => match find_closing_quote(rest, '\'') {
            Some(close) => span(start + close + 1, Style::Single),
            None => span(text.len(), Style::Flow),
        },
        Some('|' | '>') => span(text.len(), Style::Block),
        Some('{' | '[') => span(text.len(), Style::Flow),
        Some(_) => {
            let end = rest
                .find(" #")
                .or_else(|| rest.find("\t#"))
                .map(|i| start + i)
                .unwrap_or(text.len());
            let trimmed = text[start..end].trim_end();
            span(start + trimmed.len(), Style::Plain)
        }
    }
}

fn replace(text: &str, line: &Line<'_>, span: Span, value: &str) -> Result<String, String> {
    let token = match span.style {
        Style::Block => return Err("target is a block scalar".to_string()),
        Style::Flow => return Err("target is a flow collection".to_string()),
        Style::Double => double_quote(value),
        Style::Single => single_quote(value),
        Style::Plain => plain_or_quoted(value),
        Style::Empty => format!(" {}", plain_or_quoted(value)),
    };
    let mut out = String::with_capacity(text.len() + token.len());
    out.push_str(&text[..line.start + span.start]);
    out.push_str(&token);
    out.push_str(&text[line.start + span.end..]);
    Ok(out)
}

fn double_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Plain when the value reads back as the same string, double-quoted otherwise.
pub fn plain_or_quoted(value: &str) -> String {
    let plain_ok = !value.is_empty()
        && value.trim() == value
        && !value.contains(['\n', '\r', '#'])
        && matches!(serde_yaml::from_str::<Value>(value), Ok(Value::String(ref s)) if s == value);
    if plain_ok {
        value.to_string()
    } else {
        double_quote(value)
    }
}

/// What a value token is, for error messages.
fn describe(raw: &str) -> &'static str {
    match raw.as_bytes().first() {
        Some(b'{') => "a flow mapping",
        Some(b'[') => "a flow sequence",
        Some(b'|' | b'>') => "a block scalar",
        _ => "a scalar",
    }
}

// ---------------------------------------------------------------------------
// Flow mappings
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct FlowEntry {
    key: String,
    /// Byte offsets relative to the line start. An empty value has
    /// `value_start == value_end`, right after the colon.
    value_start: usize,
    value_end: usize,
}

/// Set `path` inside the flow mapping whose `{` sits at byte `open` of `line`.
fn set_in_flow(
    text: &str,
    line: &Line<'_>,
    open: usize,
    path: &[PathSegment<'_>],
    value: &str,
) -> Result<String, String> {
    let mut open = open;
    for (depth, seg) in path.iter().enumerate() {
        let PathSegment::Key(key) = *seg else {
            return Err("cannot index into a flow mapping".to_string());
        };
        let entries = flow_entries(line.text, open)
            .ok_or_else(|| "flow mapping does not close on its line".to_string())?;
        let Some(entry) = entries.into_iter().find(|e| e.key == key) else {
            return Err(format!("'{key}' not found in flow mapping"));
        };
        let raw = &line.text[entry.value_start..entry.value_end];

        if depth + 1 < path.len() {
            if raw.starts_with('{') {
                open = entry.value_start;
                continue;
            }
            return Err(format!("'{key}' holds {}, cannot descend into it", describe(raw)));
        }

        let token = match raw.as_bytes().first() {
            None => format!(" {}", flow_scalar(value)),
            Some(b'"') => double_quote(value),
            Some(b'\'') => single_quote(value),
            Some(b'{' | b'[') => return Err("target is a flow collection".to_string()),
            Some(_) => flow_scalar(value),
        };
        let mut out = String::with_capacity(text.len() + token.len());
        out.push_str(&text[..line.start + entry.value_start]);
        out.push_str(&token);
        out.push_str(&text[line.start + entry.value_end..]);
        return Ok(out);
    }
    Err("path did not resolve to a scalar".to_string())
}

/// Top-level entries of the flow mapping opening at byte `open` of `text`.
///
/// `None` when the mapping does not close on this line.
fn flow_entries(text: &str, open: usize) -> Option<Vec<FlowEntry>> {
    let bytes = text.as_bytes();
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut seg_start = open + 1;
    let mut prev = b'{';
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'"' | b'\'') if matches!(prev, b'{' | b'[' | b',' | b':') => {
                i += find_closing_quote(&text[i..], q as char)?;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' if depth > 0 => depth -= 1,
            b'}' => {
                entries.extend(flow_entry(text, seg_start, i));
                return Some(entries);
            }
            b',' if depth == 0 => {
                entries.extend(flow_entry(text, seg_start, i));
                seg_start = i + 1;
            }
            b'#' if matches!(bytes[i - 1], b' ' | b'\t') => return None,
            _ => {}
        }
        if !matches!(bytes[i], b' ' | b'\t') {
            prev = bytes[i];
        }
        i += 1;
    }
    None
}

/// `key: value` between `start` and `end`; `None` for entries without a key.
fn flow_entry(text: &str, start: usize, end: usize) -> Option<FlowEntry> {
    let seg = &text[start..end];
    let key_start = start + (seg.len() - seg.trim_start().len());
    let (key, after) = parse_key(&text[key_start..end])?;
    let colon_end = key_start + after;
    let raw = &text[colon_end..end];
    let (value_start, value_end) = if raw.trim().is_empty() {
        (colon_end, colon_end)
    } else {
        (
            colon_end + (raw.len() - raw.trim_start().len()),
            colon_end + raw.trim_end().len(),
        )
    };
    Some(FlowEntry {
        key,
        value_start,
        value_end,
    })
}

/// Like [`plain_or_quoted`], also quoting flow indicators.
fn flow_scalar(value: &str) -> String {
    if value.contains([',', '[', ']', '{', '}']) {
        double_quote(value)
    } else {
        plain_or_quoted(value)
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

fn create_path(
    text: &str,
    lines: &[Line<'_>],
    region: &Region,
    rest: &[PathSegment<'_>],
    value: &str,
) -> Result<String, String> {
    let eol = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let mut block = String::new();
    for (i, seg) in rest.iter().enumerate() {
        let PathSegment::Key(key) = seg else {
            return Err("cannot create a sequence item".to_string());
        };
        let pad = " ".repeat(region.col + 2 * i);
        let key = plain_or_quoted(key);
        if i + 1 == rest.len() {
            block.push_str(&format!("{pad}{key}: {}{eol}", plain_or_quoted(value)));
        } else {
            block.push_str(&format!("{pad}{key}:{eol}"));
        }
    }

    // Insert after the last content line of the region, or at its start.
    let after = (region.start..region.end).rev().find(|&i| lines[i].content);
    let (offset, needs_eol) = match after {
        Some(i) => (lines[i].start + lines[i].text.len() + lines[i].ending.len(), lines[i].ending.is_empty()),
        None if region.start > 0 => {
            let prev = &lines[region.start - 1];
            (prev.start + prev.text.len() + prev.ending.len(), prev.ending.is_empty())
        }
        None => (0, false),
    };

    let mut out = String::with_capacity(text.len() + block.len() + 2);
    out.push_str(&text[..offset]);
    if needs_eol {
        out.push_str(eol);
    }
    out.push_str(&block);
    out.push_str(&text[offset..]);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
