//! Path expression model.
//!
//! Raw mapping strings are parsed once into a typed [`PathExpression`]:
//!
//! - `+` splits into concatenation parts (lowest precedence),
//! - `|` splits each part into alternation candidates,
//! - each candidate is either angle-bracket tag-list notation (`<A> <B>`)
//!   or a literal slash-separated path.
//!
//! Parsing never fails. Unrecognised characters are dropped so the result is
//! a best-effort path; only empty or placeholder input yields `None`.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Mapping cells that mean "no path configured".
const PLACEHOLDERS: &[&str] = &["-", "--", "n/a", "na", "nan", "none", "null"];

static TAG_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*(/)?\s*([A-Za-z_][\w.:\-]*)[^<>]*>").expect("valid tag-list regex"));

/// A slash-separated tag chain with an optional 1-based index predicate on
/// the last segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimplePath {
    segments: Vec<String>,
    index: Option<usize>,
}

impl SimplePath {
    /// Build a path from segments. Returns `None` when `segments` is empty.
    /// An index of zero is not a valid 1-based position and is dropped.
    pub fn new(segments: Vec<String>, index: Option<usize>) -> Option<Self> {
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self {
            segments,
            index: index.filter(|&k| k > 0),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Local name of the final segment.
    pub fn last(&self) -> &str {
        let last = self.segments.last().map(String::as_str).unwrap_or_default();
        crate::tree::local_name(last)
    }

    /// Local names of all segments.
    pub fn local_segments(&self) -> Vec<&str> {
        self.segments.iter().map(|s| crate::tree::local_name(s)).collect()
    }
}

impl fmt::Display for SimplePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))?;
        if let Some(k) = self.index {
            write!(f, "[{k}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathExpression {
    Simple(SimplePath),
    /// Every part is resolved and the non-empty values are joined.
    Concatenation(Vec<PathExpression>),
    /// Candidates are tried in order; the first non-empty value wins.
    Alternation(Vec<PathExpression>),
}

impl PathExpression {
    /// All simple paths in this expression, left to right.
    pub fn simple_paths(&self) -> Vec<&SimplePath> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Self::Simple(p) => out.push(p),
                Self::Concatenation(parts) | Self::Alternation(parts) => {
                    stack.extend(parts.iter().rev());
                }
            }
        }
        out
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(p) => write!(f, "{p}"),
            Self::Concatenation(parts) => write_joined(f, parts, " + "),
            Self::Alternation(candidates) => write_joined(f, candidates, " | "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[PathExpression], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Parse a raw mapping string. `None` means the mapping has no usable path.
pub fn parse(raw: &str) -> Option<PathExpression> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || PLACEHOLDERS.iter().any(|p| trimmed.eq_ignore_ascii_case(p)) {
        return None;
    }

    let parts: Vec<PathExpression> = split_top_level(trimmed, '+')
        .into_iter()
        .filter_map(parse_part)
        .collect();
    collapse(parts, PathExpression::Concatenation)
}

fn parse_part(part: &str) -> Option<PathExpression> {
    let candidates = split_top_level(part, '|');
    if candidates.len() > 1 {
        let parsed: Vec<PathExpression> = candidates
            .into_iter()
            .filter_map(|c| parse_candidate(c, true))
            .collect();
        collapse(parsed, PathExpression::Alternation)
    } else {
        parse_candidate(part, false)
    }
}

fn parse_candidate(raw: &str, strip_conditions: bool) -> Option<PathExpression> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(p) = parse_tag_list(raw) {
        return Some(PathExpression::Simple(p));
    }
    parse_literal(raw, strip_conditions).map(PathExpression::Simple)
}

fn collapse(mut items: Vec<PathExpression>, wrap: fn(Vec<PathExpression>) -> PathExpression) -> Option<PathExpression> {
    match items.len() {
        0 => None,
        1 => items.pop(),
        _ => Some(wrap(items)),
    }
}

/// `<A> <B>` → `A/B`. Closing tags are ignored so `<A><B></B></A>` also works.
fn parse_tag_list(raw: &str) -> Option<SimplePath> {
    if !raw.contains('<') {
        return None;
    }
    let segments: Vec<String> = TAG_LIST
        .captures_iter(raw)
        .filter(|c| c.get(1).is_none())
        .filter_map(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .collect();
    SimplePath::new(segments, None)
}

/// Literal path: `/Root/A/B[2]`, `.//B`, `A/B/text()`.
fn parse_literal(raw: &str, strip_conditions: bool) -> Option<SimplePath> {
    let mut path = raw.trim_start_matches(['.', '/']).trim_end_matches('/');
    for suffix in ["/text()", "text()"] {
        let tail = path.len().checked_sub(suffix.len()).and_then(|at| path.get(at..));
        if tail.is_some_and(|t| t.eq_ignore_ascii_case(suffix)) {
            path = path[..path.len() - suffix.len()].trim_end_matches('/');
        }
    }

    let raw_segments = split_top_level(path, '/');
    let last = raw_segments.len().saturating_sub(1);

    let mut segments = Vec::with_capacity(raw_segments.len());
    let mut index = None;
    for (i, raw_segment) in raw_segments.iter().enumerate() {
        let (name, conditions) = split_conditions(raw_segment);
        let name = sanitize(name);
        if name.is_empty() {
            continue;
        }
        if i == last && !strip_conditions {
            index = integer_predicate(&conditions);
        }
        segments.push(name);
    }

    SimplePath::new(segments, index)
}

/// Split `Name[c1][c2]` into `("Name", ["c1", "c2"])`.
fn split_conditions(segment: &str) -> (&str, Vec<&str>) {
    let Some(open) = segment.find('[') else {
        return (segment, Vec::new());
    };
    let name = &segment[..open];

    let mut conditions = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in segment[open..].char_indices() {
        let i = i + open;
        match ch {
            '[' => {
                if depth == 0 {
                    start = i + 1;
                }
                depth += 1;
            }
            ']' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    conditions.push(&segment[start..i]);
                }
            }
            _ => {}
        }
    }
    (name, conditions)
}

/// A single bracket holding a positive integer is an index predicate.
fn integer_predicate(conditions: &[&str]) -> Option<usize> {
    match conditions {
        [only] => only.trim().parse::<usize>().ok().filter(|&k| k > 0),
        _ => None,
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-') || (c.is_alphabetic() && !c.is_ascii()))
        .collect()
}

/// Split on `op` outside of `[...]`. Pieces are trimmed; empty pieces dropped.
fn split_top_level(s: &str, op: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == op && depth == 0 => {
                pieces.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&s[start..]);
    pieces.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}
