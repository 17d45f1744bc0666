use std::ops::Range;

use indexmap::IndexMap;
use tracing::trace;

use crate::metadata::{DTYPES_KEY, MetaValue, Metadata};

/// A token the grammar could not use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    /// Byte range of the offending token within the parsed text.
    pub span: Range<usize>,
    pub token: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Token has no `=`.
    MissingEquals,
    /// `dtypes` item has no `:`.
    MalformedDtype,
}

/// Split on commas that are not enclosed in `[ ]`. Parts are trimmed.
///
/// The depth counter only looks at bracket characters, so brackets inside
/// quoted values still change the depth.
pub fn split_top_level(s: &str) -> Vec<&str> {
    split_spans(s).into_iter().map(|r| &s[r]).collect()
}

fn split_spans(s: &str) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;

    for (i, ch) in s.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(trim_span(s, start..i));
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(trim_span(s, start..s.len()));
    parts
}

fn trim_span(s: &str, range: Range<usize>) -> Range<usize> {
    let slice = &s[range.clone()];
    let lead = slice.len() - slice.trim_start().len();
    if lead == slice.len() {
        return range.start + lead..range.start + lead;
    }
    let trail = slice.len() - slice.trim_end().len();
    range.start + lead..range.end - trail
}

/// Remove one pair of matching `"` or `'` around `s`.
pub fn strip_quotes(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Parse header metadata text (without braces), dropping malformed tokens.
pub fn parse_metadata(input: &str) -> Metadata {
    parse_metadata_reporting(input).0
}

/// Like [`parse_metadata`], but also returns every dropped token.
pub fn parse_metadata_reporting(input: &str) -> (Metadata, Vec<Dropped>) {
    let mut entries: IndexMap<String, MetaValue> = IndexMap::new();
    let mut dropped = Vec::new();
    let mut dtypes_span = 0..0;

    for span in split_spans(input) {
        let token = &input[span.clone()];
        if token.is_empty() {
            continue;
        }
        let Some((key, value)) = token.split_once('=') else {
            dropped.push(Dropped {
                span,
                token: token.to_string(),
                reason: DropReason::MissingEquals,
            });
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        trace!(key, value, "metadata token");
        if key == DTYPES_KEY {
            dtypes_span = span.clone();
        }
        entries.insert(key.to_string(), parse_value(value));
    }

    if let Some(value) = entries.get_mut(DTYPES_KEY) {
        let items = match value {
            MetaValue::List(items) => std::mem::take(items),
            MetaValue::Scalar(s) => vec![std::mem::take(s)],
            MetaValue::DTypes(_) => Vec::new(),
        };
        let mut map = IndexMap::new();
        for item in items {
            match item.split_once(':') {
                Some((col, tag)) => {
                    map.insert(col.trim().to_string(), tag.trim().to_string());
                }
                None => dropped.push(Dropped {
                    span: dtypes_span.clone(),
                    token: item,
                    reason: DropReason::MalformedDtype,
                }),
            }
        }
        *value = MetaValue::DTypes(map);
    }

    (entries.into_iter().collect(), dropped)
}

fn parse_value(value: &str) -> MetaValue {
    if value.len() >= 2 && value.starts_with('[') && value.ends_with(']') {
        let inner = value[1..value.len() - 1].trim();
        if inner.is_empty() {
            return MetaValue::List(Vec::new());
        }
        let items = split_top_level(inner)
            .into_iter()
            .map(|item| strip_quotes(item).to_string())
            .collect();
        MetaValue::List(items)
    } else {
        MetaValue::Scalar(strip_quotes(value).to_string())
    }
}
