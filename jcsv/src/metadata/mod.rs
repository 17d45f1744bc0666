use std::fmt;

use indexmap::IndexMap;

use crate::parser::metadata::parse_metadata;

/// Reserved key holding the column → type-tag map.
pub const DTYPES_KEY: &str = "dtypes";
/// Reserved key listing columns whose values name other tables.
pub const REFS_KEY: &str = "refs";
/// Free-form key the writer uses for table descriptions.
pub const COMMENT_KEY: &str = "comment";

/// A metadata value from a block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    /// `key=value` or `key="quoted value"`
    Scalar(String),
    /// `key=[a,b,c]`
    List(Vec<String>),
    /// `dtypes=[col:tag,...]`, only ever produced under [`DTYPES_KEY`].
    DTypes(IndexMap<String, String>),
}

impl MetaValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            MetaValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetaValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether `Display` output parses back to this same value.
    ///
    /// The splitter counts brackets and commas even inside quotes, so no
    /// quoting can carry a top-level comma, an unbalanced bracket or a line
    /// break. Such values have no header representation.
    pub fn is_representable(&self) -> bool {
        match self {
            MetaValue::Scalar(s) => atom_round_trips(s),
            MetaValue::List(items) => items.iter().all(|item| atom_round_trips(item)),
            MetaValue::DTypes(map) => map.iter().all(|(col, tag)| {
                let plain = |s: &str| s.trim() == s && !s.contains([',', '[', ']', '\n', '\r']);
                plain(col) && plain(tag) && !col.is_empty() && !col.contains(':')
            }),
        }
    }
}

/// Ordered key/value metadata of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: IndexMap<String, MetaValue>,
}

impl Metadata {
    pub fn new() -> Self {
        Metadata::default()
    }

    /// Parse metadata text, with or without the surrounding braces.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed);
        parse_metadata(inner)
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace a value. Replacing keeps the key's position.
    pub fn insert(&mut self, key: impl Into<String>, value: MetaValue) -> Option<MetaValue> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dtypes(&self) -> Option<&IndexMap<String, String>> {
        match self.entries.get(DTYPES_KEY) {
            Some(MetaValue::DTypes(map)) => Some(map),
            _ => None,
        }
    }

    /// Column names listed under `refs`. A scalar counts as a single column.
    pub fn refs(&self) -> Vec<&str> {
        match self.entries.get(REFS_KEY) {
            Some(MetaValue::List(items)) => items.iter().map(String::as_str).collect(),
            Some(MetaValue::Scalar(s)) => vec![s.as_str()],
            _ => Vec::new(),
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.entries.get(COMMENT_KEY).and_then(MetaValue::as_scalar)
    }

    /// Entries other than the reserved `dtypes`, `refs` and `comment` keys.
    pub fn free_form(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.iter()
            .filter(|(k, _)| !matches!(*k, DTYPES_KEY | REFS_KEY | COMMENT_KEY))
    }
}

impl FromIterator<(String, MetaValue)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, MetaValue)>>(iter: I) -> Self {
        Metadata {
            entries: iter.into_iter().collect(),
        }
    }
}

fn atom_round_trips(value: &str) -> bool {
    let mut depth: i32 = 0;
    for ch in value.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth == 0 => return false,
            ']' => depth -= 1,
            ',' if depth == 0 => return false,
            '\n' | '\r' => return false,
            _ => {}
        }
    }
    depth == 0
}

/// Whether `value` must be wrapped in quotes. Quotes keep whitespace, `=`,
/// quote characters and balanced brackets intact; they do not protect
/// commas (see [`MetaValue::is_representable`]).
fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.trim() != value
        || value.starts_with(['"', '\''])
        || value.ends_with(['"', '\''])
        || value.contains([',', '[', ']', '{', '}', '='])
}

fn write_atom(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    if needs_quotes(value) {
        write!(f, "\"{}\"", value)
    } else {
        write!(f, "{}", value)
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Scalar(s) => write_atom(f, s),
            MetaValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write_atom(f, item)?;
                }
                write!(f, "]")
            }
            MetaValue::DTypes(map) => {
                write!(f, "[")?;
                for (i, (col, tag)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", col, tag)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Renders the grammar text without braces, e.g. `dtypes=[id:int],refs=[a]`.
impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}
