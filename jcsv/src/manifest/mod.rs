use indexmap::IndexMap;
use thiserror::Error;

/// First line of a manifest section.
pub const MANIFEST_MARKER: &str = "#manifest";
/// Column header the writer emits for the manifest.
pub const MANIFEST_HEADER: &str = "table,start_line,description";

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// 1-based line of the table's `#name` header.
    pub start_line: usize,
    pub description: String,
}

/// Optional leading index of a JCSV file: table name → header line.
///
/// Informational only. The parser never seeks with it, but checks it
/// against the block headers it actually finds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: IndexMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Manifest::default()
    }

    /// Insert a row; a repeated table name replaces the earlier row.
    pub fn insert(&mut self, table: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(table.into(), entry);
    }

    pub fn get(&self, table: &str) -> Option<&ManifestEntry> {
        self.entries.get(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("manifest has no column header line")]
    MissingHeader,

    #[error("manifest row on line {line} has no `{column}` column")]
    MissingColumn { column: &'static str, line: usize },

    #[error("manifest row on line {line}: start_line `{value}` is not an integer")]
    InvalidStartLine { value: String, line: usize },
}
