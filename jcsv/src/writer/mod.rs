mod layout;

use std::io;
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, trace};

use crate::document::Document;
use crate::manifest::{MANIFEST_HEADER, MANIFEST_MARKER};
use crate::metadata::MetaValue;
use crate::table::{ColumnData, ColumnType, RefValue, Table};

pub use layout::Layout;

/// Table name → human description, written to the manifest and `comment`.
pub type Descriptions = IndexMap<String, String>;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("table name `{0}` is not an identifier ([A-Za-z0-9_]+)")]
    InvalidTableName(String),

    #[error("table `{0}` has no columns")]
    NoColumns(String),

    #[error("table `{table}`: column name `{column}` cannot be written in a `dtypes` entry")]
    InvalidColumnName { table: String, column: String },

    #[error("table `{table}`: metadata value of `{key}` cannot be written in the header grammar")]
    UnrepresentableMetadata { table: String, key: String },

    #[error("table `{table}` column `{column}` row {row}: value contains a line break")]
    MultilineValue {
        table: String,
        column: String,
        row: usize,
    },

    #[error("table `{0}`: description contains a line break")]
    MultilineDescription(String),

    #[error("table `{table}`: title written on line {actual}, manifest records line {expected}")]
    OffsetMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },
}

struct Entry<'a> {
    name: &'a str,
    table: &'a Table,
    description: &'a str,
    /// Free-form metadata carried over from a parsed block.
    extra: Vec<(&'a str, &'a MetaValue)>,
}

/// Serializes tables as JCSV with an exact manifest.
///
/// Tables are borrowed for the writer's whole lifetime, so the row counts
/// used for the layout are the rows that get written.
pub struct Writer<'a> {
    entries: Vec<Entry<'a>>,
}

impl<'a> Writer<'a> {
    pub fn from_tables(tables: &'a IndexMap<String, Table>, descriptions: &'a Descriptions) -> Self {
        let entries = tables
            .iter()
            .map(|(name, table)| Entry {
                name,
                table,
                description: descriptions.get(name).map_or("", String::as_str),
                extra: Vec::new(),
            })
            .collect();
        Writer { entries }
    }

    /// Write the document's table map. Each block's `comment` becomes the
    /// description and its other free-form keys are kept.
    pub fn from_document(document: &'a Document) -> Self {
        let entries = document
            .tables()
            .map(|(name, table)| {
                let metadata = document.metadata(name);
                Entry {
                    name,
                    table,
                    description: metadata.and_then(|m| m.comment()).unwrap_or(""),
                    extra: metadata.map(|m| m.free_form().collect()).unwrap_or_default(),
                }
            })
            .collect();
        Writer { entries }
    }

    /// First pass: where every table will start.
    pub fn layout(&self) -> Layout {
        let rows: Vec<usize> = self.entries.iter().map(|e| e.table.row_count()).collect();
        Layout::compute(&rows)
    }

    /// Render the whole file.
    pub fn render(&self) -> Result<String, WriteError> {
        self.validate()?;
        let layout = self.layout();
        for (entry, start) in self.entries.iter().zip(&layout.start_lines) {
            trace!(table = entry.name, start_line = start, "layout");
        }

        let mut out = String::new();
        out.push_str(MANIFEST_MARKER);
        out.push('\n');
        out.push_str(MANIFEST_HEADER);
        out.push('\n');
        for (entry, start) in self.entries.iter().zip(&layout.start_lines) {
            // Commas are quoted, embedded quotes are not escaped.
            let description = if entry.description.contains(',') {
                format!("\"{}\"", entry.description)
            } else {
                entry.description.to_string()
            };
            out.push_str(&format!("{},{},{}\n", entry.name, start, description));
        }
        out.push('\n');
        let mut line = layout.manifest_lines + 1;

        for (entry, &start) in self.entries.iter().zip(&layout.start_lines) {
            out.push('\n');
            line += 1;
            if line != start {
                return Err(WriteError::OffsetMismatch {
                    table: entry.name.to_string(),
                    expected: start,
                    actual: line,
                });
            }
            out.push_str(&format!("#{}{{{}}}\n", entry.name, title_metadata(entry)));
            line += 1;

            let csv = encode_table(entry.table)?;
            line += csv.matches('\n').count();
            out.push_str(&csv);

            debug!(table = entry.name, start_line = start, rows = entry.table.row_count(), "table written");
        }

        Ok(out)
    }

    pub fn write_to<W: io::Write>(&self, mut out: W) -> Result<(), WriteError> {
        let text = self.render()?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Create or truncate `path` and write the whole file.
    ///
    /// Nothing is written if the tables are rejected.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), WriteError> {
        let text = self.render()?;
        std::fs::write(path.as_ref(), text)?;
        debug!(path = %path.as_ref().display(), "file written");
        Ok(())
    }

    /// Reject tables the reader could not read back.
    fn validate(&self) -> Result<(), WriteError> {
        for entry in &self.entries {
            if entry.name.is_empty() || !entry.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(WriteError::InvalidTableName(entry.name.to_string()));
            }
            if entry.description.contains(['\n', '\r']) {
                return Err(WriteError::MultilineDescription(entry.name.to_string()));
            }
            if let Some((key, _)) = entry.extra.iter().find(|(_, v)| !v.is_representable()) {
                return Err(WriteError::UnrepresentableMetadata {
                    table: entry.name.to_string(),
                    key: key.to_string(),
                });
            }
            if entry.table.column_count() == 0 {
                return Err(WriteError::NoColumns(entry.name.to_string()));
            }
            for column in entry.table.columns() {
                // `dtypes` items are trimmed on read, so padded names would lose their cast.
                if column.name.is_empty()
                    || column.name.trim() != column.name
                    || column.name.contains([',', '[', ']', '{', '}', '=', ':', '\n', '\r'])
                {
                    return Err(WriteError::InvalidColumnName {
                        table: entry.name.to_string(),
                        column: column.name.clone(),
                    });
                }
                if let Some(row) = multiline_row(&column.data) {
                    return Err(WriteError::MultilineValue {
                        table: entry.name.to_string(),
                        column: column.name.clone(),
                        row: row + 1,
                    });
                }
            }
        }
        Ok(())
    }
}

fn multiline_row(data: &ColumnData) -> Option<usize> {
    let breaks = |s: &str| s.contains(['\n', '\r']);
    match data {
        ColumnData::Text(cells) => cells.iter().position(|c| c.as_deref().is_some_and(breaks)),
        ColumnData::Ref(cells) => cells.iter().position(|c| match c {
            Some(RefValue::Text(s)) => breaks(s),
            Some(RefValue::Table(r)) => breaks(&r.name),
            None => false,
        }),
        ColumnData::Int(_) | ColumnData::Float(_) => None,
    }
}

/// `dtypes=[...]`, then `refs=[...]`, `comment="..."` and free-form keys.
fn title_metadata(entry: &Entry<'_>) -> String {
    let columns = entry.table.columns();
    let dtypes: Vec<String> = columns
        .iter()
        .map(|c| format!("{}:{}", c.name, c.data.column_type().dtype_tag()))
        .collect();
    let mut meta = format!("dtypes=[{}]", dtypes.join(","));

    let refs: Vec<&str> = columns
        .iter()
        .filter(|c| c.data.column_type() == ColumnType::Ref)
        .map(|c| c.name.as_str())
        .collect();
    if !refs.is_empty() {
        meta.push_str(&format!(",refs=[{}]", refs.join(",")));
    }

    if !entry.description.is_empty() {
        meta.push_str(&format!(",comment=\"{}\"", entry.description.replace('"', "\\\"")));
    }

    for (key, value) in &entry.extra {
        meta.push_str(&format!(",{}={}", key, value));
    }
    meta
}

/// Column header plus one line per row, `\n`-terminated.
fn encode_table(table: &Table) -> Result<String, WriteError> {
    let mut out = String::new();
    let header: Vec<String> = table.column_names().map(str::to_string).collect();
    push_record(&mut out, &header)?;

    for row in 0..table.row_count() {
        let fields: Vec<String> = (0..table.column_count())
            .map(|col| table.cell(row, col).map(|c| c.to_string()).unwrap_or_default())
            .collect();
        push_record(&mut out, &fields)?;
    }
    Ok(out)
}

/// Minimal quoting, unless the line would read back as blank or as a `#` line.
fn push_record(out: &mut String, fields: &[String]) -> Result<(), WriteError> {
    let line = encode_record(fields, csv::QuoteStyle::Necessary)?;
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        out.push_str(&encode_record(fields, csv::QuoteStyle::Always)?);
    } else {
        out.push_str(&line);
    }
    Ok(())
}

fn encode_record(fields: &[String], style: csv::QuoteStyle) -> Result<String, WriteError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(style)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
