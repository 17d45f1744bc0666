mod cast;

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::document::TableId;

pub use cast::DType;

/// Handle to another table of the same document.
///
/// Stores the arena id (plus the name the cell held) rather than the table
/// itself, so reference cycles never become ownership cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub id: TableId,
    pub name: String,
}

/// A cell of a resolved `refs` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    Table(TableRef),
    /// No table had this name; the original text is kept.
    Text(String),
}

/// Column storage. `None` is the missing-value marker in every variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Text(Vec<Option<String>>),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Ref(Vec<Option<RefValue>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Int,
    Float,
    Ref,
}

impl ColumnType {
    /// Tag written into `dtypes` by the writer.
    pub fn dtype_tag(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Text | ColumnType::Ref => "str",
        }
    }
}

/// `int`, `float`, `str` or `ref`.
impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Ref => f.write_str("ref"),
            other => f.write_str(other.dtype_tag()),
        }
    }
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Ref(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Text(_) => ColumnType::Text,
            ColumnData::Int(_) => ColumnType::Int,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Ref(_) => ColumnType::Ref,
        }
    }

    pub fn cell(&self, row: usize) -> Option<Cell<'_>> {
        let cell = match self {
            ColumnData::Text(v) => v.get(row)?.as_deref().map_or(Cell::Null, Cell::Text),
            ColumnData::Int(v) => v.get(row)?.map_or(Cell::Null, Cell::Int),
            ColumnData::Float(v) => v.get(row)?.map_or(Cell::Null, Cell::Float),
            ColumnData::Ref(v) => match v.get(row)? {
                None => Cell::Null,
                Some(RefValue::Table(r)) => Cell::Table(r),
                Some(RefValue::Text(s)) => Cell::Text(s),
            },
        };
        Some(cell)
    }
}

/// Borrowed view of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Null,
    Text(&'a str),
    Int(i64),
    Float(f64),
    Table(&'a TableRef),
}

/// Formats the cell as it appears in a CSV field. References print the
/// target table's name.
impl fmt::Display for Cell<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Float(x) => write!(f, "{}", format_float(*x)),
            Cell::Table(r) => write!(f, "{}", r.name),
        }
    }
}

/// `1.0` stays `1.0` rather than `1`, like the float columns it came from.
fn format_float(x: f64) -> String {
    let s = x.to_string();
    if x.is_finite() && !s.contains(['.', 'e']) {
        format!("{}.0", s)
    } else {
        s
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row} has {found} fields, expected at most {expected}")]
    RowTooWide { row: usize, expected: usize, found: usize },

    #[error("column header has an unterminated quote")]
    UnterminatedHeaderQuote,

    #[error("row {row} has an unterminated quote")]
    UnterminatedQuote { row: usize },

    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),

    #[error("column `{column}` has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("column `{column}` row {row}: cannot cast `{value}` to {dtype}")]
    Cast {
        column: String,
        row: usize,
        value: String,
        dtype: &'static str,
    },
}

/// Ordered named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    /// Build a table from columns, checking names are unique and lengths agree.
    pub fn from_columns(columns: impl IntoIterator<Item = Column>) -> Result<Self, TableError> {
        let mut table = Table::new();
        for column in columns {
            table.push_column(column.name, column.data)?;
        }
        Ok(table)
    }

    pub fn push_column(&mut self, name: impl Into<String>, data: ColumnData) -> Result<(), TableError> {
        let name = name.into();
        if self.column(&name).is_some() {
            return Err(TableError::DuplicateColumn(name));
        }
        if self.columns.is_empty() {
            self.rows = data.len();
        } else if data.len() != self.rows {
            return Err(TableError::LengthMismatch {
                column: name,
                expected: self.rows,
                found: data.len(),
            });
        }
        self.columns.push(Column { name, data });
        Ok(())
    }

    /// Parse a CSV header line plus data lines into an all-text table.
    /// Each line is exactly one record: a quote left open at the end of a
    /// line is an error. Short rows are padded with missing values.
    pub fn from_csv(header: &str, body: &[&str]) -> Result<Self, TableError> {
        let mut text = String::with_capacity(header.len() + body.iter().map(|l| l.len() + 1).sum::<usize>() + 1);
        text.push_str(header);
        text.push('\n');
        for line in body {
            text.push_str(line);
            text.push('\n');
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        // Source lines never contain `\n`, so a field holding one is a quote
        // that ran into the following lines.
        let headers = reader.headers()?;
        if headers.iter().any(|f| f.contains('\n')) {
            return Err(TableError::UnterminatedHeaderQuote);
        }
        let names: Vec<String> = headers.iter().map(str::to_string).collect();
        let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            if record.iter().any(|f| f.contains('\n')) {
                return Err(TableError::UnterminatedQuote { row: row + 1 });
            }
            if record.len() > names.len() {
                return Err(TableError::RowTooWide {
                    row: row + 1,
                    expected: names.len(),
                    found: record.len(),
                });
            }
            for (i, column) in values.iter_mut().enumerate() {
                column.push(record.get(i).filter(|v| !v.is_empty()).map(str::to_string));
            }
        }

        Table::from_columns(names.into_iter().zip(values).map(|(name, v)| Column {
            name,
            data: ColumnData::Text(v),
        }))
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Mutable access to a column's data. The caller may change cell values
    /// and types but must keep the length.
    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<Cell<'_>> {
        self.columns.get(column)?.data.cell(row)
    }

    pub fn row(&self, row: usize) -> Option<Vec<Cell<'_>>> {
        if row >= self.rows {
            return None;
        }
        self.columns.iter().map(|c| c.data.cell(row)).collect()
    }

    /// Cast columns named in a `dtypes` map. Columns not in the table are
    /// ignored, unknown tags leave the column as text.
    pub fn apply_dtypes(&mut self, dtypes: &IndexMap<String, String>) -> Result<(), TableError> {
        for (name, tag) in dtypes {
            let dtype = DType::from_tag(tag);
            if let Some(column) = self.column_mut(name) {
                cast::cast_column(column, dtype)?;
            }
        }
        Ok(())
    }
}
