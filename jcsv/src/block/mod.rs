use std::ops::Range;

use crate::document::TableId;
use crate::metadata::Metadata;

/// A named section of a JCSV document: one header line, one table.
#[derive(Debug, Clone)]
pub struct Block {
    /// The identifier after `#` in the header line.
    pub name: String,
    pub metadata: Metadata,
    /// The block's table in the document arena.
    pub table: TableId,
    /// 1-based line of the `#name` header.
    pub line: usize,
    /// Byte span in source for error reporting.
    pub span: Range<usize>,
}
