/// Line numbers the writer will emit, computed before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// `#manifest`, header, one row per table, closing blank line.
    pub manifest_lines: usize,
    /// 1-based line of each table's `#name{...}` line, in table order.
    pub start_lines: Vec<usize>,
    /// Number of lines in the whole output.
    pub total_lines: usize,
}

impl Layout {
    /// Compute offsets from each table's row count.
    ///
    /// Every table takes its title line, its column header, its rows and the
    /// blank line before the next table.
    pub fn compute(row_counts: &[usize]) -> Layout {
        let manifest_lines = 2 + row_counts.len() + 1;
        let mut cursor = manifest_lines + 2;
        let mut start_lines = Vec::with_capacity(row_counts.len());
        for rows in row_counts {
            start_lines.push(cursor);
            cursor += 2 + rows + 1;
        }
        Layout {
            manifest_lines,
            start_lines,
            total_lines: cursor - 2,
        }
    }
}
