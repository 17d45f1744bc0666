use tracing::{debug, trace};

use crate::document::Document;
use crate::table::{ColumnData, RefValue, TableRef};

/// Counts of reference cells handled by one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Cells that now hold a handle to a table.
    pub resolved: usize,
    /// Cells whose text named no table and was kept.
    pub unresolved: usize,
}

/// Turn the text of every `refs` column into handles to the named tables.
///
/// One pass over the blocks in parse order. Resolved handles are never
/// followed, so the pass terminates even when the tables reference each
/// other in a cycle. Nothing detects such cycles: code that walks handles
/// recursively must guard itself.
///
/// Only text columns are converted. Running it on a resolved document does
/// nothing.
pub fn resolve_references(document: &mut Document) -> ResolveReport {
    let mut report = ResolveReport::default();
    if document.resolved {
        return report;
    }

    let Document {
        blocks, tables, names, ..
    } = document;

    for block in blocks.iter() {
        let refs = block.metadata.refs();
        if refs.is_empty() {
            continue;
        }
        let table = &mut tables[block.table.index()];

        for column_name in refs {
            let Some(column) = table.column_mut(column_name) else {
                trace!(block = %block.name, column = column_name, "refs column not in table");
                continue;
            };
            let ColumnData::Text(cells) = &mut column.data else {
                continue;
            };

            let converted = std::mem::take(cells)
                .into_iter()
                .map(|cell| {
                    cell.map(|text| match names.get(&text) {
                        Some(&id) => {
                            report.resolved += 1;
                            RefValue::Table(TableRef { id, name: text })
                        }
                        None => {
                            report.unresolved += 1;
                            RefValue::Text(text)
                        }
                    })
                })
                .collect();
            column.data = ColumnData::Ref(converted);
        }
    }

    document.resolved = true;
    debug!(resolved = report.resolved, unresolved = report.unresolved, "references resolved");
    report
}
