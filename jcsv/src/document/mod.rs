use std::ops::{Index, Range};

use indexmap::{IndexMap, IndexSet};

use crate::block::Block;
use crate::manifest::Manifest;
use crate::metadata::Metadata;
use crate::table::{ColumnData, RefValue, Table, TableRef};
use crate::writer::Descriptions;

/// Stable index of a table in a document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub(crate) usize);

impl TableId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One `refs` edge: `from.column` holds at least one handle to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceEdge {
    pub from: String,
    pub column: String,
    pub to: String,
}

/// A parsed JCSV document.
///
/// Owns every table in an arena. The table map (`name → id`) keeps the order
/// in which names first appeared; a later block with the same name takes
/// over the entry, and the earlier table is only reachable through its block.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub(crate) manifest: Option<Manifest>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) tables: Vec<Table>,
    pub(crate) names: IndexMap<String, TableId>,
    pub(crate) resolved: bool,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// All blocks in parse order, shadowed ones included.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The block currently owning `name` in the table map.
    pub fn block(&self, name: &str) -> Option<&Block> {
        let id = *self.names.get(name)?;
        self.blocks.iter().rev().find(|b| b.table == id)
    }

    pub fn metadata(&self, name: &str) -> Option<&Metadata> {
        self.block(name).map(|b| &b.metadata)
    }

    /// Metadata of the current block named `name`, for in-place editing.
    pub fn metadata_mut(&mut self, name: &str) -> Option<&mut Metadata> {
        let id = *self.names.get(name)?;
        self.blocks
            .iter_mut()
            .rev()
            .find(|b| b.table == id)
            .map(|b| &mut b.metadata)
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).copied()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.table_id(name).and_then(|id| self.get(id))
    }

    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.0)
    }

    /// The table a resolved reference cell points at.
    pub fn follow(&self, reference: &TableRef) -> Option<&Table> {
        self.get(reference.id)
    }

    /// The table map in order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.names
            .iter()
            .map(|(name, id)| (name.as_str(), &self.tables[id.0]))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Number of entries in the table map.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Per-table descriptions taken from each current block's `comment`.
    pub fn descriptions(&self) -> Descriptions {
        self.table_names()
            .filter_map(|name| {
                let comment = self.metadata(name)?.comment()?;
                Some((name.to_string(), comment.to_string()))
            })
            .collect()
    }

    /// Distinct reference edges of the current tables, in table-map order.
    pub fn references(&self) -> Vec<ReferenceEdge> {
        let mut edges = IndexSet::new();
        for (name, table) in self.tables() {
            for column in table.columns() {
                let ColumnData::Ref(cells) = &column.data else {
                    continue;
                };
                for cell in cells.iter().flatten() {
                    if let RefValue::Table(target) = cell {
                        edges.insert(ReferenceEdge {
                            from: name.to_string(),
                            column: column.name.clone(),
                            to: target.name.clone(),
                        });
                    }
                }
            }
        }
        edges.into_iter().collect()
    }

    /// Add a block, making it the owner of `name`. Returns the id of the
    /// table it shadows, if any.
    pub(crate) fn push_block(
        &mut self,
        name: String,
        metadata: Metadata,
        table: Table,
        line: usize,
        span: Range<usize>,
    ) -> (TableId, Option<TableId>) {
        let id = TableId(self.tables.len());
        self.tables.push(table);
        let shadowed = self.names.insert(name.clone(), id);
        self.blocks.push(Block {
            name,
            metadata,
            table: id,
            line,
            span,
        });
        (id, shadowed)
    }

    /// Create a block outside of parsing. It has no source line (`line == 0`).
    pub fn insert_table(&mut self, name: impl Into<String>, table: Table, metadata: Metadata) -> TableId {
        self.push_block(name.into(), metadata, table, 0, 0..0).0
    }

    /// Remove `name` from the table map along with its blocks.
    ///
    /// The table stays in the arena, so existing reference handles to it
    /// remain valid.
    pub fn remove_table(&mut self, name: &str) -> bool {
        if self.names.shift_remove(name).is_none() {
            return false;
        }
        self.blocks.retain(|b| b.name != name);
        true
    }
}

impl Index<TableId> for Document {
    type Output = Table;

    fn index(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }
}
