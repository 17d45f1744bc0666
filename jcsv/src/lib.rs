pub mod block;
pub mod document;
pub mod manifest;
pub mod metadata;
pub mod parser;
pub mod resolve;
pub mod table;
pub mod writer;

pub use crate::block::Block;
pub use crate::document::{Document, ReferenceEdge, TableId};
pub use crate::manifest::{Manifest, ManifestEntry, ManifestError};
pub use crate::metadata::{MetaValue, Metadata};
pub use crate::parser::{BlockParseError, DiagnosticKind, ParseError, Parser};
pub use crate::resolve::{ResolveReport, resolve_references};
pub use crate::table::{Cell, Column, ColumnData, ColumnType, DType, RefValue, Table, TableError, TableRef};
pub use crate::writer::{Descriptions, Layout, WriteError, Writer};

use indexmap::IndexMap;

/// Result of parsing one JCSV source: the document plus every diagnostic
/// produced along the way. Parsing never fails as a whole.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub document: Document,
    pub diagnostics: Vec<ParseError>,
}

impl Parsed {
    /// True if any diagnostic has error severity.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(ParseError::is_error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ParseError> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    pub fn errors(&self) -> impl Iterator<Item = &ParseError> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Parse JCSV text with file id 0 and resolve references.
pub fn parse(text: &str) -> Parsed {
    Parser::new(text.to_string(), 0).parse()
}

/// Serialize an ordered table map with optional descriptions.
pub fn write(tables: &IndexMap<String, Table>, descriptions: &Descriptions) -> Result<String, WriteError> {
    Writer::from_tables(tables, descriptions).render()
}

/// Serialize a parsed document, keeping its comments and free-form metadata.
pub fn write_document(document: &Document) -> Result<String, WriteError> {
    Writer::from_document(document).render()
}
