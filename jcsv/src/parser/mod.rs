pub mod error;
mod lines;
mod manifest;
pub mod metadata;
mod structural;

pub use error::{BlockParseError, DiagnosticKind, ParseError};

use tracing::debug;

use crate::Parsed;
use crate::resolve::resolve_references;

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Parse the source into a resolved Document.
    ///
    /// Never fails: skipped blocks, a rejected manifest and dropped
    /// metadata tokens are reported in [`Parsed::diagnostics`].
    pub fn parse(&self) -> Parsed {
        let (mut document, diagnostics) = structural::parse_document(&self.source, self.file_id);
        let report = resolve_references(&mut document);
        debug!(
            tables = document.len(),
            blocks = document.blocks().len(),
            resolved = report.resolved,
            unresolved = report.unresolved,
            diagnostics = diagnostics.len(),
            "document parsed"
        );
        Parsed { document, diagnostics }
    }

    /// Parse without running the reference resolver.
    pub fn parse_unresolved(&self) -> Parsed {
        let (document, diagnostics) = structural::parse_document(&self.source, self.file_id);
        Parsed { document, diagnostics }
    }
}
