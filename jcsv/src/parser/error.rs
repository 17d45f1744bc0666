use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use thiserror::Error;

use crate::table::TableError;

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A metadata token or dtype item was dropped.
    Metadata,
    /// The manifest could not be read.
    Manifest,
    /// The manifest disagrees with the blocks actually found.
    ManifestOffset,
    /// A block was skipped.
    Block,
    /// A later block replaced an earlier one of the same name.
    DuplicateBlock,
    /// A non-blank line outside any block.
    StrayLine,
}

/// A block whose body could not be turned into a table.
#[derive(Debug, Error)]
pub enum BlockParseError {
    #[error("block `{block}` has no column header line")]
    MissingHeader { block: String },

    #[error("block `{block}`: {source}")]
    Table {
        block: String,
        #[source]
        source: TableError,
    },
}

impl BlockParseError {
    pub fn block(&self) -> &str {
        match self {
            BlockParseError::MissingHeader { block } => block,
            BlockParseError::Table { block, .. } => block,
        }
    }
}

/// Parse diagnostics with source location information.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Range<usize>,
    pub file_id: usize,
    pub severity: Severity,
    /// Block the diagnostic belongs to, if any.
    pub block: Option<String>,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        ParseError {
            kind,
            message: message.into(),
            span,
            file_id,
            severity: Severity::Error,
            block: None,
            notes: Vec::new(),
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        ParseError {
            kind,
            message: message.into(),
            span,
            file_id,
            severity: Severity::Warning,
            block: None,
            notes: Vec::new(),
        }
    }

    pub fn in_block(mut self, block: impl Into<String>) -> Self {
        self.block = Some(block.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }

    /// Diagnostic for a block that was skipped.
    pub fn skipped_block(error: &BlockParseError, span: Range<usize>, file_id: usize) -> Self {
        ParseError::error(DiagnosticKind::Block, error.to_string(), span, file_id)
            .in_block(error.block())
            .with_note("the block was skipped")
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        Diagnostic::new(self.severity)
            .with_message(&self.message)
            .with_labels(vec![Label::primary(self.file_id, self.span.clone())])
            .with_notes(self.notes.clone())
    }
}
