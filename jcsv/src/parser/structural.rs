use std::ops::Range;

use tracing::{debug, warn};

use crate::document::Document;
use crate::metadata::Metadata;
use crate::parser::error::{BlockParseError, DiagnosticKind, ParseError};
use crate::parser::lines::{Line, split_lines};
use crate::parser::manifest::{ManifestSection, read_manifest};
use crate::parser::metadata::{DropReason, parse_metadata_reporting};
use crate::table::Table;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Scan JCSV source into an unresolved document plus diagnostics.
pub fn parse_document(source: &str, file_id: usize) -> (Document, Vec<ParseError>) {
    let lines = split_lines(source);
    let mut state = ScanState::new(file_id);

    let section = read_manifest(&lines);
    let next = section.next;
    state.record_manifest(section);
    state.scan_blocks(&lines, next);
    state.check_manifest();
    state.finalize()
}

// ---------------------------------------------------------------------------
// Scan state
// ---------------------------------------------------------------------------

struct ScanState {
    file_id: usize,
    document: Document,
    manifest_span: Range<usize>,
    errors: Vec<ParseError>,
}

/// A recognized `#name{...}` line.
struct Header<'a> {
    name: &'a str,
    /// Text between the braces and its byte offset in the source.
    metadata: Option<(&'a str, usize)>,
}

impl ScanState {
    fn new(file_id: usize) -> Self {
        ScanState {
            file_id,
            document: Document::new(),
            manifest_span: 0..0,
            errors: Vec::new(),
        }
    }

    fn record_manifest(&mut self, section: ManifestSection) {
        self.manifest_span = section.span.clone();
        match section.outcome {
            None => {}
            Some(Ok(manifest)) => self.document.manifest = Some(manifest),
            Some(Err(failure)) => {
                warn!(error = %failure.error, "manifest ignored");
                self.errors.push(
                    ParseError::error(
                        DiagnosticKind::Manifest,
                        failure.error.to_string(),
                        failure.span,
                        self.file_id,
                    )
                    .with_note("the manifest was ignored; blocks are still parsed"),
                );
            }
        }
    }

    fn scan_blocks(&mut self, lines: &[Line<'_>], mut i: usize) {
        while i < lines.len() {
            let line = lines[i];
            if line.is_blank() {
                i += 1;
                continue;
            }
            match parse_header(&line) {
                Some(header) => i = self.parse_block(lines, i, header),
                None => {
                    self.errors.push(
                        ParseError::warning(
                            DiagnosticKind::StrayLine,
                            "line is not part of any block",
                            line.span(),
                            self.file_id,
                        )
                        .with_note("block headers look like `#name` or `#name{key=value}`"),
                    );
                    i += 1;
                }
            }
        }
    }

    /// Parse the block whose header is `lines[at]`. Returns the index of the
    /// first line after the block.
    fn parse_block(&mut self, lines: &[Line<'_>], at: usize, header: Header<'_>) -> usize {
        let title = lines[at];
        let name = header.name.to_string();
        let metadata = match header.metadata {
            Some((text, offset)) => self.parse_header_metadata(&name, text, offset),
            None => Metadata::new(),
        };

        let mut i = at + 1;
        while i < lines.len() && lines[i].is_blank() {
            i += 1;
        }
        let Some(columns) = lines.get(i).filter(|l| !l.trimmed().starts_with('#')) else {
            let error = BlockParseError::MissingHeader { block: name };
            warn!(%error, "block skipped");
            self.errors
                .push(ParseError::skipped_block(&error, title.span(), self.file_id));
            return i;
        };
        i += 1;

        // Blank lines inside a body are dropped, not kept as empty rows.
        let mut body = Vec::new();
        while let Some(line) = lines.get(i) {
            if line.trimmed().starts_with('#') {
                break;
            }
            if !line.is_blank() {
                body.push(line.text);
            }
            i += 1;
        }
        let span = title.start..lines[i - 1].span().end;

        let table = match build_table(columns.text, &body, &metadata) {
            Ok(table) => table,
            Err(source) => {
                let error = BlockParseError::Table { block: name, source };
                warn!(%error, "block skipped");
                self.errors
                    .push(ParseError::skipped_block(&error, span, self.file_id));
                return i;
            }
        };

        debug!(
            block = %name,
            line = title.number,
            rows = table.row_count(),
            columns = table.column_count(),
            "block parsed"
        );

        let (_, shadowed) = self
            .document
            .push_block(name.clone(), metadata, table, title.number, span);
        if let Some(previous) = shadowed {
            let previous_line = self
                .document
                .blocks
                .iter()
                .find(|b| b.table == previous)
                .map_or(0, |b| b.line);
            self.errors.push(
                ParseError::warning(
                    DiagnosticKind::DuplicateBlock,
                    format!("block `{}` replaces the block of the same name on line {}", name, previous_line),
                    title.span(),
                    self.file_id,
                )
                .in_block(name),
            );
        }

        i
    }

    fn parse_header_metadata(&mut self, block: &str, text: &str, offset: usize) -> Metadata {
        let (metadata, dropped) = parse_metadata_reporting(text);
        for d in dropped {
            let message = match d.reason {
                DropReason::MissingEquals => format!("metadata token `{}` has no `=` and was ignored", d.token),
                DropReason::MalformedDtype => format!("dtypes entry `{}` has no `:` and was ignored", d.token),
            };
            let span = offset + d.span.start..offset + d.span.end;
            self.errors.push(
                ParseError::warning(DiagnosticKind::Metadata, message, span, self.file_id).in_block(block),
            );
        }
        metadata
    }

    /// Compare manifest rows with the header lines actually found.
    fn check_manifest(&mut self) {
        let Some(manifest) = &self.document.manifest else {
            return;
        };
        for (name, entry) in manifest.iter() {
            match self.document.block(name) {
                Some(block) if block.line != entry.start_line => {
                    self.errors.push(
                        ParseError::warning(
                            DiagnosticKind::ManifestOffset,
                            format!(
                                "manifest says `{}` starts on line {}, but its header is on line {}",
                                name, entry.start_line, block.line
                            ),
                            block.span.start..block.span.start + name.len() + 1,
                            self.file_id,
                        )
                        .in_block(name),
                    );
                }
                Some(_) => {}
                None => {
                    self.errors.push(
                        ParseError::warning(
                            DiagnosticKind::ManifestOffset,
                            format!("manifest lists `{}`, but the document has no such block", name),
                            self.manifest_span.clone(),
                            self.file_id,
                        )
                        .in_block(name),
                    );
                }
            }
        }
    }

    fn finalize(self) -> (Document, Vec<ParseError>) {
        (self.document, self.errors)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Match `#identifier` with optional `{...}` metadata on a trimmed line.
fn parse_header<'a>(line: &Line<'a>) -> Option<Header<'a>> {
    let text = line.trimmed();
    let lead = line.text.len() - line.text.trim_start().len();
    let rest = text.strip_prefix('#')?;

    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }
    let (name, tail) = rest.split_at(name_len);
    if tail.is_empty() {
        return Some(Header { name, metadata: None });
    }

    let inner = tail.strip_prefix('{')?.strip_suffix('}')?;
    let offset = line.start + lead + 1 + name_len + 1;
    Some(Header {
        name,
        metadata: Some((inner, offset)),
    })
}

fn build_table(header: &str, body: &[&str], metadata: &Metadata) -> Result<Table, crate::table::TableError> {
    let mut table = Table::from_csv(header, body)?;
    if let Some(dtypes) = metadata.dtypes() {
        table.apply_dtypes(dtypes)?;
    }
    Ok(table)
}
