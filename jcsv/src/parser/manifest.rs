use std::ops::Range;

use tracing::debug;

use crate::manifest::{MANIFEST_MARKER, Manifest, ManifestEntry, ManifestError};
use crate::parser::lines::Line;

/// Where the manifest section ended and what it produced.
pub(crate) struct ManifestSection {
    /// Index of the first line after the section.
    pub next: usize,
    /// Byte span of the whole section.
    pub span: Range<usize>,
    /// `None` when the source has no manifest.
    pub outcome: Option<Result<Manifest, ManifestFailure>>,
}

pub(crate) struct ManifestFailure {
    pub error: ManifestError,
    pub span: Range<usize>,
}

/// Read an optional leading `#manifest` section.
///
/// A failing row does not stop the reader: the rest of the section is still
/// consumed so block scanning resumes after it.
pub(crate) fn read_manifest(lines: &[Line<'_>]) -> ManifestSection {
    let mut idx = 0;
    while idx < lines.len() && lines[idx].is_blank() {
        idx += 1;
    }
    if idx >= lines.len() || lines[idx].trimmed() != MANIFEST_MARKER {
        return ManifestSection {
            next: idx,
            span: 0..0,
            outcome: None,
        };
    }
    let marker = lines[idx];
    idx += 1;

    let header = match lines.get(idx) {
        Some(line) if !line.is_blank() && !line.trimmed().starts_with('#') => line,
        _ => {
            return ManifestSection {
                next: idx,
                span: marker.span(),
                outcome: Some(Err(ManifestFailure {
                    error: ManifestError::MissingHeader,
                    span: marker.span(),
                })),
            };
        }
    };
    let columns: Vec<&str> = header.trimmed().split(',').map(str::trim).collect();
    idx += 1;

    let mut manifest = Manifest::new();
    let mut failure = None;

    while let Some(line) = lines.get(idx) {
        let text = line.trimmed();
        if text.is_empty() || text.starts_with('#') {
            break;
        }
        idx += 1;
        if failure.is_some() {
            continue;
        }
        match read_row(&columns, text, line.number) {
            Ok((table, entry)) => manifest.insert(table, entry),
            Err(error) => {
                failure = Some(ManifestFailure {
                    error,
                    span: line.span(),
                })
            }
        }
    }

    debug!(entries = manifest.len(), failed = failure.is_some(), "manifest read");

    ManifestSection {
        next: idx,
        span: marker.start..lines[idx - 1].span().end,
        outcome: Some(match failure {
            Some(f) => Err(f),
            None => Ok(manifest),
        }),
    }
}

/// Zip a row against the header. Extra values are ignored, missing ones absent.
fn read_row(columns: &[&str], text: &str, line: usize) -> Result<(String, ManifestEntry), ManifestError> {
    let values: Vec<&str> = text.split(',').map(str::trim).collect();
    let lookup = |name: &str| {
        columns
            .iter()
            .zip(values.iter())
            .filter(|(col, _)| **col == name)
            .map(|(_, value)| *value)
            .last()
    };

    let table = lookup("table").ok_or(ManifestError::MissingColumn {
        column: "table",
        line,
    })?;
    let start = lookup("start_line").ok_or(ManifestError::MissingColumn {
        column: "start_line",
        line,
    })?;
    let start_line = start
        .parse::<usize>()
        .map_err(|_| ManifestError::InvalidStartLine {
            value: start.to_string(),
            line,
        })?;
    let description = lookup("description").unwrap_or_default().to_string();

    Ok((
        table.to_string(),
        ManifestEntry {
            start_line,
            description,
        },
    ))
}
