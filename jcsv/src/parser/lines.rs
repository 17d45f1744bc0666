use std::ops::Range;

/// One source line without its terminator.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    pub text: &'a str,
    /// Byte offset of the line in the source.
    pub start: usize,
    /// 1-based line number.
    pub number: usize,
}

impl<'a> Line<'a> {
    pub fn span(&self) -> Range<usize> {
        self.start..self.start + self.text.len()
    }

    pub fn trimmed(&self) -> &'a str {
        self.text.trim()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Split on `\n`, dropping a trailing `\r` and a leading byte-order mark.
pub(crate) fn split_lines(source: &str) -> Vec<Line<'_>> {
    let mut offset = source.strip_prefix('\u{feff}').map_or(0, |_| '\u{feff}'.len_utf8());
    let mut lines = Vec::new();

    for (i, raw) in source[offset..].split_inclusive('\n').enumerate() {
        let text = raw.strip_suffix('\n').unwrap_or(raw);
        let text = text.strip_suffix('\r').unwrap_or(text);
        lines.push(Line {
            text,
            start: offset,
            number: i + 1,
        });
        offset += raw.len();
    }

    lines
}
