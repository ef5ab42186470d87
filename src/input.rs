//! Logical-line input.
//!
//! Definitions are line-oriented, but one *logical* line may span several
//! *physical* lines joined by a trailing backslash. This module owns that
//! mapping:
//!
//! - [`LineReader`] walks the raw text, skipping blank lines and `#` comments,
//!   joining continuations, and tracking 1-based physical row numbers.
//! - [`InputLine`] is one logical line. It remembers where each physical
//!   segment starts so that any byte offset into the joined contents can be
//!   resolved back to a `(row, column)` pair for diagnostics.
//!
//! Everything downstream (tokenizer, resolver, flattener) points back into
//! `InputLine`s via `Arc`, so a single definition line is stored once no
//! matter how many pieces were cut from it.

use std::sync::Arc;

use crate::error::DefinitionError;

/// One logical input line, possibly joined from several physical lines.
#[derive(Debug)]
pub struct InputLine {
    source_desc: Arc<str>,
    /// 1-based physical row of the first segment.
    start_row: usize,
    contents: String,
    /// Byte offsets where continuation segments start within `contents`.
    /// Empty for single-segment lines; the first segment always starts at 0.
    segment_offsets: Vec<usize>,
}

impl InputLine {
    fn new(source_desc: Arc<str>, start_row: usize, contents: String) -> Self {
        InputLine { source_desc, start_row, contents, segment_offsets: Vec::new() }
    }

    fn push_segment(&mut self, segment: &str) {
        self.segment_offsets.push(self.contents.len());
        self.contents.push_str(segment);
    }

    /// The joined logical contents (continuation backslashes removed).
    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Resolves a byte offset into the logical contents to a 1-based
    /// `(row, column)` pair in the physical source.
    pub fn location(&self, offset: usize) -> (usize, usize) {
        let mut segment = 0;
        let mut segment_start = 0;
        for (i, &seg_offset) in self.segment_offsets.iter().enumerate() {
            if offset < seg_offset {
                break;
            }
            segment = i + 1;
            segment_start = seg_offset;
        }
        (self.start_row + segment, offset - segment_start + 1)
    }

    /// Builds a located definition error at `offset` within this line.
    pub fn error(&self, offset: usize, message: impl Into<String>) -> DefinitionError {
        let (row, column) = self.location(offset);
        DefinitionError::located(&self.source_desc, row, column, message)
    }
}

/// Pull-based reader over in-memory definition text.
///
/// Skips blank and comment lines *between* logical lines only: once a
/// continuation has started, every following physical line belongs to it
/// verbatim until one does not end in a backslash.
#[derive(Debug)]
pub(crate) struct LineReader {
    source_desc: Arc<str>,
    lines: Vec<String>,
    next: usize,
    /// Row of the most recently consumed physical line (0 before any reads).
    row: usize,
}

impl LineReader {
    pub fn new(source_desc: &str, text: &str) -> Self {
        LineReader {
            source_desc: Arc::from(source_desc),
            lines: text.lines().map(str::to_string).collect(),
            next: 0,
            row: 0,
        }
    }

    pub fn source_desc(&self) -> Arc<str> {
        Arc::clone(&self.source_desc)
    }

    /// Builds an error at the reader's current row (used when there is no
    /// specific line to point at, e.g. unexpected end of input).
    pub fn error(&self, message: impl Into<String>) -> DefinitionError {
        DefinitionError::located(&self.source_desc, self.row.max(1), 1, message)
    }

    /// Next logical line, or `None` at end of input.
    pub fn next_line(&mut self) -> Result<Option<Arc<InputLine>>, DefinitionError> {
        let Some(first) = self.next_content_line() else {
            return Ok(None);
        };

        if !first.ends_with('\\') {
            return Ok(Some(Arc::new(InputLine::new(self.source_desc(), self.row, first))));
        }
        let mut joined = InputLine::new(
            self.source_desc(),
            self.row,
            first[..first.len() - 1].to_string(),
        );

        loop {
            let Some(segment) = self.next_physical_line() else {
                return Err(self.error("Unexpected end-of-input when expecting line continuation"));
            };
            if !segment.ends_with('\\') {
                joined.push_segment(&segment);
                return Ok(Some(Arc::new(joined)));
            }
            joined.push_segment(&segment[..segment.len() - 1]);
        }
    }

    fn next_content_line(&mut self) -> Option<String> {
        while let Some(line) = self.next_physical_line() {
            if !is_blank_or_comment(&line) {
                return Some(line);
            }
        }
        None
    }

    fn next_physical_line(&mut self) -> Option<String> {
        let line = self.lines.get(self.next)?.clone();
        self.next += 1;
        self.row += 1;
        Some(line)
    }
}

fn is_blank_or_comment(line: &str) -> bool {
    for c in line.chars() {
        if (c as u32) <= 0x20 {
            continue;
        }
        return c == '#';
    }
    true
}
