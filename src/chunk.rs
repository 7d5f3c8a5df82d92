//! Splits a PB stream into chunks.
//!
//! A stream is a sequence of chunks separated by an empty line. The first line
//! of each chunk is the escaped `PayloadInfo` header; every following line is
//! one escaped sample. Only an unescaped LF ends a line.

use crate::constants::{ESCAPE_CHAR, NEWLINE_CHAR};

/// One escaped line of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// Byte offset of the first byte of the line within the stream.
    pub offset: usize,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub header: Record<'a>,
    pub records: Vec<Record<'a>>,
}

impl<'a> Chunk<'a> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lazy iterator over the chunks of a borrowed byte stream.
#[derive(Debug, Clone)]
pub struct ChunkSplitter<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ChunkSplitter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Next line, without its terminating LF.
    fn next_line(&mut self) -> Option<Record<'a>> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let start = self.pos;
        let mut i = start;
        while i < self.bytes.len() {
            match self.bytes[i] {
                ESCAPE_CHAR => i += 2,
                NEWLINE_CHAR => {
                    self.pos = i + 1;
                    return Some(Record {
                        offset: start,
                        bytes: &self.bytes[start..i],
                    });
                }
                _ => i += 1,
            }
        }
        // Unterminated final line. A trailing ESC is left in place for the
        // decoder to report.
        self.pos = self.bytes.len();
        Some(Record {
            offset: start,
            bytes: &self.bytes[start..],
        })
    }
}

impl<'a> Iterator for ChunkSplitter<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = loop {
            let line = self.next_line()?;
            if !line.bytes.is_empty() {
                break line;
            }
        };
        let mut records = Vec::new();
        while let Some(line) = self.next_line() {
            if line.bytes.is_empty() {
                break;
            }
            records.push(line);
        }
        Some(Chunk { header, records })
    }
}
