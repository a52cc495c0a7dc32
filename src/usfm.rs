//! Line-oriented USFM reading and writing.
//!
//! A book is kept as its lines, each split into the leading backslash marker
//! and the editable text after it. Everything needed to write the file back
//! byte for byte (BOM, line endings, the final newline) is remembered.

use std::io;
use std::path::Path;
use tracing::debug;

use crate::models::DocumentLine;

const BOM: char = '\u{feff}';

/// A parsed USFM book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsfmDocument {
    pub book_code: String,
    pub lines: Vec<DocumentLine>,
    prefixes: Vec<String>, // Marker part of each line as written, e.g. "\\v "
    crlf: Vec<bool>,
    has_bom: bool,
    trailing_newline: bool,
}

impl UsfmDocument {
    /// Parse book text. `fallback_book` is used when there is no `\id` line.
    pub fn parse(text: &str, fallback_book: &str) -> Self {
        let has_bom = text.starts_with(BOM);
        let text = text.strip_prefix(BOM).unwrap_or(text);

        let trailing_newline = text.ends_with('\n');
        let body = text.strip_suffix('\n').unwrap_or(text);

        let raw_lines: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else {
            body.split('\n').collect()
        };

        let book_code = raw_lines
            .iter()
            .find_map(|&line| match split_marker(line.strip_suffix('\r').unwrap_or(line)) {
                (Some("id"), rest) => rest.split_whitespace().next().map(str::to_uppercase),
                _ => None,
            })
            .unwrap_or_else(|| fallback_book.to_uppercase());

        let mut lines = Vec::with_capacity(raw_lines.len());
        let mut prefixes = Vec::with_capacity(raw_lines.len());
        let mut crlf = Vec::with_capacity(raw_lines.len());

        let mut current_marker = String::new();
        let mut chapter: Option<String> = None;
        let mut verse: Option<String> = None;

        for raw in raw_lines {
            let (raw, cr) = match raw.strip_suffix('\r') {
                Some(stripped) => (stripped, true),
                None => (raw, false),
            };
            let (marker, text) = split_marker(raw);

            if let Some(marker) = marker {
                current_marker = marker.to_string();
                let number = text.split_whitespace().next().map(str::to_string);
                match marker {
                    "c" => {
                        chapter = number;
                        verse = None;
                    }
                    "v" => verse = number,
                    _ => {}
                }
            }

            let reference = match (&chapter, &verse) {
                (Some(c), Some(v)) => Some(format!("{}:{}", c, v)),
                _ => None,
            };

            prefixes.push(raw[..raw.len() - text.len()].to_string());
            crlf.push(cr);
            lines.push(DocumentLine {
                book_code: book_code.clone(),
                marker: current_marker.clone(),
                reference,
                text: text.to_string(),
            });
        }

        debug!("Parsed {} with {} lines", book_code, lines.len());

        UsfmDocument {
            book_code,
            lines,
            prefixes,
            crlf,
            has_bom,
            trailing_newline,
        }
    }

    pub fn read(path: &Path, fallback_book: &str) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text, fallback_book))
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_text())
    }

    /// Reassemble the book text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if self.has_bom {
            out.push(BOM);
        }
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&self.prefixes[i]);
            out.push_str(&line.text);
            if self.crlf[i] {
                out.push('\r');
            }
        }
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    /// A copy of this book with the line texts replaced, one per line.
    pub fn with_texts(&self, texts: Vec<String>) -> Self {
        debug_assert_eq!(texts.len(), self.lines.len());
        let mut document = self.clone();
        for (line, text) in document.lines.iter_mut().zip(texts) {
            line.text = text;
        }
        document
    }

    /// Insert a `\rem` line carrying `note` before the first `\h` line.
    /// Later `\h` lines are left alone. Returns false when the book has no
    /// `\h` line.
    pub fn stamp(&mut self, note: &str) -> bool {
        let Some(at) = self.prefixes.iter().position(|p| split_marker(p).0 == Some("h")) else {
            return false;
        };

        let reference = self.lines[at].reference.clone();
        self.lines.insert(
            at,
            DocumentLine {
                book_code: self.book_code.clone(),
                marker: "rem".to_string(),
                reference,
                text: note.to_string(),
            },
        );
        self.prefixes.insert(at, "\\rem ".to_string());
        self.crlf.insert(at, self.crlf[at]);
        true
    }
}

/// The standard note recorded in an edited book.
pub fn edit_note(timestamp: &str) -> String {
    format!(
        "USFM file edited {} by {} v{}",
        timestamp,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

/// Split a line into its leading marker (without the backslash) and the text.
///
/// The marker ends at the first space, `*` or backslash. A space is dropped,
/// a `*` stays with the marker, and a self-closing `\ts\*` keeps its closure.
pub fn split_marker(line: &str) -> (Option<&str>, &str) {
    let Some(rest) = line.strip_prefix('\\') else {
        return (None, line);
    };

    let Some(ix) = rest.find([' ', '*', '\\']) else {
        return (Some(rest), "");
    };

    match rest.as_bytes()[ix] {
        b'\\' if rest[ix + 1..].starts_with('*') => (Some(&rest[..ix + 2]), &rest[ix + 2..]),
        b'\\' => (Some(&rest[..ix]), &rest[ix..]),
        b'*' => (Some(&rest[..ix + 1]), &rest[ix + 1..]),
        _ => (Some(&rest[..ix]), &rest[ix + 1..]),
    }
}
