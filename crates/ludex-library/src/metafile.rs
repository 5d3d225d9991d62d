//! Line-oriented metadata text reader
//!
//! ```text
//! # comment
//! collection: Super Nintendo
//! extensions: sfc, smc
//!
//! [Arcade]
//! game: Street Fighter II
//! description: First paragraph
//!   continues here.
//!   .
//!   Second paragraph.
//! ```
//!
//! Keys are lowercased. Indented lines continue the previous entry; a lone
//! `.` marks an empty paragraph line. A blank line closes the entry.

use crate::LibraryError;
use std::path::Path;

/// One `key: value` entry with its continuation lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    /// Line of the key
    pub line: usize,
    pub key: String,
    /// Trimmed values; an empty string is a paragraph break
    pub values: Vec<String>,
}

const EMPTY_LINE_MARK: &str = ".";

/// Parse metadata text into entries and located errors, in file order
pub fn parse_str(text: &str, source_name: &str) -> Vec<Result<Entry, LibraryError>> {
    let mut out = Vec::new();
    let mut current = Entry::default();

    let close = |entry: &mut Entry, out: &mut Vec<Result<Entry, LibraryError>>| {
        if entry.key.is_empty() {
            return;
        }
        let done = std::mem::take(entry);
        if done.values.is_empty() {
            out.push(Err(LibraryError::parse(
                source_name,
                done.line,
                "attribute value missing, entry ignored",
            )));
        } else {
            out.push(Ok(done));
        }
    };

    for (index, line) in text.lines().enumerate() {
        let linenum = index + 1;

        if line.starts_with('#') {
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            close(&mut current, &mut out);
            continue;
        }

        if line.starts_with(char::is_whitespace) {
            if current.key.is_empty() {
                out.push(Err(LibraryError::parse(
                    source_name,
                    linenum,
                    "line starts with whitespace, but no attribute has been defined yet",
                )));
                continue;
            }

            if trimmed == EMPTY_LINE_MARK {
                current.values.push(String::new());
            } else {
                current.values.push(trimmed.to_string());
            }
            continue;
        }

        close(&mut current, &mut out);

        if trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() > 2 {
            let name = trimmed[1..trimmed.len() - 1].trim();
            out.push(Ok(Entry {
                line: linenum,
                key: "collection".to_string(),
                values: vec![name.to_string()],
            }));
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            out.push(Err(LibraryError::parse(
                source_name,
                linenum,
                "line invalid, skipped",
            )));
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            out.push(Err(LibraryError::parse(
                source_name,
                linenum,
                "line invalid, skipped",
            )));
            continue;
        }

        current.line = linenum;
        current.key = key.to_lowercase();
        let value = value.trim();
        if !value.is_empty() {
            current.values.push(value.to_string());
        }
    }

    close(&mut current, &mut out);
    out
}

/// Read a metadata file; only an unreadable file is an error
pub fn read_file(path: &Path) -> Result<Vec<Result<Entry, LibraryError>>, LibraryError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_str(&text, &path.to_string_lossy()))
}

/// Join continuation lines with spaces and paragraphs with blank lines
pub fn merge_lines(values: &[String]) -> String {
    let mut out = String::new();

    for value in values {
        if value.is_empty() {
            out.push_str("\n\n");
            continue;
        }
        if !out.ends_with('\n') {
            out.push(' ');
        }
        out.push_str(value);
    }

    out.trim().to_string()
}

/// Split comma-separated list values
pub fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
