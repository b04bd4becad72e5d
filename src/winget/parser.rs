//! Parsing of the package manager's fixed-width search table.
//!
//! The table looks like:
//!
//! ```text
//! Name            Id                Version   Source
//! ---------------------------------------------------
//! Google Chrome   Google.Chrome     127.0.1   winget
//! ```
//!
//! Columns are sliced at the character offsets of the header labels. Names
//! may contain spaces, so splitting on whitespace is not an option.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    pub name: String,
    pub id: String,
    pub version: String,
    pub source: String,
}

/// Column start offsets in characters.
#[derive(Debug, Clone, Copy)]
struct Columns {
    id: usize,
    version: usize,
    source: usize,
}

impl Columns {
    fn from_header(header: &str) -> Option<Self> {
        let id = char_find(header, "Id", 0)?;
        let width = header.chars().count();
        let version = char_find(header, "Version", id).unwrap_or(width);
        let source = char_find(header, "Source", version).unwrap_or(width);
        Some(Columns {
            id,
            version,
            source,
        })
    }

    fn parse_row(&self, line: &str) -> Option<PackageRecord> {
        let name = char_slice(line, 0, Some(self.id)).trim().to_string();
        let id = char_slice(line, self.id, Some(self.version))
            .trim()
            .to_string();
        let version = if self.source > self.version {
            char_slice(line, self.version, Some(self.source))
        } else {
            char_slice(line, self.version, None)
        }
        .trim()
        .to_string();
        let source = char_slice(line, self.source, None).trim().to_string();

        if name.is_empty() || id.is_empty() {
            return None;
        }
        Some(PackageRecord {
            name,
            id,
            version,
            source,
        })
    }
}

pub fn parse_search_output(output: &str) -> Vec<PackageRecord> {
    let lines = split_lines(output);
    let Some(header_index) = lines
        .iter()
        .position(|line| line.contains("Name") && line.contains("Id"))
    else {
        return Vec::new();
    };
    let Some(columns) = Columns::from_header(lines[header_index]) else {
        return Vec::new();
    };

    lines
        .iter()
        .skip(header_index + 2)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| columns.parse_row(line))
        .collect()
}

/// Split on every line boundary the tool may emit, including the bare `\r`
/// it uses to redraw its progress spinner.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !is_line_break(c) {
            continue;
        }
        lines.push(&text[start..i]);
        start = i + c.len_utf8();
        if c == '\r' {
            if let Some(&(j, '\n')) = chars.peek() {
                chars.next();
                start = j + 1;
            }
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\u{0b}'
            | '\u{0c}'
            | '\u{1c}'
            | '\u{1d}'
            | '\u{1e}'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

/// Character offset of `needle` in `haystack`, searching from character `from`.
fn char_find(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let byte_from = haystack
        .char_indices()
        .nth(from)
        .map(|(i, _)| i)
        .unwrap_or(haystack.len());
    let byte_pos = haystack[byte_from..].find(needle)? + byte_from;
    Some(haystack[..byte_pos].chars().count())
}

/// Characters `start..end` of `line`, clamped to its length.
fn char_slice(line: &str, start: usize, end: Option<usize>) -> &str {
    let byte_at = |n: usize| {
        line.char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(line.len())
    };
    let from = byte_at(start);
    let to = end.map(byte_at).unwrap_or(line.len());
    if from >= to { "" } else { &line[from..to] }
}
