//! Quote-aware CSV tokenizer
//!
//! Intentionally small: rows arrive one per line (no embedded newlines),
//! and a broken line must still yield whatever fields were assembled.

/// Split one CSV line into fields.
///
/// A double quote toggles quoted mode, a doubled quote inside quotes is a
/// literal quote, and commas inside quotes are not separators. Never fails.
pub fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    fields.push(current);
    fields
}

/// Data lines of a CSV payload after normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvPayload<'a> {
    pub rows: Vec<&'a str>,
    pub has_header: bool,
}

impl<'a> CsvPayload<'a> {
    /// Normalize line endings, drop blank lines, trim, and strip a leading
    /// header line that starts with `header_token` (case-insensitive).
    pub fn parse(content: &'a str, header_token: &str) -> Self {
        let mut rows: Vec<&'a str> = content
            .split(|c: char| c == '\n' || c == '\r')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let has_header = rows
            .first()
            .map(|first| starts_with_ignore_case(first, header_token))
            .unwrap_or(false);

        if has_header {
            rows.remove(0);
        }

        Self { rows, has_header }
    }

    /// Number of data rows, header excluded
    pub fn total_items(&self) -> u64 {
        self.rows.len() as u64
    }
}

fn starts_with_ignore_case(line: &str, token: &str) -> bool {
    line.len() >= token.len()
        && line.is_char_boundary(token.len())
        && line[..token.len()].eq_ignore_ascii_case(token)
}
