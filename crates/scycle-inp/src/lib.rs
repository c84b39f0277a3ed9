//! Line-oriented `key = value` input-file parser.
//!
//! This is deliberately a thin, format-agnostic front end: it does not know
//! anything about which keys are recognized or what a value means. It just
//! turns lines of text into an ordered list of raw key/value pairs. Turning
//! those into a validated, typed configuration is `scycle_model::Params`'s
//! job.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use thiserror::Error;

/// One parsed `key = value` line, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: String,
    pub value: String,
    pub line: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// A parsed set of raw entries, in the order they appeared in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawInput {
    pub entries: Vec<RawEntry>,
}

impl RawInput {
    /// Parses a file using the default `" = "` delimiter.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| ParseError {
            line: 0,
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::parse_str(&raw, " = ")
    }

    /// Parses already-loaded text with the default `" = "` delimiter.
    pub fn parse_str(raw: &str, delimiter: &str) -> Result<Self, ParseError> {
        let mut entries = Vec::new();

        for (idx, raw_line) in raw.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw_line.trim();

            if trimmed.is_empty() || is_comment(trimmed) {
                continue;
            }

            let (key, value) = split_entry(trimmed, delimiter).ok_or_else(|| ParseError {
                line,
                message: format!("expected a `{delimiter}`-delimited key/value pair"),
            })?;

            if key.is_empty() {
                return Err(ParseError {
                    line,
                    message: "empty key".to_string(),
                });
            }

            entries.push(RawEntry {
                key: key.to_string(),
                value: value.to_string(),
                line,
            });
        }

        Ok(RawInput { entries })
    }

    /// Returns the last entry matching `key`, if any (later entries in the
    /// file shadow earlier ones, matching how the underlying text format
    /// lets a value be overridden by repeating the key).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#')
}

/// Splits a trimmed line on the first occurrence of `delimiter`, falling
/// back to a bare `=` if the configured delimiter (with its surrounding
/// spacing) is not found verbatim.
fn split_entry<'a>(line: &'a str, delimiter: &str) -> Option<(&'a str, &'a str)> {
    if let Some((k, v)) = line.split_once(delimiter) {
        return Some((k.trim(), v.trim()));
    }
    line.split_once('=').map(|(k, v)| (k.trim(), v.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_entries() {
        let src = "order = 4\nNy = 101\nNz = 101\n";
        let input = RawInput::parse_str(src, " = ").expect("parse should succeed");
        assert_eq!(input.entries.len(), 3);
        assert_eq!(input.get("order"), Some("4"));
        assert_eq!(input.get("Nz"), Some("101"));
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let src = "# a comment\n\norder = 2\n\n# trailing comment\n";
        let input = RawInput::parse_str(src, " = ").expect("parse should succeed");
        assert_eq!(input.entries.len(), 1);
        assert_eq!(input.get("order"), Some("2"));
    }

    #[test]
    fn later_entry_shadows_earlier_one() {
        let src = "deltaT = 1e-3\ndeltaT = 5e-3\n";
        let input = RawInput::parse_str(src, " = ").expect("parse should succeed");
        assert_eq!(input.get("deltaT"), Some("5e-3"));
    }

    #[test]
    fn rejects_line_without_delimiter() {
        let src = "this is not a key value pair\n";
        let err = RawInput::parse_str(src, " = ").expect_err("should fail");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn custom_delimiter() {
        let src = "order: 4\nNy: 101\n";
        let input = RawInput::parse_str(src, ": ").expect("parse should succeed");
        assert_eq!(input.get("order"), Some("4"));
    }
}
