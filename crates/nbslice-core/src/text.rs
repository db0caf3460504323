//! Text utilities for line access and column unit conversion.
//!
//! Source positions flow through the system in two units. The grammar layer
//! reports byte columns; ranges and rendering work in character columns so a
//! range's width matches what a reader sees. These helpers convert between
//! the two and slice single lines by character position.
//!
//! Lines are split on `\n` only; a trailing newline yields a final empty
//! line, matching how fragment texts are concatenated into programs.

// ============================================================================
// Line access
// ============================================================================

/// Splits `text` into lines without dropping a trailing empty line.
pub fn lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Number of lines in `text` under the same split rule.
pub fn line_count(text: &str) -> u32 {
    text.split('\n').count() as u32
}

/// The 1-indexed line `line_no`, if present.
pub fn line_at(text: &str, line_no: u32) -> Option<&str> {
    if line_no == 0 {
        return None;
    }
    text.split('\n').nth(line_no as usize - 1)
}

// ============================================================================
// Column conversion and slicing
// ============================================================================

/// Converts a byte offset within `line` to a character column.
///
/// Offsets past the end of the line, or inside a multi-byte character, clamp
/// to the nearest character boundary at or before them.
pub fn char_column(line: &str, byte_offset: usize) -> u32 {
    line.char_indices()
        .take_while(|(i, _)| *i < byte_offset)
        .count() as u32
}

/// The substring of `line` from character `start` (inclusive) to character
/// `end` (exclusive). Both bounds clamp to the line's length.
pub fn slice_line_chars(line: &str, start: u32, end: u32) -> &str {
    if end <= start {
        return "";
    }
    let mut indices = line.char_indices().map(|(i, _)| i);
    let start_byte = indices.nth(start as usize).unwrap_or(line.len());
    let end_byte = byte_of_char(line, end);
    &line[start_byte..end_byte.max(start_byte)]
}

fn byte_of_char(line: &str, char_pos: u32) -> usize {
    line.char_indices()
        .map(|(i, _)| i)
        .nth(char_pos as usize)
        .unwrap_or(line.len())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod line_tests {
    use super::*;

    #[test]
    fn trailing_newline_yields_empty_final_line() {
        assert_eq!(lines("a\nb\n"), vec!["a", "b", ""]);
        assert_eq!(line_count("a\nb\n"), 3);
        assert_eq!(line_count("a\nb"), 2);
    }

    #[test]
    fn line_at_is_one_indexed() {
        let text = "first\nsecond\nthird";
        assert_eq!(line_at(text, 1), Some("first"));
        assert_eq!(line_at(text, 3), Some("third"));
        assert_eq!(line_at(text, 0), None);
        assert_eq!(line_at(text, 4), None);
    }
}
