//! Rendering one cell's text against a range set.
//!
//! A `CellSlice` pairs a cell with the ranges of it that survived slicing,
//! in cell-local coordinates. Two renderings are exposed: `text_slice`
//! extracts exactly the covered text, while `text_slice_lines` widens every
//! touched line to its full text. Ranges are walked in ascending position
//! order, so output line order matches source order regardless of how the
//! set was accumulated.

use crate::cell::Cell;
use crate::location::{RangeSet, SourceRange};
use crate::text;
use tracing::debug;

// ============================================================================
// CellSlice
// ============================================================================

/// One cell restricted to the ranges a slice kept.
#[derive(Debug, Clone)]
pub struct CellSlice {
    pub cell: Cell,
    pub slice: RangeSet,
}

impl CellSlice {
    pub fn new(cell: Cell, slice: RangeSet) -> Self {
        CellSlice { cell, slice }
    }

    /// The covered text only: partial lines are cut at the range's columns.
    pub fn text_slice(&self) -> String {
        self.render(false)
    }

    /// Every line touched by a range, rendered whole.
    pub fn text_slice_lines(&self) -> String {
        self.render(true)
    }

    fn render(&self, full_lines: bool) -> String {
        self.slice
            .sorted_by_position()
            .iter()
            .map(|range| self.render_range(range, full_lines))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_range(&self, range: &SourceRange, full_lines: bool) -> String {
        let mut pieces = Vec::new();
        for line_no in range.first_line..=range.last_line {
            let Some(line) = text::line_at(&self.cell.text, line_no) else {
                debug!(line = line_no, cell = %self.cell.execution_event_id,
                    "range extends past cell text; line skipped");
                continue;
            };
            if full_lines {
                pieces.push(line.to_string());
                continue;
            }
            let start = if line_no == range.first_line {
                range.first_column
            } else {
                0
            };
            let end = if line_no == range.last_line {
                range.last_column
            } else {
                line.chars().count() as u32
            };
            pieces.push(text::slice_line_chars(line, start, end).to_string());
        }
        pieces.join("\n")
    }
}

// ============================================================================
// Tests
// ============================================================================
