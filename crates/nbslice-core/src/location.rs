//! Source ranges and range sets.
//!
//! A `SourceRange` names a span of source text by line/column coordinates:
//! lines are 1-indexed and inclusive, columns are 0-indexed character offsets
//! and half-open (`last_column` is one past the covered text). After cells are
//! concatenated into a virtual program, a range may carry the `origin_id` of
//! the cell it came from; origin never participates in equality, hashing, or
//! ordering, so two ranges are the same range exactly when all four
//! coordinates match.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// SourceRange
// ============================================================================

/// A line/column span over one source fragment or a concatenated program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRange {
    /// First line of the span, 1-indexed.
    pub first_line: u32,
    /// Character column where the span starts on `first_line`, 0-indexed.
    pub first_column: u32,
    /// Last line of the span, 1-indexed, inclusive.
    pub last_line: u32,
    /// Character column one past the span's end on `last_line`.
    pub last_column: u32,
    /// Execution event id of the originating cell, once concatenated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
}

impl SourceRange {
    pub fn new(first_line: u32, first_column: u32, last_line: u32, last_column: u32) -> Self {
        SourceRange {
            first_line,
            first_column,
            last_line,
            last_column,
            origin_id: None,
        }
    }

    pub fn with_origin(mut self, origin_id: impl Into<String>) -> Self {
        self.origin_id = Some(origin_id.into());
        self
    }

    /// Start position as a `(line, column)` pair.
    pub fn start(&self) -> (u32, u32) {
        (self.first_line, self.first_column)
    }

    /// End position as a `(line, column)` pair (exclusive column).
    pub fn end(&self) -> (u32, u32) {
        (self.last_line, self.last_column)
    }

    /// True when the two spans share at least one position.
    pub fn intersects(&self, other: &SourceRange) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }

    /// True when `other` lies entirely within this span.
    pub fn encloses(&self, other: &SourceRange) -> bool {
        self.start() <= other.start() && other.end() <= self.end()
    }

    /// The same span moved down (or up, for negative `delta`) by whole lines.
    /// Used when converting between cell-local and program coordinates.
    pub fn shift_lines(&self, delta: i64) -> SourceRange {
        SourceRange {
            first_line: (i64::from(self.first_line) + delta) as u32,
            first_column: self.first_column,
            last_line: (i64::from(self.last_line) + delta) as u32,
            last_column: self.last_column,
            origin_id: self.origin_id.clone(),
        }
    }

    fn coords(&self) -> (u32, u32, u32, u32) {
        (
            self.first_line,
            self.first_column,
            self.last_line,
            self.last_column,
        )
    }
}

impl PartialEq for SourceRange {
    fn eq(&self, other: &Self) -> bool {
        self.coords() == other.coords()
    }
}

impl Eq for SourceRange {}

impl Hash for SourceRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coords().hash(state);
    }
}

impl PartialOrd for SourceRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SourceRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.coords().cmp(&other.coords())
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.first_line, self.first_column, self.last_line, self.last_column
        )
    }
}

// ============================================================================
// RangeSet
// ============================================================================

/// An insertion-ordered set of ranges, deduplicated by exact coordinate
/// equality. Overlapping but unequal ranges are kept as distinct entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeSet {
    items: Vec<SourceRange>,
}

impl RangeSet {
    pub fn new() -> Self {
        RangeSet { items: Vec::new() }
    }

    /// Inserts a range unless an equal one is already present.
    /// Returns true when the set grew.
    pub fn add(&mut self, range: SourceRange) -> bool {
        if self.items.contains(&range) {
            return false;
        }
        self.items.push(range);
        true
    }

    pub fn contains(&self, range: &SourceRange) -> bool {
        self.items.contains(range)
    }

    /// True when any member intersects `range`.
    pub fn intersects(&self, range: &SourceRange) -> bool {
        self.items.iter().any(|r| r.intersects(range))
    }

    pub fn union(&self, other: &RangeSet) -> RangeSet {
        let mut out = self.clone();
        for r in &other.items {
            out.add(r.clone());
        }
        out
    }

    pub fn items(&self) -> &[SourceRange] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceRange> {
        self.items.iter()
    }

    /// Members sorted by start position, for rendering walks.
    pub fn sorted_by_position(&self) -> Vec<&SourceRange> {
        let mut sorted: Vec<&SourceRange> = self.items.iter().collect();
        sorted.sort_by_key(|r| (r.first_line, r.first_column));
        sorted
    }
}

impl FromIterator<SourceRange> for RangeSet {
    fn from_iter<I: IntoIterator<Item = SourceRange>>(iter: I) -> Self {
        let mut set = RangeSet::new();
        for r in iter {
            set.add(r);
        }
        set
    }
}

impl Extend<SourceRange> for RangeSet {
    fn extend<I: IntoIterator<Item = SourceRange>>(&mut self, iter: I) {
        for r in iter {
            self.add(r);
        }
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a SourceRange;
    type IntoIter = std::slice::Iter<'a, SourceRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod range_tests {
    use super::*;

    #[test]
    fn equality_ignores_origin() {
        let plain = SourceRange::new(1, 0, 1, 5);
        let tagged = SourceRange::new(1, 0, 1, 5).with_origin("cell-1");
        assert_eq!(plain, tagged);
    }

    #[test]
    fn intersection_is_half_open_on_columns() {
        let a = SourceRange::new(1, 0, 1, 5);
        let b = SourceRange::new(1, 5, 1, 9);
        let c = SourceRange::new(1, 4, 1, 6);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(c.intersects(&b));
    }

    #[test]
    fn multiline_spans_intersect_by_position() {
        let header = SourceRange::new(1, 0, 1, 21);
        let body = SourceRange::new(2, 4, 3, 4);
        assert!(!header.intersects(&body));
        let wide = SourceRange::new(1, 10, 2, 0);
        assert!(wide.intersects(&header));
    }

    #[test]
    fn shift_lines_moves_both_endpoints() {
        let r = SourceRange::new(3, 2, 4, 7).shift_lines(-2);
        assert_eq!(r, SourceRange::new(1, 2, 2, 7));
    }
}

#[cfg(test)]
mod set_tests {
    use super::*;

    #[test]
    fn dedups_exact_ranges_only() {
        let mut set = RangeSet::new();
        assert!(set.add(SourceRange::new(1, 0, 1, 5)));
        assert!(!set.add(SourceRange::new(1, 0, 1, 5)));
        assert!(set.add(SourceRange::new(1, 0, 1, 4)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn union_is_idempotent() {
        let set: RangeSet = [SourceRange::new(1, 0, 1, 5), SourceRange::new(2, 0, 2, 3)]
            .into_iter()
            .collect();
        let same = set.union(&set);
        assert_eq!(same.len(), set.len());
    }

    #[test]
    fn union_keeps_overlapping_ranges_distinct() {
        let a: RangeSet = [SourceRange::new(1, 0, 1, 5)].into_iter().collect();
        let b: RangeSet = [SourceRange::new(1, 0, 1, 4)].into_iter().collect();
        let merged = a.union(&b);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&SourceRange::new(1, 0, 1, 5)));
        assert!(merged.contains(&SourceRange::new(1, 0, 1, 4)));
    }

    #[test]
    fn sorted_by_position_orders_for_rendering() {
        let set: RangeSet = [SourceRange::new(2, 4, 3, 4), SourceRange::new(1, 0, 1, 5)]
            .into_iter()
            .collect();
        let sorted = set.sorted_by_position();
        assert_eq!(sorted[0].first_line, 1);
        assert_eq!(sorted[1].first_line, 2);
    }
}
