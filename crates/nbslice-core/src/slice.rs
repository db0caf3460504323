//! Sliced executions and slice merging.
//!
//! A `SlicedExecution` is the result of slicing one target run: an ordered
//! collection of cell slices, one per contributing cell. Merging combines
//! slices of different targets into a single view. The merge unit is
//! execution identity: two slices of the same run union their ranges, while
//! two runs of the same persistent cell stay distinct entries. The merged
//! result is always reordered by ascending execution count so it reads in
//! chronological order no matter how arguments were passed.

use crate::cellslice::CellSlice;
use chrono::{DateTime, Utc};

// ============================================================================
// SlicedExecution
// ============================================================================

/// The slice of the program needed to reproduce one execution.
#[derive(Debug, Clone)]
pub struct SlicedExecution {
    pub executed_at: DateTime<Utc>,
    pub cell_slices: Vec<CellSlice>,
}

impl SlicedExecution {
    pub fn new(executed_at: DateTime<Utc>, cell_slices: Vec<CellSlice>) -> Self {
        SlicedExecution {
            executed_at,
            cell_slices,
        }
    }

    /// N-way union with `others`, keyed by execution event identity.
    ///
    /// Matching units union their range sets under exact-range dedup;
    /// non-matching units are kept as-is. Commutative and associative up to
    /// the final ordering, which is always ascending execution count.
    pub fn merge<'a, I>(&self, others: I) -> SlicedExecution
    where
        I: IntoIterator<Item = &'a SlicedExecution>,
    {
        let mut merged: Vec<CellSlice> = Vec::new();
        let mut absorb = |slice: &CellSlice| {
            let key = &slice.cell.execution_event_id;
            match merged
                .iter_mut()
                .find(|m| &m.cell.execution_event_id == key)
            {
                Some(existing) => existing.slice = existing.slice.union(&slice.slice),
                None => merged.push(slice.clone()),
            }
        };
        for slice in &self.cell_slices {
            absorb(slice);
        }
        for other in others {
            for slice in &other.cell_slices {
                absorb(slice);
            }
        }
        merged.sort_by_key(|s| s.cell.execution_count.unwrap_or(0));
        SlicedExecution::new(self.executed_at, merged)
    }
}

// ============================================================================
// Tests
// ============================================================================
