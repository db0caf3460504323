//! Executed-cell records.
//!
//! A `Cell` is the host environment's read-only record of one executed code
//! fragment. Two identities matter and must not be conflated: the execution
//! event id names one run, while the persistent id names "the same" notebook
//! cell across edits and re-runs. `execution_count` is the kernel's counter
//! for the run; a cell that has not executed carries none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Cell
// ============================================================================

/// One executed code fragment, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// The fragment's source text.
    pub text: String,
    /// Kernel execution counter for this run, if the cell has run.
    pub execution_count: Option<u32>,
    /// Unique identity of this particular run.
    pub execution_event_id: String,
    /// Stable identity of the cell across edits and re-runs.
    pub persistent_id: String,
    /// True when the run raised.
    pub has_error: bool,
}

impl Cell {
    pub fn new(
        text: impl Into<String>,
        execution_count: Option<u32>,
        execution_event_id: impl Into<String>,
        persistent_id: impl Into<String>,
    ) -> Self {
        Cell {
            text: text.into(),
            execution_count,
            execution_event_id: execution_event_id.into(),
            persistent_id: persistent_id.into(),
            has_error: false,
        }
    }

    pub fn with_error(mut self, has_error: bool) -> Self {
        self.has_error = has_error;
        self
    }
}

// ============================================================================
// CellExecution
// ============================================================================

/// A log entry: one cell run, stamped when it was appended to the log.
#[derive(Debug, Clone)]
pub struct CellExecution {
    pub cell: Cell,
    pub executed_at: DateTime<Utc>,
}

impl CellExecution {
    pub fn new(cell: Cell, executed_at: DateTime<Utc>) -> Self {
        CellExecution { cell, executed_at }
    }
}

// ============================================================================
// Tests
// ============================================================================
