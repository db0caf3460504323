//! Core primitives for nbslice.
//!
//! This crate provides the language-agnostic infrastructure the slicing
//! engine is built on:
//! - Source ranges and range sets over line/column coordinates
//! - Text utilities for byte/char column conversion and line slicing
//! - The executed-cell record and timestamped execution entries
//! - Cell slice rendering (covered-text and full-line modes)
//! - Sliced-execution merging
//! - A generic directed graph with deterministic topological sort

pub mod cell;
pub mod cellslice;
pub mod graph;
pub mod location;
pub mod slice;
pub mod text;

pub use cell::{Cell, CellExecution};
pub use cellslice::CellSlice;
pub use graph::DiGraph;
pub use location::{RangeSet, SourceRange};
pub use slice::SlicedExecution;
