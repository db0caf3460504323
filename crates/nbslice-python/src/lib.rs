//! Python dataflow analysis and program slicing for nbslice.
//!
//! The pipeline runs bottom-up:
//! - [`parse`](parse::parse) turns cell source into a statement tree with
//!   line/character ranges
//! - [`cfg`] builds a control-flow graph over the statements
//! - [`dataflow`] resolves definitions and uses across the graph, consulting
//!   a [`specs`] table for the side effects of library calls
//! - [`program`] reassembles the program a kernel ran from logged cells
//! - [`slicer`] ties it together, answering backward ("what produced this
//!   result") and forward ("what does this invalidate") queries over an
//!   execution log

pub mod ast;
pub mod cfg;
pub mod dataflow;
pub mod error;
pub mod parse;
pub mod program;
pub mod slicer;
pub mod specs;

pub use ast::{Module, Statement};
pub use cfg::ControlFlowGraph;
pub use dataflow::{DataflowAnalyzer, DataflowEdge, RefLevel, Reference, ReferenceSet, SymbolKind};
pub use error::{AnalysisError, AnalysisResult};
pub use program::{Program, ProgramBuilder};
pub use slicer::ExecutionLogSlicer;
pub use specs::SpecTable;
