//! Slicing over a log of cell executions.
//!
//! [`ExecutionLogSlicer`] records cells as a kernel runs them and answers
//! two questions about the log. A backward slice
//! ([`slice_latest_execution`]) finds the minimal code needed to reproduce
//! one cell's result: the program for that execution is rebuilt, analyzed
//! for dataflow and control dependencies, and walked backward from the
//! target cell's statements. A forward query ([`get_dependent_cells`])
//! finds the cells whose results are stale after an edit: the latest run
//! of every cell is arranged into one program and the dependency graph is
//! followed downstream from the target.
//!
//! [`slice_latest_execution`]: ExecutionLogSlicer::slice_latest_execution
//! [`get_dependent_cells`]: ExecutionLogSlicer::get_dependent_cells

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use nbslice_core::{
    Cell, CellExecution, CellSlice, DiGraph, RangeSet, SlicedExecution, SourceRange,
};

use crate::cfg::{visit_control_dependencies, ControlFlowGraph};
use crate::dataflow::DataflowAnalyzer;
use crate::error::{AnalysisError, AnalysisResult};
use crate::program::{assemble, Program, ProgramBuilder};

/// Records an execution log and slices programs out of it.
#[derive(Debug, Default)]
pub struct ExecutionLogSlicer {
    analyzer: DataflowAnalyzer,
    program_builder: ProgramBuilder,
    cell_executions: Vec<CellExecution>,
}

impl ExecutionLogSlicer {
    pub fn new(analyzer: DataflowAnalyzer) -> Self {
        ExecutionLogSlicer {
            analyzer,
            program_builder: ProgramBuilder::new(),
            cell_executions: Vec::new(),
        }
    }

    /// Records one cell execution, stamped with the current time.
    pub fn log_execution(&mut self, cell: Cell) {
        self.cell_executions
            .push(CellExecution::new(cell.clone(), Utc::now()));
        self.program_builder.add(cell);
    }

    /// The log so far, oldest first.
    pub fn cell_executions(&self) -> &[CellExecution] {
        &self.cell_executions
    }

    /// The backward slice for the most recent run of a cell.
    pub fn slice_latest_execution(
        &self,
        persistent_id: &str,
    ) -> AnalysisResult<SlicedExecution> {
        self.slice_latest_execution_seeded(persistent_id, None)
    }

    /// Like [`slice_latest_execution`], but slices backward only from the
    /// target cell's statements that intersect `seed` (cell-local
    /// coordinates). `None` seeds from the whole cell.
    ///
    /// [`slice_latest_execution`]: ExecutionLogSlicer::slice_latest_execution
    pub fn slice_latest_execution_seeded(
        &self,
        persistent_id: &str,
        seed: Option<&RangeSet>,
    ) -> AnalysisResult<SlicedExecution> {
        let execution = self
            .cell_executions
            .iter()
            .rev()
            .find(|e| e.cell.persistent_id == persistent_id)
            .ok_or_else(|| AnalysisError::unknown_cell(persistent_id))?;
        self.slice_execution(execution, seed)
    }

    /// Backward slices for every recorded run of a cell, oldest first.
    pub fn slice_all_executions(
        &self,
        persistent_id: &str,
    ) -> AnalysisResult<Vec<SlicedExecution>> {
        self.slice_all_executions_seeded(persistent_id, None)
    }

    /// Like [`slice_all_executions`], restricted to statements
    /// intersecting `seed` in each run.
    ///
    /// [`slice_all_executions`]: ExecutionLogSlicer::slice_all_executions
    pub fn slice_all_executions_seeded(
        &self,
        persistent_id: &str,
        seed: Option<&RangeSet>,
    ) -> AnalysisResult<Vec<SlicedExecution>> {
        self.cell_executions
            .iter()
            .filter(|e| e.cell.persistent_id == persistent_id)
            .map(|e| self.slice_execution(e, seed))
            .collect()
    }

    fn slice_execution(
        &self,
        execution: &CellExecution,
        seed: Option<&RangeSet>,
    ) -> AnalysisResult<SlicedExecution> {
        let cell = &execution.cell;
        let program = self.program_builder.build_to(&cell.execution_event_id)?;
        let ranges = self.backward_slice(&program, &cell.execution_event_id, seed);

        // Group the program-level ranges by owning cell, in cell-local
        // coordinates.
        let mut by_cell: HashMap<String, RangeSet> = HashMap::new();
        for range in ranges {
            let Some(owner) = program.line_to_cell.get(&range.first_line) else {
                continue;
            };
            let Some(lines) = program.cell_to_lines.get(&owner.execution_event_id) else {
                continue;
            };
            let local = range
                .shift_lines(1 - i64::from(lines[0]))
                .with_origin(owner.execution_event_id.clone());
            by_cell
                .entry(owner.execution_event_id.clone())
                .or_default()
                .add(local);
        }

        let mut cell_slices = Vec::new();
        for cell in &program.cells {
            if let Some(slice) = by_cell.remove(&cell.execution_event_id) {
                cell_slices.push(CellSlice::new(cell.clone(), slice));
            }
        }
        Ok(SlicedExecution::new(execution.executed_at, cell_slices))
    }

    /// Statement ranges reachable backward from the target cell's
    /// statements, through dataflow edges and control dependencies.
    fn backward_slice(
        &self,
        program: &Program,
        target_event: &str,
        seed: Option<&RangeSet>,
    ) -> Vec<SourceRange> {
        let cfg = ControlFlowGraph::from_module(&program.module);
        let edges = self.analyzer.analyze(&cfg);

        let mut depends_on: HashMap<SourceRange, Vec<SourceRange>> = HashMap::new();
        for edge in &edges {
            depends_on
                .entry(edge.to.clone())
                .or_default()
                .push(edge.from.clone());
        }
        visit_control_dependencies(&program.module.code, &mut |dependent, header| {
            depends_on
                .entry(dependent.range.clone())
                .or_default()
                .push(header.range.clone());
        });

        let Some(lines) = program.cell_to_lines.get(target_event) else {
            return Vec::new();
        };
        let target_lines: HashSet<u32> = lines.iter().copied().collect();
        let local_shift = 1 - i64::from(lines[0]);

        // Seed from the CFG's statements, the same universe the edges are
        // expressed in. Function and class bodies are atomic there.
        let mut work: Vec<SourceRange> = Vec::new();
        for block in cfg.blocks() {
            for statement in block.statements() {
                if !target_lines.contains(&statement.range.first_line) {
                    continue;
                }
                if let Some(seed) = seed {
                    if !seed.intersects(&statement.range.shift_lines(local_shift)) {
                        continue;
                    }
                }
                work.push(statement.range.clone());
            }
        }

        let mut seen: HashSet<SourceRange> = HashSet::new();
        let mut slice = Vec::new();
        while let Some(range) = work.pop() {
            if !seen.insert(range.clone()) {
                continue;
            }
            slice.push(range.clone());
            if let Some(sources) = depends_on.get(&range) {
                work.extend(sources.iter().cloned());
            }
        }
        slice
    }

    /// The cells whose results depend, directly or transitively, on the
    /// given execution, in an order they could be re-run in.
    ///
    /// The question only makes sense against the current state of the
    /// notebook, so the analysis arranges the latest run of every cell (in
    /// first-run order) rather than replaying the whole log. The target
    /// itself is not included in the result.
    pub fn get_dependent_cells(&self, execution_event_id: &str) -> AnalysisResult<Vec<Cell>> {
        let mut order: Vec<&str> = Vec::new();
        let mut latest: HashMap<&str, &Cell> = HashMap::new();
        for cell in self.program_builder.cells() {
            if !latest.contains_key(cell.persistent_id.as_str()) {
                order.push(cell.persistent_id.as_str());
            }
            latest.insert(cell.persistent_id.as_str(), cell);
        }

        if !latest
            .values()
            .any(|c| c.execution_event_id == execution_event_id)
        {
            let known = self
                .cell_executions
                .iter()
                .any(|e| e.cell.execution_event_id == execution_event_id);
            if !known {
                return Err(AnalysisError::unknown_execution(execution_event_id));
            }
            // A stale run: its cell has been re-executed since, so nothing
            // current depends on it.
            return Ok(Vec::new());
        }

        let arranged: Vec<&Cell> = order.iter().map(|pid| latest[pid]).collect();
        let program = assemble(&arranged)?;

        let cfg = ControlFlowGraph::from_module(&program.module);
        let edges = self.analyzer.analyze(&cfg);

        let mut graph = DiGraph::new(|cell: &Cell| cell.execution_event_id.clone());
        for cell in &program.cells {
            graph.add_node(cell.clone());
        }
        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        for edge in &edges {
            let Some(from_cell) = program.line_to_cell.get(&edge.from.first_line) else {
                continue;
            };
            let Some(to_cell) = program.line_to_cell.get(&edge.to.first_line) else {
                continue;
            };
            if from_cell.execution_event_id == to_cell.execution_event_id {
                continue;
            }
            successors
                .entry(from_cell.execution_event_id.clone())
                .or_default()
                .push(to_cell.execution_event_id.clone());
            graph.add_edge(from_cell.clone(), to_cell.clone());
        }

        let mut reachable: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::from([execution_event_id.to_string()]);
        while let Some(event) = queue.pop_front() {
            if let Some(next) = successors.get(&event) {
                for downstream in next {
                    if reachable.insert(downstream.clone()) {
                        queue.push_back(downstream.clone());
                    }
                }
            }
        }
        reachable.remove(execution_event_id);

        Ok(graph
            .topo_sort()
            .into_iter()
            .filter(|cell| reachable.contains(&cell.execution_event_id))
            .collect())
    }
}
