//! Program assembly from an execution log.
//!
//! A notebook kernel holds state across cell executions, so the program
//! that "ran" to produce one cell's output is the concatenation of every
//! cell executed before it in the same session. [`ProgramBuilder`] keeps
//! the execution history and [`ProgramBuilder::build_to`] reconstructs
//! that program for any recorded execution, leaving out cells from prior
//! kernel sessions, cells that raised, and stale executions of re-run
//! cells.

use std::collections::HashMap;

use nbslice_core::{text, Cell};
use tracing::warn;

use crate::ast::{Module, Statement};
use crate::error::{AnalysisError, AnalysisResult};
use crate::parse::parse;

/// One successfully parsed cell execution.
#[derive(Debug, Clone)]
pub struct CellProgram {
    pub cell: Cell,
    pub module: Module,
}

/// A program stitched together from cell executions.
#[derive(Debug)]
pub struct Program {
    /// The concatenated source, one cell after another, newline-terminated.
    pub text: String,
    /// The parse of `text`. Statement ranges carry the event id of the
    /// cell they came from.
    pub module: Module,
    /// The contributing cells, in program order.
    pub cells: Vec<Cell>,
    /// Program line number to the cell occupying it.
    pub line_to_cell: HashMap<u32, Cell>,
    /// Execution event id to the program lines that cell occupies.
    pub cell_to_lines: HashMap<String, Vec<u32>>,
}

impl Program {
    pub fn statements(&self) -> &[Statement] {
        &self.module.code
    }
}

/// Accumulates executed cells and assembles programs from them.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    cell_programs: Vec<CellProgram>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        ProgramBuilder::default()
    }

    /// Records one executed cell. A cell that fails to parse is logged and
    /// dropped so it cannot poison later analysis.
    pub fn add(&mut self, cell: Cell) {
        match parse(&cell.text) {
            Ok(module) => self.cell_programs.push(CellProgram { cell, module }),
            Err(err) => {
                warn!(
                    execution_event_id = %cell.execution_event_id,
                    %err,
                    "dropping cell that failed to parse"
                );
            }
        }
    }

    pub fn add_all(&mut self, cells: impl IntoIterator<Item = Cell>) {
        for cell in cells {
            self.add(cell);
        }
    }

    /// The recorded parse for one cell execution.
    pub fn cell_program(&self, execution_event_id: &str) -> Option<&CellProgram> {
        self.cell_programs
            .iter()
            .rev()
            .find(|p| p.cell.execution_event_id == execution_event_id)
    }

    /// Every successfully parsed cell, in the order it was added.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cell_programs.iter().map(|p| &p.cell)
    }

    /// Reconstructs the program that produced the given execution: every
    /// cell run before it in the same kernel session, in order, ending
    /// with the target cell.
    ///
    /// Cells from earlier sessions are recognized by their execution
    /// counts: walking backward from the target, counts must strictly
    /// decrease, and a count that jumps back up marks a kernel restart.
    /// Cells that raised are left out (unless the target itself raised),
    /// and when a cell was re-executed, only its latest run contributes.
    pub fn build_to(&self, execution_event_id: &str) -> AnalysisResult<Program> {
        let target_index = self
            .cell_programs
            .iter()
            .rposition(|p| p.cell.execution_event_id == execution_event_id)
            .ok_or_else(|| AnalysisError::unknown_execution(execution_event_id))?;

        let target = &self.cell_programs[target_index].cell;
        let mut included = vec![target];
        let mut last_count = target.execution_count;
        for program in self.cell_programs[..target_index].iter().rev() {
            let cell = &program.cell;
            if let (Some(current), Some(last)) = (cell.execution_count, last_count) {
                if current >= last {
                    break;
                }
            }
            included.push(cell);
            last_count = cell.execution_count;
        }
        included.reverse();

        included.retain(|cell| {
            !cell.has_error || cell.execution_event_id == target.execution_event_id
        });

        let mut latest: HashMap<&str, usize> = HashMap::new();
        for (index, cell) in included.iter().enumerate() {
            latest.insert(cell.persistent_id.as_str(), index);
        }
        let arranged: Vec<&Cell> = included
            .iter()
            .enumerate()
            .filter(|(index, cell)| latest[cell.persistent_id.as_str()] == *index)
            .map(|(_, cell)| *cell)
            .collect();

        assemble(&arranged)
    }
}

/// Concatenates the arranged cells, parses the result, and tags every
/// statement with the cell it came from.
pub(crate) fn assemble(cells: &[&Cell]) -> AnalysisResult<Program> {
    let mut text = String::new();
    let mut line_to_cell = HashMap::new();
    let mut cell_to_lines: HashMap<String, Vec<u32>> = HashMap::new();
    let mut kept = Vec::new();
    let mut next_line: u32 = 1;

    for cell in cells {
        let line_count = text::line_count(&cell.text);
        if line_count == 0 {
            continue;
        }
        for offset in 0..line_count {
            line_to_cell.insert(next_line + offset, (*cell).clone());
            cell_to_lines
                .entry(cell.execution_event_id.clone())
                .or_default()
                .push(next_line + offset);
        }
        next_line += line_count;
        text.push_str(&cell.text);
        if !cell.text.ends_with('\n') {
            text.push('\n');
        }
        kept.push((*cell).clone());
    }

    let mut module = parse(&text)?;
    module.walk_mut(&mut |statement| {
        if let Some(cell) = line_to_cell.get(&statement.range.first_line) {
            statement.range.origin_id = Some(cell.execution_event_id.clone());
        }
    });

    Ok(Program {
        text,
        module,
        cells: kept,
        line_to_cell,
        cell_to_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(event_id: &str, text: &str) -> Cell {
        Cell::new(text, None, event_id, format!("{event_id}-{text}"))
    }

    fn counted(event_id: &str, text: &str, count: u32) -> Cell {
        Cell::new(text, Some(count), event_id, format!("{event_id}-{text}"))
    }

    #[test]
    fn appends_cell_contents_in_order() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "print(1)"));
        builder.add(cell("id2", "print(2)"));
        let program = builder.build_to("id2").unwrap();
        assert_eq!(program.text, "print(1)\nprint(2)\n");
    }

    #[test]
    fn maps_lines_to_cells() {
        let mut builder = ProgramBuilder::new();
        let cell1 = cell("id1", "print(1)");
        let cell2 = cell("id2", "print(2)");
        builder.add_all([cell1.clone(), cell2.clone()]);
        let program = builder.build_to("id2").unwrap();
        assert_eq!(program.line_to_cell[&1], cell1);
        assert_eq!(program.line_to_cell[&2], cell2);
    }

    #[test]
    fn maps_cells_to_lines() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "print(1)"));
        builder.add(cell("id2", "print(2)"));
        let program = builder.build_to("id2").unwrap();
        assert_eq!(program.cell_to_lines["id1"], vec![1]);
        assert_eq!(program.cell_to_lines["id2"], vec![2]);
    }

    #[test]
    fn stops_after_the_requested_cell() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "print(1)"));
        builder.add(cell("id2", "print(2)"));
        let program = builder.build_to("id1").unwrap();
        assert_eq!(program.text, "print(1)\n");
    }

    #[test]
    fn skips_cells_with_errors() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "print(1)"));
        builder.add(cell("idE", "print(2)").with_error(true));
        builder.add(cell("id3", "print(3)"));
        let program = builder.build_to("id3").unwrap();
        assert_eq!(program.text, "print(1)\nprint(3)\n");
    }

    #[test]
    fn keeps_the_target_cell_even_if_it_errored() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "print(1)"));
        builder.add(cell("id2", "print(2)"));
        builder.add(cell("idE", "print(bad_name)").with_error(true));
        let program = builder.build_to("idE").unwrap();
        assert_eq!(program.text, "print(1)\nprint(2)\nprint(bad_name)\n");
    }

    #[test]
    fn skips_cells_that_fail_to_parse() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "print(1)"));
        builder.add(cell("idE", "causes_syntax_error("));
        builder.add(cell("id3", "print(3)"));
        let program = builder.build_to("id3").unwrap();
        assert_eq!(program.text, "print(1)\nprint(3)\n");
    }

    #[test]
    fn keeps_the_parse_of_each_added_cell() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "x = 1\ny = 2"));
        builder.add(cell("idE", "causes_syntax_error("));
        let recorded = builder.cell_program("id1").unwrap();
        assert_eq!(recorded.module.code.len(), 2);
        assert!(builder.cell_program("idE").is_none());
    }

    #[test]
    fn subscript_slices_are_not_mistaken_for_errors() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "array[0:1]"));
        builder.add(cell("id2", "print(x)"));
        let program = builder.build_to("id2").unwrap();
        assert_eq!(program.text, "array[0:1]\nprint(x)\n");
    }

    #[test]
    fn skips_cells_executed_in_prior_kernel_sessions() {
        let mut builder = ProgramBuilder::new();
        builder.add(counted("id1", "print(1)", 1));
        builder.add(counted("id2", "print(2)", 1));
        builder.add(counted("id3", "print(3)", 2));
        builder.add(counted("id3", "print(4)", 1));
        let program = builder.build_to("id3").unwrap();
        assert_eq!(program.text, "print(4)\n");
    }

    #[test]
    fn reexecuted_cells_contribute_only_their_latest_run() {
        let mut builder = ProgramBuilder::new();
        builder.add(Cell::new("x = 1", Some(1), "e1", "cellA"));
        builder.add(Cell::new("y = x", Some(2), "e2", "cellB"));
        builder.add(Cell::new("x = 2", Some(3), "e3", "cellA"));
        let program = builder.build_to("e3").unwrap();
        assert_eq!(program.text, "y = x\nx = 2\n");
    }

    #[test]
    fn parses_the_combined_program() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "print(1)"));
        builder.add(cell("id2", "print(2)"));
        let program = builder.build_to("id2").unwrap();
        assert_eq!(program.module.code.len(), 2);
        assert_eq!(program.module.code[0].range.first_line, 1);
        assert_eq!(program.module.code[1].range.first_line, 2);
    }

    #[test]
    fn tags_statements_with_their_cell() {
        let mut builder = ProgramBuilder::new();
        builder.add(cell("id1", "print(1)"));
        let program = builder.build_to("id1").unwrap();
        assert_eq!(
            program.module.code[0].range.origin_id.as_deref(),
            Some("id1")
        );
    }

    #[test]
    fn unknown_executions_are_an_error() {
        let builder = ProgramBuilder::new();
        assert!(matches!(
            builder.build_to("nope"),
            Err(AnalysisError::UnknownExecution { .. })
        ));
    }
}
