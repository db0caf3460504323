//! Control-flow graph construction.
//!
//! The graph decomposes compound statements: a basic block holds simple
//! statements plus the headers of the compound statements that branch out
//! of it, and branch bodies become their own blocks wired back to a join
//! block. Function and class definitions are atomic here since their
//! bodies only run when called; the dataflow layer analyzes those bodies
//! with lexical scoping instead.
//!
//! [`visit_control_dependencies`] is the companion walk for slicing: it
//! reports which header statement each nested statement's execution hinges
//! on, so a slice that keeps a body line also keeps the `if`/`for`/`try`
//! lines above it.

use crate::ast::{Module, Statement, StatementKind};

/// A basic block: a maximal run of statements with no internal branching.
#[derive(Debug)]
pub struct Block<'a> {
    id: usize,
    label: &'static str,
    statements: Vec<&'a Statement>,
}

impl<'a> Block<'a> {
    pub fn id(&self) -> usize {
        self.id
    }

    /// A short description of the block's role, for debugging.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn statements(&self) -> &[&'a Statement] {
        &self.statements
    }
}

/// A control-flow graph over one statement list.
#[derive(Debug)]
pub struct ControlFlowGraph<'a> {
    blocks: Vec<Block<'a>>,
    edges: Vec<(usize, usize)>,
}

impl<'a> ControlFlowGraph<'a> {
    pub fn new(statements: &'a [Statement]) -> Self {
        let mut builder = Builder {
            blocks: Vec::new(),
            edges: Vec::new(),
            loops: Vec::new(),
        };
        let entry = builder.make_block("entry");
        builder.build_body(statements, entry);
        ControlFlowGraph {
            blocks: builder.blocks,
            edges: builder.edges,
        }
    }

    pub fn from_module(module: &'a Module) -> Self {
        ControlFlowGraph::new(&module.code)
    }

    pub fn blocks(&self) -> &[Block<'a>] {
        &self.blocks
    }

    pub fn successor_ids(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |(from, _)| *from == id)
            .map(|(_, to)| *to)
    }

    pub fn predecessor_ids(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |(_, to)| *to == id)
            .map(|(from, _)| *from)
    }

    /// The block holding a given statement, if any.
    pub fn block_of(&self, statement: &Statement) -> Option<&Block<'a>> {
        self.blocks
            .iter()
            .find(|block| block.statements.iter().any(|s| s.range == statement.range))
    }
}

struct LoopFrame {
    header: usize,
    after: usize,
}

struct Builder<'a> {
    blocks: Vec<Block<'a>>,
    edges: Vec<(usize, usize)>,
    loops: Vec<LoopFrame>,
}

impl<'a> Builder<'a> {
    fn make_block(&mut self, label: &'static str) -> usize {
        let id = self.blocks.len();
        self.blocks.push(Block {
            id,
            label,
            statements: Vec::new(),
        });
        id
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
    }

    fn append(&mut self, block: usize, statement: &'a Statement) {
        self.blocks[block].statements.push(statement);
    }

    /// Builds blocks for a statement list starting in `current` and returns
    /// the block control falls out of.
    fn build_body(&mut self, statements: &'a [Statement], mut current: usize) -> usize {
        for statement in statements {
            match &statement.kind {
                StatementKind::If { test, body, orelse } => {
                    self.append(current, statement);
                    let join = self.make_block("join");

                    let body_block = self.make_block("if body");
                    self.add_edge(current, body_block);
                    let body_exit = self.build_body(body, body_block);
                    self.add_edge(body_exit, join);

                    match orelse {
                        Some(chained) => {
                            let else_block = self.make_block("else body");
                            self.add_edge(current, else_block);
                            let else_exit =
                                self.build_body(std::slice::from_ref(chained), else_block);
                            self.add_edge(else_exit, join);
                        }
                        None => {
                            // A bare else always runs its body; anything
                            // with a condition may be skipped.
                            if test.is_some() {
                                self.add_edge(current, join);
                            }
                        }
                    }
                    current = join;
                }
                StatementKind::While { body, orelse, .. } => {
                    current = self.build_loop(statement, body, orelse, current, "while body");
                }
                StatementKind::For { body, orelse, .. } => {
                    current = self.build_loop(statement, body, orelse, current, "for body");
                }
                StatementKind::Try {
                    body,
                    handlers,
                    orelse,
                    finalbody,
                } => {
                    self.append(current, statement);
                    let try_block = self.make_block("try body");
                    self.add_edge(current, try_block);
                    let try_exit = self.build_body(body, try_block);
                    let join = self.make_block("join");

                    for handler in handlers {
                        let handler_block = self.make_block("handlers");
                        self.add_edge(try_exit, handler_block);
                        let handler_exit =
                            self.build_body(std::slice::from_ref(handler), handler_block);
                        self.add_edge(handler_exit, join);
                    }

                    let mut normal_exit = try_exit;
                    if !orelse.is_empty() {
                        let else_block = self.make_block("else body");
                        self.add_edge(try_exit, else_block);
                        normal_exit = self.build_body(orelse, else_block);
                    }
                    self.add_edge(normal_exit, join);

                    current = self.build_body(finalbody, join);
                }
                StatementKind::ExceptHandler { body, .. } => {
                    self.append(current, statement);
                    current = self.build_body(body, current);
                }
                StatementKind::With { body, .. } => {
                    self.append(current, statement);
                    current = self.build_body(body, current);
                }
                StatementKind::Break => {
                    self.append(current, statement);
                    if let Some(frame) = self.loops.last() {
                        let after = frame.after;
                        self.add_edge(current, after);
                    }
                    current = self.make_block("after break");
                }
                StatementKind::Continue => {
                    self.append(current, statement);
                    if let Some(frame) = self.loops.last() {
                        let header = frame.header;
                        self.add_edge(current, header);
                    }
                    current = self.make_block("after continue");
                }
                _ => self.append(current, statement),
            }
        }
        current
    }

    fn build_loop(
        &mut self,
        header_stmt: &'a Statement,
        body: &'a [Statement],
        orelse: &'a [Statement],
        current: usize,
        body_label: &'static str,
    ) -> usize {
        let header = self.make_block("loop header");
        self.add_edge(current, header);
        self.append(header, header_stmt);
        let after = self.make_block("join");

        let body_block = self.make_block(body_label);
        self.add_edge(header, body_block);
        self.loops.push(LoopFrame { header, after });
        let body_exit = self.build_body(body, body_block);
        self.loops.pop();
        self.add_edge(body_exit, header);

        if orelse.is_empty() {
            self.add_edge(header, after);
        } else {
            let else_block = self.make_block("else body");
            self.add_edge(header, else_block);
            let else_exit = self.build_body(orelse, else_block);
            self.add_edge(else_exit, after);
        }
        after
    }
}

// ============================================================================
// Control dependencies
// ============================================================================

/// Visits every `(dependent, header)` pair where executing `dependent`
/// hinges on `header`: body statements under their `if`/`elif`/`else`,
/// loop, `with`, or `except` header, each `elif`/`else` header under the
/// header before it, and `except` clauses chained from their `try`.
/// Statements after a compound statement are not dependent on it, and
/// `def`/`class` bodies are not descended into.
pub fn visit_control_dependencies<'a, F>(statements: &'a [Statement], visit: &mut F)
where
    F: FnMut(&'a Statement, &'a Statement),
{
    for statement in statements {
        dependencies_of(statement, visit);
    }
}

fn dependencies_of<'a, F>(statement: &'a Statement, visit: &mut F)
where
    F: FnMut(&'a Statement, &'a Statement),
{
    match &statement.kind {
        StatementKind::If { body, orelse, .. } => {
            for dependent in body {
                visit(dependent, statement);
                dependencies_of(dependent, visit);
            }
            if let Some(chained) = orelse {
                visit(chained, statement);
                dependencies_of(chained, visit);
            }
        }
        StatementKind::While { body, orelse, .. } | StatementKind::For { body, orelse, .. } => {
            for dependent in body.iter().chain(orelse) {
                visit(dependent, statement);
                dependencies_of(dependent, visit);
            }
        }
        StatementKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            for dependent in body.iter().chain(orelse).chain(finalbody) {
                visit(dependent, statement);
                dependencies_of(dependent, visit);
            }
            let mut previous = statement;
            for handler in handlers {
                visit(handler, previous);
                dependencies_of(handler, visit);
                previous = handler;
            }
        }
        StatementKind::ExceptHandler { body, .. } | StatementKind::With { body, .. } => {
            for dependent in body {
                visit(dependent, statement);
                dependencies_of(dependent, visit);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn dependency_lines(source: &str) -> Vec<(u32, u32)> {
        let module = parse(source).unwrap();
        let mut pairs = Vec::new();
        visit_control_dependencies(&module.code, &mut |dependent, header| {
            pairs.push((dependent.range.first_line, header.range.first_line));
        });
        pairs.sort_unstable();
        pairs
    }

    #[test]
    fn straight_line_code_stays_in_one_block() {
        let module = parse("a = 1\nb = a\n").unwrap();
        let cfg = ControlFlowGraph::from_module(&module);
        assert_eq!(cfg.blocks().len(), 1);
        assert_eq!(cfg.blocks()[0].statements().len(), 2);
    }

    #[test]
    fn branches_get_their_own_blocks() {
        let module = parse("x = 1\nif x < 1:\n    y = 2\nelse:\n    y = 3\n").unwrap();
        let cfg = ControlFlowGraph::from_module(&module);
        assert_eq!(cfg.blocks().len(), 6);

        // The entry ends with the branch header and fans out to both arms.
        assert_eq!(cfg.blocks()[0].statements().len(), 2);
        let successors: Vec<usize> = cfg.successor_ids(0).collect();
        assert_eq!(successors.len(), 2);
        assert!(!successors.contains(&1));
    }

    #[test]
    fn an_if_without_else_can_skip_its_body() {
        let module = parse("x = 1\nif x < 1:\n    y = 2\nprint(y)\n").unwrap();
        let cfg = ControlFlowGraph::from_module(&module);
        // Entry reaches the join both through the body and around it.
        let successors: Vec<usize> = cfg.successor_ids(0).collect();
        assert!(successors.contains(&1));
        assert!(successors.contains(&2));
    }

    #[test]
    fn exception_handlers_follow_the_try_body() {
        let module = parse("try:\n    raise Error()\nexcept:\n    pass\n").unwrap();
        let cfg = ControlFlowGraph::from_module(&module);

        let raising = cfg
            .blocks()
            .iter()
            .find(|b| b.statements().iter().any(|s| s.range.first_line == 2))
            .map(|b| b.id())
            .unwrap();
        let handler = cfg
            .blocks()
            .iter()
            .find(|b| b.statements().iter().any(|s| s.range.first_line == 3))
            .map(|b| b.id())
            .unwrap();
        let preds: Vec<usize> = cfg.predecessor_ids(handler).collect();
        assert!(preds.contains(&raising));
    }

    #[test]
    fn loop_bodies_cycle_back_to_the_header() {
        let module = parse("x = 0\nwhile x < 3:\n    x = x + 1\ny = x\n").unwrap();
        let cfg = ControlFlowGraph::from_module(&module);

        let header = cfg
            .blocks()
            .iter()
            .find(|b| b.statements().iter().any(|s| s.range.first_line == 2))
            .map(|b| b.id())
            .unwrap();
        let body = cfg
            .blocks()
            .iter()
            .find(|b| b.statements().iter().any(|s| s.range.first_line == 3))
            .map(|b| b.id())
            .unwrap();
        let header_preds: Vec<usize> = cfg.predecessor_ids(header).collect();
        assert!(header_preds.contains(&body));
        let header_succs: Vec<usize> = cfg.successor_ids(header).collect();
        assert!(header_succs.contains(&body));
        assert_eq!(header_succs.len(), 2);
    }

    #[test]
    fn if_bodies_depend_on_their_header() {
        assert_eq!(dependency_lines("if x > 0:\n    print(x)\n"), vec![(2, 1)]);
    }

    #[test]
    fn elif_and_else_chain_through_previous_headers() {
        let source = "if x > 0:\n    print(\"positive\")\nelif x < 0:\n    print(\"negative\")\nelse:\n    print(\"zero\")\n";
        assert_eq!(
            dependency_lines(source),
            vec![(2, 1), (3, 1), (4, 3), (5, 3), (6, 5)]
        );
    }

    #[test]
    fn statements_after_a_branch_are_not_dependent() {
        let pairs = dependency_lines("if x > 0:\n    print(x)\nprint(y)\n");
        assert_eq!(pairs, vec![(2, 1)]);
    }

    #[test]
    fn handlers_chain_from_the_try_header() {
        let source =
            "try:\n    f()\nexcept ValueError:\n    g()\nexcept TypeError:\n    h()\n";
        let pairs = dependency_lines(source);
        assert!(pairs.contains(&(2, 1)));
        assert!(pairs.contains(&(3, 1)));
        assert!(pairs.contains(&(4, 3)));
        assert!(pairs.contains(&(5, 3)));
        assert!(pairs.contains(&(6, 5)));
    }

    #[test]
    fn function_bodies_are_not_descended() {
        assert!(dependency_lines("def f():\n    if x:\n        y()\n").is_empty());
    }

    #[test]
    fn loop_and_with_bodies_depend_on_their_headers() {
        assert_eq!(
            dependency_lines("for i in range(3):\n    print(i)\n"),
            vec![(2, 1)]
        );
        assert_eq!(
            dependency_lines("with open(path) as f:\n    data = f.read()\n"),
            vec![(2, 1)]
        );
    }
}
