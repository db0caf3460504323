//! A compact Python syntax tree.
//!
//! This is not a faithful rendition of the full grammar. It keeps exactly the
//! shape the dataflow analysis and the control-flow builder need: statements
//! with source ranges, expressions with enough structure to find names,
//! attribute chains, subscripts, and calls. Everything the analysis never
//! inspects lowers to [`ExprKind::Unknown`] while still exposing its
//! sub-expressions, so name collection keeps working inside constructs the
//! tree does not model.
//!
//! Two conventions matter throughout:
//!
//! - A compound statement's `range` covers only its header, from the keyword
//!   through the colon. Its body lines belong to the nested statements. The
//!   exceptions are `def` and `class`, whose ranges span the whole
//!   definition, because redefining a function is a single atomic event for
//!   slicing purposes.
//! - An `elif`/`else` chain is represented as a nested [`StatementKind::If`]
//!   in the parent's `orelse`, with `test: None` marking a plain `else`.
//!   This gives every branch header a real statement with a real range,
//!   which the control-flow builder depends on.

use nbslice_core::SourceRange;

// ============================================================================
// Module
// ============================================================================

/// A parsed module: the top-level statement list of one program.
#[derive(Debug, Clone)]
pub struct Module {
    pub code: Vec<Statement>,
}

impl Module {
    /// Visits every statement in the module in source order, including
    /// statements nested inside compound bodies, function definitions, and
    /// class definitions.
    pub fn walk(&self, f: &mut impl FnMut(&Statement)) {
        for stmt in &self.code {
            stmt.walk(f);
        }
    }

    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Statement)) {
        for stmt in &mut self.code {
            stmt.walk_mut(f);
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

/// A single statement with its source range.
#[derive(Debug, Clone)]
pub struct Statement {
    pub range: SourceRange,
    pub kind: StatementKind,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    /// `a = b = value`, or an augmented form like `a += value` when `op` is
    /// set.
    Assign {
        targets: Vec<Expr>,
        op: Option<String>,
        value: Expr,
    },
    /// A bare expression statement.
    Expression { value: Expr },
    /// `import a.b, c as d`
    Import { names: Vec<ImportName> },
    /// `from mod import a, b as c` or `from mod import *`
    FromImport {
        module: String,
        names: Vec<ImportName>,
        is_star: bool,
    },
    /// A function definition. The range spans the whole definition.
    FunctionDef {
        name: String,
        params: Vec<Param>,
        decorators: Vec<Expr>,
        body: Vec<Statement>,
    },
    /// A class definition. The range spans the whole definition.
    ClassDef {
        name: String,
        bases: Vec<Expr>,
        decorators: Vec<Expr>,
        body: Vec<Statement>,
    },
    /// `if`/`elif`/`else`. `orelse` holds a nested `If` for an `elif`, or an
    /// `If` with `test: None` for a terminal `else`.
    If {
        test: Option<Expr>,
        body: Vec<Statement>,
        orelse: Option<Box<Statement>>,
    },
    While {
        test: Expr,
        body: Vec<Statement>,
        orelse: Vec<Statement>,
    },
    For {
        targets: Vec<Expr>,
        iter: Expr,
        body: Vec<Statement>,
        orelse: Vec<Statement>,
    },
    Try {
        body: Vec<Statement>,
        handlers: Vec<Statement>,
        orelse: Vec<Statement>,
        finalbody: Vec<Statement>,
    },
    /// One `except` clause of a `try`. Only ever appears in `Try::handlers`.
    ExceptHandler {
        test: Option<Expr>,
        alias: Option<String>,
        body: Vec<Statement>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Statement>,
    },
    Return { value: Option<Expr> },
    Raise { value: Option<Expr> },
    Delete { targets: Vec<Expr> },
    Assert {
        test: Expr,
        message: Option<Expr>,
    },
    Global { names: Vec<String> },
    Nonlocal { names: Vec<String> },
    Pass,
    Break,
    Continue,
    /// A statement form the tree does not model. Its expressions are still
    /// collected so reads inside it are not lost.
    Unknown { children: Vec<Expr> },
}

impl Statement {
    pub fn new(range: SourceRange, kind: StatementKind) -> Self {
        Statement { range, kind }
    }

    /// Visits this statement and every statement nested anywhere inside it,
    /// in source order.
    pub fn walk(&self, f: &mut impl FnMut(&Statement)) {
        f(self);
        match &self.kind {
            StatementKind::FunctionDef { body, .. }
            | StatementKind::ClassDef { body, .. }
            | StatementKind::With { body, .. }
            | StatementKind::ExceptHandler { body, .. } => {
                for stmt in body {
                    stmt.walk(f);
                }
            }
            StatementKind::If { body, orelse, .. } => {
                for stmt in body {
                    stmt.walk(f);
                }
                if let Some(chained) = orelse {
                    chained.walk(f);
                }
            }
            StatementKind::While { body, orelse, .. }
            | StatementKind::For { body, orelse, .. } => {
                for stmt in body.iter().chain(orelse) {
                    stmt.walk(f);
                }
            }
            StatementKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                for stmt in body.iter().chain(handlers).chain(orelse).chain(finalbody) {
                    stmt.walk(f);
                }
            }
            _ => {}
        }
    }

    /// Mutable counterpart of [`walk`](Statement::walk).
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Statement)) {
        f(self);
        match &mut self.kind {
            StatementKind::FunctionDef { body, .. }
            | StatementKind::ClassDef { body, .. }
            | StatementKind::With { body, .. }
            | StatementKind::ExceptHandler { body, .. } => {
                for stmt in body {
                    stmt.walk_mut(f);
                }
            }
            StatementKind::If { body, orelse, .. } => {
                for stmt in body {
                    stmt.walk_mut(f);
                }
                if let Some(chained) = orelse {
                    chained.walk_mut(f);
                }
            }
            StatementKind::While { body, orelse, .. }
            | StatementKind::For { body, orelse, .. } => {
                for stmt in body.iter_mut().chain(orelse) {
                    stmt.walk_mut(f);
                }
            }
            StatementKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                for stmt in body
                    .iter_mut()
                    .chain(handlers)
                    .chain(orelse)
                    .chain(finalbody)
                {
                    stmt.walk_mut(f);
                }
            }
            _ => {}
        }
    }

    /// True for statement forms that open a new lexical scope.
    pub fn opens_scope(&self) -> bool {
        matches!(
            self.kind,
            StatementKind::FunctionDef { .. } | StatementKind::ClassDef { .. }
        )
    }
}

/// One name bound by an `import` or `from ... import` statement.
#[derive(Debug, Clone)]
pub struct ImportName {
    /// The dotted path as written, e.g. `"pandas"` or `"os.path"`.
    pub name: String,
    /// The range of the name (or of its alias when one is present).
    pub range: SourceRange,
    pub alias: Option<String>,
}

impl ImportName {
    /// The name this import binds in the enclosing scope. `import a.b.c`
    /// binds `a`; `import a.b.c as d` binds `d`.
    pub fn binding_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

/// A formal parameter of a function or lambda.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// One `expr as alias` item of a `with` statement.
#[derive(Debug, Clone)]
pub struct WithItem {
    pub context: Expr,
    pub alias: Option<Expr>,
}

// ============================================================================
// Expressions
// ============================================================================

/// An expression with its source range.
#[derive(Debug, Clone)]
pub struct Expr {
    pub range: SourceRange,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A simple identifier.
    Name(String),
    /// A string literal. Carries the content between the quotes so magic
    /// annotations can be recognized.
    Str(String),
    /// A number, `True`, `False`, `None`, or `...`.
    Literal,
    /// `value.attr`
    Attribute { value: Box<Expr>, attr: String },
    /// `value[index]`
    Subscript { value: Box<Expr>, index: Box<Expr> },
    /// `func(args...)`
    Call { func: Box<Expr>, args: Vec<Arg> },
    BinOp {
        left: Box<Expr>,
        op: String,
        right: Box<Expr>,
    },
    UnaryOp { operand: Box<Expr> },
    BoolOp { values: Vec<Expr> },
    Compare {
        left: Box<Expr>,
        comparators: Vec<Expr>,
    },
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    Dict { entries: Vec<DictEntry> },
    /// A list/set/dict comprehension or generator expression. `elements`
    /// holds the produced expression(s); `clauses` hold the `for`/`if`
    /// parts in source order.
    Comprehension {
        elements: Vec<Expr>,
        clauses: Vec<CompClause>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Starred(Box<Expr>),
    /// `lower:upper:step` inside a subscript.
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    /// An f-string; carries the interpolated expressions.
    FString(Vec<Expr>),
    /// An expression form the tree does not model. Its sub-expressions are
    /// still collected.
    Unknown { children: Vec<Expr> },
}

impl Expr {
    pub fn new(range: SourceRange, kind: ExprKind) -> Self {
        Expr { range, kind }
    }

    /// The identifier text when this expression is a simple name.
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Follows attribute and subscript chains down to the leftmost base
    /// expression: `a.b[0].c` resolves to `a`.
    pub fn base(&self) -> &Expr {
        match &self.kind {
            ExprKind::Attribute { value, .. } | ExprKind::Subscript { value, .. } => value.base(),
            _ => self,
        }
    }
}

/// One call argument, keyword or positional.
#[derive(Debug, Clone)]
pub struct Arg {
    /// The keyword for `name=value` arguments.
    pub keyword: Option<String>,
    pub value: Expr,
}

/// One `key: value` entry of a dict display. A `**spread` entry has no key.
#[derive(Debug, Clone)]
pub struct DictEntry {
    pub key: Option<Expr>,
    pub value: Expr,
}

/// One `for targets in iter` or `if test` clause of a comprehension.
#[derive(Debug, Clone)]
pub enum CompClause {
    For { targets: Vec<Expr>, iter: Expr },
    If { test: Expr },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(line: u32) -> SourceRange {
        SourceRange::new(line, 0, line, 10)
    }

    fn name(text: &str) -> Expr {
        Expr::new(range(1), ExprKind::Name(text.into()))
    }

    #[test]
    fn base_follows_attribute_and_subscript_chains() {
        let chain = Expr::new(
            range(1),
            ExprKind::Subscript {
                value: Box::new(Expr::new(
                    range(1),
                    ExprKind::Attribute {
                        value: Box::new(name("df")),
                        attr: "loc".into(),
                    },
                )),
                index: Box::new(Expr::new(range(1), ExprKind::Literal)),
            },
        );
        assert_eq!(chain.base().as_name(), Some("df"));
    }

    #[test]
    fn import_binding_name_uses_first_segment_or_alias() {
        let plain = ImportName {
            name: "os.path".into(),
            range: range(1),
            alias: None,
        };
        assert_eq!(plain.binding_name(), "os");

        let aliased = ImportName {
            name: "pandas".into(),
            range: range(1),
            alias: Some("pd".into()),
        };
        assert_eq!(aliased.binding_name(), "pd");
    }

    #[test]
    fn walk_descends_into_nested_bodies() {
        let inner = Statement::new(range(3), StatementKind::Pass);
        let body = Statement::new(
            range(2),
            StatementKind::If {
                test: None,
                body: vec![inner],
                orelse: None,
            },
        );
        let outer = Statement::new(
            range(1),
            StatementKind::FunctionDef {
                name: "f".into(),
                params: vec![],
                decorators: vec![],
                body: vec![body],
            },
        );

        let mut lines = Vec::new();
        outer.walk(&mut |stmt| lines.push(stmt.range.first_line));
        assert_eq!(lines, vec![1, 2, 3]);
    }
}
