//! Python source parsing.
//!
//! Drives the tree-sitter Python grammar and lowers its concrete syntax
//! tree into the compact AST in [`crate::ast`]. The lowering is strict
//! about errors (any `ERROR` or missing node rejects the whole fragment,
//! since a half-parsed cell would silently lose dependencies) and loose
//! about coverage (constructs the AST does not model become `Unknown`
//! nodes that still expose their sub-expressions).
//!
//! tree-sitter reports rows 0-indexed and columns as byte offsets. All
//! ranges produced here are 1-indexed lines with 0-indexed character
//! columns, end-exclusive, matching [`SourceRange`].

use nbslice_core::{text, SourceRange};
use tree_sitter::{Node, Parser};

use crate::ast::{
    Arg, CompClause, DictEntry, Expr, ExprKind, ImportName, Module, Param, Statement,
    StatementKind, WithItem,
};
use crate::error::{AnalysisError, AnalysisResult};

/// Parses one Python module. Fails on the first syntax error.
pub fn parse(source: &str) -> AnalysisResult<Module> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_python::LANGUAGE.into())?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| AnalysisError::syntax_error(1, 0))?;
    let root = tree.root_node();
    if root.has_error() {
        let bad = first_error(root).unwrap_or(root);
        let point = bad.start_position();
        return Err(AnalysisError::syntax_error(
            point.row as u32 + 1,
            point.column as u32,
        ));
    }

    let lower = Lower {
        source: source.as_bytes(),
        lines: text::lines(source),
    };
    Ok(Module {
        code: lower.body(root),
    })
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

// ============================================================================
// Lowering
// ============================================================================

struct Lower<'a> {
    source: &'a [u8],
    lines: Vec<&'a str>,
}

impl<'a> Lower<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }

    fn column(&self, row: usize, byte_offset: usize) -> u32 {
        match self.lines.get(row) {
            Some(line) => text::char_column(line, byte_offset),
            None => byte_offset as u32,
        }
    }

    fn range(&self, node: Node) -> SourceRange {
        let start = node.start_position();
        let end = node.end_position();
        SourceRange::new(
            start.row as u32 + 1,
            self.column(start.row, start.column),
            end.row as u32 + 1,
            self.column(end.row, end.column),
        )
    }

    /// The range of a compound statement's header: from the keyword through
    /// the colon that ends it.
    fn header_range(&self, node: Node) -> SourceRange {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == ":" {
                let start = node.start_position();
                let end = child.end_position();
                return SourceRange::new(
                    start.row as u32 + 1,
                    self.column(start.row, start.column),
                    end.row as u32 + 1,
                    self.column(end.row, end.column),
                );
            }
        }
        self.range(node)
    }

    /// Named children with comments and other extras skipped.
    fn named_children<'tree>(&self, node: Node<'tree>) -> Vec<Node<'tree>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|child| !child.is_extra())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn body(&self, node: Node) -> Vec<Statement> {
        self.named_children(node)
            .into_iter()
            .map(|child| self.statement(child))
            .collect()
    }

    fn field_body(&self, node: Node, field: &str) -> Vec<Statement> {
        match node.child_by_field_name(field) {
            Some(block) => self.body(block),
            None => Vec::new(),
        }
    }

    fn statement(&self, node: Node) -> Statement {
        match node.kind() {
            "expression_statement" => self.expression_statement(node),
            "import_statement" => Statement::new(
                self.range(node),
                StatementKind::Import {
                    names: self.import_names(node),
                },
            ),
            "import_from_statement" | "future_import_statement" => {
                let module = node
                    .child_by_field_name("module_name")
                    .map(|m| self.text(m))
                    .unwrap_or_else(|| "__future__".to_string());
                let is_star = self
                    .named_children(node)
                    .iter()
                    .any(|child| child.kind() == "wildcard_import");
                Statement::new(
                    self.range(node),
                    StatementKind::FromImport {
                        module,
                        names: self.import_names(node),
                        is_star,
                    },
                )
            }
            "function_definition" => self.function_definition(node, Vec::new(), self.range(node)),
            "class_definition" => self.class_definition(node, Vec::new(), self.range(node)),
            "decorated_definition" => self.decorated_definition(node),
            "if_statement" => self.if_statement(node),
            "while_statement" => Statement::new(
                self.header_range(node),
                StatementKind::While {
                    test: self.field_expr(node, "condition"),
                    body: self.field_body(node, "body"),
                    orelse: self.else_clause_body(node),
                },
            ),
            "for_statement" => Statement::new(
                self.header_range(node),
                StatementKind::For {
                    targets: node
                        .child_by_field_name("left")
                        .map(|left| self.target_list(left))
                        .unwrap_or_default(),
                    iter: self.field_expr(node, "right"),
                    body: self.field_body(node, "body"),
                    orelse: self.else_clause_body(node),
                },
            ),
            "try_statement" => self.try_statement(node),
            "with_statement" => self.with_statement(node),
            "return_statement" => Statement::new(
                self.range(node),
                StatementKind::Return {
                    value: self
                        .named_children(node)
                        .first()
                        .map(|child| self.expr(*child)),
                },
            ),
            "raise_statement" => Statement::new(
                self.range(node),
                StatementKind::Raise {
                    value: self
                        .named_children(node)
                        .first()
                        .map(|child| self.expr(*child)),
                },
            ),
            "delete_statement" => {
                let targets = self
                    .named_children(node)
                    .into_iter()
                    .flat_map(|child| self.target_list(child))
                    .collect();
                Statement::new(self.range(node), StatementKind::Delete { targets })
            }
            "assert_statement" => {
                let children = self.named_children(node);
                Statement::new(
                    self.range(node),
                    StatementKind::Assert {
                        test: children
                            .first()
                            .map(|child| self.expr(*child))
                            .unwrap_or_else(|| self.unknown_expr(node)),
                        message: children.get(1).map(|child| self.expr(*child)),
                    },
                )
            }
            "global_statement" => Statement::new(
                self.range(node),
                StatementKind::Global {
                    names: self.identifier_list(node),
                },
            ),
            "nonlocal_statement" => Statement::new(
                self.range(node),
                StatementKind::Nonlocal {
                    names: self.identifier_list(node),
                },
            ),
            "pass_statement" => Statement::new(self.range(node), StatementKind::Pass),
            "break_statement" => Statement::new(self.range(node), StatementKind::Break),
            "continue_statement" => Statement::new(self.range(node), StatementKind::Continue),
            _ => {
                let children = self
                    .named_children(node)
                    .into_iter()
                    .filter(|child| child.kind() != "block")
                    .map(|child| self.expr(child))
                    .collect();
                Statement::new(self.range(node), StatementKind::Unknown { children })
            }
        }
    }

    fn expression_statement(&self, node: Node) -> Statement {
        let range = self.range(node);
        let Some(inner) = self.named_children(node).first().copied() else {
            return Statement::new(range, StatementKind::Pass);
        };
        match inner.kind() {
            "assignment" => {
                // `a = b = value` nests assignments on the right; flatten the
                // chain into one statement with several targets.
                let mut targets = Vec::new();
                let mut current = inner;
                let value = loop {
                    if let Some(left) = current.child_by_field_name("left") {
                        targets.push(self.expr_or_tuple(left));
                    }
                    match current.child_by_field_name("right") {
                        Some(right) if right.kind() == "assignment" => current = right,
                        Some(right) => break self.expr_or_tuple(right),
                        // Annotation without a value, as in `x: int`. The
                        // name is still bound for slicing purposes.
                        None => break Expr::new(self.range(current), ExprKind::Literal),
                    }
                };
                Statement::new(
                    range,
                    StatementKind::Assign {
                        targets,
                        op: None,
                        value,
                    },
                )
            }
            "augmented_assignment" => {
                let op = node_text_of(inner.child_by_field_name("operator"), self);
                Statement::new(
                    range,
                    StatementKind::Assign {
                        targets: vec![self.field_expr(inner, "left")],
                        op: Some(op),
                        value: self.field_expr(inner, "right"),
                    },
                )
            }
            _ => Statement::new(
                range,
                StatementKind::Expression {
                    value: self.expr(inner),
                },
            ),
        }
    }

    fn import_names(&self, node: Node) -> Vec<ImportName> {
        let mut cursor = node.walk();
        node.children_by_field_name("name", &mut cursor)
            .map(|item| {
                if item.kind() == "aliased_import" {
                    let alias_node = item.child_by_field_name("alias");
                    ImportName {
                        name: node_text_of(item.child_by_field_name("name"), self),
                        range: alias_node
                            .map(|alias| self.range(alias))
                            .unwrap_or_else(|| self.range(item)),
                        alias: alias_node.map(|alias| self.text(alias)),
                    }
                } else {
                    ImportName {
                        name: self.text(item),
                        range: self.range(item),
                        alias: None,
                    }
                }
            })
            .collect()
    }

    fn function_definition(
        &self,
        node: Node,
        decorators: Vec<Expr>,
        range: SourceRange,
    ) -> Statement {
        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.params(p))
            .unwrap_or_default();
        Statement::new(
            range,
            StatementKind::FunctionDef {
                name: node_text_of(node.child_by_field_name("name"), self),
                params,
                decorators,
                body: self.field_body(node, "body"),
            },
        )
    }

    fn class_definition(&self, node: Node, decorators: Vec<Expr>, range: SourceRange) -> Statement {
        let bases = node
            .child_by_field_name("superclasses")
            .map(|args| {
                self.named_children(args)
                    .into_iter()
                    .map(|arg| {
                        if arg.kind() == "keyword_argument" {
                            self.field_expr(arg, "value")
                        } else {
                            self.expr(arg)
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Statement::new(
            range,
            StatementKind::ClassDef {
                name: node_text_of(node.child_by_field_name("name"), self),
                bases,
                decorators,
                body: self.field_body(node, "body"),
            },
        )
    }

    fn decorated_definition(&self, node: Node) -> Statement {
        let decorators = self
            .named_children(node)
            .into_iter()
            .filter(|child| child.kind() == "decorator")
            .filter_map(|decorator| {
                self.named_children(decorator)
                    .first()
                    .map(|inner| self.expr(*inner))
            })
            .collect();
        let range = self.range(node);
        match node.child_by_field_name("definition") {
            Some(def) if def.kind() == "class_definition" => {
                self.class_definition(def, decorators, range)
            }
            Some(def) => self.function_definition(def, decorators, range),
            None => Statement::new(range, StatementKind::Unknown { children: vec![] }),
        }
    }

    fn if_statement(&self, node: Node) -> Statement {
        // Fold the elif/else clauses right to left so each one becomes a
        // nested `If` with its own header range.
        let mut orelse: Option<Box<Statement>> = None;
        let mut cursor = node.walk();
        let clauses: Vec<Node> = node.children_by_field_name("alternative", &mut cursor).collect();
        for clause in clauses.into_iter().rev() {
            let stmt = match clause.kind() {
                "elif_clause" => Statement::new(
                    self.header_range(clause),
                    StatementKind::If {
                        test: Some(self.field_expr(clause, "condition")),
                        body: self.field_body(clause, "consequence"),
                        orelse: orelse.take(),
                    },
                ),
                _ => Statement::new(
                    self.header_range(clause),
                    StatementKind::If {
                        test: None,
                        body: self.field_body(clause, "body"),
                        orelse: orelse.take(),
                    },
                ),
            };
            orelse = Some(Box::new(stmt));
        }
        Statement::new(
            self.header_range(node),
            StatementKind::If {
                test: Some(self.field_expr(node, "condition")),
                body: self.field_body(node, "consequence"),
                orelse,
            },
        )
    }

    fn try_statement(&self, node: Node) -> Statement {
        let mut handlers = Vec::new();
        let mut orelse = Vec::new();
        let mut finalbody = Vec::new();
        for child in self.named_children(node) {
            match child.kind() {
                "except_clause" | "except_group_clause" => {
                    handlers.push(self.except_clause(child));
                }
                "else_clause" => orelse = self.field_body(child, "body"),
                "finally_clause" => {
                    finalbody = self
                        .named_children(child)
                        .iter()
                        .find(|inner| inner.kind() == "block")
                        .map(|block| self.body(*block))
                        .unwrap_or_default();
                }
                _ => {}
            }
        }
        Statement::new(
            self.header_range(node),
            StatementKind::Try {
                body: self.field_body(node, "body"),
                handlers,
                orelse,
                finalbody,
            },
        )
    }

    fn except_clause(&self, node: Node) -> Statement {
        let mut test = None;
        let mut alias = None;
        let mut body = Vec::new();
        for child in self.named_children(node) {
            match child.kind() {
                "block" => body = self.body(child),
                "as_pattern" => {
                    test = self.named_children(child).first().map(|e| self.expr(*e));
                    alias = child
                        .child_by_field_name("alias")
                        .map(|target| self.text(target));
                }
                _ if test.is_none() => test = Some(self.expr(child)),
                _ if alias.is_none() => alias = Some(self.text(child)),
                _ => {}
            }
        }
        Statement::new(
            self.header_range(node),
            StatementKind::ExceptHandler { test, alias, body },
        )
    }

    fn with_statement(&self, node: Node) -> Statement {
        let items = self
            .named_children(node)
            .iter()
            .find(|child| child.kind() == "with_clause")
            .map(|clause| {
                self.named_children(*clause)
                    .into_iter()
                    .map(|item| self.with_item(item))
                    .collect()
            })
            .unwrap_or_default();
        Statement::new(
            self.header_range(node),
            StatementKind::With {
                items,
                body: self.field_body(node, "body"),
            },
        )
    }

    fn with_item(&self, node: Node) -> WithItem {
        let value = node
            .child_by_field_name("value")
            .or_else(|| self.named_children(node).first().copied());
        match value {
            Some(v) if v.kind() == "as_pattern" => WithItem {
                context: self
                    .named_children(v)
                    .first()
                    .map(|inner| self.expr(*inner))
                    .unwrap_or_else(|| self.unknown_expr(v)),
                alias: v
                    .child_by_field_name("alias")
                    .map(|target| self.alias_target(target)),
            },
            Some(v) => WithItem {
                context: self.expr(v),
                alias: None,
            },
            None => WithItem {
                context: self.unknown_expr(node),
                alias: None,
            },
        }
    }

    /// An `as` target is usually an identifier but can be a tuple or a
    /// subscripted expression.
    fn alias_target(&self, node: Node) -> Expr {
        match self.named_children(node).first() {
            Some(inner) => self.expr(*inner),
            None => self.expr(node),
        }
    }

    fn else_clause_body(&self, node: Node) -> Vec<Statement> {
        self.named_children(node)
            .iter()
            .find(|child| child.kind() == "else_clause")
            .map(|clause| self.field_body(*clause, "body"))
            .unwrap_or_default()
    }

    fn identifier_list(&self, node: Node) -> Vec<String> {
        self.named_children(node)
            .into_iter()
            .filter(|child| child.kind() == "identifier")
            .map(|child| self.text(child))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn field_expr(&self, node: Node, field: &str) -> Expr {
        match node.child_by_field_name(field) {
            Some(child) => self.expr_or_tuple(child),
            None => self.unknown_expr(node),
        }
    }

    /// Lowers a node, turning a bare `expression_list` or `pattern_list`
    /// into a tuple.
    fn expr_or_tuple(&self, node: Node) -> Expr {
        match node.kind() {
            "expression_list" | "pattern_list" => {
                let items = self
                    .named_children(node)
                    .into_iter()
                    .map(|child| self.expr(child))
                    .collect();
                Expr::new(self.range(node), ExprKind::Tuple(items))
            }
            _ => self.expr(node),
        }
    }

    /// Splits an assignment or `for` target into its top-level parts.
    fn target_list(&self, node: Node) -> Vec<Expr> {
        match node.kind() {
            "pattern_list" | "expression_list" => self
                .named_children(node)
                .into_iter()
                .map(|child| self.expr(child))
                .collect(),
            _ => vec![self.expr(node)],
        }
    }

    fn unknown_expr(&self, node: Node) -> Expr {
        Expr::new(self.range(node), ExprKind::Unknown { children: vec![] })
    }

    fn expr(&self, node: Node) -> Expr {
        let range = self.range(node);
        let kind = match node.kind() {
            "identifier" => ExprKind::Name(self.text(node)),
            "integer" | "float" | "true" | "false" | "none" | "ellipsis" => ExprKind::Literal,
            "string" => self.string(node),
            "concatenated_string" => self.concatenated_string(node),
            "call" => self.call(node),
            "attribute" => ExprKind::Attribute {
                value: Box::new(self.field_expr(node, "object")),
                attr: node_text_of(node.child_by_field_name("attribute"), self),
            },
            "subscript" => self.subscript(node),
            "binary_operator" => ExprKind::BinOp {
                left: Box::new(self.field_expr(node, "left")),
                op: node_text_of(node.child_by_field_name("operator"), self),
                right: Box::new(self.field_expr(node, "right")),
            },
            "named_expression" => ExprKind::BinOp {
                left: Box::new(self.field_expr(node, "name")),
                op: ":=".to_string(),
                right: Box::new(self.field_expr(node, "value")),
            },
            "unary_operator" => ExprKind::UnaryOp {
                operand: Box::new(self.field_expr(node, "argument")),
            },
            "not_operator" => ExprKind::UnaryOp {
                operand: Box::new(self.field_expr(node, "argument")),
            },
            "boolean_operator" => ExprKind::BoolOp {
                values: vec![self.field_expr(node, "left"), self.field_expr(node, "right")],
            },
            "comparison_operator" => {
                let mut operands = self
                    .named_children(node)
                    .into_iter()
                    .map(|child| self.expr(child));
                match operands.next() {
                    Some(left) => ExprKind::Compare {
                        left: Box::new(left),
                        comparators: operands.collect(),
                    },
                    None => ExprKind::Unknown { children: vec![] },
                }
            }
            "tuple" | "tuple_pattern" => ExprKind::Tuple(self.exprs(node)),
            "list" | "list_pattern" => ExprKind::List(self.exprs(node)),
            "set" => ExprKind::Set(self.exprs(node)),
            "dictionary" => self.dictionary(node),
            "list_comprehension" | "set_comprehension" | "generator_expression" => {
                self.comprehension(node, false)
            }
            "dictionary_comprehension" => self.comprehension(node, true),
            "parenthesized_expression" => {
                return self
                    .named_children(node)
                    .first()
                    .map(|inner| self.expr(*inner))
                    .unwrap_or_else(|| self.unknown_expr(node));
            }
            "conditional_expression" => {
                let children = self.named_children(node);
                match (children.first(), children.get(1), children.get(2)) {
                    (Some(body), Some(test), Some(orelse)) => ExprKind::IfExp {
                        test: Box::new(self.expr(*test)),
                        body: Box::new(self.expr(*body)),
                        orelse: Box::new(self.expr(*orelse)),
                    },
                    _ => ExprKind::Unknown {
                        children: children.into_iter().map(|child| self.expr(child)).collect(),
                    },
                }
            }
            "lambda" => ExprKind::Lambda {
                params: node
                    .child_by_field_name("parameters")
                    .map(|p| self.params(p))
                    .unwrap_or_default(),
                body: Box::new(self.field_expr(node, "body")),
            },
            "slice" => self.slice(node),
            "list_splat" | "dictionary_splat" | "list_splat_pattern"
            | "dictionary_splat_pattern" => match self.named_children(node).first() {
                Some(inner) => ExprKind::Starred(Box::new(self.expr(*inner))),
                None => ExprKind::Unknown { children: vec![] },
            },
            "await" => match self.named_children(node).first() {
                Some(inner) => ExprKind::Await(Box::new(self.expr(*inner))),
                None => ExprKind::Unknown { children: vec![] },
            },
            "yield" => ExprKind::Yield(
                self.named_children(node)
                    .first()
                    .map(|inner| Box::new(self.expr(*inner))),
            ),
            "as_pattern" => {
                return self
                    .named_children(node)
                    .first()
                    .map(|inner| self.expr(*inner))
                    .unwrap_or_else(|| self.unknown_expr(node));
            }
            "keyword_argument" => return self.field_expr(node, "value"),
            _ => ExprKind::Unknown {
                children: self
                    .named_children(node)
                    .into_iter()
                    .map(|child| self.expr(child))
                    .collect(),
            },
        };
        Expr::new(range, kind)
    }

    fn exprs(&self, node: Node) -> Vec<Expr> {
        self.named_children(node)
            .into_iter()
            .map(|child| self.expr(child))
            .collect()
    }

    fn string(&self, node: Node) -> ExprKind {
        let mut content = String::new();
        let mut interpolations = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "string_content" => content.push_str(&self.text(child)),
                "interpolation" => {
                    let inner = child
                        .child_by_field_name("expression")
                        .or_else(|| child.named_child(0));
                    if let Some(inner) = inner {
                        interpolations.push(self.expr(inner));
                    }
                }
                _ => {}
            }
        }
        if interpolations.is_empty() {
            ExprKind::Str(content)
        } else {
            ExprKind::FString(interpolations)
        }
    }

    fn concatenated_string(&self, node: Node) -> ExprKind {
        let mut content = String::new();
        let mut interpolations = Vec::new();
        for child in self.named_children(node) {
            match self.string(child) {
                ExprKind::Str(part) => content.push_str(&part),
                ExprKind::FString(exprs) => interpolations.extend(exprs),
                _ => {}
            }
        }
        if interpolations.is_empty() {
            ExprKind::Str(content)
        } else {
            ExprKind::FString(interpolations)
        }
    }

    fn call(&self, node: Node) -> ExprKind {
        let func = Box::new(self.field_expr(node, "function"));
        let args = match node.child_by_field_name("arguments") {
            Some(arguments) if arguments.kind() == "argument_list" => self
                .named_children(arguments)
                .into_iter()
                .map(|arg| {
                    if arg.kind() == "keyword_argument" {
                        Arg {
                            keyword: arg
                                .child_by_field_name("name")
                                .map(|name| self.text(name)),
                            value: self.field_expr(arg, "value"),
                        }
                    } else {
                        Arg {
                            keyword: None,
                            value: self.expr(arg),
                        }
                    }
                })
                .collect(),
            // A call whose sole argument is a bare generator expression,
            // as in `sum(x for x in xs)`.
            Some(arguments) => vec![Arg {
                keyword: None,
                value: self.expr(arguments),
            }],
            None => Vec::new(),
        };
        ExprKind::Call { func, args }
    }

    fn subscript(&self, node: Node) -> ExprKind {
        let value = Box::new(self.field_expr(node, "value"));
        let mut cursor = node.walk();
        let indices: Vec<Expr> = node
            .children_by_field_name("subscript", &mut cursor)
            .map(|index| self.expr(index))
            .collect();
        let index = match indices.len() {
            1 => indices.into_iter().next().map(Box::new),
            _ => {
                let range = self.range(node);
                Some(Box::new(Expr::new(range, ExprKind::Tuple(indices))))
            }
        };
        match index {
            Some(index) => ExprKind::Subscript { value, index },
            None => ExprKind::Unknown {
                children: vec![*value],
            },
        }
    }

    fn dictionary(&self, node: Node) -> ExprKind {
        let entries = self
            .named_children(node)
            .into_iter()
            .filter_map(|child| match child.kind() {
                "pair" => Some(DictEntry {
                    key: Some(self.field_expr(child, "key")),
                    value: self.field_expr(child, "value"),
                }),
                "dictionary_splat" => self.named_children(child).first().map(|inner| DictEntry {
                    key: None,
                    value: self.expr(*inner),
                }),
                _ => None,
            })
            .collect();
        ExprKind::Dict { entries }
    }

    fn comprehension(&self, node: Node, keyed: bool) -> ExprKind {
        let elements = match node.child_by_field_name("body") {
            Some(body) if keyed => {
                vec![self.field_expr(body, "key"), self.field_expr(body, "value")]
            }
            Some(body) => vec![self.expr(body)],
            None => Vec::new(),
        };
        let clauses = self
            .named_children(node)
            .into_iter()
            .filter_map(|child| match child.kind() {
                "for_in_clause" => Some(CompClause::For {
                    targets: child
                        .child_by_field_name("left")
                        .map(|left| self.target_list(left))
                        .unwrap_or_default(),
                    iter: self.field_expr(child, "right"),
                }),
                "if_clause" => self
                    .named_children(child)
                    .first()
                    .map(|test| CompClause::If {
                        test: self.expr(*test),
                    }),
                _ => None,
            })
            .collect();
        ExprKind::Comprehension { elements, clauses }
    }

    fn slice(&self, node: Node) -> ExprKind {
        let mut parts: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut slot = 0usize;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == ":" {
                slot += 1;
            } else if child.is_named() && slot < 3 {
                parts[slot] = Some(Box::new(self.expr(child)));
            }
        }
        let [lower, upper, step] = parts;
        ExprKind::Slice { lower, upper, step }
    }

    // ------------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------------

    fn params(&self, node: Node) -> Vec<Param> {
        let mut params = Vec::new();
        for child in self.named_children(node) {
            match child.kind() {
                "identifier" => params.push(Param {
                    name: self.text(child),
                    default: None,
                }),
                "typed_parameter" => {
                    if let Some(name) = self.param_name(child) {
                        params.push(Param {
                            name,
                            default: None,
                        });
                    }
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = node_text_of(child.child_by_field_name("name"), self);
                    params.push(Param {
                        name,
                        default: child
                            .child_by_field_name("value")
                            .map(|value| self.expr(value)),
                    });
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    if let Some(name) = self.param_name(child) {
                        params.push(Param {
                            name,
                            default: None,
                        });
                    }
                }
                "tuple_pattern" => {
                    for inner in self.named_children(child) {
                        if inner.kind() == "identifier" {
                            params.push(Param {
                                name: self.text(inner),
                                default: None,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        params
    }

    fn param_name(&self, node: Node) -> Option<String> {
        self.named_children(node)
            .into_iter()
            .find(|child| child.kind() == "identifier")
            .map(|child| self.text(child))
    }
}

fn node_text_of(node: Option<Node>, lower: &Lower) -> String {
    node.map(|n| lower.text(n)).unwrap_or_default()
}
