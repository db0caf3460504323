//! Definition/use dataflow analysis.
//!
//! Three operations build on each other. [`DataflowAnalyzer::get_uses`]
//! collects the names a statement reads, with full-body lexical scoping for
//! nested functions: a name bound anywhere in a function body (parameter or
//! assignment) is local for the whole body and never escapes as a use.
//! [`DataflowAnalyzer::get_defs`] collects the names a statement binds or
//! mutates, resolving call side effects against a [`SpecTable`] and falling
//! back to conservative assumptions for anything unknown. [`analyze`]
//! chains both over a control-flow graph with a reaching-definitions
//! fixpoint, producing statement-to-statement edges.
//!
//! Two policies deserve calling out. A `Definition` of a name replaces every
//! reaching definition of that name, while an `Update` (augmented or
//! subscript/attribute assignment, inferred call effect) accumulates
//! alongside them, so a later use links to the binding statement and every
//! mutation since. When control flow diverges and both branches bind the
//! same name, a use after the join links once to each reaching definition.
//!
//! [`analyze`]: DataflowAnalyzer::analyze

use std::collections::{HashSet, VecDeque};

use nbslice_core::SourceRange;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::ast::{Arg, CompClause, Expr, ExprKind, ImportName, Param, Statement, StatementKind};
use crate::cfg::ControlFlowGraph;
use crate::specs::{qualify, FunctionSpec, SpecTable, BUILTINS_MODULE};

// ============================================================================
// References
// ============================================================================

/// What sort of symbol a reference names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    Import,
    Magic,
}

/// How a statement touches a symbol. `Definition` is a fresh binding,
/// `Update` mutates an existing one, `Use` reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefLevel {
    Definition,
    Update,
    Use,
}

/// One definition, update, or use of a name.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub kind: SymbolKind,
    pub name: String,
    pub level: RefLevel,
    /// Where the symbol itself appears.
    pub location: SourceRange,
    /// The whole statement the reference belongs to. Dataflow edges connect
    /// statement ranges so slices stay syntactically complete.
    pub statement: SourceRange,
    /// Qualified type of the bound value, when a spec declared one.
    pub inferred_type: Option<String>,
    /// For import definitions, the module the name comes from.
    pub module: Option<String>,
}

impl Reference {
    fn new(
        kind: SymbolKind,
        name: impl Into<String>,
        level: RefLevel,
        location: SourceRange,
        statement: SourceRange,
    ) -> Self {
        Reference {
            kind,
            name: name.into(),
            level,
            location,
            statement,
            inferred_type: None,
            module: None,
        }
    }

    fn key(&self) -> (&str, RefLevel, (u32, u32), (u32, u32)) {
        (
            self.name.as_str(),
            self.level,
            self.location.start(),
            self.location.end(),
        )
    }
}

/// A set of references, deduplicated by (name, level, location).
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    items: Vec<Reference>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        ReferenceSet::default()
    }

    /// Adds a reference unless an equal-keyed one is already present.
    pub fn add(&mut self, reference: Reference) -> bool {
        if self.items.iter().any(|r| r.key() == reference.key()) {
            return false;
        }
        self.items.push(reference);
        true
    }

    pub fn union(&self, other: &ReferenceSet) -> ReferenceSet {
        let mut merged = self.clone();
        for reference in &other.items {
            merged.add(reference.clone());
        }
        merged
    }

    pub fn items(&self) -> &[Reference] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reference> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Set equality over keys, ignoring insertion order.
    fn same_items(&self, other: &ReferenceSet) -> bool {
        self.items.len() == other.items.len()
            && other
                .items
                .iter()
                .all(|r| self.items.iter().any(|own| own.key() == r.key()))
    }
}

impl Extend<Reference> for ReferenceSet {
    fn extend<T: IntoIterator<Item = Reference>>(&mut self, iter: T) {
        for reference in iter {
            self.add(reference);
        }
    }
}

impl FromIterator<Reference> for ReferenceSet {
    fn from_iter<T: IntoIterator<Item = Reference>>(iter: T) -> Self {
        let mut set = ReferenceSet::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for ReferenceSet {
    type Item = Reference;
    type IntoIter = std::vec::IntoIter<Reference>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// One statement-to-statement dependency: `to` reads a name that `from`
/// defined or updated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataflowEdge {
    pub from: SourceRange,
    pub to: SourceRange,
}

// ============================================================================
// Analyzer
// ============================================================================

/// The def/use analyzer. Stateless between calls; the only configuration is
/// the spec table consulted for call effects.
#[derive(Debug, Clone)]
pub struct DataflowAnalyzer {
    specs: SpecTable,
}

impl Default for DataflowAnalyzer {
    fn default() -> Self {
        DataflowAnalyzer::new()
    }
}

impl DataflowAnalyzer {
    /// An analyzer using the embedded default spec table.
    pub fn new() -> Self {
        DataflowAnalyzer {
            specs: SpecTable::builtin().clone(),
        }
    }

    /// An analyzer using a caller-supplied spec table.
    pub fn with_specs(specs: SpecTable) -> Self {
        DataflowAnalyzer { specs }
    }

    // ------------------------------------------------------------------------
    // Uses
    // ------------------------------------------------------------------------

    /// Every name this statement reads. For compound statements this covers
    /// the header only (bodies are separate statements in the CFG), except
    /// `def` and `class`, which are atomic: their body is analyzed with
    /// lexical scoping and only unbound names escape.
    pub fn get_uses(&self, statement: &Statement) -> ReferenceSet {
        let mut uses = ReferenceSet::new();
        self.statement_uses(statement, &mut uses);
        uses
    }

    fn statement_uses(&self, statement: &Statement, out: &mut ReferenceSet) {
        let stmt_range = &statement.range;
        match &statement.kind {
            StatementKind::Assign { targets, op, value } => {
                self.expr_uses(value, stmt_range, out);
                for target in targets {
                    if op.is_some() {
                        // The old value is read before being combined.
                        self.expr_uses(target, stmt_range, out);
                    } else {
                        self.assign_target_uses(target, stmt_range, out);
                    }
                }
            }
            StatementKind::Expression { value } => self.expr_uses(value, stmt_range, out),
            StatementKind::FunctionDef {
                params,
                decorators,
                body,
                ..
            } => {
                for decorator in decorators {
                    self.expr_uses(decorator, stmt_range, out);
                }
                for param in params {
                    if let Some(default) = &param.default {
                        self.expr_uses(default, stmt_range, out);
                    }
                }
                self.function_scope_uses(body, params, stmt_range, out);
            }
            StatementKind::ClassDef {
                bases,
                decorators,
                body,
                ..
            } => {
                for expr in bases.iter().chain(decorators) {
                    self.expr_uses(expr, stmt_range, out);
                }
                self.class_scope_uses(body, stmt_range, out);
            }
            StatementKind::If { test, .. } => {
                if let Some(test) = test {
                    self.expr_uses(test, stmt_range, out);
                }
            }
            StatementKind::While { test, .. } => self.expr_uses(test, stmt_range, out),
            StatementKind::For { iter, .. } => self.expr_uses(iter, stmt_range, out),
            StatementKind::With { items, .. } => {
                for item in items {
                    self.expr_uses(&item.context, stmt_range, out);
                }
            }
            StatementKind::ExceptHandler { test, .. } => {
                if let Some(test) = test {
                    self.expr_uses(test, stmt_range, out);
                }
            }
            StatementKind::Return { value } | StatementKind::Raise { value } => {
                if let Some(value) = value {
                    self.expr_uses(value, stmt_range, out);
                }
            }
            StatementKind::Delete { targets } => {
                for target in targets {
                    self.expr_uses(target, stmt_range, out);
                }
            }
            StatementKind::Assert { test, message } => {
                self.expr_uses(test, stmt_range, out);
                if let Some(message) = message {
                    self.expr_uses(message, stmt_range, out);
                }
            }
            StatementKind::Unknown { children } => {
                for child in children {
                    self.expr_uses(child, stmt_range, out);
                }
            }
            StatementKind::Import { .. }
            | StatementKind::FromImport { .. }
            | StatementKind::Try { .. }
            | StatementKind::Global { .. }
            | StatementKind::Nonlocal { .. }
            | StatementKind::Pass
            | StatementKind::Break
            | StatementKind::Continue => {}
        }
    }

    /// Uses within one statement of a scope body, recursing through compound
    /// statements since no CFG decomposes them here.
    fn region_uses(&self, statement: &Statement, out: &mut ReferenceSet) {
        self.statement_uses(statement, out);
        match &statement.kind {
            StatementKind::If { body, orelse, .. } => {
                for stmt in body {
                    self.region_uses(stmt, out);
                }
                if let Some(chained) = orelse {
                    self.region_uses(chained, out);
                }
            }
            StatementKind::While { body, orelse, .. }
            | StatementKind::For { body, orelse, .. } => {
                for stmt in body.iter().chain(orelse) {
                    self.region_uses(stmt, out);
                }
            }
            StatementKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                for stmt in body.iter().chain(handlers).chain(orelse).chain(finalbody) {
                    self.region_uses(stmt, out);
                }
            }
            StatementKind::ExceptHandler { body, .. } | StatementKind::With { body, .. } => {
                for stmt in body {
                    self.region_uses(stmt, out);
                }
            }
            _ => {}
        }
    }

    fn function_scope_uses(
        &self,
        body: &[Statement],
        params: &[Param],
        stmt_range: &SourceRange,
        out: &mut ReferenceSet,
    ) {
        let mut bound: HashSet<String> = params.iter().map(|p| p.name.clone()).collect();
        let mut declared_outer = HashSet::new();
        collect_bound_names(body, &mut bound, &mut declared_outer);
        for name in &declared_outer {
            bound.remove(name);
        }

        let mut inner = ReferenceSet::new();
        for stmt in body {
            self.region_uses(stmt, &mut inner);
        }
        for reference in inner {
            if !bound.contains(&reference.name) {
                out.add(Reference {
                    statement: stmt_range.clone(),
                    ..reference
                });
            }
        }
    }

    /// Class bodies screen only their directly-evaluated reads; names read
    /// inside method bodies resolve past the class scope entirely.
    fn class_scope_uses(
        &self,
        body: &[Statement],
        stmt_range: &SourceRange,
        out: &mut ReferenceSet,
    ) {
        let mut bound = HashSet::new();
        let mut declared_outer = HashSet::new();
        collect_bound_names(body, &mut bound, &mut declared_outer);
        for name in &declared_outer {
            bound.remove(name);
        }

        for stmt in body {
            let mut inner = ReferenceSet::new();
            let screened = match &stmt.kind {
                StatementKind::FunctionDef { .. } | StatementKind::ClassDef { .. } => {
                    self.statement_uses(stmt, &mut inner);
                    false
                }
                _ => {
                    self.region_uses(stmt, &mut inner);
                    true
                }
            };
            for reference in inner {
                if !screened || !bound.contains(&reference.name) {
                    out.add(Reference {
                        statement: stmt_range.clone(),
                        ..reference
                    });
                }
            }
        }
    }

    fn expr_uses(&self, expr: &Expr, stmt_range: &SourceRange, out: &mut ReferenceSet) {
        match &expr.kind {
            ExprKind::Name(name) => {
                out.add(Reference::new(
                    SymbolKind::Variable,
                    name,
                    RefLevel::Use,
                    expr.range.clone(),
                    stmt_range.clone(),
                ));
            }
            ExprKind::Str(_) | ExprKind::Literal => {}
            ExprKind::Attribute { value, .. } => self.expr_uses(value, stmt_range, out),
            ExprKind::Subscript { value, index } => {
                self.expr_uses(value, stmt_range, out);
                self.expr_uses(index, stmt_range, out);
            }
            ExprKind::Call { func, args } => {
                self.expr_uses(func, stmt_range, out);
                for arg in args {
                    self.expr_uses(&arg.value, stmt_range, out);
                }
            }
            ExprKind::BinOp { left, right, .. } => {
                self.expr_uses(left, stmt_range, out);
                self.expr_uses(right, stmt_range, out);
            }
            ExprKind::UnaryOp { operand } => self.expr_uses(operand, stmt_range, out),
            ExprKind::BoolOp { values } => {
                for value in values {
                    self.expr_uses(value, stmt_range, out);
                }
            }
            ExprKind::Compare { left, comparators } => {
                self.expr_uses(left, stmt_range, out);
                for comparator in comparators {
                    self.expr_uses(comparator, stmt_range, out);
                }
            }
            ExprKind::Tuple(items) | ExprKind::List(items) | ExprKind::Set(items) => {
                for item in items {
                    self.expr_uses(item, stmt_range, out);
                }
            }
            ExprKind::Dict { entries } => {
                for entry in entries {
                    if let Some(key) = &entry.key {
                        self.expr_uses(key, stmt_range, out);
                    }
                    self.expr_uses(&entry.value, stmt_range, out);
                }
            }
            ExprKind::Comprehension { elements, clauses } => {
                self.comprehension_uses(elements, clauses, stmt_range, out);
            }
            ExprKind::Lambda { params, body } => {
                for param in params {
                    if let Some(default) = &param.default {
                        self.expr_uses(default, stmt_range, out);
                    }
                }
                let mut inner = ReferenceSet::new();
                self.expr_uses(body, stmt_range, &mut inner);
                let bound: HashSet<&str> = params.iter().map(|p| p.name.as_str()).collect();
                for reference in inner {
                    if !bound.contains(reference.name.as_str()) {
                        out.add(reference);
                    }
                }
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.expr_uses(test, stmt_range, out);
                self.expr_uses(body, stmt_range, out);
                self.expr_uses(orelse, stmt_range, out);
            }
            ExprKind::Starred(inner) | ExprKind::Await(inner) => {
                self.expr_uses(inner, stmt_range, out)
            }
            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr_uses(part, stmt_range, out);
                }
            }
            ExprKind::Yield(value) => {
                if let Some(value) = value {
                    self.expr_uses(value, stmt_range, out);
                }
            }
            ExprKind::FString(parts) => {
                for part in parts {
                    self.expr_uses(part, stmt_range, out);
                }
            }
            ExprKind::Unknown { children } => {
                for child in children {
                    self.expr_uses(child, stmt_range, out);
                }
            }
        }
    }

    /// Comprehension targets are local to the comprehension.
    fn comprehension_uses(
        &self,
        elements: &[Expr],
        clauses: &[CompClause],
        stmt_range: &SourceRange,
        out: &mut ReferenceSet,
    ) {
        let mut bound = HashSet::new();
        for clause in clauses {
            if let CompClause::For { targets, .. } = clause {
                for target in targets {
                    collect_target_names(target, &mut bound);
                }
            }
        }

        let mut inner = ReferenceSet::new();
        for element in elements {
            self.expr_uses(element, stmt_range, &mut inner);
        }
        for clause in clauses {
            match clause {
                CompClause::For { iter, .. } => self.expr_uses(iter, stmt_range, &mut inner),
                CompClause::If { test } => self.expr_uses(test, stmt_range, &mut inner),
            }
        }
        for reference in inner {
            if !bound.contains(&reference.name) {
                out.add(reference);
            }
        }
    }

    /// Reads performed while evaluating an assignment target: subscript
    /// indices and slice bounds, but never the base name being updated.
    fn assign_target_uses(&self, target: &Expr, stmt_range: &SourceRange, out: &mut ReferenceSet) {
        match &target.kind {
            ExprKind::Name(_) => {}
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.assign_target_uses(item, stmt_range, out);
                }
            }
            ExprKind::Starred(inner) => self.assign_target_uses(inner, stmt_range, out),
            ExprKind::Attribute { value, .. } => self.assign_target_uses(value, stmt_range, out),
            ExprKind::Subscript { value, index } => {
                self.expr_uses(index, stmt_range, out);
                self.assign_target_uses(value, stmt_range, out);
            }
            _ => self.expr_uses(target, stmt_range, out),
        }
    }

    // ------------------------------------------------------------------------
    // Defs
    // ------------------------------------------------------------------------

    /// Every name this statement binds or mutates. `prior` supplies earlier
    /// definitions so imports and inferred types can resolve call effects.
    pub fn get_defs(&self, statement: &Statement, prior: &ReferenceSet) -> ReferenceSet {
        let mut defs = ReferenceSet::new();
        let stmt_range = &statement.range;
        match &statement.kind {
            StatementKind::Assign { targets, op, value } => {
                let inferred = if op.is_none() && targets.len() == 1 {
                    self.expr_type(value, prior)
                } else {
                    None
                };
                for target in targets {
                    self.target_defs(target, op.is_some(), inferred.as_deref(), stmt_range, &mut defs);
                }
            }
            StatementKind::Expression { value } => {
                if let Some(magic) = self.magic_defs(value, stmt_range) {
                    defs.extend(magic);
                } else {
                    self.call_effect_defs(value, prior, stmt_range, &mut defs);
                }
            }
            StatementKind::Import { names } => {
                for name in names {
                    defs.add(import_reference(name, None, stmt_range));
                }
            }
            StatementKind::FromImport {
                module,
                names,
                is_star,
            } => {
                for name in names {
                    defs.add(import_reference(name, Some(module), stmt_range));
                }
                if *is_star {
                    let mut reference = Reference::new(
                        SymbolKind::Import,
                        "*",
                        RefLevel::Definition,
                        stmt_range.clone(),
                        stmt_range.clone(),
                    );
                    reference.module = Some(module.clone());
                    defs.add(reference);
                }
            }
            StatementKind::FunctionDef { name, .. } => {
                defs.add(Reference::new(
                    SymbolKind::Function,
                    name,
                    RefLevel::Definition,
                    stmt_range.clone(),
                    stmt_range.clone(),
                ));
            }
            StatementKind::ClassDef { name, .. } => {
                defs.add(Reference::new(
                    SymbolKind::Class,
                    name,
                    RefLevel::Definition,
                    stmt_range.clone(),
                    stmt_range.clone(),
                ));
            }
            StatementKind::For { targets, .. } => {
                for target in targets {
                    self.target_defs(target, false, None, stmt_range, &mut defs);
                }
            }
            StatementKind::With { items, .. } => {
                for item in items {
                    if let Some(alias) = &item.alias {
                        self.target_defs(alias, false, None, stmt_range, &mut defs);
                    }
                }
            }
            StatementKind::ExceptHandler { alias, .. } => {
                if let Some(alias) = alias {
                    defs.add(Reference::new(
                        SymbolKind::Variable,
                        alias,
                        RefLevel::Definition,
                        stmt_range.clone(),
                        stmt_range.clone(),
                    ));
                }
            }
            _ => {}
        }
        defs
    }

    fn target_defs(
        &self,
        target: &Expr,
        augmented: bool,
        inferred: Option<&str>,
        stmt_range: &SourceRange,
        out: &mut ReferenceSet,
    ) {
        match &target.kind {
            ExprKind::Name(name) => {
                let level = if augmented {
                    RefLevel::Update
                } else {
                    RefLevel::Definition
                };
                let mut reference = Reference::new(
                    SymbolKind::Variable,
                    name,
                    level,
                    target.range.clone(),
                    stmt_range.clone(),
                );
                reference.inferred_type = inferred.map(str::to_string);
                out.add(reference);
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.target_defs(item, augmented, None, stmt_range, out);
                }
            }
            ExprKind::Starred(inner) => self.target_defs(inner, augmented, None, stmt_range, out),
            ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {
                // Mutates the leftmost base, never rebinds it.
                if let ExprKind::Name(base) = &target.base().kind {
                    out.add(Reference::new(
                        SymbolKind::Variable,
                        base,
                        RefLevel::Update,
                        target.base().range.clone(),
                        stmt_range.clone(),
                    ));
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------------
    // Call effects
    // ------------------------------------------------------------------------

    fn call_effect_defs(
        &self,
        expr: &Expr,
        prior: &ReferenceSet,
        stmt_range: &SourceRange,
        out: &mut ReferenceSet,
    ) {
        match &expr.kind {
            ExprKind::Call { func, args } => self.resolve_call(func, args, prior, stmt_range, out),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.call_effect_defs(item, prior, stmt_range, out);
                }
            }
            ExprKind::Await(inner) => self.call_effect_defs(inner, prior, stmt_range, out),
            _ => {}
        }
    }

    fn resolve_call(
        &self,
        func: &Expr,
        args: &[Arg],
        prior: &ReferenceSet,
        stmt_range: &SourceRange,
        out: &mut ReferenceSet,
    ) {
        match &func.kind {
            ExprKind::Name(name) => {
                match self.lookup_function(name, prior) {
                    Some(spec) => self.apply_spec(spec, None, args, stmt_range, out),
                    // Unknown function: assume it mutates whatever it is
                    // handed.
                    None => {
                        trace!(function = %name, "no spec entry, treating arguments as updated");
                        for arg in args {
                            self.update_if_name(&arg.value, stmt_range, out);
                        }
                    }
                }
            }
            ExprKind::Attribute {
                value: receiver,
                attr,
            } => {
                let spec = match &receiver.kind {
                    ExprKind::Name(recv_name) => {
                        if let Some(module) = import_module_of(recv_name, prior) {
                            self.specs.function(&module, attr)
                        } else if let Some(qtype) = inferred_type_of(recv_name, prior) {
                            self.specs.method(&qtype, attr)
                        } else {
                            None
                        }
                    }
                    // A call mid-chain binds nothing and types resolve
                    // through the chain instead.
                    _ => match self.expr_type(receiver, prior) {
                        Some(qtype) => self.specs.method(&qtype, attr),
                        None => return,
                    },
                };
                match spec {
                    Some(spec) => self.apply_spec(spec, Some(receiver), args, stmt_range, out),
                    // Unknown method: assume it mutates its receiver.
                    None => {
                        trace!(method = %attr, "no spec entry, treating the receiver as updated");
                        self.update_if_name(receiver, stmt_range, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn apply_spec(
        &self,
        spec: &FunctionSpec,
        receiver: Option<&Expr>,
        args: &[Arg],
        stmt_range: &SourceRange,
        out: &mut ReferenceSet,
    ) {
        if spec.updates_receiver() {
            if let Some(receiver) = receiver {
                self.update_if_name(receiver, stmt_range, out);
            }
        }
        let positional: Vec<&Arg> = args.iter().filter(|arg| arg.keyword.is_none()).collect();
        for index in spec.updated_arg_indices() {
            if let Some(arg) = positional.get(index) {
                self.update_if_name(&arg.value, stmt_range, out);
            }
        }
        for keyword in spec.updated_keywords() {
            if let Some(arg) = args.iter().find(|arg| arg.keyword.as_deref() == Some(keyword)) {
                self.update_if_name(&arg.value, stmt_range, out);
            }
        }
    }

    fn update_if_name(&self, expr: &Expr, stmt_range: &SourceRange, out: &mut ReferenceSet) {
        if let ExprKind::Name(name) = &expr.kind {
            out.add(Reference::new(
                SymbolKind::Variable,
                name,
                RefLevel::Update,
                expr.range.clone(),
                stmt_range.clone(),
            ));
        }
    }

    fn lookup_function(&self, name: &str, prior: &ReferenceSet) -> Option<&FunctionSpec> {
        for module in import_modules_providing(name, prior) {
            if let Some(spec) = self.specs.function(&module, name) {
                return Some(spec);
            }
        }
        self.specs.function(BUILTINS_MODULE, name)
    }

    /// The qualified result type of an expression, when the spec table can
    /// chain it: a spec'd constructor or function call, a typed variable, or
    /// a method call on either.
    fn expr_type(&self, expr: &Expr, prior: &ReferenceSet) -> Option<String> {
        match &expr.kind {
            ExprKind::Name(name) => inferred_type_of(name, prior),
            ExprKind::Call { func, .. } => match &func.kind {
                ExprKind::Name(name) => {
                    for module in import_modules_providing(name, prior) {
                        if let Some(result) = self.specs.result_type(&module, name) {
                            return Some(result);
                        }
                    }
                    self.specs.result_type(BUILTINS_MODULE, name)
                }
                ExprKind::Attribute { value, attr } => {
                    if let ExprKind::Name(recv_name) = &value.kind {
                        if let Some(module) = import_module_of(recv_name, prior) {
                            return self.specs.result_type(&module, attr);
                        }
                    }
                    let receiver_type = self.expr_type(value, prior)?;
                    let method = self.specs.method(&receiver_type, attr)?;
                    let returns = method.returns.as_deref()?;
                    let (module, _) = receiver_type.rsplit_once('.')?;
                    Some(qualify(module, returns))
                }
                _ => None,
            },
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Magic annotations
    // ------------------------------------------------------------------------

    /// Recognizes `'''defs: [...]''' % marker` statements: an explicit
    /// escape hatch declaring definitions static analysis cannot infer.
    /// Declared positions are offsets from the statement's own start.
    fn magic_defs(&self, value: &Expr, stmt_range: &SourceRange) -> Option<Vec<Reference>> {
        let ExprKind::BinOp { left, op, .. } = &value.kind else {
            return None;
        };
        if op != "%" {
            return None;
        }
        let ExprKind::Str(content) = &left.kind else {
            return None;
        };
        let declaration = content.trim_start().strip_prefix("defs:")?;

        let parsed: Vec<MagicDef> = match serde_json::from_str(declaration) {
            Ok(defs) => defs,
            Err(err) => {
                debug!(%err, "ignoring unparseable defs annotation");
                return None;
            }
        };
        Some(
            parsed
                .into_iter()
                .map(|def| {
                    let location = SourceRange::new(
                        stmt_range.first_line + def.pos[0][0],
                        def.pos[0][1],
                        stmt_range.first_line + def.pos[1][0],
                        def.pos[1][1],
                    );
                    Reference::new(
                        SymbolKind::Magic,
                        def.name,
                        RefLevel::Definition,
                        location,
                        stmt_range.clone(),
                    )
                })
                .collect(),
        )
    }

    // ------------------------------------------------------------------------
    // Reaching definitions
    // ------------------------------------------------------------------------

    /// Walks the CFG with a reaching-definitions fixpoint and returns one
    /// edge per (reaching definition, use) pair. Names with no reaching
    /// definition produce no edge.
    pub fn analyze(&self, cfg: &ControlFlowGraph) -> Vec<DataflowEdge> {
        let block_count = cfg.blocks().len();
        let mut outs: Vec<ReferenceSet> = vec![ReferenceSet::new(); block_count];
        let mut edges = Vec::new();
        let mut seen = HashSet::new();

        let mut work: VecDeque<usize> = (0..block_count).collect();
        while let Some(block_id) = work.pop_front() {
            let mut reaching = ReferenceSet::new();
            for pred in cfg.predecessor_ids(block_id) {
                reaching = reaching.union(&outs[pred]);
            }

            for statement in cfg.blocks()[block_id].statements() {
                for use_ref in self.get_uses(statement).items() {
                    for def in reaching
                        .items()
                        .iter()
                        .filter(|def| def.name == use_ref.name)
                    {
                        let edge = DataflowEdge {
                            from: def.statement.clone(),
                            to: use_ref.statement.clone(),
                        };
                        if seen.insert(edge.clone()) {
                            edges.push(edge);
                        }
                    }
                }

                let defs = self.get_defs(statement, &reaching);
                for def in defs {
                    if def.level == RefLevel::Definition {
                        reaching = reaching
                            .into_iter()
                            .filter(|r| r.name != def.name)
                            .collect();
                    }
                    reaching.add(def);
                }
            }

            if !outs[block_id].same_items(&reaching) {
                outs[block_id] = reaching;
                for succ in cfg.successor_ids(block_id) {
                    if !work.contains(&succ) {
                        work.push_back(succ);
                    }
                }
            }
        }
        edges
    }
}

#[derive(Debug, Deserialize)]
struct MagicDef {
    name: String,
    pos: [[u32; 2]; 2],
}

// ============================================================================
// Name resolution over prior references
// ============================================================================

fn import_reference(
    name: &ImportName,
    from_module: Option<&str>,
    stmt_range: &SourceRange,
) -> Reference {
    let binding = name.binding_name().to_string();
    let module = match from_module {
        Some(module) => module.to_string(),
        // `import a.b.c` binds `a`, and `a` resolves to the package root
        // unless an alias names the full path.
        None if name.alias.is_some() => name.name.clone(),
        None => binding.clone(),
    };
    let mut reference = Reference::new(
        SymbolKind::Import,
        binding,
        RefLevel::Definition,
        name.range.clone(),
        stmt_range.clone(),
    );
    reference.module = Some(module);
    reference
}

fn import_module_of(name: &str, prior: &ReferenceSet) -> Option<String> {
    prior
        .items()
        .iter()
        .rev()
        .find(|r| r.kind == SymbolKind::Import && r.name == name)
        .and_then(|r| r.module.clone())
}

fn inferred_type_of(name: &str, prior: &ReferenceSet) -> Option<String> {
    prior
        .items()
        .iter()
        .rev()
        .find(|r| r.name == name && r.level != RefLevel::Use && r.inferred_type.is_some())
        .and_then(|r| r.inferred_type.clone())
}

fn import_modules_providing(name: &str, prior: &ReferenceSet) -> Vec<String> {
    prior
        .items()
        .iter()
        .rev()
        .filter(|r| r.kind == SymbolKind::Import && (r.name == name || r.name == "*"))
        .filter_map(|r| r.module.clone())
        .collect()
}

/// Names bound by the statements of one function body: parameters aside,
/// anything assigned, imported, or defined anywhere in the body, walking
/// into compound statements but not into nested scopes. `global` and
/// `nonlocal` declarations lift names back out.
fn collect_bound_names(
    statements: &[Statement],
    bound: &mut HashSet<String>,
    declared_outer: &mut HashSet<String>,
) {
    for statement in statements {
        match &statement.kind {
            StatementKind::Assign { targets, .. } | StatementKind::Delete { targets } => {
                for target in targets {
                    collect_target_names(target, bound);
                }
            }
            StatementKind::Import { names } => {
                for name in names {
                    bound.insert(name.binding_name().to_string());
                }
            }
            StatementKind::FromImport { names, .. } => {
                for name in names {
                    bound.insert(name.binding_name().to_string());
                }
            }
            StatementKind::FunctionDef { name, .. } | StatementKind::ClassDef { name, .. } => {
                bound.insert(name.clone());
            }
            StatementKind::If { body, orelse, .. } => {
                collect_bound_names(body, bound, declared_outer);
                if let Some(chained) = orelse {
                    collect_bound_names(std::slice::from_ref(chained), bound, declared_outer);
                }
            }
            StatementKind::While { body, orelse, .. } => {
                collect_bound_names(body, bound, declared_outer);
                collect_bound_names(orelse, bound, declared_outer);
            }
            StatementKind::For {
                targets,
                body,
                orelse,
                ..
            } => {
                for target in targets {
                    collect_target_names(target, bound);
                }
                collect_bound_names(body, bound, declared_outer);
                collect_bound_names(orelse, bound, declared_outer);
            }
            StatementKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_bound_names(body, bound, declared_outer);
                collect_bound_names(handlers, bound, declared_outer);
                collect_bound_names(orelse, bound, declared_outer);
                collect_bound_names(finalbody, bound, declared_outer);
            }
            StatementKind::ExceptHandler { alias, body, .. } => {
                if let Some(alias) = alias {
                    bound.insert(alias.clone());
                }
                collect_bound_names(body, bound, declared_outer);
            }
            StatementKind::With { items, body } => {
                for item in items {
                    if let Some(alias) = &item.alias {
                        collect_target_names(alias, bound);
                    }
                }
                collect_bound_names(body, bound, declared_outer);
            }
            StatementKind::Global { names } | StatementKind::Nonlocal { names } => {
                declared_outer.extend(names.iter().cloned());
            }
            _ => {}
        }
    }
}

fn collect_target_names(target: &Expr, names: &mut HashSet<String>) {
    match &target.kind {
        ExprKind::Name(name) => {
            names.insert(name.clone());
        }
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            for item in items {
                collect_target_names(item, names);
            }
        }
        ExprKind::Starred(inner) => collect_target_names(inner, names),
        // Attribute and subscript targets mutate an existing binding; they
        // never make the base local.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn first_statement(source: &str) -> Statement {
        parse(source).unwrap().code.into_iter().next().unwrap()
    }

    fn def_refs(source: &str) -> Vec<Reference> {
        let analyzer = DataflowAnalyzer::new();
        let stmt = first_statement(source);
        analyzer.get_defs(&stmt, &ReferenceSet::new()).into_iter().collect()
    }

    fn use_names(source: &str) -> Vec<String> {
        let analyzer = DataflowAnalyzer::new();
        let stmt = first_statement(source);
        analyzer
            .get_uses(&stmt)
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    #[test]
    fn assignment_defines_augmented_updates() {
        let defs = def_refs("a = 1\n");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "a");
        assert_eq!(defs[0].kind, SymbolKind::Variable);
        assert_eq!(defs[0].level, RefLevel::Definition);

        let defs = def_refs("a += 1\n");
        assert_eq!(defs[0].level, RefLevel::Update);
    }

    #[test]
    fn subscript_and_attribute_targets_update_the_base() {
        let defs = def_refs("d['a'] = 1\n");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "d");
        assert_eq!(defs[0].level, RefLevel::Update);

        let defs = def_refs("obj.a = 1\n");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "obj");
        assert_eq!(defs[0].level, RefLevel::Update);
    }

    #[test]
    fn imports_define_their_bindings() {
        let defs = def_refs("import pandas\n");
        assert_eq!(defs[0].kind, SymbolKind::Import);
        assert_eq!(defs[0].name, "pandas");
        assert_eq!(defs[0].module.as_deref(), Some("pandas"));

        let defs = def_refs("from pandas import load_csv\n");
        assert_eq!(defs[0].kind, SymbolKind::Import);
        assert_eq!(defs[0].name, "load_csv");
        assert_eq!(defs[0].module.as_deref(), Some("pandas"));
    }

    #[test]
    fn def_and_class_span_their_whole_body() {
        let defs = def_refs("def func():\n    return 0\n");
        assert_eq!(defs[0].kind, SymbolKind::Function);
        assert_eq!(defs[0].name, "func");
        assert_eq!(defs[0].location.first_line, 1);
        assert_eq!(defs[0].location.last_line, 2);

        let defs = def_refs("class C(object):\n    def __init__(self):\n        pass\n");
        assert_eq!(defs[0].kind, SymbolKind::Class);
        assert_eq!(defs[0].name, "C");
        assert_eq!(defs[0].location.last_line, 3);
    }

    #[test]
    fn magic_annotation_declares_statement_relative_defs() {
        let source = "\"\"\"defs: [{ \"name\": \"a\", \"pos\": [[0, 0], [0, 11]] }]\"\"\"%some_magic\n";
        let defs = def_refs(source);
        assert_eq!(defs[0].kind, SymbolKind::Magic);
        assert_eq!(defs[0].name, "a");
        assert_eq!(defs[0].location, SourceRange::new(1, 0, 1, 11));
    }

    #[test]
    fn magic_annotation_offsets_follow_the_statement_line() {
        let analyzer = DataflowAnalyzer::new();
        let module = parse(
            "# this is an empty line\n\"\"\"defs: [{ \"name\": \"a\", \"pos\": [[0, 0], [0, 11]] }]\"\"\"%some_magic\n",
        )
        .unwrap();
        let defs = analyzer.get_defs(&module.code[0], &ReferenceSet::new());
        assert_eq!(defs.items()[0].location, SourceRange::new(2, 0, 2, 11));
    }

    #[test]
    fn unknown_call_updates_every_simple_argument() {
        let defs = def_refs("func(a, b, c)\n");
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(defs.len(), 3);
        assert!(names.contains(&"a") && names.contains(&"b") && names.contains(&"c"));
        assert!(defs.iter().all(|d| d.level == RefLevel::Update));
    }

    #[test]
    fn unknown_method_updates_the_receiver() {
        let defs = def_refs("obj.func()\n");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "obj");
        assert_eq!(defs[0].level, RefLevel::Update);
    }

    #[test]
    fn chained_call_binds_nothing() {
        assert!(def_refs("func().func()\n").is_empty());
        assert!(def_refs("a + func()\n").is_empty());
    }

    #[test]
    fn spec_silences_conservative_argument_updates() {
        let table = SpecTable::from_json(r#"{"__builtins__": {"functions": ["func"]}}"#).unwrap();
        let analyzer = DataflowAnalyzer::with_specs(table);
        let stmt = first_statement("func(a, b, c)\n");
        assert!(analyzer.get_defs(&stmt, &ReferenceSet::new()).is_empty());
    }

    #[test]
    fn typed_receiver_resolves_method_specs() {
        let table = SpecTable::from_json(r#"{"__builtins__": {"types": {"C": {"methods": ["m"]}}}}"#)
            .unwrap();
        let analyzer = DataflowAnalyzer::with_specs(table);
        let module = parse("x = C()\nx.m()\n").unwrap();

        let mut refs = ReferenceSet::new();
        for stmt in &module.code {
            let defs = analyzer.get_defs(stmt, &refs);
            refs = refs.union(&defs);
        }
        // The constructor defines x; the spec'd method touches nothing.
        assert_eq!(refs.len(), 1);
        assert_eq!(refs.items()[0].name, "x");
        assert_eq!(refs.items()[0].level, RefLevel::Definition);
        assert_eq!(refs.items()[0].inferred_type.as_deref(), Some("__builtins__.C"));
    }

    #[test]
    fn untyped_receiver_falls_back_to_receiver_update() {
        let table = SpecTable::from_json(r#"{"__builtins__": {}}"#).unwrap();
        let analyzer = DataflowAnalyzer::with_specs(table);
        let module = parse("x = C()\nx.m()\n").unwrap();

        let mut refs = ReferenceSet::new();
        for stmt in &module.code {
            let defs = analyzer.get_defs(stmt, &refs);
            refs = refs.union(&defs);
        }
        assert_eq!(refs.len(), 2);
        assert_eq!(refs.items()[1].name, "x");
        assert_eq!(refs.items()[1].level, RefLevel::Update);
    }

    #[test]
    fn constructor_results_carry_their_type_forward() {
        let table = SpecTable::from_json(
            r#"{
                "__builtins__": {
                    "types": {"C": {"methods": [{"name": "m", "reads": [], "updates": [0]}]}},
                    "functions": [{"name": "C", "returns": "C"}]
                }
            }"#,
        )
        .unwrap();
        let analyzer = DataflowAnalyzer::with_specs(table);
        let stmt = first_statement("x = C()\n");
        let defs = analyzer.get_defs(&stmt, &ReferenceSet::new());
        assert_eq!(defs.len(), 1);
        assert_eq!(defs.items()[0].inferred_type.as_deref(), Some("__builtins__.C"));
    }

    #[test]
    fn uses_cover_call_targets_and_receivers() {
        assert!(use_names("func()\n").contains(&"func".to_string()));
        assert!(use_names("obj.func()\n").contains(&"obj".to_string()));
        assert!(use_names("x -= 1\n").contains(&"x".to_string()));
    }

    #[test]
    fn assignment_target_bases_are_not_uses() {
        assert!(!use_names("a.prop = 3\n").contains(&"a".to_string()));
        let names = use_names("d[k] = v\n");
        assert!(names.contains(&"k".to_string()));
        assert!(names.contains(&"v".to_string()));
        assert!(!names.contains(&"d".to_string()));
    }

    #[test]
    fn function_scope_screens_local_bindings() {
        let names = use_names("def func(arg):\n    print(arg)\n    var = 1\n    print(var)\n");
        assert!(!names.contains(&"arg".to_string()));
        assert!(!names.contains(&"var".to_string()));
        assert!(names.contains(&"print".to_string()));

        let names = use_names("def func(arg):\n    print(a)\n");
        assert!(names.contains(&"a".to_string()));
    }

    #[test]
    fn nested_class_scopes_leak_unbound_names() {
        let names = use_names(
            "class Bar():\n  class Baz():\n    class Qux():\n      def quux(self):\n         func()\n         self.data = a\n",
        );
        assert!(names.contains(&"func".to_string()));
        assert!(names.contains(&"a".to_string()));
        assert!(!names.contains(&"self".to_string()));
    }

    #[test]
    fn comprehension_targets_stay_local() {
        let names = use_names("{k: v for (k, v) in d.items()}\n");
        assert!(names.contains(&"d".to_string()));
        assert!(!names.contains(&"k".to_string()));
        assert!(!names.contains(&"v".to_string()));
    }

    #[test]
    fn global_declarations_unscreen_names() {
        let names = use_names("def bump():\n    global counter\n    counter = counter + 1\n");
        assert!(names.contains(&"counter".to_string()));
    }
}
