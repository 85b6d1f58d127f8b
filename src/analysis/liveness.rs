//! Free-variable and live-out analysis for a range of a function body.

use super::{is_constant_name, BUILTIN_NAMES};
use crate::syntax::{Arg, Expr, FunctionDef, Stmt, StmtKind};
use std::collections::HashSet;

/// A name the generated script needs from outside its own body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Required {
    /// A plain local, supplied as a positional argument.
    Local(String),
    /// An attribute of the receiving instance (`self.name`).
    Attribute(String),
    /// A method of the receiving instance called as `self.name(...)`.
    Helper(String),
}

impl Required {
    /// The bare name, without `self.`.
    pub fn name(&self) -> &str {
        match self {
            Required::Local(name) | Required::Attribute(name) | Required::Helper(name) => name,
        }
    }
}

/// Inclusive range of statement lines, counted from the `def` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    /// First line, inclusive.
    pub min: usize,
    /// Last line, inclusive.
    pub max: usize,
}

impl LineRange {
    /// The whole body of `def`.
    pub fn whole(def: &FunctionDef) -> Self {
        Self {
            min: 1,
            max: def.end_line.max(1),
        }
    }

    /// True if `line` falls inside the range.
    pub fn contains(&self, line: usize) -> bool {
        self.min <= line && line <= self.max
    }

    /// True if every top-level statement of `def` falls inside the range.
    pub fn covers(&self, def: &FunctionDef) -> bool {
        def.body.iter().all(|stmt| self.contains(stmt.line))
    }

    /// Top-level statements of `def` inside the range.
    pub fn select<'a>(&self, def: &'a FunctionDef) -> impl Iterator<Item = &'a Stmt> + 'a {
        let range = *self;
        def.body.iter().filter(move |stmt| range.contains(stmt.line))
    }
}

/// Names flowing into and out of a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Liveness {
    /// Parameters in declared order, then other free names in first-use order.
    pub inputs: Vec<Required>,
    /// Names assigned in the range and read after it, in first-use order.
    pub outputs: Vec<String>,
}

/// Positional parameters of `def` that the caller supplies: everything but
/// `self` and plain-name remote objects.
pub fn input_params(def: &FunctionDef, remote_objects: &[Expr]) -> Vec<String> {
    def.params
        .iter()
        .enumerate()
        .filter(|(i, name)| !(*i == 0 && name.as_str() == "self"))
        .filter(|(_, name)| !remote_objects.iter().any(|r| matches!(r, Expr::Name(n) if n == *name)))
        .map(|(_, name)| name.clone())
        .collect()
}

/// Computes the inputs and outputs of the statements of `def` in `range`.
pub fn analyze(def: &FunctionDef, remote_objects: &[Expr], range: LineRange) -> Liveness {
    let params = input_params(def, remote_objects);
    let mut collector = Collector::new(remote_objects);
    for param in &params {
        collector.require(Required::Local(param.clone()));
        collector.defined.insert(param.clone());
    }
    // `self` is bound by the script preamble.
    collector.defined.insert("self".to_string());

    let selected: Vec<Stmt> = range.select(def).cloned().collect();
    collector.stmts(&selected);

    let outputs = if range.covers(def) {
        Vec::new()
    } else {
        let assigned = assigned_names(&selected);
        let after: Vec<Stmt> = def
            .body
            .iter()
            .filter(|stmt| stmt.line > range.max)
            .cloned()
            .collect();
        let mut reads = Collector::new(remote_objects);
        reads.stmts(&after);
        reads
            .inputs
            .into_iter()
            .filter_map(|r| match r {
                Required::Local(name) if assigned.contains(&name) => Some(name),
                _ => None,
            })
            .collect()
    };

    Liveness {
        inputs: collector.inputs,
        outputs,
    }
}

/// Plain names bound by assignments and loop targets, in first-appearance
/// order.
pub fn assigned_names(stmts: &[Stmt]) -> Vec<String> {
    fn target(expr: &Expr, out: &mut Vec<String>) {
        match expr {
            Expr::Name(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Tuple(items) | Expr::List(items) => items.iter().for_each(|e| target(e, out)),
            _ => {}
        }
    }

    fn walk(stmts: &[Stmt], out: &mut Vec<String>) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Assign { targets, .. } => targets.iter().for_each(|t| target(t, out)),
                StmtKind::AugAssign { target: t, .. } => target(t, out),
                StmtKind::For { target: t, body, .. } => {
                    target(t, out);
                    walk(body, out);
                }
                StmtKind::If { body, orelse, .. } => {
                    walk(body, out);
                    walk(orelse, out);
                }
                _ => {}
            }
        }
    }

    let mut out = Vec::new();
    walk(stmts, &mut out);
    out
}

/// Walks statements in execution order, recording names read before any
/// definition.
struct Collector<'a> {
    remote_objects: &'a [Expr],
    defined: HashSet<String>,
    defined_attributes: HashSet<String>,
    inputs: Vec<Required>,
    seen: HashSet<Required>,
}

impl<'a> Collector<'a> {
    fn new(remote_objects: &'a [Expr]) -> Self {
        Self {
            remote_objects,
            defined: HashSet::new(),
            defined_attributes: HashSet::new(),
            inputs: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn require(&mut self, required: Required) {
        if self.seen.insert(required.clone()) {
            self.inputs.push(required);
        }
    }

    fn is_remote(&self, expr: &Expr) -> bool {
        self.remote_objects.iter().any(|r| r == expr)
    }

    fn read(&mut self, name: &str) {
        if self.defined.contains(name) || BUILTIN_NAMES.contains(&name) || is_constant_name(name) {
            return;
        }
        self.require(Required::Local(name.to_string()));
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                self.expr(value);
                targets.iter().for_each(|t| self.target(t));
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
                self.target(target);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            StmtKind::If { test, body, orelse } => {
                self.expr(test);
                self.stmts(body);
                self.stmts(orelse);
            }
            StmtKind::For { target, iter, body } => {
                self.expr(iter);
                self.target(target);
                self.stmts(body);
            }
            StmtKind::Expr(value) => self.expr(value),
            StmtKind::Print(values) => values.iter().for_each(|v| self.expr(v)),
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn target(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) => {
                self.defined.insert(name.clone());
            }
            Expr::Attribute { value, attr } if **value == Expr::name("self") => {
                self.defined_attributes.insert(attr.clone());
            }
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            Expr::Tuple(items) | Expr::List(items) => items.iter().for_each(|t| self.target(t)),
            other => self.expr(other),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        if self.is_remote(expr) || is_constant_reference(expr) {
            return;
        }
        match expr {
            Expr::Name(name) => self.read(name),
            Expr::Literal(_) => {}
            Expr::List(items) | Expr::Tuple(items) => items.iter().for_each(|e| self.expr(e)),
            Expr::Dict(pairs) => {
                for (key, value) in pairs {
                    self.expr(key);
                    self.expr(value);
                }
            }
            Expr::Compare {
                left, comparators, ..
            } => {
                self.expr(left);
                comparators.iter().for_each(|e| self.expr(e));
            }
            Expr::BoolOp { values, .. } => values.iter().for_each(|e| self.expr(e)),
            Expr::UnaryOp { operand, .. } => self.expr(operand),
            Expr::BinOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Call { func, args } => {
                self.call_target(func);
                for arg in args {
                    match arg {
                        Arg::Positional(e) | Arg::Keyword(_, e) | Arg::Star(e) | Arg::DoubleStar(e) => {
                            self.expr(e)
                        }
                    }
                }
            }
            Expr::Attribute { value, attr } => {
                if **value == Expr::name("self") {
                    if !self.defined_attributes.contains(attr) {
                        self.require(Required::Attribute(attr.clone()));
                    }
                } else {
                    self.expr(value);
                }
            }
            Expr::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part);
                }
            }
        }
    }

    fn call_target(&mut self, func: &Expr) {
        match func {
            // Builtins; other bare function names are rejected by the translator.
            Expr::Name(_) => {}
            Expr::Attribute { value, attr } => {
                if self.is_remote(value) {
                    return;
                }
                match value.as_ref() {
                    Expr::Name(base) if base == "self" => self.require(Required::Helper(attr.clone())),
                    Expr::Name(base) if base == "time" && attr == "time" => {}
                    other => self.expr(other),
                }
            }
            other => self.expr(other),
        }
    }
}

/// True for `FOO` and `namespace.FOO`, which are inlined at translation time.
fn is_constant_reference(expr: &Expr) -> bool {
    match expr.dotted_path() {
        Some(path) => {
            path[0] != "self" && path.last().is_some_and(|last| is_constant_name(last))
        }
        None => false,
    }
}
