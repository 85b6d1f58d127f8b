//! Syntax tree for one function of the supported Python subset.
//!
//! Expressions carry no positions, so derived equality is structural: two
//! receivers such as `self.db` compare equal wherever they appear.

use std::fmt;

/// A parsed `def`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Function name.
    pub name: String,
    /// Parameter names in declared order.
    pub params: Vec<String>,
    /// Body statements.
    pub body: Vec<Stmt>,
    /// Last source line of the body, relative to the `def` line (line 1).
    pub end_line: usize,
}

impl FunctionDef {
    /// True if the first parameter is `self`.
    pub fn is_method(&self) -> bool {
        self.params.first().map(String::as_str) == Some("self")
    }
}

/// A statement and the line it starts on (the `def` line is line 1).
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Source line relative to the `def` line.
    pub line: usize,
    /// The statement itself.
    pub kind: StmtKind,
}

/// Statement forms of the supported subset.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `a = b = value`
    Assign {
        /// Assignment targets, left to right.
        targets: Vec<Expr>,
        /// Assigned value.
        value: Expr,
    },
    /// `target op= value`
    AugAssign {
        /// Assignment target.
        target: Expr,
        /// Operator applied to the old value.
        op: BinOp,
        /// Right-hand operand.
        value: Expr,
    },
    /// `return` with an optional value.
    Return(Option<Expr>),
    /// `if`, with `elif` chains nested in `orelse`.
    If {
        /// Condition.
        test: Expr,
        /// Statements run when the condition holds.
        body: Vec<Stmt>,
        /// Statements run otherwise.
        orelse: Vec<Stmt>,
    },
    /// `for target in iter`
    For {
        /// Loop variable.
        target: Expr,
        /// Iterated value.
        iter: Expr,
        /// Loop body.
        body: Vec<Stmt>,
    },
    /// An expression evaluated for its effect.
    Expr(Expr),
    /// Python 2 `print` statement, lowered to a store log call.
    Print(Vec<Expr>),
    /// `pass`
    Pass,
    /// `break`
    Break,
    /// `continue`
    Continue,
}

/// Expression forms of the supported subset.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A bare identifier.
    Name(String),
    /// A constant.
    Literal(Literal),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `a, b` or `(a, b)`
    Tuple(Vec<Expr>),
    /// `{k: v}`
    Dict(Vec<(Expr, Expr)>),
    /// A comparison chain such as `a < b <= c`.
    Compare {
        /// Leftmost operand.
        left: Box<Expr>,
        /// Operators, one per comparator.
        ops: Vec<CmpOp>,
        /// Remaining operands.
        comparators: Vec<Expr>,
    },
    /// `a and b and c`
    BoolOp {
        /// The operator shared by all operands.
        op: BoolOp,
        /// Operands, evaluated left to right.
        values: Vec<Expr>,
    },
    /// A prefix operator.
    UnaryOp {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// A binary arithmetic operator.
    BinOp {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinOp,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `func(args)`
    Call {
        /// Called expression.
        func: Box<Expr>,
        /// Arguments in source order.
        args: Vec<Arg>,
    },
    /// `value.attr`
    Attribute {
        /// Receiver.
        value: Box<Expr>,
        /// Attribute name.
        attr: String,
    },
    /// `value[index]`
    Subscript {
        /// Subscripted value.
        value: Box<Expr>,
        /// Index or slice.
        index: Box<Expr>,
    },
    /// `lower:upper:step`, only valid as a subscript index.
    Slice {
        /// Start bound.
        lower: Option<Box<Expr>>,
        /// End bound.
        upper: Option<Box<Expr>>,
        /// Step.
        step: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Shorthand for [`Expr::Name`].
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    /// Shorthand for [`Expr::Attribute`].
    pub fn attribute(value: Expr, attr: impl Into<String>) -> Self {
        Expr::Attribute {
            value: Box::new(value),
            attr: attr.into(),
        }
    }

    /// Returns the dotted path of a name or attribute chain (`self.db`).
    pub fn dotted_path(&self) -> Option<Vec<&str>> {
        match self {
            Expr::Name(name) => Some(vec![name.as_str()]),
            Expr::Attribute { value, attr } => {
                let mut path = value.dotted_path()?;
                path.push(attr.as_str());
                Some(path)
            }
            _ => None,
        }
    }

    /// Parses a dotted path such as `self.db` back into an expression.
    pub fn from_dotted(path: &str) -> Option<Self> {
        let mut parts = path.split('.');
        let first = parts.next().filter(|p| !p.is_empty())?;
        let mut expr = Expr::name(first);
        for part in parts {
            if part.is_empty() {
                return None;
            }
            expr = Expr::attribute(expr, part);
        }
        Some(expr)
    }
}

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// String literal, escapes resolved.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// `True` or `False`.
    Bool(bool),
    /// `None`
    None,
}

/// A call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// `f(x)`
    Positional(Expr),
    /// `f(k=x)`
    Keyword(String, Expr),
    /// `f(*x)`
    Star(Expr),
    /// `f(**x)`
    DoubleStar(Expr),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtE,
    /// `>`
    Gt,
    /// `>=`
    GtE,
    /// `is`
    Is,
    /// `is not`
    IsNot,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

/// Short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// `and`
    And,
    /// `or`
    Or,
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `not`
    Not,
    /// `-`
    USub,
    /// `+`
    UAdd,
    /// `~`
    Invert,
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mult,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

impl CmpOp {
    /// Source spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}

impl BinOp {
    /// Source spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mult => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

impl UnaryOp {
    /// Source spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "not ",
            UnaryOp::USub => "-",
            UnaryOp::UAdd => "+",
            UnaryOp::Invert => "~",
        }
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Renders the expression back as Python source, for diagnostics.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Name(name) => write!(f, "{}", name),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::Dict(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                write!(f, "{}", left)?;
                for (op, rhs) in ops.iter().zip(comparators) {
                    write!(f, " {} {}", op.symbol(), rhs)?;
                }
                Ok(())
            }
            Expr::BoolOp { op, values } => {
                let sep = match op {
                    BoolOp::And => " and ",
                    BoolOp::Or => " or ",
                };
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", sep)?;
                    }
                    write!(f, "{}", value)?;
                }
                Ok(())
            }
            Expr::UnaryOp { op, operand } => write!(f, "{}{}", op.symbol(), operand),
            Expr::BinOp { left, op, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Call { func, args } => {
                write!(f, "{}(", func)?;
                write_joined(f, args)?;
                write!(f, ")")
            }
            Expr::Attribute { value, attr } => write!(f, "{}.{}", value, attr),
            Expr::Subscript { value, index } => write!(f, "{}[{}]", value, index),
            Expr::Slice { lower, upper, step } => {
                if let Some(lower) = lower {
                    write!(f, "{}", lower)?;
                }
                write!(f, ":")?;
                if let Some(upper) = upper {
                    write!(f, "{}", upper)?;
                }
                if let Some(step) = step {
                    write!(f, ":{}", step)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{:?}", x),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::None => write!(f, "None"),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Positional(e) => write!(f, "{}", e),
            Arg::Keyword(name, e) => write!(f, "{}={}", name, e),
            Arg::Star(e) => write!(f, "*{}", e),
            Arg::DoubleStar(e) => write!(f, "**{}", e),
        }
    }
}

/// Describes a statement for diagnostics.
impl fmt::Display for StmtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    write!(f, "{} = ", target)?;
                }
                write!(f, "{}", value)
            }
            StmtKind::AugAssign { target, op, value } => {
                write!(f, "{} {}= {}", target, op.symbol(), value)
            }
            StmtKind::Return(Some(value)) => write!(f, "return {}", value),
            StmtKind::Return(None) => write!(f, "return"),
            StmtKind::If { test, .. } => write!(f, "if {}: ...", test),
            StmtKind::For { target, iter, .. } => write!(f, "for {} in {}: ...", target, iter),
            StmtKind::Expr(e) => write!(f, "{}", e),
            StmtKind::Print(values) => {
                write!(f, "print(")?;
                write_joined(f, values)?;
                write!(f, ")")
            }
            StmtKind::Pass => write!(f, "pass"),
            StmtKind::Break => write!(f, "break"),
            StmtKind::Continue => write!(f, "continue"),
        }
    }
}
