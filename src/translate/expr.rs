//! Expression translation.

use super::context::TranslationContext;
use super::prelude::{lua_float, lua_name, lua_string};
use crate::analysis::is_constant_name;
use crate::error::{Error, Result};
use crate::syntax::{Arg, BinOp, BoolOp, CmpOp, Expr, Literal, UnaryOp};
use crate::value::{Value, DICT_MARKER};

/// What a translated expression is known to evaluate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaType {
    /// A number.
    Number,
    /// A string.
    Text,
    /// A boolean.
    Boolean,
    /// A `start, last, step` triple, only valid as a `for` iterable.
    Range,
    /// Emits no code (`client.pipe()`).
    Nothing,
    /// Decided at run time.
    Unknown,
}

/// A translated expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuaExpr {
    /// Lua source.
    pub code: String,
    /// Static type, when known.
    pub ty: LuaType,
    /// Safe to embed as an operand without parentheses.
    pub atomic: bool,
    /// A function call that is valid as a statement on its own.
    pub call: bool,
}

impl LuaExpr {
    fn atom(code: impl Into<String>, ty: LuaType) -> Self {
        Self {
            code: code.into(),
            ty,
            atomic: true,
            call: false,
        }
    }

    fn compound(code: impl Into<String>, ty: LuaType) -> Self {
        Self {
            code: code.into(),
            ty,
            atomic: false,
            call: false,
        }
    }

    fn call(code: impl Into<String>, ty: LuaType) -> Self {
        Self {
            code: code.into(),
            ty,
            atomic: true,
            call: true,
        }
    }

    fn nothing() -> Self {
        Self::atom("", LuaType::Nothing)
    }

    /// The code, parenthesised unless atomic.
    pub fn wrapped(&self) -> String {
        if self.atomic {
            self.code.clone()
        } else {
            format!("({})", self.code)
        }
    }
}

const TIME_EXPR: &str =
    "(function() local t = redis.call('TIME') return tonumber(t[1]) + tonumber(t[2]) / 1000000 end)()";

/// Translates an expression that must produce a value.
pub fn value_expr(expr: &Expr, ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    let out = translate_expr(expr, ctx)?;
    match out.ty {
        LuaType::Range => Err(ctx.untranslatable(format!("`{}` outside a for loop", expr))),
        LuaType::Nothing => Err(ctx.untranslatable(format!("`{}` used as a value", expr))),
        _ => Ok(out),
    }
}

/// Translates any expression, including ranges and pipeline markers.
pub fn translate_expr(expr: &Expr, ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    match expr {
        Expr::Name(name) => name_expr(name, ctx),
        Expr::Literal(lit) => Ok(literal(lit)),
        Expr::List(items) | Expr::Tuple(items) => {
            let items = items
                .iter()
                .map(|item| value_expr(item, ctx).map(|e| e.code))
                .collect::<Result<Vec<_>>>()?;
            Ok(LuaExpr::compound(format!("{{{}}}", items.join(", ")), LuaType::Unknown))
        }
        Expr::Dict(pairs) => {
            let mut entries = vec![format!("[{}] = true", lua_string(DICT_MARKER))];
            for (key, value) in pairs {
                let key = value_expr(key, ctx)?;
                let value = value_expr(value, ctx)?;
                entries.push(format!("[{}] = {}", key.code, value.code));
            }
            Ok(LuaExpr::atom(format!("({{{}}})", entries.join(", ")), LuaType::Unknown))
        }
        Expr::Compare {
            left,
            ops,
            comparators,
        } => {
            let (op, right) = match (ops.as_slice(), comparators.as_slice()) {
                ([op], [right]) => (*op, right),
                _ => return Err(ctx.untranslatable(format!("chained comparison `{}`", expr))),
            };
            let symbol = match op {
                CmpOp::Eq | CmpOp::Is => "==",
                CmpOp::NotEq | CmpOp::IsNot => "~=",
                CmpOp::Lt => "<",
                CmpOp::LtE => "<=",
                CmpOp::Gt => ">",
                CmpOp::GtE => ">=",
                CmpOp::In | CmpOp::NotIn => {
                    return Err(ctx.untranslatable(format!("`{}` comparison", op.symbol())))
                }
            };
            let left = value_expr(left, ctx)?;
            let right = value_expr(right, ctx)?;
            Ok(LuaExpr::compound(
                format!("{} {} {}", left.wrapped(), symbol, right.wrapped()),
                LuaType::Boolean,
            ))
        }
        Expr::BoolOp { op, values } => bool_op(*op, values, ctx),
        Expr::UnaryOp { op, operand } => {
            let operand_expr = value_expr(operand, ctx)?;
            match op {
                UnaryOp::USub => Ok(LuaExpr::compound(
                    format!("-{}", operand_expr.wrapped()),
                    LuaType::Number,
                )),
                UnaryOp::UAdd => Ok(operand_expr),
                UnaryOp::Not => Ok(LuaExpr::atom(
                    format!("(not __TRUE({}))", operand_expr.code),
                    LuaType::Boolean,
                )),
                UnaryOp::Invert => Err(ctx.untranslatable(format!("bitwise inversion `{}`", expr))),
            }
        }
        Expr::BinOp { left, op, right } => bin_op(left, *op, right, ctx),
        Expr::Call { func, args } => call(func, args, ctx),
        Expr::Attribute { value, attr } => attribute(expr, value, attr, ctx),
        Expr::Subscript { value, index } => subscript(value, index, ctx),
        Expr::Slice { .. } => Err(ctx.untranslatable(format!("slice `{}`", expr))),
    }
}

fn name_expr(name: &str, ctx: &TranslationContext<'_>) -> Result<LuaExpr> {
    if ctx.remote_objects.iter().any(|r| matches!(r, Expr::Name(n) if n == name)) {
        return Err(ctx.untranslatable(format!("remote object `{}` used as a value", name)));
    }
    if is_constant_name(name) && !ctx.locals.contains(name) {
        return ctx
            .environment
            .get(name)
            .map(constant)
            .ok_or_else(|| ctx.untranslatable(format!("unknown constant `{}`", name)));
    }
    Ok(LuaExpr::atom(lua_name(name), LuaType::Unknown))
}

fn literal(lit: &Literal) -> LuaExpr {
    match lit {
        Literal::Str(s) => LuaExpr::atom(lua_string(s), LuaType::Text),
        Literal::Int(i) => number(i.to_string()),
        Literal::Float(x) => number(lua_float(*x)),
        Literal::Bool(b) => LuaExpr::atom(b.to_string(), LuaType::Boolean),
        Literal::None => LuaExpr::atom("nil", LuaType::Unknown),
    }
}

fn number(code: String) -> LuaExpr {
    if code.starts_with('-') {
        LuaExpr::compound(code, LuaType::Number)
    } else {
        LuaExpr::atom(code, LuaType::Number)
    }
}

/// Inlines a constant from the environment.
fn constant(value: &Value) -> LuaExpr {
    match value {
        Value::Int(_) | Value::Float(_) => number(value_code(value)),
        Value::Str(_) => LuaExpr::atom(value_code(value), LuaType::Text),
        Value::Bool(_) => LuaExpr::atom(value_code(value), LuaType::Boolean),
        Value::List(_) => LuaExpr::compound(value_code(value), LuaType::Unknown),
        Value::None | Value::Map(_) => LuaExpr::atom(value_code(value), LuaType::Unknown),
    }
}

fn value_code(value: &Value) -> String {
    match value {
        Value::None => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(x) => lua_float(*x),
        Value::Str(s) => lua_string(s),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(value_code).collect();
            format!("{{{}}}", items.join(", "))
        }
        Value::Map(map) => {
            let mut entries = vec![format!("[{}] = true", lua_string(DICT_MARKER))];
            entries.extend(
                map.iter()
                    .map(|(k, v)| format!("[{}] = {}", lua_string(k), value_code(v))),
            );
            format!("({{{}}})", entries.join(", "))
        }
    }
}

/// `self.attr`, or the bracket form when `attr` is not a valid Lua field name.
pub fn self_field(attr: &str) -> String {
    if lua_name(attr) == attr {
        format!("self.{}", attr)
    } else {
        format!("self[{}]", lua_string(attr))
    }
}

fn attribute(expr: &Expr, value: &Expr, attr: &str, ctx: &TranslationContext<'_>) -> Result<LuaExpr> {
    if ctx.is_remote(expr) {
        return Err(ctx.untranslatable(format!("remote object `{}` used as a value", expr)));
    }
    if let Some(path) = expr.dotted_path() {
        if path[0] != "self" && is_constant_name(attr) {
            let key = path.join(".");
            return ctx
                .environment
                .get(&key)
                .map(constant)
                .ok_or_else(|| ctx.untranslatable(format!("unknown constant `{}`", key)));
        }
    }
    if *value == Expr::name("self") {
        return Ok(LuaExpr::atom(self_field(attr), LuaType::Unknown));
    }
    Err(ctx.untranslatable(format!("attribute access `{}`", expr)))
}

fn bool_op(op: BoolOp, values: &[Expr], ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    let helper = match op {
        BoolOp::And => "__AND",
        BoolOp::Or => "__OR",
    };
    let mut parts = Vec::with_capacity(values.len());
    let mut all_boolean = true;
    for (i, value) in values.iter().enumerate() {
        let value = value_expr(value, ctx)?;
        all_boolean &= value.ty == LuaType::Boolean;
        // Later operands are thunks so they are only evaluated when needed.
        if i == 0 {
            parts.push(value.code);
        } else {
            parts.push(format!("function() return {} end", value.code));
        }
    }
    let ty = if all_boolean {
        LuaType::Boolean
    } else {
        LuaType::Unknown
    };
    Ok(LuaExpr::call(format!("{}({})", helper, parts.join(", ")), ty))
}

fn bin_op(left: &Expr, op: BinOp, right: &Expr, ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    let l = value_expr(left, ctx)?;
    let r = value_expr(right, ctx)?;
    let arithmetic = |symbol: &str| {
        LuaExpr::compound(
            format!("{} {} {}", l.wrapped(), symbol, r.wrapped()),
            LuaType::Number,
        )
    };
    match op {
        BinOp::Add => {
            if l.ty == LuaType::Number || r.ty == LuaType::Number {
                Ok(arithmetic("+"))
            } else if l.ty == LuaType::Text || r.ty == LuaType::Text {
                Ok(LuaExpr::compound(
                    format!("{} .. {}", l.wrapped(), r.wrapped()),
                    LuaType::Text,
                ))
            } else {
                Ok(LuaExpr::call(
                    format!("__ADD({}, {})", l.code, r.code),
                    LuaType::Unknown,
                ))
            }
        }
        BinOp::Sub => Ok(arithmetic("-")),
        BinOp::Mult => Ok(arithmetic("*")),
        BinOp::Div => Ok(arithmetic("/")),
        BinOp::Pow => Ok(arithmetic("^")),
        BinOp::Mod if l.ty == LuaType::Text => Err(ctx.untranslatable("string formatting with `%`")),
        BinOp::Mod => Ok(arithmetic("%")),
        BinOp::FloorDiv => Ok(LuaExpr::call(
            format!("math.floor({} / {})", l.wrapped(), r.wrapped()),
            LuaType::Number,
        )),
    }
}

/// Integer literal value of `expr`, looking through unary signs.
fn int_literal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Literal(Literal::Int(i)) => Some(*i),
        Expr::UnaryOp {
            op: UnaryOp::USub,
            operand,
        } => int_literal(operand).and_then(i64::checked_neg),
        Expr::UnaryOp {
            op: UnaryOp::UAdd,
            operand,
        } => int_literal(operand),
        _ => None,
    }
}

/// True if `code` can be repeated as a subscript receiver.
fn is_simple_chain(code: &str) -> bool {
    !code.is_empty()
        && !code.starts_with(|c: char| c.is_ascii_digit())
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Index expression honouring the map marker: maps use the key as is,
/// sequences shift a zero-based index by one. `None` if a literal index
/// has no one-based counterpart.
fn marked_index(receiver: &str, index: &Expr, key: &LuaExpr) -> Option<String> {
    let position = match int_literal(index) {
        Some(-1) => format!("#{}", receiver),
        Some(i) if i < 0 => format!("#{} - {}", receiver, i.checked_add(1)?.checked_neg()?),
        Some(i) => i.checked_add(1)?.to_string(),
        None => format!("{} + 1", key.wrapped()),
    };
    Some(format!(
        "({}.{}) and ({}) or ({})",
        receiver, DICT_MARKER, key.code, position
    ))
}

fn out_of_range(value: &Expr, index: &Expr, ctx: &TranslationContext<'_>) -> Error {
    ctx.untranslatable(format!("index `{}[{}]` out of integer range", value, index))
}

fn subscript(value: &Expr, index: &Expr, ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    if let Expr::Slice { .. } = index {
        return Err(ctx.untranslatable(format!("slice `{}[{}]`", value, index)));
    }
    let receiver = value_expr(value, ctx)?;
    let key = value_expr(index, ctx)?;
    if is_simple_chain(&receiver.code) {
        let index = marked_index(&receiver.code, index, &key).ok_or_else(|| out_of_range(value, index, ctx))?;
        Ok(LuaExpr::atom(
            format!("{}[{}]", receiver.code, index),
            LuaType::Unknown,
        ))
    } else {
        // Bind the receiver once so it is evaluated a single time.
        let index = marked_index("__v", index, &key).ok_or_else(|| out_of_range(value, index, ctx))?;
        Ok(LuaExpr::atom(
            format!(
                "(function(__v) return __v[{}] end)({})",
                index, receiver.code
            ),
            LuaType::Unknown,
        ))
    }
}

/// Assignable place for `value[index]`.
pub fn subscript_place(value: &Expr, index: &Expr, ctx: &mut TranslationContext<'_>) -> Result<String> {
    let receiver = value_expr(value, ctx)?;
    if !is_simple_chain(&receiver.code) || matches!(index, Expr::Slice { .. }) {
        return Err(ctx.untranslatable(format!("assignment to `{}[{}]`", value, index)));
    }
    let key = value_expr(index, ctx)?;
    let position = marked_index(&receiver.code, index, &key).ok_or_else(|| out_of_range(value, index, ctx))?;
    Ok(format!("{}[{}]", receiver.code, position))
}

fn call(func: &Expr, args: &[Arg], ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    let mut positional = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Arg::Positional(expr) => positional.push(expr),
            other => {
                return Err(ctx.untranslatable(format!("argument `{}` in call to `{}`", other, func)))
            }
        }
    }

    match func {
        Expr::Attribute { value, attr } if ctx.is_remote(value) => {
            remote_call(value, attr, &positional, ctx)
        }
        Expr::Attribute { value, attr } if **value == Expr::name("self") => {
            let args = arg_codes(&positional, ctx)?;
            Ok(LuaExpr::call(
                format!("{}({})", self_field(attr), args.join(", ")),
                LuaType::Unknown,
            ))
        }
        Expr::Attribute { value, attr } if **value == Expr::name("time") && attr == "time" => {
            if !positional.is_empty() {
                return Err(ctx.untranslatable("`time.time()` with arguments"));
            }
            Ok(LuaExpr::atom(TIME_EXPR, LuaType::Number))
        }
        Expr::Attribute { value, attr } => method_call(value, attr, &positional, ctx),
        Expr::Name(name) => builtin_call(name, &positional, ctx),
        other => Err(ctx.untranslatable(format!("call of `{}`", other))),
    }
}

fn arg_codes(args: &[&Expr], ctx: &mut TranslationContext<'_>) -> Result<Vec<String>> {
    args.iter()
        .map(|arg| value_expr(arg, ctx).map(|e| e.code))
        .collect()
}

/// A primitive operation on a remote object.
fn remote_call(receiver: &Expr, method: &str, args: &[&Expr], ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    let key = lua_string(&receiver.to_string());
    match method {
        "pipe" | "pipeline" => Ok(LuaExpr::nothing()),
        "execute" => {
            ctx.uses_pipeline = true;
            Ok(LuaExpr::call(format!("__PIPE_GET({})", key), LuaType::Unknown))
        }
        _ => {
            let command = if method == "delete" { "del" } else { method };
            let mut call_args = vec![lua_string(command)];
            call_args.extend(arg_codes(args, ctx)?);
            Ok(LuaExpr::call(
                format!("__PIPE_ADD({}, redis.call({}))", key, call_args.join(", ")),
                LuaType::Unknown,
            ))
        }
    }
}

fn method_call(receiver: &Expr, method: &str, args: &[&Expr], ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    let target = value_expr(receiver, ctx)?;
    match (method, args) {
        ("append", [item]) => {
            let item = value_expr(item, ctx)?;
            Ok(LuaExpr::call(
                format!("table.insert({}, {})", target.code, item.code),
                LuaType::Unknown,
            ))
        }
        ("insert", [index, item]) => {
            let position = match int_literal(index) {
                Some(i) => i
                    .checked_add(1)
                    .ok_or_else(|| ctx.untranslatable(format!("`insert` position {} out of integer range", i)))?
                    .to_string(),
                None => format!("{} + 1", value_expr(index, ctx)?.wrapped()),
            };
            let item = value_expr(item, ctx)?;
            Ok(LuaExpr::call(
                format!("table.insert({}, {}, {})", target.code, position, item.code),
                LuaType::Unknown,
            ))
        }
        ("join", [items]) => {
            let items = value_expr(items, ctx)?;
            Ok(LuaExpr::call(
                format!("table.concat({}, {})", items.code, target.code),
                LuaType::Text,
            ))
        }
        ("replace", [old, new]) => {
            let old = value_expr(old, ctx)?;
            let new = value_expr(new, ctx)?;
            Ok(LuaExpr::call(
                format!("__REPLACE({}, {}, {})", target.code, old.code, new.code),
                LuaType::Text,
            ))
        }
        _ => Err(ctx.untranslatable(format!("method call `{}.{}()`", receiver, method))),
    }
}

fn builtin_call(name: &str, args: &[&Expr], ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    match (name, args) {
        ("int" | "float", [value]) => {
            let value = value_expr(value, ctx)?;
            Ok(LuaExpr::call(format!("tonumber({})", value.code), LuaType::Number))
        }
        ("str", [value]) => {
            let value = value_expr(value, ctx)?;
            Ok(LuaExpr::call(format!("tostring({})", value.code), LuaType::Text))
        }
        ("len", [value]) => {
            let value = value_expr(value, ctx)?;
            Ok(LuaExpr::call(format!("__LEN({})", value.code), LuaType::Number))
        }
        ("range" | "xrange", [stop]) => range(None, stop, None, ctx),
        ("range" | "xrange", [start, stop]) => range(Some(*start), stop, None, ctx),
        ("range" | "xrange", [start, stop, step]) => range(Some(*start), stop, Some(*step), ctx),
        _ => Err(ctx.untranslatable(format!("call to `{}` with {} arguments", name, args.len()))),
    }
}

/// Lowers `range` to the bounds of a counted loop. The stop bound is
/// exclusive in Python and inclusive in Lua.
fn range(start: Option<&Expr>, stop: &Expr, step: Option<&Expr>, ctx: &mut TranslationContext<'_>) -> Result<LuaExpr> {
    let start_code = match start {
        Some(start) => value_expr(start, ctx)?.code,
        None => "0".to_string(),
    };
    let stop_expr = value_expr(stop, ctx)?;
    let stop_literal = int_literal(stop);

    let (last, step_code) = match step.map(|s| (s, int_literal(s))) {
        None => (inclusive(stop_literal, &stop_expr, -1), "1".to_string()),
        Some((_, Some(0))) => return Err(ctx.untranslatable("`range` with a zero step")),
        Some((_, Some(step))) => {
            let adjust = if step > 0 { -1 } else { 1 };
            (inclusive(stop_literal, &stop_expr, adjust), step.to_string())
        }
        Some((step, None)) => {
            let step = value_expr(step, ctx)?;
            (
                Some(format!(
                    "{} - ({} > 0 and 1 or -1)",
                    stop_expr.wrapped(),
                    step.wrapped()
                )),
                step.code,
            )
        }
    };
    let last = last.ok_or_else(|| ctx.untranslatable(format!("`range` bound `{}` out of integer range", stop)))?;

    Ok(LuaExpr::compound(
        format!("{}, {}, {}", start_code, last, step_code),
        LuaType::Range,
    ))
}

fn inclusive(literal: Option<i64>, stop: &LuaExpr, adjust: i64) -> Option<String> {
    match literal {
        Some(i) => i.checked_add(adjust).map(|last| last.to_string()),
        None if adjust < 0 => Some(format!("{} - {}", stop.wrapped(), -adjust)),
        None => Some(format!("{} + {}", stop.wrapped(), adjust)),
    }
}

/// Text check for a counted-loop iterable: digits immediately followed by a
/// comma.
pub fn looks_like_range(code: &str) -> bool {
    let digits = code.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && code.as_bytes().get(digits) == Some(&b',')
}
