//! Statement translation.

use super::block::Block;
use super::context::TranslationContext;
use super::expr::{looks_like_range, self_field, subscript_place, translate_expr, value_expr, LuaType};
use super::prelude::{lua_name, lua_string};
use crate::error::Result;
use crate::syntax::{Expr, Literal, Stmt, StmtKind};

/// Translates a statement list at `indent`.
///
/// `ends_block` is false when more code follows in the same Lua block, which
/// forces every `return` into a `do ... end`.
pub fn translate_block(
    stmts: &[Stmt],
    indent: usize,
    ends_block: bool,
    ctx: &mut TranslationContext<'_>,
) -> Result<Block> {
    let mut block = Block::new();
    for (i, stmt) in stmts.iter().enumerate() {
        let last = ends_block && i + 1 == stmts.len();
        block.extend(translate_stmt(stmt, indent, last, ctx)?);
    }
    Ok(block)
}

/// Translates one statement. `last` is set when nothing follows it in the
/// enclosing Lua block, so a `return` needs no `do ... end` guard.
pub fn translate_stmt(
    stmt: &Stmt,
    indent: usize,
    last: bool,
    ctx: &mut TranslationContext<'_>,
) -> Result<Block> {
    ctx.line = stmt.line;
    let line = stmt.line;
    let mut block = Block::new();

    match &stmt.kind {
        StmtKind::Assign { targets, value } => {
            let value = value_expr(value, ctx)?;
            let Some((first, rest)) = targets.split_first() else {
                return Ok(block);
            };
            match first {
                Expr::Tuple(items) | Expr::List(items) => {
                    if !rest.is_empty() {
                        return Err(ctx.untranslatable("chained assignment to a tuple"));
                    }
                    block.push(indent, "do", line);
                    block.push(indent + 1, format!("local __T = {}", value.code), line);
                    for (i, item) in items.iter().enumerate() {
                        assign(&mut block, item, &format!("__T[{}]", i + 1), indent + 1, ctx)?;
                    }
                    block.push(indent, "end", line);
                }
                _ => {
                    assign(&mut block, first, &value.code, indent, ctx)?;
                    if !rest.is_empty() {
                        let source = value_expr(first, ctx)?.code;
                        for target in rest {
                            assign(&mut block, target, &source, indent, ctx)?;
                        }
                    }
                }
            }
        }
        StmtKind::AugAssign { target, op, value } => {
            let combined = Expr::BinOp {
                left: Box::new(target.clone()),
                op: *op,
                right: Box::new(value.clone()),
            };
            let value = value_expr(&combined, ctx)?;
            assign(&mut block, target, &value.code, indent, ctx)?;
        }
        StmtKind::Return(value) => {
            let code = match value {
                Some(value) => Some(value_expr(value, ctx)?.code),
                None => None,
            };
            emit_return(&mut block, code, indent, last, ctx);
        }
        StmtKind::If { test, body, orelse } => {
            emit_if(&mut block, "if", test, body, orelse, indent, line, ctx)?;
            block.push(indent, "end", line);
        }
        StmtKind::For { target, iter, body } => {
            let Expr::Name(name) = target else {
                return Err(ctx.untranslatable(format!("loop target `{}`", target)));
            };
            let iterable = translate_expr(iter, ctx)?;
            if iterable.ty == LuaType::Nothing {
                return Err(ctx.untranslatable(format!("loop over `{}`", iter)));
            }
            let counted = iterable.ty == LuaType::Range;
            if counted != looks_like_range(&iterable.code) {
                log::debug!(
                    "line {}: loop over `{}` is {} by type but not by text",
                    line,
                    iter,
                    if counted { "counted" } else { "a sequence" }
                );
            }

            let id = ctx.enter_loop();
            let item = format!("__ITEM{}", id);
            let name = lua_name(name);
            trace(&mut block, indent, ctx, lua_string(&format!("{}: {}", line, stmt.kind)));
            block.push(indent, format!("local __BREAK{} = false", id), line);
            if counted {
                block.push(indent, format!("for {} = {} do", item, iterable.code), line);
            } else {
                block.push(indent, format!("for _, {} in __ITER({}) do", item, iterable.code), line);
            }
            block.push(indent + 1, format!("if __BREAK{} then break end", id), line);
            block.push(indent + 1, format!("{} = {}", name, item), line);
            block.declare(name);
            block.push(indent + 1, "repeat", line);
            block.extend(translate_block(body, indent + 2, true, ctx)?);
            block.push(indent + 1, "until true", line);
            block.push(indent, "end", line);
            ctx.exit_loop();
        }
        StmtKind::Break => {
            let id = ctx.current_loop("break")?;
            trace(&mut block, indent, ctx, lua_string(&format!("{}: break", line)));
            block.push(indent, format!("__BREAK{} = true", id), line);
            block.push(indent, "do break end", line);
        }
        StmtKind::Continue => {
            ctx.current_loop("continue")?;
            trace(&mut block, indent, ctx, lua_string(&format!("{}: continue", line)));
            block.push(indent, "do break end", line);
        }
        StmtKind::Expr(Expr::Literal(Literal::Str(_))) => {
            // docstring
        }
        StmtKind::Expr(value) => {
            let value = translate_expr(value, ctx)?;
            match value.ty {
                LuaType::Nothing => {}
                LuaType::Range => return Err(ctx.untranslatable("`range` outside a for loop")),
                _ if value.call => block.push(indent, value.code, line),
                _ => block.push(indent, format!("local _ = {}", value.code), line),
            }
        }
        StmtKind::Print(values) => {
            let parts = values
                .iter()
                .map(|v| value_expr(v, ctx).map(|e| format!("tostring({})", e.code)))
                .collect::<Result<Vec<_>>>()?;
            let message = if parts.is_empty() {
                "''".to_string()
            } else {
                parts.join(" .. ' ' .. ")
            };
            block.push(indent, format!("redis.log(redis.LOG_DEBUG, {})", message), line);
            trace(&mut block, indent, ctx, message);
        }
        StmtKind::Pass => block.push(indent, "do end", line),
    }

    Ok(block)
}

/// Assigns `code` to `target`.
fn assign(
    block: &mut Block,
    target: &Expr,
    code: &str,
    indent: usize,
    ctx: &mut TranslationContext<'_>,
) -> Result<()> {
    let line = ctx.line;
    match target {
        Expr::Name(name) => {
            if ctx.is_remote(target) {
                return Err(ctx.untranslatable(format!("assignment to remote object `{}`", name)));
            }
            let local = lua_name(name);
            block.push(indent, format!("{} = {}", local, code), line);
            block.declare(local.clone());
            let message = format!(
                "{} .. tostring({})",
                lua_string(&format!("{}: {} = ", line, name)),
                local
            );
            trace(block, indent, ctx, message);
        }
        Expr::Attribute { value, attr } if **value == Expr::name("self") => {
            if ctx.is_remote(target) {
                return Err(ctx.untranslatable(format!("assignment to remote object `{}`", target)));
            }
            block.push(indent, format!("{} = {}", self_field(attr), code), line);
        }
        Expr::Subscript { value, index } => {
            let place = subscript_place(value, index, ctx)?;
            block.push(indent, format!("{} = {}", place, code), line);
        }
        other => return Err(ctx.untranslatable(format!("assignment to `{}`", other))),
    }
    Ok(())
}

fn emit_return(
    block: &mut Block,
    value: Option<String>,
    indent: usize,
    last: bool,
    ctx: &TranslationContext<'_>,
) {
    let line = ctx.line;
    let statement = |v: &str| {
        if ctx.helper {
            format!("return {}", v)
        } else {
            format!("return __RETVAL({}, true)", v)
        }
    };

    if ctx.options.lua_debug {
        block.push(indent, "do", line);
        block.push(
            indent + 1,
            format!("local __RET = {}", value.as_deref().unwrap_or("nil")),
            line,
        );
        let message = format!(
            "{} .. tostring(__RET)",
            lua_string(&format!("{}: return ", line))
        );
        trace(block, indent + 1, ctx, message);
        block.push(indent + 1, statement("__RET"), line);
        block.push(indent, "end", line);
        return;
    }

    let code = match (&value, ctx.helper) {
        (None, true) => "return".to_string(),
        (None, false) => statement("nil"),
        (Some(v), _) => statement(v),
    };
    if last {
        block.push(indent, code, line);
    } else {
        block.push(indent, format!("do {} end", code), line);
    }
}

/// Emits `keyword test then` and the branches, without the closing `end`.
/// A lone `if` in the else branch becomes `elseif`.
#[allow(clippy::too_many_arguments)]
fn emit_if(
    block: &mut Block,
    keyword: &str,
    test: &Expr,
    body: &[Stmt],
    orelse: &[Stmt],
    indent: usize,
    line: usize,
    ctx: &mut TranslationContext<'_>,
) -> Result<()> {
    ctx.line = line;
    let test_expr = value_expr(test, ctx)?;
    let condition = if test_expr.ty == LuaType::Boolean {
        test_expr.code
    } else {
        format!("__TRUE({})", test_expr.code)
    };
    block.push(indent, format!("{} {} then", keyword, condition), line);
    trace(
        block,
        indent + 1,
        ctx,
        lua_string(&format!("{}: {} {}", line, keyword, test)),
    );
    block.extend(translate_block(body, indent + 1, true, ctx)?);

    match orelse {
        [] => {}
        [Stmt {
            line: elif_line,
            kind:
                StmtKind::If {
                    test,
                    body,
                    orelse,
                },
        }] => emit_if(block, "elseif", test, body, orelse, indent, *elif_line, ctx)?,
        _ => {
            block.push(indent, "else", line);
            block.extend(translate_block(orelse, indent + 1, true, ctx)?);
        }
    }
    Ok(())
}

/// Publishes a debug trace line when tracing is enabled.
fn trace(block: &mut Block, indent: usize, ctx: &TranslationContext<'_>, message: String) {
    if ctx.options.lua_debug {
        block.push(
            indent,
            format!(
                "redis.call('publish', {}, {})",
                lua_string(&ctx.options.debug_channel),
                message
            ),
            ctx.line,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::host::Environment;
    use crate::syntax::parse_function;

    fn translate_with(source: &str, options: &Options) -> Result<String> {
        let def = parse_function(source)?;
        let env = Environment::new();
        let remotes = vec![Expr::name("client")];
        let mut ctx = TranslationContext::new(options, &env, &remotes, false);
        let block = translate_block(&def.body, 0, true, &mut ctx)?;
        Ok(block.render("  "))
    }

    fn lua(source: &str) -> String {
        translate_with(source, &Options::default()).unwrap()
    }

    #[test]
    fn test_assignments() {
        let out = lua("def f(client):\n    a = b = 3\n    x = [1]\n    x[0] = a\n    return x\n");
        assert_eq!(
            out,
            "local a, b, x\n\
             a = 3\n\
             b = a\n\
             x = {1}\n\
             x[(x.__DICT) and (0) or (1)] = a\n\
             return __RETVAL(x, true)\n"
        );
    }

    #[test]
    fn test_tuple_unpacking() {
        let out = lua("def f(client, pair):\n    a, b = pair\n");
        assert!(out.contains("local __T = pair\n"));
        assert!(out.contains("  a = __T[1]\n  b = __T[2]\n"));
    }

    #[test]
    fn test_loop_with_break_and_continue() {
        let source = "
            def f(client):
                for i in range(10):
                    if i == 2:
                        continue
                    break
                return True
        ";
        let out = lua(source);
        assert_eq!(
            out,
            "local i\n\
             local __BREAK1 = false\n\
             for __ITEM1 = 0, 9, 1 do\n\
             \x20\x20if __BREAK1 then break end\n\
             \x20\x20i = __ITEM1\n\
             \x20\x20repeat\n\
             \x20\x20\x20\x20if i == 2 then\n\
             \x20\x20\x20\x20\x20\x20do break end\n\
             \x20\x20\x20\x20end\n\
             \x20\x20\x20\x20__BREAK1 = true\n\
             \x20\x20\x20\x20do break end\n\
             \x20\x20until true\n\
             end\n\
             return __RETVAL(true, true)\n"
        );
    }

    #[test]
    fn test_nested_loops_get_distinct_sentinels() {
        let source = "
            def f(client, rows):
                for row in rows:
                    for cell in row:
                        break
                    break
        ";
        let out = lua(source);
        assert!(out.contains("for _, __ITEM1 in __ITER(rows) do"));
        assert!(out.contains("for _, __ITEM2 in __ITER(row) do"));
        assert!(out.contains("__BREAK2 = true"));
        assert!(out.contains("__BREAK1 = true"));
    }

    #[test]
    fn test_if_elif_else() {
        let source = "
            def f(client, x):
                if x:
                    y = 1
                elif x == 2:
                    y = 2
                else:
                    y = 3
        ";
        let out = lua(source);
        assert!(out.contains("if __TRUE(x) then\n"));
        assert!(out.contains("elseif x == 2 then\n"));
        assert!(out.contains("else\n  y = 3\nend\n"));
        assert_eq!(out.matches("end\n").count(), 1);
    }

    #[test]
    fn test_early_return_is_wrapped() {
        let out = lua("def f(client):\n    return 1\n    x = 2\n");
        assert!(out.contains("do return __RETVAL(1, true) end\n"));
    }

    #[test]
    fn test_expression_statements() {
        let out = lua(
            "def f(client, x):\n    \"\"\"Docs.\"\"\"\n    client.pipe()\n    client.incr(x)\n    x * 2\n",
        );
        assert_eq!(
            out,
            "__PIPE_ADD('client', redis.call('incr', x))\nlocal _ = x * 2\n"
        );
    }

    #[test]
    fn test_print_and_pass() {
        let out = lua("def f(client, x):\n    print(x, 'y')\n    pass\n");
        assert_eq!(
            out,
            "redis.log(redis.LOG_DEBUG, tostring(x) .. ' ' .. tostring('y'))\ndo end\n"
        );
    }

    #[test]
    fn test_debug_trace() {
        let options = Options::default().with_lua_debug();
        let out = translate_with("def f(client):\n    x = 1\n    return x\n", &options).unwrap();
        assert!(out.contains("redis.call('publish', 'luaship-debug', '2: x = ' .. tostring(x))"));
        assert!(out.contains("local __RET = x"));
        assert!(out.contains("return __RETVAL(__RET, true)"));
    }

    #[test]
    fn test_untranslatable_statements() {
        for source in [
            "def f(client):\n    break\n",
            "def f(client):\n    for a, b in x:\n        pass\n",
            "def f(client):\n    client = 3\n",
            "def f(client):\n    x.y = 3\n",
            "def f(client):\n    range(3)\n",
        ] {
            let err = translate_with(source, &Options::default()).unwrap_err();
            assert!(err.is_untranslatable(), "{}: {}", source, err);
        }
    }

    #[test]
    fn test_error_names_the_line() {
        let err = translate_with("def f(client):\n    x = 1\n    y = x.items()\n", &Options::default())
            .unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);
    }
}
