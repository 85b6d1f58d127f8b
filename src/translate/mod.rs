//! Lowering of a parsed function into a Lua script body.
//!
//! A [`Fragment`] is the translated body of one function (or of a line range
//! of it) together with what it needs from outside: its inputs, the names it
//! hands back, and whether it drains pipelined results. The argument
//! preamble is produced separately by [`crate::marshal`] because it depends
//! on the arguments of the first call.

pub mod block;
pub mod context;
pub mod expr;
pub mod prelude;
pub mod stmt;

pub use block::{Block, OutputLine};
pub use context::TranslationContext;
pub use expr::{translate_expr, value_expr, LuaExpr, LuaType};
pub use stmt::{translate_block, translate_stmt};

use crate::analysis::{analyze, assigned_names, LineRange, Required};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::host::Environment;
use crate::marshal::Preamble;
use crate::syntax::{Expr, FunctionDef, Stmt};
use prelude::{lua_name, lua_string, HEADER, PIPELINED, UNPIPELINED};

/// The translated body of a function.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Function name.
    pub name: String,
    /// Parameters the translated code is called with. For top-level
    /// fragments these are the positional arguments the caller supplies.
    pub params: Vec<String>,
    /// True if the function takes `self`.
    pub method: bool,
    /// Helpers are emitted as closures and return bare values.
    pub helper: bool,
    /// Receivers whose calls became store commands.
    pub remote_objects: Vec<Expr>,
    /// Names read before being assigned, in wire order for locals.
    pub inputs: Vec<Required>,
    /// Names a partial fragment hands back.
    pub outputs: Vec<String>,
    /// Translated lines.
    pub range: LineRange,
    /// Translated statements.
    pub body: Block,
    /// Set if the body drains a receiver with `execute()`.
    pub uses_pipeline: bool,
    indent: String,
}

impl Fragment {
    /// Translates the statements of `def` inside `range`.
    pub fn compile(
        def: &FunctionDef,
        remote_objects: Vec<Expr>,
        range: LineRange,
        environment: &Environment,
        options: &Options,
        helper: bool,
    ) -> Result<Self> {
        if !helper && remote_objects.is_empty() {
            return Err(Error::IdentificationFailure {
                function: def.name.clone(),
            });
        }

        let liveness = analyze(def, &remote_objects, range);
        let selected: Vec<Stmt> = range.select(def).cloned().collect();

        let mut ctx = TranslationContext::new(options, environment, &remote_objects, helper);
        ctx.locals.extend(def.params.iter().cloned());
        ctx.locals.extend(assigned_names(&def.body));

        let indent = usize::from(helper);
        let mut body = translate_block(&selected, indent, liveness.outputs.is_empty(), &mut ctx)?;

        if !liveness.outputs.is_empty() {
            let mut entries = vec!["['__DICT'] = true".to_string()];
            entries.extend(
                liveness
                    .outputs
                    .iter()
                    .map(|name| format!("[{}] = {}", lua_string(name), lua_name(name))),
            );
            body.push(
                indent,
                format!("return __RETVAL(nil, false, {{{}}})", entries.join(", ")),
                range.max,
            );
        }

        // Inputs are declared by the argument preamble or the closure header.
        let declared: Vec<String> = liveness
            .inputs
            .iter()
            .filter_map(|r| match r {
                Required::Local(name) => Some(lua_name(name)),
                _ => None,
            })
            .chain(def.params.iter().map(|p| lua_name(p)))
            .collect();
        body.names.retain(|name| !declared.contains(name));

        let params = if helper {
            def.params
                .iter()
                .skip(usize::from(def.is_method()))
                .cloned()
                .collect()
        } else {
            liveness
                .inputs
                .iter()
                .filter_map(|r| match r {
                    Required::Local(name) => Some(name.clone()),
                    _ => None,
                })
                .collect()
        };

        log::debug!(
            "translated `{}` lines {}..={}: {} inputs, {} outputs",
            def.name,
            range.min,
            range.max,
            liveness.inputs.len(),
            liveness.outputs.len()
        );

        let uses_pipeline = ctx.uses_pipeline;
        Ok(Self {
            name: def.name.clone(),
            params,
            method: def.is_method(),
            helper,
            remote_objects,
            inputs: liveness.inputs,
            outputs: liveness.outputs,
            range,
            body,
            uses_pipeline,
            indent: options.indent.clone(),
        })
    }

    /// Names of the positional arguments, in wire order.
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter_map(|r| match r {
                Required::Local(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The body as Lua source.
    pub fn render_body(&self) -> String {
        self.body.render(&self.indent)
    }

    /// The complete script: runtime helpers, argument preamble, body.
    pub fn script(&self, preamble: &Preamble) -> String {
        let mut out = String::from(HEADER);
        if self.uses_pipeline || preamble.uses_pipeline {
            out.push_str(PIPELINED);
        } else {
            out.push_str(UNPIPELINED);
        }
        out.push('\n');
        out.push_str(&preamble.text);
        out.push_str(&self.render_body());
        out
    }

    /// The helper as an assignment into the `self` table.
    pub fn helper_closure(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| lua_name(p)).collect();
        format!(
            "self.{} = function({})\n{}end\n",
            self.name,
            params.join(", "),
            self.render_body()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_function;

    fn compile(source: &str, range: Option<(usize, usize)>) -> Result<Fragment> {
        let def = parse_function(source)?;
        let range = range.map_or_else(|| LineRange::whole(&def), |(min, max)| LineRange { min, max });
        Fragment::compile(
            &def,
            vec![Expr::name("client")],
            range,
            &Environment::new(),
            &Options::default(),
            false,
        )
    }

    #[test]
    fn test_inputs_are_not_redeclared() {
        let fragment = compile("def f(client, x):\n    x = x + 1\n    y = x\n    return y\n", None).unwrap();
        assert_eq!(fragment.params, vec!["x"]);
        assert_eq!(fragment.body.names, vec!["y"]);
        assert!(fragment.render_body().starts_with("local y\n"));
    }

    #[test]
    fn test_partial_range_returns_live_names() {
        let source = "
            def f(client, key):
                value = client.get(key)
                value = value + 'x'
                other = value
                return other
        ";
        let fragment = compile(source, Some((3, 3))).unwrap();
        assert_eq!(fragment.params, vec!["key", "value"]);
        assert_eq!(fragment.outputs, vec!["value"]);
        assert_eq!(
            fragment.render_body(),
            "value = value .. 'x'\n\
             return __RETVAL(nil, false, {['__DICT'] = true, ['value'] = value})\n"
        );
    }

    #[test]
    fn test_pipeline_prelude_is_chosen_by_use() {
        let plain = compile("def f(client):\n    return client.get('a')\n", None).unwrap();
        assert!(!plain.uses_pipeline);
        let script = plain.script(&Preamble::default());
        assert!(script.contains(UNPIPELINED.trim()));
        assert!(!script.contains("__PIPE_GET"));

        let piped = compile(
            "def f(client):\n    client.get('a')\n    return client.execute()\n",
            None,
        )
        .unwrap();
        assert!(piped.uses_pipeline);
        assert!(piped.script(&Preamble::default()).contains("local __PIPE_GET"));
    }

    #[test]
    fn test_compile_keeps_remote_objects_and_pipeline_flag() {
        let fragment = compile(
            "def f(client, k):\n    client.incr(k)\n    return client.execute()\n",
            None,
        )
        .unwrap();
        assert_eq!(fragment.remote_objects, vec![Expr::name("client")]);
        assert!(fragment.uses_pipeline);
        assert_eq!(fragment.input_names(), vec!["k"]);
    }

    #[test]
    fn test_no_remote_objects_fails_identification() {
        let def = parse_function("def f(x):\n    return x\n").unwrap();
        let err = Fragment::compile(
            &def,
            Vec::new(),
            LineRange::whole(&def),
            &Environment::new(),
            &Options::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::IdentificationFailure { ref function } if function == "f"));
    }

    #[test]
    fn test_helper_closure() {
        let def = parse_function("def decorate(self, key):\n    return 'prefix:' + key\n").unwrap();
        let fragment = Fragment::compile(
            &def,
            Vec::new(),
            LineRange::whole(&def),
            &Environment::new(),
            &Options::default(),
            true,
        )
        .unwrap();
        assert_eq!(
            fragment.helper_closure(),
            "self.decorate = function(key)\n  return 'prefix:' .. key\nend\n"
        );
    }
}
