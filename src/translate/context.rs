//! Mutable state threaded through one translation pass.

use crate::config::Options;
use crate::error::{Error, Result};
use crate::host::Environment;
use crate::syntax::Expr;
use std::collections::HashSet;

/// State threaded through one translation pass.
pub struct TranslationContext<'a> {
    /// Translation options.
    pub options: &'a Options,
    /// Constants inlined into the script.
    pub environment: &'a Environment,
    /// Receivers whose calls become store commands.
    pub remote_objects: &'a [Expr],
    /// Helpers return bare values instead of the envelope.
    pub helper: bool,
    /// Source line of the statement being translated.
    pub line: usize,
    /// Set once a receiver is drained with `execute()`.
    pub uses_pipeline: bool,
    /// Parameters and assigned names. Uppercase names found here are
    /// variables, not constants.
    pub locals: HashSet<String>,
    loop_counter: usize,
    loops: Vec<usize>,
}

impl<'a> TranslationContext<'a> {
    /// A context for translating one function.
    pub fn new(
        options: &'a Options,
        environment: &'a Environment,
        remote_objects: &'a [Expr],
        helper: bool,
    ) -> Self {
        Self {
            options,
            environment,
            remote_objects,
            helper,
            line: 0,
            uses_pipeline: false,
            locals: HashSet::new(),
            loop_counter: 0,
            loops: Vec::new(),
        }
    }

    /// True if `expr` is one of the remote objects.
    pub fn is_remote(&self, expr: &Expr) -> bool {
        self.remote_objects.iter().any(|r| r == expr)
    }

    /// Opens a loop and returns its id. Ids are never reused within a pass.
    pub fn enter_loop(&mut self) -> usize {
        self.loop_counter += 1;
        self.loops.push(self.loop_counter);
        self.loop_counter
    }

    /// Closes the innermost loop.
    pub fn exit_loop(&mut self) {
        self.loops.pop();
    }

    /// Id of the innermost enclosing loop.
    pub fn current_loop(&self, statement: &str) -> Result<usize> {
        self.loops
            .last()
            .copied()
            .ok_or_else(|| self.untranslatable(format!("`{}` outside a loop", statement)))
    }

    /// An untranslatable error at the current line.
    pub fn untranslatable(&self, construct: impl Into<String>) -> Error {
        Error::untranslatable(construct, self.line)
    }
}
