//! Static analysis over a parsed function.
//!
//! - [`identify`] decides which receivers are remote store clients.
//! - [`liveness`] computes the names that must cross into and out of the
//!   generated script.

pub mod identify;
pub mod liveness;

pub use identify::{identify, identify_remote_functions, is_remote_method, REMOTE_METHODS};
pub use liveness::{analyze, assigned_names, LineRange, Liveness, Required};

/// Python builtins with a translation rule. They are never captured.
pub(crate) const BUILTIN_NAMES: &[&str] = &[
    "False", "None", "True", "float", "int", "len", "print", "range", "str", "xrange",
];

/// Conventional constant names: at least one letter and no lowercase letters.
pub fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_alphabetic()) && !name.chars().any(|c| c.is_lowercase())
}
