//! Configuration options for translation, invocation and the in-process store.

use std::time::Duration;

/// Channel that debug traces are published on by default.
pub const DEFAULT_DEBUG_CHANNEL: &str = "luaship-debug";

/// Options controlling how functions are translated and invoked.
#[derive(Debug, Clone)]
pub struct Options {
    /// Emit `PUBLISH` calls tracing assignments, branches, loops and returns.
    /// Printing expressions may repeat their side effects.
    /// Default: false
    pub lua_debug: bool,

    /// Channel the debug trace is published on.
    /// Default: "luaship-debug"
    pub debug_channel: String,

    /// Minimum number of recognized primitive calls on a receiver before it
    /// is treated as a remote object.
    /// Default: 2
    pub min_remote_calls: usize,

    /// Minimum share of a receiver's calls that must be recognized
    /// primitives.
    /// Default: 0.8
    pub min_remote_ratio: f64,

    /// Check that every call supplies arguments of the same shape as the
    /// call the script was compiled from.
    /// Default: enabled in debug builds
    pub check_argument_shapes: bool,

    /// Indentation unit of generated Lua code.
    /// Default: two spaces
    pub indent: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            lua_debug: false,
            debug_channel: DEFAULT_DEBUG_CHANNEL.to_string(),
            min_remote_calls: 2,
            min_remote_ratio: 0.8,
            check_argument_shapes: cfg!(debug_assertions),
            indent: "  ".to_string(),
        }
    }
}

impl Options {
    /// Returns options with the Lua debug trace enabled.
    pub fn with_lua_debug(mut self) -> Self {
        self.lua_debug = true;
        self
    }
}

/// Options for the in-process [`MemoryStore`](crate::store::MemoryStore).
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Maximum script execution time.
    /// Set to None to disable the limit.
    /// Default: 5 seconds
    pub script_timeout: Option<Duration>,

    /// Maximum number of cached scripts, 0 for no limit.
    /// Loading beyond the limit fails with an error reply.
    /// Default: 0
    pub max_scripts: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            script_timeout: Some(Duration::from_secs(5)),
            max_scripts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert!(!opts.lua_debug);
        assert_eq!(opts.debug_channel, DEFAULT_DEBUG_CHANNEL);
        assert_eq!(opts.min_remote_calls, 2);
        assert!((opts.min_remote_ratio - 0.8).abs() < f64::EPSILON);
        assert_eq!(opts.indent, "  ");
    }

    #[test]
    fn test_store_defaults() {
        let opts = StoreOptions::default();
        assert_eq!(opts.script_timeout, Some(Duration::from_secs(5)));
        assert_eq!(opts.max_scripts, 0);
    }
}
