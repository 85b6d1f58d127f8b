//! The host side of a proxied function: the constants it can see and the
//! instance a method is called on.

use crate::value::Value;
use std::collections::HashMap;

/// Module-level constants visible to a function.
///
/// Keys are the names the function uses, either bare (`FOO`) or dotted
/// (`constants.FOO`). Constants are inlined into the generated script.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    constants: HashMap<String, Value>,
}

impl Environment {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds or replaces a constant.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.constants.insert(name.into(), value.into());
    }

    /// Looks up a constant by the name the function uses.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    /// Number of constants.
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// True if no constants are defined.
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

/// The receiving object of a method.
///
/// Attributes are read on every call, so changing one between calls is seen
/// by the script. Methods are given as source text and compiled into helper
/// closures the first time a script needs them.
#[derive(Debug, Clone, Default)]
pub struct Instance {
    attributes: HashMap<String, Value>,
    methods: HashMap<String, String>,
}

impl Instance {
    /// An instance with no attributes or methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_attribute`](Self::set_attribute).
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Adds a method the script may call as `self.name(...)`. `source` is its
    /// full `def`.
    pub fn with_method(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.methods.insert(name.into(), source.into());
        self
    }

    /// Sets an attribute. The next call sends the new value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Current value of an attribute.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Source text of a method.
    pub fn method_source(&self, name: &str) -> Option<&str> {
        self.methods.get(name).map(String::as_str)
    }
}
