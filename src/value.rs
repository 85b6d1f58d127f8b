//! Host values exchanged with generated scripts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Marker key that flags a Lua table as an associative map.
pub const DICT_MARKER: &str = "__DICT";

/// A plain host value: what a proxied function accepts and returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// The absent value (`None` / `nil`).
    #[default]
    None,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    Str(String),
    /// A positional sequence.
    List(Vec<Value>),
    /// An associative map with string keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true for `Value::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Returns the string slice if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, accepting integral floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Returns the numeric value as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the list items if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Shape of this value as seen by the argument unpacking preamble.
    pub fn shape(&self) -> ArgShape {
        match self {
            Value::Int(_) | Value::Float(_) => ArgShape::Numeric,
            Value::Str(_) => ArgShape::Text,
            Value::Map(_) => ArgShape::Mapping,
            Value::None | Value::Bool(_) | Value::List(_) => ArgShape::Packed,
        }
    }

    /// Removes dictionary marker keys from every map in this value.
    pub fn strip_markers(self) -> Value {
        match self {
            Value::List(items) => Value::List(items.into_iter().map(Value::strip_markers).collect()),
            Value::Map(map) => Value::Map(
                map.into_iter()
                    .filter(|(k, _)| k != DICT_MARKER)
                    .map(|(k, v)| (k, v.strip_markers()))
                    .collect(),
            ),
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(map: BTreeMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// How an argument crosses the wire and is unpacked inside the script.
///
/// A compiled script is only valid for calls whose arguments keep the shape
/// of the first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    /// Sent as decimal text, unpacked with `tonumber`.
    Numeric,
    /// Sent and unpacked as raw text.
    Text,
    /// Sent as JSON, unpacked with `cjson.decode`.
    Packed,
    /// Sent as JSON and additionally flagged as a map.
    Mapping,
}

impl ArgShape {
    /// Lua conversion applied to the incoming `ARGV` slot.
    pub fn conversion(self) -> &'static str {
        match self {
            ArgShape::Numeric => "tonumber",
            ArgShape::Text => "",
            ArgShape::Packed | ArgShape::Mapping => "cjson.decode",
        }
    }
}

impl fmt::Display for ArgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgShape::Numeric => "numeric",
            ArgShape::Text => "text",
            ArgShape::Packed => "packed",
            ArgShape::Mapping => "mapping",
        };
        write!(f, "{}", name)
    }
}
