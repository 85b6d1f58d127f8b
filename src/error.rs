//! Error types for luaship.

use crate::syntax::ParseError;
use thiserror::Error;

/// The result type used throughout luaship.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for translation, registration and invocation.
#[derive(Debug, Error)]
pub enum Error {
    /// The function source could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// No parameter could be classified as a remote-object receiver.
    #[error("Identification failure: no remote object found in `{function}`")]
    IdentificationFailure {
        /// Name of the function being compiled.
        function: String,
    },

    /// A syntax node, operator or call pattern has no translation rule.
    #[error("Untranslatable construct at line {line}: {construct}")]
    Untranslatable {
        /// Description of the offending node.
        construct: String,
        /// Source line of the enclosing statement (0 when unknown).
        line: usize,
    },

    /// A call supplied an argument whose shape differs from the one the
    /// cached script was generated for.
    #[error("Argument shape mismatch for `{name}`: compiled for {expected}, got {found}")]
    ArgumentShapeMismatch {
        /// Name of the offending argument.
        name: String,
        /// Shape recorded at compile time.
        expected: String,
        /// Shape of the value supplied now.
        found: String,
    },

    /// The store rejected or failed while loading or evaluating a script.
    #[error("Remote execution failure: {0}")]
    RemoteExecution(String),

    /// The response envelope was malformed.
    #[error("Protocol decoding failure: {0}")]
    ProtocolDecoding(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedded Lua runtime failed.
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates a new untranslatable-construct error.
    pub fn untranslatable(construct: impl Into<String>, line: usize) -> Self {
        Error::Untranslatable {
            construct: construct.into(),
            line,
        }
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new remote execution error.
    pub fn remote(msg: impl Into<String>) -> Self {
        Error::RemoteExecution(msg.into())
    }

    /// Creates a new protocol decoding error.
    pub fn decoding(msg: impl Into<String>) -> Self {
        Error::ProtocolDecoding(msg.into())
    }

    /// Returns true if this error reports a construct without a translation rule.
    pub fn is_untranslatable(&self) -> bool {
        matches!(self, Error::Untranslatable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::untranslatable("while loop", 4);
        assert_eq!(err.to_string(), "Untranslatable construct at line 4: while loop");

        let err = Error::ArgumentShapeMismatch {
            name: "key".to_string(),
            expected: "text".to_string(),
            found: "numeric".to_string(),
        };
        assert!(err.to_string().contains("`key`"));
        assert!(err.to_string().contains("numeric"));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
