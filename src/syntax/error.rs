//! Errors raised while reading source text.

use super::token::{Span, TokenKind};
use thiserror::Error;

/// A lexing or parsing error with its source position.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at {span}")]
pub struct ParseError {
    /// The kind of error
    pub kind: ParseErrorKind,
    /// Where the error occurred
    pub span: Span,
}

impl ParseError {
    /// Creates an error at `span`.
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// What went wrong while lexing or parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    /// A character outside the token set.
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),

    /// A tab in leading whitespace.
    #[error("tabs are not supported for indentation")]
    TabIndentation,

    /// A dedent to a column no enclosing block uses.
    #[error("invalid dedent to {0} spaces")]
    InvalidDedent(usize),

    /// A string literal without its closing quote.
    #[error("unterminated string literal")]
    UnterminatedString,

    /// A numeric literal that does not fit its type.
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    /// A token the grammar does not allow here.
    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken {
        /// Token that was read.
        found: TokenKind,
        /// What the parser was looking for.
        expected: &'static str,
    },

    /// Valid Python outside the supported subset.
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// Assignment to something that is not a name, attribute or subscript.
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,

    /// No `def` in the source.
    #[error("source contains no function definition")]
    MissingFunction,
}

/// Result alias for the front end.
pub type ParseResult<T> = Result<T, ParseError>;
