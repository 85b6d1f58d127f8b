//! Front end for the supported Python subset.
//!
//! The lexer turns source text into tokens with explicit indentation, and the
//! parser builds the syntax tree of a single `def`. Statement lines count the
//! `def` line as line 1 so that line ranges are independent of where the
//! function sits in its file.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{Arg, BinOp, BoolOp, CmpOp, Expr, FunctionDef, Literal, Stmt, StmtKind, UnaryOp};
pub use error::{ParseError, ParseErrorKind, ParseResult};
pub use lexer::tokenize;
pub use parser::parse_function;
pub use token::{Span, Token, TokenKind};
