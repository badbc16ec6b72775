//! The Kestrel expression language.
//!
//! A small, Kotlin-flavoured expression grammar used for conditional
//! breakpoints, logpoint messages and ad-hoc evaluation. This crate only turns
//! text into an [`ast::Expr`]; evaluation against a live process lives in
//! `kestrel-debug`.
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, `|`/`or`, `^`/`xor`,
//! `&`/`and`, equality, comparison and `is`, `in`, ranges, shifts, additive,
//! multiplicative, unary, postfix.

pub mod ast;
mod error;
mod lexer;
mod parser;
mod token;

pub use ast::{BinaryOp, Expr, Literal, RangeKind, TypeRef, UnaryOp};
pub use error::SyntaxError;
pub use lexer::tokenize;
pub use parser::parse_expression;
pub use token::{TemplatePart, Token, TokenKind};
