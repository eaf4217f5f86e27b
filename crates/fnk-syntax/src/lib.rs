//! # fnk-syntax
//!
//! Lexer, parser, and AST definitions for fnk stage expressions.
//!
//! ## Overview
//!
//! Every pipeline stage (`--map`, `--filter`, `--fold`, ...) carries a small
//! closure-style expression. This crate compiles those strings:
//!
//! - **Lexer**: tokenizes an expression string into a stream of tokens
//! - **Parser**: builds an expression tree using recursive descent
//! - **AST**: type-safe representation of stage expressions
//! - **Error Handling**: lex/parse errors with source spans
//!
//! ## Architecture
//!
//! ```text
//! Expression String
//!     ↓
//! Lexer (tokenize)
//!     ↓
//! Vec<SpannedToken>
//!     ↓
//! Parser (parse_closure)
//!     ↓
//! ClosureDef { params, body }
//! ```
//!
//! ## Example
//!
//! ```rust
//! use fnk_syntax::parse_closure;
//!
//! let def = parse_closure("|x: int| -> x * 2").expect("parse failed");
//! assert_eq!(def.params.len(), 1);
//!
//! // Bare expressions are zero-parameter closures; the representation
//! // variable is bound by the evaluator.
//! let bare = parse_closure("_ % 2 == 0").expect("parse failed");
//! assert!(bare.params.is_empty());
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use error::{LexError, ParseError, Span};
pub use lexer::{SpannedToken, Token, tokenize};
pub use parser::{parse_closure, parse_expression};
