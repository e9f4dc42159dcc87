//! Lexer and parser for AeroJS source text.
//!
//! This module provides lexical analysis (tokenization) and syntactic
//! analysis (parsing) of JavaScript source into the AST defined in
//! [`ast`].

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod interner;

pub use token::{Token, Span, TemplatePart};
pub use lexer::{Lexer, LexError};
pub use parser::{Parser, ParseError};
pub use interner::{Interner, Symbol};
