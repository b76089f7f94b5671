//! Lexer, AST and parser for VSL.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod visitor;
