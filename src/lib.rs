#![warn(missing_docs)]

//! A compiler for the Vela language.
//!
//! # Parsing
//!
//! Source text is read into a syntax tree by the [`lexer`] and [`parser`] modules.
//!
//! These modules provide:
//! - [`Lexer`][`lexer::Lexer`]: A struct that reads text (or files) into tokens.
//! - [`Parser`][`parser::Parser`]: A struct that combines tokens into a tree of prefix, infix, and sentence nodes.
//!
//! # Analysis
//!
//! The trees of every source are checked together by [`semantic`], which declares types and members,
//! resolves names and overloads, and produces typed execution nodes.
//! External types are supplied through the [`TypeOracle`][`semantic::oracle::TypeOracle`] trait.
//!
//! # Lowering
//!
//! The [`ir`] module lowers execution nodes into a stack-machine instruction list for each action.
//!
//! The [`compiler`] module runs every phase:
//! - [`compile`][`compiler::compile`]: Compiles a set of sources with a set of options.
//! - [`Context`][`compiler::Context`]: The state shared by every phase of a compilation.

pub mod span;
pub mod err;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod ir;
pub mod display;
pub mod compiler;

#[cfg(test)]
mod test_utils;
