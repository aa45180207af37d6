//! Boolean expression language for CHECK constraints.
//!
//! A small SQL-flavored predicate language: comparisons, `IS [NOT] NULL`,
//! `[NOT] IN` lists, `AND`/`OR`/`NOT`, and parentheses. Expressions are
//! parsed once at constraint creation into an AST that supports
//! three-valued evaluation, referenced-column extraction, column rename,
//! and canonical SQL rendering.

mod ast;
mod lexer;
mod parser;

pub use ast::{CheckExpr, CompareOp, Operand, Truth};
pub use lexer::Token;

use crate::error::ExprError;

/// Parse a check expression.
pub fn parse(source: &str) -> Result<CheckExpr, ExprError> {
    parser::Parser::new(source)?.parse()
}
