//! Recursive descent parser for check constraint expressions.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr      := and_expr (OR and_expr)*
//! and_expr  := unary (AND unary)*
//! unary     := NOT unary | primary
//! primary   := '(' expr ')' | predicate
//! predicate := operand ( IS [NOT] NULL
//!                      | [NOT] IN '(' literal (',' literal)* ')'
//!                      | compare_op operand )
//! operand   := identifier | literal
//! ```

use super::ast::{CheckExpr, CompareOp, Operand};
use super::lexer::{tokenize, Token};
use crate::error::ExprError;
use crate::value::Value;

/// Parser for the check expression language.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a parser over the given source text.
    pub fn new(source: &str) -> Result<Self, ExprError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    /// Parse a complete expression, consuming all input.
    pub fn parse(mut self) -> Result<CheckExpr, ExprError> {
        let expr = self.parse_or()?;
        if let Some(token) = self.peek() {
            return Err(ExprError::TrailingInput(token.describe()));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<CheckExpr, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = CheckExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<CheckExpr, ExprError> {
        let mut left = self.parse_unary()?;
        while self.eat(&Token::And) {
            let right = self.parse_unary()?;
            left = CheckExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<CheckExpr, ExprError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_unary()?;
            return Ok(CheckExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<CheckExpr, ExprError> {
        if self.eat(&Token::LParen) {
            let expr = self.parse_or()?;
            self.expect(&Token::RParen, ")")?;
            return Ok(expr);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<CheckExpr, ExprError> {
        let operand = self.parse_operand()?;

        match self.peek() {
            Some(Token::Is) => {
                self.advance();
                let negated = self.eat(&Token::Not);
                self.expect(&Token::Null, "NULL")?;
                Ok(CheckExpr::IsNull { operand, negated })
            }
            Some(Token::Not) => {
                self.advance();
                self.expect(&Token::In, "IN")?;
                let list = self.parse_literal_list()?;
                Ok(CheckExpr::InList {
                    operand,
                    list,
                    negated: true,
                })
            }
            Some(Token::In) => {
                self.advance();
                let list = self.parse_literal_list()?;
                Ok(CheckExpr::InList {
                    operand,
                    list,
                    negated: false,
                })
            }
            _ => {
                let op = self.parse_compare_op()?;
                let right = self.parse_operand()?;
                Ok(CheckExpr::Compare {
                    left: operand,
                    op,
                    right,
                })
            }
        }
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, ExprError> {
        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            Some(other) => {
                return Err(ExprError::UnexpectedToken {
                    found: other.describe(),
                    expected: "comparison operator".to_string(),
                })
            }
            None => return Err(ExprError::UnexpectedEnd),
        };
        self.advance();
        Ok(op)
    }

    fn parse_operand(&mut self) -> Result<Operand, ExprError> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(Operand::Column(name))
            }
            Some(_) => Ok(Operand::Literal(self.parse_literal()?)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Value>, ExprError> {
        self.expect(&Token::LParen, "(")?;
        let mut list = vec![self.parse_literal()?];
        while self.eat(&Token::Comma) {
            list.push(self.parse_literal()?);
        }
        self.expect(&Token::RParen, ")")?;
        Ok(list)
    }

    fn parse_literal(&mut self) -> Result<Value, ExprError> {
        let value = match self.peek().cloned() {
            Some(Token::Int(i)) => Value::Int(i),
            Some(Token::Float(f)) => Value::Float(f),
            Some(Token::Str(s)) => Value::String(s),
            Some(Token::True) => Value::Bool(true),
            Some(Token::False) => Value::Bool(false),
            Some(Token::Null) => Value::Null,
            Some(other) => {
                return Err(ExprError::UnexpectedToken {
                    found: other.describe(),
                    expected: "literal".to_string(),
                })
            }
            None => return Err(ExprError::UnexpectedEnd),
        };
        self.advance();
        Ok(value)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, expected: &str) -> Result<(), ExprError> {
        match self.peek() {
            Some(found) if found == token => {
                self.advance();
                Ok(())
            }
            Some(found) => Err(ExprError::UnexpectedToken {
                found: found.describe(),
                expected: expected.to_string(),
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}
