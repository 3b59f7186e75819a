//! Postfix chains: calls, indexing, slices, member access, `++`/`--`

use super::Parser;
use super::expr::is_assignable;
use crate::ast::{Arg, Ast, Node};
use crate::error::Result;
use crate::lexer::TokenKind;

impl Parser {
    pub(super) fn parse_postfix(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let expr = self.parse_primary()?;
        self.parse_postfix_chain(expr, start)
    }

    /// Apply postfix operators to an already parsed operand.
    pub(super) fn parse_postfix_chain(&mut self, mut expr: Ast, start: crate::ast::Span) -> Result<Ast> {
        loop {
            let node = match self.kind() {
                // A call must touch its callee: `f (x)` is not a call.
                TokenKind::LParen if self.touches_previous() => {
                    let args = self.parse_args()?;
                    match expr.node {
                        Node::Property { object, name } => Node::MethodCall {
                            object,
                            method: name,
                            args,
                        },
                        other => Node::CallValue {
                            callee: Box::new(Ast::new(other, expr.span)),
                            args,
                        },
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.without_restrictions(|p| p.parse_index(expr))?
                }
                TokenKind::Arrow => {
                    self.advance();
                    let name = self.expect_name("after `->`")?.literal;
                    if self.check(TokenKind::LParen) {
                        let args = self.parse_args()?;
                        Node::MethodCall {
                            object: Box::new(expr),
                            method: name,
                            args,
                        }
                    } else {
                        Node::Property {
                            object: Box::new(expr),
                            name,
                        }
                    }
                }
                // `a.b` is member access only when nothing separates the
                // three tokens; any spacing makes it concatenation.
                TokenKind::Dot if self.at_dot_access() => {
                    self.advance();
                    let name = self.advance().literal;
                    Node::Property {
                        object: Box::new(expr),
                        name,
                    }
                }
                TokenKind::Incr | TokenKind::Decr if is_assignable(&expr.node) => {
                    let increment = self.advance().kind == TokenKind::Incr;
                    Node::IncDec {
                        target: Box::new(expr),
                        increment,
                        prefix: false,
                    }
                }
                _ => return Ok(expr),
            };
            expr = Ast::new(node, self.span_from(start));
        }
    }

    fn at_dot_access(&self) -> bool {
        let next = self.peek_kind(1);
        self.touches_previous() && self.adjacent(0) && (next == TokenKind::Ident || next.is_keyword())
    }

    /// After `[`: `a[]`, `a[i]`, `a[x..]`, `a[..y]`, `a[x..y]`.
    fn parse_index(&mut self, object: Ast) -> Result<Node> {
        let object = Box::new(object);
        if self.eat(TokenKind::RBracket) {
            return Ok(Node::Index {
                object,
                index: None,
            });
        }
        let start = if self.check(TokenKind::DoubleDot) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        if self.eat(TokenKind::DoubleDot) {
            let end = if self.check(TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            self.expect(TokenKind::RBracket, "to close the slice")?;
            return Ok(Node::Slice { object, start, end });
        }
        self.expect(TokenKind::RBracket, "to close the index")?;
        Ok(Node::Index {
            object,
            index: start,
        })
    }

    /// `( arg, name: arg, ... )`
    pub(super) fn parse_args(&mut self) -> Result<Vec<Arg>> {
        self.expect(TokenKind::LParen, "to open the argument list")?;
        self.without_restrictions(|p| {
            let mut args = Vec::new();
            while !p.check(TokenKind::RParen) {
                let named = p.kind() == TokenKind::Ident && p.peek_kind(1) == TokenKind::Colon;
                let name = if named {
                    let name = p.advance().literal;
                    p.advance();
                    Some(name)
                } else {
                    None
                };
                let value = p.parse_expression()?;
                args.push(Arg { name, value });
                if !p.eat(TokenKind::Comma) {
                    break;
                }
            }
            p.expect(TokenKind::RParen, "to close the argument list")?;
            Ok(args)
        })
    }
}
