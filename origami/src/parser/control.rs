//! Control-flow statements

use super::Parser;
use crate::ast::{Ast, Catch, MatchArm, Node, SwitchCase, Variable};
use crate::error::Result;
use crate::lexer::TokenKind;
use crate::types::Type;

/// How many header tokens (after an optional `(`) may hold the `in` of
/// `for $v in $arr`. Anything further belongs to a classic loop.
const FOR_IN_LOOKAHEAD: usize = 4;

impl Parser {
    /// `if (cond)`, `if cond {`, and `if init; cond; step {` (only `cond`
    /// is kept), followed by any number of `elseif`/`else if` and an
    /// optional `else`.
    pub(super) fn parse_if(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::If, "")?.span;
        let cond = self.parse_condition()?;
        let then = self.parse_body()?;
        let mut elifs = Vec::new();
        let mut otherwise = None;
        loop {
            let elif = if self.eat(TokenKind::ElseIf) {
                true
            } else if self.check(TokenKind::Else) && self.peek_kind(1) == TokenKind::If {
                self.advance();
                self.advance();
                true
            } else {
                false
            };
            if elif {
                let cond = self.parse_condition()?;
                let body = self.parse_body()?;
                elifs.push((cond, body));
            } else if self.eat(TokenKind::Else) {
                otherwise = Some(Box::new(self.parse_body()?));
                break;
            } else {
                break;
            }
        }
        Ok(Ast::new(
            Node::If {
                cond: Box::new(cond),
                then: Box::new(then),
                elifs,
                otherwise,
            },
            self.span_from(start),
        ))
    }

    fn parse_condition(&mut self) -> Result<Ast> {
        self.with_condition(|p| {
            let first = p.parse_expression()?;
            if !p.eat(TokenKind::Semicolon) {
                return Ok(first);
            }
            let cond = p.parse_expression()?;
            p.expect(TokenKind::Semicolon, "after the condition")?;
            if !p.check(TokenKind::LBrace) {
                p.parse_expression()?;
            }
            Ok(cond)
        })
    }

    pub(super) fn parse_while(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::While, "")?.span;
        let cond = self.with_condition(|p| p.parse_expression())?;
        let body = self.parse_body()?;
        Ok(Ast::new(
            Node::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            self.span_from(start),
        ))
    }

    pub(super) fn parse_do_while(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Do, "")?.span;
        let body = self.parse_body()?;
        self.expect(TokenKind::While, "after the `do` body")?;
        let cond = self.with_condition(|p| p.parse_expression())?;
        self.skip_semicolon();
        Ok(Ast::new(
            Node::DoWhile {
                body: Box::new(body),
                cond: Box::new(cond),
            },
            self.span_from(start),
        ))
    }

    /// `for $v in expr`, `for $k, $v in expr` (rewritten to a foreach), or
    /// `for (init; cond; step)` with optional parentheses.
    pub(super) fn parse_for(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::For, "")?.span;
        let skip = usize::from(self.check(TokenKind::LParen));
        let is_for_in = (skip..skip + FOR_IN_LOOKAHEAD).any(|i| self.peek_kind(i) == TokenKind::In);
        let parens = self.eat(TokenKind::LParen);

        if is_for_in {
            let first = self.loop_variable()?;
            let (key, value) = if self.eat(TokenKind::Comma) {
                (Some(first), self.loop_variable()?)
            } else {
                (None, first)
            };
            self.expect(TokenKind::In, "in `for ... in` loop")?;
            let iterable = self.with_condition(|p| p.parse_expression())?;
            if parens {
                self.expect(TokenKind::RParen, "to close the loop header")?;
            }
            let body = self.parse_body()?;
            return Ok(Ast::new(
                Node::Foreach {
                    iterable: Box::new(iterable),
                    key,
                    value,
                    body: Box::new(body),
                },
                self.span_from(start),
            ));
        }

        let (init, cond, step) = self.with_condition(|p| {
            let init = p.clause_list(TokenKind::Semicolon)?;
            p.expect(TokenKind::Semicolon, "after the loop initializer")?;
            let cond = if p.check(TokenKind::Semicolon) {
                None
            } else {
                Some(Box::new(p.parse_expression()?))
            };
            p.expect(TokenKind::Semicolon, "after the loop condition")?;
            let close = if parens { TokenKind::RParen } else { TokenKind::LBrace };
            let step = p.clause_list(close)?;
            Ok((init, cond, step))
        })?;
        if parens {
            self.expect(TokenKind::RParen, "to close the loop header")?;
        }
        let body = self.parse_body()?;
        Ok(Ast::new(
            Node::For {
                init,
                cond,
                step,
                body: Box::new(body),
            },
            self.span_from(start),
        ))
    }

    /// Comma-separated expressions up to (not including) `end`.
    fn clause_list(&mut self, end: TokenKind) -> Result<Vec<Ast>> {
        let mut clauses = Vec::new();
        while !self.check(end) {
            clauses.push(self.parse_expression()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(clauses)
    }

    /// Loop variable: `$v`, `v`, or `Type $v`.
    fn loop_variable(&mut self) -> Result<Variable> {
        let ty = if self.kind() == TokenKind::Ident && self.peek_kind(1) == TokenKind::Variable {
            self.parse_type()?
        } else {
            None
        };
        match self.kind() {
            TokenKind::Variable | TokenKind::Ident => {
                let name = self.advance().literal;
                Ok(match ty {
                    Some(ty) => self.scopes.add_variable(&name, Some(ty)),
                    None => self.variable(&name),
                })
            }
            _ => Err(self.error("expected a loop variable")),
        }
    }

    /// `foreach ($arr as $v)`, `foreach ($arr as $k => $v)`, parentheses
    /// optional.
    pub(super) fn parse_foreach(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Foreach, "")?.span;
        let parens = self.eat(TokenKind::LParen);
        let iterable = self.with_condition(|p| p.parse_expression())?;
        self.expect(TokenKind::As, "in foreach")?;
        let first = self.loop_variable()?;
        let (key, value) = if self.eat(TokenKind::FatArrow) {
            (Some(first), self.loop_variable()?)
        } else {
            (None, first)
        };
        if parens {
            self.expect(TokenKind::RParen, "to close the foreach header")?;
        }
        let body = self.parse_body()?;
        Ok(Ast::new(
            Node::Foreach {
                iterable: Box::new(iterable),
                key,
                value,
                body: Box::new(body),
            },
            self.span_from(start),
        ))
    }

    /// `switch (x) { case a: ... default: ... }`. Cases fall through until
    /// `break`.
    pub(super) fn parse_switch(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Switch, "")?.span;
        let subject = self.with_condition(|p| p.parse_expression())?;
        self.expect(TokenKind::LBrace, "to open the switch body")?;
        let mut cases = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            let pattern = if self.eat(TokenKind::Default) {
                None
            } else {
                self.expect(TokenKind::Case, "or `default` in switch")?;
                let saved = std::mem::replace(&mut self.no_typed_decl, true);
                let pattern = self.parse_expression();
                self.no_typed_decl = saved;
                Some(pattern?)
            };
            if !self.eat(TokenKind::Colon) {
                self.expect(TokenKind::Semicolon, "after the case pattern")?;
            }
            let body = self.parse_statements(|k| {
                matches!(k, TokenKind::Case | TokenKind::Default | TokenKind::RBrace)
            });
            cases.push(SwitchCase { pattern, body });
        }
        self.expect(TokenKind::RBrace, "to close the switch body")?;
        Ok(Ast::new(
            Node::Switch {
                subject: Box::new(subject),
                cases,
            },
            self.span_from(start),
        ))
    }

    /// `match (x) { 1, 2 => expr; default => { ... } }`. Arms are
    /// separated by `,` or `;`.
    pub(super) fn parse_match(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Match, "")?.span;
        let subject = self.with_condition(|p| p.parse_expression())?;
        self.expect(TokenKind::LBrace, "to open the match body")?;
        let mut arms = Vec::new();
        let mut default = None;
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            if self.eat(TokenKind::Default) {
                self.expect(TokenKind::FatArrow, "after `default`")?;
                default = Some(Box::new(self.match_body()?));
            } else {
                let mut patterns = Vec::new();
                loop {
                    patterns.push(self.without_restrictions(|p| p.parse_expression())?);
                    if !self.eat(TokenKind::Comma) || self.check(TokenKind::FatArrow) {
                        break;
                    }
                }
                self.expect(TokenKind::FatArrow, "after the match pattern")?;
                let body = self.match_body()?;
                arms.push(MatchArm { patterns, body });
            }
            while self.eat(TokenKind::Comma) || self.eat(TokenKind::Semicolon) {}
        }
        self.expect(TokenKind::RBrace, "to close the match body")?;
        Ok(Ast::new(
            Node::Match {
                subject: Box::new(subject),
                arms,
                default,
            },
            self.span_from(start),
        ))
    }

    fn match_body(&mut self) -> Result<Ast> {
        if self.check(TokenKind::LBrace) {
            self.parse_block()
        } else {
            self.without_restrictions(|p| p.parse_expression())
        }
    }

    /// `try { } catch (Type $e) { } finally { }`. A catch without a type
    /// catches `Exception`.
    pub(super) fn parse_try(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Try, "")?.span;
        let body = self.parse_block()?;
        let mut catches = Vec::new();
        while self.eat(TokenKind::Catch) {
            let parens = self.eat(TokenKind::LParen);
            let class = if self.check(TokenKind::Ident) {
                self.parse_class_reference()?
            } else {
                "Exception".to_string()
            };
            let var = if self.check(TokenKind::Variable) {
                let name = self.advance().literal;
                let ty = Type::Class {
                    name: class.clone(),
                };
                Some(self.scopes.add_variable(&name, Some(ty)))
            } else {
                None
            };
            if parens {
                self.expect(TokenKind::RParen, "to close the catch clause")?;
            }
            let body = self.parse_block()?;
            catches.push(Catch { class, var, body });
        }
        let finally = if self.eat(TokenKind::Finally) {
            Some(Box::new(self.parse_block()?))
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            return Err(self.error("expected `catch` or `finally` after the try block"));
        }
        Ok(Ast::new(
            Node::Try {
                body: Box::new(body),
                catches,
                finally,
            },
            self.span_from(start),
        ))
    }

    pub(super) fn parse_throw(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Throw, "")?.span;
        let value = self.parse_expression()?;
        self.skip_semicolon();
        Ok(Ast::new(Node::Throw(Box::new(value)), self.span_from(start)))
    }

    /// `return;`, `return x;`, `return a, b;`
    pub(super) fn parse_return(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Return, "")?.span;
        if matches!(
            self.kind(),
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            self.skip_semicolon();
            return Ok(Ast::new(Node::Return(None), start));
        }
        let mut values = vec![self.parse_expression()?];
        while self.eat(TokenKind::Comma) {
            values.push(self.parse_expression()?);
        }
        self.skip_semicolon();
        let span = self.span_from(start);
        if values.len() == 1 {
            let value = values.remove(0);
            return Ok(Ast::new(Node::Return(Some(Box::new(value))), span));
        }
        Ok(Ast::new(Node::Returns(values), span))
    }

    pub(super) fn parse_break(&mut self) -> Result<Ast> {
        let token = self.expect(TokenKind::Break, "")?;
        self.skip_semicolon();
        Ok(Ast::new(Node::Break, token.span))
    }

    pub(super) fn parse_continue(&mut self) -> Result<Ast> {
        let token = self.expect(TokenKind::Continue, "")?;
        self.skip_semicolon();
        Ok(Ast::new(Node::Continue, token.span))
    }

    /// `spawn` followed by a lambda, a call, or a loop statement.
    pub(super) fn parse_spawn(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Spawn, "")?.span;
        let unit = match self.kind() {
            TokenKind::For | TokenKind::Foreach | TokenKind::While | TokenKind::LBrace => {
                match self.parse_statement()? {
                    Some(stmt) => stmt,
                    None => return Err(self.error("expected a statement after `spawn`")),
                }
            }
            _ => {
                let expr = self.parse_expression()?;
                self.skip_semicolon();
                expr
            }
        };
        Ok(Ast::new(Node::Spawn(Box::new(unit)), self.span_from(start)))
    }

    pub(super) fn parse_echo(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Echo, "")?.span;
        let mut items = vec![self.parse_expression()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_expression()?);
        }
        self.skip_semicolon();
        Ok(Ast::new(Node::Echo(items), self.span_from(start)))
    }
}
