//! Bare identifiers
//!
//! A bare name can be many things, decided by what follows it and by what
//! is in scope, checked in this order:
//!
//! 1. `Name {` for a known class: class initializer
//! 2. `name =`: declaration of a variable
//! 3. `Type $x` / `Type x =`: typed declaration
//! 4. `name(` touching: function call (or a call through a variable)
//! 5. `name: type =` touching: typed declaration
//! 6. `Name::member`: static access, `Name::class`
//! 7. `name->` / `name.` touching: variable
//! 8. a declared (or capturable) variable
//! 9. `Name<T>(`: generic instantiation; `Name<T> $x`: typed declaration
//! 10. anything else: a constant, or the name itself as a string

use super::Parser;
use crate::ast::{Ast, Node, Span};
use crate::error::Result;
use crate::lexer::TokenKind;

impl Parser {
    pub(super) fn parse_ident(&mut self) -> Result<Ast> {
        let token = self.current().clone();
        let name = token.literal.clone();
        let start = token.span;

        if self.peek_kind(1) == TokenKind::LBrace && !self.no_class_init && self.is_known_class(&name) {
            return self.parse_class_init();
        }

        match self.peek_kind(1) {
            TokenKind::Assign => {
                self.advance();
                let var = self.declare(&name, None);
                return Ok(Ast::new(Node::Variable(var), start));
            }
            TokenKind::Variable => return self.parse_typed_declaration(),
            TokenKind::Ident if self.peek_kind(2) == TokenKind::Assign => {
                return self.parse_typed_declaration();
            }
            TokenKind::LParen if self.adjacent(0) => {
                self.advance();
                return self.parse_named_call(&name, start);
            }
            TokenKind::Colon if self.at_colon_declaration() => return self.parse_colon_declaration(),
            TokenKind::DoubleColon if self.adjacent(0) => {
                self.advance();
                let class = self.resolve_class_name(&name);
                return self.parse_static_access(class, start);
            }
            TokenKind::Arrow | TokenKind::Dot if self.adjacent(0) => {
                self.advance();
                let var = self.variable(&name);
                return Ok(Ast::new(Node::Variable(var), start));
            }
            _ => {}
        }

        self.advance();
        if let Some(var) = self.scopes.resolve(&name) {
            return Ok(Ast::new(Node::Variable(var), start));
        }
        if let Some(type_args) = self.try_type_args() {
            let class = self.resolve_class_name(&name);
            if self.check(TokenKind::Variable) {
                let var_name = self.advance().literal;
                let ty = crate::types::Type::Generic {
                    name: class,
                    args: type_args,
                };
                let var = self.scopes.add_variable(&var_name, Some(ty));
                return Ok(Ast::new(Node::Variable(var), self.span_from(start)));
            }
            let args = self.parse_args()?;
            return Ok(Ast::new(
                Node::New {
                    class,
                    type_args,
                    args,
                },
                self.span_from(start),
            ));
        }
        Ok(Ast::new(Node::Ident(name), start))
    }

    /// Call by name after the callee token. A declared variable holding a
    /// callable wins over a function of the same name.
    fn parse_named_call(&mut self, name: &str, start: Span) -> Result<Ast> {
        if let Some(var) = self.scopes.resolve(name) {
            let callee = Ast::new(Node::Variable(var), start);
            let args = self.parse_args()?;
            return Ok(Ast::new(
                Node::CallValue {
                    callee: Box::new(callee),
                    args,
                },
                self.span_from(start),
            ));
        }
        let args = self.parse_args()?;
        let (name, candidates) = self.function_candidates(name);
        Ok(Ast::new(
            Node::Call {
                name,
                candidates,
                args,
            },
            self.span_from(start),
        ))
    }

    /// The name a call falls back to, and the qualified names tried first.
    fn function_candidates(&self, name: &str) -> (String, Vec<String>) {
        if let Some((first, rest)) = name.split_once('\\') {
            return match self.uses.get(first) {
                Some(target) => (format!("{target}\\{rest}"), Vec::new()),
                None => (name.to_string(), Vec::new()),
            };
        }
        if let Some(target) = self.uses.get(name) {
            return (target.clone(), Vec::new());
        }
        if self.namespace.is_empty() {
            (name.to_string(), Vec::new())
        } else {
            (name.to_string(), vec![self.qualify(name)])
        }
    }

    /// `Type $x [= value]`, `?Type $x`, `Type x = value`. The type is
    /// recorded on the slot and checked on every assignment.
    pub(super) fn parse_typed_declaration(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let ty = self.parse_type()?;
        let name = match self.kind() {
            TokenKind::Variable | TokenKind::Ident => self.advance().literal,
            _ => return Err(self.error("expected a variable name after the type")),
        };
        let var = self.scopes.add_variable(&name, ty);
        Ok(Ast::new(Node::Variable(var), self.span_from(start)))
    }

    /// `name: type =`, with the colon touching the name. Not inside `case`
    /// patterns, where the colon ends the pattern.
    fn at_colon_declaration(&self) -> bool {
        if self.no_typed_decl || !self.adjacent(0) {
            return false;
        }
        match self.peek_kind(2) {
            TokenKind::Ident => self.peek_kind(3) == TokenKind::Assign,
            TokenKind::Question => {
                self.peek_kind(3) == TokenKind::Ident && self.peek_kind(4) == TokenKind::Assign
            }
            _ => false,
        }
    }

    fn parse_colon_declaration(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let name = self.advance().literal;
        self.expect(TokenKind::Colon, "after the variable name")?;
        let ty = self.parse_type()?;
        let var = self.scopes.add_variable(&name, ty);
        Ok(Ast::new(Node::Variable(var), self.span_from(start)))
    }

    /// After `Class::`: `method(args)`, `$prop`, `CONST`, `class`.
    fn parse_static_access(&mut self, class: String, start: Span) -> Result<Ast> {
        self.expect(TokenKind::DoubleColon, "for static access")?;
        let node = match self.kind() {
            TokenKind::Class => {
                self.advance();
                Node::Str(class)
            }
            TokenKind::Variable => {
                let name = self.advance().literal;
                Node::StaticProperty { class, name }
            }
            _ => {
                let name = self.expect_name("after `::`")?.literal;
                if self.check(TokenKind::LParen) {
                    let args = self.parse_args()?;
                    if class == "parent" {
                        Node::ParentCall { method: name, args }
                    } else {
                        Node::StaticCall {
                            class,
                            method: name,
                            args,
                        }
                    }
                } else {
                    Node::StaticProperty { class, name }
                }
            }
        };
        Ok(Ast::new(node, self.span_from(start)))
    }

    /// `static::...` and `parent::...`
    pub(super) fn parse_class_keyword(&mut self) -> Result<Ast> {
        let token = self.advance();
        if !self.check(TokenKind::DoubleColon) {
            return Err(self.error(format!("expected `::` after `{}`", token.literal)));
        }
        self.parse_static_access(token.literal, token.span)
    }

    /// `Name { prop: value, ... }`: instance with defaults, fields set in
    /// order, no constructor.
    fn parse_class_init(&mut self) -> Result<Ast> {
        let token = self.advance();
        let class = self.resolve_class_name(&token.literal);
        self.expect(TokenKind::LBrace, "to open the initializer")?;
        let fields = self.without_restrictions(|p| {
            let mut fields = Vec::new();
            while !p.check(TokenKind::RBrace) {
                let name = match p.kind() {
                    TokenKind::Variable | TokenKind::String => p.advance().literal,
                    _ => p.expect_name("as a field name")?.literal,
                };
                p.expect(TokenKind::Colon, "after the field name")?;
                let value = p.parse_expression()?;
                fields.push((name, value));
                if !p.eat(TokenKind::Comma) {
                    break;
                }
            }
            p.expect(TokenKind::RBrace, "to close the initializer")?;
            Ok(fields)
        })?;
        Ok(Ast::new(Node::InitClass { class, fields }, self.span_from(token.span)))
    }
}
