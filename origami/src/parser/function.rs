//! Function declarations, parameter lists and return types

use super::Parser;
use crate::ast::{Ast, FunctionDecl, Node, Param, ParamKind};
use crate::error::Result;
use crate::lexer::TokenKind;
use crate::types::Type;
use std::sync::Arc;

impl Parser {
    /// `function name(...) {}` declares; `function (...) {}` at statement
    /// level is an expression statement.
    pub(super) fn parse_function_statement(&mut self) -> Result<Option<Ast>> {
        if self.peek_kind(1) != TokenKind::Ident {
            return self.parse_expression_statement().map(Some);
        }
        let decl = self.parse_function_decl()?;
        Ok(Some(Ast::new(Node::FunctionDecl(decl.clone()), decl.span)))
    }

    /// Parse a named function and register it under its qualified name.
    pub(super) fn parse_function_decl(&mut self) -> Result<Arc<FunctionDecl>> {
        let start = self.expect(TokenKind::Function, "")?.span;
        let name = self.expect(TokenKind::Ident, "after `function`")?.literal;
        let name = self.qualify(&name);
        let (params, ret, body) = self.function_parts(false)?;
        let decl = Arc::new(FunctionDecl {
            name,
            params,
            ret,
            body,
            span: self.span_from(start),
            file: self.file.clone(),
        });
        self.vm.add_func(decl.clone());
        Ok(decl)
    }

    /// Parameters, return type and body in a fresh function scope. With
    /// `allow_abstract`, a `;` in place of the body yields an empty body.
    pub(super) fn function_parts(&mut self, allow_abstract: bool) -> Result<(Vec<Param>, Option<Type>, Vec<Ast>)> {
        let (result, _) = self.in_scope(false, |p| {
            let params = p.parse_params()?;
            let ret = p.parse_return_type()?;
            let body = if allow_abstract && p.eat(TokenKind::Semicolon) {
                Vec::new()
            } else {
                p.parse_block_statements()?
            };
            Ok((params, ret, body))
        });
        result
    }

    /// `( param, ... )`. Each parameter is declared in the current scope in
    /// order, so parameter `i` occupies slot `i`.
    pub(super) fn parse_params(&mut self) -> Result<Vec<Param>> {
        self.expect(TokenKind::LParen, "to open the parameter list")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            params.push(self.parse_param()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "to close the parameter list")?;
        Ok(params)
    }

    /// `[Type] [&|...]$name [= default]` or `name[: Type] [= default]`.
    fn parse_param(&mut self) -> Result<Param> {
        let typed = self.check(TokenKind::Question)
            || (self.check(TokenKind::Ident)
                && !matches!(
                    self.peek_kind(1),
                    TokenKind::Comma | TokenKind::RParen | TokenKind::Colon | TokenKind::Assign
                ));
        let mut ty = if typed { self.parse_type()? } else { None };
        let kind = if self.eat(TokenKind::Amp) {
            ParamKind::Reference
        } else if self.eat(TokenKind::Ellipsis) {
            ParamKind::Variadic
        } else {
            ParamKind::Single
        };
        let name = match self.kind() {
            TokenKind::Variable | TokenKind::Ident => self.advance().literal,
            _ => return Err(self.error("expected a parameter name")),
        };
        if ty.is_none() && self.eat(TokenKind::Colon) {
            ty = self.parse_type()?;
        }
        let var = self.scopes.add_variable(&name, ty);
        let default = if self.eat(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Param { var, default, kind })
    }

    /// `: type`, `: ?type`, `: (int, string)`. Absent or `void` is `None`.
    pub(super) fn parse_return_type(&mut self) -> Result<Option<Type>> {
        if !self.eat(TokenKind::Colon) {
            return Ok(None);
        }
        if self.eat(TokenKind::LParen) {
            let elems = self.parse_type_list(TokenKind::RParen)?;
            return Ok(Some(Type::MultipleReturn(elems)));
        }
        self.parse_type()
    }
}
