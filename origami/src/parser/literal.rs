//! Primary expressions: literals, arrays, object literals, lambdas, `new`

use super::Parser;
use crate::ast::{Ast, Capture, FunctionDecl, Lambda, Node, Param, Span};
use crate::error::Result;
use crate::lexer::{TokenKind, parse_int_literal};
use crate::types::Type;
use std::sync::Arc;

impl Parser {
    pub(super) fn parse_primary(&mut self) -> Result<Ast> {
        let token = self.current().clone();
        let span = token.span;
        let node = match token.kind {
            TokenKind::Int => {
                self.advance();
                match parse_int_literal(&token.literal) {
                    Some(n) => Node::Int(n),
                    // Too large for i64: keep the magnitude as a float.
                    None => match token.literal.replace('_', "").parse::<f64>() {
                        Ok(f) => Node::Float(f),
                        Err(_) => return Err(self.error("invalid integer literal")),
                    },
                }
            }
            TokenKind::Float => {
                self.advance();
                match token.literal.replace('_', "").parse::<f64>() {
                    Ok(f) => Node::Float(f),
                    Err(_) => return Err(self.error("invalid float literal")),
                }
            }
            TokenKind::String => {
                self.advance();
                Node::Str(token.literal)
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Node::Bool(token.kind == TokenKind::True)
            }
            TokenKind::Null => {
                self.advance();
                Node::Null
            }
            TokenKind::Dir => {
                self.advance();
                let dir = self
                    .dir
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| ".".to_string());
                Node::Str(dir)
            }
            TokenKind::File => {
                self.advance();
                Node::Str(self.file.as_deref().unwrap_or_default().to_string())
            }
            TokenKind::Line => {
                self.advance();
                Node::Int(i64::from(token.line()))
            }
            TokenKind::Variable => {
                self.advance();
                Node::Variable(self.variable(&token.literal))
            }
            TokenKind::This => {
                self.advance();
                Node::This
            }
            TokenKind::LBracket => return self.parse_array(),
            TokenKind::LBrace => return self.parse_object_literal(),
            TokenKind::LParen => {
                if self.at_paren_lambda() {
                    return self.parse_paren_lambda();
                }
                self.advance();
                let inner = self.without_restrictions(|p| p.parse_expression())?;
                self.expect(TokenKind::RParen, "to close the parenthesized expression")?;
                return Ok(Ast::new(inner.node, self.span_from(span)));
            }
            TokenKind::Function | TokenKind::Fn => return self.parse_function_expression(),
            TokenKind::New => return self.parse_new(),
            TokenKind::Match => return self.parse_match(),
            TokenKind::Question if self.at_nullable_declaration() => {
                return self.parse_typed_declaration();
            }
            TokenKind::Ident => return self.parse_ident(),
            TokenKind::Static | TokenKind::Parent => return self.parse_class_keyword(),
            _ => return Err(self.error("expected an expression")),
        };
        Ok(Ast::new(node, span))
    }

    /// `[1, 2]` is an array; `[k => v]` and `[k: v]` build an object.
    /// Positional items in a keyed literal get their position as key.
    fn parse_array(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::LBracket, "to open the array")?.span;
        let (items, keyed) = self.without_restrictions(|p| {
            let mut items: Vec<(Option<Ast>, Ast)> = Vec::new();
            let mut keyed = false;
            while !p.check(TokenKind::RBracket) {
                let first = p.parse_expression()?;
                if p.eat(TokenKind::FatArrow) || p.eat(TokenKind::Colon) {
                    keyed = true;
                    let value = p.parse_expression()?;
                    items.push((Some(first), value));
                } else {
                    items.push((None, first));
                }
                if !p.eat(TokenKind::Comma) {
                    break;
                }
            }
            p.expect(TokenKind::RBracket, "to close the array")?;
            Ok((items, keyed))
        })?;
        let span = self.span_from(start);
        if !keyed {
            let values = items.into_iter().map(|(_, v)| v).collect();
            return Ok(Ast::new(Node::Array(values), span));
        }
        let mut next_index = 0i64;
        let pairs = items
            .into_iter()
            .map(|(key, value)| {
                let key = key.unwrap_or_else(|| {
                    let key = Ast::new(Node::Int(next_index), value.span);
                    next_index += 1;
                    key
                });
                (key, value)
            })
            .collect();
        Ok(Ast::new(Node::Object(pairs), span))
    }

    /// `{name: value, "key": value}`
    fn parse_object_literal(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::LBrace, "to open the object")?.span;
        let pairs = self.without_restrictions(|p| {
            let mut pairs = Vec::new();
            while !p.check(TokenKind::RBrace) {
                let key = if matches!(p.kind(), TokenKind::Ident | TokenKind::String)
                    && p.peek_kind(1) == TokenKind::Colon
                {
                    let token = p.advance();
                    Ast::new(Node::Str(token.literal), token.span)
                } else {
                    p.parse_expression()?
                };
                p.expect(TokenKind::Colon, "after object key")?;
                let value = p.parse_expression()?;
                pairs.push((key, value));
                if !p.eat(TokenKind::Comma) {
                    break;
                }
            }
            p.expect(TokenKind::RBrace, "to close the object")?;
            Ok(pairs)
        })?;
        Ok(Ast::new(Node::Object(pairs), self.span_from(start)))
    }

    /// `(` ... matching `)` followed by `=>`.
    fn at_paren_lambda(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0;
        loop {
            match self.peek_kind(offset) {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            offset += 1;
        }
        match self.peek_kind(offset + 1) {
            TokenKind::FatArrow => true,
            // `(a): int => ...`
            TokenKind::Colon => self.peek_kind(offset + 3) == TokenKind::FatArrow,
            _ => false,
        }
    }

    /// `(a, b) => expr` or `(a, b) => { ... }`
    fn parse_paren_lambda(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let (result, captures) = self.in_scope(true, |p| p.lambda_parts(start, false));
        let (params, ret, body) = result?;
        Ok(self.lambda(params, ret, body, captures, start))
    }

    /// `function (...) use (...) { ... }` and `fn (...) => expr`. A named
    /// `function` in expression position is parsed as a lambda too.
    fn parse_function_expression(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let arrow = self.advance().kind == TokenKind::Fn;
        if self.check(TokenKind::Ident) {
            self.advance();
        }
        let (result, captures) = self.in_scope(true, |p| p.lambda_parts(start, !arrow));
        let (params, ret, body) = result?;
        Ok(self.lambda(params, ret, body, captures, start))
    }

    /// Parameters, optional `use (...)`, optional return type and body of
    /// a lambda, inside the already pushed lambda scope.
    fn lambda_parts(&mut self, start: Span, block_body: bool) -> Result<(Vec<Param>, Option<Type>, Vec<Ast>)> {
        let params = self.parse_params()?;
        if block_body && self.eat(TokenKind::Use) {
            // Captures are resolved automatically; naming them just pulls
            // them into the lambda scope.
            self.expect(TokenKind::LParen, "after `use`")?;
            while !self.check(TokenKind::RParen) {
                self.eat(TokenKind::Amp);
                let name = self.expect(TokenKind::Variable, "in `use` list")?.literal;
                self.variable(&name);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "to close the `use` list")?;
        }
        let ret = self.parse_return_type()?;
        let body = if self.eat(TokenKind::FatArrow) {
            if self.check(TokenKind::LBrace) {
                self.parse_block_statements()?
            } else {
                let value = self.parse_expression()?;
                let span = self.span_from(start);
                vec![Ast::new(Node::Return(Some(Box::new(value))), span)]
            }
        } else {
            self.parse_block_statements()?
        };
        Ok((params, ret, body))
    }

    fn lambda(
        &self,
        params: Vec<Param>,
        ret: Option<Type>,
        body: Vec<Ast>,
        captures: Vec<Capture>,
        start: Span,
    ) -> Ast {
        let span = self.span_from(start);
        let func = Arc::new(FunctionDecl {
            name: String::new(),
            params,
            ret,
            body,
            span,
            file: self.file.clone(),
        });
        Ast::new(Node::Lambda(Arc::new(Lambda { func, captures })), span)
    }

    /// `new Name(args)`, `new Name<T>(args)`, `new Name` (no arguments).
    fn parse_new(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::New, "")?.span;
        let class = self.parse_class_reference()?;
        let type_args = if self.check(TokenKind::Lt) && self.touches_previous() {
            self.advance();
            self.parse_type_list(TokenKind::Gt)?
        } else {
            Vec::new()
        };
        let args = if self.check(TokenKind::LParen) {
            self.parse_args()?
        } else {
            Vec::new()
        };
        let new = Ast::new(
            Node::New {
                class,
                type_args,
                args,
            },
            self.span_from(start),
        );
        Ok(new)
    }
}
