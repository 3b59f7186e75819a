//! Namespaces, `use` imports and module-level declarations

use super::Parser;
use crate::ast::{Ast, AssignOp, Node};
use crate::error::Result;
use crate::lexer::TokenKind;
use tracing::debug;

impl Parser {
    /// `namespace A\B;` switches the namespace for the rest of the file and
    /// registers the file's directory as a root for it. `namespace A\B { }`
    /// scopes the namespace to the block.
    pub(super) fn parse_namespace(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Namespace, "")?.span;
        let token = self.expect(TokenKind::Ident, "after `namespace`")?;
        let name = token.literal.trim_start_matches('\\').to_string();

        if self.check(TokenKind::LBrace) {
            let saved = std::mem::replace(&mut self.namespace, name.clone());
            let body = self.parse_block_statements();
            self.namespace = saved;
            let body = body?;
            return Ok(Ast::new(
                Node::Namespace {
                    name,
                    body: Some(body),
                },
                self.span_from(start),
            ));
        }

        self.skip_semicolon();
        self.namespace = name.clone();
        if let Some(dir) = &self.dir {
            self.vm.class_path().add_namespace(&name, dir);
        }
        debug!(namespace = %name, "namespace set");
        Ok(Ast::new(Node::Namespace { name, body: None }, self.span_from(start)))
    }

    /// `use A\B\C;` or `use A\B\C as D;`. The alias defaults to the last
    /// segment. Produces no statement.
    pub(super) fn parse_use(&mut self) -> Result<Option<Ast>> {
        self.expect(TokenKind::Use, "")?;
        let target = self.expect(TokenKind::Ident, "after `use`")?.literal;
        let target = target.trim_start_matches('\\').to_string();
        let alias = if self.eat(TokenKind::As) {
            self.expect(TokenKind::Ident, "after `as`")?.literal
        } else {
            match target.rsplit_once('\\') {
                Some((_, last)) => last.to_string(),
                None => target.clone(),
            }
        };
        self.expect(TokenKind::Semicolon, "after `use` declaration")?;
        debug!(alias = %alias, target = %target, "use alias");
        self.uses.insert(alias, target);
        Ok(None)
    }

    /// `const NAME = value;`
    pub(super) fn parse_const(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Const, "")?.span;
        let name = self.expect(TokenKind::Ident, "after `const`")?.literal;
        self.expect(TokenKind::Assign, "after the constant name")?;
        let value = self.parse_expression()?;
        self.skip_semicolon();
        Ok(Ast::new(
            Node::Const {
                name: self.qualify(&name),
                value: Box::new(value),
            },
            self.span_from(start),
        ))
    }

    /// `var $x;`, `var x: int = 1;`. Always declares in the current scope,
    /// shadowing anything capturable from an enclosing lambda scope.
    pub(super) fn parse_var(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Var, "")?.span;
        let name = match self.kind() {
            TokenKind::Variable | TokenKind::Ident => self.advance().literal,
            _ => return Err(self.error("expected a variable name after `var`")),
        };
        let ty = if self.eat(TokenKind::Colon) {
            self.parse_type()?
        } else {
            None
        };
        let var = self.scopes.add_variable(&name, ty);
        let target = Ast::new(Node::Variable(var), self.span_from(start));
        let stmt = if self.eat(TokenKind::Assign) {
            let value = self.parse_expression()?;
            Ast::new(
                Node::Assign {
                    target: Box::new(target),
                    op: AssignOp::Assign,
                    value: Box::new(value),
                },
                self.span_from(start),
            )
        } else {
            target
        };
        self.skip_semicolon();
        Ok(stmt)
    }
}
