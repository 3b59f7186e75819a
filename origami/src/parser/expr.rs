//! Expression parsing by precedence level
//!
//! Lowest to highest: assignment, ternary and `??`, concatenation, `||`,
//! `&&`, equality (with `instanceof` and `like`), relational, additive,
//! multiplicative, unary, postfix, primary.

use super::{Parser, STACK_GROW_SIZE, STACK_RED_ZONE};
use crate::ast::{AssignOp, Ast, BinOp, Node, Span, UnaryOp, Variable};
use crate::error::Result;
use crate::lexer::TokenKind;
use crate::types::Type;

/// Names accepted inside a `(type)` cast.
const CAST_TYPES: [&str; 5] = ["int", "float", "string", "bool", "array"];

impl Parser {
    pub fn parse_expression(&mut self) -> Result<Ast> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.parse_assignment())
    }

    fn parse_assignment(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let target = self.parse_ternary()?;
        let Some(op) = assign_op(self.kind()) else {
            return Ok(target);
        };
        if !is_assignable(&target.node) {
            return Err(self.error("invalid assignment target"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Ast::new(
            Node::Assign {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
            self.span_from(start),
        ))
    }

    /// `$a, $b = expr` / `a, b = expr`. Only tried at statement level, and
    /// only when the names are followed by `=`.
    pub(super) fn try_variable_list(&mut self) -> Result<Option<Ast>> {
        let mut offset = 0;
        let mut count = 0;
        loop {
            if !matches!(self.peek_kind(offset), TokenKind::Variable | TokenKind::Ident) {
                return Ok(None);
            }
            count += 1;
            match self.peek_kind(offset + 1) {
                TokenKind::Comma => offset += 2,
                TokenKind::Assign if count > 1 => break,
                _ => return Ok(None),
            }
        }

        let start = self.current().span;
        let mut vars = Vec::with_capacity(count);
        for _ in 0..count {
            let token = self.advance();
            vars.push(self.declare(&token.literal, None));
            self.eat(TokenKind::Comma);
        }
        let target = Ast::new(Node::VariableList(vars), self.span_from(start));
        self.expect(TokenKind::Assign, "after assignment targets")?;
        let value = self.parse_assignment()?;
        Ok(Some(Ast::new(
            Node::Assign {
                target: Box::new(target),
                op: AssignOp::Assign,
                value: Box::new(value),
            },
            self.span_from(start),
        )))
    }

    /// `?int $x` at the start of an expression: a nullable declaration,
    /// not a ternary.
    pub(super) fn at_nullable_declaration(&self) -> bool {
        self.check(TokenKind::Question)
            && self.peek_kind(1) == TokenKind::Ident
            && self.peek_kind(2) == TokenKind::Variable
    }

    fn parse_ternary(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let cond = self.parse_concat()?;
        match self.kind() {
            TokenKind::Question if !self.at_nullable_declaration() => {
                self.advance();
                if self.eat(TokenKind::Colon) {
                    let otherwise = self.parse_assignment()?;
                    return Ok(Ast::new(
                        Node::Ternary {
                            cond: Box::new(cond),
                            then: None,
                            otherwise: Box::new(otherwise),
                        },
                        self.span_from(start),
                    ));
                }
                let then = self.without_restrictions(|p| p.parse_assignment())?;
                self.expect(TokenKind::Colon, "in ternary expression")?;
                let otherwise = self.parse_assignment()?;
                Ok(Ast::new(
                    Node::Ternary {
                        cond: Box::new(cond),
                        then: Some(Box::new(then)),
                        otherwise: Box::new(otherwise),
                    },
                    self.span_from(start),
                ))
            }
            TokenKind::NullCoalesce => {
                self.advance();
                let rhs = self.parse_ternary()?;
                Ok(Ast::new(
                    Node::NullCoalesce {
                        lhs: Box::new(cond),
                        rhs: Box::new(rhs),
                    },
                    self.span_from(start),
                ))
            }
            _ => Ok(cond),
        }
    }

    fn parse_concat(&mut self) -> Result<Ast> {
        self.binary_level(&[(TokenKind::Dot, BinOp::Concat)], Self::parse_or)
    }

    fn parse_or(&mut self) -> Result<Ast> {
        self.binary_level(&[(TokenKind::OrOr, BinOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Ast> {
        self.binary_level(&[(TokenKind::AndAnd, BinOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.kind() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                TokenKind::EqStrict => BinOp::StrictEq,
                TokenKind::NeStrict => BinOp::StrictNe,
                TokenKind::InstanceOf | TokenKind::Like => {
                    let like = self.advance().kind == TokenKind::Like;
                    let class = self.parse_class_reference()?;
                    let value = Box::new(lhs);
                    let node = if like {
                        Node::Like { value, class }
                    } else {
                        Node::InstanceOf { value, class }
                    };
                    lhs = Ast::new(node, self.span_from(start));
                    continue;
                }
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = binary(op, lhs, rhs, self.span_from(start));
        }
    }

    fn parse_relational(&mut self) -> Result<Ast> {
        self.binary_level(
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Ge, BinOp::Ge),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Ast> {
        self.binary_level(
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Ast> {
        self.binary_level(
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    /// Left-associative level over `ops`, with `next` as the operand parser.
    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinOp)],
        next: fn(&mut Self) -> Result<Ast>,
    ) -> Result<Ast> {
        let start = self.current().span;
        let mut lhs = next(self)?;
        while let Some(&(_, op)) = ops.iter().find(|(kind, _)| self.check(*kind)) {
            self.advance();
            let rhs = next(self)?;
            lhs = binary(op, lhs, rhs, self.span_from(start));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Ast> {
        let start = self.current().span;
        let op = match self.kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Plus => {
                self.advance();
                return self.parse_unary();
            }
            TokenKind::Incr | TokenKind::Decr => {
                let increment = self.advance().kind == TokenKind::Incr;
                let target = self.parse_unary()?;
                if !is_assignable(&target.node) {
                    return Err(self.error("invalid increment target"));
                }
                return Ok(Ast::new(
                    Node::IncDec {
                        target: Box::new(target),
                        increment,
                        prefix: true,
                    },
                    self.span_from(start),
                ));
            }
            TokenKind::LParen if self.at_cast() => {
                self.advance();
                let name = self.advance().literal;
                self.advance();
                let value = self.parse_unary()?;
                let ty = Type::from_name(&name).unwrap_or(Type::String);
                return Ok(Ast::new(
                    Node::Cast {
                        ty,
                        value: Box::new(value),
                    },
                    self.span_from(start),
                ));
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Ast::new(
                    Node::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    self.span_from(start),
                ))
            }
            None => self.parse_postfix(),
        }
    }

    /// `(int)` and friends, but not `(int) =>`, which opens a lambda.
    fn at_cast(&self) -> bool {
        self.peek_kind(1) == TokenKind::Ident
            && CAST_TYPES.contains(&self.peek(1).literal.as_str())
            && self.peek_kind(2) == TokenKind::RParen
            && self.peek_kind(3) != TokenKind::FatArrow
    }

    /// Class name after `instanceof`, `like`, `new` and `catch`.
    pub(super) fn parse_class_reference(&mut self) -> Result<String> {
        let token = match self.kind() {
            TokenKind::Ident | TokenKind::Static | TokenKind::Parent => self.advance(),
            _ => return Err(self.error("expected a class name")),
        };
        Ok(self.resolve_class_name(&token.literal))
    }

    /// Declare `name` in the current scope and return its slot. Reads go
    /// through [`Parser::variable`] instead.
    pub(super) fn declare(&mut self, name: &str, ty: Option<Type>) -> Variable {
        if ty.is_none() {
            if let Some(existing) = self.scopes.resolve(name) {
                return existing;
            }
        }
        self.scopes.add_variable(name, ty)
    }

    /// Reference to `name`: an existing binding (captured from the defining
    /// scope inside lambdas), or a fresh slot.
    pub(super) fn variable(&mut self, name: &str) -> Variable {
        match self.scopes.resolve(name) {
            Some(var) => var,
            None => self.scopes.add_variable(name, None),
        }
    }
}

fn binary(op: BinOp, lhs: Ast, rhs: Ast, span: Span) -> Ast {
    Ast::new(
        Node::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

fn assign_op(kind: TokenKind) -> Option<AssignOp> {
    Some(match kind {
        TokenKind::Assign => AssignOp::Assign,
        TokenKind::PlusEq => AssignOp::Add,
        TokenKind::MinusEq => AssignOp::Sub,
        TokenKind::StarEq => AssignOp::Mul,
        TokenKind::SlashEq => AssignOp::Div,
        TokenKind::PercentEq => AssignOp::Mod,
        TokenKind::DotEq => AssignOp::Concat,
        _ => return None,
    })
}

pub(super) fn is_assignable(node: &Node) -> bool {
    matches!(
        node,
        Node::Variable(_)
            | Node::VariableList(_)
            | Node::Property { .. }
            | Node::Index { .. }
            | Node::StaticProperty { .. }
    )
}
