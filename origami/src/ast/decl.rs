//! Declarations shared by the parser and the evaluator

use super::{Ast, Span};
use crate::types::Type;
use serde::Serialize;
use std::sync::Arc;

/// A variable resolved to a slot in its frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ty: Option<Type>,
}

impl Variable {
    pub fn new(name: impl Into<String>, index: usize, ty: Option<Type>) -> Self {
        Variable {
            name: name.into(),
            index,
            ty,
        }
    }
}

/// How a parameter binds its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamKind {
    /// One positional or named argument.
    Single,
    /// `...$rest`: every remaining positional argument, as an array.
    Variadic,
    /// `&$x`: shares the caller's storage.
    Reference,
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub var: Variable,
    pub default: Option<Ast>,
    pub kind: ParamKind,
}

#[derive(Debug, Serialize)]
pub struct FunctionDecl {
    /// Namespace-qualified name; empty for anonymous functions.
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<Type>,
    pub body: Vec<Ast>,
    pub span: Span,
    #[serde(skip)]
    pub file: Option<Arc<str>>,
}

impl FunctionDecl {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "{closure}"
        } else {
            &self.name
        }
    }

    /// Positional arguments needed before defaults and variadics kick in.
    pub fn required_params(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| p.default.is_none() && p.kind != ParamKind::Variadic)
            .count()
    }
}

/// Slot copied from the defining frame into a lambda's frame on call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capture {
    pub child: usize,
    pub parent: usize,
}

#[derive(Debug, Serialize)]
pub struct Lambda {
    pub func: Arc<FunctionDecl>,
    pub captures: Vec<Capture>,
}

/// Call argument, optionally named (`f(limit: 3)`).
#[derive(Debug, Clone, Serialize)]
pub struct Arg {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: Ast,
}

impl Arg {
    pub fn positional(value: Ast) -> Self {
        Arg { name: None, value }
    }
}
