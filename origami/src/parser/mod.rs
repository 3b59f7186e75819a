//! Parser for origami source
//!
//! A hand-written recursive descent parser over the logos token stream.
//! Statements dispatch through a [`Router`] keyed by the leading token kind;
//! anything the router does not claim is parsed as an expression statement.
//!
//! The parser is stateful across calls to [`Parser::parse_program`]: the
//! file-level scope, namespace and `use` aliases persist, which is what the
//! REPL relies on. Declarations (functions, classes, interfaces) are
//! registered in the [`Vm`] as soon as they are parsed.

mod class;
mod control;
mod expr;
mod function;
mod ident;
mod literal;
mod module;
mod postfix;
mod router;
mod scope;

#[cfg(test)]
mod tests;

pub use router::{Router, StatementFn};
pub use scope::ScopeManager;

use crate::ast::{Ast, Capture, Node, Program, Span};
use crate::error::{Error, Result};
use crate::interp::Vm;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::types::Type;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 2 * 1024 * 1024;

/// Tokens shown on each side of the offending token in syntax errors.
const CONTEXT_TOKENS: usize = 3;

pub struct Parser {
    vm: Arc<Vm>,
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
    file: Option<Arc<str>>,
    dir: Option<PathBuf>,
    errors: Vec<Error>,
    scopes: ScopeManager,
    namespace: String,
    /// `use` aliases: alias -> qualified name.
    uses: IndexMap<String, String>,
    /// Type parameter names of the class being parsed.
    generics: Vec<String>,
    /// Qualified name of the class being parsed.
    current_class: Option<String>,
    /// Set while parsing `if`/`while`/... conditions, where `Name {` opens
    /// the body rather than a class initializer.
    no_class_init: bool,
    /// Set while parsing `case` patterns, where `NAME:` ends the pattern.
    no_typed_decl: bool,
    router: Router,
}

impl Parser {
    pub fn new(vm: Arc<Vm>) -> Self {
        Parser {
            vm,
            tokens: Vec::new(),
            pos: 0,
            eof: Token::eof(0),
            file: None,
            dir: None,
            errors: Vec::new(),
            scopes: ScopeManager::new(),
            namespace: String::new(),
            uses: IndexMap::new(),
            generics: Vec::new(),
            current_class: None,
            no_class_init: false,
            no_typed_decl: false,
            router: Router::default(),
        }
    }

    /// Source file for spans, `__FILE__` and `__DIR__`.
    pub fn set_file(&mut self, path: &Path) {
        self.file = Some(Arc::from(path.display().to_string()));
        self.dir = path.parent().map(Path::to_path_buf);
    }

    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Errors collected by the last parse.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Add or replace the statement parser for a leading token kind.
    pub fn register_statement(&mut self, kind: TokenKind, parse: StatementFn) {
        self.router.register(kind, parse);
    }

    /// Parse a whole source unit. Malformed statements are collected and
    /// skipped; if any were found the result is an aggregate error whose
    /// children are the individual errors.
    pub fn parse_program(&mut self, source: &str) -> Result<Program> {
        self.tokens = tokenize(source).map_err(|e| e.with_file(self.file.clone()))?;
        self.pos = 0;
        self.errors.clear();
        self.eof = match self.tokens.last() {
            Some(last) => Token {
                kind: TokenKind::Eof,
                literal: String::new(),
                span: Span::at(source.len(), source.len(), last.line(), last.column()),
            },
            None => Token::eof(source.len()),
        };

        let statements = self.parse_statements(|_| false);
        if !self.errors.is_empty() {
            let count = self.errors.len();
            return Err(Error::aggregate(
                format!("{count} syntax errors"),
                self.errors.clone(),
            ));
        }
        debug!(file = ?self.file, statements = statements.len(), "parsed program");
        Ok(Program {
            file: self.file.as_deref().map(str::to_string),
            statements,
        })
    }

    // Token access

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&self.eof)
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.peek(offset).kind
    }

    fn previous(&self) -> &Token {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(token) => token,
            None => self.current(),
        }
    }

    fn at_end(&self) -> bool {
        self.kind() == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !self.at_end() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    /// Consume the current token if it has the given kind.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected `{kind}` {context}")))
        }
    }

    /// Identifier, or a keyword used as a member name.
    fn expect_name(&mut self, context: &str) -> Result<Token> {
        let kind = self.kind();
        if kind == TokenKind::Ident || kind.is_keyword() {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected a name {context}")))
        }
    }

    /// Whether the token at `offset` ends exactly where the next one starts.
    fn adjacent(&self, offset: usize) -> bool {
        let (a, b) = (self.peek(offset), self.peek(offset + 1));
        b.kind != TokenKind::Eof && a.span.is_adjacent_to(&b.span)
    }

    /// Whether the current token touches the previous one.
    fn touches_previous(&self) -> bool {
        self.pos > 0 && self.previous().span.is_adjacent_to(&self.current().span)
    }

    fn skip_semicolon(&mut self) {
        self.eat(TokenKind::Semicolon);
    }

    fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous().span)
    }

    // Errors

    /// Syntax error at the current token, with a window of the tokens
    /// around it.
    fn error(&self, message: impl Into<String>) -> Error {
        let token = self.current();
        let found = match token.kind {
            TokenKind::Eof => "end of file".to_string(),
            _ if token.literal.is_empty() => format!("`{}`", token.kind),
            _ => format!("`{}`", token.literal),
        };
        let from = self.pos.saturating_sub(CONTEXT_TOKENS);
        let to = (self.pos + CONTEXT_TOKENS + 1).min(self.tokens.len());
        let window: Vec<&str> = self
            .tokens
            .get(from..to)
            .unwrap_or_default()
            .iter()
            .map(|t| t.literal.as_str())
            .collect();
        Error::syntax(
            format!(
                "{}, found {found} at {}:{} near `{}`",
                message.into(),
                token.line(),
                token.column(),
                window.join(" ")
            ),
            token.span,
        )
        .with_file(self.file.clone())
    }

    /// Skip to the end of the broken statement: past the next `;`, or up
    /// to (not past) the next `}`. Always makes progress.
    fn recover(&mut self, start: usize) {
        if self.pos == start {
            self.advance();
        }
        while !self.at_end() {
            match self.kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // Statement sequences

    /// Parse statements until `stop` matches the current token or input
    /// ends. Failing statements are collected and skipped.
    fn parse_statements(&mut self, stop: impl Fn(TokenKind) -> bool) -> Vec<Ast> {
        let mut statements = Vec::new();
        while !self.at_end() && !stop(self.kind()) {
            let start = self.pos;
            match self.parse_statement() {
                Ok(Some(stmt)) => statements.push(stmt),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err.message, "syntax error, skipping statement");
                    self.errors.push(err);
                    self.recover(start);
                }
            }
        }
        statements
    }

    /// One statement. `None` for declarations that leave nothing to run
    /// (`use`, empty statements).
    pub fn parse_statement(&mut self) -> Result<Option<Ast>> {
        let parse = self.router.get(self.kind());
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || match parse {
            Some(parse) => parse(self),
            None => self.parse_expression_statement().map(Some),
        })
    }

    /// `{ statements }`
    fn parse_block(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::LBrace, "to open a block")?.span;
        let statements = self.parse_statements(|k| k == TokenKind::RBrace);
        self.expect(TokenKind::RBrace, "to close the block")?;
        Ok(Ast::new(Node::Block(statements), self.span_from(start)))
    }

    /// Statements of a `{ ... }` body, braces consumed.
    fn parse_block_statements(&mut self) -> Result<Vec<Ast>> {
        match self.parse_block()? {
            Ast {
                node: Node::Block(statements),
                ..
            } => Ok(statements),
            other => Ok(vec![other]),
        }
    }

    /// Block, or a single statement as the body of a control structure.
    fn parse_body(&mut self) -> Result<Ast> {
        if self.check(TokenKind::LBrace) {
            return self.parse_block();
        }
        let start = self.current().span;
        let stmt = self.parse_statement()?;
        Ok(stmt.unwrap_or_else(|| Ast::new(Node::Block(Vec::new()), start)))
    }

    /// Expression statement, including `$a, $b = ...` targets.
    fn parse_expression_statement(&mut self) -> Result<Ast> {
        let expr = match self.try_variable_list()? {
            Some(expr) => expr,
            None => self.parse_expression()?,
        };
        self.skip_semicolon();
        Ok(expr)
    }

    /// Run `f` inside a new scope; returns its result and the scope's
    /// capture table.
    fn in_scope<T>(&mut self, is_lambda: bool, f: impl FnOnce(&mut Self) -> Result<T>) -> (Result<T>, Vec<Capture>) {
        self.scopes.push_scope(is_lambda);
        let result = f(self);
        let captures = self.scopes.pop_scope();
        (result, captures)
    }

    /// Run `f` with `Name {` read as the start of a body.
    fn with_condition<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = std::mem::replace(&mut self.no_class_init, true);
        let result = f(self);
        self.no_class_init = saved;
        result
    }

    /// Run `f` with the condition and case-pattern restrictions lifted,
    /// for nested parenthesized or bracketed contexts.
    fn without_restrictions<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = (self.no_class_init, self.no_typed_decl);
        self.no_class_init = false;
        self.no_typed_decl = false;
        let result = f(self);
        (self.no_class_init, self.no_typed_decl) = saved;
        result
    }

    // Types

    /// `int`, `?string`, `List<int>`, a class name or an active type
    /// parameter. `void` and `mixed` yield `None`.
    fn parse_type(&mut self) -> Result<Option<Type>> {
        if self.eat(TokenKind::Question) {
            let inner = self.parse_type()?;
            return Ok(inner.map(|t| Type::Nullable(Box::new(t))));
        }
        if self.eat(TokenKind::Const) {
            let inner = self.parse_type()?;
            return Ok(inner.map(|t| Type::Const(Box::new(t))));
        }
        let token = match self.kind() {
            TokenKind::Ident | TokenKind::Static | TokenKind::Null => self.advance(),
            _ => return Err(self.error("expected a type")),
        };
        let name = token.literal;
        if self.check(TokenKind::Lt) && token.span.is_adjacent_to(&self.current().span) {
            self.advance();
            let args = self.parse_type_list(TokenKind::Gt)?;
            return Ok(Some(Type::Generic {
                name: self.resolve_class_name(&name),
                args,
            }));
        }
        Ok(self.named_type(&name))
    }

    /// Comma-separated types up to `close`, which is consumed.
    fn parse_type_list(&mut self, close: TokenKind) -> Result<Vec<Type>> {
        let mut types = Vec::new();
        while !self.check(close) {
            let ty = self.parse_type()?;
            types.push(ty.unwrap_or(Type::param("mixed")));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(close, "to close the type list")?;
        Ok(types)
    }

    fn named_type(&self, name: &str) -> Option<Type> {
        if self.generics.iter().any(|g| g == name) {
            return Some(Type::param(name));
        }
        match name {
            "self" | "static" => self.current_class.clone().map(|name| Type::Class { name }),
            "null" => None,
            _ if Type::is_base_name(name) => Type::from_name(name),
            _ => match Type::from_name(name)? {
                Type::Class { name } => Some(Type::Class {
                    name: self.resolve_class_name(&name),
                }),
                other => Some(other),
            },
        }
    }

    /// Speculatively parse `<T, U>` right after a name; the cursor is
    /// restored when the tokens do not form a type argument list followed
    /// by `(` or a variable.
    fn try_type_args(&mut self) -> Option<Vec<Type>> {
        if !(self.check(TokenKind::Lt) && self.touches_previous()) {
            return None;
        }
        let saved = self.pos;
        self.advance();
        let args = self.parse_type_list(TokenKind::Gt).ok();
        match args {
            Some(args) if matches!(self.kind(), TokenKind::LParen | TokenKind::Variable) => Some(args),
            _ => {
                self.pos = saved;
                None
            }
        }
    }

    // Names

    /// Qualify a declaration name with the current namespace.
    fn qualify(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}\\{name}", self.namespace)
        }
    }

    /// Resolve a class name as written to the name it is registered under:
    /// `use` aliases first, then the current namespace, then as given.
    fn resolve_class_name(&self, name: &str) -> String {
        if matches!(name, "self" | "static" | "parent") {
            return name.to_string();
        }
        if let Some((first, rest)) = name.split_once('\\') {
            return match self.uses.get(first) {
                Some(target) => format!("{target}\\{rest}"),
                None => name.to_string(),
            };
        }
        if let Some(target) = self.uses.get(name) {
            return target.clone();
        }
        if !self.namespace.is_empty() {
            let qualified = self.qualify(name);
            let known = self.current_class.as_deref() == Some(qualified.as_str())
                || self.vm.get_class(&qualified).is_some()
                || self.vm.get_interface(&qualified).is_some()
                || self.vm.class_path().find_class_file(&qualified).is_some();
            if known {
                return qualified;
            }
        }
        name.to_string()
    }

    /// Whether `name` names a class known right now.
    fn is_known_class(&self, name: &str) -> bool {
        let resolved = self.resolve_class_name(name);
        self.current_class.as_deref() == Some(resolved.as_str())
            || self.vm.get_class(&resolved).is_some()
    }

    /// Make sure a class or interface referenced by a declaration is
    /// registered, loading it through the class path when needed.
    fn ensure_loaded(&self, name: &str) {
        if self.vm.get_class(name).is_some() || self.vm.get_interface(name).is_some() {
            return;
        }
        if let Err(err) = self.vm.class_path().load_class(name, &self.vm) {
            warn!(class = name, error = %err, "could not load referenced class");
        }
    }
}
