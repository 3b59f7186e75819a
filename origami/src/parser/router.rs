//! Statement dispatch table

use super::Parser;
use crate::ast::Ast;
use crate::error::Result;
use crate::lexer::TokenKind;
use std::collections::HashMap;

/// Parses one statement starting at its leading token. `None` means the
/// statement was consumed but produced nothing to evaluate.
pub type StatementFn = fn(&mut Parser) -> Result<Option<Ast>>;

/// Maps a leading token kind to its statement parser. The table is open:
/// [`Parser::register_statement`] adds or replaces entries.
pub struct Router {
    table: HashMap<TokenKind, StatementFn>,
}

impl Router {
    pub fn register(&mut self, kind: TokenKind, parse: StatementFn) {
        self.table.insert(kind, parse);
    }

    pub fn get(&self, kind: TokenKind) -> Option<StatementFn> {
        self.table.get(&kind).copied()
    }

    pub fn contains(&self, kind: TokenKind) -> bool {
        self.table.contains_key(&kind)
    }
}

impl Default for Router {
    fn default() -> Self {
        let mut router = Router {
            table: HashMap::new(),
        };
        router.register(TokenKind::If, |p| p.parse_if().map(Some));
        router.register(TokenKind::For, |p| p.parse_for().map(Some));
        router.register(TokenKind::Foreach, |p| p.parse_foreach().map(Some));
        router.register(TokenKind::While, |p| p.parse_while().map(Some));
        router.register(TokenKind::Do, |p| p.parse_do_while().map(Some));
        router.register(TokenKind::Switch, |p| p.parse_switch().map(Some));
        router.register(TokenKind::Try, |p| p.parse_try().map(Some));
        router.register(TokenKind::Throw, |p| p.parse_throw().map(Some));
        router.register(TokenKind::Return, |p| p.parse_return().map(Some));
        router.register(TokenKind::Break, |p| p.parse_break().map(Some));
        router.register(TokenKind::Continue, |p| p.parse_continue().map(Some));
        router.register(TokenKind::Spawn, |p| p.parse_spawn().map(Some));
        router.register(TokenKind::Echo, |p| p.parse_echo().map(Some));
        router.register(TokenKind::LBrace, |p| p.parse_block().map(Some));
        router.register(TokenKind::Semicolon, |p| {
            p.advance();
            Ok(None)
        });
        router.register(TokenKind::Function, Parser::parse_function_statement);
        router.register(TokenKind::Class, |p| p.parse_class(Vec::new()).map(Some));
        router.register(TokenKind::Interface, |p| p.parse_interface().map(Some));
        router.register(TokenKind::At, Parser::parse_annotated);
        router.register(TokenKind::Namespace, |p| p.parse_namespace().map(Some));
        router.register(TokenKind::Use, Parser::parse_use);
        router.register(TokenKind::Const, |p| p.parse_const().map(Some));
        router.register(TokenKind::Var, |p| p.parse_var().map(Some));
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::{OutputBuffer, Vm};

    #[test]
    fn test_default_table_covers_statement_keywords() {
        let router = Router::default();
        for kind in [
            TokenKind::If,
            TokenKind::For,
            TokenKind::Foreach,
            TokenKind::Switch,
            TokenKind::Try,
            TokenKind::Class,
            TokenKind::Namespace,
            TokenKind::Use,
        ] {
            assert!(router.contains(kind), "missing {kind}");
        }
        assert!(!router.contains(TokenKind::Match));
        assert!(!router.contains(TokenKind::Variable));
    }

    #[test]
    fn test_register_replaces_entry() {
        let mut parser = Parser::new(Vm::with_output(Box::new(OutputBuffer::new())));
        assert_eq!(parser.parse_program("echo 1;").unwrap().statements.len(), 1);

        parser.register_statement(TokenKind::Echo, |p| {
            while !p.check(TokenKind::Semicolon) && !p.check(TokenKind::Eof) {
                p.advance();
            }
            p.advance();
            Ok(None)
        });
        let program = parser.parse_program("echo 1; echo 2;").unwrap();
        assert!(program.statements.is_empty());
    }
}
