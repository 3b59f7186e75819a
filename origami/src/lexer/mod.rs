//! Lexer implementation using logos
//!
//! Produces the token stream the parser consumes: kind, literal text,
//! byte offsets and 1-based line/column.

mod token;

pub use token::TokenKind;

use crate::ast::Span;
use crate::error::{Error, Result};
use logos::Logos;
use serde::Serialize;

/// A lexed token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text. Variables drop the `$`, strings are unescaped, qualified
    /// names drop a leading `\`.
    pub literal: String,
    pub span: Span,
}

impl Token {
    pub fn eof(at: usize) -> Self {
        Token {
            kind: TokenKind::Eof,
            literal: String::new(),
            span: Span::new(at, at),
        }
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    pub fn line(&self) -> u32 {
        self.span.line
    }

    pub fn column(&self) -> u32 {
        self.span.column
    }
}

/// Byte offsets of every line start, for offset -> line/column lookups.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { starts }
    }

    fn position(&self, offset: usize) -> (u32, u32) {
        let line = match self.starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let column = offset - self.starts[line];
        (line as u32 + 1, column as u32 + 1)
    }
}

/// Tokenize source code
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let lines = LineIndex::new(source);
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let (line, column) = lines.position(range.start);
        let span = Span::at(range.start, range.end, line, column);
        let kind = match result {
            Ok(kind) => kind,
            Err(_) => {
                return Err(Error::syntax(
                    format!("unexpected character: {:?}", lexer.slice()),
                    span,
                ));
            }
        };
        if matches!(kind, TokenKind::OpenTag | TokenKind::CloseTag) {
            continue;
        }
        let slice = lexer.slice();
        let literal = match kind {
            TokenKind::String => token::unescape(slice),
            TokenKind::Variable => slice[1..].to_string(),
            TokenKind::Ident => slice.trim_start_matches('\\').to_string(),
            _ => slice.to_string(),
        };
        tokens.push(Token {
            kind,
            literal,
            span,
        });
    }

    Ok(tokens)
}

/// Parse an integer literal in any of the supported radixes.
pub fn parse_int_literal(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "");
    let lower = cleaned.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_keywords() {
        assert_eq!(
            kinds("if elseif else foreach in as"),
            vec![
                TokenKind::If,
                TokenKind::ElseIf,
                TokenKind::Else,
                TokenKind::Foreach,
                TokenKind::In,
                TokenKind::As
            ]
        );
    }

    #[test]
    fn test_tokenize_variable_literal_drops_dollar() {
        let tokens = tokenize("$count").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Variable);
        assert_eq!(tokens[0].literal, "count");
    }

    #[test]
    fn test_tokenize_this_is_keyword() {
        assert_eq!(kinds("$this $thisOne"), vec![TokenKind::This, TokenKind::Variable]);
    }

    #[test]
    fn test_tokenize_qualified_name() {
        let tokens = tokenize(r"App\Models\User \Root").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].literal, r"App\Models\User");
        assert_eq!(tokens[1].literal, "Root");
    }

    #[test]
    fn test_tokenize_numbers() {
        let tokens = tokenize("42 1.5 0x1F 2e3").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Int);
        assert_eq!(tokens[1].kind, TokenKind::Float);
        assert_eq!(tokens[2].kind, TokenKind::Int);
        assert_eq!(parse_int_literal(&tokens[2].literal), Some(31));
        assert_eq!(tokens[3].kind, TokenKind::Float);
    }

    #[test]
    fn test_tokenize_range_is_not_float() {
        assert_eq!(
            kinds("1..5"),
            vec![TokenKind::Int, TokenKind::DoubleDot, TokenKind::Int]
        );
    }

    #[test]
    fn test_tokenize_strings() {
        let tokens = tokenize(r#""a\tb" 'raw\n'"#).unwrap();
        assert_eq!(tokens[0].literal, "a\tb");
        assert_eq!(tokens[1].literal, "raw\\n");
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("=== !== ?? -> => :: .. ..."),
            vec![
                TokenKind::EqStrict,
                TokenKind::NeStrict,
                TokenKind::NullCoalesce,
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::DoubleColon,
                TokenKind::DoubleDot,
                TokenKind::Ellipsis
            ]
        );
    }

    #[test]
    fn test_tokenize_skips_comments_and_tags() {
        assert_eq!(
            kinds("<?php // line\n# hash\n/* block\n */ echo ?>"),
            vec![TokenKind::Echo]
        );
    }

    #[test]
    fn test_token_positions() {
        let tokens = tokenize("a\n  $b").unwrap();
        assert_eq!((tokens[0].line(), tokens[0].column()), (1, 1));
        assert_eq!((tokens[1].line(), tokens[1].column()), (2, 3));
        assert_eq!(tokens[1].start(), 4);
        assert_eq!(tokens[1].end(), 6);
    }

    #[test]
    fn test_call_adjacency_offsets() {
        let tight = tokenize("foo(1)").unwrap();
        assert_eq!(tight[0].end(), tight[1].start());
        let spaced = tokenize("foo (1)").unwrap();
        assert_ne!(spaced[0].end(), spaced[1].start());
    }

    #[test]
    fn test_tokenize_error() {
        let err = tokenize("a ` b").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
        assert_eq!(err.span().map(|s| s.start), Some(2));
    }

    #[test]
    fn test_parse_int_radixes() {
        assert_eq!(parse_int_literal("0b101"), Some(5));
        assert_eq!(parse_int_literal("0o17"), Some(15));
        assert_eq!(parse_int_literal("1_000"), Some(1000));
    }
}
