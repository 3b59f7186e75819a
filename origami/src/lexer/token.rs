//! Token definitions

use logos::Logos;
use serde::Serialize;

/// Token kind.
///
/// Kinds carry no payload so they can key the statement router table; the
/// literal text lives on [`Token`].
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[logos(skip r"[ \t\n\r\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
#[logos(skip(r"#[^\n]*", allow_greedy = true))]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum TokenKind {
    // Keywords
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("elseif")]
    ElseIf,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("for")]
    For,
    #[token("foreach")]
    Foreach,
    #[token("in")]
    In,
    #[token("as")]
    As,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("default")]
    Default,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("return")]
    Return,
    #[token("function")]
    Function,
    #[token("fn")]
    Fn,
    #[token("class")]
    Class,
    #[token("interface")]
    Interface,
    #[token("extends")]
    Extends,
    #[token("implements")]
    Implements,
    #[token("public")]
    Public,
    #[token("private")]
    Private,
    #[token("protected")]
    Protected,
    #[token("static")]
    Static,
    #[token("const")]
    Const,
    #[token("var")]
    Var,
    #[token("new")]
    New,
    #[token("instanceof")]
    InstanceOf,
    #[token("like")]
    Like,
    #[token("namespace")]
    Namespace,
    #[token("use")]
    Use,
    #[token("echo")]
    Echo,
    #[token("throw")]
    Throw,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("spawn")]
    Spawn,
    #[token("match")]
    Match,
    #[token("parent")]
    Parent,
    #[token("$this")]
    This,
    #[token("__DIR__")]
    Dir,
    #[token("__FILE__")]
    File,
    #[token("__LINE__")]
    Line,

    // Literals
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+", priority = 3)]
    Float,
    #[regex(r"0[xX][0-9a-fA-F][0-9a-fA-F_]*", priority = 3)]
    #[regex(r"0[oO][0-7][0-7_]*", priority = 3)]
    #[regex(r"0[bB][01][01_]*", priority = 3)]
    #[regex(r"[0-9]+", priority = 2)]
    Int,
    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r"'([^'\\]|\\.)*'")]
    String,
    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_]*", priority = 1)]
    Variable,
    /// Plain or namespace-qualified name (`Foo`, `App\Models\User`, `\Foo`).
    #[regex(r"\\?[a-zA-Z_][a-zA-Z0-9_]*(\\[a-zA-Z_][a-zA-Z0-9_]*)*", priority = 1)]
    Ident,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token(".=")]
    DotEq,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("===")]
    EqStrict,
    #[token("!==")]
    NeStrict,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("&")]
    Amp,
    #[token("++")]
    Incr,
    #[token("--")]
    Decr,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("?")]
    Question,
    #[token("??")]
    NullCoalesce,
    #[token(":")]
    Colon,
    #[token("::")]
    DoubleColon,
    #[token(".")]
    Dot,
    #[token("..")]
    DoubleDot,
    #[token("...")]
    Ellipsis,
    #[token("@")]
    At,

    // Delimiters
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    #[token("<?php")]
    OpenTag,
    #[token("?>")]
    CloseTag,

    /// Synthesized past the last token; never produced by the lexer.
    Eof,
}

impl TokenKind {
    /// Keywords are accepted as member names after `.` and `->`.
    pub fn is_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            If | Else
                | ElseIf
                | While
                | Do
                | For
                | Foreach
                | In
                | As
                | Switch
                | Case
                | Default
                | Break
                | Continue
                | Return
                | Function
                | Fn
                | Class
                | Interface
                | Extends
                | Implements
                | Public
                | Private
                | Protected
                | Static
                | Const
                | Var
                | New
                | InstanceOf
                | Like
                | Namespace
                | Use
                | Echo
                | Throw
                | Try
                | Catch
                | Finally
                | Spawn
                | Match
                | Parent
                | Null
                | True
                | False
        )
    }

    pub fn is_assign_op(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Assign | PlusEq | MinusEq | StarEq | SlashEq | PercentEq | DotEq
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenKind::Float => "float literal",
            TokenKind::Int => "integer literal",
            TokenKind::String => "string literal",
            TokenKind::Variable => "variable",
            TokenKind::Ident => "identifier",
            TokenKind::Eof => "end of file",
            TokenKind::This => "$this",
            other => return write!(f, "{}", symbol(*other)),
        };
        write!(f, "{text}")
    }
}

fn symbol(kind: TokenKind) -> &'static str {
    use TokenKind::*;
    match kind {
        If => "if",
        Else => "else",
        ElseIf => "elseif",
        While => "while",
        Do => "do",
        For => "for",
        Foreach => "foreach",
        In => "in",
        As => "as",
        Switch => "switch",
        Case => "case",
        Default => "default",
        Break => "break",
        Continue => "continue",
        Return => "return",
        Function => "function",
        Fn => "fn",
        Class => "class",
        Interface => "interface",
        Extends => "extends",
        Implements => "implements",
        Public => "public",
        Private => "private",
        Protected => "protected",
        Static => "static",
        Const => "const",
        Var => "var",
        New => "new",
        InstanceOf => "instanceof",
        Like => "like",
        Namespace => "namespace",
        Use => "use",
        Echo => "echo",
        Throw => "throw",
        Try => "try",
        Catch => "catch",
        Finally => "finally",
        Spawn => "spawn",
        Match => "match",
        Parent => "parent",
        Dir => "__DIR__",
        File => "__FILE__",
        Line => "__LINE__",
        Null => "null",
        True => "true",
        False => "false",
        Plus => "+",
        Minus => "-",
        Star => "*",
        Slash => "/",
        Percent => "%",
        Assign => "=",
        PlusEq => "+=",
        MinusEq => "-=",
        StarEq => "*=",
        SlashEq => "/=",
        PercentEq => "%=",
        DotEq => ".=",
        Eq => "==",
        Ne => "!=",
        EqStrict => "===",
        NeStrict => "!==",
        Lt => "<",
        Gt => ">",
        Le => "<=",
        Ge => ">=",
        AndAnd => "&&",
        OrOr => "||",
        Bang => "!",
        Amp => "&",
        Incr => "++",
        Decr => "--",
        Arrow => "->",
        FatArrow => "=>",
        Question => "?",
        NullCoalesce => "??",
        Colon => ":",
        DoubleColon => "::",
        Dot => ".",
        DoubleDot => "..",
        Ellipsis => "...",
        At => "@",
        Comma => ",",
        Semicolon => ";",
        LParen => "(",
        RParen => ")",
        LBracket => "[",
        RBracket => "]",
        LBrace => "{",
        RBrace => "}",
        OpenTag => "<?php",
        CloseTag => "?>",
        Float | Int | String | Variable | Ident | Eof | This => "",
    }
}

/// Decode the body of a quoted string literal (quotes included in `raw`).
pub(crate) fn unescape(raw: &str) -> String {
    let quote = raw.chars().next().unwrap_or('"');
    let inner = &raw[1..raw.len().saturating_sub(1).max(1)];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match (quote, chars.next()) {
            ('"', Some('n')) => result.push('\n'),
            ('"', Some('t')) => result.push('\t'),
            ('"', Some('r')) => result.push('\r'),
            ('"', Some('0')) => result.push('\0'),
            ('"', Some('$')) => result.push('$'),
            (_, Some('\\')) => result.push('\\'),
            (q, Some(c)) if c == q => result.push(c),
            (_, Some(other)) => {
                result.push('\\');
                result.push(other);
            }
            (_, None) => result.push('\\'),
        }
    }
    result
}
