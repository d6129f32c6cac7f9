//! Token definitions.
//!
//! The lexer is a single pass over the source text. Unknown bytes are skipped
//! silently; the stream always ends with an [`TokenKind::Eof`] terminator.
use crate::syntax::Span;
use logos::{Lexer, Logos};
use smol_str::SmolStr;

/// Consumes the optional balanced argument list of a decorator, e.g. the
/// `(8, 8, 1)` in `@workgroup_size(8, 8, 1)`. The token slice then covers the
/// whole decorator including its arguments.
fn lex_decorator(lex: &mut Lexer<TokenKind>) {
    let rem = lex.remainder();
    if !rem.starts_with('(') {
        return;
    }
    let mut depth = 0usize;
    for (i, c) in rem.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    lex.bump(i + 1);
                    return;
                }
            }
            _ => {}
        }
    }
    // Unbalanced argument list: leave the rest of the input alone and let the
    // parser report the stray tokens.
}

/// Consumes a block comment. An unterminated comment swallows the rest of the
/// input (the line counter keeps advancing through the comment body).
fn lex_block_comment(lex: &mut Lexer<TokenKind>) {
    let rem = lex.remainder();
    match rem.find("*/") {
        Some(pos) => lex.bump(pos + 2),
        None => lex.bump(rem.len()),
    }
}

#[derive(Logos, Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TokenKind {
    #[token("function")]
    Function,
    #[token("fn")]
    Fn,
    #[token("const")]
    Const,
    #[token("let")]
    Let,
    #[token("var")]
    Var,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("return")]
    Return,
    #[token("struct")]
    Struct,
    #[token("export")]
    Export,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[regex("[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fh]?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fh]?")]
    #[regex(r"[0-9]+([eE][+-]?[0-9]+)?[fuih]?")]
    Number,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    Str,

    #[regex(r"@[A-Za-z_][A-Za-z0-9_]*", lex_decorator)]
    Decorator,

    #[regex(r"//[^\n]*")]
    LineComment,
    #[token("/*", lex_block_comment)]
    BlockComment,

    // Operators, longest spellings first by construction (logos picks the
    // longest match).
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("=>")]
    FatArrow,
    #[token("->")]
    Arrow,
    #[token("<<")]
    ShiftLeft,
    #[token(">>")]
    ShiftRight,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
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
    Eq,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,

    Eof,

    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Error,
}

/// The coarse token classification exposed by the token model.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TokenCategory {
    Keyword,
    Identifier,
    Number,
    String,
    Operator,
    Punctuation,
    Decorator,
    Comment,
    Eof,
}

impl TokenKind {
    pub fn category(self) -> TokenCategory {
        use TokenKind::*;
        match self {
            Function | Fn | Const | Let | Var | If | Else | For | While | Return | Struct | Export | Import
            | From | True | False => TokenCategory::Keyword,
            Ident => TokenCategory::Identifier,
            Number => TokenCategory::Number,
            Str => TokenCategory::String,
            Decorator => TokenCategory::Decorator,
            LineComment | BlockComment => TokenCategory::Comment,
            EqEqEq | NotEqEq | EqEq | NotEq | LessEq | GreaterEq | AmpAmp | PipePipe | PlusPlus | MinusMinus
            | PlusEq | MinusEq | StarEq | SlashEq | FatArrow | Arrow | ShiftLeft | ShiftRight | Amp | Pipe
            | Caret | Less | Greater | Plus | Minus | Star | Slash | Percent | Eq | Bang | Tilde => {
                TokenCategory::Operator
            }
            LParen | RParen | LBrace | RBrace | LBracket | RBracket | Semicolon | Colon | Comma | Dot
            | Question => TokenCategory::Punctuation,
            Eof => TokenCategory::Eof,
            Error => TokenCategory::Eof,
        }
    }

    pub fn is_comment(self) -> bool {
        matches!(self, TokenKind::LineComment | TokenKind::BlockComment)
    }
}

/// A token with its literal text and source span.
#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub text: SmolStr,
    pub span: Span,
}
