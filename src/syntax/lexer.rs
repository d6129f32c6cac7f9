//! Source text to token stream.
use crate::syntax::{
    token::{Token, TokenKind},
    Span,
};
use logos::Logos;
use smol_str::SmolStr;
use tracing::trace;

/// Tokenizes the whole source, skipping unrecognized bytes.
///
/// There are no lexical errors: bytes the grammar does not know are dropped
/// and lexing resumes at the next recognizable token. The returned stream
/// always ends with a single [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    while let Some(kind) = lexer.next() {
        if kind == TokenKind::Error {
            continue;
        }
        let span = lexer.span();
        tokens.push(Token {
            kind,
            text: SmolStr::new(lexer.slice()),
            span: Span::new(span.start as u32, span.end as u32),
        });
    }
    let end = source.len() as u32;
    tokens.push(Token {
        kind: TokenKind::Eof,
        text: SmolStr::default(),
        span: Span::new(end, end),
    });
    trace!(count = tokens.len(), "tokenized source");
    tokens
}

/// Splits a number literal into its digits and optional type suffix.
///
/// Returns `(digits, suffix, is_float)`; a literal is float-shaped when it
/// carries a decimal point, an exponent, or an `f`/`h` suffix.
pub fn split_number(text: &str) -> (&str, Option<char>, bool) {
    let (digits, suffix) = match text.chars().last() {
        Some(c @ ('f' | 'h' | 'u' | 'i')) => (&text[..text.len() - 1], Some(c)),
        _ => (text, None),
    };
    let is_float = digits.contains('.')
        || digits.chars().any(|c| c == 'e' || c == 'E')
        || matches!(suffix, Some('f') | Some('h'));
    (digits, suffix, is_float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::token::TokenCategory;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("fn fnord let letter"),
            vec![
                TokenKind::Fn,
                TokenKind::Ident,
                TokenKind::Let,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn operators_longest_first() {
        assert_eq!(
            kinds("=== == = => -> >= >> >"),
            vec![
                TokenKind::EqEqEq,
                TokenKind::EqEq,
                TokenKind::Eq,
                TokenKind::FatArrow,
                TokenKind::Arrow,
                TokenKind::GreaterEq,
                TokenKind::ShiftRight,
                TokenKind::Greater,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn decorator_consumes_balanced_arguments() {
        let tokens = tokenize("@workgroup_size(8, (1+1), 1) fn");
        assert_eq!(tokens[0].kind, TokenKind::Decorator);
        assert_eq!(tokens[0].text, "@workgroup_size(8, (1+1), 1)");
        assert_eq!(tokens[1].kind, TokenKind::Fn);
    }

    #[test]
    fn comments_are_tokens() {
        let tokens = tokenize("// line\n/* block\nspanning */ x");
        assert_eq!(tokens[0].kind, TokenKind::LineComment);
        assert_eq!(tokens[1].kind, TokenKind::BlockComment);
        assert_eq!(tokens[2].kind, TokenKind::Ident);
    }

    #[test]
    fn unknown_bytes_are_skipped() {
        assert_eq!(
            kinds("a $ b # c"),
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn number_shapes() {
        for (src, float) in [("1", false), ("42u", false), ("3i", false), ("1.5", true), ("1.", true), (".5", true), ("1e5", true), ("2.5e-3", true), ("1f", true), ("0.5h", true)] {
            let tokens = tokenize(src);
            assert_eq!(tokens[0].kind, TokenKind::Number, "{src}");
            let (_, _, is_float) = split_number(&tokens[0].text);
            assert_eq!(is_float, float, "{src}");
        }
    }

    #[test]
    fn categories() {
        let tokens = tokenize("fn x ( @group(0) // c");
        let cats: Vec<_> = tokens.iter().map(|t| t.kind.category()).collect();
        assert_eq!(
            cats,
            vec![
                TokenCategory::Keyword,
                TokenCategory::Identifier,
                TokenCategory::Punctuation,
                TokenCategory::Decorator,
                TokenCategory::Comment,
                TokenCategory::Eof
            ]
        );
    }
}
