//! Lexer for MDX.
//!
//! Converts query text into tokens with span information. Keywords are not
//! distinguished here: MDX keywords are case-insensitive and most of them
//! are also valid member names, so the parser decides by context.

use chumsky::prelude::*;

/// A token of MDX source.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    /// A bare word: keyword, function, property or unquoted name.
    Ident(&'src str),
    /// Contents of `[...]`.
    Bracketed(&'src str),
    /// Contents of a `'...'` or `"..."` literal.
    StringLit(&'src str),
    /// An unsigned integer or decimal.
    Number(&'src str),
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Dot,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Colon,
}

/// Two-character operators come first so they win over their prefixes.
const SYMBOLS: [(&str, Token<'static>); 18] = [
    ("<>", Token::Ne),
    ("<=", Token::Le),
    (">=", Token::Ge),
    ("{", Token::LBrace),
    ("}", Token::RBrace),
    ("(", Token::LParen),
    (")", Token::RParen),
    (",", Token::Comma),
    (".", Token::Dot),
    ("=", Token::Eq),
    ("<", Token::Lt),
    (">", Token::Gt),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("*", Token::Star),
    ("/", Token::Slash),
    ("&", Token::Amp),
    (":", Token::Colon),
];

fn symbol_token<'src>(text: &str) -> Option<Token<'src>> {
    SYMBOLS
        .iter()
        .find(|(s, _)| *s == text)
        .map(|(_, token)| token.clone())
}

impl std::fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) | Token::Number(s) => f.write_str(s),
            Token::Bracketed(s) => write!(f, "[{s}]"),
            Token::StringLit(s) => write!(f, "'{s}'"),
            symbol => {
                let text = SYMBOLS
                    .iter()
                    .find(|(_, token)| token == symbol)
                    .map_or("?", |(text, _)| *text);
                f.write_str(text)
            }
        }
    }
}

/// Tokens with their spans; whitespace and `//`, `--` and `/* */`
/// comments are dropped.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    let ident = text::ident().map(Token::Ident);

    // Bracketed names: [Unit Sales]
    let bracketed = just('[')
        .ignore_then(none_of(']').repeated().to_slice())
        .then_ignore(just(']'))
        .map(Token::Bracketed);

    // String literals: '...' or "..."
    let single_quoted = just('\'')
        .ignore_then(none_of('\'').repeated().to_slice())
        .then_ignore(just('\''))
        .map(Token::StringLit);
    let double_quoted = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'))
        .map(Token::StringLit);

    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(Token::Number);

    let symbol = choice((just("<>"), just("<="), just(">=")))
        .to_slice()
        .or(one_of("{}(),.=<>+-*/&:").to_slice())
        .try_map(|text, span| {
            symbol_token(text).ok_or_else(|| Rich::custom(span, "unexpected symbol"))
        });

    let single_line_comment = just("//")
        .or(just("--"))
        .then(any().and_is(just('\n').not()).repeated())
        .ignored();

    let multi_line_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/"))
        .ignored();

    let comment = single_line_comment.or(multi_line_comment);

    let token = choice((
        ident,
        bracketed,
        single_quoted,
        double_quoted,
        number,
        symbol,
    ))
    .map_with(|tok, e| (tok, e.span()));

    token
        .padded_by(comment.padded().repeated())
        .padded()
        .repeated()
        .collect()
        .padded_by(comment.padded().repeated())
        .padded()
        .then_ignore(end())
}

pub fn lex(source: &str) -> Result<Vec<(Token<'_>, SimpleSpan)>, Vec<Rich<'_, char>>> {
    let (tokens, errs) = lexer().parse(source).into_output_errors();
    if errs.is_empty() {
        Ok(tokens.unwrap_or_default())
    } else {
        Err(errs)
    }
}
