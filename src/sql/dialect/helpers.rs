//! Spelling rules selected by a product's [`Capabilities`](super::Capabilities).

use super::capabilities::{CaseFolding, QuoteStyle};

/// Wrap `ident` in the style's delimiters, doubling any closing delimiter inside it.
pub fn quote_with(style: QuoteStyle, ident: &str) -> String {
    let (open, close) = match style {
        QuoteStyle::Double => ('"', '"'),
        QuoteStyle::Backtick => ('`', '`'),
        QuoteStyle::Bracket => ('[', ']'),
    };
    let mut out = String::with_capacity(ident.len() + 2);
    out.push(open);
    for c in ident.chars() {
        if c == close {
            out.push(close);
        }
        out.push(c);
    }
    out.push(close);
    out
}

/// `'...'` with `'` doubled, and `\` doubled where it starts an escape.
pub fn quote_string(s: &str, backslash_escapes: bool) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' || (backslash_escapes && c == '\\') {
            out.push(c);
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Fold an identifier the way the database stores unquoted names.
pub fn fold_case(folding: CaseFolding, ident: &str) -> String {
    match folding {
        CaseFolding::Upper => ident.to_uppercase(),
        CaseFolding::Lower => ident.to_lowercase(),
        CaseFolding::Preserve => ident.to_string(),
    }
}
