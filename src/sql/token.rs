//! Lexical pieces of generated SQL.
//!
//! Builders never format strings themselves: they emit [`Token`]s and the
//! dialect decides how each one is spelled (identifier quotes, string
//! escapes, float text).

use super::dialect::SqlDialect;

/// One lexical element of a generated statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Reserved word or multi-word clause head (`GROUP BY`).
    Keyword(&'static str),
    /// Operator or punctuation.
    Symbol(&'static str),
    Space,
    Newline,
    Indent(usize),
    /// Table, column or alias name; quoted by the dialect.
    Ident(String),
    Int(i64),
    Float(f64),
    /// String literal; escaped by the dialect.
    Str(String),
    Null,
    /// Aggregate or scalar function name.
    Function(String),
    /// Text the dialect produced itself, such as an emulated null ordering.
    ///
    /// Member keys and captions must never end up here.
    Verbatim(String),
}

impl Token {
    /// Spell this token for `dialect`.
    pub fn render(&self, dialect: &dyn SqlDialect) -> String {
        match self {
            Token::Keyword(word) | Token::Symbol(word) => (*word).to_string(),
            Token::Space => " ".to_string(),
            Token::Newline => "\n".to_string(),
            Token::Indent(depth) => "  ".repeat(*depth),
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::Int(n) => n.to_string(),
            // NaN and infinities have no SQL spelling
            Token::Float(f) if !f.is_finite() => "NULL".to_string(),
            Token::Float(f) => ryu::Buffer::new().format(*f).to_string(),
            Token::Str(s) => dialect.quote_string_literal(s),
            Token::Null => "NULL".to_string(),
            Token::Function(name) => name.to_ascii_uppercase(),
            Token::Verbatim(text) => text.clone(),
        }
    }
}

/// An ordered run of tokens, built up by the expression and query builders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    pub fn append(&mut self, other: TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens);
        self
    }

    pub fn keyword(&mut self, word: &'static str) -> &mut Self {
        self.push(Token::Keyword(word))
    }

    pub fn symbol(&mut self, symbol: &'static str) -> &mut Self {
        self.push(Token::Symbol(symbol))
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }

    /// `word` surrounded by single spaces.
    pub fn spaced(&mut self, word: &'static str) -> &mut Self {
        self.space().keyword(word).space()
    }

    /// Emit `items` separated by `separator`, each through `emit`.
    pub fn separated<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        separator: &[Token],
        mut emit: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.tokens.extend_from_slice(separator);
            }
            emit(self, item);
        }
        self
    }

    /// `(a, b, c)`
    pub fn parenthesized<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        emit: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        self.symbol("(");
        self.separated(items, &[Token::Symbol(","), Token::Space], emit);
        self.symbol(")")
    }

    pub fn render(&self, dialect: &dyn SqlDialect) -> String {
        self.tokens.iter().map(|t| t.render(dialect)).collect()
    }
}
