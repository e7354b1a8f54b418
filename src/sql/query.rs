//! SELECT builder.
//!
//! The engine only ever emits star-join SELECTs: a comma-separated FROM
//! list with the join conditions in WHERE, which every supported product
//! accepts.

use super::dialect::SqlDialect;
use super::expr::{and_all, Expr};
use super::token::{Token, TokenStream};

/// A SELECT list item.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectExpr {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    fn write(&self, ts: &mut TokenStream) {
        ts.append(self.expr.to_tokens());
        if let Some(alias) = &self.alias {
            ts.spaced("AS").push(Token::Ident(alias.clone()));
        }
    }
}

impl From<Expr> for SelectExpr {
    fn from(expr: Expr) -> Self {
        SelectExpr::new(expr)
    }
}

/// A FROM list entry.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    fn write(&self, ts: &mut TokenStream, dialect: &dyn SqlDialect) {
        ts.push(Token::Ident(self.table.clone()));
        if let Some(alias) = &self.alias {
            // Oracle rejects AS before a table alias
            if dialect.allows_as_for_table_alias() {
                ts.spaced("AS");
            } else {
                ts.space();
            }
            ts.push(Token::Ident(alias.clone()));
        }
    }
}

/// An ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderByExpr {
    pub expr: Expr,
    pub ascending: bool,
    /// Explicit null placement; `Some(true)` sorts nulls after values.
    pub nulls_last: Option<bool>,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
            nulls_last: None,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            ascending: false,
            ..Self::asc(expr)
        }
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_last = Some(true);
        self
    }

    fn write(&self, ts: &mut TokenStream, dialect: &dyn SqlDialect) {
        match self.nulls_last {
            // The dialect emulates null placement where NULLS FIRST/LAST is missing.
            Some(nulls_last) => {
                let expr = self.expr.to_sql(dialect);
                ts.push(Token::Verbatim(dialect.generate_order_item(
                    &expr,
                    true,
                    self.ascending,
                    nulls_last,
                )));
            }
            None => {
                ts.append(self.expr.to_tokens());
                ts.space()
                    .keyword(if self.ascending { "ASC" } else { "DESC" });
            }
        }
    }
}

/// A star-join SELECT.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "Query has no effect until rendered with to_sql()"]
pub struct Query {
    pub select: Vec<SelectExpr>,
    pub distinct: bool,
    pub from: Vec<TableRef>,
    /// Conjuncts of the WHERE clause.
    pub predicates: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
}

const LIST_SEPARATOR: &[Token] = &[Token::Symbol(","), Token::Newline, Token::Indent(1)];
const INLINE_SEPARATOR: &[Token] = &[Token::Symbol(","), Token::Space];

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, exprs: Vec<impl Into<SelectExpr>>) -> Self {
        self.select = exprs.into_iter().map(Into::into).collect();
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, table: TableRef) -> Self {
        self.from.push(table);
        self
    }

    /// Add a WHERE conjunct.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.predicates.push(condition);
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn order_by(mut self, exprs: Vec<OrderByExpr>) -> Self {
        self.order_by = exprs;
        self
    }

    pub fn to_tokens(&self, dialect: &dyn SqlDialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.keyword("SELECT");
        if self.distinct {
            ts.space().keyword("DISTINCT");
        }
        ts.push(Token::Newline).push(Token::Indent(1));
        ts.separated(&self.select, LIST_SEPARATOR, |ts, item| item.write(ts));

        if !self.from.is_empty() {
            ts.push(Token::Newline).keyword("FROM").space();
            ts.separated(&self.from, INLINE_SEPARATOR, |ts, t| t.write(ts, dialect));
        }
        if let Some(predicate) = and_all(self.predicates.clone()) {
            ts.push(Token::Newline).keyword("WHERE").space();
            ts.append(predicate.to_tokens());
        }
        if !self.group_by.is_empty() {
            ts.push(Token::Newline).keyword("GROUP BY").space();
            ts.separated(&self.group_by, INLINE_SEPARATOR, |ts, e| {
                ts.append(e.to_tokens());
            });
        }
        if !self.order_by.is_empty() {
            ts.push(Token::Newline).keyword("ORDER BY").space();
            ts.separated(&self.order_by, INLINE_SEPARATOR, |ts, o| o.write(ts, dialect));
        }
        ts
    }

    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        self.to_tokens(dialect).render(dialect)
    }
}
