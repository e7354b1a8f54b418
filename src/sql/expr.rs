//! SQL expressions: star-join predicates, member constraints, measure
//! aggregates and drill-through columns.

use super::dialect::SqlDialect;
use super::query::SelectExpr;
use super::token::{Token, TokenStream};

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `column` or `table.column`
    Column {
        table: Option<String>,
        column: String,
    },
    Literal(Literal),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    /// `expr IN (values...)`; an empty list is always false.
    In { expr: Box<Expr>, values: Vec<Expr> },
    /// Row value constructor, for multi-column IN.
    Row(Vec<Expr>),
    IsNull(Box<Expr>),
    Star,
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    And,
    Or,
}

impl BinaryOperator {
    fn token(self) -> Token {
        match self {
            BinaryOperator::Eq => Token::Symbol("="),
            BinaryOperator::And => Token::Keyword("AND"),
            BinaryOperator::Or => Token::Keyword("OR"),
        }
    }
}

impl Expr {
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        self.write(&mut ts);
        ts
    }

    fn write(&self, ts: &mut TokenStream) {
        match self {
            Expr::Column { table, column } => {
                if let Some(table) = table {
                    ts.push(Token::Ident(table.clone())).symbol(".");
                }
                ts.push(Token::Ident(column.clone()));
            }
            Expr::Literal(Literal::Int(n)) => {
                ts.push(Token::Int(*n));
            }
            Expr::Literal(Literal::Float(f)) => {
                ts.push(Token::Float(*f));
            }
            Expr::Literal(Literal::String(s)) => {
                ts.push(Token::Str(s.clone()));
            }
            Expr::Literal(Literal::Null) => {
                ts.push(Token::Null);
            }
            Expr::BinaryOp { left, op, right } => {
                left.write(ts);
                ts.space().push(op.token()).space();
                right.write(ts);
            }
            Expr::Function {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::Function(name.clone())).symbol("(");
                if *distinct {
                    ts.keyword("DISTINCT").space();
                }
                ts.separated(args, &[Token::Symbol(","), Token::Space], |ts, a| {
                    a.write(ts)
                });
                ts.symbol(")");
            }
            Expr::In { values, .. } if values.is_empty() => {
                ts.push(Token::Int(1))
                    .space()
                    .symbol("=")
                    .space()
                    .push(Token::Int(0));
            }
            Expr::In { expr, values } => {
                expr.write(ts);
                ts.spaced("IN").parenthesized(values, |ts, v| v.write(ts));
            }
            Expr::Row(items) => {
                ts.parenthesized(items, |ts, item| item.write(ts));
            }
            Expr::IsNull(inner) => {
                inner.write(ts);
                ts.space().keyword("IS NULL");
            }
            Expr::Star => {
                ts.symbol("*");
            }
            Expr::Paren(inner) => {
                ts.symbol("(");
                inner.write(ts);
                ts.symbol(")");
            }
        }
    }

    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        self.to_tokens().render(dialect)
    }
}

pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        column: name.into(),
    }
}

pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        column: column.into(),
    }
}

pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

pub fn lit_float(f: f64) -> Expr {
    Expr::Literal(Literal::Float(f))
}

pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

pub fn star() -> Expr {
    Expr::Star
}

pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
        distinct: false,
    }
}

pub fn count_star() -> Expr {
    func("COUNT", vec![star()])
}

pub fn count_distinct(expr: Expr) -> Expr {
    Expr::Function {
        name: "COUNT".into(),
        args: vec![expr],
        distinct: true,
    }
}

/// `left op right`, parenthesizing an operand built from the other connective.
fn join(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    let wrap = |e: Expr| match e {
        Expr::BinaryOp { op: inner, .. } if inner != op && inner != BinaryOperator::Eq => {
            Expr::Paren(Box::new(e))
        }
        other => other,
    };
    Expr::BinaryOp {
        left: Box::new(wrap(left)),
        op,
        right: Box::new(wrap(right)),
    }
}

fn combine(predicates: Vec<Expr>, op: BinaryOperator) -> Option<Expr> {
    let mut iter = predicates.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, p| join(acc, op, p)))
}

/// Conjunction of `predicates`, or `None` when there are none.
pub fn and_all(predicates: Vec<Expr>) -> Option<Expr> {
    combine(predicates, BinaryOperator::And)
}

/// Disjunction of `predicates`, or `None` when there are none.
pub fn or_all(predicates: Vec<Expr>) -> Option<Expr> {
    combine(predicates, BinaryOperator::Or)
}

/// Fluent combinators on expressions.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn eq(self, other: impl Into<Expr>) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self.into_expr()),
            op: BinaryOperator::Eq,
            right: Box::new(other.into()),
        }
    }

    fn and(self, other: impl Into<Expr>) -> Expr {
        join(self.into_expr(), BinaryOperator::And, other.into())
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        join(self.into_expr(), BinaryOperator::Or, other.into())
    }

    #[allow(clippy::wrong_self_convention)]
    fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self.into_expr()))
    }

    fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
        }
    }

    /// Name this expression in a SELECT list.
    fn alias(self, name: &str) -> SelectExpr {
        SelectExpr::new(self.into_expr()).with_alias(name)
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}
