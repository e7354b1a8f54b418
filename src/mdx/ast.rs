//! Abstract syntax tree for MDX statements.

use std::fmt;

use serde::Serialize;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

/// One dot-separated part of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Segment {
    /// `[Unit Sales]` (quoted) or `Measures` (bare)
    Name { text: String, quoted: bool },
    /// `&[1]&[2]`: a member key, one value per key column
    Key(Vec<String>),
}

impl Segment {
    pub fn name(text: &str) -> Self {
        Segment::Name {
            text: text.into(),
            quoted: true,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Segment::Name { text, .. } => Some(text),
            Segment::Key(_) => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name { text, quoted: true } => write!(f, "[{text}]"),
            Segment::Name { text, quoted: false } => write!(f, "{text}"),
            Segment::Key(values) => {
                for value in values {
                    write!(f, "&[{value}]")?;
                }
                Ok(())
            }
        }
    }
}

/// A compound identifier such as `[Time].[1997].[Q1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identifier {
    pub segments: Vec<Segment>,
    pub pos: Pos,
}

impl Identifier {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            pos: Pos::default(),
        }
    }

    /// Build from plain names, all quoted.
    pub fn from_names(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| Segment::name(n)).collect())
    }

    /// A single bare word, e.g. the `LEAVES` flag of `Descendants`.
    pub fn as_bare_word(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Name { text, quoted: false }] => Some(text),
            _ => None,
        }
    }

    pub fn last_name(&self) -> Option<&str> {
        self.segments.last().and_then(Segment::as_name)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    /// `a : b` member range
    Range,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Range => ":",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// An MDX expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Id(Identifier),
    Number(f64),
    Str(String),
    /// `Name(args)`
    Call { name: String, args: Vec<Expr> },
    /// `target.Name` or `target.Name(args)`
    Method {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// `{a, b}`
    Set(Vec<Expr>),
    /// `(a, b)`
    Tuple(Vec<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// An omitted function argument: `Descendants(m, , LEAVES)`
    Empty,
}

impl Expr {
    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Every identifier mentioned anywhere in the expression.
    pub fn identifiers(&self) -> Vec<&Identifier> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut Vec<&'a Identifier>) {
        match self {
            Expr::Id(id) => out.push(id),
            Expr::Number(_) | Expr::Str(_) | Expr::Empty => {}
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_identifiers(out)),
            Expr::Method { target, args, .. } => {
                target.collect_identifiers(out);
                args.iter().for_each(|a| a.collect_identifiers(out));
            }
            Expr::Set(items) | Expr::Tuple(items) => {
                items.iter().for_each(|a| a.collect_identifiers(out))
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_identifiers(out);
                rhs.collect_identifiers(out);
            }
            Expr::Unary { expr, .. } => expr.collect_identifiers(out),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Id(id) => write!(f, "{id}"),
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Str(s) => write!(f, "\"{s}\""),
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Method { target, name, args } => {
                write!(f, "{target}.{name}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    write_list(f, args)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
            Expr::Set(items) => {
                write!(f, "{{")?;
                write_list(f, items)?;
                write!(f, "}}")
            }
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Expr::Unary {
                op: UnaryOp::Neg,
                expr,
            } => write!(f, "-{expr}"),
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => write!(f, "NOT {expr}"),
            Expr::Empty => Ok(()),
        }
    }
}

/// `WITH MEMBER` / `WITH SET` definitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WithClause {
    Member {
        name: Identifier,
        expr: Expr,
        format_string: Option<String>,
        solve_order: i32,
    },
    Set {
        name: Identifier,
        expr: Expr,
    },
}

/// Standard axis names by ordinal.
pub const AXIS_NAMES: [&str; 5] = ["COLUMNS", "ROWS", "PAGES", "CHAPTERS", "SECTIONS"];

pub fn axis_name(ordinal: usize) -> String {
    AXIS_NAMES
        .get(ordinal)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("AXIS({ordinal})"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub ordinal: usize,
    pub non_empty: bool,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectStatement {
    pub with: Vec<WithClause>,
    /// Sorted by ordinal, contiguous from 0.
    pub axes: Vec<Axis>,
    pub cube: String,
    pub slicer: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrillThroughStatement {
    pub max_rows: Option<usize>,
    /// 1-based index of the first row returned.
    pub first_row_set: Option<usize>,
    pub select: SelectStatement,
    pub returns: Vec<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    Select(SelectStatement),
    DrillThrough(DrillThroughStatement),
}
