//! Recursive-descent parser for MDX statements.
//!
//! Works on the token stream produced by [`super::lexer`]. Keywords are
//! matched case-insensitively by context, so `[Rows]` and `Rows` can still
//! name members where no keyword is expected.

use chumsky::span::{SimpleSpan, Span as _};

use super::ast::*;
use super::lexer::{lex, Token};
use super::{MdxError, MdxResult};

/// Names after `.` that end an identifier and start a method/property call.
const METHODS: &[&str] = &[
    "AllMembers",
    "Caption",
    "Children",
    "CurrentMember",
    "DefaultMember",
    "Dimension",
    "FirstChild",
    "FirstSibling",
    "Hierarchy",
    "Item",
    "Lag",
    "LastChild",
    "LastSibling",
    "Lead",
    "Level",
    "Members",
    "Name",
    "NextMember",
    "Ordinal",
    "Parent",
    "PrevMember",
    "Siblings",
    "UniqueName",
    "Value",
];

fn is_method(name: &str) -> bool {
    METHODS.iter().any(|m| m.eq_ignore_ascii_case(name))
}

/// Parse a complete `SELECT` or `DRILLTHROUGH` statement.
pub fn parse_statement(source: &str) -> MdxResult<Statement> {
    let mut parser = Parser::new(source, source, 0)?;
    let statement = parser.statement()?;
    parser.expect_end()?;
    Ok(statement)
}

/// Parse a standalone expression, e.g. a calculated member formula.
pub fn parse_expression(source: &str) -> MdxResult<Expr> {
    let mut parser = Parser::new(source, source, 0)?;
    let expr = parser.expr()?;
    parser.expect_end()?;
    Ok(expr)
}

struct Parser<'src> {
    /// Whole statement text, for positions.
    full: &'src str,
    tokens: Vec<(Token<'src>, SimpleSpan)>,
    /// Byte offset of the lexed text within `full`.
    base: usize,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn new(full: &'src str, text: &'src str, base: usize) -> MdxResult<Self> {
        let tokens = lex(text).map_err(|errs| {
            let (offset, found, message) = errs
                .first()
                .map(|e| {
                    (
                        e.span().start(),
                        e.found().map(|c| c.to_string()).unwrap_or_default(),
                        e.to_string(),
                    )
                })
                .unwrap_or((0, String::new(), "invalid input".into()));
            let (line, column) = line_column(full, base + offset);
            MdxError::Syntax {
                message,
                line,
                column,
                token: found,
            }
        })?;
        Ok(Self {
            full,
            tokens,
            base,
            pos: 0,
        })
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token<'src>> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn at(&self, token: &Token<'_>) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token<'_>) -> bool {
        if self.at(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn current_pos(&self) -> Pos {
        let offset = match self.tokens.get(self.pos) {
            Some((_, span)) => span.start(),
            None => self.tokens.last().map(|(_, s)| s.end()).unwrap_or(0),
        };
        let (line, column) = line_column(self.full, self.base + offset);
        Pos { line, column }
    }

    fn error(&self, message: impl Into<String>) -> MdxError {
        let Pos { line, column } = self.current_pos();
        let token = self
            .peek()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "end of input".into());
        MdxError::Syntax {
            message: message.into(),
            line,
            column,
            token,
        }
    }

    fn expect(&mut self, token: &Token<'_>) -> MdxResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{token}'")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> MdxResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected {keyword}")))
        }
    }

    fn expect_end(&self) -> MdxResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("unexpected token after end of statement")),
        }
    }

    fn unsigned(&mut self, after: &str) -> MdxResult<usize> {
        match self.peek() {
            Some(Token::Number(text)) => {
                let value = text
                    .parse::<usize>()
                    .map_err(|_| self.error(format!("expected a non-negative integer after {after}")))?;
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.error(format!("expected a non-negative integer after {after}"))),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> MdxResult<Statement> {
        if !self.eat_keyword("DRILLTHROUGH") {
            return Ok(Statement::Select(self.select()?));
        }

        let mut max_rows = None;
        let mut first_row_set = None;
        loop {
            if self.eat_keyword("MAXROWS") {
                max_rows = Some(self.unsigned("MAXROWS")?);
            } else if self.eat_keyword("FIRSTROWSET") {
                let first = self.unsigned("FIRSTROWSET")?;
                if first == 0 {
                    return Err(self.error("FIRSTROWSET is 1-based"));
                }
                first_row_set = Some(first);
            } else {
                break;
            }
        }

        let select = self.select()?;
        let mut returns = Vec::new();
        if self.eat_keyword("RETURN") {
            loop {
                returns.push(self.identifier()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        Ok(Statement::DrillThrough(DrillThroughStatement {
            max_rows,
            first_row_set,
            select,
            returns,
        }))
    }

    fn select(&mut self) -> MdxResult<SelectStatement> {
        let mut with = Vec::new();
        if self.eat_keyword("WITH") {
            while self.at_keyword("MEMBER") || self.at_keyword("SET") {
                with.push(self.with_clause()?);
            }
            if with.is_empty() {
                return Err(self.error("expected MEMBER or SET"));
            }
        }

        self.expect_keyword("SELECT")?;

        let mut axes: Vec<(Axis, Pos)> = Vec::new();
        if !self.at_keyword("FROM") {
            loop {
                let pos = self.current_pos();
                axes.push((self.axis()?, pos));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        self.expect_keyword("FROM")?;
        let cube = match self.peek() {
            Some(Token::Bracketed(name)) | Some(Token::Ident(name)) => name.to_string(),
            _ => return Err(self.error("expected cube name")),
        };
        self.pos += 1;

        let slicer = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(SelectStatement {
            with,
            axes: check_axes(axes)?,
            cube,
            slicer,
        })
    }

    fn with_clause(&mut self) -> MdxResult<WithClause> {
        if self.eat_keyword("SET") {
            let name = self.identifier()?;
            self.expect_keyword("AS")?;
            let expr = self.formula()?;
            return Ok(WithClause::Set { name, expr });
        }

        self.expect_keyword("MEMBER")?;
        let name = self.identifier()?;
        self.expect_keyword("AS")?;
        let expr = self.formula()?;

        let mut format_string = None;
        let mut solve_order = 0;
        loop {
            let comma = usize::from(self.at(&Token::Comma));
            let is_property = matches!(
                self.peek_at(comma),
                Some(Token::Ident(s)) if s.eq_ignore_ascii_case("FORMAT_STRING")
                    || s.eq_ignore_ascii_case("SOLVE_ORDER")
            );
            if !is_property {
                break;
            }
            self.pos += comma;
            if self.eat_keyword("FORMAT_STRING") {
                self.expect(&Token::Eq)?;
                match self.peek() {
                    Some(Token::StringLit(s)) => format_string = Some(s.to_string()),
                    _ => return Err(self.error("expected a string after FORMAT_STRING =")),
                }
                self.pos += 1;
            } else {
                self.expect_keyword("SOLVE_ORDER")?;
                self.expect(&Token::Eq)?;
                let negative = self.eat(&Token::Minus);
                let value = self.unsigned("SOLVE_ORDER =")? as i32;
                solve_order = if negative { -value } else { value };
            }
        }

        Ok(WithClause::Member {
            name,
            expr,
            format_string,
            solve_order,
        })
    }

    /// A formula is either a bare expression or a quoted one.
    fn formula(&mut self) -> MdxResult<Expr> {
        if let Some((Token::StringLit(text), span)) = self.tokens.get(self.pos).cloned() {
            // skip the opening quote
            let base = self.base + span.start() + 1;
            let mut inner = Parser::new(self.full, text, base)?;
            let expr = inner.expr()?;
            inner.expect_end()?;
            self.pos += 1;
            return Ok(expr);
        }
        self.expr()
    }

    fn axis(&mut self) -> MdxResult<Axis> {
        let non_empty = if self.at_keyword("NON")
            && matches!(self.peek_at(1), Some(Token::Ident(s)) if s.eq_ignore_ascii_case("EMPTY"))
        {
            self.pos += 2;
            true
        } else {
            false
        };

        let expr = self.expr()?;
        self.expect_keyword("ON")?;

        let ordinal = if let Some(Token::Number(_)) = self.peek() {
            self.unsigned("ON")?
        } else if self.eat_keyword("AXIS") {
            self.expect(&Token::LParen)?;
            let n = self.unsigned("AXIS(")?;
            self.expect(&Token::RParen)?;
            n
        } else {
            let found = match self.peek() {
                Some(Token::Ident(name)) => AXIS_NAMES
                    .iter()
                    .position(|axis| axis.eq_ignore_ascii_case(name)),
                _ => None,
            };
            match found {
                Some(n) => {
                    self.pos += 1;
                    n
                }
                None => return Err(self.error("expected an axis name")),
            }
        };

        Ok(Axis {
            ordinal,
            non_empty,
            expr,
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self) -> MdxResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat_keyword("OR") {
            let rhs = self.and_expr()?;
            lhs = Expr::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> MdxResult<Expr> {
        let mut lhs = self.not_expr()?;
        while self.eat_keyword("AND") {
            let rhs = self.not_expr()?;
            lhs = Expr::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> MdxResult<Expr> {
        if self.eat_keyword("NOT") {
            let expr = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> MdxResult<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn additive(&mut self) -> MdxResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> MdxResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> MdxResult<Expr> {
        if self.eat(&Token::Minus) {
            let expr = self.unary()?;
            return Ok(match expr {
                Expr::Number(n) => Expr::Number(-n),
                other => Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(other),
                },
            });
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.range()
    }

    fn range(&mut self) -> MdxResult<Expr> {
        let lhs = self.postfix()?;
        if self.eat(&Token::Colon) {
            let rhs = self.postfix()?;
            return Ok(Expr::binary(BinaryOp::Range, lhs, rhs));
        }
        Ok(lhs)
    }

    fn postfix(&mut self) -> MdxResult<Expr> {
        let mut expr = self.primary()?;
        while self.at(&Token::Dot) {
            let name = match self.peek_at(1) {
                Some(Token::Ident(name)) => name.to_string(),
                _ => return Err(self.error("expected a property or method name")),
            };
            self.pos += 2;
            let args = if self.at(&Token::LParen) {
                self.call_args()?
            } else {
                Vec::new()
            };
            expr = Expr::Method {
                target: Box::new(expr),
                name,
                args,
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> MdxResult<Expr> {
        match self.peek() {
            Some(Token::Number(text)) => {
                let value = text
                    .parse::<f64>()
                    .map_err(|_| self.error("invalid number"))?;
                self.pos += 1;
                Ok(Expr::Number(value))
            }
            Some(Token::StringLit(text)) => {
                let text = text.to_string();
                self.pos += 1;
                Ok(Expr::Str(text))
            }
            Some(Token::LBrace) => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        items.push(self.expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::RBrace)?;
                }
                Ok(Expr::Set(items))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let mut items = vec![self.expr()?];
                while self.eat(&Token::Comma) {
                    items.push(self.expr()?);
                }
                self.expect(&Token::RParen)?;
                Ok(if items.len() == 1 {
                    items.remove(0)
                } else {
                    Expr::Tuple(items)
                })
            }
            Some(Token::Ident(name)) if matches!(self.peek_at(1), Some(Token::LParen)) => {
                let name = name.to_string();
                self.pos += 1;
                let args = self.call_args()?;
                Ok(Expr::Call { name, args })
            }
            Some(Token::Ident(_)) | Some(Token::Bracketed(_)) => {
                Ok(Expr::Id(self.identifier()?))
            }
            _ => Err(self.error("expected an expression")),
        }
    }

    /// `( [arg {, arg}] )`, where an omitted argument is [`Expr::Empty`].
    fn call_args(&mut self) -> MdxResult<Vec<Expr>> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            if self.at(&Token::Comma) || self.at(&Token::RParen) {
                args.push(Expr::Empty);
            } else {
                args.push(self.expr()?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    /// A dotted identifier. Stops before a trailing method name.
    fn identifier(&mut self) -> MdxResult<Identifier> {
        let pos = self.current_pos();
        let mut segments = vec![self.name_segment()?];
        while self.at(&Token::Dot) {
            match self.peek_at(1) {
                Some(Token::Bracketed(_)) | Some(Token::Amp) => {}
                Some(Token::Ident(name))
                    if !is_method(name) && !matches!(self.peek_at(2), Some(Token::LParen)) => {}
                _ => break,
            }
            self.pos += 1;
            segments.push(self.name_segment()?);
        }
        Ok(Identifier { segments, pos })
    }

    fn name_segment(&mut self) -> MdxResult<Segment> {
        match self.peek() {
            Some(Token::Bracketed(text)) => {
                let text = text.to_string();
                self.pos += 1;
                Ok(Segment::Name { text, quoted: true })
            }
            Some(Token::Ident(text)) => {
                let text = text.to_string();
                self.pos += 1;
                Ok(Segment::Name {
                    text,
                    quoted: false,
                })
            }
            Some(Token::Amp) => {
                let mut values = Vec::new();
                while self.eat(&Token::Amp) {
                    match self.peek() {
                        Some(Token::Bracketed(v)) => values.push(v.to_string()),
                        _ => return Err(self.error("expected a bracketed key after '&'")),
                    }
                    self.pos += 1;
                }
                Ok(Segment::Key(values))
            }
            _ => Err(self.error("expected a name")),
        }
    }
}

/// Sort axes and require ordinals 0..n without duplicates.
fn check_axes(mut axes: Vec<(Axis, Pos)>) -> MdxResult<Vec<Axis>> {
    axes.sort_by_key(|(axis, _)| axis.ordinal);
    for pair in axes.windows(2) {
        if pair[0].0.ordinal == pair[1].0.ordinal {
            return Err(MdxError::DuplicateAxis {
                name: axis_name(pair[1].0.ordinal),
                line: pair[1].1.line,
                column: pair[1].1.column,
            });
        }
    }
    for (expected, (axis, _)) in axes.iter().enumerate() {
        if axis.ordinal != expected {
            return Err(MdxError::AxisGap {
                ordinal: expected,
                name: axis_name(expected),
            });
        }
    }
    Ok(axes.into_iter().map(|(axis, _)| axis).collect())
}

/// 1-based line and column of a byte offset.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let prefix = source.get(..offset.min(source.len())).unwrap_or(source);
    let line = prefix.matches('\n').count() + 1;
    let column = match prefix.rfind('\n') {
        Some(nl) => prefix[nl + 1..].chars().count() + 1,
        None => prefix.chars().count() + 1,
    };
    (line, column)
}
