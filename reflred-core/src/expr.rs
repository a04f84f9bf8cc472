//! Typed scalar expressions and predicates over event columns.
//!
//! Expressions are built once per reduction with every instrument parameter
//! folded in as a constant, then evaluated per event by the projection
//! primitive. `Display` renders the textual form used in log output, e.g.
//! `(lamda >= 2.4) & (lamda <= 12.6)`.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use crate::error::Error;

/// A stored or derived event column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    /// Event weight.
    P,
    /// Transverse detector position.
    X,
    /// Vertical detector position.
    Y,
    /// Position along the beam.
    Z,
    /// Arrival time.
    T,
    /// Stored wavelength.
    L,
    /// Wavelength derived from TOF.
    Lamda,
    /// Momentum transfer.
    Q,
}

impl Column {
    /// Number of column slots in a [`ColumnValues`] row.
    pub const COUNT: usize = 8;

    /// All columns, in slot order.
    pub const ALL: [Column; Self::COUNT] = [
        Column::P,
        Column::X,
        Column::Y,
        Column::Z,
        Column::T,
        Column::L,
        Column::Lamda,
        Column::Q,
    ];

    /// Slot of this column in a [`ColumnValues`] row.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short column name as it appears in event files and expressions.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Column::P => "p",
            Column::X => "x",
            Column::Y => "y",
            Column::Z => "z",
            Column::T => "t",
            Column::L => "L",
            Column::Lamda => "lamda",
            Column::Q => "q",
        }
    }

    /// True for columns that only exist after derivation.
    #[must_use]
    pub fn is_derived(self) -> bool {
        matches!(self, Column::Lamda | Column::Q)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .into_iter()
            .find(|column| column.name() == s)
            .ok_or_else(|| Error::MissingColumn(s.to_string()))
    }
}

/// Column values of a single event, indexed by [`Column::index`].
pub type ColumnValues = [f64; Column::COUNT];

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Floored modulo (result takes the sign of the divisor).
    Mod,
    Atan2,
}

/// Unary functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryFn {
    Neg,
    Sin,
    Abs,
    Sqrt,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Lt,
    Le,
    Ge,
    Gt,
}

impl Cmp {
    fn symbol(self) -> &'static str {
        match self {
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Ge => ">=",
            Cmp::Gt => ">",
        }
    }

    #[inline]
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Cmp::Lt => lhs < rhs,
            Cmp::Le => lhs <= rhs,
            Cmp::Ge => lhs >= rhs,
            Cmp::Gt => lhs > rhs,
        }
    }
}

/// A scalar expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Col(Column),
    Unary(UnaryFn, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `where(cond, then, otherwise)`
    Where(Box<Predicate>, Box<Expr>, Box<Expr>),
}

/// A boolean predicate over expressions.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Predicate {
    /// No constraint.
    #[default]
    Always,
    Compare(Cmp, Expr, Expr),
    And(Vec<Predicate>),
}

impl Expr {
    /// Column reference.
    #[must_use]
    pub fn col(column: Column) -> Self {
        Expr::Col(column)
    }

    /// Constant.
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    fn unary(func: UnaryFn, arg: Expr) -> Self {
        Expr::Unary(func, Box::new(arg))
    }

    /// Floored modulo, `self mod rhs`.
    #[must_use]
    pub fn modulo(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Mod, self, rhs.into())
    }

    /// `atan2(self, x)`.
    #[must_use]
    pub fn atan2(self, x: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Atan2, self, x.into())
    }

    #[must_use]
    pub fn sin(self) -> Self {
        Self::unary(UnaryFn::Sin, self)
    }

    #[must_use]
    pub fn abs(self) -> Self {
        Self::unary(UnaryFn::Abs, self)
    }

    #[must_use]
    pub fn sqrt(self) -> Self {
        Self::unary(UnaryFn::Sqrt, self)
    }

    /// `where(cond, then, otherwise)`.
    #[must_use]
    pub fn select(cond: Predicate, then: Expr, otherwise: Expr) -> Self {
        Expr::Where(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    #[must_use]
    pub fn less_than(self, rhs: impl Into<Expr>) -> Predicate {
        Predicate::Compare(Cmp::Lt, self, rhs.into())
    }

    #[must_use]
    pub fn at_most(self, rhs: impl Into<Expr>) -> Predicate {
        Predicate::Compare(Cmp::Le, self, rhs.into())
    }

    #[must_use]
    pub fn at_least(self, rhs: impl Into<Expr>) -> Predicate {
        Predicate::Compare(Cmp::Ge, self, rhs.into())
    }

    #[must_use]
    pub fn greater_than(self, rhs: impl Into<Expr>) -> Predicate {
        Predicate::Compare(Cmp::Gt, self, rhs.into())
    }

    /// Evaluates the expression for one event.
    #[must_use]
    pub fn eval(&self, row: &ColumnValues) -> f64 {
        match self {
            Expr::Const(value) => *value,
            Expr::Col(column) => row[column.index()],
            Expr::Unary(func, arg) => {
                let v = arg.eval(row);
                match func {
                    UnaryFn::Neg => -v,
                    UnaryFn::Sin => v.sin(),
                    UnaryFn::Abs => v.abs(),
                    UnaryFn::Sqrt => v.sqrt(),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(row);
                let b = rhs.eval(row);
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Mod => floored_mod(a, b),
                    BinaryOp::Atan2 => a.atan2(b),
                }
            }
            Expr::Where(cond, then, otherwise) => {
                if cond.eval(row) {
                    then.eval(row)
                } else {
                    otherwise.eval(row)
                }
            }
        }
    }

    /// Evaluates an expression that only references `t`.
    #[must_use]
    pub fn eval_at_time(&self, t: f64) -> f64 {
        let mut row = [f64::NAN; Column::COUNT];
        row[Column::T.index()] = t;
        self.eval(&row)
    }

    /// Collects every column this expression reads.
    pub fn collect_columns(&self, out: &mut BTreeSet<Column>) {
        match self {
            Expr::Const(_) => {}
            Expr::Col(column) => {
                out.insert(*column);
            }
            Expr::Unary(_, arg) => arg.collect_columns(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
            Expr::Where(cond, then, otherwise) => {
                cond.collect_columns(out);
                then.collect_columns(out);
                otherwise.collect_columns(out);
            }
        }
    }

    /// Columns this expression reads.
    #[must_use]
    pub fn columns(&self) -> BTreeSet<Column> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }
}

/// Floored remainder: the result takes the sign of the divisor.
#[inline]
fn floored_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

impl Predicate {
    /// Conjunction of `clauses`; `Always` clauses are dropped and nested
    /// conjunctions flattened.
    #[must_use]
    pub fn all<I: IntoIterator<Item = Predicate>>(clauses: I) -> Self {
        let mut flat = Vec::new();
        for clause in clauses {
            match clause {
                Predicate::Always => {}
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::Always,
            1 => flat.pop().unwrap_or(Predicate::Always),
            _ => Predicate::And(flat),
        }
    }

    /// `self & other`.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        Self::all([self, other])
    }

    /// True if the predicate constrains nothing.
    #[must_use]
    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::Always)
    }

    /// Number of comparison clauses.
    #[must_use]
    pub fn clause_count(&self) -> usize {
        match self {
            Predicate::Always => 0,
            Predicate::Compare(..) => 1,
            Predicate::And(inner) => inner.iter().map(Predicate::clause_count).sum(),
        }
    }

    /// Evaluates the predicate for one event.
    #[must_use]
    pub fn eval(&self, row: &ColumnValues) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Compare(cmp, lhs, rhs) => cmp.holds(lhs.eval(row), rhs.eval(row)),
            Predicate::And(inner) => inner.iter().all(|p| p.eval(row)),
        }
    }

    /// Collects every column this predicate reads.
    pub fn collect_columns(&self, out: &mut BTreeSet<Column>) {
        match self {
            Predicate::Always => {}
            Predicate::Compare(_, lhs, rhs) => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
            Predicate::And(inner) => {
                for p in inner {
                    p.collect_columns(out);
                }
            }
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl From<Column> for Expr {
    fn from(column: Column) -> Self {
        Expr::Col(column)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::binary($op, self, rhs.into())
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);
impl_binary_op!(Div, div, BinaryOp::Div);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryFn::Neg, self)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(value) => write!(f, "{value}"),
            Expr::Col(column) => write!(f, "{column}"),
            Expr::Unary(UnaryFn::Neg, arg) => write!(f, "-{arg}"),
            Expr::Unary(func, arg) => {
                let name = match func {
                    UnaryFn::Sin => "sin",
                    UnaryFn::Abs => "abs",
                    UnaryFn::Sqrt => "sqrt",
                    UnaryFn::Neg => unreachable!(),
                };
                write!(f, "{name}({arg})")
            }
            Expr::Binary(BinaryOp::Atan2, y, x) => write!(f, "arctan2({y}, {x})"),
            Expr::Binary(op, lhs, rhs) => {
                let symbol = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Mod => "%",
                    BinaryOp::Atan2 => unreachable!(),
                };
                write!(f, "({lhs} {symbol} {rhs})")
            }
            Expr::Where(cond, then, otherwise) => {
                write!(f, "where({cond}, {then}, {otherwise})")
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => Ok(()),
            Predicate::Compare(cmp, lhs, rhs) => write!(f, "({lhs} {} {rhs})", cmp.symbol()),
            Predicate::And(inner) => {
                for (i, clause) in inner.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{clause}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(t: f64, x: f64) -> ColumnValues {
        let mut values = [f64::NAN; Column::COUNT];
        values[Column::T.index()] = t;
        values[Column::X.index()] = x;
        values
    }

    #[test]
    fn test_column_names_round_trip() {
        for column in Column::ALL {
            assert_eq!(column.name().parse::<Column>().unwrap(), column);
        }
        assert!("lambda".parse::<Column>().is_err());
    }

    #[test]
    fn test_floored_modulo_sign() {
        assert_relative_eq!(floored_mod(7.0, 3.0), 1.0);
        assert_relative_eq!(floored_mod(-1.0, 3.0), 2.0);
        assert_relative_eq!(floored_mod(-0.5, 0.25), 0.0);
        assert_relative_eq!(floored_mod(1.0, -3.0), -2.0);
    }

    #[test]
    fn test_arithmetic_eval() {
        let expr = (Expr::col(Column::T) - 0.5).modulo(2.0) * 3.0 + 1.0;
        assert_relative_eq!(expr.eval(&row(3.0, 0.0)), 2.5);
        assert_relative_eq!(expr.eval(&row(0.0, 0.0)), 5.5);
        assert_relative_eq!(expr.eval_at_time(3.0), 2.5);
    }

    #[test]
    fn test_trig_eval() {
        let expr = (-Expr::col(Column::X)).atan2(1.0).sin();
        assert_relative_eq!(expr.eval(&row(0.0, -1.0)), std::f64::consts::FRAC_PI_4.sin());
    }

    #[test]
    fn test_select() {
        let expr = Expr::select(
            Expr::col(Column::T).less_than(1.0),
            Expr::constant(10.0),
            Expr::col(Column::T),
        );
        assert_relative_eq!(expr.eval(&row(0.5, 0.0)), 10.0);
        assert_relative_eq!(expr.eval(&row(2.0, 0.0)), 2.0);
    }

    #[test]
    fn test_predicate_all_drops_always() {
        let pred = Predicate::all([
            Predicate::Always,
            Expr::col(Column::Lamda).at_least(2.4),
            Predicate::Always,
        ]);
        assert_eq!(pred.clause_count(), 1);
        assert_eq!(pred.to_string(), "(lamda >= 2.4)");

        let empty = Predicate::all([Predicate::Always, Predicate::Always]);
        assert!(empty.is_always());
        assert_eq!(empty.to_string(), "");
    }

    #[test]
    fn test_predicate_and_flattens() {
        let pred = Expr::col(Column::X)
            .at_least(-0.06)
            .and(Expr::col(Column::X).at_most(0.1))
            .and(Expr::col(Column::Y).greater_than(0.0));
        assert_eq!(pred.clause_count(), 3);
        assert_eq!(pred.to_string(), "(x >= -0.06) & (x <= 0.1) & (y > 0)");
        assert!(!pred.eval(&row(0.0, 0.0)));
    }

    #[test]
    fn test_columns_collected() {
        let expr = Expr::constant(4.0 * std::f64::consts::PI) / Expr::col(Column::Lamda)
            * (Expr::constant(0.01) + (-Expr::col(Column::X)).atan2(3.0)).sin();
        let columns: Vec<_> = expr.columns().into_iter().collect();
        assert_eq!(columns, vec![Column::X, Column::Lamda]);
    }

    #[test]
    fn test_display_functions() {
        let expr = (-Expr::col(Column::X)).atan2(3.0).sin().abs();
        assert_eq!(expr.to_string(), "abs(sin(arctan2(-x, 3)))");
    }
}
