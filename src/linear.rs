use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::ops::{Add, Mul, Neg, Sub};

use num_bigint::BigInt;

/// A linear expression `c + Σ aᵢ·vᵢ` with `BigInt` coefficients.
///
/// Terms with coefficient zero are never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinExpr<V: Ord> {
    terms: BTreeMap<V, BigInt>,
    cst: BigInt,
}

impl<V: Ord + Clone> LinExpr<V> {
    pub fn constant(c: impl Into<BigInt>) -> Self {
        Self {
            terms: BTreeMap::new(),
            cst: c.into(),
        }
    }

    pub fn var(v: V) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(v, BigInt::from(1));
        Self {
            terms,
            cst: BigInt::from(0),
        }
    }

    /// `a·v` as an expression.
    pub fn term(a: impl Into<BigInt>, v: V) -> Self {
        Self::var(v) * a.into()
    }

    pub fn cst(&self) -> &BigInt {
        &self.cst
    }

    /// The non-zero `(variable, coefficient)` terms, in variable order.
    pub fn terms(&self) -> impl Iterator<Item = (&V, &BigInt)> {
        self.terms.iter()
    }

    pub fn variables(&self) -> impl Iterator<Item = &V> {
        self.terms.keys()
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn coeff(&self, v: &V) -> BigInt {
        self.terms.get(v).cloned().unwrap_or_else(|| BigInt::from(0))
    }

    fn add_term(&mut self, v: V, a: BigInt) {
        if a == BigInt::from(0) {
            return;
        }
        match self.terms.entry(v) {
            Entry::Vacant(e) => {
                e.insert(a);
            }
            Entry::Occupied(mut e) => {
                *e.get_mut() += a;
                if *e.get() == BigInt::from(0) {
                    e.remove();
                }
            }
        }
    }

    /// Rewrite the expression over another variable space.
    pub fn map_vars<U: Ord + Clone>(&self, mut f: impl FnMut(&V) -> U) -> LinExpr<U> {
        let mut out = LinExpr::constant(self.cst.clone());
        for (v, a) in &self.terms {
            out.add_term(f(v), a.clone());
        }
        out
    }
}

impl<V: Ord + Clone> Add for LinExpr<V> {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self {
        self.cst += rhs.cst;
        for (v, a) in rhs.terms {
            self.add_term(v, a);
        }
        self
    }
}

impl<V: Ord + Clone> Sub for LinExpr<V> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl<V: Ord + Clone> Neg for LinExpr<V> {
    type Output = Self;
    fn neg(mut self) -> Self {
        self.cst = -std::mem::replace(&mut self.cst, BigInt::from(0));
        for a in self.terms.values_mut() {
            *a = -std::mem::replace(a, BigInt::from(0));
        }
        self
    }
}

impl<V: Ord + Clone> Mul<BigInt> for LinExpr<V> {
    type Output = Self;
    fn mul(mut self, k: BigInt) -> Self {
        if k == BigInt::from(0) {
            return Self::constant(0);
        }
        self.cst *= &k;
        for a in self.terms.values_mut() {
            *a *= &k;
        }
        self
    }
}

impl<V: Ord + Clone> Add<i64> for LinExpr<V> {
    type Output = Self;
    fn add(mut self, k: i64) -> Self {
        self.cst += k;
        self
    }
}

impl<V: Ord + Clone> Sub<i64> for LinExpr<V> {
    type Output = Self;
    fn sub(mut self, k: i64) -> Self {
        self.cst -= k;
        self
    }
}

impl<V: Ord + Clone> From<BigInt> for LinExpr<V> {
    fn from(k: BigInt) -> Self {
        Self::constant(k)
    }
}
impl<V: Ord + Clone> From<i64> for LinExpr<V> {
    fn from(k: i64) -> Self {
        Self::constant(k)
    }
}
impl<V: Ord + Clone> From<i32> for LinExpr<V> {
    fn from(k: i32) -> Self {
        Self::constant(k)
    }
}

impl<V: Ord + Clone + Display> Display for LinExpr<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let zero = BigInt::from(0);
        let one = BigInt::from(1);
        let minus_one = BigInt::from(-1);

        let mut first = true;
        for (v, a) in &self.terms {
            if first {
                first = false;
                if *a == one {
                    write!(f, "{}", v)?;
                } else if *a == minus_one {
                    write!(f, "-{}", v)?;
                } else {
                    write!(f, "{}*{}", a, v)?;
                }
            } else if *a > zero {
                if *a == one {
                    write!(f, " + {}", v)?;
                } else {
                    write!(f, " + {}*{}", a, v)?;
                }
            } else {
                let m = -a.clone();
                if m == one {
                    write!(f, " - {}", v)?;
                } else {
                    write!(f, " - {}*{}", m, v)?;
                }
            }
        }

        if first {
            write!(f, "{}", self.cst)?;
        } else if self.cst > zero {
            write!(f, " + {}", self.cst)?;
        } else if self.cst < zero {
            write!(f, " - {}", -self.cst.clone())?;
        }
        Ok(())
    }
}

/// Constraint kind over the normalized expression `e`:
/// `e == 0`, `e <= 0`, or `e != 0`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CstKind {
    Eq,
    Leq,
    Neq,
}

/// A linear constraint, stored in the normal form `e ⋈ 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinCst<V: Ord> {
    expr: LinExpr<V>,
    kind: CstKind,
}

impl<V: Ord + Clone> LinCst<V> {
    pub fn new(expr: LinExpr<V>, kind: CstKind) -> Self {
        Self { expr, kind }
    }

    /// `lhs <= rhs`
    pub fn leq(lhs: impl Into<LinExpr<V>>, rhs: impl Into<LinExpr<V>>) -> Self {
        Self::new(lhs.into() - rhs.into(), CstKind::Leq)
    }
    /// `lhs >= rhs`
    pub fn geq(lhs: impl Into<LinExpr<V>>, rhs: impl Into<LinExpr<V>>) -> Self {
        Self::new(rhs.into() - lhs.into(), CstKind::Leq)
    }
    /// `lhs < rhs` (integer semantics: `lhs <= rhs - 1`)
    pub fn lt(lhs: impl Into<LinExpr<V>>, rhs: impl Into<LinExpr<V>>) -> Self {
        Self::new(lhs.into() - rhs.into() + 1, CstKind::Leq)
    }
    /// `lhs > rhs`
    pub fn gt(lhs: impl Into<LinExpr<V>>, rhs: impl Into<LinExpr<V>>) -> Self {
        Self::lt(rhs, lhs)
    }
    /// `lhs == rhs`
    pub fn eq(lhs: impl Into<LinExpr<V>>, rhs: impl Into<LinExpr<V>>) -> Self {
        Self::new(lhs.into() - rhs.into(), CstKind::Eq)
    }
    /// `lhs != rhs`
    pub fn neq(lhs: impl Into<LinExpr<V>>, rhs: impl Into<LinExpr<V>>) -> Self {
        Self::new(lhs.into() - rhs.into(), CstKind::Neq)
    }

    /// The always-false constraint.
    pub fn contradiction() -> Self {
        Self::new(LinExpr::constant(1), CstKind::Eq)
    }

    pub fn expr(&self) -> &LinExpr<V> {
        &self.expr
    }
    pub fn kind(&self) -> CstKind {
        self.kind
    }

    /// Integer negation of the constraint.
    pub fn negate(&self) -> Self {
        match self.kind {
            // ¬(e <= 0)  ⇔  e > 0  ⇔  -e + 1 <= 0
            CstKind::Leq => Self::new(-self.expr.clone() + 1, CstKind::Leq),
            CstKind::Eq => Self::new(self.expr.clone(), CstKind::Neq),
            CstKind::Neq => Self::new(self.expr.clone(), CstKind::Eq),
        }
    }

    pub fn map_vars<U: Ord + Clone>(&self, f: impl FnMut(&V) -> U) -> LinCst<U> {
        LinCst::new(self.expr.map_vars(f), self.kind)
    }
}

impl<V: Ord + Clone + Display> Display for LinCst<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Render with the constant moved to the right-hand side.
        let lhs = LinExpr {
            terms: self.expr.terms.clone(),
            cst: BigInt::from(0),
        };
        let rhs = -self.expr.cst.clone();
        let op = match self.kind {
            CstKind::Eq => "=",
            CstKind::Leq => "<=",
            CstKind::Neq => "!=",
        };
        write!(f, "{} {} {}", lhs, op, rhs)
    }
}

/// A conjunction of linear constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinCstSystem<V: Ord> {
    csts: Vec<LinCst<V>>,
}

impl<V: Ord + Clone> LinCstSystem<V> {
    pub fn new() -> Self {
        Self { csts: Vec::new() }
    }

    pub fn push(&mut self, cst: LinCst<V>) {
        self.csts.push(cst);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinCst<V>> {
        self.csts.iter()
    }

    pub fn len(&self) -> usize {
        self.csts.len()
    }
    pub fn is_empty(&self) -> bool {
        self.csts.is_empty()
    }
}

impl<V: Ord + Clone> From<LinCst<V>> for LinCstSystem<V> {
    fn from(cst: LinCst<V>) -> Self {
        let mut sys = Self::new();
        sys.push(cst);
        sys
    }
}

impl<V: Ord + Clone> IntoIterator for LinCstSystem<V> {
    type Item = LinCst<V>;
    type IntoIter = std::vec::IntoIter<LinCst<V>>;
    fn into_iter(self) -> Self::IntoIter {
        self.csts.into_iter()
    }
}

impl<'a, V: Ord + Clone> IntoIterator for &'a LinCstSystem<V> {
    type Item = &'a LinCst<V>;
    type IntoIter = std::slice::Iter<'a, LinCst<V>>;
    fn into_iter(self) -> Self::IntoIter {
        self.csts.iter()
    }
}

impl<V: Ord + Clone + Display> Display for LinCstSystem<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, c) in self.csts.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> LinExpr<&'static str> {
        LinExpr::var("x")
    }
    fn y() -> LinExpr<&'static str> {
        LinExpr::var("y")
    }

    #[test]
    fn test_cancellation() {
        let e = x() + y() - x();
        assert_eq!(e, y());
        let e = x() - x();
        assert!(e.is_constant());
        assert_eq!(*e.cst(), BigInt::from(0));
    }

    #[test]
    fn test_scaling() {
        let e = (x() + 3) * BigInt::from(2);
        assert_eq!(e.coeff(&"x"), BigInt::from(2));
        assert_eq!(*e.cst(), BigInt::from(6));
    }

    #[test]
    fn test_negate() {
        // x <= 5 negated is x >= 6
        let c = LinCst::leq(x(), 5);
        assert_eq!(c.negate(), LinCst::geq(x(), 6));
        assert_eq!(LinCst::eq(x(), y()).negate().kind(), CstKind::Neq);
    }

    #[test]
    fn test_display() {
        let c = LinCst::leq(x() + y() * BigInt::from(2), 5);
        assert_eq!(c.to_string(), "x + 2*y <= 5");
        let c = LinCst::eq(x(), y());
        assert_eq!(c.to_string(), "x - y = 0");
    }
}
