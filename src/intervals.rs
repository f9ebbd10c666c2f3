use std::collections::BTreeMap;
use std::fmt::{self, Display};

use log::trace;
use num_bigint::BigInt;

use crate::linear::{CstKind, LinCst, LinCstSystem, LinExpr};
use crate::numeric::{NumDomain, VarLike};
use crate::op::BinOp;

fn zero() -> BigInt {
    BigInt::from(0)
}
fn one() -> BigInt {
    BigInt::from(1)
}

/// Floor division on `BigInt` (`/` truncates toward zero).
fn div_floor(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    let r = a % b;
    if r != zero() && (r < zero()) != (*b < zero()) {
        q - 1
    } else {
        q
    }
}

/// Ceiling division on `BigInt`.
fn div_ceil(a: &BigInt, b: &BigInt) -> BigInt {
    -div_floor(&-a, b)
}

/// `2^e - 1` for the number of magnitude bits of `b`; the smallest
/// all-ones mask covering `b >= 0`.
fn pow2_mask(b: &BigInt) -> BigInt {
    (one() << b.bits()) - 1
}

/// An interval end: `-oo`, a finite integer, or `+oo`.
///
/// The derived order is the numeric one: `NegInf < Finite(_) < PosInf`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bound {
    NegInf,
    Finite(BigInt),
    PosInf,
}

impl Bound {
    pub fn finite(&self) -> Option<&BigInt> {
        match self {
            Bound::Finite(n) => Some(n),
            _ => None,
        }
    }

    fn signum(&self) -> i8 {
        match self {
            Bound::NegInf => -1,
            Bound::PosInf => 1,
            Bound::Finite(n) => {
                if *n < zero() {
                    -1
                } else if *n > zero() {
                    1
                } else {
                    0
                }
            }
        }
    }

    pub fn add(&self, other: &Bound) -> Bound {
        use Bound::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a + b),
            (NegInf, PosInf) | (PosInf, NegInf) => {
                panic!("Bound: adding opposite infinities")
            }
            (NegInf, _) | (_, NegInf) => NegInf,
            _ => PosInf,
        }
    }

    pub fn sub(&self, other: &Bound) -> Bound {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &Bound) -> Bound {
        use Bound::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a * b),
            _ => {
                // At least one infinity; zero absorbs.
                match self.signum() * other.signum() {
                    0 => Finite(zero()),
                    s if s > 0 => PosInf,
                    _ => NegInf,
                }
            }
        }
    }

    pub fn neg(&self) -> Bound {
        match self {
            Bound::NegInf => Bound::PosInf,
            Bound::PosInf => Bound::NegInf,
            Bound::Finite(n) => Bound::Finite(-n),
        }
    }

    /// Truncating division; `other` must not be zero.
    fn div_trunc(&self, other: &Bound) -> Bound {
        use Bound::*;
        match (self, other) {
            (Finite(a), Finite(b)) => {
                assert!(*b != zero(), "Bound: division by zero");
                Finite(a / b)
            }
            (_, NegInf) | (_, PosInf) => Finite(zero()),
            (NegInf, Finite(b)) => {
                if *b > zero() {
                    NegInf
                } else {
                    PosInf
                }
            }
            (PosInf, Finite(b)) => {
                if *b > zero() {
                    PosInf
                } else {
                    NegInf
                }
            }
        }
    }

    /// Division rounded toward `-oo` / `+oo` (for outward enclosures).
    fn div_round(&self, other: &Bound, up: bool) -> Bound {
        use Bound::*;
        match (self, other) {
            (Finite(a), Finite(b)) => {
                assert!(*b != zero(), "Bound: division by zero");
                Finite(if up { div_ceil(a, b) } else { div_floor(a, b) })
            }
            _ => self.div_trunc(other),
        }
    }
}

impl Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-oo"),
            Bound::PosInf => write!(f, "+oo"),
            Bound::Finite(n) => write!(f, "{}", n),
        }
    }
}

/// An integer interval `[lo, hi]` with `BigInt` ends.
///
/// Bottom (the empty interval) is canonically `[+oo, -oo]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lo: Bound,
    pub hi: Bound,
}

impl Interval {
    pub fn new(lo: Bound, hi: Bound) -> Self {
        if lo > hi {
            Self::bottom()
        } else {
            Self { lo, hi }
        }
    }

    pub fn top() -> Self {
        Self {
            lo: Bound::NegInf,
            hi: Bound::PosInf,
        }
    }

    pub fn bottom() -> Self {
        Self {
            lo: Bound::PosInf,
            hi: Bound::NegInf,
        }
    }

    pub fn constant(c: impl Into<BigInt>) -> Self {
        let c = c.into();
        Self {
            lo: Bound::Finite(c.clone()),
            hi: Bound::Finite(c),
        }
    }

    pub fn range(lo: impl Into<BigInt>, hi: impl Into<BigInt>) -> Self {
        Self::new(Bound::Finite(lo.into()), Bound::Finite(hi.into()))
    }

    pub fn is_bottom(&self) -> bool {
        self.lo > self.hi
    }

    pub fn is_top(&self) -> bool {
        self.lo == Bound::NegInf && self.hi == Bound::PosInf
    }

    /// The single value of the interval, if it has exactly one.
    pub fn singleton(&self) -> Option<&BigInt> {
        match (&self.lo, &self.hi) {
            (Bound::Finite(a), Bound::Finite(b)) if a == b => Some(a),
            _ => None,
        }
    }

    pub fn contains_zero(&self) -> bool {
        self.lo <= Bound::Finite(zero()) && Bound::Finite(zero()) <= self.hi
    }

    pub fn is_nonneg(&self) -> bool {
        !self.is_bottom() && self.lo >= Bound::Finite(zero())
    }

    pub fn is_nonpos(&self) -> bool {
        !self.is_bottom() && self.hi <= Bound::Finite(zero())
    }

    // Lattice operations.

    pub fn leq(&self, other: &Self) -> bool {
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        other.lo <= self.lo && self.hi <= other.hi
    }

    pub fn join(&self, other: &Self) -> Self {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        Self {
            lo: self.lo.clone().min(other.lo.clone()),
            hi: self.hi.clone().max(other.hi.clone()),
        }
    }

    pub fn meet(&self, other: &Self) -> Self {
        Self::new(
            self.lo.clone().max(other.lo.clone()),
            self.hi.clone().min(other.hi.clone()),
        )
    }

    pub fn widen(&self, other: &Self) -> Self {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        Self {
            lo: if other.lo < self.lo {
                Bound::NegInf
            } else {
                self.lo.clone()
            },
            hi: if other.hi > self.hi {
                Bound::PosInf
            } else {
                self.hi.clone()
            },
        }
    }

    // Arithmetic.

    pub fn neg(&self) -> Self {
        if self.is_bottom() {
            return Self::bottom();
        }
        Self {
            lo: self.hi.neg(),
            hi: self.lo.neg(),
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        Self {
            lo: self.lo.add(&other.lo),
            hi: self.hi.add(&other.hi),
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        let corners = [
            self.lo.mul(&other.lo),
            self.lo.mul(&other.hi),
            self.hi.mul(&other.lo),
            self.hi.mul(&other.hi),
        ];
        Self {
            lo: corners.iter().min().unwrap().clone(),
            hi: corners.iter().max().unwrap().clone(),
        }
    }

    /// Quotient corners for a divisor of constant sign (no zero).
    fn div_nonzero(&self, d: &Self) -> Self {
        let corners = [
            self.lo.div_trunc(&d.lo),
            self.lo.div_trunc(&d.hi),
            self.hi.div_trunc(&d.lo),
            self.hi.div_trunc(&d.hi),
        ];
        Self {
            lo: corners.iter().min().unwrap().clone(),
            hi: corners.iter().max().unwrap().clone(),
        }
    }

    /// Signed (truncating) division. The divisor is split around zero;
    /// a divisor of exactly `[0, 0]` yields bottom.
    pub fn sdiv(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        let neg_part = other.meet(&Self::new(Bound::NegInf, Bound::Finite(-one())));
        let pos_part = other.meet(&Self::new(Bound::Finite(one()), Bound::PosInf));
        let mut res = Self::bottom();
        if !neg_part.is_bottom() {
            res = res.join(&self.div_nonzero(&neg_part));
        }
        if !pos_part.is_bottom() {
            res = res.join(&self.div_nonzero(&pos_part));
        }
        res
    }

    pub fn udiv(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        if self.is_nonneg() && other.is_nonneg() {
            self.sdiv(other)
        } else {
            Self::top()
        }
    }

    /// Signed remainder (sign follows the dividend).
    pub fn srem(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        // |r| < max(|other|)
        let m = match (&other.lo, &other.hi) {
            (Bound::Finite(a), Bound::Finite(b)) => {
                let (a, b) = (a.magnitude(), b.magnitude());
                Bound::Finite(BigInt::from(a.max(b).clone()) - 1)
            }
            _ => Bound::PosInf,
        };
        let base = Self::new(m.neg(), m);
        if self.is_nonneg() {
            base.meet(&Self::new(Bound::Finite(zero()), self.hi.clone()))
        } else if self.is_nonpos() {
            base.meet(&Self::new(self.lo.clone(), Bound::Finite(zero())))
        } else {
            base
        }
    }

    pub fn urem(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        if self.is_nonneg() && other.is_nonneg() {
            let hi = match &other.hi {
                Bound::Finite(b) => Bound::Finite(b.clone() - 1).min(self.hi.clone()),
                _ => self.hi.clone(),
            };
            Self::new(Bound::Finite(zero()), hi)
        } else {
            Self::top()
        }
    }

    // Bitwise operators: conservative envelopes over the non-negative case.

    pub fn and(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        if self.is_nonneg() && other.is_nonneg() {
            let hi = match (&self.hi, &other.hi) {
                (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.min(b).clone()),
                (Bound::Finite(a), _) => Bound::Finite(a.clone()),
                (_, Bound::Finite(b)) => Bound::Finite(b.clone()),
                _ => Bound::PosInf,
            };
            Self::new(Bound::Finite(zero()), hi)
        } else if self.is_nonneg() {
            Self::new(Bound::Finite(zero()), self.hi.clone())
        } else if other.is_nonneg() {
            Self::new(Bound::Finite(zero()), other.hi.clone())
        } else {
            Self::top()
        }
    }

    pub fn or(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        if self.is_nonneg() && other.is_nonneg() {
            let lo = self.lo.clone().max(other.lo.clone());
            let hi = match (&self.hi, &other.hi) {
                (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(pow2_mask(a.max(b))),
                _ => Bound::PosInf,
            };
            Self::new(lo, hi)
        } else {
            Self::top()
        }
    }

    pub fn xor(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        if self.is_nonneg() && other.is_nonneg() {
            let hi = match (&self.hi, &other.hi) {
                (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(pow2_mask(a.max(b))),
                _ => Bound::PosInf,
            };
            Self::new(Bound::Finite(zero()), hi)
        } else {
            Self::top()
        }
    }

    fn shift_amount(other: &Self) -> Option<Self> {
        let s = other.meet(&Self::new(Bound::Finite(zero()), Bound::PosInf));
        if s.is_bottom() {
            None
        } else {
            Some(s)
        }
    }

    fn pow2(e: &BigInt) -> Bound {
        match u32::try_from(e) {
            Ok(e) => Bound::Finite(one() << e),
            Err(_) => Bound::PosInf,
        }
    }

    pub fn shl(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        let s = match Self::shift_amount(other) {
            Some(s) => s,
            None => return Self::top(),
        };
        let lo = match s.lo.finite() {
            Some(e) => Self::pow2(e),
            None => unreachable!("shift amount has a finite lower end"),
        };
        let hi = match &s.hi {
            Bound::Finite(e) => Self::pow2(e),
            _ => Bound::PosInf,
        };
        self.mul(&Self { lo, hi })
    }

    /// `x >> s` for non-negative `x` (0 when the shift exhausts the value).
    fn shr_bound(x: &Bound, s: &Bound) -> Bound {
        match (x, s) {
            (Bound::PosInf, _) => Bound::PosInf,
            (Bound::Finite(x), Bound::Finite(s)) => match u32::try_from(s) {
                Ok(s) => Bound::Finite(x.clone() >> s),
                Err(_) => Bound::Finite(zero()),
            },
            (Bound::Finite(_), Bound::PosInf) => Bound::Finite(zero()),
            _ => unreachable!("logical shift of a negative bound"),
        }
    }

    pub fn lshr(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        if !self.is_nonneg() {
            return Self::top();
        }
        let s = match Self::shift_amount(other) {
            Some(s) => s,
            None => return Self::top(),
        };
        Self::new(
            Self::shr_bound(&self.lo, &s.hi),
            Self::shr_bound(&self.hi, &s.lo),
        )
    }

    /// Arithmetic shift: floor division by `2^s`.
    fn ashr_bound(x: &Bound, s: &Bound) -> Bound {
        match (x, s) {
            (Bound::NegInf, _) => Bound::NegInf,
            (Bound::PosInf, _) => Bound::PosInf,
            (Bound::Finite(x), Bound::Finite(s)) => match u32::try_from(s) {
                Ok(s) => Bound::Finite(div_floor(x, &(one() << s))),
                Err(_) => Bound::Finite(if *x < zero() { -one() } else { zero() }),
            },
            (Bound::Finite(x), _) => Bound::Finite(if *x < zero() { -one() } else { zero() }),
        }
    }

    pub fn ashr(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        let s = match Self::shift_amount(other) {
            Some(s) => s,
            None => return Self::top(),
        };
        let corners = [
            Self::ashr_bound(&self.lo, &s.lo),
            Self::ashr_bound(&self.lo, &s.hi),
            Self::ashr_bound(&self.hi, &s.lo),
            Self::ashr_bound(&self.hi, &s.hi),
        ];
        Self {
            lo: corners.iter().min().unwrap().clone(),
            hi: corners.iter().max().unwrap().clone(),
        }
    }

    /// Evaluate `self op other`.
    pub fn apply(op: BinOp, a: &Self, b: &Self) -> Self {
        match op {
            BinOp::Add => a.add(b),
            BinOp::Sub => a.sub(b),
            BinOp::Mul => a.mul(b),
            BinOp::SDiv => a.sdiv(b),
            BinOp::UDiv => a.udiv(b),
            BinOp::SRem => a.srem(b),
            BinOp::URem => a.urem(b),
            BinOp::And => a.and(b),
            BinOp::Or => a.or(b),
            BinOp::Xor => a.xor(b),
            BinOp::Shl => a.shl(b),
            BinOp::LShr => a.lshr(b),
            BinOp::AShr => a.ashr(b),
        }
    }

    /// Outward enclosure of `{y | y·d ∈ self, d ∈ other}`, defined only
    /// when `other` excludes zero. Used for inverse multiplication.
    pub fn div_outward(&self, other: &Self) -> Option<Self> {
        if self.is_bottom() || other.is_bottom() || other.contains_zero() {
            return None;
        }
        let mut lo = Bound::PosInf;
        let mut hi = Bound::NegInf;
        for n in [&self.lo, &self.hi] {
            for d in [&other.lo, &other.hi] {
                let down = n.div_round(d, false);
                let up = n.div_round(d, true);
                lo = lo.min(down);
                hi = hi.max(up);
            }
        }
        Some(Self::new(lo, hi))
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            write!(f, "_|_")
        } else {
            write!(f, "[{}, {}]", self.lo, self.hi)
        }
    }
}

/// The classic non-relational interval domain: a per-variable map to
/// [`Interval`]s. The reference independent-attribute instance of
/// [`NumDomain`] that the term domain is usually stacked over.
#[derive(Debug, Clone)]
pub struct IntervalDomain<V: VarLike> {
    env: BTreeMap<V, Interval>,
    bottom: bool,
}

impl<V: VarLike> IntervalDomain<V> {
    fn set_bottom(&mut self) {
        self.bottom = true;
        self.env.clear();
    }

    fn value(&self, v: &V) -> Interval {
        if self.bottom {
            return Interval::bottom();
        }
        self.env.get(v).cloned().unwrap_or_else(Interval::top)
    }

    fn put(&mut self, v: &V, itv: Interval) {
        if itv.is_bottom() {
            self.set_bottom();
        } else if itv.is_top() {
            self.env.remove(v);
        } else {
            self.env.insert(v.clone(), itv);
        }
    }

    fn eval(&self, e: &LinExpr<V>) -> Interval {
        let mut res = Interval::constant(e.cst().clone());
        for (v, a) in e.terms() {
            res = res.add(&Interval::constant(a.clone()).mul(&self.value(v)));
        }
        res
    }

    /// Tighten variable bounds so that `e <= 0` can hold.
    fn refine_leq(&mut self, e: &LinExpr<V>) {
        let vars: Vec<V> = e.variables().cloned().collect();
        for v in &vars {
            let a = e.coeff(v);
            // Interval of e - a*v.
            let mut residual = Interval::constant(e.cst().clone());
            for (u, c) in e.terms() {
                if u != v {
                    residual = residual.add(&Interval::constant(c.clone()).mul(&self.value(u)));
                }
            }
            // a*v <= -residual, so a*v <= -residual.lo.
            let rlo = match residual.lo {
                Bound::Finite(n) => n,
                _ => continue,
            };
            let bound = -rlo;
            let old = self.value(v);
            let new = if a > zero() {
                old.meet(&Interval::new(
                    Bound::NegInf,
                    Bound::Finite(div_floor(&bound, &a)),
                ))
            } else {
                old.meet(&Interval::new(
                    Bound::Finite(div_ceil(&bound, &a)),
                    Bound::PosInf,
                ))
            };
            self.put(v, new);
            if self.bottom {
                return;
            }
        }
    }

    /// Shave an endpoint off a single-variable disequality.
    fn refine_neq(&mut self, e: &LinExpr<V>) {
        let mut it = e.terms();
        let (v, a) = match (it.next(), it.next()) {
            (Some((v, a)), None) => (v.clone(), a.clone()),
            _ => return,
        };
        if a != one() && a != -one() {
            return;
        }
        // a*v + c != 0  =>  v != -c/a
        let k = if a == one() {
            -e.cst().clone()
        } else {
            e.cst().clone()
        };
        let old = self.value(&v);
        let mut new = old.clone();
        if old.lo == Bound::Finite(k.clone()) {
            new = Interval::new(Bound::Finite(k.clone() + 1), new.hi);
        }
        if old.hi == Bound::Finite(k.clone()) {
            new = Interval::new(new.lo, Bound::Finite(k.clone() - 1));
        }
        self.put(&v, new);
    }
}

impl<V: VarLike> Display for IntervalDomain<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom {
            return write!(f, "_|_");
        }
        write!(f, "{{")?;
        for (i, (v, itv)) in self.env.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} -> {}", v, itv)?;
        }
        write!(f, "}}")
    }
}

impl<V: VarLike> NumDomain<V> for IntervalDomain<V> {
    const INDEPENDENT: bool = true;

    fn top() -> Self {
        Self {
            env: BTreeMap::new(),
            bottom: false,
        }
    }

    fn bottom() -> Self {
        Self {
            env: BTreeMap::new(),
            bottom: true,
        }
    }

    fn is_bottom(&self) -> bool {
        self.bottom
    }

    fn is_top(&self) -> bool {
        !self.bottom && self.env.is_empty()
    }

    fn leq(&mut self, other: &Self) -> bool {
        if self.bottom {
            return true;
        }
        if other.bottom {
            return false;
        }
        // Unbound variables are top, so only other's bindings matter.
        other.env.iter().all(|(v, i2)| self.value(v).leq(i2))
    }

    fn join(&self, other: &Self) -> Self {
        if self.bottom {
            return other.clone();
        }
        if other.bottom {
            return self.clone();
        }
        let mut res = Self::top();
        for (v, i1) in &self.env {
            if let Some(i2) = other.env.get(v) {
                res.put(v, i1.join(i2));
            }
        }
        res
    }

    fn widen(&self, other: &Self) -> Self {
        if self.bottom {
            return other.clone();
        }
        if other.bottom {
            return self.clone();
        }
        let mut res = Self::top();
        for (v, i1) in &self.env {
            if let Some(i2) = other.env.get(v) {
                res.put(v, i1.widen(i2));
            }
        }
        res
    }

    fn meet(&self, other: &Self) -> Self {
        if self.bottom || other.bottom {
            return Self::bottom();
        }
        let mut res = self.clone();
        for (v, i2) in &other.env {
            let met = res.value(v).meet(i2);
            res.put(v, met);
            if res.bottom {
                return Self::bottom();
            }
        }
        res
    }

    fn assign(&mut self, x: &V, e: &LinExpr<V>) {
        if self.bottom {
            return;
        }
        trace!("intervals: {} := {}", x, e);
        let itv = self.eval(e);
        self.put(x, itv);
    }

    fn apply(&mut self, op: BinOp, x: &V, y: &V, z: &V) {
        if self.bottom {
            return;
        }
        let itv = Interval::apply(op, &self.value(y), &self.value(z));
        trace!("intervals: {} := {} {} {} = {}", x, y, op, z, itv);
        self.put(x, itv);
    }

    fn apply_const(&mut self, op: BinOp, x: &V, y: &V, k: &BigInt) {
        if self.bottom {
            return;
        }
        let itv = Interval::apply(op, &self.value(y), &Interval::constant(k.clone()));
        self.put(x, itv);
    }

    fn add_cst(&mut self, cst: &LinCst<V>) {
        if self.bottom {
            return;
        }
        trace!("intervals: assume {}", cst);
        match cst.kind() {
            CstKind::Leq => self.refine_leq(cst.expr()),
            CstKind::Eq => {
                self.refine_leq(cst.expr());
                if !self.bottom {
                    let neg = -cst.expr().clone();
                    self.refine_leq(&neg);
                }
            }
            CstKind::Neq => self.refine_neq(cst.expr()),
        }
        // A constant constraint that cannot hold empties the state.
        if !self.bottom && cst.expr().is_constant() {
            let c = cst.expr().cst();
            let sat = match cst.kind() {
                CstKind::Eq => *c == zero(),
                CstKind::Leq => *c <= zero(),
                CstKind::Neq => *c != zero(),
            };
            if !sat {
                self.set_bottom();
            }
        }
    }

    fn forget(&mut self, x: &V) {
        if self.bottom {
            return;
        }
        self.env.remove(x);
    }

    fn get(&mut self, x: &V) -> Interval {
        self.value(x)
    }

    fn set(&mut self, x: &V, itv: Interval) {
        if self.bottom {
            return;
        }
        self.put(x, itv);
    }

    fn to_lincst_system(&mut self) -> LinCstSystem<V> {
        let mut sys = LinCstSystem::new();
        if self.bottom {
            sys.push(LinCst::contradiction());
            return sys;
        }
        for (v, itv) in &self.env {
            if let Some(c) = itv.singleton() {
                sys.push(LinCst::eq(LinExpr::var(v.clone()), c.clone()));
                continue;
            }
            if let Bound::Finite(lo) = &itv.lo {
                sys.push(LinCst::geq(LinExpr::var(v.clone()), lo.clone()));
            }
            if let Bound::Finite(hi) = &itv.hi {
                sys.push(LinCst::leq(LinExpr::var(v.clone()), hi.clone()));
            }
        }
        sys
    }

    fn domain_name(&self) -> String {
        "intervals".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn itv(lo: i64, hi: i64) -> Interval {
        Interval::range(lo, hi)
    }

    #[test]
    fn test_interval_lattice() {
        let a = itv(0, 10);
        let b = itv(5, 15);
        assert_eq!(a.join(&b), itv(0, 15));
        assert_eq!(a.meet(&b), itv(5, 10));
        assert_eq!(a.widen(&b), Interval::new(Bound::Finite(zero()), Bound::PosInf));
        assert!(a.meet(&itv(20, 30)).is_bottom());
        assert!(itv(3, 4).leq(&a));
        assert!(!a.leq(&b));
        assert!(Interval::bottom().leq(&a));
        assert!(a.leq(&Interval::top()));
    }

    #[test]
    fn test_interval_arith() {
        assert_eq!(itv(1, 2).add(&itv(10, 20)), itv(11, 22));
        assert_eq!(itv(1, 2).sub(&itv(10, 20)), itv(-19, -8));
        assert_eq!(itv(-2, 3).mul(&itv(4, 5)), itv(-10, 15));
        assert_eq!(itv(-10, 10).sdiv(&itv(2, 3)), itv(-5, 5));
        // Divisor spanning zero: join of both sign parts.
        assert_eq!(itv(2, 10).sdiv(&itv(-2, 2)), itv(-10, 10));
        // Divisor exactly zero: infeasible.
        assert!(itv(1, 5).sdiv(&Interval::constant(0)).is_bottom());
    }

    #[test]
    fn test_interval_bitwise() {
        let a = itv(0, 12);
        let b = itv(0, 5);
        assert_eq!(a.and(&b), itv(0, 5));
        assert_eq!(a.or(&b), itv(0, 15));
        assert_eq!(a.xor(&b), itv(0, 15));
        assert_eq!(itv(1, 3).shl(&itv(1, 2)), itv(2, 12));
        assert_eq!(itv(8, 9).lshr(&itv(1, 2)), itv(2, 4));
        assert_eq!(itv(-8, 8).ashr(&itv(1, 1)), itv(-4, 4));
        // Negative operand: conservative top.
        assert!(itv(-5, 5).and(&itv(-5, 5)).is_top());
    }

    #[test]
    fn test_div_outward() {
        // y * [2,3] = [6,6]  =>  y in [2,3]
        assert_eq!(itv(6, 6).div_outward(&itv(2, 3)), Some(itv(2, 3)));
        assert_eq!(itv(6, 6).div_outward(&itv(-1, 1)), None);
    }

    #[test]
    fn test_domain_assume() {
        let mut dom: IntervalDomain<&str> = IntervalDomain::top();
        dom.assign(&"x", &LinExpr::var("x")); // x := top, no-op
        dom.set(&"x", itv(0, 100));
        dom.add_cst(&LinCst::leq(LinExpr::var("x"), 10));
        assert_eq!(dom.get(&"x"), itv(0, 10));
        dom.add_cst(&LinCst::geq(LinExpr::var("x"), 10));
        assert_eq!(dom.get(&"x"), itv(10, 10));
        dom.add_cst(&LinCst::neq(LinExpr::var("x"), 10));
        assert!(dom.is_bottom());
    }

    #[test]
    fn test_domain_relational_cst() {
        // x in [0,5], y in [3,8], assume x - y >= 0 => x in [3,5], y in [3,5]
        let mut dom: IntervalDomain<&str> = IntervalDomain::top();
        dom.set(&"x", itv(0, 5));
        dom.set(&"y", itv(3, 8));
        dom.add_cst(&LinCst::geq(LinExpr::var("x"), LinExpr::var("y")));
        assert_eq!(dom.get(&"x"), itv(3, 5));
        assert_eq!(dom.get(&"y"), itv(3, 5));
    }

    #[test]
    fn test_domain_lattice() {
        let mut a: IntervalDomain<&str> = IntervalDomain::top();
        a.set(&"x", itv(0, 5));
        let mut b = IntervalDomain::top();
        b.set(&"x", itv(3, 9));
        b.set(&"y", itv(1, 1));

        let j = a.join(&b);
        assert!(a.clone().leq(&j));
        assert!(b.clone().leq(&j));
        let m = a.meet(&b);
        assert!(m.clone().leq(&a));
        assert!(m.clone().leq(&b));
        let w = a.widen(&b);
        assert!(a.clone().leq(&w));
        assert_eq!(w.clone().get(&"x"), Interval::new(Bound::Finite(zero()), Bound::PosInf));
    }
}
