//! Inverse operator propagation: given `x = y op z` and a tightened `x`,
//! recover information about `y` and `z`.
//!
//! Only the arithmetic family is inverted. `+` and `-` are exact and
//! asserted as relational constraints; `*` and `/` fall back to outward
//! interval enclosures asserted as bound constraints, so relational
//! underlying domains keep their existing relations.

use num_bigint::BigInt;

use crate::intervals::{Bound, Interval};
use crate::linear::{CstKind, LinCst, LinExpr};
use crate::numeric::{NumDomain, VarLike};
use crate::op::BinOp;

pub(crate) fn apply<V: VarLike, D: NumDomain<V>>(dom: &mut D, op: BinOp, x: &V, y: &V, z: &V) {
    if dom.is_bottom() {
        return;
    }
    match op {
        BinOp::Add => {
            // x - y - z == 0
            let e = LinExpr::var(x.clone()) - LinExpr::var(y.clone()) - LinExpr::var(z.clone());
            dom.add_cst(&LinCst::new(e, CstKind::Eq));
        }
        BinOp::Sub => {
            // x - y + z == 0
            let e = LinExpr::var(x.clone()) - LinExpr::var(y.clone()) + LinExpr::var(z.clone());
            dom.add_cst(&LinCst::new(e, CstKind::Eq));
        }
        BinOp::Mul => {
            let xi = dom.get(x);
            let yi = dom.get(y);
            let zi = dom.get(z);
            if let Some(yb) = xi.div_outward(&zi) {
                constrain(dom, y, &yb);
            }
            if let Some(zb) = xi.div_outward(&yi) {
                constrain(dom, z, &zb);
            }
        }
        BinOp::SDiv => {
            let xi = dom.get(x);
            let zi = dom.get(z);
            // Truncating division: y = x*z + r with |r| < |z|, so y lies
            // in x*z padded by max|z| - 1. Needs a finite, nonzero z.
            if !zi.contains_zero() {
                if let (Bound::Finite(lo), Bound::Finite(hi)) = (&zi.lo, &zi.hi) {
                    let m: BigInt = BigInt::from(lo.magnitude().max(hi.magnitude()).clone()) - 1;
                    let slack = Interval::new(
                        Bound::Finite(-m.clone()),
                        Bound::Finite(m),
                    );
                    let yb = xi.mul(&zi).add(&slack);
                    constrain(dom, y, &yb);
                }
            }
        }
        _ => {}
    }
}

fn constrain<V: VarLike, D: NumDomain<V>>(dom: &mut D, v: &V, itv: &Interval) {
    if itv.is_bottom() || itv.is_top() {
        return;
    }
    if let Bound::Finite(lo) = &itv.lo {
        dom.add_cst(&LinCst::geq(LinExpr::var(v.clone()), lo.clone()));
    }
    if let Bound::Finite(hi) = &itv.hi {
        dom.add_cst(&LinCst::leq(LinExpr::var(v.clone()), hi.clone()));
    }
}
