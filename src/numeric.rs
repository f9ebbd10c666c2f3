use std::fmt::{Debug, Display};
use std::hash::Hash;

use num_bigint::BigInt;

use crate::intervals::Interval;
use crate::linear::{LinCst, LinCstSystem, LinExpr};
use crate::op::BinOp;

/// What a type must provide to serve as a variable of some domain.
pub trait VarLike: Clone + Eq + Ord + Hash + Display + Debug {}

impl<T: Clone + Eq + Ord + Hash + Display + Debug> VarLike for T {}

/// Capability interface of a numeric abstract domain over variables `V`.
///
/// This is the contract consumed by the analyzer and by
/// [`TermDom`][crate::term_domain::TermDom], which lifts any implementor
/// into a relational domain over term equivalences (and is itself an
/// implementor, over program variables).
///
/// `leq`, `get` and `to_lincst_system` take `&mut self`: a domain is
/// allowed to normalize itself when queried. The result only ever becomes
/// *more* precise; callers must tolerate that internal refinement.
pub trait NumDomain<V: VarLike>: Clone + Debug {
    /// True if the domain carries no relations between variables, i.e.
    /// the value of each variable can be read and written independently
    /// through `get`/`set`. Enables the per-component normalizer.
    const INDEPENDENT: bool = false;

    fn top() -> Self;
    fn bottom() -> Self;
    fn is_bottom(&self) -> bool;
    fn is_top(&self) -> bool;

    /// Partial order `self ⊑ other`.
    fn leq(&mut self, other: &Self) -> bool;
    /// Least upper bound.
    fn join(&self, other: &Self) -> Self;
    /// Widening; guarantees convergence of ascending iteration.
    fn widen(&self, other: &Self) -> Self;
    /// Greatest lower bound (or a sound over-approximation of it).
    fn meet(&self, other: &Self) -> Self;
    /// Narrowing: refine after widening without endangering convergence.
    fn narrow(&self, other: &Self) -> Self {
        self.meet(other)
    }

    /// `x := e`
    fn assign(&mut self, x: &V, e: &LinExpr<V>);
    /// `x := y op z`
    fn apply(&mut self, op: BinOp, x: &V, y: &V, z: &V);
    /// `x := y op k`
    fn apply_const(&mut self, op: BinOp, x: &V, y: &V, k: &BigInt);

    /// Assert a constraint (assume).
    fn add_cst(&mut self, cst: &LinCst<V>);
    /// Assert a conjunction of constraints.
    fn add_csts(&mut self, csts: &LinCstSystem<V>) {
        for c in csts {
            self.add_cst(c);
        }
    }

    /// Remove `x` from the domain (its value becomes unconstrained).
    fn forget(&mut self, x: &V);

    /// Project the value of `x` as an interval.
    fn get(&mut self, x: &V) -> Interval;
    /// Constrain `x` to exactly `itv`, dropping previous information on it.
    fn set(&mut self, x: &V, itv: Interval);

    /// Make `y` a copy of `x`.
    fn expand(&mut self, x: &V, y: &V) {
        let e = LinExpr::var(x.clone());
        self.assign(y, &e);
    }

    /// Extract the domain's information as linear constraints over `V`.
    fn to_lincst_system(&mut self) -> LinCstSystem<V>;

    fn domain_name(&self) -> String;
}
