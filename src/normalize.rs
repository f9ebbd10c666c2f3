//! The normalization fixpoint: after some terms' values were tightened
//! (the changed-set), push information down to children through inverse
//! operators, then up to parents through forward re-evaluation, level by
//! level of the term DAG.
//!
//! Two implementations share the same schedule:
//! - the generic one treats the underlying domain as an opaque relational
//!   lattice (whole-state clones, `⊑`, `meet`);
//! - the independent-attribute one (selected at compile time through
//!   [`NumDomain::INDEPENDENT`]) reads and writes single-variable
//!   intervals, which is equivalent for non-relational domains and far
//!   cheaper.
//!
//! Termination: each direction walks a fixed number of depth levels, and
//! a term re-enters a queue only when its value strictly tightens, which
//! cannot happen forever in a domain without infinite descending chains.

use std::collections::BTreeSet;

use log::trace;

use crate::numeric::NumDomain;
use crate::term::{Term, TermId};
use crate::term_domain::TermDom;
use crate::var::DomVar;

fn queue_push(queue: &mut Vec<Vec<TermId>>, depth: usize, t: TermId) {
    while queue.len() <= depth {
        queue.push(Vec::new());
    }
    queue[depth].push(t);
}

pub(crate) fn normalize<D: NumDomain<DomVar>>(abs: &mut TermDom<D>) {
    if abs.bottom {
        abs.changed.clear();
        return;
    }
    if !abs.changed.is_empty() {
        if D::INDEPENDENT {
            normalize_independent(abs);
        } else {
            normalize_generic(abs);
        }
    }
    if abs.dom.is_bottom() {
        abs.set_to_bottom();
    }
    abs.changed.clear();
}

fn seed_queue<D: NumDomain<DomVar>>(abs: &TermDom<D>) -> Vec<Vec<TermId>> {
    let mut queue = Vec::new();
    for &t in &abs.changed {
        queue_push(&mut queue, abs.ttbl.depth(t), t);
    }
    queue
}

fn collect_parents<D: NumDomain<DomVar>>(
    abs: &TermDom<D>,
    up_terms: &mut BTreeSet<TermId>,
) -> Vec<Vec<TermId>> {
    let mut up_queue = Vec::new();
    for &t in &abs.changed {
        for &p in abs.ttbl.parents(t) {
            if up_terms.insert(p) {
                queue_push(&mut up_queue, abs.ttbl.depth(p), p);
            }
        }
    }
    up_queue
}

fn normalize_generic<D: NumDomain<DomVar>>(abs: &mut TermDom<D>) {
    let mut queue = seed_queue(abs);
    let mut d_prime = abs.dom.clone();

    // Downward: tighten children via inverse operators, deepest first.
    // Level 0 holds only leaves, which define nothing.
    for d in (1..queue.len()).rev() {
        let level = std::mem::take(&mut queue[d]);
        for t in level {
            abs.eval_ftor_down(&mut d_prime, t);
            if !abs.dom.leq(&d_prime) {
                trace!("normalize: down-tightened at {}", t);
                abs.dom = d_prime.clone();
                if abs.dom.is_bottom() {
                    abs.set_to_bottom();
                    abs.changed.clear();
                    return;
                }
                if let Term::App(_, l, r) = *abs.ttbl.get(t) {
                    for c in [l, r] {
                        if abs.changed.insert(c) {
                            queue_push(&mut queue, abs.ttbl.depth(c), c);
                        }
                    }
                }
            }
        }
    }

    // Upward: re-evaluate parents of everything touched, shallowest
    // first. This can miss inferences between siblings (with x = y - z,
    // information about y does not reach z here); the next downward pass
    // picks those up.
    let mut up_terms = BTreeSet::new();
    let mut up_queue = collect_parents(abs, &mut up_terms);
    debug_assert!(up_queue.first().map_or(true, |level| level.is_empty()));
    let mut d = 1;
    while d < up_queue.len() {
        let level = std::mem::take(&mut up_queue[d]);
        for t in level {
            abs.eval_ftor(&mut d_prime, t);
            if !abs.dom.leq(&d_prime) {
                // Forward evaluation overwrites the term's value, so meet
                // with the current state instead of adopting d_prime.
                abs.dom = abs.dom.meet(&d_prime);
                if abs.dom.is_bottom() {
                    abs.set_to_bottom();
                    abs.changed.clear();
                    return;
                }
                let parents: Vec<TermId> = abs.ttbl.parents(t).iter().copied().collect();
                for p in parents {
                    if up_terms.insert(p) {
                        queue_push(&mut up_queue, abs.ttbl.depth(p), p);
                    }
                }
            }
        }
        d += 1;
    }
}

fn normalize_independent<D: NumDomain<DomVar>>(abs: &mut TermDom<D>) {
    if abs.dom.is_bottom() {
        abs.set_to_bottom();
        return;
    }

    let mut queue = seed_queue(abs);

    // Downward pass, per-component: snapshot the children, apply the
    // inverse, and meet each child's old and new value directly.
    for d in (1..queue.len()).rev() {
        let level = std::mem::take(&mut queue[d]);
        for t in level {
            let (l, r) = match *abs.ttbl.get(t) {
                Term::App(_, l, r) => (l, r),
                _ => continue,
            };
            let args = [l, r];
            let mut before = Vec::with_capacity(2);
            for &c in &args {
                let v = abs.domvar_of_term(c);
                before.push(abs.dom.get(&v));
            }
            abs.eval_ftor_down_self(t);
            for (i, &c) in args.iter().enumerate() {
                let v = abs.domvar_of_term(c);
                let upd = abs.dom.get(&v);
                if !before[i].leq(&upd) {
                    abs.dom.set(&v, before[i].meet(&upd));
                    if abs.changed.insert(c) {
                        queue_push(&mut queue, abs.ttbl.depth(c), c);
                    }
                }
            }
            if abs.dom.is_bottom() {
                abs.set_to_bottom();
                abs.changed.clear();
                return;
            }
        }
    }

    // Upward pass, per-component. The forward evaluation overwrites the
    // term's value, so the meet with its previous value is always written
    // back; parents are revisited only on a strict tightening.
    let mut up_terms = BTreeSet::new();
    let mut up_queue = collect_parents(abs, &mut up_terms);
    debug_assert!(up_queue.first().map_or(true, |level| level.is_empty()));
    let mut d = 1;
    while d < up_queue.len() {
        let level = std::mem::take(&mut up_queue[d]);
        for t in level {
            let v = abs.domvar_of_term(t);
            let old = abs.dom.get(&v);
            abs.eval_ftor_self(t);
            let upd = abs.dom.get(&v);
            let met = old.meet(&upd);
            abs.dom.set(&v, met.clone());
            if abs.dom.is_bottom() {
                abs.set_to_bottom();
                abs.changed.clear();
                return;
            }
            if !old.leq(&met) {
                let parents: Vec<TermId> = abs.ttbl.parents(t).iter().copied().collect();
                for p in parents {
                    if up_terms.insert(p) {
                        queue_push(&mut up_queue, abs.ttbl.depth(p), p);
                    }
                }
            }
        }
        d += 1;
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use num_bigint::BigInt;

    use crate::intervals::{Interval, IntervalDomain};
    use crate::linear::{LinCst, LinCstSystem, LinExpr};
    use crate::numeric::NumDomain;
    use crate::op::BinOp;
    use crate::term_domain::TermDom;
    use crate::var::{DomVar, Var, VarFactory};

    /// Interval domain with the independent-attribute fast path turned
    /// off, forcing the generic normalizer through whole-state clones.
    #[derive(Debug, Clone)]
    struct OpaqueIntervals(IntervalDomain<DomVar>);

    impl NumDomain<DomVar> for OpaqueIntervals {
        // INDEPENDENT stays at its default (false).

        fn top() -> Self {
            OpaqueIntervals(IntervalDomain::top())
        }
        fn bottom() -> Self {
            OpaqueIntervals(IntervalDomain::bottom())
        }
        fn is_bottom(&self) -> bool {
            self.0.is_bottom()
        }
        fn is_top(&self) -> bool {
            self.0.is_top()
        }
        fn leq(&mut self, other: &Self) -> bool {
            self.0.leq(&other.0)
        }
        fn join(&self, other: &Self) -> Self {
            OpaqueIntervals(self.0.join(&other.0))
        }
        fn widen(&self, other: &Self) -> Self {
            OpaqueIntervals(self.0.widen(&other.0))
        }
        fn meet(&self, other: &Self) -> Self {
            OpaqueIntervals(self.0.meet(&other.0))
        }
        fn assign(&mut self, x: &DomVar, e: &LinExpr<DomVar>) {
            self.0.assign(x, e);
        }
        fn apply(&mut self, op: BinOp, x: &DomVar, y: &DomVar, z: &DomVar) {
            self.0.apply(op, x, y, z);
        }
        fn apply_const(&mut self, op: BinOp, x: &DomVar, y: &DomVar, k: &BigInt) {
            self.0.apply_const(op, x, y, k);
        }
        fn add_cst(&mut self, cst: &LinCst<DomVar>) {
            self.0.add_cst(cst);
        }
        fn forget(&mut self, x: &DomVar) {
            self.0.forget(x);
        }
        fn get(&mut self, x: &DomVar) -> Interval {
            self.0.get(x)
        }
        fn set(&mut self, x: &DomVar, itv: Interval) {
            self.0.set(x, itv);
        }
        fn to_lincst_system(&mut self) -> LinCstSystem<DomVar> {
            self.0.to_lincst_system()
        }
        fn domain_name(&self) -> String {
            "opaque-intervals".to_string()
        }
    }

    fn scenario<D: NumDomain<DomVar>>(vfac: &mut VarFactory) -> (TermDom<D>, Var, Var, Var) {
        let x = vfac.var("x");
        let y = vfac.var("y");
        let z = vfac.var("z");
        let mut s: TermDom<D> = TermDom::top();
        s.assign(&x, &(LinExpr::var(y.clone()) + LinExpr::var(z.clone())));
        s.add_cst(&LinCst::leq(LinExpr::var(x.clone()), 10));
        s.add_cst(&LinCst::geq(LinExpr::var(y.clone()), 5));
        s.add_cst(&LinCst::geq(LinExpr::var(z.clone()), 5));
        (s, x, y, z)
    }

    #[test]
    fn test_generic_normalizer_matches_specialized() {
        let mut vfac = VarFactory::new();
        let (mut fast, x, y, z) = scenario::<IntervalDomain<DomVar>>(&mut vfac);
        let mut vfac = VarFactory::new();
        let (mut slow, _, _, _) = scenario::<OpaqueIntervals>(&mut vfac);

        for v in [&x, &y, &z] {
            assert_eq!(fast.get(v), slow.get(v), "disagreement on {}", v);
        }
        assert_eq!(fast.get(&x), Interval::range(10, 10));
    }

    #[test]
    fn test_generic_normalizer_downward() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");
        let mut s: TermDom<OpaqueIntervals> = TermDom::top();
        s.apply_const(BinOp::Add, &x, &y, &BigInt::from(1));
        s.add_cst(&LinCst::eq(LinExpr::var(x.clone()), 3));
        assert_eq!(s.get(&y), Interval::range(2, 2));
    }

    #[test]
    fn test_generic_normalizer_bottom() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");
        let mut s: TermDom<OpaqueIntervals> = TermDom::top();
        s.apply_const(BinOp::Add, &x, &y, &BigInt::from(1));
        s.add_cst(&LinCst::geq(LinExpr::var(y.clone()), 5));
        s.add_cst(&LinCst::leq(LinExpr::var(x.clone()), 0));
        assert!(s.is_bottom());
    }
}
