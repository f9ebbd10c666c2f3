use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use log::{debug, warn};
use num_bigint::BigInt;

use crate::intervals::{Interval, IntervalDomain};
use crate::linear::{CstKind, LinCst, LinCstSystem, LinExpr};
use crate::normalize;
use crate::numeric::NumDomain;
use crate::op::BinOp;
use crate::term::{Term, TermId, TermTable};
use crate::var::{DomVar, DomVarAlloc, Var};

/// The term domain stacked over the plain interval domain — the usual
/// instantiation.
pub type TermIntervalDomain = TermDom<IntervalDomain<DomVar>>;

/// Anti-unification domain: lifts a numeric value domain `D` into a
/// relational one by tracking, per program variable, a node in a shared
/// hash-consed term DAG.
///
/// Two variables bound to the same node are provably equal; hash-consing
/// of expression trees is what discovers such equalities. Each term node
/// lazily acquires one variable of the underlying domain, which carries
/// its numeric value; the [normalizer][crate::normalize] keeps those
/// values consistent across the DAG after assumptions tighten them.
#[derive(Debug, Clone)]
pub struct TermDom<D: NumDomain<DomVar>> {
    pub(crate) bottom: bool,
    pub(crate) ttbl: TermTable,
    pub(crate) dom: D,
    pub(crate) alloc: DomVarAlloc,
    pub(crate) var_map: BTreeMap<Var, TermId>,
    pub(crate) term_map: BTreeMap<TermId, DomVar>,
    /// Frontier of terms whose value was tightened since the last
    /// normalization pass.
    pub(crate) changed: BTreeSet<TermId>,
}

impl<D: NumDomain<DomVar>> TermDom<D> {
    fn from_parts(
        alloc: DomVarAlloc,
        var_map: BTreeMap<Var, TermId>,
        ttbl: TermTable,
        term_map: BTreeMap<TermId, DomVar>,
        dom: D,
    ) -> Self {
        Self {
            bottom: dom.is_bottom(),
            ttbl,
            dom,
            alloc,
            var_map,
            term_map,
            changed: BTreeSet::new(),
        }
    }

    /// Propagate pending tightenings through the term DAG.
    pub fn normalize(&mut self) {
        normalize::normalize(self);
    }

    pub fn is_normalized(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Var> {
        self.var_map.keys()
    }

    /// Number of live term nodes (diagnostics/tests).
    pub fn num_terms(&self) -> usize {
        self.ttbl.num_terms()
    }

    pub(crate) fn set_to_bottom(&mut self) {
        self.bottom = true;
    }

    /// The term bound to `v`, allocating a fresh unconstrained variable
    /// node on first use.
    pub(crate) fn term_of_var(&mut self, v: &Var) -> TermId {
        if let Some(&t) = self.var_map.get(v) {
            assert!(t.index() < self.ttbl.size());
            t
        } else {
            let t = self.ttbl.fresh_var();
            self.ttbl.add_ref(t);
            self.var_map.insert(v.clone(), t);
            t
        }
    }

    /// The underlying-domain variable backing term `t`, allocated lazily.
    pub(crate) fn domvar_of_term(&mut self, t: TermId) -> DomVar {
        if let Some(&dv) = self.term_map.get(&t) {
            dv
        } else {
            let dv = self.alloc.next();
            self.term_map.insert(t, dv);
            dv
        }
    }

    fn domvar_of_var(&mut self, v: &Var) -> DomVar {
        let t = self.term_of_var(v);
        self.domvar_of_term(t)
    }

    /// Release one reference to `t`, dropping the underlying-domain
    /// variables of everything that dies with it.
    fn deref_term(&mut self, t: TermId) {
        for dead in self.ttbl.deref(t) {
            if let Some(dv) = self.term_map.remove(&dead) {
                self.dom.forget(&dv);
            }
            self.changed.remove(&dead);
        }
    }

    fn rebind_var(&mut self, x: &Var, t: TermId) {
        // Reference the new term first: rebinding x := f(x) must not
        // momentarily free the shared structure.
        self.ttbl.add_ref(t);
        if let Some(old) = self.var_map.remove(x) {
            self.deref_term(old);
        }
        self.var_map.insert(x.clone(), t);
    }

    fn build_const(&mut self, n: &BigInt) -> TermId {
        if let Some(t) = self.ttbl.find_const(n) {
            t
        } else {
            let t = self.ttbl.make_const(n);
            let dv = self.domvar_of_term(t);
            self.dom.assign(&dv, &LinExpr::constant(n.clone()));
            t
        }
    }

    fn build_linterm(&mut self, a: &BigInt, v: &Var) -> TermId {
        if *a == BigInt::from(1) {
            self.term_of_var(v)
        } else {
            let tc = self.build_const(a);
            let tv = self.term_of_var(v);
            self.build_term(BinOp::Mul, tc, tv)
        }
    }

    /// Build (or reuse) the term tree of a linear expression, bottom-up
    /// through hash-consed `+`/`*` applications. Reuse across statements
    /// is what makes syntactically equal expressions provably equal.
    fn build_linexpr(&mut self, e: &LinExpr<Var>) -> TermId {
        let terms: Vec<(Var, BigInt)> = e.terms().map(|(v, a)| (v.clone(), a.clone())).collect();
        if terms.is_empty() {
            return self.build_const(e.cst());
        }
        let mut it = terms.iter();
        let mut t = if *e.cst() == BigInt::from(0) {
            let (v, a) = it.next().unwrap();
            self.build_linterm(a, v)
        } else {
            self.build_const(e.cst())
        };
        for (v, a) in it {
            let tt = self.build_linterm(a, v);
            t = self.build_term(BinOp::Add, t, tt);
        }
        t
    }

    /// Hash-consed application. The operator is evaluated in the
    /// underlying domain only when the node is first created; on reuse
    /// the existing value already subsumes it.
    fn build_term(&mut self, op: BinOp, ty: TermId, tz: TermId) -> TermId {
        if let Some(t) = self.ttbl.find_ftor(op, ty, tz) {
            t
        } else {
            let tx = self.ttbl.apply_ftor(op, ty, tz);
            let vx = self.domvar_of_term(tx);
            let vy = self.domvar_of_term(ty);
            let vz = self.domvar_of_term(tz);
            self.dom.apply(op, &vx, &vy, &vz);
            tx
        }
    }

    fn term_of_itv(&mut self, itv: &Interval) -> TermId {
        if let Some(n) = itv.singleton() {
            let n = n.clone();
            return self.build_const(&n);
        }
        let t = self.ttbl.fresh_var();
        let dv = self.domvar_of_term(t);
        self.dom.set(&dv, itv.clone());
        t
    }

    /// Re-evaluate the defining operator of `t` forward into `dom`.
    pub(crate) fn eval_ftor(&mut self, dom: &mut D, t: TermId) {
        if let Term::App(op, l, r) = *self.ttbl.get(t) {
            let vt = self.domvar_of_term(t);
            let vl = self.domvar_of_term(l);
            let vr = self.domvar_of_term(r);
            dom.apply(op, &vt, &vl, &vr);
        }
    }

    /// Apply the inverse of the defining operator of `t` into `dom`,
    /// tightening the children. Arithmetic operators only.
    pub(crate) fn eval_ftor_down(&mut self, dom: &mut D, t: TermId) {
        if let Term::App(op, l, r) = *self.ttbl.get(t) {
            if op.is_arith() {
                let vt = self.domvar_of_term(t);
                let vl = self.domvar_of_term(l);
                let vr = self.domvar_of_term(r);
                crate::inverse::apply(dom, op, &vt, &vl, &vr);
            }
        }
    }

    pub(crate) fn eval_ftor_self(&mut self, t: TermId) {
        let mut dom = std::mem::replace(&mut self.dom, D::top());
        self.eval_ftor(&mut dom, t);
        self.dom = dom;
    }

    pub(crate) fn eval_ftor_down_self(&mut self, t: TermId) {
        let mut dom = std::mem::replace(&mut self.dom, D::top());
        self.eval_ftor_down(&mut dom, t);
        self.dom = dom;
    }

    fn rename_cst(&mut self, cst: &LinCst<Var>) -> LinCst<DomVar> {
        cst.map_vars(|v| self.domvar_of_var(v))
    }

    /// Dump `{var -> term[domvar]}` plus the underlying domain, after
    /// normalizing so every discovered relationship is visible.
    pub fn write<W: fmt::Write>(&mut self, w: &mut W) -> fmt::Result
    where
        D: Display,
    {
        self.normalize();
        write!(w, "{}", self)
    }
}

impl<D: NumDomain<DomVar> + Display> Display for TermDom<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom {
            return write!(f, "_|_");
        }
        if self.var_map.is_empty() {
            return write!(f, "{{}}");
        }
        write!(f, "{{")?;
        for (i, (v, t)) in self.var_map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.term_map.get(t) {
                Some(dv) => write!(f, "{} -> {}[{}]", v, t, dv)?,
                None => write!(f, "{} -> {}", v, t)?,
            }
        }
        write!(f, "}} {}", self.dom)
    }
}

impl<D: NumDomain<DomVar>> NumDomain<Var> for TermDom<D> {
    fn top() -> Self {
        Self::from_parts(
            DomVarAlloc::new(),
            BTreeMap::new(),
            TermTable::new(),
            BTreeMap::new(),
            D::top(),
        )
    }

    fn bottom() -> Self {
        let mut res = Self::from_parts(
            DomVarAlloc::new(),
            BTreeMap::new(),
            TermTable::new(),
            BTreeMap::new(),
            D::bottom(),
        );
        res.bottom = true;
        res
    }

    fn is_bottom(&self) -> bool {
        self.bottom
    }

    fn is_top(&self) -> bool {
        self.var_map.is_empty() && !self.bottom
    }

    /// `self ⊑ other`, by corresponding `other`'s terms onto `self`'s
    /// (per program variable) and delegating to the underlying domain
    /// over a shared set of temporary variables.
    ///
    /// Assumes both operands constrain a common variable set; a variable
    /// bound only in `other` is treated as unconstrained there.
    fn leq(&mut self, other: &Self) -> bool {
        // Only the left operand requires normalization.
        self.normalize();
        if self.is_bottom() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }

        let mut o = other.clone();
        let mut gen: BTreeMap<TermId, TermId> = BTreeMap::new();
        let vars: Vec<Var> = self.var_map.keys().cloned().collect();
        for v in &vars {
            let ta = self.term_of_var(v);
            let tb = o.term_of_var(v);
            if !self.ttbl.map_leq(&o.ttbl, ta, tb, &mut gen) {
                return false;
            }
        }

        // Rename each corresponded pair to a shared temporary on both
        // sides, drop the originals, and compare underneath.
        let mut palloc = DomVarAlloc::merge(&self.alloc, &o.alloc);
        let mut x_impl = self.dom.clone();
        let mut y_impl = o.dom.clone();
        let mut xvars = Vec::with_capacity(gen.len());
        let mut yvars = Vec::with_capacity(gen.len());
        let pairs: Vec<(TermId, TermId)> = gen.iter().map(|(&tb, &ta)| (tb, ta)).collect();
        for (tb, ta) in pairs {
            let vt = palloc.next();
            let vx = self.domvar_of_term(ta);
            let vy = o.domvar_of_term(tb);
            xvars.push(vx);
            yvars.push(vy);
            x_impl.assign(&vt, &LinExpr::var(vx));
            y_impl.assign(&vt, &LinExpr::var(vy));
        }
        for vx in &xvars {
            x_impl.forget(vx);
        }
        for vy in &yvars {
            y_impl.forget(vy);
        }
        x_impl.leq(&y_impl)
    }

    /// Join by anti-unification: generalize the two bindings of every
    /// program variable into one fresh term table; every corresponded
    /// pair of source terms shares one fresh underlying variable, and the
    /// projected underlying states are joined.
    fn join(&self, other: &Self) -> Self {
        let mut a = self.clone();
        a.normalize();
        let mut b = other.clone();
        b.normalize();

        if a.is_bottom() || b.is_top() {
            return b;
        }
        if b.is_bottom() || a.is_top() {
            return a;
        }

        debug!("term: join");
        let mut out_tbl = TermTable::new();
        let mut gmap: BTreeMap<(TermId, TermId), TermId> = BTreeMap::new();
        let mut out_vmap: BTreeMap<Var, TermId> = BTreeMap::new();
        let mut palloc = DomVarAlloc::merge(&a.alloc, &b.alloc);

        let vars: Vec<Var> = a.var_map.keys().cloned().collect();
        for v in &vars {
            let tx = a.term_of_var(v);
            let ty = b.term_of_var(v);
            let tz = a.ttbl.generalize(&b.ttbl, tx, ty, &mut out_tbl, &mut gmap);
            assert!(tz.index() < out_tbl.size());
            out_vmap.insert(v.clone(), tz);
        }

        let mut x_impl = a.dom.clone();
        let mut y_impl = b.dom.clone();
        let mut out_map: BTreeMap<TermId, DomVar> = BTreeMap::new();
        let mut xvars = Vec::with_capacity(gmap.len());
        let mut yvars = Vec::with_capacity(gmap.len());
        let pairs: Vec<((TermId, TermId), TermId)> =
            gmap.iter().map(|(&p, &tz)| (p, tz)).collect();
        for ((tx, ty), tz) in pairs {
            let vt = palloc.next();
            out_map.entry(tz).or_insert(vt);
            let vx = a.domvar_of_term(tx);
            let vy = b.domvar_of_term(ty);
            xvars.push(vx);
            yvars.push(vy);
            x_impl.assign(&vt, &LinExpr::var(vx));
            y_impl.assign(&vt, &LinExpr::var(vy));
        }
        for vx in &xvars {
            x_impl.forget(vx);
        }
        for vy in &yvars {
            y_impl.forget(vy);
        }

        let joined = x_impl.join(&y_impl);
        for &tz in out_vmap.values() {
            out_tbl.add_ref(tz);
        }
        Self::from_parts(palloc, out_vmap, out_tbl, out_map, joined)
    }

    /// Same generalization as `join`, but the underlying states are
    /// widened. Asymmetric on purpose: normalizing the left operand
    /// could regain precision between iterations and break termination,
    /// so only the right operand is normalized.
    fn widen(&self, other: &Self) -> Self {
        let mut a = self.clone();
        let mut b = other.clone();
        b.normalize();

        if a.is_bottom() {
            return b;
        }
        if b.is_bottom() {
            return a;
        }

        debug!("term: widen");
        let mut out_tbl = TermTable::new();
        let mut gmap: BTreeMap<(TermId, TermId), TermId> = BTreeMap::new();
        let mut out_vmap: BTreeMap<Var, TermId> = BTreeMap::new();
        let mut palloc = DomVarAlloc::merge(&a.alloc, &b.alloc);

        let vars: Vec<Var> = a.var_map.keys().cloned().collect();
        for v in &vars {
            let tx = a.term_of_var(v);
            let ty = b.term_of_var(v);
            let tz = a.ttbl.generalize(&b.ttbl, tx, ty, &mut out_tbl, &mut gmap);
            out_vmap.insert(v.clone(), tz);
        }

        let mut x_impl = a.dom.clone();
        let mut y_impl = b.dom.clone();
        let mut out_map: BTreeMap<TermId, DomVar> = BTreeMap::new();
        let mut xvars = Vec::with_capacity(gmap.len());
        let mut yvars = Vec::with_capacity(gmap.len());
        let pairs: Vec<((TermId, TermId), TermId)> =
            gmap.iter().map(|(&p, &tz)| (p, tz)).collect();
        for ((tx, ty), tz) in pairs {
            let vt = palloc.next();
            out_map.entry(tz).or_insert(vt);
            let vx = a.domvar_of_term(tx);
            let vy = b.domvar_of_term(ty);
            xvars.push(vx);
            yvars.push(vy);
            x_impl.assign(&vt, &LinExpr::var(vx));
            y_impl.assign(&vt, &LinExpr::var(vy));
        }
        for vx in &xvars {
            x_impl.forget(vx);
        }
        for vy in &yvars {
            y_impl.forget(vy);
        }

        let widened = x_impl.widen(&y_impl);
        for &tz in out_vmap.values() {
            out_tbl.add_ref(tz);
        }
        Self::from_parts(palloc, out_vmap, out_tbl, out_map, widened)
    }

    /// Meet is not implemented for this domain. When used to *refine* a
    /// state (the only use the analyzer makes of it), returning the right
    /// operand is a sound fallback; it is a documented precision gap, not
    /// an error.
    fn meet(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        if self.is_top() {
            return other.clone();
        }
        if other.is_top() {
            return self.clone();
        }
        warn!("term: meet not implemented, returning the right operand");
        other.clone()
    }

    /// Narrowing is not implemented either; the left operand is returned
    /// unrefined.
    fn narrow(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        if self.is_top() {
            return other.clone();
        }
        warn!("term: narrowing not implemented, returning the left operand");
        self.clone()
    }

    fn assign(&mut self, x: &Var, e: &LinExpr<Var>) {
        if self.bottom {
            return;
        }
        let tx = self.build_linexpr(e);
        self.rebind_var(x, tx);
        debug!("term: {} := {} |-> {}", x, e, tx);
    }

    fn apply(&mut self, op: BinOp, x: &Var, y: &Var, z: &Var) {
        if self.bottom {
            return;
        }
        let ty = self.term_of_var(y);
        let tz = self.term_of_var(z);
        let tx = self.build_term(op, ty, tz);
        self.rebind_var(x, tx);
        debug!("term: {} := {} {} {} |-> {}", x, y, op, z, tx);
    }

    fn apply_const(&mut self, op: BinOp, x: &Var, y: &Var, k: &BigInt) {
        if self.bottom {
            return;
        }
        let ty = self.term_of_var(y);
        let tk = self.build_const(k);
        let tx = self.build_term(op, ty, tk);
        self.rebind_var(x, tx);
        debug!("term: {} := {} {} {} |-> {}", x, y, op, k, tx);
    }

    /// Assert a constraint: translate it into the underlying variable
    /// space, mark every operand term changed, and re-normalize eagerly.
    /// (Eager normalization after each assumption is deliberate: bottom
    /// is observed at the assumption site.)
    fn add_cst(&mut self, cst: &LinCst<Var>) {
        if self.bottom {
            return;
        }
        let dom_cst = self.rename_cst(cst);
        self.dom.add_cst(&dom_cst);

        let vars: Vec<Var> = cst.expr().variables().cloned().collect();
        for v in &vars {
            let t = self.term_of_var(v);
            self.changed.insert(t);
        }
        self.normalize();
        debug!("term: assume {}", cst);
    }

    fn forget(&mut self, x: &Var) {
        if let Some(t) = self.var_map.remove(x) {
            self.deref_term(t);
        }
    }

    fn get(&mut self, x: &Var) -> Interval {
        // Needed for accuracy.
        self.normalize();
        if self.bottom {
            return Interval::bottom();
        }
        match self.var_map.get(x).copied() {
            None => Interval::top(),
            Some(t) => {
                let dv = self.domvar_of_term(t);
                self.dom.get(&dv)
            }
        }
    }

    fn set(&mut self, x: &Var, itv: Interval) {
        if self.bottom {
            return;
        }
        if itv.is_bottom() {
            self.set_to_bottom();
            return;
        }
        let t = self.term_of_itv(&itv);
        self.rebind_var(x, t);
    }

    /// Alias `y` to the very same term as `x`; no new term is built.
    fn expand(&mut self, x: &Var, y: &Var) {
        if self.bottom {
            return;
        }
        let t = self.term_of_var(x);
        self.rebind_var(y, t);
    }

    /// Project the underlying constraints back into program-variable
    /// space. Terms aliased by several program variables contribute
    /// explicit equalities; constraints over internal (invisible)
    /// variables are dropped rather than reported.
    fn to_lincst_system(&mut self) -> LinCstSystem<Var> {
        if self.bottom {
            let mut sys = LinCstSystem::new();
            sys.push(LinCst::contradiction());
            return sys;
        }

        // Visible variables, plus aliasing equalities.
        let mut rev_map: BTreeMap<DomVar, Var> = BTreeMap::new();
        let mut equivs: Vec<(Var, Var)> = Vec::new();
        let entries: Vec<(Var, TermId)> = self
            .var_map
            .iter()
            .map(|(v, &t)| (v.clone(), t))
            .collect();
        for (v, t) in entries {
            let dv = self.domvar_of_term(t);
            if let Some(first) = rev_map.get(&dv) {
                equivs.push((first.clone(), v));
            } else {
                rev_map.insert(dv, v);
            }
        }

        // Copy of the underlying state with only visible variables.
        let mut d_vis = self.dom.clone();
        for dv in self.term_map.values() {
            if !rev_map.contains_key(dv) {
                d_vis.forget(dv);
            }
        }

        let mut out = LinCstSystem::new();
        for cst in &d_vis.to_lincst_system() {
            // Renaming temporaries minted by expression building can
            // still leak through; drop any constraint mentioning them.
            if cst.expr().variables().all(|dv| rev_map.contains_key(dv)) {
                out.push(cst.map_vars(|dv| rev_map[dv].clone()));
            }
        }
        for (a, b) in equivs {
            debug!("term: alias equality {} = {}", a, b);
            out.push(LinCst::new(
                LinExpr::var(a) - LinExpr::var(b),
                CstKind::Eq,
            ));
        }
        out
    }

    fn domain_name(&self) -> String {
        format!("term({})", self.dom.domain_name())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::var::VarFactory;

    fn top() -> TermIntervalDomain {
        TermIntervalDomain::top()
    }

    fn var_expr(v: &Var) -> LinExpr<Var> {
        LinExpr::var(v.clone())
    }

    #[test]
    fn test_shared_constants_alias() {
        // k := 50; k2 := 50  =>  both bound to the same term node, and
        // the constraint output carries the equality.
        let mut vfac = VarFactory::new();
        let k = vfac.var("k");
        let k2 = vfac.var("k2");

        let mut s = top();
        s.assign(&k, &LinExpr::constant(50));
        s.assign(&k2, &LinExpr::constant(50));

        assert_eq!(s.var_map[&k], s.var_map[&k2]);

        let sys = s.to_lincst_system();
        let equality = LinCst::new(var_expr(&k) - var_expr(&k2), CstKind::Eq);
        assert!(sys.iter().any(|c| *c == equality), "missing {} in {}", equality, sys);
        let value = LinCst::eq(var_expr(&k), 50);
        assert!(sys.iter().any(|c| *c == value), "missing {} in {}", value, sys);
    }

    #[test]
    fn test_hash_consed_expressions() {
        // Building x+1 twice reuses the same App node and domain variable.
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let a = vfac.var("a");
        let b = vfac.var("b");

        let mut s = top();
        s.assign(&a, &(var_expr(&x) + 1));
        let terms_after_first = s.num_terms();
        let domvars_after_first = s.term_map.len();
        s.assign(&b, &(var_expr(&x) + 1));
        assert_eq!(s.num_terms(), terms_after_first);
        assert_eq!(s.term_map.len(), domvars_after_first);
        assert_eq!(s.var_map[&a], s.var_map[&b]);
    }

    #[test]
    fn test_reference_counting_cleanup() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");

        let mut s = top();
        s.add_cst(&LinCst::geq(var_expr(&y), 1));
        s.assign(&x, &(var_expr(&y) + 1));
        let tx = s.var_map[&x];
        let dvx = s.term_map[&tx];

        s.forget(&x);
        assert!(!s.ttbl.is_live(tx));
        assert!(!s.term_map.contains_key(&tx));
        // The backing domain variable is gone from the underlying state.
        assert!(s.dom.get(&dvx).is_top());

        s.forget(&y);
        assert_eq!(s.num_terms(), 0);
        assert!(s.term_map.is_empty());
    }

    #[test]
    fn test_leq_boundaries() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");

        let mut s = top();
        s.assign(&x, &LinExpr::constant(4));
        s.add_cst(&LinCst::leq(var_expr(&x), 10));

        assert!(TermIntervalDomain::bottom().leq(&s));
        assert!(s.clone().leq(&top()));
        assert!(s.clone().leq(&s.clone()));
        assert!(!s.clone().leq(&TermIntervalDomain::bottom()));
    }

    #[test]
    fn test_join_soundness_and_shared_structure() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");

        let mut a = top();
        a.assign(&x, &LinExpr::constant(5));
        a.assign(&y, &(var_expr(&x) + 1));
        let mut b = top();
        b.assign(&x, &LinExpr::constant(7));
        b.assign(&y, &(var_expr(&x) + 1));

        let mut j = a.join(&b);
        assert!(a.clone().leq(&j));
        assert!(b.clone().leq(&j));
        assert_eq!(j.get(&x), Interval::range(5, 7));
        assert_eq!(j.get(&y), Interval::range(6, 8));

        // The differing constants collapsed to ONE shared fresh variable,
        // so y is still x + 1 structurally in the joined state.
        let tx = j.var_map[&x];
        match *j.ttbl.get(j.var_map[&y]) {
            Term::App(BinOp::Add, _, r) => assert_eq!(r, tx),
            ref t => panic!("unexpected term for y: {:?}", t),
        }
    }

    #[test]
    fn test_widening_terminates() {
        let mut vfac = VarFactory::new();
        let i = vfac.var("i");

        let mut a = top();
        a.assign(&i, &LinExpr::constant(0));

        let f = |s: &TermIntervalDomain| {
            let mut next = s.clone();
            next.apply_const(BinOp::Add, &i, &i, &BigInt::from(1));
            next
        };

        let mut stabilized = false;
        for _ in 0..10 {
            let mut next = a.widen(&f(&a));
            if next.leq(&a) {
                stabilized = true;
                break;
            }
            a = next;
        }
        assert!(stabilized, "widening sequence did not stabilize");
    }

    #[test]
    fn test_normalization_idempotent() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");
        let z = vfac.var("z");

        let mut s = top();
        s.assign(&x, &(var_expr(&y) + var_expr(&z)));
        s.add_cst(&LinCst::geq(var_expr(&y), 5));
        s.add_cst(&LinCst::geq(var_expr(&z), 5));
        s.add_cst(&LinCst::leq(var_expr(&x), 10));

        s.normalize();
        let once: Vec<Interval> = [&x, &y, &z].iter().map(|v| s.get(v)).collect();
        s.normalize();
        let twice: Vec<Interval> = [&x, &y, &z].iter().map(|v| s.get(v)).collect();
        assert_eq!(once, twice);
        assert!(s.is_normalized());
    }

    #[test]
    fn test_upward_propagation() {
        // x := y + z with y, z >= 5 and x <= 10 pins x to exactly 10.
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");
        let z = vfac.var("z");

        let mut s = top();
        s.assign(&x, &(var_expr(&y) + var_expr(&z)));
        s.add_cst(&LinCst::leq(var_expr(&x), 10));
        s.add_cst(&LinCst::geq(var_expr(&y), 5));
        s.add_cst(&LinCst::geq(var_expr(&z), 5));
        assert_eq!(s.get(&x), Interval::range(10, 10));
    }

    #[test]
    fn test_downward_propagation() {
        // x := y + 1 with x == 3 recovers y == 2 through the inverse.
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");

        let mut s = top();
        s.apply_const(BinOp::Add, &x, &y, &BigInt::from(1));
        s.add_cst(&LinCst::eq(var_expr(&x), 3));
        assert_eq!(s.get(&y), Interval::range(2, 2));
    }

    #[test]
    fn test_assume_to_bottom() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");

        let mut s = top();
        s.assign(&x, &LinExpr::constant(4));
        // Eager normalization observes bottom at the assumption site.
        s.add_cst(&LinCst::geq(var_expr(&x), 10));
        assert!(s.is_bottom());
    }

    #[test]
    fn test_bitwise_havoc_does_not_conflate() {
        // x := x & nd1 and y := y & nd1 over *distinct* x, y must not
        // make x and y equal.
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");
        let nd1 = vfac.var("nd1");

        let mut s = top();
        s.forget(&x);
        s.forget(&y);
        s.apply(BinOp::And, &x, &x, &nd1);
        s.apply(BinOp::And, &y, &y, &nd1);
        assert_ne!(s.var_map[&x], s.var_map[&y]);

        let sys = s.to_lincst_system();
        let equality = LinCst::new(var_expr(&x) - var_expr(&y), CstKind::Eq);
        assert!(!sys.iter().any(|c| *c == equality));
    }

    #[test]
    fn test_bitwise_preserves_prior_equality() {
        // If x and y were already equal, the same update keeps them so.
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");
        let nd1 = vfac.var("nd1");

        let mut s = top();
        s.assign(&x, &LinExpr::constant(5));
        s.assign(&y, &var_expr(&x));
        s.apply(BinOp::And, &x, &x, &nd1);
        s.apply(BinOp::And, &y, &y, &nd1);
        assert_eq!(s.var_map[&x], s.var_map[&y]);
    }

    #[test]
    fn test_meet_refinement_fallback_is_sound() {
        // With b ⊑ a (the refinement usage), the fallback meet result
        // must still be below both operands.
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");

        let mut a = top();
        a.set(&x, Interval::range(0, 10));
        let mut b = a.clone();
        b.add_cst(&LinCst::leq(var_expr(&x), 5));

        let r = a.meet(&b);
        assert!(!r.is_bottom() && !r.is_top());
        assert!(r.clone().leq(&a));
        assert!(r.clone().leq(&b));
    }

    #[test]
    fn test_narrow_returns_left() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let mut a = top();
        a.set(&x, Interval::range(0, 10));
        let mut b = a.clone();
        b.add_cst(&LinCst::leq(var_expr(&x), 5));
        let mut n = a.narrow(&b);
        assert_eq!(n.get(&x), Interval::range(0, 10));
    }

    #[test]
    fn test_expand_aliases_without_new_term() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");

        let mut s = top();
        s.assign(&x, &(LinExpr::constant(2) + var_expr(&x)));
        let before = s.num_terms();
        s.expand(&x, &y);
        assert_eq!(s.num_terms(), before);
        assert_eq!(s.var_map[&x], s.var_map[&y]);

        let sys = s.to_lincst_system();
        let equality = LinCst::new(var_expr(&x) - var_expr(&y), CstKind::Eq);
        assert!(sys.iter().any(|c| *c == equality));
    }

    #[test]
    fn test_set_singleton_reuses_constant_node() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let k = vfac.var("k");

        let mut s = top();
        s.assign(&k, &LinExpr::constant(50));
        s.set(&x, Interval::constant(50));
        assert_eq!(s.var_map[&x], s.var_map[&k]);

        let mut s2 = top();
        s2.set(&x, Interval::range(1, 5));
        assert_eq!(s2.get(&x), Interval::range(1, 5));
    }

    #[test]
    fn test_get_unbound_is_top_and_bottom_state() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let mut s = top();
        assert!(s.get(&x).is_top());
        let mut b = TermIntervalDomain::bottom();
        assert!(b.get(&x).is_bottom());
    }

    #[test]
    fn test_display() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let mut s = top();
        assert_eq!(s.to_string(), "{}");
        s.assign(&x, &LinExpr::constant(1));
        let mut rendered = String::new();
        s.write(&mut rendered).unwrap();
        assert!(rendered.contains("x -> t"), "got {}", rendered);
        assert_eq!(TermIntervalDomain::bottom().to_string(), "_|_");
    }
}
