use std::collections::BTreeMap;

use log::{debug, warn};

use crate::cfg::{Cfg, Label, Operand, Stmt};
use crate::numeric::NumDomain;
use crate::var::Var;

/// Per-statement transfer function over any numeric domain.
pub fn transfer<D: NumDomain<Var>>(dom: &mut D, stmt: &Stmt) {
    match stmt {
        Stmt::Assign { lhs, rhs } => dom.assign(lhs, rhs),
        Stmt::BinOp { op, lhs, op1, op2 } => match op2 {
            Operand::Var(z) => dom.apply(*op, lhs, op1, z),
            Operand::Const(k) => dom.apply_const(*op, lhs, op1, k),
        },
        Stmt::Assume(sys) => dom.add_csts(sys),
        Stmt::Havoc(v) => dom.forget(v),
        Stmt::Select {
            lhs,
            cond,
            on_true,
            on_false,
        } => {
            // Guarded-branch join.
            let mut tt = dom.clone();
            tt.add_cst(cond);
            tt.assign(lhs, on_true);
            let mut ff = dom.clone();
            ff.add_cst(&cond.negate());
            ff.assign(lhs, on_false);
            *dom = tt.join(&ff);
        }
        Stmt::Unreachable => *dom = D::bottom(),
    }
}

/// Invariant maps computed by [`FwdAnalyzer::run`]: the abstract state at
/// block entry (`pre`) and block exit (`post`).
#[derive(Debug)]
pub struct Invariants<D> {
    pre: BTreeMap<Label, D>,
    post: BTreeMap<Label, D>,
}

impl<D> Invariants<D> {
    pub fn pre(&self, label: &str) -> &D {
        self.pre
            .get(label)
            .unwrap_or_else(|| panic!("no invariant for block {}", label))
    }

    pub fn post(&self, label: &str) -> &D {
        self.post
            .get(label)
            .unwrap_or_else(|| panic!("no invariant for block {}", label))
    }
}

/// Forward abstract-interpretation driver: reverse-postorder iteration
/// with widening at back-edge targets, followed by a bounded number of
/// descending passes that refine each invariant with `meet`.
#[derive(Debug, Clone)]
pub struct FwdAnalyzer<'c> {
    cfg: &'c Cfg,
    /// Joins performed at a widening point before widening kicks in.
    pub widening_delay: usize,
    /// Descending (refinement) passes after stabilization.
    pub descending_iters: usize,
    /// Backstop against a non-converging instantiation.
    pub max_iterations: usize,
}

impl<'c> FwdAnalyzer<'c> {
    pub fn new(cfg: &'c Cfg) -> Self {
        Self {
            cfg,
            widening_delay: 1,
            descending_iters: 1,
            max_iterations: 1000,
        }
    }

    fn transfer_block<D: NumDomain<Var>>(&self, mut dom: D, label: &str) -> D {
        for stmt in self.cfg.block(label).stmts() {
            transfer(&mut dom, stmt);
        }
        dom
    }

    fn flow_in<D: NumDomain<Var>>(
        &self,
        label: &str,
        init: &D,
        post: &BTreeMap<Label, D>,
    ) -> D {
        if label == self.cfg.entry() {
            return init.clone();
        }
        let mut acc = D::bottom();
        for p in self.cfg.preds(label) {
            if let Some(out) = post.get(p) {
                acc = acc.join(out);
            }
        }
        acc
    }

    /// Run to fixpoint from `init` at the entry block.
    pub fn run<D: NumDomain<Var>>(&self, init: D) -> Invariants<D> {
        let rpo = self.cfg.rpo();
        let wpoints = self.cfg.widening_points();
        debug!("analyzer: rpo {:?}, widening points {:?}", rpo, wpoints);

        let mut pre: BTreeMap<Label, D> = BTreeMap::new();
        let mut post: BTreeMap<Label, D> = BTreeMap::new();

        // Ascending iteration.
        let mut iteration = 0;
        loop {
            iteration += 1;
            let mut stable = true;
            for label in &rpo {
                let mut inx = self.flow_in(label, &init, &post);
                match pre.get(label) {
                    None => stable = false,
                    Some(old) => {
                        if inx.leq(old) {
                            inx = old.clone();
                        } else {
                            stable = false;
                            inx = if wpoints.contains(label)
                                && iteration > self.widening_delay
                            {
                                old.widen(&inx)
                            } else {
                                old.join(&inx)
                            };
                        }
                    }
                }
                let out = self.transfer_block(inx.clone(), label);
                pre.insert(label.clone(), inx);
                post.insert(label.clone(), out);
            }
            if stable {
                debug!("analyzer: stabilized after {} iterations", iteration);
                break;
            }
            if iteration >= self.max_iterations {
                warn!(
                    "analyzer: no convergence after {} iterations",
                    self.max_iterations
                );
                break;
            }
        }

        // Descending refinement passes.
        for _ in 0..self.descending_iters {
            for label in &rpo {
                let inx = self.flow_in(label, &init, &post);
                let refined = pre[label].meet(&inx);
                let out = self.transfer_block(refined.clone(), label);
                pre.insert(label.clone(), refined);
                post.insert(label.clone(), out);
            }
        }

        // Blocks unreachable from the entry stay bottom.
        for label in self.cfg.labels() {
            pre.entry(label.clone()).or_insert_with(D::bottom);
            post.entry(label.clone()).or_insert_with(D::bottom);
        }

        Invariants { pre, post }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::intervals::{Interval, IntervalDomain};
    use crate::linear::{LinCst, LinExpr};
    use crate::var::VarFactory;

    /// i := 0; while (i <= 9) i := i + 1;  -- guards on both branches.
    fn counting_loop(vfac: &mut VarFactory) -> Cfg {
        let i = vfac.var("i");
        let mut cfg = Cfg::new("entry", "ret");
        cfg.insert("entry").assign(&i, 0);
        cfg.insert("head");
        cfg.insert("body");
        let t = cfg.insert("head_t");
        t.assume(LinCst::leq(LinExpr::var(i.clone()), 9));
        let f = cfg.insert("head_f");
        f.assume(LinCst::geq(LinExpr::var(i.clone()), 10));
        cfg.insert("body").add(&i, &i, 1);
        cfg.insert("ret");
        cfg.add_edge("entry", "head");
        cfg.add_edge("head", "head_t");
        cfg.add_edge("head", "head_f");
        cfg.add_edge("head_t", "body");
        cfg.add_edge("body", "head");
        cfg.add_edge("head_f", "ret");
        cfg
    }

    #[test]
    fn test_interval_loop_invariants() {
        let mut vfac = VarFactory::new();
        let cfg = counting_loop(&mut vfac);
        let i = vfac.var("i");

        let analyzer = FwdAnalyzer::new(&cfg);
        let inv = analyzer.run(IntervalDomain::<Var>::top());

        let mut at_head = inv.pre("head").clone();
        assert_eq!(at_head.get(&i), Interval::range(0, 10));
        let mut at_ret = inv.pre("ret").clone();
        assert_eq!(at_ret.get(&i), Interval::range(10, 10));
    }

    #[test]
    fn test_term_domain_exact_loop_exit() {
        // Under term(intervals), the post-loop value of i is exactly 10.
        let mut vfac = VarFactory::new();
        let cfg = counting_loop(&mut vfac);
        let i = vfac.var("i");

        let analyzer = FwdAnalyzer::new(&cfg);
        let inv = analyzer.run(crate::term_domain::TermIntervalDomain::top());

        let mut at_ret = inv.pre("ret").clone();
        assert_eq!(at_ret.get(&i), Interval::range(10, 10));
        let mut at_head = inv.pre("head").clone();
        assert_eq!(at_head.get(&i), Interval::range(0, 10));
    }

    /// unif-1 shape: k := 50 before an i = 0..100 loop.
    fn constant_before_loop(vfac: &mut VarFactory) -> Cfg {
        let i = vfac.var("i");
        let k = vfac.var("k");
        let mut cfg = Cfg::new("x0", "ret");
        cfg.insert("x0").assign(&k, 50);
        cfg.insert("entry").assign(&i, 0);
        cfg.insert("bb1");
        cfg.insert("bb1_t")
            .assume(LinCst::leq(LinExpr::var(i.clone()), 99));
        cfg.insert("bb1_f")
            .assume(LinCst::geq(LinExpr::var(i.clone()), 100));
        cfg.insert("bb2").add(&i, &i, 1);
        cfg.insert("ret");
        cfg.add_edge("x0", "entry");
        cfg.add_edge("entry", "bb1");
        cfg.add_edge("bb1", "bb1_t");
        cfg.add_edge("bb1", "bb1_f");
        cfg.add_edge("bb1_t", "bb2");
        cfg.add_edge("bb2", "bb1");
        cfg.add_edge("bb1_f", "ret");
        cfg
    }

    #[test]
    fn test_constant_survives_loop() {
        let mut vfac = VarFactory::new();
        let cfg = constant_before_loop(&mut vfac);
        let i = vfac.var("i");
        let k = vfac.var("k");

        let analyzer = FwdAnalyzer::new(&cfg);
        let inv = analyzer.run(crate::term_domain::TermIntervalDomain::top());

        let mut at_ret = inv.pre("ret").clone();
        assert_eq!(at_ret.get(&k), Interval::range(50, 50));
        assert_eq!(at_ret.get(&i), Interval::range(100, 100));
    }

    #[test]
    fn test_simplify_preserves_result() {
        let mut vfac = VarFactory::new();
        let mut cfg = constant_before_loop(&mut vfac);
        let i = vfac.var("i");
        cfg.simplify();

        let analyzer = FwdAnalyzer::new(&cfg);
        let inv = analyzer.run(crate::term_domain::TermIntervalDomain::top());
        // The exit label may have been merged; check its post state.
        let exit = cfg.exit().to_string();
        let mut at_exit = inv.post(&exit).clone();
        assert_eq!(at_exit.get(&i), Interval::range(100, 100));
    }

    #[test]
    fn test_select_transfer() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let y = vfac.var("y");
        let mut dom = IntervalDomain::<Var>::top();
        dom.set(&x, Interval::range(0, 10));
        // y := (x <= 5) ? 1 : 2
        let stmt = Stmt::Select {
            lhs: y.clone(),
            cond: LinCst::leq(LinExpr::var(x.clone()), 5),
            on_true: LinExpr::constant(1),
            on_false: LinExpr::constant(2),
        };
        transfer(&mut dom, &stmt);
        assert_eq!(dom.get(&y), Interval::range(1, 2));
    }

    #[test]
    fn test_unreachable_is_bottom() {
        let mut dom = IntervalDomain::<Var>::top();
        transfer(&mut dom, &Stmt::Unreachable);
        assert!(dom.is_bottom());
    }
}
