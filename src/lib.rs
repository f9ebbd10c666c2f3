//! # antiunif-rs: a term-equivalence abstract domain in Rust
//!
//! **`antiunif-rs`** is a static-analysis library built around the
//! **anti-unification domain**: an abstract domain that lifts any numeric
//! value domain (intervals out of the box) into a more precise relational
//! one by discovering structural equalities between program expressions.
//!
//! ## How it works
//!
//! Every program variable is bound to a node of a shared, hash-consed,
//! reference-counted **term DAG** (constants, opaque variables, binary
//! applications). Building the term for `x + 1` twice yields the *same*
//! node, so two variables assigned syntactically equal expressions are
//! provably equal — information a pointwise numeric domain cannot
//! represent. Each term node owns one variable of the underlying numeric
//! domain; a **normalization fixpoint** propagates tightened values down
//! the DAG (through operator inverses) and back up (through forward
//! re-evaluation).
//!
//! The domain's join is textbook **anti-unification**: the least general
//! common generalization of two term graphs. Structure common to both
//! operands stays shared (keeping the numeric correlation across the
//! join); divergent structure collapses to a fresh unconstrained variable
//! whose value is the join of the underlying states.
//!
//! ## Quick start
//!
//! ```rust
//! use antiunif_rs::analyzer::FwdAnalyzer;
//! use antiunif_rs::cfg::Cfg;
//! use antiunif_rs::intervals::Interval;
//! use antiunif_rs::linear::LinCst;
//! use antiunif_rs::linear::LinExpr;
//! use antiunif_rs::numeric::NumDomain;
//! use antiunif_rs::term_domain::TermIntervalDomain;
//! use antiunif_rs::var::VarFactory;
//!
//! // i := 0; while (i <= 9) { i := i + 1 }
//! let mut vfac = VarFactory::new();
//! let i = vfac.var("i");
//! let mut cfg = Cfg::new("entry", "ret");
//! cfg.insert("entry").assign(&i, 0);
//! cfg.insert("head");
//! cfg.insert("head_t").assume(LinCst::leq(LinExpr::var(i.clone()), 9));
//! cfg.insert("head_f").assume(LinCst::geq(LinExpr::var(i.clone()), 10));
//! cfg.insert("body").add(&i, &i, 1);
//! cfg.insert("ret");
//! cfg.add_edge("entry", "head");
//! cfg.add_edge("head", "head_t");
//! cfg.add_edge("head", "head_f");
//! cfg.add_edge("head_t", "body");
//! cfg.add_edge("body", "head");
//! cfg.add_edge("head_f", "ret");
//!
//! let analyzer = FwdAnalyzer::new(&cfg);
//! let inv = analyzer.run(TermIntervalDomain::top());
//! assert_eq!(inv.pre("ret").clone().get(&i), Interval::range(10, 10));
//! ```
//!
//! ## Core components
//!
//! - [`term`]: the hash-consed, reference-counted term DAG, including
//!   `map_leq` (correspondence for `⊑`) and `generalize`
//!   (anti-unification proper).
//! - [`term_domain`]: the externally visible domain —
//!   [`TermDom`][term_domain::TermDom] over any
//!   [`NumDomain`][numeric::NumDomain].
//! - [`normalize`]: the down/up propagation fixpoint, with a cheaper
//!   per-component path for independent-attribute domains.
//! - [`intervals`]: `BigInt` bounds/intervals and the plain interval
//!   domain, the usual underlying domain.
//! - [`cfg`] / [`analyzer`]: a small CFG IR and a forward fixpoint driver
//!   (widening at loop heads, descending refinement), enough to analyze
//!   real loops end to end.

pub mod analyzer;
pub mod cfg;
pub mod dot;
pub mod intervals;
pub mod inverse;
pub mod linear;
pub mod normalize;
pub mod numeric;
pub mod op;
pub mod table;
pub mod term;
pub mod term_domain;
pub mod utils;
pub mod var;
