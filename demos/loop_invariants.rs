//! Loop analysis with the interval domain vs. the term domain.
//!
//! The program assigns `k := 50` before a counting loop over `i`. The
//! term domain proves the exact post-loop value of `i`, and its
//! constraint output keeps `k = 50` as an equality.

use clap::Parser;

use antiunif_rs::analyzer::FwdAnalyzer;
use antiunif_rs::cfg::Cfg;
use antiunif_rs::intervals::IntervalDomain;
use antiunif_rs::linear::{LinCst, LinExpr};
use antiunif_rs::numeric::NumDomain;
use antiunif_rs::term_domain::TermIntervalDomain;
use antiunif_rs::var::{Var, VarFactory};

#[derive(Parser)]
struct Args {
    /// Log level for the analysis trace.
    #[arg(long, default_value = "info")]
    log: simplelog::LevelFilter,
}

fn prog(vfac: &mut VarFactory) -> Cfg {
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

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    simplelog::TermLogger::init(
        args.log,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let mut vfac = VarFactory::new();
    let mut cfg = prog(&mut vfac);
    cfg.simplify();
    println!("{}", cfg);

    let analyzer = FwdAnalyzer::new(&cfg);

    println!("Invariants with intervals:");
    let inv = analyzer.run(IntervalDomain::<Var>::top());
    for label in cfg.rpo() {
        println!("  {} = {}", label, inv.pre(&label));
    }

    println!("Invariants with term(intervals):");
    let inv = analyzer.run(TermIntervalDomain::top());
    for label in cfg.rpo() {
        let mut state = inv.pre(&label).clone();
        let mut rendered = String::new();
        state.write(&mut rendered)?;
        println!("  {} = {}", label, rendered);
    }

    println!("As linear constraints:");
    for label in cfg.rpo() {
        let mut state = inv.pre(&label).clone();
        println!("  {} = {}", label, state.to_lincst_system());
    }

    Ok(())
}
