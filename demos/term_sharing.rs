//! Equalities surviving non-deterministic bitwise updates.
//!
//! `x` and `y` start equal and are both updated with `& nd1` for the same
//! havoc'd `nd1` inside a loop; same for `z`/`w` with `|` and `s`/`t`
//! with `^`. The term domain keeps all three equalities across the loop,
//! which no pointwise numeric domain can do.

use clap::Parser;

use antiunif_rs::analyzer::FwdAnalyzer;
use antiunif_rs::cfg::Cfg;
use antiunif_rs::linear::{LinCst, LinExpr};
use antiunif_rs::numeric::NumDomain;
use antiunif_rs::term_domain::TermIntervalDomain;
use antiunif_rs::var::VarFactory;

#[derive(Parser)]
struct Args {
    /// Log level for the analysis trace.
    #[arg(long, default_value = "warn")]
    log: simplelog::LevelFilter,
}

fn prog(vfac: &mut VarFactory) -> Cfg {
    let i = vfac.var("i");
    let x = vfac.var("x");
    let y = vfac.var("y");
    let z = vfac.var("z");
    let w = vfac.var("w");
    let s = vfac.var("s");
    let t = vfac.var("t");
    let nd1 = vfac.var("nd1");
    let nd2 = vfac.var("nd2");

    let mut cfg = Cfg::new("entry", "ret");
    let entry = cfg.insert("entry");
    entry.assign(&i, 0);
    entry.assign(&x, 5);
    entry.assign(&y, 5);
    entry.assign(&z, 3);
    entry.assign(&w, 3);
    entry.assign(&s, 0);
    entry.assign(&t, 0);
    cfg.insert("bb1");
    cfg.insert("bb1_t")
        .assume(LinCst::leq(LinExpr::var(i.clone()), 99));
    cfg.insert("bb1_f")
        .assume(LinCst::geq(LinExpr::var(i.clone()), 100));
    let body = cfg.insert("bb2");
    body.havoc(&nd1);
    body.havoc(&nd2);
    body.bitwise_and(&x, &x, &nd1);
    body.bitwise_and(&y, &y, &nd1);
    body.bitwise_or(&z, &z, &nd1);
    body.bitwise_or(&w, &w, &nd1);
    body.bitwise_xor(&s, &nd1, &nd2);
    body.bitwise_xor(&t, &nd1, &nd2);
    body.add(&i, &i, 1);
    cfg.insert("ret");

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
    let cfg = prog(&mut vfac);
    println!("{}", cfg);

    let analyzer = FwdAnalyzer::new(&cfg);
    let inv = analyzer.run(TermIntervalDomain::top());

    for label in cfg.rpo() {
        let mut state = inv.pre(&label).clone();
        let mut rendered = String::new();
        state.write(&mut rendered)?;
        println!("{} = {}", label, rendered);
        println!("  constraints: {}", state.to_lincst_system());
    }

    Ok(())
}
