//! Graphviz (DOT) rendering of term tables and CFGs.
//!
//! Debug/visualization aid; the output is deterministic but not a stable
//! format.

use std::fmt::Write;

use crate::cfg::Cfg;
use crate::term::{Term, TermTable};

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render the live nodes of a term table, with edges to children.
pub fn term_table_to_dot(tbl: &TermTable) -> String {
    let mut out = String::new();
    writeln!(out, "digraph terms {{").unwrap();
    writeln!(out, "  node [shape=circle];").unwrap();
    for t in tbl.ids() {
        match tbl.get(t) {
            Term::Const(n) => {
                writeln!(out, "  {} [label=\"{}\", shape=box];", t, n).unwrap();
            }
            Term::Var(id) => {
                writeln!(out, "  {} [label=\"?{}\"];", t, id).unwrap();
            }
            Term::App(op, l, r) => {
                writeln!(out, "  {} [label=\"{}\"];", t, escape(&op.to_string())).unwrap();
                writeln!(out, "  {} -> {} [label=\"0\"];", t, l).unwrap();
                writeln!(out, "  {} -> {} [label=\"1\"];", t, r).unwrap();
            }
        }
    }
    writeln!(out, "}}").unwrap();
    out
}

/// Render a CFG, one record node per block listing its statements.
pub fn cfg_to_dot(cfg: &Cfg) -> String {
    let mut out = String::new();
    writeln!(out, "digraph cfg {{").unwrap();
    writeln!(out, "  node [shape=box];").unwrap();
    for block in cfg.blocks() {
        let mut body = String::new();
        for stmt in block.stmts() {
            body.push_str(&escape(&stmt.to_string()));
            body.push_str("\\l");
        }
        writeln!(
            out,
            "  \"{}\" [label=\"{}:\\l{}\"];",
            escape(block.label()),
            escape(block.label()),
            body
        )
        .unwrap();
    }
    for label in cfg.labels() {
        for succ in cfg.succs(label) {
            writeln!(out, "  \"{}\" -> \"{}\";", escape(label), escape(succ)).unwrap();
        }
    }
    writeln!(out, "}}").unwrap();
    out
}
