use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use num_bigint::BigInt;

use crate::linear::{LinCst, LinCstSystem, LinExpr};
use crate::op::BinOp;
use crate::var::Var;

pub type Label = String;

/// Second operand of a binary-operation statement.
#[derive(Debug, Clone)]
pub enum Operand {
    Var(Var),
    Const(BigInt),
}

impl From<&Var> for Operand {
    fn from(v: &Var) -> Self {
        Operand::Var(v.clone())
    }
}
impl From<i64> for Operand {
    fn from(k: i64) -> Self {
        Operand::Const(BigInt::from(k))
    }
}
impl From<i32> for Operand {
    fn from(k: i32) -> Self {
        Operand::Const(BigInt::from(k))
    }
}
impl From<BigInt> for Operand {
    fn from(k: BigInt) -> Self {
        Operand::Const(k)
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{}", v),
            Operand::Const(k) => write!(f, "{}", k),
        }
    }
}

/// The statement kinds the scalar domains react to. Array and pointer
/// statements are not part of this IR.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `lhs := rhs`
    Assign { lhs: Var, rhs: LinExpr<Var> },
    /// `lhs := op1 op op2`
    BinOp {
        op: BinOp,
        lhs: Var,
        op1: Var,
        op2: Operand,
    },
    /// `assume(c1 /\ c2 /\ ...)`
    Assume(LinCstSystem<Var>),
    /// `lhs := *` (non-deterministic)
    Havoc(Var),
    /// `lhs := cond ? on_true : on_false`
    Select {
        lhs: Var,
        cond: LinCst<Var>,
        on_true: LinExpr<Var>,
        on_false: LinExpr<Var>,
    },
    Unreachable,
}

impl Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { lhs, rhs } => write!(f, "{} := {}", lhs, rhs),
            Stmt::BinOp { op, lhs, op1, op2 } => {
                write!(f, "{} := {} {} {}", lhs, op1, op, op2)
            }
            Stmt::Assume(sys) => write!(f, "assume {}", sys),
            Stmt::Havoc(v) => write!(f, "havoc({})", v),
            Stmt::Select {
                lhs,
                cond,
                on_true,
                on_false,
            } => write!(f, "{} := ({}) ? {} : {}", lhs, cond, on_true, on_false),
            Stmt::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    label: Label,
    stmts: Vec<Stmt>,
}

impl BasicBlock {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            stmts: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    pub fn assign(&mut self, x: &Var, e: impl Into<LinExpr<Var>>) {
        self.stmts.push(Stmt::Assign {
            lhs: x.clone(),
            rhs: e.into(),
        });
    }

    pub fn binop(&mut self, op: BinOp, x: &Var, y: &Var, z: impl Into<Operand>) {
        self.stmts.push(Stmt::BinOp {
            op,
            lhs: x.clone(),
            op1: y.clone(),
            op2: z.into(),
        });
    }

    pub fn add(&mut self, x: &Var, y: &Var, z: impl Into<Operand>) {
        self.binop(BinOp::Add, x, y, z);
    }
    pub fn sub(&mut self, x: &Var, y: &Var, z: impl Into<Operand>) {
        self.binop(BinOp::Sub, x, y, z);
    }
    pub fn mul(&mut self, x: &Var, y: &Var, z: impl Into<Operand>) {
        self.binop(BinOp::Mul, x, y, z);
    }
    pub fn div(&mut self, x: &Var, y: &Var, z: impl Into<Operand>) {
        self.binop(BinOp::SDiv, x, y, z);
    }
    pub fn bitwise_and(&mut self, x: &Var, y: &Var, z: impl Into<Operand>) {
        self.binop(BinOp::And, x, y, z);
    }
    pub fn bitwise_or(&mut self, x: &Var, y: &Var, z: impl Into<Operand>) {
        self.binop(BinOp::Or, x, y, z);
    }
    pub fn bitwise_xor(&mut self, x: &Var, y: &Var, z: impl Into<Operand>) {
        self.binop(BinOp::Xor, x, y, z);
    }

    pub fn assume(&mut self, cst: impl Into<LinCstSystem<Var>>) {
        self.stmts.push(Stmt::Assume(cst.into()));
    }

    pub fn havoc(&mut self, x: &Var) {
        self.stmts.push(Stmt::Havoc(x.clone()));
    }

    pub fn select(
        &mut self,
        x: &Var,
        cond: LinCst<Var>,
        on_true: impl Into<LinExpr<Var>>,
        on_false: impl Into<LinExpr<Var>>,
    ) {
        self.stmts.push(Stmt::Select {
            lhs: x.clone(),
            cond,
            on_true: on_true.into(),
            on_false: on_false.into(),
        });
    }

    pub fn unreachable(&mut self) {
        self.stmts.push(Stmt::Unreachable);
    }
}

/// A control-flow graph: labeled basic blocks plus directed edges, with
/// designated entry and exit labels.
#[derive(Debug, Clone)]
pub struct Cfg {
    entry: Label,
    exit: Label,
    blocks: BTreeMap<Label, BasicBlock>,
    succs: BTreeMap<Label, Vec<Label>>,
    preds: BTreeMap<Label, Vec<Label>>,
}

impl Cfg {
    pub fn new(entry: &str, exit: &str) -> Self {
        Self {
            entry: entry.to_string(),
            exit: exit.to_string(),
            blocks: BTreeMap::new(),
            succs: BTreeMap::new(),
            preds: BTreeMap::new(),
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }
    pub fn exit(&self) -> &str {
        &self.exit
    }

    /// Insert (or fetch) the block with the given label.
    pub fn insert(&mut self, label: &str) -> &mut BasicBlock {
        self.succs.entry(label.to_string()).or_default();
        self.preds.entry(label.to_string()).or_default();
        self.blocks
            .entry(label.to_string())
            .or_insert_with(|| BasicBlock::new(label))
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        assert!(self.blocks.contains_key(from), "unknown block {}", from);
        assert!(self.blocks.contains_key(to), "unknown block {}", to);
        let succs = self.succs.get_mut(from).unwrap();
        if !succs.iter().any(|l| l == to) {
            succs.push(to.to_string());
        }
        let preds = self.preds.get_mut(to).unwrap();
        if !preds.iter().any(|l| l == from) {
            preds.push(from.to_string());
        }
    }

    pub fn block(&self, label: &str) -> &BasicBlock {
        self.blocks
            .get(label)
            .unwrap_or_else(|| panic!("unknown block {}", label))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.values()
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.blocks.keys()
    }

    pub fn succs(&self, label: &str) -> &[Label] {
        self.succs
            .get(label)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    pub fn preds(&self, label: &str) -> &[Label] {
        self.preds
            .get(label)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// Reverse postorder over the blocks reachable from the entry.
    pub fn rpo(&self) -> Vec<Label> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<(Label, usize)> = vec![(self.entry.clone(), 0)];
        visited.insert(self.entry.clone());
        while let Some((label, i)) = stack.last().cloned() {
            let succs = self.succs(&label);
            if i < succs.len() {
                stack.last_mut().unwrap().1 += 1;
                let s = succs[i].clone();
                if visited.insert(s.clone()) {
                    stack.push((s, 0));
                }
            } else {
                stack.pop();
                order.push(label);
            }
        }
        order.reverse();
        order
    }

    /// Targets of back edges: where the analyzer must widen.
    pub fn widening_points(&self) -> BTreeSet<Label> {
        let mut points = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut on_stack = BTreeSet::new();
        let mut stack: Vec<(Label, usize)> = vec![(self.entry.clone(), 0)];
        visited.insert(self.entry.clone());
        on_stack.insert(self.entry.clone());
        while let Some((label, i)) = stack.last().cloned() {
            let succs = self.succs(&label);
            if i < succs.len() {
                stack.last_mut().unwrap().1 += 1;
                let s = succs[i].clone();
                if on_stack.contains(&s) {
                    points.insert(s);
                } else if visited.insert(s.clone()) {
                    on_stack.insert(s.clone());
                    stack.push((s, 0));
                }
            } else {
                on_stack.remove(&label);
                stack.pop();
            }
        }
        points
    }

    /// Remove blocks unreachable from the entry, then merge linear
    /// chains (a block with a unique successor that has it as unique
    /// predecessor).
    pub fn simplify(&mut self) {
        // Unreachable-block removal.
        let mut reachable = BTreeSet::new();
        let mut stack = vec![self.entry.clone()];
        reachable.insert(self.entry.clone());
        while let Some(l) = stack.pop() {
            for s in self.succs(&l).to_vec() {
                if reachable.insert(s.clone()) {
                    stack.push(s);
                }
            }
        }
        let dead: Vec<Label> = self
            .blocks
            .keys()
            .filter(|l| !reachable.contains(*l))
            .cloned()
            .collect();
        for l in dead {
            self.blocks.remove(&l);
            self.succs.remove(&l);
            self.preds.remove(&l);
            for succs in self.succs.values_mut() {
                succs.retain(|s| s != &l);
            }
            for preds in self.preds.values_mut() {
                preds.retain(|p| p != &l);
            }
        }

        // Chain merging.
        loop {
            let mut candidate = None;
            for (a, succs) in &self.succs {
                if succs.len() != 1 {
                    continue;
                }
                let b = &succs[0];
                if b == a || b == &self.entry {
                    continue;
                }
                if self.preds[b].len() == 1 {
                    candidate = Some((a.clone(), b.clone()));
                    break;
                }
            }
            let (a, b) = match candidate {
                Some(c) => c,
                None => break,
            };

            let b_block = self.blocks.remove(&b).unwrap();
            let b_succs = self.succs.remove(&b).unwrap();
            self.preds.remove(&b);
            self.blocks
                .get_mut(&a)
                .unwrap()
                .stmts
                .extend(b_block.stmts);
            for s in &b_succs {
                for p in self.preds.get_mut(s).unwrap() {
                    if p == &b {
                        *p = a.clone();
                    }
                }
            }
            self.succs.insert(a.clone(), b_succs);
            if self.exit == b {
                self.exit = a;
            }
        }
    }
}

impl Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, block) in &self.blocks {
            writeln!(f, "{}:", label)?;
            for stmt in &block.stmts {
                writeln!(f, "  {}", stmt)?;
            }
            writeln!(f, "  --> [{}]", self.succs(label).join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::VarFactory;

    fn diamond() -> (Cfg, VarFactory) {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let mut cfg = Cfg::new("entry", "ret");
        cfg.insert("entry").assign(&x, 0);
        cfg.insert("then");
        cfg.insert("else");
        cfg.insert("ret");
        cfg.add_edge("entry", "then");
        cfg.add_edge("entry", "else");
        cfg.add_edge("then", "ret");
        cfg.add_edge("else", "ret");
        (cfg, vfac)
    }

    #[test]
    fn test_rpo_starts_at_entry() {
        let (cfg, _) = diamond();
        let rpo = cfg.rpo();
        assert_eq!(rpo.first().map(String::as_str), Some("entry"));
        assert_eq!(rpo.last().map(String::as_str), Some("ret"));
        assert_eq!(rpo.len(), 4);
    }

    #[test]
    fn test_widening_points() {
        let mut cfg = Cfg::new("entry", "ret");
        cfg.insert("entry");
        cfg.insert("head");
        cfg.insert("body");
        cfg.insert("ret");
        cfg.add_edge("entry", "head");
        cfg.add_edge("head", "body");
        cfg.add_edge("body", "head");
        cfg.add_edge("head", "ret");
        let points = cfg.widening_points();
        assert_eq!(points.len(), 1);
        assert!(points.contains("head"));
    }

    #[test]
    fn test_simplify_removes_unreachable() {
        let (mut cfg, _) = diamond();
        cfg.insert("island");
        cfg.simplify();
        assert!(cfg.labels().all(|l| l != "island"));
    }

    #[test]
    fn test_simplify_merges_chains() {
        let mut vfac = VarFactory::new();
        let x = vfac.var("x");
        let mut cfg = Cfg::new("a", "c");
        cfg.insert("a").assign(&x, 1);
        cfg.insert("b").assign(&x, 2);
        cfg.insert("c").assign(&x, 3);
        cfg.add_edge("a", "b");
        cfg.add_edge("b", "c");
        cfg.simplify();
        assert_eq!(cfg.labels().count(), 1);
        assert_eq!(cfg.block("a").stmts().len(), 3);
        assert_eq!(cfg.exit(), "a");
    }
}
