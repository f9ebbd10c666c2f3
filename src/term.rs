use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use num_bigint::BigInt;

use crate::op::BinOp;
use crate::table::Table;
use crate::utils::{pairing2, pairing3, MyHash};

/// Index of a term inside one [`TermTable`].
///
/// Ids are only meaningful relative to the table that minted them; lattice
/// operations over two states build correspondence maps between the two
/// id spaces instead of ever mixing them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TermId(u32);

impl TermId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn from_index(index: usize) -> Self {
        TermId(index as u32)
    }
}

impl Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A node of the term DAG: a constant, an opaque free variable, or the
/// application of a binary operator to two sub-terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Const(BigInt),
    Var(u32),
    App(BinOp, TermId, TermId),
}

impl MyHash for Term {
    fn hash(&self) -> u64 {
        match self {
            Term::Const(n) => pairing2(0, MyHash::hash(n)),
            Term::Var(id) => pairing2(1, *id as u64),
            Term::App(op, l, r) => pairing2(2, pairing3(op.tag(), l.0 as u64, r.0 as u64)),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TermInfo {
    refs: u32,
    depth: usize,
    parents: BTreeSet<TermId>,
}

/// Hash-consed, reference-counted term DAG.
///
/// Structural identity: two `App` nodes with the same operator and the
/// same (already interned) children are the same node. Each slot carries a
/// reference count and the set of `App` nodes using it as a child; `deref`
/// cascades and reports every physically removed id so the caller can
/// clean up companion maps.
///
/// The table is acyclic by construction: an `App` can only be created over
/// already-existing ids, so no node can reach itself.
#[derive(Debug, Clone)]
pub struct TermTable {
    table: Table<Term>,
    info: Vec<TermInfo>,
    fresh: u32,
}

impl Default for TermTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TermTable {
    pub fn new() -> Self {
        Self {
            table: Table::new(16),
            info: vec![TermInfo::default()],
            fresh: 0,
        }
    }

    /// One past the largest id ever minted (ids are `< size`).
    pub fn size(&self) -> usize {
        self.table.size()
    }

    /// Number of live terms.
    pub fn num_terms(&self) -> usize {
        self.table.real_size()
    }

    fn intern(&mut self, term: Term) -> (TermId, bool) {
        if let Some(index) = self.table.find(&term) {
            return (TermId::from_index(index), false);
        }
        let index = self.table.put(term);
        if self.info.len() <= index {
            self.info.resize_with(index + 1, TermInfo::default);
        }
        self.info[index] = TermInfo::default();
        (TermId::from_index(index), true)
    }

    /// Allocate a new opaque variable node. Starts unreferenced; the
    /// caller is expected to `add_ref` it once it is bound somewhere.
    pub fn fresh_var(&mut self) -> TermId {
        let id = self.fresh;
        self.fresh += 1;
        let (t, created) = self.intern(Term::Var(id));
        debug_assert!(created);
        t
    }

    pub fn find_const(&self, n: &BigInt) -> Option<TermId> {
        self.table
            .find(&Term::Const(n.clone()))
            .map(TermId::from_index)
    }

    pub fn make_const(&mut self, n: &BigInt) -> TermId {
        self.intern(Term::Const(n.clone())).0
    }

    pub fn find_ftor(&self, op: BinOp, left: TermId, right: TermId) -> Option<TermId> {
        self.table
            .find(&Term::App(op, left, right))
            .map(TermId::from_index)
    }

    /// Intern the application `left op right`. On first creation the new
    /// node references its children and registers itself as their parent.
    pub fn apply_ftor(&mut self, op: BinOp, left: TermId, right: TermId) -> TermId {
        let (t, created) = self.intern(Term::App(op, left, right));
        if created {
            self.info[t.index()].depth = 1 + self.depth(left).max(self.depth(right));
            self.info[left.index()].parents.insert(t);
            self.info[right.index()].parents.insert(t);
            self.add_ref(left);
            self.add_ref(right);
        }
        t
    }

    /// Get the term for an id. Panics on a dead id: that is a bookkeeping
    /// bug in the caller, not a recoverable condition.
    pub fn get(&self, t: TermId) -> &Term {
        self.table.value(t.index())
    }

    pub fn is_live(&self, t: TermId) -> bool {
        self.table.is_occupied(t.index())
    }

    pub fn depth(&self, t: TermId) -> usize {
        assert!(self.is_live(t), "depth of dead term {}", t);
        self.info[t.index()].depth
    }

    pub fn parents(&self, t: TermId) -> &BTreeSet<TermId> {
        assert!(self.is_live(t), "parents of dead term {}", t);
        &self.info[t.index()].parents
    }

    pub fn refs(&self, t: TermId) -> u32 {
        self.info[t.index()].refs
    }

    pub fn add_ref(&mut self, t: TermId) {
        assert!(self.is_live(t), "add_ref of dead term {}", t);
        self.info[t.index()].refs += 1;
    }

    /// Drop one reference from `t`. Nodes whose count reaches zero are
    /// physically removed, recursively releasing their children; the full
    /// set of removed ids is returned so companion maps can be cleaned up.
    pub fn deref(&mut self, t: TermId) -> Vec<TermId> {
        let mut removed = Vec::new();
        let mut stack = vec![t];
        while let Some(t) = stack.pop() {
            let info = &mut self.info[t.index()];
            assert!(info.refs > 0, "deref of unreferenced term {}", t);
            info.refs -= 1;
            if info.refs == 0 {
                let term = self.table.remove(t.index());
                if let Term::App(_, l, r) = term {
                    self.info[l.index()].parents.remove(&t);
                    self.info[r.index()].parents.remove(&t);
                    stack.push(l);
                    stack.push(r);
                }
                removed.push(t);
            }
        }
        removed
    }

    /// Live ids, in increasing order.
    pub fn ids(&self) -> impl Iterator<Item = TermId> + '_ {
        (1..self.size())
            .filter(|&i| self.table.is_occupied(i))
            .map(TermId::from_index)
    }

    /// Try to extend `map : other-term -> self-term` so that `t_self`
    /// refines the structure of `t_other`: wherever `other` has an
    /// operator application, `self` must have the same operator; a free
    /// variable of `other` corresponds to an arbitrary `self` term, but
    /// always the *same* one. Returns false on any contradiction.
    pub fn map_leq(
        &self,
        other: &TermTable,
        t_self: TermId,
        t_other: TermId,
        map: &mut BTreeMap<TermId, TermId>,
    ) -> bool {
        if let Some(&prev) = map.get(&t_other) {
            return prev == t_self;
        }
        match other.get(t_other) {
            Term::Var(_) => {
                map.insert(t_other, t_self);
                true
            }
            Term::Const(n) => match self.get(t_self) {
                Term::Const(m) if m == n => {
                    map.insert(t_other, t_self);
                    true
                }
                _ => false,
            },
            Term::App(op, lo, ro) => {
                let (op, lo, ro) = (*op, *lo, *ro);
                match *self.get(t_self) {
                    Term::App(op2, ls, rs) if op2 == op => {
                        map.insert(t_other, t_self);
                        self.map_leq(other, ls, lo, map)
                            && self.map_leq(other, rs, ro, map)
                    }
                    _ => false,
                }
            }
        }
    }

    /// Anti-unification: build, in `out`, the least general term
    /// subsuming `t_self` (in `self`) and `t_other` (in `other`).
    ///
    /// Identical structure is walked in lock-step and rebuilt in `out`;
    /// any structural mismatch becomes a fresh free variable. `gmap`
    /// memoizes pairs, so the same `(self, other)` pair always maps to
    /// the same output term.
    pub fn generalize(
        &self,
        other: &TermTable,
        t_self: TermId,
        t_other: TermId,
        out: &mut TermTable,
        gmap: &mut BTreeMap<(TermId, TermId), TermId>,
    ) -> TermId {
        if let Some(&t) = gmap.get(&(t_self, t_other)) {
            return t;
        }
        let t_out = match (self.get(t_self).clone(), other.get(t_other).clone()) {
            (Term::Const(a), Term::Const(b)) if a == b => out.make_const(&a),
            (Term::App(op1, l1, r1), Term::App(op2, l2, r2)) if op1 == op2 => {
                let l = self.generalize(other, l1, l2, out, gmap);
                let r = self.generalize(other, r1, r2, out, gmap);
                out.apply_ftor(op1, l, r)
            }
            _ => out.fresh_var(),
        };
        gmap.insert((t_self, t_other), t_out);
        t_out
    }
}
