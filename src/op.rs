use std::fmt::{self, Display};

/// Binary operators a term application node can carry.
///
/// Three families, matching what the underlying domains must support:
/// arithmetic, division/remainder, and bitwise. Only the arithmetic family
/// has inverse propagation (see [`inverse`][crate::inverse]).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl BinOp {
    /// `+ - * /s`: the family whose operators are inverted during
    /// downward normalization.
    pub fn is_arith(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::SDiv)
    }

    pub(crate) fn tag(self) -> u64 {
        self as u64
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::SDiv => "/",
            BinOp::UDiv => "/_u",
            BinOp::SRem => "%",
            BinOp::URem => "%_u",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::LShr => ">>_l",
            BinOp::AShr => ">>_a",
        };
        write!(f, "{}", s)
    }
}
