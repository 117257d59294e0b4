//! Binary operators and the operand types they accept.

use std::fmt::Display;

use super::symbols::{Builtins, TypeId};

/// A binary operator with a primitive opcode.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum BinOp {
    /// Addition (`x + y`)
    Add,
    /// Subtraction (`x - y`)
    Sub,
    /// Multiplication (`x * y`)
    Mul,
    /// Division (`x / y`)
    Div,
    /// Remainder (`x % y`)
    Rem,
    /// Less than (`<`)
    Lt,
    /// Greater than (`>`)
    Gt,
    /// Less than or equal (`<=`)
    Le,
    /// Greater than or equal (`>=`)
    Ge,
    /// Equality (`==`)
    Eq,
    /// Inequality (`!=`)
    Ne,
    /// Logical and (`&&`)
    And,
    /// Logical or (`||`)
    Or,
}

impl BinOp {
    /// Reads the operator from its token text.
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "+"  => Some(BinOp::Add),
            "-"  => Some(BinOp::Sub),
            "*"  => Some(BinOp::Mul),
            "/"  => Some(BinOp::Div),
            "%"  => Some(BinOp::Rem),
            "<"  => Some(BinOp::Lt),
            ">"  => Some(BinOp::Gt),
            "<=" => Some(BinOp::Le),
            ">=" => Some(BinOp::Ge),
            "==" => Some(BinOp::Eq),
            "!=" => Some(BinOp::Ne),
            "&&" => Some(BinOp::And),
            "||" => Some(BinOp::Or),
            _    => None
        }
    }

    /// The token text of this operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Lt  => "<",
            BinOp::Gt  => ">",
            BinOp::Le  => "<=",
            BinOp::Ge  => ">=",
            BinOp::Eq  => "==",
            BinOp::Ne  => "!=",
            BinOp::And => "&&",
            BinOp::Or  => "||",
        }
    }

    fn is_arith(&self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem)
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// How an operation on two operand types is carried out.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OpImpl {
    /// A primitive opcode producing a value of this type
    Native(BinOp, TypeId),
    /// String concatenation, a call to `System.String.Concat(string, string)`
    Concat,
}

/// Decides how `l op r` is computed, or `None` if these operands don't support the operator.
///
/// Integers support arithmetic and every comparison, booleans support equality and the
/// logical connectives, and strings support only `+`.
pub fn resolve_binop(b: &Builtins, op: BinOp, l: TypeId, r: TypeId) -> Option<OpImpl> {
    if l != r {
        return None;
    }

    match op {
        _ if l == b.int && op.is_arith() => Some(OpImpl::Native(op, b.int)),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge if l == b.int => Some(OpImpl::Native(op, b.bool)),
        BinOp::Eq | BinOp::Ne if l == b.int || l == b.bool => Some(OpImpl::Native(op, b.bool)),
        BinOp::And | BinOp::Or if l == b.bool => Some(OpImpl::Native(op, b.bool)),
        BinOp::Add if l == b.string => Some(OpImpl::Concat),
        _ => None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b() -> Builtins {
        Builtins {
            object: TypeId(0),
            void: TypeId(1),
            int: TypeId(2),
            bool: TypeId(3),
            string: TypeId(4),
            array: TypeId(5),
        }
    }

    #[test]
    fn operator_table() {
        let b = b();

        assert_eq!(resolve_binop(&b, BinOp::Mul, b.int, b.int), Some(OpImpl::Native(BinOp::Mul, b.int)));
        assert_eq!(resolve_binop(&b, BinOp::Le, b.int, b.int), Some(OpImpl::Native(BinOp::Le, b.bool)));
        assert_eq!(resolve_binop(&b, BinOp::Eq, b.bool, b.bool), Some(OpImpl::Native(BinOp::Eq, b.bool)));
        assert_eq!(resolve_binop(&b, BinOp::Or, b.bool, b.bool), Some(OpImpl::Native(BinOp::Or, b.bool)));
        assert_eq!(resolve_binop(&b, BinOp::Add, b.string, b.string), Some(OpImpl::Concat));

        assert_eq!(resolve_binop(&b, BinOp::Add, b.bool, b.bool), None);
        assert_eq!(resolve_binop(&b, BinOp::Lt, b.bool, b.bool), None);
        assert_eq!(resolve_binop(&b, BinOp::Sub, b.string, b.string), None);
        assert_eq!(resolve_binop(&b, BinOp::Add, b.int, b.string), None);
        assert_eq!(resolve_binop(&b, BinOp::And, b.int, b.int), None);
    }

    #[test]
    fn token_text() {
        for op in [BinOp::Add, BinOp::Rem, BinOp::Ge, BinOp::Ne, BinOp::Or] {
            assert_eq!(BinOp::from_token(op.symbol()), Some(op));
        }
        assert_eq!(BinOp::from_token("<-"), None);
    }
}
