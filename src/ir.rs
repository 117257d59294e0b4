//! The stack-machine intermediate representation.
//!
//! Every action body lowers to a flat list of [`Instr`]s over an evaluation stack.
//! Each statement leaves the stack as deep as it found it.
//! Control flow uses named labels, numbered by the compilation counter, so labels
//! never collide within one compilation.
//!
//! IR can be generated from an analyzed symbol table with [`gen::lower`]
//! or with the [`gen::IrGen`] struct.

use std::fmt::Display;

use crate::semantic::exec::Literal;
use crate::semantic::ops::BinOp;
use crate::semantic::symbols::{ActnId, SymbolTable, TypeId, VarId, VarKind};

pub mod gen;

/// A branch target.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Label(String);

impl Label {
    /// The label of the alternative after arm `k` of `if` number `n`.
    pub fn else_arm(n: usize, k: usize) -> Self {
        Label(format!("else_{n}_{k}"))
    }
    /// The end of `if` number `n`.
    pub fn endif(n: usize) -> Self {
        Label(format!("endif_{n}"))
    }
    /// The condition check of `while` number `n`.
    pub fn do_loop(n: usize) -> Self {
        Label(format!("do_{n}"))
    }
    /// The exit of `while` number `n`.
    pub fn endwhile(n: usize) -> Self {
        Label(format!("endwhile_{n}"))
    }

    /// The text of the label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stack-machine instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Instr {
    /// Jumps to a label
    Br(Label),
    /// Pops a boolean and jumps if it is false
    BrFalse(Label),
    /// Marks a branch target
    PutLabel(Label),
    /// Discards the top of the stack
    Pop,
    /// Returns (popping the result of a function)
    Ret,
    /// Pushes a constant
    LoadLiteral(Literal),
    /// Pushes a variable (an instance field pops its instance first)
    LoadVar(VarId),
    /// Pushes the address of a local, parameter, or static field
    LoadVarAddr(VarId),
    /// Pops into a variable (an instance field pops its instance after the value)
    StoreVar(VarId),
    /// Pops a length and pushes a new vector of this element type
    NewArray(TypeId),
    /// Pops vector and index, pushes the element
    LoadElem(TypeId),
    /// Pops vector, index, and value, and stores the element
    StoreElem(TypeId),
    /// Pops constructor arguments and pushes a new object
    NewObject(ActnId),
    /// Pops receiver and arguments, pushes the result of a function
    Call {
        /// The callee
        actn: ActnId,
        /// Whether to dispatch virtually
        virt: bool
    },
    /// Pops two operands and pushes the result
    BinOp(BinOp),
    /// Negates the integer on top of the stack
    Neg,
    /// Negates the boolean on top of the stack
    Not,
    /// Boxes the value type on top of the stack
    Box(TypeId),
}

impl Instr {
    /// How much deeper the stack is after this instruction, inside the body of `actn`.
    pub fn stack_delta(&self, table: &SymbolTable, actn: ActnId) -> isize {
        let inst_field = |v: &VarId| matches!(table.var(*v).kind, VarKind::Field { is_static: false, .. });
        let call_delta = |a: &ActnId| {
            let data = table.actn(*a);
            let pops = data.params.len() + usize::from(!data.is_static);
            isize::from(data.ret.is_some()) - pops as isize
        };

        match self {
            Instr::Br(_) | Instr::PutLabel(_) => 0,
            Instr::BrFalse(_) | Instr::Pop => -1,
            Instr::Ret => -isize::from(table.actn(actn).ret.is_some()),
            Instr::LoadLiteral(_) | Instr::LoadVarAddr(_) => 1,
            Instr::LoadVar(v) => if inst_field(v) { 0 } else { 1 },
            Instr::StoreVar(v) => if inst_field(v) { -2 } else { -1 },
            Instr::NewArray(_) | Instr::Neg | Instr::Not | Instr::Box(_) => 0,
            Instr::LoadElem(_) | Instr::BinOp(_) => -1,
            Instr::StoreElem(_) => -3,
            Instr::NewObject(ctor) => 1 - table.actn(*ctor).params.len() as isize,
            Instr::Call { actn, .. } => call_delta(actn),
        }
    }
}
