//! Typed execution nodes: the resolved form of statements and expressions.
//!
//! Statements are [`Exec`]s and operands are [`Value`]s.
//! Each value knows its type, so the IR generator never needs the symbol table
//! to decide what to emit.

use super::ops::BinOp;
use super::symbols::{ActnId, SymbolTable, TypeId, VarId};

/// A constant.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Literal {
    /// `System.Int32` constant
    Int(i32),
    /// `System.String` constant (escapes resolved)
    Str(String),
    /// `System.Boolean` constant
    Bool(bool),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(i)  => write!(f, "{i}"),
            Literal::Str(s)  => write!(f, "{s:?}"),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A resolved call.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Call {
    /// The callee
    pub actn: ActnId,
    /// The receiver of an instance call
    pub inst: Option<Box<Value>>,
    /// Arguments, already boxed where needed
    pub args: Vec<Value>,
    /// Whether to dispatch virtually
    pub virt: bool,
    /// Return type (`None` for actions)
    pub ret: Option<TypeId>,
}

/// A typed operand.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Value {
    /// Type of the value
    pub ty: TypeId,
    /// How the value is computed
    pub kind: ValueKind,
}

/// How a value is computed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ValueKind {
    /// A constant
    Literal(Literal),
    /// Reads a variable (an instance field reads from `inst`)
    Load(VarId, Option<Box<Value>>),
    /// The address of a local, parameter, or static field
    Addr(VarId),
    /// Stores a value in a temporary and takes its address
    Spill(VarId, Box<Value>),
    /// The result of a call
    Call(Box<Call>),
    /// Creates an object with a constructor
    New(ActnId, Vec<Value>),
    /// Creates a vector with a length
    NewArray(TypeId, Box<Value>),
    /// Reads an element of a vector
    LoadElem(Box<Value>, Box<Value>),
    /// A binary operation
    Calc(BinOp, Box<Value>, Box<Value>),
    /// Integer negation
    Neg(Box<Value>),
    /// Logical negation
    Not(Box<Value>),
    /// Boxes a value type
    Box(Box<Value>),
    /// Runs stores, then produces a value (assignment used as a value)
    Assigned(Vec<Exec>, Box<Value>),
}

impl Value {
    /// Creates a new value.
    pub fn new(ty: TypeId, kind: ValueKind) -> Self {
        Value { ty, kind }
    }

    /// Whether computing this value twice is unobservable.
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            ValueKind::Literal(_) | ValueKind::Addr(_) => true,
            ValueKind::Load(_, inst) => inst.as_deref().map_or(true, Value::is_pure),
            _ => false,
        }
    }

    /// Visits every type this value mentions, including the owners of called actions.
    pub fn visit_types(&self, table: &SymbolTable, f: &mut impl FnMut(TypeId)) {
        f(self.ty);
        match &self.kind {
            ValueKind::Literal(_) | ValueKind::Addr(_) => {},
            ValueKind::Load(_, inst) => inst.iter().for_each(|v| v.visit_types(table, f)),
            ValueKind::Spill(_, v)
            | ValueKind::Neg(v)
            | ValueKind::Not(v)
            | ValueKind::Box(v) => v.visit_types(table, f),
            ValueKind::Call(c) => c.visit_types(table, f),
            ValueKind::New(ctor, args) => {
                f(table.actn(*ctor).owner);
                args.iter().for_each(|v| v.visit_types(table, f));
            },
            ValueKind::NewArray(t, len) => {
                f(*t);
                len.visit_types(table, f);
            },
            ValueKind::LoadElem(a, b) | ValueKind::Calc(_, a, b) => {
                a.visit_types(table, f);
                b.visit_types(table, f);
            },
            ValueKind::Assigned(execs, v) => {
                execs.iter().for_each(|e| e.visit_types(table, f));
                v.visit_types(table, f);
            },
        }
    }
}

impl Call {
    fn visit_types(&self, table: &SymbolTable, f: &mut impl FnMut(TypeId)) {
        f(table.actn(self.actn).owner);
        self.inst.iter().for_each(|v| v.visit_types(table, f));
        self.args.iter().for_each(|v| v.visit_types(table, f));
        if let Some(r) = self.ret {
            f(r);
        }
    }
}

/// One alternative of an `if` statement.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Arm {
    /// Boolean condition
    pub cond: Value,
    /// Statements run when the condition holds
    pub body: Vec<Exec>,
}

/// A resolved statement.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Exec {
    /// Evaluates a value and discards it
    Eval(Value),
    /// Calls an action or function (a function's result is discarded)
    Call(Call),
    /// Stores into a variable (an instance field stores into `inst`)
    Store {
        /// Target
        var: VarId,
        /// Instance owning the field
        inst: Option<Value>,
        /// Stored value
        value: Value
    },
    /// Stores into an element of a vector
    StoreElem {
        /// The vector
        array: Value,
        /// Element index
        index: Value,
        /// Stored value
        value: Value
    },
    /// Conditional with numbered labels
    If {
        /// Label number
        id: usize,
        /// `if` and `elif` alternatives
        arms: Vec<Arm>,
        /// `else` body
        otherwise: Option<Vec<Exec>>
    },
    /// Loop with numbered labels
    While {
        /// Label number
        id: usize,
        /// Boolean condition
        cond: Value,
        /// Loop body
        body: Vec<Exec>
    },
    /// Returns from the action
    Return(Option<Value>),
    /// Leaves the loop with this label number
    Break(usize),
    /// Restarts the loop with this label number
    Continue(usize),
}

impl Exec {
    /// Whether running this statement always ends in a return.
    pub fn returns(&self) -> bool {
        match self {
            Exec::Return(_) => true,
            Exec::If { arms, otherwise: Some(other), .. } => {
                arms.iter().all(|a| returns(&a.body)) && returns(other)
            },
            _ => false,
        }
    }

    /// Visits every type this statement mentions, including the owners of called actions.
    pub fn visit_types(&self, table: &SymbolTable, f: &mut impl FnMut(TypeId)) {
        match self {
            Exec::Eval(v) => v.visit_types(table, f),
            Exec::Call(c) => c.visit_types(table, f),
            Exec::Store { inst, value, .. } => {
                inst.iter().for_each(|v| v.visit_types(table, f));
                value.visit_types(table, f);
            },
            Exec::StoreElem { array, index, value } => {
                array.visit_types(table, f);
                index.visit_types(table, f);
                value.visit_types(table, f);
            },
            Exec::If { arms, otherwise, .. } => {
                for arm in arms {
                    arm.cond.visit_types(table, f);
                    arm.body.iter().for_each(|e| e.visit_types(table, f));
                }
                otherwise.iter().flatten().for_each(|e| e.visit_types(table, f));
            },
            Exec::While { cond, body, .. } => {
                cond.visit_types(table, f);
                body.iter().for_each(|e| e.visit_types(table, f));
            },
            Exec::Return(v) => v.iter().for_each(|v| v.visit_types(table, f)),
            Exec::Break(_) | Exec::Continue(_) => {},
        }
    }
}

/// Whether a statement sequence always ends in a return.
///
/// This holds if any of its statements does.
pub fn returns(execs: &[Exec]) -> bool {
    execs.iter().any(Exec::returns)
}
