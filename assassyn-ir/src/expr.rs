//! Dataflow expressions: every non-constant value in the IR is the result
//! of exactly one `Expr`, tagged with the module it was built in and the
//! predicate frame active at construction time.

use crate::array::ArrayRef;
use crate::common::{rrc, RRC, WRC};
use crate::module::ModuleWeak;
use crate::port::PortRef;
use crate::types::DType;
use crate::value::Value;
use assassyn_utils::Id;

/// Binary arithmetic/logic opcode. Operand ordering for non-commutative
/// ops (`Sub`, `Shl`, `Shr`, comparisons) is left-then-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    ZeroExtend,
    SignExtend,
    Truncate,
    Bitcast,
}

/// The operation an expression performs. Operand positions are documented
/// per variant rather than enforced by a separate instruction hierarchy.
#[derive(Debug, Clone)]
pub enum Opcode {
    Binary { op: BinOp, lhs: Value, rhs: Value },
    Unary { op: UnaryOp, operand: Value },
    /// Inclusive bit range `[lo, hi]` of `operand`.
    Slice { operand: Value, lo: u64, hi: u64 },
    Concat { parts: Vec<Value> },
    Cast { op: CastOp, operand: Value, to: DType },
    Select { cond: Value, then_value: Value, else_value: Value },
    /// Reads the current contents of `array[index]`. Two array reads with
    /// the same array and index under the same predicate frame in the
    /// same module share one `Expr` (see `Builder::array_read`).
    ArrayRead { array: ArrayRef, index: Value },
    /// Schedules a write of `value` into `array[index]`, effective at the
    /// start of the next cycle.
    ArrayWrite { array: ArrayRef, index: Value, value: Value },
    /// Enqueues `value` onto `port`'s FIFO; `depth_hint` is an explicit
    /// depth declared at this push site, if any.
    FifoPush { port: PortRef, value: Value, depth_hint: Option<u64> },
    /// Dequeues the head of `port`'s FIFO.
    FifoPop { port: PortRef },
    /// True when `port`'s FIFO is non-empty.
    FifoValid { port: PortRef },
    /// Triggers an async call into `callee`, incrementing its credit
    /// counter by one; `args` are pushed to the callee's ports in order.
    AsyncCall { callee: ModuleWeak, args: Vec<Value> },
    /// Formats `args` per `fmt` and emits them through the simulation
    /// log sink. `fmt` uses `{}`-style placeholders, lowered to
    /// `%d`/`%x`/`%b`/`%o`/`%s` by the backend according to each
    /// argument's declared type.
    Log { fmt: String, args: Vec<Value> },
    /// Terminates the simulation after the current cycle completes.
    Finish,
    /// Reads a record field out of a packed value.
    FieldExtract { operand: Value, field: Id },
}

pub struct ExprData {
    name: Option<Id>,
    ty: DType,
    opcode: Opcode,
    /// The module this expression was constructed in.
    parent: ModuleWeak,
    /// The predicate active when this expression was constructed, as a
    /// boolean `Value` (`None` means unconditional / top-level predicate).
    meta_cond: Option<Value>,
}

impl ExprData {
    pub fn new(ty: DType, opcode: Opcode, parent: ModuleWeak, meta_cond: Option<Value>) -> Self {
        ExprData {
            name: None,
            ty,
            opcode,
            parent,
            meta_cond,
        }
    }

    pub fn name(&self) -> Option<Id> {
        self.name
    }

    pub fn set_name(&mut self, name: Id) {
        self.name = Some(name);
    }

    pub fn ty(&self) -> &DType {
        &self.ty
    }

    pub fn opcode(&self) -> &Opcode {
        &self.opcode
    }

    pub fn parent(&self) -> RRC<crate::module::Module> {
        self.parent.upgrade().expect("expr has no owning module")
    }

    pub fn meta_cond(&self) -> Option<&Value> {
        self.meta_cond.as_ref()
    }
}

impl std::fmt::Debug for ExprData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExprData")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("opcode", &self.opcode)
            .finish()
    }
}

pub type ExprRef = RRC<ExprData>;
pub type ExprWeak = WRC<ExprData>;

pub fn new_expr(
    ty: DType,
    opcode: Opcode,
    parent: ModuleWeak,
    meta_cond: Option<Value>,
) -> ExprRef {
    rrc(ExprData::new(ty, opcode, parent, meta_cond))
}
