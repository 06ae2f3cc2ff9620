//! The pre-parsed instruction representation the core consumes. Byte-level class-file decoding
//! (constant-pool resolution, descriptor parsing) is an external collaborator's job per
//! `SPEC_FULL.md` §1; by the time a method reaches the verifier its instructions already carry
//! resolved class ids and descriptors rather than raw constant-pool indices.
//!
//! Grounded in shape on `rhojvm-base::code::op`'s `Inst` enum, but with the class-file-parsing
//! macro system that built it (`define_pop!`/`define_push!`, ~3000 lines) replaced by a plain enum
//! sized to what the simulator in `stack-map-verifier` actually needs to drive per `SPEC_FULL.md`
//! §4.7's action list.

use super::types::{MethodDescriptor, PrimitiveType, ValueType};
use crate::id::ClassId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstructionIndex(pub u16);
impl InstructionIndex {
    #[must_use]
    pub fn checked_add_signed(self, delta: i32) -> Option<InstructionIndex> {
        let pc = i64::from(self.0) + i64::from(delta);
        u16::try_from(pc).ok().map(InstructionIndex)
    }
}
impl std::fmt::Display for InstructionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericType {
    Int,
    Long,
    Float,
    Double,
}
impl NumericType {
    #[must_use]
    pub fn is_category_2(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    #[must_use]
    pub fn value_type(self) -> ValueType {
        ValueType::Primitive(match self {
            Self::Int => PrimitiveType::Int,
            Self::Long => PrimitiveType::Long,
            Self::Float => PrimitiveType::Float,
            Self::Double => PrimitiveType::Double,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCond {
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LdcValue {
    Int(i32),
    Float(i32),
    Long(i64),
    Double(i64),
    /// A `java/lang/String` instance, a resolved `Class` constant, or a method handle/type; all
    /// that matters to the verifier is the resulting reference's class id.
    Reference(ClassId),
}
impl LdcValue {
    #[must_use]
    pub fn is_category_2(self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }
}

#[derive(Debug, Clone)]
pub struct MethodRef {
    pub owner: ClassId,
    pub name_is_init: bool,
    pub descriptor: MethodDescriptor,
    pub is_interface: bool,
}

#[derive(Debug, Clone)]
pub enum Instruction {
    Nop,
    ConstNull,
    ConstInt(i32),
    ConstLong(i64),
    ConstFloat(f32),
    ConstDouble(f64),
    Ldc(LdcValue),
    Load { ty: ValueType, index: u16 },
    Store { ty: ValueType, index: u16 },
    IInc { index: u16, amount: i32 },
    ArrayLoad(ValueType),
    ArrayStore(ValueType),
    ArrayLength,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    Arithmetic { op: ArithOp, ty: NumericType },
    Neg(NumericType),
    Convert { from: NumericType, to: NumericType },
    /// `lcmp`/`fcmpl`/`fcmpg`/`dcmpl`/`dcmpg`. `nan_is_greater` is only meaningful for
    /// float/double comparisons (`g` variants treat NaN as greater than anything, `l` variants
    /// as less).
    Compare {
        ty: NumericType,
        nan_is_greater: Option<bool>,
    },
    IfZero { cond: Cond, target: InstructionIndex },
    IfIntCompare { cond: Cond, target: InstructionIndex },
    IfRefCompare { cond: RefCond, target: InstructionIndex },
    IfNull { target: InstructionIndex },
    IfNonNull { target: InstructionIndex },
    Goto(InstructionIndex),
    TableSwitch {
        default: InstructionIndex,
        low: i32,
        high: i32,
        targets: Vec<InstructionIndex>,
    },
    LookupSwitch {
        default: InstructionIndex,
        pairs: Vec<(i32, InstructionIndex)>,
    },
    Return(Option<ValueType>),
    GetStatic(ValueType),
    PutStatic(ValueType),
    GetField(ValueType),
    PutField(ValueType),
    InvokeVirtual(MethodRef),
    InvokeSpecial(MethodRef),
    InvokeStatic(MethodRef),
    InvokeInterface(MethodRef),
    InvokeDynamic(MethodDescriptor),
    New { class_id: ClassId },
    NewArray { element: PrimitiveType },
    ANewArray { class_id: ClassId },
    MultiANewArray { class_id: ClassId, dimensions: u8 },
    AThrow,
    CheckCast { class_id: ClassId },
    InstanceOf { class_id: ClassId },
    MonitorEnter,
    MonitorExit,
    /// An opcode the decode table has no action for. Legal encodings we have not modeled (e.g.
    /// `jsr`/`ret`, removed since Java 7) land here rather than being silently skipped; the
    /// branch-map builder and simulator both treat this the same as a genuinely unknown opcode.
    Unimplemented { opcode: u8 },
}
impl Instruction {
    /// Size in bytes this instruction occupies in the original bytecode stream, used by the
    /// branch-map builder to advance the PC. `tableswitch`/`lookupswitch` sizes depend on their
    /// padding and table length and so cannot be computed from the variant alone; callers that
    /// need exact sizes reconstruct them from the method's instruction list positions instead of
    /// calling this for those two variants.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Self::IfZero { .. }
                | Self::IfIntCompare { .. }
                | Self::IfRefCompare { .. }
                | Self::IfNull { .. }
                | Self::IfNonNull { .. }
                | Self::Goto(_)
                | Self::TableSwitch { .. }
                | Self::LookupSwitch { .. }
        )
    }

    #[must_use]
    pub fn is_unconditional_end_of_block(&self) -> bool {
        matches!(
            self,
            Self::Goto(_)
                | Self::Return(_)
                | Self::AThrow
                | Self::TableSwitch { .. }
                | Self::LookupSwitch { .. }
        )
    }
}
