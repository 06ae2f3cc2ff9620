//! Small value-type vocabulary shared between a method's pre-parsed instructions and the
//! verifier's lattice. Trimmed down from `rhojvm-base`'s much larger `PrimitiveType`/`ComplexType`
//! system: the core only needs to know a value's JVM category (1 or 2 slots) and, for references,
//! a class id and array arity — everything else in the old `op.rs` type machinery existed to
//! drive class-file-level codegen concerns that are out of scope here.

use crate::id::ClassId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Boolean,
}
impl PrimitiveType {
    /// Long and double occupy two stack/local slots; everything else occupies one.
    #[must_use]
    pub fn is_category_2(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }
}

/// A local variable or operand-stack value's descriptor-level type, as it appears in a method
/// signature or a `new`/array instruction. Distinct from the lattice's `LatticeWord` (which also
/// has to represent `top`, `null`, and the two uninitialized markers): this type is only ever
/// used to describe *declared* shapes (parameters, return types, array element types), never
/// abstract-interpreter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Primitive(PrimitiveType),
    /// `arity` 0 is a plain reference; `arity` n is an n-dimensional array of `class_id`.
    Reference { class_id: ClassId, arity: u8 },
}
impl ValueType {
    #[must_use]
    pub fn is_category_2(self) -> bool {
        matches!(self, Self::Primitive(p) if p.is_category_2())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MethodDescriptor {
    pub parameters: Vec<ValueType>,
    pub return_type: Option<ValueType>,
}
impl MethodDescriptor {
    /// Number of operand-stack slots the parameters occupy, counting category-2 types twice.
    /// Does not include the receiver (`this`); callers add one slot themselves for non-static
    /// invocations.
    #[must_use]
    pub fn parameter_slot_count(&self) -> usize {
        self.parameters
            .iter()
            .map(|p| if p.is_category_2() { 2 } else { 1 })
            .sum()
    }
}
