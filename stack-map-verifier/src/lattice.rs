//! The abstract-interpreter value type: a tagged word wide enough to represent everything a
//! verified local variable or stack slot can hold, per `SPEC_FULL.md` §3 ("Lattice Word").
//!
//! Grounded on `rhojvm-base`'s old `stack_map-verifier::types::{FrameType, ComplexFrameType}`
//! pair, which split a value into a cheap primitive tag plus a heap-ish "complex" side table for
//! references. Here the two are folded into one `Copy` enum: reference arity and uninitialized
//! markers are small enough to live inline, so there is no separate complex-type side table to
//! keep in sync.

use verifier_model::{
    code::{
        instruction::{InstructionIndex, NumericType},
        types::{PrimitiveType, ValueType},
    },
    data::class_names::ClassNames,
    id::ClassId,
};

/// One verified value: a primitive, a reference (bare or array, with its declared arity folded
/// into the word so `aaload`/`aastore` don't need a side lookup), or one of the two markers the
/// verifier tracks for `new`/`<init>` sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatticeWord {
    Top,
    Int,
    Float,
    Long,
    Double,
    Null,
    /// A reference to `class_id`, possibly an array. `arity` 0 is a plain object reference;
    /// `arity` n > 0 is an n-dimensional array with `class_id` as element type.
    Reference { class_id: ClassId, arity: u8 },
    /// An array of a primitive element type (`newarray`'s result). Kept distinct from `Reference`
    /// since there is no `class_id` to carry; `arity` is always >= 1.
    BaseArray { element: PrimitiveType, arity: u8 },
    /// The result of a `new` at `site`, before its matching `invokespecial <init>` has run. Two
    /// `new`s at the same PC in different control-flow paths must still compare equal, which is
    /// why this carries the bytecode offset rather than an opaque counter.
    UninitializedNew { site: InstructionIndex },
    /// `this` inside a constructor, before the superclass (or same-class) `<init>` chain call.
    UninitializedThis,
}
impl LatticeWord {
    #[must_use]
    pub fn is_category_2(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    #[must_use]
    pub fn is_reference_ish(self) -> bool {
        matches!(
            self,
            Self::Null
                | Self::Reference { .. }
                | Self::BaseArray { .. }
                | Self::UninitializedNew { .. }
                | Self::UninitializedThis
        )
    }

    /// True for any of the two "not yet safe to use as a real reference" markers.
    #[must_use]
    pub fn is_uninitialized(self) -> bool {
        matches!(self, Self::UninitializedNew { .. } | Self::UninitializedThis)
    }

    /// The value an `athrow`able/`checkcast`able object reference widens to once initialized;
    /// used only for display, since the simulator rejects uninitialized values at most use sites
    /// outright rather than widening them.
    /// Widens a declared descriptor-level type into its abstract-interpreter value. Used at
    /// method entry (parameter types) and wherever the simulator pushes a value whose static
    /// type is already known (field/array accesses, return values).
    #[must_use]
    pub fn from_value_type(ty: ValueType) -> Self {
        match ty {
            ValueType::Primitive(PrimitiveType::Long) => Self::Long,
            ValueType::Primitive(PrimitiveType::Double) => Self::Double,
            ValueType::Primitive(PrimitiveType::Float) => Self::Float,
            ValueType::Primitive(
                PrimitiveType::Byte
                | PrimitiveType::Short
                | PrimitiveType::Int
                | PrimitiveType::Char
                | PrimitiveType::Boolean,
            ) => Self::Int,
            ValueType::Reference { class_id, arity } => Self::Reference { class_id, arity },
        }
    }

    #[must_use]
    pub fn describe(self, class_names: &ClassNames) -> String {
        match self {
            Self::Top => "top".to_owned(),
            Self::Int => "int".to_owned(),
            Self::Float => "float".to_owned(),
            Self::Long => "long".to_owned(),
            Self::Double => "double".to_owned(),
            Self::Null => "null".to_owned(),
            Self::Reference { class_id, arity } => {
                format!("{}{}", "[".repeat(arity as usize), class_names.tpath(class_id))
            }
            Self::BaseArray { element, arity } => {
                format!("{}{}", "[".repeat(arity as usize), primitive_type_name(element))
            }
            Self::UninitializedNew { site } => format!("uninitialized(new @ {site})"),
            Self::UninitializedThis => "uninitialized(this)".to_owned(),
        }
    }
}

fn primitive_type_name(ty: PrimitiveType) -> &'static str {
    match ty {
        PrimitiveType::Byte => "byte",
        PrimitiveType::Short => "short",
        PrimitiveType::Int => "int",
        PrimitiveType::Long => "long",
        PrimitiveType::Float => "float",
        PrimitiveType::Double => "double",
        PrimitiveType::Char => "char",
        PrimitiveType::Boolean => "boolean",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_array_is_reference_ish_and_renders_brackets() {
        let names = ClassNames::new();
        let word = LatticeWord::BaseArray {
            element: PrimitiveType::Int,
            arity: 1,
        };
        assert!(word.is_reference_ish());
        assert!(!word.is_category_2());
        assert_eq!(word.describe(&names), "[int");
    }

    #[test]
    fn category_2_only_for_long_and_double() {
        assert!(LatticeWord::Long.is_category_2());
        assert!(LatticeWord::Double.is_category_2());
        assert!(!LatticeWord::Int.is_category_2());
        assert!(!LatticeWord::Null.is_category_2());
    }

    #[test]
    fn uninitialized_markers_are_reference_ish_but_flagged() {
        let new_marker = LatticeWord::UninitializedNew {
            site: InstructionIndex(4),
        };
        assert!(new_marker.is_reference_ish());
        assert!(new_marker.is_uninitialized());
        assert!(!LatticeWord::Int.is_reference_ish());
    }

    #[test]
    fn describe_renders_array_brackets() {
        let names = ClassNames::new();
        let word = LatticeWord::Reference {
            class_id: names.object_id(),
            arity: 2,
        };
        assert_eq!(word.describe(&names), "[[java/lang/Object");
    }
}
