//! Stack-map decompressor (`SPEC_FULL.md` §4.4): expands the class file's delta-encoded
//! `StackMapTable` entries into one populated `Frame` per branch target.
//!
//! Grounded on the teacher's deleted `rhojvm_base::code::stack_map` decoder (`SameLocals1Stack`,
//! `Chop`, `Append`, `Full` handling) and `bcverify.c`'s `decompressStackMaps`/`parseElement`. The
//! input here is `RawStackMapFrame`, a local type with the same tag-range shape as the class-file
//! attribute (§4.4's table) rather than a third-party parser's type: this crate's pre-parsed-input
//! boundary (`SPEC_FULL.md` §1) means whatever sits above it has already turned the raw
//! `StackMapTable` bytes into this shape, the same way `CodeInfo` arrives pre-decoded instead of
//! as a byte slice.
//!
//! Every offset computation here is checked, fixing the teacher's own "TODO: checked sub" on the
//! chop-count arithmetic.

use verifier_model::{code::instruction::InstructionIndex, id::ClassId};

use crate::{
    error::DecompressError,
    frame::{Frame, FrameStore},
    lattice::LatticeWord,
};

/// One decoded locals/stack element, prior to wide-type expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawVerificationType {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    Object { class_id: ClassId },
    Uninitialized { new_site: InstructionIndex },
}
impl RawVerificationType {
    fn to_lattice_word(self) -> LatticeWord {
        match self {
            Self::Top => LatticeWord::Top,
            Self::Integer => LatticeWord::Int,
            Self::Float => LatticeWord::Float,
            Self::Long => LatticeWord::Long,
            Self::Double => LatticeWord::Double,
            Self::Null => LatticeWord::Null,
            Self::UninitializedThis => LatticeWord::UninitializedThis,
            Self::Object { class_id } => LatticeWord::Reference { class_id, arity: 0 },
            Self::Uninitialized { new_site } => LatticeWord::UninitializedNew { site: new_site },
        }
    }

    fn is_category_2(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }
}

/// One delta-encoded `StackMapTable` entry, tagged per `SPEC_FULL.md` §4.4's table. `offset_delta`
/// is the gap to the next frame's PC, already including the "+1 for all but the first frame" rule
/// class files apply; callers hand this decompressor PCs it can use directly.
#[derive(Debug, Clone)]
pub enum RawStackMapFrame {
    Same { offset_delta: u16 },
    SameLocals1Stack { offset_delta: u16, stack: RawVerificationType },
    Chop { offset_delta: u16, count: u8 },
    SameExtended { offset_delta: u16 },
    Append { offset_delta: u16, locals: Vec<RawVerificationType> },
    Full {
        offset_delta: u16,
        locals: Vec<RawVerificationType>,
        stack: Vec<RawVerificationType>,
    },
}

fn expand_wide(types: &[RawVerificationType]) -> Vec<LatticeWord> {
    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        out.push(ty.to_lattice_word());
        if ty.is_category_2() {
            out.push(LatticeWord::Top);
        }
    }
    out
}

/// Drops the last `count` *logical* locals from `locals`, accounting for the fact that a
/// long/double occupies two physical slots (the trailing `top`). Returns the new physical length.
fn chop_locals(locals: &[LatticeWord], count: u8, pc: InstructionIndex) -> Result<usize, DecompressError> {
    let mut remaining = locals.len();
    let mut to_drop = u32::from(count);
    while to_drop > 0 {
        remaining = remaining
            .checked_sub(1)
            .ok_or(DecompressError::FrameLocalsUnderflow { pc, attempted_chop: usize::from(count) })?;
        if matches!(locals.get(remaining), Some(LatticeWord::Top))
            && remaining > 0
            && matches!(locals[remaining - 1], LatticeWord::Long | LatticeWord::Double)
        {
            remaining = remaining
                .checked_sub(1)
                .ok_or(DecompressError::FrameLocalsUnderflow { pc, attempted_chop: usize::from(count) })?;
        }
        to_drop = to_drop
            .checked_sub(1)
            .expect("loop guard keeps to_drop positive");
    }
    Ok(remaining)
}

/// Decompresses one method's full list of raw frames into populated store entries, in ascending
/// PC order. `max_locals`/`max_stack` bound every frame for overflow checking; `is_init_method`
/// seeds locals\[0\] with `UninitializedThis` for a constructor's implicit frame at PC 0 (callers
/// handle PC 0 separately — this function only processes explicit table entries).
pub fn decompress(
    raw_frames: &[RawStackMapFrame],
    start_pc: InstructionIndex,
    initial_locals: &[LatticeWord],
    max_locals: u16,
    max_stack: u16,
    store: &mut FrameStore,
    mut index_of: impl FnMut(InstructionIndex) -> Option<crate::frame::FrameIndex>,
) -> Result<(), DecompressError> {
    let mut pc = start_pc;
    let mut locals: Vec<LatticeWord> = initial_locals.to_vec();

    for raw in raw_frames {
        let offset_delta = match raw {
            RawStackMapFrame::Same { offset_delta }
            | RawStackMapFrame::SameLocals1Stack { offset_delta, .. }
            | RawStackMapFrame::Chop { offset_delta, .. }
            | RawStackMapFrame::SameExtended { offset_delta }
            | RawStackMapFrame::Append { offset_delta, .. }
            | RawStackMapFrame::Full { offset_delta, .. } => *offset_delta,
        };

        pc = pc
            .checked_add_signed(i32::from(offset_delta))
            .ok_or(DecompressError::TargetOutOfBounds { pc })?;

        let mut stack = Vec::new();
        match raw {
            RawStackMapFrame::Same { .. } => {}
            RawStackMapFrame::SameExtended { .. } => {}
            RawStackMapFrame::SameLocals1Stack { stack: item, .. } => {
                stack = expand_wide(std::slice::from_ref(item));
            }
            RawStackMapFrame::Chop { count, .. } => {
                let new_len = chop_locals(&locals, *count, pc)?;
                locals.truncate(new_len);
            }
            RawStackMapFrame::Append { locals: appended, .. } => {
                let expanded = expand_wide(appended);
                if locals.len() + expanded.len() > usize::from(max_locals) {
                    return Err(DecompressError::FrameLocalsOverflow { pc, max_locals });
                }
                locals.extend(expanded);
            }
            RawStackMapFrame::Full {
                locals: new_locals,
                stack: new_stack,
                ..
            } => {
                locals = expand_wide(new_locals);
                if locals.len() > usize::from(max_locals) {
                    return Err(DecompressError::FrameLocalsOverflow { pc, max_locals });
                }
                stack = expand_wide(new_stack);
            }
        }

        if stack.len() > usize::from(max_stack) {
            return Err(DecompressError::FrameStackOverflow { pc, max_stack });
        }

        let index = index_of(pc).ok_or(DecompressError::TargetOutOfBounds { pc })?;
        let mut frame = Frame::new_unreached(pc, max_locals);
        frame.set_locals(locals.clone());
        for word in &stack {
            frame.push_raw(*word);
        }
        store.set(index, frame);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameIndex;

    fn store_with(pcs: &[u16]) -> (FrameStore, Vec<(InstructionIndex, FrameIndex)>) {
        let mut store = FrameStore::with_capacity(pcs.len());
        let mut table = Vec::new();
        for &pc in pcs {
            let idx = store.reserve(InstructionIndex(pc));
            table.push((InstructionIndex(pc), idx));
        }
        (store, table)
    }

    #[test]
    fn same_frame_copies_locals_forward_with_empty_stack() {
        let (mut store, table) = store_with(&[5]);
        let raw = vec![RawStackMapFrame::Same { offset_delta: 5 }];
        decompress(&raw, InstructionIndex(0), &[], 4, 4, &mut store, |pc| {
            table.iter().find(|(p, _)| *p == pc).map(|(_, i)| *i)
        })
        .unwrap();
        let frame = store.get(table[0].1).unwrap();
        assert!(frame.stack().is_empty());
    }

    #[test]
    fn append_expands_wide_locals_with_trailing_top() {
        let (mut store, table) = store_with(&[3]);
        let raw = vec![RawStackMapFrame::Append {
            offset_delta: 3,
            locals: vec![RawVerificationType::Long],
        }];
        decompress(&raw, InstructionIndex(0), &[], 2, 4, &mut store, |pc| {
            table.iter().find(|(p, _)| *p == pc).map(|(_, i)| *i)
        })
        .unwrap();
        let frame = store.get(table[0].1).unwrap();
        assert_eq!(frame.locals(), &[LatticeWord::Long, LatticeWord::Top]);
    }

    #[test]
    fn chop_drops_wide_local_pair_together() {
        let locals = vec![LatticeWord::Int, LatticeWord::Long, LatticeWord::Top];
        let remaining = chop_locals(&locals, 1, InstructionIndex(0)).unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn chop_underflow_is_an_error() {
        let locals = vec![LatticeWord::Int];
        assert_eq!(
            chop_locals(&locals, 2, InstructionIndex(7)),
            Err(DecompressError::FrameLocalsUnderflow { pc: InstructionIndex(7), attempted_chop: 2 })
        );
    }

    #[test]
    fn stack_overflow_is_rejected() {
        let (mut store, table) = store_with(&[1]);
        let raw = vec![RawStackMapFrame::Full {
            offset_delta: 1,
            locals: vec![],
            stack: vec![RawVerificationType::Integer, RawVerificationType::Integer],
        }];
        let result = decompress(&raw, InstructionIndex(0), &[], 4, 1, &mut store, |pc| {
            table.iter().find(|(p, _)| *p == pc).map(|(_, i)| *i)
        });
        assert_eq!(result, Err(DecompressError::FrameStackOverflow { pc: InstructionIndex(1), max_stack: 1 }));
    }
}
