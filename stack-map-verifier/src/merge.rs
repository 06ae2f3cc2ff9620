//! Frame merger and object-type merger (`SPEC_FULL.md` §4.5, §4.6).
//!
//! Grounded on `bcverify.c`'s `mergeStacks`/`mergeObjectTypes`: the original crashes the host
//! process on a stack-depth mismatch at a join point as a debugging aid. Per `SPEC_FULL.md` §9's
//! resolution this reimplementation always returns `MergeError::DepthMismatch` instead.

use verifier_model::{
    code::instruction::InstructionIndex,
    data::{
        class_names::ClassNames,
        classes::{ClassHierarchy, ClassLookupError},
    },
    id::ClassId,
};

use crate::{
    branch_map::{BytecodeMap, PcFlags},
    error::MergeError,
    frame::{Frame, FrameIndex, FrameStore},
    lattice::LatticeWord,
    queue::WorkQueues,
};

/// Walks `class_id`'s superclass chain, which per `SPEC_FULL.md` §4.6 MUST terminate at `Object`.
fn superclass_depth(hierarchy: &impl ClassHierarchy, names: &ClassNames, mut class_id: ClassId) -> Result<u32, ClassLookupError> {
    let mut depth = 0;
    while let Some(super_id) = hierarchy.super_class_of(names, class_id)? {
        class_id = super_id;
        depth += 1;
    }
    Ok(depth)
}

/// `mergeObjectTypes`: the least-upper-bound of two reference lattice words, writing the result
/// into `target` in place and reporting whether anything changed (callers use this to decide
/// whether to flag the owning frame for re-walk).
pub fn merge_object_types(
    hierarchy: &impl ClassHierarchy,
    names: &mut ClassNames,
    source: LatticeWord,
    target: &mut LatticeWord,
) -> Result<bool, MergeError> {
    if source == *target {
        return Ok(false);
    }

    if *target == LatticeWord::Null {
        *target = source;
        return Ok(true);
    }
    if source == LatticeWord::Null {
        return Ok(false);
    }

    let source_arity = match source {
        LatticeWord::Reference { arity, .. } | LatticeWord::BaseArray { arity, .. } => arity,
        _ => return Err(MergeError::DepthMismatch { pc: InstructionIndex(0), expected: 0, found: 0 }),
    };
    let target_arity = match *target {
        LatticeWord::Reference { arity, .. } | LatticeWord::BaseArray { arity, .. } => arity,
        _ => return Err(MergeError::DepthMismatch { pc: InstructionIndex(0), expected: 0, found: 0 }),
    };

    // A base-type array on either side, or mismatched arities, decays the join to `Object` of the
    // common arity: there is no element type both sides agree on otherwise.
    let both_object_references = matches!(source, LatticeWord::Reference { .. }) && matches!(*target, LatticeWord::Reference { .. });
    if source_arity != target_arity || !both_object_references {
        *target = LatticeWord::Reference {
            class_id: names.object_id(),
            arity: source_arity.min(target_arity),
        };
        return Ok(true);
    }

    let (LatticeWord::Reference { class_id: source_id, .. }, LatticeWord::Reference { class_id: target_id, .. }) = (source, *target) else {
        unreachable!("both_object_references checked above")
    };

    if is_class_compatible(hierarchy, names, source_id, target_id)? {
        return Ok(false);
    }

    let meet = meet_class(hierarchy, names, source_id, target_id)?;
    *target = LatticeWord::Reference {
        class_id: meet,
        arity: source_arity,
    };
    Ok(true)
}

/// `source <= target` in the class-hierarchy lattice: `source` is `target` or one of its
/// subclasses/implementors.
fn is_class_compatible(
    hierarchy: &impl ClassHierarchy,
    names: &ClassNames,
    source_id: ClassId,
    target_id: ClassId,
) -> Result<bool, MergeError> {
    if source_id == target_id || target_id == names.object_id() {
        return Ok(true);
    }
    if hierarchy.is_interface(names, target_id)? {
        return Ok(hierarchy.implements_interface(names, source_id, target_id)?);
    }
    Ok(verifier_model::data::classes::is_super_class(hierarchy, names, source_id, target_id)?)
}

/// Walks both class names' superclass chains in lockstep, bringing the deeper one up first, until
/// they meet. The meet always exists because every chain terminates at `Object`.
fn meet_class(
    hierarchy: &impl ClassHierarchy,
    names: &mut ClassNames,
    mut a: ClassId,
    mut b: ClassId,
) -> Result<ClassId, MergeError> {
    let mut depth_a = superclass_depth(hierarchy, names, a)?;
    let mut depth_b = superclass_depth(hierarchy, names, b)?;

    while depth_a > depth_b {
        a = hierarchy
            .super_class_of(names, a)?
            .expect("superclass chain terminates at Object, not before");
        depth_a -= 1;
    }
    while depth_b > depth_a {
        b = hierarchy
            .super_class_of(names, b)?
            .expect("superclass chain terminates at Object, not before");
        depth_b -= 1;
    }

    while a != b {
        a = hierarchy
            .super_class_of(names, a)?
            .expect("superclass chain terminates at Object, not before");
        b = hierarchy
            .super_class_of(names, b)?
            .expect("superclass chain terminates at Object, not before");
    }

    Ok(a)
}

/// Outcome of merging the live frame into a stored target frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Target was unreached; the live frame was copied in and the target queued as unwalked.
    FirstReach,
    /// Target already had a frame; it may or may not have changed as a result.
    Merged { changed: bool },
}

/// `mergeStacks(targetPC)`: unifies `live` into the frame stored at `target_index`/`target_pc`.
#[allow(clippy::too_many_arguments)]
pub fn merge_stacks(
    hierarchy: &impl ClassHierarchy,
    names: &mut ClassNames,
    store: &mut FrameStore,
    map: &mut BytecodeMap,
    queues: &mut WorkQueues,
    target_index: FrameIndex,
    target_pc: InstructionIndex,
    live: &Frame,
) -> Result<MergeOutcome, MergeError> {
    if store.get(target_index).is_none() {
        let mut copy = live.clone();
        copy.pc = target_pc;
        store.set(target_index, copy);
        queues.enqueue_unwalked(map, target_pc);
        return Ok(MergeOutcome::FirstReach);
    }

    let live_depth = live.stack_depth();
    {
        let target = store.get(target_index).expect("checked above");
        if target.stack_depth() != live_depth {
            return Err(MergeError::DepthMismatch {
                pc: target_pc,
                expected: target.stack_depth(),
                found: live_depth,
            });
        }
    }

    let mut changed = false;
    let local_count = live.locals().len();

    for i in 0..local_count {
        let live_word = live.local(i);
        let target_word = store.get(target_index).expect("checked above").local(i);
        let merged = merge_slot(hierarchy, names, live_word, target_word)?;
        if merged != target_word {
            store.get_mut(target_index).as_mut().expect("checked above").set_local(i, merged);
            changed = true;
        }
    }

    for i in 0..live_depth {
        let live_word = live.stack()[i];
        let target_word = store.get(target_index).expect("checked above").stack()[i];
        let merged = merge_stack_slot(hierarchy, names, live_word, target_word)?;
        if merged != target_word {
            let frame = store.get_mut(target_index).as_mut().expect("checked above");
            let base = frame.locals().len();
            frame.set_local(base + i, merged);
            changed = true;
        }
    }

    if changed {
        queues.enqueue_rewalk(map, target_pc);
    }

    Ok(MergeOutcome::Merged { changed })
}

/// Local-slot merge rule (`SPEC_FULL.md` §4.5 step 3's local bullet): primitives that differ decay
/// to `top`; references go through the object-type merger, with `null` absorbed by whichever side
/// already has a concrete reference.
fn merge_slot(
    hierarchy: &impl ClassHierarchy,
    names: &mut ClassNames,
    source: LatticeWord,
    mut target: LatticeWord,
) -> Result<LatticeWord, MergeError> {
    if source == target {
        return Ok(target);
    }

    if !source.is_reference_ish() || !target.is_reference_ish() {
        return Ok(LatticeWord::Top);
    }

    merge_object_types(hierarchy, names, source, &mut target)?;
    Ok(target)
}

/// Operand-stack merge rule: always the object-type merger, no `top`-decay path, since an operand
/// stack slot's shape at a join point is already guaranteed primitive-vs-primitive or
/// reference-vs-reference by `SPEC_FULL.md`'s depth-mismatch check upstream.
fn merge_stack_slot(
    hierarchy: &impl ClassHierarchy,
    names: &mut ClassNames,
    source: LatticeWord,
    mut target: LatticeWord,
) -> Result<LatticeWord, MergeError> {
    if !source.is_reference_ish() || !target.is_reference_ish() {
        return Ok(if source == target { target } else { LatticeWord::Top });
    }
    merge_object_types(hierarchy, names, source, &mut target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use verifier_model::{code::CodeInfo, code::Instruction, data::classes::{ClassRecord, Classes}};

    fn fixture() -> (ClassNames, Classes) {
        let mut names = ClassNames::new();
        let mut classes = Classes::new();
        classes.insert(names.object_id(), ClassRecord::default());
        let runtime_exception = names.gcid_from_bytes(b"java/lang/RuntimeException");
        classes.insert(
            runtime_exception,
            ClassRecord {
                super_class: Some(names.object_id()),
                ..ClassRecord::default()
            },
        );
        let illegal_state = names.gcid_from_bytes(b"java/lang/IllegalStateException");
        classes.insert(
            illegal_state,
            ClassRecord {
                super_class: Some(runtime_exception),
                ..ClassRecord::default()
            },
        );
        let illegal_arg = names.gcid_from_bytes(b"java/lang/IllegalArgumentException");
        classes.insert(
            illegal_arg,
            ClassRecord {
                super_class: Some(runtime_exception),
                ..ClassRecord::default()
            },
        );
        (names, classes)
    }

    #[test]
    fn object_merge_of_sibling_exceptions_meets_at_runtime_exception() {
        let (mut names, classes) = fixture();
        let illegal_state = names.gcid_from_bytes(b"java/lang/IllegalStateException");
        let illegal_arg = names.gcid_from_bytes(b"java/lang/IllegalArgumentException");
        let runtime_exception = names.gcid_from_bytes(b"java/lang/RuntimeException");

        let mut target = LatticeWord::Reference { class_id: illegal_state, arity: 0 };
        let changed = merge_object_types(
            &classes,
            &mut names,
            LatticeWord::Reference { class_id: illegal_arg, arity: 0 },
            &mut target,
        )
        .unwrap();
        assert!(changed);
        assert_eq!(target, LatticeWord::Reference { class_id: runtime_exception, arity: 0 });
    }

    #[test]
    fn merging_null_into_reference_keeps_reference() {
        let (mut names, classes) = fixture();
        let mut target = LatticeWord::Reference { class_id: names.object_id(), arity: 0 };
        let changed = merge_object_types(&classes, &mut names, LatticeWord::Null, &mut target).unwrap();
        assert!(!changed);
        assert_eq!(target, LatticeWord::Reference { class_id: names.object_id(), arity: 0 });
    }

    #[test]
    fn base_array_joined_with_object_array_decays_to_object() {
        let (mut names, classes) = fixture();
        let mut target = LatticeWord::Reference { class_id: names.object_id(), arity: 1 };
        let changed = merge_object_types(
            &classes,
            &mut names,
            LatticeWord::BaseArray { element: verifier_model::code::types::PrimitiveType::Int, arity: 1 },
            &mut target,
        )
        .unwrap();
        assert!(changed);
        assert_eq!(target, LatticeWord::Reference { class_id: names.object_id(), arity: 1 });
    }

    #[test]
    fn mismatched_primitive_and_reference_locals_decay_to_top() {
        let (mut names, classes) = fixture();
        let merged = merge_slot(&classes, &mut names, LatticeWord::Int, LatticeWord::Reference { class_id: 0, arity: 0 }).unwrap();
        assert_eq!(merged, LatticeWord::Top);
    }

    #[test]
    fn unreached_target_is_first_reach() {
        let (mut names, classes) = fixture();
        let code = CodeInfo::new(vec![(InstructionIndex(0), Instruction::Nop)], 1, 1, vec![]);
        let mut arena = Arena::new(64);
        let (mut map, _) = crate::branch_map::build_branch_map(&code, &mut arena).unwrap();
        let mut store = FrameStore::with_capacity(1);
        let index = store.reserve(InstructionIndex(0));
        let mut queues = WorkQueues::with_capacity(1);
        let live = Frame::new_unreached(InstructionIndex(0), 1);

        let outcome = merge_stacks(&classes, &mut names, &mut store, &mut map, &mut queues, index, InstructionIndex(0), &live).unwrap();
        assert_eq!(outcome, MergeOutcome::FirstReach);
    }

    #[test]
    fn depth_mismatch_is_an_error_not_a_crash() {
        let (mut names, classes) = fixture();
        let code = CodeInfo::new(vec![(InstructionIndex(0), Instruction::Nop)], 2, 2, vec![]);
        let mut arena = Arena::new(64);
        let (mut map, _) = crate::branch_map::build_branch_map(&code, &mut arena).unwrap();
        let mut store = FrameStore::with_capacity(1);
        let index = store.reserve(InstructionIndex(0));
        let mut queues = WorkQueues::with_capacity(1);

        let mut stored = Frame::new_unreached(InstructionIndex(0), 2);
        stored.push(LatticeWord::Int);
        store.set(index, stored);

        let mut live = Frame::new_unreached(InstructionIndex(0), 2);
        live.push(LatticeWord::Int);
        live.push(LatticeWord::Int);

        let result = merge_stacks(&classes, &mut names, &mut store, &mut map, &mut queues, index, InstructionIndex(0), &live);
        assert!(matches!(result, Err(MergeError::DepthMismatch { .. })));
    }
}
