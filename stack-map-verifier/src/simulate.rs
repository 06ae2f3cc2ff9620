//! The simulator: the abstract interpreter loop from `SPEC_FULL.md` §4.7.
//!
//! Grounded on `bcverify.c`'s `simulateStack`, generalized from its raw-opcode decode table to
//! match directly on `verifier_model::code::Instruction` since that work already happened in the
//! pre-parsed model crate.

use tracing::{debug, trace};
use verifier_model::{
    code::{instruction::InstructionIndex, CodeInfo, ExceptionEntry, Instruction},
    data::classes::ClassHierarchy,
    id::ClassId,
    ClassNames,
};

use crate::{
    branch_map::{BytecodeMap, PcFlags},
    error::SimulateError,
    frame::{Frame, FrameIndex, FrameStore},
    lattice::LatticeWord,
    merge::merge_stacks,
    queue::WorkQueues,
};

/// Everything the simulator needs for one method, bundled so `simulate_method`'s signature stays
/// readable. Constructed fresh per method and discarded at the end, per `SPEC_FULL.md` §4's
/// per-method lifecycle.
pub struct MethodContext<'a> {
    pub code: &'a CodeInfo,
    pub is_init_method: bool,
    pub declaring_class: ClassId,
}

/// A local-variable read must see a value whose shape matches what the instruction declares it
/// expects (`iload` expects `int`, `aload` expects a reference-ish value, and so on). This is
/// where a merge that decayed a join point's local to `top` (`SPEC_FULL.md` §4.5 step 3's first
/// bullet) turns into the flow error §8's S3 scenario requires: `top` matches no declared type.
fn check_load_compatible(
    word: LatticeWord,
    declared: verifier_model::code::types::ValueType,
    pc: InstructionIndex,
) -> Result<(), SimulateError> {
    use verifier_model::code::types::{PrimitiveType, ValueType};

    let ok = match declared {
        ValueType::Primitive(PrimitiveType::Long) => word == LatticeWord::Long,
        ValueType::Primitive(PrimitiveType::Double) => word == LatticeWord::Double,
        ValueType::Primitive(PrimitiveType::Float) => word == LatticeWord::Float,
        ValueType::Primitive(PrimitiveType::Byte | PrimitiveType::Short | PrimitiveType::Int | PrimitiveType::Char | PrimitiveType::Boolean) => {
            word == LatticeWord::Int
        }
        ValueType::Reference { .. } => word.is_reference_ish(),
    };

    if ok {
        Ok(())
    } else {
        Err(SimulateError::IncompatibleType {
            pc,
            expected: match declared {
                ValueType::Primitive(_) => "primitive",
                ValueType::Reference { .. } => "reference",
            },
        })
    }
}

fn numeric_type_word(ty: verifier_model::code::instruction::NumericType) -> LatticeWord {
    use verifier_model::code::instruction::NumericType as N;
    match ty {
        N::Int => LatticeWord::Int,
        N::Long => LatticeWord::Long,
        N::Float => LatticeWord::Float,
        N::Double => LatticeWord::Double,
    }
}

fn pop_n(frame: &mut Frame, n: usize, pc: InstructionIndex) -> Result<Vec<LatticeWord>, SimulateError> {
    let mut popped = Vec::with_capacity(n);
    for _ in 0..n {
        popped.push(frame.pop().ok_or(SimulateError::StackUnderflow {
            pc,
            needed: n,
            available: frame.stack_depth(),
        })?);
    }
    popped.reverse();
    Ok(popped)
}

/// Rewrites every occurrence of `marker` in `frame`'s locals and stack to `initialized`, the
/// effect `SPEC_FULL.md` §4.7 specifies for `invokespecial <init>` completing.
fn initialize_marker(frame: &mut Frame, marker: LatticeWord, initialized: LatticeWord) {
    for i in 0..frame.locals().len() {
        if frame.local(i) == marker {
            frame.set_local(i, initialized);
        }
    }
    let stack: Vec<_> = frame.stack().to_vec();
    frame.clear_stack();
    for word in stack {
        frame.push_raw(if word == marker { initialized } else { word });
    }
}

/// Handlers covering `pc` (or, for the "just loaded a fresh frame" case, handlers covering the
/// whole method). `SPEC_FULL.md` §4.7 step 1.
fn covering_handlers<'a>(code: &'a CodeInfo, pc: InstructionIndex) -> impl Iterator<Item = &'a ExceptionEntry> {
    code.exception_table()
        .iter()
        .filter(move |e| pc >= e.start_pc && pc < e.end_pc)
}

#[allow(clippy::too_many_arguments)]
fn merge_into_handlers(
    hierarchy: &impl ClassHierarchy,
    names: &mut ClassNames,
    ctx: &MethodContext<'_>,
    store: &mut FrameStore,
    map: &mut BytecodeMap,
    queues: &mut WorkQueues,
    pc: InstructionIndex,
    live: &Frame,
) -> Result<(), SimulateError> {
    for handler in covering_handlers(ctx.code, pc) {
        let catch_class = handler.catch_type.unwrap_or_else(|| {
            debug!(pc = %pc, "exceptionClassIndex == 0, substituting java/lang/Throwable");
            names.throwable_id()
        });

        let mut handler_live = live.clone();
        handler_live.clear_stack();
        handler_live.push(LatticeWord::Reference { class_id: catch_class, arity: 0 });

        let Some(index) = store.index_of(handler.handler_pc) else {
            continue;
        };
        merge_stacks(hierarchy, names, store, map, queues, index, handler.handler_pc, &handler_live)?;
    }
    Ok(())
}

/// Executes one instruction's stack/locals effect on `frame`. Returns any branch targets the
/// instruction can fall through to besides the next PC (empty for straight-line instructions).
fn step(frame: &mut Frame, pc: InstructionIndex, instruction: &Instruction) -> Result<Vec<InstructionIndex>, SimulateError> {
    use Instruction as I;

    match instruction {
        I::Nop => {}
        I::ConstNull => frame.push(LatticeWord::Null),
        I::ConstInt(_) => frame.push(LatticeWord::Int),
        I::ConstLong(_) => frame.push(LatticeWord::Long),
        I::ConstFloat(_) => frame.push(LatticeWord::Float),
        I::ConstDouble(_) => frame.push(LatticeWord::Double),
        I::Ldc(value) => frame.push(match value {
            verifier_model::code::instruction::LdcValue::Int(_) => LatticeWord::Int,
            verifier_model::code::instruction::LdcValue::Float(_) => LatticeWord::Float,
            verifier_model::code::instruction::LdcValue::Long(_) => LatticeWord::Long,
            verifier_model::code::instruction::LdcValue::Double(_) => LatticeWord::Double,
            verifier_model::code::instruction::LdcValue::Reference(class_id) => {
                LatticeWord::Reference { class_id: *class_id, arity: 0 }
            }
        }),
        I::Load { ty, index } => {
            let word = *frame
                .locals()
                .get(*index as usize)
                .ok_or(SimulateError::LocalsOverflow { pc, index: *index })?;
            check_load_compatible(word, *ty, pc)?;
            frame.push(word);
        }
        I::Store { ty, index } => {
            let word = pop_n(frame, 1, pc)?[0];
            let _ = ty;
            let high_index = if word.is_category_2() { *index as usize + 1 } else { *index as usize };
            if high_index >= frame.locals().len() {
                return Err(SimulateError::LocalsOverflow { pc, index: *index });
            }
            frame.set_local(*index as usize, word);
            if word.is_category_2() {
                frame.set_local(*index as usize + 1, LatticeWord::Top);
            }
        }
        I::IInc { index, .. } => {
            if *index as usize >= frame.locals().len() {
                return Err(SimulateError::LocalsOverflow { pc, index: *index });
            }
        }
        I::ArrayLoad(ty) => {
            pop_n(frame, 2, pc)?;
            frame.push(LatticeWord::from_value_type(*ty));
        }
        I::ArrayStore(_) => {
            pop_n(frame, 3, pc)?;
        }
        I::ArrayLength => {
            pop_n(frame, 1, pc)?;
            frame.push(LatticeWord::Int);
        }
        I::Pop => {
            pop_n(frame, 1, pc)?;
        }
        I::Pop2 => {
            pop_n(frame, 2, pc)?;
        }
        I::Dup => {
            let v = pop_n(frame, 1, pc)?[0];
            frame.push(v);
            frame.push(v);
        }
        I::DupX1 => {
            let v = pop_n(frame, 2, pc)?;
            frame.push(v[1]);
            frame.push(v[0]);
            frame.push(v[1]);
        }
        I::DupX2 => {
            let v = pop_n(frame, 3, pc)?;
            frame.push(v[2]);
            frame.push(v[0]);
            frame.push(v[1]);
            frame.push(v[2]);
        }
        I::Dup2 => {
            let v = pop_n(frame, 2, pc)?;
            frame.push(v[0]);
            frame.push(v[1]);
            frame.push(v[0]);
            frame.push(v[1]);
        }
        I::Dup2X1 => {
            let v = pop_n(frame, 3, pc)?;
            frame.push(v[1]);
            frame.push(v[2]);
            frame.push(v[0]);
            frame.push(v[1]);
            frame.push(v[2]);
        }
        I::Dup2X2 => {
            let v = pop_n(frame, 4, pc)?;
            frame.push(v[2]);
            frame.push(v[3]);
            frame.push(v[0]);
            frame.push(v[1]);
            frame.push(v[2]);
            frame.push(v[3]);
        }
        I::Swap => {
            let v = pop_n(frame, 2, pc)?;
            frame.push(v[1]);
            frame.push(v[0]);
        }
        I::Arithmetic { ty, .. } => {
            pop_n(frame, 2, pc)?;
            frame.push(numeric_type_word(*ty));
        }
        I::Neg(ty) => {
            pop_n(frame, 1, pc)?;
            frame.push(numeric_type_word(*ty));
        }
        I::Convert { to, .. } => {
            pop_n(frame, 1, pc)?;
            frame.push(numeric_type_word(*to));
        }
        I::Compare { .. } => {
            pop_n(frame, 2, pc)?;
            frame.push(LatticeWord::Int);
        }
        I::IfZero { target, .. } | I::IfNull { target } | I::IfNonNull { target } => {
            pop_n(frame, 1, pc)?;
            return Ok(vec![*target]);
        }
        I::IfIntCompare { target, .. } | I::IfRefCompare { target, .. } => {
            pop_n(frame, 2, pc)?;
            return Ok(vec![*target]);
        }
        I::Goto(target) => return Ok(vec![*target]),
        I::TableSwitch { default, targets, .. } => {
            pop_n(frame, 1, pc)?;
            let mut all = targets.clone();
            all.push(*default);
            return Ok(all);
        }
        I::LookupSwitch { default, pairs } => {
            pop_n(frame, 1, pc)?;
            let mut all: Vec<_> = pairs.iter().map(|(_, t)| *t).collect();
            all.push(*default);
            return Ok(all);
        }
        I::Return(ty) => {
            if ty.is_some() {
                pop_n(frame, 1, pc)?;
            }
        }
        I::GetStatic(ty) => frame.push(LatticeWord::from_value_type(*ty)),
        I::PutStatic(_) => {
            pop_n(frame, 1, pc)?;
        }
        I::GetField(ty) => {
            pop_n(frame, 1, pc)?;
            frame.push(LatticeWord::from_value_type(*ty));
        }
        I::PutField(_) => {
            pop_n(frame, 2, pc)?;
        }
        I::InvokeVirtual(method_ref) | I::InvokeInterface(method_ref) => {
            let argc = method_ref.descriptor.parameters.len() + 1;
            pop_n(frame, argc, pc)?;
            if let Some(ret) = method_ref.descriptor.return_type {
                frame.push(LatticeWord::from_value_type(ret));
            }
        }
        I::InvokeStatic(method_ref) => {
            let argc = method_ref.descriptor.parameters.len();
            pop_n(frame, argc, pc)?;
            if let Some(ret) = method_ref.descriptor.return_type {
                frame.push(LatticeWord::from_value_type(ret));
            }
        }
        I::InvokeSpecial(method_ref) => {
            let argc = method_ref.descriptor.parameters.len() + 1;
            let popped = pop_n(frame, argc, pc)?;
            if method_ref.name_is_init {
                let receiver = popped[0];
                if !receiver.is_uninitialized() {
                    return Err(SimulateError::InitOnInitializedReceiver { pc });
                }
                let initialized = LatticeWord::Reference { class_id: method_ref.owner, arity: 0 };
                initialize_marker(frame, receiver, initialized);
            } else if let Some(ret) = method_ref.descriptor.return_type {
                frame.push(LatticeWord::from_value_type(ret));
            }
        }
        I::InvokeDynamic(descriptor) => {
            pop_n(frame, descriptor.parameters.len(), pc)?;
            if let Some(ret) = descriptor.return_type {
                frame.push(LatticeWord::from_value_type(ret));
            }
        }
        I::New { .. } => frame.push(LatticeWord::UninitializedNew { site: pc }),
        I::NewArray { element } => {
            pop_n(frame, 1, pc)?;
            frame.push(LatticeWord::BaseArray { element: *element, arity: 1 });
        }
        I::ANewArray { class_id } => {
            pop_n(frame, 1, pc)?;
            frame.push(LatticeWord::Reference { class_id: *class_id, arity: 1 });
        }
        I::MultiANewArray { class_id, dimensions } => {
            pop_n(frame, *dimensions as usize, pc)?;
            frame.push(LatticeWord::Reference { class_id: *class_id, arity: *dimensions });
        }
        I::AThrow => {
            pop_n(frame, 1, pc)?;
        }
        I::CheckCast { class_id } => {
            pop_n(frame, 1, pc)?;
            frame.push(LatticeWord::Reference { class_id: *class_id, arity: 0 });
        }
        I::InstanceOf { .. } => {
            pop_n(frame, 1, pc)?;
            frame.push(LatticeWord::Int);
        }
        I::MonitorEnter | I::MonitorExit => {
            pop_n(frame, 1, pc)?;
        }
        I::Unimplemented { .. } => return Err(SimulateError::UnknownOpcode { pc }),
    }

    Ok(Vec::new())
}

/// Runs the fixed-point simulation for one method. `entry` seeds the frame at PC 0; callers
/// construct it from the method's descriptor (`this` plus declared parameters, or the
/// `UninitializedThis` marker for a constructor).
#[allow(clippy::too_many_arguments)]
pub fn simulate_method(
    hierarchy: &impl ClassHierarchy,
    names: &mut ClassNames,
    ctx: &MethodContext<'_>,
    map: &mut BytecodeMap,
    store: &mut FrameStore,
    queues: &mut WorkQueues,
    entry: Frame,
) -> Result<(), SimulateError> {
    let span = tracing::span!(tracing::Level::DEBUG, "simulate_method", class = ctx.declaring_class);
    let _enter = span.enter();

    let mut live = entry;
    let mut just_loaded = true;

    loop {
        let pc = live.pc;
        trace!(pc = %pc, "simulating instruction");

        if map.flags_at(pc).contains(PcFlags::EXCEPTION_START) || just_loaded {
            merge_into_handlers(hierarchy, names, ctx, store, map, queues, pc, &live)?;
        }

        if map.flags_at(pc).contains(PcFlags::BRANCH_TARGET) && !just_loaded {
            if let Some(index) = store.index_of(pc) {
                merge_stacks(hierarchy, names, store, map, queues, index, pc, &live)?;
            }
            if let Some(next_pc) = queues.pop(map) {
                let index = store.index_of(next_pc).expect("queued PC always has a frame");
                live = store.get(index).expect("queued PC always has a frame").clone();
                just_loaded = true;
                continue;
            }
            return Ok(());
        }
        just_loaded = false;

        let instruction = ctx
            .code
            .get_instruction_at(pc)
            .ok_or(SimulateError::UnknownOpcode { pc })?
            .clone();

        let is_store = matches!(instruction, Instruction::Store { .. });
        let targets = step(&mut live, pc, &instruction)?;

        if is_store {
            merge_into_handlers(hierarchy, names, ctx, store, map, queues, pc, &live)?;
        }

        for target in &targets {
            if let Some(index) = store.index_of(*target) {
                merge_stacks(hierarchy, names, store, map, queues, index, *target, &live)?;
            }
        }

        if instruction.is_unconditional_end_of_block() || matches!(instruction, Instruction::AThrow) {
            if let Some(next_pc) = queues.pop(map) {
                let index = store.index_of(next_pc).expect("queued PC always has a frame");
                live = store.get(index).expect("queued PC always has a frame").clone();
                just_loaded = true;
                continue;
            }
            return Ok(());
        }

        let Some(next_pc) = pc.checked_add_signed(1).and_then(|p| ctx.code.has_instruction_at(p).then_some(p)) else {
            if let Some(next_pc) = queues.pop(map) {
                let index = store.index_of(next_pc).expect("queued PC always has a frame");
                live = store.get(index).expect("queued PC always has a frame").clone();
                just_loaded = true;
                continue;
            }
            return Ok(());
        };
        live.pc = next_pc;
    }
}

/// Final pass (`SPEC_FULL.md` §4.7): every frame whose stack still contains `UninitializedThis`
/// gets its `uninitialized_this` flag set, for the caller-visible record of "this constructor
/// never completed its super/self `<init>` chain on this path" (normally itself a verify error
/// raised earlier; this pass exists for completeness of the stored frame data only).
pub fn finalize_uninitialized_this(store: &mut FrameStore, indices: &[FrameIndex]) {
    for &index in indices {
        if let Some(frame) = store.get_mut(index) {
            if frame.locals().contains(&LatticeWord::UninitializedThis)
                || frame.stack().contains(&LatticeWord::UninitializedThis)
            {
                frame.uninitialized_this = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verifier_model::code::types::{PrimitiveType, ValueType};

    #[test]
    fn storing_a_wide_local_clears_the_companion_slot_to_top() {
        let mut frame = Frame::new_unreached(InstructionIndex(0), 3);
        frame.set_local(1, LatticeWord::Int);
        frame.push(LatticeWord::Long);
        step(
            &mut frame,
            InstructionIndex(0),
            &Instruction::Store { ty: ValueType::Primitive(PrimitiveType::Long), index: 0 },
        )
        .unwrap();
        assert_eq!(frame.local(0), LatticeWord::Long);
        assert_eq!(frame.local(1), LatticeWord::Top);
    }

    #[test]
    fn storing_a_wide_local_past_max_locals_is_locals_overflow() {
        let mut frame = Frame::new_unreached(InstructionIndex(0), 2);
        frame.push(LatticeWord::Long);
        let err = step(
            &mut frame,
            InstructionIndex(0),
            &Instruction::Store { ty: ValueType::Primitive(PrimitiveType::Long), index: 1 },
        )
        .unwrap_err();
        assert!(matches!(err, SimulateError::LocalsOverflow { index: 1, .. }));
    }
}
