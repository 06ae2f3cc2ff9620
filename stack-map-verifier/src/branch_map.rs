//! Branch-target discovery (`SPEC_FULL.md` §4.3): one linear, purely syntactic pass over a
//! method's instructions that flags every PC reachable other than by fall-through.
//!
//! Grounded on `bcverify.c`'s `buildBranchMap`, which walks the raw bytecode with a
//! size-and-kind table to find branch and switch targets. Since this crate's instructions are
//! already decoded (`SPEC_FULL.md` §1's pre-parsed-method boundary), there is no opcode table or
//! switch-padding arithmetic to reproduce: `Instruction::Goto`/`IfZero`/`TableSwitch`/etc already
//! carry their resolved targets, so the scan just matches on the enum.

use std::collections::BTreeSet;

use verifier_model::code::{instruction::InstructionIndex, CodeInfo, Instruction};

use crate::{
    arena::Arena,
    error::{DecompressError, VerifyError},
};

bitflags::bitflags! {
    /// Per-PC flags from `SPEC_FULL.md` §3's bytecode map. `OnUnwalkedQueue`/`OnRewalkQueue` are
    /// owned by `queue.rs`, not set here; this module only ever produces `BRANCH_TARGET` and
    /// `EXCEPTION_START`.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct PcFlags: u8 {
        const BRANCH_TARGET   = 0b0001;
        const EXCEPTION_START = 0b0010;
        const ON_UNWALKED     = 0b0100;
        const ON_REWALK       = 0b1000;
    }
}

/// The bytecode map: one flag byte per instruction index, plus (once frames are allocated) the
/// index of that PC's frame in the frame store. Backed by a buffer bump-allocated out of the
/// method's scratch `Arena` and copied out as an owned slice, matching `bcverify.c`'s per-bytecode
/// flags array (`SPEC_FULL.md` §2, §4.1's "all per-method data hangs off it").
#[derive(Debug, Clone)]
pub struct BytecodeMap {
    flags: Box<[PcFlagsRaw]>,
}

/// Stored separately from the `bitflags` type so the map can stay plain data.
type PcFlagsRaw = u8;

impl BytecodeMap {
    #[must_use]
    pub fn flags_at(&self, pc: InstructionIndex) -> PcFlags {
        self.flags
            .get(pc.0 as usize)
            .map(|&f| PcFlags::from_bits_truncate(f))
            .unwrap_or(PcFlags::empty())
    }

    fn set(&mut self, pc: InstructionIndex, flag: PcFlags) {
        if let Some(slot) = self.flags.get_mut(pc.0 as usize) {
            *slot |= flag.bits();
        }
    }

    pub fn set_queue_flag(&mut self, pc: InstructionIndex, flag: PcFlags) {
        debug_assert!(flag == PcFlags::ON_UNWALKED || flag == PcFlags::ON_REWALK);
        self.set(pc, flag);
    }

    pub fn clear_queue_flag(&mut self, pc: InstructionIndex, flag: PcFlags) {
        if let Some(slot) = self.flags.get_mut(pc.0 as usize) {
            *slot &= !flag.bits();
        }
    }

    /// Every PC flagged `BRANCH_TARGET`, in ascending order — the frame store allocates exactly
    /// one frame per entry here (`SPEC_FULL.md` §3's "one frame per branch target" invariant).
    #[must_use]
    pub fn branch_targets(&self) -> Vec<InstructionIndex> {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, f)| PcFlags::from_bits_truncate(**f).contains(PcFlags::BRANCH_TARGET))
            .map(|(pc, _)| InstructionIndex(pc as u16))
            .collect()
    }
}

fn switch_targets(instruction: &Instruction) -> Vec<InstructionIndex> {
    match instruction {
        Instruction::TableSwitch { default, targets, .. } => {
            let mut all = targets.clone();
            all.push(*default);
            all
        }
        Instruction::LookupSwitch { default, pairs } => {
            let mut all: Vec<_> = pairs.iter().map(|(_, t)| *t).collect();
            all.push(*default);
            all
        }
        Instruction::Goto(target)
        | Instruction::IfZero { target, .. }
        | Instruction::IfIntCompare { target, .. }
        | Instruction::IfRefCompare { target, .. }
        | Instruction::IfNull { target }
        | Instruction::IfNonNull { target } => vec![*target],
        _ => Vec::new(),
    }
}

/// Builds the bytecode map and returns the count of distinct frames the frame store must
/// allocate. A purely syntactic pass: it never inspects types, never follows control flow beyond
/// one instruction's listed targets.
///
/// `arena` backs the map's flag buffer: one allocation, sized to the method's instruction-index
/// space, bump-allocated out of the per-method scratch arena rather than a bare `Vec`.
pub fn build_branch_map(code: &CodeInfo, arena: &mut Arena) -> Result<(BytecodeMap, usize), VerifyError> {
    let mut targets = BTreeSet::new();

    let len = code.end_index().0 as usize;
    let handle = arena.alloc(len.max(1))?;
    let mut flags = vec![0u8; len];
    flags.copy_from_slice(&arena.bytes(handle)[..len]);
    let mut map = BytecodeMap { flags: flags.into_boxed_slice() };

    for (pc, instruction) in code.instructions() {
        if matches!(instruction, Instruction::Unimplemented { .. }) && instruction_is_branch_shaped(instruction) {
            return Err(DecompressError::UnknownOpcode { pc: *pc }.into());
        }

        for target in switch_targets(instruction) {
            if !code.has_instruction_at(target) {
                return Err(DecompressError::TargetOutOfBounds { pc: target }.into());
            }
            targets.insert(target);
        }
    }

    for entry in code.exception_table() {
        if !code.has_instruction_at(entry.handler_pc) {
            return Err(DecompressError::TargetOutOfBounds { pc: entry.handler_pc }.into());
        }
        targets.insert(entry.handler_pc);

        // A handler that catches itself (its protected range starts where it handles) does not
        // also need its start flagged as a distinct entry point.
        if entry.start_pc != entry.handler_pc {
            map.set(entry.start_pc, PcFlags::EXCEPTION_START);
        }
    }

    for target in &targets {
        map.set(*target, PcFlags::BRANCH_TARGET);
    }

    Ok((map, targets.len()))
}

/// `Unimplemented` only breaks verification when it stands in for something that would have
/// carried a branch target; a genuinely unreachable or side-effect-only unknown opcode is left to
/// the simulator to reject instead, matching `bcverify.c`'s distinction between branch-map-time
/// internal errors and simulate-time verify errors.
///
/// The opcode ranges below are every JVM instruction whose encoding carries a branch offset:
/// `ifeq`..`jsr` (0x99..=0xA8), `tableswitch`/`lookupswitch` (0xAA/0xAB), `ifnull`/`ifnonnull`
/// (0xC6/0xC7), and `goto_w`/`jsr_w` (0xC8/0xC9).
fn instruction_is_branch_shaped(instruction: &Instruction) -> bool {
    let Instruction::Unimplemented { opcode } = instruction else {
        return false;
    };
    matches!(opcode, 0x99..=0xA8 | 0xAA | 0xAB | 0xC6 | 0xC7 | 0xC8 | 0xC9)
}
