//! A per-method JVM bytecode verifier: an abstract-interpreter proof of type safety driven by a
//! class file's stack-map table (or, in fallback, by maps synthesized from scratch).
//!
//! Class loading, constant-pool resolution, and cross-loader linkage are external collaborators'
//! jobs; this crate consumes an already-decoded method body (`verifier_model::code::CodeInfo`)
//! and a `ClassHierarchy` view, and proves (or disproves) that every instruction sees operands of
//! the type it expects at every point reachable by control flow.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

pub mod arena;
pub mod branch_map;
pub mod config;
pub mod decompress;
pub mod error;
pub mod frame;
pub mod lattice;
pub mod merge;
pub mod queue;
pub mod simulate;

use std::sync::Mutex;

use tracing::{debug, warn};
use verifier_model::{
    code::{instruction::InstructionIndex, CodeInfo},
    data::classes::ClassHierarchy,
    id::ClassId,
    ClassNames,
};

use arena::Arena;
use config::VerifierConfig;
use error::VerifyError;
use frame::{Frame, FrameStore};
use lattice::LatticeWord;
use queue::WorkQueues;
use simulate::MethodContext;

/// Per-instance scratch state reset between methods (`SPEC_FULL.md` §4's per-method lifecycle,
/// §5's single-threaded-per-invocation model).
struct Scratch {
    arena: Arena,
}
impl Scratch {
    fn new() -> Self {
        Self { arena: Arena::new(4096) }
    }

    fn reset(&mut self) {
        self.arena.reset();
    }
}

/// The verifier handle. Holds no global/static state (`SPEC_FULL.md` §9's Design Notes
/// resolution): callers construct one per VM instance and keep it alive for the process lifetime,
/// or per test for isolation.
pub struct BytecodeVerifier {
    config: VerifierConfig,
    scratch: Mutex<Scratch>,
}
impl BytecodeVerifier {
    #[must_use]
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            scratch: Mutex::new(Scratch::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// `verifyBytecodes` narrowed to a single method: builds the branch map, decompresses (or
    /// synthesizes) stack maps, then runs the simulator to a fixed point.
    ///
    /// `raw_frames` is `None` when the class file shipped no `StackMapTable` (legal for old class
    /// file versions, or when `config.ignore_stack_maps` forces synthesis) — synthesis-from-scratch
    /// is handled by `SPEC_FULL.md`'s fallback path at the caller level (§6), which retries this
    /// same entry point with `raw_frames: None` after resetting per-method state.
    pub fn verify_method(
        &self,
        hierarchy: &impl ClassHierarchy,
        names: &mut ClassNames,
        declaring_class: ClassId,
        is_init_method: bool,
        code: &CodeInfo,
        raw_frames: Option<&[decompress::RawStackMapFrame]>,
        entry: Frame,
    ) -> Result<FrameStore, VerifyError> {
        let span = tracing::span!(tracing::Level::DEBUG, "verify_method", class = declaring_class);
        let _enter = span.enter();

        let mut scratch = self.scratch.lock().expect("verifier mutex poisoned by a prior panic");
        scratch.reset();

        let (mut map, frame_count) = branch_map::build_branch_map(code, &mut scratch.arena)?;
        let mut store = FrameStore::with_capacity(frame_count);
        for pc in map.branch_targets() {
            store.reserve(pc);
        }

        let use_class_file_maps = raw_frames.is_some() && !self.config.ignore_stack_maps;
        if use_class_file_maps {
            let raw_frames = raw_frames.expect("checked above");
            let index_table = store.index_table();
            decompress::decompress(
                raw_frames,
                InstructionIndex(0),
                entry.locals(),
                code.max_locals(),
                code.max_stack(),
                &mut store,
                |pc| index_table.iter().find(|(p, _)| *p == pc).map(|(_, i)| *i),
            )?;
        } else {
            debug!("synthesizing stack maps from scratch (no class-file maps, or ignore_stack_maps set)");
        }

        let mut queues = WorkQueues::with_capacity(frame_count);
        let ctx = MethodContext {
            code,
            is_init_method,
            declaring_class,
        };

        simulate::simulate_method(hierarchy, names, &ctx, &mut map, &mut store, &mut queues, entry)?;

        let all_indices: Vec<_> = (0..frame_count).map(frame::FrameIndex).collect();
        simulate::finalize_uninitialized_this(&mut store, &all_indices);

        if !queues.is_drained() {
            warn!("simulation ended with non-empty work queues; this indicates a bug in queue servicing");
        }

        Ok(store)
    }
}

/// The method-entry frame for a non-static method: `this` in local 0 (uninitialized for a
/// constructor), followed by the parameters, matching `SPEC_FULL.md` §4's method-entry seeding.
#[must_use]
pub fn entry_frame_for_instance_method(
    declaring_class: ClassId,
    is_init_method: bool,
    parameters: &[verifier_model::code::types::ValueType],
    max_locals: u16,
) -> Frame {
    let mut frame = Frame::new_unreached(InstructionIndex(0), max_locals);
    let this_word = if is_init_method {
        LatticeWord::UninitializedThis
    } else {
        LatticeWord::Reference { class_id: declaring_class, arity: 0 }
    };
    frame.set_local(0, this_word);
    seed_parameters(&mut frame, parameters, 1);
    frame
}

/// The method-entry frame for a `static` method: no implicit `this`, just the parameters.
#[must_use]
pub fn entry_frame_for_static_method(parameters: &[verifier_model::code::types::ValueType], max_locals: u16) -> Frame {
    let mut frame = Frame::new_unreached(InstructionIndex(0), max_locals);
    seed_parameters(&mut frame, parameters, 0);
    frame
}

fn seed_parameters(frame: &mut Frame, parameters: &[verifier_model::code::types::ValueType], start: usize) {
    let mut index = start;
    for &param in parameters {
        let word = LatticeWord::from_value_type(param);
        frame.set_local(index, word);
        index += if word.is_category_2() { 2 } else { 1 };
    }
}
