//! The two work queues driving the simulator's fixed-point iteration (`SPEC_FULL.md` §4.8).
//!
//! Grounded on `bcverify.c`'s `pushUnwalked`/`pushRewalk` pair: fixed-size ring buffers rather than
//! a growable `VecDeque`, since a PC can be enqueued on at most one of the two queues at a time
//! (idempotent via the bytecode map's flags) and the frame count bounds how many distinct PCs can
//! ever be pending — a `VecDeque` would just be unbounded growth the invariant already rules out.

use verifier_model::code::instruction::InstructionIndex;

use crate::branch_map::{BytecodeMap, PcFlags};

/// A single fixed-capacity ring buffer of PCs.
struct RingBuffer {
    slots: Vec<Option<InstructionIndex>>,
    head: usize,
    tail: usize,
}
impl RingBuffer {
    fn with_capacity(frame_count: usize) -> Self {
        Self {
            slots: vec![None; frame_count + 1],
            head: 0,
            tail: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn push(&mut self, pc: InstructionIndex) {
        let next_tail = (self.tail + 1) % self.slots.len();
        debug_assert_ne!(next_tail, self.head, "ring buffer overflow: more distinct PCs enqueued than frames allocated");
        self.slots[self.tail] = Some(pc);
        self.tail = next_tail;
    }

    fn pop(&mut self) -> Option<InstructionIndex> {
        if self.is_empty() {
            return None;
        }
        let pc = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        pc
    }
}

/// Owns both queues and the bytecode-map flags that make enqueue idempotent. Unwalked entries are
/// always drained before re-walk entries, matching §4.8's "dequeue from the unwalked queue first".
pub struct WorkQueues {
    unwalked: RingBuffer,
    rewalk: RingBuffer,
}
impl WorkQueues {
    #[must_use]
    pub fn with_capacity(frame_count: usize) -> Self {
        Self {
            unwalked: RingBuffer::with_capacity(frame_count),
            rewalk: RingBuffer::with_capacity(frame_count),
        }
    }

    /// Enqueues `pc` on the unwalked queue unless it is already pending on either queue.
    pub fn enqueue_unwalked(&mut self, map: &mut BytecodeMap, pc: InstructionIndex) {
        let flags = map.flags_at(pc);
        if flags.intersects(PcFlags::ON_UNWALKED | PcFlags::ON_REWALK) {
            return;
        }
        map.set_queue_flag(pc, PcFlags::ON_UNWALKED);
        self.unwalked.push(pc);
    }

    /// Moves `pc` onto the re-walk queue, clearing any unwalked flag (`SPEC_FULL.md` §4.8: "moving
    /// a PC from unwalked to rewalk clears the former and sets the latter"). A PC already on the
    /// re-walk queue is left alone rather than enqueued twice.
    pub fn enqueue_rewalk(&mut self, map: &mut BytecodeMap, pc: InstructionIndex) {
        let flags = map.flags_at(pc);
        if flags.contains(PcFlags::ON_REWALK) {
            return;
        }
        map.clear_queue_flag(pc, PcFlags::ON_UNWALKED);
        map.set_queue_flag(pc, PcFlags::ON_REWALK);
        self.rewalk.push(pc);
    }

    /// Pops the next PC to process, preferring the unwalked queue, skipping any entry whose flag
    /// was cleared in the interim (a PC can be popped off a ring slot after having since been
    /// re-enqueued onto the other queue, which clears its original flag).
    pub fn pop(&mut self, map: &mut BytecodeMap) -> Option<InstructionIndex> {
        loop {
            let (pc, flag) = if let Some(pc) = self.unwalked.pop() {
                (pc, PcFlags::ON_UNWALKED)
            } else if let Some(pc) = self.rewalk.pop() {
                (pc, PcFlags::ON_REWALK)
            } else {
                return None;
            };

            if !map.flags_at(pc).contains(flag) {
                continue;
            }
            map.clear_queue_flag(pc, flag);
            return Some(pc);
        }
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.unwalked.is_empty() && self.rewalk.is_empty()
    }
}
