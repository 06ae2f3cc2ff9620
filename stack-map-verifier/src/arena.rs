//! LIFO bump allocator backing all per-method scratch data (`SPEC_FULL.md` §4.1).
//!
//! Grounded on `bcverify.c`'s `bcvalloc`/`bcvfree`: a single growable chunk bump-allocates forward,
//! `free` only truly reclaims space when freeing the most recently allocated (or a contiguous run
//! of already-freed) block, and oversized requests spill to a separate allocator. The original
//! tags "in use" into a back-pointer's low bit; per `SPEC_FULL.md` §9 this reimplementation tracks
//! the same information in a side `Vec` of block headers instead, so there is no raw-pointer
//! tagging anywhere.

use crate::error::ArenaError;

/// An opaque handle returned by `alloc`, redeemed on `free`. Not a real pointer: indexes into the
/// arena's block table, so there is nothing to dereference unsafely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle(usize);

#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    offset: usize,
    len: usize,
    in_use: bool,
}

/// Blocks larger than this bypass the bump chunk entirely and are tracked as host allocations, so
/// one oversized request (an unusually large stack-map table) can't force the whole chunk to grow
/// to accommodate it.
const HOST_SPILL_THRESHOLD: usize = 4096;

enum Storage {
    /// Lives at `[offset, offset + len)` inside the arena's bump chunk.
    Chunk,
    /// Spilled to its own allocation; tracked separately from pointer-range comparison, which
    /// Rust gives no safe way to do across an arbitrary buffer.
    Host(Box<[u8]>),
}

struct Block {
    header: BlockHeader,
    storage: Storage,
}

/// Per-method scratch arena. `alloc`/`free` are LIFO-biased: freeing out of order is legal but
/// only reclaims space once the freed run reaches the current high-water mark.
pub struct Arena {
    chunk: Vec<u8>,
    /// First byte past the last in-use chunk-backed allocation.
    high_water: usize,
    blocks: Vec<Block>,
}
impl Arena {
    #[must_use]
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            chunk: vec![0u8; initial_capacity],
            high_water: 0,
            blocks: Vec::new(),
        }
    }

    /// Rounds `len` up to the machine word size, matching `bcvalloc`'s alignment guarantee so
    /// every returned block is usable for word-sized data without further padding.
    fn word_align(len: usize) -> usize {
        const WORD: usize = std::mem::size_of::<usize>();
        (len + WORD - 1) & !(WORD - 1)
    }

    pub fn alloc(&mut self, len: usize) -> Result<BlockHandle, ArenaError> {
        let len = Self::word_align(len.max(1));

        if len > HOST_SPILL_THRESHOLD {
            let storage = vec![0u8; len].into_boxed_slice();
            let index = self.blocks.len();
            self.blocks.push(Block {
                header: BlockHeader {
                    offset: 0,
                    len,
                    in_use: true,
                },
                storage: Storage::Host(storage),
            });
            return Ok(BlockHandle(index));
        }

        if self.high_water + len > self.chunk.len() {
            let grown = (self.chunk.len().max(len) * 2).max(self.high_water + len);
            self.chunk
                .try_reserve(grown - self.chunk.len())
                .map_err(|_| ArenaError::InsufficientMemory)?;
            self.chunk.resize(grown, 0);
        }

        let offset = self.high_water;
        self.high_water += len;
        let index = self.blocks.len();
        self.blocks.push(Block {
            header: BlockHeader {
                offset,
                len,
                in_use: true,
            },
            storage: Storage::Chunk,
        });
        Ok(BlockHandle(index))
    }

    pub fn bytes(&self, handle: BlockHandle) -> &[u8] {
        let block = &self.blocks[handle.0];
        match &block.storage {
            Storage::Chunk => &self.chunk[block.header.offset..block.header.offset + block.header.len],
            Storage::Host(buf) => buf,
        }
    }

    pub fn bytes_mut(&mut self, handle: BlockHandle) -> &mut [u8] {
        let block = &mut self.blocks[handle.0];
        match &mut block.storage {
            Storage::Chunk => &mut self.chunk[block.header.offset..block.header.offset + block.header.len],
            Storage::Host(buf) => buf,
        }
    }

    /// Marks `handle` free. If it (or a contiguous run of already-free blocks ending at the
    /// current high-water mark) was the most recently allocated chunk-backed block, rewinds the
    /// high-water mark; otherwise the space sits tagged-free until an earlier block's `free` walk
    /// reaches it.
    pub fn free(&mut self, handle: BlockHandle) -> Result<(), ArenaError> {
        let block = self.blocks.get_mut(handle.0).ok_or(ArenaError::UnknownBlock)?;
        block.header.in_use = false;

        if matches!(block.storage, Storage::Host(_)) {
            return Ok(());
        }

        self.rewind_freed_tail();
        Ok(())
    }

    fn rewind_freed_tail(&mut self) {
        loop {
            let Some(last_chunk_block) = self
                .blocks
                .iter()
                .filter(|b| matches!(b.storage, Storage::Chunk))
                .max_by_key(|b| b.header.offset)
            else {
                break;
            };

            if last_chunk_block.header.in_use || last_chunk_block.header.offset + last_chunk_block.header.len != self.high_water {
                break;
            }

            self.high_water = last_chunk_block.header.offset;
        }
    }

    /// Resets the whole arena for the next method, matching `SPEC_FULL.md` §4.1's "torn down or
    /// reset before the next method" lifecycle. Keeps the chunk's allocated capacity around so
    /// the next method doesn't repay the growth cost.
    pub fn reset(&mut self) {
        self.high_water = 0;
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_rounds_up_to_word_size() {
        let mut arena = Arena::new(64);
        let handle = arena.alloc(3).unwrap();
        assert_eq!(arena.bytes(handle).len() % std::mem::size_of::<usize>(), 0);
    }

    #[test]
    fn freeing_most_recent_block_rewinds_high_water() {
        let mut arena = Arena::new(64);
        let a = arena.alloc(8).unwrap();
        let b = arena.alloc(8).unwrap();
        let before = arena.high_water;
        arena.free(b).unwrap();
        assert!(arena.high_water < before);
        arena.free(a).unwrap();
        assert_eq!(arena.high_water, 0);
    }

    #[test]
    fn oversized_allocation_spills_to_host() {
        let mut arena = Arena::new(64);
        let handle = arena.alloc(HOST_SPILL_THRESHOLD + 1).unwrap();
        assert_eq!(arena.bytes(handle).len(), Arena::word_align(HOST_SPILL_THRESHOLD + 1));
        assert_eq!(arena.chunk.len(), 64);
    }

    #[test]
    fn freeing_unknown_block_is_an_error() {
        let mut arena = Arena::new(64);
        arena.alloc(8).unwrap();
        let bogus = BlockHandle(99);
        assert_eq!(arena.free(bogus), Err(ArenaError::UnknownBlock));
    }

    #[test]
    fn reset_reclaims_everything() {
        let mut arena = Arena::new(64);
        arena.alloc(8).unwrap();
        arena.alloc(8).unwrap();
        arena.reset();
        assert_eq!(arena.high_water, 0);
        let handle = arena.alloc(8).unwrap();
        assert_eq!(arena.bytes(handle).len(), 8);
    }
}
