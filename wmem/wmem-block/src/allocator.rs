//! # Block allocator façade
//!
//! Ties blocks, chunks and the two free lists together.
//!
//! ```text
//!   alloc(size)
//!     ├─ size > max_alloc_size ──────────────► jumbo block (own heap region)
//!     ├─ recycler head big enough? ──yes────┐
//!     └─ no: master head too small? demote  │
//!           it; no master head? new block   │
//!                       │                   │
//!                       ▼                   ▼
//!                 split_free_chunk ──► cycle recycler ──► mark used
//!
//!   free(ptr)
//!     ├─ jumbo ──► release block
//!     └─ mark free ──► merge_free ──► cycle recycler
//! ```

mod coalesce;
mod jumbo;
mod verify;

pub use verify::VerifyError;

use crate::block::{Block, BlockList};
use crate::chunk::{Chunk, ChunkHeader};
use crate::config::{BlockConfig, ConfigError};
use crate::master::MasterStack;
use crate::os::{Heap, OsMemory};
use crate::recycler::Recycler;
use crate::stats::BlockStats;
use core::ptr::{self, NonNull};
use log::{debug, trace};
use wmem_core::{AllocError, Allocator};

/// Large-block allocator for many small, short-lived allocations.
///
/// Memory is obtained from `M` in blocks of [`BlockConfig::block_size`] bytes
/// and carved into chunks. Requests too large for a standard block get a
/// dedicated jumbo block.
///
/// # Invariants
/// - Chunks in a block are contiguous and their lengths sum to the block's
///   usable size.
/// - Each chunk's `prev` distance equals its predecessor's length.
/// - No two neighbouring chunks are both free.
/// - Every free chunk large enough to hold list links is in exactly one of the
///   master stack or the recycler ring.
///
/// [`verify`](Self::verify) checks all of these.
pub struct BlockAllocator<M: OsMemory = Heap> {
    config: BlockConfig,
    os: M,
    blocks: BlockList,
    master: MasterStack,
    recycler: Recycler,
}

// Safety: the allocator exclusively owns every block it links to; nothing is
// shared with other instances, so moving it to another thread is sound when
// the memory source can move too.
unsafe impl<M: OsMemory + Send> Send for BlockAllocator<M> {}

impl Default for BlockAllocator<Heap> {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockAllocator<Heap> {
    /// An allocator with the default configuration over the global heap.
    ///
    /// No memory is requested until the first allocation.
    #[must_use]
    pub const fn new() -> Self {
        Self::from_parts(BlockConfig::new(), Heap)
    }

    /// An allocator with `config` over the global heap.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` is invalid.
    pub fn with_config(config: BlockConfig) -> Result<Self, ConfigError> {
        Self::with_memory(config, Heap)
    }
}

impl<M: OsMemory> BlockAllocator<M> {
    /// An allocator with `config` drawing blocks from `os`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` is invalid.
    pub fn with_memory(config: BlockConfig, os: M) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(config, os))
    }

    const fn from_parts(config: BlockConfig, os: M) -> Self {
        Self {
            config,
            os,
            blocks: BlockList::new(),
            master: MasterStack::new(),
            recycler: Recycler::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &BlockConfig {
        &self.config
    }

    /// The backing memory source.
    #[must_use]
    pub const fn memory(&self) -> &M {
        &self.os
    }

    /// Number of blocks currently obtained from the backing heap, jumbo
    /// blocks included.
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of jumbo blocks currently held.
    #[must_use]
    pub fn jumbo_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_jumbo()).count()
    }

    /// Accounting snapshot across all blocks and free lists.
    #[must_use]
    pub fn stats(&self) -> BlockStats {
        let mut stats = BlockStats::default();
        for block in self.blocks.iter() {
            stats.blocks += 1;
            stats.os_bytes += block.size();
            if block.is_jumbo() {
                stats.jumbo_blocks += 1;
                continue;
            }
            for chunk in block.chunks() {
                if chunk.is_used() {
                    stats.used_bytes += chunk.len();
                } else {
                    stats.free_bytes += chunk.len();
                }
            }
        }
        stats.tracked_free_bytes = self
            .master
            .iter()
            .chain(self.recycler.iter())
            .map(Chunk::len)
            .sum();
        stats
    }

    /// Usable bytes behind a live allocation. At least the size requested.
    ///
    /// # Safety
    /// `ptr` must be a live allocation of this allocator.
    #[must_use]
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        let chunk = unsafe { Chunk::from_data(ptr) };
        if chunk.is_jumbo() {
            let block = unsafe { Block::of_first_chunk(chunk) };
            block.usable_size() - crate::CHUNK_HEADER_SIZE
        } else {
            chunk.data_len()
        }
    }

    /// Allocate at least `size` bytes.
    ///
    /// # Errors
    /// Returns [`AllocError`] if a new block cannot be obtained. The allocator
    /// is left consistent.
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if size > self.config.max_alloc_size() {
            return self.alloc_jumbo(size);
        }

        let chunk = match self.recycler.head() {
            Some(head) if head.data_len() >= size => head,
            _ => {
                if let Some(head) = self.master.head()
                    && head.data_len() < size
                {
                    self.master.pop();
                    self.recycler.add(head);
                }

                match self.master.head() {
                    Some(head) => head,
                    None => self.new_block()?,
                }
            }
        };

        self.split_free_chunk(chunk, size);
        self.recycler.cycle();
        chunk.set_used(true);

        Ok(chunk.data())
    }

    /// Return an allocation.
    ///
    /// # Safety
    /// `ptr` must be a live allocation of this allocator.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        let chunk = unsafe { Chunk::from_data(ptr) };

        if chunk.is_jumbo() {
            unsafe { self.free_jumbo(chunk) };
            return;
        }

        chunk.set_used(false);
        self.merge_free(chunk);
        self.recycler.cycle();
    }

    /// Resize an allocation, in place where the right neighbour allows it.
    ///
    /// # Errors
    /// Returns [`AllocError`] if memory for a moved allocation cannot be
    /// obtained; `ptr` remains valid.
    ///
    /// # Safety
    /// `ptr` must be a live allocation of this allocator.
    pub unsafe fn realloc(&mut self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError> {
        let chunk = unsafe { Chunk::from_data(ptr) };

        if chunk.is_jumbo() {
            return unsafe { self.realloc_jumbo(chunk, size) };
        }

        let current = chunk.data_len();
        if size > current {
            if let Some(next) = chunk.next()
                && !next.is_used()
                && size <= current + next.len()
            {
                self.grow_into_next(chunk, next, size - current);
                self.recycler.cycle();
                return Ok(ptr);
            }

            let moved = self.alloc(size)?;
            // SAFETY: `moved` is a distinct live chunk of at least `size > current` bytes.
            unsafe {
                ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), current);
                self.free(ptr);
            }
            return Ok(moved);
        }

        if size < current {
            self.split_used_chunk(chunk, size);
            self.recycler.cycle();
        }

        Ok(ptr)
    }

    /// Invalidate every allocation at once.
    ///
    /// Standard blocks are kept and reset to a single free chunk each; jumbo
    /// blocks go back to the heap.
    pub fn free_all(&mut self) {
        self.master.clear();
        self.recycler.clear();

        let (mut reset, mut released) = (0_usize, 0_usize);
        for block in self.blocks.iter() {
            if block.is_jumbo() {
                self.release_block(block);
                released += 1;
            } else {
                self.init_block(block);
                reset += 1;
            }
        }

        debug!("free_all: {reset} blocks reset, {released} jumbo blocks released");
    }

    /// Return every completely unused standard block to the heap.
    pub fn gc(&mut self) {
        let (mut kept, mut released) = (0_usize, 0_usize);

        for block in self.blocks.iter() {
            let chunk = block.first_chunk();
            if !chunk.is_jumbo() && !chunk.is_used() && chunk.is_last() {
                self.forget_free_chunk(chunk);
                self.release_block(block);
                released += 1;
            } else {
                kept += 1;
            }
        }

        debug!("gc: {kept} blocks kept, {released} released");
    }

    /// Obtain and initialise a fresh standard block. Returns its only chunk,
    /// already pushed onto the master stack.
    fn new_block(&mut self) -> Result<Chunk, AllocError> {
        let size = self.config.block_size();
        let base = self.os.allocate(size).ok_or(AllocError::OutOfMemory { size })?;

        // SAFETY: fresh region of `size >= MIN_BLOCK_SIZE` bytes, ALIGN-aligned.
        let block = unsafe { Block::init(base, size) };
        self.blocks.push_front(block);
        trace!("new block {block:?} ({size} bytes)");

        Ok(self.init_block(block))
    }

    /// Reset `block` to one free chunk and push it onto the master stack.
    fn init_block(&mut self, block: Block) -> Chunk {
        let chunk = block.first_chunk();
        chunk.set_header(ChunkHeader::new().with_last(true));
        chunk.set_len(block.usable_size());
        self.master.push(chunk);
        chunk
    }

    /// Unlink `block` and hand it back to the heap.
    fn release_block(&mut self, block: Block) {
        self.blocks.unlink(block);
        trace!("releasing {block:?} ({} bytes)", block.size());
        // SAFETY: the block came from `self.os` with exactly this size.
        unsafe { self.os.release(block.base(), block.size()) };
    }

    /// Remove a tracked free chunk from whichever list holds it.
    ///
    /// Both lists share the node layout, so the neighbours are patched
    /// directly and only the head bookkeeping depends on the list.
    fn forget_free_chunk(&mut self, chunk: Chunk) {
        let links = chunk.links();

        if self.recycler.is_head(chunk) {
            if links.next == Some(chunk) {
                self.recycler.clear();
                return;
            }
            self.recycler.set_head(links.next);
        } else if self.master.is_head(chunk) {
            self.master.set_head(links.next);
        }

        if let Some(next) = links.next {
            next.set_free_prev(links.prev);
        }
        if let Some(prev) = links.prev {
            prev.set_free_next(links.next);
        }
    }
}

impl<M: OsMemory> Allocator for BlockAllocator<M> {
    fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        Self::alloc(self, size)
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>) {
        unsafe { Self::free(self, ptr) }
    }

    unsafe fn realloc(&mut self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError> {
        unsafe { Self::realloc(self, ptr, size) }
    }

    fn free_all(&mut self) {
        Self::free_all(self);
    }

    fn gc(&mut self) {
        Self::gc(self);
    }
}

impl<M: OsMemory> Drop for BlockAllocator<M> {
    fn drop(&mut self) {
        self.free_all();
        self.gc();
        debug_assert!(self.blocks.is_empty());
    }
}

impl<M: OsMemory> core::fmt::Debug for BlockAllocator<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("config", &self.config)
            .field("blocks", &self.blocks.len())
            .field("master_head", &self.master.head())
            .field("recycler_head", &self.recycler.head())
            .finish_non_exhaustive()
    }
}
