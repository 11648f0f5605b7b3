//! Oversized requests, each served by a dedicated block.
//!
//! A jumbo block holds a single used chunk with the `jumbo` flag set and a
//! `len` of zero; the real size lives in the block header.

use super::BlockAllocator;
use crate::block::{Block, block_size_for};
use crate::chunk::{Chunk, ChunkHeader};
use crate::os::OsMemory;
use core::ptr::NonNull;
use log::trace;
use wmem_core::AllocError;

impl<M: OsMemory> BlockAllocator<M> {
    pub(super) fn alloc_jumbo(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let block_size = block_size_for(size).ok_or(AllocError::SizeOverflow { size })?;
        let base = self
            .os
            .allocate(block_size)
            .ok_or(AllocError::OutOfMemory { size: block_size })?;

        // SAFETY: fresh region of `block_size` bytes, ALIGN-aligned.
        let block = unsafe { Block::init(base, block_size) };
        self.blocks.push_front(block);

        let chunk = block.first_chunk();
        chunk.set_header(
            ChunkHeader::new()
                .with_last(true)
                .with_used(true)
                .with_jumbo(true),
        );

        trace!("jumbo {block:?} for {size} bytes");
        Ok(chunk.data())
    }

    /// # Safety
    /// `chunk` must be a live jumbo chunk of this allocator.
    pub(super) unsafe fn free_jumbo(&mut self, chunk: Chunk) {
        let block = unsafe { Block::of_first_chunk(chunk) };
        self.release_block(block);
    }

    /// Resize the jumbo block behind `chunk`. The result stays jumbo whatever
    /// the new size.
    ///
    /// # Safety
    /// `chunk` must be a live jumbo chunk of this allocator.
    pub(super) unsafe fn realloc_jumbo(&mut self, chunk: Chunk, size: usize) -> Result<NonNull<u8>, AllocError> {
        let new_size = block_size_for(size).ok_or(AllocError::SizeOverflow { size })?;
        let block = unsafe { Block::of_first_chunk(chunk) };
        let old_size = block.size();

        // SAFETY: the block came from `self.os` with `old_size` bytes.
        let base = unsafe { self.os.reallocate(block.base(), old_size, new_size) }
            .ok_or(AllocError::OutOfMemory { size: new_size })?;

        // SAFETY: the reallocated region starts with the carried-over header.
        let moved = unsafe { Block::from_base(base) };
        moved.set_size(new_size);
        self.blocks.relocate(moved);

        trace!("jumbo {block:?} -> {moved:?}, {old_size} -> {new_size} bytes");
        Ok(moved.first_chunk().data())
    }
}
