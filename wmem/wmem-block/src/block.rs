//! # Blocks
//!
//! A block is one region obtained from the backing heap. It starts with a
//! [`BlockHeader`] linking it into the allocator's block list, followed by the
//! chunk area:
//!
//! ```text
//!  block base          base + BLOCK_HEADER_SIZE
//!  ▼                   ▼
//!  +-------------------+--------+--------+-----+--------+
//!  | prev | next | size| chunk  | chunk  | ... | chunk  |
//!  +-------------------+--------+--------+-----+--------+
//!                      ◄──────────── usable_size ───────►
//! ```
//!
//! The header records the block's total size so the block can be handed back
//! to the heap with the exact size it was obtained with; jumbo blocks all
//! differ in size.

use crate::chunk::{Chunk, align_size};
use core::alloc::Layout;
use core::ptr::NonNull;

/// Block header, stored at the start of every block.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
struct BlockHeader {
    prev: Option<Block>,
    next: Option<Block>,
    size: usize,
}

/// Size of the block header once padded to [`ALIGN`](crate::ALIGN).
pub const BLOCK_HEADER_SIZE: usize = align_size(size_of::<BlockHeader>());

/// Total block size needed to hold one chunk with `data_len` data bytes.
///
/// Returns `None` if the sum overflows or cannot be described by a [`Layout`].
pub(crate) fn block_size_for(data_len: usize) -> Option<usize> {
    let size = data_len
        .checked_add(BLOCK_HEADER_SIZE)?
        .checked_add(crate::CHUNK_HEADER_SIZE)?;
    Layout::from_size_align(size, crate::ALIGN).ok()?;
    Some(size)
}

/// Handle to a live block.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct Block(NonNull<BlockHeader>);

impl Block {
    /// Write a fresh, unlinked header at `base`.
    ///
    /// # Safety
    /// `base` must be [`ALIGN`](crate::ALIGN)-aligned and valid for writes of
    /// `size` bytes, with `size >= BLOCK_HEADER_SIZE`.
    pub unsafe fn init(base: NonNull<u8>, size: usize) -> Self {
        let block = unsafe { Self::from_base(base) };
        block.write(BlockHeader {
            prev: None,
            next: None,
            size,
        });
        block
    }

    /// # Safety
    /// `base` must point at an initialised block header.
    #[allow(clippy::cast_ptr_alignment)] // block bases are ALIGN-aligned
    pub const unsafe fn from_base(base: NonNull<u8>) -> Self {
        Self(base.cast::<BlockHeader>())
    }

    /// The block whose first chunk is `chunk`.
    ///
    /// # Safety
    /// `chunk` must be the first chunk of its block (`prev_distance == 0`).
    pub unsafe fn of_first_chunk(chunk: Chunk) -> Self {
        debug_assert_eq!(chunk.prev_distance(), 0);
        unsafe { Self::from_base(chunk.base().sub(BLOCK_HEADER_SIZE)) }
    }

    #[inline]
    fn read(self) -> BlockHeader {
        // SAFETY: see type-level invariant.
        unsafe { self.0.as_ptr().read() }
    }

    #[inline]
    fn write(self, header: BlockHeader) {
        // SAFETY: see type-level invariant.
        unsafe { self.0.as_ptr().write(header) }
    }

    #[inline]
    pub fn base(self) -> NonNull<u8> {
        self.0.cast()
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0.as_ptr().addr()
    }

    /// Total size as obtained from the backing heap.
    #[inline]
    pub fn size(self) -> usize {
        self.read().size
    }

    #[inline]
    pub fn set_size(self, size: usize) {
        self.write(BlockHeader { size, ..self.read() });
    }

    /// Bytes available to chunks.
    #[inline]
    pub fn usable_size(self) -> usize {
        self.size() - BLOCK_HEADER_SIZE
    }

    #[inline]
    pub fn first_chunk(self) -> Chunk {
        // SAFETY: the chunk area starts right after the header.
        unsafe { Chunk::from_base(self.base().add(BLOCK_HEADER_SIZE)) }
    }

    #[inline]
    pub fn is_jumbo(self) -> bool {
        self.first_chunk().is_jumbo()
    }

    /// Walk the chunks of a non-jumbo block in address order.
    pub fn chunks(self) -> Chunks {
        Chunks {
            next: Some(self.first_chunk()),
        }
    }

    fn prev(self) -> Option<Self> {
        self.read().prev
    }

    fn next(self) -> Option<Self> {
        self.read().next
    }

    fn set_prev(self, prev: Option<Self>) {
        self.write(BlockHeader { prev, ..self.read() });
    }

    fn set_next(self, next: Option<Self>) {
        self.write(BlockHeader { next, ..self.read() });
    }
}

impl core::fmt::Debug for Block {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Block({:p})", self.0)
    }
}

/// Address-order walk over the chunks of one block.
pub(crate) struct Chunks {
    next: Option<Chunk>,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let chunk = self.next?;
        self.next = chunk.next();
        Some(chunk)
    }
}

/// Doubly linked list of every block an allocator owns.
#[derive(Debug, Default)]
pub(crate) struct BlockList {
    head: Option<Block>,
    len: usize,
}

impl BlockList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Make `block` the new head.
    pub fn push_front(&mut self, block: Block) {
        block.set_prev(None);
        block.set_next(self.head);
        if let Some(old) = self.head {
            old.set_prev(Some(block));
        }
        self.head = Some(block);
        self.len += 1;
    }

    /// Remove `block` from the list. The block's memory is left untouched
    /// apart from its own links.
    pub fn unlink(&mut self, block: Block) {
        let prev = block.prev();
        let next = block.next();

        match prev {
            Some(prev) => prev.set_next(next),
            None => self.head = next,
        }
        if let Some(next) = next {
            next.set_prev(prev);
        }

        block.set_prev(None);
        block.set_next(None);
        self.len -= 1;
    }

    /// Re-point the neighbours of a block whose memory was moved.
    ///
    /// `block` is the block at its new address, with its header (and thus its
    /// `prev`/`next` links) carried over from the old address.
    pub fn relocate(&mut self, block: Block) {
        match block.prev() {
            Some(prev) => prev.set_next(Some(block)),
            None => self.head = Some(block),
        }
        if let Some(next) = block.next() {
            next.set_prev(Some(block));
        }
    }

    /// Iterate over the blocks.
    ///
    /// The iterator fetches each block's successor before yielding it, and
    /// does not borrow the list, so the yielded block may be unlinked and
    /// released from inside the loop.
    pub fn iter(&self) -> Blocks {
        Blocks { next: self.head }
    }
}

/// Iterator returned by [`BlockList::iter`].
pub(crate) struct Blocks {
    next: Option<Block>,
}

impl Iterator for Blocks {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.next?;
        self.next = block.next();
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{CHUNK_HEADER_SIZE, ChunkHeader};

    #[repr(C, align(16))]
    struct Region([u8; 512]);

    fn region() -> Box<Region> {
        Box::new(Region([0; 512]))
    }

    fn block_in(region: &mut Region) -> Block {
        let base = NonNull::new(region.0.as_mut_ptr()).unwrap();
        unsafe { Block::init(base, region.0.len()) }
    }

    #[test]
    fn header_size_is_aligned() {
        assert_eq!(BLOCK_HEADER_SIZE % crate::ALIGN, 0);
        assert!(BLOCK_HEADER_SIZE >= 3 * size_of::<usize>());
    }

    #[test]
    fn block_size_for_checks_overflow() {
        assert_eq!(block_size_for(0), Some(BLOCK_HEADER_SIZE + CHUNK_HEADER_SIZE));
        assert_eq!(block_size_for(usize::MAX), None);
        assert_eq!(block_size_for(isize::MAX as usize), None);
    }

    #[test]
    fn first_chunk_round_trips() {
        let mut r = region();
        let block = block_in(&mut r);
        let chunk = block.first_chunk();
        chunk.set_header(ChunkHeader::new().with_len(32).with_last(true));
        assert_eq!(unsafe { Block::of_first_chunk(chunk) }, block);
        assert_eq!(block.usable_size(), 512 - BLOCK_HEADER_SIZE);
    }

    #[test]
    fn chunk_walk_visits_all() {
        let mut r = region();
        let block = block_in(&mut r);
        let first = block.first_chunk();
        first.set_header(ChunkHeader::new().with_len(64));
        let rest = block.usable_size() - 64;
        first
            .following()
            .set_header(ChunkHeader::new().with_len(rest as u32).with_prev(64).with_last(true));

        let lens: Vec<usize> = block.chunks().map(Chunk::len).collect();
        assert_eq!(lens, vec![64, rest]);
    }

    #[test]
    fn list_push_unlink_relocate() {
        let (mut r1, mut r2, mut r3) = (region(), region(), region());
        let (a, b, c) = (block_in(&mut r1), block_in(&mut r2), block_in(&mut r3));

        let mut list = BlockList::new();
        list.push_front(a);
        list.push_front(b);
        list.push_front(c);
        assert_eq!(list.len(), 3);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![c, b, a]);

        list.unlink(b);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![c, a]);

        // Move `a` by copying its header somewhere else.
        let mut r4 = region();
        let moved = unsafe {
            core::ptr::copy_nonoverlapping(r1.0.as_ptr(), r4.0.as_mut_ptr(), BLOCK_HEADER_SIZE);
            Block::from_base(NonNull::new(r4.0.as_mut_ptr()).unwrap())
        };
        list.relocate(moved);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![c, moved]);

        list.unlink(c);
        list.unlink(moved);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn iteration_survives_unlinking_current() {
        let (mut r1, mut r2) = (region(), region());
        let (a, b) = (block_in(&mut r1), block_in(&mut r2));
        let mut list = BlockList::new();
        list.push_front(a);
        list.push_front(b);

        let mut seen = Vec::new();
        for block in list.iter() {
            list.unlink(block);
            seen.push(block);
        }
        assert_eq!(seen, vec![b, a]);
        assert!(list.is_empty());
    }
}
