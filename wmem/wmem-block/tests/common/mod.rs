#![allow(dead_code)]

use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;
use wmem_block::{BlockAllocator, BlockConfig, Heap, OsMemory};

/// Small blocks so tests cross block boundaries and reach the jumbo path
/// quickly.
pub const SMALL_BLOCK: usize = 4096;

pub fn small() -> BlockAllocator {
    BlockAllocator::with_config(BlockConfig::new().with_block_size(SMALL_BLOCK)).unwrap()
}

/// xorshift+ generator; reproducible across runs.
pub struct XorShift([u64; 2]);

impl XorShift {
    pub const fn new(seed: u64) -> Self {
        Self([seed | 1, 0xDEAD_BEEF])
    }

    pub fn next_u64(&mut self) -> u64 {
        let [mut x, y] = self.0;
        x ^= x << 23;
        let next = x ^ y ^ (x >> 17) ^ (y >> 26);
        self.0 = [y, next];
        next.wrapping_add(y)
    }

    /// Uniform-ish in `0..n`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

/// Write `tag` over the first (up to) eight bytes of an allocation, and over
/// the last eight too once the two no longer overlap.
pub fn stamp(ptr: NonNull<u8>, len: usize, tag: u64) {
    let bytes = tag.to_le_bytes();
    let n = len.min(8);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), n);
        if len >= 16 {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr().add(len - 8), 8);
        }
    }
}

/// Check a stamp written by [`stamp`] over `len` bytes.
pub fn stamped(ptr: NonNull<u8>, len: usize, tag: u64) -> bool {
    let bytes = tag.to_le_bytes();
    let n = len.min(8);
    unsafe {
        let head = std::slice::from_raw_parts(ptr.as_ptr(), n);
        let tail_ok = len < 16 || std::slice::from_raw_parts(ptr.as_ptr().add(len - 8), 8) == &bytes[..];
        head == &bytes[..n] && tail_ok
    }
}

/// Fill an allocation with a position-dependent pattern.
pub fn fill(ptr: NonNull<u8>, len: usize, seed: u8) {
    for i in 0..len {
        unsafe { ptr.as_ptr().add(i).write(pattern(i, seed)) };
    }
}

/// Check the pattern written by [`fill`].
pub fn filled(ptr: NonNull<u8>, len: usize, seed: u8) -> bool {
    (0..len).all(|i| unsafe { ptr.as_ptr().add(i).read() } == pattern(i, seed))
}

fn pattern(i: usize, seed: u8) -> u8 {
    i.to_le_bytes()[0] ^ seed
}

/// Counters shared between a test and the [`ScriptedMemory`] it hands to an
/// allocator.
#[derive(Debug, Default)]
pub struct MemoryLog {
    /// Regions currently held by the allocator.
    pub outstanding: Cell<usize>,
    /// Bytes currently held by the allocator.
    pub bytes: Cell<usize>,
    /// Remaining requests to grant; `None` grants everything.
    pub budget: Cell<Option<usize>>,
}

impl MemoryLog {
    pub fn deny_all(&self) {
        self.budget.set(Some(0));
    }

    pub fn allow(&self, n: usize) {
        self.budget.set(Some(n));
    }

    pub fn allow_all(&self) {
        self.budget.set(None);
    }

    fn take(&self) -> bool {
        match self.budget.get() {
            None => true,
            Some(0) => false,
            Some(n) => {
                self.budget.set(Some(n - 1));
                true
            }
        }
    }
}

/// [`Heap`] with bookkeeping and a switchable request budget.
#[derive(Debug, Default, Clone)]
pub struct ScriptedMemory {
    pub log: Rc<MemoryLog>,
}

impl OsMemory for ScriptedMemory {
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if !self.log.take() {
            return None;
        }
        let ptr = Heap.allocate(size)?;
        self.log.outstanding.set(self.log.outstanding.get() + 1);
        self.log.bytes.set(self.log.bytes.get() + size);
        Some(ptr)
    }

    unsafe fn reallocate(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>> {
        if !self.log.take() {
            return None;
        }
        let ptr = unsafe { Heap.reallocate(ptr, old_size, new_size) }?;
        self.log.bytes.set(self.log.bytes.get() - old_size + new_size);
        Some(ptr)
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize) {
        self.log.outstanding.set(self.log.outstanding.get() - 1);
        self.log.bytes.set(self.log.bytes.get() - size);
        unsafe { Heap.release(ptr, size) }
    }
}

/// An allocator over [`ScriptedMemory`] and the log to observe it with.
pub fn scripted(block_size: usize) -> (BlockAllocator<ScriptedMemory>, Rc<MemoryLog>) {
    let memory = ScriptedMemory::default();
    let log = Rc::clone(&memory.log);
    let config = BlockConfig::new().with_block_size(block_size);
    (BlockAllocator::with_memory(config, memory).unwrap(), log)
}
