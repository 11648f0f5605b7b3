//! Splitting and merging of chunks inside standard blocks.
//!
//! A free chunk's list node lives in its data area, and the header of a chunk
//! split off to its right may land on top of that node. Every routine here
//! therefore reads the node it needs before writing any header.

use super::BlockAllocator;
use crate::chunk::{CHUNK_HEADER_SIZE, Chunk, ChunkHeader, FREE_LINKS_SIZE, align_size};
use crate::os::OsMemory;

impl<M: OsMemory> BlockAllocator<M> {
    /// Carve `size` data bytes off the front of the tracked free chunk
    /// `chunk`.
    ///
    /// The remainder takes over `chunk`'s place in whichever list held it. If
    /// the remainder could not be tracked, nothing is split and `chunk` is
    /// just taken off its list.
    pub(super) fn split_free_chunk(&mut self, chunk: Chunk, size: usize) {
        let aligned = align_size(size) + CHUNK_HEADER_SIZE;

        if chunk.data_len() < aligned + FREE_LINKS_SIZE {
            if self.master.is_head(chunk) {
                self.master.pop();
            } else if chunk.is_trackable() {
                self.recycler.remove(chunk);
            }
            return;
        }

        let links = chunk.links();
        let last = chunk.is_last();
        let available = chunk.len() - aligned;

        chunk.set_len(aligned);
        chunk.set_last(false);

        let extra = chunk.following();
        extra.set_header(ChunkHeader::new().with_last(last));
        extra.set_len(available);
        extra.set_prev_distance(aligned);

        if self.master.is_head(chunk) {
            self.master.replace_head(chunk, extra, links);
        } else {
            self.recycler.replace(chunk, extra, links);
        }

        if !last {
            extra.following().set_prev_distance(available);
        }
    }

    /// Shrink the used chunk `chunk` to `size` data bytes, returning the tail
    /// as a free chunk.
    ///
    /// Does nothing when the tail would be smaller than a chunk header.
    pub(super) fn split_used_chunk(&mut self, chunk: Chunk, size: usize) {
        let aligned = align_size(size) + CHUNK_HEADER_SIZE;

        if aligned > chunk.data_len() {
            return;
        }

        let last = chunk.is_last();
        let available = chunk.len() - aligned;

        chunk.set_len(aligned);
        chunk.set_last(false);

        let extra = chunk.following();
        extra.set_header(ChunkHeader::new().with_last(last));
        extra.set_len(available);
        extra.set_prev_distance(aligned);

        if !last {
            extra.following().set_prev_distance(available);
        }

        self.merge_free(extra);
    }

    /// Coalesce the newly free `chunk` with free neighbours and file the
    /// result in the right list.
    ///
    /// The master head is always the last chunk of its block, so it can only
    /// ever be the right neighbour. When it is, the merged chunk inherits its
    /// place on the master stack.
    pub(super) fn merge_free(&mut self, chunk: Chunk) {
        let mut merged = chunk;
        let mut right_free = None;
        let mut left_free = None;

        if let Some(right) = chunk.next()
            && !right.is_used()
        {
            if right.is_trackable() {
                right_free = Some((right, right.links()));
            }
            chunk.set_len(chunk.len() + right.len());
            chunk.set_last(right.is_last());
        }

        if let Some(left) = chunk.prev()
            && !left.is_used()
        {
            if left.is_trackable() {
                left_free = Some(left);
            }
            left.set_len(left.len() + chunk.len());
            left.set_last(chunk.is_last());
            merged = left;
        }

        if let Some(next) = merged.next() {
            next.set_prev_distance(merged.len());
        }

        match right_free {
            Some((right, links)) if self.master.is_head(right) => {
                if let Some(left) = left_free {
                    self.recycler.remove(left);
                }
                self.master.replace_head(right, merged, links);
            }
            _ => {
                if let Some((right, _)) = right_free {
                    self.recycler.remove(right);
                }
                if left_free.is_none() {
                    self.recycler.add(merged);
                }
            }
        }
    }

    /// Grow the used `chunk` by at least `extra` data bytes taken from its
    /// free right neighbour `next`.
    ///
    /// The caller has checked that `next` is big enough.
    pub(super) fn grow_into_next(&mut self, chunk: Chunk, next: Chunk, extra: usize) {
        // The absorbed piece brings its header along as data.
        self.split_free_chunk(next, extra.saturating_sub(CHUNK_HEADER_SIZE));

        chunk.set_len(chunk.len() + next.len());
        chunk.set_last(next.is_last());
        if let Some(after) = chunk.next() {
            after.set_prev_distance(chunk.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::chunk::{CHUNK_HEADER_SIZE, Chunk};
    use crate::{BLOCK_HEADER_SIZE, BlockAllocator, BlockConfig};
    use core::ptr::NonNull;

    const BLOCK: usize = 1024;
    const USABLE: usize = BLOCK - BLOCK_HEADER_SIZE;

    fn wmem() -> BlockAllocator {
        BlockAllocator::with_config(BlockConfig::new().with_block_size(BLOCK)).unwrap()
    }

    fn chunk(ptr: NonNull<u8>) -> Chunk {
        unsafe { Chunk::from_data(ptr) }
    }

    #[test]
    fn split_moves_master_head_behind_allocation() {
        let mut w = wmem();
        let c = chunk(w.alloc(40).unwrap());
        assert_eq!(c.len(), 64);

        let head = w.master.head().unwrap();
        assert_eq!(head, c.following());
        assert_eq!(head.prev_distance(), 64);
        assert_eq!(head.len(), USABLE - 64);
        assert!(head.is_last());
        assert!(w.recycler.head().is_none());
    }

    #[test]
    fn unsplittable_chunk_is_taken_whole() {
        let mut w = wmem();
        let c = chunk(w.alloc(USABLE - 2 * CHUNK_HEADER_SIZE - 8).unwrap());
        assert_eq!(c.len(), USABLE);
        assert!(c.is_last());
        assert!(w.master.head().is_none());
        w.verify().unwrap();
    }

    #[test]
    fn merge_left_keeps_recycler_entry() {
        let mut w = wmem();
        let a = w.alloc(32).unwrap();
        let b = w.alloc(32).unwrap();
        let _c = w.alloc(32).unwrap();

        unsafe { w.free(a) };
        assert_eq!(w.recycler.head(), Some(chunk(a)));
        unsafe { w.free(b) };
        assert_eq!(w.recycler.head(), Some(chunk(a)));
        assert_eq!(chunk(a).len(), 96);
        assert_eq!(w.recycler.iter().count(), 1);
        w.verify().unwrap();
    }

    #[test]
    fn merge_right_replaces_recycler_entry() {
        let mut w = wmem();
        let a = w.alloc(32).unwrap();
        let b = w.alloc(32).unwrap();
        let _c = w.alloc(32).unwrap();

        unsafe { w.free(b) };
        assert_eq!(w.recycler.head(), Some(chunk(b)));
        unsafe { w.free(a) };
        assert_eq!(w.recycler.head(), Some(chunk(a)));
        assert_eq!(chunk(a).len(), 96);
        assert_eq!(w.recycler.iter().count(), 1);
        w.verify().unwrap();
    }

    #[test]
    fn merge_both_sides_collapses_three_chunks() {
        let mut w = wmem();
        let a = w.alloc(32).unwrap();
        let b = w.alloc(32).unwrap();
        let c = w.alloc(32).unwrap();
        let d = w.alloc(32).unwrap();

        unsafe {
            w.free(a);
            w.free(c);
        }
        assert_eq!(w.recycler.iter().count(), 2);

        unsafe { w.free(b) };
        assert_eq!(w.recycler.iter().collect::<Vec<_>>(), vec![chunk(a)]);
        assert_eq!(chunk(a).len(), 144);
        assert_eq!(chunk(d).prev_distance(), 144);
        w.verify().unwrap();
    }

    #[test]
    fn merge_into_master_head_takes_its_place() {
        let mut w = wmem();
        let a = w.alloc(32).unwrap();
        let b = w.alloc(32).unwrap();

        unsafe { w.free(b) };
        assert_eq!(w.master.head(), Some(chunk(b)));
        assert!(w.recycler.head().is_none());

        unsafe { w.free(a) };
        assert_eq!(w.master.head(), Some(chunk(a)));
        assert_eq!(chunk(a).len(), USABLE);
        w.verify().unwrap();
    }

    #[test]
    fn shrink_returns_tail_to_master() {
        let mut w = wmem();
        let p = w.alloc(200).unwrap();
        let q = unsafe { w.realloc(p, 8) }.unwrap();
        assert_eq!(p, q);
        assert_eq!(chunk(p).len(), 32);
        assert_eq!(w.master.head(), Some(chunk(p).following()));
        w.verify().unwrap();
    }

    #[test]
    fn exact_fit_grows_in_place() {
        let mut w = wmem();
        let a = w.alloc(32).unwrap();
        let b = w.alloc(32).unwrap();
        let c = w.alloc(32).unwrap();

        unsafe { w.free(b) };
        let grown = unsafe { w.realloc(a, 32 + chunk(b).len()) }.unwrap();
        assert_eq!(grown, a);
        assert_eq!(chunk(a).len(), 96);
        assert_eq!(chunk(c).prev_distance(), 96);
        assert!(w.recycler.head().is_none());
        w.verify().unwrap();
    }

    #[test]
    fn dark_tail_from_shrink_stays_unlisted() {
        let mut w = wmem();
        let p = w.alloc(48).unwrap();
        let pin = w.alloc(8).unwrap();

        unsafe { w.realloc(p, 32) }.unwrap();
        let tail = chunk(p).following();
        assert_eq!(tail.len(), CHUNK_HEADER_SIZE);
        assert!(!tail.is_used());
        assert_eq!(chunk(pin).prev_distance(), CHUNK_HEADER_SIZE);
        assert!(w.recycler.head().is_none());

        let stats = w.stats();
        assert_eq!(stats.free_bytes - stats.tracked_free_bytes, CHUNK_HEADER_SIZE);
        w.verify().unwrap();
    }
}
