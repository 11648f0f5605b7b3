//! # Master stack
//!
//! Stack of free chunks fed by fresh blocks. Only the head is ever split; the
//! remainder of a split stays at the head until it is too small for a request,
//! at which point the allocator demotes it to the recycler.
//!
//! ```text
//!   head ──► [chunk] ◄──► [chunk] ◄──► [chunk] ──► None
//!            prev=None
//! ```

use crate::chunk::{Chunk, FreeLinks};

#[derive(Debug, Default)]
pub(crate) struct MasterStack {
    head: Option<Chunk>,
}

impl MasterStack {
    pub const fn new() -> Self {
        Self { head: None }
    }

    #[inline]
    pub const fn head(&self) -> Option<Chunk> {
        self.head
    }

    #[inline]
    pub fn is_head(&self, chunk: Chunk) -> bool {
        self.head == Some(chunk)
    }

    pub fn push(&mut self, chunk: Chunk) {
        chunk.set_links(FreeLinks {
            prev: None,
            next: self.head,
        });
        if let Some(old) = self.head {
            old.set_free_prev(Some(chunk));
        }
        self.head = Some(chunk);
    }

    pub fn pop(&mut self) -> Option<Chunk> {
        let chunk = self.head?;
        let next = chunk.free_next();
        if let Some(next) = next {
            next.set_free_prev(None);
        }
        self.head = next;
        Some(chunk)
    }

    /// Put `new` at the head in place of `old`.
    ///
    /// `old_links` is `old`'s node as read before `old`'s memory was reused;
    /// `new` may overlap it.
    pub fn replace_head(&mut self, old: Chunk, new: Chunk, old_links: FreeLinks) {
        debug_assert!(self.is_head(old));
        new.set_links(FreeLinks {
            prev: None,
            next: old_links.next,
        });
        if let Some(next) = old_links.next {
            next.set_free_prev(Some(new));
        }
        self.head = Some(new);
    }

    /// Advance the head past a chunk that was unlinked by hand.
    pub fn set_head(&mut self, head: Option<Chunk>) {
        self.head = head;
    }

    pub fn clear(&mut self) {
        self.head = None;
    }

    /// Walk the stack from the head.
    pub fn iter(&self) -> impl Iterator<Item = Chunk> + use<> {
        core::iter::successors(self.head, |c| c.free_next())
    }
}
