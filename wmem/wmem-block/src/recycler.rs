//! # Recycler ring
//!
//! Circular doubly linked ring of free chunks of mixed sizes, gathered from
//! splits and frees. The allocator keeps one entry point, the head, and tries
//! to serve requests from it first.
//!
//! Nothing keeps the ring sorted. Instead, [`Recycler::add`] promotes a chunk
//! to head if it is larger than the current head, and [`Recycler::cycle`]
//! performs one O(1) step after every allocation and free that tends to
//! surface the largest chunk at the head:
//!
//! ```text
//!   next smaller than head:           next at least as large:
//!
//!     P ─► H ─► N ─► X                  P ─► H ─► N ─► X
//!                                                 ▲
//!     P ─► N ─► H ─► X                          head
//!          (head stays, N moves behind it)   (head advances)
//! ```

use crate::chunk::{Chunk, FreeLinks};

#[derive(Debug, Default)]
pub(crate) struct Recycler {
    head: Option<Chunk>,
}

/// Ring neighbours of `chunk`. A missing link reads as a self-loop.
#[inline]
fn ring(chunk: Chunk) -> (Chunk, Chunk) {
    let links = chunk.links();
    (links.prev.unwrap_or(chunk), links.next.unwrap_or(chunk))
}

impl Recycler {
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

    /// Insert `chunk` just before the head.
    ///
    /// Chunks too small to carry links are left untracked; returns whether the
    /// chunk was inserted.
    pub fn add(&mut self, chunk: Chunk) -> bool {
        if !chunk.is_trackable() {
            return false;
        }

        match self.head {
            None => {
                chunk.set_links(FreeLinks::looped(chunk));
                self.head = Some(chunk);
            }
            Some(head) => {
                let (prev, _) = ring(head);
                chunk.set_links(FreeLinks {
                    prev: Some(prev),
                    next: Some(head),
                });
                head.set_free_prev(Some(chunk));
                prev.set_free_next(Some(chunk));

                if chunk.len() > head.len() {
                    self.head = Some(chunk);
                }
            }
        }
        true
    }

    pub fn remove(&mut self, chunk: Chunk) {
        let (prev, next) = ring(chunk);

        if prev == chunk && next == chunk {
            self.head = None;
            return;
        }

        prev.set_free_next(Some(next));
        next.set_free_prev(Some(prev));
        if self.is_head(chunk) {
            self.head = Some(next);
        }
    }

    /// Put `new` into the ring exactly where `old` was.
    ///
    /// `old_links` is `old`'s node as read before `old`'s memory was reused;
    /// `new` may overlap it.
    pub fn replace(&mut self, old: Chunk, new: Chunk, old_links: FreeLinks) {
        let prev = old_links.prev.unwrap_or(old);
        let next = old_links.next.unwrap_or(old);

        if prev == old {
            new.set_links(FreeLinks::looped(new));
        } else {
            new.set_links(FreeLinks {
                prev: Some(prev),
                next: Some(next),
            });
            prev.set_free_next(Some(new));
            next.set_free_prev(Some(new));
        }

        if self.is_head(old) {
            self.head = Some(new);
        }
    }

    /// One step of the self-improving rotation.
    pub fn cycle(&mut self) {
        let Some(head) = self.head else {
            return;
        };
        let (_, next) = ring(head);

        if next.len() < head.len() {
            // Hold the head fixed and move `next` in behind it.
            let (prev, _) = ring(head);
            next.set_free_prev(Some(prev));
            prev.set_free_next(Some(next));

            let after = ring(next).1;
            head.set_free_prev(Some(next));
            head.set_free_next(Some(after));

            after.set_free_prev(Some(head));
            next.set_free_next(Some(head));
        } else {
            self.head = Some(next);
        }
    }

    /// Advance the head past a chunk that was unlinked by hand.
    pub fn set_head(&mut self, head: Option<Chunk>) {
        self.head = head;
    }

    pub fn clear(&mut self) {
        self.head = None;
    }

    /// Walk the ring once, starting at the head.
    pub fn iter(&self) -> impl Iterator<Item = Chunk> + use<> {
        let start = self.head;
        core::iter::successors(start, move |c| c.free_next().filter(|n| Some(*n) != start))
    }
}
