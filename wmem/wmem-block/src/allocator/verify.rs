//! Full consistency check of blocks and free lists.
//!
//! Walks every block chunk by chunk, then both free lists, and compares the
//! two views. List entries are only dereferenced once they are known to be
//! chunk headers inside a live block, so a corrupted list is reported rather
//! than followed into the weeds.

use super::BlockAllocator;
use crate::block::Block;
use crate::chunk::{ALIGN, CHUNK_HEADER_SIZE, Chunk};
use crate::os::OsMemory;
use alloc::collections::BTreeSet;

/// A broken allocator invariant. Addresses are of the offending block or
/// chunk header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("block {block:#x}: chunk lengths sum to {sum}, expected {usable}")]
    LengthMismatch { block: usize, sum: usize, usable: usize },
    #[error("block {block:#x}: first chunk claims a predecessor")]
    FirstChunkHasPredecessor { block: usize },
    #[error("chunk {chunk:#x}: invalid length {len}")]
    BadChunkLength { chunk: usize, len: usize },
    #[error("block {block:#x}: chunk {chunk:#x} runs past the end of the block")]
    ChunkOverrun { block: usize, chunk: usize },
    #[error("chunk {chunk:#x}: back distance {found}, predecessor length {expected}")]
    BackDistanceMismatch { chunk: usize, expected: usize, found: usize },
    #[error("chunk {chunk:#x}: free and next to another free chunk")]
    AdjacentFree { chunk: usize },
    #[error("block {block:#x}: malformed jumbo block")]
    MalformedJumbo { block: usize },
    #[error("chunk {chunk:#x}: master stack link broken")]
    MasterLinkBroken { chunk: usize },
    #[error("chunk {chunk:#x}: on the master stack but not last in its block")]
    MasterChunkNotLast { chunk: usize },
    #[error("chunk {chunk:#x}: recycler ring link broken")]
    RingBroken { chunk: usize },
    #[error("chunk {chunk:#x}: listed as free but in use")]
    ListedChunkInUse { chunk: usize },
    #[error("chunk {chunk:#x}: listed but not a trackable free chunk of any block")]
    ForeignListEntry { chunk: usize },
    #[error("chunk {chunk:#x}: listed more than once")]
    DuplicateListEntry { chunk: usize },
    #[error("chunk {chunk:#x}: free but on no list")]
    UntrackedFreeChunk { chunk: usize },
    #[error("free lists hold {listed} bytes, blocks hold {in_blocks} trackable free bytes")]
    FreeBytesMismatch { listed: usize, in_blocks: usize },
}

/// What the block walk found.
#[derive(Default)]
struct Census {
    /// Every chunk header in a standard block.
    chunks: BTreeSet<usize>,
    /// Free chunks large enough to be listed.
    trackable: BTreeSet<usize>,
    trackable_bytes: usize,
}

impl Census {
    /// Admit `chunk` as a list entry: it must be a trackable free chunk.
    fn admit(&self, chunk: Chunk) -> Result<(), VerifyError> {
        let addr = chunk.addr();
        if self.trackable.contains(&addr) {
            Ok(())
        } else if self.chunks.contains(&addr) && chunk.is_used() {
            Err(VerifyError::ListedChunkInUse { chunk: addr })
        } else {
            Err(VerifyError::ForeignListEntry { chunk: addr })
        }
    }
}

impl<M: OsMemory> BlockAllocator<M> {
    /// Check every structural invariant of the allocator.
    ///
    /// Cost is linear in the number of chunks; meant for tests and debugging.
    ///
    /// # Errors
    /// Returns the first [`VerifyError`] found.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let mut census = Census::default();
        for block in self.blocks.iter() {
            if block.is_jumbo() {
                verify_jumbo(block)?;
            } else {
                verify_block(block, &mut census)?;
            }
        }

        let mut seen = BTreeSet::new();
        let mut listed_bytes = 0;
        self.verify_master(&census, &mut seen, &mut listed_bytes)?;
        self.verify_recycler(&census, &mut seen, &mut listed_bytes)?;

        if let Some(&chunk) = census.trackable.difference(&seen).next() {
            return Err(VerifyError::UntrackedFreeChunk { chunk });
        }
        if listed_bytes != census.trackable_bytes {
            return Err(VerifyError::FreeBytesMismatch {
                listed: listed_bytes,
                in_blocks: census.trackable_bytes,
            });
        }
        Ok(())
    }

    fn verify_master(
        &self,
        census: &Census,
        seen: &mut BTreeSet<usize>,
        listed_bytes: &mut usize,
    ) -> Result<(), VerifyError> {
        let mut prev: Option<Chunk> = None;
        let mut cursor = self.master.head();

        while let Some(chunk) = cursor {
            census.admit(chunk)?;
            let addr = chunk.addr();
            if !seen.insert(addr) {
                return Err(VerifyError::DuplicateListEntry { chunk: addr });
            }
            if !chunk.is_last() {
                return Err(VerifyError::MasterChunkNotLast { chunk: addr });
            }

            let links = chunk.links();
            if links.prev != prev {
                return Err(VerifyError::MasterLinkBroken { chunk: addr });
            }

            *listed_bytes += chunk.len();
            prev = Some(chunk);
            cursor = links.next;
        }
        Ok(())
    }

    fn verify_recycler(
        &self,
        census: &Census,
        seen: &mut BTreeSet<usize>,
        listed_bytes: &mut usize,
    ) -> Result<(), VerifyError> {
        let Some(head) = self.recycler.head() else {
            return Ok(());
        };

        let mut chunk = head;
        loop {
            census.admit(chunk)?;
            let addr = chunk.addr();
            if !seen.insert(addr) {
                return Err(VerifyError::DuplicateListEntry { chunk: addr });
            }
            *listed_bytes += chunk.len();

            let Some(next) = chunk.links().next else {
                return Err(VerifyError::RingBroken { chunk: addr });
            };
            census.admit(next)?;
            if next.free_prev() != Some(chunk) {
                return Err(VerifyError::RingBroken { chunk: next.addr() });
            }

            if next == head {
                return Ok(());
            }
            chunk = next;
        }
    }
}

fn verify_jumbo(block: Block) -> Result<(), VerifyError> {
    let header = block.first_chunk().header();
    if header.used() && header.last() && header.prev() == 0 && header.len() == 0 {
        Ok(())
    } else {
        Err(VerifyError::MalformedJumbo { block: block.addr() })
    }
}

fn verify_block(block: Block, census: &mut Census) -> Result<(), VerifyError> {
    let usable = block.usable_size();
    let first = block.first_chunk();
    if first.prev_distance() != 0 {
        return Err(VerifyError::FirstChunkHasPredecessor { block: block.addr() });
    }

    let mut offset = 0;
    let mut chunk = first;
    let mut prev: Option<Chunk> = None;
    loop {
        let len = chunk.len();
        if len < CHUNK_HEADER_SIZE || !len.is_multiple_of(ALIGN) || chunk.is_jumbo() {
            return Err(VerifyError::BadChunkLength { chunk: chunk.addr(), len });
        }
        offset += len;
        if offset > usable || (offset == usable && !chunk.is_last()) {
            return Err(VerifyError::ChunkOverrun {
                block: block.addr(),
                chunk: chunk.addr(),
            });
        }

        if let Some(prev) = prev {
            if chunk.prev_distance() != prev.len() {
                return Err(VerifyError::BackDistanceMismatch {
                    chunk: chunk.addr(),
                    expected: prev.len(),
                    found: chunk.prev_distance(),
                });
            }
            if !prev.is_used() && !chunk.is_used() {
                return Err(VerifyError::AdjacentFree { chunk: chunk.addr() });
            }
        }

        census.chunks.insert(chunk.addr());
        if !chunk.is_used() && chunk.is_trackable() {
            census.trackable.insert(chunk.addr());
            census.trackable_bytes += len;
        }

        if chunk.is_last() {
            break;
        }
        prev = Some(chunk);
        chunk = chunk.following();
    }

    if offset == usable {
        Ok(())
    } else {
        Err(VerifyError::LengthMismatch {
            block: block.addr(),
            sum: offset,
            usable,
        })
    }
}
