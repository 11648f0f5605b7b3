//! # Block Allocator
//!
//! A large-block allocator tuned for the packet-analysis workload: huge
//! numbers of small allocations that mostly die together. It implements the
//! [`wmem_core::Allocator`] contract.
//!
//! ## Layout
//!
//! Memory is obtained from the backing heap in *blocks* (8 MiB by default).
//! Each block is carved into *chunks*, every one of them prefixed by a small
//! header, so the chunks of a block tile it exactly:
//!
//! ```text
//! ┌──────────────┬──────────┬──────────────┬──────────┬───────────────────┐
//! │ block header │ chunk A  │ chunk B      │ chunk C  │ chunk D           │
//! │ prev/next/sz │ used     │ free         │ used     │ free (master)     │
//! └──────────────┴──────────┴──────────────┴──────────┴───────────────────┘
//! ```
//!
//! Requests larger than a standard block can serve get a *jumbo* block of
//! their own, returned to the heap as soon as they are freed.
//!
//! ## Free space
//!
//! Free chunks are found through two intrusive lists stored inside the free
//! chunks themselves:
//!
//! * the **master stack**, holding the untouched tail of the most recent
//!   block (and whole blocks after [`BlockAllocator::free_all`]);
//! * the **recycler ring**, holding everything freed or left over, with a
//!   cheap rotation step after each operation that tends to keep the largest
//!   chunk at its head.
//!
//! Freeing a chunk merges it with free neighbours on both sides, so no two
//! free chunks are ever adjacent. Free chunks too small to carry list links
//! stay unlisted until a neighbour is freed.
//!
//! ## Footprint
//!
//! Blocks that become completely free are kept for reuse until
//! [`BlockAllocator::gc`] hands them back. [`BlockAllocator::stats`] and
//! [`BlockAllocator::verify`] expose the allocator's state for tests and
//! tooling.
//!
//! ## Example
//!
//! ```
//! use wmem_block::BlockAllocator;
//!
//! let mut wmem = BlockAllocator::new();
//! let ptr = wmem.alloc(64).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0x5A, 64) };
//! let ptr = unsafe { wmem.realloc(ptr, 128) }.unwrap();
//! unsafe { wmem.free(ptr) };
//! wmem.gc();
//! assert_eq!(wmem.block_count(), 0);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod allocator;
mod block;
mod chunk;
mod config;
mod master;
mod os;
mod recycler;
mod stats;

pub use allocator::{BlockAllocator, VerifyError};
pub use block::BLOCK_HEADER_SIZE;
pub use chunk::{ALIGN, CHUNK_HEADER_SIZE, align_size};
pub use config::{BlockConfig, ConfigError, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use os::{Heap, OsMemory};
pub use stats::BlockStats;
pub use wmem_core::{AllocError, Allocator};
