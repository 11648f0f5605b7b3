//! # Scoped Memory Allocator Contract
//!
//! This crate defines the contract every packet-analysis memory allocator
//! implements, independent of how the allocator manages its backing memory.
//! Higher layers (memory scopes, and above them the protocol dissectors) only
//! ever talk to an allocator through the [`Allocator`] trait.
//!
//! ## The handle
//!
//! An allocator handle owns all memory it hands out. Its lifecycle is:
//!
//! ```text
//!   construct ──► alloc / realloc / free ──► free_all ──► ... ──► drop
//!      (init)          (any order)            (bulk)            (cleanup)
//!                          │
//!                          └──► gc (footprint only, never invalidates)
//! ```
//!
//! * [`Allocator::alloc`] hands out a pointer to at least `size` bytes.
//! * [`Allocator::free`] returns one allocation.
//! * [`Allocator::realloc`] resizes an allocation, preserving its contents up
//!   to `min(old, new)` bytes. The pointer may move.
//! * [`Allocator::free_all`] invalidates *every* pointer handed out so far in
//!   one step.
//! * [`Allocator::gc`] returns unused backing memory without touching live
//!   allocations.
//! * Dropping the handle releases everything it owns.
//!
//! ## Failure model
//!
//! The only failure an allocator reports is [`AllocError`]: the backing heap
//! refused memory, or a request is too large to be represented at all. There
//! is no soft or retryable error; callers treat an [`AllocError`] as fatal for
//! the session that triggered it.
//!
//! Misuse (double free, foreign pointers, use after free) is *not* detected.
//! That is why [`Allocator::free`] and [`Allocator::realloc`] are `unsafe`.
//!
//! ## Threading
//!
//! Allocators are single-threaded. They are driven through `&mut self`, so
//! the borrow checker enforces the "one thread per instance" rule. Separate
//! instances share nothing and may live on separate threads.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod allocator;
mod error;

pub use allocator::Allocator;
pub use error::AllocError;
