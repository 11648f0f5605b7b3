//! # Chunk headers and geometry
//!
//! Every allocation (and every free span) inside a block is a *chunk*: a
//! packed header followed by a data area.
//!
//! ```text
//!  chunk base                     chunk base + CHUNK_HEADER_SIZE
//!  ▼                              ▼
//!  +------------------------------+------------------------------------+
//!  | prev:32 | len:29 |L|U|J| pad |  data (user bytes, or FreeLinks)   |
//!  +------------------------------+------------------------------------+
//!  ◄──────────────────────────── len ─────────────────────────────────►
//! ```
//!
//! - `prev` is the byte distance back to the previous chunk's header (0 for
//!   the first chunk of a block).
//! - `len` includes the header and is always a multiple of [`ALIGN`].
//! - `L`ast, `U`sed and `J`umbo flags.
//!
//! When a chunk is free and its data area can hold a [`FreeLinks`] pair, the
//! data area is reinterpreted as the node of an intrusive free list.

use bitfield_struct::bitfield;
use core::ptr::NonNull;

/// Alignment of every chunk header and every data pointer.
///
/// Two pointers wide: enough for any scalar the platform has, without
/// over-aligning for vector types.
pub const ALIGN: usize = 2 * size_of::<*const u8>();

/// Round `size` up to the next multiple of [`ALIGN`].
///
/// The caller must ensure `size + ALIGN - 1` does not overflow.
#[inline]
#[must_use]
pub const fn align_size(size: usize) -> usize {
    (size + (ALIGN - 1)) & !(ALIGN - 1)
}

/// Size of a chunk header once padded to [`ALIGN`].
pub const CHUNK_HEADER_SIZE: usize = align_size(size_of::<ChunkHeader>());

/// Bytes a free chunk's data area needs to take part in a free list.
pub(crate) const FREE_LINKS_SIZE: usize = size_of::<FreeLinks>();

/// Largest chunk length representable in the 29-bit `len` field.
pub(crate) const MAX_CHUNK_LEN: usize = ((1 << 29) - 1) & !(ALIGN - 1);

/// The packed chunk header.
#[bitfield(u64)]
pub(crate) struct ChunkHeader {
    /// Distance in bytes back to the previous chunk's header.
    pub prev: u32,
    /// Total chunk length, header included.
    #[bits(29)]
    pub len: u32,
    /// No chunk follows this one in its block.
    pub last: bool,
    /// Handed out to a caller.
    pub used: bool,
    /// Sole chunk of a block sized for one oversized request.
    pub jumbo: bool,
}

/// Intrusive list node stored in the data area of a tracked free chunk.
///
/// The master stack terminates with `None` at both ends; the recycler ring
/// never contains `None`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct FreeLinks {
    pub prev: Option<Chunk>,
    pub next: Option<Chunk>,
}

impl FreeLinks {
    /// A one-element ring.
    #[inline]
    pub const fn looped(chunk: Chunk) -> Self {
        Self {
            prev: Some(chunk),
            next: Some(chunk),
        }
    }
}

/// Handle to a chunk header.
///
/// A handle is only meaningful while the block containing the chunk is alive;
/// all accessors read and write the block's memory directly.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct Chunk(NonNull<u8>);

impl Chunk {
    /// # Safety
    /// `base` must point at an [`ALIGN`]-aligned chunk header inside a live
    /// block owned by the calling allocator.
    #[inline]
    pub const unsafe fn from_base(base: NonNull<u8>) -> Self {
        Self(base)
    }

    /// Recover a chunk from the data pointer handed to a caller.
    ///
    /// # Safety
    /// `data` must have been produced by [`Chunk::data`] on a live chunk.
    #[inline]
    pub unsafe fn from_data(data: NonNull<u8>) -> Self {
        Self(unsafe { data.sub(CHUNK_HEADER_SIZE) })
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0.as_ptr().addr()
    }

    #[inline]
    pub const fn base(self) -> NonNull<u8> {
        self.0
    }

    /// Pointer to the first byte after the header.
    #[inline]
    pub const fn data(self) -> NonNull<u8> {
        // SAFETY: every chunk is at least one header long.
        unsafe { self.0.add(CHUNK_HEADER_SIZE) }
    }

    #[inline]
    #[allow(clippy::cast_ptr_alignment)] // chunk bases are ALIGN-aligned
    pub fn header(self) -> ChunkHeader {
        // SAFETY: see type-level invariant.
        ChunkHeader::from_bits(unsafe { self.0.as_ptr().cast::<u64>().read() })
    }

    #[inline]
    #[allow(clippy::cast_ptr_alignment)] // chunk bases are ALIGN-aligned
    pub fn set_header(self, header: ChunkHeader) {
        // SAFETY: see type-level invariant.
        unsafe { self.0.as_ptr().cast::<u64>().write(header.into_bits()) }
    }

    #[inline]
    fn update(self, f: impl FnOnce(ChunkHeader) -> ChunkHeader) {
        self.set_header(f(self.header()));
    }

    #[inline]
    pub fn len(self) -> usize {
        self.header().len() as usize
    }

    #[inline]
    pub fn set_len(self, len: usize) {
        let len = encode(len);
        self.update(|h| h.with_len(len));
    }

    /// Distance back to the previous chunk, 0 for the first chunk.
    #[inline]
    pub fn prev_distance(self) -> usize {
        self.header().prev() as usize
    }

    #[inline]
    pub fn set_prev_distance(self, distance: usize) {
        let distance = encode(distance);
        self.update(|h| h.with_prev(distance));
    }

    #[inline]
    pub fn is_used(self) -> bool {
        self.header().used()
    }

    #[inline]
    pub fn set_used(self, used: bool) {
        self.update(|h| h.with_used(used));
    }

    #[inline]
    pub fn is_last(self) -> bool {
        self.header().last()
    }

    #[inline]
    pub fn set_last(self, last: bool) {
        self.update(|h| h.with_last(last));
    }

    #[inline]
    pub fn is_jumbo(self) -> bool {
        self.header().jumbo()
    }

    /// Bytes available after the header.
    #[inline]
    pub fn data_len(self) -> usize {
        self.len() - CHUNK_HEADER_SIZE
    }

    /// Whether the data area can hold a [`FreeLinks`] node.
    #[inline]
    pub fn is_trackable(self) -> bool {
        self.data_len() >= FREE_LINKS_SIZE
    }

    /// The chunk immediately after this one, if any.
    #[inline]
    pub fn next(self) -> Option<Self> {
        if self.is_last() {
            None
        } else {
            Some(self.following())
        }
    }

    /// The chunk immediately before this one, if any.
    #[inline]
    pub fn prev(self) -> Option<Self> {
        match self.prev_distance() {
            0 => None,
            // SAFETY: `prev` distances are kept equal to the predecessor's `len`.
            distance => Some(Self(unsafe { self.0.sub(distance) })),
        }
    }

    /// The address `len` bytes further on, whether or not `last` is set.
    ///
    /// Used while splitting, before the new successor has a header.
    #[inline]
    pub fn following(self) -> Self {
        // SAFETY: `len` never reaches past the end of the block.
        Self(unsafe { self.0.add(self.len()) })
    }

    #[inline]
    #[allow(clippy::cast_ptr_alignment)] // data areas are ALIGN-aligned
    fn links_ptr(self) -> *mut FreeLinks {
        self.data().as_ptr().cast::<FreeLinks>()
    }

    /// Read the free-list node. Only meaningful for tracked free chunks.
    #[inline]
    pub fn links(self) -> FreeLinks {
        debug_assert!(!self.is_used() && self.is_trackable());
        // SAFETY: a tracked free chunk's data area holds a `FreeLinks`.
        unsafe { self.links_ptr().read() }
    }

    #[inline]
    pub fn set_links(self, links: FreeLinks) {
        debug_assert!(self.is_trackable());
        // SAFETY: the data area is large enough, checked above.
        unsafe { self.links_ptr().write(links) }
    }

    #[inline]
    pub fn free_prev(self) -> Option<Self> {
        self.links().prev
    }

    #[inline]
    pub fn free_next(self) -> Option<Self> {
        self.links().next
    }

    #[inline]
    pub fn set_free_prev(self, prev: Option<Self>) {
        let links = self.links();
        self.set_links(FreeLinks { prev, ..links });
    }

    #[inline]
    pub fn set_free_next(self, next: Option<Self>) {
        let links = self.links();
        self.set_links(FreeLinks { next, ..links });
    }
}

impl core::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Chunk({:p})", self.0)
    }
}

/// Narrow a byte length to the header's field width.
#[inline]
#[allow(clippy::cast_possible_truncation)]
fn encode(len: usize) -> u32 {
    debug_assert!(len <= MAX_CHUNK_LEN, "chunk length {len} out of range");
    len as u32
}
