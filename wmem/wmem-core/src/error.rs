/// Errors reported by an [`Allocator`](crate::Allocator).
///
/// Both variants are fatal for the caller. An allocator that returns one of
/// these has not modified its state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The backing heap refused a request of `size` bytes.
    #[error("out of memory (requested {size} bytes from the backing heap)")]
    OutOfMemory { size: usize },
    /// The request plus bookkeeping overhead cannot be represented.
    #[error("allocation of {size} bytes overflows the address space")]
    SizeOverflow { size: usize },
}

impl AllocError {
    /// The size of the request that failed.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::OutOfMemory { size } | Self::SizeOverflow { size } => *size,
        }
    }
}
