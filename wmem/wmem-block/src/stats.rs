/// Snapshot of an allocator's footprint, from
/// [`BlockAllocator::stats`](crate::BlockAllocator::stats).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct BlockStats {
    /// Blocks held, jumbo blocks included.
    pub blocks: usize,
    pub jumbo_blocks: usize,
    /// Bytes obtained from the backing heap across all blocks.
    pub os_bytes: usize,
    /// Bytes in used chunks of standard blocks, headers included.
    pub used_bytes: usize,
    /// Bytes in free chunks of standard blocks, headers included.
    pub free_bytes: usize,
    /// Bytes in chunks reachable from the master stack or recycler ring.
    ///
    /// Falls short of `free_bytes` by the size of free chunks too small to
    /// be linked.
    pub tracked_free_bytes: usize,
}

impl BlockStats {
    /// Standard blocks held.
    #[must_use]
    pub const fn standard_blocks(&self) -> usize {
        self.blocks - self.jumbo_blocks
    }
}

impl core::fmt::Display for BlockStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} blocks ({} jumbo), {} bytes from heap, {} used, {} free ({} tracked)",
            self.blocks, self.jumbo_blocks, self.os_bytes, self.used_bytes, self.free_bytes, self.tracked_free_bytes
        )
    }
}
