use crate::args::Args;
use log::{debug, info};
use std::ptr::NonNull;
use wmem_block::{AllocError, BlockAllocator, BlockConfig, BlockStats, ConfigError, VerifyError};

/// Largest number of allocations kept alive at once.
const MAX_LIVE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum StressError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("op {op}: allocation failed: {source}")]
    Alloc { op: u64, source: AllocError },
    #[error("op {op}: invariant violated: {source}")]
    Verify { op: u64, source: VerifyError },
    #[error("op {op}: allocation at {addr:#x} was overwritten")]
    Clobbered { op: u64, addr: usize },
}

/// Operation counts of a finished run.
#[derive(Debug, Default)]
pub struct Summary {
    pub allocs: u64,
    pub frees: u64,
    pub reallocs: u64,
    pub gcs: u64,
    pub free_alls: u64,
    pub stats: BlockStats,
}

/// xorshift+; the same seed always yields the same workload.
struct XorShift([u64; 2]);

impl XorShift {
    const fn new(seed: u64) -> Self {
        Self([seed | 1, 0xDEAD_BEEF])
    }

    const fn next(&mut self) -> u64 {
        let [mut x, y] = self.0;
        x ^= x << 23;
        let next = x ^ y ^ (x >> 17) ^ (y >> 26);
        self.0 = [y, next];
        next.wrapping_add(y)
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

struct Live {
    ptr: NonNull<u8>,
    len: usize,
    tag: u64,
}

impl Live {
    /// Tag the first (up to) eight bytes, and the last eight once they no
    /// longer overlap the first.
    fn stamp(&self) {
        let bytes = self.tag.to_le_bytes();
        let n = self.len.min(bytes.len());
        // SAFETY: the allocation is live and at least `len` bytes long.
        unsafe {
            self.ptr.as_ptr().copy_from_nonoverlapping(bytes.as_ptr(), n);
            if self.len >= 2 * bytes.len() {
                self.ptr
                    .as_ptr()
                    .add(self.len - bytes.len())
                    .copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            }
        }
    }

    /// Whether the tag written by [`stamp`](Self::stamp) is intact within the
    /// first `len` bytes.
    fn intact(&self, len: usize) -> bool {
        let bytes = self.tag.to_le_bytes();
        let head = len.min(bytes.len());
        let tail = len == self.len && len >= 2 * bytes.len();
        // SAFETY: the allocation is live and at least `len` bytes long.
        unsafe {
            let ptr = self.ptr.as_ptr();
            std::slice::from_raw_parts(ptr, head) == &bytes[..head]
                && (!tail || std::slice::from_raw_parts(ptr.add(len - bytes.len()), bytes.len()) == &bytes[..])
        }
    }
}

/// Run the seeded workload described by `args`.
///
/// # Errors
/// Returns the first failure: a rejected configuration, an allocation
/// error, an invariant violation, or a clobbered allocation.
pub fn run(args: &Args) -> Result<Summary, StressError> {
    let config = BlockConfig::new().with_block_size(args.block_size);
    let mut wmem = BlockAllocator::with_config(config)?;
    let mut rng = XorShift::new(args.seed);
    let mut live: Vec<Live> = Vec::new();
    let mut summary = Summary::default();

    info!(
        "{} ops, seed {}, sizes 0..={}, {} byte blocks{}",
        args.ops,
        args.seed,
        args.max_size,
        args.block_size,
        if args.verify { ", verifying" } else { "" }
    );

    for op in 0..args.ops {
        let roll = rng.below(1000);
        let size = rng.below(args.max_size.saturating_add(1).max(1));

        if live.is_empty() || (roll < 500 && live.len() < MAX_LIVE) {
            let ptr = wmem.alloc(size).map_err(|source| StressError::Alloc { op, source })?;
            let entry = Live {
                ptr,
                len: size,
                tag: rng.next(),
            };
            entry.stamp();
            live.push(entry);
            summary.allocs += 1;
        } else if roll < 800 {
            let entry = live.swap_remove(rng.below(live.len()));
            check(&entry, entry.len, op)?;
            // SAFETY: `entry` is live and removed from the set.
            unsafe { wmem.free(entry.ptr) };
            summary.frees += 1;
        } else if roll < 990 {
            let i = rng.below(live.len());
            let entry = &mut live[i];
            check(entry, entry.len, op)?;
            // SAFETY: `entry` is live; its pointer is replaced below.
            let ptr = unsafe { wmem.realloc(entry.ptr, size) }.map_err(|source| StressError::Alloc { op, source })?;
            let kept = entry.len.min(size);
            entry.ptr = ptr;
            check(entry, kept, op)?;
            entry.len = size;
            entry.stamp();
            summary.reallocs += 1;
        } else if roll < 998 {
            wmem.gc();
            summary.gcs += 1;
        } else {
            for entry in &live {
                check(entry, entry.len, op)?;
            }
            live.clear();
            wmem.free_all();
            summary.free_alls += 1;
        }

        if args.verify {
            wmem.verify().map_err(|source| StressError::Verify { op, source })?;
        }
        if op % 10_000 == 0 {
            debug!("op {op}: {} live, {}", live.len(), wmem.stats());
        }
    }

    summary.stats = wmem.stats();
    Ok(summary)
}

fn check(entry: &Live, len: usize, op: u64) -> Result<(), StressError> {
    if entry.intact(len) {
        Ok(())
    } else {
        Err(StressError::Clobbered {
            op,
            addr: entry.ptr.as_ptr().addr(),
        })
    }
}
