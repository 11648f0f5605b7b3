//! # Allocator configuration

use crate::block::BLOCK_HEADER_SIZE;
use crate::chunk::{ALIGN, CHUNK_HEADER_SIZE, FREE_LINKS_SIZE, MAX_CHUNK_LEN};

/// Default size of a standard block: 8 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024 * 1024;

/// Smallest block that can hold one trackable free chunk.
pub const MIN_BLOCK_SIZE: usize = BLOCK_HEADER_SIZE + CHUNK_HEADER_SIZE + FREE_LINKS_SIZE;

/// Largest block whose single free chunk still fits the chunk length field.
pub const MAX_BLOCK_SIZE: usize = BLOCK_HEADER_SIZE + MAX_CHUNK_LEN;

/// Settings fixed for the lifetime of a [`BlockAllocator`](crate::BlockAllocator).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockConfig {
    block_size: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockConfig {
    /// The default configuration ([`DEFAULT_BLOCK_SIZE`]).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Use standard blocks of `block_size` bytes.
    #[must_use]
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Largest request served from a standard block. Anything larger gets a
    /// jumbo block of its own.
    #[must_use]
    pub const fn max_alloc_size(&self) -> usize {
        self.block_size
            .saturating_sub(BLOCK_HEADER_SIZE + CHUNK_HEADER_SIZE)
    }

    /// Check the configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the first violated constraint.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        let size = self.block_size;
        if size < MIN_BLOCK_SIZE {
            return Err(ConfigError::TooSmall {
                size,
                min: MIN_BLOCK_SIZE,
            });
        }
        if size > MAX_BLOCK_SIZE {
            return Err(ConfigError::TooLarge {
                size,
                max: MAX_BLOCK_SIZE,
            });
        }
        if size % ALIGN != 0 {
            return Err(ConfigError::Unaligned { size, align: ALIGN });
        }
        Ok(())
    }
}

/// Why a [`BlockConfig`] was rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("block size {size} is below the minimum of {min} bytes")]
    TooSmall { size: usize, min: usize },
    #[error("block size {size} exceeds the maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("block size {size} is not a multiple of {align}")]
    Unaligned { size: usize, align: usize },
}

const _: () = {
    assert!(BlockConfig::new().validate().is_ok());
    assert!(DEFAULT_BLOCK_SIZE.is_multiple_of(ALIGN));
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_eight_mebibytes() {
        let cfg = BlockConfig::default();
        assert_eq!(cfg.block_size(), 8 * 1024 * 1024);
        assert_eq!(
            cfg.max_alloc_size(),
            DEFAULT_BLOCK_SIZE - BLOCK_HEADER_SIZE - CHUNK_HEADER_SIZE
        );
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn rejects_out_of_range_sizes() {
        let small = BlockConfig::new().with_block_size(MIN_BLOCK_SIZE - ALIGN);
        assert!(matches!(small.validate(), Err(ConfigError::TooSmall { .. })));

        let large = BlockConfig::new().with_block_size(MAX_BLOCK_SIZE + ALIGN);
        assert!(matches!(large.validate(), Err(ConfigError::TooLarge { .. })));

        let odd = BlockConfig::new().with_block_size(4096 + 1);
        assert_eq!(
            odd.validate(),
            Err(ConfigError::Unaligned {
                size: 4097,
                align: ALIGN
            })
        );
    }

    #[test]
    fn boundaries_are_accepted() {
        assert!(BlockConfig::new().with_block_size(MIN_BLOCK_SIZE).validate().is_ok());
        assert!(BlockConfig::new().with_block_size(MAX_BLOCK_SIZE).validate().is_ok());
    }

    #[test]
    fn error_messages_name_the_limit() {
        let err = BlockConfig::new().with_block_size(8).validate().unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains(&MIN_BLOCK_SIZE.to_string()));
    }
}
