use crate::compaction::LeveledPlannerConfig;

/// One mebibyte.
pub const MB: u64 = 1024 * 1024;

/// Default buffered size that triggers a writer flush (excluding close).
pub const DEFAULT_MEMORY_THRESHOLD: usize = 1024 * MB as usize;
/// Default accumulated size that closes a shard.
pub const DEFAULT_SHARD_THRESHOLD: u64 = 1024 * MB;
/// Default size budget of compaction level zero.
pub const DEFAULT_LEVEL_ZERO_SIZE: u64 = MB;
/// Default base of the exponential level size function.
pub const DEFAULT_LEVEL_SIZE_BASE: u64 = 10;
/// Default size of a stored chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * MB as usize;
/// Default namespace prefix for filesets.
pub const DEFAULT_PREFIX: &str = "pfs";

/// Configuration for a [`Storage`](crate::Storage).
///
/// Every field has a default and a consuming setter:
///
/// ```
/// use fileset::StorageOptions;
///
/// let options = StorageOptions::default()
///     .memory_threshold(64 * 1024)
///     .level_zero_size(4096);
/// assert_eq!(options.level_threshold(1), 40960);
/// ```
#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub(crate) memory_threshold: usize,
    pub(crate) shard_threshold: u64,
    pub(crate) level_zero_size: u64,
    pub(crate) level_size_base: u64,
    pub(crate) chunk_size: usize,
    pub(crate) prefix: String,
}

impl Default for StorageOptions {
    fn default() -> Self {
        StorageOptions {
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            shard_threshold: DEFAULT_SHARD_THRESHOLD,
            level_zero_size: DEFAULT_LEVEL_ZERO_SIZE,
            level_size_base: DEFAULT_LEVEL_SIZE_BASE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl StorageOptions {
    pub fn memory_threshold(self, memory_threshold: usize) -> Self {
        StorageOptions {
            memory_threshold,
            ..self
        }
    }

    pub fn shard_threshold(self, shard_threshold: u64) -> Self {
        StorageOptions {
            shard_threshold,
            ..self
        }
    }

    pub fn level_zero_size(self, level_zero_size: u64) -> Self {
        StorageOptions {
            level_zero_size,
            ..self
        }
    }

    pub fn level_size_base(self, level_size_base: u64) -> Self {
        StorageOptions {
            level_size_base,
            ..self
        }
    }

    /// Chunk size used by writers. Clamped to at least one byte.
    pub fn chunk_size(self, chunk_size: usize) -> Self {
        StorageOptions {
            chunk_size: chunk_size.max(1),
            ..self
        }
    }

    pub fn prefix(self, prefix: impl Into<String>) -> Self {
        StorageOptions {
            prefix: prefix.into(),
            ..self
        }
    }
}

impl StorageOptions {
    /// Size budget of `level`: `level_zero_size * level_size_base^level`, saturating.
    pub fn level_threshold(&self, level: u32) -> u64 {
        self.planner_config().level_threshold(level)
    }

    pub(crate) fn planner_config(&self) -> LeveledPlannerConfig {
        LeveledPlannerConfig {
            level_zero_size: self.level_zero_size,
            level_size_base: self.level_size_base,
        }
    }

    pub(crate) fn prefix_str(&self) -> &str {
        &self.prefix
    }
}
