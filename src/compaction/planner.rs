//! Exponential leveled compaction planner.
//!
//! Planning is a pure function of the diff size and the sizes of the existing
//! levels, so it never touches storage.

use crate::option::{DEFAULT_LEVEL_SIZE_BASE, DEFAULT_LEVEL_ZERO_SIZE};

/// Compaction planner configuration knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeveledPlannerConfig {
    /// Size budget of level zero.
    pub level_zero_size: u64,
    /// Growth factor between consecutive levels.
    pub level_size_base: u64,
}

impl Default for LeveledPlannerConfig {
    fn default() -> Self {
        Self {
            level_zero_size: DEFAULT_LEVEL_ZERO_SIZE,
            level_size_base: DEFAULT_LEVEL_SIZE_BASE,
        }
    }
}

impl LeveledPlannerConfig {
    /// Size budget of `level`: `level_zero_size * level_size_base^level`, saturating.
    pub fn level_threshold(&self, level: u32) -> u64 {
        self.level_size_base
            .checked_pow(level)
            .and_then(|factor| self.level_zero_size.checked_mul(factor))
            .unwrap_or(u64::MAX)
    }
}

/// Size of one existing compaction level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelInfo {
    pub level: u32,
    pub size_bytes: u64,
}

impl LevelInfo {
    pub fn new(level: u32, size_bytes: u64) -> Self {
        Self { level, size_bytes }
    }
}

/// Outcome of planning one compaction step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactionPlan {
    /// Level receiving the merged output.
    pub output: u32,
    /// Levels merged together with the diff, ascending.
    pub inputs: Vec<u32>,
    /// Levels above the output, carried over verbatim, ascending.
    pub copies: Vec<u32>,
    /// Diff size plus the size of every existing level.
    pub total_size: u64,
}

/// Plans the next compaction of a diff of `diff_size` bytes into `levels`.
///
/// Levels are walked in numeric order starting at zero, gaps included. Each
/// present level adds its size to the running total and is an input until the
/// output is fixed, a copy afterwards. The output is the first level whose
/// budget exceeds the running total; when no level qualifies it is the level
/// above the highest existing one (zero when there are none).
pub fn plan(
    config: &LeveledPlannerConfig,
    diff_size: u64,
    levels: &[LevelInfo],
) -> CompactionPlan {
    let mut levels = levels.to_vec();
    levels.sort_by_key(|info| info.level);
    levels.dedup_by_key(|info| info.level);

    let mut total = diff_size;
    let mut output = None;
    let mut inputs = Vec::new();
    let mut copies = Vec::new();
    let mut present = levels.iter().peekable();
    let top = levels.last().map(|info| info.level);

    for level in top.into_iter().flat_map(|top| 0..=top) {
        if let Some(info) = present.next_if(|info| info.level == level) {
            total = total.saturating_add(info.size_bytes);
            if output.is_none() {
                inputs.push(level);
            } else {
                copies.push(level);
            }
        }
        if output.is_none() && total < config.level_threshold(level) {
            output = Some(level);
        }
    }

    CompactionPlan {
        output: output.unwrap_or_else(|| top.map_or(0, |top| top + 1)),
        inputs,
        copies,
        total_size: total,
    }
}
