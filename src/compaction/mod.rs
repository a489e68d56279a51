//! Leveled compaction of filesets.
//!
//! A fileset's unmerged writes live in `<fileset>/diff`; compacted data lives
//! in `<fileset>/compacted/<level>`, where level budgets grow exponentially.
//! The [`planner`] decides which levels a diff is merged with; the storage
//! facade executes the resulting [`CompactSpec`].

/// Leveled compaction planning helpers.
pub mod planner;

pub use planner::{plan, CompactionPlan, LevelInfo, LeveledPlannerConfig};
use crate::{
    error::{FilesetError, Result},
    fileset::{COMPACTED, DIFF},
};

/// Next compaction step of a fileset, as object names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactSpec {
    /// Level object receiving the merged output.
    pub output: String,
    /// Diff first, then every level merged into the output, ascending.
    pub inputs: Vec<String>,
}

/// Object name of `fileset`'s diff.
pub fn diff_name(fileset: &str) -> String {
    format!("{fileset}/{DIFF}")
}

/// Prefix under which `fileset`'s levels live.
pub fn compacted_prefix(fileset: &str) -> String {
    format!("{fileset}/{COMPACTED}")
}

/// Object name of `level` of `fileset`.
pub fn level_name(fileset: &str, level: u32) -> String {
    format!("{fileset}/{COMPACTED}/{level}")
}

/// Level number encoded in the last segment of a level object name.
pub fn parse_level(name: &str) -> Result<u32> {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.parse()
        .map_err(|_| FilesetError::InvalidLevel(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{diff_name, level_name, parse_level};
    use crate::error::FilesetError;

    #[test]
    fn level_names_round_trip() {
        assert_eq!(diff_name("pfs/a"), "pfs/a/diff");
        assert_eq!(level_name("pfs/a", 3), "pfs/a/compacted/3");
        assert_eq!(parse_level("pfs/a/compacted/12").unwrap(), 12);
        assert!(matches!(
            parse_level("pfs/a/compacted/x"),
            Err(FilesetError::InvalidLevel(_))
        ));
    }
}
