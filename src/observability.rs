//! Tracing macros for fileset storage.
//!
//! Events go to the "fileset" target with `component` and `event` fields.
//! The crate never installs a subscriber.

/// Target for all fileset log events.
pub(crate) const FILESET_TARGET: &str = "fileset";

macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::FILESET_TARGET, $($field)*)
    };
}

macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::FILESET_TARGET, $($field)*)
    };
}

macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::FILESET_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_info;
pub(crate) use log_warn;
