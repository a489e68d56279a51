//! Object client contract and its backends.
//!
//! The fileset engine never touches a filesystem directly: every index and
//! chunk object goes through an [`ObjectClient`]. Names are `/`-separated
//! strings in a flat namespace; [`ObjectClient::walk`] treats a name as being
//! under a prefix when it equals the prefix or continues it at a `/`
//! boundary.

pub mod dyn_fs;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use self::{dyn_fs::FusioObjectClient, memory::MemoryObjectClient};

/// Listing, ranged reads, and whole-object writes over a blob store.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Lists every object name under `prefix`, sorted ascending.
    async fn walk(&self, prefix: &str) -> Result<Vec<String>>;

    /// Reads `len` bytes of `name` starting at `offset`, or everything after
    /// `offset` when `len` is `None`.
    async fn read(&self, name: &str, offset: u64, len: Option<u64>) -> Result<Bytes>;

    /// Opens a sink for `name`. Nothing is visible until the sink is closed.
    async fn writer(&self, name: &str) -> Result<Box<dyn ObjectWriter>>;

    /// Size of `name` in bytes.
    async fn size(&self, name: &str) -> Result<u64>;

    async fn exists(&self, name: &str) -> Result<bool>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// Byte sink returned by [`ObjectClient::writer`].
#[async_trait]
pub trait ObjectWriter: Send {
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Publishes the object.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Returns true when `name` is `prefix` itself or lies below it.
pub(crate) fn under_prefix(name: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match name.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Writes `data` to `name` in one shot.
pub(crate) async fn put(objects: &dyn ObjectClient, name: &str, data: &[u8]) -> Result<()> {
    let mut writer = objects.writer(name).await?;
    writer.write(data).await?;
    writer.close().await
}

/// Copies `from` to `to` byte for byte.
pub(crate) async fn copy(objects: &dyn ObjectClient, from: &str, to: &str) -> Result<()> {
    let data = objects.read(from, 0, None).await?;
    put(objects, to, &data).await
}

#[cfg(test)]
mod tests {
    use super::under_prefix;

    #[test]
    fn prefix_matches_on_segment_boundaries() {
        assert!(under_prefix("pfs/a/diff", "pfs/a"));
        assert!(under_prefix("pfs/a/diff", "pfs/a/"));
        assert!(under_prefix("pfs/a/diff", "pfs/a/diff"));
        assert!(under_prefix("pfs/a/diff", ""));
        assert!(!under_prefix("pfs/ab/diff", "pfs/a"));
        assert!(!under_prefix("pfs/a", "pfs/a/diff"));
    }
}
