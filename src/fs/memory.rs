use std::{collections::BTreeMap, sync::Arc};

use async_lock::RwLock;
use async_trait::async_trait;
use bytes::Bytes;

use super::{under_prefix, ObjectClient, ObjectWriter};
use crate::error::{FilesetError, Result};

/// In-process object store backed by a sorted map.
///
/// Clones share the same objects.
#[derive(Clone, Default)]
pub struct MemoryObjectClient {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn walk(&self, prefix: &str) -> Result<Vec<String>> {
        let guard = self.objects.read().await;
        let start = prefix.trim_end_matches('/');
        Ok(guard
            .range(start.to_string()..)
            .map(|(name, _)| name)
            .take_while(|name| name.starts_with(start))
            .filter(|name| under_prefix(name, prefix))
            .cloned()
            .collect())
    }

    async fn read(&self, name: &str, offset: u64, len: Option<u64>) -> Result<Bytes> {
        let guard = self.objects.read().await;
        let data = guard
            .get(name)
            .ok_or_else(|| FilesetError::NotFound(name.to_string()))?;
        let start = offset as usize;
        let end = match len {
            Some(len) => start + len as usize,
            None => data.len(),
        };
        if start > data.len() || end > data.len() {
            return Err(FilesetError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("range {start}..{end} beyond {name} ({} bytes)", data.len()),
            )));
        }
        Ok(data.slice(start..end))
    }

    async fn writer(&self, name: &str) -> Result<Box<dyn ObjectWriter>> {
        Ok(Box::new(MemoryObjectWriter {
            objects: self.objects.clone(),
            name: name.to_string(),
            buf: Vec::new(),
        }))
    }

    async fn size(&self, name: &str) -> Result<u64> {
        let guard = self.objects.read().await;
        guard
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| FilesetError::NotFound(name.to_string()))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.objects
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FilesetError::NotFound(name.to_string()))
    }
}

struct MemoryObjectWriter {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
    name: String,
    buf: Vec<u8>,
}

#[async_trait]
impl ObjectWriter for MemoryObjectWriter {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let MemoryObjectWriter { objects, name, buf } = *self;
        objects.write().await.insert(name, Bytes::from(buf));
        Ok(())
    }
}
