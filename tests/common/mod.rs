//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use fileset::{IndexSummary, MemoryObjectClient, Storage, StorageOptions, Tag};

/// A file as read back from a fileset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFile {
    pub path: String,
    pub tags: Vec<Tag>,
    pub content: Vec<u8>,
}

/// Memory-backed storage with small chunks so files span several chunks.
pub fn storage(options: StorageOptions) -> (MemoryObjectClient, Storage) {
    let objects = MemoryObjectClient::new();
    let storage = Storage::new(Arc::new(objects.clone()), options);
    (objects, storage)
}

pub fn small_options() -> StorageOptions {
    StorageOptions::default().chunk_size(7).memory_threshold(64)
}

/// Writes `files` (already path-sorted) as the fileset `name`.
pub async fn write_fileset(
    storage: &Storage,
    name: &str,
    files: &[(&str, &[(&str, &str)])],
) -> IndexSummary {
    let mut writer = storage.new_writer(name);
    for (path, tags) in files {
        let size = tags.iter().map(|(_, data)| data.len() as u64).sum();
        writer.write_header(path, size).await.expect("write header");
        for (tag, data) in tags.iter() {
            writer.start_tag(*tag).expect("start tag");
            writer
                .write(data.as_bytes())
                .await
                .expect("write content");
        }
    }
    writer.close().await.expect("close writer")
}

/// Reads every file of the fileset `name`.
pub async fn read_fileset(storage: &Storage, name: &str) -> Vec<ReadFile> {
    let mut reader = storage.new_reader(name);
    let mut files = Vec::new();
    while let Some(header) = reader.next().await.expect("next header") {
        let content = reader.read_to_end().await.expect("read content");
        assert_eq!(content.len() as u64, header.size);
        files.push(ReadFile {
            tags: header.tags().to_vec(),
            path: header.path,
            content,
        });
    }
    reader.close().expect("close reader");
    files
}

/// Tag ids of `file`, in order.
pub fn tag_ids(file: &ReadFile) -> Vec<&str> {
    file.tags.iter().map(|tag| tag.id.as_str()).collect()
}
