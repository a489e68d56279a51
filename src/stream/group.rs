use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{
    error::{FilesetError, Result},
    fileset::Reader,
};

/// Readers positioned at the same path, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Group {
    pub(crate) path: String,
    /// Offsets of the member readers, ascending.
    pub(crate) offsets: Vec<usize>,
    /// Smallest path still pending after this group.
    pub(crate) next: Option<String>,
}

/// K-way merge of path-sorted readers.
///
/// Each reader contributes its peeked header to a heap keyed by
/// `(path, offset)`; [`MergeStream::next_group`] pops every reader sitting on
/// the smallest path and moves them onto that file.
pub(crate) struct MergeStream {
    readers: Vec<Reader>,
    peeked: BinaryHeap<CmpEntry>,
}

impl MergeStream {
    pub(crate) async fn from_vec(mut readers: Vec<Reader>) -> Result<Self> {
        let mut peeked = BinaryHeap::with_capacity(readers.len());

        for (offset, reader) in readers.iter_mut().enumerate() {
            if let Some(header) = reader.peek().await? {
                peeked.push(CmpEntry::new(offset, header.path.clone()));
            }
        }

        Ok(Self { readers, peeked })
    }

    /// Positions the readers of the next path group on that path.
    pub(crate) async fn next_group(&mut self) -> Result<Option<Group>> {
        let Some(first) = self.peeked.pop() else {
            return Ok(None);
        };
        let mut offsets = vec![first.offset];
        while self
            .peeked
            .peek()
            .is_some_and(|entry| entry.path == first.path)
        {
            if let Some(entry) = self.peeked.pop() {
                offsets.push(entry.offset);
            }
        }
        offsets.sort_unstable();

        for &offset in &offsets {
            let reader = &mut self.readers[offset];
            reader.next().await?;
            if let Some(header) = reader.peek().await? {
                if header.path <= first.path {
                    return Err(FilesetError::OutOfOrder {
                        previous: first.path,
                        next: header.path.clone(),
                    });
                }
                self.peeked
                    .push(CmpEntry::new(offset, header.path.clone()));
            }
        }

        Ok(Some(Group {
            next: self.peeked.peek().map(|entry| entry.path.clone()),
            path: first.path,
            offsets,
        }))
    }

    pub(crate) fn reader_mut(&mut self, offset: usize) -> &mut Reader {
        &mut self.readers[offset]
    }

    pub(crate) fn reader(&self, offset: usize) -> &Reader {
        &self.readers[offset]
    }

    /// Closes every reader, returning the first error.
    pub(crate) fn close(self) -> Result<()> {
        let mut result = Ok(());
        for reader in self.readers {
            if let Err(err) = reader.close() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

#[derive(Debug)]
struct CmpEntry {
    offset: usize,
    path: String,
}

impl CmpEntry {
    fn new(offset: usize, path: String) -> Self {
        Self { offset, path }
    }
}

impl PartialEq for CmpEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CmpEntry {}

impl PartialOrd for CmpEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CmpEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then(self.offset.cmp(&other.offset))
            .reverse()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::CmpEntry;

    #[test]
    fn heap_pops_smallest_path_then_stream() {
        let mut heap = BinaryHeap::new();
        heap.push(CmpEntry::new(2, "/b".into()));
        heap.push(CmpEntry::new(1, "/a".into()));
        heap.push(CmpEntry::new(0, "/b".into()));
        heap.push(CmpEntry::new(3, "/a".into()));

        let order: Vec<(usize, String)> = std::iter::from_fn(|| heap.pop())
            .map(|entry| (entry.offset, entry.path))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, "/a".to_string()),
                (3, "/a".to_string()),
                (0, "/b".to_string()),
                (2, "/b".to_string()),
            ]
        );
    }
}
