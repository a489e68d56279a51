//! Entry point for fileset storage.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    chunk::ChunkStorage,
    compaction::{self, CompactSpec, LevelInfo},
    error::{FilesetError, Result},
    fileset::{FileSet, Reader, Writer},
    fs::{self, under_prefix, ObjectClient},
    index::{top_level, IndexSummary, PathRange},
    observability::{log_debug, log_info},
    option::StorageOptions,
    stream::{merge, MergeFunc, MergeReader, ShardFunc},
};

/// Manages filesets stored under a namespace prefix of an object store.
///
/// Every fileset name passed in is resolved under the configured prefix
/// (`pfs` by default) unless it already starts with it. Handles are cheap to
/// clone; each carries the cancellation token its operations observe.
///
/// ```no_run
/// # async fn example() -> fileset::Result<()> {
/// use std::sync::Arc;
///
/// use fileset::{MemoryObjectClient, Storage, StorageOptions};
///
/// let storage = Storage::new(Arc::new(MemoryObjectClient::new()), StorageOptions::default());
/// let mut writer = storage.new_writer("repo/diff");
/// writer.write_header("/greeting", 5).await?;
/// writer.start_tag("datum-0")?;
/// writer.write(b"hello").await?;
/// writer.close().await?;
///
/// let mut reader = storage.new_reader("repo/diff");
/// while let Some(header) = reader.next().await? {
///     assert_eq!(reader.read_to_end().await?.len() as u64, header.size);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Storage {
    objects: Arc<dyn ObjectClient>,
    chunks: ChunkStorage,
    options: Arc<StorageOptions>,
    cancel: CancellationToken,
}

impl Storage {
    pub fn new(objects: Arc<dyn ObjectClient>, options: StorageOptions) -> Self {
        Self {
            chunks: ChunkStorage::new(objects.clone(), options.chunk_size),
            objects,
            options: Arc::new(options),
            cancel: CancellationToken::new(),
        }
    }

    /// Handle whose operations fail with [`FilesetError::Cancelled`] once
    /// `cancel` fires.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn objects(&self) -> &Arc<dyn ObjectClient> {
        &self.objects
    }

    /// Resolves `name` under the storage prefix.
    pub fn apply_prefix(&self, name: &str) -> String {
        let prefix = self.options.prefix_str().trim_end_matches('/');
        if prefix.is_empty() || under_prefix(name, prefix) {
            return name.to_string();
        }
        format!("{prefix}/{}", name.trim_start_matches('/'))
    }

    /// In-memory fileset builder writing to `name` on close.
    pub fn new_fileset(&self, name: &str) -> FileSet {
        FileSet::new(
            self.clone(),
            self.apply_prefix(name),
            self.options.memory_threshold,
        )
    }

    pub fn new_writer(&self, name: &str) -> Writer {
        self.writer_at(self.apply_prefix(name))
    }

    pub fn new_reader(&self, name: &str) -> Reader {
        self.reader_at(self.apply_prefix(name))
    }

    /// Merged view over the compacted levels of `filesets`.
    pub async fn new_merge_reader<S: AsRef<str>>(&self, filesets: &[S]) -> Result<MergeReader> {
        let prefixes: Vec<String> = filesets
            .iter()
            .map(|fileset| compaction::compacted_prefix(&self.apply_prefix(fileset.as_ref())))
            .collect();
        let readers = self.readers(&prefixes).await?;
        MergeReader::new(readers, self.chunks.new_reader(self.cancel.clone())).await
    }

    /// Splits the merge of every object under `filesets` into path ranges
    /// of roughly the shard threshold, passing each to `emit`.
    pub async fn shard<S, F>(&self, filesets: &[S], emit: F) -> Result<()>
    where
        S: AsRef<str>,
        F: FnMut(PathRange) -> Result<()> + Send,
    {
        let prefixes = self.apply_prefixes(filesets);
        let readers = self.readers(&prefixes).await?;
        let mut func = MergeFunc::Shard(ShardFunc::new(self.options.shard_threshold, emit));
        merge(readers, &mut func).await
    }

    /// Merges every object under `inputs` into the fileset `output`.
    pub async fn compact<S: AsRef<str>>(&self, output: &str, inputs: &[S]) -> Result<IndexSummary> {
        let output = self.apply_prefix(output);
        let prefixes = self.apply_prefixes(inputs);
        let readers = self.readers(&prefixes).await?;
        let num_inputs = readers.len();
        let mut writer = self.writer_at(output.clone());
        merge(readers, &mut MergeFunc::Content(&mut writer)).await?;
        let summary = writer.close().await?;
        log_info!(
            component = "compaction",
            event = "compaction_finished",
            output = %output,
            inputs = num_inputs,
            num_files = summary.num_files,
            size_bytes = summary.size_bytes,
        );
        Ok(summary)
    }

    /// Runs `spec` and removes the input levels it consumed.
    ///
    /// Inputs that are levels of the output's own fileset are deleted once the
    /// output is published, so compacting a fileset in place never leaves a
    /// merged level behind next to its replacement. Diffs and levels of other
    /// filesets are left untouched.
    pub async fn execute(&self, spec: &CompactSpec) -> Result<IndexSummary> {
        let summary = self.compact(&spec.output, &spec.inputs).await?;
        let output = self.apply_prefix(&spec.output);
        let Some((levels, _)) = output.rsplit_once('/') else {
            return Ok(summary);
        };
        for input in self.apply_prefixes(&spec.inputs) {
            if input == output || !under_prefix(&input, levels) {
                continue;
            }
            self.check_cancelled()?;
            self.objects.delete(&input).await?;
            log_debug!(
                component = "compaction",
                event = "level_consumed",
                level = %input,
                output = %output,
            );
        }
        Ok(summary)
    }

    /// Plans the compaction of `fileset`'s diff against the levels of
    /// `compacted`.
    ///
    /// Levels above the chosen output are copied verbatim to the same level
    /// of `fileset` before returning. Running the result with
    /// [`Storage::execute`] leaves `fileset` with a complete set of levels,
    /// whether `compacted` is another fileset or `fileset` itself.
    pub async fn compact_spec(&self, fileset: &str, compacted: &str) -> Result<CompactSpec> {
        let fileset = self.apply_prefix(fileset);
        let compacted = self.apply_prefix(compacted);
        let diff = compaction::diff_name(&fileset);
        let diff_size = top_level(self.objects.as_ref(), &diff).await?.size_bytes;

        let mut levels = Vec::new();
        for name in self
            .objects
            .walk(&compaction::compacted_prefix(&compacted))
            .await?
        {
            self.check_cancelled()?;
            let level = compaction::parse_level(&name)?;
            let summary = top_level(self.objects.as_ref(), &name).await?;
            levels.push(LevelInfo::new(level, summary.size_bytes));
        }

        let plan = compaction::plan(&self.options.planner_config(), diff_size, &levels);
        for &level in &plan.copies {
            self.check_cancelled()?;
            let from = compaction::level_name(&compacted, level);
            let to = compaction::level_name(&fileset, level);
            if from != to {
                fs::copy(self.objects.as_ref(), &from, &to).await?;
                log_debug!(
                    component = "compaction",
                    event = "level_copied",
                    from = %from,
                    to = %to,
                );
            }
        }

        let mut inputs = vec![diff];
        inputs.extend(
            plan.inputs
                .iter()
                .map(|&level| compaction::level_name(&compacted, level)),
        );
        let spec = CompactSpec {
            output: compaction::level_name(&fileset, plan.output),
            inputs,
        };
        log_info!(
            component = "compaction",
            event = "compaction_planned",
            output = %spec.output,
            inputs = spec.inputs.len(),
            copies = plan.copies.len(),
            total_size = plan.total_size,
        );
        Ok(spec)
    }

    pub(crate) fn writer_at(&self, name: String) -> Writer {
        Writer::new(
            self.objects.clone(),
            &self.chunks,
            name,
            self.options.memory_threshold,
            self.cancel.clone(),
        )
    }

    pub(crate) fn reader_at(&self, name: String) -> Reader {
        Reader::new(
            self.objects.clone(),
            &self.chunks,
            name,
            self.cancel.clone(),
        )
    }

    fn apply_prefixes<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        names
            .iter()
            .map(|name| self.apply_prefix(name.as_ref()))
            .collect()
    }

    /// One reader per object under each prefix, in prefix then name order.
    async fn readers(&self, prefixes: &[String]) -> Result<Vec<Reader>> {
        let mut readers = Vec::new();
        for prefix in prefixes {
            self.check_cancelled()?;
            for name in self.objects.walk(prefix).await? {
                readers.push(self.reader_at(name));
            }
        }
        Ok(readers)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(FilesetError::Cancelled);
        }
        Ok(())
    }
}
