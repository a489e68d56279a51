mod common;

use std::collections::BTreeSet;

use common::{small_options, storage, write_fileset};
use fileset::{CompactSpec, FilesetError, ObjectClient, Storage};

async fn merged_view(storage: &Storage, fileset: &str) -> Vec<(String, Vec<String>, Vec<u8>)> {
    let mut reader = storage
        .new_merge_reader(&[fileset])
        .await
        .expect("merge reader");
    let mut files = Vec::new();
    while let Some(header) = reader.next().await.expect("next") {
        let ids = header.tags().iter().map(|tag| tag.id.clone()).collect();
        let content = reader.read_to_end().await.expect("read");
        files.push((header.path, ids, content));
    }
    reader.close().expect("close");
    files
}

#[tokio::test]
async fn first_compaction_targets_level_zero() {
    let (_, storage) = storage(small_options());
    write_fileset(&storage, "repo/diff", &[("/a", &[("t", "a")])]).await;

    let spec = storage.compact_spec("repo", "repo").await.expect("spec");
    assert_eq!(
        spec,
        CompactSpec {
            output: "pfs/repo/compacted/0".to_string(),
            inputs: vec!["pfs/repo/diff".to_string()],
        }
    );

    storage.execute(&spec).await.expect("execute");
    let files = merged_view(&storage, "repo").await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].2, b"a");
}

#[tokio::test]
async fn levels_above_the_output_are_copied_forward() {
    let options = small_options()
        .level_zero_size(1)
        .level_size_base(1_000_000);
    let (objects, storage) = storage(options);
    write_fileset(&storage, "old/compacted/0", &[("/l0", &[("t", "zero")])]).await;
    write_fileset(&storage, "old/compacted/2", &[("/l2", &[("t", "two")])]).await;
    write_fileset(&storage, "new/diff", &[("/d", &[("t", "diff")])]).await;

    let spec = storage.compact_spec("new", "old").await.expect("spec");
    assert_eq!(spec.output, "pfs/new/compacted/1");
    assert_eq!(spec.inputs, vec!["pfs/new/diff", "pfs/old/compacted/0"]);

    let source = objects
        .read("pfs/old/compacted/2", 0, None)
        .await
        .expect("read level");
    let copied = objects
        .read("pfs/new/compacted/2", 0, None)
        .await
        .expect("read copy");
    assert_eq!(source, copied);

    storage
        .compact(&spec.output, &spec.inputs)
        .await
        .expect("compact");
    let paths: Vec<String> = merged_view(&storage, "new")
        .await
        .into_iter()
        .map(|(path, _, _)| path)
        .collect();
    assert_eq!(paths, vec!["/d", "/l0", "/l2"]);
}

#[tokio::test]
async fn oversized_compactions_open_a_new_level() {
    let options = small_options().level_zero_size(1).level_size_base(1);
    let (_, storage) = storage(options);
    write_fileset(&storage, "repo/compacted/0", &[("/old", &[("t", "o")])]).await;
    write_fileset(&storage, "repo/diff", &[("/new", &[("t", "n")])]).await;

    let spec = storage.compact_spec("repo", "repo").await.expect("spec");
    assert_eq!(spec.output, "pfs/repo/compacted/1");
    assert_eq!(spec.inputs, vec!["pfs/repo/diff", "pfs/repo/compacted/0"]);
}

#[tokio::test]
async fn in_place_compaction_consumes_its_levels() {
    let options = small_options().level_zero_size(1).level_size_base(1);
    let (objects, storage) = storage(options);
    write_fileset(&storage, "repo/compacted/0", &[("/old", &[("t", "o")])]).await;
    write_fileset(&storage, "repo/diff", &[("/new", &[("t", "n")])]).await;

    let spec = storage.compact_spec("repo", "repo").await.expect("spec");
    storage.execute(&spec).await.expect("execute");

    assert_eq!(
        objects.walk("pfs/repo/compacted").await.expect("walk"),
        vec!["pfs/repo/compacted/1"]
    );
    assert!(objects.exists("pfs/repo/diff").await.expect("exists"));
    assert_eq!(
        merged_view(&storage, "repo").await,
        vec![
            ("/new".to_string(), vec!["t".to_string()], b"n".to_vec()),
            ("/old".to_string(), vec!["t".to_string()], b"o".to_vec()),
        ]
    );
}

#[tokio::test]
async fn execute_keeps_levels_of_other_filesets() {
    let options = small_options().level_zero_size(1).level_size_base(1);
    let (objects, storage) = storage(options);
    write_fileset(&storage, "old/compacted/0", &[("/old", &[("t", "o")])]).await;
    write_fileset(&storage, "new/diff", &[("/new", &[("t", "n")])]).await;

    let spec = storage.compact_spec("new", "old").await.expect("spec");
    assert_eq!(spec.inputs, vec!["pfs/new/diff", "pfs/old/compacted/0"]);
    storage.execute(&spec).await.expect("execute");

    assert!(objects.exists("pfs/old/compacted/0").await.expect("exists"));
    assert_eq!(merged_view(&storage, "old").await.len(), 1);
    assert_eq!(merged_view(&storage, "new").await.len(), 2);
}

#[tokio::test]
async fn non_numeric_levels_are_rejected() {
    let (objects, storage) = storage(small_options());
    write_fileset(&storage, "bad/diff", &[("/a", &[("t", "a")])]).await;
    let diff = objects.read("pfs/bad/diff", 0, None).await.expect("read");
    let mut writer = objects.writer("pfs/bad/compacted/x").await.expect("writer");
    writer.write(&diff).await.expect("write");
    writer.close().await.expect("close");

    assert!(matches!(
        storage.compact_spec("bad", "bad").await,
        Err(FilesetError::InvalidLevel(_))
    ));
}

#[tokio::test]
async fn missing_diff_is_reported() {
    let (_, storage) = storage(small_options());
    assert!(matches!(
        storage.compact_spec("none", "none").await,
        Err(FilesetError::NotFound(_))
    ));
}

/// Ingests one diff per round and compacts it, either into a fresh fileset
/// per round or in place, checking the merged view after every round.
async fn compaction_rounds(in_place: bool) {
    let options = small_options().level_zero_size(64).level_size_base(2);
    let (objects, storage) = storage(options);
    let mut expected_paths = BTreeSet::new();

    for round in 0..8usize {
        let fileset = if in_place {
            "c".to_string()
        } else {
            format!("c{round}")
        };
        let previous = if in_place || round == 0 {
            fileset.clone()
        } else {
            format!("c{}", round - 1)
        };

        let path = format!("/r{round}");
        let tag = format!("r{round}");
        let content = "x".repeat(10 * (round + 1));
        let mut writer = storage.new_writer(&format!("{fileset}/diff"));
        writer
            .write_header(&path, content.len() as u64)
            .await
            .expect("header");
        writer.start_tag(tag.as_str()).expect("tag");
        writer.write(content.as_bytes()).await.expect("write");
        writer.write_header("/shared", 1).await.expect("header");
        writer.start_tag(tag.as_str()).expect("tag");
        writer.write(b"s").await.expect("write");
        writer.close().await.expect("close diff");
        expected_paths.insert(path);
        expected_paths.insert("/shared".to_string());

        let spec = storage
            .compact_spec(&fileset, &previous)
            .await
            .expect("spec");
        assert_eq!(spec.inputs[0], format!("pfs/{fileset}/diff"));
        storage.execute(&spec).await.expect("execute");

        let view = merged_view(&storage, &fileset).await;
        let paths: BTreeSet<String> = view.iter().map(|(path, _, _)| path.clone()).collect();
        assert_eq!(paths, expected_paths, "round {round}");
        assert_eq!(view.len(), expected_paths.len(), "round {round}");

        // lower levels hold newer data, and each output lists its diff first
        let newest_first: Vec<String> = (0..=round).rev().map(|r| format!("r{r}")).collect();
        let shared = view
            .iter()
            .find(|(path, _, _)| path == "/shared")
            .expect("shared file");
        assert_eq!(shared.1, newest_first, "round {round}");
        assert_eq!(shared.2, vec![b's'; round + 1]);
        for (path, tags, content) in view.iter().filter(|(path, _, _)| path != "/shared") {
            let r: usize = path[2..].parse().expect("round path");
            assert_eq!(tags, &vec![format!("r{r}")], "{path}");
            assert_eq!(content.len(), 10 * (r + 1), "{path}");
        }

        if in_place {
            // consumed levels are deleted
            let levels = objects
                .walk(&format!("pfs/{fileset}/compacted"))
                .await
                .expect("walk");
            assert!(!levels.is_empty() && levels.len() <= round + 1, "{levels:?}");
        }
    }
}

#[tokio::test]
async fn repeated_compactions_keep_every_file() {
    compaction_rounds(false).await;
}

#[tokio::test]
async fn repeated_in_place_compactions_keep_every_file_once() {
    compaction_rounds(true).await;
}
