use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use atomic_write::{
    write_atomic, write_atomic_with_callback, write_text_atomic, AtomicWriter, WriteStage,
};
use atomic_write_integration_tests::{filled, leftover_temp_files};
use tokio::task::JoinSet;

#[tokio::test]
async fn writes_4096_bytes_to_new_destination() {
    let temp = tempfile::tempdir().expect("tempdir");
    let destination = temp.path().join("hello");
    let content = b"ABCD".repeat(1024);
    assert_eq!(content.len(), 4096);

    write_atomic(&destination, &content)
        .await
        .expect("atomic write");

    assert_eq!(std::fs::read(&destination).expect("read"), content);
    assert!(leftover_temp_files(temp.path()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_thousand_concurrent_writes_to_distinct_destinations() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut tasks = JoinSet::new();
    for index in 0..2000 {
        let destination = temp.path().join(format!("file-{index}"));
        let content = filled(format!("{index:04}").as_bytes(), 4096);
        tasks.spawn(async move {
            let result = write_atomic(&destination, &content).await;
            (destination, content, result)
        });
    }

    let mut completed = 0;
    while let Some(joined) = tasks.join_next().await {
        let (destination, content, result) = joined.expect("write task");
        result.expect("atomic write");
        assert_eq!(std::fs::read(&destination).expect("read"), content);
        completed += 1;
    }
    assert_eq!(completed, 2000);
    assert!(leftover_temp_files(temp.path()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_to_one_destination_leave_exactly_one_content() {
    let temp = tempfile::tempdir().expect("tempdir");
    let destination = temp.path().join("shared");
    let contents: Vec<Vec<u8>> = (0..16u8)
        .map(|index| filled(&[b'A' + index, b'a' + index], 64 * 1024))
        .collect();

    let writer = AtomicWriter::new();
    let mut tasks = JoinSet::new();
    for content in contents.clone() {
        let writer = writer.clone();
        let destination = destination.clone();
        tasks.spawn(async move { writer.write(&destination, &content).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("write task").expect("atomic write");
    }

    let landed = std::fs::read(&destination).expect("read");
    assert!(
        contents.iter().any(|content| *content == landed),
        "destination must equal one writer's content"
    );
    assert!(leftover_temp_files(temp.path()).is_empty());
}

#[tokio::test]
async fn overwrites_existing_destination() {
    let temp = tempfile::tempdir().expect("tempdir");
    let destination = temp.path().join("config.toml");
    std::fs::write(&destination, "version = 1\nname = \"old\"\n").expect("seed");

    write_text_atomic(&destination, "version = 2\n")
        .await
        .expect("atomic write");

    assert_eq!(
        std::fs::read_to_string(&destination).expect("read"),
        "version = 2\n"
    );
}

#[tokio::test]
async fn buffers_larger_than_one_file_write_are_written_completely() {
    let temp = tempfile::tempdir().expect("tempdir");
    let destination = temp.path().join("snapshot.bin");
    let content: Vec<u8> = (0..5 * 1024 * 1024).map(|index| (index % 253) as u8).collect();

    write_atomic(&destination, &content)
        .await
        .expect("atomic write");

    assert_eq!(std::fs::read(&destination).expect("read"), content);
}

#[tokio::test]
async fn missing_parent_directory_fails_at_open() {
    let temp = tempfile::tempdir().expect("tempdir");
    let destination = temp.path().join("missing").join("state.json");

    let error = write_atomic(&destination, b"orphan")
        .await
        .expect_err("parent does not exist");

    assert_eq!(error.stage(), WriteStage::Opening);
    assert_eq!(error.kind(), io::ErrorKind::NotFound);
    assert!(!destination.exists());
    assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn rename_onto_non_empty_directory_rolls_back() {
    let temp = tempfile::tempdir().expect("tempdir");
    let destination = temp.path().join("occupied");
    std::fs::create_dir(&destination).expect("create dir");
    std::fs::write(destination.join("keep.txt"), b"keep").expect("seed");

    let error = write_atomic(&destination, b"file over dir")
        .await
        .expect_err("cannot rename over directory");

    assert_eq!(error.stage(), WriteStage::Renaming);
    assert!(error.raw_os_error().is_some());
    assert!(destination.is_dir());
    assert_eq!(
        std::fs::read(destination.join("keep.txt")).expect("read"),
        b"keep"
    );
    assert!(leftover_temp_files(temp.path()).is_empty());
}

#[tokio::test]
async fn callback_form_reports_success_exactly_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let destination = temp.path().join("callback.bin");
    let content = filled(b"CD", 4096);
    let invocations = Arc::new(AtomicUsize::new(0));
    let (sender, receiver) = tokio::sync::oneshot::channel();

    let counter = Arc::clone(&invocations);
    let task = write_atomic_with_callback(destination.clone(), content.clone(), move |result| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = sender.send(result);
    })
    .expect("inside runtime");
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    receiver
        .await
        .expect("callback delivered")
        .expect("atomic write");
    task.await.expect("write task");
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(&destination).expect("read"), content);
    assert!(leftover_temp_files(temp.path()).is_empty());
}
