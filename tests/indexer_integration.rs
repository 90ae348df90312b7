use photocast::config::Configuration;
use photocast::index::{Blacklist, Snapshot};
use photocast::tasks::indexer;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

fn test_config(lib: PathBuf, blacklist: &str) -> Configuration {
    Configuration {
        photo_library_path: lib,
        device_name: "Test TV".to_string(),
        blacklist: Blacklist::parse(blacklist),
        photo_index_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

async fn next_snapshot(rx: &mut watch::Receiver<Snapshot>) -> Snapshot {
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("timeout waiting for snapshot")
        .expect("indexer dropped the sender");
    rx.borrow().clone()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn publishes_blacklist_filtered_snapshots() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().join("lib");
    fs::create_dir_all(lib.join("private")).unwrap();
    fs::write(lib.join("a.jpg"), b"x").unwrap();
    fs::write(lib.join("b.jpg"), b"x").unwrap();
    fs::write(lib.join("private").join("c.jpg"), b"x").unwrap();

    let (tx, mut rx) = watch::channel(Snapshot::empty());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(indexer::run(
        test_config(lib.clone(), "priv"),
        tx,
        cancel.clone(),
    ));

    let snapshot = next_snapshot(&mut rx).await;
    assert_eq!(snapshot.generation(), 1);
    assert_eq!(
        snapshot.paths(),
        &[lib.join("a.jpg"), lib.join("b.jpg")],
        "blacklisted subtree must be excluded"
    );

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn picks_up_new_files_on_later_rescans() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().join("lib");
    fs::create_dir_all(&lib).unwrap();
    fs::write(lib.join("a.jpg"), b"x").unwrap();

    let (tx, mut rx) = watch::channel(Snapshot::empty());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(indexer::run(test_config(lib.clone(), ""), tx, cancel.clone()));

    let first = next_snapshot(&mut rx).await;
    assert_eq!(first.paths(), &[lib.join("a.jpg")]);

    fs::write(lib.join("b.jpg"), b"x").unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        assert!(std::time::Instant::now() < deadline, "rescan never saw b.jpg");
        let snapshot = next_snapshot(&mut rx).await;
        if snapshot.paths().contains(&lib.join("b.jpg")) {
            assert!(snapshot.generation() > first.generation());
            break;
        }
    }

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_rescan_keeps_previous_snapshot() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().join("lib");
    fs::create_dir_all(&lib).unwrap();
    fs::write(lib.join("a.jpg"), b"x").unwrap();

    let (tx, mut rx) = watch::channel(Snapshot::empty());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(indexer::run(test_config(lib.clone(), ""), tx, cancel.clone()));

    let good = next_snapshot(&mut rx).await;
    assert_eq!(good.paths(), &[lib.join("a.jpg")]);

    // The root disappearing must not blank the slideshow: refreshes fail and
    // the last good snapshot stays published.
    fs::remove_dir_all(&lib).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let current = rx.borrow().clone();
    assert_eq!(current.generation(), good.generation());
    assert_eq!(current.paths(), good.paths());

    cancel.cancel();
    let _ = handle.await;
}
