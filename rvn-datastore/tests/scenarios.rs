//! End-to-end scenarios pinning the literal values of a repository's
//! externally observable behaviour, as opposed to the unit tests beside
//! each module that check one function's contract in isolation.

use std::path::PathBuf;

use rvn_api_types::CleanupPolicy;
use rvn_datastore::{Config, Repository};

fn new_repo(dir: &std::path::Path) -> std::sync::Arc<Repository> {
    Repository::create(dir.join("repo"), Config::new()).unwrap()
}

fn count_blob_files(repo_path: &std::path::Path) -> usize {
    let blobs_dir = repo_path.join("blobs");
    let mut count = 0;
    for xx in std::fs::read_dir(&blobs_dir).unwrap() {
        let xx = xx.unwrap();
        if !xx.file_type().unwrap().is_dir() {
            continue;
        }
        for yy in std::fs::read_dir(xx.path()).unwrap() {
            let yy = yy.unwrap();
            if !yy.file_type().unwrap().is_dir() {
                continue;
            }
            count += std::fs::read_dir(yy.path()).unwrap().count();
        }
    }
    count
}

/// S1. Single-file round-trip.
#[test]
fn single_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let work_dir = dir.path().join("w");
    std::fs::create_dir_all(&work_dir).unwrap();
    std::fs::write(work_dir.join("a"), b"apple").unwrap();

    let repo = new_repo(dir.path());
    let timeline = repo.create_timeline().unwrap();
    let snapshot = timeline
        .create_snapshot(&[PathBuf::from("a")], &work_dir, None, "", false)
        .unwrap();
    assert_eq!(snapshot.revision(), 1);

    let history = timeline.list_versions("a").unwrap();
    assert_eq!(history.len(), 1);
    let (_, version) = &history[0];
    assert_eq!(version.size(), 5);
    assert_eq!(
        version.checksum().to_hex(),
        repo.hash_algorithm().digest_bytes(b"apple").to_hex()
    );

    let target = dir.path().join("checkout-a");
    let bytes = version.read(0, version.size()).unwrap();
    std::fs::write(&target, &bytes).unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"apple");
}

/// S2. Dedup across snapshots: two identical files in the same snapshot
/// share exactly one blob file on disk.
#[test]
fn dedup_across_files_in_one_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let work_dir = dir.path().join("w");
    std::fs::create_dir_all(&work_dir).unwrap();
    std::fs::write(work_dir.join("a"), b"apple").unwrap();
    std::fs::write(work_dir.join("b"), b"apple").unwrap();

    let repo = new_repo(dir.path());
    let timeline = repo.create_timeline().unwrap();
    let snapshot = timeline
        .create_snapshot(&[PathBuf::from("a"), PathBuf::from("b")], &work_dir, None, "", false)
        .unwrap();

    let versions = snapshot.versions().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].checksum(), versions[1].checksum());

    assert_eq!(count_blob_files(repo.path()), 1);
}

/// S3. Cumulative versions collapse older snapshots' untouched paths
/// forward.
#[test]
fn cumulative_versions_collapse_older_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let work_dir = dir.path().join("w");
    std::fs::create_dir_all(work_dir.join("c")).unwrap();

    let repo = new_repo(dir.path());
    let timeline = repo.create_timeline().unwrap();

    std::fs::write(work_dir.join("a"), b"apple").unwrap();
    std::fs::write(work_dir.join("c/a"), b"orange").unwrap();
    timeline
        .create_snapshot(
            &[PathBuf::from("a"), PathBuf::from("c/a")],
            &work_dir,
            None,
            "",
            false,
        )
        .unwrap();

    std::fs::write(work_dir.join("a"), b"apple-2").unwrap();
    std::fs::write(work_dir.join("b"), b"banana").unwrap();
    let rev2 = timeline
        .create_snapshot(&[PathBuf::from("a"), PathBuf::from("b")], &work_dir, None, "", false)
        .unwrap();
    assert_eq!(rev2.revision(), 2);

    let mut cumulative: Vec<_> = rev2
        .cumulative_versions()
        .unwrap()
        .into_iter()
        .map(|v| (v.path().to_string(), v.checksum().to_hex()))
        .collect();
    cumulative.sort();

    let algorithm = repo.hash_algorithm();
    let mut expected = vec![
        ("a".to_string(), algorithm.digest_bytes(b"apple-2").to_hex()),
        ("b".to_string(), algorithm.digest_bytes(b"banana").to_hex()),
        ("c/a".to_string(), algorithm.digest_bytes(b"orange").to_hex()),
    ];
    expected.sort();

    assert_eq!(cumulative, expected);
}

/// S4. Retention + pin: a `keep newest 2` policy leaves the pinned
/// snapshot and the two newest, regardless of the pin's position.
#[test]
fn retention_respects_pin_alongside_keep_newest() {
    let dir = tempfile::tempdir().unwrap();
    let work_dir = dir.path().join("w");
    std::fs::create_dir_all(&work_dir).unwrap();

    let repo = new_repo(dir.path());
    let timeline = repo.create_timeline().unwrap();
    timeline.attach_cleanup_policy(&CleanupPolicy::of_versions(2)).unwrap();

    let mut snapshots = Vec::new();
    for i in 0..5 {
        std::fs::write(work_dir.join("a"), format!("v{i}")).unwrap();
        snapshots.push(
            timeline
                .create_snapshot(&[PathBuf::from("a")], &work_dir, None, "", false)
                .unwrap(),
        );
    }

    let mut pinned = timeline.get_snapshot(2).unwrap().unwrap();
    pinned.set_pinned(true).unwrap();

    timeline.clean().unwrap();

    let remaining: Vec<i64> = timeline
        .list_snapshots()
        .unwrap()
        .iter()
        .map(|s| s.revision())
        .collect();
    let mut remaining_sorted = remaining.clone();
    remaining_sorted.sort();
    assert_eq!(remaining_sorted, vec![2, 4, 5]);

    drop(snapshots);
}
