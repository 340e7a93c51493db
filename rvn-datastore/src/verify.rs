//! Integrity verification and repair.
//!
//! `verify_repository` returns one [`VerifyAction`] per defect found; each
//! carries enough context to describe the problem and, if a [`RepairAction`]
//! is attached, to fix it. A clean repository returns an empty sequence —
//! there is no "all healthy" action, only absence of unhealthy ones.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rvn_api_types::Checksum;

use crate::blob::Blob;
use crate::config::CHUNKER;
use crate::repository::Repository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Defect {
    /// A Block references a checksum with no backing file in the blob store.
    MissingBlob { version_id: i64, path: String, checksum: Checksum },
    /// A blob file exists but its content hashes to something other than
    /// its filename.
    CorruptBlob { version_id: i64, path: String, checksum: Checksum },
    /// A file exists in the blob store with no Block referencing it.
    OrphanBlob { checksum: Checksum },
    /// The metadata row's recorded size disagrees with the file's length.
    SizeMismatch {
        version_id: i64,
        path: String,
        checksum: Checksum,
        recorded_size: u64,
        actual_size: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub success: bool,
    pub message: String,
}

pub struct VerifyAction {
    pub defect: Defect,
    repo: Arc<Repository>,
    work_dir: Option<PathBuf>,
}

impl VerifyAction {
    /// Attempts to fix the defect this action describes. For a missing or
    /// corrupt blob this re-ingests the owning version's file from
    /// `work_dir` if its whole-file checksum still matches, rewriting the
    /// blob; otherwise it deletes the Version (and its Snapshot, if that
    /// leaves it empty). Orphan blobs are deleted outright. Size
    /// mismatches are treated as corruption.
    pub fn repair(&self) -> Result<RepairOutcome> {
        match &self.defect {
            Defect::OrphanBlob { checksum } => {
                self.repo.blobs().delete(checksum)?;
                Ok(RepairOutcome {
                    success: true,
                    message: format!("deleted orphan blob {checksum}"),
                })
            }
            Defect::MissingBlob { version_id, path, .. }
            | Defect::CorruptBlob { version_id, path, .. }
            | Defect::SizeMismatch { version_id, path, .. } => self.repair_version(*version_id, path),
        }
    }

    fn repair_version(&self, version_id: i64, path: &str) -> Result<RepairOutcome> {
        let Some(version) = self.repo.metadata().get_version(version_id)? else {
            return Ok(RepairOutcome {
                success: true,
                message: format!("version {path} was already removed"),
            });
        };

        let recovered = self.work_dir.as_ref().and_then(|work_dir| {
            let full_path = work_dir.join(path);
            let algorithm = self.repo.hash_algorithm();
            match algorithm.digest_file(&full_path) {
                Ok(digest) if digest == version.checksum => Some(full_path),
                _ => None,
            }
        });

        if let Some(full_path) = recovered {
            let algorithm = self.repo.hash_algorithm();
            let chunker = self.repo.config().get(&CHUNKER)?.build();
            let mut reader = std::fs::File::open(&full_path)?;
            let chunks = chunker.chunk(&mut reader)?;

            let blocks = self.repo.metadata().list_blocks_for_version(version_id)?;
            for block in &blocks {
                self.repo.metadata().delete_blob_row(block.blob_id).ok();
            }

            for (idx, chunk) in chunks.iter().enumerate() {
                let whole = Blob::from_file(&full_path, algorithm);
                let slice = whole.bounded_slice(chunk.offset, chunk.length);
                let (blob_checksum, blob_size) = self.repo.blobs().put(&slice)?;
                let blob_id = self.repo.metadata().upsert_blob(&blob_checksum, blob_size as i64)?;
                self.repo.metadata().insert_block(version_id, blob_id, idx as i64).ok();
            }

            return Ok(RepairOutcome {
                success: true,
                message: format!("re-ingested {path} from the working directory"),
            });
        }

        let snapshot_id = version.snapshot_id;
        self.repo.metadata().remove_version_by_id(version_id)?;
        if self.repo.metadata().snapshot_version_count(snapshot_id)? == 0 {
            self.repo.metadata().remove_snapshot(snapshot_id)?;
        }
        Ok(RepairOutcome {
            success: true,
            message: format!("removed unrecoverable version {path}"),
        })
    }
}

/// Cross-references the metadata store's `blob`/`block`/`version` rows
/// against what is actually present in the blob store directory, and
/// reports every defect as a [`VerifyAction`].
pub fn verify_repository(repo: &Arc<Repository>, work_dir: Option<&Path>) -> Result<Vec<VerifyAction>> {
    let mut actions = Vec::new();
    let work_dir = work_dir.map(Path::to_path_buf);

    let stored: std::collections::HashMap<Checksum, u64> = repo.blobs().iter_stored()?.into_iter().collect();
    let blob_rows = repo.metadata().list_blobs()?;
    log::debug!("verify: checking {} blob rows against the blob store", blob_rows.len());

    for (checked, blob_row) in blob_rows.iter().enumerate() {
        if checked > 0 && checked % 1000 == 0 {
            log::debug!(
                "verify: checked {checked}/{} blobs ({}%)",
                blob_rows.len(),
                checked * 100 / blob_rows.len()
            );
        }
        match stored.get(&blob_row.checksum) {
            None => {
                log::warn!("blob {} referenced by metadata has no backing file", blob_row.checksum);
                if let Some((version_id, path)) = owning_version(repo, blob_row.id)? {
                    actions.push(VerifyAction {
                        defect: Defect::MissingBlob { version_id, path, checksum: blob_row.checksum.clone() },
                        repo: Arc::clone(repo),
                        work_dir: work_dir.clone(),
                    });
                }
            }
            Some(&actual_size) => {
                if actual_size as i64 != blob_row.size {
                    log::warn!(
                        "blob {} recorded at {} bytes but {actual_size} bytes on disk",
                        blob_row.checksum,
                        blob_row.size
                    );
                    if let Some((version_id, path)) = owning_version(repo, blob_row.id)? {
                        actions.push(VerifyAction {
                            defect: Defect::SizeMismatch {
                                version_id,
                                path,
                                checksum: blob_row.checksum.clone(),
                                recorded_size: blob_row.size as u64,
                                actual_size,
                            },
                            repo: Arc::clone(repo),
                            work_dir: work_dir.clone(),
                        });
                    }
                    continue;
                }
                if let Some(blob) = repo.blobs().get(&blob_row.checksum) {
                    let recomputed = blob.checksum()?;
                    if recomputed != blob_row.checksum {
                        log::warn!("blob {} does not hash to its own filename", blob_row.checksum);
                        if let Some((version_id, path)) = owning_version(repo, blob_row.id)? {
                            actions.push(VerifyAction {
                                defect: Defect::CorruptBlob { version_id, path, checksum: blob_row.checksum.clone() },
                                repo: Arc::clone(repo),
                                work_dir: work_dir.clone(),
                            });
                        }
                    }
                }
            }
        }
    }

    let orphans = repo.metadata().list_unreferenced_blobs()?;
    if !orphans.is_empty() {
        log::debug!("verify: {} blobs have no referencing block", orphans.len());
    }
    for blob_row in orphans {
        actions.push(VerifyAction {
            defect: Defect::OrphanBlob { checksum: blob_row.checksum },
            repo: Arc::clone(repo),
            work_dir: work_dir.clone(),
        });
    }

    log::info!("verify: {} defects found across {} blobs", actions.len(), blob_rows.len());
    Ok(actions)
}

/// Any one version whose blocks reference this blob, used to locate a
/// working-directory path to repair from. A blob can in principle be
/// shared by many versions; the first one found stands in for all of them
/// since they all carry identical content.
fn owning_version(repo: &Arc<Repository>, blob_id: i64) -> Result<Option<(i64, String)>> {
    for timeline in repo.timelines()? {
        for snapshot in timeline.list_snapshots()? {
            for version in snapshot.versions()? {
                let blocks = repo.metadata().list_blocks_for_version(version.id())?;
                if blocks.iter().any(|b| b.blob_id == blob_id) {
                    return Ok(Some((version.id(), version.path().to_string())));
                }
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn corrupt_blob_is_detected_and_repaired_from_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path().join("repo"), Config::new()).unwrap();
        let timeline = repo.create_timeline().unwrap();
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();
        std::fs::write(work_dir.join("a"), b"apple").unwrap();
        timeline
            .create_snapshot(&[PathBuf::from("a")], &work_dir, None, "", false)
            .unwrap();

        let blob_row = repo.metadata().list_blobs().unwrap().into_iter().next().unwrap();
        let blob_path = repo.blobs().path_for(&blob_row.checksum);
        // Same length as "apple" so the size check passes and this exercises
        // the checksum-mismatch path specifically, not SizeMismatch.
        std::fs::write(&blob_path, b"grape").unwrap();

        let actions = verify_repository(&repo, Some(&work_dir)).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0].defect, Defect::CorruptBlob { .. }));

        let outcome = actions[0].repair().unwrap();
        assert!(outcome.success);

        let actions_after = verify_repository(&repo, Some(&work_dir)).unwrap();
        assert!(actions_after.is_empty());
    }

    #[test]
    fn size_mismatch_blob_is_detected_and_repaired_from_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path().join("repo"), Config::new()).unwrap();
        let timeline = repo.create_timeline().unwrap();
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();
        std::fs::write(work_dir.join("a"), b"apple").unwrap();
        timeline
            .create_snapshot(&[PathBuf::from("a")], &work_dir, None, "", false)
            .unwrap();

        let blob_row = repo.metadata().list_blobs().unwrap().into_iter().next().unwrap();
        let blob_path = repo.blobs().path_for(&blob_row.checksum);
        // Different length than "apple" (5 bytes), so this is caught by the
        // size check before the checksum is ever recomputed.
        std::fs::write(&blob_path, b"corrupted!").unwrap();

        let actions = verify_repository(&repo, Some(&work_dir)).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0].defect, Defect::SizeMismatch { .. }));

        let outcome = actions[0].repair().unwrap();
        assert!(outcome.success);

        let actions_after = verify_repository(&repo, Some(&work_dir)).unwrap();
        assert!(actions_after.is_empty());
    }

    #[test]
    fn missing_blob_without_work_dir_removes_version() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path().join("repo"), Config::new()).unwrap();
        let timeline = repo.create_timeline().unwrap();
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();
        std::fs::write(work_dir.join("a"), b"apple").unwrap();
        let snapshot = timeline
            .create_snapshot(&[PathBuf::from("a")], &work_dir, None, "", false)
            .unwrap();

        let blob_row = repo.metadata().list_blobs().unwrap().into_iter().next().unwrap();
        let blob_path = repo.blobs().path_for(&blob_row.checksum);
        std::fs::remove_file(&blob_path).unwrap();

        let actions = verify_repository(&repo, None).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0].defect, Defect::MissingBlob { .. }));

        let outcome = actions[0].repair().unwrap();
        assert!(outcome.success);
        assert!(repo.metadata().get_snapshot(snapshot.id()).unwrap().is_none());
    }

    #[test]
    fn orphan_blob_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path().join("repo"), Config::new()).unwrap();
        let blob = Blob::from_bytes(b"nobody references me".to_vec(), repo.hash_algorithm());
        let (checksum, size) = repo.blobs().put(&blob).unwrap();
        repo.metadata().upsert_blob(&checksum, size as i64).unwrap();

        let actions = verify_repository(&repo, None).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0].defect, Defect::OrphanBlob { .. }));
        assert!(actions[0].repair().unwrap().success);
        assert!(!repo.blobs().contains(&checksum));
    }
}
