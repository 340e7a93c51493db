//! An independent line of history within a repository: an ordered series
//! of snapshots, each a revision of the set of paths tracked on this
//! timeline.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rvn_api_types::{CleanupPolicy, PosixPermissions, ReversionError, RetentionDuration};
use uuid::Uuid;

use crate::blob::Blob;
use crate::config::CHUNKER;
use crate::metadata::CleanupPolicyRow;
use crate::repository::{now_ms, Repository};
use crate::snapshot::Snapshot;

#[derive(Clone)]
pub struct Timeline {
    repo: Arc<Repository>,
    id: Uuid,
}

impl Timeline {
    pub(crate) fn new(repo: Arc<Repository>, id: Uuid) -> Self {
        Timeline { repo, id }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Records a new snapshot on this timeline covering `paths`, resolved
    /// relative to `work_dir`. Every path must exist under `work_dir`;
    /// the first missing one fails the whole operation with `NoSuchFile`
    /// before any metadata is written.
    ///
    /// For each path: chunk its content with the repository's configured
    /// chunker, store each chunk as a content-addressed blob (deduplicated
    /// against whatever the store already holds), record a `Block` row per
    /// chunk in path order, and record one `Version` row carrying the
    /// whole-file checksum and POSIX attributes.
    pub fn create_snapshot(
        &self,
        paths: &[PathBuf],
        work_dir: &Path,
        name: Option<&str>,
        description: &str,
        pinned: bool,
    ) -> Result<Snapshot> {
        for path in paths {
            if !work_dir.join(path).is_file() {
                return Err(ReversionError::no_such_file(path.display().to_string()).into());
            }
        }

        let snapshot_row = self
            .repo
            .metadata()
            .create_snapshot(self.id, name, description, pinned, now_ms())?;
        log::debug!("timeline {}: recording snapshot revision {} over {} paths", self.id, snapshot_row.revision, paths.len());

        let algorithm = self.repo.hash_algorithm();
        let chunker = self.repo.config().get(&CHUNKER)?.build();

        for (file_idx, path) in paths.iter().enumerate() {
            if file_idx > 0 && file_idx % 1000 == 0 {
                log::debug!("timeline {}: chunked {file_idx}/{} paths", self.id, paths.len());
            }
            let full_path = work_dir.join(path);
            let path_str = path_to_key(path);

            let file_meta = std::fs::metadata(&full_path)
                .with_context(|| format!("unable to stat {full_path:?}"))?;
            let size = file_meta.len();
            let last_modified_ms = file_meta.mtime() * 1000 + file_meta.mtime_nsec() / 1_000_000;
            let permissions = PosixPermissions::from_mode_bits(file_meta.mode());
            let checksum = algorithm
                .digest_file(&full_path)
                .with_context(|| format!("unable to digest {full_path:?}"))?;

            let version_id = self.repo.metadata().insert_version(
                snapshot_row.id,
                &path_str,
                last_modified_ms,
                Some(permissions),
                size as i64,
                &checksum,
            )?;

            let mut reader = std::fs::File::open(&full_path)
                .with_context(|| format!("unable to open {full_path:?}"))?;
            let chunks = chunker
                .chunk(&mut reader)
                .with_context(|| format!("unable to chunk {full_path:?}"))?;

            for (idx, chunk) in chunks.iter().enumerate() {
                let whole = Blob::from_file(&full_path, algorithm);
                let slice = whole.bounded_slice(chunk.offset, chunk.length);
                let (blob_checksum, blob_size) = self.repo.blobs().put(&slice)?;
                let blob_id = self.repo.metadata().upsert_blob(&blob_checksum, blob_size as i64)?;
                self.repo.metadata().insert_block(version_id, blob_id, idx as i64)?;
            }
        }

        log::info!(
            "timeline {}: snapshot revision {} recorded ({} paths)",
            self.id,
            snapshot_row.revision,
            paths.len()
        );
        Ok(Snapshot::new(Arc::clone(&self.repo), snapshot_row))
    }

    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        Ok(self
            .repo
            .metadata()
            .list_snapshots(self.id)?
            .into_iter()
            .map(|row| Snapshot::new(Arc::clone(&self.repo), row))
            .collect())
    }

    pub fn get_snapshot(&self, revision: i64) -> Result<Option<Snapshot>> {
        Ok(self
            .repo
            .metadata()
            .get_snapshot_by_revision(self.id, revision)?
            .map(|row| Snapshot::new(Arc::clone(&self.repo), row)))
    }

    pub fn list_versions(&self, path: &str) -> Result<Vec<(Snapshot, crate::version::Version)>> {
        Ok(self
            .repo
            .metadata()
            .list_versions_by_path(self.id, path)?
            .into_iter()
            .map(|(snapshot_row, version_row)| {
                (
                    Snapshot::new(Arc::clone(&self.repo), snapshot_row),
                    crate::version::Version::new(Arc::clone(&self.repo), version_row),
                )
            })
            .collect())
    }

    /// Runs the timeline's attached cleanup policies, deleting versions
    /// they mark for removal. Delegates entirely to the retention module;
    /// this is just the entry point scoped to one timeline.
    pub fn clean(&self) -> Result<Vec<crate::retention::RemovedVersion>> {
        crate::retention::clean_timeline(&self.repo, self.id)
    }

    /// Attaches `policy` to this timeline; `clean()` only ever deletes a
    /// version every attached policy agrees to delete (§4.9), so adding a
    /// policy narrows, never widens, what a future `clean()` removes.
    pub fn attach_cleanup_policy(&self, policy: &CleanupPolicy) -> Result<()> {
        let policy_id = self.repo.metadata().create_cleanup_policy(
            duration_to_ms(policy.min_interval),
            duration_to_ms(policy.time_frame),
            policy.max_versions as i64,
            &policy.description,
        )?;
        self.repo.metadata().attach_policy_to_timeline(self.id, policy_id)?;
        Ok(())
    }

    pub fn cleanup_policies(&self) -> Result<Vec<CleanupPolicyRow>> {
        self.repo.metadata().list_policies_for_timeline(self.id)
    }

    pub fn remove(self) -> Result<bool> {
        self.repo.remove_timeline(self.id)
    }
}

fn path_to_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn duration_to_ms(duration: RetentionDuration) -> Option<i64> {
    duration.as_millis().map(|ms| ms as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn new_timeline() -> (tempfile::TempDir, Timeline) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path().join("repo"), Config::new()).unwrap();
        let timeline = repo.create_timeline().unwrap();
        (dir, timeline)
    }

    #[test]
    fn create_snapshot_fails_fast_on_missing_path() {
        let (dir, timeline) = new_timeline();
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();

        let err = timeline
            .create_snapshot(&[PathBuf::from("missing")], &work_dir, None, "", false)
            .unwrap_err();
        assert!(err.downcast_ref::<ReversionError>().is_some());
        assert!(timeline.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn attach_cleanup_policy_is_visible_through_cleanup_policies() {
        let (_dir, timeline) = new_timeline();
        assert!(timeline.cleanup_policies().unwrap().is_empty());

        timeline
            .attach_cleanup_policy(&CleanupPolicy::of_versions(3))
            .unwrap();

        let policies = timeline.cleanup_policies().unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].max_versions, 3);
    }

    #[test]
    fn list_versions_orders_newest_revision_first() {
        let (dir, timeline) = new_timeline();
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();

        for content in ["v1", "v2", "v3"] {
            std::fs::write(work_dir.join("a"), content).unwrap();
            timeline
                .create_snapshot(&[PathBuf::from("a")], &work_dir, None, "", false)
                .unwrap();
        }

        let history = timeline.list_versions("a").unwrap();
        let revisions: Vec<i64> = history.iter().map(|(s, _)| s.revision()).collect();
        assert_eq!(revisions, vec![3, 2, 1]);
    }
}
