//! Stacked cleanup-policy retention.
//!
//! Each attached policy proposes a set of versions it would be willing to
//! delete; a version is actually deleted only if every policy proposes it
//! (set intersection), so that "keep 7 daily and 5 weekly" honours both
//! promises independently rather than letting one policy's looseness
//! override another's.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use rvn_api_types::{CleanupPolicy, RetentionDuration};
use uuid::Uuid;

use crate::metadata::{CleanupPolicyRow, SnapshotRow, VersionRow};
use crate::repository::Repository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedVersion {
    pub version_id: i64,
    pub snapshot_id: i64,
    pub path: String,
}

fn row_to_policy(row: &CleanupPolicyRow) -> CleanupPolicy {
    let to_duration = |ms: Option<i64>| match ms {
        None => RetentionDuration::Forever,
        Some(ms) => RetentionDuration::Millis(ms.max(0) as u64),
    };
    CleanupPolicy::new(
        to_duration(row.min_interval_ms),
        to_duration(row.time_frame_ms),
        row.max_versions.clamp(0, u32::MAX as i64) as u32,
        row.description.clone(),
    )
}

/// Whether `snapshot` must be left alone by cleanup. Reads the stored
/// column only — pinning a tag flips this column on the snapshot it names
/// (`Snapshot::add_tag`/`Tag::set_pinned`), so there is nothing left to
/// derive here.
fn is_pinned(snapshot: &SnapshotRow) -> bool {
    snapshot.pinned
}

/// Half-open, contiguous `[start, end)` intervals of length `min_interval`
/// covering `[latest - time_frame, latest]`. `time_frame == Forever`
/// collapses the whole history into a single interval; `min_interval ==
/// Forever` does the same for a bounded frame (one bucket covering it).
fn build_intervals(latest: i64, min_interval: RetentionDuration, time_frame: RetentionDuration) -> Vec<(i64, i64)> {
    let frame_start = match time_frame.as_millis() {
        None => i64::MIN,
        Some(ms) => latest.saturating_sub(ms as i64),
    };
    let end = latest.saturating_add(1);

    match min_interval.as_millis() {
        None => vec![(frame_start, end)],
        Some(step) if step == 0 => vec![(frame_start, end)],
        Some(step) => {
            let step = step as i64;
            let mut intervals = Vec::new();
            let mut cur = frame_start;
            while cur < end {
                let next = cur.saturating_add(step).min(end);
                intervals.push((cur, next));
                cur = next;
            }
            intervals
        }
    }
}

/// Candidate version ids for deletion under one policy, for one path's
/// newest-first, pinned-free version history.
fn candidates_for_path(policy: &CleanupPolicy, versions: &[(SnapshotRow, VersionRow)]) -> HashSet<i64> {
    let mut candidates = HashSet::new();
    if versions.is_empty() || policy.max_versions == CleanupPolicy::KEEP_ALL {
        return candidates;
    }
    let latest = versions[0].0.time_created;
    let intervals = build_intervals(latest, policy.min_interval, policy.time_frame);

    for (start, end) in intervals {
        let in_interval: Vec<&(SnapshotRow, VersionRow)> = versions
            .iter()
            .filter(|(snapshot, _)| snapshot.time_created >= start && snapshot.time_created < end)
            .collect();
        for (_, version) in in_interval.into_iter().skip(policy.max_versions as usize) {
            candidates.insert(version.id);
        }
    }
    candidates
}

/// Runs every cleanup policy attached to `timeline_id` and deletes the
/// versions every one of them agrees can go. A timeline with no attached
/// policies deletes nothing — retention is opt-in per timeline.
pub fn clean_timeline(repo: &Arc<Repository>, timeline_id: Uuid) -> Result<Vec<RemovedVersion>> {
    let policy_rows = repo.metadata().list_policies_for_timeline(timeline_id)?;
    if policy_rows.is_empty() {
        log::debug!("timeline {timeline_id}: no cleanup policies attached, nothing to do");
        return Ok(Vec::new());
    }
    let policies: Vec<CleanupPolicy> = policy_rows.iter().map(row_to_policy).collect();
    let paths = repo.metadata().list_distinct_paths(timeline_id)?;
    log::debug!(
        "timeline {timeline_id}: running {} cleanup policies over {} distinct paths",
        policies.len(),
        paths.len()
    );

    let mut by_path: HashMap<String, Vec<(SnapshotRow, VersionRow)>> = HashMap::new();
    for path in &paths {
        let mut history = repo.metadata().list_versions_by_path(timeline_id, path)?;
        let mut kept = Vec::with_capacity(history.len());
        for (snapshot, version) in history.drain(..) {
            if !is_pinned(&snapshot) {
                kept.push((snapshot, version));
            }
        }
        by_path.insert(path.clone(), kept);
    }

    let mut intersection: Option<HashSet<i64>> = None;
    for policy in &policies {
        let mut policy_candidates = HashSet::new();
        for versions in by_path.values() {
            policy_candidates.extend(candidates_for_path(policy, versions));
        }
        intersection = Some(match intersection {
            None => policy_candidates,
            Some(existing) => existing.intersection(&policy_candidates).copied().collect(),
        });
    }
    let to_delete = intersection.unwrap_or_default();

    let mut version_info: HashMap<i64, (i64, String)> = HashMap::new();
    for versions in by_path.values() {
        for (_, version) in versions {
            version_info.insert(version.id, (version.snapshot_id, version.path.clone()));
        }
    }

    log::debug!("timeline {timeline_id}: {} versions agreed on for deletion", to_delete.len());
    let mut removed = Vec::new();
    for version_id in to_delete {
        let Some((snapshot_id, path)) = version_info.get(&version_id).cloned() else {
            log::warn!("timeline {timeline_id}: version {version_id} marked for deletion has no tracked info, skipping");
            continue;
        };
        let blocks = repo.metadata().list_blocks_for_version(version_id)?;
        repo.metadata().remove_version_by_id(version_id)?;

        for block in blocks {
            if repo.metadata().blob_reference_count(block.blob_id)? == 0 {
                if let Some(blob_row) = repo.metadata().get_blob(block.blob_id)? {
                    repo.blobs().delete(&blob_row.checksum)?;
                }
                repo.metadata().delete_blob_row(block.blob_id)?;
            }
        }

        if repo.metadata().snapshot_version_count(snapshot_id)? == 0 {
            repo.metadata().remove_snapshot(snapshot_id)?;
        }

        removed.push(RemovedVersion { version_id, snapshot_id, path });
    }

    log::info!("timeline {timeline_id}: cleanup removed {} versions", removed.len());
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn new_repo() -> (tempfile::TempDir, Arc<Repository>) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path().join("repo"), Config::new()).unwrap();
        (dir, repo)
    }

    fn commit_file(timeline: &crate::timeline::Timeline, work_dir: &std::path::Path, name: &str, content: &[u8]) {
        std::fs::write(work_dir.join(name), content).unwrap();
        timeline
            .create_snapshot(&[std::path::PathBuf::from(name)], work_dir, None, "", false)
            .unwrap();
    }

    #[test]
    fn keeps_newest_n_versions_and_respects_pin() {
        let (dir, repo) = new_repo();
        let timeline = repo.create_timeline().unwrap();
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();

        let policy_id = repo
            .metadata()
            .create_cleanup_policy(None, None, 2, "keep last 2")
            .unwrap();
        repo.metadata().attach_policy_to_timeline(timeline.id(), policy_id).unwrap();

        for i in 0..5 {
            commit_file(&timeline, &work_dir, "a", format!("v{i}").as_bytes());
        }
        // snapshots[1] is the second-created snapshot (revision 2); pin it.
        let pin_target = timeline.get_snapshot(2).unwrap().unwrap();
        repo.metadata().set_snapshot_pinned(pin_target.id(), true).unwrap();

        let removed = timeline.clean().unwrap();
        assert!(!removed.is_empty());

        let remaining: Vec<i64> = timeline
            .list_snapshots()
            .unwrap()
            .iter()
            .map(|s| s.revision())
            .collect();
        assert!(remaining.contains(&2), "pinned snapshot must survive cleanup");
        assert!(remaining.contains(&5), "newest snapshot must survive under keep-last-2");
    }

    #[test]
    fn timeline_without_policies_deletes_nothing() {
        let (dir, repo) = new_repo();
        let timeline = repo.create_timeline().unwrap();
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();
        commit_file(&timeline, &work_dir, "a", b"content");

        let removed = timeline.clean().unwrap();
        assert!(removed.is_empty());
    }
}
