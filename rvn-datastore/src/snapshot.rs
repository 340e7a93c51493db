//! One revision of a timeline: the set of file versions recorded at a
//! single point in time.

use std::sync::Arc;

use anyhow::Result;

use crate::metadata::{CleanupPolicyRow, SnapshotRow};
use crate::repository::Repository;
use crate::tag::Tag;
use crate::version::Version;

/// An immediate child of a directory prefix as seen through a snapshot's
/// recorded paths — either a file with a version, or a directory that has
/// no version of its own but contains paths beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
}

#[derive(Clone)]
pub struct Snapshot {
    repo: Arc<Repository>,
    row: SnapshotRow,
}

impl Snapshot {
    pub(crate) fn new(repo: Arc<Repository>, row: SnapshotRow) -> Self {
        Snapshot { repo, row }
    }

    pub fn id(&self) -> i64 {
        self.row.id
    }

    pub fn timeline_id(&self) -> uuid::Uuid {
        self.row.timeline_id
    }

    pub fn revision(&self) -> i64 {
        self.row.revision
    }

    pub fn name(&self) -> Option<&str> {
        self.row.name.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.row.description
    }

    pub fn time_created(&self) -> i64 {
        self.row.time_created
    }

    /// Whether cleanup must skip this snapshot. Backed by a single stored
    /// column rather than derived from tags at read time; pinning a tag
    /// (`Snapshot::add_tag`/`Tag::set_pinned`) flips this column on the
    /// snapshot it points at, so the column stays the single source of
    /// truth.
    pub fn pinned(&self) -> bool {
        self.row.pinned
    }

    pub fn set_pinned(&mut self, pinned: bool) -> Result<()> {
        self.repo.metadata().set_snapshot_pinned(self.row.id, pinned)?;
        self.row.pinned = pinned;
        Ok(())
    }

    pub fn set_label(&mut self, name: Option<&str>, description: Option<&str>) -> Result<()> {
        self.repo.metadata().set_snapshot_label(self.row.id, name, description)?;
        if let Some(name) = name {
            self.row.name = Some(name.to_string());
        }
        if let Some(description) = description {
            self.row.description = description.to_string();
        }
        Ok(())
    }

    pub fn versions(&self) -> Result<Vec<Version>> {
        Ok(self
            .repo
            .metadata()
            .list_versions_for_snapshot(self.row.id)?
            .into_iter()
            .map(|row| Version::new(Arc::clone(&self.repo), row))
            .collect())
    }

    pub fn version(&self, path: &str) -> Result<Option<Version>> {
        Ok(self
            .repo
            .metadata()
            .get_version_in_snapshot(self.row.id, path)?
            .map(|row| Version::new(Arc::clone(&self.repo), row)))
    }

    /// Every version recorded at or before this snapshot's revision,
    /// newest per path — the state of the timeline as of this point in
    /// time, not just the files touched by this particular snapshot.
    pub fn cumulative_versions(&self) -> Result<Vec<Version>> {
        Ok(self
            .repo
            .metadata()
            .cumulative_versions(self.row.timeline_id, self.row.revision)?
            .into_iter()
            .map(|row| Version::new(Arc::clone(&self.repo), row))
            .collect())
    }

    /// Immediate children of `directory_path` ("" for the root) among the
    /// versions recorded in this snapshot, collapsing deeper paths into a
    /// single directory entry.
    pub fn list_children(&self, directory_path: &str) -> Result<Vec<DirEntry>> {
        let prefix = if directory_path.is_empty() {
            String::new()
        } else {
            format!("{}/", directory_path.trim_end_matches('/'))
        };

        let mut seen = std::collections::BTreeMap::new();
        for version in self.repo.metadata().list_versions_for_snapshot(self.row.id)? {
            let Some(rest) = version.path.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((child, _)) => {
                    seen.insert(child.to_string(), true);
                }
                None => {
                    seen.entry(rest.to_string()).or_insert(false);
                }
            }
        }

        Ok(seen
            .into_iter()
            .map(|(name, is_directory)| DirEntry { name, is_directory })
            .collect())
    }

    /// Removes the recorded version of `path` from this snapshot, sweeping
    /// any blob that is left with zero references afterwards, and removing
    /// the snapshot itself if it is left with no versions.
    pub fn remove_version(&self, path: &str) -> Result<bool> {
        let Some(version) = self.version(path)? else {
            return Ok(false);
        };
        let blocks = self.repo.metadata().list_blocks_for_version(version.id())?;
        self.repo.metadata().remove_version_by_id(version.id())?;

        for block in blocks {
            if self.repo.metadata().blob_reference_count(block.blob_id)? == 0 {
                if let Some(blob_row) = self.repo.metadata().get_blob(block.blob_id)? {
                    self.repo.blobs().delete(&blob_row.checksum)?;
                }
                self.repo.metadata().delete_blob_row(block.blob_id)?;
            }
        }

        if self.repo.metadata().snapshot_version_count(self.row.id)? == 0 {
            self.repo.metadata().remove_snapshot(self.row.id)?;
        }
        Ok(true)
    }

    pub fn tags(&self) -> Result<Vec<Tag>> {
        Ok(self
            .repo
            .metadata()
            .list_tags_for_snapshot(self.row.id)?
            .into_iter()
            .map(|row| Tag::new(Arc::clone(&self.repo), row))
            .collect())
    }

    /// Creates a tag pointing at this snapshot. A pinned tag also pins the
    /// snapshot itself (`Snapshot::pinned`'s column), since retention reads
    /// that column alone rather than re-scanning tags.
    pub fn add_tag(&self, name: &str, description: &str, pinned: bool) -> Result<Tag, rvn_api_types::ReversionError> {
        let row = self
            .repo
            .metadata()
            .add_tag(self.row.id, self.row.timeline_id, name, description, pinned)?;
        if pinned {
            self.repo
                .metadata()
                .set_snapshot_pinned(self.row.id, true)
                .map_err(|err| rvn_api_types::ReversionError::InvalidRepository {
                    path: String::new(),
                    reason: err.to_string(),
                })?;
        }
        Ok(Tag::new(Arc::clone(&self.repo), row))
    }

    pub fn cleanup_policies(&self) -> Result<Vec<CleanupPolicyRow>> {
        self.repo.metadata().list_policies_for_timeline(self.row.timeline_id)
    }

    /// Deletes this snapshot's metadata row (and, through the foreign key,
    /// its versions and blocks). Does not sweep blobs left unreferenced by
    /// this removal; callers that want an immediate sweep should remove
    /// versions individually through [`Snapshot::remove_version`] first.
    pub fn remove(self) -> Result<bool> {
        Ok(self.repo.metadata().remove_snapshot(self.row.id)?)
    }
}
