//! A named, user-managed pointer to a snapshot.

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::metadata::TagRow;
use crate::repository::Repository;

#[derive(Clone)]
pub struct Tag {
    repo: Arc<Repository>,
    row: TagRow,
}

impl Tag {
    pub(crate) fn new(repo: Arc<Repository>, row: TagRow) -> Self {
        Tag { repo, row }
    }

    pub fn id(&self) -> i64 {
        self.row.id
    }

    pub fn snapshot_id(&self) -> i64 {
        self.row.snapshot_id
    }

    pub fn timeline_id(&self) -> Uuid {
        self.row.timeline_id
    }

    pub fn name(&self) -> &str {
        &self.row.name
    }

    pub fn description(&self) -> &str {
        &self.row.description
    }

    pub fn pinned(&self) -> bool {
        self.row.pinned
    }

    /// Pinning a tag also pins the snapshot it points at, since cleanup
    /// consults the snapshot's own `pinned` column rather than scanning
    /// tags. Unpinning a tag leaves the snapshot's column untouched — other
    /// tags or a direct pin may still be protecting it.
    pub fn set_pinned(&mut self, pinned: bool) -> Result<()> {
        self.repo.metadata().set_tag_pinned(self.row.id, pinned)?;
        self.row.pinned = pinned;
        if pinned {
            self.repo.metadata().set_snapshot_pinned(self.row.snapshot_id, true)?;
        }
        Ok(())
    }

    pub fn remove(self) -> Result<bool> {
        Ok(self.repo.metadata().remove_tag(self.row.id)?)
    }
}
