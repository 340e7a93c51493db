//! A single file's content as recorded in one snapshot.

use std::sync::Arc;

use anyhow::Result;
use rvn_api_types::{Checksum, PosixPermissions};

use crate::metadata::VersionRow;
use crate::read_view::VersionReader;
use crate::repository::Repository;

#[derive(Clone)]
pub struct Version {
    repo: Arc<Repository>,
    row: VersionRow,
}

impl Version {
    pub(crate) fn new(repo: Arc<Repository>, row: VersionRow) -> Self {
        Version { repo, row }
    }

    pub fn id(&self) -> i64 {
        self.row.id
    }

    pub fn path(&self) -> &str {
        &self.row.path
    }

    pub fn size(&self) -> u64 {
        self.row.size as u64
    }

    pub fn last_modified_ms(&self) -> i64 {
        self.row.last_modified_ms
    }

    pub fn permissions(&self) -> Option<PosixPermissions> {
        self.row.permissions
    }

    pub fn checksum(&self) -> &Checksum {
        &self.row.checksum
    }

    pub fn open_reader(&self) -> Result<VersionReader> {
        VersionReader::open(Arc::clone(&self.repo), self.row.id)
    }

    /// Reconstructs `len` bytes of this version's content starting at
    /// `offset`, reading only the blocks that overlap the requested range.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.open_reader()?.read(offset, len)
    }
}
