//! A repository rooted at a filesystem path: the combination of a
//! metadata store, a blob store directory, a config and a format marker.
//!
//! Grounded on `pbs-datastore::DataStore`/`DataStoreImpl` for the overall
//! "glue struct wrapping the chunk store and an index, with `create`/
//! `open` constructors that validate the on-disk layout first" shape,
//! generalized from the teacher's namespace/backup-group/backup-dir
//! hierarchy to this system's flatter timeline/snapshot hierarchy.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rvn_api_types::ReversionError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksum::HashAlgorithm;
use crate::config::Config;
use crate::metadata::MetadataStore;
use crate::blob_store::BlobStore;
use crate::timeline::Timeline;
use crate::verify::VerifyAction;

pub const PROVIDER_NAME: &str = "db-v1";
pub const FORMAT_VERSION: u32 = 1;

const FORMAT_FILE: &str = "format.json";
const METADATA_FILE: &str = "metadata.db";
const BLOBS_DIR: &str = "blobs";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FormatMarker {
    provider: String,
    format_version: u32,
    uuid: Uuid,
    hash_algorithm: String,
}

/// Owns a metadata store and a blob store under one on-disk root. Exactly
/// one `Repository` should be open against a given path at a time per
/// process (the metadata store's internal mutex only serialises within
/// one `Connection`, not across processes).
pub struct Repository {
    path: PathBuf,
    uuid: Uuid,
    hash_algorithm: HashAlgorithm,
    config: Config,
    metadata: MetadataStore,
    blobs: BlobStore,
}

impl Repository {
    /// True if `path` contains a format marker this build recognises,
    /// without fully opening the metadata/blob stores.
    pub fn check(path: &Path) -> bool {
        Self::read_format_marker(path)
            .map(|marker| marker.provider == PROVIDER_NAME && marker.format_version == FORMAT_VERSION)
            .unwrap_or(false)
    }

    fn read_format_marker(path: &Path) -> Result<FormatMarker> {
        let raw = fs::read_to_string(path.join(FORMAT_FILE))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Creates a new repository at `path`, which must not already contain
    /// a format marker. `path` is created if missing.
    pub fn create(path: impl Into<PathBuf>, config: Config) -> Result<Arc<Self>> {
        let path = path.into();
        fs::create_dir_all(&path)
            .with_context(|| format!("unable to create repository directory {path:?}"))?;

        if path.join(FORMAT_FILE).exists() {
            return Err(ReversionError::invalid_repository(
                path.display().to_string(),
                "format.json already exists",
            )
            .into());
        }

        let uuid = Uuid::new_v4();
        let hash_algorithm = HashAlgorithm::parse(&config.get(&crate::config::HASH_ALGORITHM)?)
            .context("repository config has an unrecognised hash algorithm")?;

        let marker = FormatMarker {
            provider: PROVIDER_NAME.to_string(),
            format_version: FORMAT_VERSION,
            uuid,
            hash_algorithm: hash_algorithm.name().to_string(),
        };
        let marker_json = serde_json::to_vec_pretty(&marker)?;
        rvn_tools::fs::replace_file(&path.join(FORMAT_FILE), &marker_json, true)?;

        let metadata = MetadataStore::open(&path.join(METADATA_FILE))?;
        for (key, value) in config.raw_entries() {
            metadata.set_config_raw(key, value)?;
        }
        let blobs = BlobStore::create(path.join(BLOBS_DIR), hash_algorithm)?;

        Ok(Arc::new(Repository {
            path,
            uuid,
            hash_algorithm,
            config,
            metadata,
            blobs,
        }))
    }

    /// Opens an existing repository at `path`. Fails with
    /// `IncompatibleRepository` if the format marker is missing or
    /// unrecognised, `InvalidRepository` if it parses but the stores
    /// beneath it cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>, ReversionError> {
        let path = path.into();
        let marker = Self::read_format_marker(&path)
            .map_err(|_| ReversionError::IncompatibleRepository {
                path: path.display().to_string(),
            })?;

        if marker.provider != PROVIDER_NAME {
            return Err(ReversionError::IncompatibleRepository {
                path: path.display().to_string(),
            });
        }
        if marker.format_version != FORMAT_VERSION {
            return Err(ReversionError::UnsupportedFormat {
                path: path.display().to_string(),
                found: marker.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let hash_algorithm = HashAlgorithm::parse(&marker.hash_algorithm).ok_or_else(|| {
            ReversionError::invalid_repository(
                path.display().to_string(),
                format!("unknown hash algorithm '{}'", marker.hash_algorithm),
            )
        })?;

        let metadata = MetadataStore::open(&path.join(METADATA_FILE)).map_err(|err| {
            ReversionError::invalid_repository(path.display().to_string(), err.to_string())
        })?;
        let config_values = metadata.all_config_raw().map_err(|err| {
            ReversionError::invalid_repository(path.display().to_string(), err.to_string())
        })?;
        let blobs = BlobStore::open(path.join(BLOBS_DIR), hash_algorithm).map_err(|err| {
            ReversionError::invalid_repository(path.display().to_string(), err.to_string())
        })?;

        Ok(Arc::new(Repository {
            path,
            uuid: marker.uuid,
            hash_algorithm,
            config: Config::from_raw(config_values),
            metadata,
            blobs,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub(crate) fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub(crate) fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn create_timeline(self: &Arc<Self>) -> Result<Timeline> {
        let row = self.metadata.create_timeline(now_ms())?;
        Ok(Timeline::new(Arc::clone(self), row.id))
    }

    pub fn remove_timeline(&self, id: Uuid) -> Result<bool> {
        Ok(self.metadata.remove_timeline(id)?)
    }

    pub fn timeline(self: &Arc<Self>, id: Uuid) -> Result<Option<Timeline>> {
        Ok(self
            .metadata
            .get_timeline(id)?
            .map(|row| Timeline::new(Arc::clone(self), row.id)))
    }

    pub fn timelines(self: &Arc<Self>) -> Result<Vec<Timeline>> {
        Ok(self
            .metadata
            .list_timelines()?
            .into_iter()
            .map(|row| Timeline::new(Arc::clone(self), row.id))
            .collect())
    }

    /// Deletes both the metadata store and blob store directory. The
    /// `Repository` handle must not be used afterwards.
    pub fn delete(path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .with_context(|| format!("unable to delete repository at {path:?}"))
    }

    pub fn verify(self: &Arc<Self>, work_dir: Option<&Path>) -> Result<Vec<VerifyAction>> {
        crate::verify::verify_repository(self, work_dir)
    }
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_round_trips_format_marker() {
        let dir = tempfile::tempdir().unwrap();
        let repo_path = dir.path().join("repo");

        let created = Repository::create(&repo_path, Config::new()).unwrap();
        let uuid = created.uuid();
        drop(created);

        assert!(Repository::check(&repo_path));

        let opened = Repository::open(&repo_path).unwrap();
        assert_eq!(opened.uuid(), uuid);
        assert_eq!(opened.hash_algorithm(), HashAlgorithm::Sha256);
    }

    #[test]
    fn open_missing_marker_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::open(dir.path()).unwrap_err();
        assert!(matches!(err, ReversionError::IncompatibleRepository { .. }));
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repo_path = dir.path().join("repo");
        Repository::create(&repo_path, Config::new()).unwrap();
        assert!(Repository::create(&repo_path, Config::new()).is_err());
    }
}
