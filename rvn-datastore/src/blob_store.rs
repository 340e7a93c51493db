//! The on-disk content-addressed blob store under `<repo>/blobs/`.
//!
//! Grounded on `pbs-datastore::chunk_store::ChunkStore`: same write-tmp-
//! then-rename insert path, same "does a file of the right size already
//! exist" dedup check, same per-store mutex serialising writes. Simplified
//! relative to the teacher in two ways: no `ProcessLocker` (single-process
//! model; concurrent external processes sharing a repository are out of
//! scope) and two levels of sharding instead of one, to match the layout
//! `blobs/<xx>/<yy>/<hex>` — first byte of hex, then second byte.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use rvn_api_types::Checksum;
use rvn_tools::fs::replace_file;

use crate::blob::Blob;
use crate::checksum::HashAlgorithm;

pub struct BlobStore {
    base: PathBuf,
    algorithm: HashAlgorithm,
    write_lock: Mutex<()>,
}

fn shard_path(base: &Path, checksum: &Checksum) -> PathBuf {
    let hex = checksum.to_hex();
    let mut path = base.to_path_buf();
    path.push(&hex[0..2]);
    path.push(&hex[2..4]);
    path.push(&hex);
    path
}

impl BlobStore {
    /// Creates the `blobs/` directory tree root. Subdirectories are created
    /// lazily per-shard on first write rather than all 65536 up front —
    /// unlike the teacher, which pre-creates every `xxxx` subdir at store
    /// creation time, since this store's two-level sharding makes that
    /// an unnecessary fixed cost at `create` time.
    pub fn create(base: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Result<Self> {
        let base = base.into();
        fs::create_dir_all(&base)
            .with_context(|| format!("unable to create blob store at {base:?}"))?;
        Ok(BlobStore {
            base,
            algorithm,
            write_lock: Mutex::new(()),
        })
    }

    pub fn open(base: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Result<Self> {
        let base = base.into();
        if !base.is_dir() {
            bail!("blob store directory {base:?} does not exist");
        }
        Ok(BlobStore {
            base,
            algorithm,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn path_for(&self, checksum: &Checksum) -> PathBuf {
        shard_path(&self.base, checksum)
    }

    /// Streams `blob`'s content into the store under its checksum,
    /// skipping the write if a file of the expected size already exists.
    /// Returns the checksum and byte count so the caller can insert the
    /// corresponding metadata row.
    pub fn put(&self, blob: &Blob) -> Result<(Checksum, u64)> {
        let checksum = blob.checksum().context("unable to compute blob checksum")?;
        let target = self.path_for(&checksum);

        let _guard = self.write_lock.lock().expect("blob store mutex poisoned");

        if let Ok(metadata) = fs::metadata(&target) {
            if metadata.is_file() {
                let mut reader = blob.open()?;
                let size = std::io::copy(&mut reader, &mut std::io::sink())?;
                if metadata.len() == size {
                    return Ok((checksum, size));
                }
                log::warn!(
                    "blob {} exists with size {} but incoming content has size {size}, overwriting",
                    checksum,
                    metadata.len()
                );
            }
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create blob shard dir {parent:?}"))?;
        }

        let mut reader = blob.open()?;
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut data)?;
        let size = data.len() as u64;

        replace_file(&target, &data, true)
            .with_context(|| format!("unable to write blob {checksum} to {target:?}"))?;

        Ok((checksum, size))
    }

    /// A file-backed [`Blob`] for `checksum`, or `None` if no such file
    /// exists in the store.
    pub fn get(&self, checksum: &Checksum) -> Option<Blob> {
        let path = self.path_for(checksum);
        if path.is_file() {
            Some(Blob::from_file(path, self.algorithm))
        } else {
            None
        }
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.path_for(checksum).is_file()
    }

    /// Removes the file backing `checksum`. The caller is responsible for
    /// having already confirmed no `Block` references it.
    pub fn delete(&self, checksum: &Checksum) -> Result<bool> {
        let path = self.path_for(checksum);
        let _guard = self.write_lock.lock().expect("blob store mutex poisoned");
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("unable to delete blob at {path:?}")),
        }
    }

    /// Walks every shard directory, yielding the checksum and file size of
    /// each stored blob. Used by verification to cross-reference against
    /// the metadata store's `blob` table.
    pub fn iter_stored(&self) -> Result<Vec<(Checksum, u64)>> {
        let mut out = Vec::new();
        if !self.base.is_dir() {
            return Ok(out);
        }
        for xx in fs::read_dir(&self.base)? {
            let xx = xx?;
            if !xx.file_type()?.is_dir() {
                continue;
            }
            for yy in fs::read_dir(xx.path())? {
                let yy = yy?;
                if !yy.file_type()?.is_dir() {
                    continue;
                }
                for entry in fs::read_dir(yy.path())? {
                    let entry = entry?;
                    if !entry.file_type()?.is_file() {
                        continue;
                    }
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else {
                        continue;
                    };
                    if let Ok(checksum) = Checksum::from_hex(name) {
                        let size = entry.metadata()?.len();
                        out.push((checksum, size));
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_idempotent_and_shards_by_first_two_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::create(dir.path().join("blobs"), HashAlgorithm::Sha256).unwrap();

        let blob = Blob::from_bytes(b"apple".to_vec(), HashAlgorithm::Sha256);
        let (checksum, size) = store.put(&blob).unwrap();
        assert_eq!(size, 5);

        let hex = checksum.to_hex();
        let expected_path = dir
            .path()
            .join("blobs")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex);
        assert!(expected_path.is_file());

        let (checksum2, size2) = store.put(&blob).unwrap();
        assert_eq!(checksum, checksum2);
        assert_eq!(size, size2);
    }

    #[test]
    fn get_returns_none_for_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::create(dir.path().join("blobs"), HashAlgorithm::Sha256).unwrap();
        let checksum = HashAlgorithm::Sha256.digest_bytes(b"missing");
        assert!(store.get(&checksum).is_none());
    }

    #[test]
    fn delete_removes_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::create(dir.path().join("blobs"), HashAlgorithm::Sha256).unwrap();
        let blob = Blob::from_bytes(b"content".to_vec(), HashAlgorithm::Sha256);
        let (checksum, _) = store.put(&blob).unwrap();

        assert!(store.contains(&checksum));
        assert!(store.delete(&checksum).unwrap());
        assert!(!store.contains(&checksum));
        assert!(!store.delete(&checksum).unwrap());
    }

    #[test]
    fn iter_stored_finds_every_written_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::create(dir.path().join("blobs"), HashAlgorithm::Sha256).unwrap();
        for content in [&b"a"[..], &b"bb"[..], &b"ccc"[..]] {
            let blob = Blob::from_bytes(content.to_vec(), HashAlgorithm::Sha256);
            store.put(&blob).unwrap();
        }
        let found = store.iter_stored().unwrap();
        assert_eq!(found.len(), 3);
    }
}
