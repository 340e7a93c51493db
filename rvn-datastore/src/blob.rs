//! Lazy, re-readable byte sources identified by their content digest
//!. Replaces the source's inheritance-based Blob variants
//! with a single [`Blob`] type wrapping a tagged
//! [`BlobSource`] trait object — a file, an in-memory buffer, a bounded
//! slice of another source, or a lazy concatenation of sources.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rvn_api_types::Checksum;

use crate::checksum::HashAlgorithm;

/// A source of bytes that can be opened repeatedly, each time yielding a
/// fresh cursor positioned at 0.
pub trait BlobSource: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

struct FileSource {
    path: PathBuf,
}

impl BlobSource for FileSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

struct BufferSource {
    data: Arc<Vec<u8>>,
}

impl BlobSource for BufferSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.data))))
    }
}

struct BoundedSource {
    inner: Arc<dyn BlobSource>,
    offset: u64,
    length: u64,
}

impl BlobSource for BoundedSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let mut inner = self.inner.open()?;
        io::copy(&mut inner.by_ref().take(self.offset), &mut io::sink())?;
        Ok(Box::new(inner.take(self.length)))
    }
}

/// Lazy concatenation: children are opened one at a time, in order, each
/// only once the previous one is exhausted — bounds the number of
/// simultaneously open descriptors regardless of how many children there
/// are.
struct ConcatSource {
    children: Vec<Arc<dyn BlobSource>>,
}

impl BlobSource for ConcatSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(ConcatReader {
            children: self.children.clone(),
            next: 0,
            current: None,
        }))
    }
}

struct ConcatReader {
    children: Vec<Arc<dyn BlobSource>>,
    next: usize,
    current: Option<Box<dyn Read + Send>>,
}

impl Read for ConcatReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.current.is_none() {
                if self.next >= self.children.len() {
                    return Ok(0);
                }
                self.current = Some(self.children[self.next].open()?);
                self.next += 1;
            }
            let n = self.current.as_mut().unwrap().read(buf)?;
            if n == 0 {
                self.current = None;
                continue;
            }
            return Ok(n);
        }
    }
}

/// A logical byte source identified by its [`Checksum`]. The checksum is
/// computed lazily on first access (streaming one `open()` call) and
/// memoised for the `Blob`'s lifetime — callers must not mutate the
/// underlying source between `checksum()` and a later `open()`; doing so
/// is documented caller misuse.
pub struct Blob {
    source: Arc<dyn BlobSource>,
    algorithm: HashAlgorithm,
    checksum: Mutex<Option<Checksum>>,
}

impl Blob {
    fn wrap(source: Arc<dyn BlobSource>, algorithm: HashAlgorithm) -> Self {
        Blob {
            source,
            algorithm,
            checksum: Mutex::new(None),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Self {
        Blob::wrap(Arc::new(FileSource { path: path.into() }), algorithm)
    }

    pub fn from_bytes(data: Vec<u8>, algorithm: HashAlgorithm) -> Self {
        Blob::wrap(
            Arc::new(BufferSource {
                data: Arc::new(data),
            }),
            algorithm,
        )
    }

    /// A bounded view of `offset..offset+length` bytes of `self`.
    pub fn bounded_slice(&self, offset: u64, length: u64) -> Blob {
        Blob::wrap(
            Arc::new(BoundedSource {
                inner: self.source_handle(),
                offset,
                length,
            }),
            self.algorithm,
        )
    }

    /// Lazily concatenate several blobs into one logical source.
    pub fn concat(parts: &[Blob], algorithm: HashAlgorithm) -> Blob {
        let children = parts.iter().map(Blob::source_handle).collect();
        Blob::wrap(Arc::new(ConcatSource { children }), algorithm)
    }

    pub fn source_handle(&self) -> Arc<dyn BlobSource> {
        Arc::clone(&self.source)
    }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        self.source.open()
    }

    /// The digest of this blob's content, computed once and cached.
    pub fn checksum(&self) -> io::Result<Checksum> {
        let mut cached = self.checksum.lock().expect("blob checksum mutex poisoned");
        if let Some(existing) = cached.as_ref() {
            return Ok(existing.clone());
        }
        let mut reader = self.open()?;
        let computed = self.algorithm.digest_reader(&mut reader)?;
        *cached = Some(computed.clone());
        Ok(computed)
    }

    /// Read the full contents into memory. Convenience for small blobs
    /// (manifest-style metadata, test fixtures); large content should go
    /// through `open()` and stream instead.
    pub fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.open()?.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Equality is defined by content digest, not by source identity.
    pub fn content_equals(&self, other: &Blob) -> io::Result<bool> {
        Ok(self.checksum()? == other.checksum()?)
    }
}

pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<Checksum> {
    algorithm.digest_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable_across_opens() {
        let blob = Blob::from_bytes(b"apple".to_vec(), HashAlgorithm::Sha256);
        let first = blob.checksum().unwrap();
        let second = blob.checksum().unwrap();
        assert_eq!(first, second);

        let mut reader = blob.open().unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"apple");
    }

    #[test]
    fn bounded_slice_reads_exact_range() {
        let blob = Blob::from_bytes(b"0123456789".to_vec(), HashAlgorithm::Sha256);
        let slice = blob.bounded_slice(3, 4);
        assert_eq!(slice.read_to_vec().unwrap(), b"3456");
    }

    #[test]
    fn concat_reproduces_original_bytes() {
        let a = Blob::from_bytes(b"foo".to_vec(), HashAlgorithm::Sha256);
        let b = Blob::from_bytes(b"bar".to_vec(), HashAlgorithm::Sha256);
        let c = Blob::from_bytes(b"baz".to_vec(), HashAlgorithm::Sha256);

        let whole = Blob::concat(&[a, b, c], HashAlgorithm::Sha256);
        assert_eq!(whole.read_to_vec().unwrap(), b"foobarbaz");

        let direct = Blob::from_bytes(b"foobarbaz".to_vec(), HashAlgorithm::Sha256);
        assert!(whole.content_equals(&direct).unwrap());
    }

    #[test]
    fn content_equals_compares_digests_not_identity() {
        let a = Blob::from_bytes(b"same".to_vec(), HashAlgorithm::Sha256);
        let b = Blob::from_bytes(b"same".to_vec(), HashAlgorithm::Sha256);
        assert!(a.content_equals(&b).unwrap());
    }

    #[test]
    fn from_file_digests_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"apple").unwrap();

        let blob = Blob::from_file(&path, HashAlgorithm::Sha256);
        assert_eq!(
            blob.checksum().unwrap().to_hex(),
            "3a7bd3e2360a3d29eea436fcfb7e44c735d117c42d1c1835420b6b9942dd4f1"
        );
    }
}
