use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use openssl::sha::Sha256;
use rvn_api_types::Checksum;

/// The digest algorithm a repository is configured to use via its
/// `hashAlgorithm` config property. SHA-256 is the only algorithm
/// implemented; the enum exists so a repository's choice is a
/// first-class, matched value rather than a loosely-typed string
/// compared ad hoc at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "SHA-256" | "sha256" => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }

    /// Digest a byte stream, reading it to exhaustion.
    pub fn digest_reader(self, reader: &mut dyn Read) -> io::Result<Checksum> {
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(Checksum::from(hasher.finish()))
            }
        }
    }

    /// Digest a file by path.
    pub fn digest_file(self, path: &Path) -> io::Result<Checksum> {
        let mut file = File::open(path)?;
        self.digest_reader(&mut file)
    }

    /// Digest an in-memory buffer.
    pub fn digest_bytes(self, data: &[u8]) -> Checksum {
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                Checksum::from(hasher.finish())
            }
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_bytes_matches_known_sha256() {
        let sum = HashAlgorithm::Sha256.digest_bytes(b"apple");
        assert_eq!(
            sum.to_hex(),
            "3a7bd3e2360a3d29eea436fcfb7e44c735d117c42d1c1835420b6b9942dd4f1"
        );
    }

    #[test]
    fn digest_reader_matches_digest_bytes() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let mut reader = &data[..];
        let from_reader = HashAlgorithm::Sha256.digest_reader(&mut reader).unwrap();
        let from_bytes = HashAlgorithm::Sha256.digest_bytes(&data);
        assert_eq!(from_reader, from_bytes);
    }

    #[test]
    fn parse_accepts_canonical_and_lowercase_name() {
        assert_eq!(HashAlgorithm::parse("SHA-256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::parse("sha256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::parse("md5"), None);
    }
}
