use std::io::Read;

use super::{Chunk, Chunker, READ_BUF_SIZE};

/// `(0, N), (N, N), … (kN, size-kN)` — the last chunk is the remainder.
/// An effectively unbounded chunk size (one chunk per file) is expressed
/// as `FixedSizeChunker::whole_file()`.
pub struct FixedSizeChunker {
    size: u64,
}

impl FixedSizeChunker {
    pub fn new(size: u64) -> Self {
        assert!(size > 0, "fixed chunk size must be positive");
        FixedSizeChunker { size }
    }

    /// One chunk per file — the default `blockSize` behaviour.
    pub fn whole_file() -> Self {
        FixedSizeChunker { size: u64::MAX }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, reader: &mut dyn Read) -> std::io::Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut offset: u64 = 0;
        let mut pending: u64 = 0;
        let mut buf = [0u8; READ_BUF_SIZE];

        loop {
            let want = self.size.saturating_sub(pending).min(READ_BUF_SIZE as u64) as usize;
            if want == 0 {
                chunks.push(Chunk {
                    offset,
                    length: pending,
                });
                offset += pending;
                pending = 0;
                continue;
            }
            let n = reader.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            pending += n as u64;
        }

        if pending > 0 {
            chunks.push(Chunk {
                offset,
                length: pending,
            });
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::test_support::reassembles_source;

    #[test]
    fn splits_into_equal_chunks_with_remainder() {
        let data = vec![0u8; 10_000];
        let chunker = FixedSizeChunker::new(4096);
        let mut reader = &data[..];
        let chunks = chunker.chunk(&mut reader).unwrap();

        assert_eq!(
            chunks,
            vec![
                Chunk {
                    offset: 0,
                    length: 4096
                },
                Chunk {
                    offset: 4096,
                    length: 4096
                },
                Chunk {
                    offset: 8192,
                    length: 1808
                },
            ]
        );
    }

    #[test]
    fn empty_source_yields_no_chunks() {
        let data: Vec<u8> = Vec::new();
        let chunker = FixedSizeChunker::new(4096);
        let mut reader = &data[..];
        assert!(chunker.chunk(&mut reader).unwrap().is_empty());
    }

    #[test]
    fn whole_file_yields_a_single_chunk() {
        let data = vec![7u8; 123_456];
        let chunker = FixedSizeChunker::whole_file();
        reassembles_source(&chunker, &data);
        let mut reader = &data[..];
        assert_eq!(chunker.chunk(&mut reader).unwrap().len(), 1);
    }

    #[test]
    fn reassembly_is_exact_for_arbitrary_sizes() {
        let data: Vec<u8> = (0..50_000).map(|i| (i % 251) as u8).collect();
        reassembles_source(&FixedSizeChunker::new(777), &data);
    }
}
