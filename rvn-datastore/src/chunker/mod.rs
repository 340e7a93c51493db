//! Chunk-boundary discovery over a byte source.
//!
//! A [`Chunker`] turns a byte stream into a restartable, finite sequence of
//! [`Chunk`] boundaries, computed eagerly rather than exposed as an
//! infinite/lazy stream.

mod fixed;
mod rolling;

pub use fixed::FixedSizeChunker;
pub use rolling::RollingHashChunker;

use std::io::Read;

/// A `(offset, length)` span within a source. Chunks from one run of a
/// chunker are non-overlapping and, concatenated in order, reproduce the
/// source exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: u64,
    pub length: u64,
}

/// Boundary-finding algorithm over a seekable byte source. Implementations
/// consume the reader to exhaustion; determinism is required — the same
/// input bytes and parameters must produce the same boundaries on every
/// run and every platform.
pub trait Chunker {
    fn chunk(&self, reader: &mut dyn Read) -> std::io::Result<Vec<Chunk>>;
}

const READ_BUF_SIZE: usize = 64 * 1024;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn reassembles_source(chunker: &dyn Chunker, data: &[u8]) {
        let mut reader = data;
        let chunks = chunker.chunk(&mut reader).unwrap();

        let total: u64 = chunks.iter().map(|c| c.length).sum();
        assert_eq!(total, data.len() as u64);

        let mut expected_offset = 0u64;
        for chunk in &chunks {
            assert_eq!(chunk.offset, expected_offset);
            expected_offset += chunk.length;
        }
    }
}
