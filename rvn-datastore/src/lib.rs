//! Content-addressed, chunk-deduplicated repository storage engine: the
//! blob store, relational metadata index, chunkers, and the
//! timeline/snapshot/version/tag domain model built on top of them.

pub mod blob;
pub mod blob_store;
pub mod checksum;
pub mod chunker;
pub mod config;
pub mod metadata;
pub mod provider;
pub mod read_view;
pub mod repository;
pub mod retention;
pub mod snapshot;
pub mod tag;
pub mod timeline;
pub mod version;
pub mod verify;

pub use blob::{Blob, BlobSource};
pub use blob_store::BlobStore;
pub use checksum::HashAlgorithm;
pub use chunker::{Chunk, Chunker};
pub use config::{Config, ConfigProperty, ConvertContext};
pub use metadata::MetadataStore;
pub use provider::{DbProvider, ProviderRegistry, StorageProvider};
pub use read_view::VersionReader;
pub use repository::Repository;
pub use retention::RemovedVersion;
pub use snapshot::{DirEntry, Snapshot};
pub use tag::Tag;
pub use timeline::Timeline;
pub use verify::{Defect, RepairOutcome, VerifyAction};
pub use version::Version;
