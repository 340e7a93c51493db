//! The working-directory layer: binds a filesystem directory to a
//! timeline in a `rvn-datastore` repository and exposes the `commit`/
//! `status`/`update`/`clean` surface a CLI, file-watch daemon or FUSE
//! mount would drive. Everything content-addressed, chunked or
//! transactional lives one layer down in `rvn-datastore`; this crate only
//! adds the `.versioning/` on-disk binding and path bookkeeping on top of
//! it, mirroring how the teacher's root `src/lib.rs` layers `backup`/
//! `client` modules over `pbs-datastore`.

pub mod ignore;
pub mod workdir;

pub use ignore::{IgnoreMatcher, IgnoreSet};
pub use workdir::WorkDirectory;

pub use rvn_api_types::{CleanupPolicy, PosixPermissions, RetentionDuration, ReversionError};
pub use rvn_datastore::{
    Config, ConfigProperty, DbProvider, Defect, ProviderRegistry, RemovedVersion, RepairOutcome,
    Repository, Snapshot, StorageProvider, Tag, Timeline, VerifyAction, Version,
};
