//! Plain data types shared across the reversion storage engine.
//!
//! Nothing in this crate performs I/O; it exists so that `rvn-datastore`
//! and the root `reversion` crate can exchange values without depending on
//! each other's internals.

pub mod checksum;
pub mod error;
pub mod permissions;
pub mod retention;

pub use checksum::Checksum;
pub use error::ReversionError;
pub use permissions::PosixPermissions;
pub use retention::{CleanupPolicy, RetentionDuration};
