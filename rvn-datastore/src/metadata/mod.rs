//! The persistent relational index: timelines, snapshots,
//! versions, blocks, blobs, tags, cleanup policies, repository config.
//!
//! `pbs-datastore` persists its index as flat binary index files
//! (`fixed_index.rs`/`dynamic_index.rs`) rather than a relational store,
//! so this module is grounded instead on `codegraph-storage` (a
//! rusqlite-backed storage crate in this corpus) for the choice of
//! `rusqlite`, and on `drift-storage::retention`'s transaction style
//! (`unchecked_transaction()` / explicit commit) for how writes are
//! wrapped. Plain SQL throughout, no ORM.

mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use rvn_api_types::{Checksum, PosixPermissions, ReversionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRow {
    pub id: Uuid,
    pub time_created: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub id: i64,
    pub timeline_id: Uuid,
    pub revision: i64,
    pub name: Option<String>,
    pub description: String,
    pub pinned: bool,
    pub time_created: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRow {
    pub id: i64,
    pub snapshot_id: i64,
    pub path: String,
    pub last_modified_ms: i64,
    pub permissions: Option<PosixPermissions>,
    pub size: i64,
    pub checksum: Checksum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRow {
    pub version_id: i64,
    pub blob_id: i64,
    pub index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRow {
    pub id: i64,
    pub checksum: Checksum,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub id: i64,
    pub snapshot_id: i64,
    pub timeline_id: Uuid,
    pub name: String,
    pub description: String,
    pub pinned: bool,
}

/// `None` in `min_interval_ms`/`time_frame_ms` represents the `FOREVER`
/// sentinel; `max_versions == i64::MAX` represents
/// `CleanupPolicy::KEEP_ALL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupPolicyRow {
    pub id: i64,
    pub min_interval_ms: Option<i64>,
    pub time_frame_ms: Option<i64>,
    pub max_versions: i64,
    pub description: String,
}

/// A durable key/value+relational index. Writes are serialised through a
/// single connection guarded by a mutex — the same "one mutex around the
/// shared resource" shape as `pbs-datastore::chunk_store::ChunkStore`'s
/// `mutex: Mutex<()>` around its directory, just guarding the connection
/// itself here since `rusqlite::Connection` isn't `Sync`.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

fn uuid_param(id: Uuid) -> String {
    id.to_string()
}

fn parse_uuid(raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn map_timeline(row: &Row) -> rusqlite::Result<TimelineRow> {
    Ok(TimelineRow {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        time_created: row.get(1)?,
    })
}

fn map_snapshot(row: &Row) -> rusqlite::Result<SnapshotRow> {
    Ok(SnapshotRow {
        id: row.get(0)?,
        timeline_id: parse_uuid(&row.get::<_, String>(1)?)?,
        revision: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        pinned: row.get::<_, i64>(5)? != 0,
        time_created: row.get(6)?,
    })
}

fn map_version(row: &Row) -> rusqlite::Result<VersionRow> {
    let permissions: Option<String> = row.get(4)?;
    let checksum_bytes: Vec<u8> = row.get(6)?;
    Ok(VersionRow {
        id: row.get(0)?,
        snapshot_id: row.get(1)?,
        path: row.get(2)?,
        last_modified_ms: row.get(3)?,
        permissions: permissions.and_then(|p| p.parse().ok()),
        size: row.get(5)?,
        checksum: Checksum::from_bytes(checksum_bytes),
    })
}

fn map_blob(row: &Row) -> rusqlite::Result<BlobRow> {
    let checksum_bytes: Vec<u8> = row.get(1)?;
    Ok(BlobRow {
        id: row.get(0)?,
        checksum: Checksum::from_bytes(checksum_bytes),
        size: row.get(2)?,
    })
}

fn map_tag(row: &Row) -> rusqlite::Result<TagRow> {
    Ok(TagRow {
        id: row.get(0)?,
        snapshot_id: row.get(1)?,
        timeline_id: parse_uuid(&row.get::<_, String>(2)?)?,
        name: row.get(3)?,
        description: row.get(4)?,
        pinned: row.get::<_, i64>(5)? != 0,
    })
}

fn map_policy(row: &Row) -> rusqlite::Result<CleanupPolicyRow> {
    Ok(CleanupPolicyRow {
        id: row.get(0)?,
        min_interval_ms: row.get(1)?,
        time_frame_ms: row.get(2)?,
        max_versions: row.get(3)?,
        description: row.get(4)?,
    })
}

impl MetadataStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("unable to open metadata store at {path:?}"))?;
        conn.execute_batch(schema::SCHEMA)
            .context("unable to initialise metadata schema")?;
        Ok(MetadataStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(MetadataStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("metadata store mutex poisoned")
    }

    // ---- timeline ----------------------------------------------------

    pub fn create_timeline(&self, time_created: i64) -> Result<TimelineRow> {
        let id = Uuid::new_v4();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO timeline(id, time_created) VALUES (?1, ?2)",
            params![uuid_param(id), time_created],
        )?;
        conn.execute(
            "INSERT INTO timeline_revision_counter(timeline_id, next_revision) VALUES (?1, 1)",
            params![uuid_param(id)],
        )?;
        Ok(TimelineRow { id, time_created })
    }

    pub fn remove_timeline(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM timeline WHERE id = ?1",
            params![uuid_param(id)],
        )?;
        Ok(n > 0)
    }

    pub fn get_timeline(&self, id: Uuid) -> Result<Option<TimelineRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, time_created FROM timeline WHERE id = ?1",
                params![uuid_param(id)],
                map_timeline,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_timelines(&self) -> Result<Vec<TimelineRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id, time_created FROM timeline")?;
        let rows = stmt.query_map([], map_timeline)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ---- snapshot ------------------------------------------------------

    /// Allocates the next revision and inserts a `Snapshot` row in one
    /// transaction, holding an exclusive lock for the duration. Uses an
    /// `IMMEDIATE` transaction so the write lock is taken up front instead
    /// of on first write, avoiding the classic "read then upgrade" race
    /// between two concurrent callers computing the same next revision.
    pub fn create_snapshot(
        &self,
        timeline_id: Uuid,
        name: Option<&str>,
        description: &str,
        pinned: bool,
        time_created: i64,
    ) -> Result<SnapshotRow> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let next_revision: i64 = tx.query_row(
            "SELECT next_revision FROM timeline_revision_counter WHERE timeline_id = ?1",
            params![uuid_param(timeline_id)],
            |row| row.get(0),
        ).with_context(|| format!("no such timeline {timeline_id}"))?;

        tx.execute(
            "UPDATE timeline_revision_counter SET next_revision = next_revision + 1 WHERE timeline_id = ?1",
            params![uuid_param(timeline_id)],
        )?;

        tx.execute(
            "INSERT INTO snapshot(timeline_id, revision, name, description, pinned, time_created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid_param(timeline_id),
                next_revision,
                name,
                description,
                pinned as i64,
                time_created
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(SnapshotRow {
            id,
            timeline_id,
            revision: next_revision,
            name: name.map(str::to_string),
            description: description.to_string(),
            pinned,
            time_created,
        })
    }

    pub fn get_snapshot(&self, id: i64) -> Result<Option<SnapshotRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, timeline_id, revision, name, description, pinned, time_created
                 FROM snapshot WHERE id = ?1",
                params![id],
                map_snapshot,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_snapshot_by_revision(
        &self,
        timeline_id: Uuid,
        revision: i64,
    ) -> Result<Option<SnapshotRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, timeline_id, revision, name, description, pinned, time_created
                 FROM snapshot WHERE timeline_id = ?1 AND revision = ?2",
                params![uuid_param(timeline_id), revision],
                map_snapshot,
            )
            .optional()?;
        Ok(row)
    }

    /// Newest-to-oldest list of all snapshots in a timeline.
    pub fn list_snapshots(&self, timeline_id: Uuid) -> Result<Vec<SnapshotRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timeline_id, revision, name, description, pinned, time_created
             FROM snapshot WHERE timeline_id = ?1 ORDER BY revision DESC",
        )?;
        let rows = stmt.query_map(params![uuid_param(timeline_id)], map_snapshot)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn remove_snapshot(&self, id: i64) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM snapshot WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn set_snapshot_pinned(&self, id: i64, pinned: bool) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE snapshot SET pinned = ?2 WHERE id = ?1",
            params![id, pinned as i64],
        )?;
        Ok(())
    }

    pub fn set_snapshot_label(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        if let Some(name) = name {
            conn.execute(
                "UPDATE snapshot SET name = ?2 WHERE id = ?1",
                params![id, name],
            )?;
        }
        if let Some(description) = description {
            conn.execute(
                "UPDATE snapshot SET description = ?2 WHERE id = ?1",
                params![id, description],
            )?;
        }
        Ok(())
    }

    pub fn snapshot_version_count(&self, snapshot_id: i64) -> Result<i64> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM version WHERE snapshot_id = ?1",
            params![snapshot_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ---- version / block ------------------------------------------------

    pub fn insert_version(
        &self,
        snapshot_id: i64,
        path: &str,
        last_modified_ms: i64,
        permissions: Option<PosixPermissions>,
        size: i64,
        checksum: &Checksum,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO version(snapshot_id, path, last_modified_ms, permissions, size, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot_id,
                path,
                last_modified_ms,
                permissions.map(|p| p.to_string()),
                size,
                checksum.as_bytes()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_block(&self, version_id: i64, blob_id: i64, index: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO block(version_id, blob_id, idx) VALUES (?1, ?2, ?3)",
            params![version_id, blob_id, index],
        )?;
        Ok(())
    }

    pub fn get_version(&self, id: i64) -> Result<Option<VersionRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, snapshot_id, path, last_modified_ms, permissions, size, checksum
                 FROM version WHERE id = ?1",
                params![id],
                map_version,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_version_in_snapshot(
        &self,
        snapshot_id: i64,
        path: &str,
    ) -> Result<Option<VersionRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, snapshot_id, path, last_modified_ms, permissions, size, checksum
                 FROM version WHERE snapshot_id = ?1 AND path = ?2",
                params![snapshot_id, path],
                map_version,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_versions_for_snapshot(&self, snapshot_id: i64) -> Result<Vec<VersionRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, snapshot_id, path, last_modified_ms, permissions, size, checksum
             FROM version WHERE snapshot_id = ?1 ORDER BY path",
        )?;
        let rows = stmt.query_map(params![snapshot_id], map_version)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Newest-to-oldest versions of `path` across an entire timeline
    ///, paired with the snapshot
    /// each belongs to.
    pub fn list_versions_by_path(
        &self,
        timeline_id: Uuid,
        path: &str,
    ) -> Result<Vec<(SnapshotRow, VersionRow)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.timeline_id, s.revision, s.name, s.description, s.pinned, s.time_created,
                    v.id, v.snapshot_id, v.path, v.last_modified_ms, v.permissions, v.size, v.checksum
             FROM version v JOIN snapshot s ON v.snapshot_id = s.id
             WHERE s.timeline_id = ?1 AND v.path = ?2
             ORDER BY s.revision DESC",
        )?;
        let rows = stmt.query_map(params![uuid_param(timeline_id), path], |row| {
            let snapshot = map_snapshot(row)?;
            // version columns start at index 7
            let permissions: Option<String> = row.get(11)?;
            let checksum_bytes: Vec<u8> = row.get(13)?;
            let version = VersionRow {
                id: row.get(7)?,
                snapshot_id: row.get(8)?,
                path: row.get(9)?,
                last_modified_ms: row.get(10)?,
                permissions: permissions.and_then(|p| p.parse().ok()),
                size: row.get(12)?,
                checksum: Checksum::from_bytes(checksum_bytes),
            };
            Ok((snapshot, version))
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// For each path with at least one version in a snapshot with
    /// `revision <= max_revision` in `timeline_id`, the version from the
    /// highest such revision.
    pub fn cumulative_versions(
        &self,
        timeline_id: Uuid,
        max_revision: i64,
    ) -> Result<Vec<VersionRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "WITH ranked AS (
                SELECT v.id, v.snapshot_id, v.path, v.last_modified_ms, v.permissions, v.size, v.checksum,
                       ROW_NUMBER() OVER (PARTITION BY v.path ORDER BY s.revision DESC) AS rn
                FROM version v JOIN snapshot s ON v.snapshot_id = s.id
                WHERE s.timeline_id = ?1 AND s.revision <= ?2
             )
             SELECT id, snapshot_id, path, last_modified_ms, permissions, size, checksum
             FROM ranked WHERE rn = 1 ORDER BY path",
        )?;
        let rows = stmt.query_map(params![uuid_param(timeline_id), max_revision], map_version)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Removes the `Version` row for `path` in `snapshot_id`, returning
    /// whether one existed. Cascades to its blocks via the foreign key;
    /// does not itself sweep now-unreferenced blobs (callers that want an
    /// immediate sweep call `sweep_orphan_blobs`).
    pub fn remove_version(&self, snapshot_id: i64, path: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM version WHERE snapshot_id = ?1 AND path = ?2",
            params![snapshot_id, path],
        )?;
        Ok(n > 0)
    }

    pub fn remove_version_by_id(&self, version_id: i64) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM version WHERE id = ?1", params![version_id])?;
        Ok(n > 0)
    }

    /// Every distinct path that has ever had a version recorded on this
    /// timeline, across all of its snapshots.
    pub fn list_distinct_paths(&self, timeline_id: Uuid) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT v.path FROM version v
             JOIN snapshot s ON v.snapshot_id = s.id
             WHERE s.timeline_id = ?1",
        )?;
        let rows = stmt.query_map(params![uuid_param(timeline_id)], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn list_blocks_for_version(&self, version_id: i64) -> Result<Vec<BlockRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT version_id, blob_id, idx FROM block WHERE version_id = ?1 ORDER BY idx",
        )?;
        let rows = stmt.query_map(params![version_id], |row| {
            Ok(BlockRow {
                version_id: row.get(0)?,
                blob_id: row.get(1)?,
                index: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ---- blob ------------------------------------------------------------

    /// Insert a `blob` row if one doesn't already exist for this
    /// checksum, returning its id either way.
    pub fn upsert_blob(&self, checksum: &Checksum, size: i64) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO blob(checksum, size) VALUES (?1, ?2)",
            params![checksum.as_bytes(), size],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM blob WHERE checksum = ?1",
            params![checksum.as_bytes()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_blob_by_checksum(&self, checksum: &Checksum) -> Result<Option<BlobRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, checksum, size FROM blob WHERE checksum = ?1",
                params![checksum.as_bytes()],
                map_blob,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_blob(&self, id: i64) -> Result<Option<BlobRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, checksum, size FROM blob WHERE id = ?1",
                params![id],
                map_blob,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_blobs(&self) -> Result<Vec<BlobRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id, checksum, size FROM blob")?;
        let rows = stmt.query_map([], map_blob)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn blob_reference_count(&self, blob_id: i64) -> Result<i64> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM block WHERE blob_id = ?1",
            params![blob_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Blob rows with zero remaining `Block` references — candidates for
    /// an orphan sweep.
    pub fn list_unreferenced_blobs(&self) -> Result<Vec<BlobRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT blob.id, blob.checksum, blob.size FROM blob
             LEFT JOIN block ON block.blob_id = blob.id
             WHERE block.blob_id IS NULL",
        )?;
        let rows = stmt.query_map([], map_blob)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn delete_blob_row(&self, id: i64) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM blob WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // ---- tag ---------------------------------------------------------

    pub fn add_tag(
        &self,
        snapshot_id: i64,
        timeline_id: Uuid,
        name: &str,
        description: &str,
        pinned: bool,
    ) -> Result<TagRow, ReversionError> {
        let conn = self.lock();
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM tag WHERE timeline_id = ?1 AND name = ?2",
                params![uuid_param(timeline_id), name],
                |_| Ok(()),
            )
            .optional()
            .map_err(|err| ReversionError::InvalidRepository {
                path: String::new(),
                reason: err.to_string(),
            })?
            .is_some();
        if exists {
            return Err(ReversionError::record_already_exists(name));
        }

        conn.execute(
            "INSERT INTO tag(snapshot_id, timeline_id, name, description, pinned)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![snapshot_id, uuid_param(timeline_id), name, description, pinned as i64],
        )
        .map_err(|err| ReversionError::InvalidRepository {
            path: String::new(),
            reason: err.to_string(),
        })?;

        Ok(TagRow {
            id: conn.last_insert_rowid(),
            snapshot_id,
            timeline_id,
            name: name.to_string(),
            description: description.to_string(),
            pinned,
        })
    }

    pub fn remove_tag(&self, id: i64) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM tag WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn get_tag(&self, id: i64) -> Result<Option<TagRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, snapshot_id, timeline_id, name, description, pinned FROM tag WHERE id = ?1",
                params![id],
                map_tag,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_tags_for_snapshot(&self, snapshot_id: i64) -> Result<Vec<TagRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, snapshot_id, timeline_id, name, description, pinned FROM tag WHERE snapshot_id = ?1",
        )?;
        let rows = stmt.query_map(params![snapshot_id], map_tag)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn list_tags_for_timeline(&self, timeline_id: Uuid) -> Result<Vec<TagRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, snapshot_id, timeline_id, name, description, pinned FROM tag WHERE timeline_id = ?1",
        )?;
        let rows = stmt.query_map(params![uuid_param(timeline_id)], map_tag)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn set_tag_pinned(&self, id: i64, pinned: bool) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE tag SET pinned = ?2 WHERE id = ?1",
            params![id, pinned as i64],
        )?;
        Ok(())
    }

    // ---- cleanup policy ------------------------------------------------

    pub fn create_cleanup_policy(
        &self,
        min_interval_ms: Option<i64>,
        time_frame_ms: Option<i64>,
        max_versions: i64,
        description: &str,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO cleanup_policy(min_interval_ms, time_frame_ms, max_versions, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![min_interval_ms, time_frame_ms, max_versions, description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn attach_policy_to_timeline(&self, timeline_id: Uuid, policy_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO timeline_cleanup_policy(timeline_id, policy_id) VALUES (?1, ?2)",
            params![uuid_param(timeline_id), policy_id],
        )?;
        Ok(())
    }

    pub fn list_policies_for_timeline(&self, timeline_id: Uuid) -> Result<Vec<CleanupPolicyRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT cp.id, cp.min_interval_ms, cp.time_frame_ms, cp.max_versions, cp.description
             FROM cleanup_policy cp
             JOIN timeline_cleanup_policy tcp ON tcp.policy_id = cp.id
             WHERE tcp.timeline_id = ?1",
        )?;
        let rows = stmt.query_map(params![uuid_param(timeline_id)], map_policy)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn remove_policy(&self, id: i64) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM cleanup_policy WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // ---- config --------------------------------------------------------

    pub fn get_config_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    pub fn set_config_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO config(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn all_config_raw(&self) -> Result<HashMap<String, String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM config")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut map = HashMap::new();
        for row in rows {
            let (k, v) = row?;
            map.insert(k, v);
        }
        Ok(map)
    }
}
