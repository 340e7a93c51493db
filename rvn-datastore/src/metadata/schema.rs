//! Plain SQL schema for the metadata store. Deliberately not an ORM:
//! plain SQL plus an explicit struct-per-row mapping layer, which is
//! what `super::MetadataStore`'s methods do.

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS timeline (
    id              TEXT PRIMARY KEY,
    time_created    INTEGER NOT NULL
);

-- Tracks the next revision to hand out per timeline, independent of which
-- snapshot rows currently exist, so a deleted snapshot's revision number
-- is never reused. MAX(revision)+1 alone would violate this once the
-- highest-revision snapshot is removed.
CREATE TABLE IF NOT EXISTS timeline_revision_counter (
    timeline_id     TEXT PRIMARY KEY REFERENCES timeline(id) ON DELETE CASCADE,
    next_revision   INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS snapshot (
    id              INTEGER PRIMARY KEY,
    timeline_id     TEXT NOT NULL REFERENCES timeline(id) ON DELETE CASCADE,
    revision        INTEGER NOT NULL,
    name            TEXT,
    description     TEXT NOT NULL DEFAULT '',
    pinned          INTEGER NOT NULL DEFAULT 0,
    time_created    INTEGER NOT NULL,
    UNIQUE(timeline_id, revision)
);

CREATE TABLE IF NOT EXISTS blob (
    id              INTEGER PRIMARY KEY,
    checksum        BLOB NOT NULL UNIQUE,
    size            INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS version (
    id              INTEGER PRIMARY KEY,
    snapshot_id     INTEGER NOT NULL REFERENCES snapshot(id) ON DELETE CASCADE,
    path            TEXT NOT NULL,
    last_modified_ms INTEGER NOT NULL,
    permissions     TEXT,
    size            INTEGER NOT NULL,
    checksum        BLOB NOT NULL,
    UNIQUE(snapshot_id, path)
);

CREATE TABLE IF NOT EXISTS block (
    version_id      INTEGER NOT NULL REFERENCES version(id) ON DELETE CASCADE,
    blob_id         INTEGER NOT NULL REFERENCES blob(id),
    idx             INTEGER NOT NULL,
    PRIMARY KEY (version_id, idx)
);

CREATE TABLE IF NOT EXISTS tag (
    id              INTEGER PRIMARY KEY,
    snapshot_id     INTEGER NOT NULL REFERENCES snapshot(id) ON DELETE CASCADE,
    timeline_id     TEXT NOT NULL REFERENCES timeline(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    pinned          INTEGER NOT NULL DEFAULT 0,
    UNIQUE(timeline_id, name)
);

CREATE TABLE IF NOT EXISTS cleanup_policy (
    id              INTEGER PRIMARY KEY,
    min_interval_ms INTEGER,
    time_frame_ms   INTEGER,
    max_versions    INTEGER NOT NULL,
    description     TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS timeline_cleanup_policy (
    timeline_id     TEXT NOT NULL REFERENCES timeline(id) ON DELETE CASCADE,
    policy_id       INTEGER NOT NULL REFERENCES cleanup_policy(id) ON DELETE CASCADE,
    PRIMARY KEY (timeline_id, policy_id)
);

CREATE TABLE IF NOT EXISTS config (
    key             TEXT PRIMARY KEY,
    value           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_version_path ON version(path);
CREATE INDEX IF NOT EXISTS idx_block_blob ON block(blob_id);
"#;
