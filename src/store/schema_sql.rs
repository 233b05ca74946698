//! DDL for the embedded object store. Kept separate from the query logic in [`super`] so the
//! on-disk shape is easy to audit in one place (spec §6: extra columns/tables must stay
//! tolerated by any reader, so this schema is intentionally the minimum the core relies on).

pub const CREATE_OBJECTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS objects (
    hash        TEXT PRIMARY KEY,
    type        TEXT NOT NULL,
    size        INTEGER NOT NULL,
    data        BLOB NOT NULL,
    compression TEXT NOT NULL,
    base_hash   TEXT,
    delta_depth INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL
)";

pub const CREATE_OBJECTS_TYPE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_objects_type ON objects(type)";

pub const CREATE_REFS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS refs (
    name       TEXT PRIMARY KEY,
    hash       TEXT NOT NULL,
    kind       TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)";

pub const CREATE_REFS_KIND_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_refs_kind ON refs(kind)";

pub const CREATE_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_OBJECTS_TABLE,
    CREATE_OBJECTS_TYPE_INDEX,
    CREATE_REFS_TABLE,
    CREATE_REFS_KIND_INDEX,
    CREATE_METADATA_TABLE,
];
