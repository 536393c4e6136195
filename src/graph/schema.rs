//! SQLite schema for the artifact graph, generation records and generation cache.

pub const SCHEMA_VERSION: &str = "1";

pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS intentcode_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    seq                     INTEGER PRIMARY KEY AUTOINCREMENT,
    id                      TEXT NOT NULL UNIQUE,
    parent_id               TEXT REFERENCES nodes(id) ON DELETE CASCADE,
    scope_id                TEXT NOT NULL,
    status                  TEXT NOT NULL,
    node_type               TEXT NOT NULL,
    name                    TEXT NOT NULL,
    text_content            TEXT,
    text_content_hash       TEXT,
    structured_content      TEXT,
    structured_content_hash TEXT,
    structured_updated_at   TEXT,
    created_at              TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_unique_key
    ON nodes (IFNULL(parent_id, ''), scope_id, node_type, name)
    WHERE status != 'deleted';

CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes (parent_id, node_type);
CREATE INDEX IF NOT EXISTS idx_nodes_scope_type ON nodes (scope_id, node_type);

CREATE TABLE IF NOT EXISTS edges (
    from_id    TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    to_id      TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    label      TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (from_id, to_id, label)
);

CREATE INDEX IF NOT EXISTS idx_edges_to ON edges (to_id);

CREATE TABLE IF NOT EXISTS generation_records (
    seq                    INTEGER PRIMARY KEY AUTOINCREMENT,
    id                     TEXT NOT NULL UNIQUE,
    owner_node_id          TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    model_id               TEXT NOT NULL,
    temperature            REAL,
    prompt                 TEXT NOT NULL,
    prompt_hash            TEXT NOT NULL,
    output_text            TEXT,
    output_text_hash       TEXT,
    output_structured      TEXT,
    output_structured_hash TEXT,
    created_at             TEXT NOT NULL,
    UNIQUE (owner_node_id, model_id, prompt_hash)
);

CREATE INDEX IF NOT EXISTS idx_generation_records_owner ON generation_records (owner_node_id, seq);

CREATE TABLE IF NOT EXISTS generation_cache (
    model_id          TEXT NOT NULL,
    cache_key         TEXT NOT NULL,
    input             TEXT NOT NULL,
    output_text       TEXT,
    output_messages   TEXT,
    output_structured TEXT,
    created_at        TEXT NOT NULL,
    PRIMARY KEY (model_id, cache_key)
);
";
