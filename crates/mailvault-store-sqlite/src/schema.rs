//! SQL schema for the mailvault SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Raw messages. Never updated; deleted only by the prune pass.
CREATE TABLE IF NOT EXISTS messages (
    message_id      TEXT PRIMARY KEY,
    raw             BLOB NOT NULL,
    envelope_sender TEXT,
    inserted_at     TEXT NOT NULL     -- ISO 8601 UTC
);

-- Where each message was last seen. Exactly one row per message; moved in
-- place on relocation.
CREATE TABLE IF NOT EXISTS provenance (
    message_id TEXT PRIMARY KEY REFERENCES messages(message_id) ON DELETE CASCADE,
    kind       TEXT NOT NULL,         -- 'mbox' | 'piped'
    file       TEXT NOT NULL,
    item_key   TEXT,
    mtime      INTEGER,               -- microseconds since the Unix epoch
    UNIQUE (kind, file, item_key, mtime)
);

CREATE TABLE IF NOT EXISTS fingerprints (
    message_id  TEXT PRIMARY KEY REFERENCES messages(message_id) ON DELETE CASCADE,
    fingerprint TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS message_headers (
    message_id   TEXT NOT NULL REFERENCES messages(message_id) ON DELETE CASCADE,
    header_index INTEGER NOT NULL,
    name         TEXT NOT NULL,
    value        TEXT NOT NULL,
    PRIMARY KEY (message_id, header_index)
);

CREATE TABLE IF NOT EXISTS message_addresses (
    message_id    TEXT NOT NULL REFERENCES messages(message_id) ON DELETE CASCADE,
    address_index INTEGER NOT NULL,
    header_name   TEXT NOT NULL,      -- lowercase, e.g. 'to'
    display_name  TEXT,
    address       TEXT NOT NULL,
    PRIMARY KEY (message_id, address_index)
);

CREATE TABLE IF NOT EXISTS message_dates (
    message_id  TEXT NOT NULL REFERENCES messages(message_id) ON DELETE CASCADE,
    date_index  INTEGER NOT NULL,
    header_name TEXT NOT NULL,
    value       TEXT NOT NULL,        -- ISO 8601 UTC
    PRIMARY KEY (message_id, date_index)
);

-- Files already fully processed at a given mtime.
CREATE TABLE IF NOT EXISTS scans (
    file       TEXT NOT NULL,
    mtime      INTEGER NOT NULL,
    scanned_at TEXT NOT NULL,
    PRIMARY KEY (file, mtime)
);

CREATE INDEX IF NOT EXISTS provenance_file_idx     ON provenance(kind, file, mtime);
CREATE INDEX IF NOT EXISTS fingerprints_value_idx  ON fingerprints(fingerprint);
CREATE INDEX IF NOT EXISTS addresses_address_idx   ON message_addresses(address);

PRAGMA user_version = 1;
";
