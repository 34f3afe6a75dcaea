//! SQLite schema for documents and units.
//!
//! Every worker process opens its own connection to the same file; the
//! claim columns on `units` are the only coordination point between them.

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    owner        TEXT    NOT NULL,
    name         TEXT    NOT NULL,
    language     TEXT    NOT NULL,
    source       TEXT    NOT NULL,
    total_units  INTEGER NOT NULL DEFAULT 0,
    current_page INTEGER NOT NULL DEFAULT 1,
    split_error  TEXT,
    created_at   INTEGER NOT NULL,
    updated_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_name_language
    ON documents (name, language);

CREATE TABLE IF NOT EXISTS units (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id  INTEGER NOT NULL REFERENCES documents (id) ON DELETE CASCADE,
    page         INTEGER NOT NULL,
    source       TEXT    NOT NULL,
    artifact     TEXT,
    claim_token  TEXT,
    claimed_at   INTEGER,
    generated_at INTEGER,
    created_at   INTEGER NOT NULL,
    UNIQUE (document_id, page)
);

CREATE INDEX IF NOT EXISTS units_pending
    ON units (id) WHERE artifact IS NULL;
";

pub(crate) const DOCUMENT_COLUMNS: &str = "id, owner, name, language, source, total_units, \
     current_page, split_error, created_at, updated_at";

pub(crate) const UNIT_COLUMNS: &str =
    "id, document_id, page, source, artifact, claim_token, claimed_at, generated_at";
