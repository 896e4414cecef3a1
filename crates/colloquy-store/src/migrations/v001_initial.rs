//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `users` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    full_name     TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    bio           TEXT NOT NULL DEFAULT '',
    avatar_url    TEXT,                       -- reference into the media store
    last_seen     TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_last_seen ON users(last_seen DESC);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
-- Ordering key is (created_at, rowid): the implicit rowid is the
-- store-assigned monotonic tie-breaker for identical timestamps.
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    sender_id   TEXT NOT NULL,                -- FK -> users(id)
    receiver_id TEXT NOT NULL,                -- FK -> users(id)
    text        TEXT,
    image_url   TEXT,                         -- reference into the media store
    seen        INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    seen_at     TEXT,                         -- null until the read receipt
    created_at  TEXT NOT NULL,

    FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE,

    CHECK (text IS NOT NULL OR image_url IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_messages_pair
    ON messages(sender_id, receiver_id, created_at);

CREATE INDEX IF NOT EXISTS idx_messages_unseen
    ON messages(receiver_id, seen);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
