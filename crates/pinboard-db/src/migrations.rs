use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE,
                email               TEXT NOT NULL UNIQUE,
                password            TEXT NOT NULL,
                bio                 TEXT NOT NULL DEFAULT '',
                avatar              TEXT NOT NULL DEFAULT 'https://i.pravatar.cc/150',
                location            TEXT NOT NULL DEFAULT '',
                website             TEXT NOT NULL DEFAULT '',
                total_pins_created  INTEGER NOT NULL DEFAULT 0,
                total_comments      INTEGER NOT NULL DEFAULT 0,
                total_boards        INTEGER NOT NULL DEFAULT 0,
                activity_score      REAL NOT NULL DEFAULT 0,
                segment             TEXT NOT NULL DEFAULT 'casual',
                login_count         INTEGER NOT NULL DEFAULT 0,
                last_login          TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE follows (
                follower_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                followee_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (follower_id, followee_id)
            );

            CREATE INDEX idx_follows_followee ON follows(followee_id);

            -- likes/saves hold JSON arrays of user ids. Set semantics are kept
            -- by the engagement service, not by a constraint here.
            CREATE TABLE pins (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                image_url   TEXT NOT NULL,
                likes       TEXT DEFAULT '[]',
                saves       TEXT DEFAULT '[]',
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_pins_created ON pins(created_at);

            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                pin_id      TEXT NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id),
                text        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_comments_pin ON comments(pin_id, created_at);

            CREATE TABLE boards (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                name        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_boards_owner ON boards(owner_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
