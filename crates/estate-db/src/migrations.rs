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
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                name        TEXT NOT NULL,
                phone       TEXT,
                avatar      TEXT,
                password    TEXT NOT NULL,
                is_admin    INTEGER NOT NULL DEFAULT 0,
                is_banned   INTEGER NOT NULL DEFAULT 0,
                verified    INTEGER NOT NULL DEFAULT 0,
                created     TEXT NOT NULL,
                updated     TEXT NOT NULL
            );

            CREATE TABLE properties (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                property_type   TEXT NOT NULL,
                listing_type    TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'draft',
                address         TEXT NOT NULL DEFAULT '',
                city            TEXT NOT NULL,
                state           TEXT NOT NULL DEFAULT '',
                country         TEXT NOT NULL DEFAULT '',
                latitude        REAL,
                longitude       REAL,
                price           INTEGER NOT NULL,
                bedrooms        INTEGER NOT NULL DEFAULT 0,
                bathrooms       INTEGER NOT NULL DEFAULT 0,
                square_feet     INTEGER NOT NULL DEFAULT 0,
                owner_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                agent_id        TEXT REFERENCES users(id) ON DELETE SET NULL,
                created         TEXT NOT NULL,
                updated         TEXT NOT NULL
            );

            CREATE INDEX idx_properties_owner ON properties(owner_id);
            CREATE INDEX idx_properties_status_created ON properties(status, created);
            CREATE INDEX idx_properties_price ON properties(price);

            CREATE TABLE property_images (
                id          TEXT PRIMARY KEY,
                property_id TEXT NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
                position    INTEGER NOT NULL,
                size        INTEGER NOT NULL,
                created     TEXT NOT NULL
            );

            CREATE INDEX idx_property_images_property ON property_images(property_id, position);

            CREATE TABLE favorites (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                property_id TEXT NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
                created     TEXT NOT NULL,
                UNIQUE(user_id, property_id)
            );

            CREATE TABLE property_messages (
                id          TEXT PRIMARY KEY,
                property_id TEXT NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL,
                phone       TEXT,
                body        TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'new',
                reply       TEXT,
                replied_by  TEXT REFERENCES users(id) ON DELETE SET NULL,
                replied_at  TEXT,
                created     TEXT NOT NULL,
                updated     TEXT NOT NULL
            );

            CREATE INDEX idx_messages_thread
                ON property_messages(property_id, sender_id, created);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
