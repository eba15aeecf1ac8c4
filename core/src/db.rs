//! SQLite database: single connection, WAL mode, all tables created on open.
//! DB file lives at {working_dir}/pulsebot.db.

use std::path::Path;
use rusqlite::Connection;

const DB_FILE: &str = "pulsebot.db";

/// Open (or create) the SQLite database and ensure all tables exist.
pub fn open_db(working_dir: &Path) -> rusqlite::Result<Connection> {
    let db_path = working_dir.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    create_tables(&conn)?;
    Ok(conn)
}

/// In-memory database with the same schema (tests).
pub fn open_db_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    create_tables(&conn)?;
    Ok(conn)
}

fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            user_id      INTEGER PRIMARY KEY,
            username     TEXT,
            first_name   TEXT,
            last_name    TEXT,
            is_admin     INTEGER NOT NULL DEFAULT 0,
            is_active    INTEGER NOT NULL DEFAULT 1,
            created_at   TEXT NOT NULL,
            last_seen_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS servers (
            server_key  TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_servers (
            user_id     INTEGER NOT NULL REFERENCES users(user_id),
            server_key  TEXT NOT NULL REFERENCES servers(server_key),
            role        TEXT NOT NULL,
            added_at    TEXT NOT NULL,
            PRIMARY KEY (user_id, server_key)
        );
        ",
    )
}
