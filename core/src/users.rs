//! User storage: upsert-by-identity backed by the SQLite `users` table.
//! A user row is created on first observed event and refreshed on every event
//! (name drift, last_seen_at). Rows are never hard-deleted; is_active is a soft flag.

use rusqlite::Connection;

/// Identity fields as delivered by the chat platform with each event.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: String,
    pub last_seen_at: String,
}

impl User {
    /// Build an in-memory user from raw identity fields. Used when the store is
    /// unavailable so event handling can continue without a persisted row.
    pub fn from_identity(id: &UserIdentity) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        User {
            user_id: id.user_id,
            username: id.username.clone(),
            first_name: id.first_name.clone(),
            last_name: id.last_name.clone(),
            is_admin: false,
            is_active: true,
            created_at: now.clone(),
            last_seen_at: now,
        }
    }

    /// Display name for logs and replies: @username, else first name, else the numeric id.
    pub fn display_name(&self) -> String {
        if let Some(u) = self.username.as_deref() {
            return format!("@{}", u);
        }
        if let Some(f) = self.first_name.as_deref() {
            return f.to_string();
        }
        self.user_id.to_string()
    }
}

/// Insert or refresh a user from event identity fields and return the stored row.
/// `is_admin` is sticky: passing false never clears a previously granted flag.
pub fn upsert_user(conn: &Connection, id: &UserIdentity, is_admin: bool) -> rusqlite::Result<User> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (user_id, username, first_name, last_name, is_admin, created_at, last_seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
            username = excluded.username,
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            is_admin = MAX(users.is_admin, excluded.is_admin),
            last_seen_at = excluded.last_seen_at",
        rusqlite::params![id.user_id, id.username, id.first_name, id.last_name, is_admin, now],
    )?;
    get_user(conn, id.user_id).map(|u| u.expect("row upserted above"))
}

/// Get a user by platform id.
pub fn get_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<User>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, username, first_name, last_name, is_admin, is_active, created_at, last_seen_at
         FROM users WHERE user_id = ?1",
    )?;
    let mut rows = stmt.query(rusqlite::params![user_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_user(row)?)),
        None => Ok(None),
    }
}

/// Grant or revoke the admin flag directly (operator surface, next to the config
/// allow-list). A grant survives later upserts because the upsert never lowers the flag.
pub fn set_admin(conn: &Connection, user_id: i64, is_admin: bool) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET is_admin = ?1 WHERE user_id = ?2",
        rusqlite::params![is_admin, user_id],
    )?;
    Ok(())
}

/// Soft-deactivate a user. The row stays; no relation is touched.
pub fn deactivate_user(conn: &Connection, user_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET is_active = 0 WHERE user_id = ?1",
        rusqlite::params![user_id],
    )?;
    Ok(())
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        is_admin: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        last_seen_at: row.get(7)?,
    })
}
