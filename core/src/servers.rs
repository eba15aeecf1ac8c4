//! Server storage: `servers` table plus the (user, server, role) relation in `user_servers`.
//! A server row is created lazily the first time a user attaches it; its name defaults to
//! the key until enriched. Re-attaching is a no-op (insert-or-ignore on the pair).

use rusqlite::Connection;

pub const MIN_SERVER_KEY_LEN: usize = 4;
pub const MAX_SERVER_KEY_LEN: usize = 100;

/// Role recorded when a user attaches a server themselves.
pub const ROLE_OWNER: &str = "owner";

#[derive(Debug, Clone)]
pub struct Server {
    pub server_key: String,
    pub name: String,
    pub created_at: String,
}

/// A server as listed for one user, with the relation fields joined in.
#[derive(Debug, Clone)]
pub struct UserServer {
    pub server_key: String,
    pub name: String,
    pub role: String,
    pub added_at: String,
}

/// Local format check for a user-supplied server key. Runs before any network call.
/// Bounds are in characters, not bytes.
pub fn validate_server_key(key: &str) -> Result<(), &'static str> {
    if key.is_empty() {
        return Err("server key is empty");
    }
    let chars = key.chars().count();
    if chars < MIN_SERVER_KEY_LEN {
        return Err("server key is too short (min 4 characters)");
    }
    if chars > MAX_SERVER_KEY_LEN {
        return Err("server key is too long (max 100 characters)");
    }
    Ok(())
}

/// Insert the server row if absent; name defaults to the key. Returns the stored row.
pub fn ensure_server(conn: &Connection, server_key: &str) -> rusqlite::Result<Server> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO servers (server_key, name, created_at) VALUES (?1, ?1, ?2)",
        rusqlite::params![server_key, now],
    )?;
    get_server(conn, server_key).map(|s| s.expect("row ensured above"))
}

/// Get a server by key.
pub fn get_server(conn: &Connection, server_key: &str) -> rusqlite::Result<Option<Server>> {
    let mut stmt = conn.prepare(
        "SELECT server_key, name, created_at FROM servers WHERE server_key = ?1",
    )?;
    let mut rows = stmt.query(rusqlite::params![server_key])?;
    match rows.next()? {
        Some(row) => Ok(Some(Server {
            server_key: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })),
        None => Ok(None),
    }
}

/// Attach a server to a user with a role. Insert-or-ignore keyed on (user_id, server_key):
/// re-adding never duplicates the relation. The server row must exist first (FK).
/// Returns true if the relation was newly created.
pub fn attach_server(
    conn: &Connection,
    user_id: i64,
    server_key: &str,
    role: &str,
) -> rusqlite::Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let n = conn.execute(
        "INSERT OR IGNORE INTO user_servers (user_id, server_key, role, added_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![user_id, server_key, role, now],
    )?;
    Ok(n > 0)
}

/// Remove the (user, server) relation. The server row itself stays.
/// Returns true if a relation was removed.
pub fn detach_server(conn: &Connection, user_id: i64, server_key: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM user_servers WHERE user_id = ?1 AND server_key = ?2",
        rusqlite::params![user_id, server_key],
    )?;
    Ok(n > 0)
}

/// List a user's servers, most recently added first.
pub fn list_servers_for_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<UserServer>> {
    let mut stmt = conn.prepare(
        "SELECT s.server_key, s.name, us.role, us.added_at
         FROM user_servers us
         JOIN servers s ON s.server_key = us.server_key
         WHERE us.user_id = ?1
         ORDER BY us.added_at DESC, s.server_key DESC",
    )?;
    let rows = stmt.query_map(rusqlite::params![user_id], |row| {
        Ok(UserServer {
            server_key: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            added_at: row.get(3)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::users::{upsert_user, UserIdentity};

    fn seed_user(conn: &Connection, user_id: i64) {
        let id = UserIdentity { user_id, username: None, first_name: None, last_name: None };
        upsert_user(conn, &id, false).unwrap();
    }

    #[test]
    fn key_format_bounds() {
        assert!(validate_server_key("srv_12313").is_ok());
        assert!(validate_server_key("").is_err());
        assert!(validate_server_key("abc").is_err());
        assert!(validate_server_key(&"x".repeat(101)).is_err());
        assert!(validate_server_key(&"x".repeat(100)).is_ok());
        assert!(validate_server_key("abcd").is_ok());
    }

    #[test]
    fn key_bounds_count_characters_not_bytes() {
        // 3 characters, 9 bytes: still too short
        assert!(validate_server_key("€€€").is_err());
        // 100 characters, 200 bytes: within bounds
        assert!(validate_server_key(&"ц".repeat(100)).is_ok());
        assert!(validate_server_key(&"ц".repeat(101)).is_err());
        assert!(validate_server_key("серв").is_ok());
    }

    #[test]
    fn attach_twice_is_noop() {
        let conn = db::open_db_in_memory().unwrap();
        seed_user(&conn, 1);
        ensure_server(&conn, "srv_12313").unwrap();
        attach_server(&conn, 1, "srv_12313", ROLE_OWNER).unwrap();
        attach_server(&conn, 1, "srv_12313", "viewer").unwrap();

        let listed = list_servers_for_user(&conn, 1).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].role, ROLE_OWNER);
    }

    #[test]
    fn relation_requires_server_row() {
        let conn = db::open_db_in_memory().unwrap();
        seed_user(&conn, 1);
        let res = attach_server(&conn, 1, "srv_absent", ROLE_OWNER);
        assert!(res.is_err());
    }

    #[test]
    fn list_orders_most_recent_first() {
        let conn = db::open_db_in_memory().unwrap();
        seed_user(&conn, 1);
        for key in ["srv_aaaa", "srv_bbbb", "srv_cccc"] {
            ensure_server(&conn, key).unwrap();
            attach_server(&conn, 1, key, ROLE_OWNER).unwrap();
        }
        let listed = list_servers_for_user(&conn, 1).unwrap();
        let keys: Vec<&str> = listed.iter().map(|s| s.server_key.as_str()).collect();
        assert_eq!(keys, vec!["srv_cccc", "srv_bbbb", "srv_aaaa"]);
    }

    #[test]
    fn detach_reports_removal() {
        let conn = db::open_db_in_memory().unwrap();
        seed_user(&conn, 1);
        ensure_server(&conn, "srv_12313").unwrap();
        attach_server(&conn, 1, "srv_12313", ROLE_OWNER).unwrap();
        assert!(detach_server(&conn, 1, "srv_12313").unwrap());
        assert!(!detach_server(&conn, 1, "srv_12313").unwrap());
        // server row survives the detach
        assert!(get_server(&conn, "srv_12313").unwrap().is_some());
    }
}
