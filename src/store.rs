use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

// Fixed storage keys, one JSON blob each.
pub const KEY_CGPA_DATA: &str = "cgpa_data";
pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_AUTH_USER: &str = "auth_user";
pub const KEY_COURSES: &str = "attendance_courses";

/// Open (creating if needed) the workspace-local settings database. It plays
/// the role of the browser's localStorage: a flat key -> JSON-blob table.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("campus.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_set_json<T: Serialize>(conn: &Connection, key: &str, value: &T) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, &raw),
    )?;
    Ok(())
}

/// Read a stored blob. Absent keys and unparseable blobs both come back as
/// `None` so callers fall back to their defaults instead of failing startup.
pub fn settings_get_json<T: DeserializeOwned>(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<T>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding malformed stored blob");
            Ok(None)
        }
    }
}

pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace() -> PathBuf {
        std::env::temp_dir().join(format!(
            "campusd-store-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn set_get_delete_roundtrip() {
        let ws = temp_workspace();
        let conn = open_db(&ws).expect("open db");

        assert!(settings_get_json::<serde_json::Value>(&conn, KEY_CGPA_DATA)
            .expect("get")
            .is_none());

        settings_set_json(&conn, KEY_CGPA_DATA, &json!({"semesters": []})).expect("set");
        let v: serde_json::Value = settings_get_json(&conn, KEY_CGPA_DATA)
            .expect("get")
            .expect("present");
        assert_eq!(v["semesters"], json!([]));

        // Overwrite, not append.
        settings_set_json(&conn, KEY_CGPA_DATA, &json!({"semesters": [1]})).expect("set");
        let v: serde_json::Value = settings_get_json(&conn, KEY_CGPA_DATA)
            .expect("get")
            .expect("present");
        assert_eq!(v["semesters"], json!([1]));

        settings_delete(&conn, KEY_CGPA_DATA).expect("delete");
        assert!(settings_get_json::<serde_json::Value>(&conn, KEY_CGPA_DATA)
            .expect("get")
            .is_none());
    }

    #[test]
    fn malformed_blob_reads_as_absent() {
        let ws = temp_workspace();
        let conn = open_db(&ws).expect("open db");
        conn.execute(
            "INSERT INTO settings(key, value) VALUES(?, ?)",
            (KEY_CGPA_DATA, "{not json"),
        )
        .expect("raw insert");
        let v: Option<serde_json::Value> =
            settings_get_json(&conn, KEY_CGPA_DATA).expect("get survives");
        assert!(v.is_none());
    }
}
