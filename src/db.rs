use crate::catalog::{CODE_MAX_CHARS, CREDITS_RANGE, NAME_MAX_CHARS, SESSIONS_RANGE};
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "coursebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// The CHECK constraints repeat the field rules so that nothing written
/// around the application can leave a half-valid course behind.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL CHECK(length(trim(code)) BETWEEN 1 AND {code_max}),
            name TEXT NOT NULL CHECK(length(trim(name)) BETWEEN 1 AND {name_max}),
            credits INTEGER NOT NULL CHECK(credits BETWEEN {cr_lo} AND {cr_hi}),
            sessions_per_week INTEGER NOT NULL CHECK(sessions_per_week BETWEEN {se_lo} AND {se_hi})
        )",
        code_max = CODE_MAX_CHARS,
        name_max = NAME_MAX_CHARS,
        cr_lo = CREDITS_RANGE.start(),
        cr_hi = CREDITS_RANGE.end(),
        se_lo = SESSIONS_RANGE.start(),
        se_hi = SESSIONS_RANGE.end(),
    );
    conn.execute(&ddl, [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_code ON courses(code)",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
pub fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}
