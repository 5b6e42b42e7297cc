use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("portal.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS access_grants(
            grant_key TEXT PRIMARY KEY,
            parent_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            term TEXT NOT NULL,
            session TEXT NOT NULL,
            granted_by TEXT NOT NULL,
            granted_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_access_grants_term_session
         ON access_grants(term, session)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_access_grants_parent
         ON access_grants(parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workflow_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            subject TEXT NOT NULL,
            term TEXT NOT NULL,
            session TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            teacher_name TEXT NOT NULL,
            status TEXT NOT NULL,
            submitted_at TEXT,
            updated_at TEXT NOT NULL,
            published_at TEXT,
            feedback TEXT,
            admin_id TEXT,
            admin_name TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workflow_records_teacher
         ON workflow_records(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workflow_records_term_session
         ON workflow_records(term, session)",
        [],
    )?;

    Ok(conn)
}
