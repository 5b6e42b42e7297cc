//! Persistence seam for the two record sets.
//!
//! Both sets are small (one row per live grant / submission) and are
//! persisted as replace-sets: `save` rewrites the whole table inside a
//! transaction, mirroring how the services mutate an in-memory copy and
//! write it back atomically. Corrupt rows load as warnings, not errors;
//! the gate keeps serving from whatever parses.

use rusqlite::Connection;

use crate::records::{AccessGrant, ApprovalStatus, GrantSource, WorkflowRecord};
use crate::term;

pub trait GrantStore: Send {
    fn load(&self) -> anyhow::Result<Vec<AccessGrant>>;
    fn save(&mut self, records: &[AccessGrant]) -> anyhow::Result<()>;
}

pub trait WorkflowStore: Send {
    fn load(&self) -> anyhow::Result<Vec<WorkflowRecord>>;
    fn save(&mut self, records: &[WorkflowRecord]) -> anyhow::Result<()>;
}

pub struct SqliteGrantStore {
    conn: Connection,
}

impl SqliteGrantStore {
    pub fn new(conn: Connection) -> Self {
        SqliteGrantStore { conn }
    }
}

impl GrantStore for SqliteGrantStore {
    fn load(&self) -> anyhow::Result<Vec<AccessGrant>> {
        let mut stmt = self.conn.prepare(
            "SELECT parent_id, student_id, term, session, granted_by, granted_at
             FROM access_grants",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (parent_id, student_id, term, session, granted_by, granted_at) in rows {
            let Some(granted_by) = GrantSource::parse(&granted_by) else {
                tracing::warn!(%granted_by, "skipping access grant with unknown source");
                continue;
            };
            records.push(AccessGrant {
                parent_id,
                student_id,
                term,
                session,
                granted_by,
                granted_at,
            });
        }
        Ok(records)
    }

    fn save(&mut self, records: &[AccessGrant]) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM access_grants", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO access_grants(
                    grant_key, parent_id, student_id, term, session, granted_by, granted_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for rec in records {
                let key = term::grant_key(&rec.parent_id, &rec.student_id, &rec.term, &rec.session);
                stmt.execute((
                    &key,
                    &rec.parent_id,
                    &rec.student_id,
                    &rec.term,
                    &rec.session,
                    rec.granted_by.as_str(),
                    &rec.granted_at,
                ))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

pub struct SqliteWorkflowStore {
    conn: Connection,
}

impl SqliteWorkflowStore {
    pub fn new(conn: Connection) -> Self {
        SqliteWorkflowStore { conn }
    }
}

impl WorkflowStore for SqliteWorkflowStore {
    fn load(&self) -> anyhow::Result<Vec<WorkflowRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, student_id, student_name, class_name, subject, term, session,
                    teacher_id, teacher_name, status, submitted_at, updated_at,
                    published_at, feedback, admin_id, admin_name
             FROM workflow_records",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, String>(8)?,
                    r.get::<_, String>(9)?,
                    r.get::<_, Option<String>>(10)?,
                    r.get::<_, String>(11)?,
                    r.get::<_, Option<String>>(12)?,
                    r.get::<_, Option<String>>(13)?,
                    r.get::<_, Option<String>>(14)?,
                    r.get::<_, Option<String>>(15)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(status) = ApprovalStatus::parse(&row.9) else {
                tracing::warn!(id = %row.0, status = %row.9, "skipping workflow record with unknown status");
                continue;
            };
            records.push(WorkflowRecord {
                id: row.0,
                student_id: row.1,
                student_name: row.2,
                class_name: row.3,
                subject: row.4,
                term: row.5,
                session: row.6,
                teacher_id: row.7,
                teacher_name: row.8,
                status,
                submitted_at: row.10,
                updated_at: row.11,
                published_at: row.12,
                feedback: row.13,
                admin_id: row.14,
                admin_name: row.15,
            });
        }
        Ok(records)
    }

    fn save(&mut self, records: &[WorkflowRecord]) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM workflow_records", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO workflow_records(
                    id, student_id, student_name, class_name, subject, term, session,
                    teacher_id, teacher_name, status, submitted_at, updated_at,
                    published_at, feedback, admin_id, admin_name
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for rec in records {
                stmt.execute(rusqlite::params![
                    rec.id,
                    rec.student_id,
                    rec.student_name,
                    rec.class_name,
                    rec.subject,
                    rec.term,
                    rec.session,
                    rec.teacher_id,
                    rec.teacher_name,
                    rec.status.as_str(),
                    rec.submitted_at,
                    rec.updated_at,
                    rec.published_at,
                    rec.feedback,
                    rec.admin_id,
                    rec.admin_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// In-memory stores, used by unit tests and by hosts that want a purely
/// transient gate.
#[derive(Default)]
pub struct MemoryGrantStore {
    records: Vec<AccessGrant>,
}

impl GrantStore for MemoryGrantStore {
    fn load(&self) -> anyhow::Result<Vec<AccessGrant>> {
        Ok(self.records.clone())
    }

    fn save(&mut self, records: &[AccessGrant]) -> anyhow::Result<()> {
        self.records = records.to_vec();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryWorkflowStore {
    records: Vec<WorkflowRecord>,
}

impl WorkflowStore for MemoryWorkflowStore {
    fn load(&self) -> anyhow::Result<Vec<WorkflowRecord>> {
        Ok(self.records.clone())
    }

    fn save(&mut self, records: &[WorkflowRecord]) -> anyhow::Result<()> {
        self.records = records.to_vec();
        Ok(())
    }
}
