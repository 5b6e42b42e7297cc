//! Teacher→admin approval workflow over per-student submission records.
//!
//! State machine per (student, class, subject, term, session) key:
//! no record (implicit draft) → pending → approved or revoked. A revoked
//! record goes back to pending by being resubmitted; a reset deletes the
//! scope's records outright, returning those keys to implicit draft.
//!
//! Like the ledger, no operation here surfaces an error: malformed input
//! and lookups on missing keys are silent no-ops. Notices are dispatched
//! after the store lock is released and a delivery failure never affects
//! the mutation that triggered it.

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::json;

use crate::broadcast::{Broadcaster, Subscription};
use crate::notify::{ChangeNotifier, Notice, NoticeKind, Role};
use crate::records::{ApprovalStatus, ScopeSummary, WorkflowRecord};
use crate::store::WorkflowStore;
use crate::term;

fn now_ts() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
}

/// Status-change request for one record. Admin identity and feedback are
/// applied only when present.
pub struct StatusChange<'a> {
    pub status: ApprovalStatus,
    pub admin_id: Option<&'a str>,
    pub admin_name: Option<&'a str>,
    pub feedback: Option<&'a str>,
}

pub struct Workflow<S: WorkflowStore> {
    store: Mutex<S>,
    broadcaster: Broadcaster<WorkflowRecord>,
    notifier: Arc<dyn ChangeNotifier>,
}

impl<S: WorkflowStore> Workflow<S> {
    pub fn new(store: S, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Workflow {
            store: Mutex::new(store),
            broadcaster: Broadcaster::new(),
            notifier,
        }
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription<WorkflowRecord>
    where
        F: Fn(&[WorkflowRecord]) + Send + 'static,
    {
        self.broadcaster.subscribe(observer)
    }

    /// Upsert one pending record per student. A resubmission lands on the
    /// same key and keeps the reviewing admin's identity, so a teacher
    /// fixing a revoked report does not lose who revoked it.
    pub fn submit_for_approval(
        &self,
        teacher_id: &str,
        teacher_name: &str,
        class_name: &str,
        subject: &str,
        term_label: &str,
        session: &str,
        students: &[StudentRef],
    ) -> Vec<WorkflowRecord> {
        let notice;
        let view = {
            let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
            let records = load_or_empty(&*store);

            let submitting: Vec<&StudentRef> = students
                .iter()
                .filter(|s| !s.student_id.trim().is_empty())
                .collect();
            if submitting.is_empty()
                || [teacher_id, class_name, subject, term_label, session]
                    .iter()
                    .any(|f| f.trim().is_empty())
            {
                return scope_view(&records, class_name, subject, term_label, session, None);
            }

            let now = now_ts();
            let canonical_term = term::normalize_term(term_label);
            let mut next = records.clone();
            for student in &submitting {
                let key = term::workflow_key(
                    &student.student_id,
                    class_name,
                    subject,
                    term_label,
                    session,
                );
                let prior = next.iter().position(|r| r.id == key);
                let (admin_id, admin_name, published_at) = match prior {
                    Some(i) => {
                        let old = next.swap_remove(i);
                        (old.admin_id, old.admin_name, old.published_at)
                    }
                    None => (None, None, None),
                };
                next.push(WorkflowRecord {
                    id: key,
                    student_id: student.student_id.trim().to_string(),
                    student_name: student.student_name.trim().to_string(),
                    class_name: class_name.trim().to_string(),
                    subject: subject.trim().to_string(),
                    term: canonical_term.clone(),
                    session: session.trim().to_string(),
                    teacher_id: teacher_id.trim().to_string(),
                    teacher_name: teacher_name.trim().to_string(),
                    status: ApprovalStatus::Pending,
                    submitted_at: Some(now.clone()),
                    updated_at: now.clone(),
                    published_at,
                    feedback: None,
                    admin_id,
                    admin_name,
                });
            }

            if let Err(e) = store.save(&next) {
                tracing::warn!(error = %e, "submission not persisted; keeping previous workflow state");
                return scope_view(&records, class_name, subject, term_label, session, None);
            }
            self.broadcaster.publish(&next);

            notice = Notice::new(
                "Results submitted for approval",
                format!(
                    "{} submitted {} {} results ({} students) for approval",
                    teacher_name.trim(),
                    class_name.trim(),
                    subject.trim(),
                    submitting.len()
                ),
                vec![Role::Admin, Role::SuperAdmin],
                "report-approval",
                NoticeKind::Info,
                json!({
                    "teacherId": teacher_id.trim(),
                    "className": class_name.trim(),
                    "subject": subject.trim(),
                    "term": canonical_term,
                    "session": session.trim(),
                }),
            );
            scope_view(&next, class_name, subject, term_label, session, None)
        };
        self.dispatch(notice);
        view
    }

    /// Adjudicate one record. Missing key and `draft` are no-ops: draft is
    /// only reachable through [`Workflow::reset_submission`].
    pub fn update_status(
        &self,
        student_id: &str,
        class_name: &str,
        subject: &str,
        term_label: &str,
        session: &str,
        change: StatusChange<'_>,
    ) -> Vec<WorkflowRecord> {
        let mut notice = None;
        let view = {
            let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
            let records = load_or_empty(&*store);

            if change.status == ApprovalStatus::Draft {
                return scope_view(&records, class_name, subject, term_label, session, None);
            }

            let key = term::workflow_key(student_id, class_name, subject, term_label, session);
            let mut next = records.clone();
            let Some(rec) = next.iter_mut().find(|r| r.id == key) else {
                return scope_view(&records, class_name, subject, term_label, session, None);
            };

            let now = now_ts();
            let was = rec.status;
            rec.status = change.status;
            rec.updated_at = now.clone();
            if change.status == ApprovalStatus::Approved && was != ApprovalStatus::Approved {
                rec.published_at = Some(now);
            }
            if let Some(id) = change.admin_id.filter(|s| !s.trim().is_empty()) {
                rec.admin_id = Some(id.trim().to_string());
            }
            if let Some(name) = change.admin_name.filter(|s| !s.trim().is_empty()) {
                rec.admin_name = Some(name.trim().to_string());
            }
            rec.feedback = match change.status {
                ApprovalStatus::Revoked => change.feedback.map(|f| f.to_string()),
                _ => None,
            };

            let student_name = rec.student_name.clone();
            let feedback_text = rec.feedback.clone().unwrap_or_default();
            let metadata = json!({
                "studentId": rec.student_id,
                "className": rec.class_name,
                "subject": rec.subject,
                "term": rec.term,
                "session": rec.session,
            });

            if let Err(e) = store.save(&next) {
                tracing::warn!(error = %e, "status update not persisted; keeping previous workflow state");
                return scope_view(&records, class_name, subject, term_label, session, None);
            }
            self.broadcaster.publish(&next);

            notice = match change.status {
                ApprovalStatus::Approved => Some(Notice::new(
                    "Report approved",
                    format!("{}'s report has been approved for release", student_name),
                    vec![Role::Teacher, Role::Parent],
                    "report-approval",
                    NoticeKind::Success,
                    metadata,
                )),
                ApprovalStatus::Revoked => Some(Notice::new(
                    "Report revoked",
                    format!("{}'s report was sent back: {}", student_name, feedback_text),
                    vec![Role::Teacher],
                    "report-approval",
                    NoticeKind::Warning,
                    metadata,
                )),
                _ => None,
            };
            scope_view(&next, class_name, subject, term_label, session, None)
        };
        if let Some(n) = notice {
            self.dispatch(n);
        }
        view
    }

    /// Delete every record in the teacher's scope regardless of student,
    /// returning those keys to implicit draft.
    pub fn reset_submission(
        &self,
        teacher_id: &str,
        class_name: &str,
        subject: &str,
        term_label: &str,
        session: &str,
    ) -> Vec<WorkflowRecord> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let records = load_or_empty(&*store);

        if [teacher_id, class_name, subject, term_label, session]
            .iter()
            .any(|f| f.trim().is_empty())
        {
            return scope_view(&records, class_name, subject, term_label, session, None);
        }

        let next: Vec<WorkflowRecord> = records
            .iter()
            .filter(|r| {
                !(in_scope(r, class_name, subject, term_label, session)
                    && term::key_field(&r.teacher_id) == term::key_field(teacher_id))
            })
            .cloned()
            .collect();
        if next.len() == records.len() {
            return scope_view(&records, class_name, subject, term_label, session, None);
        }

        if let Err(e) = store.save(&next) {
            tracing::warn!(error = %e, "reset not persisted; keeping previous workflow state");
            return scope_view(&records, class_name, subject, term_label, session, None);
        }
        self.broadcaster.publish(&next);
        scope_view(&next, class_name, subject, term_label, session, None)
    }

    /// Records for one scope, optionally narrowed to a teacher. Also the
    /// broadcast catch-up accessor for dashboards.
    pub fn scope_records(
        &self,
        class_name: &str,
        subject: &str,
        term_label: &str,
        session: &str,
        teacher_id: Option<&str>,
    ) -> Vec<WorkflowRecord> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        scope_view(
            &load_or_empty(&*store),
            class_name,
            subject,
            term_label,
            session,
            teacher_id,
        )
    }

    /// Current full record set.
    pub fn records(&self) -> Vec<WorkflowRecord> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        load_or_empty(&*store)
    }

    fn dispatch(&self, notice: Notice) {
        if let Err(e) = self.notifier.notify(notice) {
            tracing::warn!(error = %e, "change notice dropped");
        }
    }
}

/// Scope-level rollup. Precedence is fixed and deliberate: one revoked
/// record flags the whole scope (carrying its feedback), any pending
/// record holds the scope at pending, and only a fully approved set
/// reports approved.
pub fn summarize(records: &[WorkflowRecord]) -> ScopeSummary {
    if records.is_empty() {
        return ScopeSummary {
            status: ApprovalStatus::Draft,
            message: None,
            submitted_date: None,
        };
    }
    if let Some(revoked) = records
        .iter()
        .find(|r| r.status == ApprovalStatus::Revoked)
    {
        return ScopeSummary {
            status: ApprovalStatus::Revoked,
            message: revoked.feedback.clone(),
            submitted_date: revoked.submitted_at.clone(),
        };
    }
    if records.iter().any(|r| r.status == ApprovalStatus::Pending) {
        return ScopeSummary {
            status: ApprovalStatus::Pending,
            message: None,
            submitted_date: records[0].submitted_at.clone(),
        };
    }
    if records.iter().all(|r| r.status == ApprovalStatus::Approved) {
        return ScopeSummary {
            status: ApprovalStatus::Approved,
            message: None,
            submitted_date: None,
        };
    }
    ScopeSummary {
        status: ApprovalStatus::Draft,
        message: None,
        submitted_date: None,
    }
}

fn load_or_empty<S: WorkflowStore>(store: &S) -> Vec<WorkflowRecord> {
    match store.load() {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "workflow store unreadable; serving empty set");
            Vec::new()
        }
    }
}

fn in_scope(
    record: &WorkflowRecord,
    class_name: &str,
    subject: &str,
    term_label: &str,
    session: &str,
) -> bool {
    term::key_field(&record.class_name) == term::key_field(class_name)
        && term::key_field(&record.subject) == term::key_field(subject)
        && term::normalize_term(&record.term) == term::normalize_term(term_label)
        && term::key_field(&record.session) == term::key_field(session)
}

fn scope_view(
    records: &[WorkflowRecord],
    class_name: &str,
    subject: &str,
    term_label: &str,
    session: &str,
    teacher_id: Option<&str>,
) -> Vec<WorkflowRecord> {
    records
        .iter()
        .filter(|r| in_scope(r, class_name, subject, term_label, session))
        .filter(|r| match teacher_id {
            Some(t) if !t.trim().is_empty() => {
                term::key_field(&r.teacher_id) == term::key_field(t)
            }
            _ => true,
        })
        .cloned()
        .collect()
}
