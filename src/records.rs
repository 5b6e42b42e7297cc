//! Record types persisted and served by the release gate.
//!
//! Field names on the wire are camelCase to match what the portal UI and
//! any previously persisted records already use.

use serde::{Deserialize, Serialize};

/// Who created an access grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantSource {
    Payment,
    Manual,
}

impl GrantSource {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantSource::Payment => "payment",
            GrantSource::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment" => Some(GrantSource::Payment),
            "manual" => Some(GrantSource::Manual),
            _ => None,
        }
    }
}

/// One parent's permission to view one student's report for one
/// term/session. At most one live grant per (parent, student, session,
/// term) key; a re-grant replaces the existing record whatever its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub parent_id: String,
    pub student_id: String,
    pub term: String,
    pub session: String,
    pub granted_by: GrantSource,
    pub granted_at: String,
}

/// Result of an access lookup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheck {
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<AccessGrant>,
}

/// Approval state of one student's report within a class/subject/term/
/// session. `Draft` is never stored: a key with no record is implicitly
/// draft, and the only road back to draft is a reset that deletes the
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Draft,
    Pending,
    Approved,
    Revoked,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Draft => "draft",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ApprovalStatus::Draft),
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "revoked" => Some(ApprovalStatus::Revoked),
            _ => None,
        }
    }
}

/// One student's submission record. `id` is the deterministic workflow
/// key, so a resubmission for the same tuple lands on the same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub subject: String,
    pub term: String,
    pub session: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_name: Option<String>,
}

/// Scope-level rollup of many students' workflow records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSummary {
    pub status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_date: Option<String>,
}
