//! Dispatch contract for human-readable change notices.
//!
//! The gate only assembles notices; delivery (in-app inbox, email, SMS) is
//! someone else's problem. Callers treat `notify` as fire-and-forget: a
//! failure is logged at warn level and swallowed, never surfaced to the
//! mutation that triggered it.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    SuperAdmin,
    Teacher,
    Parent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub title: String,
    pub message: String,
    pub audience: Vec<Role>,
    pub category: String,
    pub kind: NoticeKind,
    pub metadata: serde_json::Value,
}

impl Notice {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        audience: Vec<Role>,
        category: impl Into<String>,
        kind: NoticeKind,
        metadata: serde_json::Value,
    ) -> Self {
        Notice {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            message: message.into(),
            audience,
            category: category.into(),
            kind,
            metadata,
        }
    }
}

pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, notice: Notice) -> anyhow::Result<()>;
}

/// Daemon default: the notice goes to the log stream and a real delivery
/// backend can be swapped in by the host.
pub struct TracingNotifier;

impl ChangeNotifier for TracingNotifier {
    fn notify(&self, notice: Notice) -> anyhow::Result<()> {
        tracing::info!(
            id = %notice.id,
            category = %notice.category,
            audience = ?notice.audience,
            kind = ?notice.kind,
            "{}: {}",
            notice.title,
            notice.message
        );
        Ok(())
    }
}

/// Swallows every notice. Used where no delivery channel is wired up.
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn notify(&self, _notice: Notice) -> anyhow::Result<()> {
        Ok(())
    }
}
