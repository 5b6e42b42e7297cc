use std::path::PathBuf;

use serde::Deserialize;

use crate::broadcast::Subscription;
use crate::ledger::Ledger;
use crate::records::{AccessGrant, WorkflowRecord};
use crate::store::{SqliteGrantStore, SqliteWorkflowStore};
use crate::workflow::Workflow;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The gate services for the selected workspace, plus the change-event
/// subscriptions that mirror every mutation onto stdout.
pub struct Gate {
    pub ledger: Ledger<SqliteGrantStore>,
    pub workflow: Workflow<SqliteWorkflowStore>,
    pub _ledger_events: Subscription<AccessGrant>,
    pub _workflow_events: Subscription<WorkflowRecord>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub gate: Option<Gate>,
}
