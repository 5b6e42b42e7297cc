use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Gate, Request};
use crate::ledger::Ledger;
use crate::notify::TracingNotifier;
use crate::store::{SqliteGrantStore, SqliteWorkflowStore};
use crate::workflow::Workflow;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

// Change-event line for dashboard tails. Responses carry a request id,
// events carry an "event" field; both are single JSON lines on stdout.
fn emit_event<T: Serialize>(event: &str, records: &[T]) {
    if let Ok(line) = serde_json::to_string(&json!({ "event": event, "records": records })) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

fn open_gate(path: &Path) -> anyhow::Result<Gate> {
    // Each store gets its own connection; the schema setup is idempotent.
    let ledger = Ledger::new(SqliteGrantStore::new(db::open_db(path)?));
    let workflow = Workflow::new(
        SqliteWorkflowStore::new(db::open_db(path)?),
        Arc::new(TracingNotifier),
    );

    let ledger_events = ledger.subscribe(|records| emit_event("access.changed", records));
    let workflow_events = workflow.subscribe(|records| emit_event("approvals.changed", records));

    Ok(Gate {
        ledger,
        workflow,
        _ledger_events: ledger_events,
        _workflow_events: workflow_events,
    })
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_gate(&path) {
        Ok(gate) => {
            state.workspace = Some(path.clone());
            state.gate = Some(gate);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
