use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Gate, Request};
use crate::records::GrantSource;
use serde_json::json;

fn gate<'a>(state: &'a AppState, req: &Request) -> Result<&'a Gate, serde_json::Value> {
    state
        .gate
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

// Empty and absent both flow through as "" so the ledger's guard clauses
// decide what happens; only wrong JSON types are rejected here.
fn str_param(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(String::new()),
        Some(v) if v.is_null() => Ok(String::new()),
        Some(v) => v
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a string", key), None)),
    }
}

fn handle_grant(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let parent_id = match str_param(req, "parentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match str_param(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session = match str_param(req, "session") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let granted_by = match str_param(req, "grantedBy") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(granted_by) = GrantSource::parse(&granted_by) else {
        return err(
            &req.id,
            "bad_params",
            "grantedBy must be one of: payment, manual",
            Some(json!({ "grantedBy": granted_by })),
        );
    };

    let records = gate
        .ledger
        .grant(&parent_id, &student_id, &term, &session, granted_by);
    ok(&req.id, json!({ "records": records }))
}

fn handle_revoke(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let parent_id = match str_param(req, "parentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match str_param(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session = match str_param(req, "session") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let records = gate.ledger.revoke(&parent_id, &student_id, &term, &session);
    ok(&req.id, json!({ "records": records }))
}

fn handle_sync(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let term = match str_param(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session = match str_param(req, "session") {
        Ok(v) => v,
        Err(e) => return e,
    };

    ok(&req.id, json!({ "records": gate.ledger.sync(&term, &session) }))
}

fn handle_check(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let parent_id = match str_param(req, "parentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match str_param(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session = match str_param(req, "session") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let check = gate
        .ledger
        .has_access(&parent_id, &student_id, &term, &session);
    ok(&req.id, json!(check))
}

fn handle_clear_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    gate.ledger.clear_all();
    ok(&req.id, json!({ "records": [] }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "access.grant" => Some(handle_grant(state, req)),
        "access.revoke" => Some(handle_revoke(state, req)),
        "access.sync" => Some(handle_sync(state, req)),
        "access.check" => Some(handle_check(state, req)),
        "access.clearAll" => Some(handle_clear_all(state, req)),
        _ => None,
    }
}
