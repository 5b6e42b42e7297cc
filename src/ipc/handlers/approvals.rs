use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Gate, Request};
use crate::records::ApprovalStatus;
use crate::workflow::{summarize, StatusChange, StudentRef};
use serde_json::json;

fn gate<'a>(state: &'a AppState, req: &Request) -> Result<&'a Gate, serde_json::Value> {
    state
        .gate
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

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

fn opt_param(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty())
}

struct Scope {
    class_name: String,
    subject: String,
    term: String,
    session: String,
}

fn scope_params(req: &Request) -> Result<Scope, serde_json::Value> {
    Ok(Scope {
        class_name: str_param(req, "className")?,
        subject: str_param(req, "subject")?,
        term: str_param(req, "term")?,
        session: str_param(req, "session")?,
    })
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let teacher_id = match str_param(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_name = match str_param(req, "teacherName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scope = match scope_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let students: Vec<StudentRef> = match req.params.get("students") {
        None => Vec::new(),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(list) => list,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("students: {}", e),
                    None,
                )
            }
        },
    };

    let records = gate.workflow.submit_for_approval(
        &teacher_id,
        &teacher_name,
        &scope.class_name,
        &scope.subject,
        &scope.term,
        &scope.session,
        &students,
    );
    ok(&req.id, json!({ "records": records }))
}

fn handle_update_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scope = match scope_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = match str_param(req, "status") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(status) = ApprovalStatus::parse(&status) else {
        return err(
            &req.id,
            "bad_params",
            "status must be one of: draft, pending, approved, revoked",
            Some(json!({ "status": status })),
        );
    };
    let admin_id = opt_param(req, "adminId");
    let admin_name = opt_param(req, "adminName");
    let feedback = opt_param(req, "feedback");

    let records = gate.workflow.update_status(
        &student_id,
        &scope.class_name,
        &scope.subject,
        &scope.term,
        &scope.session,
        StatusChange {
            status,
            admin_id: admin_id.as_deref(),
            admin_name: admin_name.as_deref(),
            feedback: feedback.as_deref(),
        },
    );
    ok(&req.id, json!({ "records": records }))
}

fn handle_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let teacher_id = match str_param(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scope = match scope_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let records = gate.workflow.reset_submission(
        &teacher_id,
        &scope.class_name,
        &scope.subject,
        &scope.term,
        &scope.session,
    );
    ok(&req.id, json!({ "records": records }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let scope = match scope_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = opt_param(req, "teacherId");

    let records = gate.workflow.scope_records(
        &scope.class_name,
        &scope.subject,
        &scope.term,
        &scope.session,
        teacher_id.as_deref(),
    );
    ok(&req.id, json!({ "records": records }))
}

fn handle_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let scope = match scope_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = opt_param(req, "teacherId");

    let records = gate.workflow.scope_records(
        &scope.class_name,
        &scope.subject,
        &scope.term,
        &scope.session,
        teacher_id.as_deref(),
    );
    ok(&req.id, json!(summarize(&records)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "approvals.submit" => Some(handle_submit(state, req)),
        "approvals.updateStatus" => Some(handle_update_status(state, req)),
        "approvals.reset" => Some(handle_reset(state, req)),
        "approvals.list" => Some(handle_list(state, req)),
        "approvals.summary" => Some(handle_summary(state, req)),
        _ => None,
    }
}
