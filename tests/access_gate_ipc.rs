use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_reportgated");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reportgated");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

// Reads lines until the response with the matching id arrives, collecting
// any change-event lines emitted along the way.
fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> (serde_json::Value, Vec<serde_json::Value>) {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut events = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        if value.get("event").is_some() {
            events.push(value);
            continue;
        }
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
        return (value, events);
    }
}

fn result(value: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok response, got {}",
        value
    );
    value.get("result").expect("result")
}

fn records(value: &serde_json::Value) -> Vec<serde_json::Value> {
    result(value)
        .get("records")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("records array")
}

#[test]
fn grant_override_revoke_flow_over_ipc() {
    let workspace = temp_dir("reportgated-access");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let (resp, _) = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(result(&resp).get("version").is_some());

    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    result(&resp);

    let (resp, events) = request(
        &mut stdin,
        &mut reader,
        "3",
        "access.grant",
        json!({
            "parentId": "P1",
            "studentId": "S1",
            "term": "First Term",
            "session": "2024/2025",
            "grantedBy": "payment"
        }),
    );
    let view = records(&resp);
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].get("grantedBy").and_then(|v| v.as_str()), Some("payment"));
    assert_eq!(
        events[0].get("event").and_then(|v| v.as_str()),
        Some("access.changed")
    );

    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "4",
        "access.check",
        json!({
            "parentId": "P1",
            "studentId": "S1",
            "term": "First Term",
            "session": "2024/2025"
        }),
    );
    assert_eq!(result(&resp).get("granted").and_then(|v| v.as_bool()), Some(true));

    // Different term casing, same key: the manual grant replaces payment.
    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "5",
        "access.grant",
        json!({
            "parentId": "P1",
            "studentId": "S1",
            "term": "first term",
            "session": "2024/2025",
            "grantedBy": "manual"
        }),
    );
    let view = records(&resp);
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].get("grantedBy").and_then(|v| v.as_str()), Some("manual"));

    // Second term grant stays independent of the first-term revoke below.
    let (_, _) = request(
        &mut stdin,
        &mut reader,
        "6",
        "access.grant",
        json!({
            "parentId": "P1",
            "studentId": "S1",
            "term": "Second Term",
            "session": "2024/2025",
            "grantedBy": "payment"
        }),
    );

    let (resp, events) = request(
        &mut stdin,
        &mut reader,
        "7",
        "access.revoke",
        json!({
            "parentId": "P1",
            "studentId": "S1",
            "term": "First Term",
            "session": "2024/2025"
        }),
    );
    assert!(records(&resp).is_empty());
    assert_eq!(events.len(), 1);

    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "8",
        "access.check",
        json!({
            "parentId": "P1",
            "studentId": "S1",
            "term": "First Term",
            "session": "2024/2025"
        }),
    );
    assert_eq!(result(&resp).get("granted").and_then(|v| v.as_bool()), Some(false));

    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "9",
        "access.sync",
        json!({ "term": "2nd term", "session": "2024/2025" }),
    );
    assert_eq!(records(&resp).len(), 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn guarded_grant_emits_no_change_event() {
    let workspace = temp_dir("reportgated-access-guard");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    result(&resp);

    let (resp, events) = request(
        &mut stdin,
        &mut reader,
        "2",
        "access.grant",
        json!({
            "parentId": "",
            "studentId": "S1",
            "term": "First Term",
            "session": "2024/2025",
            "grantedBy": "manual"
        }),
    );
    assert!(records(&resp).is_empty());
    assert!(events.is_empty(), "guard clause must not broadcast");

    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "3",
        "access.grant",
        json!({
            "parentId": "P1",
            "studentId": "S1",
            "term": "First Term",
            "session": "2024/2025",
            "grantedBy": "voucher"
        }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn grants_survive_a_daemon_restart() {
    let workspace = temp_dir("reportgated-access-restart");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    result(&resp);
    let (_, _) = request(
        &mut stdin,
        &mut reader,
        "2",
        "access.grant",
        json!({
            "parentId": "P1",
            "studentId": "S1",
            "term": "1st term",
            "session": "2024/2025",
            "grantedBy": "payment"
        }),
    );
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    result(&resp);
    let (resp, _) = request(
        &mut stdin,
        &mut reader,
        "2",
        "access.check",
        json!({
            "parentId": "P1",
            "studentId": "S1",
            "term": "First Term",
            "session": "2024/2025"
        }),
    );
    assert_eq!(result(&resp).get("granted").and_then(|v| v.as_bool()), Some(true));
    // The grant was stored under the canonical label.
    assert_eq!(
        result(&resp)
            .get("record")
            .and_then(|r| r.get("term"))
            .and_then(|v| v.as_str()),
        Some("First Term")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
