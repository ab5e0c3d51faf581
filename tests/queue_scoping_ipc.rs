use chrono::{Duration, Local};
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
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = send(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = send(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

fn queue_student_ids(result: &serde_json::Value) -> Vec<String> {
    result
        .get("requests")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.get("studentId").and_then(|v| v.as_str()).map(String::from))
        .collect()
}

fn admin() -> serde_json::Value {
    json!({ "id": "admin1", "role": "administrator", "departments": [] })
}

fn seed_and_submit(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-students",
        "roster.upsertStudents",
        json!({
            "actor": admin(),
            "students": [
                { "id": "s1", "department": "CSE", "enrollmentYear": 2023, "section": "A" },
                { "id": "s3", "department": "ECE", "enrollmentYear": 2023, "section": "B" }
            ]
        }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-courses",
        "roster.upsertCourses",
        json!({
            "actor": admin(),
            "courses": [
                { "code": "MATH301", "name": "engineering mathematics", "department": "CSE",
                  "year": 2023, "weeklyContactHours": 5, "instructorId": "f1" },
                { "code": "ECE204", "name": "signals and systems", "department": "ECE",
                  "year": 2023, "weeklyContactHours": 4, "instructorId": "f2" }
            ]
        }),
    );

    let from = Local::now().date_naive() + Duration::days(1);
    for (sid, rid) in [("s1", "submit-s1"), ("s3", "submit-s3")] {
        let _ = request_ok(
            stdin,
            reader,
            rid,
            "leave.submit",
            json!({
                "actor": { "id": sid, "role": "student", "departments": [] },
                "studentId": sid,
                "fromDate": from.to_string(),
                "toDate": (from + Duration::days(1)).to_string(),
                "reason": "attending a family function"
            }),
        );
    }
}

#[test]
fn faculty_queue_is_department_scoped() {
    let workspace = temp_dir("campusd-queue-faculty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_and_submit(&mut stdin, &mut reader, &workspace);

    let cse = request_ok(
        &mut stdin,
        &mut reader,
        "q-cse",
        "leave.facultyQueue",
        json!({ "actor": { "id": "f1", "role": "faculty", "departments": ["CSE"] } }),
    );
    assert_eq!(queue_student_ids(&cse), vec!["s1".to_string()]);

    let ece = request_ok(
        &mut stdin,
        &mut reader,
        "q-ece",
        "leave.facultyQueue",
        json!({ "actor": { "id": "f2", "role": "faculty", "departments": ["ECE"] } }),
    );
    assert_eq!(queue_student_ids(&ece), vec!["s3".to_string()]);
}

#[test]
fn queues_are_role_gated() {
    let workspace = temp_dir("campusd-queue-roles");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_and_submit(&mut stdin, &mut reader, &workspace);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "student-q",
        "leave.facultyQueue",
        json!({ "actor": { "id": "s1", "role": "student", "departments": [] } }),
    );
    assert_eq!(code, "forbidden");

    // Administrators have no approval stage, so no queue either.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "admin-q",
        "leave.facultyQueue",
        json!({ "actor": admin() }),
    );
    assert_eq!(code, "forbidden");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "faculty-hod-q",
        "leave.hodQueue",
        json!({ "actor": { "id": "f1", "role": "faculty", "departments": ["CSE"] } }),
    );
    assert_eq!(code, "forbidden");
}

#[test]
fn hod_queue_holds_only_faculty_approved_requests() {
    let workspace = temp_dir("campusd-queue-hod");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_and_submit(&mut stdin, &mut reader, &workspace);

    // Nothing is HOD-ready yet.
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "hod-empty",
        "leave.hodQueue",
        json!({ "actor": { "id": "h1", "role": "hod", "departments": ["CSE"] } }),
    );
    assert!(queue_student_ids(&empty).is_empty());

    let cse = request_ok(
        &mut stdin,
        &mut reader,
        "q-cse",
        "leave.facultyQueue",
        json!({ "actor": { "id": "f1", "role": "faculty", "departments": ["CSE"] } }),
    );
    let request_id = cse
        .get("requests")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|r| r.get("id"))
        .and_then(|v| v.as_str())
        .expect("queued request id")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "approve",
        "leave.facultyDecide",
        json!({
            "actor": { "id": "f1", "role": "faculty", "departments": ["CSE"] },
            "requestId": request_id,
            "approve": true
        }),
    );

    // The request moved from the faculty queue to the CSE HOD queue.
    let cse_after = request_ok(
        &mut stdin,
        &mut reader,
        "q-cse-after",
        "leave.facultyQueue",
        json!({ "actor": { "id": "f1", "role": "faculty", "departments": ["CSE"] } }),
    );
    assert!(queue_student_ids(&cse_after).is_empty());

    let hod_cse = request_ok(
        &mut stdin,
        &mut reader,
        "hod-cse",
        "leave.hodQueue",
        json!({ "actor": { "id": "h1", "role": "hod", "departments": ["CSE"] } }),
    );
    assert_eq!(queue_student_ids(&hod_cse), vec!["s1".to_string()]);

    let hod_ece = request_ok(
        &mut stdin,
        &mut reader,
        "hod-ece",
        "leave.hodQueue",
        json!({ "actor": { "id": "h2", "role": "hod", "departments": ["ECE"] } }),
    );
    assert!(queue_student_ids(&hod_ece).is_empty());
}

#[test]
fn listing_a_students_requests_follows_read_scope() {
    let workspace = temp_dir("campusd-queue-listing");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_and_submit(&mut stdin, &mut reader, &workspace);

    // The principal reads across departments.
    let listing = request_ok(
        &mut stdin,
        &mut reader,
        "principal-list",
        "leave.listForStudent",
        json!({
            "actor": { "id": "p1", "role": "principal", "departments": [] },
            "studentId": "s3"
        }),
    );
    assert_eq!(
        listing
            .get("requests")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    // One student cannot read another's history.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "cross-list",
        "leave.listForStudent",
        json!({
            "actor": { "id": "s1", "role": "student", "departments": [] },
            "studentId": "s3"
        }),
    );
    assert_eq!(code, "forbidden");
}
