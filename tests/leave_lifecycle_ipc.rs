use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
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

fn request_ok(
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn admin() -> serde_json::Value {
    json!({ "id": "admin1", "role": "administrator", "departments": [] })
}

fn seed_campus(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) {
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
                { "id": "s2", "department": "CSE", "enrollmentYear": 2023, "section": "A" },
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
                { "code": "PHY102", "name": "applied physics", "department": "CSE",
                  "year": 2023, "weeklyContactHours": 3, "instructorId": "f1" },
                { "code": "ECE204", "name": "signals and systems", "department": "ECE",
                  "year": 2023, "weeklyContactHours": 4, "instructorId": "f2" }
            ]
        }),
    );
}

/// First occurrence of `weekday` strictly after today, so fromDate always
/// passes the not-in-the-past rule.
fn upcoming(weekday: Weekday) -> NaiveDate {
    let mut d = Local::now().date_naive() + Duration::days(1);
    while d.weekday() != weekday {
        d += Duration::days(1);
    }
    d
}

#[test]
fn leave_flows_faculty_then_hod_and_materializes_attendance() {
    let workspace = temp_dir("campusd-leave-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_campus(&mut stdin, &mut reader, &workspace);

    // Monday through Wednesday: three instructional days, no Sunday inside.
    let from = upcoming(Weekday::Mon);
    let to = from + Duration::days(2);

    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "submit",
        "leave.submit",
        json!({
            "actor": { "id": "s1", "role": "student", "departments": [] },
            "studentId": "s1",
            "fromDate": from.to_string(),
            "toDate": to.to_string(),
            "reason": "attending a family wedding out of town"
        }),
    );
    let request_id = submitted
        .get("id")
        .and_then(|v| v.as_str())
        .expect("request id")
        .to_string();
    assert_eq!(
        submitted.get("facultyApproval").and_then(|v| v.as_str()),
        Some("pending")
    );
    assert_eq!(
        submitted.get("finalStatus").and_then(|v| v.as_str()),
        Some("pending")
    );

    let after_faculty = request_ok(
        &mut stdin,
        &mut reader,
        "faculty",
        "leave.facultyDecide",
        json!({
            "actor": { "id": "f1", "role": "faculty", "departments": ["CSE"] },
            "requestId": request_id,
            "approve": true
        }),
    );
    assert_eq!(
        after_faculty.get("facultyApproval").and_then(|v| v.as_str()),
        Some("approved")
    );
    assert_eq!(
        after_faculty.get("facultyDecidedBy").and_then(|v| v.as_str()),
        Some("f1")
    );
    // Still pending overall until the department head signs off.
    assert_eq!(
        after_faculty.get("finalStatus").and_then(|v| v.as_str()),
        Some("pending")
    );

    let after_hod = request_ok(
        &mut stdin,
        &mut reader,
        "hod",
        "leave.hodDecide",
        json!({
            "actor": { "id": "h1", "role": "hod", "departments": ["CSE"] },
            "requestId": request_id,
            "approve": true
        }),
    );
    assert_eq!(
        after_hod.get("hodApproval").and_then(|v| v.as_str()),
        Some("approved")
    );
    assert_eq!(
        after_hod.get("hodDecidedBy").and_then(|v| v.as_str()),
        Some("h1")
    );
    assert_eq!(
        after_hod.get("finalStatus").and_then(|v| v.as_str()),
        Some("approved")
    );

    // 3 days x (5 + 3) weekly contact hours across both CSE courses, all
    // recorded as leave, which counts as attended.
    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "stats",
        "attendance.studentStats",
        json!({
            "actor": { "id": "s1", "role": "student", "departments": [] },
            "studentId": "s1"
        }),
    );
    assert_eq!(stats.get("totalClasses").and_then(|v| v.as_u64()), Some(24));
    assert_eq!(stats.get("leaveClasses").and_then(|v| v.as_u64()), Some(24));
    assert_eq!(
        stats.get("attendancePercentage").and_then(|v| v.as_u64()),
        Some(100)
    );
    assert_eq!(stats.get("atRisk").and_then(|v| v.as_bool()), Some(false));

    let listing = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "leave.listForStudent",
        json!({
            "actor": { "id": "s1", "role": "student", "departments": [] },
            "studentId": "s1"
        }),
    );
    let requests = listing
        .get("requests")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].get("finalStatus").and_then(|v| v.as_str()),
        Some("approved")
    );
}

#[test]
fn faculty_denial_is_final_without_hod_involvement() {
    let workspace = temp_dir("campusd-leave-denial");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_campus(&mut stdin, &mut reader, &workspace);

    let from = upcoming(Weekday::Tue);
    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "submit",
        "leave.submit",
        json!({
            "actor": { "id": "s3", "role": "student", "departments": [] },
            "studentId": "s3",
            "fromDate": from.to_string(),
            "toDate": (from + Duration::days(1)).to_string(),
            "reason": "medical appointment in the city"
        }),
    );
    let request_id = submitted
        .get("id")
        .and_then(|v| v.as_str())
        .expect("request id")
        .to_string();

    let denied = request_ok(
        &mut stdin,
        &mut reader,
        "deny",
        "leave.facultyDecide",
        json!({
            "actor": { "id": "f2", "role": "faculty", "departments": ["ECE"] },
            "requestId": request_id,
            "approve": false
        }),
    );
    assert_eq!(
        denied.get("facultyApproval").and_then(|v| v.as_str()),
        Some("denied")
    );
    assert_eq!(
        denied.get("hodApproval").and_then(|v| v.as_str()),
        Some("pending")
    );
    assert_eq!(
        denied.get("finalStatus").and_then(|v| v.as_str()),
        Some("denied")
    );

    // No attendance was materialized for the denied window.
    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "stats",
        "attendance.studentStats",
        json!({
            "actor": { "id": "s3", "role": "student", "departments": [] },
            "studentId": "s3"
        }),
    );
    assert_eq!(stats.get("totalClasses").and_then(|v| v.as_u64()), Some(0));
}
