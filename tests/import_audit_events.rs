mod test_support;

use serde_json::json;
use test_support::{put_object, request_ok, seed_default_refs, spawn_sidecar, temp_dir};

#[test]
fn each_completed_job_appends_exactly_one_audit_event() {
    let workspace = temp_dir("enrolld-audit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = seed_default_refs(&mut stdin, &mut reader, "school-1");

    put_object(
        &workspace,
        "uploads",
        "students.csv",
        "admissionNo,firstName,lastName,parentPhone,class\n\
         H001,Jane,Doe,08031230001,JSS1A\n\
         H001,Janet,Doe,08031230001,JSS1A\n",
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "import.run",
        json!({
            "bucket": "uploads",
            "key": "students.csv",
            "schoolId": "school-1",
            "statusId": "job-1"
        }),
    );

    // Inspect the audit trail directly in the workspace database.
    let conn = rusqlite::Connection::open(workspace.join("enroll.sqlite3")).expect("open db");
    let (action, entity_type, payload): (String, String, String) = conn
        .query_row(
            "SELECT action, entity_type, payload FROM audit_events WHERE entity_id = ?",
            ["job-1"],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .expect("one audit event");
    assert_eq!(action, "IMPORT_COMPLETED");
    assert_eq!(entity_type, "ImportJob");

    let payload: serde_json::Value = serde_json::from_str(&payload).expect("payload json");
    assert_eq!(payload.get("processed").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(payload.get("created").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(payload.get("errors").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        payload.get("errorReportKey").and_then(|v| v.as_str()),
        Some("imports/job-1-errors.csv")
    );

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM audit_events WHERE entity_id = ?",
            ["job-1"],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(count, 1);
}
