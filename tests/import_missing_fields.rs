mod test_support;

use serde_json::json;
use test_support::{
    put_object, read_object, request, request_ok, seed_default_refs, spawn_sidecar, temp_dir,
};

#[test]
fn row_missing_first_name_is_reported_and_skipped() {
    let workspace = temp_dir("enrolld-missing-fields");
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
         F001,,Doe,08031230001,JSS1A\n\
         F002,John,Okoro,08031230002,JSS1A\n",
    );

    let result = request_ok(
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
    assert_eq!(
        result.get("status").and_then(|v| v.as_str()),
        Some("COMPLETED_WITH_ERRORS")
    );
    assert_eq!(result.get("processed").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(result.get("created").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(result.get("errors").and_then(|v| v.as_i64()), Some(1));

    let report = read_object(&workspace, "uploads", "imports/job-1-errors.csv");
    assert!(report.contains("Missing required fields"));
    assert!(report.contains("firstName"));
    assert!(report.contains("F001"));

    // Nothing was written for the rejected row.
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "students.find",
        json!({ "schoolId": "school-1", "admissionNo": "F001" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn rows_accumulate_every_applicable_error() {
    let workspace = temp_dir("enrolld-error-accumulation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = seed_default_refs(&mut stdin, &mut reader, "school-1");

    // Missing last name AND an unknown class on the same row: the report
    // carries both reasons, not just the first.
    put_object(
        &workspace,
        "uploads",
        "students.csv",
        "admissionNo,firstName,lastName,parentPhone,class\nG001,Jane,,08031230001,JSS9Z\n",
    );

    let result = request_ok(
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
    assert_eq!(result.get("errors").and_then(|v| v.as_i64()), Some(1));

    let report = read_object(&workspace, "uploads", "imports/job-1-errors.csv");
    let data_line = report.lines().nth(1).expect("rejected row");
    assert!(data_line.contains("Missing required fields: lastName"));
    assert!(data_line.contains("Unknown class group: JSS9Z"));
}
