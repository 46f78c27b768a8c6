mod test_support;

use serde_json::json;
use test_support::{
    put_object, read_object, request_ok, seed_default_refs, spawn_sidecar, temp_dir,
};

#[test]
fn second_row_with_same_admission_is_rejected() {
    let workspace = temp_dir("enrolld-dup-admission");
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
         A001,Jane,Doe,08031234567,JSS1A\n\
         A001,Janet,Doe,08031234567,JSS1B\n",
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
            "statusId": "job-1",
            "errorReportKey": "reports/job-1.csv"
        }),
    );
    assert_eq!(
        result.get("status").and_then(|v| v.as_str()),
        Some("COMPLETED_WITH_ERRORS")
    );
    assert_eq!(result.get("processed").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(result.get("created").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(result.get("errors").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        result.get("errorReportKey").and_then(|v| v.as_str()),
        Some("reports/job-1.csv")
    );

    // Only the first row was processed.
    let found = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.find",
        json!({ "schoolId": "school-1", "admissionNo": "A001" }),
    );
    assert_eq!(
        found
            .get("student")
            .and_then(|s| s.get("firstName"))
            .and_then(|v| v.as_str()),
        Some("Jane")
    );

    // The caller-supplied key received the report; row 3 is the rejected one.
    let report = read_object(&workspace, "uploads", "reports/job-1.csv");
    let mut lines = report.lines();
    assert_eq!(lines.next(), Some("rowNumber,reason,row"));
    let line = lines.next().expect("one rejected row");
    assert!(line.starts_with("3,"));
    assert!(line.contains("Duplicate admission in file"));
    assert!(line.contains("Janet"));
    assert_eq!(lines.next(), None);
}
