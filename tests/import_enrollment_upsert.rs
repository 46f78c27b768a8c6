mod test_support;

use serde_json::json;
use test_support::{
    group_id, put_object, request_ok, seed_default_refs, spawn_sidecar, temp_dir,
};

#[test]
fn reimport_against_a_different_class_updates_the_existing_enrollment() {
    let workspace = temp_dir("enrolld-enrollment-upsert");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seeded = seed_default_refs(&mut stdin, &mut reader, "school-1");

    put_object(
        &workspace,
        "uploads",
        "v1.csv",
        "admissionNo,firstName,lastName,parentPhone,class\nE001,Jane,Doe,08031234567,JSS1A\n",
    );
    // Same student, same (current) term, different class group.
    put_object(
        &workspace,
        "uploads",
        "v2.csv",
        "admissionNo,firstName,lastName,parentPhone,class\nE001,Jane,Doe,08031234567,JSS1B\n",
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "import.run",
        json!({ "bucket": "uploads", "key": "v1.csv", "schoolId": "school-1", "statusId": "job-1" }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "import.run",
        json!({ "bucket": "uploads", "key": "v2.csv", "schoolId": "school-1", "statusId": "job-2" }),
    );
    assert_eq!(second.get("created").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(second.get("updated").and_then(|v| v.as_i64()), Some(1));

    // Exactly one enrollment for the student+term, now pointing at JSS1B.
    let found = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.find",
        json!({ "schoolId": "school-1", "admissionNo": "E001" }),
    );
    let enrollments = found
        .get("enrollments")
        .and_then(|v| v.as_array())
        .expect("enrollments");
    assert_eq!(enrollments.len(), 1);
    assert_eq!(
        enrollments[0].get("classGroupId").and_then(|v| v.as_str()),
        Some(group_id(&seeded, "JSS1B").as_str())
    );
    assert_eq!(
        enrollments[0].get("status").and_then(|v| v.as_str()),
        Some("ENROLLED")
    );
}
