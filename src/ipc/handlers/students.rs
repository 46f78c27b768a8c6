use rusqlite::OptionalExtension;
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

/// Read back one student with its guardians and enrollments. Portal support;
/// the importer itself never reads through here.
fn handle_students_find(state: &mut AppState, req: Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(school_id) = req.params.get("schoolId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.schoolId", None);
    };
    let Some(admission_no) = req.params.get("admissionNo").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.admissionNo", None);
    };

    let student: Option<(String, String, String, String, Option<String>)> = match conn
        .query_row(
            "SELECT id, admission_no, first_name, last_name, status FROM students
             WHERE school_id = ? AND admission_no = ?",
            (school_id, admission_no),
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                ))
            },
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((student_id, admission_no, first_name, last_name, status)) = student else {
        return err(&req.id, "not_found", "student not found", None);
    };

    let mut guard_stmt = match conn.prepare(
        "SELECT g.id, g.full_name, g.phone, g.email, l.relationship, l.is_primary
         FROM student_guardian_links l
         JOIN guardians g ON g.id = l.guardian_id
         WHERE l.student_id = ?",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let guardians: Vec<serde_json::Value> = match guard_stmt
        .query_map([&student_id], |r| {
            let id: String = r.get(0)?;
            let full_name: String = r.get(1)?;
            let phone: Option<String> = r.get(2)?;
            let email: Option<String> = r.get(3)?;
            let relationship: String = r.get(4)?;
            let is_primary: i64 = r.get(5)?;
            Ok(json!({
                "id": id,
                "fullName": full_name,
                "phone": phone,
                "email": email,
                "relationship": relationship,
                "isPrimary": is_primary != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut enroll_stmt = match conn.prepare(
        "SELECT id, term_id, class_group_id, session_id, status FROM enrollments
         WHERE student_id = ?",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let enrollments: Vec<serde_json::Value> = match enroll_stmt
        .query_map([&student_id], |r| {
            let id: String = r.get(0)?;
            let term_id: String = r.get(1)?;
            let class_group_id: String = r.get(2)?;
            let session_id: String = r.get(3)?;
            let status: String = r.get(4)?;
            Ok(json!({
                "id": id,
                "termId": term_id,
                "classGroupId": class_group_id,
                "sessionId": session_id,
                "status": status
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "student": {
                "id": student_id,
                "admissionNo": admission_no,
                "firstName": first_name,
                "lastName": last_name,
                "status": status
            },
            "guardians": guardians,
            "enrollments": enrollments
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.find" => Some(handle_students_find(state, req.clone())),
        _ => None,
    }
}
