use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::import::{self, ImportRequest};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn handle_import_run(state: &mut AppState, req: Request) -> serde_json::Value {
    let (Some(conn), Some(store)) = (state.db.as_ref(), state.store.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(bucket) = req.params.get("bucket").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.bucket", None);
    };
    let Some(key) = req.params.get("key").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.key", None);
    };
    let Some(school_id) = req.params.get("schoolId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.schoolId", None);
    };
    let status_id = req
        .params
        .get("statusId")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let error_report_key = req
        .params
        .get("errorReportKey")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let import_req = ImportRequest {
        school_id: school_id.to_string(),
        bucket: bucket.to_string(),
        key: key.to_string(),
        status_id,
        error_report_key,
    };

    // The record goes PROCESSING before any file or reference I/O so an
    // aborted job is visibly unfinished.
    if let Err(e) = import::claim_job(conn, &import_req) {
        return err(&req.id, "db_write_failed", e.to_string(), None);
    }

    tracing::info!(
        school_id = %import_req.school_id,
        bucket = %import_req.bucket,
        key = %import_req.key,
        status_id = %import_req.status_id,
        "import job started"
    );

    match import::run_import(conn, store, &mut state.refs, &import_req) {
        Ok(_) => match read_status(conn, &import_req.status_id) {
            Ok(Some(record)) => ok(&req.id, record),
            Ok(None) => err(&req.id, "not_found", "status record missing", None),
            Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => {
            // Infrastructure failure: the status record stays PROCESSING so
            // the caller can retry the whole file.
            tracing::warn!(status_id = %import_req.status_id, error = %e, "import job aborted");
            err(
                &req.id,
                "import_failed",
                e.to_string(),
                Some(json!({ "statusId": import_req.status_id })),
            )
        }
    }
}

fn handle_import_status(state: &mut AppState, req: Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(status_id) = req.params.get("statusId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.statusId", None);
    };

    match read_status(conn, status_id) {
        Ok(Some(record)) => ok(&req.id, record),
        Ok(None) => err(&req.id, "not_found", "no such import job", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn read_status(conn: &Connection, status_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let row = conn
        .query_row(
            "SELECT id, school_id, status, processed_lines, created, updated, skipped, errors,
                    error_report_key, processed_at
             FROM import_jobs WHERE id = ?",
            [status_id],
            |r| {
                Ok(json!({
                    "statusId": r.get::<_, String>(0)?,
                    "schoolId": r.get::<_, String>(1)?,
                    "status": r.get::<_, String>(2)?,
                    "processed": r.get::<_, i64>(3)?,
                    "created": r.get::<_, i64>(4)?,
                    "updated": r.get::<_, i64>(5)?,
                    "skipped": r.get::<_, i64>(6)?,
                    "errors": r.get::<_, i64>(7)?,
                    "errorReportKey": r.get::<_, Option<String>>(8)?,
                    "processedAt": r.get::<_, Option<String>>(9)?,
                }))
            },
        )
        .optional()?;
    Ok(row)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.run" => Some(handle_import_run(state, req.clone())),
        "import.status" => Some(handle_import_status(state, req.clone())),
        _ => None,
    }
}
