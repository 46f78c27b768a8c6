use rusqlite::Connection;
use uuid::Uuid;

use crate::db;
use crate::import::{ImportRequest, ImportSummary};
use crate::storage::FileStore;

pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_COMPLETED_WITH_ERRORS: &str = "COMPLETED_WITH_ERRORS";

/// One rejected input row, kept verbatim for the error report.
pub struct RowError {
    pub row_number: u32,
    pub raw: Vec<String>,
    pub reason: String,
}

impl RowError {
    pub fn new(row_number: u32, raw: &[String], reason: String) -> Self {
        Self {
            row_number,
            raw: raw.to_vec(),
            reason,
        }
    }
}

fn render_report(errors: &[RowError]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["rowNumber", "reason", "row"])?;
    for e in errors {
        writer.write_record([
            e.row_number.to_string(),
            e.reason.clone(),
            serde_json::to_string(&e.raw)?,
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush error report: {}", e))
}

/// Flush the outcome of a finished job: the error report (only when rows were
/// rejected), the status record, and one audit event.
pub fn finish_job(
    conn: &Connection,
    store: &FileStore,
    req: &ImportRequest,
    summary: &ImportSummary,
    errors: &[RowError],
) -> anyhow::Result<()> {
    let error_report_key = if errors.is_empty() {
        None
    } else {
        let key = req
            .error_report_key
            .clone()
            .unwrap_or_else(|| format!("imports/{}-errors.csv", req.status_id));
        store.put(&req.bucket, &key, &render_report(errors)?)?;
        Some(key)
    };

    let status = if errors.is_empty() {
        STATUS_COMPLETED
    } else {
        STATUS_COMPLETED_WITH_ERRORS
    };
    let processed_at = db::now_rfc3339();

    conn.execute(
        "UPDATE import_jobs SET status = ?, processed_lines = ?, created = ?, updated = ?,
           skipped = ?, errors = ?, error_report_key = ?, processed_at = ?
         WHERE id = ?",
        (
            status,
            summary.processed,
            summary.created,
            summary.updated,
            summary.skipped,
            summary.errors,
            error_report_key.as_deref(),
            &processed_at,
            &req.status_id,
        ),
    )?;

    let payload = serde_json::json!({
        "processed": summary.processed,
        "created": summary.created,
        "updated": summary.updated,
        "skipped": summary.skipped,
        "errors": summary.errors,
        "errorReportKey": error_report_key,
    });
    conn.execute(
        "INSERT INTO audit_events(id, school_id, action, entity_type, entity_id, payload, created_at)
         VALUES(?, ?, 'IMPORT_COMPLETED', 'ImportJob', ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &req.school_id,
            &req.status_id,
            payload.to_string(),
            &processed_at,
        ),
    )?;

    tracing::info!(
        status_id = %req.status_id,
        status,
        processed = summary.processed,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        errors = summary.errors,
        "import job finished"
    );
    Ok(())
}
