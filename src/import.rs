use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::db;
use crate::headers::HeaderMap;
use crate::refdata::{self, RefCache};
use crate::report::{self, RowError};
use crate::resolve::{self, ResolvedRow};
use crate::storage::FileStore;
use crate::tabular;

pub const STATUS_PROCESSING: &str = "PROCESSING";
const STATUS_ACTIVE: &str = "ACTIVE";
const STATUS_ENROLLED: &str = "ENROLLED";
const RELATIONSHIP_GUARDIAN: &str = "guardian";

#[derive(Clone, Copy, Debug, Default)]
pub struct ImportSummary {
    pub processed: u32,
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
}

pub struct ImportRequest {
    pub school_id: String,
    pub bucket: String,
    pub key: String,
    pub status_id: String,
    pub error_report_key: Option<String>,
}

enum RowOutcome {
    Created,
    Updated,
    Skipped,
}

/// Mark the status record PROCESSING before any I/O happens, creating it when
/// the upload path did not. A crash mid-job leaves it in this state for the
/// host to retry.
pub fn claim_job(conn: &Connection, req: &ImportRequest) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO import_jobs(id, school_id, status, source_bucket, source_key, created_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           status = excluded.status,
           school_id = excluded.school_id,
           source_bucket = excluded.source_bucket,
           source_key = excluded.source_key",
        (
            &req.status_id,
            &req.school_id,
            STATUS_PROCESSING,
            &req.bucket,
            &req.key,
            db::now_rfc3339(),
        ),
    )?;
    Ok(())
}

/// Run one import job to completion: parse, resolve and upsert every data row,
/// then flush the completion report. Row-level validation failures are
/// recorded and skipped; any error returned from here is infrastructural and
/// leaves the status record PROCESSING.
pub fn run_import(
    conn: &Connection,
    store: &FileStore,
    refs_cache: &mut RefCache,
    req: &ImportRequest,
) -> anyhow::Result<ImportSummary> {
    let text = store.get_text(&req.bucket, &req.key)?;
    let rows = tabular::parse_rows(&text)?;

    let mut summary = ImportSummary::default();
    let mut rejected: Vec<RowError> = Vec::new();

    if let Some((header, data)) = rows.split_first() {
        let headers = HeaderMap::resolve(header);
        let refs =
            refs_cache.get_or_load(&req.school_id, || refdata::load_bundle(conn, &req.school_id))?;
        let mut engine = UpsertEngine::new(conn, &req.school_id);

        for (idx, cells) in data.iter().enumerate() {
            // Row 1 is the header; the first data row is row 2.
            let row_number = (idx + 2) as u32;
            summary.processed += 1;

            let resolved = match resolve::resolve_row(&headers, cells, &refs) {
                Ok(v) => v,
                Err(reasons) => {
                    let reason = reasons.join("; ");
                    tracing::debug!(row = row_number, %reason, "row rejected");
                    summary.errors += 1;
                    rejected.push(RowError::new(row_number, cells, reason));
                    continue;
                }
            };

            if !engine.claim_admission(&resolved.admission_no) {
                summary.errors += 1;
                rejected.push(RowError::new(
                    row_number,
                    cells,
                    "Duplicate admission in file".to_string(),
                ));
                continue;
            }

            match engine.apply(&resolved)? {
                RowOutcome::Created => summary.created += 1,
                RowOutcome::Updated => summary.updated += 1,
                RowOutcome::Skipped => summary.skipped += 1,
            }
        }
    }

    report::finish_job(conn, store, req, &summary, &rejected)?;
    Ok(summary)
}

/// Write side of the import plus the per-job dedup state. Rows are applied
/// sequentially; the maps are single-job state and must not be shared across
/// jobs.
struct UpsertEngine<'a> {
    conn: &'a Connection,
    school_id: &'a str,
    seen_admissions: HashSet<String>,
    guardians_by_phone: HashMap<String, String>,
    guardians_by_email: HashMap<String, String>,
}

impl<'a> UpsertEngine<'a> {
    fn new(conn: &'a Connection, school_id: &'a str) -> Self {
        Self {
            conn,
            school_id,
            seen_admissions: HashSet::new(),
            guardians_by_phone: HashMap::new(),
            guardians_by_email: HashMap::new(),
        }
    }

    /// False when this admission number already appeared earlier in the file.
    fn claim_admission(&mut self, admission_no: &str) -> bool {
        self.seen_admissions.insert(admission_no.to_string())
    }

    fn apply(&mut self, row: &ResolvedRow) -> anyhow::Result<RowOutcome> {
        let (student_id, student_created, student_changed) = self.upsert_student(row)?;
        let (guardian_id, guardian_changed) = self.resolve_guardian(row)?;
        let link_changed = self.upsert_link(&student_id, &guardian_id)?;
        let enrollment_changed = self.upsert_enrollment(&student_id, row)?;

        if student_created {
            Ok(RowOutcome::Created)
        } else if student_changed || guardian_changed || link_changed || enrollment_changed {
            Ok(RowOutcome::Updated)
        } else {
            Ok(RowOutcome::Skipped)
        }
    }

    fn upsert_student(&self, row: &ResolvedRow) -> anyhow::Result<(String, bool, bool)> {
        let existing: Option<(String, String, String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT id, first_name, last_name, status FROM students
                 WHERE school_id = ? AND admission_no = ?",
                (self.school_id, &row.admission_no),
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;

        if let Some((id, first, last, status)) = existing {
            let mut changed = false;
            if first != row.first_name || last != row.last_name {
                self.conn.execute(
                    "UPDATE students SET first_name = ?, last_name = ?, updated_at = ? WHERE id = ?",
                    (&row.first_name, &row.last_name, db::now_rfc3339(), &id),
                )?;
                changed = true;
            }
            if status.map_or(true, |s| s.is_empty()) {
                self.conn.execute(
                    "UPDATE students SET status = ?, updated_at = ? WHERE id = ?",
                    (STATUS_ACTIVE, db::now_rfc3339(), &id),
                )?;
                changed = true;
            }
            return Ok((id, false, changed));
        }

        // Conditional create: a concurrent job may land the same admission
        // number first; re-read instead of failing.
        let id = Uuid::new_v4().to_string();
        let now = db::now_rfc3339();
        self.conn.execute(
            "INSERT INTO students(id, school_id, admission_no, first_name, last_name, status, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(school_id, admission_no) DO NOTHING",
            (
                &id,
                self.school_id,
                &row.admission_no,
                &row.first_name,
                &row.last_name,
                STATUS_ACTIVE,
                &now,
                &now,
            ),
        )?;
        let found: String = self.conn.query_row(
            "SELECT id FROM students WHERE school_id = ? AND admission_no = ?",
            (self.school_id, &row.admission_no),
            |r| r.get(0),
        )?;
        let created = found == id;
        Ok((found, created, false))
    }

    fn resolve_guardian(&mut self, row: &ResolvedRow) -> anyhow::Result<(String, bool)> {
        let phone = row.parent_phone.as_deref();
        let email = row.parent_email.as_deref();

        // In-job maps first, then the persisted lookups; first hit wins.
        let mut found: Option<String> = phone
            .and_then(|p| self.guardians_by_phone.get(p).cloned())
            .or_else(|| email.and_then(|e| self.guardians_by_email.get(e).cloned()));

        if found.is_none() {
            if let Some(p) = phone {
                found = self
                    .conn
                    .query_row(
                        "SELECT id FROM guardians WHERE school_id = ? AND phone = ?",
                        (self.school_id, p),
                        |r| r.get(0),
                    )
                    .optional()?;
            }
        }
        if found.is_none() {
            if let Some(e) = email {
                found = self
                    .conn
                    .query_row(
                        "SELECT id FROM guardians WHERE school_id = ? AND email = ?",
                        (self.school_id, e),
                        |r| r.get(0),
                    )
                    .optional()?;
            }
        }

        let (id, changed) = match found {
            Some(id) => {
                let changed = self.refresh_guardian(&id, row)?;
                (id, changed)
            }
            None => (self.create_guardian(row)?, true),
        };

        // Cache under both identifiers so later rows converge by either one.
        if let Some(p) = phone {
            self.guardians_by_phone.insert(p.to_string(), id.clone());
        }
        if let Some(e) = email {
            self.guardians_by_email.insert(e.to_string(), id.clone());
        }
        Ok((id, changed))
    }

    fn refresh_guardian(&self, id: &str, row: &ResolvedRow) -> anyhow::Result<bool> {
        let (full_name, email): (String, Option<String>) = self.conn.query_row(
            "SELECT full_name, email FROM guardians WHERE id = ?",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let mut changed = false;
        if !row.parent_name.is_empty() && row.parent_name != full_name {
            self.conn.execute(
                "UPDATE guardians SET full_name = ?, updated_at = ? WHERE id = ?",
                (&row.parent_name, db::now_rfc3339(), id),
            )?;
            changed = true;
        }
        if let Some(e) = row.parent_email.as_deref() {
            if email.as_deref() != Some(e) {
                // OR IGNORE: another guardian may already own the address.
                let n = self.conn.execute(
                    "UPDATE OR IGNORE guardians SET email = ?, updated_at = ? WHERE id = ?",
                    (e, db::now_rfc3339(), id),
                )?;
                changed = changed || n > 0;
            }
        }
        Ok(changed)
    }

    fn create_guardian(&self, row: &ResolvedRow) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = db::now_rfc3339();
        self.conn.execute(
            "INSERT INTO guardians(id, school_id, full_name, phone, email, status, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
            (
                &id,
                self.school_id,
                &row.parent_name,
                row.parent_phone.as_deref(),
                row.parent_email.as_deref(),
                STATUS_ACTIVE,
                &now,
                &now,
            ),
        )?;

        // The conditional insert may have lost to a concurrent writer; re-read
        // by the identity key, phone first.
        if let Some(p) = row.parent_phone.as_deref() {
            let found: Option<String> = self
                .conn
                .query_row(
                    "SELECT id FROM guardians WHERE school_id = ? AND phone = ?",
                    (self.school_id, p),
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(found) = found {
                return Ok(found);
            }
        }
        if let Some(e) = row.parent_email.as_deref() {
            let found: Option<String> = self
                .conn
                .query_row(
                    "SELECT id FROM guardians WHERE school_id = ? AND email = ?",
                    (self.school_id, e),
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(found) = found {
                return Ok(found);
            }
        }
        anyhow::bail!("guardian create did not land for row {}", row.admission_no)
    }

    fn upsert_link(&self, student_id: &str, guardian_id: &str) -> anyhow::Result<bool> {
        let existing: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT relationship, is_primary FROM student_guardian_links
                 WHERE student_id = ? AND guardian_id = ?",
                (student_id, guardian_id),
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        if let Some((relationship, is_primary)) = existing {
            if relationship == RELATIONSHIP_GUARDIAN && is_primary == 1 {
                return Ok(false);
            }
        }
        self.conn.execute(
            "INSERT INTO student_guardian_links(student_id, guardian_id, relationship, is_primary)
             VALUES(?, ?, ?, 1)
             ON CONFLICT(student_id, guardian_id) DO UPDATE SET
               relationship = excluded.relationship,
               is_primary = excluded.is_primary",
            (student_id, guardian_id, RELATIONSHIP_GUARDIAN),
        )?;
        Ok(true)
    }

    fn upsert_enrollment(&self, student_id: &str, row: &ResolvedRow) -> anyhow::Result<bool> {
        let existing: Option<(String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT id, class_group_id, session_id, status FROM enrollments
                 WHERE student_id = ? AND term_id = ?",
                (student_id, &row.term_id),
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;

        match existing {
            Some((id, class_group_id, session_id, status)) => {
                if class_group_id == row.class_group_id
                    && session_id == row.session_id
                    && status == STATUS_ENROLLED
                {
                    return Ok(false);
                }
                self.conn.execute(
                    "UPDATE enrollments SET class_group_id = ?, session_id = ?, status = ?, updated_at = ?
                     WHERE id = ?",
                    (
                        &row.class_group_id,
                        &row.session_id,
                        STATUS_ENROLLED,
                        db::now_rfc3339(),
                        &id,
                    ),
                )?;
                Ok(true)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let now = db::now_rfc3339();
                self.conn.execute(
                    "INSERT INTO enrollments(id, school_id, student_id, term_id, class_group_id, session_id, status, created_at, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(student_id, term_id) DO UPDATE SET
                       class_group_id = excluded.class_group_id,
                       session_id = excluded.session_id,
                       status = excluded.status,
                       updated_at = excluded.updated_at",
                    (
                        &id,
                        self.school_id,
                        student_id,
                        &row.term_id,
                        &row.class_group_id,
                        &row.session_id,
                        STATUS_ENROLLED,
                        &now,
                        &now,
                    ),
                )?;
                Ok(true)
            }
        }
    }
}
