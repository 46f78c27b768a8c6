use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("enroll.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_years(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(school_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_arms(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(school_id, name)
        )",
        [],
    )?;

    // Class group names are operator-entered and may collide within a school;
    // the importer must be able to see the collision to reject it.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_groups(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            class_year_id TEXT NOT NULL,
            class_arm_id TEXT,
            FOREIGN KEY(class_year_id) REFERENCES class_years(id),
            FOREIGN KEY(class_arm_id) REFERENCES class_arms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_groups_school ON class_groups(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            UNIQUE(school_id, name)
        )",
        [],
    )?;

    // Term names repeat across sessions (every session has a "First Term");
    // uniqueness holds only within one session.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS terms(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            name TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            UNIQUE(session_id, name),
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_terms_school ON terms(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            admission_no TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            status TEXT,
            created_at TEXT,
            updated_at TEXT,
            UNIQUE(school_id, admission_no)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS guardians(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            full_name TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            status TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    // Within a school a normalized phone or email resolves to one guardian.
    // Partial unique indexes double as the conflict target for conditional
    // creates racing across concurrent jobs.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_guardians_phone
         ON guardians(school_id, phone) WHERE phone IS NOT NULL",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_guardians_email
         ON guardians(school_id, email) WHERE email IS NOT NULL",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_guardian_links(
            student_id TEXT NOT NULL,
            guardian_id TEXT NOT NULL,
            relationship TEXT NOT NULL,
            is_primary INTEGER NOT NULL,
            PRIMARY KEY(student_id, guardian_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(guardian_id) REFERENCES guardians(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_links_guardian ON student_guardian_links(guardian_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            class_group_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT,
            UNIQUE(student_id, term_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(term_id) REFERENCES terms(id),
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id),
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_jobs(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            status TEXT NOT NULL,
            source_bucket TEXT,
            source_key TEXT,
            processed_lines INTEGER NOT NULL DEFAULT 0,
            created INTEGER NOT NULL DEFAULT 0,
            updated INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            errors INTEGER NOT NULL DEFAULT 0,
            error_report_key TEXT,
            processed_at TEXT,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_events(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_events_entity ON audit_events(entity_type, entity_id)",
        [],
    )?;

    Ok(conn)
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
