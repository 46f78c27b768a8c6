use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedParams {
    school_id: String,
    #[serde(default)]
    class_years: Vec<String>,
    #[serde(default)]
    class_arms: Vec<String>,
    #[serde(default)]
    class_groups: Vec<GroupSpec>,
    #[serde(default)]
    sessions: Vec<SessionSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupSpec {
    name: String,
    class_year: String,
    #[serde(default)]
    class_arm: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionSpec {
    name: String,
    #[serde(default)]
    is_current: bool,
    #[serde(default)]
    terms: Vec<TermSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TermSpec {
    name: String,
    #[serde(default)]
    is_current: bool,
}

/// Idempotent by-name upsert of one school's reference bundle. The management
/// screens that normally own these tables are external; this is the seam they
/// (and the tests) use.
fn handle_reference_data(state: &mut AppState, req: Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let params: SeedParams = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    let result = seed(conn, &params);
    match result {
        Ok(value) => {
            state.refs.invalidate(&params.school_id);
            ok(&req.id, value)
        }
        Err(e) => err(&req.id, "db_write_failed", e.to_string(), None),
    }
}

fn seed(conn: &Connection, p: &SeedParams) -> anyhow::Result<serde_json::Value> {
    let tx = conn.unchecked_transaction()?;

    let mut year_ids = serde_json::Map::new();
    for name in &p.class_years {
        let id = upsert_named(&tx, "class_years", &p.school_id, name)?;
        year_ids.insert(name.clone(), json!(id));
    }
    let mut arm_ids = serde_json::Map::new();
    for name in &p.class_arms {
        let id = upsert_named(&tx, "class_arms", &p.school_id, name)?;
        arm_ids.insert(name.clone(), json!(id));
    }

    let mut group_ids: Vec<serde_json::Value> = Vec::new();
    for g in &p.class_groups {
        let year_id = upsert_named(&tx, "class_years", &p.school_id, &g.class_year)?;
        let arm_id = match &g.class_arm {
            Some(a) => Some(upsert_named(&tx, "class_arms", &p.school_id, a)?),
            None => None,
        };
        let id = upsert_group(&tx, &p.school_id, &g.name, &year_id, arm_id.as_deref())?;
        group_ids.push(json!({ "name": g.name, "id": id }));
    }

    let mut session_ids = serde_json::Map::new();
    let mut term_ids: Vec<serde_json::Value> = Vec::new();
    for s in &p.sessions {
        let sid = upsert_named(&tx, "sessions", &p.school_id, &s.name)?;
        if s.is_current {
            tx.execute(
                "UPDATE sessions SET is_current = 0 WHERE school_id = ?",
                [&p.school_id],
            )?;
            tx.execute("UPDATE sessions SET is_current = 1 WHERE id = ?", [&sid])?;
        }
        session_ids.insert(s.name.clone(), json!(sid));

        for t in &s.terms {
            let tid = upsert_term(&tx, &p.school_id, &sid, &t.name)?;
            if t.is_current {
                tx.execute(
                    "UPDATE terms SET is_current = 0 WHERE school_id = ?",
                    [&p.school_id],
                )?;
                tx.execute("UPDATE terms SET is_current = 1 WHERE id = ?", [&tid])?;
            }
            term_ids.push(json!({ "session": s.name, "name": t.name, "id": tid }));
        }
    }

    tx.commit()?;

    Ok(json!({
        "classYears": year_ids,
        "classArms": arm_ids,
        "classGroups": group_ids,
        "sessions": session_ids,
        "terms": term_ids,
    }))
}

fn upsert_named(
    conn: &Connection,
    table: &str,
    school_id: &str,
    name: &str,
) -> anyhow::Result<String> {
    // `table` is one of a fixed set of identifiers, never caller input.
    let sql = format!("SELECT id FROM {} WHERE school_id = ? AND name = ?", table);
    if let Some(id) = conn
        .query_row(&sql, (school_id, name), |r| r.get::<_, String>(0))
        .optional()?
    {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    let sql = format!("INSERT INTO {}(id, school_id, name) VALUES(?, ?, ?)", table);
    conn.execute(&sql, (&id, school_id, name))?;
    Ok(id)
}

fn upsert_group(
    conn: &Connection,
    school_id: &str,
    name: &str,
    year_id: &str,
    arm_id: Option<&str>,
) -> anyhow::Result<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM class_groups
             WHERE school_id = ? AND name = ? AND class_year_id = ?
               AND class_arm_id IS ?",
            (school_id, name, year_id, arm_id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO class_groups(id, school_id, name, class_year_id, class_arm_id)
         VALUES(?, ?, ?, ?, ?)",
        (&id, school_id, name, year_id, arm_id),
    )?;
    Ok(id)
}

fn upsert_term(
    conn: &Connection,
    school_id: &str,
    session_id: &str,
    name: &str,
) -> anyhow::Result<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM terms WHERE session_id = ? AND name = ?",
            (session_id, name),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO terms(id, school_id, session_id, name) VALUES(?, ?, ?, ?)",
        (&id, school_id, session_id, name),
    )?;
    Ok(id)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.referenceData" => Some(handle_reference_data(state, req.clone())),
        _ => None,
    }
}
