use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::Connection;

pub trait Named {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

#[derive(Clone, Debug)]
pub struct RefItem {
    pub id: String,
    pub name: String,
}

impl Named for RefItem {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug)]
pub struct ClassGroup {
    pub id: String,
    pub name: String,
    pub class_year_id: String,
    pub class_arm_id: Option<String>,
}

impl Named for ClassGroup {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug)]
pub struct Term {
    pub id: String,
    pub name: String,
    pub session_id: String,
}

impl Named for Term {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Items of one reference type, indexed for normalized-name and id lookup.
pub struct NamedSet<T: Named> {
    items: Vec<T>,
    by_name: HashMap<String, Vec<usize>>,
    by_id: HashMap<String, usize>,
}

impl<T: Named> NamedSet<T> {
    pub fn build(items: Vec<T>) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();
        for (idx, item) in items.iter().enumerate() {
            by_name
                .entry(normalize_name(item.name()))
                .or_default()
                .push(idx);
            by_id.insert(item.id().to_string(), idx);
        }
        Self {
            items,
            by_name,
            by_id,
        }
    }

    pub fn by_id(&self, id: &str) -> Option<&T> {
        self.by_id.get(id).map(|i| &self.items[*i])
    }

    /// Every item whose normalized name matches; empty on no match.
    pub fn by_name(&self, raw: &str) -> Vec<&T> {
        self.by_name
            .get(&normalize_name(raw))
            .map(|idxs| idxs.iter().map(|i| &self.items[*i]).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// One school's reference data. Read-only after load. The current term (and
/// through it the current session) substitutes for rows that carry no term.
pub struct RefBundle {
    pub groups: NamedSet<ClassGroup>,
    pub years: NamedSet<RefItem>,
    pub arms: NamedSet<RefItem>,
    pub sessions: NamedSet<RefItem>,
    pub terms: NamedSet<Term>,
    pub current_term_id: Option<String>,
}

pub fn load_bundle(conn: &Connection, school_id: &str) -> anyhow::Result<RefBundle> {
    let years = load_items(conn, "SELECT id, name FROM class_years WHERE school_id = ?", school_id)?;
    let arms = load_items(conn, "SELECT id, name FROM class_arms WHERE school_id = ?", school_id)?;

    let mut stmt = conn.prepare(
        "SELECT id, name, class_year_id, class_arm_id FROM class_groups WHERE school_id = ?",
    )?;
    let groups = stmt
        .query_map([school_id], |r| {
            Ok(ClassGroup {
                id: r.get(0)?,
                name: r.get(1)?,
                class_year_id: r.get(2)?,
                class_arm_id: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let sessions = load_items(
        conn,
        "SELECT id, name FROM sessions WHERE school_id = ?",
        school_id,
    )?;

    let mut stmt =
        conn.prepare("SELECT id, name, session_id, is_current FROM terms WHERE school_id = ?")?;
    let mut terms: Vec<Term> = Vec::new();
    let mut current_term_id: Option<String> = None;
    let mut rows = stmt.query([school_id])?;
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let session_id: String = row.get(2)?;
        let is_current: i64 = row.get(3)?;
        if is_current != 0 && current_term_id.is_none() {
            current_term_id = Some(id.clone());
        }
        terms.push(Term {
            id,
            name,
            session_id,
        });
    }

    Ok(RefBundle {
        groups: NamedSet::build(groups),
        years: NamedSet::build(years),
        arms: NamedSet::build(arms),
        sessions: NamedSet::build(sessions),
        terms: NamedSet::build(terms),
        current_term_id,
    })
}

fn load_items(conn: &Connection, sql: &str, school_id: &str) -> anyhow::Result<Vec<RefItem>> {
    let mut stmt = conn.prepare(sql)?;
    let items = stmt
        .query_map([school_id], |r| {
            Ok(RefItem {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

struct CacheEntry {
    loaded_at: Instant,
    bundle: Arc<RefBundle>,
}

/// Read-through cache of reference bundles, keyed by school, with a bounded
/// lifetime per entry. The loader is injected so jobs never reach for ambient
/// state; seeding invalidates the affected school.
pub struct RefCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl RefCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get_or_load<F>(&mut self, school_id: &str, load: F) -> anyhow::Result<Arc<RefBundle>>
    where
        F: FnOnce() -> anyhow::Result<RefBundle>,
    {
        if let Some(entry) = self.entries.get(school_id) {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&entry.bundle));
            }
        }
        let bundle = Arc::new(load()?);
        self.entries.insert(
            school_id.to_string(),
            CacheEntry {
                loaded_at: Instant::now(),
                bundle: Arc::clone(&bundle),
            },
        );
        Ok(bundle)
    }

    pub fn invalidate(&mut self, school_id: &str) {
        self.entries.remove(school_id);
    }
}
