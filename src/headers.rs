use std::collections::HashMap;

/// Canonical fields a CSV column can map to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    AdmissionNo,
    FirstName,
    LastName,
    ParentPhone,
    ParentEmail,
    ParentName,
    ClassGroup,
    ClassYear,
    ClassArm,
    Term,
    Session,
    ClassGroupId,
    ClassYearId,
    ClassArmId,
    TermId,
    SessionId,
}

// Alias lists include the canonical spelling itself; matching is on the
// normalized form (lowercase, alphanumerics only) of both sides.
const ALIASES: &[(Field, &[&str])] = &[
    (
        Field::AdmissionNo,
        &[
            "admissionno",
            "admissionnumber",
            "admission",
            "admno",
            "studentno",
            "studentnumber",
            "regno",
        ],
    ),
    (Field::FirstName, &["firstname", "first", "givenname"]),
    (
        Field::LastName,
        &["lastname", "last", "surname", "familyname"],
    ),
    (
        Field::ParentPhone,
        &[
            "parentphone",
            "guardianphone",
            "parentmobile",
            "phone",
            "phonenumber",
            "mobile",
        ],
    ),
    (
        Field::ParentEmail,
        &["parentemail", "guardianemail", "email"],
    ),
    (
        Field::ParentName,
        &["parentname", "guardianname", "parent", "guardian"],
    ),
    (Field::ClassGroup, &["classgroup", "class", "classname"]),
    (Field::ClassYear, &["classyear", "year", "level", "grade"]),
    (Field::ClassArm, &["classarm", "arm", "stream"]),
    (Field::Term, &["term", "termname"]),
    (
        Field::Session,
        &["session", "academicsession", "schoolyear"],
    ),
    (Field::ClassGroupId, &["classgroupid", "classid"]),
    (Field::ClassYearId, &["classyearid", "yearid"]),
    (Field::ClassArmId, &["classarmid", "armid"]),
    (Field::TermId, &["termid"]),
    (Field::SessionId, &["sessionid"]),
];

fn normalize(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Column positions for each canonical field, built once per file from the
/// header row.
pub struct HeaderMap {
    columns: HashMap<Field, usize>,
}

impl HeaderMap {
    pub fn resolve(header_cells: &[String]) -> Self {
        let mut by_alias: HashMap<&'static str, Field> = HashMap::new();
        for (field, aliases) in ALIASES {
            for alias in *aliases {
                by_alias.insert(*alias, *field);
            }
        }

        let mut columns: HashMap<Field, usize> = HashMap::new();
        for (idx, cell) in header_cells.iter().enumerate() {
            let Some(field) = by_alias.get(normalize(cell).as_str()) else {
                continue;
            };
            // First matching column wins; later duplicates are ignored.
            columns.entry(*field).or_insert(idx);
        }
        Self { columns }
    }

    /// Trimmed cell value for a field; empty when the column is absent from
    /// the file or the row is short.
    pub fn cell<'a>(&self, field: Field, row: &'a [String]) -> &'a str {
        self.columns
            .get(&field)
            .and_then(|idx| row.get(*idx))
            .map(|c| c.trim())
            .unwrap_or("")
    }
}
