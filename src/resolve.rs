use crate::headers::{Field, HeaderMap};
use crate::normalize;
use crate::refdata::{ClassGroup, Named, NamedSet, RefBundle};

/// Outcome of a reference lookup. Ambiguity is rejected, never guessed.
pub enum Lookup<T> {
    Resolved(T),
    Unknown,
    Ambiguous,
}

fn lookup_one<T>(mut candidates: Vec<T>) -> Lookup<T> {
    match candidates.len() {
        0 => Lookup::Unknown,
        1 => Lookup::Resolved(candidates.remove(0)),
        _ => Lookup::Ambiguous,
    }
}

/// A data row whose names and IDs all resolved to validated foreign keys.
/// Contact identifiers are already normalized.
#[derive(Debug)]
pub struct ResolvedRow {
    pub admission_no: String,
    pub first_name: String,
    pub last_name: String,
    pub parent_name: String,
    pub parent_phone: Option<String>,
    pub parent_email: Option<String>,
    pub class_group_id: String,
    pub session_id: String,
    pub term_id: String,
}

/// Validate one data row against the school's reference bundle.
///
/// Every applicable error is accumulated before the row is rejected, so the
/// error report names all of a row's problems at once. A rejected row is
/// excluded from all writes.
pub fn resolve_row(
    headers: &HeaderMap,
    row: &[String],
    refs: &RefBundle,
) -> Result<ResolvedRow, Vec<String>> {
    let mut errors: Vec<String> = Vec::new();
    let mut missing: Vec<&'static str> = Vec::new();

    let admission_no = headers.cell(Field::AdmissionNo, row).to_string();
    let first_name = headers.cell(Field::FirstName, row).to_string();
    let last_name = headers.cell(Field::LastName, row).to_string();
    let parent_name = headers.cell(Field::ParentName, row).to_string();
    let parent_phone = normalize::normalize_phone(headers.cell(Field::ParentPhone, row));
    let parent_email = normalize::normalize_email(headers.cell(Field::ParentEmail, row));

    if admission_no.is_empty() {
        missing.push("admissionNo");
    }
    if first_name.is_empty() {
        missing.push("firstName");
    }
    if last_name.is_empty() {
        missing.push("lastName");
    }
    if parent_phone.is_none() && parent_email.is_none() {
        missing.push("parentPhone or parentEmail");
    }

    let year_id = resolve_ref(
        headers,
        row,
        Field::ClassYearId,
        Field::ClassYear,
        &refs.years,
        "class year",
        &mut errors,
    );
    let arm_id = resolve_ref(
        headers,
        row,
        Field::ClassArmId,
        Field::ClassArm,
        &refs.arms,
        "class arm",
        &mut errors,
    );

    let group = resolve_class_group(
        headers,
        row,
        refs,
        year_id.as_deref(),
        arm_id.as_deref(),
        &mut missing,
        &mut errors,
    );

    // A group resolved by direct ID or by name must agree with whatever the
    // row said independently about year and arm.
    if let Some(group) = group {
        if let Some(year_id) = year_id.as_deref() {
            if group.class_year_id != year_id {
                errors.push(format!(
                    "Class group {} does not match class year",
                    group.name
                ));
            }
        }
        if let Some(arm_id) = arm_id.as_deref() {
            if group.class_arm_id.as_deref() != Some(arm_id) {
                errors.push(format!("Class group {} does not match class arm", group.name));
            }
        }
    }

    let session_id = resolve_ref(
        headers,
        row,
        Field::SessionId,
        Field::Session,
        &refs.sessions,
        "session",
        &mut errors,
    );

    let term_id = resolve_term(headers, row, refs, session_id.as_deref(), &mut errors);
    if term_id.is_none()
        && headers.cell(Field::TermId, row).is_empty()
        && headers.cell(Field::Term, row).is_empty()
    {
        // Nothing on the row and no current term configured for the school.
        missing.push("term");
    }

    // A term reached by direct ID can still contradict an explicit session.
    if let (Some(session_id), Some(term_id)) = (session_id.as_deref(), term_id.as_deref()) {
        if let Some(term) = refs.terms.by_id(term_id) {
            if term.session_id != session_id {
                errors.push(format!("Term {} does not match session", term.name));
            }
        }
    }

    // The enrollment's session comes from the row when given, otherwise from
    // the resolved term.
    let enroll_session = session_id.or_else(|| {
        term_id
            .as_deref()
            .and_then(|tid| refs.terms.by_id(tid))
            .map(|t| t.session_id.clone())
    });

    if !missing.is_empty() {
        errors.insert(0, format!("Missing required fields: {}", missing.join(", ")));
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let (Some(group), Some(term_id), Some(session_id)) = (group, term_id, enroll_session) else {
        // Every None above records an error, so this is unreachable in
        // practice; reject rather than panic if the invariant slips.
        return Err(vec!["Missing required fields".to_string()]);
    };

    Ok(ResolvedRow {
        admission_no,
        first_name,
        last_name,
        parent_name,
        parent_phone,
        parent_email,
        class_group_id: group.id.clone(),
        session_id,
        term_id,
    })
}

/// Direct-ID-or-by-name resolution shared by years, arms and sessions.
fn resolve_ref<T: Named>(
    headers: &HeaderMap,
    row: &[String],
    id_field: Field,
    name_field: Field,
    set: &NamedSet<T>,
    label: &str,
    errors: &mut Vec<String>,
) -> Option<String> {
    let id_value = headers.cell(id_field, row);
    if !id_value.is_empty() {
        if set.by_id(id_value).is_some() {
            return Some(id_value.to_string());
        }
        errors.push(format!("Unknown {} id: {}", label, id_value));
        return None;
    }

    let name_value = headers.cell(name_field, row);
    if name_value.is_empty() {
        return None;
    }
    match lookup_one(set.by_name(name_value)) {
        Lookup::Resolved(item) => Some(item.id().to_string()),
        Lookup::Unknown => {
            errors.push(format!("Unknown {}: {}", label, name_value));
            None
        }
        Lookup::Ambiguous => {
            errors.push(format!("Ambiguous {}: {}", label, name_value));
            None
        }
    }
}

fn resolve_class_group<'a>(
    headers: &HeaderMap,
    row: &[String],
    refs: &'a RefBundle,
    year_id: Option<&str>,
    arm_id: Option<&str>,
    missing: &mut Vec<&'static str>,
    errors: &mut Vec<String>,
) -> Option<&'a ClassGroup> {
    let id_value = headers.cell(Field::ClassGroupId, row);
    if !id_value.is_empty() {
        match refs.groups.by_id(id_value) {
            Some(group) => return Some(group),
            None => {
                errors.push(format!("Unknown class group id: {}", id_value));
                return None;
            }
        }
    }

    let name_value = headers.cell(Field::ClassGroup, row);
    if !name_value.is_empty() {
        return match lookup_one(refs.groups.by_name(name_value)) {
            Lookup::Resolved(group) => Some(group),
            Lookup::Unknown => {
                errors.push(format!("Unknown class group: {}", name_value));
                None
            }
            Lookup::Ambiguous => {
                errors.push(format!("Ambiguous class group: {}", name_value));
                None
            }
        };
    }

    let year_given = !headers.cell(Field::ClassYearId, row).is_empty()
        || !headers.cell(Field::ClassYear, row).is_empty();
    let arm_given = !headers.cell(Field::ClassArmId, row).is_empty()
        || !headers.cell(Field::ClassArm, row).is_empty();

    if !year_given {
        missing.push("classGroup");
        return None;
    }
    let year_id = year_id?;
    if arm_given && arm_id.is_none() {
        // The arm failed to resolve; that error already tells the story.
        return None;
    }

    // Combine year + arm; groups carrying no arm match on year alone.
    let matches: Vec<&ClassGroup> = refs
        .groups
        .iter()
        .filter(|g| {
            g.class_year_id == year_id
                && match arm_id {
                    Some(arm) => g.class_arm_id.as_deref() == Some(arm),
                    None => g.class_arm_id.is_none(),
                }
        })
        .collect();

    let year_value = match headers.cell(Field::ClassYear, row) {
        "" => headers.cell(Field::ClassYearId, row),
        v => v,
    };
    let described = match (year_value, headers.cell(Field::ClassArm, row)) {
        (y, "") => y.to_string(),
        (y, a) => format!("{} {}", y, a),
    };
    match lookup_one(matches) {
        Lookup::Resolved(group) => Some(group),
        Lookup::Unknown => {
            errors.push(format!("Unknown class group: {}", described));
            None
        }
        Lookup::Ambiguous => {
            errors.push(format!("Ambiguous class group: {}", described));
            None
        }
    }
}

fn resolve_term(
    headers: &HeaderMap,
    row: &[String],
    refs: &RefBundle,
    session_id: Option<&str>,
    errors: &mut Vec<String>,
) -> Option<String> {
    let id_value = headers.cell(Field::TermId, row);
    if !id_value.is_empty() {
        if refs.terms.by_id(id_value).is_some() {
            return Some(id_value.to_string());
        }
        errors.push(format!("Unknown term id: {}", id_value));
        return None;
    }

    let name_value = headers.cell(Field::Term, row);
    if name_value.is_empty() {
        // No term on the row: the school's current term applies.
        return refs.current_term_id.clone();
    }

    // Scope the lookup to the session when one is known; otherwise scan all
    // terms and ask the operator to disambiguate by session.
    let candidates: Vec<&crate::refdata::Term> = refs
        .terms
        .by_name(name_value)
        .into_iter()
        .filter(|t| session_id.map_or(true, |sid| t.session_id == sid))
        .collect();
    match lookup_one(candidates) {
        Lookup::Resolved(term) => Some(term.id.clone()),
        Lookup::Unknown => {
            errors.push(format!("Unknown term: {}", name_value));
            None
        }
        Lookup::Ambiguous => {
            if session_id.is_none() {
                errors.push(format!(
                    "Ambiguous term: {} (add session to disambiguate)",
                    name_value
                ));
            } else {
                errors.push(format!("Ambiguous term: {}", name_value));
            }
            None
        }
    }
}
