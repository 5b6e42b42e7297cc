//! Term canonicalization and deterministic record keys.
//!
//! Every key used by the ledger and the workflow is built here so that
//! "1st Term" and "First Term" land on the same record, and so that keys
//! stay byte-stable across runs (previously persisted records must keep
//! matching after a migration).

pub const FIRST_TERM: &str = "First Term";
pub const SECOND_TERM: &str = "Second Term";
pub const THIRD_TERM: &str = "Third Term";

/// Canonicalize a free-form term label. Known synonyms map onto the three
/// canonical labels; anything else is title-cased verbatim. Never fails.
pub fn normalize_term(input: &str) -> String {
    match input.trim().to_ascii_lowercase().as_str() {
        "first" | "first term" | "1st term" => FIRST_TERM.to_string(),
        "second" | "second term" | "2nd term" => SECOND_TERM.to_string(),
        "third" | "third term" | "3rd term" => THIRD_TERM.to_string(),
        _ => title_case(input),
    }
}

fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// One field of a composite key: trimmed, lower-cased, inner whitespace
// runs collapsed to a single space. Also used for cross-record field
// comparison so lookups match the same way keys do.
pub(crate) fn key_field(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identity key for an access grant: at most one live grant per
/// (parent, student, session, term).
pub fn grant_key(parent_id: &str, student_id: &str, term: &str, session: &str) -> String {
    [
        key_field(parent_id),
        key_field(student_id),
        key_field(session),
        key_field(&normalize_term(term)),
    ]
    .join("|")
}

/// Identity key for a workflow record: one per
/// (student, class, subject, term, session).
pub fn workflow_key(
    student_id: &str,
    class_name: &str,
    subject: &str,
    term: &str,
    session: &str,
) -> String {
    [
        key_field(student_id),
        key_field(class_name),
        key_field(subject),
        key_field(&normalize_term(term)),
        key_field(session),
    ]
    .join("|")
}
