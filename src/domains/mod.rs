// Domain definitions for the two retrieval engines.
// Scholarships and universities share the engine, index, and enhancement
// machinery; each domain supplies its table, record shape, content
// compilation, and expansion tables.

pub mod scholarship;
pub mod university;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::index::Document;
use crate::query::StudentProfile;

pub use scholarship::{Scholarship, ScholarshipDomain, ScholarshipSource};
pub use university::{University, UniversityDomain, UniversitySource};

/// Provenance tag attached to every document loaded from the record store.
pub const STORE_SOURCE: &str = "Supabase Database";
pub const STORE_SOURCE_TYPE: &str = "database";

pub trait Domain: Send + Sync + 'static {
    /// Row shape of the domain's record-store table.
    type Record: Serialize + serde::de::DeserializeOwned + Send + Sync;
    /// Typed source metadata passed through to callers, never interpreted.
    type Source: Clone + Serialize + Send + Sync + 'static;

    const TABLE: &'static str;
    const LABEL: &'static str;

    fn record_id(record: &Self::Record) -> Option<&str>;

    /// Compile a record into a retrieval document. Returns `None` when the
    /// compiled content is blank; such records must not reach the index.
    fn document(record: &Self::Record) -> Option<Document<Self::Source>>;

    fn enhance_query(question: &str, profile: Option<&StudentProfile>) -> String;
}

/// Flatten a free-form extra-data map into "Key: value" lines.
pub(crate) fn flatten_extra_data(extra: &Map<String, Value>) -> Option<String> {
    let lines: Vec<String> = extra
        .iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::Null => return None,
                Value::String(s) if s.trim().is_empty() => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some(format!("{}: {}", key, rendered))
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Keep a part only when the field holds non-blank text.
pub(crate) fn labeled(label: &str, value: Option<&String>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| format!("{}: {}", label, v))
}
