
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Domain, STORE_SOURCE, STORE_SOURCE_TYPE, flatten_extra_data, labeled};
use crate::index::Document;
use crate::query::{ExpansionRules, StudentProfile, enhance};

const INTENT_KEYWORDS: &[&str] = &["application", "apply", "process", "how to"];

const INTENT_EXPANSION: &str = "application process steps requirements how to apply";

const NAME_EXPANSIONS: &[(&str, &str)] = &[
    ("dost", "DOST Science Education Institute Scholarship"),
    ("ched", "CHED Scholarship Commission on Higher Education"),
    ("sm", "SM Foundation Scholarship"),
    ("ayala", "Ayala Foundation Scholarship"),
    ("gsis", "GSIS Scholarship Government Service Insurance System"),
    ("sss", "SSS Educational Assistance Loan Social Security System"),
    ("metrobank", "Metrobank Foundation Scholarship"),
];

const RULES: ExpansionRules = ExpansionRules {
    intent_keywords: INTENT_KEYWORDS,
    intent_expansion: INTENT_EXPANSION,
    name_expansions: NAME_EXPANSIONS,
    profile_prefix: "for student with",
};

/// Row shape of the `scholarships` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scholarship {
    pub id: Option<String>,
    pub title: Option<String>,
    pub provider: Option<String>,
    pub description: Option<String>,
    pub eligibility: Option<String>,
    pub benefits: Option<String>,
    pub deadline: Option<String>,
    pub raw_source_text: Option<String>,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub source_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub extra_data: Option<Map<String, Value>>,
}

/// Source metadata surfaced alongside scholarship matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScholarshipSource {
    pub id: String,
    pub title: String,
    pub provider: String,
    pub link: String,
    pub source: String,
    pub source_type: String,
    pub created_at: Option<DateTime<Utc>>,
}

pub struct ScholarshipDomain;

impl Scholarship {
    /// Concatenate populated fields in a fixed order, blank-line separated.
    fn compile_content(&self) -> String {
        let deadline = self
            .deadline
            .as_ref()
            .filter(|d| !d.trim().is_empty())
            .map(|d| format!("Deadline: {}", format_deadline(d)));

        let parts = [
            self.title.clone().filter(|t| !t.trim().is_empty()),
            labeled("Provider", self.provider.as_ref()),
            self.description.clone().filter(|d| !d.trim().is_empty()),
            labeled("Eligibility", self.eligibility.as_ref()),
            labeled("Benefits", self.benefits.as_ref()),
            deadline,
            self.raw_source_text
                .clone()
                .filter(|t| !t.trim().is_empty()),
            self.summary.clone().filter(|s| !s.trim().is_empty()),
            self.extra_data.as_ref().and_then(flatten_extra_data),
        ];

        parts.into_iter().flatten().join("\n\n")
    }

    fn source(&self) -> ScholarshipSource {
        ScholarshipSource {
            id: self.id.clone().unwrap_or_default(),
            title: self
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled Scholarship".to_string()),
            provider: self
                .provider
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| "Unknown Provider".to_string()),
            link: self.link.clone().unwrap_or_default(),
            source: STORE_SOURCE.to_string(),
            source_type: self
                .source_type
                .clone()
                .unwrap_or_else(|| STORE_SOURCE_TYPE.to_string()),
            created_at: self.created_at,
        }
    }
}

/// Render a deadline column value for document text. Date-typed values come
/// back from the store as ISO strings; anything unparseable passes through.
fn format_deadline(raw: &str) -> String {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%B %d, %Y").to_string();
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return timestamp.format("%B %d, %Y").to_string();
    }
    raw.to_string()
}

fn profile_details(profile: &StudentProfile) -> Vec<String> {
    let mut details = Vec::new();

    if let Some(grade_level) = non_blank(profile.grade_level.as_ref()) {
        details.push(format!("education level: {}", grade_level));
    }
    if let Some(course) = non_blank(profile.course.as_ref()) {
        details.push(format!("course/major: {}", course));
    }
    if let Some(income) = non_blank(profile.family_income.as_ref()) {
        details.push(format!("family income: {}", income));
    }
    if let Some(gwa) = profile.academic_gwa {
        details.push(format!("academic GWA: {}", gwa));
    }

    details
}

fn non_blank(value: Option<&String>) -> Option<&String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Domain for ScholarshipDomain {
    type Record = Scholarship;
    type Source = ScholarshipSource;

    const TABLE: &'static str = "scholarships";
    const LABEL: &'static str = "scholarship";

    #[inline]
    fn record_id(record: &Self::Record) -> Option<&str> {
        record.id.as_deref()
    }

    #[inline]
    fn document(record: &Self::Record) -> Option<Document<Self::Source>> {
        let content = record.compile_content();
        if content.trim().is_empty() {
            return None;
        }

        Some(Document {
            content,
            source: record.source(),
        })
    }

    #[inline]
    fn enhance_query(question: &str, profile: Option<&StudentProfile>) -> String {
        let details = profile.map(profile_details).unwrap_or_default();
        enhance(&RULES, question, &details)
    }
}
