#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Domain, STORE_SOURCE, STORE_SOURCE_TYPE, flatten_extra_data, labeled};
use crate::index::Document;
use crate::query::{ExpansionRules, StudentProfile, enhance};

const INTENT_KEYWORDS: &[&str] = &[
    "university",
    "college",
    "school",
    "campus",
    "admission",
    "enrollment",
];

const INTENT_EXPANSION: &str =
    "university college admission enrollment campus programs courses degrees";

const NAME_EXPANSIONS: &[(&str, &str)] = &[
    ("up", "University of the Philippines"),
    ("ateneo", "Ateneo de Manila University"),
    ("dlsu", "De La Salle University"),
    ("ust", "University of Santo Tomas"),
    ("feu", "Far Eastern University"),
    ("pup", "Polytechnic University of the Philippines"),
    ("mapua", "Mapua University"),
    ("admu", "Ateneo de Manila University"),
    ("silliman", "Silliman University"),
    ("xavier", "Xavier University"),
];

const RULES: ExpansionRules = ExpansionRules {
    intent_keywords: INTENT_KEYWORDS,
    intent_expansion: INTENT_EXPANSION,
    name_expansions: NAME_EXPANSIONS,
    profile_prefix: "for student interested in",
};

/// Program lists arrive either as a text column or a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Programs {
    One(String),
    Many(Vec<String>),
}

impl Programs {
    fn joined(&self) -> String {
        match self {
            Programs::One(text) => text.clone(),
            Programs::Many(items) => items.iter().join(", "),
        }
    }
}

/// Row shape of the `universities` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct University {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub programs: Option<Programs>,
    pub admission_requirements: Option<String>,
    pub tuition_range: Option<String>,
    pub notable_features: Option<String>,
    pub website_url: Option<String>,
    pub contact_info: Option<String>,
    pub ranking: Option<String>,
    pub accreditation: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub extra_data: Option<Map<String, Value>>,
}

/// Source metadata surfaced alongside university matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversitySource {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
    pub website_url: String,
    pub source: String,
    pub source_type: String,
    pub created_at: Option<DateTime<Utc>>,
}

pub struct UniversityDomain;

impl University {
    fn compile_content(&self) -> String {
        let programs = self
            .programs
            .as_ref()
            .map(Programs::joined)
            .filter(|p| !p.trim().is_empty())
            .map(|p| format!("Programs: {}", p));

        let parts = [
            self.name.clone().filter(|n| !n.trim().is_empty()),
            labeled("Type", self.kind.as_ref()),
            labeled("Location", self.location.as_ref()),
            labeled("Description", self.description.as_ref()),
            programs,
            labeled("Admission Requirements", self.admission_requirements.as_ref()),
            labeled("Tuition Range", self.tuition_range.as_ref()),
            labeled("Notable Features", self.notable_features.as_ref()),
            labeled("Website", self.website_url.as_ref()),
            labeled("Contact Information", self.contact_info.as_ref()),
            labeled("Ranking", self.ranking.as_ref()),
            labeled("Accreditation", self.accreditation.as_ref()),
            self.extra_data.as_ref().and_then(flatten_extra_data),
        ];

        parts.into_iter().flatten().join("\n\n")
    }

    fn source(&self) -> UniversitySource {
        UniversitySource {
            id: self.id.clone().unwrap_or_default(),
            name: self
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Unnamed University".to_string()),
            kind: self
                .kind
                .clone()
                .filter(|k| !k.trim().is_empty())
                .unwrap_or_else(|| "Unknown Type".to_string()),
            location: self
                .location
                .clone()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| "Unknown Location".to_string()),
            website_url: self.website_url.clone().unwrap_or_default(),
            source: STORE_SOURCE.to_string(),
            source_type: STORE_SOURCE_TYPE.to_string(),
            created_at: self.created_at,
        }
    }
}

fn profile_details(profile: &StudentProfile) -> Vec<String> {
    let mut details = Vec::new();

    if let Some(interest) = non_blank(profile.program_interest.as_ref()) {
        details.push(format!("program interest: {}", interest));
    }
    if let Some(course) = non_blank(profile.course.as_ref()) {
        details.push(format!("course/major: {}", course));
    }
    if let Some(region) = non_blank(profile.region.as_ref()) {
        details.push(format!("region: {}", region));
    }

    details
}

fn non_blank(value: Option<&String>) -> Option<&String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Domain for UniversityDomain {
    type Record = University;
    type Source = UniversitySource;

    const TABLE: &'static str = "universities";
    const LABEL: &'static str = "university";

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
