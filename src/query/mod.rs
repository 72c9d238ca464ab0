//! Heuristic query enhancement.
//!
//! The embedding model is a small multilingual sentence transformer, so raw
//! questions like "how do I apply for dost?" retrieve better when anchored
//! with canonical names and intent phrases before embedding. Enhancement is a
//! pure string rewrite with no I/O.


use serde::{Deserialize, Serialize};

/// Fields a student may have filled in on their profile. Each domain injects
/// its own subset into the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentProfile {
    pub grade_level: Option<String>,
    pub course: Option<String>,
    pub family_income: Option<String>,
    pub academic_gwa: Option<f32>,
    pub program_interest: Option<String>,
    pub region: Option<String>,
}

/// Per-domain expansion tables driving [`enhance`].
#[derive(Debug, Clone, Copy)]
pub struct ExpansionRules {
    /// Keywords signalling application/process intent, matched
    /// case-insensitively as substrings.
    pub intent_keywords: &'static [&'static str],
    /// Phrase appended once when any intent keyword matches.
    pub intent_expansion: &'static str,
    /// Keyword to canonical-name table; every match appends (cumulative).
    pub name_expansions: &'static [(&'static str, &'static str)],
    /// Prefix for the profile-context suffix, e.g. "for student with".
    pub profile_prefix: &'static str,
}

/// Rewrite a raw question into a richer query string. Deterministic.
#[inline]
pub fn enhance(rules: &ExpansionRules, question: &str, profile_details: &[String]) -> String {
    let lowered = question.to_lowercase();
    let mut enhanced = question.to_string();

    if rules
        .intent_keywords
        .iter()
        .any(|keyword| lowered.contains(keyword))
    {
        enhanced.push(' ');
        enhanced.push_str(rules.intent_expansion);
    }

    for (keyword, canonical) in rules.name_expansions {
        if lowered.contains(keyword) {
            enhanced.push(' ');
            enhanced.push_str(canonical);
        }
    }

    if !profile_details.is_empty() {
        enhanced.push(' ');
        enhanced.push_str(rules.profile_prefix);
        enhanced.push(' ');
        enhanced.push_str(&profile_details.join(", "));
    }

    enhanced
}
