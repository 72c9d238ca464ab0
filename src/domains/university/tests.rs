use super::*;
use serde_json::json;

fn up_diliman() -> University {
    University {
        id: Some("u-1".to_string()),
        name: Some("University of the Philippines Diliman".to_string()),
        kind: Some("State University".to_string()),
        location: Some("Quezon City".to_string()),
        programs: Some(Programs::Many(vec![
            "BS Computer Science".to_string(),
            "BA Political Science".to_string(),
        ])),
        admission_requirements: Some("UPCA with grade requirements".to_string()),
        website_url: Some("https://upd.edu.ph".to_string()),
        ..University::default()
    }
}

#[test]
fn content_follows_field_order() {
    let content = up_diliman().compile_content();
    let parts: Vec<&str> = content.split("\n\n").collect();

    assert_eq!(parts[0], "University of the Philippines Diliman");
    assert_eq!(parts[1], "Type: State University");
    assert_eq!(parts[2], "Location: Quezon City");
    assert_eq!(parts[3], "Programs: BS Computer Science, BA Political Science");
    assert_eq!(parts[4], "Admission Requirements: UPCA with grade requirements");
    assert_eq!(parts[5], "Website: https://upd.edu.ph");
}

#[test]
fn programs_accept_plain_text_column() {
    let record: University = serde_json::from_value(json!({
        "name": "Test U",
        "programs": "Engineering, Law"
    }))
    .expect("can deserialize");

    assert_eq!(
        record.compile_content(),
        "Test U\n\nPrograms: Engineering, Law"
    );
}

#[test]
fn programs_accept_json_array_column() {
    let record: University = serde_json::from_value(json!({
        "name": "Test U",
        "programs": ["Engineering", "Law"]
    }))
    .expect("can deserialize");

    assert_eq!(
        record.compile_content(),
        "Test U\n\nPrograms: Engineering, Law"
    );
}

#[test]
fn type_column_maps_to_kind() {
    let record: University = serde_json::from_value(json!({
        "name": "Test U",
        "type": "Private University"
    }))
    .expect("can deserialize");

    assert_eq!(record.kind.as_deref(), Some("Private University"));
}

#[test]
fn blank_record_produces_no_document() {
    assert!(UniversityDomain::document(&University::default()).is_none());
}

#[test]
fn source_fills_fallback_labels() {
    let source = University::default().source();

    assert_eq!(source.name, "Unnamed University");
    assert_eq!(source.kind, "Unknown Type");
    assert_eq!(source.location, "Unknown Location");
    assert_eq!(source.source_type, "database");
}

#[test]
fn admission_question_gets_intent_expansion() {
    let enhanced = UniversityDomain::enhance_query("What are the admission requirements?", None);

    assert!(
        enhanced
            .contains("university college admission enrollment campus programs courses degrees")
    );
}

#[test]
fn up_keyword_appends_canonical_name() {
    let enhanced = UniversityDomain::enhance_query("Is up hard to get into?", None);
    assert!(enhanced.contains("University of the Philippines"));
}

#[test]
fn profile_fields_inject_with_exact_labels() {
    let profile = StudentProfile {
        program_interest: Some("Engineering".to_string()),
        region: Some("NCR".to_string()),
        ..StudentProfile::default()
    };

    let enhanced = UniversityDomain::enhance_query("Which schools?", Some(&profile));

    assert!(
        enhanced.ends_with("for student interested in program interest: Engineering, region: NCR")
    );
}
