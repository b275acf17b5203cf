use clinvalid::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn observation_bundle(statuses: &[&str]) -> Value {
    let entries: Vec<Value> = statuses
        .iter()
        .map(|status| {
            json!({"resource": {
                "resourceType": "Observation",
                "status": status,
                "code": {"system": "http://loinc.org", "code": "8867-4"}
            }})
        })
        .collect();
    json!({"resourceType": "Bundle", "entry": entries})
}

fn find<'a>(suggestions: &'a [Suggestion], kind: RuleKind, path: &str) -> Option<&'a Suggestion> {
    suggestions
        .iter()
        .find(|s| s.rule.kind == kind && s.rule.field_path == path)
}

#[test]
fn test_six_identical_samples_yield_high_confidence_fixed_value() {
    let doc = observation_bundle(&["final"; 6]);
    let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());

    let fixed = find(&suggestions, RuleKind::FixedValue, "status").unwrap();
    assert_eq!(fixed.rule.resource_type, "Observation");
    assert_eq!(fixed.rule.metadata.expected_value, Some(json!("final")));
    assert_eq!(fixed.evidence.sample_count, 6);
    assert_eq!(fixed.evidence.examples, vec![json!("final")]);
    assert_eq!(fixed.confidence, Confidence::High);
}

#[test]
fn test_one_sample_yields_nothing() {
    let doc = observation_bundle(&["final"]);
    let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());
    assert!(suggestions.is_empty());

    // A single non-bundle resource is one sample too.
    let single = json!({"resourceType": "Observation", "status": "final"});
    let suggestions = SuggestionEngine::new(None).suggest(&single, &RuleSet::default());
    assert!(suggestions.is_empty());
}

#[test]
fn test_small_value_set_becomes_allowed_values_below_high_threshold() {
    let doc = observation_bundle(&["final", "amended", "corrected"]);
    let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());

    let allowed = find(&suggestions, RuleKind::AllowedValues, "status").unwrap();
    assert_eq!(
        allowed.rule.metadata.allowed_values,
        Some(vec![json!("final"), json!("amended"), json!("corrected")])
    );
    assert_eq!(allowed.confidence, Confidence::Medium);
    assert!(find(&suggestions, RuleKind::FixedValue, "status").is_none());
}

#[test]
fn test_shared_code_system_detected() {
    let doc = observation_bundle(&["final", "amended", "final", "final", "final"]);
    let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());

    let code_system = find(&suggestions, RuleKind::CodeSystem, "code").unwrap();
    assert_eq!(
        code_system.rule.metadata.system_url,
        Some("http://loinc.org".to_string())
    );
    assert_eq!(code_system.confidence, Confidence::High);
}

#[test]
fn test_existing_allowed_values_rule_suppresses_value_suggestions() {
    let doc = observation_bundle(&["final"; 4]);
    let existing = RuleSet::load(vec![
        RuleDefinition::new("Observation", RuleKind::AllowedValues, "status").with_metadata(
            RuleMetadata {
                allowed_values: Some(vec![json!("final"), json!("amended")]),
                ..Default::default()
            },
        ),
    ])
    .unwrap();

    let suggestions = SuggestionEngine::new(None).suggest(&doc, &existing);
    assert!(find(&suggestions, RuleKind::FixedValue, "status").is_none());
    assert!(find(&suggestions, RuleKind::AllowedValues, "status").is_none());
    // The presence concern is untouched by a value-set rule.
    assert!(find(&suggestions, RuleKind::Required, "status").is_some());
}

#[test]
fn test_schema_enumeration_suppresses_value_suggestions() {
    let mut provider = InMemorySchemaProvider::new();
    provider.insert(
        "Observation",
        SchemaElement::object(1, Some(1)).with_element(
            "status",
            SchemaElement::scalar(PrimitiveType::String, 1, Some(1))
                .with_enumeration(vec!["final", "amended"]),
        ),
    );

    let doc = observation_bundle(&["final", "amended"]);
    let suggestions = SuggestionEngine::new(Some(&provider)).suggest(&doc, &RuleSet::default());

    assert!(find(&suggestions, RuleKind::AllowedValues, "status").is_none());
    // min 1 in the schema already enforces presence.
    assert!(find(&suggestions, RuleKind::Required, "status").is_none());
}

#[test]
fn test_field_absent_in_one_sample_is_not_required() {
    let doc = json!({"resourceType": "Bundle", "entry": [
        {"resource": {"resourceType": "Patient", "gender": "male", "birthDate": "1980-01-01"}},
        {"resource": {"resourceType": "Patient", "gender": "male"}},
        {"resource": {"resourceType": "Patient", "gender": "male", "birthDate": "1990-05-05"}}
    ]});
    let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());

    assert!(find(&suggestions, RuleKind::Required, "birthDate").is_none());
    assert!(find(&suggestions, RuleKind::Required, "gender").is_some());
}

#[test]
fn test_suggested_rules_load_cleanly() {
    let doc = observation_bundle(&["final", "amended", "final", "final", "final", "final"]);
    let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());
    assert!(!suggestions.is_empty());

    // Every suggestion must be adoptable as-is.
    let definitions: Vec<RuleDefinition> = suggestions.into_iter().map(|s| s.rule).collect();
    let loaded = RuleSet::load(definitions).unwrap();
    assert!(!loaded.is_empty());
}

#[test]
fn test_wide_value_spread_yields_no_value_suggestion() {
    let doc = observation_bundle(&["s1", "s2", "s3", "s4", "s5", "s6"]);
    let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());

    assert!(find(&suggestions, RuleKind::FixedValue, "status").is_none());
    assert!(find(&suggestions, RuleKind::AllowedValues, "status").is_none());
}
