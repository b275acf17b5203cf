//! Rule suggestion from sample documents.
//!
//! The engine inspects a batch of resource instances and proposes rule
//! definitions a reviewer could adopt as-is. Suggestions are advisory and
//! never affect validation output; each one carries the evidence it rests
//! on and a confidence grade derived purely from sample size.

use crate::explain::Confidence;
use crate::node::value_is_empty;
use crate::rules::definition::{RuleDefinition, RuleKind, RuleMetadata, RuleSet};
use crate::schema::{SchemaElement, SchemaProvider};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Minimum sample size before any suggestion is made.
const MIN_SAMPLES: usize = 2;
/// Sample size at which a suggestion is graded high confidence.
const HIGH_CONFIDENCE_SAMPLES: usize = 5;
/// Largest distinct-value set proposed as an allowed-values rule.
const MAX_ALLOWED_VALUES: usize = 5;
/// Example values retained as evidence per suggestion.
const MAX_EXAMPLES: usize = 3;

/// Observed data backing a suggestion.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Evidence {
    /// Number of sampled instances supporting the suggestion.
    pub sample_count: usize,
    /// A few observed values, in first-seen order.
    pub examples: Vec<Value>,
}

/// One proposed rule with its supporting evidence.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub rule: RuleDefinition,
    pub reasoning: String,
    pub evidence: Evidence,
    pub confidence: Confidence,
}

/// Per-path observations across all sampled instances of one resource type.
#[derive(Default)]
struct FieldProfile {
    /// Instances in which the path held at least one non-empty value.
    present_in: BTreeSet<usize>,
    /// Scalar occurrences, in document order.
    scalars: Vec<Value>,
    /// Instances contributing at least one scalar occurrence.
    scalar_in: BTreeSet<usize>,
    /// `system` values of coded objects at this path.
    systems: Vec<String>,
    /// Instances contributing at least one coded object.
    system_in: BTreeSet<usize>,
}

/// Derives candidate rules from repeated structure in sample documents.
pub struct SuggestionEngine<'a> {
    schemas: Option<&'a dyn SchemaProvider>,
}

impl<'a> SuggestionEngine<'a> {
    pub fn new(schemas: Option<&'a dyn SchemaProvider>) -> Self {
        Self { schemas }
    }

    /// Analyze a document (a single resource or a bundle of entries) and
    /// propose rules not already covered by `existing` or by schema
    /// constraints. Output order is deterministic: resource types and field
    /// paths appear in first-seen document order.
    pub fn suggest(&self, document: &Value, existing: &RuleSet) -> Vec<Suggestion> {
        let mut groups: IndexMap<String, Vec<&Value>> = IndexMap::new();
        for resource in sample_resources(document) {
            if let Some(resource_type) = resource.get("resourceType").and_then(Value::as_str) {
                groups
                    .entry(resource_type.to_string())
                    .or_default()
                    .push(resource);
            }
        }

        let mut suggestions = Vec::new();
        for (resource_type, instances) in &groups {
            if instances.len() < MIN_SAMPLES {
                tracing::debug!(
                    resource_type,
                    samples = instances.len(),
                    "too few samples to suggest rules"
                );
                continue;
            }
            self.suggest_for_type(resource_type, instances, existing, &mut suggestions);
        }
        suggestions
    }

    fn suggest_for_type(
        &self,
        resource_type: &str,
        instances: &[&Value],
        existing: &RuleSet,
        out: &mut Vec<Suggestion>,
    ) {
        let mut profiles: IndexMap<String, FieldProfile> = IndexMap::new();
        for (idx, instance) in instances.iter().enumerate() {
            profile_value(instance, "", idx, &mut profiles);
        }

        let schema = self
            .schemas
            .and_then(|provider| provider.resolve(resource_type));
        let total = instances.len();

        for (path, profile) in &profiles {
            let covered = |kind: RuleKind| rule_exists(existing, resource_type, path, kind);
            let element = schema.and_then(|root| root.descend(path));

            self.suggest_required(resource_type, path, profile, total, element, &covered, out);
            self.suggest_scalar_shape(resource_type, path, profile, element, &covered, out);
            self.suggest_code_system(resource_type, path, profile, &covered, out);
        }
    }

    fn suggest_required(
        &self,
        resource_type: &str,
        path: &str,
        profile: &FieldProfile,
        total: usize,
        element: Option<&SchemaElement>,
        covered: &dyn Fn(RuleKind) -> bool,
        out: &mut Vec<Suggestion>,
    ) {
        if profile.present_in.len() != total || covered(RuleKind::Required) {
            return;
        }
        // A schema-level minimum already enforces presence.
        if element.is_some_and(|e| e.min >= 1) {
            return;
        }
        out.push(Suggestion {
            rule: RuleDefinition::new(resource_type, RuleKind::Required, path),
            reasoning: format!("'{path}' is present and non-empty in all {total} sampled instances"),
            evidence: Evidence {
                sample_count: total,
                examples: first_examples(&profile.scalars),
            },
            confidence: confidence_for(total),
        });
    }

    fn suggest_scalar_shape(
        &self,
        resource_type: &str,
        path: &str,
        profile: &FieldProfile,
        element: Option<&SchemaElement>,
        covered: &dyn Fn(RuleKind) -> bool,
        out: &mut Vec<Suggestion>,
    ) {
        let supporting = profile.scalar_in.len();
        if supporting < MIN_SAMPLES {
            return;
        }
        // A schema enumeration already constrains the value set.
        if element.is_some_and(|e| e.enumeration.is_some()) {
            return;
        }
        if covered(RuleKind::AllowedValues) {
            return;
        }

        let mut distinct: Vec<Value> = Vec::new();
        for value in &profile.scalars {
            if !distinct.contains(value) {
                distinct.push(value.clone());
            }
        }

        if distinct.len() == 1 {
            if covered(RuleKind::FixedValue) {
                return;
            }
            let expected = distinct.remove(0);
            out.push(Suggestion {
                rule: RuleDefinition::new(resource_type, RuleKind::FixedValue, path)
                    .with_metadata(RuleMetadata {
                        expected_value: Some(expected.clone()),
                        ..Default::default()
                    }),
                reasoning: format!(
                    "'{path}' holds the identical value across {supporting} sampled instances"
                ),
                evidence: Evidence {
                    sample_count: supporting,
                    examples: vec![expected],
                },
                confidence: confidence_for(supporting),
            });
        } else if distinct.len() <= MAX_ALLOWED_VALUES {
            out.push(Suggestion {
                rule: RuleDefinition::new(resource_type, RuleKind::AllowedValues, path)
                    .with_metadata(RuleMetadata {
                        allowed_values: Some(distinct.clone()),
                        ..Default::default()
                    }),
                reasoning: format!(
                    "'{path}' draws from {} distinct values across {supporting} sampled instances",
                    distinct.len()
                ),
                evidence: Evidence {
                    sample_count: supporting,
                    examples: first_examples(&distinct),
                },
                confidence: confidence_for(supporting),
            });
        }
    }

    fn suggest_code_system(
        &self,
        resource_type: &str,
        path: &str,
        profile: &FieldProfile,
        covered: &dyn Fn(RuleKind) -> bool,
        out: &mut Vec<Suggestion>,
    ) {
        let supporting = profile.system_in.len();
        if supporting < MIN_SAMPLES || covered(RuleKind::CodeSystem) {
            return;
        }
        let Some(first) = profile.systems.first() else {
            return;
        };
        if !profile.systems.iter().all(|system| system == first) {
            return;
        }
        out.push(Suggestion {
            rule: RuleDefinition::new(resource_type, RuleKind::CodeSystem, path).with_metadata(
                RuleMetadata {
                    system_url: Some(first.clone()),
                    ..Default::default()
                },
            ),
            reasoning: format!(
                "codings at '{path}' all reference '{first}' across {supporting} sampled instances"
            ),
            evidence: Evidence {
                sample_count: supporting,
                examples: vec![Value::String(first.clone())],
            },
            confidence: confidence_for(supporting),
        });
    }
}

fn confidence_for(samples: usize) -> Confidence {
    if samples >= HIGH_CONFIDENCE_SAMPLES {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

fn first_examples(values: &[Value]) -> Vec<Value> {
    let mut examples: Vec<Value> = Vec::new();
    for value in values {
        if !examples.contains(value) {
            examples.push(value.clone());
        }
        if examples.len() == MAX_EXAMPLES {
            break;
        }
    }
    examples
}

fn rule_exists(existing: &RuleSet, resource_type: &str, path: &str, kind: RuleKind) -> bool {
    existing.for_resource(resource_type).any(|rule| {
        rule.definition.field_path == path && rule.definition.kind == kind
    })
}

/// Instances to profile: bundle entry resources, or the document itself.
fn sample_resources(document: &Value) -> Vec<&Value> {
    if let Some(entries) = document.get("entry").and_then(Value::as_array) {
        entries
            .iter()
            .filter_map(|entry| entry.get("resource"))
            .filter(|resource| resource.is_object())
            .collect()
    } else if document.is_object() {
        vec![document]
    } else {
        Vec::new()
    }
}

/// Record observations for every dotted path under `value`. Sequence
/// entries share their container's path so repeated fields aggregate.
fn profile_value(
    value: &Value,
    path: &str,
    idx: usize,
    profiles: &mut IndexMap<String, FieldProfile>,
) {
    match value {
        Value::Object(fields) => {
            if path.is_empty() {
                for (key, child) in fields {
                    if key == "resourceType" {
                        continue;
                    }
                    profile_value(child, key, idx, profiles);
                }
                return;
            }
            let profile = profiles.entry(path.to_string()).or_default();
            profile.present_in.insert(idx);
            if let (Some(system), Some(_)) = (
                fields.get("system").and_then(Value::as_str),
                fields.get("code"),
            ) {
                profile.systems.push(system.to_string());
                profile.system_in.insert(idx);
            }
            for (key, child) in fields {
                profile_value(child, &format!("{path}.{key}"), idx, profiles);
            }
        }
        Value::Array(items) => {
            for item in items {
                profile_value(item, path, idx, profiles);
            }
        }
        scalar => {
            if path.is_empty() {
                return;
            }
            let profile = profiles.entry(path.to_string()).or_default();
            if !value_is_empty(scalar) {
                profile.present_in.insert(idx);
                profile.scalars.push(scalar.clone());
                profile.scalar_in.insert(idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::InMemorySchemaProvider;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn bundle(statuses: &[&str]) -> Value {
        let entries: Vec<Value> = statuses
            .iter()
            .map(|status| {
                json!({"resource": {
                    "resourceType": "Observation",
                    "status": status,
                    "code": {"system": "http://loinc.org", "code": "1234-5"}
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
    fn test_identical_values_suggest_fixed_value() {
        let doc = bundle(&["final"; 6]);
        let engine = SuggestionEngine::new(None);
        let suggestions = engine.suggest(&doc, &RuleSet::default());

        let fixed = find(&suggestions, RuleKind::FixedValue, "status").unwrap();
        assert_eq!(fixed.rule.metadata.expected_value, Some(json!("final")));
        assert_eq!(fixed.evidence.sample_count, 6);
        assert_eq!(fixed.confidence, Confidence::High);
    }

    #[test]
    fn test_small_distinct_set_suggests_allowed_values() {
        let doc = bundle(&["final", "amended", "final"]);
        let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());

        let allowed = find(&suggestions, RuleKind::AllowedValues, "status").unwrap();
        assert_eq!(
            allowed.rule.metadata.allowed_values,
            Some(vec![json!("final"), json!("amended")])
        );
        assert_eq!(allowed.confidence, Confidence::Medium);
        assert!(find(&suggestions, RuleKind::FixedValue, "status").is_none());
    }

    #[test]
    fn test_single_sample_yields_nothing() {
        let doc = bundle(&["final"]);
        let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_universal_presence_suggests_required() {
        let doc = bundle(&["final", "amended"]);
        let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());
        assert!(find(&suggestions, RuleKind::Required, "status").is_some());
    }

    #[test]
    fn test_shared_system_suggests_code_system() {
        let doc = bundle(&["final", "amended"]);
        let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());

        let code_system = find(&suggestions, RuleKind::CodeSystem, "code").unwrap();
        assert_eq!(
            code_system.rule.metadata.system_url,
            Some("http://loinc.org".to_string())
        );
    }

    #[test]
    fn test_existing_rules_suppress_duplicates() {
        let doc = bundle(&["final"; 6]);
        let existing = RuleSet::load(vec![
            RuleDefinition::new("Observation", RuleKind::AllowedValues, "status").with_metadata(
                RuleMetadata {
                    allowed_values: Some(vec![json!("final"), json!("amended")]),
                    ..Default::default()
                },
            ),
            RuleDefinition::new("Observation", RuleKind::CodeSystem, "code").with_metadata(
                RuleMetadata {
                    system_url: Some("http://loinc.org".to_string()),
                    ..Default::default()
                },
            ),
        ])
        .unwrap();
        let suggestions = SuggestionEngine::new(None).suggest(&doc, &existing);

        // An allowed-values rule covers the value-set concern entirely.
        assert!(find(&suggestions, RuleKind::FixedValue, "status").is_none());
        assert!(find(&suggestions, RuleKind::AllowedValues, "status").is_none());
        assert!(find(&suggestions, RuleKind::CodeSystem, "code").is_none());
        assert!(find(&suggestions, RuleKind::Required, "status").is_some());
    }

    #[test]
    fn test_schema_constraints_suppress_suggestions() {
        use crate::schema::{PrimitiveType, SchemaElement};

        let mut provider = InMemorySchemaProvider::default();
        provider.insert(
            "Observation",
            SchemaElement::object(1, Some(1)).with_element(
                "status",
                SchemaElement::scalar(PrimitiveType::String, 1, Some(1))
                    .with_enumeration(vec!["final", "amended"]),
            ),
        );

        let doc = bundle(&["final", "amended"]);
        let suggestions = SuggestionEngine::new(Some(&provider)).suggest(&doc, &RuleSet::default());

        assert!(find(&suggestions, RuleKind::AllowedValues, "status").is_none());
        assert!(find(&suggestions, RuleKind::Required, "status").is_none());
    }

    #[test]
    fn test_mixed_resource_types_grouped_independently() {
        let doc = json!({"resourceType": "Bundle", "entry": [
            {"resource": {"resourceType": "Patient", "gender": "male"}},
            {"resource": {"resourceType": "Patient", "gender": "male"}},
            {"resource": {"resourceType": "Observation", "status": "final"}}
        ]});
        let suggestions = SuggestionEngine::new(None).suggest(&doc, &RuleSet::default());

        // Only Patient reaches the sample floor.
        assert!(suggestions.iter().all(|s| s.rule.resource_type == "Patient"));
        assert!(find(&suggestions, RuleKind::FixedValue, "gender").is_some());
    }
}
