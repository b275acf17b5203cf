//! Rule evaluation.
//!
//! Given resolved field locations and a compiled rule, decide satisfied or
//! violated. Evaluation is one exhaustive match over the closed rule-type
//! set; every violation becomes a `Rule`-authority finding whose details are
//! populated from the rule's own metadata, never inferred from the data, so
//! explanation templating stays deterministic.

use crate::finding::{Finding, ValidationStats, codes};
use crate::node::{DocumentNode, Pointer};
use crate::rules::definition::{CompiledRule, RuleKind, RuleSet};
use crate::rules::path::{Resolution, resolve};
use serde_json::{Value, json};
use thiserror::Error;

/// Failure reported by an expression evaluator. Converted into an
/// `EXPRESSION_EVALUATION_ERROR` finding, never a thrown fault.
#[derive(Error, Debug)]
#[error("expression evaluation failed: {message}")]
pub struct EvaluationError {
    pub message: String,
}

impl EvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// External collaborator evaluating `CustomExpression` rules against a
/// document subtree. The expression language is opaque to the core.
pub trait ExpressionEvaluator {
    fn evaluate(&self, expression: &str, subtree: &Value) -> Result<bool, EvaluationError>;
}

/// Evaluates a rule set against one resource.
pub struct RuleEngine<'a> {
    evaluator: Option<&'a dyn ExpressionEvaluator>,
}

impl<'a> RuleEngine<'a> {
    pub fn new(evaluator: Option<&'a dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Evaluate every rule bound to `resource_type`, accumulating one
    /// finding per failing location.
    pub fn evaluate(
        &self,
        resource: &Value,
        resource_type: &str,
        base: &Pointer,
        rules: &RuleSet,
        stats: &mut ValidationStats,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        for rule in rules.for_resource(resource_type) {
            stats.rules_evaluated += 1;
            self.evaluate_rule(resource, resource_type, base, rule, &mut findings);
        }
        findings
    }

    fn evaluate_rule(
        &self,
        resource: &Value,
        resource_type: &str,
        base: &Pointer,
        rule: &CompiledRule,
        findings: &mut Vec<Finding>,
    ) {
        let definition = &rule.definition;
        let sequence_as_node = definition.kind == RuleKind::ArrayLength;
        let resolution = resolve(
            resource,
            base,
            &definition.field_path,
            &definition.instance_scope,
            sequence_as_node,
        );

        match resolution {
            Resolution::IndexOutOfRange {
                pointer,
                index,
                len,
            } => {
                findings.push(
                    self.base_finding(codes::SCOPE_INDEX_OUT_OF_RANGE, pointer, rule, resource_type)
                        .with_detail("index", index)
                        .with_detail("length", len),
                );
            }
            Resolution::NoFilterMatch => {
                // Zero filter matches is not itself an error.
                tracing::debug!(
                    field_path = %definition.field_path,
                    "rule filter selected no instances"
                );
            }
            Resolution::Absent { nearest } => {
                // Absence is Required's concern; other rule types pass
                // vacuously on absent locations.
                if definition.kind == RuleKind::Required {
                    findings.push(self.base_finding(
                        codes::REQUIRED_FIELD_MISSING,
                        nearest,
                        rule,
                        resource_type,
                    ));
                }
            }
            Resolution::Matches { nodes, missing } => {
                if definition.kind == RuleKind::Required {
                    for pointer in missing {
                        findings.push(self.base_finding(
                            codes::REQUIRED_FIELD_MISSING,
                            pointer,
                            rule,
                            resource_type,
                        ));
                    }
                }
                for node in nodes {
                    self.check_node(&node, rule, resource_type, findings);
                }
            }
        }
    }

    fn check_node(
        &self,
        node: &DocumentNode<'_>,
        rule: &CompiledRule,
        resource_type: &str,
        findings: &mut Vec<Finding>,
    ) {
        let definition = &rule.definition;
        let meta = &definition.metadata;
        match definition.kind {
            RuleKind::Required => {
                if node.is_empty() {
                    findings.push(self.base_finding(
                        codes::REQUIRED_FIELD_MISSING,
                        node.pointer().clone(),
                        rule,
                        resource_type,
                    ));
                }
            }
            RuleKind::FixedValue => {
                let Some(expected) = meta.expected_value.as_ref() else {
                    return;
                };
                if node.value() != expected {
                    findings.push(
                        self.base_finding(
                            codes::FIXED_VALUE_MISMATCH,
                            node.pointer().clone(),
                            rule,
                            resource_type,
                        )
                        .with_detail("expectedValue", expected.clone())
                        .with_detail("actual", node.value().clone()),
                    );
                }
            }
            RuleKind::AllowedValues => {
                let Some(allowed) = meta.allowed_values.as_ref() else {
                    return;
                };
                if !allowed.contains(node.value()) {
                    findings.push(
                        self.base_finding(
                            codes::VALUE_NOT_ALLOWED,
                            node.pointer().clone(),
                            rule,
                            resource_type,
                        )
                        .with_detail("allowedValues", json!(allowed))
                        .with_detail("actual", node.value().clone()),
                    );
                }
            }
            RuleKind::Regex => {
                let Some(pattern) = rule.pattern.as_ref() else {
                    return;
                };
                let matched = node.value().as_str().is_some_and(|text| pattern.is_match(text));
                if !matched {
                    findings.push(
                        self.base_finding(
                            codes::PATTERN_MISMATCH,
                            node.pointer().clone(),
                            rule,
                            resource_type,
                        )
                        .with_detail("regex", pattern.as_str())
                        .with_detail("actual", node.value().clone()),
                    );
                }
            }
            RuleKind::ArrayLength => {
                let (length, sequence) = match node.value() {
                    Value::Array(items) => (items.len(), true),
                    _ => (1, false),
                };
                let below = meta.min.is_some_and(|min| length < min);
                let above = meta.max.is_some_and(|max| length > max);
                if below || above || !sequence {
                    let mut finding = self
                        .base_finding(
                            codes::ARRAY_LENGTH_OUT_OF_RANGE,
                            node.pointer().clone(),
                            rule,
                            resource_type,
                        )
                        .with_detail("min", meta.min.map_or(json!(0), |m| json!(m)))
                        .with_detail("max", meta.max.map_or(json!("*"), |m| json!(m)))
                        .with_detail("actual", length);
                    if !sequence {
                        finding =
                            finding.with_detail("reason", "resolved node is not a sequence");
                    }
                    findings.push(finding);
                }
            }
            RuleKind::CodeSystem => {
                let Some(system_url) = meta.system_url.as_ref() else {
                    return;
                };
                let actual = node.value().get("system").and_then(Value::as_str);
                if actual != Some(system_url.as_str()) {
                    findings.push(
                        self.base_finding(
                            codes::CODE_SYSTEM_MISMATCH,
                            node.pointer().clone(),
                            rule,
                            resource_type,
                        )
                        .with_detail("systemUrl", system_url.clone())
                        .with_detail("actual", actual.map_or(Value::Null, |s| json!(s))),
                    );
                }
            }
            RuleKind::CustomExpression => {
                let Some(expression) = meta.expression.as_ref() else {
                    return;
                };
                let Some(evaluator) = self.evaluator else {
                    tracing::debug!(
                        expression,
                        "no expression evaluator configured, skipping custom expression rule"
                    );
                    return;
                };
                match evaluator.evaluate(expression, node.value()) {
                    Ok(true) => {}
                    Ok(false) => {
                        findings.push(
                            self.base_finding(
                                codes::CUSTOM_EXPRESSION_FAILED,
                                node.pointer().clone(),
                                rule,
                                resource_type,
                            )
                            .with_detail("expression", expression.clone()),
                        );
                    }
                    Err(e) => {
                        findings.push(
                            self.base_finding(
                                codes::EXPRESSION_EVALUATION_ERROR,
                                node.pointer().clone(),
                                rule,
                                resource_type,
                            )
                            .with_detail("expression", expression.clone())
                            .with_detail("reason", e.message),
                        );
                    }
                }
            }
        }
    }

    fn base_finding(
        &self,
        code: &'static str,
        pointer: Pointer,
        rule: &CompiledRule,
        resource_type: &str,
    ) -> Finding {
        let mut finding = Finding::rule(code, pointer)
            .with_detail("resource", resource_type)
            .with_detail("fieldPath", rule.definition.field_path.clone());
        if let Some(id) = &rule.definition.id {
            finding = finding.with_detail("ruleId", id.clone());
        }
        finding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::definition::{
        FilterOp, FilterPredicate, InstanceScope, RuleDefinition, RuleMetadata,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct FalseEvaluator;
    impl ExpressionEvaluator for FalseEvaluator {
        fn evaluate(&self, _: &str, _: &Value) -> Result<bool, EvaluationError> {
            Ok(false)
        }
    }

    struct FailingEvaluator;
    impl ExpressionEvaluator for FailingEvaluator {
        fn evaluate(&self, expression: &str, _: &Value) -> Result<bool, EvaluationError> {
            Err(EvaluationError::new(format!("cannot parse '{expression}'")))
        }
    }

    fn patient() -> Value {
        json!({
            "resourceType": "Patient",
            "id": "example",
            "status": "draft",
            "name": [
                {"use": "official", "family": "Chalmers", "given": ["Peter"]},
                {"use": "usual", "given": ["Jim"]}
            ],
            "maritalStatus": {
                "coding": [{"system": "http://example.org/other", "code": "M"}]
            }
        })
    }

    fn run(definitions: Vec<RuleDefinition>) -> Vec<Finding> {
        run_with(definitions, None)
    }

    fn run_with(
        definitions: Vec<RuleDefinition>,
        evaluator: Option<&dyn ExpressionEvaluator>,
    ) -> Vec<Finding> {
        let rules = RuleSet::load(definitions).unwrap();
        let mut stats = ValidationStats::default();
        RuleEngine::new(evaluator).evaluate(
            &patient(),
            "Patient",
            &Pointer::root(),
            &rules,
            &mut stats,
        )
    }

    #[test]
    fn test_required_all_on_missing_field_yields_one_finding() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::Required, "address")
                .with_scope(InstanceScope::All),
        ]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, codes::REQUIRED_FIELD_MISSING);
        assert_eq!(findings[0].pointer.to_string(), "");
        assert_eq!(findings[0].detail("resource"), Some(&json!("Patient")));
    }

    #[test]
    fn test_required_all_emits_per_failing_instance() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::Required, "name.family")
                .with_scope(InstanceScope::All),
        ]);
        // Only the second name lacks a family.
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].pointer.to_string(), "/name/1");
    }

    #[test]
    fn test_fixed_value_mismatch_details_come_from_metadata() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::FixedValue, "status").with_metadata(
                RuleMetadata {
                    expected_value: Some(json!("final")),
                    ..Default::default()
                },
            ),
        ]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, codes::FIXED_VALUE_MISMATCH);
        assert_eq!(findings[0].detail("expectedValue"), Some(&json!("final")));
        assert_eq!(findings[0].detail("actual"), Some(&json!("draft")));
    }

    #[test]
    fn test_allowed_values() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::AllowedValues, "status").with_metadata(
                RuleMetadata {
                    allowed_values: Some(vec![json!("active"), json!("final")]),
                    ..Default::default()
                },
            ),
        ]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, codes::VALUE_NOT_ALLOWED);
    }

    #[test]
    fn test_regex_rule() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::Regex, "id").with_metadata(RuleMetadata {
                pattern: Some(r"^\d+$".to_string()),
                ..Default::default()
            }),
        ]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, codes::PATTERN_MISMATCH);
        assert_eq!(findings[0].detail("regex"), Some(&json!(r"^\d+$")));
    }

    #[test]
    fn test_array_length_on_container() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::ArrayLength, "name").with_metadata(
                RuleMetadata {
                    min: Some(3),
                    max: None,
                    ..Default::default()
                },
            ),
        ]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, codes::ARRAY_LENGTH_OUT_OF_RANGE);
        assert_eq!(findings[0].pointer.to_string(), "/name");
        assert_eq!(findings[0].detail("actual"), Some(&json!(2)));
    }

    #[test]
    fn test_array_length_on_non_sequence() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::ArrayLength, "status").with_metadata(
                RuleMetadata {
                    max: Some(5),
                    ..Default::default()
                },
            ),
        ]);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].detail("reason"),
            Some(&json!("resolved node is not a sequence"))
        );
    }

    #[test]
    fn test_code_system_mismatch() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::CodeSystem, "maritalStatus.coding")
                .with_metadata(RuleMetadata {
                    system_url: Some("http://terminology.hl7.org/CodeSystem/v3-MaritalStatus".to_string()),
                    ..Default::default()
                }),
        ]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, codes::CODE_SYSTEM_MISMATCH);
        assert_eq!(
            findings[0].detail("actual"),
            Some(&json!("http://example.org/other"))
        );
    }

    #[test]
    fn test_index_scope_out_of_range() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::Required, "name.family")
                .with_scope(InstanceScope::Index { index: 7 }),
        ]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, codes::SCOPE_INDEX_OUT_OF_RANGE);
        assert_eq!(findings[0].detail("index"), Some(&json!(7)));
    }

    #[test]
    fn test_filter_zero_matches_passes() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::Required, "name.family").with_scope(
                InstanceScope::Filter {
                    predicate: FilterPredicate {
                        field: "use".to_string(),
                        op: FilterOp::Eq,
                        value: json!("maiden"),
                    },
                },
            ),
        ]);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_non_required_rules_pass_on_absence() {
        let findings = run(vec![
            RuleDefinition::new("Patient", RuleKind::FixedValue, "language").with_metadata(
                RuleMetadata {
                    expected_value: Some(json!("en")),
                    ..Default::default()
                },
            ),
        ]);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_custom_expression_false_and_error() {
        let failing = run_with(
            vec![
                RuleDefinition::new("Patient", RuleKind::CustomExpression, "name").with_metadata(
                    RuleMetadata {
                        expression: Some("family.exists()".to_string()),
                        ..Default::default()
                    },
                ),
            ],
            Some(&FalseEvaluator),
        );
        assert!(failing.iter().all(|f| f.code == codes::CUSTOM_EXPRESSION_FAILED));
        assert!(!failing.is_empty());

        let erroring = run_with(
            vec![
                RuleDefinition::new("Patient", RuleKind::CustomExpression, "name").with_metadata(
                    RuleMetadata {
                        expression: Some("((".to_string()),
                        ..Default::default()
                    },
                ),
            ],
            Some(&FailingEvaluator),
        );
        assert!(erroring.iter().all(|f| f.code == codes::EXPRESSION_EVALUATION_ERROR));
        assert!(!erroring.is_empty());
    }
}
