//! JSON-node structural validation.
//!
//! Checks a document subtree against externally supplied [`SchemaElement`]
//! metadata: enumeration membership, primitive format, array-vs-object
//! shape, cardinality and required presence. Every check operates purely on
//! node kind and value, no typed binding, and validation never stops at the
//! first violation within or across siblings.

use crate::finding::{Finding, ValidationStats, codes};
use crate::node::{DocumentNode, NodeKind, Pointer, value_is_empty};
use crate::schema::{ElementKind, PrimitiveType, SchemaElement};
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static date pattern"));
static DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}(-\d{2}(-\d{2}(T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2}))?)?)?$")
        .expect("static dateTime pattern")
});

/// Validator for one resource subtree against its schema metadata.
#[derive(Debug, Default)]
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a resource against its schema root, emitting all structural
    /// findings for the subtree.
    pub fn validate(
        &self,
        resource: &Value,
        schema: &SchemaElement,
        base: &Pointer,
        stats: &mut ValidationStats,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        match resource {
            Value::Object(map) => {
                self.validate_object(map, schema, base, &mut findings, stats);
            }
            other => {
                findings.push(shape_finding(base.clone(), "object", NodeKind::of(other)));
            }
        }
        findings
    }

    fn validate_object(
        &self,
        object: &Map<String, Value>,
        schema: &SchemaElement,
        pointer: &Pointer,
        findings: &mut Vec<Finding>,
        stats: &mut ValidationStats,
    ) {
        let Some(elements) = &schema.elements else {
            return;
        };
        for (name, element) in elements {
            stats.elements_validated += 1;
            match object.get(name) {
                None => self.report_missing(name.clone(), element, pointer, findings),
                Some(value) => {
                    self.check_present(value, element, &pointer.child(name), findings, stats);
                }
            }
        }
    }

    /// Required-presence check for an absent element. Fires even when the
    /// parent chain is absent, attaching the pointer to the nearest existing
    /// ancestor. Required chains propagate only through required parents:
    /// an optional absent subtree stays silent.
    fn report_missing(
        &self,
        element_path: String,
        element: &SchemaElement,
        ancestor: &Pointer,
        findings: &mut Vec<Finding>,
    ) {
        if element.min < 1 {
            return;
        }
        findings.push(
            Finding::structural(codes::REQUIRED_ELEMENT_MISSING, ancestor.clone())
                .with_detail("element", element_path.clone())
                .with_detail("min", element.min),
        );
        if let Some(children) = &element.elements {
            for (name, child) in children {
                self.report_missing(
                    format!("{element_path}.{name}"),
                    child,
                    ancestor,
                    findings,
                );
            }
        }
    }

    fn check_present(
        &self,
        value: &Value,
        element: &SchemaElement,
        pointer: &Pointer,
        findings: &mut Vec<Finding>,
        stats: &mut ValidationStats,
    ) {
        let expects_sequence = element.expects_sequence();
        let is_sequence = value.is_array();

        // Shape: a multi-valued element must be a sequence, a single-valued
        // one must not. A sequence where max <= 1 is a shape violation, never
        // silently unwrapped to its first entry.
        let mut shape_violated = false;
        if expects_sequence && !is_sequence {
            findings.push(shape_finding(pointer.clone(), "array", NodeKind::of(value)));
            shape_violated = true;
        } else if !expects_sequence && is_sequence {
            findings.push(shape_finding(
                pointer.clone(),
                expected_kind_name(element),
                NodeKind::Sequence,
            ));
            shape_violated = true;
        }

        // Required presence for an existing-but-empty sequence; distinct
        // from cardinality.
        let mut presence_fired = false;
        if element.min >= 1 && is_sequence && value_is_empty(value) {
            findings.push(
                Finding::structural(codes::REQUIRED_ELEMENT_MISSING, pointer.clone())
                    .with_detail("min", element.min),
            );
            presence_fired = true;
        }

        // Cardinality, counted over actual children. A shape or presence
        // finding for the same node supersedes it.
        if !shape_violated && !presence_fired {
            let actual = match value {
                Value::Array(items) => items.len(),
                _ => 1,
            };
            let below = actual < element.min as usize;
            let above = element.max.is_some_and(|max| actual > max as usize);
            if below || above {
                findings.push(
                    Finding::structural(codes::CARDINALITY_OUT_OF_RANGE, pointer.clone())
                        .with_detail("min", element.min)
                        .with_detail("max", element.max.map_or(json!("*"), |m| json!(m)))
                        .with_detail("actual", actual),
                );
            }
        }

        // Check each occurrence independently; never stop at the first.
        let node = DocumentNode::new(value, pointer.clone());
        if value.is_array() {
            for entry in node.entries() {
                self.check_occurrence(entry, element, findings, stats);
            }
        } else {
            self.check_occurrence(node, element, findings, stats);
        }
    }

    fn check_occurrence(
        &self,
        node: DocumentNode<'_>,
        element: &SchemaElement,
        findings: &mut Vec<Finding>,
        stats: &mut ValidationStats,
    ) {
        match (element.kind, node.kind()) {
            (ElementKind::Object | ElementKind::Array, NodeKind::Object) => {
                if let Value::Object(map) = node.value() {
                    self.validate_object(map, element, node.pointer(), findings, stats);
                }
            }
            (ElementKind::Object, kind) => {
                findings.push(shape_finding(node.pointer().clone(), "object", kind));
            }
            (ElementKind::Scalar, NodeKind::Object) => {
                findings.push(shape_finding(node.pointer().clone(), "scalar", NodeKind::Object));
            }
            (_, NodeKind::Sequence) => {
                // Nested sequences were already reported as a shape
                // violation by the parent check.
            }
            _ => {
                self.check_scalar(&node, element, findings);
            }
        }
    }

    fn check_scalar(
        &self,
        node: &DocumentNode<'_>,
        element: &SchemaElement,
        findings: &mut Vec<Finding>,
    ) {
        let value = node.value();

        // Enumeration membership applies to every non-null scalar; non-string
        // scalars compare through their JSON text form.
        if let Some(allowed) = &element.enumeration
            && !value.is_null()
        {
            let actual = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !allowed.iter().any(|a| *a == actual) {
                findings.push(
                    Finding::structural(codes::INVALID_ENUM_VALUE, node.pointer().clone())
                        .with_detail("actual", actual)
                        .with_detail("allowed", json!(allowed)),
                );
            }
        }

        if let Some(primitive) = element.primitive
            && let Some(reason) = primitive_format_error(value, primitive)
        {
            findings.push(
                Finding::structural(codes::INVALID_PRIMITIVE_FORMAT, node.pointer().clone())
                    .with_detail("actual", value.clone())
                    .with_detail("expectedType", primitive.as_str())
                    .with_detail("reason", reason),
            );
        }
    }
}

fn expected_kind_name(element: &SchemaElement) -> &'static str {
    match element.kind {
        ElementKind::Scalar => "scalar",
        ElementKind::Object => "object",
        ElementKind::Array => "array",
    }
}

fn shape_finding(pointer: Pointer, expected: &'static str, actual: NodeKind) -> Finding {
    Finding::structural(codes::ELEMENT_SHAPE_MISMATCH, pointer)
        .with_detail("expectedType", expected)
        .with_detail("actual", actual.as_str())
}

/// Format check for one declared primitive subtype. Returns a
/// human-readable reason on mismatch.
fn primitive_format_error(value: &Value, primitive: PrimitiveType) -> Option<String> {
    match primitive {
        PrimitiveType::Boolean => {
            (!value.is_boolean()).then(|| "expected a JSON boolean".to_string())
        }
        PrimitiveType::Integer => {
            (value.as_i64().is_none()).then(|| "expected a whole number".to_string())
        }
        PrimitiveType::Decimal => (!value.is_number()).then(|| "expected a number".to_string()),
        PrimitiveType::String => (!value.is_string()).then(|| "expected a string".to_string()),
        PrimitiveType::Date => match value.as_str() {
            Some(text)
                if DATE_RE.is_match(text) && NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() =>
            {
                None
            }
            _ => Some("expected an ISO-8601 date (YYYY-MM-DD)".to_string()),
        },
        PrimitiveType::DateTime => match value.as_str() {
            Some(text) if DATETIME_RE.is_match(text) => {
                // Full timestamps also get a calendar check.
                if text.contains('T') && DateTime::parse_from_rfc3339(text).is_err() {
                    Some("expected an RFC 3339 timestamp".to_string())
                } else {
                    None
                }
            }
            _ => Some("expected an ISO-8601 date or timestamp".to_string()),
        },
    }
}
