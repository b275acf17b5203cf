//! Deterministic explanation generation.
//!
//! [`explain`] is a pure function of a finding's `(authority, code, details)`:
//! a template lookup plus token substitution. It never inspects user data
//! beyond the `details` payload. The per-authority confidence policy is fixed
//! here, and `how` is stripped centrally whenever confidence is `low` so the
//! invariant cannot drift across generators.

use crate::error::{Result, ValidatorError};
use crate::finding::{Authority, Finding, codes};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Categorical trust level for an explanation or suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Explanation attached 1:1 to a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// What went wrong, always present.
    pub what: String,
    /// How to address it; never populated when confidence is `low`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub how: Option<String>,
    pub confidence: Confidence,
}

/// Tokens the `details` payload (plus the finding pointer) can supply.
const SUPPLIABLE_TOKENS: &[&str] = &[
    "resource",
    "path",
    "expectedValue",
    "allowedValues",
    "min",
    "max",
    "regex",
    "systemUrl",
    "actual",
    "allowed",
    "expectedType",
    "expression",
    "index",
];

struct Template {
    what: &'static str,
    how: Option<&'static str>,
    tokens: &'static [&'static str],
}

macro_rules! template {
    ($what:expr, $how:expr, [$($tok:literal),*]) => {
        Template { what: $what, how: $how, tokens: &[$($tok),*] }
    };
}

static TEMPLATES: Lazy<IndexMap<&'static str, Template>> = Lazy::new(|| {
    let mut map = IndexMap::new();
    map.insert(
        codes::INVALID_ENUM_VALUE,
        template!(
            "Value '{actual}' at {path} is not one of the allowed values: {allowed}.",
            Some("Use one of the allowed values: {allowed}."),
            ["actual", "allowed", "path"]
        ),
    );
    map.insert(
        codes::INVALID_PRIMITIVE_FORMAT,
        template!(
            "Value '{actual}' at {path} does not match the {expectedType} format.",
            Some("Supply a well-formed {expectedType} value."),
            ["actual", "expectedType", "path"]
        ),
    );
    map.insert(
        codes::ELEMENT_SHAPE_MISMATCH,
        template!(
            "Expected a {expectedType} at {path} but found a {actual}.",
            Some("Restructure the element at {path} into a {expectedType}."),
            ["expectedType", "actual", "path"]
        ),
    );
    map.insert(
        codes::CARDINALITY_OUT_OF_RANGE,
        template!(
            "Element at {path} occurs {actual} time(s); the allowed range is {min}..{max}.",
            Some("Adjust the element to occur between {min} and {max} time(s)."),
            ["actual", "min", "max", "path"]
        ),
    );
    map.insert(
        codes::REQUIRED_ELEMENT_MISSING,
        template!(
            "Required element under {path} is missing or empty.",
            Some("Add the element with at least {min} occurrence(s)."),
            ["min", "path"]
        ),
    );
    map.insert(
        codes::REQUIRED_FIELD_MISSING,
        template!(
            "Required field '{path}' on {resource} is missing or empty.",
            Some("Populate '{path}' with a non-empty value."),
            ["resource", "path"]
        ),
    );
    map.insert(
        codes::FIXED_VALUE_MISMATCH,
        template!(
            "Field at {path} must equal '{expectedValue}' but is '{actual}'.",
            Some("Set the field to '{expectedValue}'."),
            ["expectedValue", "actual", "path"]
        ),
    );
    map.insert(
        codes::VALUE_NOT_ALLOWED,
        template!(
            "Value '{actual}' at {path} is not in the allowed set: {allowedValues}.",
            Some("Use one of: {allowedValues}."),
            ["actual", "allowedValues", "path"]
        ),
    );
    map.insert(
        codes::PATTERN_MISMATCH,
        template!(
            "Value '{actual}' at {path} does not match the pattern {regex}.",
            Some("Adjust the value to match {regex}."),
            ["actual", "regex", "path"]
        ),
    );
    map.insert(
        codes::ARRAY_LENGTH_OUT_OF_RANGE,
        template!(
            "Sequence at {path} has length {actual}; the allowed range is {min}..{max}.",
            Some("Resize the sequence to between {min} and {max} entries."),
            ["actual", "min", "max", "path"]
        ),
    );
    map.insert(
        codes::CODE_SYSTEM_MISMATCH,
        template!(
            "Coding at {path} uses system '{actual}' instead of '{systemUrl}'.",
            Some("Use a coding drawn from {systemUrl}."),
            ["actual", "systemUrl", "path"]
        ),
    );
    map.insert(
        codes::CUSTOM_EXPRESSION_FAILED,
        template!(
            "Expression '{expression}' evaluated to false at {path}.",
            Some("Change the data so that '{expression}' holds."),
            ["expression", "path"]
        ),
    );
    map.insert(
        codes::EXPRESSION_EVALUATION_ERROR,
        template!(
            "Expression '{expression}' could not be evaluated.",
            Some("Fix the expression before re-running validation."),
            ["expression"]
        ),
    );
    map.insert(
        codes::SCOPE_INDEX_OUT_OF_RANGE,
        template!(
            "The rule targets instance {index} of '{path}', which does not exist.",
            Some("Point the rule at an existing instance or widen its scope."),
            ["index", "path"]
        ),
    );
    map.insert(
        codes::LINT_EMPTY_SEQUENCE,
        template!("Sequence at {path} is empty.", None, ["path"]),
    );
    map.insert(
        codes::LINT_EMPTY_VALUE,
        template!("Value at {path} is empty.", None, ["path"]),
    );
    map.insert(
        codes::HINT_UNKNOWN_ELEMENT,
        template!(
            "Element at {path} is not described by the structural schema.",
            Some("Check the element name against the resource definition."),
            ["path"]
        ),
    );
    map.insert(
        codes::INTERNAL_STAGE_FAULT,
        template!(
            "A validator stage failed unexpectedly; the remaining stages still ran.",
            Some("Report this as a validator defect together with the document."),
            []
        ),
    );
    map
});

/// Check every template at startup: declared tokens must be suppliable, and
/// every token referenced in the template text must be declared.
pub fn verify_templates() -> Result<()> {
    for (code, template) in TEMPLATES.iter() {
        for token in template.tokens {
            if !SUPPLIABLE_TOKENS.contains(token) {
                return Err(ValidatorError::configuration(format!(
                    "template '{code}' declares unsuppliable token '{token}'"
                )));
            }
        }
        let mut texts = vec![template.what];
        if let Some(how) = template.how {
            texts.push(how);
        }
        for text in texts {
            for token in referenced_tokens(text) {
                if !template.tokens.contains(&token.as_str()) {
                    return Err(ValidatorError::configuration(format!(
                        "template '{code}' references undeclared token '{token}'"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn referenced_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        tokens.push(rest[start + 1..start + len].to_string());
        rest = &rest[start + len + 1..];
    }
    tokens
}

/// Render a details value for interpolation: strings bare, sequences joined
/// with commas, everything else in its JSON text form.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn substitute(text: &str, finding: &Finding) -> String {
    let mut out = text.to_string();
    for token in referenced_tokens(text) {
        let replacement = if token == "path" {
            // Rule findings carry the authored field path; the pointer is
            // the root of the scoped instance, not the field itself.
            if finding.authority == Authority::Rule {
                finding
                    .detail("fieldPath")
                    .map(render)
                    .unwrap_or_else(|| finding.pointer.to_string())
            } else {
                finding.pointer.to_string()
            }
        } else {
            finding
                .detail(&token)
                .map(render)
                .unwrap_or_else(|| "?".to_string())
        };
        out = out.replace(&format!("{{{token}}}"), &replacement);
    }
    out
}

/// Fixed per-authority confidence policy. Structural findings with an
/// unrecognized code drop to `low`.
fn confidence_for(authority: Authority, recognized: bool) -> Confidence {
    match authority {
        Authority::Rule => Confidence::High,
        Authority::Structure => {
            if recognized {
                Confidence::Medium
            } else {
                Confidence::Low
            }
        }
        Authority::ObjectModel => Confidence::Medium,
        Authority::Lint => Confidence::Low,
        Authority::Hint => Confidence::Medium,
    }
}

/// Derive the explanation for a finding.
pub fn explain(finding: &Finding) -> Explanation {
    let template = TEMPLATES.get(finding.code.as_str());
    let confidence = confidence_for(finding.authority, template.is_some());

    let (what, how) = match template {
        Some(template) => (
            substitute(template.what, finding),
            template.how.map(|how| substitute(how, finding)),
        ),
        None => (
            format!(
                "Validation reported '{}' at {}.",
                finding.code, finding.pointer
            ),
            None,
        ),
    };

    // The low-confidence invariant is enforced here and nowhere else.
    let how = match confidence {
        Confidence::Low => None,
        _ => how,
    };

    Explanation {
        what,
        how,
        confidence,
    }
}
