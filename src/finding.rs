//! The unified finding model shared by every validation authority.
//!
//! A [`Finding`] is one detected violation: which authority produced it, a
//! stable code, the exact document pointer, a severity and a structured
//! code-specific `details` payload. Serialized field names are stable wire
//! contract (`authority`, `code`, `pointer`, `severity`, `details`,
//! `explanation`).

use crate::explain::Explanation;
use crate::node::Pointer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable finding codes.
pub mod codes {
    // Structural authority
    pub const INVALID_ENUM_VALUE: &str = "INVALID_ENUM_VALUE";
    pub const INVALID_PRIMITIVE_FORMAT: &str = "INVALID_PRIMITIVE_FORMAT";
    pub const ELEMENT_SHAPE_MISMATCH: &str = "ELEMENT_SHAPE_MISMATCH";
    pub const CARDINALITY_OUT_OF_RANGE: &str = "CARDINALITY_OUT_OF_RANGE";
    pub const REQUIRED_ELEMENT_MISSING: &str = "REQUIRED_ELEMENT_MISSING";

    // Rule authority
    pub const REQUIRED_FIELD_MISSING: &str = "REQUIRED_FIELD_MISSING";
    pub const FIXED_VALUE_MISMATCH: &str = "FIXED_VALUE_MISMATCH";
    pub const VALUE_NOT_ALLOWED: &str = "VALUE_NOT_ALLOWED";
    pub const PATTERN_MISMATCH: &str = "PATTERN_MISMATCH";
    pub const ARRAY_LENGTH_OUT_OF_RANGE: &str = "ARRAY_LENGTH_OUT_OF_RANGE";
    pub const CODE_SYSTEM_MISMATCH: &str = "CODE_SYSTEM_MISMATCH";
    pub const CUSTOM_EXPRESSION_FAILED: &str = "CUSTOM_EXPRESSION_FAILED";
    pub const EXPRESSION_EVALUATION_ERROR: &str = "EXPRESSION_EVALUATION_ERROR";
    pub const SCOPE_INDEX_OUT_OF_RANGE: &str = "SCOPE_INDEX_OUT_OF_RANGE";

    // Advisory authorities
    pub const LINT_EMPTY_SEQUENCE: &str = "LINT_EMPTY_SEQUENCE";
    pub const LINT_EMPTY_VALUE: &str = "LINT_EMPTY_VALUE";
    pub const HINT_UNKNOWN_ELEMENT: &str = "HINT_UNKNOWN_ELEMENT";

    // Pipeline fault containment
    pub const INTERNAL_STAGE_FAULT: &str = "INTERNAL_STAGE_FAULT";
}

/// The validation source a finding originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Authority {
    Structure,
    Rule,
    ObjectModel,
    Lint,
    Hint,
}

/// Finding severity, ordered `Info < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One detected violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub authority: Authority,
    pub code: String,
    pub pointer: Pointer,
    pub severity: Severity,
    /// Structured, code-specific payload. Populated from schema metadata or
    /// the rule's own metadata, never inferred from user data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
    /// Deterministic explanation, attached centrally by the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

impl Finding {
    pub fn new(
        authority: Authority,
        code: impl Into<String>,
        pointer: Pointer,
        severity: Severity,
    ) -> Self {
        Self {
            authority,
            code: code.into(),
            pointer,
            severity,
            details: Map::new(),
            explanation: None,
        }
    }

    /// An `Error`-severity structural finding.
    pub fn structural(code: impl Into<String>, pointer: Pointer) -> Self {
        Self::new(Authority::Structure, code, pointer, Severity::Error)
    }

    /// An `Error`-severity rule finding.
    pub fn rule(code: impl Into<String>, pointer: Pointer) -> Self {
        Self::new(Authority::Rule, code, pointer, Severity::Error)
    }

    /// An `Info`-severity advisory finding.
    pub fn advisory(authority: Authority, code: impl Into<String>, pointer: Pointer) -> Self {
        Self::new(authority, code, pointer, Severity::Info)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}

/// Counters for one validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    /// Number of schema elements checked by the structural validator.
    pub elements_validated: usize,
    /// Number of rule evaluations performed.
    pub rules_evaluated: usize,
    /// Number of findings emitted across all stages.
    pub findings: usize,
    /// Run duration in milliseconds.
    pub duration_ms: u64,
}

/// The outcome of one validation run: the ordered finding list plus
/// run statistics. `valid` means no `Error`-severity finding was emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
    pub stats: ValidationStats,
    pub valid: bool,
}

impl ValidationReport {
    pub fn new(findings: Vec<Finding>, stats: ValidationStats) -> Self {
        let valid = !findings.iter().any(|f| f.severity == Severity::Error);
        Self {
            findings,
            stats,
            valid,
        }
    }

    /// Findings produced by one authority.
    pub fn by_authority(&self, authority: Authority) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.authority == authority)
    }
}
