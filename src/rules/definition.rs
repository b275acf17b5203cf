//! User-authored rule definitions.
//!
//! A [`RuleDefinition`] is a constraint over a resource-relative field path,
//! scoped to repeated instances through an [`InstanceScope`]. The rule type
//! set is a closed tagged enum: evaluation is a single exhaustive match and
//! a new rule type requires an explicit new variant.
//!
//! Definitions are authored outside the core; [`RuleSet::load`] performs all
//! load-time configuration checks so that a malformed definition is rejected
//! before any validation run, distinctly from validation findings.

use crate::error::{Result, ValidatorError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// The closed set of rule types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    Required,
    FixedValue,
    AllowedValues,
    Regex,
    ArrayLength,
    CodeSystem,
    CustomExpression,
}

/// Comparison operator of a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// The named sibling field equals the literal value.
    Eq,
    /// The named sibling field contains the literal: substring match on
    /// strings, membership on arrays of scalars.
    Contains,
}

/// Minimal closed predicate over an instance's own scalar fields. No
/// nesting and no boolean composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FilterPredicate {
    /// Whether a candidate instance matches this predicate.
    pub fn matches(&self, instance: &Value) -> bool {
        let Some(field) = instance.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => field == &self.value,
            FilterOp::Contains => match (field, &self.value) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
                (Value::Array(items), needle) => items.iter().any(|item| item == needle),
                _ => false,
            },
        }
    }
}

/// Which repeated instances a rule binds to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum InstanceScope {
    /// The first instance (default).
    #[default]
    First,
    /// Every instance independently, one finding per failing instance.
    All,
    /// The instance at an exact position; absent positions are reported as
    /// out of range.
    Index { index: usize },
    /// Instances matching a predicate; zero matches is not an error.
    Filter { predicate: FilterPredicate },
}

/// Type-specific rule parameters. Only the fields relevant to the rule's
/// kind are read; [`RuleSet::load`] checks the required ones are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuleMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// One user-authored constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    /// Stable identifier assigned by the rule store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Resource type the rule applies to.
    pub resource_type: String,

    #[serde(rename = "type")]
    pub kind: RuleKind,

    /// Resource-relative dotted location expression.
    pub field_path: String,

    #[serde(default)]
    pub instance_scope: InstanceScope,

    #[serde(default)]
    pub metadata: RuleMetadata,

    /// Retired absolute-path addressing. Definitions still carrying it are
    /// rejected at load time; the engine models only the
    /// fieldPath/instanceScope pair.
    #[serde(rename = "absolutePath", skip_serializing_if = "Option::is_none")]
    pub legacy_absolute_path: Option<String>,
}

impl RuleDefinition {
    pub fn new(
        resource_type: impl Into<String>,
        kind: RuleKind,
        field_path: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            resource_type: resource_type.into(),
            kind,
            field_path: field_path.into(),
            instance_scope: InstanceScope::default(),
            metadata: RuleMetadata::default(),
            legacy_absolute_path: None,
        }
    }

    pub fn with_scope(mut self, scope: InstanceScope) -> Self {
        self.instance_scope = scope;
        self
    }

    pub fn with_metadata(mut self, metadata: RuleMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn label(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.resource_type, self.field_path))
    }
}

/// A rule definition after load-time checks, with its pattern precompiled.
#[derive(Debug)]
pub struct CompiledRule {
    pub definition: RuleDefinition,
    pub pattern: Option<Regex>,
}

/// The validated set of rules for one run.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Validate and compile rule definitions.
    ///
    /// Rejections here are configuration errors, not validation findings:
    /// a definition carrying the legacy absolute path, missing the metadata
    /// its kind requires, or carrying an uncompilable pattern or system URL
    /// never reaches a run.
    pub fn load(definitions: Vec<RuleDefinition>) -> Result<Self> {
        let mut rules = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if definition.legacy_absolute_path.is_some() {
                return Err(ValidatorError::configuration(format!(
                    "rule '{}' mixes legacy absolute-path addressing with fieldPath/instanceScope",
                    definition.label()
                )));
            }
            if definition.field_path.is_empty()
                || definition.field_path.split('.').any(str::is_empty)
            {
                return Err(ValidatorError::configuration(format!(
                    "rule '{}' has an empty field path segment",
                    definition.label()
                )));
            }
            let pattern = Self::check_metadata(&definition)?;
            rules.push(CompiledRule {
                definition,
                pattern,
            });
        }
        Ok(Self { rules })
    }

    fn check_metadata(definition: &RuleDefinition) -> Result<Option<Regex>> {
        let missing = |field: &str| {
            ValidatorError::configuration(format!(
                "rule '{}' ({:?}) is missing metadata field '{field}'",
                definition.label(),
                definition.kind
            ))
        };
        let meta = &definition.metadata;
        match definition.kind {
            RuleKind::Required => Ok(None),
            RuleKind::FixedValue => {
                meta.expected_value.as_ref().ok_or_else(|| missing("expectedValue"))?;
                Ok(None)
            }
            RuleKind::AllowedValues => {
                let allowed = meta.allowed_values.as_ref().ok_or_else(|| missing("allowedValues"))?;
                if allowed.is_empty() {
                    return Err(ValidatorError::configuration(format!(
                        "rule '{}' has an empty allowedValues set",
                        definition.label()
                    )));
                }
                Ok(None)
            }
            RuleKind::Regex => {
                let pattern = meta.pattern.as_ref().ok_or_else(|| missing("pattern"))?;
                let compiled = Regex::new(pattern).map_err(|e| {
                    ValidatorError::configuration(format!(
                        "rule '{}' has an invalid pattern: {e}",
                        definition.label()
                    ))
                })?;
                Ok(Some(compiled))
            }
            RuleKind::ArrayLength => {
                if meta.min.is_none() && meta.max.is_none() {
                    return Err(missing("min or max"));
                }
                Ok(None)
            }
            RuleKind::CodeSystem => {
                let system_url = meta.system_url.as_ref().ok_or_else(|| missing("systemUrl"))?;
                Url::parse(system_url).map_err(|e| {
                    ValidatorError::configuration(format!(
                        "rule '{}' has an invalid system URL: {e}",
                        definition.label()
                    ))
                })?;
                Ok(None)
            }
            RuleKind::CustomExpression => {
                meta.expression.as_ref().ok_or_else(|| missing("expression"))?;
                Ok(None)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules applying to one resource type.
    pub fn for_resource<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a CompiledRule> {
        self.rules
            .iter()
            .filter(move |rule| rule.definition.resource_type == resource_type)
    }
}
