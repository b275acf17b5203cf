//! Validation pipeline orchestration.
//!
//! One entry point drives the fixed stage sequence: well-formedness,
//! structural validation, advisory lint, rule evaluation, then the optional
//! object-model pass. Stages never short-circuit each other and their
//! findings are never deduplicated; a fault inside one stage is contained
//! as a single finding and the remaining stages still run. Only the two
//! pre-validation conditions (unreadable document, bad configuration) are
//! surfaced as errors instead of findings.

use crate::error::{Result, ValidatorError};
use crate::explain::{explain, verify_templates};
use crate::finding::{Authority, Finding, Severity, ValidationReport, ValidationStats, codes};
use crate::node::{DocumentNode, Pointer};
use crate::rules::{ExpressionEvaluator, RuleEngine, RuleSet};
use crate::schema::{SchemaElement, SchemaProvider};
use crate::structural::StructuralValidator;
use serde_json::{Map, Value};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

/// Validation depth. `Debug` additionally runs the advisory lint stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    Normal,
    Debug,
}

/// Per-run options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    pub mode: ValidationMode,
    /// Soft deadline, checked between stages only. An expired deadline
    /// skips the remaining stages; it never truncates a running stage.
    pub deadline: Option<Instant>,
}

/// Optional typed-model pass run after all core stages. Its findings are
/// retagged with the `ObjectModel` authority so downstream consumers can
/// tell the sources apart.
pub trait ObjectModelValidator {
    fn validate(&self, document: &Value) -> Vec<Finding>;
}

/// One resource within the document, with its base pointer.
struct Resource<'a> {
    resource_type: String,
    value: &'a Value,
    base: Pointer,
}

/// The validation pipeline. Holds the run-invariant collaborators; one
/// instance serves any number of `validate` calls.
pub struct ValidationPipeline<'a> {
    schemas: &'a dyn SchemaProvider,
    structural: StructuralValidator,
    object_model: Option<&'a dyn ObjectModelValidator>,
    evaluator: Option<&'a dyn ExpressionEvaluator>,
}

impl<'a> ValidationPipeline<'a> {
    /// Build a pipeline over a schema provider. Explanation templates are
    /// verified here so a bad template is a configuration error at startup,
    /// not a malformed explanation at runtime.
    pub fn new(schemas: &'a dyn SchemaProvider) -> Result<Self> {
        verify_templates()?;
        Ok(Self {
            schemas,
            structural: StructuralValidator::new(),
            object_model: None,
            evaluator: None,
        })
    }

    pub fn with_object_model(mut self, validator: &'a dyn ObjectModelValidator) -> Self {
        self.object_model = Some(validator);
        self
    }

    pub fn with_expression_evaluator(mut self, evaluator: &'a dyn ExpressionEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Run the full stage sequence over a document.
    ///
    /// The document is either a single resource or a bundle with an `entry`
    /// sequence; bundle findings are pointed at `/entry/{i}/resource/...`.
    pub fn validate(
        &self,
        document: &Value,
        rules: &RuleSet,
        options: ValidationOptions,
    ) -> Result<ValidationReport> {
        let started = Instant::now();
        let resources = collect_resources(document)?;
        tracing::debug!(resources = resources.len(), "document accepted");

        let mut stats = ValidationStats::default();
        let mut findings = Vec::new();
        let mut stages: Vec<(&str, Authority, StageFn<'_>)> = Vec::new();

        stages.push((
            "structural",
            Authority::Structure,
            Box::new(|stats: &mut ValidationStats| {
                let mut produced = Vec::new();
                for resource in &resources {
                    let Some(schema) = self.schemas.resolve(&resource.resource_type) else {
                        tracing::debug!(
                            resource_type = %resource.resource_type,
                            "no structural schema for resource type"
                        );
                        continue;
                    };
                    produced.extend(self.structural.validate(
                        resource.value,
                        schema,
                        &resource.base,
                        stats,
                    ));
                }
                produced
            }),
        ));

        if options.mode == ValidationMode::Debug {
            stages.push((
                "lint",
                Authority::Lint,
                Box::new(|_: &mut ValidationStats| {
                    let mut produced = Vec::new();
                    for resource in &resources {
                        let schema = self.schemas.resolve(&resource.resource_type);
                        let node = DocumentNode::new(resource.value, resource.base.clone());
                        lint_node(&node, schema, true, &mut produced);
                    }
                    produced
                }),
            ));
        }

        stages.push((
            "rules",
            Authority::Rule,
            Box::new(|stats: &mut ValidationStats| {
                let engine = RuleEngine::new(self.evaluator);
                let mut produced = Vec::new();
                for resource in &resources {
                    produced.extend(engine.evaluate(
                        resource.value,
                        &resource.resource_type,
                        &resource.base,
                        rules,
                        stats,
                    ));
                }
                produced
            }),
        ));

        if let Some(object_model) = self.object_model {
            stages.push((
                "objectModel",
                Authority::ObjectModel,
                Box::new(|_: &mut ValidationStats| {
                    object_model
                        .validate(document)
                        .into_iter()
                        .map(|mut finding| {
                            finding.authority = Authority::ObjectModel;
                            finding
                        })
                        .collect()
                }),
            ));
        }

        for (name, authority, stage) in stages {
            if let Some(deadline) = options.deadline
                && Instant::now() >= deadline
            {
                tracing::warn!(stage = name, "deadline expired, skipping remaining stages");
                break;
            }
            run_stage(name, authority, stage, &mut stats, &mut findings);
        }

        for finding in &mut findings {
            finding.explanation = Some(explain(finding));
        }
        stats.findings = findings.len();
        stats.duration_ms = started.elapsed().as_millis() as u64;

        Ok(ValidationReport::new(findings, stats))
    }
}

type StageFn<'s> = Box<dyn FnOnce(&mut ValidationStats) -> Vec<Finding> + 's>;

/// Run one stage with fault containment: a panic becomes a single
/// `Error`-severity finding and the pipeline moves on.
fn run_stage(
    name: &str,
    authority: Authority,
    stage: StageFn<'_>,
    stats: &mut ValidationStats,
    findings: &mut Vec<Finding>,
) {
    match catch_unwind(AssertUnwindSafe(|| stage(stats))) {
        Ok(mut produced) => {
            tracing::debug!(stage = name, findings = produced.len(), "stage completed");
            findings.append(&mut produced);
        }
        Err(_) => {
            tracing::error!(stage = name, "stage panicked");
            findings.push(
                Finding::new(
                    authority,
                    codes::INTERNAL_STAGE_FAULT,
                    Pointer::root(),
                    Severity::Error,
                )
                .with_detail("stage", name),
            );
        }
    }
}

/// Well-formedness gate. Anything rejected here never reaches a stage.
fn collect_resources(document: &Value) -> Result<Vec<Resource<'_>>> {
    let Value::Object(root) = document else {
        return Err(ValidatorError::malformed("document root is not an object"));
    };

    if let Some(entries) = root.get("entry") {
        let Value::Array(entries) = entries else {
            return Err(ValidatorError::malformed("bundle 'entry' is not a sequence"));
        };
        let mut resources = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let Some(resource) = entry.get("resource") else {
                return Err(ValidatorError::malformed(format!(
                    "bundle entry {i} has no 'resource'"
                )));
            };
            let base = Pointer::root().child("entry").index(i).child("resource");
            resources.push(typed_resource(resource, base, i)?);
        }
        return Ok(resources);
    }

    Ok(vec![typed_resource(document, Pointer::root(), 0)?])
}

fn typed_resource(value: &Value, base: Pointer, index: usize) -> Result<Resource<'_>> {
    if !value.is_object() {
        return Err(ValidatorError::malformed(format!(
            "resource {index} is not an object"
        )));
    }
    let Some(resource_type) = value.get("resourceType").and_then(Value::as_str) else {
        return Err(ValidatorError::malformed(format!(
            "resource {index} has no 'resourceType'"
        )));
    };
    Ok(Resource {
        resource_type: resource_type.to_string(),
        value,
        base,
    })
}

/// Advisory lint walk: empty sequences and empty scalar values as `Lint`,
/// elements unknown to the schema as `Hint`. Never severity above `Info`.
fn lint_node(
    node: &DocumentNode<'_>,
    schema: Option<&SchemaElement>,
    at_root: bool,
    out: &mut Vec<Finding>,
) {
    match node.value() {
        Value::Object(fields) => {
            lint_object(node, fields, schema, at_root, out);
        }
        Value::Array(_) => {
            if node.is_empty() {
                out.push(Finding::advisory(
                    Authority::Lint,
                    codes::LINT_EMPTY_SEQUENCE,
                    node.pointer().clone(),
                ));
            }
            for entry in node.entries() {
                lint_node(&entry, schema, false, out);
            }
        }
        Value::String(_) if node.is_empty() => {
            out.push(Finding::advisory(
                Authority::Lint,
                codes::LINT_EMPTY_VALUE,
                node.pointer().clone(),
            ));
        }
        _ => {}
    }
}

fn lint_object(
    node: &DocumentNode<'_>,
    fields: &Map<String, Value>,
    schema: Option<&SchemaElement>,
    at_root: bool,
    out: &mut Vec<Finding>,
) {
    for key in fields.keys() {
        if at_root && key == "resourceType" {
            continue;
        }
        let Some(child) = node.child(key) else {
            continue;
        };
        let child_schema = schema
            .and_then(|element| element.elements.as_ref())
            .and_then(|elements| elements.get(key));
        // Unknown elements are only flagged where the schema closes the
        // element set at this level.
        if schema.is_some_and(|element| element.elements.is_some()) && child_schema.is_none() {
            out.push(Finding::advisory(
                Authority::Hint,
                codes::HINT_UNKNOWN_ELEMENT,
                child.pointer().clone(),
            ));
        }
        lint_node(&child, child_schema, false, out);
    }
}
