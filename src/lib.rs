//! Clinical Document Validation Engine
//!
//! This crate validates health-data documents through a fixed pipeline of
//! independent stages: structural checking against schema metadata,
//! configurable rule evaluation over resource-relative field paths, and an
//! optional typed object-model pass. Every violation is reported as a
//! finding with a stable code, an exact document pointer and a
//! deterministic explanation; the pipeline also derives candidate rules
//! from sample documents.

pub mod error;
pub mod explain;
pub mod finding;
pub mod node;
pub mod pipeline;
pub mod rules;
pub mod schema;
pub mod structural;
pub mod suggest;

// Re-export main types for convenience
pub use error::{Result, ValidatorError};
pub use explain::{Confidence, Explanation, explain, verify_templates};
pub use finding::{Authority, Finding, Severity, ValidationReport, ValidationStats, codes};
pub use node::{DocumentNode, NodeKind, Pointer, Segment};
pub use pipeline::{
    ObjectModelValidator, ValidationMode, ValidationOptions, ValidationPipeline,
};
pub use rules::{
    CompiledRule, EvaluationError, ExpressionEvaluator, FilterOp, FilterPredicate, InstanceScope,
    RuleDefinition, RuleEngine, RuleKind, RuleMetadata, RuleSet,
};
pub use schema::{
    ElementKind, InMemorySchemaProvider, PrimitiveType, SchemaElement, SchemaProvider,
};
pub use structural::StructuralValidator;
pub use suggest::{Evidence, Suggestion, SuggestionEngine};
