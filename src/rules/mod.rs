//! Configurable rule layer: definitions, path resolution, and evaluation.

pub mod definition;
pub mod engine;
pub mod path;

pub use definition::{
    CompiledRule, FilterOp, FilterPredicate, InstanceScope, RuleDefinition, RuleKind,
    RuleMetadata, RuleSet,
};
pub use engine::{EvaluationError, ExpressionEvaluator, RuleEngine};
pub use path::{Resolution, resolve};
