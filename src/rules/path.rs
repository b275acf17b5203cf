//! Field-path resolution against a document.
//!
//! A field path is resolved relative to the owning resource; the instance
//! scope decides which of possibly-many repeated container elements the
//! rule binds to. Scope is applied at the first repeated layer met along
//! the path; deeper sequences fan out to every entry.

use crate::node::{DocumentNode, Pointer};
use crate::rules::definition::InstanceScope;
use serde_json::Value;

/// Outcome of resolving a field path under an instance scope.
///
/// The engine needs to tell absence apart from an empty filter result
/// (zero filter matches is not an error) and from an out-of-range index
/// (always reported).
#[derive(Debug)]
pub enum Resolution<'a> {
    /// One or more locations resolved. `missing` lists scoped instances
    /// where the path broke off, so presence rules can flag each one.
    Matches {
        nodes: Vec<DocumentNode<'a>>,
        missing: Vec<Pointer>,
    },
    /// The scope filter selected no instances.
    NoFilterMatch,
    /// An `index(n)` scope pointed past the end of the repeated container.
    IndexOutOfRange {
        pointer: Pointer,
        index: usize,
        len: usize,
    },
    /// The path does not exist; `nearest` is the deepest existing ancestor.
    Absent { nearest: Pointer },
}

/// Resolve `field_path` against a resource rooted at `base`.
///
/// With `sequence_as_node` the final location is returned as the sequence
/// itself rather than fanned out per entry (used by `ArrayLength`, which
/// constrains the container).
pub fn resolve<'a>(
    resource: &'a Value,
    base: &Pointer,
    field_path: &str,
    scope: &InstanceScope,
    sequence_as_node: bool,
) -> Resolution<'a> {
    let segments: Vec<&str> = field_path.split('.').collect();
    let mut collector = Collector::default();
    walk(
        resource,
        base.clone(),
        &segments,
        scope,
        false,
        sequence_as_node,
        &mut collector,
    );
    collector.finish()
}

#[derive(Default)]
struct Collector<'a> {
    matches: Vec<DocumentNode<'a>>,
    out_of_range: Option<(Pointer, usize, usize)>,
    filter_empty: bool,
    absences: Vec<Pointer>,
}

impl<'a> Collector<'a> {
    fn finish(self) -> Resolution<'a> {
        if !self.matches.is_empty() {
            return Resolution::Matches {
                nodes: self.matches,
                missing: self.absences,
            };
        }
        if let Some((pointer, index, len)) = self.out_of_range {
            return Resolution::IndexOutOfRange {
                pointer,
                index,
                len,
            };
        }
        if self.filter_empty {
            return Resolution::NoFilterMatch;
        }
        // Report the shallowest ancestor: it is the stable location.
        let nearest = self
            .absences
            .into_iter()
            .min_by_key(|p| p.segments().len())
            .unwrap_or_default();
        Resolution::Absent { nearest }
    }

    fn record_absent(&mut self, nearest: Pointer) {
        self.absences.push(nearest);
    }
}

fn walk<'a>(
    value: &'a Value,
    pointer: Pointer,
    segments: &[&str],
    scope: &InstanceScope,
    scope_applied: bool,
    sequence_as_node: bool,
    collector: &mut Collector<'a>,
) {
    if let Value::Array(items) = value {
        // The final sequence is the node itself for container-level rules.
        if segments.is_empty() && sequence_as_node {
            collector.matches.push(DocumentNode::new(value, pointer));
            return;
        }
        if !scope_applied {
            apply_scope(
                items,
                pointer,
                segments,
                scope,
                sequence_as_node,
                collector,
            );
        } else {
            for (i, item) in items.iter().enumerate() {
                walk(
                    item,
                    pointer.index(i),
                    segments,
                    scope,
                    true,
                    sequence_as_node,
                    collector,
                );
            }
        }
        return;
    }

    let Some((head, rest)) = segments.split_first() else {
        collector.matches.push(DocumentNode::new(value, pointer));
        return;
    };

    match value.get(*head) {
        Some(child) => walk(
            child,
            pointer.child(*head),
            rest,
            scope,
            scope_applied,
            sequence_as_node,
            collector,
        ),
        None => collector.record_absent(pointer),
    }
}

fn apply_scope<'a>(
    items: &'a [Value],
    pointer: Pointer,
    segments: &[&str],
    scope: &InstanceScope,
    sequence_as_node: bool,
    collector: &mut Collector<'a>,
) {
    let selected: Vec<(usize, &Value)> = match scope {
        InstanceScope::First => items.iter().enumerate().take(1).collect(),
        InstanceScope::All => items.iter().enumerate().collect(),
        InstanceScope::Index { index } => match items.get(*index) {
            Some(item) => vec![(*index, item)],
            None => {
                collector.out_of_range = Some((pointer, *index, items.len()));
                return;
            }
        },
        InstanceScope::Filter { predicate } => {
            let matched: Vec<(usize, &Value)> = items
                .iter()
                .enumerate()
                .filter(|(_, item)| predicate.matches(item))
                .collect();
            if matched.is_empty() {
                collector.filter_empty = true;
                return;
            }
            matched
        }
    };

    if selected.is_empty() {
        // An empty sequence under first/all scope resolves to nothing; the
        // sequence pointer is the nearest existing ancestor.
        collector.record_absent(pointer);
        return;
    }

    for (i, item) in selected {
        walk(
            item,
            pointer.index(i),
            segments,
            scope,
            true,
            sequence_as_node,
            collector,
        );
    }
}
