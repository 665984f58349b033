// processors/mod.rs — The Processor trait and the processor implementations
//
// A processor is one mutating pass over a specification. It may extend the
// schema with temporary keys before the document is built; those keys are
// stamped with the processor's id so validation can name it if a key
// survives. Ordering contracts live in `pass.rs` and are checked by the
// runner before `process` is entered.
//
// Preconditions: the specification was built with every scheduled
//   processor's `declare_attrs` applied.
// Postconditions: see each processor's descriptor.
// Failure modes: each processor reports its own `SpecError`s.
// Side effects: mutate the specification tree; log through `tracing`.

mod actions;
mod attach;
mod branches;
mod macros;
mod mapspace;
mod math;
mod permutation;
mod references;
mod variables;

pub use actions::{EnableDummyTable, RequiredActions};
pub use attach::{ConstraintAttacher, SparseOptAttacher};
pub use branches::Dataspace2Branch;
pub use macros::ConstraintMacro;
pub use mapspace::{prime_factors, MapspaceSizeContributors};
pub use math::Math;
pub use permutation::PermutationOptimizer;
pub use references::References2Copies;
pub use variables::VariablesFromCli;

use crate::diag::{Result, SpecError};
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::pass::ProcessorId;
use crate::registry::Schema;
use crate::spec::Specification;
use crate::tree::{Slot, Tree, Value};

// ── Trait ──────────────────────────────────────────────────────────────────

pub trait Processor {
    fn id(&self) -> ProcessorId;

    /// Extend the schema with keys this processor consumes. Runs inside
    /// `Schema::with_responsible(self.id(), ..)`.
    fn declare_attrs(&self, _schema: &mut Schema) {}

    fn process(&self, spec: &mut Specification) -> Result<()>;
}

/// The implementation behind a processor id.
pub fn instantiate(id: ProcessorId) -> Box<dyn Processor> {
    match id {
        ProcessorId::References2Copies => Box::new(References2Copies),
        ProcessorId::ConstraintAttacher => Box::new(ConstraintAttacher),
        ProcessorId::SparseOptAttacher => Box::new(SparseOptAttacher),
        ProcessorId::ConstraintMacro => Box::new(ConstraintMacro),
        ProcessorId::Math => Box::new(Math),
        ProcessorId::Dataspace2Branch => Box::new(Dataspace2Branch),
        ProcessorId::PermutationOptimizer => Box::new(PermutationOptimizer),
        ProcessorId::RequiredActions => Box::new(RequiredActions),
        ProcessorId::MapspaceSizeContributors => Box::new(MapspaceSizeContributors),
        ProcessorId::EnableDummyTable => Box::new(EnableDummyTable),
        ProcessorId::VariablesFromCli => Box::new(VariablesFromCli),
    }
}

/// Apply every listed processor's schema extensions, each on its own behalf.
pub fn declare_all(schema: &mut Schema, processors: &[ProcessorId]) {
    for id in processors {
        let processor = instantiate(*id);
        schema.with_responsible(*id, |s| processor.declare_attrs(s));
    }
}

// ── Shared helpers ─────────────────────────────────────────────────────────

/// A fresh data-space list node holding `names`.
pub(crate) fn dataspace_list(tree: &mut Tree, names: &[String]) -> Value {
    let items = names.iter().map(|n| Value::from(n.as_str())).collect();
    Value::Node(tree.alloc_list(NodeKind::ProblemDataspaceList, None, items))
}

/// A bare constraint node of `kind` holding only `entries`, for merging
/// into an existing constraint.
pub(crate) fn partial_constraint(
    tree: &mut Tree,
    kind: NodeKind,
    entries: Vec<(&str, Value)>,
) -> NodeId {
    let entries = entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    tree.alloc_dict(kind, None, entries)
}

/// Pop a key, treating an explicit null like an absent key.
pub(crate) fn pop_present(tree: &mut Tree, id: NodeId, key: &str) -> Result<Option<Value>> {
    Ok(tree.pop(id, key)?.filter(|v| !v.is_null()))
}

/// The list node under `key`, created empty if the key is missing or null.
pub(crate) fn list_at(tree: &mut Tree, id: NodeId, key: &str, kind: NodeKind) -> Result<NodeId> {
    if let Some(existing) = tree.opt_child(id, key) {
        return Ok(existing);
    }
    let fresh = tree.alloc_list(kind, None, Vec::new());
    tree.set_slot(id, &Slot::Key(key.to_string()), Value::Node(fresh))?;
    Ok(fresh)
}

/// Every named dict node beneath `root` that has a `key` entry, in tree
/// order, and the names of all named dict nodes for error messages.
pub(crate) fn named_holders(tree: &Tree, root: NodeId, key: &str) -> (Vec<NodeId>, Vec<String>) {
    let dicts: Vec<NodeId> = tree
        .walk(root)
        .into_iter()
        .filter(|id| tree.is_dict(*id))
        .collect();
    let names = dicts
        .iter()
        .filter_map(|id| tree.name(*id).map(str::to_string))
        .collect();
    let holders = dicts
        .into_iter()
        .filter(|id| tree.contains_key(*id, key))
        .collect();
    (holders, names)
}

pub(crate) fn failure(id: ProcessorId, message: impl Into<String>) -> SpecError {
    SpecError::Processor {
        processor: id.name().to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::ALL_PROCESSORS;

    #[test]
    fn every_id_instantiates_itself() {
        for id in ALL_PROCESSORS {
            assert_eq!(instantiate(id).id(), id);
        }
    }

    #[test]
    fn declared_macro_keys_name_their_owner() {
        let mut schema = Schema::standard();
        declare_all(&mut schema, &[ProcessorId::ConstraintMacro]);
        let temporal = schema.class(NodeKind::Temporal).unwrap();
        assert_eq!(
            temporal.specifier("factors_only").unwrap().removed_by,
            Some(ProcessorId::ConstraintMacro)
        );
        assert_eq!(temporal.specifier("factors").unwrap().removed_by, None);
        let dataspace = schema.class(NodeKind::Dataspace).unwrap();
        assert!(dataspace.specifier("keep_only").is_some());
    }
}
