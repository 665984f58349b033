// processors/actions.rs — Action vocabularies required by the energy model
//
//   Storage   leak, read, write, update
//             + metadata_* when metadata attributes are set
//             + gated_* and skipped_* under action optimizations
//             + gated_metadata_* and skipped_metadata_* under both
//             + decompression_count, compression_count under a
//               representation format
//   Compute   compute, + gated_compute and skipped_compute under action
//             optimizations
//
// Actions already listed on an element stay first; missing ones are
// appended in the order above.

use tracing::debug;

use crate::diag::Result;
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::pass::ProcessorId;
use crate::spec::Specification;
use crate::tree::{Tree, Value};

use super::{list_at, Processor};

const READ_WRITE_UPDATE: [&str; 3] = ["read", "write", "update"];

pub struct RequiredActions;

impl Processor for RequiredActions {
    fn id(&self) -> ProcessorId {
        ProcessorId::RequiredActions
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let arch = spec.architecture()?;
        let tree = &mut spec.tree;
        for storage in tree.nodes_of_kind(arch, &[NodeKind::Storage]) {
            let actions = storage_actions(tree, storage)?;
            extend_actions(tree, storage, &actions, true)?;
        }
        for compute in tree.nodes_of_kind(arch, &[NodeKind::Compute]) {
            let mut actions = vec!["compute".to_string()];
            if has_action_optimization(tree, compute) {
                actions.extend(["gated_compute".to_string(), "skipped_compute".to_string()]);
            }
            extend_actions(tree, compute, &actions, true)?;
        }
        Ok(())
    }
}

fn has_action_optimization(tree: &Tree, element: NodeId) -> bool {
    tree.opt_child(element, "sparse_optimizations")
        .and_then(|group| tree.opt_child(group, "action_optimization"))
        .is_some_and(|list| !tree.is_empty_recursive(list))
}

fn storage_actions(tree: &Tree, storage: NodeId) -> Result<Vec<String>> {
    let attributes = tree.child(storage, "attributes")?;
    let has_metadata = tree
        .get(attributes, "metadata_datawidth")?
        .is_some_and(|v| !v.is_null());
    let sparse_rep = tree
        .opt_child(storage, "sparse_optimizations")
        .and_then(|group| tree.opt_child(group, "representation_format"))
        .is_some_and(|format| !tree.is_empty_recursive(format));
    let sparse_action = has_action_optimization(tree, storage);

    let mut prefixes = vec![""];
    if has_metadata {
        prefixes.push("metadata_");
    }
    if sparse_action {
        prefixes.extend(["gated_", "skipped_"]);
        if has_metadata {
            prefixes.extend(["gated_metadata_", "skipped_metadata_"]);
        }
    }
    let mut actions = vec!["leak".to_string()];
    if sparse_rep {
        actions.extend([
            "decompression_count".to_string(),
            "compression_count".to_string(),
        ]);
    }
    for prefix in prefixes {
        actions.extend(READ_WRITE_UPDATE.iter().map(|a| format!("{prefix}{a}")));
    }
    Ok(actions)
}

/// Append `actions` to the element's `required_actions`. With `dedupe`,
/// actions already listed are skipped.
fn extend_actions(
    tree: &mut Tree,
    element: NodeId,
    actions: &[String],
    dedupe: bool,
) -> Result<()> {
    let list = list_at(tree, element, "required_actions", NodeKind::List)?;
    let mut present = tree.strings(list);
    for action in actions {
        if dedupe && present.contains(action) {
            continue;
        }
        tree.push(list, Value::from(action.as_str()))?;
        present.push(action.clone());
    }
    debug!(path = %tree.path(element), actions = ?present, "required actions");
    Ok(())
}

/// Point every element at the placeholder energy table: the basic storage
/// actions are required and `technology` is set to -1.
pub struct EnableDummyTable;

impl Processor for EnableDummyTable {
    fn id(&self) -> ProcessorId {
        ProcessorId::EnableDummyTable
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let tree = &mut spec.tree;
        let basics: Vec<String> = ["read", "write", "update", "leak"]
            .iter()
            .map(|a| a.to_string())
            .collect();
        for element in tree.nodes_of_kind(spec.root, NodeKind::ELEMENTS) {
            extend_actions(tree, element, &basics, false)?;
            let attributes = tree.child(element, "attributes")?;
            tree.set(attributes, "technology", Value::Int(-1))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::arch::name2leaf;
    use crate::spec::{SpecOptions, Specification};
    use pretty_assertions::assert_eq;

    const YAML: &str = r#"
problem:
  shape:
    dimensions: [C]
    data_spaces:
    - {name: Inputs, projection: [[[C]]]}
    - {name: Outputs, projection: [[[C]]], read_write: True}
  instance: {C: 4}
architecture:
  version: 0.4
  nodes:
  - !Component
    name: DRAM
    class: DRAM
    required_actions: [update, refresh]
    attributes: {width: 64, depth: 1024, datawidth: 8, block_size: 8}
  - !Component
    name: Buffer
    class: SRAM
    attributes:
      width: 64
      depth: 64
      datawidth: 8
      block_size: 8
      metadata_block_size: 1
      metadata_datawidth: 4
      metadata_storage_width: 16
      metadata_storage_depth: 32
  - !Component {name: MAC, class: intmac}
sparse_optimizations:
  targets:
  - target: Buffer
    representation_format:
      data_spaces: [{name: Inputs, ranks: [{format: UOP}, {format: CP}]}]
    action_optimization:
    - {type: skipping, options: [{target: Inputs, condition_on: [Outputs]}]}
  - target: MAC
    action_optimization:
    - {type: gating, options: [{target: Inputs, condition_on: [Outputs]}]}
"#;

    fn spec(processors: Vec<ProcessorId>) -> Specification {
        let options = SpecOptions {
            processors,
            ..SpecOptions::default()
        };
        let mut spec = Specification::from_yaml_str(YAML, options).unwrap();
        spec.process(None, Default::default()).unwrap();
        spec
    }

    fn actions(spec: &Specification, leaf: &str) -> Vec<String> {
        let arch = spec.architecture().unwrap();
        let leaf = name2leaf(&spec.tree, arch, leaf).unwrap();
        spec.tree
            .strings(spec.tree.child(leaf, "required_actions").unwrap())
    }

    fn required() -> Specification {
        spec(vec![
            ProcessorId::References2Copies,
            ProcessorId::SparseOptAttacher,
            ProcessorId::RequiredActions,
        ])
    }

    #[test]
    fn dense_storage_keeps_listed_actions_first() {
        let spec = required();
        assert_eq!(
            actions(&spec, "DRAM"),
            vec!["update", "refresh", "leak", "read", "write"]
        );
    }

    #[test]
    fn sparse_storage_with_metadata_needs_every_variant() {
        let spec = required();
        let got = actions(&spec, "Buffer");
        assert_eq!(got.len(), 3 + 3 * 6);
        assert_eq!(
            &got[..3],
            &["leak", "decompression_count", "compression_count"]
        );
        for action in [
            "metadata_read",
            "gated_write",
            "skipped_update",
            "gated_metadata_read",
            "skipped_metadata_write",
        ] {
            assert!(got.iter().any(|a| a == action), "missing {action}");
        }
    }

    #[test]
    fn gated_compute_needs_gated_actions() {
        let spec = required();
        assert_eq!(
            actions(&spec, "MAC"),
            vec!["compute", "gated_compute", "skipped_compute"]
        );
    }

    #[test]
    fn dummy_table_marks_every_element() {
        let spec = spec(vec![
            ProcessorId::References2Copies,
            ProcessorId::EnableDummyTable,
        ]);
        assert_eq!(
            actions(&spec, "DRAM"),
            vec!["update", "refresh", "read", "write", "update", "leak"]
        );
        let arch = spec.architecture().unwrap();
        for name in ["DRAM", "Buffer", "MAC"] {
            let leaf = name2leaf(&spec.tree, arch, name).unwrap();
            let attributes = spec.tree.child(leaf, "attributes").unwrap();
            assert_eq!(
                spec.tree.get(attributes, "technology").unwrap(),
                Some(&Value::Int(-1))
            );
        }
    }
}
