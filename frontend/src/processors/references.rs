// processors/references.rs — Give every tree position its own node
//
// Building from raw documents caches casts by source identity, so a
// sub-document referenced twice becomes one node reachable from two slots.
// This pass walks the tree once, remembering every node it has reached; a
// node reached a second time is deep-copied and the copy takes the second
// slot.

use std::collections::HashSet;

use tracing::debug;

use crate::diag::Result;
use crate::pass::ProcessorId;
use crate::spec::Specification;
use crate::tree::Value;

use super::Processor;

pub struct References2Copies;

impl Processor for References2Copies {
    fn id(&self) -> ProcessorId {
        ProcessorId::References2Copies
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let tree = &mut spec.tree;
        let mut seen = HashSet::from([spec.root]);
        let mut stack = vec![spec.root];
        let mut copies = 0usize;
        while let Some(id) = stack.pop() {
            for (slot, value) in tree.children(id) {
                let Value::Node(child) = value else {
                    continue;
                };
                let child = if seen.contains(&child) {
                    debug!(path = %tree.path(child), "copying shared node");
                    copies += 1;
                    tree.deep_copy(child)
                } else {
                    child
                };
                // Re-seating also points the child's parent link here.
                tree.set_slot(id, &slot, Value::Node(child))?;
                seen.insert(child);
                stack.push(child);
            }
        }
        debug!(copies, "references replaced with copies");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::Raw;
    use crate::spec::{SpecOptions, Specification};
    use std::collections::HashMap;

    /// Problem and architecture where two storage levels share one
    /// attributes map by identity.
    fn shared_spec(preserve_references: bool) -> Specification {
        let attributes = Raw::map([("depth", Raw::Int(64)), ("width", Raw::Int(8))]);
        let storage = |name: &str| {
            Raw::tagged_map(
                "!Component",
                [
                    ("name", Raw::from(name)),
                    ("class", Raw::from("SRAM")),
                    ("attributes", attributes.clone()),
                ],
            )
        };
        let problem = Raw::parse_yaml(
            "shape: {dimensions: [C], data_spaces: [{name: Inputs, projection: [[[C]]]}]}\n\
             instance: {C: 4}",
        )
        .unwrap();
        let raw = Raw::map([
            (
                "architecture",
                Raw::map([
                    ("version", Raw::Float(0.4)),
                    ("nodes", Raw::list([storage("A"), storage("B")])),
                ]),
            ),
            ("problem", problem),
        ]);
        let options = SpecOptions {
            processors: vec![ProcessorId::References2Copies],
            preserve_references,
            ..SpecOptions::default()
        };
        Specification::from_raw(&raw, options).unwrap()
    }

    fn attribute_ids(spec: &Specification) -> Vec<crate::id::NodeId> {
        let arch = spec.architecture().unwrap();
        crate::model::arch::leaves(&spec.tree, arch)
            .into_iter()
            .map(|leaf| spec.tree.child(leaf, "attributes").unwrap())
            .collect()
    }

    #[test]
    fn shared_source_builds_one_node() {
        let spec = shared_spec(true);
        let ids = attribute_ids(&spec);
        assert_eq!(ids[0], ids[1]);
    }

    #[test]
    fn construction_splits_shared_nodes() {
        let mut spec = shared_spec(false);
        let ids = attribute_ids(&spec);
        assert_ne!(ids[0], ids[1]);
        spec.tree.set(ids[0], "depth", Value::Int(1)).unwrap();
        assert_eq!(
            spec.tree.get(ids[1], "depth").unwrap(),
            Some(&Value::Int(64))
        );
    }

    #[test]
    fn every_node_has_one_position_afterwards() {
        let spec = shared_spec(false);
        let mut positions: HashMap<crate::id::NodeId, usize> = HashMap::new();
        let mut stack = vec![spec.root];
        while let Some(id) = stack.pop() {
            for child in spec.tree.child_ids(id) {
                *positions.entry(child).or_default() += 1;
                stack.push(child);
            }
        }
        assert!(positions.values().all(|n| *n == 1));
        for (child, _) in positions {
            let parent = spec.tree.parent(child).unwrap();
            assert!(spec.tree.child_ids(parent).contains(&child));
        }
    }
}
