// processors/permutation.rs — Lead permutations with size-1 loops
//
// A loop pinned to one iteration, or over a dimension of size one, never
// changes the order of the others. Placing such dimensions at the front of
// the permutation spares the mapper from enumerating their positions.
//
// Storage leaves contribute their temporal constraint; any leaf with a
// fanout above one contributes its spatial constraint.

use tracing::debug;

use crate::diag::Result;
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::model::constraints::factors;
use crate::model::{arch, problem};
use crate::pass::ProcessorId;
use crate::spec::Specification;
use crate::tree::{Tree, Value};

use super::{list_at, Processor};

pub struct PermutationOptimizer;

impl Processor for PermutationOptimizer {
    fn id(&self) -> ProcessorId {
        ProcessorId::PermutationOptimizer
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let problem = spec.problem()?;
        let unit_dims: Vec<String> = problem::dimensions(&spec.tree, problem)?
            .into_iter()
            .filter(|d| problem::dimension_size(&spec.tree, problem, d) == Some(1))
            .collect();

        let tree = &mut spec.tree;
        for constraint in iteration_constraints(tree, spec.root)? {
            let pinned: Vec<String> = match tree.opt_child(constraint, "factors") {
                Some(list) => factors(tree, list)?
                    .into_iter()
                    .filter(|f| f.int_value() == Some(1))
                    .map(|f| f.name)
                    .collect(),
                None => Vec::new(),
            };
            let permutation = list_at(tree, constraint, "permutation", NodeKind::Permutation)?;
            for dim in pinned.iter().chain(&unit_dims) {
                if !tree.strings(permutation).contains(dim) {
                    tree.insert(permutation, 0, Value::from(dim.as_str()))?;
                }
            }
            debug!(
                path = %tree.path(constraint),
                permutation = ?tree.strings(permutation),
                "permutation"
            );
        }
        Ok(())
    }
}

fn iteration_constraints(tree: &Tree, root: NodeId) -> Result<Vec<NodeId>> {
    let mut found = Vec::new();
    for leaf in arch::leaves(tree, root) {
        let group = tree.child(leaf, "constraints")?;
        if tree.kind(leaf) == NodeKind::Storage {
            found.push(tree.child(group, "temporal")?);
        }
        if arch::fanout(tree, leaf).is_some_and(|n| n > 1) {
            found.push(tree.child(group, "spatial")?);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{SpecOptions, Specification};
    use pretty_assertions::assert_eq;

    const YAML: &str = r#"
problem:
  shape:
    dimensions: [A, B, C, D]
    data_spaces:
    - {name: X, projection: [[[A]], [[B]]]}
    - {name: Y, projection: [[[C]], [[D]]], read_write: True}
  instance: {A: 4, B: 2, C: 1, D: 8}
architecture:
  version: 0.4
  nodes:
  - !Component
    name: Buffer
    class: SRAM
    attributes: {width: 8, depth: 8, datawidth: 8, block_size: 1}
    constraints:
      temporal: {factors: [A=1, D=8], permutation: [D]}
  - !Component
    name: PE
    class: regfile
    spatial: {meshX: 4}
    attributes: {width: 8, depth: 8, datawidth: 8, block_size: 1}
    constraints:
      spatial: {factors: [B=1]}
  - !Component {name: MAC, class: intmac}
"#;

    fn run() -> Specification {
        let options = SpecOptions {
            processors: vec![
                ProcessorId::References2Copies,
                ProcessorId::ConstraintAttacher,
                ProcessorId::PermutationOptimizer,
            ],
            ..SpecOptions::default()
        };
        let mut spec = Specification::from_yaml_str(YAML, options).unwrap();
        spec.process(None, Default::default()).unwrap();
        spec
    }

    fn permutation(spec: &Specification, leaf: &str, key: &str) -> Vec<String> {
        let arch = spec.architecture().unwrap();
        let group = arch::name2constraints(&spec.tree, arch, leaf).unwrap();
        let constraint = spec.tree.child(group, key).unwrap();
        spec.tree
            .strings(spec.tree.child(constraint, "permutation").unwrap())
    }

    #[test]
    fn unit_loops_are_prepended() {
        let spec = run();
        // A is pinned to one, C has size one; each insertion goes to the front.
        assert_eq!(
            permutation(&spec, "Buffer", "temporal"),
            vec!["C", "A", "D"]
        );
    }

    #[test]
    fn spatial_constraints_need_a_fanout() {
        let spec = run();
        assert_eq!(permutation(&spec, "PE", "spatial"), vec!["C", "B"]);
        assert!(permutation(&spec, "Buffer", "spatial").is_empty());
        // Compute leaves carry no temporal loops of their own.
        assert!(permutation(&spec, "MAC", "temporal").is_empty());
    }

    #[test]
    fn present_dimensions_are_not_repeated() {
        let mut spec = run();
        spec.process(
            Some(&[ProcessorId::PermutationOptimizer]),
            crate::spec::ProcessOptions {
                reprocess: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            permutation(&spec, "Buffer", "temporal"),
            vec!["C", "A", "D"]
        );
    }
}
