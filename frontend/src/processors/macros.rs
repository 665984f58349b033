// processors/macros.rs — Constraint shorthands expanded into primitive
// constraints
//
//   factors_only                  listed factors, every other dimension = 1
//   no_reuse                      no_temporal_reuse (temporal) or
//                                 no_multicast_no_reduction (spatial)
//   no_iteration_over_dataspaces  every dimension of the data spaces = 1
//   keep_only / bypass_only       the complement goes to the other list
//
// A `*` in any data-space list stands for every problem data space not
// already listed.

use tracing::debug;

use crate::combine::merge_into;
use crate::diag::Result;
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::model::constraints::{add_eq_factor_iff_not_exists, factor_names, factors_factory};
use crate::model::problem;
use crate::pass::ProcessorId;
use crate::registry::{Expect, Schema};
use crate::spec::Specification;
use crate::tree::{Tree, Value};

use super::{dataspace_list, list_at, partial_constraint, pop_present, Processor};

pub struct ConstraintMacro;

impl Processor for ConstraintMacro {
    fn id(&self) -> ProcessorId {
        ProcessorId::ConstraintMacro
    }

    fn declare_attrs(&self, schema: &mut Schema) {
        for kind in NodeKind::ITERATIONS {
            let class = schema.class_mut(*kind);
            class
                .attr("factors_only", &[Expect::Node(NodeKind::Factors)])
                .factory("factors_factory", factors_factory)
                .optional();
            for key in ["no_reuse", "no_iteration_over_dataspaces"] {
                class
                    .node_attr(key, NodeKind::ProblemDataspaceList)
                    .optional();
            }
        }
        let class = schema.class_mut(NodeKind::Dataspace);
        for key in ["keep_only", "bypass_only"] {
            class
                .node_attr(key, NodeKind::ProblemDataspaceList)
                .optional();
        }
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let problem = spec.problem()?;
        let all_dataspaces = problem::dataspace_names(&spec.tree, problem)?;
        let dimensions = problem::dimensions(&spec.tree, problem)?;
        let tree = &mut spec.tree;

        for list in tree.nodes_of_kind(spec.root, &[NodeKind::ProblemDataspaceList]) {
            expand_star(tree, list, &all_dataspaces)?;
        }

        for constraint in tree.nodes_of_kind(spec.root, NodeKind::ITERATIONS) {
            debug!(path = %tree.path(constraint), "iteration constraint");
            if let Some(Value::Node(list)) = pop_present(tree, constraint, "no_reuse")? {
                let names = tree.strings(list);
                let key = match tree.kind(constraint) {
                    NodeKind::Temporal => "no_temporal_reuse",
                    _ => "no_multicast_no_reduction",
                };
                let kind = tree.kind(constraint);
                let value = dataspace_list(tree, &names);
                let extra = partial_constraint(tree, kind, vec![(key, value)]);
                merge_into(tree, constraint, extra)?;
            }
            if let Some(Value::Node(only)) = pop_present(tree, constraint, "factors_only")? {
                debug!(factors = ?tree.strings(only), "factors_only");
                let pinned = factor_names(tree, only)?;
                for dim in dimensions.iter().filter(|d| !pinned.contains(d)) {
                    add_eq_factor_iff_not_exists(tree, only, dim, 1)?;
                }
                merge_factors(tree, constraint, only)?;
            }
            if let Some(Value::Node(list)) =
                pop_present(tree, constraint, "no_iteration_over_dataspaces")?
            {
                let names = tree.strings(list);
                debug!(dataspaces = ?names, "no_iteration_over_dataspaces");
                let dims = problem::dataspace2dims(tree, problem, &names)?;
                let items = dims.iter().map(|d| Value::from(format!("{d}=1"))).collect();
                let ones = tree.alloc_list(NodeKind::Factors, None, items);
                merge_factors(tree, constraint, ones)?;
            }
        }

        for constraint in tree.nodes_of_kind(spec.root, &[NodeKind::Dataspace]) {
            for (key, keeps) in [("keep_only", true), ("bypass_only", false)] {
                let Some(Value::Node(list)) = pop_present(tree, constraint, key)? else {
                    continue;
                };
                let listed = tree.strings(list);
                debug!(path = %tree.path(constraint), key, dataspaces = ?listed, "dataspace macro");
                let rest: Vec<String> = all_dataspaces
                    .iter()
                    .filter(|d| !listed.contains(d))
                    .cloned()
                    .collect();
                let (keep, bypass) = if keeps {
                    (listed, rest)
                } else {
                    (rest, listed)
                };
                let keep = dataspace_list(tree, &keep);
                let bypass = dataspace_list(tree, &bypass);
                let extra = partial_constraint(
                    tree,
                    NodeKind::Dataspace,
                    vec![("bypass", bypass), ("keep", keep)],
                );
                merge_into(tree, constraint, extra)?;
            }
        }
        Ok(())
    }
}

/// Replace a `*` entry with every data space the list does not yet name.
fn expand_star(tree: &mut Tree, list: NodeId, all: &[String]) -> Result<()> {
    let names = tree.strings(list);
    if !names.iter().any(|n| n == "*") {
        return Ok(());
    }
    debug!(path = %tree.path(list), "expanding \"*\" to every data space");
    let mut items: Vec<Value> = tree
        .items(list)
        .iter()
        .filter(|v| v.as_str() != Some("*"))
        .cloned()
        .collect();
    for ds in all.iter().filter(|d| !names.contains(d)) {
        items.push(Value::from(ds.as_str()));
    }
    tree.set_items(list, items)
}

fn merge_factors(tree: &mut Tree, constraint: NodeId, factors: NodeId) -> Result<()> {
    let existing = list_at(tree, constraint, "factors", NodeKind::Factors)?;
    merge_into(tree, existing, factors)
}
