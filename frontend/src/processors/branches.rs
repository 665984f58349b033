// processors/branches.rs — Route data spaces through parallel branches
//
// Every sibling of a `Parallel` branch keeps the data spaces named in the
// `keep` lists anywhere beneath it. Siblings may not keep the same data
// space, and together they must keep every data space still active at that
// branch. Each sibling then bypasses everything it does not keep, and nested
// branches continue with only the kept set active.

use indexmap::IndexSet;
use tracing::info;

use crate::combine::merge_into;
use crate::diag::Result;
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::model::problem;
use crate::pass::ProcessorId;
use crate::spec::Specification;
use crate::tree::Tree;

use super::{dataspace_list, failure, partial_constraint, Processor};

pub struct Dataspace2Branch;

impl Processor for Dataspace2Branch {
    fn id(&self) -> ProcessorId {
        ProcessorId::Dataspace2Branch
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let problem = spec.problem()?;
        let all: Vec<String> = problem::dataspace_names(&spec.tree, problem)?;
        let arch = spec.architecture()?;
        let active: IndexSet<String> = all.iter().cloned().collect();
        parse_branch(&mut spec.tree, arch, &active, &all)
    }
}

fn subnodes(tree: &Tree, branch: NodeId) -> Vec<NodeId> {
    tree.opt_child(branch, "nodes")
        .map(|nodes| tree.child_ids(nodes))
        .unwrap_or_default()
}

/// Union of the `keep` lists of every data-space constraint beneath `node`.
fn kept_dataspaces(tree: &Tree, node: NodeId) -> IndexSet<String> {
    tree.nodes_of_kind(node, &[NodeKind::Dataspace])
        .into_iter()
        .filter_map(|ds| tree.opt_child(ds, "keep"))
        .flat_map(|keep| tree.strings(keep))
        .collect()
}

fn label(tree: &Tree, node: NodeId) -> String {
    match tree.name(node) {
        Some(name) => format!("{}({name})", tree.kind(node)),
        None => tree.path(node),
    }
}

fn parse_branch(
    tree: &mut Tree,
    branch: NodeId,
    active: &IndexSet<String>,
    all: &[String],
) -> Result<()> {
    let siblings = subnodes(tree, branch);
    if tree.kind(branch) != NodeKind::Parallel {
        for sibling in siblings {
            if tree.kind(sibling).is_branch() {
                parse_branch(tree, sibling, active, all)?;
            }
        }
        return Ok(());
    }

    let keeps: Vec<IndexSet<String>> = siblings.iter().map(|s| kept_dataspaces(tree, *s)).collect();
    for (i, first) in keeps.iter().enumerate() {
        for (j, second) in keeps.iter().enumerate().skip(i + 1) {
            let shared: Vec<&String> = first.intersection(second).collect();
            if !shared.is_empty() {
                return Err(failure(
                    ProcessorId::Dataspace2Branch,
                    format!(
                        "DataSpaces {shared:?} are kept in two peer branches {} and {}. Each \
                         data space can only be kept in one branch. Full !Parallel node: {}.",
                        label(tree, siblings[i]),
                        label(tree, siblings[j]),
                        tree.path(branch)
                    ),
                ));
            }
        }
    }

    let covered: IndexSet<&String> = keeps.iter().flatten().collect();
    let remaining: Vec<&String> = active.iter().filter(|d| !covered.contains(d)).collect();
    if !remaining.is_empty() {
        let listed = remaining
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(failure(
            ProcessorId::Dataspace2Branch,
            format!(
                "Can not find branch for {remaining:?} in {}. If you would like to bypass all \
                 branches, add a new branch '- !Container {{constraints: {{dataspace: {{keep: \
                 [{listed}]}}}}}}' to the !Parallel node.",
                tree.path(branch)
            ),
        ));
    }

    for (sibling, keep) in siblings.iter().zip(&keeps) {
        let bypass: Vec<String> = all.iter().filter(|d| !keep.contains(*d)).cloned().collect();
        info!(
            branch = %label(tree, *sibling),
            keep = ?keep,
            bypass = ?bypass,
            "branch keeps and bypasses data spaces"
        );
        for ds in tree.nodes_of_kind(*sibling, &[NodeKind::Dataspace]) {
            let list = dataspace_list(tree, &bypass);
            let extra = partial_constraint(tree, NodeKind::Dataspace, vec![("bypass", list)]);
            merge_into(tree, ds, extra)?;
        }
        if tree.kind(*sibling).is_branch() {
            parse_branch(tree, *sibling, keep, all)?;
        }
    }
    Ok(())
}
