// processors/attach.rs — Move targeted constraints and sparse optimizations
// onto the architecture nodes they name
//
// Entries are taken first-in first-out. The receiving node is the first
// named node (in tree order) that carries the destination key; the entry is
// combined into what that node already holds.

use tracing::debug;

use crate::combine::combine_index;
use crate::diag::{Result, SpecError};
use crate::id::NodeId;
use crate::pass::ProcessorId;
use crate::spec::Specification;
use crate::tree::{Tree, Value};

use super::{named_holders, Processor};

pub struct ConstraintAttacher;

impl Processor for ConstraintAttacher {
    fn id(&self) -> ProcessorId {
        ProcessorId::ConstraintAttacher
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let arch = spec.architecture()?;
        let targets = spec
            .tree
            .opt_child(spec.root, "constraints")
            .and_then(|c| spec.tree.opt_child(c, "targets"));
        let mapping = spec.tree.opt_child(spec.root, "mapping");
        for list in [targets, mapping].into_iter().flatten() {
            while let Some(value) = spec.tree.pop_front(list)? {
                let Value::Node(constraint) = value else {
                    continue;
                };
                let Some(key) = spec.tree.kind(constraint).constraint_type() else {
                    return Err(SpecError::Invalid {
                        path: spec.tree.path(list),
                        message: format!("{} is not a constraint", spec.tree.kind(constraint)),
                    });
                };
                let group = find_target(
                    &spec.tree,
                    arch,
                    constraint,
                    "constraints",
                    "constraint target",
                )?;
                let group = spec.tree.child(group, "constraints")?;
                debug!(target = %target_name(&spec.tree, constraint), kind = key, "attaching constraint");
                combine_index(&mut spec.tree, group, key, Value::Node(constraint))?;
            }
        }
        Ok(())
    }
}

pub struct SparseOptAttacher;

impl Processor for SparseOptAttacher {
    fn id(&self) -> ProcessorId {
        ProcessorId::SparseOptAttacher
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let arch = spec.architecture()?;
        let Some(targets) = spec
            .tree
            .opt_child(spec.root, "sparse_optimizations")
            .and_then(|s| spec.tree.opt_child(s, "targets"))
        else {
            return Ok(());
        };
        while let Some(value) = spec.tree.pop_front(targets)? {
            let Value::Node(opt) = value else {
                continue;
            };
            let leaf = find_target(
                &spec.tree,
                arch,
                opt,
                "sparse_optimizations",
                "sparse optimization target",
            )?;
            debug!(target = %target_name(&spec.tree, opt), "attaching sparse optimization");
            combine_index(
                &mut spec.tree,
                leaf,
                "sparse_optimizations",
                Value::Node(opt),
            )?;
        }
        Ok(())
    }
}

fn target_name(tree: &Tree, entry: NodeId) -> String {
    tree.str_at(entry, "target").unwrap_or_default().to_string()
}

/// First named node beneath `arch` matching `entry`'s target and holding
/// `key`.
fn find_target(
    tree: &Tree,
    arch: NodeId,
    entry: NodeId,
    key: &str,
    what: &'static str,
) -> Result<NodeId> {
    let target = target_name(tree, entry);
    let (holders, names) = named_holders(tree, arch, key);
    holders
        .into_iter()
        .find(|id| tree.name(*id) == Some(target.as_str()))
        .ok_or(SpecError::Lookup {
            what,
            name: target,
            available: names,
        })
}
