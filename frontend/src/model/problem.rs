// model/problem.rs — Workload description: shape, instance, data spaces
//
// A data space's `factors` are the dimension names in its projection with
// nesting flattened breadth first: `[[A], [B, [C]]]` yields `A, B, C`.

use std::collections::VecDeque;

use indexmap::IndexSet;

use crate::diag::{Result, SpecError};
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::raw::Raw;
use crate::registry::{Expect, Schema};
use crate::tree::{Tree, Value};

use super::{declare_node, empty_list, empty_map};

pub fn declare(schema: &mut Schema) {
    schema.declare(NodeKind::Problem, |c| {
        declare_node(c);
        c.attr("version", &[Expect::Str, Expect::Float]).optional();
        c.node_attr("instance", NodeKind::Instance);
        c.node_attr("shape", NodeKind::Shape);
    });
    schema.declare(NodeKind::Shape, |c| {
        declare_node(c);
        c.attr("name", &[Expect::Str])
            .with_default(|| Raw::from(""));
        c.node_attr("dimensions", NodeKind::List);
        c.node_attr("data_spaces", NodeKind::DataSpaceList);
        c.node_attr("coefficients", NodeKind::List)
            .with_default(empty_list);
    });
    schema.declare(NodeKind::DataSpaceList, |c| {
        declare_node(c);
        c.node_attr("", NodeKind::DataSpace);
    });
    schema.declare(NodeKind::DataSpace, |c| {
        declare_node(c);
        c.attr("name", &[Expect::Str]);
        c.node_attr("projection", NodeKind::List);
        c.attr("read_write", &[Expect::Str, Expect::Bool, Expect::Int])
            .with_default(|| Raw::Bool(false));
    });
    schema.declare(NodeKind::Instance, |c| {
        declare_node(c);
        c.node_attr("densities", NodeKind::DensityList)
            .with_default(empty_map);
        c.attr("", &[Expect::Int, Expect::Str]).wildcard();
    });
    schema.declare(NodeKind::DensityList, |c| {
        declare_node(c);
        c.node_attr("", NodeKind::Density).wildcard();
    });
    schema.declare(NodeKind::Density, |c| {
        declare_node(c);
        c.attr("density", &[Expect::Number, Expect::Str]);
        c.attr(
            "distribution",
            &[
                Expect::Literal("fixed_structured"),
                Expect::Literal("hypergeometric"),
                Expect::Literal("banded"),
            ],
        );
        c.attr("band_width", &[Expect::Int])
            .with_default(|| Raw::Int(0));
        c.attr("workload_tensor_size", &[Expect::Int])
            .with_default(|| Raw::Int(0));
    });
}

// ── Shape queries ──────────────────────────────────────────────────────────

fn shape(tree: &Tree, problem: NodeId) -> Result<NodeId> {
    tree.child(problem, "shape")
}

pub fn dimensions(tree: &Tree, problem: NodeId) -> Result<Vec<String>> {
    let shape = shape(tree, problem)?;
    Ok(tree.strings(tree.child(shape, "dimensions")?))
}

pub fn dataspaces(tree: &Tree, problem: NodeId) -> Result<Vec<NodeId>> {
    let shape = shape(tree, problem)?;
    Ok(tree.child_ids(tree.child(shape, "data_spaces")?))
}

pub fn dataspace_names(tree: &Tree, problem: NodeId) -> Result<Vec<String>> {
    Ok(dataspaces(tree, problem)?
        .into_iter()
        .filter_map(|ds| tree.name(ds).map(str::to_string))
        .collect())
}

pub fn name2dataspace(tree: &Tree, problem: NodeId, name: &str) -> Result<NodeId> {
    let all = dataspaces(tree, problem)?;
    all.iter()
        .copied()
        .find(|ds| tree.name(*ds) == Some(name))
        .ok_or_else(|| SpecError::Lookup {
            what: "data space",
            name: name.to_string(),
            available: all
                .iter()
                .filter_map(|ds| tree.name(*ds).map(str::to_string))
                .collect(),
        })
}

/// Projection names of a data space, flattened breadth first.
pub fn dataspace_factors(tree: &Tree, dataspace: NodeId) -> Result<Vec<String>> {
    let projection = tree.child(dataspace, "projection")?;
    let mut queue: VecDeque<Value> = tree.items(projection).iter().cloned().collect();
    let mut factors = Vec::new();
    while let Some(item) = queue.pop_front() {
        match item {
            Value::Node(inner) if !tree.is_dict(inner) => {
                queue.extend(tree.items(inner).iter().cloned())
            }
            Value::Str(s) => factors.push(s),
            _ => {}
        }
    }
    Ok(factors)
}

/// Problem dimensions indexing any of the named data spaces, in problem
/// dimension order.
pub fn dataspace2dims(tree: &Tree, problem: NodeId, names: &[String]) -> Result<Vec<String>> {
    let mut factors = IndexSet::new();
    for name in names {
        let ds = name2dataspace(tree, problem, name)?;
        factors.extend(dataspace_factors(tree, ds)?);
    }
    Ok(dimensions(tree, problem)?
        .into_iter()
        .filter(|d| factors.contains(d))
        .collect())
}

/// Dimensions indexing the named data spaces and no other data space.
pub fn dataspace2unique_dims(
    tree: &Tree,
    problem: NodeId,
    names: &[String],
) -> Result<Vec<String>> {
    let others: Vec<String> = dataspace_names(tree, problem)?
        .into_iter()
        .filter(|n| !names.contains(n))
        .collect();
    let shared = dataspace2dims(tree, problem, &others)?;
    Ok(dataspace2dims(tree, problem, names)?
        .into_iter()
        .filter(|d| !shared.contains(d))
        .collect())
}

/// Size of a dimension from `instance`, when it is a plain integer.
pub fn dimension_size(tree: &Tree, problem: NodeId, dim: &str) -> Option<i64> {
    let instance = tree.opt_child(problem, "instance")?;
    tree.get(instance, dim)
        .ok()
        .flatten()
        .and_then(Value::as_i64)
}
