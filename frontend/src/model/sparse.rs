// model/sparse.rs — Sparse optimization directives
//
// Like constraints, sparse optimization groups are either inline on a leaf
// or listed under `sparse_optimizations.targets` with a `target` name; the
// SparseOptAttacher moves the listed ones onto their leaf.

use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::registry::{Expect, Schema};
use crate::tree::Tree;

use super::{declare_node, empty_list, empty_map};

pub fn declare(schema: &mut Schema) {
    schema.declare(NodeKind::SparseOptimizations, |c| {
        declare_node(c);
        c.attr("version", &[Expect::Str, Expect::Float]).optional();
        c.node_attr("targets", NodeKind::SparseOptimizationsList)
            .with_default(empty_list);
    });
    schema.declare(NodeKind::SparseOptimizationsList, |c| {
        declare_node(c);
        c.node_attr("", NodeKind::SparseOptimizationGroup);
    });
    schema.declare(NodeKind::SparseOptimizationGroup, |c| {
        declare_node(c);
        c.attr("target", &[Expect::Str]).optional();
        c.node_attr("action_optimization", NodeKind::ActionOptimizationList)
            .with_default(empty_list);
        c.node_attr("representation_format", NodeKind::RepresentationFormat)
            .with_default(empty_map);
        c.node_attr("compute_optimization", NodeKind::ComputeOptimization)
            .with_default(empty_map);
    });
    schema.declare(NodeKind::RepresentationFormat, |c| {
        declare_node(c);
        c.node_attr("data_spaces", NodeKind::RepresentationDataSpaceList)
            .with_default(empty_list);
    });
    schema.declare(NodeKind::RepresentationDataSpaceList, |c| {
        declare_node(c);
        c.node_attr("", NodeKind::RepresentationDataSpace);
    });
    schema.declare(NodeKind::RepresentationDataSpace, |c| {
        declare_node(c);
        c.attr("name", &[Expect::Str]);
        c.node_attr("ranks", NodeKind::RankList);
    });
    schema.declare(NodeKind::RankList, |c| {
        declare_node(c);
        c.node_attr("", NodeKind::Rank);
    });
    schema.declare(NodeKind::Rank, |c| {
        declare_node(c);
        c.attr(
            "format",
            &[
                Expect::Literal("CP"),
                Expect::Literal("B"),
                Expect::Literal("RLE"),
                Expect::Literal("UOP"),
            ],
        );
        c.attr("metadata_word_bits", &[Expect::Int]).optional();
        c.attr("payload_word_bits", &[Expect::Int]).optional();
        c.attr("flattened_rankIDs", &[Expect::Node(NodeKind::List)])
            .optional();
    });
    schema.declare(NodeKind::ActionOptimizationList, |c| {
        declare_node(c);
        c.node_attr("", NodeKind::ActionOptimization);
    });
    schema.declare(NodeKind::ActionOptimization, |c| {
        declare_node(c);
        c.attr(
            "type",
            &[
                Expect::Literal("gating"),
                Expect::Literal("skipping"),
                Expect::Literal("spatial_skipping"),
            ],
        );
        c.node_attr("options", NodeKind::ActionOptimizationOptionList);
    });
    schema.declare(NodeKind::ActionOptimizationOptionList, |c| {
        declare_node(c);
        c.node_attr("", NodeKind::ActionOptimizationOption);
    });
    schema.declare(NodeKind::ActionOptimizationOption, |c| {
        declare_node(c);
        c.attr("target", &[Expect::Str]);
        c.attr("condition_on", &[Expect::Node(NodeKind::List)]);
    });
    schema.declare(NodeKind::ComputeOptimization, |c| {
        declare_node(c);
        c.attr(
            "type",
            &[Expect::Literal("gating"), Expect::Literal("skipping")],
        )
        .optional();
    });
}

/// Action optimization types (`gating`, `skipping`, ...) of a group.
pub fn action_optimization_types(tree: &Tree, group: NodeId) -> Vec<String> {
    let Some(list) = tree.opt_child(group, "action_optimization") else {
        return Vec::new();
    };
    tree.child_ids(list)
        .into_iter()
        .filter_map(|opt| tree.str_at(opt, "type").map(str::to_string))
        .collect()
}

pub fn has_representation_format(tree: &Tree, group: NodeId) -> bool {
    tree.opt_child(group, "representation_format")
        .and_then(|f| tree.opt_child(f, "data_spaces"))
        .is_some_and(|ds| tree.size(ds) > 0)
}
