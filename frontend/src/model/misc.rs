// model/misc.rs — Mapper, mapspace, globals, components, variables and the
// specification root
//
// The root's `constraints`, `mapping`, `components` and `globals` keys match
// by part name: a key such as `more_constraints` merges into `constraints`.

use crate::kinds::NodeKind;
use crate::raw::Raw;
use crate::registry::{Expect, Schema};

use super::{declare_node, empty_list, empty_map};

pub const MAPPER_ALGORITHMS: &[&str] = &[
    "random",
    "exhaustive",
    "linear_pruned",
    "hybrid",
    "random_pruned",
];

pub fn declare(schema: &mut Schema) {
    schema.declare(NodeKind::Specification, |c| {
        declare_node(c);
        c.node_attr("architecture", NodeKind::Architecture);
        c.node_attr("components", NodeKind::Components)
            .with_default(empty_map)
            .part_name();
        c.node_attr("constraints", NodeKind::Constraints)
            .with_default(empty_map)
            .part_name();
        c.node_attr("mapping", NodeKind::ConstraintsList)
            .with_default(empty_list)
            .part_name();
        c.node_attr("problem", NodeKind::Problem);
        c.node_attr("sparse_optimizations", NodeKind::SparseOptimizations)
            .with_default(empty_map);
        c.node_attr("variables", NodeKind::Variables)
            .with_default(empty_map);
        c.node_attr("mapper", NodeKind::Mapper)
            .with_default(empty_map);
        c.node_attr("mapspace", NodeKind::Mapspace)
            .with_default(empty_map);
        c.node_attr("globals", NodeKind::Globals)
            .with_default(empty_map)
            .part_name();
        c.node_attr("processors", NodeKind::ProcessorList)
            .with_default(empty_list);
    });
    schema.declare(NodeKind::ProcessorList, |c| {
        declare_node(c);
        c.attr("", &[Expect::Str]);
    });
    schema.declare(NodeKind::Mapper, |c| {
        declare_node(c);
        c.recognize_all();
        c.attr("version", &[Expect::Str, Expect::Float]).optional();
        c.attr("out_prefix", &[Expect::Str])
            .with_default(|| Raw::from("timeloop_mapper"));
        c.attr("num_threads", &[Expect::Int])
            .with_default(|| Raw::Int(8));
        c.attr("optimization_metric", &[Expect::Node(NodeKind::List)])
            .with_default(empty_list);
        c.attr("search_size", &[Expect::Int]).optional();
        c.attr("timeout", &[Expect::Int])
            .with_default(|| Raw::Int(1000));
        c.attr("victory_condition", &[Expect::Int]).optional();
        c.attr("sync_interval", &[Expect::Int]).optional();
        c.attr("log_interval", &[Expect::Int])
            .with_default(|| Raw::Int(1));
        for flag in [
            "log_oaves",
            "log_oaves_mappings",
            "log_stats",
            "log_suboptimal",
            "live_status",
            "diagnostics",
            "penalize_consecutive_bypass_fails",
            "emit_whoop_nest",
        ] {
            c.attr(flag, &[Expect::Bool])
                .with_default(|| Raw::Bool(false));
        }
        c.attr("max_temporal_loops_in_a_mapping", &[Expect::Int])
            .with_default(|| Raw::Int(-1));
        let algorithms: Vec<Expect> = MAPPER_ALGORITHMS
            .iter()
            .map(|a| Expect::Literal(*a))
            .collect();
        c.attr("algorithm", &algorithms)
            .with_default(|| Raw::from("hybrid"));
        c.attr("filter_revisits", &[Expect::Bool])
            .with_default(|| Raw::Bool(false));
        c.attr("max_permutations_per_if_visit", &[Expect::Int])
            .with_default(|| Raw::Int(16));
    });
    schema.declare(NodeKind::Mapspace, |c| {
        declare_node(c);
        c.attr("version", &[Expect::Str, Expect::Float]).optional();
        c.attr("template", &[Expect::Str])
            .with_default(|| Raw::from("ruby"));
    });
    schema.declare(NodeKind::Components, |c| {
        declare_node(c);
        c.attr("version", &[Expect::Str, Expect::Float])
            .with_default(|| Raw::from("0.4"));
        c.attr("classes", &[Expect::Node(NodeKind::List)])
            .with_default(empty_list);
    });
    schema.declare(NodeKind::Globals, |c| {
        declare_node(c);
        c.attr("version", &[Expect::Str, Expect::Float]).optional();
        c.node_attr("environment_variables", NodeKind::EnvironmentVariables)
            .with_default(empty_map);
        c.attr(
            "expression_custom_functions",
            &[Expect::Node(NodeKind::List)],
        )
        .with_default(empty_list);
    });
    for kind in [
        NodeKind::EnvironmentVariables,
        NodeKind::Variables,
        NodeKind::Dict,
        NodeKind::List,
    ] {
        schema.declare(kind, |c| {
            declare_node(c);
            c.recognize_all();
        });
    }
}
