// model/arch.rs — Architecture tree schemas and helpers
//
// Branches (Architecture, Hierarchical, Parallel, Pipelined) hold an ordered
// `nodes` list; leaves (Container and the elements Storage, Compute,
// Network, Nothing) carry name, attributes, fanout, constraints and sparse
// optimizations. Elements given as `!Component`/`!Element` are dispatched to
// a concrete kind by substring of their `class`.

use crate::build::Builder;
use crate::diag::{Result, SpecError};
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::raw::Raw;
use crate::registry::{ClassSchema, Expect, Schema};
use crate::tree::{Tree, Value};

use super::{declare_node, empty_list, empty_map};

pub const BUFFER_CLASSES: &[&str] = &["DRAM", "SRAM", "regfile", "smartbuffer", "storage"];
pub const COMPUTE_CLASSES: &[&str] = &["mac", "intmac", "fpmac", "compute"];
pub const NETWORK_CLASSES: &[&str] = &["XY_NoC", "Legacy", "ReductionTree", "SimpleMulticast"];
pub const NOTHING_CLASSES: &[&str] = &["nothing"];

const STR_INT: &[Expect] = &[Expect::Str, Expect::Int];
const STR_BOOL: &[Expect] = &[Expect::Str, Expect::Bool];
const STR_NUMBER: &[Expect] = &[Expect::Str, Expect::Number];

// ── Declarations ───────────────────────────────────────────────────────────

pub fn declare(schema: &mut Schema) {
    schema.declare(NodeKind::ArchNodes, declare_arch_nodes);
    schema.declare(NodeKind::Hierarchical, declare_branch);
    schema.declare(NodeKind::Parallel, declare_branch);
    schema.declare(NodeKind::Pipelined, declare_branch);
    schema.declare(NodeKind::Architecture, declare_architecture);
    schema.declare(NodeKind::Container, declare_container);
    schema.declare(NodeKind::Storage, declare_storage);
    schema.declare(NodeKind::Compute, declare_element);
    schema.declare(NodeKind::Network, declare_element);
    schema.declare(NodeKind::Nothing, declare_nothing);
    schema.declare(NodeKind::Networks, declare_networks);
    schema.declare(NodeKind::Fanout, declare_fanout);
    schema.declare(NodeKind::Attributes, declare_attributes);
    schema.declare(NodeKind::StorageAttributes, declare_storage_attributes);
}

fn declare_arch_nodes(c: &mut ClassSchema) {
    declare_node(c);
    let elements = &[
        Expect::Node(NodeKind::Storage),
        Expect::Node(NodeKind::Compute),
        Expect::Node(NodeKind::Network),
        Expect::Node(NodeKind::Nothing),
    ];
    for tag in ["!Component", "!Element"] {
        c.attr(tag, elements)
            .factory("element_factory", element_factory);
    }
    for kind in [
        NodeKind::Container,
        NodeKind::Hierarchical,
        NodeKind::Parallel,
        NodeKind::Pipelined,
        NodeKind::Nothing,
        NodeKind::Storage,
        NodeKind::Compute,
        NodeKind::Network,
    ] {
        c.node_attr(&format!("!{kind}"), kind);
    }
}

fn declare_branch(c: &mut ClassSchema) {
    declare_node(c);
    c.node_attr("nodes", NodeKind::ArchNodes)
        .with_default(empty_list);
}

fn declare_architecture(c: &mut ClassSchema) {
    declare_branch(c);
    c.attr("version", &[Expect::Str, Expect::Number]);
}

fn declare_leaf(c: &mut ClassSchema) {
    declare_node(c);
    c.attr("name", &[Expect::Str]);
    c.node_attr("attributes", NodeKind::Attributes)
        .with_default(empty_map);
    c.node_attr("spatial", NodeKind::Fanout)
        .with_default(empty_map);
    c.node_attr("constraints", NodeKind::ConstraintGroup)
        .with_default(empty_map);
    c.node_attr("sparse_optimizations", NodeKind::SparseOptimizationGroup)
        .with_default(empty_map);
}

fn declare_container(c: &mut ClassSchema) {
    declare_leaf(c);
    c.node_attr("networks", NodeKind::Networks)
        .with_default(empty_list);
}

fn declare_element(c: &mut ClassSchema) {
    declare_leaf(c);
    c.attr("class", &[Expect::Str]);
    c.attr("subclass", &[Expect::Str]).optional();
    c.attr("required_actions", &[Expect::Node(NodeKind::List)])
        .with_default(empty_list);
    c.attr("area_share", &[Expect::Number]).optional();
    c.attr("enabled", &[Expect::Bool])
        .with_default(|| Raw::Bool(true));
}

fn declare_storage(c: &mut ClassSchema) {
    declare_element(c);
    c.node_attr("attributes", NodeKind::StorageAttributes)
        .with_default(empty_map);
}

fn declare_nothing(c: &mut ClassSchema) {
    declare_element(c);
    c.attr("name", &[Expect::Str])
        .with_default(|| Raw::from("nothing"));
    c.attr("class", &[Expect::Str])
        .with_default(|| Raw::from("nothing"));
}

fn declare_networks(c: &mut ClassSchema) {
    declare_node(c);
    c.node_attr("", NodeKind::Network);
}

fn declare_fanout(c: &mut ClassSchema) {
    declare_node(c);
    c.attr("meshX", STR_INT).with_default(|| Raw::Int(1));
    c.attr("meshY", STR_INT).with_default(|| Raw::Int(1));
}

fn declare_attributes(c: &mut ClassSchema) {
    declare_node(c);
    c.attr("", &[]).wildcard().optional();
}

fn declare_storage_attributes(c: &mut ClassSchema) {
    declare_attributes(c);
    c.attr("datawidth", STR_INT);
    c.attr("technology", STR_INT).optional();
    c.attr("n_banks", STR_INT).with_default(|| Raw::Int(2));
    c.attr("block_size", STR_INT).optional();
    c.attr("cluster_size", STR_INT).with_default(|| Raw::Int(1));
    for key in ["width", "depth", "entries", "sizeKB"] {
        c.attr(key, STR_INT).optional();
    }
    c.attr("reduction_supported", STR_BOOL)
        .with_default(|| Raw::Bool(true));
    c.attr("multiple_buffering", STR_NUMBER)
        .with_default(|| Raw::Int(1));
    c.attr("min_utilization", STR_NUMBER)
        .with_default(|| Raw::Int(0));
    for key in ["shared_bandwidth", "read_bandwidth", "write_bandwidth"] {
        c.attr(key, STR_NUMBER).optional();
    }
    for key in ["network_fill_latency", "network_drain_latency"] {
        c.attr(key, STR_INT).optional();
    }
    c.attr("allow_overbooking", STR_BOOL)
        .with_default(|| Raw::Bool(false));
    for key in METADATA_ATTRIBUTES {
        c.attr(key, STR_INT).optional();
    }
    for key in [
        "concordant_compressed_tile_traversal",
        "tile_partition_supported",
        "decompression_supported",
        "compression_supported",
    ] {
        c.attr(key, STR_BOOL).optional();
    }
    c.require_one_of(&["entries", "sizeKB", "depth"]);
    c.require_one_of(&["block_size", "cluster_size"]);
    c.require_all_or_none_of(METADATA_ATTRIBUTES);
}

pub const METADATA_ATTRIBUTES: &[&str] = &[
    "metadata_block_size",
    "metadata_datawidth",
    "metadata_storage_width",
    "metadata_storage_depth",
];

// ── Factories ──────────────────────────────────────────────────────────────

/// Concrete element kind for an element `class` string.
pub fn element_kind(class: &str) -> Option<NodeKind> {
    [
        (BUFFER_CLASSES, NodeKind::Storage),
        (COMPUTE_CLASSES, NodeKind::Compute),
        (NETWORK_CLASSES, NodeKind::Network),
        (NOTHING_CLASSES, NodeKind::Nothing),
    ]
    .into_iter()
    .find(|(classes, _)| classes.iter().any(|c| class.contains(c)))
    .map(|(_, kind)| kind)
}

fn element_factory(builder: &mut Builder<'_>, raw: &Raw) -> Result<Value> {
    let fail = |builder: &Builder<'_>, reason: String| SpecError::Cast {
        path: builder.path(),
        key: "class".to_string(),
        reason,
    };
    if raw.as_map().is_none() {
        return Err(fail(
            builder,
            format!("elements must be dictionaries, found {raw}"),
        ));
    }
    let class = match raw.get("class") {
        Some(Raw::Str(class)) => class.clone(),
        Some(other) => {
            return Err(fail(
                builder,
                format!("Element \"class\" attribute must be a string. Got {other}"),
            ))
        }
        None => {
            return Err(fail(
                builder,
                "Element missing 'class' attribute.".to_string(),
            ))
        }
    };
    match element_kind(&class) {
        Some(kind) => Ok(Value::Node(builder.node(kind, raw)?)),
        None => Err(fail(
            builder,
            format!(
                "Unknown element class {class}. Accepted classes: {:?}",
                [
                    BUFFER_CLASSES,
                    COMPUTE_CLASSES,
                    NETWORK_CLASSES,
                    NOTHING_CLASSES
                ]
                .concat()
            ),
        )),
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// A placeholder storage level with unit width and depth.
pub fn dummy_storage(builder: &mut Builder<'_>, name: &str) -> Result<NodeId> {
    let raw = Raw::tagged_map(
        "!Component",
        [
            ("name", Raw::from(name)),
            ("class", Raw::from("dummy_storage")),
            (
                "attributes",
                Raw::map([
                    ("width", Raw::Int(1)),
                    ("depth", Raw::Int(1)),
                    ("datawidth", Raw::Int(1)),
                    ("technology", Raw::Int(-1)),
                ]),
            ),
        ],
    );
    match element_factory(builder, &raw)? {
        Value::Node(id) => Ok(id),
        other => Err(SpecError::Invalid {
            path: builder.path(),
            message: format!("dummy storage produced {}", other.type_name()),
        }),
    }
}

/// `meshX * meshY` of a leaf's fanout, when both are integers.
pub fn fanout(tree: &Tree, leaf: NodeId) -> Option<i64> {
    let spatial = tree.opt_child(leaf, "spatial")?;
    let mesh = |key: &str| match tree.get(spatial, key) {
        Ok(Some(v)) => v.as_i64(),
        Ok(None) => Some(1),
        Err(_) => None,
    };
    Some(mesh("meshX")? * mesh("meshY")?)
}

/// Every leaf beneath `root`, in tree order.
pub fn leaves(tree: &Tree, root: NodeId) -> Vec<NodeId> {
    tree.nodes_of_kind(root, NodeKind::LEAVES)
}

/// Find the leaf named `name`; fails listing every leaf name.
pub fn name2leaf(tree: &Tree, root: NodeId, name: &str) -> Result<NodeId> {
    let leaves = leaves(tree, root);
    leaves
        .iter()
        .copied()
        .find(|id| tree.name(*id) == Some(name))
        .ok_or_else(|| SpecError::Lookup {
            what: "leaf",
            name: name.to_string(),
            available: leaves
                .iter()
                .filter_map(|id| tree.name(*id).map(str::to_string))
                .collect(),
        })
}

/// Constraint group of the leaf named `name`.
pub fn name2constraints(tree: &Tree, root: NodeId, name: &str) -> Result<NodeId> {
    let leaf = name2leaf(tree, root, name)?;
    tree.child(leaf, "constraints")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{check_unrecognized, CheckOptions};

    fn build(schema: &Schema, tree: &mut Tree, kind: NodeKind, yaml: &str) -> Result<NodeId> {
        Builder::new(schema, tree).build(kind, &Raw::parse_yaml(yaml).unwrap())
    }

    #[test]
    fn component_class_selects_kind() {
        assert_eq!(element_kind("DRAM"), Some(NodeKind::Storage));
        assert_eq!(element_kind("smartbuffer_SRAM"), Some(NodeKind::Storage));
        assert_eq!(element_kind("intmac"), Some(NodeKind::Compute));
        assert_eq!(element_kind("XY_NoC"), Some(NodeKind::Network));
        assert_eq!(element_kind("nothing"), Some(NodeKind::Nothing));
        assert_eq!(element_kind("widget"), None);
    }

    #[test]
    fn architecture_builds_and_validates() {
        let schema = Schema::standard();
        let mut tree = Tree::new();
        let arch = build(
            &schema,
            &mut tree,
            NodeKind::Architecture,
            r#"
version: 0.4
nodes:
- !Container
  name: System
- !Component
  name: Buffer
  class: SRAM
  attributes: {depth: 1024, width: 64, datawidth: 8, block_size: 8}
- !Component
  name: MAC
  class: intmac
  spatial: {meshX: 4}
"#,
        )
        .unwrap();
        check_unrecognized(&tree, &schema, arch, CheckOptions::default()).unwrap();
        let buffer = name2leaf(&tree, arch, "Buffer").unwrap();
        assert_eq!(tree.kind(buffer), NodeKind::Storage);
        assert_eq!(tree.tag(buffer), Some("!Component"));
        let mac = name2leaf(&tree, arch, "MAC").unwrap();
        assert_eq!(fanout(&tree, mac), Some(4));
        assert_eq!(
            tree.path(buffer),
            "Architecture[nodes].ArchNodes[1].Storage(Buffer)"
        );
    }

    #[test]
    fn unknown_leaf_lists_candidates() {
        let schema = Schema::standard();
        let mut tree = Tree::new();
        let arch = build(
            &schema,
            &mut tree,
            NodeKind::Architecture,
            "{version: 0.4, nodes: [!Container {name: A}, !Container {name: B}]}",
        )
        .unwrap();
        let err = name2leaf(&tree, arch, "C").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"Could not find leaf "C". Available: ["A", "B"]"#);
    }

    #[test]
    fn unknown_element_class_fails() {
        let schema = Schema::standard();
        let mut tree = Tree::new();
        let err = build(
            &schema,
            &mut tree,
            NodeKind::Architecture,
            "{version: 0.4, nodes: [!Component {name: W, class: widget}]}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown element class widget"));
    }

    #[test]
    fn nothing_has_default_name() {
        let schema = Schema::standard();
        let mut tree = Tree::new();
        let arch = build(
            &schema,
            &mut tree,
            NodeKind::Architecture,
            "{version: 0.4, nodes: [!Nothing {}]}",
        )
        .unwrap();
        let nothing = name2leaf(&tree, arch, "nothing").unwrap();
        assert_eq!(tree.kind(nothing), NodeKind::Nothing);
    }

    #[test]
    fn storage_requires_exactly_one_size() {
        let schema = Schema::standard();
        let mut tree = Tree::new();
        let arch = build(
            &schema,
            &mut tree,
            NodeKind::Architecture,
            "{version: 0.4, nodes: [!Component {name: B, class: DRAM, attributes: {datawidth: 8, block_size: 4}}]}",
        )
        .unwrap();
        let err = check_unrecognized(&tree, &schema, arch, CheckOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            SpecError::KeyGroup {
                rule: "exactly one",
                ..
            }
        ));
    }
}
