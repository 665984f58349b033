// Behavioral properties of the front-end, exercised through the library API.
//
// Covers cast identity, reference splitting, schema round trips, constraint
// macro expansion, branch resolution and alias rejection, plus one
// end-to-end run of a two-level hierarchy with a targeted dataspace macro.

use std::collections::{BTreeSet, HashMap};

use pretty_assertions::assert_eq;
use tlfe::build::Builder;
use tlfe::diag::{ErrorKind, SpecError};
use tlfe::id::NodeId;
use tlfe::kinds::NodeKind;
use tlfe::model::arch::{leaves, name2constraints};
use tlfe::pass::ProcessorId;
use tlfe::raw::Raw;
use tlfe::registry::Schema;
use tlfe::spec::{SpecOptions, Specification};
use tlfe::tree::{Tree, Value};
use tlfe::validate::{check_unrecognized, CheckOptions};

// ── Test helpers ────────────────────────────────────────────────────────────

const PROBLEM: &str = r#"
problem:
  shape:
    dimensions: [A, B, C]
    data_spaces:
    - {name: Input, projection: [[[A]], [[C]]]}
    - {name: Weights, projection: [[[B]], [[C]]]}
    - {name: Output, projection: [[[A]], [[B]]], read_write: True}
  instance: {A: 4, B: 4, C: 4}
"#;

fn spec_with(yaml: &str, processors: &[ProcessorId]) -> Specification {
    let options = SpecOptions {
        processors: processors.to_vec(),
        ..SpecOptions::default()
    };
    Specification::from_yaml_str(yaml, options)
        .unwrap_or_else(|e| panic!("construction failed: {}", e.render()))
}

fn strings(spec: &Specification, leaf: &str, constraint: &str, key: &str) -> Vec<String> {
    let arch = spec.architecture().unwrap();
    let group = name2constraints(&spec.tree, arch, leaf).unwrap();
    let node = spec.tree.child(group, constraint).unwrap();
    spec.tree.strings(spec.tree.child(node, key).unwrap())
}

fn one_buffer(constraints: &str) -> String {
    format!(
        "{PROBLEM}architecture:\n  version: 0.4\n  nodes:\n  - !Component\n    name: Buffer\n    \
         class: SRAM\n    attributes: {{width: 8, depth: 8, datawidth: 8, block_size: 1}}\n    \
         constraints: {constraints}\n"
    )
}

const MACRO_SUITE: [ProcessorId; 3] = [
    ProcessorId::References2Copies,
    ProcessorId::ConstraintAttacher,
    ProcessorId::ConstraintMacro,
];

// ── Cast identity ───────────────────────────────────────────────────────────

#[test]
fn casting_one_object_twice_yields_one_node() {
    let schema = Schema::standard();
    let mut tree = Tree::new();
    let raw = Raw::parse_yaml("{name: Input, projection: [[[A]]]}").unwrap();
    let alias = raw.clone();
    let equal_copy = Raw::parse_yaml("{name: Input, projection: [[[A]]]}").unwrap();

    let mut builder = Builder::new(&schema, &mut tree);
    let first = builder.build(NodeKind::DataSpace, &raw).unwrap();
    let second = builder.build(NodeKind::DataSpace, &alias).unwrap();
    let third = builder.build(NodeKind::DataSpace, &equal_copy).unwrap();

    assert_eq!(first, second);
    assert_ne!(first, third);
}

// ── Reference splitting ─────────────────────────────────────────────────────

fn shared_attributes_spec(levels: usize) -> Specification {
    let attributes = Raw::map([
        ("width", Raw::Int(8)),
        ("depth", Raw::Int(64)),
        ("datawidth", Raw::Int(8)),
        ("block_size", Raw::Int(1)),
    ]);
    let nodes = (0..levels).map(|i| {
        Raw::tagged_map(
            "!Component",
            [
                ("name", Raw::from(format!("L{i}").as_str())),
                ("class", Raw::from("SRAM")),
                ("attributes", attributes.clone()),
            ],
        )
    });
    let raw = Raw::map([
        (
            "architecture",
            Raw::map([("version", Raw::Float(0.4)), ("nodes", Raw::list(nodes))]),
        ),
        (
            "problem",
            Raw::parse_yaml(PROBLEM)
                .unwrap()
                .get("problem")
                .unwrap()
                .clone(),
        ),
    ]);
    Specification::from_raw(&raw, SpecOptions::default()).unwrap()
}

#[test]
fn no_node_is_reachable_from_two_positions() {
    let spec = shared_attributes_spec(3);
    let mut positions: HashMap<NodeId, usize> = HashMap::new();
    let mut stack = vec![spec.root];
    while let Some(id) = stack.pop() {
        for child in spec.tree.child_ids(id) {
            *positions.entry(child).or_default() += 1;
            stack.push(child);
        }
    }
    assert!(positions.values().all(|n| *n == 1), "{positions:?}");
}

#[test]
fn mutating_one_copy_leaves_its_siblings_alone() {
    let mut spec = shared_attributes_spec(2);
    let arch = spec.architecture().unwrap();
    let ids: Vec<NodeId> = leaves(&spec.tree, arch)
        .into_iter()
        .map(|leaf| spec.tree.child(leaf, "attributes").unwrap())
        .collect();
    spec.tree.set(ids[0], "depth", Value::Int(2)).unwrap();
    assert_eq!(
        spec.tree.get(ids[1], "depth").unwrap(),
        Some(&Value::Int(64))
    );
}

// ── Schema round trips ──────────────────────────────────────────────────────

fn build(
    schema: &Schema,
    tree: &mut Tree,
    kind: NodeKind,
    yaml: &str,
) -> tlfe::diag::Result<NodeId> {
    Builder::new(schema, tree).build(kind, &Raw::parse_yaml(yaml).unwrap())
}

#[test]
fn required_keys_alone_construct_and_validate() {
    let schema = Schema::standard();
    for (kind, yaml) in [
        (NodeKind::DataSpace, "{name: Input, projection: [[[A]]]}"),
        (
            NodeKind::Density,
            "{density: 0.5, distribution: hypergeometric}",
        ),
        (NodeKind::Temporal, "{}"),
        (NodeKind::Spatial, "{}"),
        (NodeKind::Dataspace, "{}"),
    ] {
        let mut tree = Tree::new();
        let id = build(&schema, &mut tree, kind, yaml)
            .unwrap_or_else(|e| panic!("{kind}: {}", e.render()));
        check_unrecognized(&tree, &schema, id, CheckOptions::default())
            .unwrap_or_else(|e| panic!("{kind}: {}", e.render()));
    }
}

#[test]
fn undeclared_key_fails_validation_only() {
    let schema = Schema::standard();
    let mut tree = Tree::new();
    let id = build(
        &schema,
        &mut tree,
        NodeKind::DataSpace,
        "{name: Input, projection: [[[A]]], colour: blue}",
    )
    .unwrap();
    let err = check_unrecognized(&tree, &schema, id, CheckOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert!(
        matches!(err, SpecError::Unrecognized { ref key, .. } if key == "colour"),
        "{err}"
    );
}

#[test]
fn ignore_keys_are_accepted_verbatim() {
    let schema = Schema::standard();
    let mut tree = Tree::new();
    let id = build(
        &schema,
        &mut tree,
        NodeKind::DataSpace,
        "{name: Input, projection: [[[A]]], ignore_notes: {anything: [1, 2]}}",
    )
    .unwrap();
    check_unrecognized(&tree, &schema, id, CheckOptions::default()).unwrap();
}

#[test]
fn missing_required_key_fails_construction() {
    let schema = Schema::standard();
    let mut tree = Tree::new();
    let err = build(
        &schema,
        &mut tree,
        NodeKind::DataSpace,
        "{projection: [[[A]]]}",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Key);
    assert!(
        matches!(err, SpecError::MissingKey { ref key, .. } if key == "name"),
        "{err}"
    );
}

#[test]
fn reserved_keys_fail_construction() {
    let schema = Schema::standard();
    let mut tree = Tree::new();
    let err = build(
        &schema,
        &mut tree,
        NodeKind::DataSpace,
        "{name: Input, projection: [], parent_node: x}",
    )
    .unwrap_err();
    assert!(matches!(err, SpecError::ReservedKey { ref key, .. } if key == "parent_node"));
}

// ── Constraint macros ───────────────────────────────────────────────────────

#[test]
fn keep_only_splits_dataspaces_exactly() {
    let mut spec = spec_with(
        &one_buffer("{dataspace: {keep_only: [Input, Weights]}}"),
        &MACRO_SUITE,
    );
    spec.process(None, Default::default()).unwrap();
    assert_eq!(
        strings(&spec, "Buffer", "dataspace", "keep"),
        vec!["Input", "Weights"]
    );
    assert_eq!(
        strings(&spec, "Buffer", "dataspace", "bypass"),
        vec!["Output"]
    );
}

#[test]
fn factors_only_pins_every_other_dimension() {
    let mut spec = spec_with(&one_buffer("{temporal: {factors_only: A=2}}"), &MACRO_SUITE);
    spec.process(None, Default::default()).unwrap();
    let factors: BTreeSet<String> = strings(&spec, "Buffer", "temporal", "factors")
        .into_iter()
        .collect();
    let expected: BTreeSet<String> = ["A=2", "B=1", "C=1"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(factors, expected);
}

// ── Branch resolution ───────────────────────────────────────────────────────

fn parallel(keeps: &[(&str, &str)]) -> String {
    let mut yaml =
        format!("{PROBLEM}architecture:\n  version: 0.4\n  nodes:\n  - !Parallel\n    nodes:\n");
    for (name, keep) in keeps {
        yaml.push_str(&format!(
            "    - !Component {{name: {name}, class: SRAM, attributes: {{width: 8, depth: 8, \
             datawidth: 8, block_size: 1}}, constraints: {{dataspace: {{keep: [{keep}]}}}}}}\n"
        ));
    }
    yaml
}

const BRANCH_SUITE: [ProcessorId; 4] = [
    ProcessorId::References2Copies,
    ProcessorId::ConstraintAttacher,
    ProcessorId::ConstraintMacro,
    ProcessorId::Dataspace2Branch,
];

#[test]
fn peers_keeping_one_dataspace_are_rejected() {
    let mut spec = spec_with(
        &parallel(&[("Left", "Input, Weights"), ("Right", "Weights, Output")]),
        &BRANCH_SUITE,
    );
    let err = spec.process(None, Default::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Processor);
}

#[test]
fn dataspace_kept_by_no_peer_is_rejected() {
    let mut spec = spec_with(
        &parallel(&[("Left", "Input"), ("Right", "Output")]),
        &BRANCH_SUITE,
    );
    let err = spec.process(None, Default::default()).unwrap_err();
    assert!(err.to_string().contains("Weights"), "{err}");
}

#[test]
fn disjoint_peers_resolve() {
    let mut spec = spec_with(
        &parallel(&[("Left", "Input, Weights"), ("Right", "Output")]),
        &BRANCH_SUITE,
    );
    spec.process(None, Default::default()).unwrap();
    assert_eq!(
        strings(&spec, "Left", "dataspace", "bypass"),
        vec!["Output"]
    );
    assert_eq!(
        strings(&spec, "Right", "dataspace", "bypass"),
        vec!["Input", "Weights"]
    );
}

// ── Alias rejection ─────────────────────────────────────────────────────────

#[test]
fn hyphenated_alias_is_rejected_everywhere() {
    let schema = Schema::standard();
    let mut tree = Tree::new();
    let temporal = build(&schema, &mut tree, NodeKind::Temporal, "{}").unwrap();
    assert!(tree.contains_key(temporal, "no_temporal_reuse"));

    let alias = "no-temporal-reuse";
    let errors = [
        tree.get(temporal, alias).map(|_| ()).unwrap_err(),
        tree.set(temporal, alias, Value::Null).unwrap_err(),
        tree.setdefault(temporal, alias, Value::Null)
            .map(|_| ())
            .unwrap_err(),
        tree.pop(temporal, alias).map(|_| ()).unwrap_err(),
    ];
    for err in errors {
        assert_eq!(err.kind(), ErrorKind::Key);
        assert!(
            matches!(err, SpecError::AliasKey { ref existing, .. } if existing == "no_temporal_reuse")
        );
    }
}

#[test]
fn alias_of_an_absent_declared_key_is_rejected() {
    let mut spec = spec_with(&one_buffer("{temporal: {factors_only: A=2}}"), &MACRO_SUITE);
    spec.process(None, Default::default()).unwrap();
    let arch = spec.architecture().unwrap();
    let group = name2constraints(&spec.tree, arch, "Buffer").unwrap();
    let temporal = spec.tree.child(group, "temporal").unwrap();
    // The macro consumed the key; its hyphenated spelling is still refused.
    assert!(!spec.tree.contains_key(temporal, "factors_only"));

    let alias = "factors-only";
    let errors = [
        spec.tree.get(temporal, alias).map(|_| ()).unwrap_err(),
        spec.tree
            .set(temporal, alias, Value::from("A=4"))
            .unwrap_err(),
        spec.tree
            .setdefault(temporal, alias, Value::Null)
            .map(|_| ())
            .unwrap_err(),
        spec.tree.pop(temporal, alias).map(|_| ()).unwrap_err(),
    ];
    for err in errors {
        assert!(
            matches!(err, SpecError::AliasKey { ref existing, .. } if existing == "factors_only")
        );
    }
    assert!(!spec.tree.contains_key(temporal, alias));
}

// ── End to end ──────────────────────────────────────────────────────────────

#[test]
fn targeted_keep_only_reaches_one_level_of_a_hierarchy() {
    let yaml = format!(
        r#"{PROBLEM}architecture:
  version: 0.4
  nodes:
  - !Hierarchical
    nodes:
    - !Component
      name: Buffer
      class: SRAM
      attributes: {{width: 64, depth: 1024, datawidth: 8, block_size: 8}}
    - !Component
      name: PE_Scratchpad
      class: regfile
      attributes: {{width: 8, depth: 64, datawidth: 8, block_size: 1}}
constraints:
  targets:
  - {{type: dataspace, target: Buffer, keep_only: [Input]}}
"#
    );
    let mut spec = spec_with(&yaml, &MACRO_SUITE);
    spec.process(None, Default::default()).unwrap();

    assert_eq!(strings(&spec, "Buffer", "dataspace", "keep"), vec!["Input"]);
    let bypass: BTreeSet<String> = strings(&spec, "Buffer", "dataspace", "bypass")
        .into_iter()
        .collect();
    let expected: BTreeSet<String> = ["Weights", "Output"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(bypass, expected);

    let arch = spec.architecture().unwrap();
    let group = name2constraints(&spec.tree, arch, "PE_Scratchpad").unwrap();
    let dataspace = spec.tree.child(group, "dataspace").unwrap();
    assert!(spec.tree.is_empty_node(dataspace));
}
