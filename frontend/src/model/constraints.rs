// model/constraints.rs — Mapping constraint schemas, factor lists and helpers
//
// Constraints come in five kinds (spatial, temporal, dataspace,
// max_overbooked_proportion, utilization). They live either inline in a
// leaf's constraint group or in a top-level target list from which the
// ConstraintAttacher moves them onto their target leaf.
//
// Factor strings have the form `NAME=VALUE`, `NAME<=VALUE` or
// `NAME>=VALUE`; whitespace around the parts is dropped.

use std::fmt;

use tracing::debug;

use crate::build::Builder;
use crate::diag::{Result, SpecError};
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::raw::Raw;
use crate::registry::{ClassSchema, DefaultFn, Expect, Schema};
use crate::tree::{Tree, Value};

use super::{declare_node, empty_list, empty_map};

// ── Declarations ───────────────────────────────────────────────────────────

pub fn declare(schema: &mut Schema) {
    schema.declare(NodeKind::Constraints, |c| {
        declare_node(c);
        c.node_attr("targets", NodeKind::ConstraintsList)
            .with_default(empty_list);
    });
    schema.declare(NodeKind::ConstraintsList, declare_constraints_list);
    schema.declare(NodeKind::ConstraintGroup, declare_constraint_group);
    schema.declare(NodeKind::Spatial, declare_spatial);
    schema.declare(NodeKind::Temporal, declare_temporal);
    schema.declare(NodeKind::Dataspace, declare_dataspace);
    schema.declare(NodeKind::MaxOverbookedProportion, |c| {
        declare_constraint(c, "max_overbooked_proportion", || {
            Raw::from("max_overbooked_proportion")
        });
        c.attr("proportion", &[Expect::Float]).optional();
    });
    schema.declare(NodeKind::Utilization, |c| {
        declare_constraint(c, "utilization", || Raw::from("utilization"));
        c.attr("min", &[Expect::Float, Expect::Str]).optional();
    });
    for kind in [
        NodeKind::Factors,
        NodeKind::Permutation,
        NodeKind::ProblemDataspaceList,
    ] {
        schema.declare(kind, |c| {
            declare_node(c);
            c.attr("", &[Expect::Str]);
        });
    }
}

fn constraint_expects() -> Vec<Expect> {
    NodeKind::CONSTRAINTS
        .iter()
        .map(|k| Expect::Node(*k))
        .collect()
}

fn declare_constraints_list(c: &mut ClassSchema) {
    declare_node(c);
    let expects = constraint_expects();
    c.attr("", &expects)
        .factory("constraint_factory", constraint_factory);
    for kind in NodeKind::CONSTRAINTS {
        c.node_attr(&format!("!{kind}"), *kind);
    }
}

fn declare_constraint_group(c: &mut ClassSchema) {
    declare_node(c);
    for kind in NodeKind::CONSTRAINTS {
        if let Some(key) = kind.constraint_type() {
            c.node_attr(key, *kind).with_default(empty_map);
        }
    }
}

fn declare_constraint(c: &mut ClassSchema, ctype: &'static str, default: DefaultFn) {
    declare_node(c);
    c.attr("type", &[Expect::Literal(ctype)])
        .with_default(default);
    c.attr("target", &[Expect::Str])
        .with_default(|| Raw::from(""));
}

fn declare_iteration(c: &mut ClassSchema, ctype: &'static str, default: DefaultFn) {
    declare_constraint(c, ctype, default);
    c.attr("factors", &[Expect::Node(NodeKind::Factors)])
        .factory("factors_factory", factors_factory)
        .with_default(empty_list);
    c.attr("permutation", &[Expect::Node(NodeKind::Permutation)])
        .factory("permutation_factory", permutation_factory)
        .with_default(empty_list);
    c.attr("default_max_factor", &[Expect::Int]).optional();
    c.attr("default_min_factor", &[Expect::Int]).optional();
    c.attr("remainders", &[Expect::Int, Expect::Str]).optional();
}

fn dataspace_list(c: &mut ClassSchema, key: &str) {
    c.node_attr(key, NodeKind::ProblemDataspaceList)
        .with_default(empty_list);
}

fn declare_spatial(c: &mut ClassSchema) {
    declare_iteration(c, "spatial", || Raw::from("spatial"));
    dataspace_list(c, "no_multicast_no_reduction");
    dataspace_list(c, "no_link_transfer");
    c.attr("split", &[Expect::Int]).optional();
}

fn declare_temporal(c: &mut ClassSchema) {
    declare_iteration(c, "temporal", || Raw::from("temporal"));
    dataspace_list(c, "no_temporal_reuse");
    dataspace_list(c, "rmw_on_first_writeback");
}

fn declare_dataspace(c: &mut ClassSchema) {
    declare_constraint(c, "dataspace", || Raw::from("dataspace"));
    for key in ["bypass", "keep", "passthrough"] {
        dataspace_list(c, key);
    }
}

// ── Factories ──────────────────────────────────────────────────────────────

fn constraint_factory(builder: &mut Builder<'_>, raw: &Raw) -> Result<Value> {
    let fail = |builder: &Builder<'_>, reason: String| SpecError::Cast {
        path: builder.path(),
        key: "type".to_string(),
        reason,
    };
    let ctype = match raw.get("type") {
        Some(Raw::Str(ctype)) => ctype.clone(),
        _ => return Err(fail(builder, "Constraint must have a type".to_string())),
    };
    match NodeKind::from_constraint_type(&ctype) {
        Some(kind) => Ok(Value::Node(builder.node(kind, raw)?)),
        None => Err(fail(
            builder,
            format!(
                "Constraint type '{ctype}' not recognized. Must be one of {:?}",
                NodeKind::CONSTRAINTS
                    .iter()
                    .filter_map(|k| k.constraint_type())
                    .collect::<Vec<_>>()
            ),
        )),
    }
}

pub(crate) fn factors_factory(builder: &mut Builder<'_>, raw: &Raw) -> Result<Value> {
    let parts: Vec<String> = match raw {
        Raw::Null => Vec::new(),
        Raw::Str(s) => {
            debug!(factors = %s, "factors given as a string, splitting into a list");
            split_list_string(s)
        }
        Raw::List(list) => list.items.iter().map(raw_item_string).collect(),
        other => {
            return Err(SpecError::Cast {
                path: builder.path(),
                key: "factors".to_string(),
                reason: format!("factors must be a string or a list, found {other}"),
            })
        }
    };
    let mut normalized = Vec::with_capacity(parts.len());
    for part in parts.iter().filter(|p| !p.trim().is_empty()) {
        let factor = Factor::parse(part).map_err(|reason| SpecError::Cast {
            path: builder.path(),
            key: "factors".to_string(),
            reason,
        })?;
        normalized.push(factor.to_string());
    }
    let id = builder.node(
        NodeKind::Factors,
        &Raw::list(normalized.into_iter().map(Raw::Str)),
    )?;
    factors_check_unique(builder.tree, id)?;
    Ok(Value::Node(id))
}

fn permutation_factory(builder: &mut Builder<'_>, raw: &Raw) -> Result<Value> {
    let dims: Vec<String> = match raw {
        Raw::Null => Vec::new(),
        Raw::Str(s) => {
            debug!(permutation = %s, "permutation given as a string, splitting into a list");
            if s.contains(',') {
                s.split(',').map(|d| d.trim().to_string()).collect()
            } else {
                s.chars()
                    .filter(|c| !c.is_whitespace())
                    .map(String::from)
                    .collect()
            }
        }
        Raw::List(list) => list.items.iter().map(raw_item_string).collect(),
        other => {
            return Err(SpecError::Cast {
                path: builder.path(),
                key: "permutation".to_string(),
                reason: format!("permutation must be a string or a list, found {other}"),
            })
        }
    };
    let dims = dims.into_iter().filter(|d| !d.is_empty()).map(Raw::Str);
    builder
        .node(NodeKind::Permutation, &Raw::list(dims))
        .map(Value::Node)
}

fn raw_item_string(raw: &Raw) -> String {
    match raw {
        Raw::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `"A=1,B=2"` or `"A=1 B=2"` into its parts.
fn split_list_string(s: &str) -> Vec<String> {
    if s.contains(',') {
        s.split(',').map(str::to_string).collect()
    } else if s.contains(' ') {
        s.split(' ').map(str::to_string).collect()
    } else {
        vec![s.to_string()]
    }
}

// ── Factors ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factor {
    pub name: String,
    pub relation: &'static str,
    pub value: String,
}

impl Factor {
    pub fn parse(s: &str) -> std::result::Result<Factor, String> {
        for relation in ["<=", ">=", "="] {
            if let Some((name, value)) = s.split_once(relation) {
                return Ok(Factor {
                    name: name.trim().to_string(),
                    relation,
                    value: value.trim().to_string(),
                });
            }
        }
        Err(format!(
            "Did not find an \"=\", \"<=\" or \">=\" in factor \"{s}\". Format each factor as \
             \"X=123\", \"X<=123\", or \"X>=123\". Multiple factors may be given as a \
             comma-separated string, a space-separated string, or a list of strings."
        ))
    }

    /// A `<=` bound and a `>=` bound on one dimension may coexist.
    pub fn compatible(&self, other: &Factor) -> bool {
        self.name == other.name
            && matches!((self.relation, other.relation), ("<=", ">=") | (">=", "<="))
    }

    pub fn int_value(&self) -> Option<i64> {
        self.value.parse().ok()
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, self.relation, self.value)
    }
}

/// Parsed factors of a factor list; non-string items are skipped.
pub fn factors(tree: &Tree, id: NodeId) -> Result<Vec<Factor>> {
    tree.strings(id)
        .iter()
        .map(|s| {
            Factor::parse(s).map_err(|message| SpecError::Invalid {
                path: tree.path(id),
                message,
            })
        })
        .collect()
}

/// Drop repeated identical factors; reject two different factors on one name.
pub fn factors_check_unique(tree: &mut Tree, id: NodeId) -> Result<()> {
    let mut seen: Vec<String> = Vec::new();
    let mut kept = Vec::new();
    for item in tree.items(id) {
        if let Value::Str(s) = item {
            if seen.contains(s) {
                continue;
            }
            seen.push(s.clone());
        }
        kept.push(item.clone());
    }
    tree.set_items(id, kept)?;

    let parsed = factors(tree, id)?;
    for (i, a) in parsed.iter().enumerate() {
        if let Some(b) = parsed[..i]
            .iter()
            .find(|b| b.name == a.name && !a.compatible(b))
        {
            return Err(SpecError::Combine {
                path: tree.path(id),
                reason: format!(
                    "Found two constraints {a} and {b} for the same variable {}.",
                    a.name
                ),
            });
        }
    }
    Ok(())
}

pub fn factor_names(tree: &Tree, id: NodeId) -> Result<Vec<String>> {
    Ok(factors(tree, id)?.into_iter().map(|f| f.name).collect())
}

pub fn name2factor(tree: &Tree, id: NodeId, name: &str) -> Result<Option<Factor>> {
    Ok(factors(tree, id)?.into_iter().find(|f| f.name == name))
}

pub fn add_eq_factor(tree: &mut Tree, id: NodeId, name: &str, value: i64) -> Result<()> {
    tree.push(id, Value::Str(format!("{name}={value}")))?;
    factors_check_unique(tree, id)
}

/// Add `name=value` unless `name` already has a factor. True if added.
pub fn add_eq_factor_iff_not_exists(
    tree: &mut Tree,
    id: NodeId,
    name: &str,
    value: i64,
) -> Result<bool> {
    if factor_names(tree, id)?.iter().any(|n| n == name) {
        return Ok(false);
    }
    add_eq_factor(tree, id, name, value)?;
    Ok(true)
}

pub fn remove_factor(tree: &mut Tree, id: NodeId, name: &str) -> Result<()> {
    let kept: Vec<Value> = tree
        .items(id)
        .iter()
        .filter(|item| match item {
            Value::Str(s) => Factor::parse(s).map_or(true, |f| f.name != name),
            _ => true,
        })
        .cloned()
        .collect();
    tree.set_items(id, kept)
}

/// Product of all integer `=` factors.
pub fn minimum_product(tree: &Tree, id: NodeId) -> Result<i64> {
    Ok(factors(tree, id)?
        .iter()
        .filter(|f| f.relation == "=")
        .filter_map(Factor::int_value)
        .filter(|v| *v != 0)
        .product())
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// A constraint group pinning every dimension to 1 temporally and bypassing
/// every data space.
pub fn dummy_constraints(
    builder: &mut Builder<'_>,
    dimensions: &[String],
    dataspaces: &[String],
    create_spatial: bool,
) -> Result<NodeId> {
    let factors = Raw::list(dimensions.iter().map(|d| Raw::Str(format!("{d}=1"))));
    let permutation = Raw::strs(dimensions.iter().map(String::as_str));
    let mut entries = vec![
        (
            "temporal",
            Raw::map([
                ("factors", factors.clone()),
                ("permutation", permutation.clone()),
            ]),
        ),
        (
            "dataspace",
            Raw::map([("bypass", Raw::strs(dataspaces.iter().map(String::as_str)))]),
        ),
    ];
    if create_spatial {
        entries.push((
            "spatial",
            Raw::map([("factors", factors), ("permutation", permutation)]),
        ));
    }
    builder.node(NodeKind::ConstraintGroup, &Raw::map(entries))
}
