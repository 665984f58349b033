// combine.rs — Merging two values that land on the same key or tag
//
// Empty values yield to the other side, identical values pass through and
// nodes of the same kind merge according to their kind: dicts key by key,
// combineable lists by concatenation, constraints with disjoint-list
// re-specification checks, architectures by appending nodes.
//
// Preconditions: both values belong to `tree`.
// Postconditions: the returned value holds the merged content; the right-hand
//   node may have been drained into the left-hand one.
// Failure modes: differing non-empty scalars, mismatched kinds, conflicting
//   constraint lists and conflicting factors produce `SpecError::Combine`.
// Side effects: logs a warning when two architectures are merged.

use indexmap::IndexMap;
use tracing::warn;

use crate::diag::{Result, SpecError};
use crate::id::NodeId;
use crate::kinds::{NodeKind, Shape};
use crate::model::constraints::factors_check_unique;
use crate::tree::{Tree, Value};

/// Merge `b` into `a`. `context` names where the values meet, for errors.
pub fn try_combine(tree: &mut Tree, a: Value, b: Value, context: &str) -> Result<Value> {
    if tree.is_empty_value(&a) {
        return Ok(b);
    }
    if tree.is_empty_value(&b) {
        return Ok(a);
    }
    match (&a, &b) {
        (Value::Node(x), Value::Node(y)) => {
            if x == y {
                return Ok(a);
            }
            let (kx, ky) = (tree.kind(*x), tree.kind(*y));
            if kx != ky {
                return Err(SpecError::Combine {
                    path: context.to_string(),
                    reason: format!("Can not combine different classes {kx} and {ky}."),
                });
            }
            combine_nodes(tree, *x, *y).map(Value::Node)
        }
        _ if tree.value_eq(&a, &b) => Ok(a),
        _ => Err(SpecError::Combine {
            path: context.to_string(),
            reason: format!(
                "Can not combine different values {} and {}.",
                tree.display(&a),
                tree.display(&b)
            ),
        }),
    }
}

/// Combine `value` into `node[key]`, or insert it if the key is absent.
pub fn combine_index(tree: &mut Tree, node: NodeId, key: &str, value: Value) -> Result<Value> {
    let merged = match tree.get(node, key)?.cloned() {
        Some(existing) => {
            let context = format!("{}[{key}]", tree.path(node));
            try_combine(tree, existing, value, &context)?
        }
        None => value,
    };
    tree.set(node, key, merged.clone())?;
    Ok(merged)
}

/// Merge node `b` into node `a` in place. Unlike `try_combine`, an empty
/// side does not short-circuit, so `a` keeps its identity and its keys.
pub fn merge_into(tree: &mut Tree, a: NodeId, b: NodeId) -> Result<()> {
    let (ka, kb) = (tree.kind(a), tree.kind(b));
    if ka != kb {
        return Err(SpecError::Combine {
            path: tree.path(a),
            reason: format!("Can not combine different classes {ka} and {kb}."),
        });
    }
    if a != b {
        combine_nodes(tree, a, b)?;
    }
    Ok(())
}

fn combine_nodes(tree: &mut Tree, a: NodeId, b: NodeId) -> Result<NodeId> {
    let kind = tree.kind(a);
    if kind == NodeKind::Architecture {
        warn!(
            "Multiple architectures found. Appending the nodes from one arch to the other. \
             Ignore this warning if this was intended."
        );
        return combine_dict(tree, a, b);
    }
    if kind.is_constraint() {
        return combine_constraints(tree, a, b);
    }
    match kind.shape() {
        Shape::Dict => combine_dict(tree, a, b),
        Shape::List if kind.is_combineable_list() => {
            let extra = tree.items(b).to_vec();
            for item in extra {
                tree.push(a, item)?;
            }
            if kind == NodeKind::Factors {
                factors_check_unique(tree, a)?;
            }
            Ok(a)
        }
        Shape::List => {
            if tree.value_eq(&Value::Node(a), &Value::Node(b)) {
                Ok(a)
            } else {
                Err(SpecError::Combine {
                    path: tree.path(a),
                    reason: format!("Can not combine two different {kind} lists."),
                })
            }
        }
    }
}

fn combine_dict(tree: &mut Tree, a: NodeId, b: NodeId) -> Result<NodeId> {
    for (key, theirs) in tree.children(b) {
        let key = key.to_string();
        let merged = match tree.get(a, &key)?.cloned() {
            None => theirs,
            Some(mine) if tree.is_empty_value(&mine) => theirs,
            Some(mine) if tree.is_empty_value(&theirs) => mine,
            Some(mine) if tree.value_eq(&mine, &theirs) => mine,
            Some(mine) => {
                let context = format!("{}[{key}]", tree.path(a));
                try_combine(tree, mine, theirs, &context)?
            }
        };
        tree.set(a, &key, merged)?;
    }
    Ok(a)
}

// ── Constraints ────────────────────────────────────────────────────────────

fn combine_constraints(tree: &mut Tree, a: NodeId, b: NodeId) -> Result<NodeId> {
    let (ta, tb) = (tree.str_at(a, "type"), tree.str_at(b, "type"));
    if ta.is_some() && tb.is_some() && ta != tb {
        return Err(SpecError::Combine {
            path: tree.path(a),
            reason: "Cannot combine constraints of different types.".to_string(),
        });
    }
    for group in tree.kind(a).disjoint_lists() {
        combine_list_attrs(tree, a, b, group)?;
    }
    combine_dict(tree, a, b)
}

/// Flatten the named list attributes into `{dataspace: list name}`.
fn list_attrs_to_map(tree: &Tree, id: NodeId, attrs: &[&str]) -> Result<IndexMap<String, String>> {
    let mut flattened: IndexMap<String, String> = IndexMap::new();
    for attr in attrs {
        let Some(list) = tree.opt_child(id, attr) else {
            continue;
        };
        for ds in tree.strings(list) {
            if let Some(previous) = flattened.get(&ds) {
                if previous != attr {
                    return Err(SpecError::Combine {
                        path: tree.path(id),
                        reason: format!(
                            "Re-specification of {ds} found in {attrs:?} for constraint {}.",
                            tree.kind(id)
                        ),
                    });
                }
            }
            flattened.insert(ds, attr.to_string());
        }
    }
    Ok(flattened)
}

fn combine_list_attrs(tree: &mut Tree, a: NodeId, b: NodeId, attrs: &[&str]) -> Result<()> {
    if tree.opt_child(a, attrs[0]).is_none() && tree.opt_child(b, attrs[0]).is_none() {
        return Ok(());
    }
    let mine = list_attrs_to_map(tree, a, attrs)?;
    let theirs = list_attrs_to_map(tree, b, attrs)?;
    let problems: Vec<String> = mine
        .iter()
        .filter_map(|(ds, list)| match theirs.get(ds) {
            Some(other) if other != list => Some(format!("{ds}={list} AND {ds}={other}")),
            _ => None,
        })
        .collect();
    if !problems.is_empty() {
        return Err(SpecError::Combine {
            path: tree.path(a),
            reason: format!(
                "Re-specification of {problems:?} in two {} constraints.",
                tree.kind(a)
            ),
        });
    }
    let mut merged = mine;
    for (ds, list) in theirs {
        merged.entry(ds).or_insert(list);
    }
    for attr in attrs {
        let items: Vec<Value> = merged
            .iter()
            .filter(|(_, list)| list.as_str() == *attr)
            .map(|(ds, _)| Value::from(ds.as_str()))
            .collect();
        set_dataspace_list(tree, a, attr, items)?;
        set_dataspace_list(tree, b, attr, Vec::new())?;
    }
    Ok(())
}

fn set_dataspace_list(tree: &mut Tree, id: NodeId, attr: &str, items: Vec<Value>) -> Result<()> {
    match tree.opt_child(id, attr) {
        Some(list) => tree.set_items(list, items),
        None => {
            let list = tree.alloc_list(NodeKind::ProblemDataspaceList, None, items);
            tree.set(id, attr, Value::Node(list))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(tree: &mut Tree, kind: NodeKind, items: &[&str]) -> NodeId {
        tree.alloc_list(kind, None, items.iter().map(|s| Value::from(*s)).collect())
    }

    fn dataspace(tree: &mut Tree, keep: &[&str], bypass: &[&str]) -> NodeId {
        let keep = strings(tree, NodeKind::ProblemDataspaceList, keep);
        let bypass = strings(tree, NodeKind::ProblemDataspaceList, bypass);
        tree.alloc_dict(
            NodeKind::Dataspace,
            None,
            [
                ("type".to_string(), Value::from("dataspace")),
                ("keep".to_string(), Value::Node(keep)),
                ("bypass".to_string(), Value::Node(bypass)),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn empty_yields_to_other_side() {
        let mut tree = Tree::new();
        let empty = tree.alloc_dict(NodeKind::Dict, None, IndexMap::new());
        let merged = try_combine(&mut tree, Value::Node(empty), Value::Int(3), "here").unwrap();
        assert_eq!(merged, Value::Int(3));
        let merged = try_combine(&mut tree, Value::from("x"), Value::Null, "here").unwrap();
        assert_eq!(merged, Value::from("x"));
    }

    #[test]
    fn differing_scalars_conflict() {
        let mut tree = Tree::new();
        let err =
            try_combine(&mut tree, Value::Int(1), Value::Int(2), "Attributes[depth]").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"Can not combine different values 1 and 2. (in Attributes[depth])");
    }

    #[test]
    fn dicts_merge_key_by_key() {
        let mut tree = Tree::new();
        let a = tree.alloc_dict(
            NodeKind::Variables,
            None,
            [
                ("x".to_string(), Value::Int(1)),
                ("y".to_string(), Value::Null),
            ]
            .into_iter()
            .collect(),
        );
        let b = tree.alloc_dict(
            NodeKind::Variables,
            None,
            [
                ("x".to_string(), Value::Int(1)),
                ("y".to_string(), Value::Int(5)),
            ]
            .into_iter()
            .collect(),
        );
        let merged =
            try_combine(&mut tree, a.into(), b.into(), "Specification[variables]").unwrap();
        assert_eq!(merged, Value::Node(a));
        assert_eq!(tree.get(a, "y").unwrap(), Some(&Value::Int(5)));
    }

    #[test]
    fn combineable_lists_concatenate() {
        let mut tree = Tree::new();
        let a = strings(&mut tree, NodeKind::Factors, &["A=1"]);
        let b = strings(&mut tree, NodeKind::Factors, &["B<=4", "A=1"]);
        try_combine(&mut tree, a.into(), b.into(), "Temporal[factors]").unwrap();
        assert_eq!(tree.strings(a), vec!["A=1".to_string(), "B<=4".to_string()]);
    }

    #[test]
    fn dataspace_lists_merge_and_detect_respecification() {
        let mut tree = Tree::new();
        let a = dataspace(&mut tree, &["Inputs"], &[]);
        let b = dataspace(&mut tree, &[], &["Weights"]);
        try_combine(&mut tree, a.into(), b.into(), "ConstraintGroup[dataspace]").unwrap();
        let keep = tree.opt_child(a, "keep").unwrap();
        let bypass = tree.opt_child(a, "bypass").unwrap();
        assert_eq!(tree.strings(keep), vec!["Inputs".to_string()]);
        assert_eq!(tree.strings(bypass), vec!["Weights".to_string()]);

        let c = dataspace(&mut tree, &[], &["Inputs"]);
        let err =
            try_combine(&mut tree, a.into(), c.into(), "ConstraintGroup[dataspace]").unwrap_err();
        assert!(err.to_string().contains("Re-specification of"));
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let mut tree = Tree::new();
        let a = strings(&mut tree, NodeKind::Factors, &["A=1"]);
        let b = strings(&mut tree, NodeKind::Permutation, &["A"]);
        let err = try_combine(&mut tree, a.into(), b.into(), "x").unwrap_err();
        assert!(err
            .to_string()
            .contains("different classes Factors and Permutation"));
    }
}
