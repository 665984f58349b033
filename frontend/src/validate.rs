// validate.rs — Whole-tree schema validation
//
// Construction tolerates unknown keys so that processors may repair an
// intermediate tree; this walk is where the tree is finally held to its
// schema. It flags unrecognized keys and tags, re-runs type checks, reports
// temporary keys that the registering processor failed to remove and
// enforces the cross-key cardinality rules.
//
// Preconditions: `schema` is the schema the tree was built with.
// Postconditions: Ok(()) means every node satisfies its class schema.
// Failure modes: first violation found in pre-order, as a `SpecError`.
// Side effects: none.

use crate::diag::{Result, SpecError};
use crate::id::NodeId;
use crate::kinds::Shape;
use crate::registry::{ClassSchema, Schema, TypeSpecifier};
use crate::tree::{Tree, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    /// Skip type checks on null and empty values.
    pub ignore_empty: bool,
    /// Do not report temporary keys that a processor should have removed.
    pub ignore_leftovers: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            ignore_empty: true,
            ignore_leftovers: false,
        }
    }
}

/// Validate every node reachable from `root`.
pub fn check_unrecognized(
    tree: &Tree,
    schema: &Schema,
    root: NodeId,
    options: CheckOptions,
) -> Result<()> {
    for id in tree.walk(root) {
        let Some(class) = schema.class(tree.kind(id)) else {
            continue;
        };
        match tree.kind(id).shape() {
            Shape::Dict => check_dict(tree, class, id, options)?,
            Shape::List => check_list(tree, class, id, options)?,
        }
    }
    Ok(())
}

fn check_dict(tree: &Tree, class: &ClassSchema, id: NodeId, options: CheckOptions) -> Result<()> {
    if !class.recognize_all {
        for (key, value) in tree.children(id) {
            let key = key.to_string();
            let Some(spec) = class.lookup(&key) else {
                return Err(SpecError::Unrecognized {
                    path: tree.path(id),
                    what: "key",
                    key,
                    recognized: class.names(),
                });
            };
            check_value(tree, spec, id, "key", &key, &value, options)?;
        }
    }
    check_key_groups(tree, class, id)
}

fn check_list(tree: &Tree, class: &ClassSchema, id: NodeId, options: CheckOptions) -> Result<()> {
    if class.recognize_all || class.specifiers().next().is_none() {
        return Ok(());
    }
    for (i, value) in tree.items(id).iter().enumerate() {
        let (tag, kind) = match value {
            Value::Node(child) => (tree.tag(*child), Some(tree.kind(*child))),
            _ => (None, None),
        };
        let Some(spec) = class.list_lookup(tag, kind) else {
            return Err(SpecError::Unrecognized {
                path: format!("{}[{i}]", tree.path(id)),
                what: "tag",
                key: tag
                    .map(str::to_string)
                    .or_else(|| kind.map(|k| format!("!{k}")))
                    .unwrap_or_else(|| value.type_name().to_string()),
                recognized: class.names(),
            });
        };
        check_value(tree, spec, id, "tag", &i.to_string(), value, options)?;
    }
    Ok(())
}

fn check_value(
    tree: &Tree,
    spec: &TypeSpecifier,
    id: NodeId,
    what: &'static str,
    key: &str,
    value: &Value,
    options: CheckOptions,
) -> Result<()> {
    if let Some(processor) = spec.removed_by {
        // Null placeholders seeded by construction carry nothing to transform.
        if !options.ignore_leftovers && !value.is_null() {
            return Err(SpecError::LeftoverKey {
                path: tree.path(id),
                what,
                key: key.to_string(),
                processor: processor.name().to_string(),
            });
        }
    }
    if options.ignore_empty && tree.is_empty_value(value) {
        return Ok(());
    }
    if !spec.accepts(tree, value) {
        return Err(SpecError::TypeMismatch {
            path: tree.path(id),
            key: key.to_string(),
            value: tree.display(value),
            expected: spec.describe_expect(),
        });
    }
    Ok(())
}

/// Present, not null, not empty and different from the declared default.
pub fn is_defined_non_default_non_empty(
    tree: &Tree,
    class: &ClassSchema,
    id: NodeId,
    key: &str,
) -> bool {
    let Ok(Some(value)) = tree.get(id, key) else {
        return false;
    };
    if tree.is_empty_value(value) {
        return false;
    }
    !class
        .specifier(key)
        .is_some_and(|spec| spec.is_default(tree, value))
}

fn check_key_groups(tree: &Tree, class: &ClassSchema, id: NodeId) -> Result<()> {
    let defined = |keys: &[String]| -> Vec<String> {
        keys.iter()
            .filter(|k| is_defined_non_default_non_empty(tree, class, id, k))
            .cloned()
            .collect()
    };
    for keys in &class.require_one_of {
        let found = defined(keys);
        if found.len() != 1 {
            return Err(SpecError::KeyGroup {
                path: tree.path(id),
                rule: "exactly one",
                keys: keys.clone(),
                found,
            });
        }
    }
    for keys in &class.require_all_or_none_of {
        let found = defined(keys);
        if !found.is_empty() && found.len() != keys.len() {
            return Err(SpecError::KeyGroup {
                path: tree.path(id),
                rule: "all or none",
                keys: keys.clone(),
                found,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::Builder;
    use crate::kinds::NodeKind;
    use crate::pass::ProcessorId;
    use crate::raw::Raw;
    use crate::registry::Expect;

    fn schema() -> Schema {
        let mut schema = Schema::empty();
        schema.declare(NodeKind::StorageAttributes, |c| {
            c.attr("entries", &[Expect::Int, Expect::Str]).optional();
            c.attr("depth", &[Expect::Int, Expect::Str]).optional();
            c.attr("n_banks", &[Expect::Int, Expect::Str])
                .with_default(|| Raw::Int(2));
            c.attr("ignore", &[]).wildcard().optional();
            c.require_one_of(&["entries", "depth"]);
        });
        schema.with_responsible(ProcessorId::ConstraintMacro, |s| {
            s.class_mut(NodeKind::StorageAttributes)
                .attr("keep_only", &[])
                .optional();
        });
        schema
    }

    fn build(schema: &Schema, tree: &mut Tree, yaml: &str) -> NodeId {
        Builder::new(schema, tree)
            .build(NodeKind::StorageAttributes, &Raw::parse_yaml(yaml).unwrap())
            .unwrap()
    }

    #[test]
    fn valid_node_passes() {
        let schema = schema();
        let mut tree = Tree::new();
        let id = build(&schema, &mut tree, "{depth: 16}");
        check_unrecognized(&tree, &schema, id, CheckOptions::default()).unwrap();
    }

    #[test]
    fn unknown_key_is_flagged() {
        let schema = schema();
        let mut tree = Tree::new();
        let id = build(
            &schema,
            &mut tree,
            "{depth: 16, colour: red, ignore_this: 1}",
        );
        let err = check_unrecognized(&tree, &schema, id, CheckOptions::default()).unwrap_err();
        match err {
            SpecError::Unrecognized { key, .. } => assert_eq!(key, "colour"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn require_one_of_counts_non_default_values() {
        let schema = schema();
        let mut tree = Tree::new();
        let none = build(&schema, &mut tree, "{n_banks: 4}");
        assert!(matches!(
            check_unrecognized(&tree, &schema, none, CheckOptions::default()),
            Err(SpecError::KeyGroup { .. })
        ));
        let both = build(&schema, &mut tree, "{depth: 4, entries: 8}");
        assert!(check_unrecognized(&tree, &schema, both, CheckOptions::default()).is_err());
    }

    #[test]
    fn leftover_temporary_keys_name_the_processor() {
        let schema = schema();
        let mut tree = Tree::new();
        let id = build(&schema, &mut tree, "{depth: 4, keep_only: [A]}");
        let err = check_unrecognized(&tree, &schema, id, CheckOptions::default()).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"Found key \"keep_only\" in StorageAttributes. This should have been removed or transformed by ConstraintMacro, but was not.");
        let lenient = CheckOptions {
            ignore_leftovers: true,
            ..CheckOptions::default()
        };
        check_unrecognized(&tree, &schema, id, lenient).unwrap();
    }
}
