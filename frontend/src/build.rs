// build.rs — Casting raw documents into typed tree nodes
//
// The builder walks a raw document against the schema, producing nodes in a
// `Tree`. Each value goes through the cast contract: a missing value takes a
// fresh default (or is reported missing), a dry-run shape check decides
// whether the cast can apply at this level, the cast runs (recursively for
// nested nodes), and the result is type-checked against the specifier.
//
// Preconditions: `schema` declares every kind that casts may produce.
// Postconditions: a physical raw object cast twice through the same cast
//   yields the same value (the cast cache is keyed by raw identity).
// Failure modes: reserved keys, missing required keys, shape mismatches at
//   this level (`Cast`) and type mismatches; nested failures propagate as-is.
// Side effects: allocates nodes in the borrowed tree.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::diag::{Result, SpecError};
use crate::id::{NodeId, RawId};
use crate::kinds::{NodeKind, Shape};
use crate::raw::{Raw, RawList, RawMap};
use crate::registry::{Cast, Schema, TypeSpecifier};
use crate::tree::{Tree, Value};

/// Keys no document may set on any node.
pub const RESERVED_KEYS: &[&str] = &["tag", "parent_node"];

pub struct Builder<'a> {
    schema: &'a Schema,
    pub tree: &'a mut Tree,
    cache: HashMap<(RawId, &'static str), Value>,
    frames: Vec<String>,
}

impl<'a> Builder<'a> {
    pub fn new(schema: &'a Schema, tree: &'a mut Tree) -> Self {
        for class in schema.classes() {
            tree.declare_keys(class.kind, class.names());
        }
        Self {
            schema,
            tree,
            cache: HashMap::new(),
            frames: Vec::new(),
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Dotted path of the position currently being built.
    pub fn path(&self) -> String {
        if self.frames.is_empty() {
            "<root>".to_string()
        } else {
            self.frames.join(".")
        }
    }

    /// Build the top-level node of `kind` from `raw`.
    pub fn build(&mut self, kind: NodeKind, raw: &Raw) -> Result<NodeId> {
        let cast = Cast::Node(kind);
        if let Err(reason) = precheck(&cast, raw) {
            return Err(SpecError::Cast {
                path: self.path(),
                key: kind.name().to_string(),
                reason,
            });
        }
        match self.apply(cast, raw)? {
            Value::Node(id) => Ok(id),
            other => Err(SpecError::Cast {
                path: self.path(),
                key: kind.name().to_string(),
                reason: format!("produced a {} instead of a node", other.type_name()),
            }),
        }
    }

    /// Cast `raw` for `key` through `spec`, then type-check the result.
    pub fn cast_with(&mut self, spec: &TypeSpecifier, key: &str, raw: &Raw) -> Result<Value> {
        if matches!(raw, Raw::Null) {
            if let Some(default) = spec.default {
                let default = default();
                if matches!(default, Raw::Null) {
                    return Ok(Value::Null);
                }
                return self.cast_with(spec, key, &default);
            }
        }
        if let Err(reason) = precheck(&spec.cast, raw) {
            return Err(SpecError::Cast {
                path: self.path(),
                key: key.to_string(),
                reason,
            });
        }
        let value = self.apply(spec.cast, raw)?;
        if !spec.accepts(self.tree, &value) {
            return Err(SpecError::TypeMismatch {
                path: self.path(),
                key: key.to_string(),
                value: self.tree.display(&value),
                expected: spec.describe_expect(),
            });
        }
        Ok(value)
    }

    fn apply(&mut self, cast: Cast, raw: &Raw) -> Result<Value> {
        let cache_key = match (&cast, raw.identity()) {
            (Cast::Plain, _) | (_, None) => None,
            (cast, Some(id)) => Some((id, cast.key())),
        };
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key) {
                return Ok(hit.clone());
            }
        }
        let value = match cast {
            Cast::Plain => self.plain(raw)?,
            Cast::Node(kind) => Value::Node(self.node(kind, raw)?),
            Cast::Factory { build, .. } => build(self, raw)?,
        };
        if let Some(key) = cache_key {
            self.cache.insert(key, value.clone());
        }
        Ok(value)
    }

    /// Scalars pass through; maps and lists become free-form nodes.
    pub fn plain(&mut self, raw: &Raw) -> Result<Value> {
        Ok(match raw {
            Raw::Null => Value::Null,
            Raw::Bool(b) => Value::Bool(*b),
            Raw::Int(i) => Value::Int(*i),
            Raw::Float(x) => Value::Float(*x),
            Raw::Str(s) => Value::Str(s.clone()),
            Raw::Map(m) => Value::Node(self.build_dict(NodeKind::Dict, m)?),
            Raw::List(l) => Value::Node(self.build_list(NodeKind::List, l)?),
        })
    }

    /// Construct a node of `kind`, keeping the raw object's tag.
    pub fn node(&mut self, kind: NodeKind, raw: &Raw) -> Result<NodeId> {
        match (kind.shape(), raw) {
            (Shape::Dict, Raw::Map(m)) => self.build_dict(kind, m),
            (Shape::List, Raw::List(l)) => self.build_list(kind, l),
            (Shape::Dict, Raw::Null) => self.build_dict(kind, &RawMap::default()),
            (Shape::List, Raw::Null) => self.build_list(kind, &RawList::default()),
            _ => Err(SpecError::Cast {
                path: self.path(),
                key: kind.name().to_string(),
                reason: format!(
                    "expected {} data, found {}",
                    shape_name(kind),
                    raw.type_name()
                ),
            }),
        }
    }

    fn enter(&mut self, kind: NodeKind, name: Option<&str>) {
        self.frames.push(match name {
            Some(name) => format!("{kind}({name})"),
            None => kind.to_string(),
        });
    }

    /// Cast one child with the current frame suffixed by `[slot]`.
    fn cast_child(&mut self, slot: &str, spec: Option<&TypeSpecifier>, raw: &Raw) -> Result<Value> {
        let saved = self.frames.last().cloned().unwrap_or_default();
        if let Some(frame) = self.frames.last_mut() {
            *frame = format!("{saved}[{slot}]");
        }
        let result = match spec {
            Some(spec) => self.cast_with(spec, slot, raw),
            None => self.plain(raw),
        };
        if let Some(frame) = self.frames.last_mut() {
            *frame = saved;
        }
        result
    }

    fn build_dict(&mut self, kind: NodeKind, map: &RawMap) -> Result<NodeId> {
        self.enter(kind, map.entries.get("name").and_then(Raw::as_str));
        let result = self.build_dict_inner(kind, map);
        self.frames.pop();
        result
    }

    fn build_dict_inner(&mut self, kind: NodeKind, map: &RawMap) -> Result<NodeId> {
        for key in RESERVED_KEYS {
            if map.entries.contains_key(*key) {
                return Err(SpecError::ReservedKey {
                    path: self.path(),
                    key: key.to_string(),
                });
            }
        }
        let schema = self.schema;
        let class = schema.class(kind);
        let mut entries = IndexMap::new();
        let mut consumed: Vec<&str> = Vec::new();
        let mut missing = Vec::new();

        if let Some(class) = class {
            for spec in class.specifiers().filter(|s| !s.no_change_key) {
                if let Some(raw) = map.entries.get(&spec.name) {
                    consumed.push(spec.name.as_str());
                    let value = self.cast_child(&spec.name, Some(spec), raw)?;
                    entries.insert(spec.name.clone(), value);
                } else if let Some(default) = spec.default {
                    let value = self.cast_child(&spec.name, Some(spec), &default())?;
                    entries.insert(spec.name.clone(), value);
                } else {
                    missing.push(spec.name.clone());
                }
            }
        }
        if let Some(first) = missing.first() {
            return Err(SpecError::MissingKey {
                path: self.path(),
                key: first.clone(),
                missing: missing.clone(),
                found: map.entries.keys().cloned().collect(),
            });
        }

        let id = self.tree.alloc_dict(kind, map.tag.clone(), entries);
        for (key, raw) in &map.entries {
            if consumed.contains(&key.as_str()) {
                continue;
            }
            let spec = class.and_then(|c| c.lookup(key));
            match spec {
                Some(spec) if spec.no_change_key || spec.name == *key => {
                    let value = self.cast_child(key, Some(spec), raw)?;
                    self.tree.set(id, key, value)?;
                }
                Some(spec) => {
                    let value = self.cast_child(key, Some(spec), raw)?;
                    let target = spec.name.clone();
                    crate::combine::combine_index(self.tree, id, &target, value)?;
                }
                None => {
                    let value = self.cast_child(key, None, raw)?;
                    self.tree.set(id, key, value)?;
                }
            }
        }
        Ok(id)
    }

    fn build_list(&mut self, kind: NodeKind, list: &RawList) -> Result<NodeId> {
        self.enter(kind, None);
        let result = self.build_list_inner(kind, list);
        self.frames.pop();
        result
    }

    fn build_list_inner(&mut self, kind: NodeKind, list: &RawList) -> Result<NodeId> {
        let schema = self.schema;
        let class = schema.class(kind);
        let mut items = Vec::with_capacity(list.items.len());
        for (i, raw) in list.items.iter().enumerate() {
            let spec = class.and_then(|c| c.list_lookup(raw.tag(), None));
            items.push(self.cast_child(&i.to_string(), spec, raw)?);
        }
        Ok(self.tree.alloc_list(kind, list.tag.clone(), items))
    }

    /// Cast a duplicate value for `key` of an existing node and combine it
    /// into whatever the node already holds there.
    pub fn merge_extra(&mut self, node: NodeId, key: &str, raw: &Raw) -> Result<Value> {
        let kind = self.tree.kind(node);
        self.frames = vec![kind.to_string()];
        let spec = self.schema.class(kind).and_then(|c| c.lookup(key)).cloned();
        let target = match &spec {
            Some(spec) if !spec.no_change_key => spec.name.clone(),
            _ => key.to_string(),
        };
        let value = self.cast_child(key, spec.as_ref(), raw)?;
        self.frames.clear();
        crate::combine::combine_index(self.tree, node, &target, value)
    }
}

/// Dry-run shape check: can `cast` apply to `raw` at this level?
fn precheck(cast: &Cast, raw: &Raw) -> std::result::Result<(), String> {
    match cast {
        Cast::Plain | Cast::Factory { .. } => Ok(()),
        Cast::Node(kind) => match (kind.shape(), raw) {
            (_, Raw::Null) | (Shape::Dict, Raw::Map(_)) | (Shape::List, Raw::List(_)) => Ok(()),
            _ => Err(format!(
                "{kind} expects {} data, found {} {raw}",
                shape_name(*kind),
                raw.type_name()
            )),
        },
    }
}

fn shape_name(kind: NodeKind) -> &'static str {
    match kind.shape() {
        Shape::Dict => "dict",
        Shape::List => "list",
    }
}
