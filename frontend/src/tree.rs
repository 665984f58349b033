// tree.rs — Arena-backed specification tree
//
// Nodes live in a `Tree` arena and refer to each other through `NodeId`.
// A node's `parent` is a non-owning back-reference used only for naming;
// it is reassigned whenever the node is stored under a new parent. The
// same `NodeId` may sit at two positions until the References2Copies
// processor splits such aliases into independent copies.
//
// Preconditions: ids passed to accessors were allocated by this tree.
// Postconditions: every store of a node value updates the child's parent.
// Failure modes: alias keys, shape mismatches (dict op on a list) and
//   missing children produce `SpecError`.
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;

use crate::diag::{Result, SpecError};
use crate::id::{IdAllocator, NodeId};
use crate::kinds::NodeKind;

// ── Values ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Node(NodeId),
}

impl Value {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view: ints, and floats with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(x) if x.fract() == 0.0 && x.is_finite() => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Node(_) => "node",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::Node(id)
    }
}

/// Position of a value inside its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Key(String),
    Index(usize),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Key(k) => f.write_str(k),
            Slot::Index(i) => write!(f, "{i}"),
        }
    }
}

// ── Nodes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Dict(IndexMap<String, Value>),
    List(Vec<Value>),
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub tag: Option<String>,
    pub parent: Option<NodeId>,
    pub body: Body,
}

/// Owning arena for one specification tree.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<NodeData>,
    ids: IdAllocator,
    declared: HashMap<NodeKind, HashSet<String>>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the keys declared for `kind`, so that hyphenated spellings of
    /// them are rejected even while the key itself is absent.
    pub fn declare_keys<I, S>(&mut self, kind: NodeKind, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = self.declared.entry(kind).or_default();
        set.extend(keys.into_iter().map(Into::into).filter(|k| !k.is_empty()));
    }

    /// Number of nodes ever allocated (including detached ones).
    pub fn allocated(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, kind: NodeKind, tag: Option<String>, body: Body) -> NodeId {
        let id = self.ids.alloc_node();
        self.nodes.push(NodeData {
            kind,
            tag,
            parent: None,
            body,
        });
        let children: Vec<NodeId> = self.child_ids(id);
        for child in children {
            self.nodes[child.index()].parent = Some(id);
        }
        id
    }

    pub fn alloc_dict(
        &mut self,
        kind: NodeKind,
        tag: Option<String>,
        entries: IndexMap<String, Value>,
    ) -> NodeId {
        self.alloc(kind, tag, Body::Dict(entries))
    }

    pub fn alloc_list(&mut self, kind: NodeKind, tag: Option<String>, items: Vec<Value>) -> NodeId {
        self.alloc(kind, tag, Body::List(items))
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).tag.as_deref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn is_dict(&self, id: NodeId) -> bool {
        matches!(self.node(id).body, Body::Dict(_))
    }

    /// Number of entries (dict) or items (list).
    pub fn size(&self, id: NodeId) -> usize {
        match &self.node(id).body {
            Body::Dict(d) => d.len(),
            Body::List(l) => l.len(),
        }
    }

    fn adopt(&mut self, parent: NodeId, value: &Value) {
        if let Value::Node(child) = value {
            self.nodes[child.index()].parent = Some(parent);
        }
    }

    fn shape_error(&self, id: NodeId, wanted: &str) -> SpecError {
        SpecError::Invalid {
            path: self.path(id),
            message: format!("{} is not a {wanted} node", self.kind(id)),
        }
    }

    // ── Dict access ────────────────────────────────────────────────────────

    /// Reject keys that are a hyphen/underscore variant of a present key,
    /// or a hyphenated spelling of a key declared for the node's kind.
    pub fn check_alias(&self, id: NodeId, key: &str) -> Result<()> {
        let node = self.node(id);
        let Body::Dict(entries) = &node.body else {
            return Ok(());
        };
        let mut existing = None;
        if key.contains('_') {
            let variant = key.replace('_', "-");
            if entries.contains_key(&variant) {
                existing = Some(variant);
            }
        }
        if key.contains('-') {
            let variant = key.replace('-', "_");
            let declared = self
                .declared
                .get(&node.kind)
                .is_some_and(|keys| keys.contains(&variant));
            if declared || entries.contains_key(&variant) {
                existing = Some(variant);
            }
        }
        match existing {
            Some(existing) => Err(SpecError::AliasKey {
                path: self.path(id),
                key: key.to_string(),
                existing,
            }),
            None => Ok(()),
        }
    }

    fn dict(&self, id: NodeId) -> Result<&IndexMap<String, Value>> {
        match &self.node(id).body {
            Body::Dict(d) => Ok(d),
            Body::List(_) => Err(self.shape_error(id, "dict")),
        }
    }

    fn dict_mut(&mut self, id: NodeId) -> Result<&mut IndexMap<String, Value>> {
        if !self.is_dict(id) {
            return Err(self.shape_error(id, "dict"));
        }
        match &mut self.nodes[id.index()].body {
            Body::Dict(d) => Ok(d),
            Body::List(_) => Err(SpecError::Invalid {
                path: String::new(),
                message: "expected a dict node".to_string(),
            }),
        }
    }

    pub fn get(&self, id: NodeId, key: &str) -> Result<Option<&Value>> {
        self.check_alias(id, key)?;
        Ok(self.dict(id)?.get(key))
    }

    pub fn set(&mut self, id: NodeId, key: &str, value: Value) -> Result<()> {
        self.check_alias(id, key)?;
        self.adopt(id, &value);
        self.dict_mut(id)?.insert(key.to_string(), value);
        Ok(())
    }

    pub fn pop(&mut self, id: NodeId, key: &str) -> Result<Option<Value>> {
        self.check_alias(id, key)?;
        Ok(self.dict_mut(id)?.shift_remove(key))
    }

    pub fn setdefault(&mut self, id: NodeId, key: &str, value: Value) -> Result<Value> {
        self.check_alias(id, key)?;
        if let Some(v) = self.dict(id)?.get(key) {
            return Ok(v.clone());
        }
        self.adopt(id, &value);
        self.dict_mut(id)?.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Key presence without alias checking.
    pub fn contains_key(&self, id: NodeId, key: &str) -> bool {
        matches!(&self.node(id).body, Body::Dict(d) if d.contains_key(key))
    }

    pub fn keys(&self, id: NodeId) -> Vec<String> {
        match &self.node(id).body {
            Body::Dict(d) => d.keys().cloned().collect(),
            Body::List(_) => Vec::new(),
        }
    }

    /// Child node stored under `key`; errors if absent or not a node.
    pub fn child(&self, id: NodeId, key: &str) -> Result<NodeId> {
        match self.get(id, key)? {
            Some(Value::Node(child)) => Ok(*child),
            Some(other) => Err(SpecError::Invalid {
                path: self.path(id),
                message: format!(
                    "expected \"{key}\" to be a node, found {}",
                    other.type_name()
                ),
            }),
            None => Err(SpecError::Invalid {
                path: self.path(id),
                message: format!("missing \"{key}\""),
            }),
        }
    }

    /// Child node under `key` when present and a node.
    pub fn opt_child(&self, id: NodeId, key: &str) -> Option<NodeId> {
        match &self.node(id).body {
            Body::Dict(d) => d.get(key).and_then(Value::as_node),
            Body::List(_) => None,
        }
    }

    pub fn str_at(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.node(id).body {
            Body::Dict(d) => d.get(key).and_then(Value::as_str),
            Body::List(_) => None,
        }
    }

    /// The `name` entry of a dict node, if it is a string.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.str_at(id, "name")
    }

    // ── List access ────────────────────────────────────────────────────────

    pub fn items(&self, id: NodeId) -> &[Value] {
        match &self.node(id).body {
            Body::List(l) => l,
            Body::Dict(_) => &[],
        }
    }

    /// String items of a list node, in order.
    pub fn strings(&self, id: NodeId) -> Vec<String> {
        self.items(id)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    fn list_mut(&mut self, id: NodeId) -> Result<&mut Vec<Value>> {
        if self.is_dict(id) {
            return Err(self.shape_error(id, "list"));
        }
        match &mut self.nodes[id.index()].body {
            Body::List(l) => Ok(l),
            Body::Dict(_) => Err(SpecError::Invalid {
                path: String::new(),
                message: "expected a list node".to_string(),
            }),
        }
    }

    pub fn push(&mut self, id: NodeId, value: Value) -> Result<()> {
        self.adopt(id, &value);
        self.list_mut(id)?.push(value);
        Ok(())
    }

    pub fn insert(&mut self, id: NodeId, index: usize, value: Value) -> Result<()> {
        self.adopt(id, &value);
        let items = self.list_mut(id)?;
        let index = index.min(items.len());
        items.insert(index, value);
        Ok(())
    }

    pub fn remove_at(&mut self, id: NodeId, index: usize) -> Result<Option<Value>> {
        let items = self.list_mut(id)?;
        if index < items.len() {
            Ok(Some(items.remove(index)))
        } else {
            Ok(None)
        }
    }

    pub fn pop_front(&mut self, id: NodeId) -> Result<Option<Value>> {
        self.remove_at(id, 0)
    }

    pub fn set_items(&mut self, id: NodeId, items: Vec<Value>) -> Result<()> {
        for item in &items {
            self.adopt(id, item);
        }
        *self.list_mut(id)? = items;
        Ok(())
    }

    // ── Generic slots ──────────────────────────────────────────────────────

    /// All `(slot, value)` pairs of a node in storage order.
    pub fn children(&self, id: NodeId) -> Vec<(Slot, Value)> {
        match &self.node(id).body {
            Body::Dict(d) => d
                .iter()
                .map(|(k, v)| (Slot::Key(k.clone()), v.clone()))
                .collect(),
            Body::List(l) => l
                .iter()
                .enumerate()
                .map(|(i, v)| (Slot::Index(i), v.clone()))
                .collect(),
        }
    }

    /// Node-valued children in storage order.
    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).body {
            Body::Dict(d) => d.values().filter_map(Value::as_node).collect(),
            Body::List(l) => l.iter().filter_map(Value::as_node).collect(),
        }
    }

    pub fn set_slot(&mut self, id: NodeId, slot: &Slot, value: Value) -> Result<()> {
        match slot {
            Slot::Key(k) => {
                self.adopt(id, &value);
                self.dict_mut(id)?.insert(k.clone(), value);
            }
            Slot::Index(i) => {
                self.adopt(id, &value);
                let items = self.list_mut(id)?;
                match items.get_mut(*i) {
                    Some(item) => *item = value,
                    None => items.push(value),
                }
            }
        }
        Ok(())
    }

    pub fn remove_slot(&mut self, id: NodeId, slot: &Slot) -> Result<Option<Value>> {
        match slot {
            Slot::Key(k) => Ok(self.dict_mut(id)?.shift_remove(k)),
            Slot::Index(i) => self.remove_at(id, *i),
        }
    }

    // ── Walks ──────────────────────────────────────────────────────────────

    /// Pre-order walk from `root`; each node id is visited once.
    pub fn walk(&self, root: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            let mut kids = self.child_ids(id);
            kids.reverse();
            stack.extend(kids);
        }
        order
    }

    /// Post-order walk from `root` (children before parents).
    pub fn walk_post(&self, root: NodeId) -> Vec<NodeId> {
        fn visit(tree: &Tree, id: NodeId, seen: &mut HashSet<NodeId>, out: &mut Vec<NodeId>) {
            if !seen.insert(id) {
                return;
            }
            for child in tree.child_ids(id) {
                visit(tree, child, seen, out);
            }
            out.push(id);
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        visit(self, root, &mut seen, &mut out);
        out
    }

    /// All nodes beneath (and including) `root` whose kind is in `kinds`.
    pub fn nodes_of_kind(&self, root: NodeId, kinds: &[NodeKind]) -> Vec<NodeId> {
        self.walk(root)
            .into_iter()
            .filter(|id| kinds.contains(&self.kind(*id)))
            .collect()
    }

    /// Apply `f` to every node beneath `root`, parents first.
    pub fn recursive_apply<E>(
        &mut self,
        root: NodeId,
        mut f: impl FnMut(&mut Tree, NodeId) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        for id in self.walk(root) {
            f(self, id)?;
        }
        Ok(())
    }

    // ── Copying ────────────────────────────────────────────────────────────

    /// Copy the subtree at `id` into fresh nodes. The copy has no parent.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let data = self.node(id).clone();
        let body = match data.body {
            Body::Dict(d) => Body::Dict(
                d.into_iter()
                    .map(|(k, v)| (k, self.copy_value(v)))
                    .collect(),
            ),
            Body::List(l) => Body::List(l.into_iter().map(|v| self.copy_value(v)).collect()),
        };
        self.alloc(data.kind, data.tag, body)
    }

    fn copy_value(&mut self, value: Value) -> Value {
        match value {
            Value::Node(child) => Value::Node(self.deep_copy(child)),
            other => other,
        }
    }

    // ── Naming ─────────────────────────────────────────────────────────────

    fn segment(&self, id: NodeId) -> String {
        match self.name(id) {
            Some(name) => format!("{}({name})", self.kind(id)),
            None => self.kind(id).to_string(),
        }
    }

    fn slot_of(&self, parent: NodeId, child: NodeId) -> Option<Slot> {
        self.children(parent)
            .into_iter()
            .find(|(_, v)| *v == Value::Node(child))
            .map(|(slot, _)| slot)
    }

    /// Dotted path through parent back-references, e.g.
    /// `Specification[architecture].Architecture[nodes].ArchNodes[0].Storage(Buffer)`.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = vec![self.segment(id)];
        let mut current = id;
        let mut seen = HashSet::from([id]);
        while let Some(parent) = self.parent(current) {
            if !seen.insert(parent) {
                break;
            }
            let slot = self
                .slot_of(parent, current)
                .map(|s| format!("[{s}]"))
                .unwrap_or_default();
            parts.push(format!("{}{slot}", self.segment(parent)));
            current = parent;
        }
        parts.reverse();
        parts.join(".")
    }

    // ── Emptiness ──────────────────────────────────────────────────────────

    pub fn is_empty_value(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Str(s) => s.is_empty(),
            Value::Node(id) => self.is_empty_node(*id),
            _ => false,
        }
    }

    /// Kind-aware emptiness: constraints ignore `type`/`target`, sparse
    /// optimization groups only look at their three optimization sections.
    pub fn is_empty_node(&self, id: NodeId) -> bool {
        let kind = self.kind(id);
        match &self.node(id).body {
            Body::Dict(d) if kind.is_constraint() => d
                .iter()
                .filter(|(k, _)| k.as_str() != "type" && k.as_str() != "target")
                .all(|(_, v)| self.is_empty_value(v)),
            Body::Dict(d) if kind == NodeKind::SparseOptimizationGroup => [
                "action_optimization",
                "representation_format",
                "compute_optimization",
            ]
            .iter()
            .all(|k| d.get(*k).map_or(true, |v| self.is_empty_value(v))),
            Body::Dict(d) => d.is_empty(),
            Body::List(l) => l.is_empty(),
        }
    }

    /// True if the node holds nothing but (recursively) empty nodes and nulls.
    pub fn is_empty_recursive(&self, id: NodeId) -> bool {
        self.children(id).iter().all(|(_, v)| match v {
            Value::Null => true,
            Value::Node(child) => self.is_empty_recursive(*child),
            _ => false,
        })
    }

    /// Remove null and empty entries from every node beneath `root`.
    pub fn clean_empties(&mut self, root: NodeId) -> Result<()> {
        for id in self.walk_post(root) {
            let doomed: Vec<Slot> = self
                .children(id)
                .into_iter()
                .filter(|(_, v)| self.is_empty_value(v))
                .map(|(slot, _)| slot)
                .collect();
            for slot in doomed.iter().rev() {
                self.remove_slot(id, slot)?;
            }
        }
        Ok(())
    }

    // ── Comparison and export ──────────────────────────────────────────────

    /// Structural equality; node values compare by content.
    pub fn value_eq(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Node(x), Value::Node(y)) => {
                if x == y {
                    return true;
                }
                let (nx, ny) = (self.node(*x), self.node(*y));
                if nx.kind != ny.kind {
                    return false;
                }
                match (&nx.body, &ny.body) {
                    (Body::Dict(dx), Body::Dict(dy)) => {
                        dx.len() == dy.len()
                            && dx
                                .iter()
                                .all(|(k, v)| dy.get(k).is_some_and(|w| self.value_eq(v, w)))
                    }
                    (Body::List(lx), Body::List(ly)) => {
                        lx.len() == ly.len() && lx.iter().zip(ly).all(|(v, w)| self.value_eq(v, w))
                    }
                    _ => false,
                }
            }
            (Value::Int(i), Value::Float(x)) | (Value::Float(x), Value::Int(i)) => {
                (*i as f64) == *x
            }
            _ => a == b,
        }
    }

    pub fn to_json(&self, value: &Value) -> serde_json::Value {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Node(id) => match &self.node(*id).body {
                Body::Dict(d) => serde_json::Value::Object(
                    d.iter()
                        .map(|(k, v)| (k.clone(), self.to_json(v)))
                        .collect(),
                ),
                Body::List(l) => {
                    serde_json::Value::Array(l.iter().map(|v| self.to_json(v)).collect())
                }
            },
        }
    }

    /// Short human-readable rendering for messages.
    pub fn display(&self, value: &Value) -> String {
        match value {
            Value::Null => "None".to_string(),
            Value::Str(s) => format!("'{s}'"),
            Value::Bool(b) => (if *b { "True" } else { "False" }).to_string(),
            other => self.to_json(other).to_string(),
        }
    }
}
