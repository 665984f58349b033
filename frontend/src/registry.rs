// registry.rs — Schema registry: per-kind type-specifier tables
//
// A `Schema` owns one `ClassSchema` per node kind. It is built once (see
// `model::declare_all`) and then extended by the processors of a
// specification, which may register temporary keys. Temporary keys are
// stamped with the processor responsible for removing them; validation
// reports any that survive.
//
// Preconditions: declaration hooks call their parent-class hook first.
// Postconditions: `Schema::standard()` has a table for every `NodeKind`.
// Failure modes: none (declaration is infallible; lookups return Option).
// Side effects: none.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::build::Builder;
use crate::diag::Result;
use crate::kinds::{NodeKind, Shape};
use crate::pass::ProcessorId;
use crate::raw::Raw;
use crate::tree::{Tree, Value};

/// Produces a fresh default value for every use.
pub type DefaultFn = fn() -> Raw;

/// Custom cast from a raw value (e.g. dispatch on a `class` or `type` key).
pub type FactoryFn = fn(&mut Builder<'_>, &Raw) -> Result<Value>;

// ── Expected types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Null,
    Bool,
    Int,
    Float,
    Number,
    Str,
    Literal(&'static str),
    Node(NodeKind),
}

impl Expect {
    pub fn accepts(self, tree: &Tree, value: &Value) -> bool {
        match (self, value) {
            (Expect::Null, Value::Null) => true,
            (Expect::Bool, Value::Bool(_)) => true,
            (Expect::Int, Value::Int(_)) => true,
            (Expect::Float | Expect::Number, Value::Int(_) | Value::Float(_)) => true,
            (Expect::Str, Value::Str(_)) => true,
            (Expect::Literal(lit), Value::Str(s)) => lit == s,
            (Expect::Node(kind), Value::Node(id)) => tree.kind(*id) == kind,
            _ => false,
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Null => f.write_str("None"),
            Expect::Bool => f.write_str("bool"),
            Expect::Int => f.write_str("int"),
            Expect::Float => f.write_str("float"),
            Expect::Number => f.write_str("Number"),
            Expect::Str => f.write_str("str"),
            Expect::Literal(lit) => write!(f, "'{lit}'"),
            Expect::Node(kind) => f.write_str(kind.name()),
        }
    }
}

// ── Cast functions ─────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
pub enum Cast {
    /// Scalars pass through; maps and lists become free-form nodes.
    Plain,
    /// Construct a node of the given kind.
    Node(NodeKind),
    /// Custom constructor.
    Factory {
        name: &'static str,
        build: FactoryFn,
    },
}

impl Cast {
    /// Identity of the cast function, used as half of the cast cache key.
    pub fn key(&self) -> &'static str {
        match self {
            Cast::Plain => "plain",
            Cast::Node(kind) => kind.name(),
            Cast::Factory { name, .. } => name,
        }
    }
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cast::Plain => f.write_str("Plain"),
            Cast::Node(kind) => write!(f, "Node({kind})"),
            Cast::Factory { name, .. } => write!(f, "Factory({name})"),
        }
    }
}

// ── Type specifier ─────────────────────────────────────────────────────────

/// One schema rule for a key (dict kinds) or tag (list kinds).
#[derive(Debug, Clone)]
pub struct TypeSpecifier {
    pub name: String,
    pub expect: Vec<Expect>,
    pub default: Option<DefaultFn>,
    pub cast: Cast,
    pub part_name_match: bool,
    pub no_change_key: bool,
    pub removed_by: Option<ProcessorId>,
}

impl TypeSpecifier {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            expect: Vec::new(),
            default: None,
            cast: Cast::Plain,
            part_name_match: false,
            no_change_key: false,
            removed_by: None,
        }
    }

    pub fn with_default(&mut self, default: DefaultFn) -> &mut Self {
        self.default = Some(default);
        self
    }

    /// Default to null.
    pub fn optional(&mut self) -> &mut Self {
        self.default = Some(|| Raw::Null);
        self
    }

    pub fn with_cast(&mut self, cast: Cast) -> &mut Self {
        self.cast = cast;
        self
    }

    pub fn factory(&mut self, name: &'static str, build: FactoryFn) -> &mut Self {
        self.cast = Cast::Factory { name, build };
        self
    }

    /// Match any key containing this name, keeping the key unchanged.
    pub fn wildcard(&mut self) -> &mut Self {
        self.part_name_match = true;
        self.no_change_key = true;
        self
    }

    /// Match any key containing this name, combining into this name.
    pub fn part_name(&mut self) -> &mut Self {
        self.part_name_match = true;
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    pub fn matches_part(&self, key: &str) -> bool {
        self.part_name_match && key.contains(self.name.as_str())
    }

    /// Runtime type check. A value equal to the default always passes.
    pub fn accepts(&self, tree: &Tree, value: &Value) -> bool {
        if self.expect.is_empty() {
            return true;
        }
        self.is_default(tree, value) || self.expect.iter().any(|e| e.accepts(tree, value))
    }

    /// True if `value` equals this specifier's default.
    pub fn is_default(&self, tree: &Tree, value: &Value) -> bool {
        self.default
            .is_some_and(|default| raw_matches(tree, &default(), value))
    }

    pub fn describe_expect(&self) -> String {
        if self.expect.is_empty() {
            return "Any".to_string();
        }
        self.expect
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn raw_matches(tree: &Tree, raw: &Raw, value: &Value) -> bool {
    match (raw, value) {
        (Raw::Null, Value::Null) => true,
        (Raw::Bool(a), Value::Bool(b)) => a == b,
        (Raw::Int(a), Value::Int(b)) => a == b,
        (Raw::Float(a), Value::Float(b)) => a == b,
        (Raw::Int(a), Value::Float(b)) | (Raw::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Raw::Str(a), Value::Str(b)) => a == b,
        (Raw::Map(m), Value::Node(id)) => m.entries.is_empty() && tree.size(*id) == 0,
        (Raw::List(l), Value::Node(id)) => l.items.is_empty() && tree.size(*id) == 0,
        _ => false,
    }
}

// ── Class schema ───────────────────────────────────────────────────────────

/// The type-specifier table and cross-key rules of one node kind.
#[derive(Debug, Clone)]
pub struct ClassSchema {
    pub kind: NodeKind,
    specifiers: IndexMap<String, TypeSpecifier>,
    pub recognize_all: bool,
    pub require_one_of: Vec<Vec<String>>,
    pub require_all_or_none_of: Vec<Vec<String>>,
    responsible: Option<ProcessorId>,
}

impl ClassSchema {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            specifiers: IndexMap::new(),
            recognize_all: false,
            require_one_of: Vec::new(),
            require_all_or_none_of: Vec::new(),
            responsible: None,
        }
    }

    /// Declare (or redeclare) a key accepting the given types.
    pub fn attr(&mut self, name: &str, expect: &[Expect]) -> &mut TypeSpecifier {
        let mut spec = TypeSpecifier::new(name);
        spec.expect = expect.to_vec();
        spec.removed_by = self.responsible;
        let slot = self
            .specifiers
            .entry(name.to_string())
            .or_insert_with(|| TypeSpecifier::new(name));
        *slot = spec;
        slot
    }

    /// Declare a key holding a node of `kind`.
    pub fn node_attr(&mut self, name: &str, kind: NodeKind) -> &mut TypeSpecifier {
        self.attr(name, &[Expect::Node(kind)])
            .with_cast(Cast::Node(kind))
    }

    pub fn recognize_all(&mut self) {
        self.recognize_all = true;
    }

    pub fn require_one_of(&mut self, keys: &[&str]) {
        self.require_one_of
            .push(keys.iter().map(|k| k.to_string()).collect());
    }

    pub fn require_all_or_none_of(&mut self, keys: &[&str]) {
        self.require_all_or_none_of
            .push(keys.iter().map(|k| k.to_string()).collect());
    }

    pub fn specifier(&self, name: &str) -> Option<&TypeSpecifier> {
        self.specifiers.get(name)
    }

    pub fn specifiers(&self) -> impl Iterator<Item = &TypeSpecifier> {
        self.specifiers.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.specifiers.keys().cloned().collect()
    }

    /// Exact key match, then the first part-name match in declaration order.
    pub fn lookup(&self, key: &str) -> Option<&TypeSpecifier> {
        self.specifiers
            .get(key)
            .or_else(|| self.specifiers.values().find(|s| s.matches_part(key)))
    }

    /// Specifier governing a list element: by tag, then by the element's
    /// class name as `!Kind`, then the catch-all `""` rule.
    pub fn list_lookup(&self, tag: Option<&str>, kind: Option<NodeKind>) -> Option<&TypeSpecifier> {
        tag.and_then(|t| self.specifiers.get(t))
            .or_else(|| kind.and_then(|k| self.specifiers.get(&format!("!{}", k.name()))))
            .or_else(|| self.specifiers.get(""))
    }
}

// ── Schema ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Schema {
    classes: HashMap<NodeKind, ClassSchema>,
    responsible: Option<ProcessorId>,
}

impl Schema {
    pub fn empty() -> Self {
        Self {
            classes: HashMap::new(),
            responsible: None,
        }
    }

    /// The document-model schema without any processor extensions.
    pub fn standard() -> Self {
        let mut schema = Schema::empty();
        crate::model::declare_all(&mut schema);
        schema
    }

    pub fn class(&self, kind: NodeKind) -> Option<&ClassSchema> {
        self.classes.get(&kind)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassSchema> {
        self.classes.values()
    }

    /// Mutable table for `kind`, created on first use. Keys declared through
    /// it are stamped with the currently responsible processor, if any.
    pub fn class_mut(&mut self, kind: NodeKind) -> &mut ClassSchema {
        let responsible = self.responsible;
        let class = self
            .classes
            .entry(kind)
            .or_insert_with(|| ClassSchema::new(kind));
        class.responsible = responsible;
        class
    }

    /// Run a declaration hook for `kind`.
    pub fn declare(&mut self, kind: NodeKind, hook: fn(&mut ClassSchema)) {
        hook(self.class_mut(kind));
    }

    /// Declare temporary keys on behalf of `processor`. The previous owner is
    /// restored when `f` returns.
    pub fn with_responsible<R>(
        &mut self,
        processor: ProcessorId,
        f: impl FnOnce(&mut Schema) -> R,
    ) -> R {
        let previous = self.responsible.replace(processor);
        let result = f(self);
        self.responsible = previous;
        for class in self.classes.values_mut() {
            class.responsible = previous;
        }
        result
    }

    /// Render the keys of `kind` (and nested node kinds, up to `depth`
    /// levels) as an indented tree.
    pub fn property_tree(&self, kind: NodeKind, depth: usize) -> String {
        let mut out = String::new();
        out.push_str("[KEY_OR_TAG]: [EXPECTED_TYPE] [REQUIRED or = DEFAULT_VALUE]\n");
        out.push_str("├─ SUBNODES (If applicable)\n\n");
        out.push_str(kind.name());
        out.push('\n');
        let mut stack = vec![kind];
        self.render_tree(kind, "", depth, &mut stack, &mut out);
        out
    }

    fn render_tree(
        &self,
        kind: NodeKind,
        prefix: &str,
        depth: usize,
        stack: &mut Vec<NodeKind>,
        out: &mut String,
    ) {
        if depth == 0 {
            return;
        }
        let Some(class) = self.class(kind) else {
            return;
        };
        let specs: Vec<&TypeSpecifier> = class.specifiers().collect();
        for (i, spec) in specs.iter().enumerate() {
            let last = i + 1 == specs.len();
            let branch = if last { "└─ " } else { "├─ " };
            let key = if spec.part_name_match && spec.no_change_key {
                format!("*{}*", spec.name)
            } else if spec.name.is_empty() {
                "\"\"".to_string()
            } else {
                spec.name.clone()
            };
            let default = if kind.shape() == Shape::List {
                String::new()
            } else if spec.part_name_match && spec.no_change_key {
                " Optional".to_string()
            } else {
                match spec.default {
                    None => " REQUIRED".to_string(),
                    Some(f) => format!(" = {}", f()),
                }
            };
            let _ = writeln!(
                out,
                "{prefix}{branch}{key}: {}{default}",
                spec.describe_expect()
            );
            let nested = spec.expect.iter().find_map(|e| match e {
                Expect::Node(k) => Some(*k),
                _ => None,
            });
            if let Some(child) = nested {
                if !stack.contains(&child) {
                    stack.push(child);
                    let child_prefix = format!("{prefix}{}", if last { "   " } else { "│  " });
                    self.render_tree(child, &child_prefix, depth - 1, stack, out);
                    stack.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> Schema {
        let mut schema = Schema::empty();
        schema.declare(NodeKind::Fanout, |c| {
            c.attr("meshX", &[Expect::Int, Expect::Str])
                .with_default(|| Raw::Int(1));
            c.attr("meshY", &[Expect::Int, Expect::Str])
                .with_default(|| Raw::Int(1));
        });
        schema
    }

    #[test]
    fn redeclaring_overwrites() {
        let mut schema = toy();
        schema.declare(NodeKind::Fanout, |c| {
            c.attr("meshX", &[Expect::Int]);
        });
        let class = schema.class(NodeKind::Fanout).unwrap();
        assert_eq!(
            class.names(),
            vec!["meshX".to_string(), "meshY".to_string()]
        );
        assert!(class.specifier("meshX").unwrap().is_required());
    }

    #[test]
    fn part_name_lookup_uses_substring() {
        let mut schema = Schema::empty();
        schema.declare(NodeKind::Specification, |c| {
            c.attr("constraints", &[]).part_name();
            c.attr("ignore", &[]).wildcard().optional();
        });
        let class = schema.class(NodeKind::Specification).unwrap();
        assert_eq!(
            class.lookup("more_constraints").unwrap().name,
            "constraints"
        );
        assert_eq!(class.lookup("ignore_me").unwrap().name, "ignore");
        assert!(class.lookup("mapper").is_none());
    }

    #[test]
    fn responsibility_is_scoped() {
        let mut schema = toy();
        schema.with_responsible(ProcessorId::ConstraintMacro, |s| {
            s.class_mut(NodeKind::Temporal)
                .attr("no_reuse", &[])
                .optional();
        });
        schema
            .class_mut(NodeKind::Temporal)
            .attr("after", &[])
            .optional();
        let class = schema.class(NodeKind::Temporal).unwrap();
        assert_eq!(
            class.specifier("no_reuse").unwrap().removed_by,
            Some(ProcessorId::ConstraintMacro)
        );
        assert_eq!(class.specifier("after").unwrap().removed_by, None);
    }

    #[test]
    fn value_equal_to_default_passes_type_check() {
        let mut class = ClassSchema::new(NodeKind::Dict);
        class.attr("subclass", &[Expect::Str]).optional();
        let tree = Tree::new();
        let spec = class.specifier("subclass").unwrap();
        assert!(spec.accepts(&tree, &Value::Null));
        assert!(spec.accepts(&tree, &Value::from("x")));
        assert!(!spec.accepts(&tree, &Value::Int(3)));
    }

    #[test]
    fn property_tree_lists_defaults() {
        let rendered = toy().property_tree(NodeKind::Fanout, 2);
        insta::assert_snapshot!(rendered.lines().skip(3).collect::<Vec<_>>().join("\n"), @r"
        Fanout
        ├─ meshX: int/str = 1
        └─ meshY: int/str = 1
        ");
    }
}
