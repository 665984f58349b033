// resolve.rs — Expression resolution over a specification tree
//
// Replaces string expressions with their values, using a layered symbol
// table:
//
//   variables     evaluated in order; each may use the ones before it
//   attributes    evaluated in order against the enclosing context; a
//                 container's attributes flow to the siblings after it
//   spatial       evaluated against the enclosing context only, not the
//                 leaf's own attributes; bare strings are not allowed
//   constraints   whole-word substitution of context names, then numeric
//                 coercion; constraint strings keep their `X<=5` syntax
//   problem       the same substitution across the whole problem, with
//                 variables only
//
// Every branch binds the names of its direct leaves to the leaves
// themselves, so `Buffer.attributes.depth` works anywhere below it. Parallel
// siblings each start from the branch's context; nothing a sibling defines
// is visible to the next one. Resolution is idempotent.
//
// Preconditions: the tree has been deduplicated (References2Copies has run).
// Postconditions: on success every evaluated position holds its value.
// Failure modes: the first expression that cannot be evaluated aborts the
//   pass with `SpecError::Expression`.
// Side effects: mutates the tree; logs at debug/trace level.

use tracing::{debug, trace};

use crate::diag::{Result, SpecError};
use crate::eval::{text_of, EvalError, Evaluator, Scope, Symbols};
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::tree::{Tree, Value};

// ── Public types ────────────────────────────────────────────────────────────

/// Counts of what one resolution pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    /// Expressions evaluated to a different value.
    pub evaluated: usize,
    /// Strings changed by name substitution or numeric coercion.
    pub substituted: usize,
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Resolve every expression beneath the specification root `spec`.
pub fn resolve(tree: &mut Tree, spec: NodeId) -> Result<ResolveStats> {
    let mut ctx = ResolveCtx::default();
    let variables = match tree.opt_child(spec, "variables") {
        Some(vars) => ctx.resolve_dict(tree, vars, &Symbols::new(), true)?,
        None => Symbols::new(),
    };
    debug!(count = variables.len(), "variables resolved");

    if let Some(arch) = tree.opt_child(spec, "architecture") {
        let mut context = variables.clone();
        ctx.walk_arch(tree, arch, &mut context)?;
    }
    if let Some(problem) = tree.opt_child(spec, "problem") {
        ctx.substitute_tree(tree, problem, &variables)?;
    }
    debug!(
        evaluated = ctx.stats.evaluated,
        substituted = ctx.stats.substituted,
        "expressions resolved"
    );
    Ok(ctx.stats)
}

/// Int, then float, else the original text.
pub fn try_to_number(text: &str) -> Value {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(x) = trimmed.parse::<f64>() {
        return Value::Float(x);
    }
    Value::Str(text.to_string())
}

/// Replace whole-word occurrences of `word` in `text`.
pub fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    if word.is_empty() {
        return text.to_string();
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut prev: Option<char> = None;
    while let Some(pos) = rest.find(word) {
        let before = rest[..pos].chars().next_back().or(prev);
        let after = rest[pos + word.len()..].chars().next();
        let bounded = !before.is_some_and(is_word) && !after.is_some_and(is_word);
        let end = if bounded {
            out.push_str(&rest[..pos]);
            out.push_str(replacement);
            pos + word.len()
        } else {
            let step = rest[pos..].chars().next().map_or(1, char::len_utf8);
            out.push_str(&rest[..pos + step]);
            pos + step
        };
        prev = rest[..end].chars().next_back();
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

// ── Internal context ────────────────────────────────────────────────────────

#[derive(Default)]
struct ResolveCtx {
    stats: ResolveStats,
}

impl ResolveCtx {
    // ── Architecture walk ───────────────────────────────────────────────

    fn walk_arch(&mut self, tree: &mut Tree, node: NodeId, context: &mut Symbols) -> Result<()> {
        let kind = tree.kind(node);
        if kind.is_branch() {
            let children = match tree.opt_child(node, "nodes") {
                Some(list) => tree.child_ids(list),
                None => Vec::new(),
            };
            let mut inner = context.clone();
            for child in &children {
                if tree.kind(*child).is_leaf() {
                    if let Some(name) = tree.name(*child) {
                        inner.entry(name.to_string()).or_insert(Value::Node(*child));
                    }
                }
            }
            for child in children {
                if kind == NodeKind::Parallel {
                    let mut branch = inner.clone();
                    self.walk_arch(tree, child, &mut branch)?;
                } else {
                    self.walk_arch(tree, child, &mut inner)?;
                }
            }
        } else if kind.is_leaf() {
            self.resolve_leaf(tree, node, context)?;
        }
        Ok(())
    }

    fn resolve_leaf(&mut self, tree: &mut Tree, leaf: NodeId, context: &mut Symbols) -> Result<()> {
        trace!(leaf = %tree.path(leaf), "resolving leaf");
        let mut extended = context.clone();
        if let Some(attributes) = tree.opt_child(leaf, "attributes") {
            let resolved = self.resolve_dict(tree, attributes, context, true)?;
            extended.extend(resolved);
        }
        if let Some(spatial) = tree.opt_child(leaf, "spatial") {
            self.resolve_dict(tree, spatial, context, false)?;
        }
        if let Some(constraints) = tree.opt_child(leaf, "constraints") {
            self.substitute_tree(tree, constraints, &extended)?;
        }
        if tree.kind(leaf) == NodeKind::Container {
            *context = extended;
        }
        if let Some(name) = tree.name(leaf) {
            context.entry(name.to_string()).or_insert(Value::Node(leaf));
        }
        Ok(())
    }

    // ── Sequential evaluation ───────────────────────────────────────────

    /// Evaluate the string entries of a dict node in order. Returns the
    /// node's entries after resolution.
    fn resolve_dict(
        &mut self,
        tree: &mut Tree,
        id: NodeId,
        context: &Symbols,
        strings_allowed: bool,
    ) -> Result<Symbols> {
        let mut local = Symbols::new();
        for (slot, value) in tree.children(id) {
            let key = slot.to_string();
            let resolved = match &value {
                _ if key.contains("ignore") => value.clone(),
                Value::Str(text) => {
                    let scope = Scope::new(vec![&local, context]);
                    let location = || format!("{}[{key}]", tree.path(id));
                    evaluate(tree, scope, text, strings_allowed, location)?
                }
                Value::Node(child) if tree.kind(*child) == NodeKind::Dict => {
                    let mut nested = context.clone();
                    nested.extend(local.clone());
                    self.resolve_dict(tree, *child, &nested, strings_allowed)?;
                    value.clone()
                }
                _ => value.clone(),
            };
            if resolved != value {
                trace!(key = %key, value = %tree.display(&resolved), "evaluated");
                self.stats.evaluated += 1;
                tree.set(id, &key, resolved.clone())?;
            }
            local.insert(key, resolved);
        }
        Ok(local)
    }

    // ── Substitution ────────────────────────────────────────────────────

    /// Substitute scalar context values into every string beneath `root`.
    fn substitute_tree(&mut self, tree: &mut Tree, root: NodeId, context: &Symbols) -> Result<()> {
        let bindings: Vec<(String, String)> = context
            .iter()
            .filter(|(_, v)| !matches!(v, Value::Node(_)))
            .map(|(k, v)| (k.clone(), text_of(tree, v)))
            .collect();
        for id in tree.walk(root) {
            for (slot, value) in tree.children(id) {
                let Value::Str(text) = &value else {
                    continue;
                };
                let mut replaced = text.clone();
                for (name, with) in &bindings {
                    replaced = replace_word(&replaced, name, with);
                }
                let coerced = try_to_number(&replaced);
                if coerced != value {
                    self.stats.substituted += 1;
                    tree.set_slot(id, &slot, coerced)?;
                }
            }
        }
        Ok(())
    }
}

/// Evaluate one expression string.
fn evaluate(
    tree: &Tree,
    scope: Scope<'_>,
    text: &str,
    strings_allowed: bool,
    location: impl Fn() -> String,
) -> Result<Value> {
    let fail = |reason: String| SpecError::Expression {
        path: location(),
        expression: text.to_string(),
        reason,
    };
    if let number @ (Value::Int(_) | Value::Float(_)) = try_to_number(text) {
        return Ok(number);
    }
    let keep_text =
        strings_allowed && !text.trim().is_empty() && !text.contains(char::is_whitespace);
    let expr = match crate::parser::parse(text) {
        Ok(expr) => expr,
        Err(_) if keep_text => return Ok(Value::Str(text.to_string())),
        Err(reason) => return Err(fail(reason)),
    };
    match Evaluator::new(tree, scope).eval(&expr) {
        Ok(Value::Node(_)) if strings_allowed && expr.as_name().is_some() => {
            Ok(Value::Str(text.to_string()))
        }
        Ok(Value::Node(id)) => Err(fail(format!(
            "evaluates to the node {} rather than a value",
            tree.path(id)
        ))),
        Ok(value) => Ok(value),
        Err(EvalError::Unbound(_)) if keep_text => Ok(Value::Str(text.to_string())),
        Err(e) => Err(fail(e.to_string())),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
