// raw.rs — Raw (loaded, not yet validated) documents
//
// Raw documents are what the YAML loader produces and what the schema
// builder consumes. Maps and lists are shared through `Rc` so that a
// sub-document placed at two positions is one physical object; the builder
// uses that identity to cast each object at most once.
//
// Preconditions: none.
// Postconditions: conversion from YAML keeps explicit tags on maps and lists.
// Failure modes: YAML syntax errors and non-scalar map keys produce `SpecError::Load`.
// Side effects: none.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::diag::{Result, SpecError};
use crate::id::RawId;

/// A raw list with its optional explicit tag (e.g. `!Hierarchical`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawList {
    pub tag: Option<String>,
    pub items: Vec<Raw>,
}

/// A raw mapping with its optional explicit tag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawMap {
    pub tag: Option<String>,
    pub entries: IndexMap<String, Raw>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Raw {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RawList>),
    Map(Rc<RawMap>),
}

impl Raw {
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Raw)>) -> Raw {
        Raw::Map(Rc::new(RawMap {
            tag: None,
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }))
    }

    pub fn tagged_map<K: Into<String>>(
        tag: &str,
        entries: impl IntoIterator<Item = (K, Raw)>,
    ) -> Raw {
        Raw::Map(Rc::new(RawMap {
            tag: Some(normalize_tag(tag)),
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }))
    }

    pub fn list(items: impl IntoIterator<Item = Raw>) -> Raw {
        Raw::List(Rc::new(RawList {
            tag: None,
            items: items.into_iter().collect(),
        }))
    }

    pub fn empty_map() -> Raw {
        Raw::Map(Rc::new(RawMap::default()))
    }

    pub fn empty_list() -> Raw {
        Raw::List(Rc::new(RawList::default()))
    }

    pub fn strs<'a>(items: impl IntoIterator<Item = &'a str>) -> Raw {
        Raw::list(items.into_iter().map(Raw::from))
    }

    /// Physical identity for shared maps and lists; scalars have none.
    pub fn identity(&self) -> Option<RawId> {
        match self {
            Raw::List(l) => Some(RawId(Rc::as_ptr(l) as usize)),
            Raw::Map(m) => Some(RawId(Rc::as_ptr(m) as usize)),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Raw::List(l) => l.tag.as_deref(),
            Raw::Map(m) => m.tag.as_deref(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Raw::Null => "null",
            Raw::Bool(_) => "bool",
            Raw::Int(_) => "int",
            Raw::Float(_) => "float",
            Raw::Str(_) => "str",
            Raw::List(_) => "list",
            Raw::Map(_) => "dict",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Raw::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&RawMap> {
        match self {
            Raw::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&RawList> {
        match self {
            Raw::List(l) => Some(l),
            _ => None,
        }
    }

    /// Look up a key of a raw map.
    pub fn get(&self, key: &str) -> Option<&Raw> {
        self.as_map().and_then(|m| m.entries.get(key))
    }

    /// Parse a single YAML document into a raw value.
    pub fn parse_yaml(text: &str) -> Result<Raw> {
        let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| SpecError::Load {
            source_name: "<yaml>".to_string(),
            message: e.to_string(),
        })?;
        Raw::from_yaml(value)
    }

    pub fn from_yaml(value: serde_yaml::Value) -> Result<Raw> {
        from_yaml_tagged(value, None)
    }

    pub fn from_json(value: &serde_json::Value) -> Raw {
        match value {
            serde_json::Value::Null => Raw::Null,
            serde_json::Value::Bool(b) => Raw::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Raw::Int(i),
                None => Raw::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Raw::Str(s.clone()),
            serde_json::Value::Array(items) => Raw::list(items.iter().map(Raw::from_json)),
            serde_json::Value::Object(entries) => {
                Raw::map(entries.iter().map(|(k, v)| (k.clone(), Raw::from_json(v))))
            }
        }
    }
}

fn normalize_tag(tag: &str) -> String {
    format!("!{}", tag.trim_start_matches('!'))
}

fn from_yaml_tagged(value: serde_yaml::Value, tag: Option<String>) -> Result<Raw> {
    use serde_yaml::Value as Y;
    Ok(match value {
        Y::Null => Raw::Null,
        Y::Bool(b) => Raw::Bool(b),
        Y::Number(n) => match n.as_i64() {
            Some(i) => Raw::Int(i),
            None => Raw::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Y::String(s) => Raw::Str(s),
        Y::Sequence(items) => {
            let items = items
                .into_iter()
                .map(Raw::from_yaml)
                .collect::<Result<Vec<_>>>()?;
            Raw::List(Rc::new(RawList { tag, items }))
        }
        Y::Mapping(mapping) => {
            let mut entries = IndexMap::new();
            for (k, v) in mapping {
                entries.insert(yaml_key(&k)?, Raw::from_yaml(v)?);
            }
            Raw::Map(Rc::new(RawMap { tag, entries }))
        }
        Y::Tagged(tagged) => {
            let tag = normalize_tag(&tagged.tag.to_string());
            from_yaml_tagged(tagged.value, Some(tag))?
        }
    })
}

fn yaml_key(key: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value as Y;
    match key {
        Y::String(s) => Ok(s.clone()),
        Y::Number(n) => Ok(n.to_string()),
        Y::Bool(b) => Ok(b.to_string()),
        other => Err(SpecError::Load {
            source_name: "<yaml>".to_string(),
            message: format!("mapping keys must be scalars, found {other:?}"),
        }),
    }
}

impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Raw::Null => write!(f, "None"),
            Raw::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Raw::Int(i) => write!(f, "{i}"),
            Raw::Float(x) => write!(f, "{x}"),
            Raw::Str(s) => write!(f, "'{s}'"),
            Raw::List(l) => {
                write!(f, "[")?;
                for (i, item) in l.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Raw::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{k}': {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Raw {
    fn from(s: &str) -> Self {
        Raw::Str(s.to_string())
    }
}

impl From<String> for Raw {
    fn from(s: String) -> Self {
        Raw::Str(s)
    }
}

impl From<i64> for Raw {
    fn from(i: i64) -> Self {
        Raw::Int(i)
    }
}

impl From<i32> for Raw {
    fn from(i: i32) -> Self {
        Raw::Int(i64::from(i))
    }
}

impl From<f64> for Raw {
    fn from(x: f64) -> Self {
        Raw::Float(x)
    }
}

impl From<bool> for Raw {
    fn from(b: bool) -> Self {
        Raw::Bool(b)
    }
}
