// loader.rs — YAML sources merged into one top-level key space
//
// Every source may hold several `---`-separated documents, each a mapping.
// The first occurrence of a top-level key becomes part of the merged
// document; later occurrences are kept aside as extras, to be cast and
// combined into the built specification rather than rejected.
//
// Preconditions: none.
// Postconditions: `merge` preserves source order for keys and for extras.
// Failure modes: unreadable files, YAML syntax errors and non-mapping
//   documents produce `SpecError::Load` naming the source.
// Side effects: `from_files` reads the file system.

use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::diag::{Result, SpecError};
use crate::raw::{Raw, RawMap};

/// One named YAML source.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub text: String,
}

/// Raw top-level document plus the duplicate keys found after it.
#[derive(Debug, Clone)]
pub struct Merged {
    pub document: Raw,
    pub extras: Vec<(String, Raw)>,
}

#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub sources: Vec<Source>,
}

impl Sources {
    pub fn from_text(name: &str, text: &str) -> Self {
        Self {
            sources: vec![Source {
                name: name.to_string(),
                text: text.to_string(),
            }],
        }
    }

    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|e| SpecError::Load {
                source_name: path.display().to_string(),
                message: e.to_string(),
            })?;
            sources.push(Source {
                name: path.display().to_string(),
                text,
            });
        }
        Ok(Self { sources })
    }

    /// Concatenated source texts, in order, for hashing.
    pub fn concatenated(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn merge(&self) -> Result<Merged> {
        let mut entries: IndexMap<String, Raw> = IndexMap::new();
        let mut extras = Vec::new();
        for source in &self.sources {
            for document in parse_documents(source)? {
                let Some(map) = document.as_map() else {
                    if matches!(document, Raw::Null) {
                        continue;
                    }
                    return Err(SpecError::Load {
                        source_name: source.name.clone(),
                        message: format!(
                            "top-level document must be a mapping, found {}",
                            document.type_name()
                        ),
                    });
                };
                for (key, value) in &map.entries {
                    if entries.contains_key(key) {
                        debug!(key = %key, source = %source.name, "duplicate top-level key");
                        extras.push((key.clone(), value.clone()));
                    } else {
                        entries.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        Ok(Merged {
            document: Raw::Map(Rc::new(RawMap { tag: None, entries })),
            extras,
        })
    }
}

fn parse_documents(source: &Source) -> Result<Vec<Raw>> {
    let load_error = |message: String| SpecError::Load {
        source_name: source.name.clone(),
        message,
    };
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&source.text) {
        let value =
            serde_yaml::Value::deserialize(document).map_err(|e| load_error(e.to_string()))?;
        let raw = Raw::from_yaml(value).map_err(|e| match e {
            SpecError::Load { message, .. } => load_error(message),
            other => other,
        })?;
        documents.push(raw);
    }
    Ok(documents)
}
