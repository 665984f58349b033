// tlfe — Accelerator specification front-end
//
// Library root. Layered YAML documents are loaded into an arena of typed
// nodes, normalized by an ordered suite of processors, and validated
// against the class schema.

pub mod ast;
pub mod build;
pub mod combine;
pub mod diag;
pub mod eval;
pub mod id;
pub mod kinds;
pub mod lexer;
pub mod loader;
pub mod model;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod processors;
pub mod raw;
pub mod registry;
pub mod resolve;
pub mod spec;
pub mod tree;
pub mod validate;
