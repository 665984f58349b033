// spec.rs — The specification root: construction, processing and export
//
// A specification moves through these states:
//
//   built          schema (with every scheduled processor's temporary keys)
//                  applied to the merged documents
//   deduplicated   References2Copies has run; done at construction unless
//                  references are preserved
//   parsed         expressions resolved (idempotent)
//   processed      each scheduled processor run once, in list order
//   validated      `check` found nothing left to report
//
// Preconditions: none.
// Postconditions: `processors_run` lists every processor that has run, in
//   order; `process_copy` leaves `self` untouched.
// Failure modes: construction errors from the builder; ordering and
//   processor errors from `process`; validation errors from `check`.
// Side effects: processors log through `tracing`.

use tracing::debug;

use crate::build::Builder;
use crate::diag::{Result, SpecError};
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::loader::{Merged, Sources};
use crate::pass::{check_order, ProcessorId, STANDARD_SUITE};
use crate::pipeline::run_processor;
use crate::processors::declare_all;
use crate::raw::Raw;
use crate::registry::Schema;
use crate::resolve::resolve;
use crate::tree::{Tree, Value};
use crate::validate::{check_unrecognized, CheckOptions};

// ── Options ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SpecOptions {
    /// Processors `process(None, ..)` runs, in order. Names listed under the
    /// document's `processors` key are appended.
    pub processors: Vec<ProcessorId>,
    /// Skip References2Copies at construction; shared sub-documents stay
    /// shared until `process` runs.
    pub preserve_references: bool,
    /// `NAME=VALUE` overrides consumed by VariablesFromCli.
    pub variables: Vec<String>,
}

impl Default for SpecOptions {
    fn default() -> Self {
        Self {
            processors: STANDARD_SUITE.to_vec(),
            preserve_references: false,
            variables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Validate the whole tree once every processor has run.
    pub check_types: bool,
    /// Run processors again even if they already ran.
    pub reprocess: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            check_types: false,
            reprocess: true,
        }
    }
}

// ── Specification ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Specification {
    pub tree: Tree,
    pub root: NodeId,
    pub schema: Schema,
    pub processors: Vec<ProcessorId>,
    pub cli_variables: Vec<String>,
    processors_run: Vec<ProcessorId>,
    parsed_expressions: bool,
    preserve_references: bool,
}

impl Specification {
    pub fn from_yaml_str(text: &str, options: SpecOptions) -> Result<Self> {
        Self::from_sources(&Sources::from_text("<string>", text), options)
    }

    pub fn from_yaml_files<P: AsRef<std::path::Path>>(
        paths: &[P],
        options: SpecOptions,
    ) -> Result<Self> {
        Self::from_sources(&Sources::from_files(paths)?, options)
    }

    pub fn from_sources(sources: &Sources, options: SpecOptions) -> Result<Self> {
        Self::assemble(&sources.merge()?, options)
    }

    pub fn from_raw(raw: &Raw, options: SpecOptions) -> Result<Self> {
        let merged = Merged {
            document: raw.clone(),
            extras: Vec::new(),
        };
        Self::assemble(&merged, options)
    }

    fn assemble(merged: &Merged, options: SpecOptions) -> Result<Self> {
        let mut processors = options.processors;
        if let Some(listed) = merged.document.get("processors").and_then(Raw::as_list) {
            for item in &listed.items {
                let Some(name) = item.as_str() else {
                    continue;
                };
                let id = ProcessorId::from_name(name)?;
                if !processors.contains(&id) {
                    processors.push(id);
                }
            }
        }

        let mut schema = Schema::standard();
        declare_all(&mut schema, &processors);

        let mut tree = Tree::new();
        let root = {
            let mut builder = Builder::new(&schema, &mut tree);
            let root = builder.build(NodeKind::Specification, &merged.document)?;
            for (key, extra) in &merged.extras {
                builder.merge_extra(root, key, extra).map_err(|e| {
                    e.context(format!(
                        "Failed to combine duplicate element in key [{key}]"
                    ))
                })?;
            }
            root
        };
        debug!(nodes = tree.allocated(), processors = ?processors, "specification built");

        let mut spec = Specification {
            tree,
            root,
            schema,
            processors,
            cli_variables: options.variables,
            processors_run: Vec::new(),
            parsed_expressions: false,
            preserve_references: options.preserve_references,
        };
        if !spec.preserve_references {
            spec.deduplicate()?;
        }
        Ok(spec)
    }

    fn deduplicate(&mut self) -> Result<()> {
        run_processor(self, ProcessorId::References2Copies)?;
        self.processors_run.push(ProcessorId::References2Copies);
        self.preserve_references = false;
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn architecture(&self) -> Result<NodeId> {
        self.tree.child(self.root, "architecture")
    }

    pub fn problem(&self) -> Result<NodeId> {
        self.tree.child(self.root, "problem")
    }

    pub fn variables(&self) -> Result<NodeId> {
        self.tree.child(self.root, "variables")
    }

    pub fn processors_run(&self) -> &[ProcessorId] {
        &self.processors_run
    }

    pub fn parsed_expressions(&self) -> bool {
        self.parsed_expressions
    }

    /// True while some scheduled processor has not run yet.
    pub fn needs_processing(&self) -> bool {
        self.processors
            .iter()
            .any(|p| !self.processors_run.contains(p))
    }

    // ── Processing ─────────────────────────────────────────────────────

    /// Run `processors` (the scheduled list when `None`) in order.
    /// References2Copies runs first if it has not run, and never twice.
    pub fn process(
        &mut self,
        processors: Option<&[ProcessorId]>,
        options: ProcessOptions,
    ) -> Result<()> {
        let list: Vec<ProcessorId> = match processors {
            Some(list) => list.to_vec(),
            None => self.processors.clone(),
        };
        if !self
            .processors_run
            .contains(&ProcessorId::References2Copies)
        {
            self.deduplicate()?;
        }
        let order: Vec<ProcessorId> = self.processors_run.iter().chain(&list).copied().collect();
        for id in list {
            let already = self.processors_run.contains(&id);
            if already && (id == ProcessorId::References2Copies || !options.reprocess) {
                debug!(processor = %id, "already run, skipping");
                continue;
            }
            check_order(id, &order)?;
            run_processor(self, id)?;
            self.processors_run.push(id);
            if id == ProcessorId::Math {
                self.parsed_expressions = true;
            }
        }
        if options.check_types {
            self.check(CheckOptions::default())?;
        }
        Ok(())
    }

    /// Resolve every expression in place. Temporary keys are tolerated
    /// because their processors may not have run yet.
    pub fn parse_expressions(&mut self) -> Result<()> {
        if self.parsed_expressions {
            return Ok(());
        }
        if !self
            .processors_run
            .contains(&ProcessorId::References2Copies)
        {
            return Err(SpecError::Processor {
                processor: ProcessorId::Math.name().to_string(),
                message: "Must run References2CopiesProcessor before parsing expressions. Either \
                          call __init__ with preserve_references=False or call process() with any \
                          arguments."
                    .to_string(),
            });
        }
        resolve(&mut self.tree, self.root)?;
        self.check(CheckOptions {
            ignore_leftovers: true,
            ..CheckOptions::default()
        })?;
        self.parsed_expressions = true;
        Ok(())
    }

    /// Process and validate an independent copy, leaving `self` untouched.
    pub fn process_copy(&self) -> Result<Specification> {
        let mut copy = self.clone();
        copy.process(
            None,
            ProcessOptions {
                check_types: true,
                reprocess: false,
            },
        )?;
        Ok(copy)
    }

    pub fn check(&self, options: CheckOptions) -> Result<()> {
        check_unrecognized(&self.tree, &self.schema, self.root, options)
    }

    // ── Export ─────────────────────────────────────────────────────────

    pub fn to_json(&self) -> serde_json::Value {
        self.tree.to_json(&Value::Node(self.root))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.to_json()).map_err(|e| SpecError::Invalid {
            path: self.tree.path(self.root),
            message: format!("could not render YAML: {e}"),
        })
    }
}
