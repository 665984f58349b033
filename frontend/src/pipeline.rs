// pipeline.rs — Processor runner, provenance and the load-to-validate
// pipeline
//
// `run_processor` is the single place a processor is entered: it logs the
// start and the elapsed time and attributes failures to the processor.
// `run_pipeline` strings loading, construction, processing and validation
// together for the command line.
//
// Preconditions: the sources hold one specification.
// Postconditions: on success the returned specification passed `check`
//   when checking was requested.
// Failure modes: the first load, construction, processor or validation
//   error, unchanged apart from processor attribution.
// Side effects: logs through `tracing`.

use std::time::{Duration, Instant};

use tracing::info;

use crate::diag::{Result, SpecError};
use crate::kinds::NodeKind;
use crate::loader::Sources;
use crate::pass::ProcessorId;
use crate::processors::instantiate;
use crate::registry::Schema;
use crate::spec::{ProcessOptions, SpecOptions, Specification};
use crate::validate::CheckOptions;

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible runs and cache keys.
///
/// `documents_hash`: SHA-256 of the input documents, concatenated in order.
/// `schema_fingerprint`: SHA-256 of the rendered specification schema,
/// including the temporary keys of the scheduled processors.
/// `frontend_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub documents_hash: [u8; 32],
    pub schema_fingerprint: [u8; 32],
    pub frontend_version: &'static str,
}

impl Provenance {
    /// Hex string of the documents hash (64 characters).
    pub fn documents_hash_hex(&self) -> String {
        bytes_to_hex(&self.documents_hash)
    }

    /// Hex string of the schema fingerprint (64 characters).
    pub fn schema_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.schema_fingerprint)
    }

    /// Serialize provenance as a JSON string for `--emit provenance`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"documents_hash\": \"{}\",\n  \"schema_fingerprint\": \"{}\",\n  \"frontend_version\": \"{}\"\n}}\n",
            self.documents_hash_hex(),
            self.schema_fingerprint_hex(),
            self.frontend_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Depth to which the schema is rendered for fingerprinting.
const FINGERPRINT_DEPTH: usize = 12;

pub fn compute_provenance(sources: &Sources, schema: &Schema) -> Provenance {
    Provenance {
        documents_hash: sha256(&sources.concatenated()),
        schema_fingerprint: sha256(
            &schema.property_tree(NodeKind::Specification, FINGERPRINT_DEPTH),
        ),
        frontend_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Processor runner ───────────────────────────────────────────────────────

/// Run one processor on `spec`, timing it. Errors that do not already name
/// a processor are wrapped with the processor's name.
pub fn run_processor(spec: &mut Specification, id: ProcessorId) -> Result<Duration> {
    info!(processor = %id, "Running processor");
    let start = Instant::now();
    instantiate(id).process(spec).map_err(|e| match e {
        SpecError::Processor { .. } | SpecError::Ordering { .. } => e,
        other => other.context(format!("{id} failed")),
    })?;
    let elapsed = start.elapsed();
    info!(
        processor = %id,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "done after {:.2}s",
        elapsed.as_secs_f64()
    );
    Ok(elapsed)
}

// ── Pipeline ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub spec: SpecOptions,
    /// Run the scheduled processors after construction.
    pub process: bool,
    /// Validate the final tree. Without processing, temporary keys are
    /// tolerated.
    pub check: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            spec: SpecOptions::default(),
            process: true,
            check: true,
        }
    }
}

pub struct PipelineOutput {
    pub spec: Specification,
    pub provenance: Provenance,
    pub elapsed: Duration,
}

/// Build a specification from `sources` and take it as far as `options`
/// asks.
pub fn run_pipeline(sources: &Sources, options: PipelineOptions) -> Result<PipelineOutput> {
    let start = Instant::now();
    let mut spec = Specification::from_sources(sources, options.spec)?;
    let provenance = compute_provenance(sources, &spec.schema);
    if options.process {
        spec.process(
            None,
            ProcessOptions {
                check_types: options.check,
                reprocess: false,
            },
        )?;
    } else if options.check {
        spec.check(CheckOptions {
            ignore_leftovers: true,
            ..CheckOptions::default()
        })?;
    }
    let elapsed = start.elapsed();
    info!(
        processors = spec.processors_run().len(),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "pipeline complete"
    );
    Ok(PipelineOutput {
        spec,
        provenance,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
problem:
  shape:
    dimensions: [C]
    data_spaces: [{name: Inputs, projection: [[[C]]]}]
  instance: {C: 4}
architecture:
  version: 0.4
  nodes:
  - !Component {name: Buffer, class: SRAM, attributes: {width: 8, depth: 8, datawidth: 8, block_size: 1}}
  - !Component {name: MAC, class: intmac}
"#;

    #[test]
    fn provenance_is_stable_and_tracks_inputs() {
        let sources = Sources::from_text("spec.yaml", YAML);
        let schema = Schema::standard();
        let a = compute_provenance(&sources, &schema);
        let b = compute_provenance(&sources, &schema);
        assert_eq!(a.documents_hash, b.documents_hash);
        assert_eq!(a.schema_fingerprint, b.schema_fingerprint);
        assert_eq!(a.documents_hash_hex().len(), 64);

        let edited = Sources::from_text("spec.yaml", &YAML.replace("C: 4", "C: 8"));
        assert_ne!(
            compute_provenance(&edited, &schema).documents_hash,
            a.documents_hash
        );

        let mut extended = Schema::standard();
        crate::processors::declare_all(&mut extended, &[ProcessorId::ConstraintMacro]);
        assert_ne!(
            compute_provenance(&sources, &extended).schema_fingerprint,
            a.schema_fingerprint
        );
    }

    #[test]
    fn provenance_json_names_the_version() {
        let p = compute_provenance(&Sources::from_text("spec.yaml", YAML), &Schema::standard());
        let json: serde_json::Value = serde_json::from_str(&p.to_json()).unwrap();
        assert_eq!(json["frontend_version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["documents_hash"], p.documents_hash_hex());
    }

    #[test]
    fn pipeline_processes_and_validates() {
        let output = run_pipeline(
            &Sources::from_text("spec.yaml", YAML),
            PipelineOptions::default(),
        )
        .unwrap();
        assert_eq!(output.spec.processors_run().len(), 9);
        assert!(!output.spec.needs_processing());
    }

    #[test]
    fn processor_failures_name_the_processor() {
        let yaml =
            format!("{YAML}constraints:\n  targets:\n  - {{type: temporal, target: Nowhere}}\n");
        let err = match run_pipeline(
            &Sources::from_text("spec.yaml", &yaml),
            PipelineOptions::default(),
        ) {
            Ok(_) => panic!("attaching to a missing target succeeded"),
            Err(e) => e,
        };
        assert!(
            err.to_string().starts_with("ConstraintAttacher failed: "),
            "{err}"
        );
        assert!(matches!(err.root(), SpecError::Lookup { .. }));
    }
}
