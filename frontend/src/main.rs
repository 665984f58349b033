use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tlfe::kinds::NodeKind;
use tlfe::loader::Sources;
use tlfe::pass::{ProcessorId, STANDARD_SUITE};
use tlfe::pipeline::{run_pipeline, PipelineOptions, PipelineOutput};
use tlfe::registry::Schema;
use tlfe::spec::SpecOptions;

#[derive(Debug, Clone, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    Json,
    Yaml,
    Schema,
    Provenance,
}

#[derive(Parser, Debug)]
#[command(
    name = "tlfe",
    version,
    about = "Accelerator specification front-end: validates and processes layered YAML specifications"
)]
struct Cli {
    /// Input YAML files, merged in order
    paths: Vec<PathBuf>,

    /// Processors to run, comma separated (default: the standard suite)
    #[arg(long, value_delimiter = ',')]
    processors: Vec<String>,

    /// Variable override NAME=VALUE (repeatable)
    #[arg(long = "variable", value_name = "NAME=VALUE")]
    variables: Vec<String>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Json)]
    emit: EmitStage,

    /// Levels of nesting shown by `--emit schema`
    #[arg(long, default_value_t = 4)]
    schema_depth: usize,

    /// Output file path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log each processor and its timing
    #[arg(long)]
    verbose: bool,

    /// Build and validate without running processors
    #[arg(long)]
    no_process: bool,
}

fn fail(code: i32, message: impl std::fmt::Display) -> ! {
    eprintln!("tlfe: {message}");
    std::process::exit(code);
}

fn processor_list(cli: &Cli) -> Vec<ProcessorId> {
    let mut processors: Vec<ProcessorId> = if cli.processors.is_empty() {
        STANDARD_SUITE.to_vec()
    } else {
        cli.processors
            .iter()
            .map(|name| ProcessorId::from_name(name).unwrap_or_else(|e| fail(2, e.render())))
            .collect()
    };
    // Overrides must land before expressions are resolved.
    if !cli.variables.is_empty() && !processors.contains(&ProcessorId::VariablesFromCli) {
        let at = processors
            .iter()
            .position(|p| *p == ProcessorId::References2Copies)
            .map_or(0, |i| i + 1);
        processors.insert(at, ProcessorId::VariablesFromCli);
    }
    processors
}

fn run(cli: &Cli, processors: Vec<ProcessorId>) -> PipelineOutput {
    if cli.paths.is_empty() {
        fail(2, "error: no input files");
    }
    let sources = Sources::from_files(&cli.paths).unwrap_or_else(|e| fail(2, e.render()));
    let options = PipelineOptions {
        spec: SpecOptions {
            processors,
            variables: cli.variables.clone(),
            ..SpecOptions::default()
        },
        process: !cli.no_process,
        check: true,
    };
    run_pipeline(&sources, options).unwrap_or_else(|e| fail(1, e.render()))
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let processors = processor_list(&cli);

    let rendered = match cli.emit {
        EmitStage::Schema => {
            let mut schema = Schema::standard();
            tlfe::processors::declare_all(&mut schema, &processors);
            schema.property_tree(NodeKind::Specification, cli.schema_depth)
        }
        EmitStage::Json => serde_json::to_string_pretty(&run(&cli, processors).spec.to_json())
            .map(|s| s + "\n")
            .unwrap_or_else(|e| fail(1, format!("error: {e}"))),
        EmitStage::Yaml => run(&cli, processors)
            .spec
            .to_yaml()
            .unwrap_or_else(|e| fail(1, e.render())),
        EmitStage::Provenance => run(&cli, processors).provenance.to_json(),
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, rendered) {
                fail(2, format!("error: {}: {}", path.display(), e));
            }
        }
        None => print!("{rendered}"),
    }
}
