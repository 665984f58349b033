use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tlfe::*;

// Latency scenarios for the front-end: expression parsing, construction,
// and the full standard suite on generated architectures.

const EXPRESSIONS: [(&str, &str); 4] = [
    ("literal", "1024"),
    ("arithmetic", "depth * width // 8 + 2 ** 4"),
    ("call", "max(1, min(depth, 4096)) * ceil(log2(width))"),
    ("attribute", "Buffer.attributes.depth * 2"),
];

const PROBLEM: &str = r#"
variables: {depth: 1024, width: 64}
problem:
  shape:
    dimensions: [C, M, P, Q, R, S, N]
    data_spaces:
    - {name: Weights, projection: [[[C]], [[M]], [[R]], [[S]]]}
    - {name: Inputs, projection: [[[N]], [[C]], [[R], [P]], [[S], [Q]]]}
    - {name: Outputs, projection: [[[N]], [[M]], [[Q]], [[P]]], read_write: True}
  instance: {C: 64, M: 64, P: 14, Q: 14, R: 3, S: 3, N: 1}
"#;

/// A specification with `levels` storage levels, alternating temporal
/// factor macros and dataspace macros, above a spatial PE array.
fn generate_spec(levels: usize) -> String {
    let mut yaml = String::from(PROBLEM);
    yaml.push_str("architecture:\n  version: 0.4\n  nodes:\n");
    for level in 0..levels {
        yaml.push_str(&format!(
            "  - !Component\n    name: L{level}\n    class: SRAM\n    \
             attributes: {{width: width, depth: depth // {}, datawidth: 8, block_size: 8}}\n",
            level + 1
        ));
        if level % 2 == 0 {
            yaml.push_str(
                "    constraints: {temporal: {factors_only: C=4 M<=8, permutation: CM}}\n",
            );
        } else {
            yaml.push_str("    constraints: {dataspace: {keep_only: [Weights, Inputs]}}\n");
        }
    }
    yaml.push_str(
        "  - !Container\n    name: PE\n    spatial: {meshX: 16}\n    \
         constraints: {spatial: {factors: [M=16]}}\n\
         \x20 - !Component {name: MAC, class: intmac}\n",
    );
    yaml
}

fn build(yaml: &str) -> spec::Specification {
    spec::Specification::from_yaml_str(yaml, spec::SpecOptions::default())
        .expect("benchmark scenario must build")
}

// Expression parser latency.
fn bench_expression_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/expression_parse");
    for (name, source) in EXPRESSIONS {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| black_box(parser::parse(black_box(source))));
        });
    }
    group.finish();
}

// Load, merge, cast and deduplicate.
fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/construction");
    for levels in [2_usize, 8, 32] {
        let yaml = generate_spec(levels);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{levels}levels")),
            &yaml,
            |b, yaml| b.iter(|| black_box(build(black_box(yaml)))),
        );
    }
    group.finish();
}

// Standard suite plus validation on an already built specification.
fn bench_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/process");
    for levels in [2_usize, 8, 32] {
        let built = build(&generate_spec(levels));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{levels}levels")),
            &built,
            |b, built| {
                b.iter_batched(
                    || built.clone(),
                    |mut processed| {
                        processed
                            .process(
                                None,
                                spec::ProcessOptions {
                                    check_types: true,
                                    reprocess: false,
                                },
                            )
                            .expect("benchmark scenario must process");
                        black_box(processed)
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

// Whole pipeline as the command line runs it.
fn bench_pipeline(c: &mut Criterion) {
    let sources = loader::Sources::from_text("bench.yaml", &generate_spec(8));
    c.bench_function("kpi/pipeline/8levels", |b| {
        b.iter(|| {
            let output =
                pipeline::run_pipeline(black_box(&sources), pipeline::PipelineOptions::default())
                    .expect("benchmark scenario must pass");
            black_box(output.provenance);
        });
    });
}

criterion_group!(
    benches,
    bench_expression_parse,
    bench_construction,
    bench_process,
    bench_pipeline,
);
criterion_main!(benches);
