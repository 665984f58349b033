// processors/mapspace.rs — Rough per-leaf contributions to mapspace size
//
// Estimates how many choices each leaf leaves open to the mapper: bypass
// decisions for data spaces it neither keeps nor bypasses, factorizations of
// unconstrained dimensions and orderings of unpermuted ones. The numbers
// only guide users towards the constraints worth adding; nothing in the
// tree changes.

use indexmap::IndexMap;
use tracing::info;

use crate::diag::Result;
use crate::id::NodeId;
use crate::kinds::NodeKind;
use crate::model::constraints::factors;
use crate::model::{arch, problem};
use crate::pass::ProcessorId;
use crate::spec::Specification;
use crate::tree::Tree;

use super::Processor;

pub struct MapspaceSizeContributors;

impl Processor for MapspaceSizeContributors {
    fn id(&self) -> ProcessorId {
        ProcessorId::MapspaceSizeContributors
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let report = estimate(spec)?;
        for (dim, primes) in &report.prime_factors {
            info!(dimension = %dim, factors = ?primes, "factors left for mapping");
        }
        for contribution in &report.leaves {
            info!(leaf = %contribution.leaf, "{}", render(&contribution.counts));
        }
        info!("Total: {}", render(&report.totals));
        Ok(())
    }
}

/// Prime factorization of `x` in ascending order; empty below 2.
pub fn prime_factors(mut x: i64) -> Vec<i64> {
    let mut primes = Vec::new();
    let mut i = 2;
    while i * i <= x {
        while x % i == 0 {
            primes.push(i);
            x /= i;
        }
        i += 1;
    }
    if x > 1 {
        primes.push(x);
    }
    primes
}

fn factorial(n: usize) -> i64 {
    (1..=n as i64).fold(1i64, |acc, k| acc.saturating_mul(k))
}

fn render(counts: &IndexMap<String, i64>) -> String {
    counts
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Default)]
pub struct LeafContribution {
    pub leaf: String,
    /// Counts different from one, `Total` last.
    pub counts: IndexMap<String, i64>,
    pub temporal_dims: String,
    pub spatial_dims: String,
}

#[derive(Debug, Default)]
pub struct MapspaceReport {
    /// Prime factors of every dimension after constrained factors are
    /// divided out; dimensions left with none are omitted.
    pub prime_factors: IndexMap<String, Vec<i64>>,
    /// Leaves contributing more than one choice, in tree order.
    pub leaves: Vec<LeafContribution>,
    pub totals: IndexMap<String, i64>,
}

struct Context {
    dims: Vec<String>,
    primes: IndexMap<String, Vec<i64>>,
    max_factor: IndexMap<String, i64>,
}

impl Context {
    /// Factorization and permutation choices left by one iteration
    /// constraint, and the dimensions it leaves unconstrained.
    fn choices(&self, tree: &Tree, constraint: NodeId) -> Result<(i64, i64, Vec<String>)> {
        let constrained: Vec<String> = match tree.opt_child(constraint, "factors") {
            Some(list) => factors(tree, list)?.into_iter().map(|f| f.name).collect(),
            None => Vec::new(),
        };
        let default_max = tree
            .get(constraint, "default_max_factor")?
            .and_then(|v| v.as_i64());
        let mut n = 1i64;
        let mut unconstrained = Vec::new();
        for (dim, primes) in &self.primes {
            if constrained.contains(dim) {
                continue;
            }
            let possible: Vec<i64> = match self.max_factor.get(dim).copied().or(default_max) {
                Some(max) => primes.iter().copied().filter(|p| *p <= max).collect(),
                None => primes.clone(),
            };
            if possible.is_empty() {
                continue;
            }
            let mut counts: IndexMap<i64, i64> = IndexMap::new();
            for p in possible {
                *counts.entry(p).or_default() += 1;
            }
            n = n.saturating_mul(counts.values().product());
            unconstrained.push(dim.clone());
        }
        let permuted = match tree.opt_child(constraint, "permutation") {
            Some(list) => tree.strings(list),
            None => Vec::new(),
        };
        let free = self.dims.iter().filter(|d| !permuted.contains(d)).count();
        Ok((n, factorial(free), unconstrained))
    }
}

/// Compute the contribution report for a processed specification.
pub fn estimate(spec: &Specification) -> Result<MapspaceReport> {
    let tree = &spec.tree;
    let problem = spec.problem()?;
    let dims = problem::dimensions(tree, problem)?;
    let dataspaces = problem::dataspace_names(tree, problem)?;

    let mut remaining: IndexMap<String, i64> = dims
        .iter()
        .map(|d| {
            (
                d.clone(),
                problem::dimension_size(tree, problem, d).unwrap_or(1),
            )
        })
        .collect();
    let mut divisors: IndexMap<String, Vec<i64>> = IndexMap::new();
    let mut max_factor: IndexMap<String, i64> = IndexMap::new();
    for constraint in tree.nodes_of_kind(spec.root, NodeKind::ITERATIONS) {
        let Some(list) = tree.opt_child(constraint, "factors") else {
            continue;
        };
        for factor in factors(tree, list)? {
            let Some(mut value) = factor.int_value() else {
                continue;
            };
            if factor.relation == "<=" {
                max_factor.insert(factor.name.clone(), value);
            }
            let size = remaining.get(&factor.name).copied().unwrap_or(1);
            if value == 0 {
                value = size;
            }
            if value == -1 {
                continue;
            }
            if value > 1 && size % value == 0 {
                divisors.entry(factor.name.clone()).or_default().push(value);
            } else if value != 1 && value != 0 {
                info!(
                    "Ignoring factor {value} for dimension {} in {}. Does not divide {size}",
                    factor.name,
                    tree.path(constraint)
                );
            }
        }
    }
    for (dim, values) in &divisors {
        if let Some(size) = remaining.get_mut(dim) {
            for v in values {
                *size /= v;
            }
        }
    }
    let primes: IndexMap<String, Vec<i64>> = remaining
        .iter()
        .map(|(d, size)| (d.clone(), prime_factors(*size)))
        .filter(|(_, p)| !p.is_empty())
        .collect();
    let context = Context {
        dims,
        primes,
        max_factor,
    };

    let mut report = MapspaceReport::default();
    for leaf in arch::leaves(tree, spec.architecture()?) {
        let group = tree.child(leaf, "constraints")?;
        let mut counts: IndexMap<String, i64> = IndexMap::new();
        let mut contribution = LeafContribution {
            leaf: tree.name(leaf).unwrap_or_default().to_string(),
            ..Default::default()
        };
        if tree.kind(leaf) == NodeKind::Storage {
            let ds = tree.child(group, "dataspace")?;
            let listed: Vec<String> = ["bypass", "keep"]
                .iter()
                .filter_map(|k| tree.opt_child(ds, k))
                .flat_map(|l| tree.strings(l))
                .collect();
            let open = dataspaces.iter().filter(|d| !listed.contains(d)).count();
            counts.insert("Dataspace".into(), 1i64 << open.min(62));

            let (n, p, dims) = context.choices(tree, tree.child(group, "temporal")?)?;
            counts.insert("Temporal Factorizations".into(), n);
            counts.insert("Temporal Permutations".into(), p);
            contribution.temporal_dims = dims.join("");
        }
        if arch::fanout(tree, leaf).is_some_and(|n| n > 1) {
            let spatial = tree.child(group, "spatial")?;
            let (n, p, dims) = context.choices(tree, spatial)?;
            counts.insert("Spatial Factorizations".into(), n);
            counts.insert("Spatial Permutations".into(), p);
            let mesh = tree.child(leaf, "spatial")?;
            let meshed = |key: &str| {
                tree.get(mesh, key)
                    .ok()
                    .flatten()
                    .and_then(|v| v.as_i64())
                    .is_some_and(|m| m != 1)
            };
            let split = tree.get(spatial, "split")?.is_some_and(|v| !v.is_null());
            if meshed("meshX") && meshed("meshY") && split {
                counts.insert("Spatial Split".into(), dims.len() as i64 + 1);
            }
            contribution.spatial_dims = dims.join("");
        }
        let total = counts.values().fold(1i64, |acc, v| acc.saturating_mul(*v));
        counts.insert("Total".into(), total);
        counts.retain(|_, v| *v != 0 && *v != 1);
        for (key, value) in &counts {
            let entry = report.totals.entry(key.clone()).or_insert(1);
            *entry = entry.saturating_mul(*value);
        }
        if !counts.is_empty() {
            contribution.counts = counts;
            report.leaves.push(contribution);
        }
    }
    report.prime_factors = context.primes;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{SpecOptions, Specification};
    use pretty_assertions::assert_eq;

    #[test]
    fn prime_factors_ascend() {
        assert_eq!(prime_factors(1), Vec::<i64>::new());
        assert_eq!(prime_factors(12), vec![2, 2, 3]);
        assert_eq!(prime_factors(97), vec![97]);
        assert_eq!(prime_factors(360), vec![2, 2, 2, 3, 3, 5]);
    }

    const YAML: &str = r#"
problem:
  shape:
    dimensions: [A, B, C]
    data_spaces:
    - {name: X, projection: [[[A]], [[B]]]}
    - {name: Y, projection: [[[B]], [[C]]]}
    - {name: Z, projection: [[[A]], [[C]]], read_write: True}
  instance: {A: 12, B: 4, C: 5}
architecture:
  version: 0.4
  nodes:
  - !Component
    name: Buffer
    class: SRAM
    attributes: {width: 8, depth: 8, datawidth: 8, block_size: 1}
    constraints:
      dataspace: {keep: [X]}
      temporal: {factors: [C=5, A<=3], permutation: [C]}
  - !Component
    name: PE
    class: regfile
    spatial: {meshX: 2, meshY: 2}
    attributes: {width: 8, depth: 8, datawidth: 8, block_size: 1}
    constraints:
      dataspace: {keep: [X, Y, Z]}
      temporal: {factors: [A=1, B=1, C=1]}
      spatial: {factors: [B=2], split: 1, permutation: [A, B, C]}
  - !Component {name: MAC, class: intmac}
"#;

    fn report() -> MapspaceReport {
        let options = SpecOptions {
            processors: vec![
                ProcessorId::References2Copies,
                ProcessorId::ConstraintAttacher,
                ProcessorId::MapspaceSizeContributors,
            ],
            ..SpecOptions::default()
        };
        let mut spec = Specification::from_yaml_str(YAML, options).unwrap();
        spec.process(None, Default::default()).unwrap();
        estimate(&spec).unwrap()
    }

    #[test]
    fn constrained_factors_are_divided_out() {
        let report = report();
        // C=5 consumes C, A<=3 divides A by three and B=2 halves B.
        assert_eq!(report.prime_factors.get("A"), Some(&vec![2, 2]));
        assert_eq!(report.prime_factors.get("B"), Some(&vec![2]));
        assert_eq!(report.prime_factors.get("C"), None);
    }

    #[test]
    fn leaves_report_their_open_choices() {
        let report = report();
        assert_eq!(report.leaves.len(), 2);

        let buffer = &report.leaves[0];
        assert_eq!(buffer.leaf, "Buffer");
        // Y and Z are neither kept nor bypassed.
        assert_eq!(buffer.counts["Dataspace"], 4);
        // Only B is left free and its single prime gives one factorization.
        assert_eq!(buffer.counts.get("Temporal Factorizations"), None);
        assert_eq!(buffer.temporal_dims, "B");
        assert_eq!(buffer.counts["Temporal Permutations"], 2);
        assert_eq!(buffer.counts["Total"], 8);

        let pe = &report.leaves[1];
        assert_eq!(pe.leaf, "PE");
        assert_eq!(pe.counts.get("Dataspace"), None);
        assert_eq!(pe.counts["Temporal Permutations"], 6);
        assert_eq!(pe.counts["Spatial Factorizations"], 2);
        assert_eq!(pe.spatial_dims, "A");
        assert_eq!(pe.counts.get("Spatial Permutations"), None);
        assert_eq!(pe.counts["Spatial Split"], 2);
        assert_eq!(pe.counts["Total"], 24);

        assert_eq!(report.totals["Temporal Permutations"], 12);
        assert_eq!(report.totals["Total"], 192);
    }
}
