// pass.rs — Processor descriptors: names, ordering contracts, suites
//
// Declares every processor the front-end knows, the relative order each one
// asserts against the others, and the standard suite. Ordering is a static
// contract checked when a processor starts; it is never used to reorder a
// caller-supplied list.

use crate::diag::{Result, SpecError};

// ── Processor identifiers ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessorId {
    References2Copies,
    ConstraintAttacher,
    SparseOptAttacher,
    ConstraintMacro,
    Math,
    Dataspace2Branch,
    PermutationOptimizer,
    RequiredActions,
    MapspaceSizeContributors,
    EnableDummyTable,
    VariablesFromCli,
}

impl ProcessorId {
    pub fn name(self) -> &'static str {
        descriptor(self).name
    }

    /// Look up a processor by name. A trailing `Processor` and any dotted
    /// module prefix are ignored, so `pkg.MathProcessor` names `Math`.
    pub fn from_name(name: &str) -> Result<ProcessorId> {
        let short = name.rsplit('.').next().unwrap_or(name).trim();
        let short = short.strip_suffix("Processor").unwrap_or(short);
        ALL_PROCESSORS
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(short))
            .ok_or_else(|| SpecError::Lookup {
                what: "processor",
                name: name.to_string(),
                available: ALL_PROCESSORS
                    .iter()
                    .map(|p| p.name().to_string())
                    .collect(),
            })
    }
}

impl std::fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Processor descriptor ───────────────────────────────────────────────────

/// One relative-order assertion.
#[derive(Debug, Clone, Copy)]
pub struct OrderRule {
    pub other: ProcessorId,
    /// The assertion holds when `other` is not scheduled at all.
    pub ok_if_not_found: bool,
}

const fn needs(other: ProcessorId) -> OrderRule {
    OrderRule {
        other,
        ok_if_not_found: false,
    }
}

const fn if_present(other: ProcessorId) -> OrderRule {
    OrderRule {
        other,
        ok_if_not_found: true,
    }
}

/// Static metadata about a processor.
pub struct ProcessorDescriptor {
    /// Name used in the processor list, diagnostics and logs.
    pub name: &'static str,
    /// Processors that must appear earlier in the run order.
    pub must_run_after: &'static [OrderRule],
    /// Processors that must not appear earlier in the run order.
    pub must_not_run_before: &'static [OrderRule],
    /// What the pass guarantees once it has run.
    pub postcondition: &'static str,
}

pub fn descriptor(id: ProcessorId) -> ProcessorDescriptor {
    use ProcessorId::*;
    match id {
        References2Copies => ProcessorDescriptor {
            name: "References2Copies",
            must_run_after: &[],
            must_not_run_before: &[],
            postcondition: "no node is reachable from two positions",
        },
        ConstraintAttacher => ProcessorDescriptor {
            name: "ConstraintAttacher",
            must_run_after: const { &[needs(References2Copies)] },
            must_not_run_before: &[],
            postcondition: "constraints.targets and mapping are empty",
        },
        SparseOptAttacher => ProcessorDescriptor {
            name: "SparseOptAttacher",
            must_run_after: const { &[needs(References2Copies)] },
            must_not_run_before: &[],
            postcondition: "sparse_optimizations.targets is empty",
        },
        ConstraintMacro => ProcessorDescriptor {
            name: "ConstraintMacro",
            must_run_after: const { &[needs(References2Copies)] },
            must_not_run_before: &[],
            postcondition: "no macro keys remain on constraints",
        },
        Math => ProcessorDescriptor {
            name: "Math",
            must_run_after: const { &[needs(References2Copies), if_present(ConstraintAttacher)] },
            must_not_run_before: &[],
            postcondition:
                "expressions in attributes, fanouts, problem and constraints are evaluated",
        },
        Dataspace2Branch => ProcessorDescriptor {
            name: "Dataspace2Branch",
            must_run_after: const {
                &[
                    needs(References2Copies),
                    if_present(ConstraintMacro),
                    needs(ConstraintAttacher),
                ]
            },
            must_not_run_before: &[],
            postcondition: "every parallel branch bypasses what it does not keep",
        },
        PermutationOptimizer => ProcessorDescriptor {
            name: "PermutationOptimizer",
            must_run_after: const {
                &[
                    needs(ConstraintAttacher),
                    needs(References2Copies),
                    if_present(ConstraintMacro),
                    if_present(Dataspace2Branch),
                ]
            },
            must_not_run_before: &[],
            postcondition: "size-1 loops lead every permutation",
        },
        RequiredActions => ProcessorDescriptor {
            name: "RequiredActions",
            must_run_after: const { &[needs(References2Copies), needs(SparseOptAttacher)] },
            must_not_run_before: &[],
            postcondition: "every element lists the actions it needs",
        },
        MapspaceSizeContributors => ProcessorDescriptor {
            name: "MapspaceSizeContributors",
            must_run_after: const {
                &[
                    needs(ConstraintAttacher),
                    if_present(ConstraintMacro),
                    if_present(PermutationOptimizer),
                    if_present(Dataspace2Branch),
                ]
            },
            must_not_run_before: &[],
            postcondition: "none (diagnostic only)",
        },
        EnableDummyTable => ProcessorDescriptor {
            name: "EnableDummyTable",
            must_run_after: const { &[needs(References2Copies)] },
            must_not_run_before: &[],
            postcondition: "every element uses the dummy energy table",
        },
        VariablesFromCli => ProcessorDescriptor {
            name: "VariablesFromCli",
            must_run_after: &[],
            must_not_run_before: const { &[if_present(Math)] },
            postcondition: "command-line variables override document variables",
        },
    }
}

// ── Suites and ordering ────────────────────────────────────────────────────

pub const ALL_PROCESSORS: [ProcessorId; 11] = [
    ProcessorId::References2Copies,
    ProcessorId::ConstraintAttacher,
    ProcessorId::SparseOptAttacher,
    ProcessorId::ConstraintMacro,
    ProcessorId::Math,
    ProcessorId::Dataspace2Branch,
    ProcessorId::PermutationOptimizer,
    ProcessorId::RequiredActions,
    ProcessorId::MapspaceSizeContributors,
    ProcessorId::EnableDummyTable,
    ProcessorId::VariablesFromCli,
];

/// The processors a specification runs unless told otherwise, in order.
pub const STANDARD_SUITE: [ProcessorId; 9] = [
    ProcessorId::References2Copies,
    ProcessorId::ConstraintAttacher,
    ProcessorId::SparseOptAttacher,
    ProcessorId::ConstraintMacro,
    ProcessorId::Math,
    ProcessorId::Dataspace2Branch,
    ProcessorId::PermutationOptimizer,
    ProcessorId::RequiredActions,
    ProcessorId::MapspaceSizeContributors,
];

/// Check `id`'s ordering contract against `order`, the sequence of
/// processors already run followed by those still scheduled. Positions are
/// first occurrences.
pub fn check_order(id: ProcessorId, order: &[ProcessorId]) -> Result<()> {
    let position = |p: ProcessorId| order.iter().position(|q| *q == p);
    let Some(mine) = position(id) else {
        return Err(SpecError::Processor {
            processor: id.name().to_string(),
            message: "is not in the processor list".to_string(),
        });
    };
    let desc = descriptor(id);
    for rule in desc.must_run_after {
        let late = match position(rule.other) {
            Some(other) => other > mine,
            None => !rule.ok_if_not_found,
        };
        if late {
            return Err(SpecError::Ordering {
                before: rule.other.name().to_string(),
                after: id.name().to_string(),
            });
        }
    }
    for rule in desc.must_not_run_before {
        let early = match position(rule.other) {
            Some(other) => other < mine,
            None => !rule.ok_if_not_found,
        };
        if early {
            return Err(SpecError::Ordering {
                before: id.name().to_string(),
                after: rule.other.name().to_string(),
            });
        }
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_suite_satisfies_every_contract() {
        for id in STANDARD_SUITE {
            check_order(id, &STANDARD_SUITE).unwrap();
        }
    }

    #[test]
    fn late_dependency_is_reported() {
        let order = [
            ProcessorId::References2Copies,
            ProcessorId::Dataspace2Branch,
            ProcessorId::ConstraintAttacher,
        ];
        let err = check_order(ProcessorId::Dataspace2Branch, &order).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ConstraintAttacher must run before Dataspace2Branch. Add ConstraintAttacher to the \
             processor list ahead of Dataspace2Branch."
        );
    }

    #[test]
    fn missing_required_dependency_is_reported() {
        let order = [ProcessorId::References2Copies, ProcessorId::RequiredActions];
        assert!(matches!(
            check_order(ProcessorId::RequiredActions, &order),
            Err(SpecError::Ordering { .. })
        ));
    }

    #[test]
    fn optional_dependency_may_be_absent() {
        let order = [ProcessorId::References2Copies, ProcessorId::Math];
        check_order(ProcessorId::Math, &order).unwrap();
    }

    #[test]
    fn cli_variables_must_precede_math() {
        let good = [
            ProcessorId::References2Copies,
            ProcessorId::VariablesFromCli,
            ProcessorId::Math,
        ];
        check_order(ProcessorId::VariablesFromCli, &good).unwrap();
        let bad = [
            ProcessorId::References2Copies,
            ProcessorId::Math,
            ProcessorId::VariablesFromCli,
        ];
        let err = check_order(ProcessorId::VariablesFromCli, &bad).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("VariablesFromCli must run before Math"));
        check_order(
            ProcessorId::VariablesFromCli,
            &[ProcessorId::VariablesFromCli],
        )
        .unwrap();
    }

    #[test]
    fn names_round_trip() {
        for id in ALL_PROCESSORS {
            assert_eq!(ProcessorId::from_name(id.name()).unwrap(), id);
        }
        assert_eq!(
            ProcessorId::from_name("some.module.ConstraintMacroProcessor").unwrap(),
            ProcessorId::ConstraintMacro
        );
        assert!(ProcessorId::from_name("Frobnicate").is_err());
    }
}
