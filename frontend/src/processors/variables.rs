// processors/variables.rs — `NAME=VALUE` overrides from the command line
//
// Each override replaces or adds one entry of the top-level `variables`.
// Values stay strings; expression resolution turns numeric text into
// numbers later. Arguments without an `=` are ignored.

use tracing::info;

use crate::diag::Result;
use crate::pass::ProcessorId;
use crate::spec::Specification;
use crate::tree::Value;

use super::Processor;

pub struct VariablesFromCli;

impl Processor for VariablesFromCli {
    fn id(&self) -> ProcessorId {
        ProcessorId::VariablesFromCli
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let variables = spec.variables()?;
        for arg in &spec.cli_variables {
            let Some((key, value)) = arg.split_once('=') else {
                continue;
            };
            info!(variable = key, value, "variable set from the command line");
            spec.tree.set(variables, key, Value::from(value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{SpecOptions, Specification};

    const YAML: &str = r#"
variables: {depth: 16, width: 8}
problem:
  shape:
    dimensions: [C]
    data_spaces: [{name: Inputs, projection: [[[C]]]}]
  instance: {C: 4}
architecture:
  version: 0.4
  nodes:
  - !Component {name: Buffer, class: SRAM, attributes: {width: width, depth: depth, datawidth: 8, block_size: 1}}
"#;

    fn spec(processors: Vec<ProcessorId>, variables: &[&str]) -> Specification {
        let options = SpecOptions {
            processors,
            variables: variables.iter().map(|v| v.to_string()).collect(),
            ..SpecOptions::default()
        };
        Specification::from_yaml_str(YAML, options).unwrap()
    }

    #[test]
    fn overrides_replace_and_extend_variables() {
        let mut spec = spec(
            vec![
                ProcessorId::References2Copies,
                ProcessorId::VariablesFromCli,
            ],
            &["depth=64", "tag=a=b", "verbose"],
        );
        spec.process(None, Default::default()).unwrap();
        let variables = spec.variables().unwrap();
        assert_eq!(
            spec.tree.get(variables, "depth").unwrap(),
            Some(&Value::from("64"))
        );
        assert_eq!(
            spec.tree.get(variables, "width").unwrap(),
            Some(&Value::Int(8))
        );
        assert_eq!(
            spec.tree.get(variables, "tag").unwrap(),
            Some(&Value::from("a=b"))
        );
        assert!(!spec.tree.contains_key(variables, "verbose"));
    }

    #[test]
    fn overrides_reach_resolved_attributes() {
        let mut spec = spec(
            vec![
                ProcessorId::References2Copies,
                ProcessorId::VariablesFromCli,
                ProcessorId::Math,
            ],
            &["depth=64"],
        );
        spec.process(None, Default::default()).unwrap();
        let arch = spec.architecture().unwrap();
        let buffer = crate::model::arch::name2leaf(&spec.tree, arch, "Buffer").unwrap();
        let attributes = spec.tree.child(buffer, "attributes").unwrap();
        assert_eq!(
            spec.tree.get(attributes, "depth").unwrap(),
            Some(&Value::Int(64))
        );
    }
}
