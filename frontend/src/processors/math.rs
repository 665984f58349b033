// processors/math.rs — Expression resolution as a processor

use tracing::info;

use crate::diag::Result;
use crate::pass::ProcessorId;
use crate::resolve::resolve;
use crate::spec::Specification;

use super::Processor;

pub struct Math;

impl Processor for Math {
    fn id(&self) -> ProcessorId {
        ProcessorId::Math
    }

    fn process(&self, spec: &mut Specification) -> Result<()> {
        let stats = resolve(&mut spec.tree, spec.root)?;
        info!(
            evaluated = stats.evaluated,
            substituted = stats.substituted,
            "expressions resolved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{SpecOptions, Specification};
    use crate::tree::Value;

    #[test]
    fn resolves_constraints_after_attachment() {
        let yaml = r#"
variables: {tile: 4}
problem:
  shape:
    dimensions: [C]
    data_spaces: [{name: Inputs, projection: [[[C]]]}]
  instance: {C: tile * 2}
architecture:
  version: 0.4
  nodes:
  - !Component {name: Buffer, class: SRAM, attributes: {width: 8, depth: tile * 16, datawidth: 8}}
constraints:
  targets:
  - {type: temporal, target: Buffer, factors: [C=tile]}
"#;
        let options = SpecOptions {
            processors: vec![
                ProcessorId::References2Copies,
                ProcessorId::ConstraintAttacher,
                ProcessorId::Math,
            ],
            ..SpecOptions::default()
        };
        let mut spec = Specification::from_yaml_str(yaml, options).unwrap();
        spec.process(None, Default::default()).unwrap();
        let arch = spec.architecture().unwrap();
        let buffer = crate::model::arch::name2leaf(&spec.tree, arch, "Buffer").unwrap();
        let attributes = spec.tree.child(buffer, "attributes").unwrap();
        assert_eq!(
            spec.tree.get(attributes, "depth").unwrap(),
            Some(&Value::Int(64))
        );
        let temporal = spec
            .tree
            .child(spec.tree.child(buffer, "constraints").unwrap(), "temporal")
            .unwrap();
        let factors = spec.tree.child(temporal, "factors").unwrap();
        assert_eq!(spec.tree.strings(factors), vec!["C=4"]);
    }
}
