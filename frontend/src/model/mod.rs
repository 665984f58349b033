// model/mod.rs — Document model: class schemas of every node kind
//
// Each kind has a declaration hook. Hooks call their parent-class hook first
// so that schemas accumulate down the class hierarchy
// (node → leaf → element → storage). `declare_all` runs every hook once.

pub mod arch;
pub mod constraints;
pub mod misc;
pub mod problem;
pub mod sparse;

use crate::raw::Raw;
use crate::registry::{ClassSchema, Schema};

/// Root of every class: any key containing `ignore` is kept unvalidated.
pub fn declare_node(c: &mut ClassSchema) {
    c.attr("ignore", &[]).wildcard().optional();
}

/// Populate `schema` with the standard document model.
pub fn declare_all(schema: &mut Schema) {
    arch::declare(schema);
    constraints::declare(schema);
    problem::declare(schema);
    sparse::declare(schema);
    misc::declare(schema);
}

pub(crate) fn empty_map() -> Raw {
    Raw::empty_map()
}

pub(crate) fn empty_list() -> Raw {
    Raw::empty_list()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::NodeKind;

    #[test]
    fn every_kind_has_a_schema() {
        let schema = Schema::standard();
        for kind in NodeKind::ALL {
            let class = schema.class(*kind);
            assert!(class.is_some(), "{kind} has no schema");
            assert!(
                class.unwrap().specifier("ignore").is_some(),
                "{kind} lacks the ignore key"
            );
        }
    }
}
