// kinds.rs — The closed set of node kinds
//
// Every node in a specification tree is one of these kinds. Behavior that
// varies by kind (combination, emptiness, constraint type names, class
// hierarchy membership) is dispatched by matching on `NodeKind`.

use std::fmt;

/// Whether a node kind stores keyed entries or an ordered sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Dict,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Specification,

    // ── Architecture ──
    Architecture,
    ArchNodes,
    Hierarchical,
    Parallel,
    Pipelined,
    Container,
    Storage,
    Compute,
    Network,
    Nothing,
    Networks,
    Fanout,
    Attributes,
    StorageAttributes,

    // ── Constraints ──
    Constraints,
    ConstraintsList,
    ConstraintGroup,
    Spatial,
    Temporal,
    Dataspace,
    MaxOverbookedProportion,
    Utilization,
    Factors,
    Permutation,
    ProblemDataspaceList,

    // ── Problem ──
    Problem,
    Shape,
    DataSpaceList,
    DataSpace,
    Instance,
    DensityList,
    Density,

    // ── Sparse optimizations ──
    SparseOptimizations,
    SparseOptimizationsList,
    SparseOptimizationGroup,
    RepresentationFormat,
    RepresentationDataSpaceList,
    RepresentationDataSpace,
    RankList,
    Rank,
    ActionOptimizationList,
    ActionOptimization,
    ActionOptimizationOptionList,
    ActionOptimizationOption,
    ComputeOptimization,

    // ── Other top-level sections ──
    Mapper,
    Variables,
    Components,
    Mapspace,
    Globals,
    EnvironmentVariables,
    ProcessorList,

    // ── Free-form ──
    List,
    Dict,
}

impl NodeKind {
    pub const ALL: &'static [NodeKind] = &[
        NodeKind::Specification,
        NodeKind::Architecture,
        NodeKind::ArchNodes,
        NodeKind::Hierarchical,
        NodeKind::Parallel,
        NodeKind::Pipelined,
        NodeKind::Container,
        NodeKind::Storage,
        NodeKind::Compute,
        NodeKind::Network,
        NodeKind::Nothing,
        NodeKind::Networks,
        NodeKind::Fanout,
        NodeKind::Attributes,
        NodeKind::StorageAttributes,
        NodeKind::Constraints,
        NodeKind::ConstraintsList,
        NodeKind::ConstraintGroup,
        NodeKind::Spatial,
        NodeKind::Temporal,
        NodeKind::Dataspace,
        NodeKind::MaxOverbookedProportion,
        NodeKind::Utilization,
        NodeKind::Factors,
        NodeKind::Permutation,
        NodeKind::ProblemDataspaceList,
        NodeKind::Problem,
        NodeKind::Shape,
        NodeKind::DataSpaceList,
        NodeKind::DataSpace,
        NodeKind::Instance,
        NodeKind::DensityList,
        NodeKind::Density,
        NodeKind::SparseOptimizations,
        NodeKind::SparseOptimizationsList,
        NodeKind::SparseOptimizationGroup,
        NodeKind::RepresentationFormat,
        NodeKind::RepresentationDataSpaceList,
        NodeKind::RepresentationDataSpace,
        NodeKind::RankList,
        NodeKind::Rank,
        NodeKind::ActionOptimizationList,
        NodeKind::ActionOptimization,
        NodeKind::ActionOptimizationOptionList,
        NodeKind::ActionOptimizationOption,
        NodeKind::ComputeOptimization,
        NodeKind::Mapper,
        NodeKind::Variables,
        NodeKind::Components,
        NodeKind::Mapspace,
        NodeKind::Globals,
        NodeKind::EnvironmentVariables,
        NodeKind::ProcessorList,
        NodeKind::List,
        NodeKind::Dict,
    ];

    /// Architecture kinds that are elements of a branch's `nodes` list.
    pub const LEAVES: &'static [NodeKind] = &[
        NodeKind::Container,
        NodeKind::Storage,
        NodeKind::Compute,
        NodeKind::Network,
        NodeKind::Nothing,
    ];

    pub const ELEMENTS: &'static [NodeKind] = &[
        NodeKind::Storage,
        NodeKind::Compute,
        NodeKind::Network,
        NodeKind::Nothing,
    ];

    pub const BRANCHES: &'static [NodeKind] = &[
        NodeKind::Architecture,
        NodeKind::Hierarchical,
        NodeKind::Parallel,
        NodeKind::Pipelined,
    ];

    pub const CONSTRAINTS: &'static [NodeKind] = &[
        NodeKind::Spatial,
        NodeKind::Temporal,
        NodeKind::Dataspace,
        NodeKind::MaxOverbookedProportion,
        NodeKind::Utilization,
    ];

    pub const ITERATIONS: &'static [NodeKind] = &[NodeKind::Spatial, NodeKind::Temporal];

    /// Class name used in paths, tags and messages.
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Specification => "Specification",
            NodeKind::Architecture => "Architecture",
            NodeKind::ArchNodes => "ArchNodes",
            NodeKind::Hierarchical => "Hierarchical",
            NodeKind::Parallel => "Parallel",
            NodeKind::Pipelined => "Pipelined",
            NodeKind::Container => "Container",
            NodeKind::Storage => "Storage",
            NodeKind::Compute => "Compute",
            NodeKind::Network => "Network",
            NodeKind::Nothing => "Nothing",
            NodeKind::Networks => "Networks",
            NodeKind::Fanout => "Fanout",
            NodeKind::Attributes => "Attributes",
            NodeKind::StorageAttributes => "StorageAttributes",
            NodeKind::Constraints => "Constraints",
            NodeKind::ConstraintsList => "ConstraintsList",
            NodeKind::ConstraintGroup => "ConstraintGroup",
            NodeKind::Spatial => "Spatial",
            NodeKind::Temporal => "Temporal",
            NodeKind::Dataspace => "Dataspace",
            NodeKind::MaxOverbookedProportion => "MaxOverbookedProportion",
            NodeKind::Utilization => "Utilization",
            NodeKind::Factors => "Factors",
            NodeKind::Permutation => "Permutation",
            NodeKind::ProblemDataspaceList => "ProblemDataspaceList",
            NodeKind::Problem => "Problem",
            NodeKind::Shape => "Shape",
            NodeKind::DataSpaceList => "DataSpaceList",
            NodeKind::DataSpace => "DataSpace",
            NodeKind::Instance => "Instance",
            NodeKind::DensityList => "DensityList",
            NodeKind::Density => "Density",
            NodeKind::SparseOptimizations => "SparseOptimizations",
            NodeKind::SparseOptimizationsList => "SparseOptimizationsList",
            NodeKind::SparseOptimizationGroup => "SparseOptimizationGroup",
            NodeKind::RepresentationFormat => "RepresentationFormat",
            NodeKind::RepresentationDataSpaceList => "RepresentationDataSpaceList",
            NodeKind::RepresentationDataSpace => "RepresentationDataSpace",
            NodeKind::RankList => "RankList",
            NodeKind::Rank => "Rank",
            NodeKind::ActionOptimizationList => "ActionOptimizationList",
            NodeKind::ActionOptimization => "ActionOptimization",
            NodeKind::ActionOptimizationOptionList => "ActionOptimizationOptionList",
            NodeKind::ActionOptimizationOption => "ActionOptimizationOption",
            NodeKind::ComputeOptimization => "ComputeOptimization",
            NodeKind::Mapper => "Mapper",
            NodeKind::Variables => "Variables",
            NodeKind::Components => "Components",
            NodeKind::Mapspace => "Mapspace",
            NodeKind::Globals => "Globals",
            NodeKind::EnvironmentVariables => "EnvironmentVariables",
            NodeKind::ProcessorList => "ProcessorList",
            NodeKind::List => "List",
            NodeKind::Dict => "Dict",
        }
    }

    pub fn shape(self) -> Shape {
        match self {
            NodeKind::ArchNodes
            | NodeKind::Networks
            | NodeKind::ConstraintsList
            | NodeKind::Factors
            | NodeKind::Permutation
            | NodeKind::ProblemDataspaceList
            | NodeKind::DataSpaceList
            | NodeKind::SparseOptimizationsList
            | NodeKind::RepresentationDataSpaceList
            | NodeKind::RankList
            | NodeKind::ActionOptimizationList
            | NodeKind::ActionOptimizationOptionList
            | NodeKind::ProcessorList
            | NodeKind::List => Shape::List,
            _ => Shape::Dict,
        }
    }

    pub fn is_leaf(self) -> bool {
        Self::LEAVES.contains(&self)
    }

    pub fn is_element(self) -> bool {
        Self::ELEMENTS.contains(&self)
    }

    pub fn is_branch(self) -> bool {
        Self::BRANCHES.contains(&self)
    }

    pub fn is_constraint(self) -> bool {
        Self::CONSTRAINTS.contains(&self)
    }

    pub fn is_iteration(self) -> bool {
        Self::ITERATIONS.contains(&self)
    }

    /// The `type` string carried by constraint kinds.
    pub fn constraint_type(self) -> Option<&'static str> {
        match self {
            NodeKind::Spatial => Some("spatial"),
            NodeKind::Temporal => Some("temporal"),
            NodeKind::Dataspace => Some("dataspace"),
            NodeKind::MaxOverbookedProportion => Some("max_overbooked_proportion"),
            NodeKind::Utilization => Some("utilization"),
            _ => None,
        }
    }

    pub fn from_constraint_type(ctype: &str) -> Option<NodeKind> {
        Self::CONSTRAINTS
            .iter()
            .copied()
            .find(|k| k.constraint_type() == Some(ctype))
    }

    /// Groups of list keys whose members must stay disjoint when two
    /// constraints of this kind are combined.
    pub fn disjoint_lists(self) -> &'static [&'static [&'static str]] {
        match self {
            NodeKind::Spatial => &[&["no_multicast_no_reduction"], &["no_link_transfer"]],
            NodeKind::Temporal => &[&["no_temporal_reuse"]],
            NodeKind::Dataspace => &[&["bypass", "keep"]],
            _ => &[],
        }
    }

    /// List kinds whose combination concatenates rather than failing.
    pub fn is_combineable_list(self) -> bool {
        matches!(
            self,
            NodeKind::ArchNodes
                | NodeKind::ConstraintsList
                | NodeKind::Factors
                | NodeKind::SparseOptimizationsList
                | NodeKind::List
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = NodeKind::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn constraint_type_round_trips() {
        for kind in NodeKind::CONSTRAINTS {
            let ctype = kind.constraint_type().unwrap();
            assert_eq!(NodeKind::from_constraint_type(ctype), Some(*kind));
        }
        assert_eq!(NodeKind::from_constraint_type("bogus"), None);
    }

    #[test]
    fn hierarchy_membership() {
        assert!(NodeKind::Storage.is_leaf() && NodeKind::Storage.is_element());
        assert!(NodeKind::Container.is_leaf() && !NodeKind::Container.is_element());
        assert!(NodeKind::Parallel.is_branch());
        assert!(NodeKind::Temporal.is_iteration() && NodeKind::Temporal.is_constraint());
        assert_eq!(NodeKind::Factors.shape(), Shape::List);
        assert_eq!(NodeKind::Dataspace.shape(), Shape::Dict);
    }
}
