pub mod provision;
pub mod status;
pub mod teardown;

use ::provision::{NodeRegistry, StepGraph};

/// Number of (node, step) pairs a run over `graph` produces
pub fn planned(registry: &NodeRegistry, graph: &StepGraph) -> usize {
    graph
        .steps()
        .iter()
        .map(|step| registry.nodes().iter().filter(|n| step.targets(n)).count())
        .sum()
}
