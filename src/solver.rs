use crate::capacity::VertexCapacities;
use crate::graph::BipartiteGraph;
use crate::solution::{AlgResult, BMatchingSolution, UnsignedInt};
use anyhow;

/// Common interface of the auction solvers and the comparison oracles, so benchmarks can
/// run all of them on the same input.
pub trait BMatchingSolver<I: UnsignedInt> {
    fn name(&self) -> &'static str;

    /// True if the solver saturates every vertex exactly (b-factor).
    fn is_perfect(&self) -> bool;

    fn solve(
        &mut self,
        graph: &BipartiteGraph<I>,
        capacities: &VertexCapacities<I>,
        solution: &mut BMatchingSolution<I>,
    ) -> Result<AlgResult, anyhow::Error>;

    fn validate_input(
        &self,
        graph: &BipartiteGraph<I>,
        capacities: &VertexCapacities<I>,
    ) -> Result<(), anyhow::Error> {
        graph.validate()?;
        capacities.validate(graph)
    }
}
