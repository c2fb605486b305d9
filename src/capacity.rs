//! Per-vertex capacities `b(v)` and the random assignments used by the benchmark driver.

use crate::error::AuctionError;
use crate::graph::BipartiteGraph;
use crate::solution::UnsignedInt;
use anyhow::{anyhow, ensure, Result};
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct VertexCapacities<I: UnsignedInt> {
    /// index i gives b of left vertex (bidder) i
    pub left: Vec<I>,
    /// index j gives b of right vertex (object) j
    pub right: Vec<I>,
}

impl<I: UnsignedInt> VertexCapacities<I> {
    pub fn new(left: Vec<I>, right: Vec<I>) -> Self {
        VertexCapacities { left, right }
    }

    /// Same capacity `b` for every vertex.
    pub fn constant(graph: &BipartiteGraph<I>, b: I) -> Self {
        VertexCapacities {
            left: vec![b; graph.left_count().as_()],
            right: vec![b; graph.right_count().as_()],
        }
    }

    /// Every vertex draws its capacity uniformly from `low..=high`.
    pub fn uniform<G: Rng>(
        graph: &BipartiteGraph<I>,
        low: I,
        high: I,
        rng: &mut G,
    ) -> Result<Self> {
        ensure!(
            low <= high,
            AuctionError::InvalidParameter(format!("empty capacity range {}..={}", low, high))
        );
        let low_usize: usize = low.as_();
        let high_usize: usize = high.as_();
        let mut draw = |count: usize| -> Result<Vec<I>> {
            (0..count)
                .map(|_| {
                    I::from_usize(rng.gen_range(low_usize..=high_usize))
                        .ok_or_else(|| anyhow!("capacity overflows the index type"))
                })
                .collect()
        };
        let left = draw(graph.left_count().as_())?;
        let right = draw(graph.right_count().as_())?;
        Ok(VertexCapacities { left, right })
    }

    /// Capacities for a b-factor instance: each bidder draws `b` from `1..=max(1, deg / 2)`
    /// and hands the same value to a distinct right vertex picked from a random
    /// permutation. Right vertices left over get capacity 0, so both sides demand the same
    /// total.
    pub fn paired_for_b_factor<G: Rng>(graph: &BipartiteGraph<I>, rng: &mut G) -> Result<Self> {
        let num_left: usize = graph.left_count().as_();
        let num_right: usize = graph.right_count().as_();
        ensure!(
            num_left <= num_right,
            AuctionError::InvalidParameter(format!(
                "b-factor pairing needs at least as many right vertices ({}) as left ones ({})",
                num_right, num_left
            ))
        );
        let mut permutation: Vec<usize> = (0..num_right).collect();
        permutation.shuffle(rng);

        let mut left = Vec::with_capacity(num_left);
        let mut right = vec![I::zero(); num_right];
        for row in num_iter::range(I::zero(), graph.left_count()) {
            let deg_half = (graph.degree(row) / 2).max(1);
            let b = I::from_usize(rng.gen_range(1..=deg_half))
                .ok_or_else(|| anyhow!("capacity overflows the index type"))?;
            let j = permutation
                .pop()
                .ok_or_else(|| anyhow!("ran out of right vertices"))?;
            left.push(b);
            right[j] = b;
        }
        Ok(VertexCapacities { left, right })
    }

    pub fn total_left(&self) -> usize {
        self.left.iter().map(|&b| -> usize { b.as_() }).sum()
    }

    pub fn total_right(&self) -> usize {
        self.right.iter().map(|&b| -> usize { b.as_() }).sum()
    }

    /// Checks that there is one capacity per vertex of `graph`.
    pub fn validate(&self, graph: &BipartiteGraph<I>) -> Result<()> {
        let num_left: usize = graph.left_count().as_();
        let num_right: usize = graph.right_count().as_();
        ensure!(
            self.left.len() == num_left && self.right.len() == num_right,
            AuctionError::InvalidParameter(format!(
                "capacities for {}+{} vertices given, graph has {}+{}",
                self.left.len(),
                self.right.len(),
                num_left,
                num_right
            ))
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::VertexCapacities;
    use crate::graph::BipartiteGraph;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn graph() -> BipartiteGraph<u32> {
        let mut edges = Vec::new();
        for i in 0..3 {
            for j in 0..4 {
                edges.push((i, j, (i + j) as f64));
            }
        }
        BipartiteGraph::from_edges(3, 4, &edges).unwrap()
    }

    #[test]
    fn test_uniform_stays_in_range() {
        let graph = graph();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let caps = VertexCapacities::uniform(&graph, 1, 10, &mut rng).unwrap();
        caps.validate(&graph).unwrap();
        assert!(caps.left.iter().chain(caps.right.iter()).all(|&b| (1..=10).contains(&b)));
        assert!(VertexCapacities::uniform(&graph, 2, 1, &mut rng).is_err());
    }

    #[test]
    fn test_paired_for_b_factor_balances_totals() {
        let graph = graph();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let caps = VertexCapacities::paired_for_b_factor(&graph, &mut rng).unwrap();
        caps.validate(&graph).unwrap();
        assert_eq!(caps.total_left(), caps.total_right());
        assert!(caps.left.iter().all(|&b| (1..=2).contains(&b)));
        assert_eq!(caps.right.iter().filter(|&&b| b == 0).count(), 1);
    }

    #[test]
    fn test_validate_rejects_wrong_sizes() {
        let graph = graph();
        let caps = VertexCapacities::<u32>::new(vec![1; 3], vec![1; 3]);
        assert!(caps.validate(&graph).is_err());
        assert_eq!(VertexCapacities::constant(&graph, 2).total_right(), 8);
    }
}
