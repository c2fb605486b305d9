use crate::capacity::VertexCapacities;
use crate::error::AuctionError;
use crate::graph::BipartiteGraph;
use anyhow::{anyhow, Result};
use num_traits::{AsPrimitive, FromPrimitive, NumAssign, PrimInt, Unsigned};
use std::fmt::{Debug, Display};

pub trait UnsignedInt:
    PrimInt
    + Unsigned
    + Display
    + Debug
    + AsPrimitive<usize>
    + AsPrimitive<f64>
    + FromPrimitive
    + NumAssign
{
}

impl UnsignedInt for u16 {}
impl UnsignedInt for u32 {}
impl UnsignedInt for u64 {}
impl UnsignedInt for usize {}

/// Timing and objective of a single solver run, shared by the auction and the
/// comparison oracles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlgResult {
    /// wall clock seconds of the whole run
    pub total_time: f64,
    /// seconds spent building solver structures before the main loop
    pub init_time: f64,
    pub total_weight: f64,
}

impl AlgResult {
    pub fn new(total_time: f64, init_time: f64, total_weight: f64) -> Self {
        AlgResult {
            total_time,
            init_time,
            total_weight,
        }
    }

    /// Seconds spent after initialization.
    pub fn running_time(&self) -> f64 {
        self.total_time - self.init_time
    }
}

///
/// Solution of the b-matching (or b-factor) problem
///
#[derive(Debug, Clone)]
pub struct BMatchingSolution<I>
where
    I: UnsignedInt,
{
    /// index i gives the objects (right columns) matched to bidder i and the edge weights
    pub bidder_to_objects: Vec<Vec<(I, f64)>>,
    /// index j gives the final prices of the capacity slots of object j
    ///
    /// Left empty by solvers that don't price objects.
    pub prices: Vec<Vec<f64>>,
    /// number of bidders that gave up bidding (b-matching auction only)
    pub num_permanent: I,
    /// number of bidders matched fewer than b times
    pub num_unsaturated: I,
    /// epsilon of the final auction phase, NaN for other solvers
    pub eps: f64,
    pub total_weight: f64,
}

impl<I> BMatchingSolution<I>
where
    I: UnsignedInt,
{
    pub fn new(row_capacity: usize, column_capacity: usize) -> BMatchingSolution<I> {
        BMatchingSolution::<I> {
            bidder_to_objects: Vec::with_capacity(row_capacity),
            prices: Vec::with_capacity(column_capacity),
            num_permanent: I::zero(),
            num_unsaturated: I::max_value(),
            eps: f64::NAN,
            total_weight: 0.,
        }
    }

    /// Clears previous results and sizes the matching for `num_rows` bidders.
    pub(crate) fn reset(&mut self, num_rows: usize) {
        self.bidder_to_objects.iter_mut().for_each(|m| m.clear());
        self.bidder_to_objects.resize_with(num_rows, Vec::new);
        self.prices.clear();
        self.num_permanent = I::zero();
        self.num_unsaturated = I::max_value();
        self.eps = f64::NAN;
        self.total_weight = 0.;
    }

    pub fn num_of_matches(&self) -> usize {
        self.bidder_to_objects.iter().map(|m| m.len()).sum()
    }

    /// Iterates over matched `(bidder, object, weight)` triples.
    pub fn matched_edges(&self) -> impl Iterator<Item = (I, I, f64)> + '_ {
        self.bidder_to_objects
            .iter()
            .enumerate()
            .filter_map(|(i, objects)| I::from_usize(i).map(|i| (i, objects)))
            .flat_map(|(i, objects)| objects.iter().map(move |&(j, w)| (i, j, w)))
    }

    /// Checks the matching against the input it was computed from.
    ///
    /// Every matched pair must be an eligible edge of `graph` with the recorded weight,
    /// no pair may appear twice, and every vertex must be matched at most `b` times
    /// (exactly `b` times if `perfect`).
    pub fn validate(
        &self,
        graph: &BipartiteGraph<I>,
        capacities: &VertexCapacities<I>,
        perfect: bool,
    ) -> Result<()> {
        let violation = |msg: String| anyhow!(AuctionError::InvariantViolation(msg));
        let num_left: usize = graph.left_count().as_();
        let num_right: usize = graph.right_count().as_();
        if self.bidder_to_objects.len() != num_left {
            return Err(violation(format!(
                "solution has {} bidders, graph has {}",
                self.bidder_to_objects.len(),
                num_left
            )));
        }

        let mut right_load = vec![0_usize; num_right];
        let mut weight = 0_f64;
        let mut seen = vec![false; num_right];
        for (i, objects) in self.bidder_to_objects.iter().enumerate() {
            let b: usize = capacities.left[i].as_();
            if objects.len() > b || (perfect && objects.len() != b) {
                return Err(violation(format!(
                    "bidder {} matched {} times, capacity {}",
                    i,
                    objects.len(),
                    b
                )));
            }
            for &(j, w) in objects {
                let j_usize: usize = j.as_();
                if j_usize >= num_right || seen[j_usize] {
                    return Err(violation(format!("bidder {} matched object {} twice", i, j)));
                }
                seen[j_usize] = true;
                let row = I::from_usize(i).ok_or_else(|| anyhow!("bidder index overflow"))?;
                let edge_weight = graph
                    .neighbors(row)
                    .find(|&(column, _)| column == j)
                    .map(|(_, value)| value);
                match edge_weight {
                    Some(value) if value >= 0. && value == w => {}
                    _ => {
                        return Err(violation(format!(
                            "pair ({}, {}) with weight {} is not an eligible edge",
                            i, j, w
                        )))
                    }
                }
                right_load[j_usize] += 1;
                weight += w;
            }
            for &(j, _) in objects {
                let j_usize: usize = j.as_();
                seen[j_usize] = false;
            }
        }

        for (j, load) in right_load.into_iter().enumerate() {
            let b: usize = capacities.right[j].as_();
            if load > b || (perfect && load != b) {
                return Err(violation(format!(
                    "object {} matched {} times, capacity {}",
                    j, load, b
                )));
            }
        }

        let tolerance = 1e-9 * weight.abs().max(1.);
        if (weight - self.total_weight).abs() > tolerance {
            return Err(violation(format!(
                "recorded weight {} differs from matched weight {}",
                self.total_weight, weight
            )));
        }
        Ok(())
    }
}
