//! Auction algorithm for the weighted b-matching and b-factor problems.
//!
//! Left vertices are bidders and right vertices are objects. Object `j` owns `b(j)` copies,
//! each priced independently and kept in an adjustable min-heap by price, so the cheapest
//! copy is always the one to outbid. An unsaturated bidder `i` looks at the cheapest copy
//! of every object it doesn't hold yet, picks the `b(i) + 1 - matched` best net values and
//! uses the worst of them as the comparison value: it bids on the others, and the copies it
//! already holds are repriced against the same comparison value. Displaced bidders go to
//! the back of the queue. The b-matching variant only considers candidates worth at least
//! epsilon and lets a bidder give up for good when it finds too few of them; the b-factor
//! variant always fills a bidder to exactly `b(i)`.

use crate::capacity::VertexCapacities;
use crate::error::AuctionError;
use crate::graph::BipartiteGraph;
use crate::priority_queue::{AdjustablePriorityQueue, HeapElement};
use crate::solution::{AlgResult, BMatchingSolution, UnsignedInt};
use crate::solver::BMatchingSolver;
use crate::top_k::{Candidate, TopK};
use anyhow::{anyhow, bail, ensure, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// at most `b(v)` matches per vertex
    BMatching,
    /// exactly `b(v)` matches per vertex
    BFactor,
}

/// Order in which bidders enter the queue at the start of every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidderOrder {
    /// ascending bidder id, reproducible
    Fifo,
    /// random permutation drawn from a ChaCha8 generator seeded with `seed`
    Shuffled { seed: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuctionConfig {
    /// target epsilon
    pub epsilon: f64,
    /// epsilon of the first phase, b-factor only
    pub start_epsilon: Option<f64>,
    pub order: BidderOrder,
    pub max_iterations: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        AuctionConfig {
            epsilon: 0.5,
            start_epsilon: None,
            order: BidderOrder::Fifo,
            max_iterations: None,
            time_limit: None,
        }
    }
}

impl AuctionConfig {
    pub fn with_epsilon(epsilon: f64) -> Self {
        AuctionConfig {
            epsilon,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        // every bid raises a price by at least epsilon, zero would not terminate
        ensure!(
            self.epsilon.is_finite() && self.epsilon > 0.,
            AuctionError::InvalidParameter(format!(
                "epsilon must be positive and finite, got {}",
                self.epsilon
            ))
        );
        if let Some(start_epsilon) = self.start_epsilon {
            ensure!(
                start_epsilon.is_finite() && start_epsilon > 0.,
                AuctionError::InvalidParameter(format!(
                    "start epsilon must be positive and finite, got {}",
                    start_epsilon
                ))
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MatchedEdge {
    bidder: usize,
    weight: f64,
}

#[derive(Debug, Clone)]
struct ObjectCopy {
    price: f64,
    matched: Option<MatchedEdge>,
    heap_index: usize,
}

impl ObjectCopy {
    fn new() -> Self {
        ObjectCopy {
            price: 0.,
            matched: None,
            heap_index: usize::MAX,
        }
    }
}

impl HeapElement for ObjectCopy {
    #[inline]
    fn priority(&self) -> f64 {
        self.price
    }
    #[inline]
    fn heap_index(&self) -> usize {
        self.heap_index
    }
    #[inline]
    fn set_heap_index(&mut self, index: usize) {
        self.heap_index = index;
    }
}

/// Copy `copy` of object `object`, resolved through the object's queue on every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotHandle {
    object: usize,
    copy: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BidderState {
    /// waiting in the queue
    Unsaturated,
    /// no profitable rebid pending
    Happy,
    /// gave up, never bids again (b-matching only)
    Permanent,
}

#[derive(Debug, Clone)]
struct Bidder {
    matched: Vec<SlotHandle>,
    state: BidderState,
}

fn invariant_violation(msg: String) -> anyhow::Error {
    error!("{}", msg);
    anyhow!(AuctionError::InvariantViolation(msg))
}

struct Deadline {
    nits: u64,
    max_iterations: Option<u64>,
    stop_at: Option<Instant>,
}

impl Deadline {
    #[inline]
    fn tick(&mut self) -> Result<()> {
        let expired = self.max_iterations.map_or(false, |max| self.nits >= max)
            || self.stop_at.map_or(false, |stop_at| Instant::now() >= stop_at);
        if expired {
            warn!("auction stopped after {} iterations", self.nits);
            bail!(AuctionError::DeadlineExceeded {
                iterations: self.nits
            });
        }
        self.nits += 1;
        Ok(())
    }
}

/// Bidders and objects of one auction run.
struct Market<'a, I: UnsignedInt> {
    graph: &'a BipartiteGraph<I>,
    capacities: &'a VertexCapacities<I>,
    variant: Variant,
    bidders: Vec<Bidder>,
    objects: Vec<AdjustablePriorityQueue<ObjectCopy>>,
    // marks objects held by the bidder being processed
    held: Vec<bool>,
    selector: TopK<usize>,
    candidates: Vec<Candidate<usize>>,
    price_threshold: f64,
}

impl<'a, I: UnsignedInt> Market<'a, I> {
    fn new(
        graph: &'a BipartiteGraph<I>,
        capacities: &'a VertexCapacities<I>,
        variant: Variant,
    ) -> Result<Self> {
        let bidders = capacities
            .left
            .iter()
            .map(|&b| {
                let b: usize = b.as_();
                Bidder {
                    matched: Vec::with_capacity(b),
                    state: BidderState::Unsaturated,
                }
            })
            .collect();
        let mut objects = Vec::with_capacity(capacities.right.len());
        for &b in &capacities.right {
            let b: usize = b.as_();
            let mut copies = AdjustablePriorityQueue::with_capacity(b);
            for _ in 0..b {
                copies.add(ObjectCopy::new())?;
            }
            objects.push(copies);
        }
        Ok(Market {
            graph,
            capacities,
            variant,
            bidders,
            objects,
            held: vec![false; capacities.right.len()],
            selector: TopK::new(),
            candidates: Vec::new(),
            price_threshold: f64::INFINITY,
        })
    }

    /// Bounds the prices of the next phase: a feasible b-factor instance never pushes a
    /// price more than `(copies + 1)` bid increments above the prices it starts from, where
    /// an increment is at most the weight range plus the carried price spread plus `eps`.
    fn set_price_threshold(&mut self, w_min: f64, w_max: f64, eps: f64) {
        let (low, high) = self
            .objects
            .iter()
            .flat_map(|copies| copies.iter())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), copy| {
                (low.min(copy.price), high.max(copy.price))
            });
        let (low, high) = if low <= high { (low, high) } else { (0., 0.) };
        let num_of_copies: usize = self.objects.iter().map(|copies| copies.len()).sum();
        self.price_threshold = high
            + w_max
            + (num_of_copies as f64 + 1.) * (w_max - w_min + (high - low) + eps);
        trace!("price threshold: {}", self.price_threshold);
    }

    /// Drops every match but keeps the prices.
    fn reset_assignments(&mut self) {
        for bidder in self.bidders.iter_mut() {
            bidder.matched.clear();
            bidder.state = BidderState::Unsaturated;
        }
        for copies in self.objects.iter_mut() {
            for handle in 0..copies.len() {
                copies.get_mut(handle).matched = None;
            }
        }
    }

    fn run_phase(&mut self, eps: f64, order: &[usize], deadline: &mut Deadline) -> Result<()> {
        let mut queue: VecDeque<usize> = order.iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            if self.bidders[i].state != BidderState::Unsaturated {
                continue;
            }
            deadline.tick()?;
            self.bid(i, eps, &mut queue)?;
        }
        Ok(())
    }

    fn bid(&mut self, i: usize, eps: f64, queue: &mut VecDeque<usize>) -> Result<()> {
        let b: usize = self.capacities.left[i].as_();
        let num_matched = self.bidders[i].matched.len();
        debug_assert!(num_matched <= b);
        if num_matched >= b {
            self.bidders[i].state = BidderState::Happy;
            return Ok(());
        }
        let k = b + 1 - num_matched;

        // candidate generation
        let graph = self.graph;
        let row =
            I::from_usize(i).ok_or_else(|| anyhow!("bidder {} overflows the index type", i))?;
        for handle in &self.bidders[i].matched {
            self.held[handle.object] = true;
        }
        self.selector.reset(k);
        for (column, weight) in graph.neighbors(row) {
            let j: usize = column.as_();
            if weight < 0. || self.held[j] {
                continue;
            }
            // objects without capacity are never candidates
            let price = match self.objects[j].top_element() {
                Some(copy) => copy.price,
                None => continue,
            };
            let value = weight - price;
            if self.variant == Variant::BMatching && value < eps {
                continue;
            }
            self.selector.offer(Candidate {
                value,
                object: j,
                weight,
            });
        }
        for handle in &self.bidders[i].matched {
            self.held[handle.object] = false;
        }

        let mut candidates = std::mem::take(&mut self.candidates);
        self.selector.drain_ascending(&mut candidates);
        let result = self.place_bids(i, eps, k, &candidates, queue);
        self.candidates = candidates;
        result
    }

    fn place_bids(
        &mut self,
        i: usize,
        eps: f64,
        k: usize,
        candidates: &[Candidate<usize>],
        queue: &mut VecDeque<usize>,
    ) -> Result<()> {
        // `None` means there is no comparison object and every target is raised by eps
        let (comparison, targets, permanent) = if candidates.len() >= k {
            (Some(candidates[0].value), &candidates[1..], false)
        } else {
            match self.variant {
                Variant::BMatching => (Some(eps), candidates, true),
                Variant::BFactor => {
                    if candidates.len() + 1 < k {
                        let msg = format!(
                            "bidder {} needs {} more objects but can reach only {}",
                            i,
                            k - 1,
                            candidates.len()
                        );
                        warn!("{}", msg);
                        bail!(AuctionError::InfeasibleCapacity(msg));
                    }
                    (None, candidates, false)
                }
            }
        };
        trace!(
            "bidder {}: k {}, comparison {:?}, targets {}",
            i,
            k,
            comparison,
            targets.len()
        );

        if let Some(comparison) = comparison {
            for idx in 0..self.bidders[i].matched.len() {
                let slot = self.bidders[i].matched[idx];
                let copies = &mut self.objects[slot.object];
                let copy = copies.get_mut(slot.copy);
                let weight = match copy.matched {
                    Some(edge) if edge.bidder == i => edge.weight,
                    _ => {
                        return Err(invariant_violation(format!(
                            "bidder {} points to copy {} of object {} it doesn't occupy",
                            i, slot.copy, slot.object
                        )))
                    }
                };
                let delta = weight - copy.price - comparison + eps;
                if delta > 0. {
                    copy.price += delta;
                    let price = copy.price;
                    copies.note_changed_priority(slot.copy);
                    self.check_price(slot.object, price)?;
                }
            }
        }

        for target in targets {
            let j = target.object;
            let handle = self.objects[j].top().ok_or_else(|| {
                invariant_violation(format!("object {} has no copies to bid on", j))
            })?;
            let increment = match comparison {
                Some(comparison) => target.value - comparison + eps,
                None => eps,
            };
            debug_assert!(increment > 0.);

            let copies = &mut self.objects[j];
            let copy = copies.get_mut(handle);
            let previous = copy.matched.replace(MatchedEdge {
                bidder: i,
                weight: target.weight,
            });
            copy.price += increment.max(0.);
            let price = copy.price;
            copies.note_changed_priority(handle);

            let slot = SlotHandle {
                object: j,
                copy: handle,
            };
            self.bidders[i].matched.push(slot);
            trace!(
                "bidder {} takes copy {} of object {} at price {}",
                i,
                handle,
                j,
                price
            );
            if let Some(evicted) = previous {
                self.evict(evicted.bidder, slot, queue)?;
            }
            self.check_price(j, price)?;
        }

        self.bidders[i].state = if permanent {
            BidderState::Permanent
        } else {
            BidderState::Happy
        };
        Ok(())
    }

    fn evict(
        &mut self,
        bidder: usize,
        slot: SlotHandle,
        queue: &mut VecDeque<usize>,
    ) -> Result<()> {
        let position = self.bidders[bidder]
            .matched
            .iter()
            .position(|held| *held == slot)
            .ok_or_else(|| {
                invariant_violation(format!(
                    "evicted bidder {} doesn't hold copy {} of object {}",
                    bidder, slot.copy, slot.object
                ))
            })?;
        self.bidders[bidder].matched.swap_remove(position);
        match self.bidders[bidder].state {
            BidderState::Happy => {
                self.bidders[bidder].state = BidderState::Unsaturated;
                queue.push_back(bidder);
            }
            // already queued
            BidderState::Unsaturated => {}
            BidderState::Permanent => trace!("permanent bidder {} evicted", bidder),
        }
        Ok(())
    }

    #[inline]
    fn check_price(&self, object: usize, price: f64) -> Result<()> {
        if self.variant == Variant::BFactor && price > self.price_threshold {
            let msg = format!(
                "price {} of object {} exceeds {}, capacities can't be saturated",
                price, object, self.price_threshold
            );
            warn!("{}", msg);
            bail!(AuctionError::InfeasibleCapacity(msg));
        }
        Ok(())
    }

    /// Checks that bidders and copies point at each other.
    fn check_back_pointers(&self) -> Result<()> {
        let mut occupied = 0;
        for (i, bidder) in self.bidders.iter().enumerate() {
            for slot in &bidder.matched {
                let copy = self.objects[slot.object].get(slot.copy);
                if copy.matched.map(|edge| edge.bidder) != Some(i) {
                    return Err(invariant_violation(format!(
                        "bidder {} and copy {} of object {} disagree",
                        i, slot.copy, slot.object
                    )));
                }
                occupied += 1;
            }
        }
        let matched_copies = self
            .objects
            .iter()
            .flat_map(|copies| copies.iter())
            .filter(|copy| copy.matched.is_some())
            .count();
        if matched_copies != occupied {
            return Err(invariant_violation(format!(
                "{} copies are matched but bidders hold {}",
                matched_copies, occupied
            )));
        }
        Ok(())
    }

    /// Writes the matching into `solution` and returns its weight.
    fn collect(&self, solution: &mut BMatchingSolution<I>, eps: f64) -> Result<f64> {
        solution.reset(self.bidders.len());
        let mut total_weight = 0.;
        for (j, copies) in self.objects.iter().enumerate() {
            let column = I::from_usize(j).ok_or_else(|| anyhow!("object index overflow"))?;
            for copy in copies.iter() {
                if let Some(edge) = copy.matched {
                    total_weight += edge.weight;
                    solution.bidder_to_objects[edge.bidder].push((column, edge.weight));
                }
            }
            solution.prices.push(copies.iter().map(|copy| copy.price).collect());
        }

        let num_permanent = self
            .bidders
            .iter()
            .filter(|bidder| bidder.state == BidderState::Permanent)
            .count();
        let num_unsaturated = self
            .bidders
            .iter()
            .zip(self.capacities.left.iter())
            .filter(|&(bidder, &b)| -> bool {
                let b: usize = b.as_();
                bidder.matched.len() < b
            })
            .count();
        solution.num_permanent =
            I::from_usize(num_permanent).ok_or_else(|| anyhow!("bidder count overflow"))?;
        solution.num_unsaturated =
            I::from_usize(num_unsaturated).ok_or_else(|| anyhow!("bidder count overflow"))?;
        solution.eps = eps;
        solution.total_weight = total_weight;
        Ok(total_weight)
    }
}

/// Rejects b-factor instances that fail the counting conditions: both sides must demand
/// the same total and every vertex needs at least `b` eligible edges to objects with
/// capacity.
fn check_b_factor_feasibility<I: UnsignedInt>(
    graph: &BipartiteGraph<I>,
    capacities: &VertexCapacities<I>,
) -> Result<()> {
    let total_left = capacities.total_left();
    let total_right = capacities.total_right();
    ensure!(
        total_left == total_right,
        AuctionError::InfeasibleCapacity(format!(
            "left side demands {} matches, right side offers {}",
            total_left, total_right
        ))
    );
    for row in num_iter::range(I::zero(), graph.left_count()) {
        let row_usize: usize = row.as_();
        let b: usize = capacities.left[row_usize].as_();
        let reachable = graph
            .neighbors(row)
            .filter(|&(column, w)| {
                let j: usize = column.as_();
                w >= 0. && capacities.right[j] > I::zero()
            })
            .count();
        ensure!(
            reachable >= b,
            AuctionError::InfeasibleCapacity(format!(
                "bidder {} has capacity {} but {} usable edges",
                row, b, reachable
            ))
        );
    }
    for (j, degree) in graph.right_degrees().into_iter().enumerate() {
        let b: usize = capacities.right[j].as_();
        ensure!(
            degree >= b,
            AuctionError::InfeasibleCapacity(format!(
                "object {} has capacity {} but {} eligible edges",
                j, b, degree
            ))
        );
    }
    Ok(())
}

/// Auction solver for one of the two problem variants.
#[derive(Debug, Clone)]
pub struct AuctionSolver {
    variant: Variant,
    pub config: AuctionConfig,
    /// bids processed by the last solve
    pub nits: u64,
    /// epsilon reductions performed by the last solve
    pub nreductions: u32,
}

impl AuctionSolver {
    const REDUCTION_FACTOR: f64 = 0.15;

    pub fn new(variant: Variant, config: AuctionConfig) -> Self {
        AuctionSolver {
            variant,
            config,
            nits: 0,
            nreductions: 0,
        }
    }

    pub fn b_matching(config: AuctionConfig) -> Self {
        Self::new(Variant::BMatching, config)
    }

    pub fn b_factor(config: AuctionConfig) -> Self {
        Self::new(Variant::BFactor, config)
    }

    #[inline]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    fn start_epsilon(&self) -> f64 {
        let target_eps = self.config.epsilon;
        match (self.variant, self.config.start_epsilon) {
            (Variant::BFactor, Some(eps)) if eps > target_eps => eps,
            (Variant::BMatching, Some(_)) => {
                // permanent bidders of a coarse phase would never bid again
                info!("Disabling epsilon scaling for the b-matching auction");
                target_eps
            }
            _ => target_eps,
        }
    }

    fn run<I: UnsignedInt>(
        &mut self,
        graph: &BipartiteGraph<I>,
        capacities: &VertexCapacities<I>,
        solution: &mut BMatchingSolution<I>,
        start: Instant,
    ) -> Result<AlgResult> {
        self.config.validate()?;
        self.validate_input(graph, capacities)?;
        if self.variant == Variant::BFactor {
            check_b_factor_feasibility(graph, capacities)?;
        }

        let target_eps = self.config.epsilon;
        let mut eps = self.start_epsilon();

        // a price past the phase threshold means some bidder can't be placed
        let (w_min, w_max) = graph.eligible_weight_range().unwrap_or((0., 0.));
        let mut market = Market::new(graph, capacities, self.variant)?;
        let mut order: Vec<usize> = (0..capacities.left.len()).collect();
        let mut rng = match self.config.order {
            BidderOrder::Fifo => None,
            BidderOrder::Shuffled { seed } => Some(ChaCha8Rng::seed_from_u64(seed)),
        };
        if let Some(rng) = rng.as_mut() {
            order.shuffle(rng);
        }
        let mut deadline = Deadline {
            nits: 0,
            max_iterations: self.config.max_iterations,
            stop_at: self.config.time_limit.map(|limit| start + limit),
        };
        let init_time = start.elapsed().as_secs_f64();

        loop {
            debug!("{:?} auction phase, eps {}", self.variant, eps);
            market.set_price_threshold(w_min, w_max, eps);
            let phase = market.run_phase(eps, &order, &mut deadline);
            self.nits = deadline.nits;
            phase?;
            if eps <= target_eps {
                break;
            }

            eps = (eps * Self::REDUCTION_FACTOR).max(target_eps);
            trace!("REDUCTION: eps {}", eps);
            self.nreductions += 1;
            market.reset_assignments();
            if let Some(rng) = rng.as_mut() {
                order.shuffle(rng);
            }
        }

        market.check_back_pointers()?;
        let total_weight = market.collect(solution, eps)?;
        let total_time = start.elapsed().as_secs_f64();
        debug!(
            "OBJECTIVE: {}, nits {}, nreductions {}, permanent {}, unsaturated {}",
            total_weight,
            self.nits,
            self.nreductions,
            solution.num_permanent,
            solution.num_unsaturated
        );
        Ok(AlgResult::new(total_time, init_time, total_weight))
    }
}

impl<I: UnsignedInt> BMatchingSolver<I> for AuctionSolver {
    fn name(&self) -> &'static str {
        match self.variant {
            Variant::BMatching => "b-matching auction",
            Variant::BFactor => "b-factor auction",
        }
    }

    fn is_perfect(&self) -> bool {
        self.variant == Variant::BFactor
    }

    fn solve(
        &mut self,
        graph: &BipartiteGraph<I>,
        capacities: &VertexCapacities<I>,
        solution: &mut BMatchingSolution<I>,
    ) -> Result<AlgResult, anyhow::Error> {
        let start = Instant::now();
        self.nits = 0;
        self.nreductions = 0;
        self.run(graph, capacities, solution, start)
    }
}
