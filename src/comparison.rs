//! Baselines the auction is measured against: a greedy b-matching and an exact
//! successive-shortest-path min-cost flow.

use crate::capacity::VertexCapacities;
use crate::error::AuctionError;
use crate::graph::BipartiteGraph;
use crate::solution::{AlgResult, BMatchingSolution, UnsignedInt};
use crate::solver::BMatchingSolver;
use anyhow::{anyhow, bail, Result};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Instant;
use tracing::{debug, trace, warn};

fn fill_solution<I: UnsignedInt>(
    solution: &mut BMatchingSolution<I>,
    capacities: &VertexCapacities<I>,
    matches: Vec<Vec<(I, f64)>>,
) -> f64 {
    solution.reset(matches.len());
    let mut total_weight = 0.;
    let mut num_unsaturated = 0;
    for (i, objects) in matches.into_iter().enumerate() {
        let b: usize = capacities.left[i].as_();
        if objects.len() < b {
            num_unsaturated += 1;
        }
        total_weight += objects.iter().map(|&(_, w)| w).sum::<f64>();
        solution.bidder_to_objects[i] = objects;
    }
    solution.num_unsaturated = I::from_usize(num_unsaturated).unwrap_or_else(I::max_value);
    solution.total_weight = total_weight;
    total_weight
}

/// Takes eligible edges by descending weight while both endpoints have spare capacity.
#[derive(Debug, Clone, Default)]
pub struct GreedySolver {}

impl GreedySolver {
    pub fn new() -> Self {
        GreedySolver {}
    }
}

impl<I: UnsignedInt> BMatchingSolver<I> for GreedySolver {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn is_perfect(&self) -> bool {
        false
    }

    fn solve(
        &mut self,
        graph: &BipartiteGraph<I>,
        capacities: &VertexCapacities<I>,
        solution: &mut BMatchingSolution<I>,
    ) -> Result<AlgResult, anyhow::Error> {
        let start = Instant::now();
        self.validate_input(graph, capacities)?;

        let mut edges = Vec::with_capacity(graph.num_of_arcs());
        for row in num_iter::range(I::zero(), graph.left_count()) {
            edges.extend(
                graph
                    .neighbors(row)
                    .filter(|&(_, w)| w >= 0.)
                    .map(|(column, w)| (row, column, w)),
            );
        }
        // stable sort keeps (row, column) order among equal weights
        edges.sort_by(|a, b| b.2.total_cmp(&a.2));
        let init_time = start.elapsed().as_secs_f64();

        let mut left_residual: Vec<usize> =
            capacities.left.iter().map(|&b| -> usize { b.as_() }).collect();
        let mut right_residual: Vec<usize> =
            capacities.right.iter().map(|&b| -> usize { b.as_() }).collect();
        let mut matches = vec![Vec::new(); left_residual.len()];
        for (row, column, w) in edges {
            let i: usize = row.as_();
            let j: usize = column.as_();
            if left_residual[i] > 0 && right_residual[j] > 0 {
                left_residual[i] -= 1;
                right_residual[j] -= 1;
                matches[i].push((column, w));
            }
        }

        let total_weight = fill_solution(solution, capacities, matches);
        debug!("greedy weight {}", total_weight);
        Ok(AlgResult::new(
            start.elapsed().as_secs_f64(),
            init_time,
            total_weight,
        ))
    }
}

#[derive(Copy, Clone, PartialEq)]
struct State {
    dist: f64,
    v: usize,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.v.cmp(&other.v))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Residual arc; its reverse arc sits at index `rev` of the arc list.
#[derive(Debug, Clone)]
struct Arc {
    to: usize,
    capacity: usize,
    cost: f64,
    next: Option<usize>,
    rev: usize,
}

/// Flow network source -> bidders -> objects -> sink in forward star form.
struct FlowNetwork {
    source: usize,
    sink: usize,
    head: Vec<Option<usize>>,
    arcs: Vec<Arc>,
    potential: Vec<f64>,
    dist: Vec<f64>,
    prev_arc: Vec<Option<usize>>,
}

impl FlowNetwork {
    fn new<I: UnsignedInt>(graph: &BipartiteGraph<I>, capacities: &VertexCapacities<I>) -> Self {
        let num_left: usize = graph.left_count().as_();
        let num_right: usize = graph.right_count().as_();
        let node_count = num_left + num_right + 2;
        let mut network = FlowNetwork {
            source: 0,
            sink: node_count - 1,
            head: vec![None; node_count],
            arcs: Vec::with_capacity(2 * (num_left + num_right + graph.num_of_arcs())),
            potential: vec![0.; node_count],
            dist: vec![0.; node_count],
            prev_arc: vec![None; node_count],
        };
        for (i, &b) in capacities.left.iter().enumerate() {
            network.add_arc(network.source, i + 1, b.as_(), 0.);
        }
        for (j, &b) in capacities.right.iter().enumerate() {
            network.add_arc(num_left + 1 + j, network.sink, b.as_(), 0.);
        }
        for row in num_iter::range(I::zero(), graph.left_count()) {
            let i: usize = row.as_();
            for (column, w) in graph.neighbors(row).filter(|&(_, w)| w >= 0.) {
                let j: usize = column.as_();
                // maximizing weight is minimizing its negation
                network.add_arc(i + 1, num_left + 1 + j, 1, -w);
            }
        }
        network
    }

    fn add_arc(&mut self, from: usize, to: usize, capacity: usize, cost: f64) {
        let forward = self.arcs.len();
        let backward = forward + 1;
        self.arcs.push(Arc {
            to,
            capacity,
            cost,
            next: self.head[from],
            rev: backward,
        });
        self.head[from] = Some(forward);
        self.arcs.push(Arc {
            to: from,
            capacity: 0,
            cost: -cost,
            next: self.head[to],
            rev: forward,
        });
        self.head[to] = Some(backward);
    }

    fn out_arcs(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.head[v], move |&a| self.arcs[a].next)
    }

    /// Bellman-Ford from the source, the costs on bidder-object arcs are negative.
    fn init_potentials(&mut self) {
        let node_count = self.head.len();
        self.potential.iter_mut().for_each(|p| *p = f64::INFINITY);
        self.potential[self.source] = 0.;
        for _ in 0..node_count {
            let mut changed = false;
            for v in 0..node_count {
                if self.potential[v] == f64::INFINITY {
                    continue;
                }
                for a in self.out_arcs(v).collect::<Vec<_>>() {
                    let arc = &self.arcs[a];
                    let candidate = self.potential[v] + arc.cost;
                    if arc.capacity > 0 && candidate < self.potential[arc.to] {
                        self.potential[arc.to] = candidate;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        // unreachable nodes stay unreachable
        self.potential
            .iter_mut()
            .filter(|p| p.is_infinite())
            .for_each(|p| *p = 0.);
    }

    /// Dijkstra on reduced costs. Returns the true cost of the shortest source-sink path.
    fn shortest_path(&mut self) -> Option<f64> {
        self.dist.iter_mut().for_each(|d| *d = f64::INFINITY);
        self.prev_arc.iter_mut().for_each(|p| *p = None);
        self.dist[self.source] = 0.;
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(State {
            dist: 0.,
            v: self.source,
        }));
        while let Some(Reverse(State { dist, v })) = heap.pop() {
            if dist > self.dist[v] {
                continue;
            }
            let mut a = self.head[v];
            while let Some(idx) = a {
                let arc = &self.arcs[idx];
                if arc.capacity > 0 {
                    // clamp rounding noise, reduced costs are non-negative in exact arithmetic
                    let reduced = (arc.cost + self.potential[v] - self.potential[arc.to]).max(0.);
                    let candidate = dist + reduced;
                    if candidate < self.dist[arc.to] {
                        self.dist[arc.to] = candidate;
                        self.prev_arc[arc.to] = Some(idx);
                        heap.push(Reverse(State {
                            dist: candidate,
                            v: arc.to,
                        }));
                    }
                }
                a = arc.next;
            }
        }
        if self.dist[self.sink].is_infinite() {
            return None;
        }
        for (p, &d) in self.potential.iter_mut().zip(self.dist.iter()) {
            if d.is_finite() {
                *p += d;
            }
        }
        Some(self.potential[self.sink] - self.potential[self.source])
    }

    /// Pushes the bottleneck amount along the last shortest path.
    fn augment(&mut self, limit: usize) -> usize {
        let mut amount = limit;
        let mut v = self.sink;
        while let Some(a) = self.prev_arc[v] {
            amount = amount.min(self.arcs[a].capacity);
            v = self.arcs[self.arcs[a].rev].to;
        }
        let mut v = self.sink;
        while let Some(a) = self.prev_arc[v] {
            let rev = self.arcs[a].rev;
            self.arcs[a].capacity -= amount;
            self.arcs[rev].capacity += amount;
            v = self.arcs[rev].to;
        }
        amount
    }
}

/// Exact maximum weight b-matching (or b-factor if `perfect`) by successive shortest paths.
#[derive(Debug, Clone)]
pub struct MinCostFlowSolver {
    perfect: bool,
    /// augmenting paths used by the last solve
    pub num_augmentations: usize,
}

impl MinCostFlowSolver {
    pub fn new(perfect: bool) -> Self {
        MinCostFlowSolver {
            perfect,
            num_augmentations: 0,
        }
    }
}

impl<I: UnsignedInt> BMatchingSolver<I> for MinCostFlowSolver {
    fn name(&self) -> &'static str {
        if self.perfect {
            "min cost flow (b-factor)"
        } else {
            "min cost flow"
        }
    }

    fn is_perfect(&self) -> bool {
        self.perfect
    }

    fn solve(
        &mut self,
        graph: &BipartiteGraph<I>,
        capacities: &VertexCapacities<I>,
        solution: &mut BMatchingSolution<I>,
    ) -> Result<AlgResult, anyhow::Error> {
        let start = Instant::now();
        self.validate_input(graph, capacities)?;
        self.num_augmentations = 0;

        let demand = capacities.total_left();
        if self.perfect && demand != capacities.total_right() {
            bail!(AuctionError::InfeasibleCapacity(format!(
                "left side demands {} matches, right side offers {}",
                demand,
                capacities.total_right()
            )));
        }
        let mut network = FlowNetwork::new(graph, capacities);
        network.init_potentials();
        let init_time = start.elapsed().as_secs_f64();

        let mut flow = 0;
        while flow < demand {
            let cost = match network.shortest_path() {
                Some(cost) => cost,
                None => break,
            };
            if !self.perfect && cost >= 0. {
                break;
            }
            flow += network.augment(demand - flow);
            self.num_augmentations += 1;
            trace!("flow {}, path cost {}", flow, cost);
        }
        if self.perfect && flow < demand {
            let msg = format!("only {} of {} units can be routed", flow, demand);
            warn!("{}", msg);
            bail!(AuctionError::InfeasibleCapacity(msg));
        }

        let num_left: usize = graph.left_count().as_();
        let mut matches = vec![Vec::new(); num_left];
        for i in 0..num_left {
            for a in network.out_arcs(i + 1) {
                let arc = &network.arcs[a];
                // saturated bidder-object arcs carry the matching
                if arc.to > num_left && arc.to != network.sink && arc.capacity == 0 && a % 2 == 0 {
                    let column = I::from_usize(arc.to - num_left - 1)
                        .ok_or_else(|| anyhow!("object index overflow"))?;
                    matches[i].push((column, -arc.cost));
                }
            }
            matches[i].sort_by(|a: &(I, f64), b: &(I, f64)| a.0.cmp(&b.0));
        }

        let total_weight = fill_solution(solution, capacities, matches);
        debug!(
            "{} weight {}, {} augmentations",
            <Self as BMatchingSolver<I>>::name(self),
            total_weight,
            self.num_augmentations
        );
        Ok(AlgResult::new(
            start.elapsed().as_secs_f64(),
            init_time,
            total_weight,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{GreedySolver, MinCostFlowSolver};
    use crate::capacity::VertexCapacities;
    use crate::error::{kind, AuctionError};
    use crate::graph::BipartiteGraph;
    use crate::solution::BMatchingSolution;
    use crate::solver::BMatchingSolver;
    use rand::distributions::{Distribution, Uniform};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn brute_force(
        edges: &[(u32, u32, f64)],
        capacities: &VertexCapacities<u32>,
        perfect: bool,
    ) -> Option<f64> {
        let mut best: Option<f64> = None;
        for mask in 0..(1_u32 << edges.len()) {
            let mut left = vec![0; capacities.left.len()];
            let mut right = vec![0; capacities.right.len()];
            let mut weight = 0.;
            for (e, &(i, j, w)) in edges.iter().enumerate() {
                if mask & (1 << e) != 0 {
                    left[i as usize] += 1;
                    right[j as usize] += 1;
                    weight += w;
                }
            }
            let fits = |loads: &[u32], caps: &[u32]| {
                loads
                    .iter()
                    .zip(caps.iter())
                    .all(|(l, b)| l <= b && (!perfect || l == b))
            };
            if fits(&left, &capacities.left) && fits(&right, &capacities.right) {
                best = Some(best.map_or(weight, |b: f64| b.max(weight)));
            }
        }
        best
    }

    #[test]
    fn test_greedy_is_not_optimal() {
        // greedy takes 0-0 first and blocks the better pair of edges
        let edges = [(0, 0, 5.), (0, 1, 4.), (1, 0, 4.)];
        let graph = BipartiteGraph::<u32>::from_edges(2, 2, &edges).unwrap();
        let capacities = VertexCapacities::constant(&graph, 1);
        let mut solution = BMatchingSolution::new(0, 0);

        let greedy = GreedySolver::new().solve(&graph, &capacities, &mut solution).unwrap();
        assert_eq!(greedy.total_weight, 5.);
        assert_eq!(solution.bidder_to_objects, [vec![(0, 5.)], vec![]]);
        assert_eq!(solution.num_unsaturated, 1);

        let exact = MinCostFlowSolver::new(false)
            .solve(&graph, &capacities, &mut solution)
            .unwrap();
        assert_eq!(exact.total_weight, 8.);
        solution.validate(&graph, &capacities, true).unwrap();
    }

    #[test]
    fn test_min_cost_flow_matches_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let weights = Uniform::from(0.0_f64..10.0);
        let caps = Uniform::from(1..3_u32);
        for _ in 0..20 {
            let mut edges = Vec::new();
            for i in 0..3 {
                for j in 0..4 {
                    if edges.len() < 10 && weights.sample(&mut rng) < 6. {
                        edges.push((i, j, weights.sample(&mut rng).round()));
                    }
                }
            }
            let graph = BipartiteGraph::from_edges(3, 4, &edges).unwrap();
            let capacities = VertexCapacities::new(
                (0..3).map(|_| caps.sample(&mut rng)).collect(),
                (0..4).map(|_| caps.sample(&mut rng)).collect(),
            );
            let mut solution = BMatchingSolution::new(0, 0);
            let result = MinCostFlowSolver::new(false)
                .solve(&graph, &capacities, &mut solution)
                .unwrap();
            solution.validate(&graph, &capacities, false).unwrap();
            let expected = brute_force(&edges, &capacities, false).unwrap();
            assert!((result.total_weight - expected).abs() < 1e-9);

            let mut greedy_solution = BMatchingSolution::new(0, 0);
            let greedy = GreedySolver::new()
                .solve(&graph, &capacities, &mut greedy_solution)
                .unwrap();
            greedy_solution.validate(&graph, &capacities, false).unwrap();
            assert!(greedy.total_weight <= expected + 1e-9);
            // greedy is a 1/2-approximation
            assert!(2. * greedy.total_weight >= expected - 1e-9);
        }
    }

    #[test]
    fn test_perfect_min_cost_flow() {
        let edges = [(0, 0, 1.), (0, 1, 9.), (1, 0, 1.), (1, 1, 1.), (2, 1, 3.), (2, 2, 2.)];
        let graph = BipartiteGraph::from_edges(3, 3, &edges).unwrap();
        let capacities = VertexCapacities::new(vec![2, 1, 1], vec![2, 1, 1]);
        let mut solution = BMatchingSolution::new(0, 0);
        let result = MinCostFlowSolver::new(true)
            .solve(&graph, &capacities, &mut solution)
            .unwrap();
        solution.validate(&graph, &capacities, true).unwrap();
        assert_eq!(
            Some(result.total_weight),
            brute_force(&edges, &capacities, true)
        );
        assert_eq!(result.total_weight, 13.);

        let infeasible = VertexCapacities::new(vec![2, 2, 1], vec![2, 1, 2]);
        let err = MinCostFlowSolver::new(true)
            .solve(&graph, &infeasible, &mut solution)
            .unwrap_err();
        assert!(matches!(kind(&err), Some(AuctionError::InfeasibleCapacity(_))));
    }
}
