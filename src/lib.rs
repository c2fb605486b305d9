//! Auction algorithms for the weighted b-matching and b-factor problems on sparse
//! bipartite graphs.
//!
//! Left vertices bid for the capacity slots of right vertices. [`AuctionSolver`] runs the
//! b-matching variant (each vertex matched at most `b(v)` times) or the b-factor variant
//! (exactly `b(v)` times), and [`comparison`] holds the greedy and exact min-cost-flow
//! baselines it is measured against.
//!
//! ```
//! use auction_b_matching::{AuctionConfig, AuctionSolver, BMatchingSolution, BMatchingSolver};
//! use auction_b_matching::{BipartiteGraph, VertexCapacities};
//!
//! let graph =
//!     BipartiteGraph::<u32>::from_edges(2, 2, &[(0, 0, 5.), (0, 1, 3.), (1, 0, 2.), (1, 1, 4.)])
//!         .unwrap();
//! let capacities = VertexCapacities::constant(&graph, 1);
//! let mut solver = AuctionSolver::b_matching(AuctionConfig::with_epsilon(0.1));
//! let mut solution = BMatchingSolution::new(2, 2);
//! let result = solver.solve(&graph, &capacities, &mut solution).unwrap();
//! assert_eq!(result.total_weight, 9.);
//! ```

pub mod auction;
pub mod capacity;
pub mod comparison;
pub mod error;
pub mod graph;
pub mod priority_queue;
pub mod solution;
pub mod solver;
pub mod top_k;

pub use crate::auction::{AuctionConfig, AuctionSolver, BidderOrder, Variant};
pub use crate::capacity::VertexCapacities;
pub use crate::comparison::{GreedySolver, MinCostFlowSolver};
pub use crate::error::AuctionError;
pub use crate::graph::BipartiteGraph;
pub use crate::solution::{AlgResult, BMatchingSolution, UnsignedInt};
pub use crate::solver::BMatchingSolver;
