use anyhow::Result;
use auction_b_matching::{
    AlgResult, AuctionConfig, AuctionSolver, BMatchingSolution, BMatchingSolver, BidderOrder,
    BipartiteGraph, GreedySolver, MinCostFlowSolver, VertexCapacities,
};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

type UInt = u32;

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Matrix Market file with the bipartite graph
    #[clap(short, long, value_parser)]
    filename: String,

    /// target epsilon of the auction
    #[clap(short, long, value_parser, default_value_t = 0.5, allow_hyphen_values = true)]
    epsilon: f64,

    /// solve the b-factor problem instead of b-matching
    #[clap(short, long, action)]
    perfect: bool,

    /// also run the greedy and min cost flow baselines
    #[clap(short, long, action)]
    compare: bool,

    /// use absolute values of the matrix entries as weights
    #[clap(short, long, action)]
    absvalue: bool,

    #[clap(short, long, action)]
    verbose: bool,

    /// seed for pattern weights, capacities and the bidder order
    #[clap(long, value_parser, default_value_t = 0)]
    seed: u64,

    /// shuffle the bidder queue
    #[clap(long, action)]
    shuffle: bool,

    /// epsilon of the first scaling phase (b-factor only)
    #[clap(long, value_parser)]
    start_epsilon: Option<f64>,

    #[clap(long, value_parser)]
    max_iterations: Option<u64>,
}

fn report(name: &str, result: &AlgResult) {
    println!("{}", name);
    println!("  weight:       {}", result.total_weight);
    println!("  init time:    {:.6} s", result.init_time);
    println!("  running time: {:.6} s", result.running_time());
}

fn run_baseline<S: BMatchingSolver<UInt>>(
    solver: &mut S,
    graph: &BipartiteGraph<UInt>,
    capacities: &VertexCapacities<UInt>,
) {
    let mut solution = BMatchingSolution::new(0, 0);
    match solver.solve(graph, capacities, &mut solution) {
        Ok(result) => report(solver.name(), &result),
        Err(err) => println!("{} failed: {}", solver.name(), err),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let graph = BipartiteGraph::<UInt>::read_mtx_file(&args.filename, args.absvalue, &mut rng)?;
    info!(
        "{}: {} bidders, {} objects, {} edges",
        args.filename,
        graph.left_count(),
        graph.right_count(),
        graph.num_of_arcs()
    );
    let capacities = if args.perfect {
        VertexCapacities::paired_for_b_factor(&graph, &mut rng)?
    } else {
        VertexCapacities::uniform(&graph, 1, 10, &mut rng)?
    };

    let config = AuctionConfig {
        epsilon: args.epsilon,
        start_epsilon: args.start_epsilon,
        order: if args.shuffle {
            BidderOrder::Shuffled { seed: args.seed }
        } else {
            BidderOrder::Fifo
        },
        max_iterations: args.max_iterations,
        time_limit: None,
    };
    let mut auction = if args.perfect {
        AuctionSolver::b_factor(config)
    } else {
        AuctionSolver::b_matching(config)
    };
    let mut solution = BMatchingSolution::new(0, 0);
    let result = auction.solve(&graph, &capacities, &mut solution)?;
    report(BMatchingSolver::<UInt>::name(&auction), &result);
    println!(
        "  nits: {}, nreductions: {}, unsaturated: {}, permanent: {}",
        auction.nits, auction.nreductions, solution.num_unsaturated, solution.num_permanent
    );

    if args.compare {
        if !args.perfect {
            run_baseline(&mut GreedySolver::new(), &graph, &capacities);
        }
        run_baseline(&mut MinCostFlowSolver::new(args.perfect), &graph, &capacities);
    }
    Ok(())
}
