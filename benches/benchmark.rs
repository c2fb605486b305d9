use auction_b_matching::{
    AuctionConfig, AuctionSolver, BMatchingSolution, BMatchingSolver, BidderOrder, BipartiteGraph,
    GreedySolver, VertexCapacities,
};
use criterion::BenchmarkId;
use criterion::Throughput;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, SamplingMode};
use rand::distributions::{Bernoulli, Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::Beta;
use reservoir_sampling::unweighted::core::r as reservoir_sample;

type UInt = u32;

/// Square graph with the given density that contains a random perfect matching.
fn gen_square_input(
    seed: u64,
    size: UInt,
    density: f64,
    min_value: f64,
    max_value: f64,
) -> BipartiteGraph<UInt> {
    let mut val_rng = ChaCha8Rng::seed_from_u64(seed);
    let mut filter_rng = ChaCha8Rng::seed_from_u64(seed + 1);

    let between = Uniform::from(min_value..max_value);
    let num_of_arcs_fully_dense = (size as u32).pow(2);
    let target_elements_from_prng = ((num_of_arcs_fully_dense as f64) * density) as u32;
    let whether_to_add = Bernoulli::from_ratio(target_elements_from_prng, num_of_arcs_fully_dense)
        .expect("unexpected error");
    let mut ensured_i_to_j = (0..size).collect::<Vec<UInt>>();
    ensured_i_to_j.as_mut_slice().shuffle(&mut filter_rng);

    let mut graph = BipartiteGraph::new(size as usize, (target_elements_from_prng + size) as usize);
    graph.init(size, size).unwrap();
    (0..size)
        .flat_map(|i| (0..size).map(move |j| (i, j)))
        .for_each(|(i, j)| {
            if whether_to_add.sample(&mut filter_rng) || (ensured_i_to_j[i as usize] == j) {
                let v = between.sample(&mut val_rng);
                graph.add_value(i, j, v).unwrap();
            }
        });
    graph
}

fn gen_sparse_input(
    seed: u64,
    num_of_people: UInt,
    num_of_objects: UInt,
    arcs_per_person: UInt,
    min_value: f64,
    range_width: f64,
) -> BipartiteGraph<UInt> {
    let mut val_rng = ChaCha8Rng::seed_from_u64(seed);
    let mut filter_rng = ChaCha8Rng::seed_from_u64(seed + 1);
    let beta = Beta::new(3.0, 3.0).unwrap();

    let mut graph = BipartiteGraph::new(
        num_of_people as usize,
        (num_of_people * arcs_per_person) as usize,
    );
    graph.init(num_of_people, num_of_objects).unwrap();
    (0..num_of_people)
        .map(|i| {
            let mut j_samples = vec![0; arcs_per_person as usize];
            reservoir_sample(0..num_of_objects, j_samples.as_mut_slice(), &mut filter_rng);
            j_samples.sort_unstable();
            (i, j_samples)
        })
        .for_each(|(i, j_samples)| {
            let j_values = j_samples
                .iter()
                .map(|_| (range_width * beta.sample(&mut val_rng) + min_value).floor())
                .collect::<Vec<_>>();
            graph
                .extend_from_values(i, j_samples.as_slice(), j_values.as_slice())
                .unwrap();
        });
    graph
}

fn bench_solver<S: BMatchingSolver<UInt> + Clone>(
    group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>,
    benchmark_id: BenchmarkId,
    solver: &S,
    graph: &BipartiteGraph<UInt>,
    capacities: &VertexCapacities<UInt>,
) {
    let input = (solver.clone(), BMatchingSolution::new(0, 0));
    group.bench_with_input(benchmark_id, &input, |b, input| {
        b.iter_batched(
            || input.clone(),
            |(mut solver, mut solution)| {
                if let Err(err) = solver.solve(graph, capacities, &mut solution) {
                    println!("{} failed: {}", solver.name(), err);
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_b_factor_density_and_size(c: &mut Criterion, max_density_percent: UInt, max_size: UInt) {
    let mut group = c.benchmark_group("b_factor_random_degree");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);

    let mut config = AuctionConfig::with_epsilon(0.5);
    config.start_epsilon = Some(100.);
    config.order = BidderOrder::Shuffled { seed: 7 };
    let auction = AuctionSolver::b_factor(config);

    for density in (1..=max_density_percent).map(|i| i as f64 * 0.01) {
        for size in (1000..=max_size).step_by(1000) {
            let graph = gen_square_input(size as u64, size, density, 500.0, 1000.0);
            let capacities = VertexCapacities::constant(&graph, 1);
            group.throughput(Throughput::Elements(graph.num_of_arcs() as u64));
            let benchmark_id =
                BenchmarkId::new("auction", format!("density {} size {}", density, size));
            bench_solver(&mut group, benchmark_id, &auction, &graph, &capacities);
        }
    }
    group.finish();
}

fn bench_b_matching_num_of_people_and_arcs_per_person(
    c: &mut Criterion,
    max_num_of_people: UInt,
    max_arcs_per_person: UInt,
) {
    let mut group = c.benchmark_group("b_matching_ksparse");
    let num_of_objects = 6000;
    group.sampling_mode(SamplingMode::Flat);

    let auction = AuctionSolver::b_matching(AuctionConfig::default());
    let greedy = GreedySolver::new();
    let mut capacity_rng = ChaCha8Rng::seed_from_u64(0);

    for num_of_people in (100..=max_num_of_people).step_by(200) {
        for arcs_per_person in (32..=max_arcs_per_person).step_by(8) {
            let graph = gen_sparse_input(
                num_of_people as u64,
                num_of_people,
                num_of_objects,
                arcs_per_person,
                300.0,
                700.0,
            );
            let capacities = VertexCapacities::uniform(&graph, 1, 10, &mut capacity_rng).unwrap();
            group.throughput(Throughput::Elements(graph.num_of_arcs() as u64));
            let parameters = format!(
                "num_of_people {}, num_of_objects {}, arcs_per_person {}",
                num_of_people, num_of_objects, arcs_per_person
            );
            bench_solver(
                &mut group,
                BenchmarkId::new("auction", &parameters),
                &auction,
                &graph,
                &capacities,
            );
            bench_solver(
                &mut group,
                BenchmarkId::new("greedy", &parameters),
                &greedy,
                &graph,
                &capacities,
            );
        }
    }
    group.finish();
}

fn bench_b_factor_density_1_size_5000(c: &mut Criterion) {
    bench_b_factor_density_and_size(c, 1, 5000)
}

fn bench_b_matching_num_of_people_2000_arcs_per_person_32(c: &mut Criterion) {
    bench_b_matching_num_of_people_and_arcs_per_person(c, 2000, 32)
}

criterion_group!(
    benches,
    bench_b_factor_density_1_size_5000,
    bench_b_matching_num_of_people_2000_arcs_per_person_32
);
criterion_main!(benches);
