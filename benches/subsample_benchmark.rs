use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use piggm::PenalizedObjective;
use piggm::SubsampleOptimizer;
use piggm::model::linspace;
use piggm::objective::pack_lower;
use piggm::subsample::{empirical_covariance, initial_half_vector};
use piggm::synthetic::{SyntheticNetwork, SyntheticNetworkBuilder};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn network(variables: usize) -> SyntheticNetwork {
    match SyntheticNetworkBuilder::new(variables)
        .samples(200)
        .seed(0x5EED + variables as u64)
        .build()
    {
        Ok(network) => network,
        Err(e) => panic!("synthetic network for the benchmark: {e}"),
    }
}

fn benchmark_objective(c: &mut Criterion) {
    let mut group = c.benchmark_group("objective_value_and_gradient");
    for variables in [10_usize, 25, 50] {
        let net = network(variables);
        let covariance = empirical_covariance(net.data.view());
        let objective = PenalizedObjective::new(covariance.view(), net.prior.view(), 0.05, 0.02);
        let start = initial_half_vector(covariance.view(), 1e-3)
            .unwrap_or_else(|_| pack_lower(net.precision.view()));

        group.throughput(Throughput::Elements(objective.dimension() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(variables), &start, |b, half| {
            b.iter(|| black_box(objective.value_and_gradient(black_box(half))));
        });
    }
    group.finish();
}

fn benchmark_subsample_run(c: &mut Criterion) {
    let net = network(10);
    let lambdas = linspace(0.01, 0.2, 4);

    let mut group = c.benchmark_group("subsample_optimiser");
    group.sample_size(10);
    for workers in [1_usize, 4] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.iter(|| {
                let mut optimizer = match SubsampleOptimizer::new(net.data.view(), net.prior.view()) {
                    Ok(optimizer) => optimizer.with_workers(Some(workers)),
                    Err(e) => panic!("optimizer setup: {e}"),
                };
                let mut rng = StdRng::seed_from_u64(7);
                black_box(optimizer.subsample_optimiser(100, 8, &lambdas, &mut rng).is_ok())
            });
        });
    }
    group.finish();
}

criterion_group!(subsample, benchmark_objective, benchmark_subsample_run);
criterion_main!(subsample);
