//! Backend throughput on two representative computations.
//!
//! 1. Tridiagonal solve (forward/backward sweeps, no caches)
//! 2. Fourth-order diffusion with the laplacian in a local IJ cache
//!
//! Setup runs once outside the timed loop; each iteration is one `run()`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use gridstencil::compose::{cache, make_multistage, make_stage, CachePolicy, CacheScope, ExecutionOrder};
use gridstencil::domain::Domain;
use gridstencil::exec::{make_computation, BackendConfig, BackendKind, Computation};
use gridstencil::grid::{Grid, Interval, Level};
use gridstencil::solvers::tridiagonal::{thomas_multistages, System};
use gridstencil::stencil::{Accessor, Assign, Extent, Functor, Param};
use gridstencil::storage::Storage;

const ALL: Interval = Interval::new(Level::new(0, -1), Level::new(1, -1));

fn configs() -> [BackendConfig; 3] {
    [
        BackendConfig::new(BackendKind::HostNaive),
        BackendConfig::new(BackendKind::HostBlock).with_block([16, 16]),
        BackendConfig::new(BackendKind::Cuda).with_block([32, 8]),
    ]
}

fn steady(mut computation: Computation<f64>) -> Computation<f64> {
    if let Err(errs) = computation.ready() {
        panic!("setup failed: {:?}", errs.iter().map(|e| &e.message).collect::<Vec<_>>());
    }
    computation.steady().unwrap();
    computation
}

fn tridiagonal(config: BackendConfig, n: usize) -> Computation<f64> {
    let grid = Grid::from_sizes(n, n, 64).unwrap();
    let System { inf, diag, sup, rhs } = System::<f64>::reference(&grid).unwrap();
    let out = Storage::filled("out", grid.storage_dims(), 0.0).unwrap();
    let mut domain = Domain::new();
    for storage in [out, inf, diag, sup, rhs] {
        let p = domain.arg(&storage.name().to_string()).unwrap();
        domain.bind(&p, storage).unwrap();
    }
    let multistages = thomas_multistages(&domain).unwrap();
    steady(make_computation(config, domain, grid, multistages))
}

fn diffusion(config: BackendConfig, n: usize) -> Computation<f64> {
    const OUT: Accessor = Accessor::new(0);
    const IN: Accessor = Accessor::new(1);
    const LAP: Accessor = Accessor::new(2);

    let grid = Grid::with_halo(n, n, 16, 2).unwrap();
    let dims = grid.storage_dims();
    let mut domain = Domain::new();
    let out = domain.arg("out").unwrap();
    let inp = domain.arg("in").unwrap();
    let lap = domain.temporary("lap").unwrap();
    domain.bind(&out, Storage::filled("out", dims, 0.0).unwrap()).unwrap();
    let mut input = Storage::filled("in", dims, 0.0).unwrap();
    input.fill_with(|i, j, k| ((i + 2 * j + 3 * k) % 7) as f64);
    domain.bind(&inp, input).unwrap();

    let around = Extent::horizontal(1, 1, 1, 1);
    let laplacian = Functor::new(
        "laplacian",
        vec![Param::inout("lap"), Param::input("in").with_extent(around)],
    )
    .overload(
        ALL,
        vec![Assign::new(OUT, 4.0 * IN - IN.i(-1) - IN.i(1) - IN.j(-1) - IN.j(1))],
    );
    let diffuse = Functor::new(
        "diffuse",
        vec![
            Param::inout("out"),
            Param::input("in"),
            Param::input("lap").with_extent(around),
        ],
    )
    .overload(
        ALL,
        vec![Assign::new(
            OUT,
            IN - 0.05 * (4.0 * LAP - LAP.i(-1) - LAP.i(1) - LAP.j(-1) - LAP.j(1)),
        )],
    );
    let ms = make_multistage(
        ExecutionOrder::Parallel,
        vec![
            make_stage(laplacian, &[&lap, &inp]),
            make_stage(diffuse, &[&out, &inp, &lap]),
        ],
    )
    .with_caches(cache(CacheScope::IJ, CachePolicy::Local, &[&lap]));
    steady(make_computation(config, domain, grid, vec![ms]))
}

fn bench_tridiagonal(c: &mut Criterion) {
    let mut group = c.benchmark_group("tridiagonal");
    for config in configs() {
        let name = config.kind.as_str();
        let mut computation = tridiagonal(config, 64);
        group.bench_function(BenchmarkId::new(name, "64x64x64"), |b| {
            b.iter(|| black_box(computation.run().unwrap()))
        });
    }
    group.finish();
}

fn bench_diffusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("diffusion");
    for n in [32, 128] {
        for config in configs() {
            let name = config.kind.as_str();
            let mut computation = diffusion(config, n);
            group.bench_function(BenchmarkId::new(name, format!("{}x{}x16", n, n)), |b| {
                b.iter(|| black_box(computation.run().unwrap()))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_tridiagonal, bench_diffusion);
criterion_main!(benches);
