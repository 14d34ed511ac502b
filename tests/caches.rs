use gridstencil::compose::{
    cache, define_caches, make_multistage, make_stage, CachePolicy, CacheScope, ExecutionOrder,
    Multistage,
};
use gridstencil::domain::{Domain, Placeholder};
use gridstencil::exec::{make_computation, AccessStats, BackendConfig, BackendKind, Computation};
use gridstencil::grid::{Grid, Interval, Level};
use gridstencil::stencil::{Accessor, Assign, Extent, Functor, Param};
use gridstencil::storage::Storage;

const OUT: Accessor = Accessor::new(0);
const IN: Accessor = Accessor::new(1);

const ALL: Interval = Interval::new(Level::new(0, -1), Level::new(1, -1));
const BOTTOM: Interval = Interval::at(Level::new(0, -1));
const ABOVE_BOTTOM: Interval = Interval::new(Level::new(0, 1), Level::new(1, -1));
const INNER: Interval = Interval::new(Level::new(0, 1), Level::new(1, -2));

fn laplacian() -> Functor<f64> {
    Functor::new(
        "laplacian",
        vec![
            Param::inout("out"),
            Param::input("in").with_extent(Extent::horizontal(1, 1, 1, 1)),
        ],
    )
    .overload(
        ALL,
        vec![Assign::new(
            OUT,
            4.0 * IN - IN.i(-1) - IN.i(1) - IN.j(-1) - IN.j(1),
        )],
    )
}

fn run(computation: &mut Computation<f64>) -> AccessStats {
    if let Err(errs) = computation.ready() {
        panic!(
            "setup failed: {:?}",
            errs.iter().map(|e| &e.message).collect::<Vec<_>>()
        );
    }
    computation.steady().unwrap();
    let stats = computation.run().unwrap();
    computation.finalize().unwrap();
    stats
}

/// 8x8x2 interior with a one-point halo; `in = i*i + j`, whose
/// laplacian is -2 everywhere.
fn laplacian_computation(config: BackendConfig, cached: bool) -> Computation<f64> {
    let grid = Grid::with_halo(8, 8, 2, 1).unwrap();
    let dims = grid.storage_dims();
    let mut domain = Domain::new();
    let out = domain.arg("out").unwrap();
    let inp = domain.arg("in").unwrap();
    domain.bind(&out, Storage::filled("out", dims, 0.0).unwrap()).unwrap();
    let mut input = Storage::filled("in", dims, 0.0).unwrap();
    input.fill_with(|i, j, _| (i * i + j) as f64);
    domain.bind(&inp, input).unwrap();

    let mut ms = make_multistage(
        ExecutionOrder::Parallel,
        vec![make_stage(laplacian(), &[&out, &inp])],
    );
    if cached {
        ms = ms.with_caches(cache(CacheScope::IJ, CachePolicy::Fill, &[&inp]));
    }
    make_computation(config, domain, grid, vec![ms])
}

fn assert_laplacian(computation: &Computation<f64>) {
    let out = computation.domain().find("out").unwrap();
    let storage = computation.storage(out).unwrap();
    for i in 1..=8 {
        for j in 1..=8 {
            for k in 0..2 {
                assert_eq!(storage.get(i, j, k), -2.0, "at ({}, {}, {})", i, j, k);
            }
        }
    }
    assert_eq!(storage.get(0, 4, 0), 0.0, "halo must stay untouched");
}

// ── IJ caches ──

#[test]
fn test_uncached_laplacian_reads_memory_five_times_per_point() {
    let mut c = laplacian_computation(BackendConfig::new(BackendKind::HostNaive), false);
    let stats = run(&mut c);
    assert_laplacian(&c);
    assert_eq!(stats.points, 128);
    assert_eq!(stats.memory_reads, 5 * 128);
    assert_eq!(stats.memory_writes, 128);
    assert_eq!(stats.cache_reads, 0);
    assert_eq!(stats.fills, 0);
}

#[test]
fn test_ij_fill_reads_each_tile_point_once_per_level() {
    let mut c = laplacian_computation(BackendConfig::new(BackendKind::HostNaive), true);
    let stats = run(&mut c);
    assert_laplacian(&c);
    // one 10x10 tile (block plus halo) per level
    assert_eq!(stats.fills, 2 * 100);
    assert_eq!(stats.memory_reads, 2 * 100);
    assert_eq!(stats.cache_reads, 5 * 128);
    assert_eq!(stats.memory_writes, 128);
}

#[test]
fn test_ij_fill_per_block_tiles() {
    let config = BackendConfig::new(BackendKind::HostBlock).with_block([4, 4]).with_threads(2);
    let mut c = laplacian_computation(config, true);
    let stats = run(&mut c);
    assert_laplacian(&c);
    // four 6x6 tiles per level
    assert_eq!(stats.fills, 2 * 4 * 36);
    assert_eq!(stats.memory_reads, stats.fills);
    assert_eq!(stats.barriers, 0);
}

#[test]
fn test_cuda_fills_through_readonly_path_with_barriers() {
    let config = BackendConfig::new(BackendKind::Cuda).with_block([8, 8]);
    let mut c = laplacian_computation(config, true);
    let stats = run(&mut c);
    assert_laplacian(&c);
    assert_eq!(stats.memory_reads, 0);
    assert_eq!(stats.readonly_reads, 2 * 100);
    // one barrier after the fill at each level of the single block
    assert_eq!(stats.barriers, 2);
}

/// `out`, `in = i*i + j` and a temporary `lap`, in that order.
fn smoothing_domain(grid: &Grid) -> (Domain<f64>, [Placeholder; 3]) {
    let dims = grid.storage_dims();
    let mut domain = Domain::new();
    let out = domain.arg("out").unwrap();
    let inp = domain.arg("in").unwrap();
    let lap = domain.temporary("lap").unwrap();
    domain.bind(&out, Storage::filled("out", dims, 0.0).unwrap()).unwrap();
    let mut input = Storage::filled("in", dims, 0.0).unwrap();
    input.fill_with(|i, j, _| (i * i + j) as f64);
    domain.bind(&inp, input).unwrap();
    (domain, [out, inp, lap])
}

#[test]
fn test_local_temporary_between_stages() {
    // lap = laplacian(in); out = in + 0.5 * (lap[i-1] + lap[i+1])
    let grid = Grid::with_halo(6, 5, 3, 2).unwrap();
    let smooth = Functor::new(
        "smooth",
        vec![
            Param::inout("out"),
            Param::input("in"),
            Param::input("lap").with_extent(Extent::horizontal(1, 1, 0, 0)),
        ],
    )
    .overload(
        ALL,
        vec![Assign::new(
            OUT,
            IN + 0.5 * (Accessor::new(2).i(-1) + Accessor::new(2).i(1)),
        )],
    );

    for config in [
        BackendConfig::new(BackendKind::HostNaive),
        BackendConfig::new(BackendKind::HostBlock).with_block([2, 3]),
        BackendConfig::new(BackendKind::Cuda).with_block([4, 2]),
    ] {
        let synchronizes = config.kind == BackendKind::Cuda;
        let (domain, [out, inp, lap]) = smoothing_domain(&grid);
        let ms = make_multistage(
            ExecutionOrder::Parallel,
            vec![
                make_stage(laplacian(), &[&lap, &inp]),
                make_stage(smooth.clone(), &[&out, &inp, &lap]),
            ],
        )
        .with_caches(cache(CacheScope::IJ, CachePolicy::Local, &[&lap]));

        let mut c = make_computation(config, domain, grid.clone(), vec![ms]);
        let stats = run(&mut c);
        let result = c.storage(&out).unwrap();
        for i in 2..8 {
            for j in 2..7 {
                for k in 0..3 {
                    let expected = (i * i + j) as f64 - 2.0;
                    assert_eq!(result.get(i, j, k), expected, "at ({}, {}, {})", i, j, k);
                }
            }
        }
        // the temporary never reaches memory
        assert_eq!(stats.memory_writes, 6 * 5 * 3);
        if synchronizes {
            // fill barrier plus the hand-off between the two stages, per level
            assert_eq!(stats.barriers % 6, 0);
            assert!(stats.barriers > 0);
        } else {
            assert_eq!(stats.barriers, 0);
        }
    }
}

// ── K and IJK caches ──

fn cumulative_sum(scope: Option<CacheScope>, config: BackendConfig) -> (Storage<f64>, AccessStats) {
    let grid = Grid::from_sizes(3, 2, 5).unwrap();
    let dims = grid.storage_dims();
    let mut domain = Domain::new();
    let out = domain.arg("out").unwrap();
    let inp = domain.arg("in").unwrap();
    domain.bind(&out, Storage::filled("out", dims, 0.0).unwrap()).unwrap();
    domain.bind(&inp, Storage::filled("in", dims, 1.0).unwrap()).unwrap();

    let sum = Functor::new("cumsum", vec![Param::inout("out"), Param::input("in")])
        .overload(BOTTOM, vec![Assign::new(OUT, IN)])
        .overload(ABOVE_BOTTOM, vec![Assign::new(OUT, OUT.k(-1) + IN)]);
    let mut ms = make_multistage(ExecutionOrder::Forward, vec![make_stage(sum, &[&out, &inp])]);
    if let Some(scope) = scope {
        ms = ms.with_caches(cache(scope, CachePolicy::Flush, &[&out]));
    }
    let mut c = make_computation(config, domain, grid, vec![ms]);
    let stats = run(&mut c);
    let mut domain = c.into_domain();
    (domain.take(&out).unwrap(), stats)
}

#[test]
fn test_k_flush_cache_serves_vertical_reads() {
    let (plain, plain_stats) = cumulative_sum(None, BackendConfig::default());
    let (cached, stats) = cumulative_sum(Some(CacheScope::K), BackendConfig::default());
    assert_eq!(plain.data(), cached.data());
    for k in 0..5 {
        assert_eq!(cached.get(2, 1, k), (k + 1) as f64);
    }

    assert_eq!(plain_stats.memory_reads, 30 + 24);
    assert_eq!(stats.memory_reads, 30);
    assert_eq!(stats.cache_reads, 24);
    assert_eq!(stats.cache_writes, 30);
    // every level is written back exactly once as it leaves the window
    assert_eq!(stats.flushes, 30);
    assert_eq!(stats.memory_writes, 30);
}

#[test]
fn test_k_flush_cache_on_blocked_backend() {
    let config = BackendConfig::new(BackendKind::HostBlock).with_block([2, 1]);
    let (cached, stats) = cumulative_sum(Some(CacheScope::K), config);
    assert_eq!(cached.get(0, 0, 4), 5.0);
    assert_eq!(cached.get(2, 1, 2), 3.0);
    assert_eq!(stats.flushes, 30);
}

#[test]
fn test_ijk_fill_cache_loads_the_block_once() {
    let grid = Grid::from_sizes(3, 3, 4).unwrap();
    let dims = grid.storage_dims();
    let mut domain = Domain::new();
    let out = domain.arg("out").unwrap();
    let inp = domain.arg("in").unwrap();
    domain.bind(&out, Storage::filled("out", dims, 0.0).unwrap()).unwrap();
    let mut input = Storage::filled("in", dims, 0.0).unwrap();
    input.fill_with(|_, _, k| k as f64);
    domain.bind(&inp, input).unwrap();

    let vsum = Functor::new("vsum", vec![Param::inout("out"), Param::input("in")])
        .overload(INNER, vec![Assign::new(OUT, IN.k(-1) + IN.k(1))]);
    let ms = make_multistage(ExecutionOrder::Parallel, vec![make_stage(vsum, &[&out, &inp])])
        .with_caches(define_caches([cache(CacheScope::IJK, CachePolicy::Fill, &[&inp])]));
    let mut c = make_computation(BackendConfig::default(), domain, grid, vec![ms]);
    let stats = run(&mut c);

    let result = c.storage(&out).unwrap();
    assert_eq!(result.get(1, 1, 1), 2.0);
    assert_eq!(result.get(2, 0, 2), 4.0);
    assert_eq!(result.get(0, 0, 0), 0.0);
    assert_eq!(result.get(0, 0, 3), 0.0);
    assert_eq!(stats.points, 18);
    assert_eq!(stats.fills, 36);
    assert_eq!(stats.memory_reads, 36);
    assert_eq!(stats.cache_reads, 36);
}

#[test]
fn test_ijk_flush_cache_writes_every_level_once() {
    for config in [
        BackendConfig::new(BackendKind::HostNaive),
        BackendConfig::new(BackendKind::HostBlock).with_block([2, 1]),
        BackendConfig::new(BackendKind::Cuda).with_block([2, 2]),
    ] {
        let readonly = config.kind == BackendKind::Cuda;
        let name = config.kind.as_str();
        let (cached, stats) = cumulative_sum(Some(CacheScope::IJK), config);
        for k in 0..5 {
            assert_eq!(cached.get(1, 1, k), (k + 1) as f64, "{}", name);
        }
        // stores stay in the tile until the block ends
        assert_eq!(stats.cache_writes, 30, "{}", name);
        assert_eq!(stats.cache_reads, 24, "{}", name);
        assert_eq!(stats.flushes, 30, "{}", name);
        assert_eq!(stats.memory_writes, 30, "{}", name);
        assert_eq!(stats.total_memory_reads(), 30, "{}", name);
        assert_eq!(stats.readonly_reads > 0, readonly, "{}", name);
    }
}

/// `in = k` on a 3x3x4 grid; `out = in[k-1] + in[k+1]` on the inner levels.
fn vertical_sum(config: BackendConfig, k_fill: bool) -> (Storage<f64>, AccessStats) {
    let grid = Grid::from_sizes(3, 3, 4).unwrap();
    let dims = grid.storage_dims();
    let mut domain = Domain::new();
    let out = domain.arg("out").unwrap();
    let inp = domain.arg("in").unwrap();
    domain.bind(&out, Storage::filled("out", dims, 0.0).unwrap()).unwrap();
    let mut input = Storage::filled("in", dims, 0.0).unwrap();
    input.fill_with(|_, _, k| k as f64);
    domain.bind(&inp, input).unwrap();

    let vsum = Functor::new("vsum", vec![Param::inout("out"), Param::input("in")])
        .overload(INNER, vec![Assign::new(OUT, IN.k(-1) + IN.k(1))]);
    let mut ms = make_multistage(ExecutionOrder::Forward, vec![make_stage(vsum, &[&out, &inp])]);
    if k_fill {
        ms = ms.with_caches(cache(CacheScope::K, CachePolicy::Fill, &[&inp]));
    }
    let mut c = make_computation(config, domain, grid, vec![ms]);
    let stats = run(&mut c);
    let mut domain = c.into_domain();
    (domain.take(&out).unwrap(), stats)
}

#[test]
fn test_k_fill_cache_loads_each_level_once() {
    let (_, plain_stats) = vertical_sum(BackendConfig::default(), false);
    assert_eq!(plain_stats.memory_reads, 36);
    assert_eq!(plain_stats.cache_reads, 0);

    for config in [
        BackendConfig::new(BackendKind::HostNaive),
        BackendConfig::new(BackendKind::HostBlock).with_block([2, 2]),
        BackendConfig::new(BackendKind::Cuda).with_block([2, 2]),
    ] {
        let name = config.kind.as_str();
        let (cached, stats) = vertical_sum(config, true);
        assert_eq!(cached.get(2, 0, 1), 2.0, "{}", name);
        assert_eq!(cached.get(1, 2, 2), 4.0, "{}", name);
        assert_eq!(cached.get(0, 0, 0), 0.0, "{}", name);
        assert_eq!(cached.get(1, 1, 3), 0.0, "{}", name);
        // levels 0..=3 enter the window once per column; level -1 and 4 are skipped
        assert_eq!(stats.fills, 36, "{}", name);
        assert_eq!(stats.total_memory_reads(), 36, "{}", name);
        assert_eq!(stats.cache_reads, 36, "{}", name);
        assert_eq!(stats.flushes, 0, "{}", name);
        assert_eq!(stats.memory_writes, 18, "{}", name);
    }
}

#[test]
fn test_ij_flush_writes_only_computed_levels() {
    // out = 2 * in and copy = out on the inner levels; out is held in the
    // tile and written back after each level
    for config in [
        BackendConfig::new(BackendKind::HostNaive),
        BackendConfig::new(BackendKind::HostBlock).with_block([2, 2]),
        BackendConfig::new(BackendKind::Cuda).with_block([4, 2]),
    ] {
        let name = config.kind.as_str();
        let readonly = config.kind == BackendKind::Cuda;
        let grid = Grid::from_sizes(4, 3, 5).unwrap();
        let dims = grid.storage_dims();
        let mut domain = Domain::new();
        let out = domain.arg("out").unwrap();
        let inp = domain.arg("in").unwrap();
        let copy = domain.arg("copy").unwrap();
        domain.bind(&out, Storage::filled("out", dims, -1.0).unwrap()).unwrap();
        let mut input = Storage::filled("in", dims, 0.0).unwrap();
        input.fill_with(|i, j, k| (i + 10 * j + 100 * k) as f64);
        domain.bind(&inp, input).unwrap();
        domain.bind(&copy, Storage::filled("copy", dims, 0.0).unwrap()).unwrap();

        let double = Functor::new("double", vec![Param::inout("out"), Param::input("in")])
            .overload(INNER, vec![Assign::new(OUT, 2.0 * IN)]);
        let forward = Functor::new("forward", vec![Param::inout("copy"), Param::input("out")])
            .overload(INNER, vec![Assign::new(OUT, IN)]);
        let ms = make_multistage(
            ExecutionOrder::Parallel,
            vec![
                make_stage(double, &[&out, &inp]),
                make_stage(forward, &[&copy, &out]),
            ],
        )
        .with_caches(cache(CacheScope::IJ, CachePolicy::Flush, &[&out]));
        let mut c = make_computation(config, domain, grid, vec![ms]);
        let stats = run(&mut c);

        let result = c.storage(&out).unwrap();
        let copied = c.storage(&copy).unwrap();
        for i in 0..4 {
            for j in 0..3 {
                assert_eq!(result.get(i, j, 0), -1.0, "{}", name);
                assert_eq!(result.get(i, j, 4), -1.0, "{}", name);
                for k in 1..4 {
                    let expected = 2.0 * (i + 10 * j + 100 * k) as f64;
                    assert_eq!(result.get(i, j, k), expected, "{} at ({}, {}, {})", name, i, j, k);
                    assert_eq!(copied.get(i, j, k), expected, "{} at ({}, {}, {})", name, i, j, k);
                }
            }
        }
        assert_eq!(stats.flushes, 36, "{}", name);
        assert_eq!(stats.cache_writes, 36, "{}", name);
        assert_eq!(stats.cache_reads, 36, "{}", name);
        // 36 flushed points of out plus the 36 stores into copy
        assert_eq!(stats.memory_writes, 72, "{}", name);
        assert_eq!(stats.total_memory_reads(), 36, "{}", name);
        assert_eq!(stats.readonly_reads > 0, readonly, "{}", name);
    }
}

// ── Read-only path ──

#[test]
fn test_bypass_routes_reads_through_memory() {
    let config = || BackendConfig::new(BackendKind::Cuda).with_block([4, 4]);

    let mut routed = laplacian_computation(config(), false);
    let stats = run(&mut routed);
    assert_laplacian(&routed);
    assert_eq!(stats.readonly_reads, 5 * 128);
    assert_eq!(stats.memory_reads, 0);

    let grid = Grid::with_halo(8, 8, 2, 1).unwrap();
    let dims = grid.storage_dims();
    let mut domain = Domain::new();
    let out = domain.arg("out").unwrap();
    let inp = domain.arg("in").unwrap();
    domain.bind(&out, Storage::filled("out", dims, 0.0).unwrap()).unwrap();
    let mut input = Storage::filled("in", dims, 0.0).unwrap();
    input.fill_with(|i, j, _| (i * i + j) as f64);
    domain.bind(&inp, input).unwrap();
    let ms = make_multistage(
        ExecutionOrder::Parallel,
        vec![make_stage(laplacian(), &[&out, &inp])],
    )
    .with_bypass(&[&inp]);
    let mut bypassed = make_computation(config(), domain, grid, vec![ms]);
    let stats = run(&mut bypassed);
    assert_laplacian(&bypassed);
    assert_eq!(stats.readonly_reads, 0);
    assert_eq!(stats.memory_reads, 5 * 128);
}

#[test]
fn test_stats_accumulate_across_runs() {
    let mut c = laplacian_computation(BackendConfig::default(), true);
    c.ready().unwrap();
    c.steady().unwrap();
    let first = c.run().unwrap();
    let second = c.run().unwrap();
    assert_eq!(first, second);
    assert_eq!(c.runs(), 2);
    assert_eq!(c.stats().fills, first.fills * 2);
    c.finalize().unwrap();
}

#[test]
fn test_multistage_clone_keeps_caches() {
    let mut domain: Domain<f64> = Domain::new();
    let out = domain.arg("out").unwrap();
    let inp = domain.arg("in").unwrap();
    let ms: Multistage<f64> = make_multistage(
        ExecutionOrder::Parallel,
        vec![make_stage(laplacian(), &[&out, &inp])],
    )
    .with_caches(cache(CacheScope::IJ, CachePolicy::Fill, &[&inp]));
    let copy = ms.clone();
    assert_eq!(copy.caches, ms.caches);
    assert_eq!(copy.stages.len(), 1);
}
