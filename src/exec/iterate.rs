//! Per-block cursor over the iteration space and the block sweep.

use log::trace;

use crate::compose::{CachePolicy, CacheScope};
use crate::stencil::{Accessor, Extent};
use crate::storage::Float;

use super::cache::{ColumnRing, PlaneTile};
use super::plan::{CachePlan, CompiledBody, MultistagePlan, StagePlan};
use super::program::{Eval, PointAccess};
use super::stats::AccessStats;
use super::view::{FieldView, LocalDomain};

/// An inclusive rectangle of the horizontal compute region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub i: (usize, usize),
    pub j: (usize, usize),
}

impl Block {
    pub fn ni(&self) -> usize {
        self.i.1 - self.i.0 + 1
    }

    pub fn nj(&self) -> usize {
        self.j.1 - self.j.0 + 1
    }

    pub fn contains(&self, i: isize, j: isize) -> bool {
        i >= self.i.0 as isize && i <= self.i.1 as isize && j >= self.j.0 as isize && j <= self.j.1 as isize
    }

    /// Signed inclusive bounds grown by a horizontal extent.
    pub fn extended(&self, e: Extent) -> ((isize, isize), (isize, isize)) {
        (
            (self.i.0 as isize - e.iminus as isize, self.i.1 as isize + e.iplus as isize),
            (self.j.0 as isize - e.jminus as isize, self.j.1 as isize + e.jplus as isize),
        )
    }
}

enum Tile<T> {
    Plane(PlaneTile<T>),
    Column(ColumnRing<T>),
}

/// Cursor, cache tiles and counters of one block.
pub(crate) struct IterateDomain<'a, T: Float> {
    local: &'a LocalDomain<T>,
    plan: &'a MultistagePlan<T>,
    block: Block,
    pos: [isize; 3],
    args: &'a [usize],
    cache_of: Vec<Option<usize>>,
    tiles: Vec<Tile<T>>,
    stats: AccessStats,
}

impl<'a, T: Float> IterateDomain<'a, T> {
    pub(crate) fn new(local: &'a LocalDomain<T>, plan: &'a MultistagePlan<T>, block: Block) -> Self {
        let mut cache_of = vec![None; plan.readonly.len()];
        let mut tiles = Vec::with_capacity(plan.caches.len());
        for (n, cache) in plan.caches.iter().enumerate() {
            cache_of[cache.arg] = Some(n);
            tiles.push(Self::allocate(cache, &block, plan));
        }
        Self {
            local,
            plan,
            block,
            pos: [0; 3],
            args: &[],
            cache_of,
            tiles,
            stats: AccessStats::default(),
        }
    }

    fn allocate(cache: &CachePlan, block: &Block, plan: &MultistagePlan<T>) -> Tile<T> {
        let h = cache.halo;
        let ((i0, i1), (j0, j1)) = block.extended(h);
        let ni = (i1 - i0 + 1) as usize;
        let nj = (j1 - j0 + 1) as usize;
        match cache.scope {
            CacheScope::IJ => Tile::Plane(PlaneTile::new([i0, j0, 0], [ni, nj, 1])),
            CacheScope::IJK => {
                let k0 = plan.k_range.first as isize - h.kminus as isize;
                let nk = plan.k_range.len() + (h.kminus + h.kplus) as usize;
                Tile::Plane(PlaneTile::new([i0, j0, k0], [ni, nj, nk]))
            }
            CacheScope::K => Tile::Column(ColumnRing::new(
                [block.i.0 as isize, block.j.0 as isize],
                [block.ni(), block.nj()],
                (h.kminus + h.kplus + 1) as usize,
            )),
        }
    }

    fn count_fills(&mut self, arg: usize, n: u64) {
        if self.plan.readonly[arg] {
            self.stats.readonly_reads += n;
        } else {
            self.stats.memory_reads += n;
        }
        self.stats.fills += n;
    }

    // ─── Cache synchronisation ──────────────────────────────────────

    /// IJK fills before the block's first level.
    pub(crate) fn begin_block(&mut self) {
        for n in 0..self.tiles.len() {
            let cache = self.plan.caches[n];
            if cache.scope != CacheScope::IJK || cache.policy != CachePolicy::Fill {
                continue;
            }
            let view = *self.local.view(cache.arg, 0);
            let mut loaded = 0u64;
            if let Tile::Plane(tile) = &mut self.tiles[n] {
                let columns: Vec<_> = tile.columns().collect();
                for k in tile.levels() {
                    if !view.holds_level(k) {
                        continue;
                    }
                    for &(i, j) in &columns {
                        tile.load(i, j, k, view.read(i, j, k));
                        loaded += 1;
                    }
                }
            }
            self.count_fills(cache.arg, loaded);
            trace!("block {:?}: ijk fill of arg {} ({} points)", self.block, cache.arg, loaded);
        }
    }

    /// IJ retarget/fill and K window shift for level `k`.
    pub(crate) fn begin_level(&mut self, k: usize) {
        let k = k as isize;
        for n in 0..self.tiles.len() {
            let cache = self.plan.caches[n];
            let view = *self.local.view(cache.arg, 0);
            let mut loaded = 0u64;
            let mut stored = 0u64;
            match &mut self.tiles[n] {
                Tile::Plane(tile) if cache.scope == CacheScope::IJ => {
                    tile.retarget(k);
                    if cache.policy == CachePolicy::Fill && view.holds_level(k) {
                        let columns: Vec<_> = tile.columns().collect();
                        for (i, j) in columns {
                            tile.load(i, j, k, view.read(i, j, k));
                            loaded += 1;
                        }
                    }
                }
                Tile::Plane(_) => {}
                Tile::Column(ring) => {
                    let lo = k - cache.halo.kminus as isize;
                    let hi = k + cache.halo.kplus as isize;
                    for level in ring.window() {
                        if level < lo || level > hi {
                            stored += retire_level(ring, &view, &self.block, cache.policy, level);
                        }
                    }
                    for level in lo..=hi {
                        if ring.holds(level) {
                            continue;
                        }
                        ring.claim(level);
                        if cache.policy == CachePolicy::Fill && view.holds_level(level) {
                            let columns: Vec<_> = ring.columns().collect();
                            for (i, j) in columns {
                                ring.load(i, j, level, view.read(i, j, level));
                                loaded += 1;
                            }
                        }
                    }
                }
            }
            self.count_fills(cache.arg, loaded);
            self.stats.memory_writes += stored;
            self.stats.flushes += stored;
        }
    }

    /// IJ flushes after level `k`.
    pub(crate) fn end_level(&mut self, k: usize) {
        let k = k as isize;
        for n in 0..self.tiles.len() {
            let cache = self.plan.caches[n];
            if cache.scope != CacheScope::IJ || cache.policy != CachePolicy::Flush {
                continue;
            }
            let view = *self.local.view(cache.arg, 0);
            let mut stored = 0;
            if let Tile::Plane(tile) = &self.tiles[n] {
                let columns: Vec<_> = tile.columns().collect();
                for (i, j) in columns {
                    if self.block.contains(i, j) && tile.is_dirty(i, j, k) {
                        view.write(i, j, k, tile.get(i, j, k));
                        stored += 1;
                    }
                }
            }
            self.stats.memory_writes += stored;
            self.stats.flushes += stored;
        }
    }

    /// K window and IJK flushes after the block's last level.
    pub(crate) fn end_block(&mut self) {
        for n in 0..self.tiles.len() {
            let cache = self.plan.caches[n];
            let view = *self.local.view(cache.arg, 0);
            let mut stored = 0;
            match &mut self.tiles[n] {
                Tile::Column(ring) => {
                    for level in ring.window() {
                        stored += retire_level(ring, &view, &self.block, cache.policy, level);
                    }
                }
                Tile::Plane(tile) if cache.scope == CacheScope::IJK && cache.policy == CachePolicy::Flush => {
                    let columns: Vec<_> = tile.columns().collect();
                    for k in tile.levels() {
                        for &(i, j) in &columns {
                            if self.block.contains(i, j) && tile.is_dirty(i, j, k) {
                                view.write(i, j, k, tile.get(i, j, k));
                                stored += 1;
                            }
                        }
                    }
                }
                Tile::Plane(_) => {}
            }
            if stored > 0 {
                trace!("block {:?}: flushed {} points of arg {}", self.block, stored, cache.arg);
            }
            self.stats.memory_writes += stored;
            self.stats.flushes += stored;
        }
    }

    // ─── Sweep ──────────────────────────────────────────────────────

    /// Run every stage selected at level `k` over the block grown by the
    /// stage's compute extent.
    pub(crate) fn sweep_level(&mut self, k: usize, stack: &mut Vec<T>, synchronize: bool) {
        let plan = self.plan;
        let mut ran = 0;
        for stage in &plan.stages {
            let Some(overload) = stage.table.lookup(k) else {
                continue;
            };
            if synchronize && ran > 0 {
                self.stats.barriers += 1;
            }
            self.sweep_stage(stage, &stage.bodies[overload], k, stack);
            ran += 1;
        }
    }

    fn sweep_stage(&mut self, stage: &'a StagePlan<T>, body: &'a CompiledBody<T>, k: usize, stack: &mut Vec<T>) {
        self.args = &stage.args;
        let ((i0, i1), (j0, j1)) = self.block.extended(stage.extent);
        for i in i0..=i1 {
            for j in j0..=j1 {
                self.pos = [i, j, k as isize];
                self.stats.points += 1;
                match body {
                    CompiledBody::Program(program) => program.run(self, stack),
                    CompiledBody::Native(f) => f(&mut Eval::new(self, &stage.writable)),
                }
            }
        }
    }

    pub(crate) fn into_stats(self) -> AccessStats {
        self.stats
    }
}

/// Write back the dirty interior points of `level` (Flush) and free its
/// slot. Returns the number of points written.
fn retire_level<T: Float>(
    ring: &mut ColumnRing<T>,
    view: &FieldView<T>,
    block: &Block,
    policy: CachePolicy,
    level: isize,
) -> u64 {
    let mut stored = 0;
    if policy == CachePolicy::Flush {
        let columns: Vec<_> = ring.columns().collect();
        for (i, j) in columns {
            if block.contains(i, j) && ring.is_dirty(i, j, level) {
                view.write(i, j, level, ring.get(i, j, level));
                stored += 1;
            }
        }
    }
    ring.release(level);
    stored
}

impl<'a, T: Float> PointAccess<T> for IterateDomain<'a, T> {
    #[inline]
    fn load(&mut self, acc: &Accessor) -> T {
        let arg = self.args[acc.param];
        let i = self.pos[0] + acc.offset[0] as isize;
        let j = self.pos[1] + acc.offset[1] as isize;
        let k = self.pos[2] + acc.offset[2] as isize;
        if acc.snapshot == 0 {
            if let Some(n) = self.cache_of[arg] {
                self.stats.cache_reads += 1;
                return match &self.tiles[n] {
                    Tile::Plane(tile) => tile.get(i, j, k),
                    Tile::Column(ring) => ring.get(i, j, k),
                };
            }
        }
        if self.plan.readonly[arg] {
            self.stats.readonly_reads += 1;
        } else {
            self.stats.memory_reads += 1;
        }
        self.local.view(arg, acc.snapshot).read(i, j, k)
    }

    #[inline]
    fn store(&mut self, param: usize, value: T) {
        let arg = self.args[param];
        let [i, j, k] = self.pos;
        if let Some(n) = self.cache_of[arg] {
            self.stats.cache_writes += 1;
            match &mut self.tiles[n] {
                Tile::Plane(tile) => tile.set(i, j, k, value),
                Tile::Column(ring) => ring.set(i, j, k, value),
            }
            if self.plan.caches[n].policy != CachePolicy::Fill {
                return;
            }
        }
        self.stats.memory_writes += 1;
        self.local.view(arg, 0).write(i, j, k, value);
    }

    fn position(&self) -> [isize; 3] {
        self.pos
    }
}

/// Sweep one block through a whole multistage.
///
/// With `synchronize`, the cooperative fill at each level and the hand-off
/// between consecutive stages each count one block barrier.
pub(crate) fn run_block<T: Float>(
    local: &LocalDomain<T>,
    plan: &MultistagePlan<T>,
    block: Block,
    synchronize: bool,
) -> AccessStats {
    let mut it = IterateDomain::new(local, plan, block);
    let mut stack = Vec::with_capacity(plan.max_stack);
    it.begin_block();
    for k in plan.order.levels(plan.k_range.first, plan.k_range.last) {
        it.begin_level(k);
        if synchronize {
            it.stats.barriers += 1;
        }
        it.sweep_level(k, &mut stack, synchronize);
        it.end_level(k);
    }
    it.end_block();
    it.into_stats()
}
