use log::{debug, info};
use rayon::prelude::*;

use crate::compose::Multistage;
use crate::diagnostic::Diagnostic;
use crate::domain::{Domain, Placeholder};
use crate::grid::Grid;
use crate::kernel::{KernelArg, KernelCache, KernelMultistage, KernelOverload, KernelPlan, KernelStage};
use crate::span::Span;
use crate::stencil::Body;
use crate::storage::{Float, Storage, StorageInfo};

use super::backend::{create_backend, Backend, BackendConfig};
use super::iterate::run_block;
use super::plan::MultistagePlan;
use super::setup::analyze;
use super::stats::AccessStats;
use super::view::LocalDomain;

/// Lifecycle of a computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    /// Setup analysis passed; plans are built.
    Ready,
    /// Temporaries and the worker pool are allocated; `run` may be called.
    Steady,
    Running,
    Finalized,
}

/// A complete stencil computation: domain, grid, multistages and backend.
pub struct Computation<T: Float> {
    state: State,
    config: BackendConfig,
    backend: Box<dyn Backend>,
    domain: Domain<T>,
    grid: Grid,
    multistages: Vec<Multistage<T>>,
    plans: Vec<MultistagePlan<T>>,
    warnings: Vec<Diagnostic>,
    pool: Option<rayon::ThreadPool>,
    stats: AccessStats,
    runs: u64,
}

/// Assemble a computation. Nothing is checked until `ready()`.
pub fn make_computation<T: Float>(
    config: BackendConfig,
    domain: Domain<T>,
    grid: Grid,
    multistages: Vec<Multistage<T>>,
) -> Computation<T> {
    Computation {
        state: State::Uninitialized,
        backend: create_backend(&config),
        config,
        domain,
        grid,
        multistages,
        plans: Vec::new(),
        warnings: Vec::new(),
        pool: None,
        stats: AccessStats::default(),
        runs: 0,
    }
}

impl<T: Float> Computation<T> {
    fn expect_state(&self, expected: State, call: &str) -> Result<(), Diagnostic> {
        if self.state == expected {
            return Ok(());
        }
        Err(Diagnostic::error(
            format!("{}() called on a computation in state {:?}", call, self.state),
            Span::dummy(),
        )
        .with_note(format!("{}() requires state {:?}", call, expected)))
    }

    /// Run every setup check and build the executable plans.
    pub fn ready(&mut self) -> Result<(), Vec<Diagnostic>> {
        self.expect_state(State::Uninitialized, "ready").map_err(|e| vec![e])?;
        let setup = analyze(
            &self.domain,
            &self.grid,
            &self.multistages,
            self.backend.read_only_path(),
        )?;
        self.plans = setup.plans;
        self.warnings = setup.warnings;
        self.state = State::Ready;
        info!(
            "computation ready: {} multistages on {} ({} warnings)",
            self.plans.len(),
            self.backend.name(),
            self.warnings.len()
        );
        Ok(())
    }

    /// Allocate temporaries and the worker pool.
    pub fn steady(&mut self) -> Result<(), Diagnostic> {
        self.expect_state(State::Ready, "steady")?;
        let info = StorageInfo::new(self.grid.storage_dims(), self.backend.layout())?;
        let temporaries: Vec<Placeholder> = self
            .domain
            .placeholders()
            .iter()
            .filter(|p| p.is_temporary())
            .cloned()
            .collect();
        for p in &temporaries {
            self.domain
                .install_temporary(p.index(), Storage::temporary(p.name(), info));
        }
        if self.backend.parallel() {
            let mut builder = rayon::ThreadPoolBuilder::new();
            if let Some(n) = self.config.threads {
                builder = builder.num_threads(n);
            }
            let pool = builder.build().map_err(|e| {
                Diagnostic::error(format!("cannot start worker pool: {}", e), Span::dummy())
            })?;
            debug!("worker pool with {} threads", pool.current_num_threads());
            self.pool = Some(pool);
        }
        self.state = State::Steady;
        info!(
            "computation steady: {} temporaries allocated",
            temporaries.len()
        );
        Ok(())
    }

    /// Execute every multistage once, in declaration order. May be called
    /// repeatedly.
    pub fn run(&mut self) -> Result<AccessStats, Diagnostic> {
        self.expect_state(State::Steady, "run")?;
        self.state = State::Running;

        let local = LocalDomain::build(&mut self.domain);
        let blocks = self.backend.partition(&self.grid);
        let synchronize = self.backend.synchronizes_blocks();
        let mut total = AccessStats::default();

        for plan in &self.plans {
            let stats = match (&self.pool, self.backend.parallel()) {
                (Some(pool), true) => pool.install(|| {
                    blocks
                        .par_iter()
                        .map(|&block| run_block(&local, plan, block, synchronize))
                        .reduce(AccessStats::default, |a, b| a + b)
                }),
                _ => blocks
                    .iter()
                    .map(|&block| run_block(&local, plan, block, synchronize))
                    .sum(),
            };
            debug!(
                "multistage {}: {} blocks, {} points",
                plan.index,
                blocks.len(),
                stats.points
            );
            total += stats;
        }

        self.stats += total;
        self.runs += 1;
        self.state = State::Steady;
        info!("run {} finished: {} points", self.runs, total.points);
        Ok(total)
    }

    /// Release the worker pool. Storages stay available.
    pub fn finalize(&mut self) -> Result<(), Diagnostic> {
        self.expect_state(State::Steady, "finalize")?;
        self.pool = None;
        self.state = State::Finalized;
        info!("computation finalized after {} runs", self.runs);
        Ok(())
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn domain(&self) -> &Domain<T> {
        &self.domain
    }

    /// Non-fatal setup diagnostics.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Counters accumulated over every run.
    pub fn stats(&self) -> AccessStats {
        self.stats
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn storage(&self, placeholder: &Placeholder) -> Option<&Storage<T>> {
        self.domain.storage(placeholder)
    }

    /// Mutable access between runs, e.g. to cycle snapshots.
    pub fn storage_mut(&mut self, placeholder: &Placeholder) -> Option<&mut Storage<T>> {
        self.domain.storage_mut(placeholder)
    }

    pub fn into_domain(self) -> Domain<T> {
        self.domain
    }

    /// Description of the computation for kernel generation.
    pub fn kernel_plan(&self) -> Result<KernelPlan, Diagnostic> {
        if self.state == State::Uninitialized {
            return Err(Diagnostic::error(
                "kernel_plan() needs a computation that passed ready()".to_string(),
                Span::dummy(),
            ));
        }
        let temporary_info = StorageInfo::new(self.grid.storage_dims(), self.backend.layout())?;
        let args = self
            .domain
            .placeholders()
            .iter()
            .map(|p| {
                let (info, snapshots) = match self.domain.storage(p) {
                    Some(s) => (*s.info(), s.n_snapshots()),
                    None => (temporary_info, 1),
                };
                KernelArg {
                    name: p.name().to_string(),
                    temporary: p.is_temporary(),
                    dims: info.dims(),
                    strides: info.strides(),
                    snapshots,
                }
            })
            .collect();

        let multistages = self
            .plans
            .iter()
            .zip(&self.multistages)
            .map(|(plan, ms)| KernelMultistage {
                index: plan.index,
                order: plan.order,
                k_range: plan.k_range,
                readonly: plan.readonly.clone(),
                caches: plan
                    .caches
                    .iter()
                    .map(|c| KernelCache {
                        arg: c.arg,
                        scope: c.scope,
                        policy: c.policy,
                        halo: c.halo,
                    })
                    .collect(),
                stages: plan
                    .stages
                    .iter()
                    .zip(&ms.stages)
                    .map(|(sp, stage)| KernelStage {
                        name: sp.name.clone(),
                        args: sp.args.clone(),
                        extent: sp.extent,
                        overloads: stage
                            .functor
                            .overloads()
                            .iter()
                            .enumerate()
                            .map(|(n, o)| KernelOverload {
                                range: sp.table.range(n),
                                body: match &o.body {
                                    Body::Expr(assigns) => Some(assigns.clone()),
                                    Body::Native(_) => None,
                                },
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Ok(KernelPlan {
            value_type: T::C_TYPE,
            grid: self.grid.clone(),
            block: self.config.block,
            args,
            multistages,
        })
    }
}
