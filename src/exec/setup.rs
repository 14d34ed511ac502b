//! Setup analysis: every structural check runs here, once, before any
//! loop. Produces the executable multistage plans.
//!
//! Hazard rules inside one multistage (blocks run concurrently and sweep
//! their own columns):
//!
//! - a stage whose compute extent is non-zero writes its outputs into the
//!   block's halo, so everything it writes must live in a horizontal
//!   (IJ/IJK) cache with the `local` policy;
//! - a read that reaches neighbouring columns (offset grown by the stage's
//!   compute extent) of an argument written in the same multistage must be
//!   served by a horizontal cache, and every writer must run earlier;
//! - `parallel` multistages may not read written arguments at k offsets;
//! - a temporary written by another multistage is only readable at the
//!   current column, its halo points are never computed.

use log::{debug, warn};

use crate::compose::{Cache, CachePolicy, CacheScope, ExecutionOrder, Multistage};
use crate::diagnostic::Diagnostic;
use crate::domain::Domain;
use crate::grid::{Grid, IntervalTable, KRange};
use crate::span::Span;
use crate::stencil::{Body, Extent, Functor, Intent};
use crate::storage::Float;

use super::plan::{CachePlan, CompiledBody, MultistagePlan, StagePlan};
use super::program::Program;

/// One read of an argument by a stage overload.
#[derive(Clone, Copy, Debug)]
struct Read {
    arg: usize,
    reach: Extent,
    snapshot: usize,
    range: KRange,
    span: Span,
}

/// Everything a stage reads and writes.
struct StageAccess {
    reads: Vec<Read>,
    writes: Vec<usize>,
    span: Span,
}

impl StageAccess {
    fn touches(&self, arg: usize) -> bool {
        self.writes.contains(&arg) || self.reads.iter().any(|r| r.arg == arg)
    }
}

pub(crate) struct Setup<T: Float> {
    pub plans: Vec<MultistagePlan<T>>,
    pub warnings: Vec<Diagnostic>,
}

pub(crate) fn analyze<T: Float>(
    domain: &Domain<T>,
    grid: &Grid,
    multistages: &[Multistage<T>],
    read_only_path: bool,
) -> Result<Setup<T>, Vec<Diagnostic>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let n_args = domain.placeholders().len();

    check_storages(domain, grid, multistages, &mut errors);

    let mut written_anywhere = vec![false; n_args];
    let mut staged = Vec::with_capacity(multistages.len());
    for ms in multistages {
        let mut stages = Vec::with_capacity(ms.stages.len());
        for stage in &ms.stages {
            if let Some(built) = build_stage(domain, grid, stage, &mut errors, &mut warnings) {
                for &w in &built.1.writes {
                    written_anywhere[w] = true;
                }
                stages.push(built);
            }
        }
        staged.push(stages);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut plans = Vec::with_capacity(multistages.len());
    for (index, (ms, stages)) in multistages.iter().zip(staged).enumerate() {
        if ms.stages.is_empty() {
            let w = Diagnostic::warning(format!("multistage {} has no stages", index), ms.span);
            warn!("{}", w.message);
            warnings.push(w);
        }
        if let Some(plan) = build_multistage(
            domain,
            grid,
            index,
            ms,
            stages,
            &written_anywhere,
            read_only_path,
            &mut errors,
        ) {
            plans.push(plan);
        }
    }

    if errors.is_empty() {
        Ok(Setup { plans, warnings })
    } else {
        Err(errors)
    }
}

// ─── Storage checks ────────────────────────────────────────────────

fn check_storages<T: Float>(
    domain: &Domain<T>,
    grid: &Grid,
    multistages: &[Multistage<T>],
    errors: &mut Vec<Diagnostic>,
) {
    let needed = grid.storage_dims();
    for placeholder in domain.placeholders() {
        if placeholder.is_temporary() {
            continue;
        }
        let referenced = multistages
            .iter()
            .flat_map(|ms| ms.stages.iter())
            .any(|s| s.args.contains(placeholder));
        match domain.storage(placeholder) {
            None if referenced => errors.push(
                Diagnostic::error(format!("argument '{}' is not bound", placeholder), Span::dummy())
                    .with_help("bind a storage to it before calling ready()".to_string()),
            ),
            None => {}
            Some(storage) => {
                let dims = storage.info().dims();
                if (0..3).any(|d| dims[d] < needed[d]) {
                    errors.push(
                        Diagnostic::error(
                            format!(
                                "storage '{}' of {:?} does not cover the grid",
                                placeholder, dims
                            ),
                            Span::dummy(),
                        )
                        .with_note(format!("the grid needs at least {:?}", needed)),
                    );
                }
            }
        }
    }
}

// ─── Stages ────────────────────────────────────────────────────────

fn build_stage<T: Float>(
    domain: &Domain<T>,
    grid: &Grid,
    stage: &crate::compose::Stage<T>,
    errors: &mut Vec<Diagnostic>,
    warnings: &mut Vec<Diagnostic>,
) -> Option<(StagePlan<T>, StageAccess)> {
    let functor: &Functor<T> = &stage.functor;
    let span = if stage.span.is_dummy() { functor.span() } else { stage.span };
    let params = functor.params();
    let before = errors.len();

    if stage.args.len() != params.len() {
        errors.push(
            Diagnostic::error(
                format!(
                    "stage '{}' binds {} argument{} but the functor has {} param{}",
                    functor.name(),
                    stage.args.len(),
                    if stage.args.len() == 1 { "" } else { "s" },
                    params.len(),
                    if params.len() == 1 { "" } else { "s" }
                ),
                span,
            )
            .with_note(format!(
                "params: {}",
                params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
            )),
        );
        return None;
    }
    for arg in &stage.args {
        if !domain.contains(arg) {
            errors.push(Diagnostic::error(
                format!("stage '{}' uses '{}', which is not an argument of the domain", functor.name(), arg),
                span,
            ));
        }
    }
    if errors.len() > before {
        return None;
    }
    let args: Vec<usize> = stage.args.iter().map(|p| p.index()).collect();

    let table = match IntervalTable::build(&functor.intervals(), grid) {
        Ok(table) => table,
        Err(e) => {
            let e = if e.span.is_dummy() { Diagnostic { span, ..e } } else { e };
            errors.push(e.with_note(format!("in functor '{}'", functor.name())));
            return None;
        }
    };
    if table.is_unused() {
        let w = Diagnostic::warning(
            format!("stage '{}' is selected at no level of the grid", functor.name()),
            span,
        );
        warn!("{}", w.message);
        warnings.push(w);
    }

    let mut access = StageAccess {
        reads: Vec::new(),
        writes: Vec::new(),
        span,
    };
    let mut bodies = Vec::with_capacity(functor.overloads().len());
    for (n, overload) in functor.overloads().iter().enumerate() {
        let ospan = if overload.span.is_dummy() { span } else { overload.span };
        let range = table.range(n);
        match &overload.body {
            Body::Expr(assigns) => {
                for assign in assigns {
                    let stray = std::iter::once(assign.target.param)
                        .chain(assign.expr.loads().iter().map(|a| a.param))
                        .find(|&p| p >= params.len());
                    if let Some(p) = stray {
                        errors.push(Diagnostic::error(
                            format!(
                                "functor '{}' uses accessor {} but has {} params",
                                functor.name(),
                                p,
                                params.len()
                            ),
                            ospan,
                        ));
                        continue;
                    }
                    let target = assign.target;
                    let param = &params[target.param];
                    if param.intent == Intent::In {
                        errors.push(
                            Diagnostic::error(
                                format!("functor '{}' writes input param '{}'", functor.name(), param.name),
                                ospan,
                            )
                            .with_help(format!("declare it as `inout {}`", param.name)),
                        );
                    }
                    if !target.is_center() || target.snapshot != 0 {
                        errors.push(Diagnostic::error(
                            format!(
                                "functor '{}' writes '{}' away from the current point",
                                functor.name(),
                                param.name
                            ),
                            ospan,
                        ));
                    }
                    push_unique(&mut access.writes, args[target.param]);
                    for acc in assign.expr.loads() {
                        let param = &params[acc.param];
                        if !param.extent.covers_horizontal(acc.offset) {
                            errors.push(
                                Diagnostic::error(
                                    format!(
                                        "'{}' is read at offset {:?} outside its declared extent",
                                        param.name, acc.offset
                                    ),
                                    ospan,
                                )
                                .with_help(format!(
                                    "declare the extent, e.g. `in {} [{}, {}, {}, {}]`",
                                    param.name,
                                    (-acc.offset[0]).max(param.extent.iminus),
                                    acc.offset[0].max(param.extent.iplus),
                                    (-acc.offset[1]).max(param.extent.jminus),
                                    acc.offset[1].max(param.extent.jplus)
                                )),
                            );
                        }
                        if let Some(range) = range {
                            access.reads.push(Read {
                                arg: args[acc.param],
                                reach: Extent::from_offset(acc.offset),
                                snapshot: acc.snapshot,
                                range,
                                span: ospan,
                            });
                        }
                    }
                }
                bodies.push(CompiledBody::Program(Program::compile(assigns)));
            }
            Body::Native(f) => {
                for (p, param) in params.iter().enumerate() {
                    if param.intent == Intent::InOut {
                        push_unique(&mut access.writes, args[p]);
                    }
                    if let Some(range) = range {
                        access.reads.push(Read {
                            arg: args[p],
                            reach: param.extent,
                            snapshot: 0,
                            range,
                            span: ospan,
                        });
                    }
                }
                bodies.push(CompiledBody::Native(f.clone()));
            }
        }
    }
    if errors.len() > before {
        return None;
    }

    let plan = StagePlan {
        name: functor.name().to_string(),
        writable: params.iter().map(|p| p.intent == Intent::InOut).collect(),
        args,
        table,
        bodies,
        extent: Extent::ZERO,
    };
    Some((plan, access))
}

fn push_unique(v: &mut Vec<usize>, x: usize) {
    if !v.contains(&x) {
        v.push(x);
    }
}

// ─── Multistages ───────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn build_multistage<T: Float>(
    domain: &Domain<T>,
    grid: &Grid,
    index: usize,
    ms: &Multistage<T>,
    stages: Vec<(StagePlan<T>, StageAccess)>,
    written_anywhere: &[bool],
    read_only_path: bool,
    errors: &mut Vec<Diagnostic>,
) -> Option<MultistagePlan<T>> {
    let before = errors.len();
    let n_args = domain.placeholders().len();
    let (mut plans, accesses): (Vec<_>, Vec<_>) = stages.into_iter().unzip();
    let name = |arg: usize| domain.placeholders()[arg].name().to_string();

    let mut written = vec![false; n_args];
    for access in &accesses {
        for &w in &access.writes {
            written[w] = true;
        }
    }

    // Compute extents, last stage first.
    let mut extents = vec![Extent::ZERO; accesses.len()];
    for s in (0..accesses.len()).rev() {
        let mut e = Extent::ZERO;
        for t in s + 1..accesses.len() {
            for read in &accesses[t].reads {
                if accesses[s].writes.contains(&read.arg) {
                    e = e.union(extents[t].grow(read.reach.horizontal_part()));
                }
            }
        }
        extents[s] = e.horizontal_part();
    }

    let caches = check_caches(domain, ms, &accesses, errors);
    let cache_of = |arg: usize| caches.iter().find(|c| c.arg.index() == arg);
    let horizontal_local = |arg: usize| {
        cache_of(arg).is_some_and(|c| c.scope.is_horizontal() && c.policy == CachePolicy::Local)
    };

    for (s, access) in accesses.iter().enumerate() {
        let stage_name = &plans[s].name;

        if !extents[s].is_zero() {
            for &w in &access.writes {
                if !horizontal_local(w) {
                    errors.push(
                        Diagnostic::error(
                            format!(
                                "stage '{}' computes on extent {} but writes '{}' to memory",
                                stage_name, extents[s], name(w)
                            ),
                            access.span,
                        )
                        .with_note("later stages read its outputs at horizontal offsets".to_string())
                        .with_help(format!("cache '{}' with scope ij and policy local", name(w))),
                    );
                }
            }
        }

        for read in &access.reads {
            let reach = extents[s].grow(read.reach);
            if written[read.arg] && !reach.is_horizontally_zero() {
                let cached = cache_of(read.arg).is_some_and(|c| c.scope.is_horizontal());
                let late_writer = accesses
                    .iter()
                    .enumerate()
                    .find(|(w, a)| *w >= s && a.writes.contains(&read.arg));
                if !cached {
                    errors.push(
                        Diagnostic::error(
                            format!(
                                "stage '{}' reads '{}' at a horizontal offset while the multistage writes it",
                                stage_name,
                                name(read.arg)
                            ),
                            read.span,
                        )
                        .with_help(format!("cache '{}' with scope ij", name(read.arg))),
                    );
                } else if let Some((w, _)) = late_writer {
                    errors.push(
                        Diagnostic::error(
                            format!(
                                "stage '{}' reads '{}' at a horizontal offset but stage '{}' writes it afterwards",
                                stage_name,
                                name(read.arg),
                                plans[w].name
                            ),
                            read.span,
                        )
                        .with_note("horizontal dependencies must point to earlier stages".to_string()),
                    );
                }
            }
            if !written[read.arg]
                && written_anywhere[read.arg]
                && !reach.is_horizontally_zero()
                && domain.placeholders()[read.arg].is_temporary()
            {
                errors.push(
                    Diagnostic::error(
                        format!(
                            "stage '{}' reads temporary '{}' at a horizontal offset but it is computed in another multistage",
                            stage_name,
                            name(read.arg)
                        ),
                        read.span,
                    )
                    .with_note("temporaries only hold the points of the grid computed by their writer".to_string())
                    .with_help(format!(
                        "compute '{}' in this multistage behind an ij cache, or store it in a bound field",
                        name(read.arg)
                    )),
                );
            }
            if ms.order == ExecutionOrder::Parallel
                && written[read.arg]
                && (read.reach.kminus > 0 || read.reach.kplus > 0)
            {
                errors.push(
                    Diagnostic::error(
                        format!(
                            "parallel multistage reads '{}' at a vertical offset while writing it",
                            name(read.arg)
                        ),
                        read.span,
                    )
                    .with_help("use a forward or backward execution order".to_string()),
                );
            }
            check_read_bounds(domain, grid, read, extents[s], cache_of(read.arg), errors);
        }
    }

    // Per-cache constraints and tile halos.
    let mut cache_plans = Vec::with_capacity(caches.len());
    for cache in &caches {
        let arg = cache.arg.index();
        let mut halo = Extent::ZERO;
        for (s, access) in accesses.iter().enumerate() {
            if access.writes.contains(&arg) {
                halo = halo.union(extents[s]);
            }
            for read in access.reads.iter().filter(|r| r.arg == arg) {
                halo = halo.union(extents[s].grow(read.reach));
                if read.snapshot != 0 {
                    errors.push(Diagnostic::error(
                        format!("cached argument '{}' is read at snapshot {}", name(arg), read.snapshot),
                        cache.span,
                    ));
                }
            }
        }
        let vertical = halo.kminus > 0 || halo.kplus > 0;
        match cache.scope {
            CacheScope::IJ if vertical => errors.push(
                Diagnostic::error(
                    format!("'{}' has an ij cache but is accessed at vertical offsets", name(arg)),
                    cache.span,
                )
                .with_help("use an ijk or k cache".to_string()),
            ),
            CacheScope::K => {
                if ms.order == ExecutionOrder::Parallel {
                    errors.push(Diagnostic::error(
                        format!("k cache on '{}' in a parallel multistage", name(arg)),
                        cache.span,
                    ));
                }
                if !halo.is_horizontally_zero() {
                    errors.push(
                        Diagnostic::error(
                            format!("'{}' has a k cache but is accessed at horizontal offsets", name(arg)),
                            cache.span,
                        )
                        .with_help("use an ijk cache".to_string()),
                    );
                }
            }
            _ => {}
        }
        let halo = match cache.scope {
            CacheScope::IJ => halo.horizontal_part(),
            CacheScope::K => Extent::new(0, 0, 0, 0, halo.kminus, halo.kplus),
            CacheScope::IJK => halo,
        };
        cache_plans.push(CachePlan {
            arg,
            scope: cache.scope,
            policy: cache.policy,
            halo,
        });
    }

    for p in &ms.bypass {
        if !domain.contains(p) {
            errors.push(Diagnostic::error(
                format!("bypass lists '{}', which is not an argument of the domain", p),
                ms.span,
            ));
        }
    }

    if errors.len() > before {
        return None;
    }

    let readonly = (0..n_args)
        .map(|arg| {
            read_only_path
                && !written_anywhere[arg]
                && !domain.placeholders()[arg].is_temporary()
                && !ms.bypass.iter().any(|p| p.index() == arg)
        })
        .collect();

    for (plan, extent) in plans.iter_mut().zip(&extents) {
        plan.extent = *extent;
    }
    let max_stack = plans
        .iter()
        .flat_map(|p| p.bodies.iter())
        .map(|b| match b {
            CompiledBody::Program(program) => program.max_stack(),
            CompiledBody::Native(_) => 0,
        })
        .max()
        .unwrap_or(0);

    debug!(
        "multistage {}: {} order, {} stages, {} caches, extents {:?}",
        index,
        ms.order,
        plans.len(),
        cache_plans.len(),
        extents
    );

    Some(MultistagePlan {
        index,
        order: ms.order,
        stages: plans,
        caches: cache_plans,
        readonly,
        k_range: grid.k_range(),
        max_stack,
    })
}

fn check_caches<T: Float>(
    domain: &Domain<T>,
    ms: &Multistage<T>,
    accesses: &[StageAccess],
    errors: &mut Vec<Diagnostic>,
) -> Vec<Cache> {
    let mut seen: Vec<Cache> = Vec::new();
    for cache in &ms.caches {
        let arg = &cache.arg;
        if !domain.contains(arg) {
            errors.push(Diagnostic::error(
                format!("{} refers to an unknown argument", cache),
                cache.span,
            ));
            continue;
        }
        if seen.iter().any(|c| c.arg == *arg) {
            errors.push(Diagnostic::error(
                format!("'{}' is cached twice in the same multistage", arg),
                cache.span,
            ));
            continue;
        }
        if !accesses.iter().any(|a| a.touches(arg.index())) {
            errors.push(Diagnostic::error(
                format!("{} caches an argument no stage of the multistage touches", cache),
                cache.span,
            ));
            continue;
        }
        if cache.policy == CachePolicy::Local && !arg.is_temporary() {
            errors.push(
                Diagnostic::error(
                    format!("local cache on '{}', which is not a temporary", arg),
                    cache.span,
                )
                .with_help("use fill or flush for bound storages".to_string()),
            );
            continue;
        }
        seen.push(cache.clone());
    }
    seen
}

fn check_read_bounds<T: Float>(
    domain: &Domain<T>,
    grid: &Grid,
    read: &Read,
    extent: Extent,
    cache: Option<&Cache>,
    errors: &mut Vec<Diagnostic>,
) {
    let placeholder = &domain.placeholders()[read.arg];
    if placeholder.is_temporary() {
        return;
    }
    if cache.is_some_and(|c| c.policy == CachePolicy::Local) {
        return;
    }
    let Some(storage) = domain.storage(placeholder) else {
        return;
    };
    if read.snapshot >= storage.n_snapshots() {
        errors.push(Diagnostic::error(
            format!(
                "'{}' is read at snapshot {} but holds {}",
                placeholder,
                read.snapshot,
                storage.n_snapshots()
            ),
            read.span,
        ));
    }
    let dims = storage.info().dims();
    let reach = extent.grow(read.reach);
    let (gi, gj) = (grid.i(), grid.j());
    let lo = [
        gi.begin as i64 - reach.iminus as i64,
        gj.begin as i64 - reach.jminus as i64,
        read.range.first as i64 - reach.kminus as i64,
    ];
    let hi = [
        gi.end as i64 + reach.iplus as i64,
        gj.end as i64 + reach.jplus as i64,
        read.range.last as i64 + reach.kplus as i64,
    ];
    for axis in 0..3 {
        if lo[axis] < 0 || hi[axis] >= dims[axis] as i64 {
            errors.push(
                Diagnostic::error(
                    format!(
                        "reads of '{}' reach {}..={} along {} outside its storage of {}",
                        placeholder,
                        lo[axis],
                        hi[axis],
                        ["i", "j", "k"][axis],
                        dims[axis]
                    ),
                    read.span,
                )
                .with_help("enlarge the grid halo or restrict the interval".to_string()),
            );
        }
    }
}
