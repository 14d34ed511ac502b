//! Turning a parsed plan into a computation.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use toml::Spanned;

use super::{span_of, Plan, StorageSection};
use crate::compose::{make_multistage, make_stage, Cache, CachePolicy, CacheScope, ExecutionOrder, Multistage};
use crate::diagnostic::Diagnostic;
use crate::domain::{Domain, Placeholder};
use crate::exec::{create_backend, make_computation, BackendConfig, BackendKind, Computation};
use crate::grid::{Grid, HorizontalRange, Interval, Level};
use crate::span::Span;
use crate::stencil::parse::{parse_body, parse_param};
use crate::stencil::{Body, Functor, Overload};
use crate::storage::{Float, Layout, Storage, StorageInfo};

/// Attach `span` to a diagnostic raised without one.
fn located(e: Diagnostic, span: Span) -> Diagnostic {
    if e.span.is_dummy() {
        Diagnostic { span, ..e }
    } else {
        e
    }
}

impl Plan {
    pub fn grid(&self) -> Result<Grid, Diagnostic> {
        let g = &self.grid;
        match &g.splitters {
            None => Grid::with_halo(g.ni, g.nj, g.nk, g.halo),
            Some(splitters) => {
                let span = span_of(splitters);
                let i = HorizontalRange::with_halo(g.ni, g.halo)?;
                let j = HorizontalRange::with_halo(g.nj, g.halo)?;
                let grid = Grid::new(i, j, splitters.get_ref().clone()).map_err(|e| located(e, span))?;
                if grid.k_total() > g.nk {
                    return Err(Diagnostic::error(
                        format!("splitters reach k = {} but the grid has {} levels", grid.k_range().last, g.nk),
                        span,
                    ));
                }
                Ok(grid)
            }
        }
    }

    /// Backend selection from `[backend]`.
    pub fn backend_config(&self) -> Result<BackendConfig, Diagnostic> {
        let b = &self.backend;
        let kind = match &b.kind {
            None => BackendKind::HostNaive,
            Some(kind) => BackendKind::parse(kind.get_ref()).ok_or_else(|| {
                Diagnostic::error(format!("unknown backend '{}'", kind.get_ref()), span_of(kind))
                    .with_help("use host-naive, host-block or cuda".to_string())
            })?,
        };
        let mut config = BackendConfig::new(kind);
        if let Some(block) = b.block {
            config = config.with_block(block);
        }
        if let Some(threads) = b.threads {
            config = config.with_threads(threads);
        }
        Ok(config)
    }

    /// Assemble the computation described by the plan. Setup checks run
    /// later, in `Computation::ready`.
    pub fn build<T: Float>(&self, config: BackendConfig) -> Result<Computation<T>, Vec<Diagnostic>> {
        let grid = self.grid().map_err(|e| vec![e])?;
        let mut errors = Vec::new();

        let layout = create_backend(&config).layout();
        let mut domain = Domain::new();
        for section in &self.storage {
            if let Err(e) = self.declare_storage(section, &grid, layout, &mut domain) {
                errors.push(e);
            }
        }

        let mut functors: HashMap<&str, Arc<Functor<T>>> = HashMap::new();
        for section in &self.functor {
            let name = section.name.get_ref().as_str();
            if functors.contains_key(name) {
                errors.push(Diagnostic::error(
                    format!("functor '{}' is defined twice", name),
                    span_of(&section.name),
                ));
                continue;
            }
            if let Some(functor) = self.build_functor(section, &mut errors) {
                functors.insert(name, Arc::new(functor));
            }
        }

        let mut multistages = Vec::with_capacity(self.multistage.len());
        for section in &self.multistage {
            if let Some(ms) = self.build_multistage(section, &domain, &functors, &mut errors) {
                multistages.push(ms);
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        debug!(
            "plan: {} arguments, {} functors, {} multistages",
            domain.placeholders().len(),
            functors.len(),
            multistages.len()
        );
        Ok(make_computation(config, domain, grid, multistages))
    }

    fn declare_storage<T: Float>(
        &self,
        section: &StorageSection,
        grid: &Grid,
        default_layout: Layout,
        domain: &mut Domain<T>,
    ) -> Result<(), Diagnostic> {
        let name = section.name.get_ref();
        let span = span_of(&section.name);
        if section.temporary {
            if !section.levels.is_empty() || section.snapshots.is_some() {
                return Err(Diagnostic::error(
                    format!("temporary '{}' cannot have initial levels or snapshots", name),
                    span,
                ));
            }
            domain.temporary(name).map_err(|e| located(e, span))?;
            return Ok(());
        }

        let layout = match &section.layout {
            Some(order) => Layout::new(*order.get_ref()).map_err(|e| located(e, span_of(order)))?,
            None => default_layout,
        };
        let info = StorageInfo::new(grid.storage_dims(), layout).map_err(|e| located(e, span))?;
        let mut storage = Storage::new(name.as_str(), info, T::from_f64(section.value));
        for level in &section.levels {
            if level.k >= info.dims()[2] {
                return Err(Diagnostic::error(
                    format!("storage '{}' sets level {} but has {} levels", name, level.k, info.dims()[2]),
                    span,
                ));
            }
            storage.fill_level(level.k, T::from_f64(level.value));
        }
        if let Some(n) = section.snapshots {
            storage = storage.with_snapshots(n);
        }
        let placeholder = domain.arg(name).map_err(|e| located(e, span))?;
        domain.bind(&placeholder, storage).map_err(|e| located(e, span))
    }

    fn build_functor<T: Float>(
        &self,
        section: &super::FunctorSection,
        errors: &mut Vec<Diagnostic>,
    ) -> Option<Functor<T>> {
        let before = errors.len();
        let mut params = Vec::with_capacity(section.params.len());
        for param in &section.params {
            match parse_param(param.get_ref(), self.text_base(param.span())) {
                Ok(p) => params.push(p),
                Err(es) => errors.extend(es),
            }
        }
        if errors.len() > before {
            return None;
        }

        let mut functor = Functor::new(section.name.get_ref().as_str(), params).with_span(span_of(&section.name));
        for overload in &section.overload {
            let interval = match interval_of(overload.interval.get_ref(), span_of(&overload.interval)) {
                Ok(interval) => interval,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            let base = self.text_base(overload.body.span());
            match parse_body(overload.body.get_ref(), functor.params(), base) {
                Ok(assigns) => functor.push_overload(Overload {
                    interval,
                    body: Body::Expr(assigns),
                    span: span_of(&overload.body),
                }),
                Err(es) => errors.extend(es),
            }
        }
        if errors.len() > before {
            None
        } else {
            Some(functor)
        }
    }

    fn build_multistage<T: Float>(
        &self,
        section: &super::MultistageSection,
        domain: &Domain<T>,
        functors: &HashMap<&str, Arc<Functor<T>>>,
        errors: &mut Vec<Diagnostic>,
    ) -> Option<Multistage<T>> {
        let before = errors.len();
        let span = span_of(&section.execution);
        let order = ExecutionOrder::parse(section.execution.get_ref()).or_else(|| {
            errors.push(
                Diagnostic::error(format!("unknown execution order '{}'", section.execution.get_ref()), span)
                    .with_help("use forward, backward or parallel".to_string()),
            );
            None
        });

        let mut stages = Vec::with_capacity(section.stages.len());
        for stage in &section.stages {
            let args = lookup_all(domain, &stage.args, errors);
            match functors.get(stage.functor.get_ref().as_str()) {
                Some(functor) if args.len() == stage.args.len() => {
                    let refs: Vec<&Placeholder> = args.iter().collect();
                    stages.push(make_stage(functor.clone(), &refs).with_span(span_of(&stage.functor)));
                }
                Some(_) => {}
                None => errors.push(Diagnostic::error(
                    format!("unknown functor '{}'", stage.functor.get_ref()),
                    span_of(&stage.functor),
                )),
            }
        }

        let mut caches = Vec::new();
        for c in &section.caches {
            let args = lookup_all(domain, &c.args, errors);
            let scope = CacheScope::parse(c.scope.get_ref());
            let policy = CachePolicy::parse(c.policy.get_ref());
            if scope.is_none() {
                errors.push(
                    Diagnostic::error(format!("unknown cache scope '{}'", c.scope.get_ref()), span_of(&c.scope))
                        .with_help("use ij, k or ijk".to_string()),
                );
            }
            if policy.is_none() {
                errors.push(
                    Diagnostic::error(format!("unknown cache policy '{}'", c.policy.get_ref()), span_of(&c.policy))
                        .with_help("use fill, flush or local".to_string()),
                );
            }
            let (Some(scope), Some(policy)) = (scope, policy) else {
                continue;
            };
            for (arg, name) in args.iter().zip(&c.args) {
                caches.push(Cache::new(scope, policy, arg).with_span(span_of(name)));
            }
        }
        let bypass = lookup_all(domain, &section.bypass, errors);

        let order = order?;
        if errors.len() > before {
            return None;
        }
        let refs: Vec<&Placeholder> = bypass.iter().collect();
        Some(
            make_multistage(order, stages)
                .with_caches(caches)
                .with_bypass(&refs)
                .with_span(span),
        )
    }
}

/// Resolve argument names; unknown names are reported and skipped.
fn lookup_all<T: Float>(
    domain: &Domain<T>,
    names: &[Spanned<String>],
    errors: &mut Vec<Diagnostic>,
) -> Vec<Placeholder> {
    let mut found = Vec::with_capacity(names.len());
    for name in names {
        match domain.find(name.get_ref()) {
            Some(p) => found.push(p.clone()),
            None => errors.push(Diagnostic::error(
                format!("unknown argument '{}'", name.get_ref()),
                span_of(name),
            )),
        }
    }
    found
}

fn interval_of(raw: &[[i64; 2]; 2], span: Span) -> Result<Interval, Diagnostic> {
    let level = |[splitter, offset]: [i64; 2]| -> Result<Level, Diagnostic> {
        if splitter < 0 || offset == 0 || offset.abs() > i32::MAX as i64 {
            return Err(Diagnostic::error(
                format!("invalid level [{}, {}]", splitter, offset),
                span,
            )
            .with_note("a level is [splitter >= 0, offset != 0]".to_string()));
        }
        Ok(Level::new(splitter as usize, offset as i32))
    };
    Ok(Interval::new(level(raw[0])?, level(raw[1])?))
}
