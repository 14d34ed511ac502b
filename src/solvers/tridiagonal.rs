//! Column-wise tridiagonal solve (Thomas algorithm) as two stencil passes.
//!
//! Row k of the system in every (i, j) column is
//! `inf[k] * x[k-1] + diag[k] * x[k] + sup[k] * x[k+1] = rhs[k]`;
//! `inf` at the first level and `sup` at the last are padding.
//!
//! The forward pass eliminates the lower diagonal top-down, overwriting
//! `sup` and `rhs`; the backward pass substitutes bottom-up into `out`.

use log::info;

use crate::compose::{make_multistage, make_stage, ExecutionOrder, Multistage};
use crate::diagnostic::Diagnostic;
use crate::domain::Domain;
use crate::exec::{make_computation, AccessStats, BackendConfig};
use crate::grid::{Grid, Interval, Level};
use crate::span::Span;
use crate::stencil::{Accessor, Assign, Functor, Param};
use crate::storage::{Float, Storage};

const OUT: Accessor = Accessor::new(0);
const INF: Accessor = Accessor::new(1);
const DIAG: Accessor = Accessor::new(2);
const SUP: Accessor = Accessor::new(3);
const RHS: Accessor = Accessor::new(4);

/// The first level of the column.
pub const FIRST: Interval = Interval::at(Level::new(0, -1));
/// Every level strictly between the first and the last.
pub const INTERNAL: Interval = Interval::new(Level::new(0, 1), Level::new(1, -2));
/// The last level of the column.
pub const LAST: Interval = Interval::at(Level::new(1, -1));

fn params() -> Vec<Param> {
    vec![
        Param::inout("out"),
        Param::input("inf"),
        Param::input("diag"),
        Param::inout("sup"),
        Param::inout("rhs"),
    ]
}

pub fn forward_thomas<T: Float>() -> Functor<T> {
    let eliminate = || {
        vec![
            Assign::new(SUP, SUP / (DIAG - SUP.k(-1) * INF)),
            Assign::new(RHS, (RHS - INF * RHS.k(-1)) / (DIAG - SUP.k(-1) * INF)),
        ]
    };
    Functor::new("forward_thomas", params())
        .overload(FIRST, vec![Assign::new(SUP, SUP / DIAG), Assign::new(RHS, RHS / DIAG)])
        .overload(INTERNAL, eliminate())
        .overload(LAST, eliminate())
}

pub fn backward_thomas<T: Float>() -> Functor<T> {
    let substitute = || vec![Assign::new(OUT, RHS - SUP * OUT.k(1))];
    Functor::new("backward_thomas", params())
        .overload(FIRST, substitute())
        .overload(INTERNAL, substitute())
        .overload(LAST, vec![Assign::new(OUT, RHS)])
}

/// The four diagonals and right-hand side of one system per column.
#[derive(Clone, Debug)]
pub struct System<T: Float> {
    pub inf: Storage<T>,
    pub diag: Storage<T>,
    pub sup: Storage<T>,
    pub rhs: Storage<T>,
}

impl<T: Float> System<T> {
    /// A system with constant diagonals and right-hand side.
    pub fn constant(grid: &Grid, inf: f64, diag: f64, sup: f64, rhs: f64) -> Result<Self, Diagnostic> {
        let dims = grid.storage_dims();
        Ok(Self {
            inf: Storage::filled("inf", dims, T::from_f64(inf))?,
            diag: Storage::filled("diag", dims, T::from_f64(diag))?,
            sup: Storage::filled("sup", dims, T::from_f64(sup))?,
            rhs: Storage::filled("rhs", dims, T::from_f64(rhs))?,
        })
    }

    /// `-x[k-1] + 3 x[k] + x[k+1] = rhs` with the boundary rows adjusted so
    /// that the solution is 1 everywhere.
    pub fn reference(grid: &Grid) -> Result<Self, Diagnostic> {
        let mut system = Self::constant(grid, -1.0, 3.0, 1.0, 3.0)?;
        let k = grid.k_range();
        system.rhs.fill_level(k.first, T::from_f64(4.0));
        system.rhs.fill_level(k.last, T::from_f64(2.0));
        Ok(system)
    }
}

/// Solution of a tridiagonal solve.
pub struct Solution<T: Float> {
    pub out: Storage<T>,
    /// The system after elimination (`sup` and `rhs` overwritten).
    pub system: System<T>,
    pub stats: AccessStats,
}

/// The forward and backward multistages over a domain declaring
/// `out, inf, diag, sup, rhs` in that order.
pub fn thomas_multistages<T: Float>(domain: &Domain<T>) -> Result<Vec<Multistage<T>>, Diagnostic> {
    let mut args = Vec::with_capacity(5);
    for name in ["out", "inf", "diag", "sup", "rhs"] {
        let p = domain.find(name).ok_or_else(|| {
            Diagnostic::error(format!("domain has no argument '{}'", name), Span::dummy())
        })?;
        args.push(p);
    }
    Ok(vec![
        make_multistage(ExecutionOrder::Forward, vec![make_stage(forward_thomas::<T>(), &args)]),
        make_multistage(ExecutionOrder::Backward, vec![make_stage(backward_thomas::<T>(), &args)]),
    ])
}

/// Solve every column of `system` on `grid` with the given backend.
pub fn solve<T: Float>(config: BackendConfig, grid: Grid, system: System<T>) -> Result<Solution<T>, Vec<Diagnostic>> {
    let k = grid.k_range();
    if k.len() < 3 {
        return Err(vec![Diagnostic::error(
            format!("the tridiagonal solver needs at least 3 levels, the grid has {}", k.len()),
            Span::dummy(),
        )]);
    }

    let dims = grid.storage_dims();
    let mut domain = Domain::new();
    let declare = |domain: &mut Domain<T>, storage: Storage<T>| -> Result<(), Diagnostic> {
        let p = domain.arg(&storage.name().to_string())?;
        domain.bind(&p, storage)
    };
    let System { inf, diag, sup, rhs } = system;
    let out = Storage::filled("out", dims, T::default()).map_err(|e| vec![e])?;
    for storage in [out, inf, diag, sup, rhs] {
        declare(&mut domain, storage).map_err(|e| vec![e])?;
    }

    let multistages = thomas_multistages(&domain).map_err(|e| vec![e])?;
    let mut computation = make_computation(config, domain, grid, multistages);
    computation.ready()?;
    computation.steady().map_err(|e| vec![e])?;
    let stats = computation.run().map_err(|e| vec![e])?;
    computation.finalize().map_err(|e| vec![e])?;
    info!(
        "tridiagonal solve on {}: {} points",
        computation.backend().name(),
        stats.points
    );

    let mut domain = computation.into_domain();
    let mut take = |name: &str| -> Result<Storage<T>, Vec<Diagnostic>> {
        let p = domain.find(name).cloned().ok_or_else(|| {
            vec![Diagnostic::error(format!("domain lost argument '{}'", name), Span::dummy())]
        })?;
        domain.take(&p).ok_or_else(|| {
            vec![Diagnostic::error(format!("argument '{}' has no storage", name), Span::dummy())]
        })
    };
    Ok(Solution {
        out: take("out")?,
        system: System {
            inf: take("inf")?,
            diag: take("diag")?,
            sup: take("sup")?,
            rhs: take("rhs")?,
        },
        stats,
    })
}
