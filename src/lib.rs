//! gridstencil: an embedded language for stencil computations on
//! structured 3-D grids.
//!
//! A computation is assembled from a [`grid::Grid`], [`storage::Storage`]s
//! bound to placeholders of a [`domain::Domain`], and
//! [`compose::Multistage`]s of stencil stages. `ready()` runs every
//! structural check once; `run()` sweeps the grid on the selected backend.
//!
//! ```
//! use gridstencil::compose::{make_multistage, make_stage, ExecutionOrder};
//! use gridstencil::domain::Domain;
//! use gridstencil::exec::{make_computation, BackendConfig};
//! use gridstencil::grid::{Grid, Interval, Level};
//! use gridstencil::stencil::{Accessor, Assign, Functor, Param};
//! use gridstencil::storage::Storage;
//!
//! const OUT: Accessor = Accessor::new(0);
//! const IN: Accessor = Accessor::new(1);
//!
//! let grid = Grid::from_sizes(4, 4, 3).unwrap();
//! let mut domain = Domain::<f64>::new();
//! let out = domain.arg("out").unwrap();
//! let inp = domain.arg("in").unwrap();
//! domain.bind(&out, Storage::filled("out", [4, 4, 3], 0.0).unwrap()).unwrap();
//! domain.bind(&inp, Storage::filled("in", [4, 4, 3], 2.0).unwrap()).unwrap();
//!
//! let all = Interval::new(Level::new(0, -1), Level::new(1, -1));
//! let scale = Functor::new("scale", vec![Param::inout("out"), Param::input("in")])
//!     .overload(all, vec![Assign::new(OUT, IN * 3.0)]);
//! let ms = make_multistage(ExecutionOrder::Parallel, vec![make_stage(scale, &[&out, &inp])]);
//!
//! let mut computation = make_computation(BackendConfig::default(), domain, grid, vec![ms]);
//! computation.ready().unwrap();
//! computation.steady().unwrap();
//! computation.run().unwrap();
//! computation.finalize().unwrap();
//! assert_eq!(computation.storage(&out).unwrap().get(1, 2, 0), 6.0);
//! ```

pub mod compose;
pub mod config;
pub mod diagnostic;
pub mod domain;
pub mod exec;
pub mod grid;
pub mod kernel;
pub mod logging;
pub mod solvers;
pub mod span;
pub mod stencil;
pub mod storage;
pub mod verify;
