//! Execution: setup analysis, compiled stage programs, the per-block
//! iterate domain with its cache tiles, and the backends that schedule
//! blocks.

pub mod backend;
mod cache;
mod computation;
mod iterate;
mod plan;
mod program;
mod setup;
mod stats;
mod view;

pub use backend::{create_backend, Backend, BackendConfig, BackendKind, Cuda, HostBlock, HostNaive};
pub use computation::{make_computation, Computation, State};
pub use iterate::Block;
pub use program::{Eval, KOp, Program};
pub use stats::AccessStats;
