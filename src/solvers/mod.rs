//! Reference algorithms built from stencil stages.

pub mod tridiagonal;

pub use tridiagonal::{solve as solve_tridiagonal, System, Solution};
