use crate::compose::{CachePolicy, CacheScope, ExecutionOrder};
use crate::grid::{IntervalTable, KRange};
use crate::stencil::{Extent, NativeFn};
use crate::storage::Float;

use super::program::Program;

pub(crate) enum CompiledBody<T: Float> {
    Program(Program<T>),
    Native(NativeFn<T>),
}

/// A stage after setup: arguments resolved to domain slots, overloads
/// dispatched by level, bodies compiled.
pub(crate) struct StagePlan<T: Float> {
    pub name: String,
    /// Param index to argument index.
    pub args: Vec<usize>,
    /// Param index to "is inout".
    pub writable: Vec<bool>,
    pub table: IntervalTable,
    pub bodies: Vec<CompiledBody<T>>,
    /// Horizontal compute extent around each block.
    pub extent: Extent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CachePlan {
    pub arg: usize,
    pub scope: CacheScope,
    pub policy: CachePolicy,
    /// Horizontal halo of IJ/IJK tiles; vertical window of K caches and
    /// the vertical margin of IJK tiles.
    pub halo: Extent,
}

pub(crate) struct MultistagePlan<T: Float> {
    pub index: usize,
    pub order: ExecutionOrder,
    pub stages: Vec<StagePlan<T>>,
    pub caches: Vec<CachePlan>,
    /// Argument index to "served by the read-only path".
    pub readonly: Vec<bool>,
    pub k_range: KRange,
    pub max_stack: usize,
}
