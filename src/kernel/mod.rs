//! KernelLowering: turns a computation that passed setup into GPU kernel
//! source.
//!
//! The lowering works on a `KernelPlan`, a backend-neutral snapshot of the
//! analysed computation (argument layout, per-multistage stages, resolved
//! overload ranges, caches and read-only routing). One kernel is emitted per
//! multistage; the host launches them in declaration order.

mod cuda;

use crate::compose::{CachePolicy, CacheScope, ExecutionOrder};
use crate::diagnostic::Diagnostic;
use crate::grid::{Grid, KRange};
use crate::stencil::{Assign, Extent};

pub use cuda::CudaLowering;

/// A storage or temporary as seen by a kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelArg {
    pub name: String,
    pub temporary: bool,
    pub dims: [usize; 3],
    pub strides: [usize; 3],
    pub snapshots: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelCache {
    pub arg: usize,
    pub scope: CacheScope,
    pub policy: CachePolicy,
    pub halo: Extent,
}

/// One overload with the k range it was resolved to. `body` is `None`
/// for native (host-only) bodies.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelOverload {
    pub range: Option<KRange>,
    pub body: Option<Vec<Assign>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KernelStage {
    pub name: String,
    /// Param index to argument index.
    pub args: Vec<usize>,
    /// Horizontal compute extent.
    pub extent: Extent,
    pub overloads: Vec<KernelOverload>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KernelMultistage {
    pub index: usize,
    pub order: ExecutionOrder,
    pub k_range: KRange,
    pub stages: Vec<KernelStage>,
    pub caches: Vec<KernelCache>,
    pub readonly: Vec<bool>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KernelPlan {
    /// C spelling of the value type.
    pub value_type: &'static str,
    pub grid: Grid,
    /// Thread block size (i, j).
    pub block: [usize; 2],
    pub args: Vec<KernelArg>,
    pub multistages: Vec<KernelMultistage>,
}

/// Lowers an analysed computation into GPU kernel source.
pub trait KernelLowering {
    /// The target name (e.g. "cuda").
    fn target_name(&self) -> &str;

    /// Emit a complete translation unit, one kernel per multistage.
    fn lower(&self, plan: &KernelPlan) -> Result<String, Diagnostic>;
}

/// Create a kernel-lowering backend for the given target name.
pub fn create_kernel_lowering(target: &str) -> Option<Box<dyn KernelLowering>> {
    match target {
        "cuda" | "ptx" => Some(Box::new(CudaLowering::new())),
        _ => None,
    }
}
