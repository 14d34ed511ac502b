use std::path::PathBuf;

use gridstencil::config::Plan;
use gridstencil::exec::{BackendConfig, BackendKind, Computation};
use gridstencil::kernel::create_kernel_lowering;
use gridstencil::storage::Float;

fn ready_demo<T: Float>(name: &str, block: [usize; 2]) -> Computation<T> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name);
    let plan = Plan::load(&path).unwrap();
    let config = BackendConfig::new(BackendKind::Cuda).with_block(block);
    let mut computation = plan.build::<T>(config).unwrap();
    computation.ready().unwrap();
    computation
}

fn emit<T: Float>(computation: &Computation<T>) -> String {
    let plan = computation.kernel_plan().unwrap();
    create_kernel_lowering("cuda").unwrap().lower(&plan).unwrap()
}

#[test]
fn test_diffusion_uses_shared_tile_and_readonly_loads() {
    let computation = ready_demo::<f64>("diffusion.toml", [16, 8]);
    let source = emit(&computation);

    assert!(source.contains("extern \"C\" __global__ void multistage_0("));
    assert!(!source.contains("multistage_1"));
    // 16x8 block grown by the one-point laplacian extent
    assert!(source.contains("__shared__ double ij_lap[180];"), "{}", source);
    assert!(source.contains("__ldg("), "in is never written");
    assert!(source.contains("const double* __restrict__ in"));
    assert!(source.contains("__syncthreads();"));
    assert!(source.contains("// launch every kernel in order with grid (2, 4) and block (16, 8)"));
}

#[test]
fn test_tridiagonal_emits_one_kernel_per_sweep() {
    let computation = ready_demo::<f64>("tridiagonal.toml", [4, 4]);
    let source = emit(&computation);

    assert!(source.contains("void multistage_0("));
    assert!(source.contains("void multistage_1("));
    assert!(source.contains("for (int k = 0; k <= 5; ++k) {"));
    assert!(source.contains("for (int k = 5; k >= 0; --k) {"));
    assert!(!source.contains("__shared__"));
    // the forward sweep overwrites sup; the backward sweep only reads it
    assert!(source.contains(", double* __restrict__ sup"));
    assert!(source.contains("const double* __restrict__ sup"));
}

#[test]
fn test_single_precision_kernel() {
    let computation = ready_demo::<f32>("diffusion.toml", [16, 8]);
    let plan = computation.kernel_plan().unwrap();
    assert_eq!(plan.value_type, "float");
    let source = create_kernel_lowering("cuda").unwrap().lower(&plan).unwrap();
    assert!(source.contains("__shared__ float ij_lap[180];"));
    assert!(source.contains("0.05f"));
    assert!(!source.contains("double"));
}

#[test]
fn test_oversized_block_falls_back_to_default() {
    let computation = ready_demo::<f64>("diffusion.toml", [64, 32]);
    let source = emit(&computation);
    assert!(source.contains("block (32, 8)"), "{}", source);
}

#[test]
fn test_kernel_plan_requires_setup() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join("diffusion.toml");
    let plan = Plan::load(&path).unwrap();
    let computation = plan.build::<f64>(BackendConfig::new(BackendKind::Cuda)).unwrap();
    let err = computation.kernel_plan().unwrap_err();
    assert!(err.message.contains("kernel_plan"), "{}", err.message);
}

#[test]
fn test_unknown_target() {
    assert!(create_kernel_lowering("opencl").is_none());
    assert_eq!(create_kernel_lowering("ptx").unwrap().target_name(), "cuda");
}
