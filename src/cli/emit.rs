use std::path::PathBuf;
use std::process;

use clap::Args;

use gridstencil::config::Precision;
use gridstencil::exec::{BackendConfig, BackendKind};
use gridstencil::kernel::{create_kernel_lowering, KernelPlan};
use gridstencil::storage::Float;

use super::{load_plan, prepare, LoadedPlan};

#[derive(Args)]
pub struct EmitArgs {
    /// Plan file (.toml)
    pub plan: PathBuf,
    /// Kernel target
    #[arg(long, default_value = "cuda")]
    pub target: String,
    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Generate kernel source for the plan's computation.
pub fn cmd_emit(args: EmitArgs) {
    let Some(lowering) = create_kernel_lowering(&args.target) else {
        eprintln!("error: unknown kernel target '{}' (cuda)", args.target);
        process::exit(1);
    };
    let loaded = load_plan(&args.plan);
    let mut config = BackendConfig::new(BackendKind::Cuda);
    if let Some(block) = loaded.plan.backend.block {
        config = config.with_block(block);
    }
    let kernel_plan = match loaded.plan.precision() {
        Ok(Precision::Double) => kernel_plan::<f64>(&loaded, config),
        Ok(Precision::Single) => kernel_plan::<f32>(&loaded, config),
        Err(e) => loaded.fail(&[e]),
    };
    let source = match lowering.lower(&kernel_plan) {
        Ok(source) => source,
        Err(e) => loaded.fail(&[e]),
    };

    match args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &source) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                process::exit(1);
            }
            eprintln!(
                "wrote {} kernel{} to {}",
                kernel_plan.multistages.len(),
                if kernel_plan.multistages.len() == 1 { "" } else { "s" },
                path.display()
            );
        }
        None => print!("{}", source),
    }
}

fn kernel_plan<T: Float>(loaded: &LoadedPlan, config: BackendConfig) -> KernelPlan {
    let computation = prepare::<T>(loaded, config);
    match computation.kernel_plan() {
        Ok(plan) => plan,
        Err(e) => loaded.fail(&[e]),
    }
}
