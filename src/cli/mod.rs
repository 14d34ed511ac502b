pub mod check;
pub mod emit;
pub mod run;

use std::path::Path;
use std::process;

use gridstencil::config::Plan;
use gridstencil::diagnostic::{render_diagnostics, Diagnostic};
use gridstencil::exec::{BackendConfig, BackendKind, Computation};
use gridstencil::storage::Float;

/// A plan file with the name used in diagnostics.
pub struct LoadedPlan {
    pub plan: Plan,
    pub filename: String,
}

impl LoadedPlan {
    /// Render diagnostics against the plan source and exit with status 1.
    pub fn fail(&self, diagnostics: &[Diagnostic]) -> ! {
        render_diagnostics(diagnostics, &self.filename, Some(self.plan.source()));
        process::exit(1);
    }

    pub fn warn(&self, diagnostics: &[Diagnostic]) {
        render_diagnostics(diagnostics, &self.filename, Some(self.plan.source()));
    }
}

pub fn load_plan(path: &Path) -> LoadedPlan {
    let filename = path.display().to_string();
    match Plan::load(path) {
        Ok(plan) => LoadedPlan { plan, filename },
        Err(e) => {
            let source = std::fs::read_to_string(path).ok();
            render_diagnostics(&[e], &filename, source.as_deref());
            process::exit(1);
        }
    }
}

/// Backend from the plan, overridden by command-line flags.
pub fn backend_config(
    loaded: &LoadedPlan,
    backend: Option<&str>,
    threads: Option<usize>,
    block: Option<&[usize]>,
) -> BackendConfig {
    let mut config = match loaded.plan.backend_config() {
        Ok(config) => config,
        Err(e) => loaded.fail(&[e]),
    };
    if let Some(name) = backend {
        let Some(kind) = BackendKind::parse(name) else {
            eprintln!("error: unknown backend '{}' (host-naive, host-block, cuda)", name);
            process::exit(1);
        };
        let block = config.block;
        let threads = config.threads;
        config = BackendConfig::new(kind);
        if loaded.plan.backend.block.is_some() {
            config = config.with_block(block);
        }
        config.threads = threads;
    }
    if let Some(n) = threads {
        config = config.with_threads(n);
    }
    if let Some(block) = block {
        match block {
            [bi, bj] => config = config.with_block([*bi, *bj]),
            _ => {
                eprintln!("error: --block takes two sizes, e.g. --block 8,8");
                process::exit(1);
            }
        }
    }
    config
}

/// Build the plan's computation and run setup; exits on diagnostics.
pub fn prepare<T: Float>(loaded: &LoadedPlan, config: BackendConfig) -> Computation<T> {
    let mut computation = match loaded.plan.build::<T>(config) {
        Ok(c) => c,
        Err(errors) => loaded.fail(&errors),
    };
    if let Err(errors) = computation.ready() {
        loaded.fail(&errors);
    }
    loaded.warn(computation.warnings());
    computation
}
