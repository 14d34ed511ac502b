use std::path::PathBuf;

use clap::Args;

use gridstencil::config::Precision;

use super::{backend_config, load_plan, prepare};

#[derive(Args)]
pub struct CheckArgs {
    /// Plan file (.toml)
    pub plan: PathBuf,
    /// Check against another backend than the plan's
    #[arg(long)]
    pub backend: Option<String>,
}

/// Parse the plan and run every setup check without executing.
pub fn cmd_check(args: CheckArgs) {
    let loaded = load_plan(&args.plan);
    let config = backend_config(&loaded, args.backend.as_deref(), None, None);
    let precision = match loaded.plan.precision() {
        Ok(p) => p,
        Err(e) => loaded.fail(&[e]),
    };
    let (kind, warnings) = match precision {
        Precision::Double => {
            let c = prepare::<f64>(&loaded, config);
            (c.backend().name(), c.warnings().len())
        }
        Precision::Single => {
            let c = prepare::<f32>(&loaded, config);
            (c.backend().name(), c.warnings().len())
        }
    };
    eprintln!(
        "OK: {} ({}, {} multistage{}, {} warning{})",
        args.plan.display(),
        kind,
        loaded.plan.multistage.len(),
        if loaded.plan.multistage.len() == 1 { "" } else { "s" },
        warnings,
        if warnings == 1 { "" } else { "s" }
    );
}
