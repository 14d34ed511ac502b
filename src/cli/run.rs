use std::path::PathBuf;
use std::process;

use clap::Args;

use gridstencil::config::Precision;
use gridstencil::storage::Float;

use super::{backend_config, load_plan, prepare, LoadedPlan};

#[derive(Args)]
pub struct RunArgs {
    /// Plan file (.toml)
    pub plan: PathBuf,
    /// Backend override: host-naive, host-block or cuda
    #[arg(long)]
    pub backend: Option<String>,
    /// Worker threads for block-parallel backends
    #[arg(long)]
    pub threads: Option<usize>,
    /// Block size override, e.g. `--block 8,8`
    #[arg(long, value_delimiter = ',')]
    pub block: Option<Vec<usize>>,
    /// Number of times to run the computation
    #[arg(long, default_value_t = 1)]
    pub steps: usize,
    /// Print access statistics
    #[arg(long)]
    pub stats: bool,
    /// Print a preview of a field after the run (repeatable)
    #[arg(long, value_name = "FIELD")]
    pub print: Vec<String>,
}

pub fn cmd_run(args: RunArgs) {
    let loaded = load_plan(&args.plan);
    let config = backend_config(
        &loaded,
        args.backend.as_deref(),
        args.threads,
        args.block.as_deref(),
    );
    let precision = match loaded.plan.precision() {
        Ok(p) => p,
        Err(e) => loaded.fail(&[e]),
    };
    let ok = match precision {
        Precision::Double => run_plan::<f64>(&loaded, config, &args),
        Precision::Single => run_plan::<f32>(&loaded, config, &args),
    };
    if !ok {
        process::exit(1);
    }
}

fn run_plan<T: Float>(loaded: &LoadedPlan, config: gridstencil::exec::BackendConfig, args: &RunArgs) -> bool {
    let mut computation = prepare::<T>(loaded, config);
    if let Err(e) = computation.steady() {
        loaded.fail(&[e]);
    }
    for _ in 0..args.steps.max(1) {
        if let Err(e) = computation.run() {
            loaded.fail(&[e]);
        }
    }
    if let Err(e) = computation.finalize() {
        loaded.fail(&[e]);
    }
    eprintln!(
        "ran {} on {} ({} run{})",
        args.plan.display(),
        computation.backend().name(),
        computation.runs(),
        if computation.runs() == 1 { "" } else { "s" }
    );

    if args.stats {
        eprintln!("\n{}", computation.stats());
    }

    for field in &args.print {
        let storage = computation
            .domain()
            .find(field)
            .and_then(|p| computation.storage(p));
        match storage {
            Some(storage) => println!("{}", storage.preview()),
            None => {
                eprintln!("error: no bound field named '{}'", field);
                return false;
            }
        }
    }

    let Some((field, expected, verifier)) = loaded.plan.verifier(T::TOLERANCE) else {
        return true;
    };
    let Some(storage) = computation.domain().find(field).and_then(|p| computation.storage(p)) else {
        eprintln!("error: [verify] names '{}', which is not a bound field", field);
        return false;
    };
    let report = verifier.verify_value(storage, T::from_f64(expected));
    if report.is_ok() {
        eprintln!("verify '{}': {}", field, report);
        true
    } else {
        eprintln!("verify '{}' FAILED: {}", field, report);
        false
    }
}
