mod cli;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

use cli::check::{cmd_check, CheckArgs};
use cli::emit::{cmd_emit, EmitArgs};
use cli::run::{cmd_run, RunArgs};

#[derive(Parser)]
#[command(
    name = "gridstencil",
    version,
    about = "Stencil computations on structured grids"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the computation described by a plan file
    Run(RunArgs),
    /// Run setup checks on a plan file without executing it
    Check(CheckArgs),
    /// Generate GPU kernel source for a plan file
    Emit(EmitArgs),
}

fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => gridstencil::logging::init_from_env(),
        1 => gridstencil::logging::init_with_level(LevelFilter::Info),
        2 => gridstencil::logging::init_with_level(LevelFilter::Debug),
        _ => gridstencil::logging::init_with_level(LevelFilter::Trace),
    }

    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Check(args) => cmd_check(args),
        Command::Emit(args) => cmd_emit(args),
    }
}
