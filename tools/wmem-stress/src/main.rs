//! Seeded random workload against the block allocator.
//!
//! Exits with 0 on success, 1 on an allocation failure or invariant
//! violation, and 2 on bad arguments.

mod args;
mod logger;
mod workload;

use args::{Args, USAGE};
use log::{error, info};
use logger::StderrLogger;
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = StderrLogger::from_env().init() {
        eprintln!("failed to install logger: {e}");
    }

    let args = match Args::parse(env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("{e}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match workload::run(&args) {
        Ok(summary) => {
            info!(
                "done: {} allocs, {} frees, {} reallocs, {} gc, {} free_all",
                summary.allocs, summary.frees, summary.reallocs, summary.gcs, summary.free_alls
            );
            info!("final: {}", summary.stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
