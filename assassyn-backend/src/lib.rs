//! Lowers a frozen IR `System` to SystemVerilog and, optionally, drives a
//! simulator over the result.

pub mod config;
pub mod sim;
pub mod traits;
pub mod verilog;

pub use config::{Config, Simulator, Target};
pub use traits::{Backend, LoweringContext};
pub use verilog::VerilogBackend;

use assassyn_ir::System;
use assassyn_opt::{ExternalRegistry, InteractionMatrix, WritePortAllocator};
use assassyn_utils::AsnResult;
use std::path::PathBuf;

/// Runs the full analysis + lowering pipeline over `system`, which must
/// already be frozen, then (for `Target::Simulation`/`Both`) drives the
/// configured simulator over the emitted output.
pub fn elaborate(system: &System, externs: &ExternalRegistry, config: &Config) -> AsnResult<Vec<PathBuf>> {
    if !system.is_frozen() {
        return Err(assassyn_utils::Error::internal(
            "elaborate() requires a frozen system",
        ));
    }

    let matrix = InteractionMatrix::build(system);
    WritePortAllocator::run(system, &matrix);

    let backend = VerilogBackend;
    let ctx = LoweringContext {
        system,
        matrix: &matrix,
        externs,
        config,
    };
    backend.validate(&ctx)?;
    let paths = backend.emit(&ctx)?;

    if matches!(config.target, Target::Simulation | Target::Both) {
        let run = sim::run(&config.output_dir, config)?;
        log::info!("{}", run.log);
        if !run.status_ok {
            return Err(assassyn_utils::Error::internal(
                "simulation run exited with a non-zero status",
            ));
        }
    }

    Ok(paths)
}
