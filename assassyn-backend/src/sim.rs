//! Drives the chosen Verilog simulator over emitted output. Behavioral
//! simulation itself stays outside this crate; this only shells out to
//! the toolchain and reports whether it succeeded.

use crate::config::{Config, Simulator};
use assassyn_utils::{AsnResult, Error};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

pub struct SimRun {
    pub status_ok: bool,
    pub log: String,
}

/// Compiles and runs the design at `design_dir` (as produced by
/// [`crate::verilog::VerilogBackend::emit`]) with the simulator named in
/// `config.simulator`, failing fast with `ToolchainMissing` if the expected
/// binary isn't on `PATH`. Verilator's object directory is a scratch
/// `TempDir` cleaned up once the run finishes, so repeated runs never
/// accumulate build artifacts in `design_dir`.
pub fn run(design_dir: &Path, config: &Config) -> AsnResult<SimRun> {
    let scratch = TempDir::new()?;
    let (program, args): (&str, Vec<String>) = match config.simulator {
        Simulator::Verilator => (
            "verilator",
            vec![
                "--binary".into(),
                "-sv".into(),
                "--top-module".into(),
                "tb".into(),
                "--Mdir".into(),
                scratch.path().display().to_string(),
                design_dir.join("testbench.sv").display().to_string(),
            ],
        ),
        Simulator::Vcs => (
            "vcs",
            vec!["-sverilog".into(), design_dir.join("testbench.sv").display().to_string()],
        ),
    };

    let output = Command::new(program).args(&args).output().map_err(|e| {
        Error::toolchain_missing(format!(
            "could not launch `{program}` (is it on PATH? {e})"
        ))
    })?;

    Ok(SimRun {
        status_ok: output.status.success(),
        log: format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
    })
}
