//! Run configuration: everything that controls where and how the backend
//! writes its output, read from the CLI and a couple of ambient
//! environment variables the toolchain relies on.

use std::path::PathBuf;

/// Which Verilog simulator the emitted testbench targets. The generated
/// SystemVerilog itself is simulator-agnostic; this only changes which
/// driver script and `$display`/VCD conventions the testbench uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Simulator {
    Verilator,
    Vcs,
}

impl Default for Simulator {
    fn default() -> Self {
        Simulator::Verilator
    }
}

impl std::str::FromStr for Simulator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verilator" => Ok(Simulator::Verilator),
            "vcs" => Ok(Simulator::Vcs),
            other => Err(format!("unknown simulator `{other}`, expected verilator or vcs")),
        }
    }
}

/// What a run is meant to produce: the generated SystemVerilog on its
/// own, a behavioral simulation run on its own (still emitting the SV
/// first, since there's nothing else to simulate), or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Sv,
    Simulation,
    Both,
}

impl Default for Target {
    fn default() -> Self {
        Target::Sv
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sv" | "verilog" => Ok(Target::Sv),
            "simulation" | "sim" => Ok(Target::Simulation),
            "both" => Ok(Target::Both),
            other => Err(format!("unknown target `{other}`, expected sv, simulation, or both")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    /// What this run is meant to produce.
    pub target: Target,
    /// Which simulator the generated testbench targets, and which one
    /// `target: Simulation`/`Both` shells out to.
    pub simulator: Simulator,
    /// Cycle count after which the generated testbench force-finishes the
    /// simulation even if the design under test never calls `finish()`.
    pub sim_threshold: u64,
    /// Base directory the resource templates (`fifo.sv`, credit counter,
    /// SRAM blackbox) are copied from; defaults to the templates baked
    /// into this binary via `include_str!`, but can be overridden to
    /// point at a checked-out resource tree during development.
    pub resource_base: Option<PathBuf>,
    pub override_existing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_dir: PathBuf::from("."),
            target: Target::default(),
            simulator: Simulator::default(),
            sim_threshold: 1_000_000,
            resource_base: None,
            override_existing: false,
        }
    }
}

impl Config {
    /// `REPO_HOME` points at a source checkout used to resolve relative
    /// resource paths when `resource_base` isn't set explicitly;
    /// `VERILATOR_ROOT` is passed through verbatim to the generated
    /// Makefile so it can find Verilator's own runtime sources.
    pub fn repo_home() -> Option<PathBuf> {
        std::env::var_os("REPO_HOME").map(PathBuf::from)
    }

    pub fn verilator_root() -> Option<PathBuf> {
        std::env::var_os("VERILATOR_ROOT").map(PathBuf::from)
    }
}
