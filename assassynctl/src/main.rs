//! Thin CLI front end: parses run configuration, builds the embedded
//! design registered by the caller, and drives it through analysis and
//! the SystemVerilog backend. There is no textual input format here --
//! an assassyn design is ordinary Rust that calls into `assassyn-ir`'s
//! builder; this binary exists to exercise that pipeline end-to-end
//! during development.

use argh::FromArgs;
use assassyn_backend::{elaborate, Config, Simulator, Target};
use assassyn_ir::{builder, rrc, Array, DType, Flavor, Module, Owner, System, Value};
use assassyn_opt::ExternalRegistry;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(FromArgs)]
/// elaborate an assassyn design to SystemVerilog, and optionally simulate it
struct Arguments {
    /// directory to write generated files into
    #[argh(option, default = "PathBuf::from(\"out\")")]
    output_dir: PathBuf,

    /// what to produce: sv, simulation, or both
    #[argh(option, default = "String::from(\"sv\")")]
    target: String,

    /// which simulator the testbench targets: verilator or vcs
    #[argh(option, default = "String::from(\"verilator\")")]
    simulator: String,

    /// cycle count after which the testbench force-finishes
    #[argh(option, default = "1_000_000")]
    sim_threshold: u64,

    /// overwrite files that already exist in the output directory
    #[argh(switch)]
    r#override: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Arguments = argh::from_env();

    let target = Target::from_str(&args.target).map_err(anyhow::Error::msg)?;
    let simulator = Simulator::from_str(&args.simulator).map_err(anyhow::Error::msg)?;
    let config = Config {
        output_dir: args.output_dir,
        target,
        simulator,
        sim_threshold: args.sim_threshold,
        resource_base: None,
        override_existing: args.r#override,
    };

    let system = build_demo_system()?;
    let externs = ExternalRegistry::scan(&system);
    let paths = elaborate(&system, &externs, &config)?;

    for path in &paths {
        log::info!("wrote {}", path.display());
    }
    for warning in system.diagnostics().warnings() {
        log::warn!("{warning}");
    }
    Ok(())
}

/// A one-module counter design, built with the same builder API a real
/// design would use, kept here as a smoke test for the pipeline.
fn build_demo_system() -> anyhow::Result<System> {
    let mut system = System::new("Counter".into());

    let counter = rrc(Array::new("counter".into(), DType::uint(32), 1, Some(vec![0]), Owner::None));
    system.add_array(counter.clone())?;

    let driver = rrc(Module::new("main".into(), Flavor::Driver));
    system.add_module(driver.clone())?;

    builder::with_module(driver.clone(), || {
        let zero = Value::Const(assassyn_ir::Const::new(DType::uint(1), 0));
        let current = builder::array_read(counter.clone(), zero.clone())?;
        let one = Value::Const(assassyn_ir::Const::new(DType::uint(32), 1));
        let next = builder::binary(assassyn_ir::BinOp::Add, current, one)?;
        builder::array_write(counter.clone(), zero, next)?;
        Ok(())
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    system.freeze().map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(system)
}
