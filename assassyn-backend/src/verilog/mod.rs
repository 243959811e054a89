pub mod emission;
pub mod module_lowering;
pub mod testbench;
pub mod top_level;

use crate::traits::{Backend, LoweringContext};
use assassyn_utils::AsnResult;
use std::fs;
use std::path::PathBuf;

#[derive(Default)]
pub struct VerilogBackend;

impl Backend for VerilogBackend {
    fn name(&self) -> &'static str {
        "verilog"
    }

    fn validate(&self, ctx: &LoweringContext) -> AsnResult<()> {
        for array in ctx.system.arrays() {
            let array = array.borrow();
            if array.write_port_count() == 0 && !array.is_payload() {
                ctx.system.warn(format!(
                    "array `{}` has no writers; it will read as its initializer forever",
                    array.name()
                ));
            }
        }
        Ok(())
    }

    fn emit(&self, ctx: &LoweringContext) -> AsnResult<Vec<PathBuf>> {
        fs::create_dir_all(&ctx.config.output_dir)?;
        let top = top_level::build_top_level(ctx.system, ctx.matrix, ctx.externs)?;
        let design_path = ctx.config.output_dir.join(format!("{}.sv", ctx.system.name()));
        let design_text = top.decls.iter().map(|m| m.to_string()).collect::<Vec<_>>().join("\n\n");
        write_file(&design_path, &design_text, ctx.config.override_existing)?;

        let tb_text = testbench::render_testbench(ctx.system, ctx.config);
        let tb_path = ctx.config.output_dir.join("testbench.sv");
        write_file(&tb_path, &tb_text, ctx.config.override_existing)?;

        let resources_dir = ctx.config.output_dir.join("resources");
        fs::create_dir_all(&resources_dir)?;
        let fifo_path = resources_dir.join("fifo.sv");
        write_file(&fifo_path, include_str!("../resources/fifo.sv"), ctx.config.override_existing)?;
        let credit_path = resources_dir.join("credit_counter.sv");
        write_file(
            &credit_path,
            include_str!("../resources/credit_counter.sv"),
            ctx.config.override_existing,
        )?;
        let sram_path = resources_dir.join("sram.sv");
        write_file(&sram_path, include_str!("../resources/sram.sv"), ctx.config.override_existing)?;
        let regfile_path = resources_dir.join("register_file.sv");
        write_file(
            &regfile_path,
            include_str!("../resources/register_file.sv"),
            ctx.config.override_existing,
        )?;

        let mut written = vec![design_path, tb_path, fifo_path, credit_path, sram_path, regfile_path];
        for decl in ctx.externs.iter() {
            let Some(source_path) = &decl.source_path else {
                continue;
            };
            let dest = resources_dir.join(format!("{}.sv", decl.module_name));
            let contents = fs::read_to_string(source_path)?;
            write_file(&dest, &contents, ctx.config.override_existing)?;
            written.push(dest);
        }

        Ok(written)
    }
}

fn write_file(path: &std::path::Path, contents: &str, override_existing: bool) -> AsnResult<()> {
    if path.exists() && !override_existing {
        log::warn!("{} already exists; leaving it in place (pass --override to replace)", path.display());
        return Ok(());
    }
    fs::write(path, contents)?;
    Ok(())
}
