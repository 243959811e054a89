//! Testbench emission: a clock/reset generator and a simulation-length
//! guard wired around the instantiated top level, with the simulator
//! choice threaded in only where the driver script and VCD conventions
//! actually differ.

use crate::config::{Config, Simulator};
use assassyn_ir::System;

pub fn render_testbench(system: &System, config: &Config) -> String {
    let top_name = format!("{}Top", system.name());
    let dump_stmt = match config.simulator {
        Simulator::Verilator => {
            "initial begin $dumpfile(\"trace.vcd\"); $dumpvars(0, tb); end".to_string()
        }
        Simulator::Vcs => {
            "initial begin $vcdplusfile(\"trace.vpd\"); $vcdpluson(); end".to_string()
        }
    };

    format!(
        r#"// Generated testbench for `{system_name}`; targets {simulator:?}.
module tb;
    logic clk;
    logic rst_n;

    {top_name} dut (
        .clk(clk),
        .rst_n(rst_n)
    );

    initial clk = 1'b0;
    always #5 clk = ~clk;

    initial begin
        rst_n = 1'b0;
        repeat (4) @(posedge clk);
        rst_n = 1'b1;
    end

    {dump_stmt}

    initial begin
        repeat ({threshold}) @(posedge clk);
        $display("simulation reached the cycle threshold without a `finish()` call");
        $finish;
    end
endmodule
"#,
        system_name = system.name(),
        simulator = config.simulator,
        top_name = top_name,
        dump_stmt = dump_stmt,
        threshold = config.sim_threshold,
    )
}
