//! Lowers one IR `Module` into a `vast` module declaration plus the
//! procedural body text (continuous assigns for combinational exprs, one
//! clocked process for everything with a side effect). `ExternalWrapper`
//! modules never reach the generic path: the top level instantiates their
//! blackbox directly from the external registry, so this returns `None`
//! for their `decl`.

use crate::verilog::emission::{
    combinational_rhs, is_effectful, lower_log_format, signal_name, value_ref_sub,
};
use assassyn_ir::{BodyElem, Flavor, ModuleRef, Opcode, System};
use assassyn_opt::InteractionMatrix;
use assassyn_utils::AsnResult;
use linked_hash_map::LinkedHashMap;
use std::collections::HashMap;
use std::rc::Rc;
use vast::v17::ast as v;

pub struct LoweredModule {
    pub name: String,
    /// `None` for an `ExternalWrapper`: there is nothing of ours to
    /// declare, the top level instantiates the registry's blackbox by its
    /// real module name instead.
    pub decl: Option<v::Module>,
    /// High exactly when this module ran this cycle. For `Pipeline`, the
    /// name of this module's own `executed` output port -- the top level
    /// wires it out through the instantiation. For everything else,
    /// nothing on the module declares such a port, so this is a constant
    /// (or, for `Downstream`, the name of its own `executed_in` input)
    /// the top level assigns its per-instance `_executed` net to
    /// directly instead of connecting it to anything.
    pub executed_signal: String,
    /// Every distinct callee this module async-calls, in first-seen
    /// order, so the top level knows which `{callee}_trigger` ports exist
    /// on this instance without re-deriving it from the matrix.
    pub trigger_callees: Vec<String>,
}

fn index_width(size: u64) -> u32 {
    if size <= 1 {
        0
    } else {
        (u64::BITS - (size - 1).leading_zeros()) as u32
    }
}

/// `vast` 0.3's `Sequential` has no raw-statement variant, so a
/// semicolon-terminated raw statement is wrapped as a bare reference
/// expression instead -- it prints verbatim, and `SeqExpr` supplies the
/// trailing `;` itself.
fn raw_seq(line: &str) -> v::Sequential {
    v::Sequential::new_seqexpr(v::Expr::new_ref(line.trim_end().trim_end_matches(';')))
}

fn array_we(array: &str) -> String {
    format!("{array}_we")
}
fn array_widx(array: &str) -> String {
    format!("{array}_widx")
}
fn array_wdata(array: &str) -> String {
    format!("{array}_wdata")
}
fn array_ridx(array: &str, global_index: usize) -> String {
    format!("ridx_{array}_{global_index}")
}
fn array_rdata(array: &str, global_index: usize) -> String {
    format!("rdata_{array}_{global_index}")
}
fn expose_out(vname: &str) -> String {
    format!("expose_{vname}")
}
fn expose_out_valid(vname: &str) -> String {
    format!("valid_{vname}")
}
fn expose_in(producer: &str, vname: &str) -> String {
    format!("expose_in_{producer}_{vname}")
}
fn expose_in_valid(producer: &str, vname: &str) -> String {
    format!("valid_in_{producer}_{vname}")
}
fn trigger_out(callee: &str) -> String {
    format!("{callee}_trigger")
}

pub fn lower_module(
    module: &ModuleRef,
    system: &System,
    matrix: &InteractionMatrix,
) -> AsnResult<LoweredModule> {
    let module_borrow = module.borrow();
    let name = module_borrow.name().to_string();

    if let Flavor::ExternalWrapper { .. } = module_borrow.flavor() {
        return Ok(LoweredModule {
            name,
            decl: None,
            executed_signal: "1'b1".to_string(),
            trigger_callees: Vec::new(),
        });
    }

    let mut decl = v::Module::new(&name);
    decl.add_input("clk", 1);
    decl.add_input("rst_n", 1);

    for port in module_borrow.ports() {
        let port = port.borrow();
        let pname = port.name().to_string();
        let width = port.scalar_ty().get_bits() as u32;
        decl.add_input(&format!("{pname}_valid"), 1);
        decl.add_input(&format!("{pname}_data"), width as u64);
        decl.add_output(&format!("{pname}_ready"), 1);
    }

    let module_key = Rc::as_ptr(module) as usize;

    // Array write ports: one `{array}_we`/`{array}_widx`/`{array}_wdata`
    // triple per array this module has an assigned write-port index for.
    // `{array}_widx` is omitted for single-entry arrays, matching every
    // other size-1 special case in this lowering.
    let mut write_sites: LinkedHashMap<usize, Vec<(Option<String>, String, String)>> = LinkedHashMap::new();
    for array_ref in system.arrays() {
        let array = array_ref.borrow();
        if array.write_port_of(module_key).is_none() {
            continue;
        }
        let array_name = array.name().to_string();
        let data_width = array.scalar_ty().get_bits() as u32;
        let idx_width = index_width(array.size());
        decl.add_output(&array_we(&array_name), 1);
        if idx_width > 0 {
            decl.add_output(&array_widx(&array_name), idx_width as u64);
        }
        decl.add_output(&array_wdata(&array_name), data_width as u64);
        write_sites.insert(Rc::as_ptr(&array_ref) as usize, Vec::new());
    }

    // Array read ports: one `ridx_<array>_<g>`/`rdata_<array>_<g>` pair
    // per read site in this module, `g` being the read's system-wide
    // first-seen index (also the register file's reader-port index).
    let mut read_sites: Vec<(usize, usize, String, u32, u32)> = Vec::new(); // (expr_ptr, global_index, array_name, idx_width, data_width)
    for array_ref in system.arrays() {
        let array = array_ref.borrow();
        for site in matrix.reads_of(&array_ref) {
            if !Rc::ptr_eq(&site.reader, module) {
                continue;
            }
            let array_name = array.name().to_string();
            let idx_width = index_width(array.size());
            let data_width = array.scalar_ty().get_bits() as u32;
            if idx_width > 0 {
                decl.add_output(&array_ridx(&array_name, site.global_index), idx_width as u64);
            }
            decl.add_input(&array_rdata(&array_name, site.global_index), data_width as u64);
            read_sites.push((
                Rc::as_ptr(&site.read_expr) as usize,
                site.global_index,
                array_name,
                idx_width,
                data_width,
            ));
        }
    }

    // Cross-module value exposures: this module's own produced values
    // that another module consumes get an output port; values this
    // module consumes from elsewhere get an input port, and every operand
    // referencing them is redirected there instead of a bare `w_<name>`.
    let mut subst: HashMap<usize, String> = HashMap::new();
    let mut declared_in_ports: std::collections::HashSet<String> = std::collections::HashSet::new();
    for exposure in matrix.exposures_of(module) {
        let producer_name = exposure.producer.borrow().name().to_string();
        let vname = exposure
            .value_expr
            .borrow()
            .name()
            .expect("exposed value must be named")
            .to_string();
        let width = exposure.value_expr.borrow().ty().get_bits() as u32;
        let in_port = expose_in(&producer_name, &vname);
        if declared_in_ports.insert(in_port.clone()) {
            decl.add_input(&in_port, width as u64);
            decl.add_input(&expose_in_valid(&producer_name, &vname), 1);
        }
        subst.insert(Rc::as_ptr(&exposure.value_expr) as usize, in_port);
    }
    for exposure in matrix.exposures_from(module) {
        let vname = exposure
            .value_expr
            .borrow()
            .name()
            .expect("exposed value must be named")
            .to_string();
        let width = exposure.value_expr.borrow().ty().get_bits() as u32;
        decl.add_output(&expose_out(&vname), width as u64);
        decl.add_output(&expose_out_valid(&vname), 1);
    }

    // Per-callee trigger: an 8-bit count of how many guarded async-call
    // sites targeting that callee fired in this module this cycle. The
    // top level sums every caller's count into the callee's credit
    // counter, so two simultaneous calls from different callers (or two
    // sites in the same module) both register instead of the last one
    // silently winning.
    let mut trigger_callees: Vec<String> = Vec::new();
    let mut trigger_sites: LinkedHashMap<String, Vec<Option<String>>> = LinkedHashMap::new();
    for site in matrix.async_calls_of(module) {
        let callee_name = site.callee.borrow().name().to_string();
        if !trigger_sites.contains_key(&callee_name) {
            decl.add_output(&trigger_out(&callee_name), 8);
            trigger_callees.push(callee_name.clone());
        }
        let guard = site.meta_cond.as_ref().map(|v| value_ref_sub(v, &subst));
        trigger_sites.entry(callee_name).or_default().push(guard);
    }

    // Outbound FIFO pushes: one `{port}_push_valid`/`{port}_push_data`
    // output pair per port this module's body pushes onto, so the top
    // level has somewhere to connect its priority-mux across callers.
    let mut push_ports: LinkedHashMap<usize, (String, u32)> = LinkedHashMap::new();
    for elem in module_borrow.body() {
        if let BodyElem::Expr(expr) = elem {
            if let Opcode::FifoPush { port, .. } = expr.borrow().opcode() {
                let key = Rc::as_ptr(port) as usize;
                if !push_ports.contains_key(&key) {
                    let port_name = port.borrow().name().to_string();
                    let width = port.borrow().scalar_ty().get_bits() as u32;
                    decl.add_output(&format!("{port_name}_push_valid"), 1);
                    decl.add_output(&format!("{port_name}_push_data"), width as u64);
                    push_ports.insert(key, (port_name, width));
                }
            }
        }
    }

    let credit_nonzero_port = "credit_nonzero".to_string();
    if matches!(module_borrow.flavor(), Flavor::Pipeline { .. }) {
        decl.add_input(&credit_nonzero_port, 1);
        decl.add_output("executed", 1);
    } else if module_borrow.is_downstream() {
        decl.add_input("executed_in", 1);
    }

    // For `Pipeline` this names this module's own `executed` output port
    // (the top level wires it out through the instantiation, not by
    // parsing this string); for everything else it's a constant the top
    // level assigns directly, since there's no such port to read.
    let executed_signal = match module_borrow.flavor() {
        Flavor::Driver => "1'b1".to_string(),
        Flavor::Pipeline { .. } => "executed".to_string(),
        Flavor::Downstream => "executed_in".to_string(),
        Flavor::ExternalWrapper { .. } => unreachable!("handled above"),
    };

    let mut comb_body = Vec::new();
    let mut clocked_body = Vec::new();
    let mut finish_terms: Vec<String> = Vec::new();

    // `_push_valid` and `_ready` are one-cycle pulses: default them low
    // each cycle so a push or pop from a prior cycle doesn't latch high
    // forever; the body's guarded statements below override this default
    // when they fire, since later assignments in the same process win.
    for (port_name, _) in push_ports.values() {
        clocked_body.push(format!("{port_name}_push_valid <= 1'b0;"));
    }
    for port in module_borrow.ports() {
        clocked_body.push(format!("{}_ready <= 1'b0;", port.borrow().name()));
    }

    for elem in module_borrow.body() {
        let expr_ref = match elem {
            BodyElem::Expr(expr) => expr,
            BodyElem::PushPredicate(_) | BodyElem::PopPredicate => continue,
        };
        let expr_key = Rc::as_ptr(expr_ref) as usize;
        let expr = expr_ref.borrow();
        let opcode = expr.opcode();
        let result_name = expr.name().map(|n| n.to_string());
        let width = expr.ty().get_bits() as u32;

        if let Some(name) = &result_name {
            if !is_effectful(opcode) {
                decl.add_decl(v::Decl::new_logic(&signal_name(name), width as u64));
            }
        }

        let guard = expr.meta_cond().map(|v| value_ref_sub(v, &subst));

        if let Opcode::ArrayRead { index, .. } = opcode {
            let (_, global_index, array_name, idx_width, _) = read_sites
                .iter()
                .find(|(ptr, ..)| *ptr == expr_key)
                .expect("every ArrayRead body element has a matching read-site entry");
            if *idx_width > 0 {
                comb_body.push(format!(
                    "assign {} = {};",
                    array_ridx(array_name, *global_index),
                    value_ref_sub(index, &subst)
                ));
            }
            if let Some(name) = &result_name {
                comb_body.push(format!(
                    "assign {} = {};",
                    signal_name(name),
                    array_rdata(array_name, *global_index)
                ));
            }
            continue;
        }

        if let Some(rhs) = combinational_rhs(opcode, width as u64, &subst) {
            if let Some(name) = &result_name {
                comb_body.push(format!("assign {} = {rhs};", signal_name(name)));
            }
            continue;
        }

        match opcode {
            Opcode::ArrayWrite { array, index, value } => {
                let array_key = Rc::as_ptr(array) as usize;
                if let Some(sites) = write_sites.get_mut(&array_key) {
                    sites.push((
                        guard.clone(),
                        value_ref_sub(index, &subst),
                        value_ref_sub(value, &subst),
                    ));
                }
            }
            Opcode::FifoPush { port, value, .. } => {
                let port_name = port.borrow().name().to_string();
                let stmt = format!("{port_name}_push_data <= {};", value_ref_sub(value, &subst));
                clocked_body.push(guarded(&guard, &stmt));
                clocked_body.push(guarded(&guard, &format!("{port_name}_push_valid <= 1'b1;")));
            }
            Opcode::FifoPop { port } => {
                let port_name = port.borrow().name().to_string();
                clocked_body.push(guarded(&guard, &format!("{port_name}_ready <= 1'b1;")));
            }
            Opcode::AsyncCall { .. } => {
                // The trigger count assembled below already reflects this
                // site's guard; nothing to emit per-site here.
            }
            Opcode::Log { fmt, args } => {
                let (sv_fmt, rendered) = lower_log_format(fmt, args, &subst);
                let args_text = if rendered.is_empty() {
                    String::new()
                } else {
                    format!(", {}", rendered.join(", "))
                };
                clocked_body.push(guarded(&guard, &format!("$display(\"{sv_fmt}\"{args_text});")));
            }
            Opcode::Finish => {
                clocked_body.push(guarded(&guard, "$finish;"));
                finish_terms.push(guard.clone().unwrap_or_else(|| "1'b1".to_string()));
            }
            _ => {}
        }
    }

    for exposure in matrix.exposures_from(module) {
        let vname = exposure
            .value_expr
            .borrow()
            .name()
            .expect("exposed value must be named")
            .to_string();
        let valid = exposure
            .value_expr
            .borrow()
            .meta_cond()
            .map(|v| value_ref_sub(v, &subst))
            .unwrap_or_else(|| "1'b1".to_string());
        comb_body.push(format!("assign {} = {};", expose_out(&vname), signal_name(&vname)));
        comb_body.push(format!("assign {} = {};", expose_out_valid(&vname), valid));
    }

    for (array_key, sites) in &write_sites {
        let array_name = system
            .arrays()
            .find(|a| Rc::as_ptr(a) as usize == *array_key)
            .map(|a| a.borrow().name().to_string())
            .expect("write-port array must exist in the system");
        // Last-listed site wins when more than one guard is true the same
        // cycle, matching program (construction) order -- the same rule
        // the interaction matrix and write-port allocator use elsewhere.
        let mut we = "1'b0".to_string();
        let mut widx = "'0".to_string();
        let mut wdata = "'0".to_string();
        for (guard, idx, val) in sites {
            let g = guard.clone().unwrap_or_else(|| "1'b1".to_string());
            we = format!("({g} ? 1'b1 : {we})");
            widx = format!("({g} ? {idx} : {widx})");
            wdata = format!("({g} ? {val} : {wdata})");
        }
        comb_body.push(format!("assign {} = {we};", array_we(&array_name)));
        if index_width(
            system
                .arrays()
                .find(|a| Rc::as_ptr(a) as usize == *array_key)
                .unwrap()
                .borrow()
                .size(),
        ) > 0
        {
            comb_body.push(format!("assign {} = {widx};", array_widx(&array_name)));
        }
        comb_body.push(format!("assign {} = {wdata};", array_wdata(&array_name)));
    }

    for (callee_name, guards) in &trigger_sites {
        let terms = guards
            .iter()
            .map(|g| match g {
                Some(g) => format!("({g} ? 8'd1 : 8'd0)"),
                None => "8'd1".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" + ");
        comb_body.push(format!("assign {} = {terms};", trigger_out(callee_name)));
    }

    if matches!(module_borrow.flavor(), Flavor::Pipeline { .. }) {
        comb_body.push(format!(
            "assign executed = {};",
            executed_signal_expr(&module_borrow, &credit_nonzero_port)
        ));
    }

    // One `finish` output, high the cycle any of this module's FINISH
    // sites fire, so the top level can aggregate a `global_finish` signal
    // without re-deriving per-site guards from the matrix itself.
    if !finish_terms.is_empty() {
        decl.add_output("finish", 1);
        comb_body.push(format!("assign finish = {};", finish_terms.join(" | ")));
    }

    let mut always_comb = v::ParallelProcess::new_always_comb();
    for line in &comb_body {
        always_comb.add_seq(raw_seq(line));
    }
    decl.add_stmt(v::Stmt::new_parallel(always_comb));

    if !clocked_body.is_empty() {
        let mut always_ff = v::ParallelProcess::new_always_ff();
        always_ff.set_event(v::Sequential::Event(v::EventTy::Posedge, v::Expr::new_ref("clk")));
        for line in &clocked_body {
            always_ff.add_seq(raw_seq(line));
        }
        decl.add_stmt(v::Stmt::new_parallel(always_ff));
    }

    Ok(LoweredModule {
        name,
        decl: Some(decl),
        executed_signal,
        trigger_callees,
    })
}

fn guarded(cond: &Option<String>, stmt: &str) -> String {
    match cond {
        Some(c) => format!("if ({c}) {stmt}"),
        None => stmt.to_string(),
    }
}

fn executed_signal_expr(module: &std::cell::Ref<assassyn_ir::Module>, credit_nonzero_port: &str) -> String {
    let mut terms = vec![credit_nonzero_port.to_string()];
    for port in module.ports() {
        terms.push(format!("{}_valid", port.borrow().name()));
    }
    terms.join(" & ")
}
