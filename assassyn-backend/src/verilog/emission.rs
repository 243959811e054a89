//! Expression-level lowering: turns a `Value`/`Opcode` into SystemVerilog
//! text. Declarative structure (module ports, instances) goes through
//! `vast`; procedural and continuous-assignment bodies are built with
//! plain `format!` templates.

use assassyn_ir::{BinOp, CastOp, Const, Opcode, UnaryOp, Value};
use std::collections::HashMap;
use std::rc::Rc;

pub fn signal_name(expr_name: &str) -> String {
    format!("w_{expr_name}")
}

/// Renders a constant as a sized SystemVerilog literal, e.g. `8'd42` or,
/// for negative signed constants, the two's-complement bit pattern so the
/// literal reads unambiguously regardless of the destination's signedness.
pub fn literal(width: u64, bits: i128) -> String {
    let mask = if width >= 127 { u128::MAX } else { (1u128 << width) - 1 };
    let unsigned = (bits as u128) & mask;
    format!("{width}'d{unsigned}")
}

pub fn const_text(c: &Const) -> String {
    literal(c.ty().get_bits(), c.bits())
}

/// The SystemVerilog signal reference a `Value` evaluates to: a named
/// wire for an `Expr`, or an inline literal for a `Const`.
pub fn value_ref(value: &Value) -> String {
    match value {
        Value::Const(c) => const_text(c),
        Value::Expr(e) => {
            let e = e.borrow();
            signal_name(&e.name().expect("expr must be named before emission").to_string())
        }
    }
}

/// Like [`value_ref`], but redirects an `Expr` operand produced by another
/// module to the local port a cross-module exposure wired it through
/// (keyed by the producing expression's identity), instead of the bare
/// `w_<name>` signal that only exists inside the producer's own module.
pub fn value_ref_sub(value: &Value, subst: &HashMap<usize, String>) -> String {
    if let Value::Expr(e) = value {
        if let Some(local) = subst.get(&(Rc::as_ptr(e) as usize)) {
            return local.clone();
        }
    }
    value_ref(value)
}

fn binop_sv(op: BinOp) -> &'static str {
    use BinOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        And => "&",
        Or => "|",
        Xor => "^",
        Shl => "<<",
        Shr => ">>",
        Lt => "<",
        Le => "<=",
        Gt => ">",
        Ge => ">=",
        Eq => "==",
        Ne => "!=",
    }
}

fn cast_text(op: CastOp, operand: &str, from_width: u64, to_width: u64) -> String {
    match op {
        CastOp::ZeroExtend => format!("{{{{{}{{1'b0}}}}, {operand}}}", to_width.saturating_sub(from_width)),
        CastOp::SignExtend => format!(
            "{{{{{}{{{operand}[{}]}}}}, {operand}}}",
            to_width.saturating_sub(from_width),
            from_width.saturating_sub(1)
        ),
        CastOp::Truncate => format!("{operand}[{}:0]", to_width.saturating_sub(1)),
        CastOp::Bitcast => operand.to_string(),
    }
}

/// Renders the combinational right-hand side of a continuous assignment
/// for a pure opcode. Returns `None` for opcodes that have side effects
/// and must instead be lowered into the clocked process (`is_effectful`),
/// or that need module-local context (`ArrayRead`'s read-port wiring) and
/// are lowered by the caller instead. `subst` redirects any operand that
/// crosses a module boundary to its local exposure port.
pub fn combinational_rhs(
    opcode: &Opcode,
    result_width: u64,
    subst: &HashMap<usize, String>,
) -> Option<String> {
    match opcode {
        Opcode::Binary { op, lhs, rhs } => Some(format!(
            "({} {} {})",
            value_ref_sub(lhs, subst),
            binop_sv(*op),
            value_ref_sub(rhs, subst)
        )),
        Opcode::Unary { op, operand } => {
            let text = value_ref_sub(operand, subst);
            Some(match op {
                UnaryOp::Neg => format!("(-{text})"),
                UnaryOp::Not => format!("(~{text})"),
            })
        }
        Opcode::Slice { operand, lo, hi } => {
            Some(format!("{}[{}:{}]", value_ref_sub(operand, subst), hi, lo))
        }
        Opcode::Concat { parts } => {
            let joined = parts
                .iter()
                .map(|p| value_ref_sub(p, subst))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("{{{joined}}}"))
        }
        Opcode::Cast { op, operand, to } => {
            let from_width = operand.ty().get_bits();
            Some(cast_text(*op, &value_ref_sub(operand, subst), from_width, to.get_bits()))
        }
        Opcode::Select { cond, then_value, else_value } => Some(format!(
            "({} ? {} : {})",
            value_ref_sub(cond, subst),
            value_ref_sub(then_value, subst),
            value_ref_sub(else_value, subst)
        )),
        Opcode::FifoValid { port } => {
            let port_name = port.borrow().name().to_string();
            Some(format!("{port_name}_valid"))
        }
        Opcode::FieldExtract { operand, field } => {
            // Record layouts are packed, so a field extract is a slice;
            // the caller resolves `field`'s bit range via the operand's
            // `DType::record_layout()` and rewrites this into a `Slice`
            // before calling `combinational_rhs` -- this branch only
            // covers the case where that rewrite hasn't happened yet and
            // falls back to a descriptive placeholder.
            let _ = (operand, field, result_width);
            None
        }
        Opcode::ArrayRead { .. }
        | Opcode::ArrayWrite { .. }
        | Opcode::FifoPush { .. }
        | Opcode::FifoPop { .. }
        | Opcode::AsyncCall { .. }
        | Opcode::Log { .. }
        | Opcode::Finish => None,
    }
}

pub fn is_effectful(opcode: &Opcode) -> bool {
    matches!(
        opcode,
        Opcode::ArrayWrite { .. }
            | Opcode::FifoPush { .. }
            | Opcode::FifoPop { .. }
            | Opcode::AsyncCall { .. }
            | Opcode::Log { .. }
            | Opcode::Finish
    )
}

/// Lowers an `{}`-style format string (the argument to `Log`) into the
/// `%d`/`%x`/`%b`/`%o`/`%s`-tagged `$display` format SystemVerilog
/// expects, picking the conversion from each argument's declared type:
/// signed integers print as `%d`, everything else defaults to `%h` (hex),
/// with an explicit `{:b}`/`{:o}`/`{:s}` placeholder overriding the
/// default for that argument.
pub fn lower_log_format(fmt: &str, args: &[Value], subst: &HashMap<usize, String>) -> (String, Vec<String>) {
    let mut out = String::with_capacity(fmt.len());
    let mut rendered_args = Vec::new();
    let mut arg_iter = args.iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut spec = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                spec.push(c2);
            }
            let arg = arg_iter.next().expect("Log format has more placeholders than arguments");
            let conv = match spec.trim_start_matches(':') {
                "b" => "%b",
                "o" => "%o",
                "s" => "%s",
                "x" => "%x",
                _ if arg.ty().is_signed() => "%d",
                _ => "%x",
            };
            out.push_str(conv);
            rendered_args.push(value_ref_sub(arg, subst));
        } else {
            out.push(c);
        }
    }
    (out, rendered_args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assassyn_ir::DType;

    #[test]
    fn literal_masks_to_the_declared_width() {
        assert_eq!(literal(8, 256), "8'd0");
        assert_eq!(literal(4, 15), "4'd15");
    }

    #[test]
    fn log_format_picks_a_conversion_per_argument() {
        let args = vec![
            Value::Const(Const::new(DType::uint(8), 5)),
            Value::Const(Const::new(DType::uint(4), 0b1010)),
        ];
        let (text, rendered) = lower_log_format("x={} y={:b}", &args, &HashMap::new());
        assert_eq!(text, "x=%x y=%b");
        assert_eq!(rendered, vec!["8'd5".to_string(), "4'd10".to_string()]);
    }
}
