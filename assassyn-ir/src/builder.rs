//! The construction-time context: which module is currently being built,
//! which predicate is currently active, and the caches that give
//! repeated array reads under the same predicate a single `Expr`.

use crate::array::ArrayRef;
use crate::expr::{new_expr, BinOp, ExprRef, Opcode, UnaryOp};
use crate::module::{BodyElem, ModuleRef};
use crate::naming::Namer;
use crate::types::DType;
use crate::value::{fold_binary, fold_concat, fold_slice, Const, Value};
use assassyn_utils::{Error, Id};
use std::cell::RefCell;
use std::collections::HashMap;

/// One entry of the predicate-frame stack: the AND of this frame's
/// condition with every ancestor frame's condition (so `meta_cond` is a
/// cheap clone rather than a re-walk of the whole stack), plus a cache of
/// array reads made while this frame was the innermost one active.
struct PredicateFrame {
    effective: Value,
    read_cache: HashMap<(usize, usize), ExprRef>,
}

#[derive(Default)]
struct Builder {
    module_stack: Vec<ModuleRef>,
    frames: Vec<PredicateFrame>,
    /// Array reads made with no predicate frame active; reset whenever a
    /// new module scope is entered.
    base_read_cache: HashMap<(usize, usize), ExprRef>,
    namer: Namer,
}

thread_local! {
    static BUILDER: RefCell<Builder> = RefCell::new(Builder::default());
}

/// Enters `module`'s construction scope for the duration of `f`. Nested
/// calls are rejected: a module body never contains another module's
/// statements. Exiting with a non-empty predicate-frame stack is itself
/// an error (`LeakedPredicate`) -- builder state is still fully reset
/// before returning so the next `with_module` call is unaffected.
pub fn with_module<F, R>(module: ModuleRef, f: F) -> Result<R, Error>
where
    F: FnOnce() -> Result<R, Error>,
{
    BUILDER.with(|b| {
        let mut b = b.borrow_mut();
        if !b.module_stack.is_empty() {
            return Err(Error::missing_module_context(
                "module construction scopes do not nest",
            ));
        }
        b.module_stack.push(module);
        b.frames.clear();
        b.base_read_cache.clear();
        Ok(())
    })?;

    let result = f();

    let leaked = BUILDER.with(|b| !b.borrow().frames.is_empty());
    BUILDER.with(|b| {
        let mut b = b.borrow_mut();
        b.frames.clear();
        b.base_read_cache.clear();
        b.module_stack.pop();
    });

    if leaked {
        return Err(Error::leaked_predicate(
            "module exited with a non-empty predicate stack",
        ));
    }
    result
}

pub fn current_module() -> Result<ModuleRef, Error> {
    BUILDER.with(|b| {
        b.borrow()
            .module_stack
            .last()
            .cloned()
            .ok_or_else(|| Error::missing_module_context("no module is currently being built"))
    })
}

/// Pushes a new predicate frame ANDed with whatever was already active,
/// and emits a `PushPredicate(cond)` marker into the current module body.
/// Used by `with Condition(c)` / `with Cycle(n)` scopes.
pub fn push_predicate(cond: Value) -> Result<(), Error> {
    if cond.ty().get_bits() != 1 {
        return Err(Error::type_mismatch(
            "predicate condition must be a 1-bit value",
        ));
    }
    let module = current_module()?;
    let effective = match current_predicate() {
        Some(prev) => and_values(prev, cond.clone()),
        None => cond.clone(),
    };
    module.borrow_mut().push_body(BodyElem::PushPredicate(cond));
    BUILDER.with(|b| {
        b.borrow_mut().frames.push(PredicateFrame {
            effective,
            read_cache: HashMap::new(),
        })
    });
    Ok(())
}

/// Pops the innermost predicate frame, discarding its array-read cache,
/// and emits a matching `PopPredicate` marker.
pub fn pop_predicate() -> Result<(), Error> {
    let module = current_module()?;
    let popped = BUILDER.with(|b| b.borrow_mut().frames.pop());
    if popped.is_none() {
        return Err(Error::leaked_predicate(
            "popped a predicate frame that was never pushed",
        ));
    }
    module.borrow_mut().push_body(BodyElem::PopPredicate);
    Ok(())
}

/// The AND of every predicate frame currently active, or `None` (the
/// implicit constant-true) if no frame is active.
pub fn current_predicate() -> Option<Value> {
    BUILDER.with(|b| b.borrow().frames.last().map(|f| f.effective.clone()))
}

fn and_values(lhs: Value, rhs: Value) -> Value {
    if let Some((ty, bits)) = fold_binary(BinOp::And, &lhs, &rhs) {
        return Value::Const(Const::new(ty, bits));
    }
    let module = current_module().expect("predicate AND requires an active module");
    let opcode = Opcode::Binary {
        op: BinOp::And,
        lhs,
        rhs,
    };
    let expr = new_expr(DType::uint(1), opcode, std::rc::Rc::downgrade(&module), current_predicate());
    module.borrow_mut().push_body(BodyElem::Expr(expr.clone()));
    Value::Expr(expr)
}

/// Appends a freshly built expression to the currently active module's
/// body, tagging it with the currently active predicate frame, and
/// assigns it a deterministic name.
pub fn push_expr(ty: DType, opcode: Opcode, explicit_name: Option<Id>) -> Result<Value, Error> {
    let module = current_module()?;
    let meta_cond = current_predicate();
    let expr = new_expr(ty, opcode, std::rc::Rc::downgrade(&module), meta_cond);
    let name = BUILDER.with(|b| b.borrow_mut().namer.name_expr(explicit_name));
    expr.borrow_mut().set_name(name);
    module.borrow_mut().push_body(BodyElem::Expr(expr.clone()));
    Ok(Value::Expr(expr))
}

/// Reads `array[index]`, reusing a prior read if one is visible from the
/// current predicate scope: the lookup probes the innermost frame's
/// cache first, then each ancestor frame in turn, then the module-level
/// (no-predicate) cache. A hit anywhere on that chain is legitimate
/// reuse (the frame that produced it is still active); once a frame
/// pops its cache is gone, so sibling scopes never alias.
pub fn array_read(array: ArrayRef, index: Value) -> Result<Value, Error> {
    current_module()?;
    let key = (std::rc::Rc::as_ptr(&array) as usize, index.identity_key());

    let cached = BUILDER.with(|b| {
        let b = b.borrow();
        b.frames
            .iter()
            .rev()
            .find_map(|frame| frame.read_cache.get(&key).cloned())
            .or_else(|| b.base_read_cache.get(&key).cloned())
    });
    if let Some(cached) = cached {
        log::trace!("array read cache hit for array `{}`", array.borrow().name());
        return Ok(Value::Expr(cached));
    }

    let ty = array.borrow().scalar_ty().clone();
    let opcode = Opcode::ArrayRead {
        array: array.clone(),
        index,
    };
    let value = push_expr(ty, opcode, None)?;
    if let Value::Expr(expr) = &value {
        BUILDER.with(|b| {
            let mut b = b.borrow_mut();
            match b.frames.last_mut() {
                Some(frame) => {
                    frame.read_cache.insert(key, expr.clone());
                }
                None => {
                    b.base_read_cache.insert(key, expr.clone());
                }
            }
        });
    }
    Ok(value)
}

/// Drops every cached read of `array`, at every currently active scope
/// (the module-level cache and every predicate frame's cache). A write
/// to an array makes any subsequent read observe different data, so the
/// two must never share a node; called by [`array_write`] after the
/// write expression is constructed.
pub fn invalidate_array_read_cache(array: &ArrayRef) {
    let target = std::rc::Rc::as_ptr(array) as usize;
    BUILDER.with(|b| {
        let mut b = b.borrow_mut();
        b.base_read_cache.retain(|key, _| key.0 != target);
        for frame in b.frames.iter_mut() {
            frame.read_cache.retain(|key, _| key.0 != target);
        }
    });
}

/// Schedules `array[index] <- value`, invalidating any cached reads of
/// `array` so later `array_read` calls in this scope miss and observe
/// the write.
pub fn array_write(array: ArrayRef, index: Value, value: Value) -> Result<Value, Error> {
    let opcode = Opcode::ArrayWrite {
        array: array.clone(),
        index,
        value,
    };
    let result = push_expr(DType::void(), opcode, None)?;
    invalidate_array_read_cache(&array);
    Ok(result)
}

pub fn unary(op: UnaryOp, operand: Value, ty: DType) -> Result<Value, Error> {
    push_expr(ty, Opcode::Unary { op, operand }, None)
}

pub fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, Error> {
    if let Some((ty, bits)) = fold_binary(op, &lhs, &rhs) {
        return Ok(Value::Const(Const::new(ty, bits)));
    }
    let ty = match op {
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => DType::uint(1),
        _ => lhs.ty(),
    };
    push_expr(ty, Opcode::Binary { op, lhs, rhs }, None)
}

/// Inclusive bit range `[lo, hi]` of `operand`, e.g. `v[7:0]`. Folds to a
/// new constant of width `hi - lo + 1` when `operand` is constant.
pub fn slice(operand: Value, lo: u64, hi: u64) -> Result<Value, Error> {
    if hi < lo {
        return Err(Error::type_mismatch(
            "slice upper bound must be >= lower bound",
        ));
    }
    if let Value::Const(c) = &operand {
        let (ty, bits) = fold_slice(c, lo, hi);
        return Ok(Value::Const(Const::new(ty, bits)));
    }
    push_expr(DType::bits(hi - lo + 1), Opcode::Slice { operand, lo, hi }, None)
}

/// Concatenates `parts` MSB-first (`parts[0]` lands in the high bits),
/// folding to a single constant when every part is constant.
pub fn concat(parts: Vec<Value>) -> Result<Value, Error> {
    if parts.is_empty() {
        return Err(Error::type_mismatch("concat requires at least one operand"));
    }
    if parts.iter().all(Value::is_const) {
        let consts: Vec<Const> = parts
            .iter()
            .map(|p| p.as_const().expect("checked is_const above").clone())
            .collect();
        let (ty, bits) = fold_concat(&consts);
        return Ok(Value::Const(Const::new(ty, bits)));
    }
    let width: u64 = parts.iter().map(|p| p.ty().get_bits()).sum();
    push_expr(DType::bits(width), Opcode::Concat { parts }, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{Array, Owner};
    use crate::module::{Flavor, Module};
    use crate::rrc;

    fn fresh_driver(name: &str) -> ModuleRef {
        rrc(Module::new(name.into(), Flavor::Driver))
    }

    #[test]
    fn array_reads_under_the_same_predicate_share_one_expr() {
        let module = fresh_driver("m1");
        let array = rrc(Array::new("regs".into(), DType::uint(8), 4, None, Owner::None));
        let idx = Value::Const(Const::new(DType::uint(2), 0));

        with_module(module, || {
            let a = array_read(array.clone(), idx.clone())?;
            let b = array_read(array.clone(), idx.clone())?;
            assert_eq!(a, b);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn reads_nested_inside_an_active_predicate_reuse_the_outer_cache() {
        let module = fresh_driver("m2");
        let array = rrc(Array::new("regs2".into(), DType::uint(8), 4, None, Owner::None));
        let idx = Value::Const(Const::new(DType::uint(2), 0));

        with_module(module, || {
            let outside = array_read(array.clone(), idx.clone())?;
            let cond = Value::Const(Const::new(DType::uint(1), 1));
            push_predicate(cond)?;
            let inside = array_read(array.clone(), idx.clone())?;
            pop_predicate()?;
            assert_eq!(outside, inside);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn scenario_b_reads_inside_and_after_a_predicate_scope_are_distinct() {
        let module = fresh_driver("m3");
        let array = rrc(Array::new("regs3".into(), DType::uint(8), 4, None, Owner::None));
        let idx = Value::Const(Const::new(DType::uint(2), 0));

        with_module(module, || {
            let cond = Value::Const(Const::new(DType::uint(1), 1));
            push_predicate(cond)?;
            let a = array_read(array.clone(), idx.clone())?;
            pop_predicate()?;
            let b = array_read(array.clone(), idx.clone())?;
            assert_ne!(a, b);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn sibling_predicate_frames_do_not_alias_even_with_the_same_condition_object() {
        let module = fresh_driver("m4");
        let array = rrc(Array::new("regs4".into(), DType::uint(8), 4, None, Owner::None));
        let idx = Value::Const(Const::new(DType::uint(2), 0));
        let cond = Value::Const(Const::new(DType::uint(1), 1));

        with_module(module, || {
            push_predicate(cond.clone())?;
            let a = array_read(array.clone(), idx.clone())?;
            pop_predicate()?;

            push_predicate(cond.clone())?;
            let b = array_read(array.clone(), idx.clone())?;
            pop_predicate()?;

            assert_ne!(a, b);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn push_and_pop_predicate_emit_balanced_body_markers() {
        let module = fresh_driver("m5");
        let cond = Value::Const(Const::new(DType::uint(1), 1));

        with_module(module.clone(), || {
            push_predicate(cond)?;
            pop_predicate()?;
            Ok(())
        })
        .unwrap();

        let body = module.borrow();
        let body = body.body();
        let pushes = body.iter().filter(|e| matches!(e, BodyElem::PushPredicate(_))).count();
        let pops = body.iter().filter(|e| matches!(e, BodyElem::PopPredicate)).count();
        assert_eq!(pushes, pops);
        assert_eq!(pushes, 1);
    }

    #[test]
    fn leaked_predicate_is_reported_and_builder_state_recovers() {
        let leaky = fresh_driver("m6");
        let cond = Value::Const(Const::new(DType::uint(1), 1));
        let result = with_module(leaky, || {
            push_predicate(cond)?;
            Ok(())
        });
        assert!(result.is_err());

        // The next `with_module` call must not be permanently blocked by
        // the leaked state of the previous one.
        let next = fresh_driver("m7");
        assert!(with_module(next, || Ok(())).is_ok());
    }

    #[test]
    fn nested_module_scopes_are_rejected() {
        let outer = fresh_driver("m8");
        let inner = fresh_driver("m9");
        let result = with_module(outer, || {
            with_module(inner, || Ok(())).map_err(|e| e)?;
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn slice_and_concat_fold_over_constants() {
        let a = Value::Const(Const::new(DType::uint(8), 0b1011_0010));
        let sliced = slice(a.clone(), 4, 7).unwrap();
        let sliced = sliced.as_const().unwrap();
        assert_eq!(sliced.bits(), 0b1011);
        assert_eq!(sliced.ty().get_bits(), 4);

        let hi = Value::Const(Const::new(DType::uint(4), 0b1010));
        let lo = Value::Const(Const::new(DType::uint(4), 0b0101));
        let joined = concat(vec![hi, lo]).unwrap();
        let joined = joined.as_const().unwrap();
        assert_eq!(joined.bits(), 0b1010_0101);
        assert_eq!(joined.ty().get_bits(), 8);
    }
}
