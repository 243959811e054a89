//! `Value`: anything an expression can take as an operand, either an
//! immediate constant or a handle to a previously constructed `Expr`.

use crate::expr::{BinOp, ExprRef, Opcode};
use crate::types::DType;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Const(Const),
    Expr(ExprRef),
}

#[derive(Debug, Clone)]
pub struct Const {
    ty: DType,
    /// Stored as a fixed-width two's-complement payload; interpretation
    /// (signed/unsigned/bits) follows `ty`.
    bits: i128,
}

impl Const {
    pub fn new(ty: DType, bits: i128) -> Self {
        Const { ty, bits }
    }

    pub fn ty(&self) -> &DType {
        &self.ty
    }

    pub fn bits(&self) -> i128 {
        self.bits
    }
}

impl Value {
    pub fn ty(&self) -> DType {
        match self {
            Value::Const(c) => c.ty.clone(),
            Value::Expr(e) => e.borrow().ty().clone(),
        }
    }

    pub fn as_const(&self) -> Option<&Const> {
        match self {
            Value::Const(c) => Some(c),
            Value::Expr(_) => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    /// A stable identity key for dedup caches: `Const`s compare by value,
    /// `Expr`s compare by the underlying `Rc` pointer address.
    pub fn identity_key(&self) -> usize {
        match self {
            Value::Const(c) => {
                // Distinct constants of the same (ty, bits) collapse onto
                // the same key, which is the desired behavior for the
                // array-read dedup cache: two `Const` index values equal
                // by value really are the same index.
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                use std::hash::{Hash, Hasher};
                c.bits.hash(&mut hasher);
                c.ty.get_bits().hash(&mut hasher);
                hasher.finish() as usize
            }
            Value::Expr(e) => Rc::as_ptr(e) as usize,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Const(a), Value::Const(b)) => a.bits == b.bits && a.ty == b.ty,
            (Value::Expr(a), Value::Expr(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Folds a binary op over two constants, or returns `None` if either
/// operand is not a constant (the caller then falls back to building a
/// genuine `Binary` expression).
pub fn fold_binary(op: BinOp, lhs: &Value, rhs: &Value) -> Option<(DType, i128)> {
    let (a, b) = (lhs.as_const()?, rhs.as_const()?);
    let ty = a.ty.clone();
    let result = match op {
        BinOp::Add => a.bits.wrapping_add(b.bits),
        BinOp::Sub => a.bits.wrapping_sub(b.bits),
        BinOp::Mul => a.bits.wrapping_mul(b.bits),
        BinOp::And => a.bits & b.bits,
        BinOp::Or => a.bits | b.bits,
        BinOp::Xor => a.bits ^ b.bits,
        BinOp::Shl => a.bits.wrapping_shl(b.bits as u32),
        BinOp::Shr => a.bits.wrapping_shr(b.bits as u32),
        BinOp::Lt => (a.bits < b.bits) as i128,
        BinOp::Le => (a.bits <= b.bits) as i128,
        BinOp::Gt => (a.bits > b.bits) as i128,
        BinOp::Ge => (a.bits >= b.bits) as i128,
        BinOp::Eq => (a.bits == b.bits) as i128,
        BinOp::Ne => (a.bits != b.bits) as i128,
    };
    let result_ty = match op {
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => DType::uint(1),
        _ => ty,
    };
    Some((result_ty, result))
}

/// Mirrors `fold_binary` for the opcode form, used when the caller already
/// has an `Opcode::Binary` in hand (e.g. a pretty-printer or a pass that
/// re-simplifies existing IR).
pub fn fold_opcode(opcode: &Opcode) -> Option<(DType, i128)> {
    match opcode {
        Opcode::Binary { op, lhs, rhs } => fold_binary(*op, lhs, rhs),
        _ => None,
    }
}

/// Folds the inclusive bit range `[lo, hi]` of a constant into a new,
/// narrower constant.
pub fn fold_slice(c: &Const, lo: u64, hi: u64) -> (DType, i128) {
    let width = hi - lo + 1;
    let raw = c.bits as u128;
    let shifted = if lo >= 128 { 0 } else { raw >> lo };
    let mask = if width >= 128 { u128::MAX } else { (1u128 << width) - 1 };
    (DType::bits(width), (shifted & mask) as i128)
}

/// Folds a sequence of constants into a single wider constant, MSB-first
/// (`parts[0]` lands in the highest bits).
pub fn fold_concat(parts: &[Const]) -> (DType, i128) {
    let mut width = 0u64;
    let mut acc: u128 = 0;
    for part in parts {
        let part_width = part.ty.get_bits();
        let mask = if part_width >= 128 {
            u128::MAX
        } else {
            (1u128 << part_width) - 1
        };
        acc = (acc << part_width) | ((part.bits as u128) & mask);
        width += part_width;
    }
    (DType::bits(width), acc as i128)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(width: u64, bits: i128) -> Value {
        Value::Const(Const::new(DType::uint(width), bits))
    }

    #[test]
    fn folds_arithmetic_and_bitwise_ops() {
        let (ty, result) = fold_binary(BinOp::Add, &c(8, 3), &c(8, 4)).unwrap();
        assert_eq!(result, 7);
        assert_eq!(ty.get_bits(), 8);

        let (_, result) = fold_binary(BinOp::And, &c(8, 0b1100), &c(8, 0b1010)).unwrap();
        assert_eq!(result, 0b1000);
    }

    #[test]
    fn comparisons_fold_to_a_single_bit() {
        let (ty, result) = fold_binary(BinOp::Lt, &c(8, 3), &c(8, 4)).unwrap();
        assert_eq!(result, 1);
        assert_eq!(ty.get_bits(), 1);
    }

    #[test]
    fn folds_slice_and_concat() {
        let (ty, bits) = fold_slice(&Const::new(DType::uint(8), 0b1011_0010), 4, 7);
        assert_eq!(ty.get_bits(), 4);
        assert_eq!(bits, 0b1011);

        let hi = Const::new(DType::uint(4), 0b1010);
        let lo = Const::new(DType::uint(4), 0b0101);
        let (ty, bits) = fold_concat(&[hi, lo]);
        assert_eq!(ty.get_bits(), 8);
        assert_eq!(bits, 0b1010_0101);
    }

    #[test]
    fn non_constant_operand_declines_to_fold() {
        let array = crate::array::Array::new(
            "a".into(),
            DType::uint(8),
            1,
            None,
            crate::array::Owner::None,
        );
        let array = crate::rrc(array);
        let module = crate::rrc(crate::module::Module::new(
            "m".into(),
            crate::module::Flavor::Driver,
        ));
        let expr = crate::expr::new_expr(
            DType::uint(8),
            Opcode::ArrayRead {
                array,
                index: c(1, 0),
            },
            Rc::downgrade(&module),
            None,
        );
        let not_const = Value::Expr(expr);
        assert!(fold_binary(BinOp::Add, &not_const, &c(8, 1)).is_none());
    }
}
