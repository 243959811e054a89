//! Bit-precise value descriptors, hash-consed so that structurally equal
//! types are cheap to compare and share a single allocation.

use assassyn_utils::{Error, Id};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The kind of value a [`DType`] describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    SignedInt,
    UnsignedInt,
    Bits,
    Float32,
    Void,
    /// Fixed-size array of a homogeneous element type.
    Array(DType, u64),
    /// A packed record; `readonly` marks layouts with explicit bit-slices
    /// that leave gaps the emitter must not read.
    Record(Rc<RecordLayout>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordField {
    pub name: Id,
    pub ty: DType,
    /// Inclusive bit range `[lo, hi]` within the record's packed bits.
    pub slice: (u64, u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordLayout {
    pub fields: Vec<RecordField>,
    pub readonly: bool,
}

/// A value descriptor: bit width plus kind. Value-equal by `(kind, width)`;
/// interned so that `DType::eq` is typically a pointer comparison after the
/// first construction of a given shape.
#[derive(Debug, Clone)]
pub struct DType(Rc<DTypeData>);

#[derive(Debug, PartialEq, Eq, Hash)]
struct DTypeData {
    width: u64,
    kind: Kind,
}

impl PartialEq for DType {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl Eq for DType {}

impl std::hash::Hash for DType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

thread_local! {
    static TABLE: RefCell<HashMap<(u64, Kind), DType>> = RefCell::new(HashMap::new());
}

fn intern(width: u64, kind: Kind) -> DType {
    TABLE.with(|t| {
        let mut t = t.borrow_mut();
        let key = (width, kind.clone());
        if let Some(existing) = t.get(&key) {
            return existing.clone();
        }
        let dtype = DType(Rc::new(DTypeData { width, kind }));
        t.insert(key, dtype.clone());
        dtype
    })
}

impl DType {
    pub fn get_bits(&self) -> u64 {
        self.0.width
    }

    pub fn kind(&self) -> &Kind {
        &self.0.kind
    }

    pub fn is_int(&self) -> bool {
        matches!(self.0.kind, Kind::SignedInt | Kind::UnsignedInt)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.0.kind, Kind::SignedInt)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.0.kind, Kind::Void)
    }

    pub fn elem_type(&self) -> Option<&DType> {
        match &self.0.kind {
            Kind::Array(elem, _) => Some(elem),
            _ => None,
        }
    }

    pub fn array_size(&self) -> Option<u64> {
        match &self.0.kind {
            Kind::Array(_, size) => Some(*size),
            _ => None,
        }
    }

    pub fn record_layout(&self) -> Option<&RecordLayout> {
        match &self.0.kind {
            Kind::Record(layout) => Some(layout),
            _ => None,
        }
    }

    /// `UnsignedInt(0)` is clamped to width 1.
    pub fn uint(width: u64) -> DType {
        intern(width.max(1), Kind::UnsignedInt)
    }

    pub fn sint(width: u64) -> DType {
        intern(width.max(1), Kind::SignedInt)
    }

    pub fn bits(width: u64) -> DType {
        intern(width.max(1), Kind::Bits)
    }

    pub fn float32() -> DType {
        intern(32, Kind::Float32)
    }

    pub fn void() -> DType {
        intern(0, Kind::Void)
    }

    pub fn array(elem: DType, size: u64) -> DType {
        intern(elem.get_bits() * size, Kind::Array(elem, size))
    }

    pub fn record(fields: Vec<RecordField>, readonly: bool) -> DType {
        let width = fields.iter().map(|f| f.slice.1 + 1).max().unwrap_or(0);
        intern(
            width,
            Kind::Record(Rc::new(RecordLayout { fields, readonly })),
        )
    }

    /// Checks whether an integer literal fits this type's range.
    pub fn check_range(&self, value: i128) -> Result<(), Error> {
        let bits = self.get_bits();
        match &self.0.kind {
            Kind::SignedInt => {
                let lo = -(1i128 << (bits - 1));
                let hi = (1i128 << (bits - 1)) - 1;
                if value < lo || value > hi {
                    return Err(Error::out_of_range(format!(
                        "value {value} does not fit in SignedInt({bits})"
                    )));
                }
            }
            Kind::UnsignedInt | Kind::Bits => {
                let hi = if bits >= 127 {
                    i128::MAX
                } else {
                    (1i128 << bits) - 1
                };
                if value < 0 || value > hi {
                    return Err(Error::out_of_range(format!(
                        "value {value} does not fit in {:?}({bits})",
                        self.0.kind
                    )));
                }
            }
            _ => {
                return Err(Error::type_mismatch(format!(
                    "cannot construct an integer constant of type {:?}",
                    self.0.kind
                )))
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0.kind {
            Kind::SignedInt => write!(f, "i{}", self.0.width),
            Kind::UnsignedInt => write!(f, "u{}", self.0.width),
            Kind::Bits => write!(f, "b{}", self.0.width),
            Kind::Float32 => write!(f, "f32"),
            Kind::Void => write!(f, "void"),
            Kind::Array(elem, size) => write!(f, "[{elem}; {size}]"),
            Kind::Record(layout) => {
                write!(f, "{{")?;
                for (i, field) in layout.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_consing_shares_allocation() {
        let a = DType::uint(32);
        let b = DType::uint(32);
        assert_eq!(a, b);
        assert!(Rc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn zero_width_unsigned_clamps_to_one() {
        assert_eq!(DType::uint(0).get_bits(), 1);
    }

    #[test]
    fn range_check_rejects_overflow() {
        assert!(DType::uint(8).check_range(255).is_ok());
        assert!(DType::uint(8).check_range(256).is_err());
        assert!(DType::sint(8).check_range(-128).is_ok());
        assert!(DType::sint(8).check_range(-129).is_err());
    }
}
