//! Shared reference-counting aliases (`RRC`/`WRC`) for the mutable,
//! shared-ownership IR graph.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A reference-counted, mutable handle to an IR node.
pub type RRC<T> = Rc<RefCell<T>>;
/// A weak counterpart to [`RRC`], used for back-edges (e.g. an
/// expression's pointer to its owning module) so the graph has no
/// reference cycles that would leak memory.
pub type WRC<T> = Weak<RefCell<T>>;

pub fn rrc<T>(value: T) -> RRC<T> {
    Rc::new(RefCell::new(value))
}
