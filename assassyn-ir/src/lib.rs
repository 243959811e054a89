//! The in-memory IR: types, values, expressions, modules, arrays, and the
//! builder context used to construct them.

pub mod array;
pub mod builder;
pub mod common;
pub mod expr;
pub mod module;
pub mod naming;
pub mod port;
pub mod system;
pub mod types;
pub mod value;

pub use array::{Array, ArrayRef, Owner};
pub use common::{rrc, RRC, WRC};
pub use expr::{BinOp, CastOp, ExprData, ExprRef, Opcode, UnaryOp};
pub use module::{BodyElem, Flavor, Module, ModuleRef, ModuleWeak};
pub use port::{Port, PortRef, DEFAULT_FIFO_DEPTH};
pub use system::System;
pub use types::{DType, Kind, RecordField, RecordLayout};
pub use value::{Const, Value};
