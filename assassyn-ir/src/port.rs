//! Ports / FIFOs: a named typed queue feeding a pipeline module's input.

use crate::common::{RRC, WRC};
use crate::module::Module;
use crate::types::DType;
use assassyn_utils::Id;

/// The default FIFO depth when no push site declares an explicit one.
pub const DEFAULT_FIFO_DEPTH: u64 = 2;

#[derive(Debug)]
pub struct Port {
    name: Id,
    dtype: DType,
    /// Maximum explicit depth declared by any push into this port; `None`
    /// until a push site supplies one.
    explicit_depth: Option<u64>,
    /// The pipeline module that owns (pops) this port.
    owner: WRC<Module>,
}

impl Port {
    pub fn new(name: Id, dtype: DType, owner: WRC<Module>) -> Self {
        Port {
            name,
            dtype,
            explicit_depth: None,
            owner,
        }
    }

    pub fn name(&self) -> Id {
        self.name
    }

    pub fn scalar_ty(&self) -> &DType {
        &self.dtype
    }

    pub fn owner(&self) -> RRC<Module> {
        self.owner.upgrade().expect("port has no owning module")
    }

    /// Record an explicit depth declared at a push site; the port's
    /// final depth is the max over all such declarations.
    pub fn declare_depth(&mut self, depth: u64) {
        self.explicit_depth =
            Some(self.explicit_depth.map_or(depth, |d| d.max(depth)));
    }

    pub fn depth(&self) -> u64 {
        self.explicit_depth.unwrap_or(DEFAULT_FIFO_DEPTH).max(1)
    }
}

pub type PortRef = RRC<Port>;
