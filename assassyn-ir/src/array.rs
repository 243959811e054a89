//! Register files and memory payload arrays.

use crate::common::{RRC, WRC};
use crate::module::Module;
use crate::types::DType;
use assassyn_utils::Id;
use linked_hash_map::LinkedHashMap;

/// Who owns (and may mutate) an array.
#[derive(Clone)]
pub enum Owner {
    None,
    Module(WRC<Module>),
    /// A memory block; payload arrays are emitted through the SRAM
    /// blackbox generator rather than the generic register-file emitter.
    Memory { init_file: Option<String> },
}

#[derive(Debug)]
pub struct Array {
    name: Id,
    element_type: DType,
    size: u64,
    initializer: Option<Vec<i128>>,
    owner: OwnerState,
    /// Write ports assigned by the write-port allocator. Populated exactly
    /// once, by `assassyn-opt`'s `WritePortAllocator`; empty beforehand.
    write_ports: LinkedHashMap<usize, u32>,
}

#[derive(Debug)]
enum OwnerState {
    None,
    Module(WRC<Module>),
    Memory { init_file: Option<String> },
}

impl From<Owner> for OwnerState {
    fn from(o: Owner) -> Self {
        match o {
            Owner::None => OwnerState::None,
            Owner::Module(m) => OwnerState::Module(m),
            Owner::Memory { init_file } => OwnerState::Memory { init_file },
        }
    }
}

impl Array {
    pub fn new(
        name: Id,
        element_type: DType,
        size: u64,
        initializer: Option<Vec<i128>>,
        owner: Owner,
    ) -> Self {
        assert!(size >= 1, "array `{name}` must have size >= 1");
        Array {
            name,
            element_type,
            size,
            initializer,
            owner: owner.into(),
            write_ports: LinkedHashMap::new(),
        }
    }

    pub fn name(&self) -> Id {
        self.name
    }

    pub fn scalar_ty(&self) -> &DType {
        &self.element_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn initializer(&self) -> Option<&[i128]> {
        self.initializer.as_deref()
    }

    /// True for memory-payload arrays: emitted as an SRAM blackbox, never
    /// through the generic register file allocator.
    pub fn is_payload(&self) -> bool {
        matches!(self.owner, OwnerState::Memory { .. })
    }

    pub fn mem_init_file(&self) -> Option<&str> {
        match &self.owner {
            OwnerState::Memory { init_file } => init_file.as_deref(),
            _ => None,
        }
    }

    /// The module-index => port-index map assigned by the allocator.
    /// `module_key` is a stable key identifying a writer module (its
    /// `Rc` pointer address, see `assassyn_opt::write_port_allocator`).
    pub fn write_port_of(&self, module_key: usize) -> Option<u32> {
        self.write_ports.get(&module_key).copied()
    }

    pub fn write_port_count(&self) -> usize {
        self.write_ports.len()
    }

    pub fn write_ports(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.write_ports.iter().map(|(k, v)| (*k, *v))
    }

    /// Called exactly once by the write-port allocator for a given
    /// writer module. Panics if called twice for the same module, matching the
    /// invariant that a module never receives multiple indices for the
    /// same array.
    pub fn assign_write_port(&mut self, module_key: usize, port: u32) {
        let prev = self.write_ports.insert(module_key, port);
        assert!(
            prev.is_none(),
            "array `{}` assigned write port twice for the same module",
            self.name
        );
    }
}

pub type ArrayRef = RRC<Array>;
