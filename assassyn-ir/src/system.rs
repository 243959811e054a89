//! `System`: the top-level container of modules and arrays produced by a
//! construction session. Freezing a system snapshots it as immutable
//! input to the analysis and backend crates; no further expressions can
//! be pushed into a module once its owning system is frozen.

use crate::array::ArrayRef;
use crate::module::ModuleRef;
use assassyn_utils::{Diagnostics, Error, Id};
use linked_hash_map::LinkedHashMap;
use std::cell::{Ref, RefCell, RefMut};

pub struct System {
    name: Id,
    modules: LinkedHashMap<Id, ModuleRef>,
    arrays: LinkedHashMap<Id, ArrayRef>,
    frozen: bool,
    diagnostics: RefCell<Diagnostics>,
}

impl System {
    pub fn new(name: Id) -> Self {
        System {
            name,
            modules: LinkedHashMap::new(),
            arrays: LinkedHashMap::new(),
            frozen: false,
            diagnostics: RefCell::new(Diagnostics::new()),
        }
    }

    pub fn name(&self) -> Id {
        self.name
    }

    pub fn add_module(&mut self, module: ModuleRef) -> Result<(), Error> {
        self.ensure_unfrozen("add a module")?;
        let name = module.borrow().name();
        if self.modules.insert(name, module).is_some() {
            return Err(Error::name_conflict(format!(
                "module `{name}` already exists in this system"
            )));
        }
        Ok(())
    }

    pub fn add_array(&mut self, array: ArrayRef) -> Result<(), Error> {
        self.ensure_unfrozen("add an array")?;
        let name = array.borrow().name();
        if self.arrays.insert(name, array).is_some() {
            return Err(Error::name_conflict(format!(
                "array `{name}` already exists in this system"
            )));
        }
        Ok(())
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleRef> {
        self.modules.values()
    }

    pub fn arrays(&self) -> impl Iterator<Item = &ArrayRef> {
        self.arrays.values()
    }

    pub fn module(&self, name: Id) -> Option<&ModuleRef> {
        self.modules.get(&name)
    }

    pub fn array(&self, name: Id) -> Option<&ArrayRef> {
        self.arrays.get(&name)
    }

    pub fn driver_modules(&self) -> impl Iterator<Item = &ModuleRef> {
        self.modules.values().filter(|m| m.borrow().is_driver())
    }

    pub fn diagnostics(&self) -> Ref<'_, Diagnostics> {
        self.diagnostics.borrow()
    }

    pub fn diagnostics_mut(&mut self) -> RefMut<'_, Diagnostics> {
        self.diagnostics.borrow_mut()
    }

    /// Pushes a warning through a shared reference, so passes that only
    /// see `&System` (everything downstream of a frozen system) can still
    /// surface diagnostics instead of having to route them back out
    /// through a return value.
    pub fn warn<S: Into<String>>(&self, message: S) {
        self.diagnostics.borrow_mut().warn(message);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Snapshots the system as immutable; analysis and lowering require a
    /// frozen system so that write-port allocation and naming never run
    /// against a graph that might still change underneath them.
    pub fn freeze(&mut self) -> Result<(), Error> {
        if self.modules.values().all(|m| !m.borrow().is_driver()) {
            return Err(Error::missing_module_context(
                "a system needs at least one Driver module to be simulatable",
            ));
        }
        self.frozen = true;
        log::debug!(
            "system `{}` frozen with {} modules and {} arrays",
            self.name,
            self.modules.len(),
            self.arrays.len()
        );
        Ok(())
    }

    fn ensure_unfrozen(&self, action: &str) -> Result<(), Error> {
        if self.frozen {
            return Err(Error::internal(format!(
                "cannot {action}: system `{}` is already frozen",
                self.name
            )));
        }
        Ok(())
    }
}
