//! The external-module registry: a table mapping an `ExternalWrapper`
//! module's declared module name to the port list of the blackbox HDL it
//! wraps, so the backend can instantiate it without re-deriving ports
//! from the IR (which an opaque external module doesn't have).

use assassyn_ir::{Flavor, System};
use assassyn_utils::{Error, Id};
use linked_hash_map::LinkedHashMap;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ExternalPort {
    pub name: Id,
    pub width: u64,
    pub is_input: bool,
}

#[derive(Clone, Debug)]
pub struct ExternalModuleDecl {
    pub module_name: Id,
    pub ports: Vec<ExternalPort>,
    /// Path to the blackbox's own `.sv` source, copied alongside the
    /// generated design when set. `scan` cannot discover this from the
    /// IR (an external wrapper module only names its blackbox, not where
    /// its source lives) -- callers that need the file copied should
    /// `register` the declaration with this set before calling `scan`,
    /// which never overwrites an already-registered name.
    pub source_path: Option<PathBuf>,
}

#[derive(Default)]
pub struct ExternalRegistry {
    decls: LinkedHashMap<Id, ExternalModuleDecl>,
}

impl ExternalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, decl: ExternalModuleDecl) -> Result<(), Error> {
        if self.decls.contains_key(&decl.module_name) {
            return Err(Error::name_conflict(format!(
                "external module `{}` registered twice",
                decl.module_name
            )));
        }
        self.decls.insert(decl.module_name, decl);
        Ok(())
    }

    /// Auto-populates a registry from every `Flavor::ExternalWrapper`
    /// module in `system`: its input port surface is already declared on
    /// the wrapper module itself (name + width), so no separate manual
    /// call to `register` is needed for the common case. Two wrapper
    /// modules naming the same blackbox module contribute one shared
    /// declaration, matching multiple instances of one resource.
    ///
    /// The blackbox's *output* signals are not recorded here: they only
    /// become visible once another module consumes them, at which point
    /// `InteractionMatrix::exposures` already carries the producer,
    /// the consumer, and the produced value's type, so deriving them a
    /// second time from the registry would just be duplicate bookkeeping.
    pub fn scan(system: &System) -> Self {
        let mut registry = Self::new();
        for module in system.modules() {
            let module = module.borrow();
            let Flavor::ExternalWrapper { module_name, .. } = module.flavor() else {
                continue;
            };
            if registry.decls.contains_key(module_name) {
                continue;
            }
            let ports = module
                .ports()
                .map(|p| {
                    let p = p.borrow();
                    ExternalPort {
                        name: p.name(),
                        width: p.scalar_ty().get_bits(),
                        is_input: true,
                    }
                })
                .collect();
            registry.decls.insert(
                *module_name,
                ExternalModuleDecl {
                    module_name: *module_name,
                    ports,
                    source_path: None,
                },
            );
        }
        registry
    }

    pub fn lookup(&self, module_name: Id) -> Option<&ExternalModuleDecl> {
        self.decls.get(&module_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExternalModuleDecl> {
        self.decls.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str) -> ExternalModuleDecl {
        ExternalModuleDecl {
            module_name: name.into(),
            ports: vec![ExternalPort {
                name: "clk".into(),
                width: 1,
                is_input: true,
            }],
            source_path: None,
        }
    }

    #[test]
    fn registering_twice_under_the_same_name_is_rejected() {
        let mut registry = ExternalRegistry::new();
        registry.register(decl("Sram")).unwrap();
        let err = registry.register(decl("Sram"));
        assert!(err.is_err());
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn lookup_finds_a_registered_module() {
        let mut registry = ExternalRegistry::new();
        registry.register(decl("Sram")).unwrap();
        assert!(registry.lookup("Sram".into()).is_some());
        assert!(registry.lookup("Other".into()).is_none());
    }

    #[test]
    fn scan_finds_every_external_wrapper_module() {
        use assassyn_ir::{rrc, DType, Module, Port, System};

        let mut system = System::new("t".into());
        let wrapper = rrc(Module::new(
            "Sram_inst0".into(),
            Flavor::ExternalWrapper {
                instance_name: "inst0".into(),
                module_name: "Sram".into(),
            },
        ));
        let port = rrc(Port::new("addr".into(), DType::uint(10), std::rc::Rc::downgrade(&wrapper)));
        wrapper.borrow_mut().add_port(port);
        system.add_module(wrapper).unwrap();

        let driver = rrc(Module::new("main".into(), Flavor::Driver));
        system.add_module(driver).unwrap();

        let registry = ExternalRegistry::scan(&system);
        let sram = registry.lookup("Sram".into()).unwrap();
        assert_eq!(sram.ports.len(), 1);
        assert_eq!(sram.ports[0].width, 10);
    }

    #[test]
    fn scan_never_overwrites_a_manually_registered_declaration() {
        use assassyn_ir::{rrc, Module, System};

        let mut registry = ExternalRegistry::new();
        registry
            .register(ExternalModuleDecl {
                module_name: "Sram".into(),
                ports: Vec::new(),
                source_path: Some(PathBuf::from("vendor/sram.sv")),
            })
            .unwrap();

        let mut system = System::new("t".into());
        let wrapper = rrc(Module::new(
            "Sram_inst0".into(),
            Flavor::ExternalWrapper {
                instance_name: "inst0".into(),
                module_name: "Sram".into(),
            },
        ));
        system.add_module(wrapper).unwrap();
        let driver = rrc(Module::new("main".into(), Flavor::Driver));
        system.add_module(driver).unwrap();

        let scanned = ExternalRegistry::scan(&system);
        // `scan` alone would have no source_path; a caller merges its own
        // pre-registered declarations first and only falls back to `scan`
        // for whatever it didn't already know about.
        assert!(scanned.lookup("Sram".into()).unwrap().source_path.is_none());
        assert_eq!(
            registry.lookup("Sram".into()).unwrap().source_path,
            Some(PathBuf::from("vendor/sram.sv"))
        );
    }
}
