//! Modules: the unit of scheduling. A `Module` is one of three flavors
//! (`Driver`, `Pipeline`, `Downstream`) plus an `ExternalWrapper` that
//! forwards to a blackbox HDL instance.

use crate::common::{RRC, WRC};
use crate::expr::ExprRef;
use crate::port::PortRef;
use crate::value::Value;
use assassyn_utils::Id;
use linked_hash_map::LinkedHashMap;

/// A single statement in a module's body: either a dataflow expression or
/// a predicate-scope marker. Kept flat (no nested block statements)
/// because predicate scoping is carried per-expression via `meta_cond`;
/// `PushPredicate`/`PopPredicate` exist purely as structural bookmarks for
/// IR dump and traversal tools, not as control-flow nodes analysis or
/// lowering need to interpret.
#[derive(Clone)]
pub enum BodyElem {
    Expr(ExprRef),
    PushPredicate(Value),
    PopPredicate,
}

/// Per-flavor data that doesn't belong on every module.
pub enum Flavor {
    /// Runs unconditionally every cycle; the sole entry point of a design.
    Driver,
    /// Async-called; gated by a credit counter and popped FIFOs at its
    /// ports. `wait_until` is `None` unless the builder installed a
    /// stall predicate.
    Pipeline { wait_until: Option<ExprRef> },
    /// Combinational; driven by the same-cycle `executed` wire of its
    /// triggering module(s), never by its own FIFOs.
    Downstream,
    /// A thin wrapper around an externally supplied HDL instance looked up
    /// in the external-module registry; `body` stays empty for these.
    ExternalWrapper { instance_name: Id, module_name: Id },
}

pub struct Module {
    name: Id,
    flavor: Flavor,
    ports: LinkedHashMap<Id, PortRef>,
    body: Vec<BodyElem>,
}

impl Module {
    pub fn new(name: Id, flavor: Flavor) -> Self {
        Module {
            name,
            flavor,
            ports: LinkedHashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn name(&self) -> Id {
        self.name
    }

    pub fn flavor(&self) -> &Flavor {
        &self.flavor
    }

    pub fn is_driver(&self) -> bool {
        matches!(self.flavor, Flavor::Driver)
    }

    pub fn is_pipeline(&self) -> bool {
        matches!(self.flavor, Flavor::Pipeline { .. })
    }

    pub fn is_downstream(&self) -> bool {
        matches!(self.flavor, Flavor::Downstream)
    }

    pub fn wait_until(&self) -> Option<&ExprRef> {
        match &self.flavor {
            Flavor::Pipeline { wait_until } => wait_until.as_ref(),
            _ => None,
        }
    }

    pub fn set_wait_until(&mut self, cond: ExprRef) {
        match &mut self.flavor {
            Flavor::Pipeline { wait_until } => *wait_until = Some(cond),
            _ => panic!("wait_until is only valid on a Pipeline module"),
        }
    }

    pub fn add_port(&mut self, port: PortRef) {
        let name = port.borrow().name();
        let prior = self.ports.insert(name, port);
        assert!(prior.is_none(), "duplicate port `{name}` on module `{}`", self.name);
    }

    pub fn ports(&self) -> impl Iterator<Item = &PortRef> {
        self.ports.values()
    }

    pub fn port(&self, name: Id) -> Option<&PortRef> {
        self.ports.get(&name)
    }

    pub fn push_body(&mut self, elem: BodyElem) {
        self.body.push(elem);
    }

    pub fn body(&self) -> &[BodyElem] {
        &self.body
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("ports", &self.ports.keys().collect::<Vec<_>>())
            .field("body_len", &self.body.len())
            .finish()
    }
}

pub type ModuleRef = RRC<Module>;
pub type ModuleWeak = WRC<Module>;
