//! Frozen, system-wide metadata about how modules interact: calls, array
//! reads/writes, FIFO traffic, cross-module value exposures, and FINISH
//! sites. Built once from a frozen `System`; every later analysis and
//! lowering pass only queries it, it never re-walks the IR itself.

use assassyn_ir::{ArrayRef, BodyElem, ExprRef, ModuleRef, Opcode, PortRef, System, Value};
use linked_hash_map::LinkedHashMap;
use std::rc::Rc;

#[derive(Clone)]
pub struct ArrayAccess {
    pub writer: ModuleRef,
    pub write_expr: ExprRef,
}

/// One array read, tagged with its position in the system-wide, first-seen
/// read order. The order is stable across rebuilds of the same program
/// (module iteration order, then body order within a module).
#[derive(Clone)]
pub struct ArrayReadSite {
    pub reader: ModuleRef,
    pub read_expr: ExprRef,
    pub global_index: usize,
}

#[derive(Clone)]
pub struct AsyncCallSite {
    pub callee: ModuleRef,
    pub call_expr: ExprRef,
    pub meta_cond: Option<Value>,
}

#[derive(Clone)]
pub struct FifoSite {
    pub module: ModuleRef,
    pub expr: ExprRef,
    pub meta_cond: Option<Value>,
}

/// A value produced by one module and consumed as a plain operand (not
/// through a port or array) by another. Module lowering wires each of
/// these through an `expose_<name>`/`valid_<name>` port pair on the
/// producer and a matching input on the consumer. A producer whose
/// `Flavor` is `ExternalWrapper` makes this simultaneously a read of a
/// foreign HDL output -- there is no separate bookkeeping for that case,
/// the exposure itself carries it.
#[derive(Clone)]
pub struct Exposure {
    pub producer: ModuleRef,
    pub value_expr: ExprRef,
    pub consumer: ModuleRef,
    pub consumer_expr: ExprRef,
}

#[derive(Clone)]
pub struct FinishSite {
    pub module: ModuleRef,
    pub expr: ExprRef,
    pub meta_cond: Option<Value>,
}

/// Precomputed module <-> array / module <-> module relationships.
/// Insertion order (construction order, via `LinkedHashMap`) is preserved
/// throughout so every consumer sees writers, readers, and callees in a
/// deterministic, reproducible sequence.
pub struct InteractionMatrix {
    writers_by_module: LinkedHashMap<usize, Vec<ArrayAccess>>,
    writers_by_array: LinkedHashMap<usize, Vec<ArrayAccess>>,
    reads_by_array: LinkedHashMap<usize, Vec<ArrayReadSite>>,
    async_calls_by_caller: LinkedHashMap<usize, Vec<AsyncCallSite>>,
    callers_of: LinkedHashMap<usize, Vec<ModuleRef>>,
    fifo_pushes_by_port: LinkedHashMap<usize, Vec<FifoSite>>,
    fifo_pops_by_port: LinkedHashMap<usize, Vec<FifoSite>>,
    exposures: Vec<Exposure>,
    finish_sites: Vec<FinishSite>,
}

/// Every `Value` operand an opcode reads, in a fixed per-variant order.
/// Used to find cross-module exposures generically, without a separate
/// hand-written case for each opcode at every call site.
fn operands_of(opcode: &Opcode) -> Vec<Value> {
    match opcode {
        Opcode::Binary { lhs, rhs, .. } => vec![lhs.clone(), rhs.clone()],
        Opcode::Unary { operand, .. } => vec![operand.clone()],
        Opcode::Slice { operand, .. } => vec![operand.clone()],
        Opcode::Concat { parts } => parts.clone(),
        Opcode::Cast { operand, .. } => vec![operand.clone()],
        Opcode::Select { cond, then_value, else_value } => {
            vec![cond.clone(), then_value.clone(), else_value.clone()]
        }
        Opcode::ArrayRead { index, .. } => vec![index.clone()],
        Opcode::ArrayWrite { index, value, .. } => vec![index.clone(), value.clone()],
        Opcode::FifoPush { value, .. } => vec![value.clone()],
        Opcode::FifoPop { .. } => Vec::new(),
        Opcode::FifoValid { .. } => Vec::new(),
        Opcode::AsyncCall { args, .. } => args.clone(),
        Opcode::Log { args, .. } => args.clone(),
        Opcode::Finish => Vec::new(),
        Opcode::FieldExtract { operand, .. } => vec![operand.clone()],
    }
}

impl InteractionMatrix {
    pub fn build(system: &System) -> Self {
        let mut writers_by_module: LinkedHashMap<usize, Vec<ArrayAccess>> = LinkedHashMap::new();
        let mut writers_by_array: LinkedHashMap<usize, Vec<ArrayAccess>> = LinkedHashMap::new();
        let mut reads_by_array: LinkedHashMap<usize, Vec<ArrayReadSite>> = LinkedHashMap::new();
        let mut async_calls_by_caller: LinkedHashMap<usize, Vec<AsyncCallSite>> =
            LinkedHashMap::new();
        let mut callers_of: LinkedHashMap<usize, Vec<ModuleRef>> = LinkedHashMap::new();
        let mut fifo_pushes_by_port: LinkedHashMap<usize, Vec<FifoSite>> = LinkedHashMap::new();
        let mut fifo_pops_by_port: LinkedHashMap<usize, Vec<FifoSite>> = LinkedHashMap::new();
        let mut exposures = Vec::new();
        let mut finish_sites = Vec::new();
        let mut next_read_index = 0usize;

        for module in system.modules() {
            let module_key = Rc::as_ptr(module) as usize;
            let mut writes = Vec::new();

            for elem in module.borrow().body() {
                let expr = match elem {
                    BodyElem::Expr(expr) => expr,
                    BodyElem::PushPredicate(_) | BodyElem::PopPredicate => continue,
                };
                let meta_cond = expr.borrow().meta_cond().cloned();

                for operand in operands_of(expr.borrow().opcode()) {
                    if let Value::Expr(producer_expr) = &operand {
                        let producer = producer_expr.borrow().parent();
                        if !Rc::ptr_eq(&producer, module) {
                            exposures.push(Exposure {
                                producer,
                                value_expr: producer_expr.clone(),
                                consumer: module.clone(),
                                consumer_expr: expr.clone(),
                            });
                        }
                    }
                }

                match expr.borrow().opcode() {
                    Opcode::ArrayWrite { array, .. } => {
                        let access = ArrayAccess {
                            writer: module.clone(),
                            write_expr: expr.clone(),
                        };
                        writes.push(access.clone());
                        let array_key = Rc::as_ptr(array) as usize;
                        writers_by_array.entry(array_key).or_default().push(access);
                    }
                    Opcode::ArrayRead { array, .. } => {
                        let array_key = Rc::as_ptr(array) as usize;
                        reads_by_array.entry(array_key).or_default().push(ArrayReadSite {
                            reader: module.clone(),
                            read_expr: expr.clone(),
                            global_index: next_read_index,
                        });
                        next_read_index += 1;
                    }
                    Opcode::AsyncCall { callee, .. } => {
                        if let Some(callee) = callee.upgrade() {
                            let callee_key = Rc::as_ptr(&callee) as usize;
                            callers_of.entry(callee_key).or_default().push(module.clone());
                            async_calls_by_caller.entry(module_key).or_default().push(
                                AsyncCallSite {
                                    callee,
                                    call_expr: expr.clone(),
                                    meta_cond: meta_cond.clone(),
                                },
                            );
                        }
                    }
                    Opcode::FifoPush { port, .. } => {
                        let port_key = Rc::as_ptr(port) as usize;
                        fifo_pushes_by_port.entry(port_key).or_default().push(FifoSite {
                            module: module.clone(),
                            expr: expr.clone(),
                            meta_cond: meta_cond.clone(),
                        });
                    }
                    Opcode::FifoPop { port } => {
                        let port_key = Rc::as_ptr(port) as usize;
                        fifo_pops_by_port.entry(port_key).or_default().push(FifoSite {
                            module: module.clone(),
                            expr: expr.clone(),
                            meta_cond: meta_cond.clone(),
                        });
                    }
                    Opcode::Finish => {
                        finish_sites.push(FinishSite {
                            module: module.clone(),
                            expr: expr.clone(),
                            meta_cond: meta_cond.clone(),
                        });
                    }
                    _ => {}
                }
            }

            if !writes.is_empty() {
                writers_by_module.insert(module_key, writes);
            }
        }

        InteractionMatrix {
            writers_by_module,
            writers_by_array,
            reads_by_array,
            async_calls_by_caller,
            callers_of,
            fifo_pushes_by_port,
            fifo_pops_by_port,
            exposures,
            finish_sites,
        }
    }

    pub fn writes_of(&self, module: &ModuleRef) -> &[ArrayAccess] {
        self.writers_by_module
            .get(&(Rc::as_ptr(module) as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn writers_of(&self, array: &ArrayRef) -> &[ArrayAccess] {
        self.writers_by_array
            .get(&(Rc::as_ptr(array) as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reads_of(&self, array: &ArrayRef) -> &[ArrayReadSite] {
        self.reads_by_array
            .get(&(Rc::as_ptr(array) as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn async_calls_of(&self, caller: &ModuleRef) -> &[AsyncCallSite] {
        self.async_calls_by_caller
            .get(&(Rc::as_ptr(caller) as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn callers_of(&self, module: &ModuleRef) -> &[ModuleRef] {
        self.callers_of
            .get(&(Rc::as_ptr(module) as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn fifo_pushes_of(&self, port: &PortRef) -> &[FifoSite] {
        self.fifo_pushes_by_port
            .get(&(Rc::as_ptr(port) as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn fifo_pops_of(&self, port: &PortRef) -> &[FifoSite] {
        self.fifo_pops_by_port
            .get(&(Rc::as_ptr(port) as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn exposures(&self) -> &[Exposure] {
        &self.exposures
    }

    pub fn exposures_of(&self, consumer: &ModuleRef) -> impl Iterator<Item = &Exposure> {
        let key = Rc::as_ptr(consumer) as usize;
        self.exposures
            .iter()
            .filter(move |e| Rc::as_ptr(&e.consumer) as usize == key)
    }

    /// Every exposure whose producer is `producer`, deduplicated by the
    /// produced `value_expr` -- one value read by several consumers still
    /// only needs one `expose_<name>` output port on the producer.
    pub fn exposures_from(&self, producer: &ModuleRef) -> Vec<&Exposure> {
        let key = Rc::as_ptr(producer) as usize;
        let mut seen = std::collections::HashSet::new();
        self.exposures
            .iter()
            .filter(move |e| Rc::as_ptr(&e.producer) as usize == key)
            .filter(move |e| seen.insert(Rc::as_ptr(&e.value_expr) as usize))
            .collect()
    }

    pub fn finish_sites(&self) -> &[FinishSite] {
        &self.finish_sites
    }

    pub fn finish_sites_of(&self, module: &ModuleRef) -> impl Iterator<Item = &FinishSite> {
        let key = Rc::as_ptr(module) as usize;
        self.finish_sites
            .iter()
            .filter(move |f| Rc::as_ptr(&f.module) as usize == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assassyn_ir::{builder, rrc, Array, Const, DType, Flavor, Module, Owner, Value};

    #[test]
    fn tracks_writers_readers_and_callers() {
        let mut system = System::new("t".into());
        let array = rrc(Array::new("regs".into(), DType::uint(32), 2, None, Owner::None));
        system.add_array(array.clone()).unwrap();

        let producer = rrc(Module::new("producer".into(), Flavor::Driver));
        let consumer = rrc(Module::new(
            "consumer".into(),
            Flavor::Pipeline { wait_until: None },
        ));
        system.add_module(producer.clone()).unwrap();
        system.add_module(consumer.clone()).unwrap();

        builder::with_module(producer.clone(), || {
            let idx = Value::Const(Const::new(DType::uint(1), 0));
            builder::array_write(
                array.clone(),
                idx.clone(),
                Value::Const(Const::new(DType::uint(32), 7)),
            )?;
            builder::array_read(array.clone(), idx)?;
            builder::push_expr(
                DType::void(),
                Opcode::AsyncCall {
                    callee: Rc::downgrade(&consumer),
                    args: Vec::new(),
                },
                None,
            )?;
            Ok(())
        })
        .unwrap();

        let matrix = InteractionMatrix::build(&system);
        assert_eq!(matrix.writes_of(&producer).len(), 1);
        assert_eq!(matrix.writers_of(&array).len(), 1);
        assert_eq!(matrix.reads_of(&array).len(), 1);
        assert_eq!(matrix.callers_of(&consumer).len(), 1);
        assert!(Rc::ptr_eq(&matrix.callers_of(&consumer)[0], &producer));
        assert_eq!(matrix.async_calls_of(&producer).len(), 1);
        assert!(Rc::ptr_eq(
            &matrix.async_calls_of(&producer)[0].callee,
            &consumer
        ));
    }

    #[test]
    fn array_reads_are_numbered_globally_in_first_seen_order() {
        let mut system = System::new("t2".into());
        let array = rrc(Array::new("mem".into(), DType::uint(8), 4, None, Owner::None));
        system.add_array(array.clone()).unwrap();

        let first = rrc(Module::new("first".into(), Flavor::Driver));
        let second = rrc(Module::new("second".into(), Flavor::Driver));
        system.add_module(first.clone()).unwrap();
        system.add_module(second.clone()).unwrap();

        builder::with_module(first.clone(), || {
            builder::array_read(array.clone(), Value::Const(Const::new(DType::uint(2), 0)))?;
            Ok(())
        })
        .unwrap();
        builder::with_module(second.clone(), || {
            builder::array_read(array.clone(), Value::Const(Const::new(DType::uint(2), 1)))?;
            Ok(())
        })
        .unwrap();

        let matrix = InteractionMatrix::build(&system);
        let reads = matrix.reads_of(&array);
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].global_index, 0);
        assert_eq!(reads[1].global_index, 1);
    }

    #[test]
    fn cross_module_operand_use_is_recorded_as_an_exposure() {
        let mut system = System::new("t3".into());
        let producer = rrc(Module::new("producer".into(), Flavor::Driver));
        let consumer = rrc(Module::new(
            "consumer".into(),
            Flavor::Pipeline { wait_until: None },
        ));
        system.add_module(producer.clone()).unwrap();
        system.add_module(consumer.clone()).unwrap();

        let produced = builder::with_module(producer.clone(), || {
            builder::binary(
                assassyn_ir::BinOp::Add,
                Value::Const(Const::new(DType::uint(8), 1)),
                Value::Const(Const::new(DType::uint(8), 0)),
            )
        })
        .unwrap();

        builder::with_module(consumer.clone(), || {
            builder::unary(assassyn_ir::UnaryOp::Not, produced.clone(), DType::uint(8))?;
            Ok(())
        })
        .unwrap();

        let matrix = InteractionMatrix::build(&system);
        let exposures: Vec<_> = matrix.exposures_of(&consumer).collect();
        assert_eq!(exposures.len(), 1);
        assert!(Rc::ptr_eq(&exposures[0].producer, &producer));
    }

    #[test]
    fn finish_sites_keep_their_predicate() {
        let mut system = System::new("t4".into());
        let driver = rrc(Module::new("driver".into(), Flavor::Driver));
        system.add_module(driver.clone()).unwrap();

        builder::with_module(driver.clone(), || {
            let cond = Value::Const(Const::new(DType::uint(1), 1));
            builder::push_predicate(cond)?;
            builder::push_expr(DType::void(), Opcode::Finish, None)?;
            builder::pop_predicate()?;
            Ok(())
        })
        .unwrap();

        let matrix = InteractionMatrix::build(&system);
        assert_eq!(matrix.finish_sites().len(), 1);
        assert!(matrix.finish_sites()[0].meta_cond.is_some());
    }
}
