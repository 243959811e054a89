//! Assigns a stable write-port index to every (array, writer module) pair
//! so the backend can synthesize one register-file write port per index
//! rather than one per write site.

use crate::analysis::interaction_matrix::InteractionMatrix;
use assassyn_ir::System;
use linked_hash_map::LinkedHashMap;
use std::rc::Rc;

pub struct WritePortAllocator;

impl WritePortAllocator {
    /// Walks every array in `system` and assigns write ports to its
    /// writer modules in first-seen order (the order modules were added
    /// to the system, not the order their writes happen to be visited),
    /// so two builds of the same program always allocate the same ports.
    pub fn run(system: &System, matrix: &InteractionMatrix) {
        for array in system.arrays() {
            let mut seen: LinkedHashMap<usize, ()> = LinkedHashMap::new();
            for access in matrix.writers_of(array) {
                let key = Rc::as_ptr(&access.writer) as usize;
                seen.entry(key).or_insert(());
            }
            let port_count = seen.len();
            for (index, (module_key, _)) in seen.into_iter().enumerate() {
                array
                    .borrow_mut()
                    .assign_write_port(module_key, index as u32);
            }
            if port_count > 1 {
                log::debug!(
                    "array `{}` has {port_count} write ports; a reverse-priority arbiter will be emitted",
                    array.borrow().name()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assassyn_ir::{rrc, Array, DType, Flavor, Module, Opcode, Owner, Value};

    #[test]
    fn ports_are_assigned_in_first_seen_order() {
        let mut system = System::new("t".into());
        let array = rrc(Array::new("regs".into(), DType::uint(32), 4, None, Owner::None));
        system.add_array(array.clone()).unwrap();

        let writer_a = rrc(Module::new("a".into(), Flavor::Driver));
        let writer_b = rrc(Module::new("b".into(), Flavor::Driver));
        system.add_module(writer_a.clone()).unwrap();
        system.add_module(writer_b.clone()).unwrap();

        assassyn_ir::builder::with_module(writer_a.clone(), || {
            let idx = Value::Const(assassyn_ir::Const::new(DType::uint(2), 0));
            let val = Value::Const(assassyn_ir::Const::new(DType::uint(32), 1));
            assassyn_ir::builder::push_expr(
                DType::void(),
                Opcode::ArrayWrite {
                    array: array.clone(),
                    index: idx,
                    value: val,
                },
                None,
            )?;
            Ok(())
        })
        .unwrap();
        assassyn_ir::builder::with_module(writer_b.clone(), || {
            let idx = Value::Const(assassyn_ir::Const::new(DType::uint(2), 1));
            let val = Value::Const(assassyn_ir::Const::new(DType::uint(32), 2));
            assassyn_ir::builder::push_expr(
                DType::void(),
                Opcode::ArrayWrite {
                    array: array.clone(),
                    index: idx,
                    value: val,
                },
                None,
            )?;
            Ok(())
        })
        .unwrap();

        let matrix = InteractionMatrix::build(&system);
        WritePortAllocator::run(&system, &matrix);

        let a_key = Rc::as_ptr(&writer_a) as usize;
        let b_key = Rc::as_ptr(&writer_b) as usize;
        assert_eq!(array.borrow().write_port_of(a_key), Some(0));
        assert_eq!(array.borrow().write_port_of(b_key), Some(1));
    }
}
