//! Stack discipline: PUSH/POP symmetry and SP bookkeeping.

use quickcheck_macros::quickcheck;
use skiff_vm::prelude::*;

const MAX_CYCLES: u64 = 20_000;

fn run_with(program: &[Instruction], setup: impl FnOnce(&mut Pipeline)) -> Pipeline {
    let mut vm = Pipeline::with_config(MemoryConfig::default());

    vm.load_instructions(program, 0).expect("program fits in memory");
    setup(&mut vm);

    let state = vm.run(MAX_CYCLES).expect("program runs without faulting");
    assert_eq!(state, RunState::Halted);

    vm
}

#[quickcheck]
fn push_then_pop_preserves_the_register(value: Word) -> bool {
    let vm = run_with(&[op::push(7), op::pop(7), op::end()], |vm| {
        vm.write_register(7, value);
    });

    vm.read_register(7) == value && vm.read_register(REG_SP) == vm.read_register(REG_BP)
}

#[test]
fn pop_moves_a_value_between_registers() {
    let vm = run_with(&[op::push(1), op::pop(2), op::end()], |vm| {
        vm.write_register(1, 99);
    });

    assert_eq!(vm.read_register(2), 99);
    assert_eq!(vm.read_register(1), 99);
}

#[test]
fn pushes_grow_the_stack_downward() {
    let vm = run_with(
        &[op::push(1), op::push(2), op::push(3), op::end()],
        |vm| {
            vm.write_register(1, 10);
            vm.write_register(2, 20);
            vm.write_register(3, 30);
        },
    );

    let bp = vm.read_register(REG_BP);

    assert_eq!(vm.read_register(REG_SP), bp - 3);
    assert_eq!(vm.read_memory(bp).unwrap(), 10);
    assert_eq!(vm.read_memory(bp - 1).unwrap(), 20);
    assert_eq!(vm.read_memory(bp - 2).unwrap(), 30);
}

#[test]
fn lifo_order() {
    let vm = run_with(
        &[
            op::push(1),
            op::push(2),
            op::pop(3),
            op::pop(4),
            op::end(),
        ],
        |vm| {
            vm.write_register(1, 111);
            vm.write_register(2, 222);
        },
    );

    assert_eq!(vm.read_register(3), 222);
    assert_eq!(vm.read_register(4), 111);
}

#[test]
fn stack_and_explicit_stores_coexist() {
    // a store to an unrelated address between stack operations must not
    // disturb the stack
    let vm = run_with(
        &[
            op::push(1),
            op::stri(1, 50),
            op::pop(2),
            op::end(),
        ],
        |vm| {
            vm.write_register(1, 42);
        },
    );

    assert_eq!(vm.read_register(2), 42);
    assert_eq!(vm.read_memory(50).unwrap(), 42);
    assert_eq!(vm.read_register(REG_SP), vm.read_register(REG_BP));
}
