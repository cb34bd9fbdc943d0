//! End-to-end programs exercising the whole machine: arithmetic, loads
//! and stores, loops, branch squashing, the stack, and subroutine calls.

use skiff_vm::prelude::*;

const MAX_CYCLES: u64 = 20_000;

/// Load `program` at address zero, apply `setup`, and run to completion.
fn run_with(
    program: &[Instruction],
    setup: impl FnOnce(&mut Pipeline),
) -> Pipeline {
    let mut vm = Pipeline::with_config(MemoryConfig::default());

    vm.load_instructions(program, 0).expect("program fits in memory");
    setup(&mut vm);

    let state = vm.run(MAX_CYCLES).expect("program runs without faulting");
    assert_eq!(state, RunState::Halted, "program must end within the cycle bound");

    vm
}

fn run(program: &[Instruction]) -> Pipeline {
    run_with(program, |_| {})
}

#[test]
fn add_and_store() {
    let vm = run(&[
        op::addi(1, 1, 20),
        op::addi(2, 2, 30),
        op::add(3, 1, 2),
        op::stri(3, 45),
        op::end(),
    ]);

    assert_eq!(vm.read_register(1), 20);
    assert_eq!(vm.read_register(2), 30);
    assert_eq!(vm.read_register(3), 50);
    assert_eq!(vm.read_memory(45).unwrap(), 50);

    // every instruction retired exactly once
    assert_eq!(vm.retired(), 5);
}

#[test]
fn load_move_store() {
    let vm = run(&[
        op::ldri(1, 20),
        op::mov(2, 1),
        op::stri(2, 45),
        op::end(),
    ]);

    assert_eq!(vm.read_register(1), 20);
    assert_eq!(vm.read_register(2), 20);
    assert_eq!(vm.read_memory(45).unwrap(), 20);
}

#[test]
fn loop_sums_an_array() {
    const BASE: Word = 100;
    const LEN: Word = 8;

    let vm = run_with(
        &[
            op::movi(1, BASE),        // cursor
            op::movi(2, BASE + LEN),  // limit
            op::ldr(3, 1, 0),         // 2: element
            op::add(31, 31, 3),       // accumulate into r31
            op::addi(1, 1, 1),
            op::cmp(1, 2),
            op::bi(Cond::NE, -4),     // 6: back to the load at 2
            op::end(),
        ],
        |vm| {
            for i in 0..LEN {
                vm.memory_mut()
                    .ram_mut()
                    .write(BASE + i, 10 + i)
                    .unwrap();
            }
        },
    );

    // 10 + 11 + ... + 17
    assert_eq!(vm.read_register(31), (10..18).sum::<u32>());
    assert_eq!(vm.read_register(1), BASE + LEN);
}

#[test]
fn forward_branch_squashes_the_fall_through() {
    // B #30 at address 0; addresses 1..=29 hold real instructions that
    // must never execute; the landing pad computes into r24.
    let mut program = vec![op::bi(Cond::AL, 30)];

    for _ in 1..30 {
        program.push(op::addi(20, 20, 1));
    }

    program.push(op::add(24, 4, 3)); // 30
    program.push(op::str(24, 16, 0)); // 31
    program.push(op::end()); // 32

    let vm = run_with(&program, |vm| {
        vm.write_register(3, 72);
        vm.write_register(4, 36);
        vm.write_register(16, 8);
    });

    assert_eq!(vm.read_memory(8).unwrap(), 108);

    // none of the skipped instructions left a side effect
    assert_eq!(vm.read_register(20), 0);

    // branch, landing pad, store, end
    assert_eq!(vm.retired(), 4);
}

#[test]
fn push_pop_round_trips_the_stack() {
    let vm = run_with(
        &[
            op::mov(30, 29),
            op::subi(31, 31, 31),
            op::push(0),
            op::push(1),
            op::push(2),
            op::push(3),
            op::push(4),
            op::pop(4),
            op::pop(3),
            op::pop(2),
            op::pop(1),
            op::pop(0),
            op::end(),
        ],
        |vm| {
            for i in 0..5 {
                vm.write_register(i as RegisterId, i);
            }
        },
    );

    for i in 0..5 {
        assert_eq!(vm.read_register(i as RegisterId), i, "r{i} must survive");
    }

    // SP came back to the stack base
    let bp = vm.read_register(REG_BP);
    assert_eq!(vm.read_register(REG_SP), bp);
    assert_eq!(bp, 8191);

    // the five words below the stack base hold the values in push order:
    // r0 went in first at the base, r4 last at the lowest address
    for offset in 0..5 {
        assert_eq!(vm.read_memory(8191 - offset).unwrap(), offset);
    }
}

#[test]
fn branch_and_link_returns_through_lr() {
    // r0 = ((10 * 2) + 5) * 2 = 50 only if BL links and B [LR] returns.
    // Without the link the doubling subroutine never returns past the
    // call site; without branching at all r0 stays (10 + 5) * 2 = 30.
    let vm = run(&[
        op::movi(0, 10),
        op::bli(Cond::AL, 6), // 1: call 7, LR = 2
        op::addi(0, 0, 5),
        op::bli(Cond::AL, 4), // 3: call 7, LR = 4
        op::stri(0, 6),       // 4
        op::end(),            // 5
        op::noop(),           // 6
        op::multi(0, 0, 2),   // 7: double r0
        op::b(Cond::AL, REG_LR, 0), // 8: return
    ]);

    assert_eq!(vm.read_memory(6).unwrap(), 50);
    assert_eq!(vm.read_register(0), 50);
}

#[test]
fn programs_load_from_binary_text() {
    // the same add-and-store program, as the assembler emits it
    let source: String = [
        op::addi(1, 1, 20),
        op::addi(2, 2, 30),
        op::add(3, 1, 2),
        op::stri(3, 45),
        op::end(),
    ]
    .iter()
    .map(|i| format!("{i}\n"))
    .collect();

    let mut vm = Pipeline::with_config(MemoryConfig::default());

    assert_eq!(vm.load_program(&source, 0).unwrap(), 5);
    assert_eq!(vm.run(MAX_CYCLES).unwrap(), RunState::Halted);
    assert_eq!(vm.read_memory(45).unwrap(), 50);
}

#[test]
fn results_are_independent_of_memory_latencies() {
    let program = [
        op::addi(1, 1, 20),
        op::addi(2, 2, 30),
        op::add(3, 1, 2),
        op::stri(3, 45),
        op::push(3),
        op::pop(4),
        op::end(),
    ];

    let configs = [
        MemoryConfig::instant(),
        MemoryConfig::default(),
        MemoryConfig {
            l1_latency: 3,
            l2_latency: 7,
            ram_latency: 19,
            ..MemoryConfig::default()
        },
    ];

    for config in configs {
        let mut vm = Pipeline::with_config(config);
        vm.load_instructions(&program, 0).unwrap();

        assert_eq!(vm.run(MAX_CYCLES).unwrap(), RunState::Halted);
        assert_eq!(vm.read_register(3), 50);
        assert_eq!(vm.read_register(4), 50);
        assert_eq!(vm.read_memory(45).unwrap(), 50);
    }
}

#[test]
fn slower_memory_costs_cycles_but_not_correctness() {
    let program = [op::addi(1, 1, 1), op::end()];

    let mut fast = Pipeline::with_config(MemoryConfig::instant());
    fast.load_instructions(&program, 0).unwrap();
    fast.run(MAX_CYCLES).unwrap();

    let mut slow = Pipeline::with_config(MemoryConfig::default());
    slow.load_instructions(&program, 0).unwrap();
    slow.run(MAX_CYCLES).unwrap();

    assert_eq!(fast.read_register(1), 1);
    assert_eq!(slow.read_register(1), 1);
    assert!(slow.cycles() > fast.cycles());
    assert!(slow.memory().read_stalls() > 0);
}
