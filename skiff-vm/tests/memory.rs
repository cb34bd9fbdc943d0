//! Memory hierarchy behavior, both standalone and under the pipeline.

use quickcheck_macros::quickcheck;
use skiff_vm::prelude::*;

const MAX_CYCLES: u64 = 20_000;

fn small_config() -> MemoryConfig {
    MemoryConfig {
        address_bits: 8,
        l1_index_bits: 2,
        l2_index_bits: 3,
        l1_latency: 1,
        l2_latency: 2,
        ram_latency: 4,
    }
}

/// Retry until the read completes.
fn read_all(mem: &mut MemorySubsystem, addr: Word) -> Word {
    loop {
        if let Access::Ready(value) = mem.read(addr).unwrap() {
            return value;
        }
    }
}

/// Retry until the write completes.
fn write_all(mem: &mut MemorySubsystem, addr: Word, value: Word) {
    loop {
        if let Access::Ready(()) = mem.write(addr, value).unwrap() {
            return;
        }
    }
}

#[quickcheck]
fn reads_always_see_the_latest_write(ops: Vec<(u8, Word)>) -> bool {
    let mut mem = MemorySubsystem::with_config(small_config());
    let mut model = vec![0u32; 256];

    for (i, (addr, value)) in ops.into_iter().enumerate() {
        let addr = Word::from(addr);

        if i % 3 == 0 {
            if read_all(&mut mem, addr) != model[addr as usize] {
                return false;
            }
        } else {
            write_all(&mut mem, addr, value);
            model[addr as usize] = value;
        }
    }

    (0..256).all(|addr| read_all(&mut mem, addr) == model[addr as usize])
}

#[test]
fn loads_and_stores_cross_the_hierarchy() {
    // read an address repeatedly: first from RAM, then from L1
    let mut vm = Pipeline::with_config(MemoryConfig::default());

    vm.load_instructions(
        &[
            op::ldr(1, 10, 0),
            op::ldr(2, 10, 0),
            op::str(1, 10, 1),
            op::ldr(3, 10, 1),
            op::end(),
        ],
        0,
    )
    .unwrap();

    vm.write_register(10, 200);
    vm.memory_mut().ram_mut().write(200, 77).unwrap();

    assert_eq!(vm.run(MAX_CYCLES).unwrap(), RunState::Halted);
    assert_eq!(vm.read_register(1), 77);
    assert_eq!(vm.read_register(2), 77);
    assert_eq!(vm.read_register(3), 77);
    assert_eq!(vm.read_memory(201).unwrap(), 77);

    // the data block is resident after the loads
    assert!(vm.memory().l1().check_hit(200));
}

#[test]
fn data_and_fetch_reads_share_the_read_port() {
    // a load at the head of the program competes with instruction fetch
    // for the single outstanding read; both must drain without deadlock
    let mut vm = Pipeline::with_config(MemoryConfig::default());

    vm.load_instructions(
        &[
            op::ldr(1, 10, 0),
            op::ldr(2, 10, 1),
            op::ldr(3, 10, 2),
            op::end(),
        ],
        0,
    )
    .unwrap();

    vm.write_register(10, 100);
    for i in 0..3 {
        vm.memory_mut().ram_mut().write(100 + i, 7 * (i + 1)).unwrap();
    }

    assert_eq!(vm.run(MAX_CYCLES).unwrap(), RunState::Halted);
    assert_eq!(vm.read_register(1), 7);
    assert_eq!(vm.read_register(2), 14);
    assert_eq!(vm.read_register(3), 21);
}

#[test]
fn stack_traffic_writes_through() {
    let mut vm = Pipeline::with_config(MemoryConfig::default());

    vm.load_instructions(&[op::push(1), op::push(2), op::end()], 0)
        .unwrap();
    vm.write_register(1, 11);
    vm.write_register(2, 22);

    assert_eq!(vm.run(MAX_CYCLES).unwrap(), RunState::Halted);

    // write-through: RAM holds both pushed words
    assert_eq!(vm.read_memory(8191).unwrap(), 11);
    assert_eq!(vm.read_memory(8190).unwrap(), 22);
    assert_eq!(vm.read_register(REG_SP), 8189);
}

#[test]
fn cache_line_round_trip() {
    let mut level = CacheLevel::new(4, 1);
    let block = [9, 8, 7, 6];

    level.replace(40, block);

    for (i, expected) in block.into_iter().enumerate() {
        assert_eq!(level.read(40 + i as Word), Some(expected));
    }
}

#[test]
fn latency_orders_the_hierarchy() {
    let mut mem = MemorySubsystem::with_config(small_config());

    // cold: full miss pays the RAM latency
    let cold_stalls = mem.read_stalls();
    read_all(&mut mem, 20);
    let cold = mem.read_stalls() - cold_stalls;

    // warm: L1 hit pays the L1 latency
    let warm_stalls = mem.read_stalls();
    read_all(&mut mem, 20);
    let warm = mem.read_stalls() - warm_stalls;

    assert_eq!(cold, 4);
    assert_eq!(warm, 1);
}

#[test]
fn program_load_rejects_oversized_programs() {
    let mut vm = Pipeline::with_config(MemoryConfig {
        address_bits: 4,
        ..MemoryConfig::instant()
    });

    let program = vec![op::noop(); 20];
    let err = vm.load_instructions(&program, 0).unwrap_err();

    assert!(matches!(err, VmError::Loader(LoaderError::TooLarge { .. })));
}

#[test]
fn bad_binary_lines_report_their_position() {
    let mut vm = Pipeline::with_config(MemoryConfig::instant());

    let err = vm
        .load_program("10001000000000000000000000000000\n01\n", 0)
        .unwrap_err();

    assert!(matches!(
        err,
        VmError::Loader(LoaderError::BadLine { line: 2 })
    ));

    // the failed load left memory untouched
    assert_eq!(vm.read_memory(0).unwrap(), 0);
}
