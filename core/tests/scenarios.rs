//! The six concrete end-to-end scenarios the machine is expected to run
//! correctly, built directly from instruction vectors rather than text
//! images (see `helper.rs`).

mod helper;

use trapmach_core::addr;
use trapmach_core::config::MachineConfig;
use trapmach_core::cpu::Mode;
use trapmach_core::emulator::StopReason;
use trapmach_core::instruction::{Instruction, Opcode};

fn instr(opcode: Opcode, arg1: i64, arg2: i64, operand_count: u8, text: &str) -> Instruction {
    Instruction::new(opcode, arg1, arg2, operand_count, text.to_string())
}

#[test]
fn minimal_halt() {
    let instructions = vec![instr(Opcode::Hlt, 0, 0, 0, "HLT")];
    let (machine, reason, _) = helper::run(vec![], instructions);
    assert_eq!(reason, StopReason::Halted);
    assert_eq!(machine.mem.read(addr::ICOUNT).unwrap(), 1);
    assert!(machine.cpu.halted);
}

#[test]
fn print_constant() {
    let data = vec![(100, 42)];
    let instructions = vec![
        instr(Opcode::SyscallPrn, 100, 0, 1, "SYSCALL PRN 100"),
        instr(Opcode::Hlt, 0, 0, 0, "HLT"),
        instr(Opcode::Hlt, 0, 0, 0, "HLT"), // the trivial handler at the syscall PC
    ];
    let mut cfg = MachineConfig::default();
    cfg.handler_pcs.syscall = 2;
    let (_machine, reason, printed) = helper::run_with_cfg(data, instructions, cfg);
    assert_eq!(printed, vec![42]);
    assert_eq!(reason, StopReason::Halted);
}

#[test]
fn protection_trap_from_user_mode() {
    let instructions = vec![
        instr(Opcode::User, 1, 0, 1, "USER 1"),
        instr(Opcode::Set, 7, 50, 2, "SET 7, 50"),
    ];
    let mut cfg = MachineConfig::default();
    cfg.max_cycles = 2; // stop right after the trap, before the handler PC is fetched
    // mem[1] is the dereference target for `USER 1`: it must hold the
    // target instruction index (1, the `SET` below), not be left at 0.
    let (machine, _reason, _) = helper::run_with_cfg(vec![(1, 1)], instructions, cfg);

    assert_eq!(machine.mem.read(addr::EVENT).unwrap(), 4);
    assert_eq!(machine.mem.read(addr::ARG1).unwrap(), 50);
    assert_eq!(machine.mem.read(addr::SAVED_PC).unwrap(), 1);
    assert_eq!(machine.cpu.mode, Mode::Kernel);
}

#[test]
fn arithmetic_and_branch_loop() {
    let data = vec![(10, 3)];
    let instructions = vec![
        instr(Opcode::Add, 10, -1, 2, "ADD 10, -1"),
        instr(Opcode::Jif, 10, 3, 2, "JIF 10, 3"),
        instr(Opcode::Set, 0, 0, 2, "SET 0, 0"), // loop back: write PC directly
        instr(Opcode::Hlt, 0, 0, 0, "HLT"),
    ];
    let (machine, reason, _) = helper::run(data, instructions);
    assert_eq!(reason, StopReason::Halted);
    assert_eq!(machine.mem.read(10).unwrap(), 0);
}

#[test]
fn call_and_ret() {
    let data = vec![(addr::SP, 1000)];
    let instructions = vec![
        instr(Opcode::Call, 5, 0, 1, "CALL 5"),
        instr(Opcode::Hlt, 0, 0, 0, "HLT"),
        Instruction::default(),
        Instruction::default(),
        Instruction::default(),
        instr(Opcode::Set, 99, 200, 2, "SET 99, 200"),
        instr(Opcode::Ret, 0, 0, 0, "RET"),
    ];
    let (machine, reason, _) = helper::run(data, instructions);
    assert_eq!(reason, StopReason::Halted);
    assert_eq!(machine.mem.read(addr::PC).unwrap(), 1);
    assert_eq!(machine.mem.read(200).unwrap(), 99);
    assert_eq!(machine.mem.read(addr::SP).unwrap(), 1000);
}

#[test]
fn indirect_store() {
    let data = vec![(150, 200), (151, 77)];
    let instructions = vec![
        instr(Opcode::Storei, 151, 150, 2, "STOREI 151, 150"),
        instr(Opcode::Hlt, 0, 0, 0, "HLT"),
    ];
    let (machine, reason, _) = helper::run(data, instructions);
    assert_eq!(reason, StopReason::Halted);
    assert_eq!(machine.mem.read(200).unwrap(), 77);
}
