//! The cpu module contains the privileged mode, the protection wrapper and
//! the fetch-execute-commit cycle ("step").

use std::fmt;

use crate::addr;
use crate::config::MachineConfig;
use crate::fault::{self, Fault, Trap};
use crate::instruction::{Instruction, Opcode};
use crate::memory::{Memory, Word};
use crate::sink::PrintSink;

/// The machine's two-valued privilege flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Kernel,
    User,
}

impl Mode {
    pub fn is_user(self) -> bool {
        matches!(self, Mode::User)
    }
}

/// What a single `step` produced, for the driving loop in
/// [`crate::emulator::Machine`] and for debug dumping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// An ordinary instruction ran to completion.
    Ran,
    /// A trap was delivered to the supervisor (syscall or user-mode fault).
    Trapped { event_code: Word },
    /// A fault in kernel mode halted the machine.
    FatalFault,
    /// `HLT` (or an implicit hole) halted the machine.
    Halted,
}

/// The CPU: the mode flag and the halted flag. Every other piece of
/// visible CPU state (PC, SP, EVENT, ICOUNT, SAVED_PC, ARG1) lives in
/// memory and is read/written through the same path as any operand.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub halted: bool,
    pub mode: Mode,
    /// Host-side count of steps executed, used only for the cycle ceiling.
    /// Distinct from the memory-mapped ICOUNT cell, which supervisor code
    /// is free to overwrite without affecting this counter.
    steps_run: u64,
    /// Set by `protected_write` whenever a write targets the PC cell
    /// directly, regardless of the value written. `commit_pc` reads this
    /// instead of diffing mem[PC], since a write that happens to land the
    /// same value PC already held is otherwise indistinguishable from no
    /// write at all.
    pc_written: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            halted: false,
            mode: Mode::Kernel,
            steps_run: 0,
            pc_written: false,
        }
    }

    pub fn steps_run(&self) -> u64 {
        self.steps_run
    }

    /// Read a register-window cell (0..=20). These addresses are always
    /// legally accessible in both modes, so this bypasses the protection
    /// wrapper.
    fn reg(&self, mem: &Memory, a: Word) -> Word {
        mem.read(a).expect("register window read is always in range")
    }

    fn set_reg(&self, mem: &mut Memory, a: Word, v: Word) {
        mem.write(a, v)
            .expect("register window write is always in range");
    }

    /// The protection wrapper (§4.3): every instruction-initiated memory
    /// access funnels through here.
    fn protected_read(&self, mem: &Memory, addr_: Word) -> Result<Word, Fault> {
        if self.mode.is_user() && addr::is_supervisor_private(addr_) {
            return Err(Fault::Memory(addr_));
        }
        mem.read(addr_).map_err(|e| self.classify(e.into()))
    }

    fn protected_write(&mut self, mem: &mut Memory, addr_: Word, value: Word) -> Result<(), Fault> {
        if self.mode.is_user() && addr::is_supervisor_private(addr_) {
            return Err(Fault::Memory(addr_));
        }
        mem.write(addr_, value).map_err(|e| self.classify(e.into()))?;
        if addr_ == addr::PC {
            self.pc_written = true;
        }
        Ok(())
    }

    /// Out-of-range accesses are `Addressing` faults by default; in user
    /// mode they are indistinguishable from a protection violation, so they
    /// are re-classified as `Memory` faults.
    fn classify(&self, fault: Fault) -> Fault {
        match (self.mode, fault) {
            (Mode::User, Fault::Addressing(a)) => Fault::Memory(a),
            (_, f) => f,
        }
    }

    /// Run one fetch-execute-commit cycle (§4.4). Panics if the CPU is
    /// already halted; callers must check `halted` first.
    pub fn step(
        &mut self,
        mem: &mut Memory,
        instructions: &[Instruction],
        cfg: &MachineConfig,
        sink: &mut dyn PrintSink,
    ) -> StepEvent {
        assert!(!self.halted, "step called on a halted CPU");
        self.steps_run += 1;

        let pc = self.reg(mem, addr::PC);
        let event = if pc < 0 || pc as usize >= instructions.len() {
            self.deliver_fault(Fault::UnknownInstruction(pc), mem, cfg, pc)
        } else {
            self.run_one(&instructions[pc as usize], pc, mem, cfg, sink)
        };

        self.set_reg(mem, addr::ICOUNT, self.reg(mem, addr::ICOUNT) + 1);
        event
    }

    fn run_one(
        &mut self,
        instr: &Instruction,
        pc: Word,
        mem: &mut Memory,
        cfg: &MachineConfig,
        sink: &mut dyn PrintSink,
    ) -> StepEvent {
        self.pc_written = false;
        let event_before_exec = self.reg(mem, addr::EVENT);
        let outcome = self.execute(instr, pc, mem, cfg, sink);

        match outcome {
            Ok(explicit_next_pc) => {
                if self.halted {
                    return StepEvent::Halted;
                }
                self.commit_pc(mem, pc, explicit_next_pc);
                let event_after_exec = self.reg(mem, addr::EVENT);
                if event_after_exec != event_before_exec {
                    // A SYSCALL delivered its own trap directly (`enter_trap`
                    // is unconditional, unlike fault delivery).
                    StepEvent::Trapped {
                        event_code: event_after_exec,
                    }
                } else {
                    StepEvent::Ran
                }
            }
            Err(fault) => self.deliver_fault(fault, mem, cfg, pc),
        }
    }

    /// §4.4 step 7: honor a direct write to the PC cell over the
    /// instruction's own notion of "next", and otherwise write the
    /// instruction's explicit target (control-flow opcodes) or PC+1.
    fn commit_pc(&mut self, mem: &mut Memory, pc: Word, explicit_next_pc: Option<Word>) {
        if self.pc_written {
            // A generic data-movement opcode (SET, CPY, ...) targeted
            // address 0 directly; that write already won, even if it
            // happened to write back the value PC already held.
            return;
        }
        let next_pc = explicit_next_pc.unwrap_or(pc + 1);
        self.set_reg(mem, addr::PC, next_pc);
    }

    fn deliver_fault(&mut self, fault: Fault, mem: &mut Memory, cfg: &MachineConfig, faulting_pc: Word) -> StepEvent {
        match fault.take_trap(self.mode.is_user(), mem, cfg, faulting_pc) {
            Trap::Fatal => {
                self.halted = true;
                StepEvent::FatalFault
            }
            Trap::Delivered { handler_pc } => {
                self.mode = Mode::Kernel;
                self.set_reg(mem, addr::PC, handler_pc);
                StepEvent::Trapped {
                    event_code: self.reg(mem, addr::EVENT),
                }
            }
        }
    }

    /// Enter the supervisor unconditionally, regardless of current mode.
    /// Used by SYSCALL, which is not gated on user mode the way faults are.
    fn enter_trap(&mut self, mem: &mut Memory, event: Word, arg1: Word, saved_pc: Word, handler_pc: Word) {
        self.mode = Mode::Kernel;
        fault::deliver_trap(mem, event, arg1, saved_pc);
        self.set_reg(mem, addr::PC, handler_pc);
        // Already landed on the handler; commit_pc must not override it.
        self.pc_written = true;
    }

    /// Execute the instruction's semantics (§4.2). Returns the explicit
    /// control-flow target for opcodes that redirect PC (`JIF` taken,
    /// `CALL`, `RET`, `USER`, and traps); `None` means "fall through to
    /// PC+1 unless a generic write already changed the PC cell".
    fn execute(
        &mut self,
        instr: &Instruction,
        pc: Word,
        mem: &mut Memory,
        cfg: &MachineConfig,
        sink: &mut dyn PrintSink,
    ) -> Result<Option<Word>, Fault> {
        use Opcode::*;
        match instr.opcode {
            Set => {
                self.protected_write(mem, instr.arg2, instr.arg1)?;
                Ok(None)
            }
            Cpy => {
                let v = self.protected_read(mem, instr.arg1)?;
                self.protected_write(mem, instr.arg2, v)?;
                Ok(None)
            }
            Cpyi => {
                let ptr = self.protected_read(mem, instr.arg1)?;
                let v = self.protected_read(mem, ptr)?;
                self.protected_write(mem, instr.arg2, v)?;
                Ok(None)
            }
            Cpyi2 => {
                let ptr1 = self.protected_read(mem, instr.arg1)?;
                let v = self.protected_read(mem, ptr1)?;
                let ptr2 = self.protected_read(mem, instr.arg2)?;
                self.protected_write(mem, ptr2, v)?;
                Ok(None)
            }
            Add => {
                let v = self.protected_read(mem, instr.arg1)?;
                let sum = v
                    .checked_add(instr.arg2)
                    .ok_or(Fault::Arithmetic(instr.arg1))?;
                self.protected_write(mem, instr.arg1, sum)?;
                Ok(None)
            }
            Addi => {
                let v1 = self.protected_read(mem, instr.arg1)?;
                let v2 = self.protected_read(mem, instr.arg2)?;
                let sum = v1.checked_add(v2).ok_or(Fault::Arithmetic(instr.arg1))?;
                self.protected_write(mem, instr.arg1, sum)?;
                Ok(None)
            }
            Subi => {
                let v1 = self.protected_read(mem, instr.arg1)?;
                let v2 = self.protected_read(mem, instr.arg2)?;
                let diff = v1.checked_sub(v2).ok_or(Fault::Arithmetic(instr.arg2))?;
                self.protected_write(mem, instr.arg2, diff)?;
                Ok(None)
            }
            Jif => {
                let v = self.protected_read(mem, instr.arg1)?;
                if v <= 0 {
                    Ok(Some(instr.arg2))
                } else {
                    Ok(None)
                }
            }
            Push => {
                let sp = self.reg(mem, addr::SP);
                let new_sp = sp - 1;
                if new_sp < 0 {
                    return Err(Fault::Stack(new_sp));
                }
                let v = self.protected_read(mem, instr.arg1)?;
                self.protected_write(mem, new_sp, v)?;
                self.set_reg(mem, addr::SP, new_sp);
                Ok(None)
            }
            Pop => {
                let sp = self.reg(mem, addr::SP);
                if sp < 0 || sp as usize >= mem.len() {
                    return Err(Fault::Stack(sp));
                }
                let v = self.protected_read(mem, sp)?;
                self.protected_write(mem, instr.arg1, v)?;
                self.set_reg(mem, addr::SP, sp + 1);
                Ok(None)
            }
            Call => {
                let sp = self.reg(mem, addr::SP);
                let new_sp = sp - 1;
                if new_sp < 0 {
                    return Err(Fault::Stack(new_sp));
                }
                self.protected_write(mem, new_sp, pc + 1)?;
                self.set_reg(mem, addr::SP, new_sp);
                Ok(Some(instr.arg1))
            }
            Ret => {
                let sp = self.reg(mem, addr::SP);
                if sp < 0 || sp as usize >= mem.len() {
                    return Err(Fault::Stack(sp));
                }
                let target = self.protected_read(mem, sp)?;
                self.set_reg(mem, addr::SP, sp + 1);
                Ok(Some(target))
            }
            Hlt => {
                self.halted = true;
                Ok(None)
            }
            User => {
                let target = self.protected_read(mem, instr.arg1)?;
                self.mode = Mode::User;
                Ok(Some(target))
            }
            Loadi => {
                let ptr = self.protected_read(mem, instr.arg1)?;
                let v = self.protected_read(mem, ptr)?;
                self.protected_write(mem, instr.arg2, v)?;
                Ok(None)
            }
            Storei => {
                let v = self.protected_read(mem, instr.arg1)?;
                let ptr = self.protected_read(mem, instr.arg2)?;
                self.protected_write(mem, ptr, v)?;
                Ok(None)
            }
            SyscallPrn => {
                let v = self.protected_read(mem, instr.arg1)?;
                sink.print(v);
                self.enter_trap(
                    mem,
                    fault::EVENT_SYSCALL_PRN,
                    instr.arg1,
                    pc + 1,
                    cfg.handler_pcs.syscall,
                );
                Ok(None)
            }
            SyscallHlt => {
                self.enter_trap(mem, fault::EVENT_SYSCALL_HLT, 0, pc + 1, cfg.handler_pcs.syscall);
                Ok(None)
            }
            SyscallYield => {
                self.enter_trap(
                    mem,
                    fault::EVENT_SYSCALL_YIELD,
                    0,
                    pc + 1,
                    cfg.handler_pcs.syscall,
                );
                Ok(None)
            }
        }
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mode={:?} halted={} steps_run={}",
            self.mode, self.halted, self.steps_run
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::sink::CaptureSink;

    #[test]
    fn direct_pc_write_to_its_own_current_value_still_wins() {
        // `SET 0, 0` at PC 0 writes address 0 (PC) with the value it already
        // holds. A before/after value diff would see "no change" and let
        // commit_pc advance to PC+1; the write must still be honored.
        let instructions = vec![Instruction::new(Opcode::Set, 0, 0, 2, "SET 0, 0".to_string())];
        let mut cpu = Cpu::new();
        let mut mem = Memory::new(32).unwrap();
        let cfg = MachineConfig::default();
        let mut sink = CaptureSink::default();
        cpu.step(&mut mem, &instructions, &cfg, &mut sink);
        assert_eq!(mem.read(addr::PC).unwrap(), 0);
    }
}
