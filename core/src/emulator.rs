//! The emulator module ties memory, the instruction table and the CPU
//! together into a single runnable machine, and drives the step loop.

use std::fmt;

use crate::addr;
use crate::config::MachineConfig;
use crate::cpu::{Cpu, StepEvent};
use crate::image::Image;
use crate::instruction::Instruction;
use crate::memory::{Memory, MemoryError};
use crate::sink::PrintSink;

/// Why [`Machine::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `HLT`, an implicit hole, or a `SYSCALL HLT` handler that left the CPU
    /// halted.
    Halted,
    /// A fault occurred while the CPU was in kernel mode.
    FatalFault,
    /// The step count reached [`MachineConfig::max_cycles`] without the
    /// program halting. Not an error: exit code 0, distinguished from a
    /// clean halt only by the logged diagnostic.
    CycleCeiling,
}

/// A whole machine: memory, the instruction table and the CPU. Constructed
/// once from a parsed [`Image`] and run to completion.
pub struct Machine {
    pub cpu: Cpu,
    pub mem: Memory,
    pub instructions: Vec<Instruction>,
    pub cfg: MachineConfig,
}

impl Machine {
    /// Build a machine from a parsed image: allocate memory of the
    /// configured size, preload the data section, and take the instruction
    /// table as-is.
    pub fn new(image: Image, cfg: MachineConfig) -> Result<Self, MemoryError> {
        let mut mem = Memory::new(cfg.memory_size)?;
        for (address, value) in &image.data {
            mem.write(*address, *value)?;
        }
        Ok(Self {
            cpu: Cpu::new(),
            mem,
            instructions: image.instructions,
            cfg,
        })
    }

    /// Run until halted, fatally faulted, or the cycle ceiling is reached.
    /// `on_step` is called after every step with the machine's
    /// post-step state and the event that step produced; callers use it to
    /// drive per-step dumping, interactive waiting, and thread-table style
    /// logging, so the core loop stays free of host I/O policy.
    pub fn run(&mut self, sink: &mut dyn PrintSink, mut on_step: impl FnMut(&Machine, StepEvent)) -> StopReason {
        loop {
            if self.cpu.steps_run() >= self.cfg.max_cycles {
                log::warn!(
                    "cycle ceiling of {} steps reached without halting; stopping",
                    self.cfg.max_cycles
                );
                return StopReason::CycleCeiling;
            }

            let event = self.cpu.step(&mut self.mem, &self.instructions, &self.cfg, sink);
            on_step(self, event);

            match event {
                StepEvent::Halted => return StopReason::Halted,
                StepEvent::FatalFault => {
                    log::error!(
                        "fatal fault in kernel mode at pc {}, event code {}",
                        self.mem.read(addr::PC).unwrap_or(-1),
                        self.mem.read(addr::EVENT).unwrap_or(-1)
                    );
                    return StopReason::FatalFault;
                }
                StepEvent::Ran | StepEvent::Trapped { .. } => {}
            }
        }
    }

    fn reg(&self, a: i64) -> i64 {
        self.mem.read(a).unwrap_or(-1)
    }
}

impl fmt::Display for Machine {
    /// The register/memory dump shown on halt (debug mode 0 and the
    /// trailer of every other mode), and after each step in modes 1/2.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pc={} sp={} event={}", self.reg(addr::PC), self.reg(addr::SP), self.reg(addr::EVENT))?;
        writeln!(
            f,
            "icount={} saved_pc={} arg1={}",
            self.reg(addr::ICOUNT),
            self.reg(addr::SAVED_PC),
            self.reg(addr::ARG1)
        )?;
        write!(f, "{}", self.cpu)
    }
}

/// A one-line, thread-table-style summary for debug mode 3: PC, mode and
/// the event code, if any. The CPU has no notion of "threads"; this reports
/// only the mode/event transitions that correlate with a supervisor's
/// thread switches.
pub fn thread_table_line(machine: &Machine, event: StepEvent) -> String {
    let event_code = match event {
        StepEvent::Trapped { event_code } => event_code,
        _ => machine.reg(addr::EVENT),
    };
    format!(
        "[thread] pc={} mode={:?} event={} icount={}",
        machine.reg(addr::PC),
        machine.cpu.mode,
        event_code,
        machine.reg(addr::ICOUNT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CaptureSink;

    fn machine_from(text: &str) -> Machine {
        let image = crate::image::parse(text).unwrap();
        Machine::new(image, MachineConfig::default()).unwrap()
    }

    #[test]
    fn runs_to_halt_on_explicit_hlt() {
        let mut machine = machine_from("Begin Instruction Section\n0 HLT\nEnd Instruction Section\n");
        let mut sink = CaptureSink::default();
        let reason = machine.run(&mut sink, |_, _| {});
        assert_eq!(reason, StopReason::Halted);
    }

    #[test]
    fn cycle_ceiling_stops_a_runaway_loop() {
        let text = "\
Begin Instruction Section
0 JIF 20 0
End Instruction Section
";
        let image = crate::image::parse(text).unwrap();
        let mut cfg = MachineConfig::default();
        cfg.max_cycles = 50;
        let mut machine = Machine::new(image, cfg).unwrap();
        let mut sink = CaptureSink::default();
        let reason = machine.run(&mut sink, |_, _| {});
        assert_eq!(reason, StopReason::CycleCeiling);
    }

    #[test]
    fn prn_syscall_reaches_the_sink() {
        let text = "\
Begin Data Section
1000 42
End Data Section
Begin Instruction Section
0 SYSCALL PRN 1000
1 SYSCALL HLT
End Instruction Section
";
        let mut machine = machine_from(text);
        let mut sink = CaptureSink::default();
        machine.run(&mut sink, |_, _| {});
        assert_eq!(sink.values, vec![42]);
    }
}
