//! Runtime configuration: memory size, debug verbosity, the cycle ceiling
//! and the handler PCs the supervisor image is expected to honor. Unlike
//! the register window and region boundaries in [`crate::addr`], these are
//! knobs, not protocol.

use crate::memory::{Word, DEFAULT_SIZE};

/// Debug verbosity selected with `-D` on the CLI, also usable when
/// embedding the simulator as a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    /// Dump registers once, on halt.
    #[default]
    DumpOnHalt,
    /// Dump registers after every step.
    DumpEachStep,
    /// Dump registers after every step and block for input before continuing.
    StepAndWait,
    /// Print a one-line thread-table-style summary on every trap/mode-change.
    ThreadTable,
}

impl DebugMode {
    /// Map the `-D0`..`-D3` numeric levels used on the CLI.
    pub fn from_level(level: u8) -> Option<DebugMode> {
        match level {
            0 => Some(DebugMode::DumpOnHalt),
            1 => Some(DebugMode::DumpEachStep),
            2 => Some(DebugMode::StepAndWait),
            3 => Some(DebugMode::ThreadTable),
            _ => None,
        }
    }
}

/// The fixed instruction indices the supervisor must place its trap
/// handlers at. These are configuration, agreed at build time between the
/// CPU and the supervisor image — not derived from the image itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerPcs {
    pub syscall: Word,
    pub memory_fault: Word,
    pub unknown_instruction: Word,
    pub arithmetic_fault: Word,
}

impl Default for HandlerPcs {
    fn default() -> Self {
        Self {
            syscall: 900,
            memory_fault: 910,
            unknown_instruction: 920,
            arithmetic_fault: 930,
        }
    }
}

/// Configuration for a single machine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub memory_size: usize,
    pub debug_mode: DebugMode,
    pub handler_pcs: HandlerPcs,
    /// Safety valve: the maximum number of steps the simulation loop will
    /// run before giving up with a `CycleCeiling` diagnostic.
    pub max_cycles: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_SIZE,
            debug_mode: DebugMode::default(),
            handler_pcs: HandlerPcs::default(),
            max_cycles: 10_000_000,
        }
    }
}
