//! The core crate contains the CPU interpreter for the machine: memory, the
//! instruction table, the fetch-execute-commit cycle, the memory-protection
//! wrapper and the syscall/fault trap protocol.

pub mod addr;
pub mod config;
pub mod cpu;
pub mod emulator;
pub mod fault;
pub mod image;
pub mod instruction;
pub mod memory;
pub mod sink;

pub use config::{DebugMode, MachineConfig};
pub use cpu::{Cpu, Mode};
pub use emulator::{Machine, StopReason};
pub use fault::Fault;
pub use image::ImageError;
pub use instruction::{Instruction, Opcode};
pub use memory::{Memory, MemoryError};
pub use sink::PrintSink;
