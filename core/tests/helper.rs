//! Common scaffolding shared by the integration tests: build a small image
//! directly from data/instruction vectors, without going through the text
//! parser, the same way expected register arrays get built directly
//! rather than through an assembler.

use trapmach_core::config::MachineConfig;
use trapmach_core::emulator::{Machine, StopReason};
use trapmach_core::image::Image;
use trapmach_core::instruction::Instruction;
use trapmach_core::sink::CaptureSink;

#[allow(dead_code)]
pub fn image(data: Vec<(i64, i64)>, instructions: Vec<Instruction>) -> Image {
    Image { data, instructions }
}

/// Build a machine from raw data/instructions and run it to completion with
/// a default configuration, returning the machine's final state and the
/// captured PRN output alongside why it stopped.
#[allow(dead_code)]
pub fn run(data: Vec<(i64, i64)>, instructions: Vec<Instruction>) -> (Machine, StopReason, Vec<i64>) {
    run_with_cfg(data, instructions, MachineConfig::default())
}

#[allow(dead_code)]
pub fn run_with_cfg(
    data: Vec<(i64, i64)>,
    instructions: Vec<Instruction>,
    cfg: MachineConfig,
) -> (Machine, StopReason, Vec<i64>) {
    let img = image(data, instructions);
    let mut machine = Machine::new(img, cfg).expect("machine construction");
    let mut sink = CaptureSink::default();
    let reason = machine.run(&mut sink, |_, _| {});
    (machine, reason, sink.values)
}
