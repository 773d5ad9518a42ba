mod stdio;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use trapmach_core::config::{DebugMode, HandlerPcs, MachineConfig};
use trapmach_core::cpu::{Mode, StepEvent};
use trapmach_core::emulator::{thread_table_line, Machine, StopReason};
use trapmach_core::image;
use trapmach_core::memory::DEFAULT_SIZE;
use trapmach_core::sink::StdoutSink;

/// Run a program image on the register-poor, memory-mapped CPU simulator.
#[derive(Parser, Debug)]
#[command(name = "trapmach")]
struct Args {
    /// Path to the program image file.
    image: PathBuf,

    /// Debug verbosity: 0 = dump on halt, 1 = dump each step,
    /// 2 = dump each step and wait for Enter, 3 = thread-table dump on
    /// trap/mode-change events.
    #[arg(short = 'D', value_name = "LEVEL", default_value_t = 0)]
    debug: u8,

    /// Memory cell count.
    #[arg(short = 'm', long = "memory-size", value_name = "N")]
    memory_size: Option<usize>,

    /// Raise the log level filter by one step per occurrence. RUST_LOG
    /// takes precedence when set.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let debug_mode = match DebugMode::from_level(args.debug) {
        Some(mode) => mode,
        None => {
            eprintln!("invalid debug level -D{}: must be 0, 1, 2 or 3", args.debug);
            return ExitCode::FAILURE;
        }
    };

    let text = match fs::read_to_string(&args.image) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("cannot read image {}: {}", args.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let parsed = match image::parse(&text) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("{}: {}", args.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let cfg = MachineConfig {
        memory_size: args.memory_size.unwrap_or(DEFAULT_SIZE),
        debug_mode,
        handler_pcs: HandlerPcs::default(),
        ..MachineConfig::default()
    };

    let mut machine = match Machine::new(parsed, cfg) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut sink = StdoutSink;
    let mut last_mode = machine.cpu.mode;
    let reason = machine.run(&mut sink, |machine, event| {
        dump_per_step(machine, event, debug_mode, &mut last_mode);
    });

    println!("{}", machine);

    match reason {
        StopReason::Halted | StopReason::CycleCeiling => ExitCode::SUCCESS,
        StopReason::FatalFault => ExitCode::FAILURE,
    }
}

/// Dump behavior between steps, selected by `-D`. Modes 1/2 print a full
/// register dump every step; mode 3 prints a one-line summary only on a
/// trap or a mode change; mode 0 prints nothing until the trailer.
fn dump_per_step(
    machine: &Machine,
    event: StepEvent,
    debug_mode: DebugMode,
    last_mode: &mut Mode,
) {
    match debug_mode {
        DebugMode::DumpOnHalt => {}
        DebugMode::DumpEachStep => {
            println!("{}", machine);
        }
        DebugMode::StepAndWait => {
            println!("{}", machine);
            stdio::wait_for_enter();
        }
        DebugMode::ThreadTable => {
            let mode_changed = machine.cpu.mode != *last_mode;
            if mode_changed || matches!(event, StepEvent::Trapped { .. }) {
                println!("{}", thread_table_line(machine, event));
            }
        }
    }
    *last_mode = machine.cpu.mode;
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();
}
