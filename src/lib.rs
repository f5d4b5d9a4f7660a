//! # Accumulator machine emulator
//!
//! A minimal single-accumulator computer for teaching the
//! fetch-decode-execute cycle: byte memory with wraparound addressing, a
//! shared bus that broadcasts every transfer, a processing unit with a
//! nine-instruction set, and a line assembler.
//!
//! Front ends (the terminal debugger, the WASM bindings) only observe the
//! core through bus subscriptions and step callbacks.

pub mod bus;
pub mod cpu;
pub mod asm;
pub mod config;
pub mod machine;
pub mod logging;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use bus::{Bus, BusState, Control, Subscription};
pub use cpu::{Action, Cpu, CpuState, Memory, Opcode, Registers, StepOutcome, StepResult};
pub use asm::{assemble, assemble_source, disassemble, Assembled, AssemblerError, ProgramImage};
pub use config::{ConfigError, MachineConfig};
pub use machine::Machine;

#[cfg(feature = "tui")]
pub use tui::run_debugger;
