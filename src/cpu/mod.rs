//! CPU emulation.
//!
//! This module implements the whole machine core:
//! - byte memory with wraparound addressing
//! - 4 registers: PC, ACC, IR and the zero flag
//! - a 9-instruction set with single-address architecture

pub mod memory;
pub mod registers;
pub mod decode;
pub mod clear;
pub mod execute;

pub use memory::Memory;
pub use registers::{Flags, Registers};
pub use decode::Opcode;
pub use clear::{ClearScheduler, DeferredClear, ImmediateClear};
pub use execute::{Action, Cpu, CpuState, StepOutcome, StepResult};
