//! CPU registers.
//!
//! The machine has a tiny register file:
//! - PC: program counter, an index into memory
//! - ACC: 8-bit accumulator
//! - IR: the last fetched opcode byte
//! - Z: zero flag, set by LOAD/ADD/SUB

use serde::{Serialize, Deserialize};

/// Condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags {
    /// Set when the last load/arithmetic result was zero.
    pub zero: bool,
}

/// The register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    /// Program counter.
    pub pc: usize,
    /// Accumulator.
    pub acc: u8,
    /// Instruction register.
    pub ir: u8,
    /// Condition flags.
    pub flags: Flags,
}

impl Registers {
    /// Create a register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Store a load/arithmetic result in ACC and update the zero flag.
    pub fn set_acc(&mut self, value: u8) {
        self.acc = value;
        self.flags.zero = value == 0;
    }

    /// Advance the program counter by one within a memory of `size` cells.
    /// Returns the old value.
    pub fn advance_pc(&mut self, size: usize) -> usize {
        let old = self.pc;
        self.pc = (self.pc + 1) % size.max(1);
        old
    }

    /// Set the program counter to an already wrapped address.
    pub fn jump(&mut self, addr: usize) {
        self.pc = addr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_acc_updates_zero_flag() {
        let mut regs = Registers::new();

        regs.set_acc(5);
        assert!(!regs.flags.zero);

        regs.set_acc(0);
        assert!(regs.flags.zero);
    }

    #[test]
    fn test_advance_pc_wraps() {
        let mut regs = Registers::new();
        regs.pc = 10;

        let old = regs.advance_pc(256);
        assert_eq!(old, 10);
        assert_eq!(regs.pc, 11);

        regs.pc = 255;
        regs.advance_pc(256);
        assert_eq!(regs.pc, 0);
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers { pc: 4, acc: 9, ir: 3, flags: Flags { zero: true } };
        regs.reset();
        assert_eq!(regs, Registers::new());
    }
}
