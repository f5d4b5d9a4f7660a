//! Opcode table.
//!
//! Instructions are one opcode byte, optionally followed by a single
//! operand byte (always an address). Bytes that match no opcode decode to
//! nothing and are executed as inert data.

use serde::{Serialize, Deserialize};

/// Instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// No operation
    Nop = 0,
    /// ACC := [addr]
    Load = 1,
    /// [addr] := ACC
    Store = 2,
    /// ACC := ACC + [addr] (mod 256)
    Add = 3,
    /// ACC := ACC - [addr] (mod 256)
    Sub = 4,
    /// PC := addr
    Jmp = 5,
    /// if Z then PC := addr
    Jz = 6,
    /// Present ACC to observers
    Out = 7,
    /// Stop execution
    Halt = 255,
}

impl Opcode {
    /// Every opcode, in table order.
    pub const ALL: [Opcode; 9] = [
        Opcode::Nop,
        Opcode::Load,
        Opcode::Store,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Jmp,
        Opcode::Jz,
        Opcode::Out,
        Opcode::Halt,
    ];

    /// Decode an opcode byte. Unknown bytes return `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Opcode::Nop),
            1 => Some(Opcode::Load),
            2 => Some(Opcode::Store),
            3 => Some(Opcode::Add),
            4 => Some(Opcode::Sub),
            5 => Some(Opcode::Jmp),
            6 => Some(Opcode::Jz),
            7 => Some(Opcode::Out),
            255 => Some(Opcode::Halt),
            _ => None,
        }
    }

    /// Look up a mnemonic, ignoring case.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(mnemonic))
    }

    /// The encoded byte.
    #[inline]
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Out => "OUT",
            Opcode::Halt => "HALT",
        }
    }

    /// Whether the opcode is followed by an address operand.
    pub fn has_operand(self) -> bool {
        matches!(
            self,
            Opcode::Load | Opcode::Store | Opcode::Add | Opcode::Sub | Opcode::Jmp | Opcode::Jz
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_roundtrip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op.byte()), Some(op));
        }
    }

    #[test]
    fn test_unknown_bytes_decode_to_none() {
        for byte in 8u8..255 {
            assert_eq!(Opcode::from_byte(byte), None);
        }
    }

    #[test]
    fn test_mnemonic_case_insensitive() {
        assert_eq!(Opcode::from_mnemonic("load"), Some(Opcode::Load));
        assert_eq!(Opcode::from_mnemonic("Halt"), Some(Opcode::Halt));
        assert_eq!(Opcode::from_mnemonic("JZ"), Some(Opcode::Jz));
        assert_eq!(Opcode::from_mnemonic("DATA"), None);
        assert_eq!(Opcode::from_mnemonic("MUL"), None);
    }

    #[test]
    fn test_operand_table() {
        let with_operand: Vec<_> = Opcode::ALL.into_iter().filter(|op| op.has_operand()).collect();
        assert_eq!(
            with_operand,
            vec![Opcode::Load, Opcode::Store, Opcode::Add, Opcode::Sub, Opcode::Jmp, Opcode::Jz]
        );
    }
}
