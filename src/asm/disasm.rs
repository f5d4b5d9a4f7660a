//! Disassembler.
//!
//! Converts program bytes back to readable assembly.

use crate::cpu::decode::Opcode;

/// One decoded listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Address of the first byte.
    pub addr: usize,
    /// Encoded bytes (one or two).
    pub bytes: Vec<u8>,
    /// Assembly text.
    pub text: String,
}

/// Disassemble a single instruction at the start of `bytes`.
///
/// Returns the text and the number of bytes consumed. A missing trailing
/// operand is shown as `?`.
pub fn disassemble_instruction(bytes: &[u8]) -> (String, usize) {
    let Some(&first) = bytes.first() else {
        return (String::new(), 0);
    };

    match Opcode::from_byte(first) {
        Some(op) if op.has_operand() => match bytes.get(1) {
            Some(operand) => (format!("{op} {operand}"), 2),
            None => (format!("{op} ?"), 1),
        },
        Some(op) => (op.to_string(), 1),
        None => (format!("DATA {first}"), 1),
    }
}

/// Walk `bytes` as a program loaded at `origin`.
pub fn disassemble_lines(bytes: &[u8], origin: usize) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let (text, len) = disassemble_instruction(&bytes[offset..]);
        lines.push(Line {
            addr: origin + offset,
            bytes: bytes[offset..offset + len].to_vec(),
            text,
        });
        offset += len;
    }

    lines
}

/// Disassemble a program into a printable listing.
pub fn disassemble(bytes: &[u8], origin: usize) -> String {
    let mut output = String::new();
    output.push_str("; Disassembly\n");
    output.push_str("; -----------\n\n");

    for line in disassemble_lines(bytes, origin) {
        let hex: Vec<String> = line.bytes.iter().map(|b| format!("{b:02X}")).collect();
        output.push_str(&format!("{:03}: {:<12} ; {}\n", line.addr, line.text, hex.join(" ")));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_halt() {
        assert_eq!(disassemble_instruction(&[255]), ("HALT".to_string(), 1));
    }

    #[test]
    fn test_disassemble_load() {
        assert_eq!(disassemble_instruction(&[1, 10]), ("LOAD 10".to_string(), 2));
    }

    #[test]
    fn test_truncated_operand() {
        assert_eq!(disassemble_instruction(&[3]), ("ADD ?".to_string(), 1));
    }

    #[test]
    fn test_listing() {
        let lines = disassemble_lines(&[1, 10, 7, 42, 255], 4);
        let text: Vec<_> = lines.iter().map(|l| (l.addr, l.text.as_str())).collect();
        assert_eq!(text, vec![(4, "LOAD 10"), (6, "OUT"), (7, "DATA 42"), (8, "HALT")]);
    }

    #[test]
    fn test_disassemble_text() {
        let listing = disassemble(&[2, 12], 0);
        assert!(listing.contains("000: STORE 12"));
        assert!(listing.contains("02 0C"));
    }
}
