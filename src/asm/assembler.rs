//! Line-oriented assembler.
//!
//! Syntax:
//! ```text
//! ; Comment
//! LOAD 10         ; opcode with an address operand
//! OUT             ; opcode without operand
//! HALT
//! DATA 10 7       ; preload memory[10] = 7
//! ```
//!
//! Mnemonics are case-insensitive and operands are decimal (or `0x` hex)
//! integers, reduced modulo 256. `DATA` lines do not emit program bytes;
//! they build a separate address → value map that is applied after the
//! program is loaded.

use crate::cpu::decode::Opcode;
use crate::cpu::execute::encode;
use crate::cpu::memory::to_byte;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Assembler output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembled {
    /// Program bytes, in order.
    pub program: Vec<u8>,
    /// Data preload: address → value. Later `DATA` lines win.
    pub data: BTreeMap<i64, u8>,
}

/// Assemble lines, failing on the first malformed one.
pub fn assemble<I, S>(lines: I) -> Result<Assembled, AssemblerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut asm = Assembler::new(Mode::Strict);
    for (line_num, line) in lines.into_iter().enumerate() {
        asm.process_line(line.as_ref(), line_num + 1)?;
    }
    Ok(asm.output)
}

/// Assemble a whole source text.
pub fn assemble_source(source: &str) -> Result<Assembled, AssemblerError> {
    assemble(source.lines())
}

/// Assemble lines, skipping anything malformed.
///
/// Unknown mnemonics, unparsable numbers and bad `DATA` lines are skipped;
/// every skipped line is returned as a diagnostic and logged at `warn`.
/// A missing operand emits the opcode alone, and tokens after the first
/// operand are ignored.
pub fn assemble_lenient<I, S>(lines: I) -> (Assembled, Vec<AssemblerError>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut asm = Assembler::new(Mode::Lenient);
    let mut skipped = Vec::new();
    for (line_num, line) in lines.into_iter().enumerate() {
        if let Err(e) = asm.process_line(line.as_ref(), line_num + 1) {
            warn!("skipping line: {e}");
            skipped.push(e);
        }
    }
    (asm.output, skipped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Strict,
    Lenient,
}

/// The assembler state.
struct Assembler {
    mode: Mode,
    output: Assembled,
}

impl Assembler {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            output: Assembled::default(),
        }
    }

    /// Parse one line completely before emitting anything, so a rejected
    /// line never leaves partial output behind.
    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove inline comments
        let line = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&mnemonic, args)) = parts.split_first() else {
            return Ok(());
        };

        if mnemonic.eq_ignore_ascii_case("DATA") {
            let [addr, value] = args else {
                return Err(AssemblerError::DataArity { line: line_num, found: args.len() });
            };
            let addr = parse_number(addr, line_num)?;
            let value = parse_number(value, line_num)?;
            self.output.data.insert(addr, to_byte(value));
            return Ok(());
        }

        let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| {
            AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: mnemonic.to_uppercase(),
            }
        })?;

        let operand = match args {
            [] if opcode.has_operand() && self.mode == Mode::Strict => {
                return Err(AssemblerError::MissingOperand { line: line_num, mnemonic: opcode });
            }
            [] => None,
            [operand] => Some(parse_number(operand, line_num)?),
            [_, extra @ ..] if self.mode == Mode::Strict => {
                return Err(AssemblerError::TooManyOperands { line: line_num, extra: extra.len() });
            }
            [operand, ..] => Some(parse_number(operand, line_num)?),
        };

        self.output.program.extend(encode(opcode, operand));
        Ok(())
    }
}

fn parse_number(token: &str, line_num: usize) -> Result<i64, AssemblerError> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => token.parse::<i64>(),
    };
    parsed.map_err(|_| AssemblerError::InvalidNumber {
        line: line_num,
        token: token.to_string(),
    })
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("missing operand on line {line}: {mnemonic} needs an address")]
    MissingOperand { line: usize, mnemonic: Opcode },

    #[error("invalid number on line {line}: {token}")]
    InvalidNumber { line: usize, token: String },

    #[error("too many operands on line {line}: {extra} extra")]
    TooManyOperands { line: usize, extra: usize },

    #[error("DATA on line {line} needs an address and a value, found {found} arguments")]
    DataArity { line: usize, found: usize },
}

impl AssemblerError {
    /// 1-based source line the error refers to.
    pub fn line(&self) -> usize {
        match self {
            AssemblerError::UnknownMnemonic { line, .. }
            | AssemblerError::MissingOperand { line, .. }
            | AssemblerError::InvalidNumber { line, .. }
            | AssemblerError::TooManyOperands { line, .. }
            | AssemblerError::DataArity { line, .. } => *line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_sample_program() {
        let lines = ["LOAD 10", "ADD 11", "OUT", "STORE 12", "HALT", "DATA 10 7", "DATA 11 3"];

        let result = assemble(lines).unwrap();

        assert_eq!(result.program, vec![1, 10, 3, 11, 7, 2, 12, 255]);
        assert_eq!(result.data, BTreeMap::from([(10, 7), (11, 3)]));
    }

    #[test]
    fn test_assemble_source_with_comments_and_blanks() {
        let source = r#"
            ; countdown
            load 10   ; start value

            Jz 6
            halt
        "#;

        let result = assemble_source(source).unwrap();
        assert_eq!(result.program, vec![1, 10, 6, 6, 255]);
        assert!(result.data.is_empty());

        let result = assemble(["data 3 4", "Data 5 6"]).unwrap();
        assert!(result.program.is_empty());
        assert_eq!(result.data, BTreeMap::from([(3, 4), (5, 6)]));
    }

    #[test]
    fn test_later_data_wins() {
        let result = assemble(["DATA 5 1", "DATA 5 2"]).unwrap();
        assert_eq!(result.data, BTreeMap::from([(5, 2)]));
    }

    #[test]
    fn test_operands_reduced_mod_256() {
        let result = assemble(["LOAD 300", "JMP -1", "DATA 1 0x1FF"]).unwrap();
        assert_eq!(result.program, vec![1, 44, 5, 255]);
        assert_eq!(result.data[&1], 255);
    }

    #[test]
    fn test_operand_on_operandless_opcode_is_emitted() {
        let result = assemble(["OUT 4"]).unwrap();
        assert_eq!(result.program, vec![7, 4]);
    }

    #[test]
    fn test_unknown_mnemonic_strict() {
        let err = assemble(["LOAD 1", "", "MUL 3"]).unwrap_err();
        assert_eq!(
            err,
            AssemblerError::UnknownMnemonic { line: 3, mnemonic: "MUL".into() }
        );
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_missing_operand_strict() {
        let err = assemble(["STORE"]).unwrap_err();
        assert!(matches!(err, AssemblerError::MissingOperand { line: 1, mnemonic: Opcode::Store }));
    }

    #[test]
    fn test_invalid_number() {
        let err = assemble(["ADD ten"]).unwrap_err();
        assert_eq!(err, AssemblerError::InvalidNumber { line: 1, token: "ten".into() });
    }

    #[test]
    fn test_data_arity() {
        assert!(matches!(
            assemble(["DATA 1"]).unwrap_err(),
            AssemblerError::DataArity { line: 1, found: 1 }
        ));
        assert!(matches!(
            assemble(["LOAD 1 2"]).unwrap_err(),
            AssemblerError::TooManyOperands { line: 1, extra: 1 }
        ));
    }

    #[test]
    fn test_lenient_skips_bad_lines() {
        let (result, skipped) = assemble_lenient(["LOAD 10", "FOO 1", "ADD x", "STORE", "HALT"]);

        assert_eq!(result.program, vec![1, 10, 2, 255]);
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].line(), 2);
        assert_eq!(skipped[1].line(), 3);
    }

    #[test]
    fn test_lenient_uses_first_operand() {
        let (result, skipped) = assemble_lenient(["LOAD 1 2", "HALT"]);

        assert_eq!(result.program, vec![1, 1, 255]);
        assert!(skipped.is_empty());
    }
}
