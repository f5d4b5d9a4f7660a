//! Assembler and disassembler.
//!
//! This module provides:
//! - A single-pass line assembler (text → program bytes + data map)
//! - A disassembler (bytes → readable text)
//! - JSON program images for saving assembled output

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, assemble_lenient, assemble_source, Assembled, AssemblerError};
pub use disasm::disassemble;
pub use image::{load_image, save_image, ImageError, ProgramImage};
