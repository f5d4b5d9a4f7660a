//! Program image files.
//!
//! An image is the assembler output saved as JSON:
//! ```json
//! { "origin": 0, "program": [1, 10, 255], "data": { "10": 7 } }
//! ```
//! `.asm` files can be opened through the same entry point; they are
//! assembled on the fly.

use crate::asm::assembler::{assemble_source, Assembled, AssemblerError};
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// A program plus its data preload and load address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramImage {
    /// Load address of the first program byte.
    #[serde(default)]
    pub origin: i64,
    pub program: Vec<u8>,
    #[serde(default)]
    pub data: BTreeMap<i64, u8>,
}

impl ProgramImage {
    /// Wrap assembler output with a load address.
    pub fn new(assembled: Assembled, origin: i64) -> Self {
        Self {
            origin,
            program: assembled.program,
            data: assembled.data,
        }
    }

    /// Split back into assembler output.
    pub fn assembled(&self) -> Assembled {
        Assembled {
            program: self.program.clone(),
            data: self.data.clone(),
        }
    }

    /// Parse an image from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ImageError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ImageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Load an image from disk. Files ending in `.asm` are assembled and placed
/// at `default_origin`; anything else is read as a JSON image.
pub fn load_image<P: AsRef<Path>>(path: P, default_origin: i64) -> Result<ProgramImage, ImageError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;

    let is_asm = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("asm"));
    if is_asm {
        let assembled = assemble_source(&text)?;
        Ok(ProgramImage::new(assembled, default_origin))
    } else {
        ProgramImage::from_json(&text)
    }
}

/// Save an image to disk as JSON.
pub fn save_image<P: AsRef<Path>>(path: P, image: &ProgramImage) -> Result<(), ImageError> {
    std::fs::write(path, image.to_json()? + "\n")?;
    Ok(())
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed image: {0}")]
    Json(#[from] serde_json::Error),

    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_json() {
        let image = ProgramImage::from_json(r#"{"program":[1,10,255],"data":{"10":7}}"#).unwrap();

        assert_eq!(image.origin, 0);
        assert_eq!(image.program, vec![1, 10, 255]);
        assert_eq!(image.data, BTreeMap::from([(10, 7)]));
    }

    #[test]
    fn test_json_survives_serialization() {
        let image = ProgramImage {
            origin: 16,
            program: vec![7, 255],
            data: BTreeMap::from([(-1, 3)]),
        };

        let parsed = ProgramImage::from_json(&image.to_json().unwrap()).unwrap();
        assert_eq!(parsed, image);
    }

    #[test]
    fn test_malformed_image() {
        let err = ProgramImage::from_json(r#"{"program":[256]}"#).unwrap_err();
        assert!(matches!(err, ImageError::Json(_)));
    }

    #[test]
    fn test_load_asm_and_json_files() {
        let dir = std::env::temp_dir().join(format!("accum-image-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let asm_path = dir.join("prog.asm");
        std::fs::write(&asm_path, "LOAD 10\nHALT\nDATA 10 7\n").unwrap();
        let from_asm = load_image(&asm_path, 4).unwrap();
        assert_eq!(from_asm.origin, 4);
        assert_eq!(from_asm.program, vec![1, 10, 255]);

        let json_path = dir.join("prog.json");
        save_image(&json_path, &from_asm).unwrap();
        assert_eq!(load_image(&json_path, 0).unwrap(), from_asm);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
