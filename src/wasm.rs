//! WebAssembly bindings.
//!
//! This module provides JavaScript-friendly wrappers around the core
//! emulator. JavaScript owns the timer in run mode and calls `step()`;
//! the bus clears immediately, so the page should animate from the bus
//! callback rather than by polling.

use wasm_bindgen::prelude::*;
use crate::asm::{assemble_source, disasm::disassemble_instruction, Assembled, ProgramImage};
use crate::bus::Subscription;
use crate::config::MachineConfig;
use crate::cpu::StepOutcome;
use crate::machine::Machine;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_err(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmMachine {
    machine: Machine,
    image: Option<ProgramImage>,
    bus_listener: Option<Subscription>,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create a machine with `memory_size` cells.
    #[wasm_bindgen(constructor)]
    pub fn new(memory_size: usize) -> Result<WasmMachine, JsError> {
        let config = MachineConfig { memory_size, ..MachineConfig::default() };
        config.validate().map_err(js_err)?;
        Ok(Self {
            machine: Machine::new(config),
            image: None,
            bus_listener: None,
        })
    }

    /// Assemble source and load it. Returns the program length in bytes.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let assembled = assemble_source(source).map_err(js_err)?;
        let image = ProgramImage::new(assembled, self.machine.config().load_address);
        self.machine.load_image(&image);
        let len = image.program.len();
        self.image = Some(image);
        Ok(len)
    }

    /// Step one instruction. Returns the step result as JSON, or `null` once halted.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        match self.machine.step() {
            StepOutcome::Executed(result) => serde_json::to_string(&result).map_err(js_err),
            StepOutcome::Halted => Ok("null".into()),
        }
    }

    /// Reset registers, keep memory.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.machine.reset();
    }

    /// Reload the last assembled program into cleared memory.
    #[wasm_bindgen]
    pub fn reload(&mut self) {
        if let Some(image) = &self.image {
            self.machine.load_image(image);
        }
    }

    /// Check if CPU is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.machine.cpu().is_halted()
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.machine.cpu().cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> usize {
        self.machine.cpu().regs.pc
    }

    /// Get accumulator value.
    #[wasm_bindgen]
    pub fn accumulator(&self) -> u8 {
        self.machine.cpu().regs.acc
    }

    /// Read a memory cell (wrapped).
    #[wasm_bindgen]
    pub fn peek(&self, addr: i32) -> u8 {
        self.machine.peek(i64::from(addr))
    }

    /// Write a memory cell (wrapped, mod 256).
    #[wasm_bindgen]
    pub fn poke(&mut self, addr: i32, value: i32) {
        self.machine.poke(i64::from(addr), i64::from(value));
    }

    /// All memory cells.
    #[wasm_bindgen]
    pub fn memory_all(&self) -> Vec<u8> {
        self.machine.memory().borrow().cells().to_vec()
    }

    /// Registers, state and bus as a JSON string.
    #[wasm_bindgen]
    pub fn snapshot_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.machine.snapshot()).map_err(js_err)
    }

    /// Call `callback(json)` on every bus change. Replaces any earlier callback.
    #[wasm_bindgen]
    pub fn on_bus(&mut self, callback: js_sys::Function) {
        if let Some(previous) = self.bus_listener.take() {
            self.machine.bus().unsubscribe(previous);
        }
        let subscription = self.machine.bus().subscribe(move |state| {
            if let Ok(json) = serde_json::to_string(state) {
                let _ = callback.call1(&JsValue::NULL, &JsValue::from_str(&json));
            }
        });
        self.bus_listener = Some(subscription);
    }

    /// Call `callback(json)` after every executed step.
    #[wasm_bindgen]
    pub fn on_step(&mut self, callback: js_sys::Function) {
        self.machine.set_step_observer(move |result| {
            if let Ok(json) = serde_json::to_string(result) {
                let _ = callback.call1(&JsValue::NULL, &JsValue::from_str(&json));
            }
        });
    }
}

/// Assemble source code. Returns `{"program": [...], "data": {"addr": value}}` as JSON.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<String, JsError> {
    let assembled = assemble_source(source).map_err(js_err)?;
    assembled_json(&assembled).map_err(js_err)
}

fn assembled_json(assembled: &Assembled) -> serde_json::Result<String> {
    serde_json::to_string(assembled)
}

/// Disassemble one instruction (opcode plus optional operand).
#[wasm_bindgen]
pub fn wasm_disassemble(opcode: u8, operand: u8) -> String {
    disassemble_instruction(&[opcode, operand]).0
}
