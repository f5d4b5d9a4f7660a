//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::bus::{Bus, BusState, Control};
use crate::cpu::clear::{ClearScheduler, ImmediateClear};
use crate::cpu::decode::Opcode;
use crate::cpu::memory::to_byte;
use crate::cpu::registers::{Flags, Registers};
use crate::cpu::Memory;
use serde::{Serialize, Deserialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, trace};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has executed HALT. Only `reset` leaves this state.
    Halted,
}

/// What a single step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Nop,
    Load { addr: usize, value: u8 },
    Store { addr: usize, value: u8 },
    Add { addr: usize, operand: u8 },
    Sub { addr: usize, operand: u8 },
    Jump { target: usize },
    JumpIfZero { target: usize, taken: bool },
    Out { value: u8 },
    Halt,
    /// A byte that is not an opcode; executed as a no-op.
    Data { value: u8 },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Nop => write!(f, "NOP"),
            Action::Load { addr, value } => write!(f, "LOAD {addr} -> ACC = {value}"),
            Action::Store { addr, value } => write!(f, "STORE ACC ({value}) -> {addr}"),
            Action::Add { addr, operand } => write!(f, "ADD {addr} (+{operand})"),
            Action::Sub { addr, operand } => write!(f, "SUB {addr} (-{operand})"),
            Action::Jump { target } => write!(f, "JMP {target}"),
            Action::JumpIfZero { target, taken: true } => write!(f, "JZ {target} (taken)"),
            Action::JumpIfZero { target, taken: false } => write!(f, "JZ {target} (not taken)"),
            Action::Out { value } => write!(f, "OUT {value}"),
            Action::Halt => write!(f, "HALT"),
            Action::Data { value } => write!(f, "DATA {value}"),
        }
    }
}

/// Register snapshot taken after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub action: Action,
    pub pc: usize,
    pub acc: u8,
    pub ir: u8,
    pub flags: Flags,
}

/// Result of calling [`Cpu::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// An instruction was executed.
    Executed(StepResult),
    /// The CPU is halted; nothing happened.
    Halted,
}

impl StepOutcome {
    /// The step result, if an instruction ran.
    pub fn executed(self) -> Option<StepResult> {
        match self {
            StepOutcome::Executed(result) => Some(result),
            StepOutcome::Halted => None,
        }
    }
}

type StepObserver = Box<dyn FnMut(&StepResult)>;

/// The processing unit.
///
/// Memory and bus are shared handles: the CPU drives them but front ends
/// may hold them too, to inspect cells or watch transactions.
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Current execution state.
    pub state: CpuState,
    /// Instructions executed since the last reset.
    pub cycles: u64,
    mem: Rc<RefCell<Memory>>,
    bus: Rc<Bus>,
    observer: Option<StepObserver>,
    clear: Box<dyn ClearScheduler>,
}

impl Cpu {
    /// Create a CPU bound to `mem` and `bus`, clearing the bus immediately
    /// after each step.
    pub fn new(mem: Rc<RefCell<Memory>>, bus: Rc<Bus>) -> Self {
        Self {
            regs: Registers::new(),
            state: CpuState::Running,
            cycles: 0,
            mem,
            bus,
            observer: None,
            clear: Box::new(ImmediateClear),
        }
    }

    /// Replace the post-step bus clear policy.
    pub fn set_clear_scheduler(&mut self, scheduler: impl ClearScheduler + 'static) {
        self.clear = Box::new(scheduler);
    }

    /// Install the step observer, replacing any previous one.
    pub fn set_step_observer(&mut self, observer: impl FnMut(&StepResult) + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Remove the step observer.
    pub fn clear_step_observer(&mut self) {
        self.observer = None;
    }

    /// Shared memory handle.
    pub fn memory(&self) -> &Rc<RefCell<Memory>> {
        &self.mem
    }

    /// Shared bus handle.
    pub fn bus(&self) -> &Rc<Bus> {
        &self.bus
    }

    /// Reset registers and state. Memory is left untouched.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.clear.cancel();
        debug!("cpu reset");
    }

    /// Write `program` into memory starting at `start` and point PC at it.
    pub fn load_program(&mut self, program: &[u8], start: i64) {
        let mut mem = self.mem.borrow_mut();
        mem.load(start, program);
        self.regs.pc = mem.wrap(start);
        debug!(bytes = program.len(), start = self.regs.pc, "program loaded");
    }

    /// Apply a data preload. Call after `load_program` so data wins on overlap.
    pub fn load_data(&mut self, data: &BTreeMap<i64, u8>) {
        let mut mem = self.mem.borrow_mut();
        for (&addr, &value) in data {
            mem.write(addr, i64::from(value));
        }
    }

    /// Execute a single instruction.
    pub fn step(&mut self) -> StepOutcome {
        if self.state == CpuState::Halted {
            return StepOutcome::Halted;
        }

        // Fetch
        let pc = self.regs.pc;
        let opcode = self.mem.borrow().read(pc as i64);
        self.bus.send(BusState::transaction(Control::Fetch, pc, opcode));
        self.regs.ir = opcode;
        self.advance_pc();

        // Decode + execute
        let action = match Opcode::from_byte(opcode) {
            Some(op) => self.execute(op),
            None => Action::Data { value: opcode },
        };

        self.cycles += 1;
        let result = self.snapshot(action);
        trace!(pc, acc = result.acc, zero = result.flags.zero, "{action}");

        if let Some(observer) = self.observer.as_mut() {
            observer(&result);
        }
        self.clear.schedule(&self.bus);

        StepOutcome::Executed(result)
    }

    /// Step until halted or `max_steps` instructions have run.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self, max_steps: u64) -> u64 {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running && self.cycles - start_cycles < max_steps {
            self.step();
        }

        self.cycles - start_cycles
    }

    fn execute(&mut self, op: Opcode) -> Action {
        match op {
            Opcode::Nop => Action::Nop,

            Opcode::Load => {
                let addr = self.fetch_address();
                let value = self.read_data(addr);
                self.regs.set_acc(value);
                Action::Load { addr, value }
            }

            Opcode::Store => {
                let addr = self.fetch_address();
                let value = self.regs.acc;
                self.mem.borrow_mut().write(addr as i64, i64::from(value));
                self.bus.send(BusState::transaction(Control::Write, addr, value));
                Action::Store { addr, value }
            }

            Opcode::Add => {
                let addr = self.fetch_address();
                let operand = self.read_data(addr);
                self.regs.set_acc(self.regs.acc.wrapping_add(operand));
                Action::Add { addr, operand }
            }

            Opcode::Sub => {
                let addr = self.fetch_address();
                let operand = self.read_data(addr);
                self.regs.set_acc(self.regs.acc.wrapping_sub(operand));
                Action::Sub { addr, operand }
            }

            Opcode::Jmp => {
                let target = self.fetch_address();
                self.regs.jump(target);
                Action::Jump { target }
            }

            Opcode::Jz => {
                let target = self.fetch_address();
                let taken = self.regs.flags.zero;
                if taken {
                    self.regs.jump(target);
                }
                Action::JumpIfZero { target, taken }
            }

            Opcode::Out => {
                let value = self.regs.acc;
                let addr = self.mem.borrow().wrap(self.regs.pc as i64 - 1);
                self.bus.send(BusState::transaction(Control::Out, addr, value));
                Action::Out { value }
            }

            Opcode::Halt => {
                self.state = CpuState::Halted;
                debug!(cycles = self.cycles + 1, "cpu halted");
                Action::Halt
            }
        }
    }

    /// Read the operand byte at PC, advance PC, and wrap it into an address.
    fn fetch_address(&mut self) -> usize {
        let mem = self.mem.borrow();
        let operand = mem.read(self.regs.pc as i64);
        self.regs.advance_pc(mem.size());
        mem.wrap(i64::from(operand))
    }

    fn read_data(&self, addr: usize) -> u8 {
        let value = self.mem.borrow().read(addr as i64);
        self.bus.send(BusState::transaction(Control::Read, addr, value));
        value
    }

    fn advance_pc(&mut self) {
        let size = self.mem.borrow().size();
        self.regs.advance_pc(size);
    }

    fn snapshot(&self, action: Action) -> StepResult {
        StepResult {
            action,
            pc: self.regs.pc,
            acc: self.regs.acc,
            ir: self.regs.ir,
            flags: self.regs.flags,
        }
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Poke a memory cell directly, bypassing the bus.
    pub fn poke(&self, addr: i64, value: i64) {
        self.mem.borrow_mut().write(addr, value);
    }

    /// Read a memory cell directly, bypassing the bus.
    pub fn peek(&self, addr: i64) -> u8 {
        self.mem.borrow().read(addr)
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Build a fresh memory/bus pair and a CPU bound to them.
pub fn standalone(memory_size: usize) -> Cpu {
    Cpu::new(
        Rc::new(RefCell::new(Memory::new(memory_size))),
        Rc::new(Bus::new()),
    )
}

/// Convenience for encoding an operand-taking instruction.
pub fn encode(op: Opcode, operand: Option<i64>) -> Vec<u8> {
    let mut bytes = vec![op.byte()];
    bytes.extend(operand.map(to_byte));
    bytes
}
