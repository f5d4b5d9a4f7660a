//! The machine as seen by a front end.
//!
//! [`Machine`] ties memory, bus and CPU together and adds a run mode: a
//! periodic scheduler that executes at most one step per interval. Any
//! operation that replaces the program or resets the CPU stops the
//! scheduler first, so a stale step can never land on a fresh program.
//!
//! Time is passed in explicitly (`now`), which keeps the scheduler
//! deterministic under test and lets the caller own the event loop.

use crate::asm::{assemble_source, Assembled, AssemblerError, ProgramImage};
use crate::bus::{Bus, BusState};
use crate::config::MachineConfig;
use crate::cpu::{Cpu, CpuState, DeferredClear, Memory, Registers, StepOutcome, StepResult};
use serde::{Serialize, Deserialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Everything a viewer needs to draw one frame, minus memory contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub regs: Registers,
    pub state: CpuState,
    pub cycles: u64,
    pub bus: BusState,
    pub running: bool,
}

#[derive(Debug, Clone, Copy)]
struct RunScheduler {
    interval: Duration,
    next_due: Option<Instant>,
}

impl RunScheduler {
    fn cancel(&mut self) {
        self.next_due = None;
    }

    fn take_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

/// Memory, bus and CPU plus a run-mode scheduler.
pub struct Machine {
    config: MachineConfig,
    bus: Rc<Bus>,
    cpu: Cpu,
    clear: Option<Rc<RefCell<DeferredClear>>>,
    runner: RunScheduler,
    /// Where the current program was loaded; `reset` rewinds PC here.
    origin: i64,
}

impl Machine {
    /// Build a machine from an already validated config.
    pub fn new(config: MachineConfig) -> Self {
        let mem = Rc::new(RefCell::new(Memory::new(config.memory_size)));
        let bus = Rc::new(Bus::new());
        let mut cpu = Cpu::new(Rc::clone(&mem), Rc::clone(&bus));

        let clear = config.bus_clear_delay().map(|delay| {
            let deferred = Rc::new(RefCell::new(DeferredClear::new(delay)));
            cpu.set_clear_scheduler(Rc::clone(&deferred));
            deferred
        });
        cpu.regs.pc = mem.borrow().wrap(config.load_address);

        let runner = RunScheduler {
            interval: config.run_interval(),
            next_due: None,
        };

        let origin = config.load_address;
        Self { config, bus, cpu, clear, runner, origin }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Shared memory handle.
    pub fn memory(&self) -> &Rc<RefCell<Memory>> {
        self.cpu.memory()
    }

    /// Shared bus handle.
    pub fn bus(&self) -> &Rc<Bus> {
        &self.bus
    }

    /// Install the CPU's step observer.
    pub fn set_step_observer(&mut self, observer: impl FnMut(&StepResult) + 'static) {
        self.cpu.set_step_observer(observer);
    }

    /// Assemble `source` and load it. On error the machine is left as it was,
    /// except that run mode is stopped.
    pub fn assemble_and_load(&mut self, source: &str) -> Result<Assembled, AssemblerError> {
        self.stop();
        let assembled = assemble_source(source)?;
        self.load(&assembled);
        Ok(assembled)
    }

    /// Load assembler output at the configured load address.
    pub fn load(&mut self, assembled: &Assembled) {
        self.load_at(assembled, self.config.load_address);
    }

    /// Load a program image at its own origin.
    pub fn load_image(&mut self, image: &ProgramImage) {
        self.load_at(&image.assembled(), image.origin);
    }

    /// Clear memory, load program then data, and rewind the CPU.
    fn load_at(&mut self, assembled: &Assembled, origin: i64) {
        self.stop();
        self.memory().borrow_mut().fill(0);
        self.cpu.reset();
        self.cpu.load_program(&assembled.program, origin);
        self.cpu.load_data(&assembled.data);
        self.origin = origin;
        self.bus.clear();
        info!(
            program = assembled.program.len(),
            data = assembled.data.len(),
            origin,
            "machine loaded"
        );
    }

    /// Stop run mode, reset the CPU and point PC at the origin of the
    /// loaded program. Memory is untouched.
    pub fn reset(&mut self) {
        self.stop();
        self.cpu.reset();
        let pc = self.memory().borrow().wrap(self.origin);
        self.cpu.regs.pc = pc;
        self.bus.clear();
    }

    /// Execute one step by hand.
    pub fn step(&mut self) -> StepOutcome {
        let outcome = self.cpu.step();
        if self.cpu.is_halted() && self.is_running() {
            debug!("halted, leaving run mode");
            self.runner.cancel();
        }
        outcome
    }

    /// Enter run mode; the first step is due immediately.
    /// Returns false if the CPU is halted.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.cpu.is_halted() {
            return false;
        }
        self.runner.next_due = Some(now);
        debug!(interval_ms = self.runner.interval.as_millis() as u64, "run mode started");
        true
    }

    /// Leave run mode. No step is pending afterwards.
    pub fn stop(&mut self) {
        if self.runner.next_due.take().is_some() {
            debug!("run mode stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.runner.next_due.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.runner.interval
    }

    /// Change the run-mode interval. Takes effect from the next step.
    pub fn set_interval(&mut self, interval: Duration) {
        self.runner.interval = interval.max(Duration::from_millis(1));
    }

    /// Drive time forward: fire a due bus clear, then run one step if one
    /// is due.
    pub fn tick(&mut self, now: Instant) -> Option<StepOutcome> {
        self.poll_bus(now);
        if self.runner.take_due(now) {
            Some(self.step())
        } else {
            None
        }
    }

    /// Fire a pending deferred bus clear if it is due.
    pub fn poll_bus(&mut self, now: Instant) -> bool {
        match &self.clear {
            Some(clear) => clear.borrow_mut().poll(&self.bus, now),
            None => false,
        }
    }

    /// Write a memory cell between steps.
    pub fn poke(&mut self, addr: i64, value: i64) {
        self.cpu.poke(addr, value);
    }

    /// Read a memory cell without touching the bus.
    pub fn peek(&self, addr: i64) -> u8 {
        self.cpu.peek(addr)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            regs: self.cpu.regs,
            state: self.cpu.state,
            cycles: self.cpu.cycles,
            bus: self.bus.state(),
            running: self.is_running(),
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("cpu", &self.cpu)
            .field("bus", &self.bus)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Control;

    const SAMPLE: &str = "LOAD 10\nADD 11\nOUT\nSTORE 12\nHALT\nDATA 10 7\nDATA 11 3\n";

    fn machine_with(config: MachineConfig, source: &str) -> Machine {
        let mut machine = Machine::new(config);
        machine.assemble_and_load(source).unwrap();
        machine
    }

    #[test]
    fn test_run_mode_steps_once_per_interval() {
        let mut machine = machine_with(MachineConfig::default(), SAMPLE);
        let interval = machine.interval();
        let t0 = Instant::now();

        assert!(machine.start(t0));
        assert!(machine.tick(t0).is_some());
        assert!(machine.tick(t0 + interval / 2).is_none());
        assert!(machine.tick(t0 + interval).is_some());
        assert_eq!(machine.cpu().cycles, 2);
    }

    #[test]
    fn test_run_mode_stops_on_halt() {
        let mut machine = machine_with(MachineConfig::default(), SAMPLE);
        let interval = machine.interval();
        let mut now = Instant::now();
        machine.start(now);

        for _ in 0..10 {
            machine.tick(now);
            now += interval;
        }

        assert!(!machine.is_running());
        assert!(machine.cpu().is_halted());
        assert_eq!(machine.cpu().cycles, 5);
        assert_eq!(machine.peek(12), 10);
        assert!(!machine.start(now));
    }

    #[test]
    fn test_load_cancels_run_mode() {
        let mut machine = machine_with(MachineConfig::default(), SAMPLE);
        let t0 = Instant::now();
        machine.start(t0);

        assert!(machine.assemble_and_load("BOGUS").is_err());
        assert!(!machine.is_running());
        assert!(machine.tick(t0 + Duration::from_secs(60)).is_none());
        // the failed load left the old program in place
        assert_eq!(machine.peek(0), 1);
    }

    #[test]
    fn test_load_clears_memory_and_applies_data_last() {
        let mut machine = Machine::default();
        machine.poke(100, 9);

        machine.assemble_and_load("LOAD 3\nHALT\nDATA 1 42").unwrap();

        assert_eq!(machine.peek(100), 0);
        assert_eq!(machine.peek(0), 1);
        assert_eq!(machine.peek(1), 42);
        assert_eq!(machine.peek(2), 255);
    }

    #[test]
    fn test_reset_stops_and_keeps_memory() {
        let mut machine = machine_with(MachineConfig::default(), SAMPLE);
        machine.start(Instant::now());
        machine.step();
        machine.step();

        machine.reset();

        assert!(!machine.is_running());
        assert_eq!(machine.cpu().regs, Registers::new());
        assert_eq!(machine.peek(10), 7);
        assert!(machine.bus().state().is_idle());
    }

    #[test]
    fn test_poke_visible_on_next_step() {
        let mut machine = machine_with(MachineConfig::default(), SAMPLE);
        machine.poke(10, 0);

        let result = machine.step().executed().unwrap();

        assert_eq!(result.acc, 0);
        assert!(result.flags.zero);
    }

    #[test]
    fn test_load_address() {
        let config = MachineConfig { load_address: 16, ..MachineConfig::default() };
        let mut machine = machine_with(config, "OUT\nHALT");

        assert_eq!(machine.cpu().regs.pc, 16);
        assert_eq!(machine.peek(16), 7);
        machine.step();
        machine.reset();
        assert_eq!(machine.cpu().regs.pc, 16);
    }

    #[test]
    fn test_reset_returns_to_image_origin() {
        let mut machine = Machine::default();
        let image = ProgramImage::new(assemble_source("OUT\nHALT").unwrap(), 16);
        machine.load_image(&image);

        machine.step();
        machine.reset();
        assert_eq!(machine.cpu().regs.pc, 16);

        // a later plain load goes back to the configured address
        machine.assemble_and_load("HALT").unwrap();
        machine.reset();
        assert_eq!(machine.cpu().regs.pc, 0);
    }

    #[test]
    fn test_deferred_bus_clear() {
        let config = MachineConfig { bus_clear_delay_ms: 50, ..MachineConfig::default() };
        let mut machine = machine_with(config, SAMPLE);

        machine.step();
        assert_eq!(machine.bus().state().control, Some(Control::Read));

        assert!(machine.poll_bus(Instant::now() + Duration::from_secs(1)));
        assert!(machine.bus().state().is_idle());
    }

    #[test]
    fn test_deferred_clear_dropped_by_reset() {
        let config = MachineConfig { bus_clear_delay_ms: 50, ..MachineConfig::default() };
        let mut machine = machine_with(config, SAMPLE);

        machine.step();
        machine.reset();

        assert!(!machine.poll_bus(Instant::now() + Duration::from_secs(1)));
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut machine = machine_with(MachineConfig::default(), SAMPLE);
        machine.step();

        let json = serde_json::to_string(&machine.snapshot()).unwrap();

        assert!(json.contains(r#""acc":7"#));
        assert!(json.contains(r#""state":"Running""#));
    }
}
