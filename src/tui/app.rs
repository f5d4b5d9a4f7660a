//! Debugger application state and logic.

use crate::asm::disasm::disassemble_instruction;
use crate::asm::ProgramImage;
use crate::bus::BusState;
use crate::config::MachineConfig;
use crate::machine::Machine;
use crate::cpu::StepOutcome;
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Bus transactions linger this long when the config asks for an immediate clear.
const DEFAULT_BUS_CLEAR_MS: u64 = 300;
/// Step log entries kept for the log panel.
const LOG_CAPACITY: usize = 64;
/// Memory cells per row in the memory view.
pub const CELLS_PER_ROW: usize = 8;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub machine: Machine,
    /// Original program for reload.
    pub image: ProgramImage,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<usize>,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// First memory row shown.
    pub mem_scroll: usize,
    /// Selected memory cell, for editing.
    pub selected_addr: usize,
    /// Recent step actions, newest last.
    pub log: Rc<RefCell<VecDeque<String>>>,
    /// Last non-idle bus transaction.
    pub last_transfer: Rc<RefCell<Option<BusState>>>,
    /// Run was resumed while sitting on a breakpoint; let the first step through.
    resume_past_breakpoint: bool,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(mut config: MachineConfig, image: ProgramImage) -> Self {
        if config.bus_clear_delay_ms == 0 {
            config.bus_clear_delay_ms = DEFAULT_BUS_CLEAR_MS;
        }
        let mut machine = Machine::new(config);
        machine.load_image(&image);

        let log = Rc::new(RefCell::new(VecDeque::with_capacity(LOG_CAPACITY)));
        let sink = Rc::clone(&log);
        machine.set_step_observer(move |result| {
            let mut log = sink.borrow_mut();
            if log.len() == LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(format!(
                "{:<22} ACC={:3} Z={}",
                result.action.to_string(),
                result.acc,
                u8::from(result.flags.zero)
            ));
        });

        let last_transfer = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&last_transfer);
        machine.bus().subscribe(move |state: &BusState| {
            if !state.is_idle() {
                *sink.borrow_mut() = Some(*state);
            }
        });

        let selected_addr = machine.cpu().regs.pc;
        Self {
            machine,
            image,
            breakpoints: HashSet::new(),
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
            selected_addr,
            log,
            last_transfer,
            resume_past_breakpoint: false,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        let pc = self.machine.cpu().regs.pc;
        match self.machine.step() {
            StepOutcome::Executed(result) => {
                self.status = format!("PC={:03}: {}", pc, result.action);
            }
            StepOutcome::Halted => {
                self.status = format!("CPU halted after {} cycles", self.machine.cpu().cycles);
            }
        }
    }

    /// Enter run mode.
    pub fn run(&mut self) {
        self.resume_past_breakpoint = self.breakpoints.contains(&self.machine.cpu().regs.pc);
        if self.machine.start(Instant::now()) {
            self.status = format!("Running every {} ms...", self.machine.interval().as_millis());
        } else {
            self.status = "CPU halted. Press 'x' to reset.".into();
        }
    }

    /// Leave run mode.
    pub fn pause(&mut self) {
        self.machine.stop();
        self.status = "Paused.".into();
    }

    /// Advance run mode and the deferred bus clear.
    pub fn tick(&mut self, now: Instant) {
        if !self.machine.is_running() {
            self.machine.poll_bus(now);
            return;
        }

        // Check for breakpoint
        let pc = self.machine.cpu().regs.pc;
        if self.breakpoints.contains(&pc) {
            if self.resume_past_breakpoint {
                self.resume_past_breakpoint = false;
            } else {
                self.machine.stop();
                self.status = format!("Breakpoint at PC={}", pc);
                return;
            }
        }

        if let Some(StepOutcome::Executed(result)) = self.machine.tick(now) {
            self.status = format!("PC={:03}: {}", result.pc, result.action);
            if !self.machine.is_running() {
                self.status = format!("Halted after {} cycles", self.machine.cpu().cycles);
            }
        }
    }

    /// Toggle breakpoint at the selected address.
    pub fn toggle_breakpoint(&mut self) {
        let addr = self.selected_addr;
        if self.breakpoints.remove(&addr) {
            self.status = format!("Removed breakpoint at {}", addr);
        } else {
            self.breakpoints.insert(addr);
            self.status = format!("Set breakpoint at {}", addr);
        }
    }

    /// Reset registers, keep memory.
    pub fn reset(&mut self) {
        self.machine.reset();
        *self.last_transfer.borrow_mut() = None;
        self.status = "Reset. Ready.".into();
    }

    /// Reload the original program into cleared memory.
    pub fn reload(&mut self) {
        self.machine.load_image(&self.image);
        self.log.borrow_mut().clear();
        *self.last_transfer.borrow_mut() = None;
        self.status = "Program reloaded.".into();
    }

    /// Move the memory selection by `delta` cells, wrapping.
    pub fn move_selection(&mut self, delta: i64) {
        let mem = self.machine.memory().borrow();
        self.selected_addr = mem.wrap(self.selected_addr as i64 + delta);
    }

    /// Add `delta` to the selected cell (mod 256).
    pub fn edit_selected(&mut self, delta: i64) {
        let addr = self.selected_addr as i64;
        let value = i64::from(self.machine.peek(addr)) + delta;
        self.machine.poke(addr, value);
        self.status = format!("[{}] = {}", addr, self.machine.peek(addr));
    }

    /// Scale the run interval.
    pub fn change_speed(&mut self, faster: bool) {
        let interval = self.machine.interval();
        let next = if faster { interval / 2 } else { interval * 2 };
        self.machine
            .set_interval(next.clamp(Duration::from_millis(10), Duration::from_secs(5)));
        self.status = format!("Interval {} ms", self.machine.interval().as_millis());
    }

    /// Keep the selected cell inside a window of `rows` memory rows.
    pub fn scroll_to_selection(&mut self, rows: usize) {
        let row = self.selected_addr / CELLS_PER_ROW;
        if row < self.mem_scroll {
            self.mem_scroll = row;
        } else if rows > 0 && row >= self.mem_scroll + rows {
            self.mem_scroll = row + 1 - rows;
        }
    }

    /// Disassembly around the current PC: (address, text, is_current).
    pub fn get_disassembly(&self, lines: usize) -> Vec<(usize, String, bool)> {
        let mem = self.machine.memory().borrow();
        let pc = self.machine.cpu().regs.pc;
        let mut addr = self.image.origin.rem_euclid(mem.size() as i64) as usize;
        let mut out = Vec::new();

        // Walk from the load address so operands stay aligned with opcodes.
        for _ in 0..mem.size() {
            let bytes = [mem.read(addr as i64), mem.read(addr as i64 + 1)];
            let (text, len) = disassemble_instruction(&bytes);
            out.push((addr, text, addr == pc));
            addr = mem.wrap((addr + len) as i64);
            if out.len() >= lines.max(1) * 4 {
                break;
            }
        }

        let current = out.iter().position(|(_, _, is_pc)| *is_pc).unwrap_or(0);
        let start = current.saturating_sub(lines / 2);
        out.into_iter().skip(start).take(lines).collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(config: MachineConfig, image: ProgramImage) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create app
    let mut app = DebuggerApp::new(config, image);

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &mut app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.machine.stop();
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => app.pause(),
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Char('l') => app.reload(),
                        KeyCode::Char('+') | KeyCode::Char('=') => app.edit_selected(1),
                        KeyCode::Char('-') => app.edit_selected(-1),
                        KeyCode::Char(']') => app.change_speed(true),
                        KeyCode::Char('[') => app.change_speed(false),
                        KeyCode::Left => app.move_selection(-1),
                        KeyCode::Right => app.move_selection(1),
                        KeyCode::Up => app.move_selection(-(CELLS_PER_ROW as i64)),
                        KeyCode::Down => app.move_selection(CELLS_PER_ROW as i64),
                        _ => {}
                    }
                }
            }
        }

        app.tick(Instant::now());

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
