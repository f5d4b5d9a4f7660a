//! TUI debugger.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and flag view
//! - Memory grid with in-place cell editing
//! - Live bus lines, held briefly after each step
//! - Step/run/breakpoint controls and a step log

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
