//! Accumulator machine emulator - CLI Entry Point
//!
//! Commands:
//! - `accum-emu run <program>` - Run an ASM file or JSON image
//! - `accum-emu debug <program>` - Interactive debugger
//! - `accum-emu asm <source>` - Assemble to a JSON image
//! - `accum-emu disasm <image>` - Disassemble an image

use accum::asm::{disassemble, load_image, save_image, ProgramImage};
use accum::{logging, Control, Machine, MachineConfig, StepOutcome};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;

#[derive(Parser)]
#[command(name = "accum-emu")]
#[command(version)]
#[command(about = "An emulator of a minimal single-accumulator teaching computer")]
struct Cli {
    /// Machine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the .asm source or JSON image to execute
        program: PathBuf,
        /// Maximum number of steps to run
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Print every step
        #[arg(short, long)]
        trace: bool,
    },
    /// Interactive terminal debugger
    Debug {
        /// Path to the .asm source or JSON image to debug
        program: PathBuf,
    },
    /// Assemble source to a JSON image
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output image file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Path to the .asm source or JSON image
        image: PathBuf,
    },
}

/// Built-in demo: 7 + 3, printed and stored at 12.
const DEMO: &str = "\
LOAD 10
ADD 11
OUT
STORE 12
HALT
DATA 10 7
DATA 11 3
";

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = match &cli.config {
        Some(path) => MachineConfig::load(path).unwrap_or_else(|e| {
            eprintln!("❌ Failed to load config {}: {}", path.display(), e);
            exit(1);
        }),
        None => MachineConfig::default(),
    };

    match cli.command {
        Some(Commands::Run { program, max_steps, trace }) => {
            let image = read_image(&program, &config);
            run_image(config, &image, max_steps, trace);
        }
        Some(Commands::Debug { program }) => {
            let image = read_image(&program, &config);
            debug_image(config, image);
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output, &config);
        }
        Some(Commands::Disasm { image }) => {
            let image = read_image(&image, &config);
            let origin = image.origin.rem_euclid(config.memory_size as i64) as usize;
            print!("{}", disassemble(&image.program, origin));
            for (addr, value) in &image.data {
                println!("DATA {} {}", addr, value);
            }
        }
        None => {
            println!("Accumulator machine emulator v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            println!();
            println!("━━━ Demo program ━━━");
            print!("{}", DEMO);
            println!();
            let image = match accum::assemble_source(DEMO) {
                Ok(assembled) => ProgramImage::new(assembled, config.load_address),
                Err(e) => {
                    eprintln!("❌ Assembly error: {}", e);
                    exit(1);
                }
            };
            run_image(config, &image, 100, true);
        }
    }
}

fn read_image(path: &PathBuf, config: &MachineConfig) -> ProgramImage {
    match load_image(path, config.load_address) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Failed to load {}: {}", path.display(), e);
            exit(1);
        }
    }
}

fn run_image(config: MachineConfig, image: &ProgramImage, max_steps: u64, trace: bool) {
    if image.program.is_empty() {
        eprintln!("❌ No instructions to execute");
        exit(1);
    }

    let mut machine = Machine::new(config);
    machine.load_image(image);

    machine.bus().subscribe(|state| {
        if state.control == Some(Control::Out) {
            if let Some(value) = state.data {
                println!("OUT {}", value);
            }
        }
    });
    if trace {
        machine.set_step_observer(|r| {
            println!(
                "{:<24} PC={:03} ACC={:3} IR={:3} Z={}",
                r.action.to_string(),
                r.pc,
                r.acc,
                r.ir,
                u8::from(r.flags.zero)
            );
        });
    }

    println!("━━━ Execution ━━━");
    let mut steps = 0u64;
    while steps < max_steps {
        match machine.step() {
            StepOutcome::Executed(_) => steps += 1,
            StepOutcome::Halted => break,
        }
        if machine.cpu().is_halted() {
            break;
        }
    }

    let snapshot = machine.snapshot();
    println!();
    println!("━━━ Result ━━━");
    println!("Steps: {}", steps);
    println!("State: {:?}", snapshot.state);
    println!("ACC:   {}", snapshot.regs.acc);
    println!("PC:    {}", snapshot.regs.pc);
    println!("Zero:  {}", snapshot.regs.flags.zero);

    if !machine.cpu().is_halted() {
        println!();
        println!("⚠️  Reached step limit ({}). Use --max-steps to increase.", max_steps);
    }
}

#[cfg(feature = "tui")]
fn debug_image(config: MachineConfig, image: ProgramImage) {
    println!("🚀 Launching debugger...");
    if let Err(e) = accum::run_debugger(config, image) {
        eprintln!("❌ Debugger error: {}", e);
        exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_image(_config: MachineConfig, _image: ProgramImage) {
    eprintln!("❌ Built without the `tui` feature");
    exit(1);
}

fn assemble_file(source_path: &PathBuf, output: Option<PathBuf>, config: &MachineConfig) {
    let out_path = output.unwrap_or_else(|| source_path.with_extension("json"));

    println!("📝 Assembling: {} → {}", source_path.display(), out_path.display());

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            exit(1);
        }
    };

    let assembled = match accum::assemble_source(&source) {
        Ok(assembled) => assembled,
        Err(e) => {
            eprintln!("❌ Assembly error: {}", e);
            exit(1);
        }
    };

    println!(
        "✓ Assembled {} bytes, {} data cells",
        assembled.program.len(),
        assembled.data.len()
    );

    let image = ProgramImage::new(assembled, config.load_address);
    if let Err(e) = save_image(&out_path, &image) {
        eprintln!("❌ Failed to save image: {}", e);
        exit(1);
    }

    println!("✓ Saved to {}", out_path.display());
}
