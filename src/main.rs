use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::Result;
use tracing_subscriber::EnvFilter;

use ls8::disasm::disassemble;
use ls8::{load_program, output, Cpu, Features, LoadConfig, RunOptions};

/// ls8 runs programs for the LS-8, a tiny 8-bit byte-code machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a program file to run
    path: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,

    /// Directory program files are resolved against
    #[arg(long, global = true, env = "LS8_PROGRAM_DIR", default_value = "examples")]
    dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Load a program file and run it
    Run {
        /// Program file to run
        name: Option<PathBuf>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Check that a program file parses and fits in memory, without running it
    Check {
        /// Program file to check
        name: Option<PathBuf>,
    },
    /// Print a listing of the instructions in a program file
    Dump {
        /// Program file to list
        name: Option<PathBuf>,
    },
}

#[derive(clap::Args, Clone, Debug)]
struct RunArgs {
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long)]
    minimal: bool,
    /// Comma-separated machine features: `trace`, `stack-guard`
    #[arg(short, long)]
    features: Option<Features>,
    /// Give up after executing this many instructions
    #[arg(long)]
    max_steps: Option<u64>,
    /// Print register contents once the program stops
    #[arg(short, long)]
    registers: bool,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(ls8::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    match args.command {
        Some(Command::Run { name, run: opts }) => run(&args.dir, name.as_deref(), &opts),
        Some(Command::Check { name }) => {
            let config = LoadConfig::new(&args.dir, name);
            file_message(MsgColor::Green, "Checking", &config.path()?);
            let program = load_program(&config)?;
            let size = format!("{} of {} bytes used", program.len(), ls8::MEMORY_SIZE);
            message(MsgColor::Green, "Success", &size);
            Ok(())
        }
        Some(Command::Dump { name }) => {
            let config = LoadConfig::new(&args.dir, name);
            let program = load_program(&config)?;
            for line in disassemble(&program) {
                println!("{line}");
            }
            Ok(())
        }
        None => run(&args.dir, args.path.as_deref(), &args.run),
    }
}

enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(dir: &Path, name: Option<&Path>, opts: &RunArgs) -> Result<()> {
    let config = LoadConfig::new(dir, name);
    let path = config.path()?;
    if !opts.minimal {
        file_message(MsgColor::Green, "Loading", &path);
    }
    let program = load_program(&config)?;

    let mut cpu = Cpu::new(RunOptions {
        features: opts.features.unwrap_or_default(),
        max_steps: opts.max_steps,
    });
    cpu.load(&program)?;

    if !opts.minimal {
        message(MsgColor::Green, "Running", "loaded program");
    }
    let result = cpu.run_stdout();
    if opts.registers {
        output::print_registers(cpu.state(), opts.minimal);
    }
    if let Err(err) = result {
        if !opts.minimal {
            message(MsgColor::Red, "Faulted", &format!("after {} steps", cpu.state().steps()));
        }
        return Err(err.into());
    }

    if !opts.minimal {
        message(MsgColor::Cyan, "Halted", &format!("after {} steps", cpu.state().steps()));
        file_message(MsgColor::Green, "Completed", &path);
    }
    Ok(())
}
