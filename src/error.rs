use std::{error::Error, fmt, io, path::PathBuf};

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// The two address spaces an operand can refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressSpace {
    Register,
    Memory,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register => write!(f, "register"),
            Self::Memory => write!(f, "memory address"),
        }
    }
}

/// Something went wrong while executing a single instruction.
#[derive(Debug, Error, Diagnostic)]
pub enum Fault {
    #[error("{space} {address} is out of range")]
    #[diagnostic(
        code(runtime::address),
        help("registers are numbered 0 to 7 and memory spans 0x00 to 0xff")
    )]
    AddressOutOfRange { space: AddressSpace, address: usize },

    #[error("unsupported ALU operation `{op}`")]
    #[diagnostic(
        code(runtime::alu),
        help("the ALU supports ADD, SUB, MUL, AND, OR and XOR")
    )]
    UnsupportedAluOp { op: String },

    #[error("illegal instruction {opcode:#010b}")]
    #[diagnostic(
        code(runtime::illegal),
        help("check that the program does not run into data or past its last instruction")
    )]
    IllegalInstruction { opcode: u8 },

    #[error("stack overflow: cannot push at sp {sp:#04x}, outside the stack region")]
    #[diagnostic(
        code(runtime::stack_overflow),
        help("with `stack-guard` the stack spans from the end of the program up to 0xf4")
    )]
    StackOverflow { sp: u8 },

    #[error("stack underflow: nothing to pop at sp {sp:#04x}")]
    #[diagnostic(code(runtime::stack_underflow))]
    StackUnderflow { sp: u8 },

    #[error("step limit of {limit} instructions exceeded")]
    #[diagnostic(
        code(runtime::step_limit),
        help("the program may be stuck in a loop, or needs a larger `--max-steps`")
    )]
    StepLimitExceeded { limit: u64 },

    #[error("failed to write program output")]
    #[diagnostic(code(runtime::output))]
    Output(#[from] io::Error),
}

/// A [`Fault`] together with where in the program it happened.
#[derive(Debug, Diagnostic)]
#[diagnostic(code(runtime::halted))]
pub struct RuntimeError {
    pub pc: usize,
    /// `None` if the opcode itself could not be fetched.
    pub opcode: Option<u8>,
    #[diagnostic_source]
    pub fault: Fault,
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.fault)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Execution halted at pc {:#04x}", self.pc)?;
        if let Some(opcode) = self.opcode {
            write!(f, " (opcode {:#010b})", opcode)?;
        }
        Ok(())
    }
}

/// Failure to produce or place a program in memory.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("Missing filename argument")]
    #[diagnostic(code(load::missing_argument), help("usage: ls8 <filename>"))]
    MissingArgument,

    #[error("File not found: {}", .path.display())]
    #[diagnostic(
        code(load::not_found),
        help("paths are resolved relative to the program directory, see `--dir`")
    )]
    NotFound { path: PathBuf },

    #[error("Failed to read {}", .path.display())]
    #[diagnostic(code(load::io))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Line {line} is not a binary byte: `{text}`")]
    #[diagnostic(
        code(load::malformed),
        help("each instruction line holds up to 8 binary digits, optionally followed by a # comment")
    )]
    Malformed {
        line: usize,
        text: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("expected binary digits")]
        span: SourceSpan,
    },

    #[error("Program is {len} bytes long and cannot fit in memory")]
    #[diagnostic(code(load::too_large), help("memory holds at most 256 bytes"))]
    ProgramTooLarge { len: usize },
}
