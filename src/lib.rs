// Machine
mod alu;
pub use alu::AluOp;
mod ops;
pub use ops::{Opcode, Operand};
mod state;
pub use state::{Memory, Registers, MEMORY_SIZE, REGISTER_COUNT, SP, SP_INIT};

// Running
mod runtime;
pub use runtime::{Cpu, RunOptions, RunState, Status};
mod features;
pub use features::Features;
pub mod output;

// Loading
mod loader;
pub use loader::{load_program, parse_program, LoadConfig};
pub mod disasm;

mod error;
pub use error::{AddressSpace, Fault, LoadError, RuntimeError};

/// Amount of lines to show as context, each side of a malformed program line.
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 2;
