use std::fmt;
use std::io::{self, Write};

use tracing::{debug, warn};

use crate::alu::AluOp;
use crate::error::{Fault, LoadError, RuntimeError};
use crate::features::Features;
use crate::ops::Opcode;
use crate::output;
use crate::state::{Memory, Registers, MEMORY_SIZE, SP_INIT};

/// Instruction handler. Each handler fetches its own operands and advances the PC.
type Handler = fn(&mut RunState, &mut dyn Write) -> Result<(), Fault>;

/// Opcode byte -> handler. Unlisted opcodes are illegal.
const OP_TABLE: [Option<Handler>; 256] = {
    let mut table: [Option<Handler>; 256] = [None; 256];
    let mut i = 0;
    while i < Opcode::ALL.len() {
        let op = Opcode::ALL[i];
        table[op as usize] = Some(RunState::handler(op));
        i += 1;
    }
    table
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Stopped,
    Running,
}

/// Settings fixed for the lifetime of a [`Cpu`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    pub features: Features,
    /// Fail with [`Fault::StepLimitExceeded`] after this many instructions.
    pub max_steps: Option<u64>,
}

/// Complete machine state, as seen by instruction handlers.
#[derive(Clone, Debug)]
pub struct RunState {
    mem: Memory,
    reg: Registers,
    /// Program counter
    pc: usize,
    status: Status,
    /// Length of the loaded program, the lower bound of a guarded stack.
    program_len: usize,
    stack_guard: bool,
    /// Instructions executed so far
    steps: u64,
}

impl RunState {
    fn new(features: Features) -> Self {
        RunState {
            mem: Memory::new(),
            reg: Registers::new(),
            pc: 0,
            status: Status::Stopped,
            program_len: 0,
            stack_guard: features.stack_guard(),
            steps: 0,
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn registers(&self) -> &Registers {
        &self.reg
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    const fn handler(op: Opcode) -> Handler {
        match op {
            Opcode::HLT => Self::hlt,
            Opcode::LDI => Self::ldi,
            Opcode::PRN => Self::prn,
            Opcode::ADD | Opcode::MUL => Self::alu,
            Opcode::PUSH => Self::push,
            Opcode::POP => Self::pop,
        }
    }

    /// Byte `n` places after the current opcode.
    #[inline]
    fn operand(&self, n: usize) -> Result<u8, Fault> {
        self.mem.read(self.pc + n)
    }

    fn hlt(&mut self, _out: &mut dyn Write) -> Result<(), Fault> {
        self.status = Status::Stopped;
        self.pc += Opcode::HLT.width();
        Ok(())
    }

    fn ldi(&mut self, _out: &mut dyn Write) -> Result<(), Fault> {
        let reg = self.operand(1)?;
        let value = self.operand(2)?;
        self.reg.write(reg, value)?;
        self.pc += Opcode::LDI.width();
        Ok(())
    }

    fn prn(&mut self, out: &mut dyn Write) -> Result<(), Fault> {
        let reg = self.operand(1)?;
        let value = self.reg.read(reg)?;
        writeln!(out, "{}", value)?;
        self.pc += Opcode::PRN.width();
        Ok(())
    }

    /// Shared by all ALU-class opcodes; the operation lives in the opcode's low nibble.
    fn alu(&mut self, _out: &mut dyn Write) -> Result<(), Fault> {
        let opcode = self.mem.read(self.pc)?;
        debug_assert!(Opcode::try_from(opcode).is_ok_and(Opcode::is_alu));
        let op = AluOp::from_opcode(opcode)?;
        let dest = self.operand(1)?;
        let src = self.operand(2)?;
        op.apply(&mut self.reg, dest, src)?;
        self.pc += crate::ops::width(opcode);
        Ok(())
    }

    fn push(&mut self, _out: &mut dyn Write) -> Result<(), Fault> {
        let reg = self.operand(1)?;
        let value = self.reg.read(reg)?;
        let sp = self.reg.sp();
        // Guarded stack lives in [program_len, SP_INIT)
        if self.stack_guard && (sp as usize <= self.program_len || sp > SP_INIT) {
            return Err(Fault::StackOverflow { sp });
        }
        let sp = sp.wrapping_sub(1);
        self.reg.set_sp(sp);
        self.mem.write(sp as usize, value)?;
        self.pc += Opcode::PUSH.width();
        Ok(())
    }

    fn pop(&mut self, _out: &mut dyn Write) -> Result<(), Fault> {
        let reg = self.operand(1)?;
        let sp = self.reg.sp();
        if self.stack_guard && sp >= SP_INIT {
            return Err(Fault::StackUnderflow { sp });
        }
        let value = self.mem.read(sp as usize)?;
        self.reg.write(reg, value)?;
        // Re-read: popping into R7 overwrites the stack pointer itself
        self.reg.set_sp(self.reg.sp().wrapping_add(1));
        self.pc += Opcode::POP.width();
        Ok(())
    }
}

/// The execution engine. Owns all machine state for one program run.
pub struct Cpu {
    state: RunState,
    table: [Option<Handler>; 256],
    options: RunOptions,
}

impl Cpu {
    pub fn new(options: RunOptions) -> Self {
        Cpu {
            state: RunState::new(options.features),
            table: OP_TABLE,
            options,
        }
    }

    /// Place `program` at the start of memory. PC and registers are left alone.
    pub fn load(&mut self, program: &[u8]) -> Result<(), LoadError> {
        if program.len() > MEMORY_SIZE {
            return Err(LoadError::ProgramTooLarge {
                len: program.len(),
            });
        }
        self.state.mem.copy_from(program);
        self.state.program_len = program.len();
        debug!(bytes = program.len(), "program loaded");
        Ok(())
    }

    /// Fetch, decode and execute until `HLT` or a fault. `PRN` output goes to `out`.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<(), RuntimeError> {
        let out: &mut dyn Write = out;
        let trace = self.options.features.trace();
        self.state.status = Status::Running;

        while self.state.is_running() {
            let pc = self.state.pc;
            if let Some(limit) = self.options.max_steps {
                if self.state.steps >= limit {
                    return Err(self.fail(pc, None, Fault::StepLimitExceeded { limit }));
                }
            }
            let opcode = match self.state.mem.read(pc) {
                Ok(opcode) => opcode,
                Err(fault) => return Err(self.fail(pc, None, fault)),
            };
            if trace {
                eprintln!("{}", output::trace_line(&self.state));
            }
            let Some(handler) = self.table[opcode as usize] else {
                return Err(self.fail(pc, Some(opcode), Fault::IllegalInstruction { opcode }));
            };
            if let Err(fault) = handler(&mut self.state, out) {
                return Err(self.fail(pc, Some(opcode), fault));
            }
            self.state.steps += 1;
        }

        if let Err(err) = out.flush() {
            let pc = self.state.pc;
            return Err(self.fail(pc, None, Fault::Output(err)));
        }
        debug!(pc = self.state.pc, steps = self.state.steps, "halted");
        Ok(())
    }

    fn fail(&mut self, pc: usize, opcode: Option<u8>, fault: Fault) -> RuntimeError {
        self.state.status = Status::Stopped;
        warn!(pc, ?opcode, %fault, "execution fault");
        RuntimeError { pc, opcode, fault }
    }

    /// Run with `PRN` output going to stdout.
    pub fn run_stdout(&mut self) -> Result<(), RuntimeError> {
        self.run(&mut io::stdout().lock())
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn registers(&self) -> &Registers {
        &self.state.reg
    }

    pub fn memory(&self) -> &Memory {
        &self.state.mem
    }

    pub fn pc(&self) -> usize {
        self.state.pc
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(RunOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AddressSpace;
    use crate::state::SP;

    const HLT: u8 = Opcode::HLT as u8;
    const LDI: u8 = Opcode::LDI as u8;
    const PRN: u8 = Opcode::PRN as u8;
    const ADD: u8 = Opcode::ADD as u8;
    const MUL: u8 = Opcode::MUL as u8;
    const PUSH: u8 = Opcode::PUSH as u8;
    const POP: u8 = Opcode::POP as u8;

    fn run_with(options: RunOptions, program: &[u8]) -> (Cpu, Vec<u8>, Result<(), RuntimeError>) {
        let mut cpu = Cpu::new(options);
        cpu.load(program).unwrap();
        let mut out = Vec::new();
        let result = cpu.run(&mut out);
        (cpu, out, result)
    }

    fn run(program: &[u8]) -> (Cpu, String) {
        let (cpu, out, result) = run_with(RunOptions::default(), program);
        result.unwrap();
        (cpu, String::from_utf8(out).unwrap())
    }

    fn run_err(program: &[u8]) -> (Cpu, RuntimeError) {
        let (cpu, _, result) = run_with(RunOptions::default(), program);
        (cpu, result.unwrap_err())
    }

    fn guarded() -> RunOptions {
        RunOptions {
            features: Features::default().with_stack_guard(true),
            ..Default::default()
        }
    }

    #[test]
    fn table_covers_exactly_the_instruction_set() {
        for byte in 0..=u8::MAX {
            assert_eq!(
                OP_TABLE[byte as usize].is_some(),
                Opcode::try_from(byte).is_ok(),
                "opcode {byte:#010b}"
            );
        }
    }

    #[test]
    fn halt_only() {
        let (cpu, out) = run(&[HLT]);
        assert!(out.is_empty());
        assert_eq!(cpu.registers(), &Registers::new());
        assert!(!cpu.is_running());
        assert_eq!(cpu.state().status(), Status::Stopped);
        assert_eq!(cpu.pc(), 1);
        assert_eq!(cpu.state().steps(), 1);
    }

    #[test]
    fn pc_advances_by_width() {
        #[rustfmt::skip]
        let cases: &[(&[u8], usize)] = &[
            (&[HLT],             1),
            (&[LDI, 0, 9, HLT],  3),
            (&[PRN, 0, HLT],     2),
            (&[ADD, 0, 1, HLT],  3),
            (&[MUL, 0, 1, HLT],  3),
            (&[PUSH, 0, HLT],    2),
            (&[POP, 0, HLT],     2),
        ];
        for (program, width) in cases {
            let mut cpu = Cpu::default();
            cpu.load(program).unwrap();
            cpu.state.status = Status::Running;
            let handler = cpu.table[program[0] as usize].unwrap();
            handler(&mut cpu.state, &mut io::sink()).unwrap();
            assert_eq!(cpu.pc(), *width, "opcode {:#010b}", program[0]);
        }
    }

    #[test]
    fn ldi_twice() {
        let (cpu, _) = run(&[LDI, 0, 5, LDI, 0, 5, HLT]);
        assert_eq!(cpu.registers().read(0).unwrap(), 5);
    }

    #[test]
    fn add_wraps() {
        let (cpu, _) = run(&[LDI, 0, 200, LDI, 1, 100, ADD, 0, 1, HLT]);
        assert_eq!(cpu.registers().read(0).unwrap(), 44);
        assert_eq!(cpu.registers().read(1).unwrap(), 100);
    }

    #[test]
    fn mul() {
        let (cpu, _) = run(&[LDI, 0, 10, LDI, 1, 20, MUL, 0, 1, HLT]);
        assert_eq!(cpu.registers().read(0).unwrap(), 200);
    }

    #[test]
    fn prn_emits_one_line() {
        let (_, out) = run(&[LDI, 0, 42, PRN, 0, HLT]);
        assert_eq!(out, "42\n");

        let (_, out) = run(&[LDI, 3, 255, PRN, 3, PRN, 3, HLT]);
        assert_eq!(out, "255\n255\n");
    }

    #[test]
    fn push_pop_round_trip() {
        for reg in 0..SP {
            for value in [0, 1, 0x7F, 0xF4, 0xFF] {
                let (cpu, _) = run(&[LDI, reg, value, PUSH, reg, LDI, reg, 0, POP, reg, HLT]);
                assert_eq!(cpu.registers().read(reg).unwrap(), value, "R{reg}");
                assert_eq!(cpu.registers().sp(), SP_INIT);
                assert_eq!(cpu.memory().read(SP_INIT as usize - 1).unwrap(), value);
            }
        }
    }

    #[test]
    fn stack_order() {
        let program = [
            LDI, 0, 1, LDI, 1, 2, PUSH, 0, PUSH, 1, LDI, 0, 3, POP, 0, PRN, 0, // 2
            LDI, 0, 4, PUSH, 0, POP, 2, POP, 1, PRN, 2, PRN, 1, HLT, // 4, 1
        ];
        let (cpu, out) = run(&program);
        assert_eq!(out, "2\n4\n1\n");
        assert_eq!(cpu.registers().sp(), SP_INIT);
    }

    #[test]
    fn pop_into_stack_pointer() {
        // R7 <- mem[0xF3], then incremented as the stack pointer
        let (cpu, _) = run(&[LDI, 0, 0x10, PUSH, 0, POP, SP, HLT]);
        assert_eq!(cpu.registers().sp(), 0x11);
    }

    #[test]
    fn illegal_instruction() {
        let (cpu, err) = run_err(&[LDI, 0, 1, 0b1111_1111, HLT]);
        assert!(matches!(
            err.fault,
            Fault::IllegalInstruction {
                opcode: 0b1111_1111
            }
        ));
        assert_eq!(err.pc, 3);
        assert_eq!(err.opcode, Some(0b1111_1111));
        assert!(!cpu.is_running());
        // Preceding instructions still took effect
        assert_eq!(cpu.registers().read(0).unwrap(), 1);
    }

    #[test]
    fn push_bad_register() {
        let (cpu, err) = run_err(&[PUSH, 99, HLT]);
        assert!(matches!(
            err.fault,
            Fault::AddressOutOfRange {
                space: AddressSpace::Register,
                address: 99
            }
        ));
        assert_eq!(cpu.registers().sp(), SP_INIT);
        assert!(!cpu.is_running());
    }

    #[test]
    fn register_operand_out_of_range() {
        for program in [
            &[LDI, 8, 1, HLT][..],
            &[PRN, 8, HLT],
            &[ADD, 0, 8, HLT],
            &[MUL, 200, 0, HLT],
            &[POP, 8, HLT],
        ] {
            let (_, err) = run_err(program);
            assert!(
                matches!(
                    err.fault,
                    Fault::AddressOutOfRange {
                        space: AddressSpace::Register,
                        ..
                    }
                ),
                "{program:?}: {:?}",
                err.fault
            );
        }
    }

    #[test]
    fn run_off_end_of_memory() {
        // LDI in the last cell has its operands past the end
        let mut cpu = Cpu::default();
        cpu.state.pc = MEMORY_SIZE - 1;
        cpu.state.mem.write(MEMORY_SIZE - 1, LDI).unwrap();
        let err = cpu.run(&mut io::sink()).unwrap_err();
        assert!(matches!(
            err.fault,
            Fault::AddressOutOfRange {
                space: AddressSpace::Memory,
                address: MEMORY_SIZE
            }
        ));
        assert_eq!(err.opcode, Some(LDI));
    }

    #[test]
    fn empty_memory_is_illegal() {
        let (_, err) = run_err(&[]);
        assert!(matches!(err.fault, Fault::IllegalInstruction { opcode: 0 }));
        assert_eq!(err.pc, 0);
    }

    #[test]
    fn unguarded_stack_may_overwrite_program() {
        // The push clobbers the HLT at address 5 with R0
        let (_, _, result) = run_with(RunOptions::default(), &[LDI, SP, 6, PUSH, 0, HLT]);
        let err = result.unwrap_err();
        assert!(matches!(err.fault, Fault::IllegalInstruction { opcode: 0 }));
    }

    #[test]
    fn guarded_stack_overflow() {
        let (cpu, _, result) = run_with(guarded(), &[LDI, SP, 6, PUSH, 0, HLT]);
        let err = result.unwrap_err();
        assert!(matches!(err.fault, Fault::StackOverflow { sp: 6 }));
        assert_eq!(err.pc, 3);
        assert_eq!(cpu.registers().sp(), 6);
    }

    #[test]
    fn guarded_stack_underflow() {
        let (_, _, result) = run_with(guarded(), &[POP, 0, HLT]);
        assert!(matches!(
            result.unwrap_err().fault,
            Fault::StackUnderflow { sp: SP_INIT }
        ));

        let (cpu, _, result) = run_with(guarded(), &[PUSH, 0, POP, 1, HLT]);
        result.unwrap();
        assert_eq!(cpu.registers().sp(), SP_INIT);
    }

    #[test]
    fn guarded_stack_sp_above_init() {
        let (cpu, _, result) = run_with(
            guarded(),
            &[LDI, SP, 0xFF, LDI, 0, 9, PUSH, 0, POP, 1, HLT],
        );
        let err = result.unwrap_err();
        assert!(matches!(err.fault, Fault::StackOverflow { sp: 0xFF }));
        assert_eq!(err.pc, 6);
        assert_eq!(cpu.registers().sp(), 0xFF);
        assert_eq!(cpu.memory().read(0xFE).unwrap(), 0);

        // Every push the guard accepts can be popped again
        let (cpu, _, result) = run_with(
            guarded(),
            &[LDI, SP, SP_INIT, LDI, 0, 9, PUSH, 0, POP, 1, HLT],
        );
        result.unwrap();
        assert_eq!(cpu.registers().read(1).unwrap(), 9);
        assert_eq!(cpu.registers().sp(), SP_INIT);
    }

    #[test]
    fn step_limit() {
        let options = RunOptions {
            max_steps: Some(2),
            ..Default::default()
        };
        let (cpu, _, result) = run_with(options, &[LDI, 0, 1, LDI, 0, 2, LDI, 0, 3, HLT]);
        let err = result.unwrap_err();
        assert!(matches!(err.fault, Fault::StepLimitExceeded { limit: 2 }));
        assert_eq!(err.pc, 6);
        assert_eq!(cpu.registers().read(0).unwrap(), 2);
        assert!(!cpu.is_running());

        let options = RunOptions {
            max_steps: Some(2),
            ..Default::default()
        };
        let (_, _, result) = run_with(options, &[LDI, 0, 1, HLT]);
        result.unwrap();
    }

    #[test]
    fn load_does_not_reset() {
        let mut cpu = Cpu::default();
        cpu.load(&[LDI, 0, 7, HLT]).unwrap();
        cpu.run(&mut io::sink()).unwrap();
        assert_eq!(cpu.pc(), 4);

        cpu.load(&[HLT, HLT, HLT, HLT, LDI, 1, 9, HLT]).unwrap();
        cpu.run(&mut io::sink()).unwrap();
        assert_eq!(cpu.registers().read(0).unwrap(), 7);
        assert_eq!(cpu.registers().read(1).unwrap(), 9);
    }

    #[test]
    fn load_too_large() {
        let mut cpu = Cpu::default();
        let err = cpu.load(&[HLT; MEMORY_SIZE + 1]).unwrap_err();
        assert!(matches!(err, LoadError::ProgramTooLarge { len: 257 }));
        assert_eq!(cpu.memory().read(0).unwrap(), 0);
        assert!(!cpu.is_running());

        cpu.load(&[HLT; MEMORY_SIZE]).unwrap();
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn output_failure() {
        let mut cpu = Cpu::default();
        cpu.load(&[LDI, 0, 1, PRN, 0, HLT]).unwrap();
        let err = cpu.run(&mut BrokenPipe).unwrap_err();
        assert!(matches!(err.fault, Fault::Output(_)));
        assert_eq!(err.pc, 3);
        assert!(!cpu.is_running());
    }

    #[test]
    fn error_message() {
        let (_, err) = run_err(&[0b1111_1111]);
        assert_eq!(
            err.to_string(),
            "Execution halted at pc 0x00 (opcode 0b11111111)"
        );
        assert_eq!(err.fault.to_string(), "illegal instruction 0b11111111");
    }
}
