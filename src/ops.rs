use std::fmt;

use crate::error::Fault;

/// Every instruction the machine can execute.
///
/// Opcode layout is `AABC_DDDD`: `AA` is the operand count, `B` marks an ALU operation,
/// `C` is reserved and `DDDD` identifies the instruction.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Stop the machine
    HLT = 0b0000_0001,
    /// Load an immediate value into a register
    LDI = 0b1000_0010,
    /// Print the decimal value of a register
    PRN = 0b0100_0111,
    /// Add the second register to the first
    ADD = 0b1010_0000,
    /// Multiply the first register by the second
    MUL = 0b1010_0010,
    /// Push a register onto the stack
    PUSH = 0b0100_0101,
    /// Pop the top of the stack into a register
    POP = 0b0100_0110,
}

/// Register-number operand or literal value, for display purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg,
    Imm,
}

impl Opcode {
    pub const ALL: [Opcode; 7] = [
        Self::HLT,
        Self::LDI,
        Self::PRN,
        Self::ADD,
        Self::MUL,
        Self::PUSH,
        Self::POP,
    ];

    /// Total instruction size in bytes, opcode included.
    #[inline]
    pub const fn width(self) -> usize {
        width(self as u8)
    }

    pub const fn is_alu(self) -> bool {
        self as u8 & 0b0010_0000 != 0
    }

    pub fn operands(self) -> &'static [Operand] {
        use Operand::*;
        match self {
            Self::HLT => &[],
            Self::LDI => &[Reg, Imm],
            Self::PRN | Self::PUSH | Self::POP => &[Reg],
            Self::ADD | Self::MUL => &[Reg, Reg],
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::HLT => "HLT",
            Self::LDI => "LDI",
            Self::PRN => "PRN",
            Self::ADD => "ADD",
            Self::MUL => "MUL",
            Self::PUSH => "PUSH",
            Self::POP => "POP",
        }
    }
}

/// Instruction width implied by the operand count in the top two bits of `opcode`.
#[inline]
pub const fn width(opcode: u8) -> usize {
    (opcode >> 6) as usize + 1
}

impl TryFrom<u8> for Opcode {
    type Error = Fault;
    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|op| *op as u8 == opcode)
            .ok_or(Fault::IllegalInstruction { opcode })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        #[rustfmt::skip]
        let cases = [
            (Opcode::HLT,  1),
            (Opcode::LDI,  3),
            (Opcode::PRN,  2),
            (Opcode::ADD,  3),
            (Opcode::MUL,  3),
            (Opcode::PUSH, 2),
            (Opcode::POP,  2),
        ];
        for (op, expected) in cases {
            assert_eq!(op.width(), expected, "width of {op}");
            assert_eq!(op.operands().len() + 1, expected, "operands of {op}");
        }
    }

    #[test]
    fn decode() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(op as u8).unwrap(), op);
        }
        assert!(matches!(
            Opcode::try_from(0b1111_1111),
            Err(Fault::IllegalInstruction {
                opcode: 0b1111_1111
            })
        ));
        assert!(Opcode::try_from(0).is_err());
    }

    #[test]
    fn alu_class() {
        assert!(Opcode::ADD.is_alu());
        assert!(Opcode::MUL.is_alu());
        assert!(!Opcode::LDI.is_alu());
        assert!(!Opcode::PUSH.is_alu());
    }
}
