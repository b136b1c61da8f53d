use std::{fmt, str::FromStr};

use crate::error::Fault;
use crate::state::Registers;

/// Operations understood by the ALU.
///
/// Discriminants match the low nibble of the ALU-class opcodes, eg. `MUL` is `0b1010_0010`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add = 0x0,
    Sub = 0x1,
    Mul = 0x2,
    And = 0x8,
    Or = 0xA,
    Xor = 0xB,
}

impl AluOp {
    /// Decode the operation encoded in an ALU-class opcode.
    pub fn from_opcode(opcode: u8) -> Result<Self, Fault> {
        let op = match opcode & 0x0F {
            0x0 => Self::Add,
            0x1 => Self::Sub,
            0x2 => Self::Mul,
            0x8 => Self::And,
            0xA => Self::Or,
            0xB => Self::Xor,
            code => {
                return Err(Fault::UnsupportedAluOp {
                    op: format!("{code:#x}"),
                })
            }
        };
        Ok(op)
    }

    /// Combine two register values. Results are always truncated to 8 bits.
    pub fn eval(self, a: u8, b: u8) -> u8 {
        match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Mul => a.wrapping_mul(b),
            Self::And => a & b,
            Self::Or => a | b,
            Self::Xor => a ^ b,
        }
    }

    /// `dest <- dest (op) src`. `src` is left untouched.
    pub fn apply(self, reg: &mut Registers, dest: u8, src: u8) -> Result<(), Fault> {
        let a = reg.read(dest)?;
        let b = reg.read(src)?;
        reg.write(dest, self.eval(a, b))
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
        }
    }
}

impl FromStr for AluOp {
    type Err = Fault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Add,
            Self::Sub,
            Self::Mul,
            Self::And,
            Self::Or,
            Self::Xor,
        ]
        .into_iter()
        .find(|op| op.mnemonic().eq_ignore_ascii_case(s))
        .ok_or_else(|| Fault::UnsupportedAluOp { op: s.to_string() })
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
