use std::fmt;

use crate::ops::{Opcode, Operand};

/// A single decoded statement of a program listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsmLine {
    pub address: usize,
    pub bytes: Vec<u8>,
    /// `None` for bytes that do not start a known instruction.
    pub op: Option<Opcode>,
}

/// Decode `program` into a listing, starting at address 0.
///
/// Unknown bytes, and instructions cut short by the end of the program, are listed one byte at
/// a time as raw data.
pub fn disassemble(program: &[u8]) -> Vec<AsmLine> {
    let mut lines = Vec::new();
    let mut address = 0;
    while address < program.len() {
        let op = Opcode::try_from(program[address])
            .ok()
            .filter(|op| address + op.width() <= program.len());
        let width = op.map_or(1, Opcode::width);
        lines.push(AsmLine {
            address,
            bytes: program[address..address + width].to_vec(),
            op,
        });
        address += width;
    }
    lines
}

impl fmt::Display for AsmLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:", self.address)?;
        for i in 0..3 {
            match self.bytes.get(i) {
                Some(byte) => write!(f, " {:08b}", byte)?,
                None => write!(f, "         ")?,
            }
        }
        let Some(op) = self.op else {
            return match self.bytes.first() {
                Some(byte) => write!(f, "  .byte {:#04x}", byte),
                None => Ok(()),
            };
        };
        write!(f, "  {}", op)?;
        let operands = self.bytes.get(1..).unwrap_or_default();
        for (i, (kind, value)) in op.operands().iter().zip(operands).enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            match kind {
                Operand::Reg => write!(f, "{}R{}", sep, value)?,
                Operand::Imm => write!(f, "{}{}", sep, value)?,
            }
        }
        Ok(())
    }
}
