use crate::error::{AddressSpace, Fault};

/// Addressable memory in bytes. Code and stack share it.
pub const MEMORY_SIZE: usize = 256;
/// Number of general-purpose registers, including the stack pointer.
pub const REGISTER_COUNT: usize = 8;
/// Index of the register reserved as stack pointer.
pub const SP: u8 = 7;
/// Stack pointer value on power-up. The stack grows down from here.
pub const SP_INIT: u8 = 0xF4;

/// 256 bytes of unified program and stack memory.
#[derive(Clone, Debug)]
pub struct Memory {
    cells: [u8; MEMORY_SIZE],
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            cells: [0; MEMORY_SIZE],
        }
    }

    pub fn read(&self, address: usize) -> Result<u8, Fault> {
        self.cells
            .get(address)
            .copied()
            .ok_or(Fault::AddressOutOfRange {
                space: AddressSpace::Memory,
                address,
            })
    }

    pub fn write(&mut self, address: usize, value: u8) -> Result<(), Fault> {
        let cell = self
            .cells
            .get_mut(address)
            .ok_or(Fault::AddressOutOfRange {
                space: AddressSpace::Memory,
                address,
            })?;
        *cell = value;
        Ok(())
    }

    /// Copy `bytes` to the start of memory. Caller checks the length.
    pub(crate) fn copy_from(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= MEMORY_SIZE);
        self.cells[..bytes.len()].copy_from_slice(bytes);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

/// 8x 8-bit registers. R7 doubles as the stack pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registers {
    reg: [u8; REGISTER_COUNT],
}

impl Registers {
    pub fn new() -> Self {
        let mut reg = [0; REGISTER_COUNT];
        reg[SP as usize] = SP_INIT;
        Registers { reg }
    }

    pub fn read(&self, index: u8) -> Result<u8, Fault> {
        self.reg
            .get(index as usize)
            .copied()
            .ok_or(Fault::AddressOutOfRange {
                space: AddressSpace::Register,
                address: index as usize,
            })
    }

    pub fn write(&mut self, index: u8, value: u8) -> Result<(), Fault> {
        let reg = self
            .reg
            .get_mut(index as usize)
            .ok_or(Fault::AddressOutOfRange {
                space: AddressSpace::Register,
                address: index as usize,
            })?;
        *reg = value;
        Ok(())
    }

    #[inline]
    pub fn sp(&self) -> u8 {
        self.reg[SP as usize]
    }

    #[inline]
    pub fn set_sp(&mut self, value: u8) {
        self.reg[SP as usize] = value;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.reg
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_power_up() {
        let reg = Registers::new();
        assert_eq!(reg.as_slice(), &[0, 0, 0, 0, 0, 0, 0, 0xF4]);
        assert_eq!(reg.sp(), SP_INIT);
    }

    #[test]
    fn register_bounds() {
        let mut reg = Registers::new();
        reg.write(3, 0xAB).unwrap();
        assert_eq!(reg.read(3).unwrap(), 0xAB);

        assert!(matches!(
            reg.read(8),
            Err(Fault::AddressOutOfRange {
                space: AddressSpace::Register,
                address: 8
            })
        ));
        assert!(matches!(
            reg.write(99, 1),
            Err(Fault::AddressOutOfRange {
                space: AddressSpace::Register,
                address: 99
            })
        ));
        // Failed write must not touch anything
        assert_eq!(reg, {
            let mut expected = Registers::new();
            expected.write(3, 0xAB).unwrap();
            expected
        });
    }

    #[test]
    fn memory_bounds() {
        let mut mem = Memory::new();
        mem.write(0xFF, 7).unwrap();
        assert_eq!(mem.read(0xFF).unwrap(), 7);
        assert!(matches!(
            mem.read(MEMORY_SIZE),
            Err(Fault::AddressOutOfRange {
                space: AddressSpace::Memory,
                address: MEMORY_SIZE
            })
        ));
        assert!(mem.write(0x1234, 1).is_err());
    }

    #[test]
    fn copy_from_start() {
        let mut mem = Memory::new();
        mem.copy_from(&[1, 2, 3]);
        assert_eq!(&mem.as_slice()[..4], &[1, 2, 3, 0]);
    }
}
