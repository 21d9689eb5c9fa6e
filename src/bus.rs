use crate::register::Register;
use crate::transport::SpiTransport;
use crate::types::ReaderError;

/// Register-level access to the chip over a [`SpiTransport`].
///
/// Address byte layout: bit 7 selects read (1) or write (0), bits 6..1 hold
/// the register address and bit 0 is always 0.
pub struct RegisterBus<T: SpiTransport> {
    transport: T,
    clock_hz: u32,
}

impl<T: SpiTransport> RegisterBus<T> {
    const READ: u8 = 0x80;
    const ADDRESS_MASK: u8 = 0x7E;

    pub fn new(transport: T, clock_hz: u32) -> Self {
        Self { transport, clock_hz }
    }

    pub fn write(&mut self, reg: Register, value: u8) -> Result<(), ReaderError> {
        self.transport
            .send(&[Self::write_address(reg), value], self.clock_hz)
            .map_err(ReaderError::transport)
    }

    pub fn read(&mut self, reg: Register) -> Result<u8, ReaderError> {
        let response = self
            .transport
            .transfer(&[Self::read_address(reg), 0x00], self.clock_hz)
            .map_err(ReaderError::transport)?;

        response.get(1).copied().ok_or_else(|| {
            ReaderError::Transport(format!(
                "short register read from {:?}: {:02X?}",
                reg, response
            ))
        })
    }

    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn write_address(reg: Register) -> u8 {
        (reg.addr() << 1) & Self::ADDRESS_MASK
    }

    pub(crate) fn read_address(reg: Register) -> u8 {
        Self::write_address(reg) | Self::READ
    }
}
