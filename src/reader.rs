use log::{debug, info};

use crate::bus::RegisterBus;
use crate::register::{
    AntennaGain, MAX_LEN, PcdCommand, Register, BIT_FRAMING_START_SEND, CONTROL_RX_LAST_BITS,
    DIV_IRQ_CRC, ERROR_MASK, FIFO_FLUSH, FIFO_LEVEL_MASK, IRQ_ERR, IRQ_IDLE, IRQ_LOW_ALERT,
    IRQ_RX, IRQ_SET, IRQ_TIMER, IRQ_TX, TX_CONTROL_ANTENNA, picc,
};
use crate::transport::SpiTransport;
use crate::types::{ReaderConfig, ReaderError};

/// Response drained from the FIFO after a command completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transceived {
    /// Bytes read back from the FIFO (at most [`MAX_LEN`])
    pub data: Vec<u8>,
    /// Number of valid bits the card sent, taking the last partial byte into account
    pub bits: usize,
}

/// MFRC522 driver.
///
/// Owns the register bus for the lifetime of the chip. All register traffic
/// for one chip goes through a single `ReaderDriver`, which is why every
/// operation takes `&mut self`.
pub struct ReaderDriver<T: SpiTransport> {
    bus: RegisterBus<T>,
    config: ReaderConfig,
    pub(crate) authenticated: bool,
}

impl<T: SpiTransport> ReaderDriver<T> {
    // Timer starts automatically, prescaler 0xD3E and reload 30: about 15ms to time out
    const TMODE: u8 = 0x8D;
    const TPRESCALER: u8 = 0x3E;
    const TRELOAD_L: u8 = 30;
    const TRELOAD_H: u8 = 0;
    /// Force 100% ASK modulation
    const TX_ASK_FORCE_100: u8 = 0x40;
    /// CRC preset 0x6363, TX waits for RF field
    const MODE_DEFAULT: u8 = 0x3D;
    /// Start send, 7 valid bits in the last byte
    const BIT_FRAMING_CARD_DETECT: u8 = 0x87;

    /// Take ownership of the transport, then reset and configure the chip.
    ///
    /// Fails if any register transfer of the initialization sequence fails.
    pub fn new(transport: T, config: ReaderConfig) -> Result<Self, ReaderError> {
        let mut driver = Self {
            bus: RegisterBus::new(transport, config.clock_hz),
            config,
            authenticated: false,
        };
        driver.configure()?;
        info!(
            "Reader configured (clock {} Hz, gain {:?})",
            driver.config.clock_hz, driver.config.antenna_gain
        );
        Ok(driver)
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Give the transport back, e.g. to reopen the bus with other settings
    pub fn into_transport(self) -> T {
        self.bus.into_transport()
    }

    pub fn read_register(&mut self, reg: Register) -> Result<u8, ReaderError> {
        self.bus.read(reg)
    }

    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<(), ReaderError> {
        self.bus.write(reg, value)
    }

    /// OR `mask` into a register
    pub fn set_bitmask(&mut self, reg: Register, mask: u8) -> Result<(), ReaderError> {
        let current = self.bus.read(reg)?;
        self.bus.write(reg, current | mask)
    }

    /// Clear the bits of `mask` in a register
    pub fn clear_bitmask(&mut self, reg: Register, mask: u8) -> Result<(), ReaderError> {
        let current = self.bus.read(reg)?;
        self.bus.write(reg, current & !mask)
    }

    /// Soft reset. Drops any card authentication.
    pub fn reset(&mut self) -> Result<(), ReaderError> {
        self.authenticated = false;
        self.bus.write(Register::Command, PcdCommand::SoftReset as u8)
    }

    /// Reset the chip and load timer, modulation and gain settings, then
    /// power the antenna.
    pub fn configure(&mut self) -> Result<(), ReaderError> {
        self.reset()?;
        self.bus.write(Register::TMode, Self::TMODE)?;
        self.bus.write(Register::TPrescaler, Self::TPRESCALER)?;
        self.bus.write(Register::TReloadL, Self::TRELOAD_L)?;
        self.bus.write(Register::TReloadH, Self::TRELOAD_H)?;
        self.bus.write(Register::TxAsk, Self::TX_ASK_FORCE_100)?;
        self.bus.write(Register::Mode, Self::MODE_DEFAULT)?;
        self.bus.write(Register::RfCfg, self.config.antenna_gain.level() << 4)?;
        self.set_antenna_on()
    }

    /// Drive TX1 and TX2. Skips the write when both are already on.
    pub fn set_antenna_on(&mut self) -> Result<(), ReaderError> {
        let current = self.bus.read(Register::TxControl)?;
        if current & TX_CONTROL_ANTENNA != TX_CONTROL_ANTENNA {
            self.bus.write(Register::TxControl, current | TX_CONTROL_ANTENNA)?;
        }
        Ok(())
    }

    pub fn set_antenna_off(&mut self) -> Result<(), ReaderError> {
        self.clear_bitmask(Register::TxControl, TX_CONTROL_ANTENNA)
    }

    /// Set the receiver gain used from the next `configure()` on
    pub fn set_antenna_gain(&mut self, gain: AntennaGain) {
        self.config.antenna_gain = gain;
    }

    /// Set the receiver gain from a numeric level (0-7)
    pub fn set_antenna_gain_level(&mut self, level: u8) -> Result<(), ReaderError> {
        let gain = AntennaGain::from_level(level).ok_or_else(|| {
            ReaderError::InvalidParameter(format!(
                "Antenna gain level {} out of range (0-7)",
                level
            ))
        })?;
        self.set_antenna_gain(gain);
        Ok(())
    }

    /// Chip version (0x91 for v1.0, 0x92 for v2.0, clones vary)
    pub fn version(&mut self) -> Result<u8, ReaderError> {
        self.bus.read(Register::Version)
    }

    /// Run a chip command that exchanges `data` with the card and wait for
    /// it to complete.
    ///
    /// For [`PcdCommand::Transceive`] the FIFO contents are returned along
    /// with the exact number of received bits. Other commands return an
    /// empty response on success.
    pub fn transceive(
        &mut self,
        command: PcdCommand,
        data: &[u8],
    ) -> Result<Transceived, ReaderError> {
        if data.len() > MAX_LEN {
            return Err(ReaderError::InvalidParameter(format!(
                "Payload of {} bytes exceeds FIFO capacity of {} bytes",
                data.len(),
                MAX_LEN
            )));
        }

        let (irq_en, irq_wait) = match command {
            PcdCommand::Transceive => (
                IRQ_TX | IRQ_RX | IRQ_IDLE | IRQ_LOW_ALERT | IRQ_ERR | IRQ_TIMER,
                IRQ_RX | IRQ_IDLE,
            ),
            PcdCommand::MfAuthent => (IRQ_IDLE | IRQ_ERR, IRQ_IDLE),
            _ => (0x00, 0x00),
        };

        self.bus.write(Register::ComIEn, irq_en | IRQ_SET)?;
        self.clear_bitmask(Register::ComIrq, IRQ_SET)?;
        self.set_bitmask(Register::FifoLevel, FIFO_FLUSH)?;
        self.bus.write(Register::Command, PcdCommand::Idle as u8)?;

        for &byte in data {
            self.bus.write(Register::FifoData, byte)?;
        }

        self.bus.write(Register::Command, command as u8)?;
        if command == PcdCommand::Transceive {
            self.set_bitmask(Register::BitFraming, BIT_FRAMING_START_SEND)?;
        }

        let budget = self.config.irq_poll_budget;
        let mut completed = None;
        for _ in 0..budget {
            let irq = self.bus.read(Register::ComIrq)?;
            if irq & (IRQ_TIMER | irq_wait) != 0 {
                completed = Some(irq);
                break;
            }
        }

        self.clear_bitmask(Register::BitFraming, BIT_FRAMING_START_SEND)?;

        let irq = completed.ok_or(ReaderError::ChipTimeout { polls: budget })?;

        let errors = self.bus.read(Register::Error)? & ERROR_MASK;
        if errors != 0 {
            return Err(ReaderError::ChipError(errors));
        }

        if irq & irq_en & IRQ_TIMER != 0 {
            return Err(ReaderError::NoTagPresent);
        }

        if command != PcdCommand::Transceive {
            return Ok(Transceived {
                data: Vec::new(),
                bits: 0,
            });
        }

        let level = (self.bus.read(Register::FifoLevel)? & FIFO_LEVEL_MASK) as usize;
        let last_bits = (self.bus.read(Register::Control)? & CONTROL_RX_LAST_BITS) as usize;
        let bits = Self::response_bits(level, last_bits);

        let count = level.clamp(1, MAX_LEN);
        let mut response = Vec::with_capacity(count);
        for _ in 0..count {
            response.push(self.bus.read(Register::FifoData)?);
        }

        debug!("Transceive {:02X?} -> {} bits, {:02X?}", data, bits, response);

        Ok(Transceived {
            data: response,
            bits,
        })
    }

    /// CRC_A of `data`, computed by the chip's coprocessor, low byte first
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2], ReaderError> {
        if data.len() > MAX_LEN {
            return Err(ReaderError::InvalidParameter(format!(
                "CRC input of {} bytes exceeds FIFO capacity of {} bytes",
                data.len(),
                MAX_LEN
            )));
        }

        self.clear_bitmask(Register::DivIrq, DIV_IRQ_CRC)?;
        self.set_bitmask(Register::FifoLevel, FIFO_FLUSH)?;

        for &byte in data {
            self.bus.write(Register::FifoData, byte)?;
        }
        self.bus.write(Register::Command, PcdCommand::CalcCrc as u8)?;

        let budget = self.config.crc_poll_budget;
        let mut done = false;
        for _ in 0..budget {
            if self.bus.read(Register::DivIrq)? & DIV_IRQ_CRC != 0 {
                done = true;
                break;
            }
        }
        if !done {
            return Err(ReaderError::ChipTimeout { polls: budget });
        }

        Ok([
            self.bus.read(Register::CrcResultL)?,
            self.bus.read(Register::CrcResultM)?,
        ])
    }

    /// Enable only the receive interrupt and send a request so that a card
    /// entering the field pulls the IRQ line low.
    pub fn arm_card_detect(&mut self) -> Result<(), ReaderError> {
        self.bus.write(Register::ComIrq, 0x00)?;
        self.bus.write(Register::ComIEn, IRQ_SET | IRQ_RX)?;
        self.bus.write(Register::FifoData, picc::REQUEST_IDLE)?;
        self.bus.write(Register::Command, PcdCommand::Transceive as u8)?;
        self.bus.write(Register::BitFraming, Self::BIT_FRAMING_CARD_DETECT)
    }

    pub(crate) fn response_bits(fifo_level: usize, last_bits: usize) -> usize {
        if last_bits != 0 {
            fifo_level.saturating_sub(1) * 8 + last_bits
        } else {
            fifo_level * 8
        }
    }
}
