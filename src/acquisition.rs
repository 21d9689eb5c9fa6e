//! Card-level exchanges built on [`ReaderDriver::transceive`]

use log::debug;

use crate::reader::ReaderDriver;
use crate::register::{PcdCommand, Register, STATUS2_CRYPTO1_ON, picc};
use crate::transport::SpiTransport;
use crate::types::{ReaderError, Uid};

/// Which cards answer a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RequestMode {
    /// REQA: only cards in the IDLE state
    #[default]
    Idle = picc::REQUEST_IDLE,
    /// WUPA: also wakes cards in the HALT state
    All = picc::REQUEST_ALL,
}

/// MIFARE Classic key slot used for authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyKind {
    A = picc::AUTH_KEY_A,
    B = picc::AUTH_KEY_B,
}

impl<T: SpiTransport> ReaderDriver<T> {
    /// ATQA is two bytes
    const ATQA_BITS: usize = 0x10;
    /// SAK plus CRC_A
    const SAK_BITS: usize = 0x18;
    const BLOCK_LEN: usize = 16;
    /// Short frame: 7 valid bits in the only byte
    const BIT_FRAMING_SHORT: u8 = 0x07;

    /// Ask idle cards in the field to answer. Returns the ATQA length in bits.
    pub fn request(&mut self) -> Result<usize, ReaderError> {
        self.request_mode(RequestMode::Idle)
    }

    /// Like [`request`](Self::request) with an explicit request command.
    ///
    /// Retried up to `max_attempts` times; anything but a 16-bit answer is a failure.
    pub fn request_mode(&mut self, mode: RequestMode) -> Result<usize, ReaderError> {
        self.with_retries("request", |reader| {
            reader.write_register(Register::BitFraming, Self::BIT_FRAMING_SHORT)?;
            let response = reader.transceive(PcdCommand::Transceive, &[mode as u8])?;
            if response.bits != Self::ATQA_BITS {
                debug!("Request answered with {} bits", response.bits);
                return Err(ReaderError::NoTagPresent);
            }
            Ok(response.bits)
        })
    }

    /// Cascade level 1 anticollision: read the UID of the card in the field.
    ///
    /// Retried up to `max_attempts` times. The UID is only returned when its
    /// check byte matches.
    pub fn anticollision(&mut self) -> Result<Uid, ReaderError> {
        self.with_retries("anticollision", |reader| {
            reader.write_register(Register::BitFraming, 0x00)?;
            let response = reader.transceive(
                PcdCommand::Transceive,
                &[picc::ANTICOLLISION_CL1, picc::NVB_ANTICOLLISION],
            )?;
            Uid::from_response(&response.data)
        })
    }

    /// Select the card with `uid`. Returns its SAK byte.
    pub fn select_tag(&mut self, uid: &Uid) -> Result<u8, ReaderError> {
        let mut frame = Vec::with_capacity(9);
        frame.push(picc::SELECT_CL1);
        frame.push(picc::NVB_SELECT);
        frame.extend_from_slice(uid.as_bytes());
        let crc = self.calculate_crc(&frame)?;
        frame.extend_from_slice(&crc);

        let response = self.transceive(PcdCommand::Transceive, &frame)?;
        if response.bits != Self::SAK_BITS {
            return Err(ReaderError::UnexpectedLength {
                expected: Self::SAK_BITS,
                actual: response.bits,
            });
        }
        Ok(response.data[0])
    }

    /// MIFARE Classic three-pass authentication for `block`.
    ///
    /// On success the chip encrypts all further traffic until
    /// [`stop_crypto`](Self::stop_crypto) or a reset.
    pub fn authenticate(
        &mut self,
        kind: KeyKind,
        block: u8,
        key: &[u8; 6],
        uid: &Uid,
    ) -> Result<(), ReaderError> {
        let mut frame = Vec::with_capacity(12);
        frame.push(kind as u8);
        frame.push(block);
        frame.extend_from_slice(key);
        frame.extend_from_slice(&uid.serial());

        self.transceive(PcdCommand::MfAuthent, &frame)?;

        if self.read_register(Register::Status2)? & STATUS2_CRYPTO1_ON == 0 {
            return Err(ReaderError::AuthenticationFailed);
        }
        self.authenticated = true;
        Ok(())
    }

    /// Leave the encrypted session opened by [`authenticate`](Self::authenticate)
    pub fn stop_crypto(&mut self) -> Result<(), ReaderError> {
        self.clear_bitmask(Register::Status2, STATUS2_CRYPTO1_ON)?;
        self.authenticated = false;
        Ok(())
    }

    /// Read one 16-byte block of an authenticated card
    pub fn read_block(&mut self, block: u8) -> Result<Vec<u8>, ReaderError> {
        let mut frame = vec![picc::READ, block];
        let crc = self.calculate_crc(&frame)?;
        frame.extend_from_slice(&crc);

        let response = self.transceive(PcdCommand::Transceive, &frame)?;
        if response.data.len() != Self::BLOCK_LEN {
            return Err(ReaderError::UnexpectedLength {
                expected: Self::BLOCK_LEN,
                actual: response.data.len(),
            });
        }
        Ok(response.data)
    }

    fn with_retries<R>(
        &mut self,
        what: &str,
        mut op: impl FnMut(&mut Self) -> Result<R, ReaderError>,
    ) -> Result<R, ReaderError> {
        let attempts = self.config().max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(self) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    debug!("{} attempt {}/{} failed: {}", what, attempt, attempts, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
