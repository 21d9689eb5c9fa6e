//! Types for card reader operations

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::register::AntennaGain;

/// Card identifier returned by anticollision: four serial bytes followed by
/// their XOR check byte.
///
/// A `Uid` can only be built from bytes whose check byte matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid {
    bytes: [u8; 5],
}

impl Uid {
    /// Validate a raw anticollision response
    pub fn from_response(response: &[u8]) -> Result<Self, ReaderError> {
        let bytes: [u8; 5] = response
            .try_into()
            .map_err(|_| ReaderError::UnexpectedLength {
                expected: 5,
                actual: response.len(),
            })?;

        let expected = Self::check_byte_of(&bytes[..4]);
        if expected != bytes[4] {
            return Err(ReaderError::ChecksumMismatch {
                expected,
                actual: bytes[4],
            });
        }

        Ok(Self { bytes })
    }

    /// All five bytes, check byte included
    pub fn as_bytes(&self) -> &[u8; 5] {
        &self.bytes
    }

    /// The four serial number bytes
    pub fn serial(&self) -> [u8; 4] {
        [self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]
    }

    pub fn check_byte(&self) -> u8 {
        self.bytes[4]
    }

    /// Serial number as a big-endian integer
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.serial())
    }

    /// Decimal bytes joined by dashes, e.g. `170-187-204-221-0`
    pub fn to_tag_string(&self) -> String {
        self.bytes
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    fn check_byte_of(serial: &[u8]) -> u8 {
        serial.iter().fold(0, |acc, &b| acc ^ b)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bytes_to_hex(&self.bytes))
    }
}

/// Result of one completed detection cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Success(Uid),
    Failure(ReaderError),
}

impl ScanOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Success(_))
    }

    pub fn uid(&self) -> Option<&Uid> {
        match self {
            ScanOutcome::Success(uid) => Some(uid),
            ScanOutcome::Failure(_) => None,
        }
    }
}

impl From<Result<Uid, ReaderError>> for ScanOutcome {
    fn from(result: Result<Uid, ReaderError>) -> Self {
        match result {
            Ok(uid) => ScanOutcome::Success(uid),
            Err(e) => ScanOutcome::Failure(e),
        }
    }
}

/// Errors that can occur while talking to the reader or a card
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    /// Bus transport error (SPI, test fake, ...). Never retried.
    #[error("bus transport failure: {0}")]
    Transport(String),
    /// The chip did not signal completion within the poll budget
    #[error("chip did not finish within {polls} status polls")]
    ChipTimeout { polls: u32 },
    /// The chip's error register reported protocol, parity, collision or overflow flags
    #[error("chip reported error flags 0x{0:02X}")]
    ChipError(u8),
    /// No card answered before the chip's timer expired, or the answer was malformed
    #[error("no tag present")]
    NoTagPresent,
    /// Anticollision check byte did not match the XOR of the serial bytes
    #[error("UID check byte mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
    /// The card answered with an unexpected number of bytes or bits
    #[error("unexpected response length: expected {expected}, got {actual}")]
    UnexpectedLength { expected: usize, actual: usize },
    #[error("card authentication failed")]
    AuthenticationFailed,
    /// Invalid parameter passed to a function
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The scan worker thread could not be started or died
    #[error("scan worker: {0}")]
    Worker(String),
}

impl ReaderError {
    /// Whether a fresh attempt at the same exchange could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ReaderError::Transport(_) | ReaderError::InvalidParameter(_) | ReaderError::Worker(_)
        )
    }

    pub(crate) fn transport<E: fmt::Debug>(e: E) -> Self {
        ReaderError::Transport(format!("{:?}", e))
    }
}

/// Chip driver settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Bus clock used for every register transfer
    pub clock_hz: u32,
    /// Receiver gain applied on every `configure()`
    pub antenna_gain: AntennaGain,
    /// Maximum ComIrq reads while waiting for a command to complete
    pub irq_poll_budget: u32,
    /// Maximum DivIrq reads while waiting for the CRC coprocessor
    pub crc_poll_budget: u32,
    /// Attempts made by `request()` and `anticollision()` before giving up
    pub max_attempts: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            clock_hz: 1_000_000,
            antenna_gain: AntennaGain::default(),
            irq_poll_budget: 2000,
            crc_poll_budget: 255,
            max_attempts: 5,
        }
    }
}

/// Scan loop timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// How often the card-detect transmission is re-triggered and the stop flag checked
    pub poll_interval: Duration,
    /// Pause after a successful read so a card left on the reader is not reported again
    pub success_cooldown: Duration,
    /// Pause after a failed read
    pub failure_cooldown: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            success_cooldown: Duration::from_secs(3),
            failure_cooldown: Duration::from_secs(1),
        }
    }
}

/// Convert bytes to uppercase hex string
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
