//! MFRC522 proximity card reader driver with an interrupt-driven scan loop.
//!
//! The driver talks to the chip through any [`SpiTransport`]; the scan loop
//! waits on any [`InterruptLine`] wired to the chip's IRQ output and reports
//! one [`ScanOutcome`] per card presented.
//!
//! # Features
//!
//! - `rpi` - SPI, IRQ pin and indicator light backends for the Raspberry Pi using rppal
//! - `cli` - the `rc522-scanner` binary
//!
//! # Example
//!
//! ```ignore
//! use std::sync::{mpsc, Arc};
//! use rc522_scanner::{ReaderConfig, ReaderDriver, RppalIrqPin, RppalSpi, ScanConfig, ScanLoop};
//! use rppal::spi::{Bus, SlaveSelect};
//!
//! let spi = RppalSpi::new(Bus::Spi0, SlaveSelect::Ss0, 1_000_000)?;
//! let driver = ReaderDriver::new(spi, ReaderConfig::default())?;
//! let mut scanner = ScanLoop::new(driver, RppalIrqPin::new(24)?, ScanConfig::default());
//!
//! let (tx, rx) = mpsc::channel();
//! let observer = Arc::new(tx);
//! scanner.set_observer(&observer);
//! scanner.start()?;
//!
//! for outcome in rx {
//!     println!("{:?}", outcome);
//! }
//! ```

mod acquisition;
mod bus;
mod interrupt;
mod reader;
mod register;
mod scanner;
mod transport;
mod types;

#[cfg(feature = "rpi")]
mod rpi;

#[cfg(test)]
mod testing;

// Re-exports
pub use acquisition::{KeyKind, RequestMode};
pub use bus::RegisterBus;
pub use interrupt::{EdgeCallback, InterruptLine, IrqSignal};
pub use reader::{ReaderDriver, Transceived};
pub use register::{AntennaGain, MAX_LEN, PcdCommand, Register, picc};
pub use scanner::{ScanLoop, ScanObserver, ScanState, StopHandle};
pub use transport::SpiTransport;
pub use types::{ReaderConfig, ReaderError, ScanConfig, ScanOutcome, Uid};

#[cfg(feature = "rpi")]
pub use rpi::{IndicatorLight, RppalIrqPin, RppalSpi};
