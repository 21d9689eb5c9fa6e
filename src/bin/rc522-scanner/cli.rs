//! CLI argument parsing

use clap::Parser;
use rc522_scanner::{AntennaGain, ReaderConfig, ScanConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rc522-scanner")]
#[command(author, version, about = "Log every card presented to an MFRC522 reader", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// SPI bus number (/dev/spidevB.x)
    #[arg(long, default_value_t = 0, env = "RC522_SPI_BUS")]
    pub spi_bus: u8,

    /// SPI chip select (/dev/spidevx.S)
    #[arg(long, default_value_t = 0, env = "RC522_SPI_SLAVE")]
    pub spi_slave: u8,

    /// SPI clock in Hz
    #[arg(long, default_value_t = 1_000_000)]
    pub spi_clock: u32,

    /// BCM number of the GPIO wired to the reader's IRQ pin
    #[arg(long, default_value_t = 24, env = "RC522_IRQ_PIN")]
    pub irq_pin: u8,

    /// BCM number of the power light
    #[arg(long, default_value_t = 13, env = "RC522_POWER_LED")]
    pub power_led: u8,

    /// BCM number of the ready light
    #[arg(long, default_value_t = 19, env = "RC522_READY_LED")]
    pub ready_led: u8,

    /// BCM number of the success light
    #[arg(long, default_value_t = 26, env = "RC522_SUCCESS_LED")]
    pub success_led: u8,

    /// Receiver gain level, 0 (18 dB) to 7 (48 dB)
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(0..=7))]
    pub antenna_gain: u8,

    /// Attempts per request / anticollision before a read counts as failed
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Status polls allowed per chip command
    #[arg(long, default_value_t = 2000)]
    pub irq_poll_budget: u32,

    /// How often to re-arm card detection and check for shutdown, in ms
    #[arg(long, default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Pause after a successful read, in ms
    #[arg(long, default_value_t = 3000)]
    pub success_cooldown_ms: u64,

    /// Pause after a failed read, in ms
    #[arg(long, default_value_t = 1000)]
    pub failure_cooldown_ms: u64,

    /// Occurrence log, appended to
    #[arg(short, long, default_value = "rfid-scan.csv", env = "RC522_OUTPUT")]
    pub output: PathBuf,
}

impl Cli {
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            clock_hz: self.spi_clock,
            antenna_gain: AntennaGain::from_level(self.antenna_gain).unwrap_or_default(),
            irq_poll_budget: self.irq_poll_budget,
            max_attempts: self.max_attempts,
            ..ReaderConfig::default()
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            success_cooldown: Duration::from_millis(self.success_cooldown_ms),
            failure_cooldown: Duration::from_millis(self.failure_cooldown_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["rc522-scanner"]);
        assert_eq!(cli.reader_config(), ReaderConfig::default());
        assert_eq!(cli.scan_config(), ScanConfig::default());
    }

    #[test]
    fn test_gain_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["rc522-scanner", "--antenna-gain", "8"]).is_err());

        let cli = Cli::parse_from(["rc522-scanner", "--antenna-gain", "7", "-vv"]);
        assert_eq!(cli.reader_config().antenna_gain, AntennaGain::Db48);
        assert_eq!(cli.verbose, 2);
    }
}
