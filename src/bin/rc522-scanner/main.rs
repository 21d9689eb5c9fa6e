//! rc522-scanner - log every card presented to an MFRC522 reader
//!
//! Waits on the reader's IRQ line, appends each card read to a CSV file and
//! shows the scanner state on three lights: power, ready and success.

mod cli;
mod occurrence;

use clap::Parser;
use cli::Cli;
use occurrence::OccurrenceLog;
use rc522_scanner::{
    IndicatorLight, ReaderDriver, RppalIrqPin, RppalSpi, ScanConfig, ScanLoop, ScanOutcome,
};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

struct Lights {
    power: IndicatorLight,
    ready: IndicatorLight,
    success: IndicatorLight,
}

impl Lights {
    fn new(cli: &Cli) -> Result<Self, rppal::gpio::Error> {
        Ok(Self {
            power: IndicatorLight::new(cli.power_led)?,
            ready: IndicatorLight::new(cli.ready_led)?,
            success: IndicatorLight::new(cli.success_led)?,
        })
    }

    fn all_off(&self) {
        self.power.turn_off();
        self.ready.turn_off();
        self.success.turn_off();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    run(&cli)
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let bus = RppalSpi::bus_from_index(cli.spi_bus)
        .ok_or_else(|| format!("No SPI bus {}", cli.spi_bus))?;
    let slave = RppalSpi::slave_from_index(cli.spi_slave)
        .ok_or_else(|| format!("No SPI chip select {}", cli.spi_slave))?;

    let spi = RppalSpi::new(bus, slave, cli.spi_clock)?;
    let mut driver = ReaderDriver::new(spi, cli.reader_config())?;
    log::info!("Reader version 0x{:02X}", driver.version()?);

    let irq = RppalIrqPin::new(cli.irq_pin)?;
    let lights = Lights::new(cli)?;
    let mut log_file = OccurrenceLog::open(&cli.output)?;
    log::info!("Logging cards to {}", cli.output.display());

    let scan_config = cli.scan_config();
    let mut scanner = ScanLoop::new(driver, irq, scan_config.clone());

    let (tx, rx) = mpsc::channel();
    let observer = Arc::new(tx);
    scanner.set_observer(&observer);

    let stop = scanner.stop_handle();
    ctrlc::set_handler(move || {
        stop.stop();
    })?;

    lights.power.turn_on();
    lights.ready.turn_on();
    scanner.start()?;
    log::info!("Scanning for cards, Ctrl-C to quit");

    while scanner.is_running() {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(outcome) => handle_outcome(outcome, &mut log_file, &lights, &scan_config),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // a fatal failure ends the worker right after its outcome is sent
    for outcome in rx.try_iter() {
        handle_outcome(outcome, &mut log_file, &lights, &scan_config);
    }

    log::info!("Shutting down");
    scanner.clear_observer();
    let result = scanner.teardown();
    lights.all_off();
    result?;
    Ok(())
}

fn handle_outcome(
    outcome: ScanOutcome,
    log_file: &mut OccurrenceLog,
    lights: &Lights,
    config: &ScanConfig,
) {
    match outcome {
        ScanOutcome::Success(uid) => match log_file.record(&uid) {
            Ok(()) => {
                log::info!("Recorded tag {}", uid.to_tag_string());
                lights.success.turn_on_for(config.success_cooldown);
                lights.ready.turn_off_for(config.success_cooldown);
            }
            Err(e) => {
                lights.success.turn_off();
                log::error!("Failed to record tag {}: {}", uid, e);
            }
        },
        ScanOutcome::Failure(_) => lights.success.turn_off(),
    }
}
