//! Raspberry Pi backends using the rppal crate

use log::warn;
use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::interrupt::{EdgeCallback, InterruptLine};
use crate::transport::SpiTransport;

/// Hardware SPI bus (`/dev/spidevB.S`)
pub struct RppalSpi {
    spi: Spi,
    clock_hz: u32,
}

impl RppalSpi {
    pub fn new(bus: Bus, slave: SlaveSelect, clock_hz: u32) -> Result<Self, rppal::spi::Error> {
        let spi = Spi::new(bus, slave, clock_hz, Mode::Mode0)?;
        Ok(Self { spi, clock_hz })
    }

    /// Bus from its number, e.g. `0` for `/dev/spidev0.x`
    pub fn bus_from_index(index: u8) -> Option<Bus> {
        match index {
            0 => Some(Bus::Spi0),
            1 => Some(Bus::Spi1),
            2 => Some(Bus::Spi2),
            3 => Some(Bus::Spi3),
            4 => Some(Bus::Spi4),
            5 => Some(Bus::Spi5),
            6 => Some(Bus::Spi6),
            _ => None,
        }
    }

    /// Chip select from its number, e.g. `0` for `/dev/spidevx.0`
    pub fn slave_from_index(index: u8) -> Option<SlaveSelect> {
        match index {
            0 => Some(SlaveSelect::Ss0),
            1 => Some(SlaveSelect::Ss1),
            2 => Some(SlaveSelect::Ss2),
            _ => None,
        }
    }

    fn ensure_clock(&mut self, frequency_hz: u32) -> Result<(), rppal::spi::Error> {
        if frequency_hz != self.clock_hz {
            self.spi.set_clock_speed(frequency_hz)?;
            self.clock_hz = frequency_hz;
        }
        Ok(())
    }
}

impl SpiTransport for RppalSpi {
    type Error = rppal::spi::Error;

    fn send(&mut self, data: &[u8], frequency_hz: u32) -> Result<(), Self::Error> {
        self.ensure_clock(frequency_hz)?;
        self.spi.write(data)?;
        Ok(())
    }

    fn transfer(&mut self, data: &[u8], frequency_hz: u32) -> Result<Vec<u8>, Self::Error> {
        self.ensure_clock(frequency_hz)?;
        let mut read = vec![0u8; data.len()];
        self.spi.transfer(&mut read, data)?;
        Ok(read)
    }
}

/// GPIO input with pull-up wired to the chip's IRQ output
pub struct RppalIrqPin {
    pin: InputPin,
}

impl RppalIrqPin {
    pub fn new(bcm_pin: u8) -> Result<Self, rppal::gpio::Error> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_input_pullup();
        Ok(Self { pin })
    }
}

impl InterruptLine for RppalIrqPin {
    type Error = rppal::gpio::Error;

    fn on_falling_edge(&mut self, mut callback: EdgeCallback) -> Result<(), Self::Error> {
        self.pin
            .set_async_interrupt(Trigger::FallingEdge, None, move |_| callback())
    }

    fn clear_callbacks(&mut self) -> Result<(), Self::Error> {
        self.pin.clear_async_interrupt()
    }
}

/// LED on a GPIO output.
///
/// Timed changes revert on a helper thread unless the light was switched
/// again in the meantime.
#[derive(Clone)]
pub struct IndicatorLight {
    pin: Arc<Mutex<OutputPin>>,
    generation: Arc<AtomicU64>,
}

impl IndicatorLight {
    pub fn new(bcm_pin: u8) -> Result<Self, rppal::gpio::Error> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_output_low();
        Ok(Self {
            pin: Arc::new(Mutex::new(pin)),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn turn_on(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.set(true);
    }

    pub fn turn_off(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.set(false);
    }

    /// Switch on, then back off after `duration`
    pub fn turn_on_for(&self, duration: Duration) {
        self.set_for(true, duration);
    }

    /// Switch off, then back on after `duration`
    pub fn turn_off_for(&self, duration: Duration) {
        self.set_for(false, duration);
    }

    fn set_for(&self, on: bool, duration: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set(on);

        let light = self.clone();
        let spawned = std::thread::Builder::new()
            .name("indicator-light".into())
            .spawn(move || {
                std::thread::sleep(duration);
                if light.generation.load(Ordering::SeqCst) == generation {
                    light.set(!on);
                }
            });
        if let Err(e) = spawned {
            warn!("Failed to schedule light revert: {}", e);
        }
    }

    fn set(&self, on: bool) {
        let mut pin = self.pin.lock().unwrap_or_else(PoisonError::into_inner);
        if on {
            pin.set_high();
        } else {
            pin.set_low();
        }
    }
}
