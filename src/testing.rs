//! Fakes for testing driver and scanner logic without hardware

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::interrupt::{EdgeCallback, InterruptLine};
use crate::register::Register;
use crate::transport::SpiTransport;

/// What the simulated card answers to the next transmission
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Card answers with these bytes, `last_bits` valid bits in the last byte (0 = all)
    Frame { data: Vec<u8>, last_bits: u8 },
    /// Nobody answers, the chip timer fires
    Silence,
    /// The chip never raises an interrupt
    Stall,
    /// The chip flags these bits in its error register
    ChipError(u8),
}

pub(crate) struct ChipState {
    pub regs: [u8; 64],
    pub fifo: VecDeque<u8>,
    /// Anticollision answer of the card in the field
    pub card: Option<[u8; 5]>,
    /// Replies used before falling back to the card simulation
    pub scripted: VecDeque<Reply>,
    pub fifo_level_override: Option<u8>,
    pub last_bits_override: Option<u8>,
    pub auth_accepts: bool,
    pub fail_transport: bool,
    pub writes: Vec<(u8, u8)>,
    pub transmissions: Vec<Vec<u8>>,
    pub clock_hz: Vec<u32>,
}

impl ChipState {
    fn power_on(&mut self) {
        self.regs = [0; 64];
        self.regs[Register::TxControl as usize] = 0x80;
        self.regs[Register::Version as usize] = 0x92;
        self.regs[Register::Mode as usize] = 0x3F;
        self.fifo.clear();
    }

    fn write(&mut self, addr: u8, value: u8) {
        self.writes.push((addr, value));
        let a = addr as usize;

        match addr {
            x if x == Register::Command as u8 => match value & 0x0F {
                0x0F => self.power_on(),
                0x03 => {
                    let data: Vec<u8> = self.fifo.drain(..).collect();
                    let crc = crc_a(&data);
                    self.regs[Register::CrcResultL as usize] = crc[0];
                    self.regs[Register::CrcResultM as usize] = crc[1];
                    self.regs[Register::DivIrq as usize] |= 0x04;
                }
                0x0E => {
                    let frame: Vec<u8> = self.fifo.drain(..).collect();
                    self.transmissions.push(frame);
                    if self.auth_accepts {
                        self.regs[Register::Status2 as usize] |= 0x08;
                    }
                    self.regs[Register::ComIrq as usize] |= 0x10;
                }
                _ => self.regs[a] = value,
            },
            x if x == Register::BitFraming as u8 => {
                self.regs[a] = value;
                if value & 0x80 != 0 && self.regs[Register::Command as usize] == 0x0C {
                    self.transmit();
                }
            }
            x if x == Register::FifoData as u8 => self.fifo.push_back(value),
            x if x == Register::FifoLevel as u8 => {
                if value & 0x80 != 0 {
                    self.fifo.clear();
                }
            }
            x if x == Register::ComIrq as u8 || x == Register::DivIrq as u8 => {
                if value & 0x80 != 0 {
                    self.regs[a] |= value & 0x7F;
                } else {
                    self.regs[a] &= !value;
                }
            }
            _ => self.regs[a] = value,
        }
    }

    fn read(&mut self, addr: u8) -> u8 {
        match addr {
            x if x == Register::FifoData as u8 => self.fifo.pop_front().unwrap_or(0),
            x if x == Register::FifoLevel as u8 => self
                .fifo_level_override
                .unwrap_or(self.fifo.len() as u8),
            x if x == Register::Control as u8 => match self.last_bits_override {
                Some(bits) => (self.regs[addr as usize] & !0x07) | bits,
                None => self.regs[addr as usize],
            },
            _ => self.regs[addr as usize],
        }
    }

    fn transmit(&mut self) {
        let frame: Vec<u8> = self.fifo.drain(..).collect();
        let reply = self
            .scripted
            .pop_front()
            .unwrap_or_else(|| self.card_reply(&frame));
        self.transmissions.push(frame);

        let irq = Register::ComIrq as usize;
        let error = Register::Error as usize;
        match reply {
            Reply::Frame { data, last_bits } => {
                self.fifo.extend(data);
                let control = Register::Control as usize;
                self.regs[control] = (self.regs[control] & !0x07) | (last_bits & 0x07);
                self.regs[error] = 0;
                self.regs[irq] |= 0x70;
            }
            Reply::Silence => {
                self.regs[error] = 0;
                self.regs[irq] |= 0x41;
            }
            Reply::Stall => {}
            Reply::ChipError(flags) => {
                self.regs[error] = flags;
                self.regs[irq] |= 0x32;
            }
        }
    }

    fn card_reply(&self, frame: &[u8]) -> Reply {
        let Some(uid) = self.card else {
            return Reply::Silence;
        };
        match frame {
            [0x26] | [0x52] => Reply::Frame {
                data: vec![0x04, 0x00],
                last_bits: 0,
            },
            [0x93, 0x20] => Reply::Frame {
                data: uid.to_vec(),
                last_bits: 0,
            },
            [0x93, 0x70, ..] => {
                let crc = crc_a(&[0x08]);
                Reply::Frame {
                    data: vec![0x08, crc[0], crc[1]],
                    last_bits: 0,
                }
            }
            [0x30, block, ..] => Reply::Frame {
                data: vec![*block; 18],
                last_bits: 0,
            },
            _ => Reply::Silence,
        }
    }
}

/// Register-file simulation of the reader chip, with an optional card in the field
#[derive(Clone)]
pub(crate) struct FakeChip {
    state: Arc<Mutex<ChipState>>,
}

impl FakeChip {
    pub fn new() -> Self {
        let mut state = ChipState {
            regs: [0; 64],
            fifo: VecDeque::new(),
            card: None,
            scripted: VecDeque::new(),
            fifo_level_override: None,
            last_bits_override: None,
            auth_accepts: true,
            fail_transport: false,
            writes: Vec::new(),
            transmissions: Vec::new(),
            clock_hz: Vec::new(),
        };
        state.power_on();
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Chip with a card whose anticollision answer is `uid`
    pub fn with_card(uid: [u8; 5]) -> Self {
        let chip = Self::new();
        chip.state().card = Some(uid);
        chip
    }

    pub fn state(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap()
    }

    pub fn script(&self, replies: impl IntoIterator<Item = Reply>) {
        self.state().scripted.extend(replies);
    }

    pub fn reg(&self, reg: Register) -> u8 {
        self.state().regs[reg as usize]
    }

    pub fn set_reg(&self, reg: Register, value: u8) {
        self.state().regs[reg as usize] = value;
    }

    pub fn clear_log(&self) {
        let mut state = self.state();
        state.writes.clear();
        state.transmissions.clear();
    }

    /// Writes to `reg` since the last `clear_log`
    pub fn writes_to(&self, reg: Register) -> Vec<u8> {
        self.state()
            .writes
            .iter()
            .filter(|(addr, _)| *addr == reg as u8)
            .map(|(_, value)| *value)
            .collect()
    }

    pub fn transmissions(&self) -> Vec<Vec<u8>> {
        self.state().transmissions.clone()
    }
}

impl SpiTransport for FakeChip {
    type Error = std::io::Error;

    fn send(&mut self, data: &[u8], frequency_hz: u32) -> Result<(), Self::Error> {
        self.transfer(data, frequency_hz).map(|_| ())
    }

    fn transfer(&mut self, data: &[u8], frequency_hz: u32) -> Result<Vec<u8>, Self::Error> {
        let mut state = self.state();
        if state.fail_transport {
            return Err(std::io::Error::other("spi bus unplugged"));
        }
        state.clock_hz.push(frequency_hz);

        let mut response = vec![0u8; data.len()];
        if let [address, value, ..] = data {
            let addr = (*address & 0x7E) >> 1;
            if *address & 0x80 != 0 {
                response[1] = state.read(addr);
            } else {
                state.write(addr, *value);
            }
        }
        Ok(response)
    }
}

/// Interrupt line whose edges are fired by the test
#[derive(Clone, Default)]
pub(crate) struct FakeIrq {
    callback: Arc<Mutex<Option<EdgeCallback>>>,
    registrations: Arc<AtomicUsize>,
}

impl FakeIrq {
    /// Simulate a falling edge. Returns whether a callback was registered.
    pub fn fire(&self) -> bool {
        match self.callback.lock().unwrap().as_mut() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn has_callback(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

impl InterruptLine for FakeIrq {
    type Error = Infallible;

    fn on_falling_edge(&mut self, callback: EdgeCallback) -> Result<(), Self::Error> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock().unwrap() = Some(callback);
        Ok(())
    }

    fn clear_callbacks(&mut self) -> Result<(), Self::Error> {
        *self.callback.lock().unwrap() = None;
        Ok(())
    }
}

/// ISO/IEC 14443-3 type A CRC, low byte first
pub(crate) fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut ch = byte ^ (crc as u8);
        ch ^= ch << 4;
        let ch = ch as u16;
        crc = (crc >> 8) ^ (ch << 8) ^ (ch << 3) ^ (ch >> 4);
    }
    [crc as u8, (crc >> 8) as u8]
}
