//! Register map and command codes of the MFRC522

/// Addressable registers of the chip (6-bit address space)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    // Page 0: command and status
    Command = 0x01,
    ComIEn = 0x02,
    DivIEn = 0x03,
    ComIrq = 0x04,
    DivIrq = 0x05,
    Error = 0x06,
    Status1 = 0x07,
    Status2 = 0x08,
    FifoData = 0x09,
    FifoLevel = 0x0A,
    WaterLevel = 0x0B,
    Control = 0x0C,
    BitFraming = 0x0D,
    Coll = 0x0E,

    // Page 1: command
    Mode = 0x11,
    TxMode = 0x12,
    RxMode = 0x13,
    TxControl = 0x14,
    TxAsk = 0x15,
    TxSel = 0x16,
    RxSel = 0x17,
    RxThreshold = 0x18,
    Demod = 0x19,
    MfTx = 0x1C,
    MfRx = 0x1D,
    SerialSpeed = 0x1F,

    // Page 2: configuration
    CrcResultM = 0x21,
    CrcResultL = 0x22,
    ModWidth = 0x24,
    RfCfg = 0x26,
    GsN = 0x27,
    CwGsP = 0x28,
    ModGsP = 0x29,
    TMode = 0x2A,
    TPrescaler = 0x2B,
    TReloadH = 0x2C,
    TReloadL = 0x2D,
    TCounterValueH = 0x2E,
    TCounterValueL = 0x2F,

    // Page 3: test
    TestSel1 = 0x31,
    TestSel2 = 0x32,
    TestPinEn = 0x33,
    TestPinValue = 0x34,
    TestBus = 0x35,
    AutoTest = 0x36,
    Version = 0x37,
    AnalogTest = 0x38,
    TestDac1 = 0x39,
    TestDac2 = 0x3A,
    TestAdc = 0x3B,
}

impl Register {
    /// Raw 6-bit register address
    pub fn addr(self) -> u8 {
        self as u8
    }
}

/// Commands executed by the chip itself (written to `Register::Command`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PcdCommand {
    Idle = 0x00,
    Mem = 0x01,
    GenerateRandomId = 0x02,
    CalcCrc = 0x03,
    Transmit = 0x04,
    NoCmdChange = 0x07,
    Receive = 0x08,
    Transceive = 0x0C,
    MfAuthent = 0x0E,
    SoftReset = 0x0F,
}

/// Commands sent over the air to the card
pub mod picc {
    pub const REQUEST_IDLE: u8 = 0x26;
    pub const REQUEST_ALL: u8 = 0x52;
    pub const ANTICOLLISION_CL1: u8 = 0x93;
    pub const SELECT_CL1: u8 = 0x93;
    pub const AUTH_KEY_A: u8 = 0x60;
    pub const AUTH_KEY_B: u8 = 0x61;
    pub const READ: u8 = 0x30;
    pub const HALT: u8 = 0x50;

    /// NVB for anticollision: 2 bytes sent, no UID bits known
    pub const NVB_ANTICOLLISION: u8 = 0x20;
    /// NVB for select: 7 bytes sent, full UID known
    pub const NVB_SELECT: u8 = 0x70;
}

// ComIEn / ComIrq bits
pub(crate) const IRQ_SET: u8 = 0x80;
pub(crate) const IRQ_TX: u8 = 0x40;
pub(crate) const IRQ_RX: u8 = 0x20;
pub(crate) const IRQ_IDLE: u8 = 0x10;
pub(crate) const IRQ_LOW_ALERT: u8 = 0x04;
pub(crate) const IRQ_ERR: u8 = 0x02;
pub(crate) const IRQ_TIMER: u8 = 0x01;

// DivIrq bits
pub(crate) const DIV_IRQ_CRC: u8 = 0x04;

/// BufferOvfl | ColErr | ParityErr | ProtocolErr
pub(crate) const ERROR_MASK: u8 = 0x1B;

pub(crate) const FIFO_FLUSH: u8 = 0x80;
pub(crate) const FIFO_LEVEL_MASK: u8 = 0x7F;
pub(crate) const CONTROL_RX_LAST_BITS: u8 = 0x07;
pub(crate) const BIT_FRAMING_START_SEND: u8 = 0x80;
pub(crate) const STATUS2_CRYPTO1_ON: u8 = 0x08;
pub(crate) const TX_CONTROL_ANTENNA: u8 = 0x03;

/// Capacity of the chip's FIFO in bytes
pub const MAX_LEN: usize = 16;

/// Receiver voltage gain, stored in bits 6..4 of `Register::RfCfg`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AntennaGain {
    Db18 = 0,
    Db23 = 1,
    Db18Alt = 2,
    Db23Alt = 3,
    #[default]
    Db33 = 4,
    Db38 = 5,
    Db43 = 6,
    Db48 = 7,
}

impl AntennaGain {
    /// Gain from its numeric level (0-7)
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::Db18),
            1 => Some(Self::Db23),
            2 => Some(Self::Db18Alt),
            3 => Some(Self::Db23Alt),
            4 => Some(Self::Db33),
            5 => Some(Self::Db38),
            6 => Some(Self::Db43),
            7 => Some(Self::Db48),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }
}
