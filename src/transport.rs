/// Trait for the serial bus the reader chip hangs off.
/// Implement this trait for different backends (Raspberry Pi SPI, test fakes, etc.)
pub trait SpiTransport {
    /// Error type for transport operations
    type Error: std::fmt::Debug;

    /// Clock out `data` at `frequency_hz`, discarding whatever the chip shifts back
    fn send(&mut self, data: &[u8], frequency_hz: u32) -> Result<(), Self::Error>;

    /// Clock out `data` at `frequency_hz` and return the bytes shifted back,
    /// one per byte sent
    fn transfer(&mut self, data: &[u8], frequency_hz: u32) -> Result<Vec<u8>, Self::Error>;
}
