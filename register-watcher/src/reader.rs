//! The read capability injected into a watcher.

/// Reads `quantity` consecutive registers starting at `address` from the
/// device identified by `slave_id`.
///
/// On success the returned bytes are the raw register values in ascending
/// address order, `register_size` bytes per register. Timeouts, retries and
/// connection handling are the implementor's concern.
///
/// Any `FnMut(u8, u16, u16) -> Result<Vec<u8>, E>` closure is a reader:
///
/// ```
/// use register_watcher::RegisterReader;
///
/// let mut reader = |_slave: u8, _address: u16, quantity: u16| {
///     Ok::<_, std::io::Error>(vec![0u8; usize::from(quantity) * 2])
/// };
/// assert_eq!(reader.read(1, 0, 3).unwrap().len(), 6);
/// ```
pub trait RegisterReader {
    /// Error produced by a failed read.
    type Error;

    /// Read a block of registers.
    fn read(&mut self, slave_id: u8, address: u16, quantity: u16) -> Result<Vec<u8>, Self::Error>;
}

impl<F, E> RegisterReader for F
where
    F: FnMut(u8, u16, u16) -> Result<Vec<u8>, E>,
{
    type Error = E;

    fn read(&mut self, slave_id: u8, address: u16, quantity: u16) -> Result<Vec<u8>, E> {
        self(slave_id, address, quantity)
    }
}
