use thiserror::Error;

/// Errors returned by a [`RegisterWatcher`](crate::RegisterWatcher).
///
/// `E` is the error type of the injected reader. It is passed through
/// untouched by [`WatchError::Read`].
#[derive(Debug, Error)]
pub enum WatchError<E> {
    /// The reader failed. The previous snapshot is still in effect.
    #[error(transparent)]
    Read(E),

    /// The reader returned a byte count other than `quantity * register_size`.
    #[error("Incorrect register size: expected {expected} bytes, got {actual}")]
    RegisterSizeMismatch { expected: usize, actual: usize },

    /// `read_register` was called with an address outside the watched range.
    #[error("Register address {address} out of range [{first}, {last}]")]
    AddressOutOfRange { address: u16, first: u16, last: u32 },

    /// `read_register` was called before any successful poll.
    #[error("State uninitialized, poll the device first")]
    Uninitialized,
}

impl<E> WatchError<E> {
    /// Whether this error reports misuse of the watcher rather than a failed poll.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            WatchError::AddressOutOfRange { .. } | WatchError::Uninitialized
        )
    }
}

/// Result type alias using [`WatchError`].
pub type Result<T, E> = std::result::Result<T, WatchError<E>>;
