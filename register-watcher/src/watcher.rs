//! Snapshot polling and change dispatch.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace, warn};

use crate::config::WatcherConfig;
use crate::error::{Result, WatchError};
use crate::reader::RegisterReader;

/// Notification invoked with the address of a changed register.
pub type Callback = Box<dyn FnMut(u16)>;

/// Polls a register range and notifies per-address callbacks on change.
///
/// The watcher is a plain single-threaded structure. Every call blocks for as
/// long as the reader or a callback blocks.
pub struct RegisterWatcher<R> {
    config: WatcherConfig,
    reader: R,
    /// Latest snapshot, `None` until the first successful poll.
    state: Option<Vec<u8>>,
    callbacks: HashMap<u16, Callback>,
}

impl<R: RegisterReader> RegisterWatcher<R> {
    /// Create a watcher with an empty callback registry and no snapshot.
    pub fn new(config: WatcherConfig, reader: R) -> Self {
        Self {
            config,
            reader,
            state: None,
            callbacks: HashMap::new(),
        }
    }

    /// Register `callback` for `address`, replacing any previous one.
    ///
    /// Addresses outside the polled range are stored but never fire from
    /// [`poll`](Self::poll). They still fire from
    /// [`trigger_callbacks`](Self::trigger_callbacks).
    pub fn register_callback<F>(&mut self, address: u16, callback: F)
    where
        F: FnMut(u16) + 'static,
    {
        if self.callbacks.insert(address, Box::new(callback)).is_some() {
            debug!("Replaced callback for register {}", address);
        }
    }

    /// Read the register range, store it as the new snapshot and fire the
    /// callback of every watched register whose bytes changed.
    ///
    /// On the first poll, or when the snapshot length changed since the last
    /// one, every watched register in range fires. Callbacks run in ascending
    /// address order. Returns the number of callbacks fired.
    ///
    /// A reader error or a wrongly sized result leaves the previous snapshot
    /// in place.
    pub fn poll(&mut self) -> Result<usize, R::Error> {
        let WatcherConfig {
            address,
            quantity,
            slave_id,
            ..
        } = self.config;

        let new_state = self
            .reader
            .read(slave_id, address, quantity)
            .map_err(WatchError::Read)?;

        let expected = self.config.expected_len();
        if new_state.len() != expected {
            warn!(
                "Register size mismatch @ {}: expected {} bytes, got {}",
                address,
                expected,
                new_state.len()
            );
            return Err(WatchError::RegisterSizeMismatch {
                expected,
                actual: new_state.len(),
            });
        }

        let fired = dispatch(
            &self.config,
            &mut self.callbacks,
            self.state.as_deref(),
            &new_state,
        );
        self.state = Some(new_state);

        debug!(
            "Polled {} register(s) @ {}: {} callback(s) fired",
            quantity, address, fired
        );
        Ok(fired)
    }

    /// Raw bytes of one register from the latest snapshot.
    ///
    /// The accepted range is `[address, address + quantity]`, upper bound
    /// included. The extra address past the last polled register has no
    /// bytes in the snapshot and is reported as out of range.
    pub fn read_register(&self, address: u16) -> Result<&[u8], R::Error> {
        let first = self.config.address;
        let last = self.config.end();
        let out_of_range = WatchError::AddressOutOfRange {
            address,
            first,
            last,
        };

        if address < first || u32::from(address) > last {
            return Err(out_of_range);
        }

        let state = self.state.as_deref().ok_or(WatchError::Uninitialized)?;
        let offset = self.config.offset_of(address);
        state
            .get(offset..offset + self.config.register_size)
            .ok_or(out_of_range)
    }

    /// Invoke every registered callback once, whatever the snapshot state.
    ///
    /// Iteration order is unspecified. Returns the number of callbacks invoked.
    pub fn trigger_callbacks(&mut self) -> usize {
        for (&address, callback) in self.callbacks.iter_mut() {
            callback(address);
        }
        self.callbacks.len()
    }

    /// The configuration this watcher was built with.
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// The latest snapshot, if a poll has succeeded.
    pub fn snapshot(&self) -> Option<&[u8]> {
        self.state.as_deref()
    }

    /// Whether a poll has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Whether a callback is registered for `address`.
    pub fn is_watched(&self, address: u16) -> bool {
        self.callbacks.contains_key(&address)
    }

    /// Number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }
}

/// Walk the slots of `current` in address order and fire the callback of each
/// watched slot whose bytes differ from `previous`.
fn dispatch(
    config: &WatcherConfig,
    callbacks: &mut HashMap<u16, Callback>,
    previous: Option<&[u8]>,
    current: &[u8],
) -> usize {
    let width = config.register_size;
    if width == 0 {
        return 0;
    }

    // First poll or size changed: nothing to compare against.
    let previous = previous.filter(|old| old.len() == current.len());

    let mut fired = 0;
    let mut address = config.address;
    for (index, value) in current.chunks_exact(width).enumerate() {
        if let Some(callback) = callbacks.get_mut(&address) {
            let offset = index * width;
            let old_value = previous.map(|old| &old[offset..offset + width]);

            if old_value != Some(value) {
                trace!("Register {} changed: {:02x?} -> {:02x?}", address, old_value, value);
                callback(address);
                fired += 1;
            }
        }
        address = address.wrapping_add(1);
    }

    fired
}

impl<R> fmt::Debug for RegisterWatcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut watched: Vec<_> = self.callbacks.keys().copied().collect();
        watched.sort_unstable();

        f.debug_struct("RegisterWatcher")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("watched", &watched)
            .finish_non_exhaustive()
    }
}
