//! Register Watcher
//!
//! Polls a contiguous range of fixed-width registers through an injected read
//! function, keeps the latest snapshot, and notifies per-address callbacks
//! when a register's bytes change between two polls.
//!
//! - [`config`] - Address range, unit id and register width
//! - [`reader`] - The read capability injected into the watcher
//! - [`watcher`] - [`RegisterWatcher`] itself
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```
//! use register_watcher::{RegisterWatcher, WatcherConfig};
//!
//! let config = WatcherConfig::new(100, 2, 1, 2);
//! let reader = |_slave: u8, _address: u16, _quantity: u16| {
//!     Ok::<_, std::io::Error>(vec![0x00, 0x01, 0x00, 0x02])
//! };
//!
//! let mut watcher = RegisterWatcher::new(config, reader);
//! watcher.register_callback(101, |address| println!("register {address} changed"));
//!
//! watcher.poll()?;
//! assert_eq!(watcher.read_register(101)?, &[0x00, 0x02]);
//! # Ok::<(), register_watcher::WatchError<std::io::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod reader;
pub mod watcher;

pub use config::WatcherConfig;
pub use error::{Result, WatchError};
pub use reader::RegisterReader;
pub use watcher::{Callback, RegisterWatcher};
