//! Modbus register watcher.
//!
//! Polls Modbus devices (TCP or RTU/serial) through a
//! [`RegisterWatcher`](register_watcher::RegisterWatcher) per configured
//! range and logs every register whose value changed.
//!
//! # Log Format
//!
//! ```text
//! Device '<device>': <watch>/<address> = <value> (raw <bytes>)
//! ```
//!
//! Where:
//! - `<device>` - Device name from configuration
//! - `<watch>` - Watch name, or `<register_type>@<address>` when unnamed
//! - `<value>` - Register decoded with the configured data type

pub mod config;
pub mod decode;
pub mod logging;
pub mod poller;
pub mod source;
