//! Modbus connections and the register readers built on them.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use register_watcher::RegisterReader;
use tokio::runtime::Handle;
use tokio_modbus::client::{Context, Reader, rtu, tcp};
use tokio_modbus::prelude::{Slave, SlaveContext};
use tracing::{debug, warn};

use crate::config::{ConnectionConfig, DeviceConfig, RegisterType, WatchConfig};
use crate::decode::{bits_to_bytes, words_to_bytes};

/// Error type for reads against a device.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Invalid request: {0}")]
    Request(String),
    #[error("Not connected")]
    Disconnected,
}

/// A device connection shared by all watchers of that device.
///
/// `None` while disconnected. A transport failure or timeout during a read
/// drops the connection so the poll loop reconnects on its next cycle.
pub type SharedContext = Rc<RefCell<Option<Context>>>;

/// Connect to the Modbus device.
pub async fn connect(device: &DeviceConfig) -> Result<Context, SourceError> {
    let timeout = Duration::from_millis(device.timeout_ms);
    let slave = Slave(device.unit_id);

    match &device.connection {
        ConnectionConfig::Tcp { host, port } => {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .map_err(|e| SourceError::Connection(format!("Invalid address: {}", e)))?;

            let ctx = tokio::time::timeout(timeout, tcp::connect_slave(addr, slave))
                .await
                .map_err(|_| SourceError::Connection("Connection timeout".to_string()))?
                .map_err(|e| SourceError::Connection(e.to_string()))?;

            Ok(ctx)
        }
        ConnectionConfig::Rtu {
            port,
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        } => {
            let parity = match parity.to_lowercase().as_str() {
                "even" => tokio_serial::Parity::Even,
                "odd" => tokio_serial::Parity::Odd,
                _ => tokio_serial::Parity::None,
            };

            let stop_bits = match stop_bits {
                2 => tokio_serial::StopBits::Two,
                _ => tokio_serial::StopBits::One,
            };

            let data_bits = match data_bits {
                5 => tokio_serial::DataBits::Five,
                6 => tokio_serial::DataBits::Six,
                7 => tokio_serial::DataBits::Seven,
                _ => tokio_serial::DataBits::Eight,
            };

            let builder = tokio_serial::new(port, *baud_rate)
                .parity(parity)
                .stop_bits(stop_bits)
                .data_bits(data_bits);

            let serial = tokio_serial::SerialStream::open(&builder)
                .map_err(|e| SourceError::Connection(format!("Serial open failed: {}", e)))?;

            Ok(rtu::attach_slave(serial, slave))
        }
    }
}

/// Reads one register type from a shared device connection.
///
/// Each request is driven to completion on `runtime` and bounded by
/// `timeout`, whatever the transport. Must be called from a blocking
/// context such as a `spawn_blocking` task, never from async code.
///
/// Word registers are requested `data_type.words()` at a time per value, so a
/// watcher with `quantity` values receives `quantity * register_size` bytes.
pub struct RegisterSource {
    ctx: SharedContext,
    runtime: Handle,
    timeout: Duration,
    register_type: RegisterType,
    words_per_value: u16,
}

impl RegisterSource {
    /// Create a reader for the given watch range.
    pub fn new(ctx: SharedContext, watch: &WatchConfig, runtime: Handle, timeout: Duration) -> Self {
        Self {
            ctx,
            runtime,
            timeout,
            register_type: watch.register_type,
            words_per_value: watch.data_type.words(),
        }
    }
}

impl RegisterReader for RegisterSource {
    type Error = SourceError;

    fn read(
        &mut self,
        slave_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, SourceError> {
        let count = match self.register_type {
            RegisterType::Coil | RegisterType::Discrete => quantity,
            RegisterType::Input | RegisterType::Holding => {
                word_count(quantity, self.words_per_value)?
            }
        };

        let mut guard = self.ctx.borrow_mut();
        let ctx = guard.as_mut().ok_or(SourceError::Disconnected)?;
        ctx.set_slave(Slave(slave_id));

        let register_type = self.register_type;
        let request = async {
            match register_type {
                RegisterType::Coil => ctx
                    .read_coils(address, count)
                    .await
                    .map(|r| r.map(|bits| bits_to_bytes(&bits))),
                RegisterType::Discrete => ctx
                    .read_discrete_inputs(address, count)
                    .await
                    .map(|r| r.map(|bits| bits_to_bytes(&bits))),
                RegisterType::Input => ctx
                    .read_input_registers(address, count)
                    .await
                    .map(|r| r.map(|words| words_to_bytes(&words))),
                RegisterType::Holding => ctx
                    .read_holding_registers(address, count)
                    .await
                    .map(|r| r.map(|words| words_to_bytes(&words))),
            }
        };

        let timeout = self.timeout;
        let response = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, request).await });

        match response {
            Ok(Ok(Ok(bytes))) => {
                debug!(
                    "Read {} {} value(s) @ {} from unit {}",
                    quantity,
                    register_type.as_str(),
                    address,
                    slave_id
                );
                Ok(bytes)
            }
            Ok(Ok(Err(exception))) => Err(SourceError::Read(format!("Exception: {:?}", exception))),
            Ok(Err(e)) => {
                warn!("Transport error, dropping connection: {}", e);
                *guard = None;
                Err(SourceError::Read(e.to_string()))
            }
            Err(_) => {
                warn!(
                    "No response from unit {} within {}ms, dropping connection",
                    slave_id,
                    timeout.as_millis()
                );
                *guard = None;
                Err(SourceError::Read(format!(
                    "Request timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }
}

/// Number of 16-bit words covering `quantity` values.
fn word_count(quantity: u16, words_per_value: u16) -> Result<u16, SourceError> {
    quantity.checked_mul(words_per_value).ok_or_else(|| {
        SourceError::Request(format!(
            "{} values of {} words exceed one request",
            quantity, words_per_value
        ))
    })
}
