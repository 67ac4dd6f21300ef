//! Modbus device polling and change reporting.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use register_watcher::{RegisterReader, RegisterWatcher, WatchError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{DeviceConfig, WatchConfig};
use crate::decode::hex;
use crate::source::{self, RegisterSource, SharedContext};

/// A register whose value changed (or was re-reported by a heartbeat).
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterChange {
    /// Watch label
    pub watch: String,
    /// Register address
    pub address: u16,
    /// Raw snapshot bytes of the register
    pub raw: Vec<u8>,
    /// Value decoded with the watch's data type
    pub value: Option<f64>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// One watch range and the watcher polling it.
pub struct WatchedRange<R> {
    watch: WatchConfig,
    label: String,
    watcher: RegisterWatcher<R>,
    changes: Receiver<u16>,
}

impl<R> WatchedRange<R>
where
    R: RegisterReader,
    R::Error: Display,
{
    /// Build a watcher for `watch` with a callback on every reported address.
    pub fn new(watch: WatchConfig, unit_id: u8, reader: R) -> Self {
        let mut watcher = RegisterWatcher::new(watch.watcher_config(unit_id), reader);
        let (tx, changes) = mpsc::channel();

        for address in watch.watched_addresses() {
            let tx = tx.clone();
            watcher.register_callback(address, move |changed| {
                let _ = tx.send(changed);
            });
        }

        Self {
            label: watch.label(),
            watch,
            watcher,
            changes,
        }
    }

    /// Poll the range once and collect the registers that changed.
    ///
    /// With `heartbeat` set, every watched register is reported after a
    /// successful poll whether it changed or not.
    pub fn poll(
        &mut self,
        heartbeat: bool,
    ) -> Result<Vec<RegisterChange>, WatchError<R::Error>> {
        self.watcher.poll()?;
        if heartbeat {
            self.watcher.trigger_callbacks();
        }
        Ok(self.drain())
    }

    /// Watch label used in log lines.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn drain(&self) -> Vec<RegisterChange> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let addresses: BTreeSet<u16> = self.changes.try_iter().collect();

        addresses
            .into_iter()
            .filter_map(|address| match self.watcher.read_register(address) {
                Ok(raw) => Some(RegisterChange {
                    watch: self.label.clone(),
                    address,
                    raw: raw.to_vec(),
                    value: self.watch.decode(raw),
                    timestamp,
                }),
                Err(e) => {
                    warn!("Watch '{}': cannot read register {}: {}", self.label, address, e);
                    None
                }
            })
            .collect()
    }
}

/// Poll every range once, log each change and return all of them.
///
/// A failing range is logged and skipped; the others are still polled.
pub fn poll_cycle<R>(
    device: &str,
    ranges: &mut [WatchedRange<R>],
    heartbeat: bool,
) -> Vec<RegisterChange>
where
    R: RegisterReader,
    R::Error: Display,
{
    let mut changes = Vec::new();

    for range in ranges.iter_mut() {
        match range.poll(heartbeat) {
            Ok(changed) => {
                for change in &changed {
                    let value = match change.value {
                        Some(value) => value.to_string(),
                        None => "?".to_string(),
                    };
                    info!(
                        "Device '{}': {}/{} = {} (raw {})",
                        device,
                        change.watch,
                        change.address,
                        value,
                        hex(&change.raw)
                    );
                }
                changes.extend(changed);
            }
            Err(e) => {
                warn!(
                    "Device '{}': failed to poll '{}': {}",
                    device,
                    range.label(),
                    e
                );
            }
        }
    }

    changes
}

/// A poller for a single Modbus device.
///
/// The watchers it drives are single-threaded, so `run` blocks and belongs
/// on a `spawn_blocking` task. Connects, reads and waits are driven on the
/// runtime behind `runtime`.
pub struct DevicePoller {
    device: DeviceConfig,
    runtime: Handle,
    shutdown: watch::Receiver<bool>,
}

impl DevicePoller {
    /// Create a new poller for a device.
    pub fn new(device: DeviceConfig, runtime: Handle, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            device,
            runtime,
            shutdown,
        }
    }

    /// Run the polling loop until shutdown is requested.
    pub fn run(mut self) {
        let interval = Duration::from_millis(self.device.poll_interval_ms);
        let timeout = Duration::from_millis(self.device.timeout_ms);
        let device = self.device.clone();
        let name = device.name.as_str();

        let ctx: SharedContext = Rc::default();
        let mut ranges: Vec<WatchedRange<RegisterSource>> = device
            .watches
            .iter()
            .map(|watch| {
                let reader = RegisterSource::new(ctx.clone(), watch, self.runtime.clone(), timeout);
                WatchedRange::new(watch.clone(), device.unit_id, reader)
            })
            .collect();

        info!(
            "Starting Modbus watcher for device '{}' ({} range(s), interval: {}ms)",
            name,
            ranges.len(),
            device.poll_interval_ms
        );

        let mut polls: u64 = 0;
        while !*self.shutdown.borrow() {
            if ctx.borrow().is_none() {
                match self.runtime.block_on(source::connect(&device)) {
                    Ok(connected) => {
                        info!("Device '{}': connected", name);
                        *ctx.borrow_mut() = Some(connected);
                    }
                    Err(e) => {
                        error!("Device '{}': {}", name, e);
                        if self.wait(interval) {
                            break;
                        }
                        continue;
                    }
                }
            }

            polls += 1;
            let heartbeat = device
                .heartbeat_polls
                .is_some_and(|every| every > 0 && polls % every == 0);

            let changes = poll_cycle(name, &mut ranges, heartbeat);
            debug!(
                "Device '{}': poll {} reported {} change(s)",
                name,
                polls,
                changes.len()
            );

            if self.wait(interval) {
                break;
            }
        }

        info!("Device '{}': watcher stopped", name);
    }

    /// Wait for `interval`. Returns `true` if shutdown was requested meanwhile.
    fn wait(&mut self, interval: Duration) -> bool {
        let shutdown = &mut self.shutdown;
        self.runtime.block_on(async {
            tokio::select! {
                _ = tokio::time::sleep(interval) => false,
                // A dropped sender also means shutdown.
                _ = shutdown.changed() => true,
            }
        })
    }
}
