//! # Radio Bridge Module
//!
//! Talks to the fleet of wireless valve-controller endpoints over one shared
//! half-duplex bus. [`RadioBridge`] is the process-wide coordinator the rest of
//! the system consumes: it owns the bus transport, keeps a time-bounded cache of
//! the decoded status table, serializes all bus access behind a single async
//! mutex, and funnels output writes through a per-endpoint debounce so a burst
//! of valve toggles becomes one bus command carrying the latest intent.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use valvelink::config::Config;
//! use valvelink::radio::RadioBridge;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let radio = RadioBridge::connect(&config)?;
//!
//!     for ep in radio.get_endpoints().await {
//!         if ep.occupied() {
//!             println!("{:#010x} outputs {:#04x}", ep.address, ep.output_state);
//!         }
//!     }
//!
//!     // Turn on valve 2 of an endpoint without clobbering its sibling valves
//!     radio.start_valve(0x1234_5677, 2).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! Web handlers, scheduler ticks, and plugin timers may all call in at once. One
//! non-reentrant `tokio::sync::Mutex` over the transport plus cached table keeps
//! bus transactions from interleaving; the write path resolves `address ->
//! link_id` with an already-locked helper instead of re-entering the guard. The
//! coalescer's timer tasks acquire the same guard only at fire time, so a slow
//! caller never holds the bus across a debounce window.
//!
//! ## Error policy
//!
//! Only a bus that cannot be opened is fatal, and only at construction. A failed
//! transaction leaves the cached table untouched and is logged; reads serve the
//! stale copy, writes are silently dropped in favor of the caller's next
//! request. An address missing from the status table logs "not connected" and
//! performs no bus write, so one unreachable node never aborts a batch of valve
//! commands for the others.

mod coalescer;
pub mod netconfig;
pub mod status;
pub mod transport;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, warn};
use tokio::time::Instant;

use crate::config::TimingConfig;
use crate::error::RadioError;
use self::coalescer::OutputCoalescer;
use self::netconfig::NetworkContext;
use self::status::{decode_status_table, StatusTable};
use self::transport::{BusLink, RadioPort, RainSensorKind};

/// Transport plus everything that must only change under the bus guard.
pub(crate) struct BusCore {
    pub(crate) port: RadioPort,
    table: StatusTable,
    fetched_at: Option<Instant>,
}

struct Shared {
    core: Arc<tokio::sync::Mutex<BusCore>>,
    coalescer: OutputCoalescer,
    /// Last *intended* output byte per endpoint address, as opposed to the last
    /// byte actually sent. Lets "turn on bit 2" merge with a still-pending
    /// "turn off bit 5" on the same endpoint. Grows lazily, never shrinks.
    intended: Mutex<HashMap<u32, u8>>,
    cache_ttl: Duration,
}

/// Coordinator for one physical radio bus. Cheap to clone; all clones share the
/// same bus guard, status cache, and debounce state.
#[derive(Clone)]
pub struct RadioBridge {
    shared: Arc<Shared>,
}

impl RadioBridge {
    /// Open the configured serial port and claim it. Fails immediately if the
    /// bus cannot be opened or is already claimed by another handle; there is no
    /// retry, and callers must not proceed without a bridge.
    #[cfg(feature = "serial")]
    pub fn connect(config: &crate::config::Config) -> Result<Self, RadioError> {
        let bus = transport::SerialBus::open(&config.radio.port, config.radio.baud_rate)?;
        Ok(Self::with_link(Box::new(bus), &config.timing))
    }

    /// Build a bridge over an already-open bus link. This is the dependency
    /// injection seam: tests hand in a scripted mock, `connect` hands in the
    /// serial port.
    pub fn with_link(link: Box<dyn BusLink>, timing: &TimingConfig) -> Self {
        let core = Arc::new(tokio::sync::Mutex::new(BusCore {
            port: RadioPort::new(link),
            table: StatusTable::new(),
            fetched_at: None,
        }));
        RadioBridge {
            shared: Arc::new(Shared {
                coalescer: OutputCoalescer::new(
                    Duration::from_millis(timing.write_debounce_ms),
                    Arc::clone(&core),
                ),
                core,
                intended: Mutex::new(HashMap::new()),
                cache_ttl: Duration::from_millis(timing.status_cache_ms),
            }),
        }
    }

    /// Re-fetch the status table if the cached copy has aged out. On a failed
    /// transaction the stale table is kept and the failure logged; the next
    /// caller retries.
    fn refresh_if_stale(&self, core: &mut BusCore) {
        let fresh = core
            .fetched_at
            .map_or(false, |at| at.elapsed() < self.shared.cache_ttl);
        if fresh {
            return;
        }
        match core.port.get_status() {
            Ok(raw) => {
                core.table = decode_status_table(&raw);
                core.fetched_at = Some(Instant::now());
            }
            Err(e) => warn!("status refresh failed, serving last known table: {}", e),
        }
    }

    fn find_link_id(core: &BusCore, address: u32) -> Option<u8> {
        core.table
            .iter()
            .find(|ep| ep.occupied() && ep.address == address)
            .map(|ep| ep.link_id)
    }

    /// Snapshot of the endpoint status table, at most one freshness window old.
    /// Never blocks longer than one bus round trip and never waits on an
    /// in-flight debounce timer.
    pub async fn get_endpoints(&self) -> StatusTable {
        let mut core = self.shared.core.lock().await;
        self.refresh_if_stale(&mut core);
        core.table.clone()
    }

    /// Request the full output byte for an endpoint. Resolves the endpoint's
    /// current `link_id` from the (possibly refreshed) status table, then hands
    /// the write to the coalescer rather than writing immediately. If the
    /// address is not connected the request is logged and dropped; it never
    /// blocks waiting for the endpoint to appear.
    pub async fn set_endpoint_output(&self, address: u32, output_state: u8) {
        debug!(
            "setting outputs of {:#010x} to {:#04x}",
            address, output_state
        );
        let link_id = {
            let mut core = self.shared.core.lock().await;
            self.refresh_if_stale(&mut core);
            Self::find_link_id(&core, address)
        };
        match link_id {
            Some(link_id) => self.shared.coalescer.request(link_id, output_state),
            None => error!("{:#010x} not connected", address),
        }
    }

    /// Set or clear one valve bit, preserving the other bits already commanded
    /// for that endpoint. All valve-level on/off operations must come through
    /// here so toggling one valve never clobbers a sibling valve sharing the
    /// same output byte.
    pub async fn set_output(&self, address: u32, valve: u8, on: bool) {
        if valve > 7 {
            warn!("valve index {} out of range for {:#010x}", valve, address);
            return;
        }
        let desired = {
            let mut intended = self.shared.intended.lock().unwrap();
            let byte = intended.entry(address).or_insert(0);
            if on {
                *byte |= 1 << valve;
            } else {
                *byte &= !(1 << valve);
            }
            *byte
        };
        self.set_endpoint_output(address, desired).await;
    }

    pub async fn start_valve(&self, address: u32, valve: u8) {
        self.set_output(address, valve, true).await;
    }

    pub async fn stop_valve(&self, address: u32, valve: u8) {
        self.set_output(address, valve, false).await;
    }

    /// Issue the device reset command and unconditionally invalidate the status
    /// cache so the next read re-fetches. Cached table sizes survive; the device
    /// does not renegotiate them on reset.
    pub async fn reset(&self) {
        let mut core = self.shared.core.lock().await;
        if let Err(e) = core.port.reset_device() {
            warn!("device reset failed: {}", e);
        }
        core.fetched_at = None;
    }

    /// Configure an endpoint's rain-sensor wiring. Administrative and low-rate,
    /// so it is written immediately rather than debounced.
    pub async fn set_rain_sensor(
        &self,
        address: u32,
        kind: RainSensorKind,
    ) -> Result<(), RadioError> {
        let mut core = self.shared.core.lock().await;
        self.refresh_if_stale(&mut core);
        let link_id =
            Self::find_link_id(&core, address).ok_or(RadioError::UnknownEndpoint(address))?;
        let ack = core.port.set_rain_sensor(link_id, kind)?;
        debug!("rain sensor ack for lid {}: {:#04x}", link_id, ack);
        Ok(())
    }

    /// Fetch and decode the device's persistent network context.
    pub async fn netconfig(&self) -> Result<NetworkContext, RadioError> {
        let mut core = self.shared.core.lock().await;
        let raw = core.port.get_netconfig()?;
        NetworkContext::decode(&raw)
    }

    /// Write a raw network-config blob back to the device.
    pub async fn write_netconfig(&self, config: &[u8]) -> Result<(), RadioError> {
        let mut core = self.shared.core.lock().await;
        core.port.set_netconfig(config)
    }

    /// Cancel all pending debounced writes without flushing them.
    pub fn shutdown(&self) {
        self.shared.coalescer.cancel_all();
    }
}
