//! # Valvelink - Radio Bridge for Wireless Valve Controllers
//!
//! Valvelink drives a small fleet of wireless valve-controller endpoints over a
//! shared serial bus using a fixed binary command protocol. It decodes endpoint
//! status into structured records and issues debounced, serialized output-state
//! changes back to them.
//!
//! ## Features
//!
//! - **Binary Wire Protocol**: Sentinel-framed command/response exchange with the
//!   radio master, little-endian sizes queried lazily and cached per connection.
//! - **Status Caching**: Time-bounded cache of the decoded 48-slot status table;
//!   stale-but-valid data is served rather than blocking on a faulty bus.
//! - **Write Coalescing**: Per-endpoint debounce collapses bursts of valve
//!   toggles into a single bus write carrying the latest intent.
//! - **Serialized Bus Access**: One async guard over the half-duplex link keeps
//!   concurrent readers and writers from interleaving transactions.
//! - **Async Design**: Built with Tokio; debounce timers are cancellable tasks.
//!
//! ## Quick Start
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
//!     let endpoints = radio.get_endpoints().await;
//!     println!("{} slots", endpoints.len());
//!
//!     radio.start_valve(0x1234_5677, 2).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`radio`] - Device facade, bus transport, status/netconfig codecs, coalescer
//! - [`stations`] - Station index to endpoint-valve mapping for the scheduler
//! - [`config`] - Configuration management
//! - [`error`] - Bridge error taxonomy
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Scheduler / Web │ ← consumers (read status, set output)
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  RadioBridge    │ ← cache + bus guard + write coalescer
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  RadioPort      │ ← binary command protocol over the bus
//! └─────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod logutil;
pub mod radio;
pub mod stations;

pub use crate::error::RadioError;
pub use crate::radio::RadioBridge;
