//! Error taxonomy for the radio bridge.
//!
//! Only [`RadioError::TransportUnavailable`] and [`RadioError::AlreadyClaimed`] are
//! fatal, and only at construction time. Everything else is recovered at the
//! [`RadioBridge`](crate::radio::RadioBridge) boundary: transaction failures leave the
//! cached status table untouched, unknown endpoints are logged and skipped, and a
//! malformed table size just forces a size re-query on the next access. A single
//! unreachable node must never disrupt control of the others.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RadioError {
    /// The underlying bus could not be opened. Fatal: callers must not proceed
    /// with an unopened transport, and there is no automatic retry.
    #[error("failed to open radio bus {port}: {source}")]
    TransportUnavailable {
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// A second handle to the same physical bus was requested. Opening the bus
    /// twice is undefined by the hardware, so this is refused outright.
    #[error("radio bus {port} is already claimed by another handle")]
    AlreadyClaimed { port: String },

    /// A bus read or write did not complete as expected (short read, device not
    /// responding). Non-fatal; cached state is preserved.
    #[error("bus transaction failed during {op}: {source}")]
    Transaction {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The device reported a status-table size of zero or one that is not a
    /// multiple of the 16-byte record size. Treated as "size unknown".
    #[error("device reported malformed status table size {0}")]
    MalformedStatusSize(usize),

    /// The network-config blob was shorter than the persistent context layout.
    #[error("network config blob too short: {got} bytes, need {need}")]
    MalformedNetconfig { got: usize, need: usize },

    /// The requested endpoint address is not present in the latest status table.
    #[error("endpoint {0:#010x} is not connected")]
    UnknownEndpoint(u32),
}
