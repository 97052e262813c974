//! Bus transport: the byte-level command protocol spoken to the radio master.
//!
//! The physical link is half-duplex request/response: every transaction writes a
//! command (always preceded by the `0x55` sentinel) and then, for read commands,
//! consumes the response before anything else may touch the bus. The transport
//! carries no business logic; serialization of access is the facade's job.
//!
//! Command set (multi-byte integers little-endian):
//!
//! | opcode | name                | request payload        | response           |
//! |--------|---------------------|------------------------|--------------------|
//! | 0x02   | reset device        | none                   | none               |
//! | 0x04   | set network config  | raw config bytes       | none               |
//! | 0x06   | set outputs         | link_id, output byte   | none               |
//! | 0x08   | set rain-sensor     | link_id, type byte     | 1 ack byte         |
//! | 0x0A   | get network config  | none                   | netconfig bytes    |
//! | 0x0C   | get status          | none                   | status bytes       |
//! | 0x10   | get status size     | none                   | 2 bytes, LE length |
//! | 0x12   | get netconfig size  | none                   | 2 bytes, LE length |
//!
//! Table sizes are queried lazily, once, and cached for the lifetime of the
//! connection. A reported size of zero is "not yet known" and triggers a
//! re-query on the next access, never a zero-length read.

use log::{debug, trace};

use crate::error::RadioError;
use crate::logutil::hex_preview;
use crate::radio::status::RECORD_SIZE;

const SENTINEL: u8 = 0x55;

const CMD_RESET: u8 = 0x02;
const CMD_SET_NETCONFIG: u8 = 0x04;
const CMD_SET_OUTPUTS: u8 = 0x06;
const CMD_SET_RAIN_SENSOR: u8 = 0x08;
const CMD_GET_NETCONFIG: u8 = 0x0a;
const CMD_GET_STATUS: u8 = 0x0c;
const CMD_GET_STATUS_SIZE: u8 = 0x10;
const CMD_GET_NETCONFIG_SIZE: u8 = 0x12;

/// Rain-sensor wiring variant for the 0x08 command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RainSensorKind {
    NotConnected,
    NormallyOpen,
    NormallyClosed,
}

impl RainSensorKind {
    pub fn type_byte(self) -> u8 {
        match self {
            RainSensorKind::NotConnected => 0x00,
            RainSensorKind::NormallyOpen => 0x01,
            RainSensorKind::NormallyClosed => 0x02,
        }
    }
}

/// Byte-level access to the physical bus. Implemented by [`SerialBus`] for real
/// hardware and by scripted mocks in tests. `recv` must fill the whole buffer or
/// fail; partial reads are a transaction failure, not a retry point.
pub trait BusLink: Send {
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<()>;
}

/// Protocol driver over a [`BusLink`]: frames commands, reads responses, and
/// caches the lazily-queried table sizes.
pub struct RadioPort {
    link: Box<dyn BusLink>,
    status_size: Option<usize>,
    netconfig_size: Option<usize>,
}

impl RadioPort {
    pub fn new(link: Box<dyn BusLink>) -> Self {
        RadioPort {
            link,
            status_size: None,
            netconfig_size: None,
        }
    }

    fn command(&mut self, op: &'static str, opcode: u8, payload: &[u8]) -> Result<(), RadioError> {
        let mut frame = Vec::with_capacity(2 + payload.len());
        frame.push(SENTINEL);
        frame.push(opcode);
        frame.extend_from_slice(payload);
        trace!("bus tx [{}]: {}", op, hex_preview(&frame, 16));
        self.link
            .send(&frame)
            .map_err(|source| RadioError::Transaction { op, source })
    }

    fn read_response(&mut self, op: &'static str, len: usize) -> Result<Vec<u8>, RadioError> {
        let mut buf = vec![0u8; len];
        self.link
            .recv(&mut buf)
            .map_err(|source| RadioError::Transaction { op, source })?;
        trace!("bus rx [{}]: {} bytes", op, buf.len());
        Ok(buf)
    }

    fn read_size(&mut self, op: &'static str) -> Result<usize, RadioError> {
        let raw = self.read_response(op, 2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]) as usize)
    }

    pub fn reset_device(&mut self) -> Result<(), RadioError> {
        debug!("reset_device");
        self.command("reset device", CMD_RESET, &[])
    }

    /// Status table size in bytes, queried from the device on first use and
    /// cached. A zero or non-record-multiple size leaves the cache empty so the
    /// next access re-queries.
    pub fn status_size(&mut self) -> Result<usize, RadioError> {
        if let Some(size) = self.status_size {
            return Ok(size);
        }
        self.command("get status size", CMD_GET_STATUS_SIZE, &[])?;
        let size = self.read_size("get status size")?;
        if size == 0 || size % RECORD_SIZE != 0 {
            return Err(RadioError::MalformedStatusSize(size));
        }
        debug!("status table size: {} bytes", size);
        self.status_size = Some(size);
        Ok(size)
    }

    /// Network-config blob size in bytes, lazily queried and cached like
    /// [`status_size`](Self::status_size).
    pub fn netconfig_size(&mut self) -> Result<usize, RadioError> {
        if let Some(size) = self.netconfig_size {
            return Ok(size);
        }
        self.command("get netconfig size", CMD_GET_NETCONFIG_SIZE, &[])?;
        let size = self.read_size("get netconfig size")?;
        if size == 0 {
            return Err(RadioError::Transaction {
                op: "get netconfig size",
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "device reported zero netconfig size",
                ),
            });
        }
        debug!("netconfig size: {} bytes", size);
        self.netconfig_size = Some(size);
        Ok(size)
    }

    /// One full status transaction: raw table bytes, length per the cached size.
    pub fn get_status(&mut self) -> Result<Vec<u8>, RadioError> {
        let size = self.status_size()?;
        self.command("get status", CMD_GET_STATUS, &[])?;
        self.read_response("get status", size)
    }

    pub fn get_netconfig(&mut self) -> Result<Vec<u8>, RadioError> {
        let size = self.netconfig_size()?;
        self.command("get netconfig", CMD_GET_NETCONFIG, &[])?;
        self.read_response("get netconfig", size)
    }

    pub fn set_netconfig(&mut self, config: &[u8]) -> Result<(), RadioError> {
        debug!("set_netconfig: {} bytes", config.len());
        self.command("set netconfig", CMD_SET_NETCONFIG, config)
    }

    pub fn set_outputs(&mut self, link_id: u8, output_state: u8) -> Result<(), RadioError> {
        debug!("set_outputs: lid {} output {:#04x}", link_id, output_state);
        self.command("set outputs", CMD_SET_OUTPUTS, &[link_id, output_state])
    }

    /// Returns the device's one-byte ack.
    pub fn set_rain_sensor(&mut self, link_id: u8, kind: RainSensorKind) -> Result<u8, RadioError> {
        debug!("set_rain_sensor: lid {} kind {:?}", link_id, kind);
        self.command(
            "set rain sensor",
            CMD_SET_RAIN_SENSOR,
            &[link_id, kind.type_byte()],
        )?;
        Ok(self.read_response("set rain sensor", 1)?[0])
    }
}

#[cfg(feature = "serial")]
pub use self::serial::SerialBus;

#[cfg(feature = "serial")]
mod serial {
    use super::BusLink;
    use crate::error::RadioError;
    use log::{debug, info};
    use serialport::SerialPort;
    use std::collections::HashSet;
    use std::io::{Read, Write};
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    /// Port paths currently owned by a live [`SerialBus`]. The hardware does not
    /// define the behavior of two simultaneous openers, so a second claim of the
    /// same path is refused at construction.
    fn claimed_ports() -> &'static Mutex<HashSet<String>> {
        static CLAIMED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
        CLAIMED.get_or_init(|| Mutex::new(HashSet::new()))
    }

    /// Serial-port implementation of [`BusLink`]. Exactly one instance per port
    /// path may exist at a time.
    pub struct SerialBus {
        port: Box<dyn SerialPort>,
        path: String,
    }

    impl SerialBus {
        pub fn open(path: &str, baud_rate: u32) -> Result<Self, RadioError> {
            {
                let mut claimed = claimed_ports().lock().unwrap();
                if !claimed.insert(path.to_string()) {
                    return Err(RadioError::AlreadyClaimed {
                        port: path.to_string(),
                    });
                }
            }

            info!("opening radio bus on {} at {} baud", path, baud_rate);
            let mut builder = serialport::new(path, baud_rate).timeout(Duration::from_millis(500));
            // Some USB serial adapters need explicit settings
            #[cfg(unix)]
            {
                builder = builder
                    .data_bits(serialport::DataBits::Eight)
                    .stop_bits(serialport::StopBits::One)
                    .parity(serialport::Parity::None);
            }
            let mut port = match builder.open() {
                Ok(port) => port,
                Err(e) => {
                    claimed_ports().lock().unwrap().remove(path);
                    return Err(RadioError::TransportUnavailable {
                        port: path.to_string(),
                        source: std::io::Error::new(std::io::ErrorKind::Other, e),
                    });
                }
            };

            // Wake the adapter and drop any buffered startup chatter
            let _ = port.write_data_terminal_ready(true);
            let _ = port.write_request_to_send(true);
            std::thread::sleep(Duration::from_millis(150));
            if let Ok(available) = port.bytes_to_read() {
                if available > 0 {
                    let mut purge = vec![0u8; available as usize];
                    let _ = port.read(&mut purge);
                    debug!("purged {} stale bytes from {}", available, path);
                }
            }

            Ok(SerialBus {
                port,
                path: path.to_string(),
            })
        }
    }

    impl BusLink for SerialBus {
        fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.port.write_all(bytes)?;
            self.port.flush()
        }

        fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
            self.port.read_exact(buf)
        }
    }

    impl Drop for SerialBus {
        fn drop(&mut self) {
            claimed_ports().lock().unwrap().remove(&self.path);
        }
    }
}
