//! Fixed-layout codec for the endpoint status table.
//!
//! The radio master reports one 16-byte block per endpoint slot, up to 48 slots.
//! Layout (all multi-byte fields little-endian, no padding):
//!
//! ```text
//! offset  0      link_id            u8   (0 = empty slot)
//! offset  1..5   address            u32  stable hardware id
//! offset  5      flags              bit0 = link_ok, bit1 = rain sensor active
//! offset  6      output_state       u8   bitmask, bit k = output k commanded on
//! offset  7      device_type/valves low nibble = hardware variant,
//!                                   high nibble = usable output count (<= 8)
//! offset  8      voltage raw        u8   volts = raw * 128 / 1000
//! offset  9..11  current            u16  raw sensor value
//! offset 11      temperature        u8   raw sensor value
//! offset 12      rssi_uplink        i8
//! offset 13      rssi_downlink      i8
//! offset 14..16  reserved
//! ```
//!
//! Decoding is a pure fixed-stride walk over the buffer: no per-field allocation,
//! no overlaying of raw memory as a struct. A trailing partial block is ignored.

use serde::{Deserialize, Serialize};

/// Size of one endpoint status block on the wire.
pub const RECORD_SIZE: usize = 16;

/// Maximum number of endpoint slots the radio master tracks.
pub const MAX_ENDPOINTS: usize = 48;

/// Decoded state of one endpoint slot.
///
/// `link_id` is a volatile slot index the network layer may reassign between
/// polls; `address` is the stable key consumers should use. Bits of
/// `output_state` above `valve_count` are undefined and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub link_id: u8,
    pub address: u32,
    pub link_ok: bool,
    pub rain_sensor_active: bool,
    pub output_state: u8,
    pub device_type: u8,
    pub valve_count: u8,
    pub voltage_raw: u8,
    pub current: u16,
    pub temperature: u8,
    pub rssi_uplink: i8,
    pub rssi_downlink: i8,
}

impl EndpointRecord {
    /// Supply voltage in volts, derived from the raw reading.
    pub fn voltage(&self) -> f32 {
        (self.voltage_raw as f32 * 128.0) / 1000.0
    }

    /// True if a node occupies this slot.
    pub fn occupied(&self) -> bool {
        self.link_id != 0
    }

    /// Decode one 16-byte block.
    pub fn decode(block: &[u8; RECORD_SIZE]) -> Self {
        EndpointRecord {
            link_id: block[0],
            address: u32::from_le_bytes([block[1], block[2], block[3], block[4]]),
            link_ok: block[5] & 0x01 != 0,
            rain_sensor_active: block[5] & 0x02 != 0,
            output_state: block[6],
            device_type: block[7] & 0x0f,
            valve_count: block[7] >> 4,
            voltage_raw: block[8],
            current: u16::from_le_bytes([block[9], block[10]]),
            temperature: block[11],
            rssi_uplink: block[12] as i8,
            rssi_downlink: block[13] as i8,
        }
    }

    /// Exact inverse of [`decode`](Self::decode). Used for test fixtures and
    /// simulated devices; reserved bytes encode as zero.
    pub fn encode(&self, block: &mut [u8; RECORD_SIZE]) {
        block.fill(0);
        block[0] = self.link_id;
        block[1..5].copy_from_slice(&self.address.to_le_bytes());
        block[5] = (self.link_ok as u8) | ((self.rain_sensor_active as u8) << 1);
        block[6] = self.output_state;
        block[7] = (self.device_type & 0x0f) | (self.valve_count << 4);
        block[8] = self.voltage_raw;
        block[9..11].copy_from_slice(&self.current.to_le_bytes());
        block[11] = self.temperature;
        block[12] = self.rssi_uplink as u8;
        block[13] = self.rssi_downlink as u8;
    }
}

/// Ordered sequence of endpoint slots, indexed by slot position.
pub type StatusTable = Vec<EndpointRecord>;

/// Decode a raw status buffer into a table.
///
/// Yields `min(len / 16, 48)` records; a trailing remainder shorter than one
/// block is ignored rather than rejected, which tolerates a device whose
/// reported table size later shrinks.
pub fn decode_status_table(raw: &[u8]) -> StatusTable {
    let count = (raw.len() / RECORD_SIZE).min(MAX_ENDPOINTS);
    let mut table = Vec::with_capacity(count);
    for slot in 0..count {
        let mut block = [0u8; RECORD_SIZE];
        block.copy_from_slice(&raw[slot * RECORD_SIZE..(slot + 1) * RECORD_SIZE]);
        table.push(EndpointRecord::decode(&block));
    }
    table
}

/// Encode a table back into a raw buffer, `16 * table.len()` bytes.
pub fn encode_status_table(table: &[EndpointRecord]) -> Vec<u8> {
    let mut raw = vec![0u8; table.len() * RECORD_SIZE];
    for (slot, record) in table.iter().enumerate() {
        let mut block = [0u8; RECORD_SIZE];
        record.encode(&mut block);
        raw[slot * RECORD_SIZE..(slot + 1) * RECORD_SIZE].copy_from_slice(&block);
    }
    raw
}
