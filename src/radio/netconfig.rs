//! Codec for the radio master's persistent network context blob.
//!
//! The 0x0A/0x04 commands move the device's network layer state as one opaque,
//! packed little-endian structure: a 5-byte header, store-and-forward bookkeeping
//! for up to 4 clients, and 49 connection slots of 12 bytes each (614 bytes
//! total). Decoding is explicit offset walking; the blob is never aliased as a
//! struct. Writing back uses the raw bytes unchanged, so only decode is needed.

use serde::Serialize;

use crate::error::RadioError;

const SF_CLIENT_SIZE: usize = 5;
const SF_CLIENTS: usize = 4;
const SF_INFO_SIZE: usize = 1 + SF_CLIENTS * SF_CLIENT_SIZE;
const CONNECTION_SIZE: usize = 12;
const CONNECTION_SLOTS: usize = 49;

/// Total size of the persistent context blob.
pub const NETCONFIG_SIZE: usize = 5 + SF_INFO_SIZE + CONNECTION_SLOTS * CONNECTION_SIZE;

/// Signal quality readings for one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RxMetrics {
    pub rssi: i8,
    pub lqi: u8,
}

/// One connection slot in the network layer's link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub conn_state: u8,
    pub hops_to_target: u8,
    pub ack_tid: u8,
    pub peer_addr: u32,
    pub signal: RxMetrics,
    pub port_rx: u8,
    pub port_tx: u8,
    pub link_id: u8,
}

impl ConnectionInfo {
    pub fn occupied(&self) -> bool {
        self.peer_addr != 0
    }

    fn decode(block: &[u8]) -> Self {
        ConnectionInfo {
            conn_state: block[0],
            hops_to_target: block[1],
            ack_tid: block[2],
            peer_addr: u32::from_le_bytes([block[3], block[4], block[5], block[6]]),
            signal: RxMetrics {
                rssi: block[7] as i8,
                lqi: block[8],
            },
            port_rx: block[9],
            port_tx: block[10],
            link_id: block[11],
        }
    }
}

/// Store-and-forward client bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreForwardClient {
    pub client_addr: u32,
    pub last_tid: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreForwardInfo {
    pub client_count: u8,
    pub clients: [StoreForwardClient; SF_CLIENTS],
}

/// Decoded persistent network context.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkContext {
    pub structure_version: u8,
    pub num_connections: u8,
    pub cur_next_link_port: u8,
    pub cur_max_reply_port: u8,
    pub next_link_id: u8,
    pub store_forward: StoreForwardInfo,
    pub connections: Vec<ConnectionInfo>,
}

impl NetworkContext {
    pub fn decode(raw: &[u8]) -> Result<Self, RadioError> {
        if raw.len() < NETCONFIG_SIZE {
            return Err(RadioError::MalformedNetconfig {
                got: raw.len(),
                need: NETCONFIG_SIZE,
            });
        }

        let mut clients = [StoreForwardClient {
            client_addr: 0,
            last_tid: 0,
        }; SF_CLIENTS];
        for (i, client) in clients.iter_mut().enumerate() {
            let at = 6 + i * SF_CLIENT_SIZE;
            client.client_addr =
                u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
            client.last_tid = raw[at + 4];
        }

        let conn_base = 5 + SF_INFO_SIZE;
        let connections = (0..CONNECTION_SLOTS)
            .map(|slot| {
                let at = conn_base + slot * CONNECTION_SIZE;
                ConnectionInfo::decode(&raw[at..at + CONNECTION_SIZE])
            })
            .collect();

        Ok(NetworkContext {
            structure_version: raw[0],
            num_connections: raw[1],
            cur_next_link_port: raw[2],
            cur_max_reply_port: raw[3],
            next_link_id: raw[4],
            store_forward: StoreForwardInfo {
                client_count: raw[5],
                clients,
            },
            connections,
        })
    }
}
