//! Station-to-endpoint mapping: the shim between the scheduler's linear station
//! indexing and "bit N of endpoint X's output byte". All writes go through
//! [`RadioBridge::set_output`](crate::radio::RadioBridge::set_output) so sibling
//! valves on the same endpoint never clobber each other.

use std::collections::HashMap;

use log::warn;

use crate::config::StationConfig;
use crate::radio::RadioBridge;

/// Ordered station table. Index = station number as the scheduler sees it.
#[derive(Debug, Clone, Default)]
pub struct StationMap {
    mapping: Vec<(u32, u8)>,
    endpoint_names: HashMap<u32, String>,
}

impl StationMap {
    pub fn from_config(entries: &[StationConfig]) -> Self {
        let mut map = StationMap::default();
        for entry in entries {
            map.mapping.push((entry.address, entry.valve));
            if let Some(name) = &entry.name {
                map.endpoint_names
                    .entry(entry.address)
                    .or_insert_with(|| name.clone());
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// `(endpoint address, valve bit)` for a station index.
    pub fn get(&self, index: usize) -> Option<(u32, u8)> {
        self.mapping.get(index).copied()
    }

    pub fn endpoint_name(&self, address: u32) -> Option<&str> {
        self.endpoint_names.get(&address).map(String::as_str)
    }

    /// Push a full desired-state vector through the bridge: station `i` active
    /// iff `active[i]`. Stations beyond the vector are turned off. Unknown
    /// station indices are skipped with a warning rather than aborting the
    /// batch.
    pub async fn apply(&self, radio: &RadioBridge, active: &[bool]) {
        if active.len() > self.mapping.len() {
            warn!(
                "{} active states for {} mapped stations",
                active.len(),
                self.mapping.len()
            );
        }
        for (index, (address, valve)) in self.mapping.iter().enumerate() {
            let on = active.get(index).copied().unwrap_or(false);
            radio.set_output(*address, *valve, on).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;

    fn entries() -> Vec<StationConfig> {
        vec![
            StationConfig {
                address: 0x1234_5677,
                valve: 0,
                name: Some("North field".to_string()),
            },
            StationConfig {
                address: 0x1234_5677,
                valve: 1,
                name: None,
            },
            StationConfig {
                address: 0x1234_5674,
                valve: 0,
                name: Some("South field".to_string()),
            },
        ]
    }

    #[test]
    fn maps_station_index_to_endpoint_and_valve() {
        let map = StationMap::from_config(&entries());
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(1), Some((0x1234_5677, 1)));
        assert_eq!(map.get(2), Some((0x1234_5674, 0)));
        assert_eq!(map.get(9), None);
    }

    #[test]
    fn first_name_per_endpoint_wins() {
        let map = StationMap::from_config(&entries());
        assert_eq!(map.endpoint_name(0x1234_5677), Some("North field"));
        assert_eq!(map.endpoint_name(0x1234_5674), Some("South field"));
        assert_eq!(map.endpoint_name(0xdead_beef), None);
    }
}
