//! Test utilities: a scripted in-memory bus standing in for the radio master.
//!
//! The mock answers commands the way the device does (status size, status table,
//! netconfig, rain-sensor ack) and asserts the half-duplex framing contract: a
//! new command while response bytes are still owed means two transactions
//! interleaved, which the real bus cannot survive.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, OnceLock};

use log::{Level, Log, Metadata, Record};

use valvelink::config::TimingConfig;
use valvelink::radio::status::{encode_status_table, EndpointRecord};
use valvelink::radio::transport::BusLink;

const SENTINEL: u8 = 0x55;

#[derive(Default)]
struct MockState {
    table: Vec<EndpointRecord>,
    netconfig: Vec<u8>,
    sent: Vec<Vec<u8>>,
    set_outputs: Vec<(u8, u8)>,
    rain_sensor: Vec<(u8, u8)>,
    resets: usize,
    status_fetches: usize,
    fail_status_reads: bool,
    report_zero_status_size: bool,
    response: VecDeque<u8>,
}

/// Cloneable handle to the mock device. Hand `link()` to the bridge, keep the
/// handle for assertions. Keep the table length constant within a test: the
/// bridge caches the first reported size for the connection's lifetime.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

#[allow(dead_code)]
impl MockBus {
    pub fn with_table(table: Vec<EndpointRecord>) -> Self {
        let bus = MockBus::default();
        bus.state.lock().unwrap().table = table;
        bus
    }

    pub fn link(&self) -> Box<dyn BusLink> {
        Box::new(self.clone())
    }

    pub fn set_table(&self, table: Vec<EndpointRecord>) {
        self.state.lock().unwrap().table = table;
    }

    pub fn set_netconfig(&self, blob: Vec<u8>) {
        self.state.lock().unwrap().netconfig = blob;
    }

    pub fn fail_status_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_status_reads = fail;
    }

    pub fn report_zero_status_size(&self, zero: bool) {
        self.state.lock().unwrap().report_zero_status_size = zero;
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Decoded (link_id, output_byte) pairs from every 0x06 command, in order.
    pub fn set_outputs(&self) -> Vec<(u8, u8)> {
        self.state.lock().unwrap().set_outputs.clone()
    }

    pub fn rain_sensor_writes(&self) -> Vec<(u8, u8)> {
        self.state.lock().unwrap().rain_sensor.clone()
    }

    pub fn status_fetches(&self) -> usize {
        self.state.lock().unwrap().status_fetches
    }

    pub fn resets(&self) -> usize {
        self.state.lock().unwrap().resets
    }
}

impl BusLink for MockBus {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut st = self.state.lock().unwrap();
        assert!(
            st.response.is_empty(),
            "command sent while a response was still owed (interleaved transaction)"
        );
        assert!(bytes.len() >= 2, "runt frame: {:?}", bytes);
        assert_eq!(bytes[0], SENTINEL, "frame missing 0x55 sentinel");
        st.sent.push(bytes.to_vec());
        match bytes[1] {
            0x02 => st.resets += 1,
            0x04 => st.netconfig = bytes[2..].to_vec(),
            0x06 => st.set_outputs.push((bytes[2], bytes[3])),
            0x08 => {
                st.rain_sensor.push((bytes[2], bytes[3]));
                st.response.push_back(0x01);
            }
            0x0a => {
                let blob = st.netconfig.clone();
                st.response.extend(blob);
            }
            0x0c => {
                st.status_fetches += 1;
                if !st.fail_status_reads {
                    let raw = encode_status_table(&st.table);
                    st.response.extend(raw);
                }
            }
            0x10 => {
                let size = if st.report_zero_status_size {
                    0u16
                } else {
                    (st.table.len() * 16) as u16
                };
                st.response.extend(size.to_le_bytes());
            }
            0x12 => {
                let size = st.netconfig.len() as u16;
                st.response.extend(size.to_le_bytes());
            }
            other => panic!("unknown opcode {:#04x}", other),
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.response.len() < buf.len() {
            st.response.clear();
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "mock device went quiet",
            ));
        }
        for slot in buf.iter_mut() {
            *slot = st.response.pop_front().unwrap();
        }
        Ok(())
    }
}

/// In-memory sink for everything the bridge logs. `log::set_logger` is
/// once-per-process, so a single recorder is shared by all tests in the binary;
/// filter captured lines by a message fragment unique to the scenario.
#[derive(Clone, Default)]
pub struct LogRecorder {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

#[allow(dead_code)]
impl LogRecorder {
    pub fn install() -> &'static LogRecorder {
        static RECORDER: OnceLock<LogRecorder> = OnceLock::new();
        RECORDER.get_or_init(|| {
            let recorder = LogRecorder::default();
            log::set_boxed_logger(Box::new(recorder.clone()))
                .expect("another logger is already installed");
            log::set_max_level(log::LevelFilter::Trace);
            recorder
        })
    }

    pub fn lines_at(&self, level: Level, containing: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, msg)| *l == level && msg.contains(containing))
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl Log for LogRecorder {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.lines
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

#[allow(dead_code)]
pub fn timing(status_cache_ms: u64, write_debounce_ms: u64) -> TimingConfig {
    TimingConfig {
        status_cache_ms,
        write_debounce_ms,
    }
}

/// An occupied endpoint slot with the given link id and address.
#[allow(dead_code)]
pub fn endpoint(link_id: u8, address: u32, valve_count: u8) -> EndpointRecord {
    EndpointRecord {
        link_id,
        address,
        link_ok: true,
        valve_count,
        ..Default::default()
    }
}
