//! Facade behavior: status caching, address resolution, logical bit mapping,
//! and error recovery, all against the scripted mock bus.

mod common;

use common::{endpoint, timing, LogRecorder, MockBus};
use tokio::time::{advance, sleep, Duration};
use valvelink::radio::status::EndpointRecord;
use valvelink::radio::transport::RainSensorKind;
use valvelink::radio::RadioBridge;
use valvelink::RadioError;

const EP: u32 = 0x1234_5677;

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn status_is_cached_within_freshness_window() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    let radio = RadioBridge::with_link(bus.link(), &timing(500, 150));

    let first = radio.get_endpoints().await;
    let second = radio.get_endpoints().await;
    assert_eq!(first, second);
    assert_eq!(bus.status_fetches(), 1);

    advance(Duration::from_millis(600)).await;
    radio.get_endpoints().await;
    assert_eq!(bus.status_fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_serves_stale_table() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    let radio = RadioBridge::with_link(bus.link(), &timing(500, 150));

    let fresh = radio.get_endpoints().await;
    assert_eq!(fresh.len(), 1);

    advance(Duration::from_millis(600)).await;
    bus.fail_status_reads(true);
    let stale = radio.get_endpoints().await;
    assert_eq!(stale, fresh);
    assert_eq!(bus.status_fetches(), 2);

    // Still retrying on each read while the fault persists
    radio.get_endpoints().await;
    assert_eq!(bus.status_fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_reported_size_forces_requery_not_crash() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    bus.report_zero_status_size(true);
    let radio = RadioBridge::with_link(bus.link(), &timing(500, 150));

    assert!(radio.get_endpoints().await.is_empty());

    bus.report_zero_status_size(false);
    let table = radio.get_endpoints().await;
    assert_eq!(table.len(), 1);
    // Size was asked twice: the zero answer was never cached
    let size_queries = bus.sent().iter().filter(|f| f[1] == 0x10).count();
    assert_eq!(size_queries, 2);
}

#[tokio::test(start_paused = true)]
async fn unknown_address_performs_no_bus_write() {
    let recorder = LogRecorder::install();
    // A full table of 48 empty slots
    let bus = MockBus::with_table(vec![EndpointRecord::default(); 48]);
    let radio = RadioBridge::with_link(bus.link(), &timing(500, 150));

    let table = radio.get_endpoints().await;
    assert_eq!(table.len(), 48);
    assert!(table.iter().all(|ep| ep.link_id == 0));

    radio.set_endpoint_output(EP, 0x01).await;
    sleep(Duration::from_millis(300)).await;
    settle().await;

    assert!(bus.set_outputs().is_empty());
    assert!(bus.sent().iter().all(|f| f[1] != 0x06));
    // Exactly one diagnostic for the dropped request
    let diagnostics = recorder.lines_at(log::Level::Error, "0x12345677 not connected");
    assert_eq!(diagnostics.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn valve_bits_merge_within_one_debounce_window() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    let radio = RadioBridge::with_link(bus.link(), &timing(500, 150));

    radio.set_output(EP, 2, true).await;
    radio.set_output(EP, 0, true).await;

    sleep(Duration::from_millis(200)).await;
    settle().await;

    assert_eq!(bus.set_outputs(), vec![(5, 0x05)]);
}

#[tokio::test(start_paused = true)]
async fn clearing_one_valve_preserves_its_siblings() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    let radio = RadioBridge::with_link(bus.link(), &timing(5_000, 150));

    radio.start_valve(EP, 2).await;
    radio.start_valve(EP, 0).await;
    sleep(Duration::from_millis(200)).await;
    settle().await;

    radio.stop_valve(EP, 2).await;
    sleep(Duration::from_millis(200)).await;
    settle().await;

    assert_eq!(bus.set_outputs(), vec![(5, 0x05), (5, 0x01)]);
}

#[tokio::test(start_paused = true)]
async fn out_of_range_valve_index_is_rejected_without_traffic() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    let radio = RadioBridge::with_link(bus.link(), &timing(500, 150));

    radio.set_output(EP, 8, true).await;
    sleep(Duration::from_millis(300)).await;
    settle().await;
    assert!(bus.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reset_invalidates_the_status_cache() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    let radio = RadioBridge::with_link(bus.link(), &timing(60_000, 150));

    radio.get_endpoints().await;
    radio.get_endpoints().await;
    assert_eq!(bus.status_fetches(), 1);

    radio.reset().await;
    assert_eq!(bus.resets(), 1);

    radio.get_endpoints().await;
    assert_eq!(bus.status_fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn rain_sensor_resolves_link_id_and_consumes_ack() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    let radio = RadioBridge::with_link(bus.link(), &timing(500, 150));

    radio
        .set_rain_sensor(EP, RainSensorKind::NormallyOpen)
        .await
        .unwrap();
    assert_eq!(bus.rain_sensor_writes(), vec![(5, 0x01)]);

    let missing = radio
        .set_rain_sensor(0xdead_beef, RainSensorKind::NotConnected)
        .await;
    assert!(matches!(missing, Err(RadioError::UnknownEndpoint(0xdead_beef))));
}

#[tokio::test(start_paused = true)]
async fn netconfig_round_trips_through_the_device() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    let mut blob = vec![0u8; 614];
    blob[0] = 2; // structure version
    blob[1] = 1;
    let base = 5 + 21;
    blob[base + 3..base + 7].copy_from_slice(&EP.to_le_bytes());
    blob[base + 11] = 5;
    bus.set_netconfig(blob);

    let radio = RadioBridge::with_link(bus.link(), &timing(500, 150));
    let context = radio.netconfig().await.unwrap();
    assert_eq!(context.structure_version, 2);
    assert_eq!(context.connections[0].peer_addr, EP);
    assert_eq!(context.connections[0].link_id, 5);
}

#[tokio::test(start_paused = true)]
async fn link_id_reassignment_between_polls_follows_the_address() {
    let bus = MockBus::with_table(vec![endpoint(5, EP, 4)]);
    let radio = RadioBridge::with_link(bus.link(), &timing(500, 150));

    radio.set_endpoint_output(EP, 0x01).await;
    sleep(Duration::from_millis(200)).await;
    settle().await;

    // Network layer moved the node to a different slot
    bus.set_table(vec![endpoint(9, EP, 4)]);
    advance(Duration::from_millis(600)).await;

    radio.set_endpoint_output(EP, 0x03).await;
    sleep(Duration::from_millis(200)).await;
    settle().await;

    assert_eq!(bus.set_outputs(), vec![(5, 0x01), (9, 0x03)]);
}
