//! Orchestrator integration tests.
//!
//! Tests the flow: config -> component assembly -> autostart -> ingestion -> shutdown.

use std::io::Write;
use std::net::UdpSocket;
use std::time::Duration;

use asterix_core::config::AsterixConfig;
use asterix_core::pipeline::RecordStore;
use asterix_core::types::ReceiverMode;
use asterix_daemon::orchestrator::Orchestrator;

fn free_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn udp_autostart_config(port: u16) -> AsterixConfig {
    let toml_str = format!(
        r#"
[receiver]
autostart = "udp"

[receiver.udp]
port = {port}
bind_address = "127.0.0.1"
"#
    );
    AsterixConfig::parse(&toml_str).expect("failed to parse udp config")
}

/// Ethernet/IPv4/UDP frame wrapped in a single-record pcap file.
fn single_packet_pcap(payload: &[u8]) -> tempfile::NamedTempFile {
    let mut udp = Vec::new();
    udp.extend_from_slice(&4000u16.to_be_bytes());
    udp.extend_from_slice(&8600u16.to_be_bytes());
    udp.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    udp.extend_from_slice(&[0, 0]);
    udp.extend_from_slice(payload);

    let mut frame = vec![0xff; 6];
    frame.extend_from_slice(&[0, 1, 2, 3, 4, 5, 0x08, 0x00]);
    frame.extend_from_slice(&[0x45, 0]);
    frame.extend_from_slice(&((20 + udp.len()) as u16).to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0x40, 0, 64, 17, 0, 0, 10, 0, 0, 1, 10, 0, 0, 2]);
    frame.extend_from_slice(&udp);

    let mut file = tempfile::Builder::new().suffix(".pcap").tempfile().unwrap();
    file.write_all(&[0xd4, 0xc3, 0xb2, 0xa1, 2, 0, 4, 0]).unwrap();
    file.write_all(&[0; 8]).unwrap();
    file.write_all(&65535u32.to_le_bytes()).unwrap();
    file.write_all(&1u32.to_le_bytes()).unwrap();
    file.write_all(&[0; 8]).unwrap();
    file.write_all(&(frame.len() as u32).to_le_bytes()).unwrap();
    file.write_all(&(frame.len() as u32).to_le_bytes()).unwrap();
    file.write_all(&frame).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_default_config_stays_idle() {
    let orchestrator = Orchestrator::build_from_config(AsterixConfig::default()).unwrap();

    assert_eq!(orchestrator.autostart().await.unwrap(), None);
    assert_eq!(orchestrator.manager().status().mode, None);
}

#[tokio::test]
async fn test_udp_autostart_ingests_datagrams() {
    // Given: UDP autostart on a free local port
    let port = free_port();
    let orchestrator = Orchestrator::build_from_config(udp_autostart_config(port)).unwrap();
    let mut records = orchestrator.hub().subscribe();

    // When: The receiver autostarts and a datagram arrives
    assert_eq!(
        orchestrator.autostart().await.unwrap(),
        Some(ReceiverMode::Udp)
    );
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender
        .send_to(br#"{"type":"plot","message":"hi"}"#, ("127.0.0.1", port))
        .unwrap();

    // Then: The record is broadcast and stored
    let record = tokio::time::timeout(Duration::from_secs(5), records.recv())
        .await
        .expect("record should arrive")
        .unwrap();
    assert_eq!(record.metadata, "Type: plot, Message: hi, Properties: 2");
    assert_eq!(orchestrator.store().count(), 1);

    // And: shutdown releases the port
    orchestrator.shutdown().await;
    assert!(!orchestrator.manager().is_running());
    assert!(UdpSocket::bind(("127.0.0.1", port)).is_ok());
}

#[tokio::test]
async fn test_capture_autostart_replays_file() {
    let capture = single_packet_pcap(br#"{"seq":1}"#);
    let mut config = AsterixConfig::default();
    config.receiver.autostart = "capture".to_owned();
    config.receiver.capture.file_path = capture.path().display().to_string();
    config.receiver.capture.filter = "udp.port == 8600".to_owned();

    let orchestrator = Orchestrator::build_from_config(config).unwrap();
    orchestrator.autostart().await.unwrap();

    let mut stopped = false;
    for _ in 0..500 {
        if !orchestrator.manager().status().running {
            stopped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stopped, "capture replay should stop at end of file");
    assert_eq!(orchestrator.store().count(), 1);
    assert_eq!(orchestrator.store().list()[0].data["seq"], 1);
}

#[tokio::test]
async fn test_capture_autostart_with_missing_file_fails() {
    let mut config = AsterixConfig::default();
    config.receiver.autostart = "capture".to_owned();
    config.receiver.capture.file_path = "/nonexistent/replay.pcap".to_owned();

    let orchestrator = Orchestrator::build_from_config(config).unwrap();
    let err = orchestrator.autostart().await.unwrap_err();

    assert!(err.to_string().contains("CAPTURE"));
    assert_eq!(orchestrator.manager().status().mode, None);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_build() {
    let mut config = AsterixConfig::default();
    config.receiver.autostart = "tcp".to_owned();

    assert!(Orchestrator::build_from_config(config).is_err());
}

#[tokio::test]
async fn test_store_respects_max_records() {
    let port = free_port();
    let mut config = udp_autostart_config(port);
    config.storage.max_records = 2;

    let orchestrator = Orchestrator::build_from_config(config).unwrap();
    orchestrator.autostart().await.unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    for n in 0..5 {
        sender
            .send_to(format!(r#"{{"n":{n}}}"#).as_bytes(), ("127.0.0.1", port))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    for _ in 0..200 {
        let last = orchestrator
            .store()
            .list()
            .last()
            .map(|r| r.data["n"].clone());
        if last == Some(serde_json::json!(4)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(orchestrator.store().count(), 2);

    orchestrator.shutdown().await;
}
