//! 통합 테스트 공용 헬퍼: 프레임 생성, 캡처 파일 작성, 관리자 구성
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use etherparse::PacketBuilder;

use asterix_receiver::{
    BroadcastHub, IngestionPipeline, MemoryRecordStore, ReceiverManager, SourceOptions,
};

const SRC_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
const DST_MAC: [u8; 6] = [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb];

pub fn udp_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src, dst, 64)
        .udp(sport, dport);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();
    frame
}

pub fn tcp_frame(
    src: [u8; 4],
    dst: [u8; 4],
    sport: u16,
    dport: u16,
    syn: bool,
    payload: &[u8],
) -> Vec<u8> {
    let mut builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src, dst, 64)
        .tcp(sport, dport, 1, 65535);
    if syn {
        builder = builder.syn();
    } else {
        builder = builder.ack(1);
    }
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();
    frame
}

/// 리틀 엔디언 legacy pcap (Ethernet) 파일을 작성합니다.
pub fn write_pcap(dir: &Path, name: &str, frames: &[Vec<u8>]) -> PathBuf {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    for frame in frames {
        out.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(frame);
    }
    let path = dir.join(name);
    std::fs::write(&path, out).unwrap();
    path
}

/// 인터페이스 하나(Ethernet)짜리 pcapng 파일을 작성합니다.
pub fn write_pcapng(dir: &Path, name: &str, frames: &[Vec<u8>]) -> PathBuf {
    let mut out = Vec::new();
    for word in [0x0a0d0d0au32, 28, 0x1a2b3c4d] {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(-1i64).to_le_bytes());
    out.extend_from_slice(&28u32.to_le_bytes());

    for word in [1u32, 20] {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&20u32.to_le_bytes());

    for frame in frames {
        let padded = frame.len().div_ceil(4) * 4;
        let total = (32 + padded) as u32;
        for word in [6u32, total, 0, 0, 0, frame.len() as u32, frame.len() as u32] {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(frame);
        out.resize(out.len() + (padded - frame.len()), 0);
        out.extend_from_slice(&total.to_le_bytes());
    }

    let path = dir.join(name);
    std::fs::write(&path, out).unwrap();
    path
}

pub struct Harness {
    pub manager: Arc<ReceiverManager>,
    pub store: Arc<MemoryRecordStore>,
    pub hub: BroadcastHub,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryRecordStore::new());
    let hub = BroadcastHub::new(256);
    let pipeline = IngestionPipeline::new(store.clone(), Arc::new(hub.clone()));
    let options = SourceOptions {
        stop_timeout: Duration::from_secs(2),
        ..SourceOptions::default()
    };
    Harness {
        manager: Arc::new(ReceiverManager::new(pipeline, options)),
        store,
        hub,
    }
}

pub fn free_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// 조건이 참이 될 때까지 최대 `timeout` 동안 폴링합니다.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
