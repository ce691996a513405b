//! 캡처 파일 수집 소스
//!
//! pcap/pcapng 파일을 처음부터 끝까지 한 번 재생합니다.
//! 각 패킷을 디코딩하여 필터를 적용하고, 전송 계층 페이로드(없으면 프레임 전체)를
//! 콜백에 전달합니다. 파일 끝에 도달하면 수동 정지와 같은 해제 경로를 거쳐
//! `Stopped(EndOfFile)` 상태가 됩니다.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use pcap_parser::pcapng::Block;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};
use tracing::{debug, info, warn};

use asterix_core::pipeline::BoxFuture;
use asterix_core::types::ReceiverMode;

use super::{
    IngestSource, PayloadCallback, SourceRuntime, SourceState, SourceStatsSnapshot, StopReason,
};
use crate::config::{CaptureReceiverConfig, SourceOptions};
use crate::decode::{LINKTYPE_ETHERNET, PacketView};
use crate::error::ReceiverError;
use crate::filter::PacketFilter;

/// pcap_parser 내부 버퍼 크기
const READER_BUFFER_SIZE: usize = 256 * 1024;

/// 캡처 파일 수집 소스
pub struct CaptureFileSource {
    config: CaptureReceiverConfig,
    options: SourceOptions,
    callback: PayloadCallback,
    runtime: Arc<SourceRuntime>,
}

impl CaptureFileSource {
    /// 새 소스를 생성합니다. 파일은 `start()`에서 열립니다.
    pub fn new(
        config: CaptureReceiverConfig,
        options: SourceOptions,
        callback: PayloadCallback,
    ) -> Self {
        Self {
            config,
            options,
            callback,
            runtime: Arc::new(SourceRuntime::new(ReceiverMode::Capture)),
        }
    }

    /// 소스 설정을 반환합니다.
    pub fn config(&self) -> &CaptureReceiverConfig {
        &self.config
    }

    async fn start_inner(&self) -> Result<(), ReceiverError> {
        self.runtime.ensure_startable()?;
        self.config.validate()?;

        let reader = CaptureReader::open(&self.config.file_path)?;
        let filter = PacketFilter::from_filter(self.config.filter());
        info!(
            path = %self.config.file_path.display(),
            format = reader.format_name(),
            filter = filter.kind(),
            "capture source replaying file"
        );

        self.runtime.mark_running();
        let runtime = Arc::clone(&self.runtime);
        let callback = Arc::clone(&self.callback);
        let task = tokio::task::spawn_blocking(move || replay(reader, filter, runtime, callback));
        self.runtime.attach_task(task);
        Ok(())
    }
}

impl IngestSource for CaptureFileSource {
    fn mode(&self) -> ReceiverMode {
        ReceiverMode::Capture
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ReceiverError>> {
        Box::pin(self.start_inner())
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.runtime
                .shutdown(self.options.stop_timeout, "capture")
                .await;
            info!(path = %self.config.file_path.display(), "capture source stopped");
        })
    }

    fn is_running(&self) -> bool {
        self.runtime.is_running()
    }

    fn state(&self) -> SourceState {
        self.runtime.state()
    }

    fn stats(&self) -> SourceStatsSnapshot {
        self.runtime.stats().snapshot()
    }
}

/// 블로킹 스레드에서 파일 끝 또는 취소까지 패킷을 재생합니다.
fn replay(
    mut reader: CaptureReader,
    filter: PacketFilter,
    runtime: Arc<SourceRuntime>,
    callback: PayloadCallback,
) {
    let cancel = runtime.cancel_token();
    let stats = Arc::clone(runtime.stats());

    let reason = loop {
        if cancel.is_cancelled() {
            break StopReason::Manual;
        }

        match reader.next_packet() {
            Ok(Some(packet)) => {
                stats.record_received();
                let view = PacketView::decode(packet.link_type, &packet.data);
                if !filter.matches(&view) {
                    stats.record_filtered();
                } else {
                    let payload = view.payload();
                    if !payload.is_empty() {
                        stats.record_emitted(payload.len());
                        callback(Bytes::copy_from_slice(payload));
                    }
                }
            }
            Ok(None) => break StopReason::EndOfFile,
            Err(e) => {
                // 손상된 블록 이후로는 경계를 신뢰할 수 없으므로 재생을 끝냄
                stats.record_error();
                warn!(error = %e, "capture file is truncated or corrupt, ending replay");
                break StopReason::EndOfFile;
            }
        }

        std::thread::yield_now();
    };

    let frames = reader.frames_read();
    drop(reader);
    runtime.mark_finished(reason);
    match reason {
        StopReason::EndOfFile => info!(frames, "capture replay reached end of file"),
        StopReason::Manual => debug!(frames, "capture replay cancelled"),
    }
}

/// 읽어들인 캡처 패킷
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    /// 링크 타입 (LINKTYPE_*)
    pub link_type: u32,
    /// 캡처된 프레임 바이트
    pub data: Vec<u8>,
}

/// pcap / pcapng 통합 리더
pub struct CaptureReader {
    inner: ReaderInner,
    frames: u64,
}

enum ReaderInner {
    Legacy {
        reader: LegacyPcapReader<File>,
        link_type: u32,
    },
    Ng {
        reader: PcapNGReader<File>,
        /// 인터페이스 ID별 링크 타입
        interfaces: Vec<u32>,
    },
}

impl CaptureReader {
    /// 매직 바이트로 형식을 판별하여 파일을 엽니다.
    pub fn open(path: &Path) -> Result<Self, ReceiverError> {
        let open_err = |reason: String| ReceiverError::CaptureOpen {
            path: path.display().to_string(),
            reason,
        };

        let mut file = File::open(path).map_err(|e| open_err(e.to_string()))?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .map_err(|e| open_err(format!("cannot read file header: {e}")))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| open_err(e.to_string()))?;

        let inner = match magic {
            [0x0a, 0x0d, 0x0d, 0x0a] => {
                let reader = PcapNGReader::new(READER_BUFFER_SIZE, file)
                    .map_err(|e| open_err(format!("invalid pcapng header: {e:?}")))?;
                ReaderInner::Ng {
                    reader,
                    interfaces: Vec::new(),
                }
            }
            [0xd4, 0xc3, 0xb2, 0xa1]
            | [0xa1, 0xb2, 0xc3, 0xd4]
            | [0x4d, 0x3c, 0xb2, 0xa1]
            | [0xa1, 0xb2, 0x3c, 0x4d] => {
                let reader = LegacyPcapReader::new(READER_BUFFER_SIZE, file)
                    .map_err(|e| open_err(format!("invalid pcap header: {e:?}")))?;
                ReaderInner::Legacy {
                    reader,
                    link_type: LINKTYPE_ETHERNET,
                }
            }
            other => {
                return Err(open_err(format!(
                    "unknown capture file magic {:02x}{:02x}{:02x}{:02x}",
                    other[0], other[1], other[2], other[3]
                )));
            }
        };

        Ok(Self { inner, frames: 0 })
    }

    /// 형식 이름 (pcap, pcapng)
    pub fn format_name(&self) -> &'static str {
        match self.inner {
            ReaderInner::Legacy { .. } => "pcap",
            ReaderInner::Ng { .. } => "pcapng",
        }
    }

    /// 지금까지 읽은 패킷 수
    pub fn frames_read(&self) -> u64 {
        self.frames
    }

    /// 다음 패킷을 읽습니다. 파일 끝이면 `Ok(None)`.
    pub fn next_packet(&mut self) -> Result<Option<CapturedPacket>, ReceiverError> {
        let packet = match &mut self.inner {
            ReaderInner::Legacy { reader, link_type } => next_legacy(reader, link_type)?,
            ReaderInner::Ng { reader, interfaces } => next_ng(reader, interfaces)?,
        };
        if packet.is_some() {
            self.frames += 1;
        }
        Ok(packet)
    }
}

fn next_legacy(
    reader: &mut LegacyPcapReader<File>,
    link_type: &mut u32,
) -> Result<Option<CapturedPacket>, ReceiverError> {
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let packet = match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        *link_type = header.network.0 as u32;
                        None
                    }
                    PcapBlockOwned::Legacy(record) => {
                        let caplen = (record.caplen as usize).min(record.data.len());
                        Some(CapturedPacket {
                            link_type: *link_type,
                            data: record.data[..caplen].to_vec(),
                        })
                    }
                    _ => None,
                };
                reader.consume(offset);
                if packet.is_some() {
                    return Ok(packet);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| ReceiverError::Capture(format!("pcap refill error: {e:?}")))?;
            }
            Err(e) => return Err(ReceiverError::Capture(format!("pcap parse error: {e:?}"))),
        }
    }
}

fn next_ng(
    reader: &mut PcapNGReader<File>,
    interfaces: &mut Vec<u32>,
) -> Result<Option<CapturedPacket>, ReceiverError> {
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let packet = match block {
                    PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                        interfaces.clear();
                        None
                    }
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        interfaces.push(idb.linktype.0 as u32);
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        let caplen = (epb.caplen as usize).min(epb.data.len());
                        Some(CapturedPacket {
                            link_type: interface_link_type(interfaces, epb.if_id as usize),
                            data: epb.data[..caplen].to_vec(),
                        })
                    }
                    PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                        let caplen = (spb.origlen as usize).min(spb.data.len());
                        Some(CapturedPacket {
                            link_type: interface_link_type(interfaces, 0),
                            data: spb.data[..caplen].to_vec(),
                        })
                    }
                    _ => None,
                };
                reader.consume(offset);
                if packet.is_some() {
                    return Ok(packet);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| ReceiverError::Capture(format!("pcapng refill error: {e:?}")))?;
            }
            Err(e) => {
                return Err(ReceiverError::Capture(format!("pcapng parse error: {e:?}")));
            }
        }
    }
}

fn interface_link_type(interfaces: &[u32], if_id: usize) -> u32 {
    interfaces.get(if_id).copied().unwrap_or(LINKTYPE_ETHERNET)
}
