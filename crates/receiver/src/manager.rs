//! 수신기 관리자 -- 단일 활성 슬롯의 시작/정지/교체
//!
//! [`ReceiverManager`]는 한 번에 하나의 수집 소스만 소유합니다.
//!
//! # 동시성
//! - `lifecycle` (비동기 뮤텍스): start/stop을 직렬화합니다. 이전 소스 정지를
//!   기다리는 동안 보유하므로, 동시에 두 소스가 실행되는 구간이 없습니다.
//! - `slot` (동기 뮤텍스): 포인터 교체 동안에만 잠급니다. I/O 중에는 잡지 않으므로
//!   느린 정지가 `status()` 조회를 막지 않습니다.
//!
//! # 시작 순서
//! 1. 설정 검증 (실패 시 리소스를 건드리지 않음)
//! 2. 슬롯을 비우고, 잠금 밖에서 이전 소스를 정지
//! 3. 새 소스 생성 및 파이프라인 콜백 연결
//! 4. 슬롯에 설치 후 시작
//! 5. 시작 실패 시 슬롯을 Idle로 되돌리고 소스를 해제

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use asterix_core::metrics as m;
use asterix_core::types::ReceiverMode;

use crate::config::{CaptureReceiverConfig, ReceiverConfig, SourceOptions, UdpReceiverConfig};
use crate::error::ReceiverError;
use crate::pipeline::IngestionPipeline;
use crate::source::{CaptureFileSource, IngestSource, SocketSource, SourceStatsSnapshot};

/// 슬롯이 비어 있을 때의 상태 이름
const IDLE_STATE: &str = "idle";

/// `stop()` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// 실행 중이던 수신기를 정지함
    Stopped,
    /// 실행 중인 수신기가 없었음
    NotRunning,
}

/// 수신기 상태 스냅샷
///
/// 조회할 때마다 슬롯 잠금 아래에서 새로 계산됩니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverStatus {
    /// 활성 모드 (없으면 None)
    pub mode: Option<ReceiverMode>,
    /// 소스가 실제로 수신 중인지 여부
    pub running: bool,
    /// 활성 설정
    pub config: Option<ReceiverConfig>,
    /// 소스 상태 이름 (idle, configured, running, stopped, stopped_eof)
    pub state: &'static str,
    /// 소스 통계
    pub stats: Option<SourceStatsSnapshot>,
}

impl ReceiverStatus {
    fn idle() -> Self {
        Self {
            mode: None,
            running: false,
            config: None,
            state: IDLE_STATE,
            stats: None,
        }
    }
}

struct ActiveReceiver {
    config: ReceiverConfig,
    source: Arc<dyn IngestSource>,
}

/// 수신기 관리자
pub struct ReceiverManager {
    pipeline: IngestionPipeline,
    options: SourceOptions,
    lifecycle: tokio::sync::Mutex<()>,
    slot: Mutex<Option<ActiveReceiver>>,
}

impl ReceiverManager {
    /// 새 관리자를 생성합니다. 슬롯은 비어 있습니다.
    pub fn new(pipeline: IngestionPipeline, options: SourceOptions) -> Self {
        Self {
            pipeline,
            options,
            lifecycle: tokio::sync::Mutex::new(()),
            slot: Mutex::new(None),
        }
    }

    /// 연결된 수집 파이프라인
    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    /// UDP 수신을 시작합니다. 기존 수신기는 먼저 정지됩니다.
    pub async fn start_udp(&self, config: UdpReceiverConfig) -> Result<(), ReceiverError> {
        self.start(ReceiverConfig::Udp(config)).await
    }

    /// 캡처 파일 재생을 시작합니다. 기존 수신기는 먼저 정지됩니다.
    pub async fn start_capture(&self, config: CaptureReceiverConfig) -> Result<(), ReceiverError> {
        self.start(ReceiverConfig::Capture(config)).await
    }

    /// 설정의 모드로 수신을 시작합니다.
    ///
    /// 설정 에러는 기존 수신기를 건드리지 않고 반환됩니다.
    /// 리소스 획득 에러는 슬롯을 Idle로 되돌린 뒤 반환됩니다.
    pub async fn start(&self, config: ReceiverConfig) -> Result<(), ReceiverError> {
        let mode = config.mode();
        if let Err(e) = config.validate() {
            record_start(mode, false);
            return Err(e);
        }

        let _guard = self.lifecycle.lock().await;

        // 슬롯 락은 교체 동안만 잡고, 이전 소스 정지는 락 밖에서 기다림
        let previous = self.lock_slot().take();
        if let Some(previous) = previous {
            release(previous).await;
        }

        let source = self.build_source(&config);
        *self.lock_slot() = Some(ActiveReceiver {
            config: config.clone(),
            source: Arc::clone(&source),
        });

        match source.start().await {
            Ok(()) => {
                record_start(mode, true);
                info!(mode = %mode, "receiver started");
                Ok(())
            }
            Err(e) => {
                self.rollback(&source);
                source.stop().await;
                record_start(mode, false);
                warn!(mode = %mode, error = %e, "receiver failed to start");
                Err(e)
            }
        }
    }

    /// 활성 수신기를 정지하고 슬롯을 비웁니다.
    ///
    /// 슬롯이 비어 있거나 소스가 이미 스스로 끝난 경우(EOF) `NotRunning`을 반환합니다.
    pub async fn stop(&self) -> StopOutcome {
        let _guard = self.lifecycle.lock().await;

        let taken = self.lock_slot().take();
        let Some(active) = taken else {
            debug!("stop requested with no active receiver");
            return StopOutcome::NotRunning;
        };

        let was_running = active.source.is_running();
        let mode = active.config.mode();
        release(active).await;

        if was_running {
            info!(mode = %mode, "receiver stopped");
            StopOutcome::Stopped
        } else {
            debug!(mode = %mode, "cleared receiver that had already finished");
            StopOutcome::NotRunning
        }
    }

    /// 현재 상태 스냅샷을 반환합니다. 블록하지 않습니다.
    pub fn status(&self) -> ReceiverStatus {
        let slot = self.lock_slot();
        match slot.as_ref() {
            None => ReceiverStatus::idle(),
            Some(active) => ReceiverStatus {
                mode: Some(active.config.mode()),
                running: active.source.is_running(),
                config: Some(active.config.clone()),
                state: active.source.state().name(),
                stats: Some(active.source.stats()),
            },
        }
    }

    /// 수신 중인지 여부
    pub fn is_running(&self) -> bool {
        self.lock_slot()
            .as_ref()
            .is_some_and(|active| active.source.is_running())
    }

    fn build_source(&self, config: &ReceiverConfig) -> Arc<dyn IngestSource> {
        let callback = self.pipeline.callback();
        let options = self.options.clone();
        match config {
            ReceiverConfig::Udp(cfg) => Arc::new(SocketSource::new(cfg.clone(), options, callback)),
            ReceiverConfig::Capture(cfg) => {
                Arc::new(CaptureFileSource::new(cfg.clone(), options, callback))
            }
        }
    }

    /// 시작에 실패한 소스가 아직 슬롯에 있으면 비웁니다.
    fn rollback(&self, failed: &Arc<dyn IngestSource>) {
        let mut slot = self.lock_slot();
        if slot
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(&active.source, failed))
        {
            *slot = None;
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<ActiveReceiver>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 이전 소스를 정지합니다. 실패는 소스 내부에서 로그로 남습니다.
async fn release(active: ActiveReceiver) {
    let mode = active.config.mode();
    active.source.stop().await;
    debug!(mode = %mode, state = active.source.state().name(), "previous receiver released");
}

fn record_start(mode: ReceiverMode, success: bool) {
    metrics::counter!(
        m::RECEIVER_STARTS_TOTAL,
        m::LABEL_MODE => mode.as_label(),
        m::LABEL_RESULT => if success { "success" } else { "failure" }
    )
    .increment(1);
}
