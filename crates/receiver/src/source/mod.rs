//! 수집 소스 -- 원시 페이로드를 생산하는 UDP 소켓 / 캡처 파일 소스
//!
//! # 소스 종류
//! - [`SocketSource`]: UDP 소켓 수신 (멀티캐스트 가입 선택)
//! - [`CaptureFileSource`]: pcap/pcapng 파일 재생, EOF 도달 시 자동 정지
//!
//! # 생명주기
//! ```text
//! Configured → start() → Running → stop() / EOF → Stopped(Manual | EndOfFile)
//! ```
//!
//! 설정은 생성 시점에 주어지며, 한 번 정지한 소스는 재사용하지 않습니다.
//! 각 소스는 자체 백그라운드 태스크에서 동작하며 페이로드마다
//! 등록된 [`PayloadCallback`]을 동기적으로 호출합니다.

pub mod capture;
pub mod socket;

pub use capture::CaptureFileSource;
pub use socket::SocketSource;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use asterix_core::metrics as m;
use asterix_core::pipeline::BoxFuture;
use asterix_core::types::ReceiverMode;

use crate::error::ReceiverError;

/// 페이로드 수신 콜백
///
/// 소스의 수신 루프에서 동기적으로 호출되므로 오래 블록하면 안 됩니다.
pub type PayloadCallback = Arc<dyn Fn(Bytes) + Send + Sync>;

/// 소스 정지 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 캡처 파일 끝 도달
    EndOfFile,
    /// 명시적 정지 요청
    Manual,
}

/// 소스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// 설정됨, 아직 시작하지 않음
    Configured,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped(StopReason),
}

impl SourceState {
    /// 상태 이름을 반환합니다.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Stopped(StopReason::EndOfFile) => "stopped_eof",
            Self::Stopped(StopReason::Manual) => "stopped",
        }
    }
}

/// 수집 소스 공통 인터페이스
///
/// `Box<dyn IngestSource>`로 관리되도록 `BoxFuture`를 반환합니다.
pub trait IngestSource: Send + Sync {
    /// 소스의 수신 모드
    fn mode(&self) -> ReceiverMode;

    /// 리소스를 획득하고 수신 루프를 시작합니다.
    ///
    /// 실패 시 부분적으로 획득한 리소스는 모두 해제됩니다.
    fn start(&self) -> BoxFuture<'_, Result<(), ReceiverError>>;

    /// 수신 루프를 중단하고 리소스를 해제합니다. 여러 번 호출해도 안전합니다.
    fn stop(&self) -> BoxFuture<'_, ()>;

    /// 수신 루프가 동작 중인지 확인합니다.
    fn is_running(&self) -> bool;

    /// 현재 상태를 반환합니다.
    fn state(&self) -> SourceState;

    /// 수신 통계를 반환합니다.
    fn stats(&self) -> SourceStatsSnapshot;
}

/// 소스 수신 통계
///
/// 카운터를 갱신할 때 같은 값을 `metrics` 카운터에도 반영합니다.
#[derive(Debug)]
pub struct SourceStats {
    mode: ReceiverMode,
    packets_received: AtomicU64,
    bytes_emitted: AtomicU64,
    packets_emitted: AtomicU64,
    packets_filtered: AtomicU64,
    errors: AtomicU64,
}

/// 수신 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatsSnapshot {
    /// 읽은 데이터그램/패킷 수
    pub packets_received: u64,
    /// 파이프라인으로 넘긴 페이로드 수
    pub packets_emitted: u64,
    /// 파이프라인으로 넘긴 바이트 수
    pub bytes_emitted: u64,
    /// 필터로 제외된 패킷 수
    pub packets_filtered: u64,
    /// 일시적 수신 에러 수
    pub errors: u64,
}

impl SourceStats {
    /// 새 통계를 생성합니다.
    pub fn new(mode: ReceiverMode) -> Self {
        Self {
            mode,
            packets_received: AtomicU64::new(0),
            bytes_emitted: AtomicU64::new(0),
            packets_emitted: AtomicU64::new(0),
            packets_filtered: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::RECEIVER_PACKETS_RECEIVED_TOTAL, m::LABEL_MODE => self.mode.as_label())
            .increment(1);
    }

    pub(crate) fn record_emitted(&self, bytes: usize) {
        self.packets_emitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_emitted.fetch_add(bytes as u64, Ordering::Relaxed);
        metrics::counter!(m::RECEIVER_BYTES_RECEIVED_TOTAL, m::LABEL_MODE => self.mode.as_label())
            .increment(bytes as u64);
    }

    pub(crate) fn record_filtered(&self) {
        self.packets_filtered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::RECEIVER_PACKETS_FILTERED_TOTAL).increment(1);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::RECEIVER_RECEIVE_ERRORS_TOTAL, m::LABEL_MODE => self.mode.as_label())
            .increment(1);
    }

    /// 현재 값을 스냅샷으로 반환합니다.
    pub fn snapshot(&self) -> SourceStatsSnapshot {
        SourceStatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_emitted: self.packets_emitted.load(Ordering::Relaxed),
            bytes_emitted: self.bytes_emitted.load(Ordering::Relaxed),
            packets_filtered: self.packets_filtered.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// 두 소스가 공유하는 실행 상태
///
/// running 플래그, 취소 토큰, 백그라운드 태스크 핸들, 상태 머신을 묶어서
/// 정지 경로(수동 정지와 EOF)가 멱등적으로 동작하도록 합니다.
pub(crate) struct SourceRuntime {
    running: AtomicBool,
    state: Mutex<SourceState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<SourceStats>,
}

impl SourceRuntime {
    pub(crate) fn new(mode: ReceiverMode) -> Self {
        Self {
            running: AtomicBool::new(false),
            state: Mutex::new(SourceState::Configured),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            stats: Arc::new(SourceStats::new(mode)),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn stats(&self) -> &Arc<SourceStats> {
        &self.stats
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> SourceState {
        *self.lock_state()
    }

    /// Configured 상태에서만 시작을 허용합니다.
    pub(crate) fn ensure_startable(&self) -> Result<(), ReceiverError> {
        match *self.lock_state() {
            SourceState::Configured => Ok(()),
            other => Err(ReceiverError::config(
                "source",
                format!("source cannot be started from state '{}'", other.name()),
            )),
        }
    }

    /// 리소스 획득 후, 수신 태스크를 띄우기 전에 running 상태로 전환합니다.
    pub(crate) fn mark_running(&self) {
        *self.lock_state() = SourceState::Running;
        self.set_running(true);
    }

    fn set_running(&self, running: bool) {
        let was = self.running.swap(running, Ordering::AcqRel);
        if was != running {
            metrics::gauge!(m::RECEIVER_RUNNING).set(if running { 1.0 } else { 0.0 });
        }
    }

    /// 수신 태스크 핸들을 등록합니다.
    pub(crate) fn attach_task(&self, task: JoinHandle<()>) {
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    /// 수신 루프가 스스로 종료할 때 호출합니다 (리소스 해제 이후).
    pub(crate) fn mark_finished(&self, reason: StopReason) {
        self.set_running(false);
        self.cancel.cancel();
        let mut state = self.lock_state();
        if !matches!(*state, SourceState::Stopped(_)) {
            *state = SourceState::Stopped(reason);
        }
    }

    /// 수동 정지: running 해제, 취소 신호, 제한 시간 내 태스크 종료 대기
    ///
    /// 이미 정지된 경우(EOF 포함) 아무것도 하지 않습니다.
    pub(crate) async fn shutdown(&self, timeout: Duration, label: &'static str) {
        self.set_running(false);
        self.cancel.cancel();

        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut task) = task {
            match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(())) => debug!(source = label, "receive loop joined"),
                Ok(Err(e)) => warn!(source = label, error = %e, "receive loop ended abnormally"),
                Err(_) => {
                    warn!(
                        source = label,
                        timeout_ms = timeout.as_millis() as u64,
                        "receive loop did not stop within timeout, abandoning it"
                    );
                    task.abort();
                }
            }
        }

        let mut state = self.lock_state();
        if !matches!(*state, SourceState::Stopped(_)) {
            *state = SourceState::Stopped(StopReason::Manual);
        }
    }
}
