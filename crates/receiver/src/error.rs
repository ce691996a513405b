//! 수신기 에러 타입
//!
//! [`ReceiverError`]는 수신기 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<ReceiverError> for AsterixError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! # 분류
//! - 설정 오류 ([`ReceiverError::Config`]): 리소스를 건드리기 전에 거부
//! - 리소스 획득 실패 ([`ReceiverError::Bind`], [`ReceiverError::Multicast`],
//!   [`ReceiverError::CaptureOpen`]): 시작 시도 전체가 원자적으로 실패
//! - 그 외: 수집 루프 내부에서 로그로만 관측되며 호출자에게 전파되지 않음

use asterix_core::error::{AsterixError, PipelineError, ReceiverFailure};

/// 수신기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// 유효하지 않은 수신기 설정
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 소켓 바인드 실패
    #[error("bind failed on {addr}: {reason}")]
    Bind {
        /// 바인드 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 멀티캐스트 그룹 가입 실패
    #[error("multicast join failed for group {group}: {reason}")]
    Multicast {
        /// 멀티캐스트 그룹 주소
        group: String,
        /// 실패 사유
        reason: String,
    },

    /// 캡처 파일 열기 실패
    #[error("failed to open capture file {path}: {reason}")]
    CaptureOpen {
        /// 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 캡처 파일 읽기/파싱 에러
    #[error("capture read error: {0}")]
    Capture(String),

    /// 필터 표현식 파싱 실패
    #[error("filter error: {0}")]
    Filter(String),

    /// 레코드 처리 실패
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReceiverError {
    /// 설정 필드 에러를 생성합니다.
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    /// 리소스를 획득하기 전에 거부된 설정 오류인지 확인합니다.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// 소켓/파일 획득 실패인지 확인합니다.
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. } | Self::Multicast { .. } | Self::CaptureOpen { .. } | Self::Io(_)
        )
    }
}

impl From<ReceiverError> for AsterixError {
    fn from(err: ReceiverError) -> Self {
        match err {
            ReceiverError::Config { .. } => {
                AsterixError::Receiver(ReceiverFailure::InvalidConfig(err.to_string()))
            }
            ReceiverError::Pipeline(reason) => AsterixError::Pipeline(PipelineError::Store(reason)),
            other => AsterixError::Receiver(ReceiverFailure::StartFailed(other.to_string())),
        }
    }
}
