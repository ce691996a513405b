//! 에러 타입 -- 도메인별 에러 정의

/// Asterix 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum AsterixError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 수신기 생명주기 에러
    #[error("receiver error: {0}")]
    Receiver(#[from] ReceiverFailure),

    /// 레코드 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 수신기 생명주기 에러
///
/// 호출자(API 레이어)에게 노출되는 것은 설정 오류와 리소스 획득 실패뿐입니다.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverFailure {
    /// 리소스를 건드리기 전에 거부된 설정
    #[error("invalid receiver config: {0}")]
    InvalidConfig(String),

    /// 소켓 바인드, 멀티캐스트 가입, 파일 열기 실패
    #[error("receiver start failed: {0}")]
    StartFailed(String),
}

/// 레코드 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 레코드 직렬화 실패
    #[error("record encode failed: {0}")]
    Encode(String),

    /// 스토리지 추가 실패
    #[error("record store failed: {0}")]
    Store(String),
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 저장소를 사용할 수 없음 (lock poisoning 등)
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
