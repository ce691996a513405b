//! 설정 관리 -- asterix.toml 파싱 및 런타임 설정
//!
//! [`AsterixConfig`]는 데몬과 수신기 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`ASTERIX_RECEIVER_UDP_PORT=5000` 형식)
//! 3. 설정 파일 (`asterix.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), asterix_core::error::AsterixError> {
//! use asterix_core::config::AsterixConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = AsterixConfig::load("asterix.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = AsterixConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AsterixError, ConfigError};

/// Asterix 통합 설정
///
/// `asterix.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsterixConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수신기 설정
    #[serde(default)]
    pub receiver: ReceiverSettings,
    /// 레코드 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 브로드캐스트 설정
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AsterixConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AsterixError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AsterixError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AsterixError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                AsterixError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, AsterixError> {
        toml::from_str(toml_str).map_err(|e| {
            AsterixError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `ASTERIX_{SECTION}_{FIELD}`
    /// 예: `ASTERIX_RECEIVER_UDP_PORT=5000`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "ASTERIX_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "ASTERIX_GENERAL_LOG_FORMAT");

        // Receiver
        override_string(&mut self.receiver.autostart, "ASTERIX_RECEIVER_AUTOSTART");
        override_u64(
            &mut self.receiver.stop_timeout_secs,
            "ASTERIX_RECEIVER_STOP_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.receiver.recv_buffer_size,
            "ASTERIX_RECEIVER_RECV_BUFFER_SIZE",
        );
        override_usize(
            &mut self.receiver.max_datagram_size,
            "ASTERIX_RECEIVER_MAX_DATAGRAM_SIZE",
        );
        override_u64(
            &mut self.receiver.error_backoff_ms,
            "ASTERIX_RECEIVER_ERROR_BACKOFF_MS",
        );
        override_u16(&mut self.receiver.udp.port, "ASTERIX_RECEIVER_UDP_PORT");
        override_string(
            &mut self.receiver.udp.bind_address,
            "ASTERIX_RECEIVER_UDP_BIND_ADDRESS",
        );
        override_bool(
            &mut self.receiver.udp.join_multicast,
            "ASTERIX_RECEIVER_UDP_JOIN_MULTICAST",
        );
        override_string(
            &mut self.receiver.udp.multicast_address,
            "ASTERIX_RECEIVER_UDP_MULTICAST_ADDRESS",
        );
        override_string(
            &mut self.receiver.capture.file_path,
            "ASTERIX_RECEIVER_CAPTURE_FILE_PATH",
        );
        override_string(
            &mut self.receiver.capture.filter,
            "ASTERIX_RECEIVER_CAPTURE_FILTER",
        );

        // Storage / Broadcast
        override_usize(&mut self.storage.max_records, "ASTERIX_STORAGE_MAX_RECORDS");
        override_usize(
            &mut self.broadcast.channel_capacity,
            "ASTERIX_BROADCAST_CHANNEL_CAPACITY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "ASTERIX_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "ASTERIX_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "ASTERIX_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AsterixError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        let valid_autostart = ["none", "udp", "capture"];
        if !valid_autostart.contains(&self.receiver.autostart.as_str()) {
            return Err(invalid(
                "receiver.autostart",
                format!("must be one of: {}", valid_autostart.join(", ")),
            ));
        }

        const MAX_STOP_TIMEOUT_SECS: u64 = 60;
        if self.receiver.stop_timeout_secs == 0
            || self.receiver.stop_timeout_secs > MAX_STOP_TIMEOUT_SECS
        {
            return Err(invalid(
                "receiver.stop_timeout_secs",
                format!("must be 1-{MAX_STOP_TIMEOUT_SECS}"),
            ));
        }

        if self.receiver.max_datagram_size == 0 || self.receiver.max_datagram_size > 65_535 {
            return Err(invalid("receiver.max_datagram_size", "must be 1-65535"));
        }

        // autostart 대상 섹션만 검증 (나머지는 API 요청 시 검증)
        match self.receiver.autostart.as_str() {
            "udp" if self.receiver.udp.port == 0 => {
                return Err(invalid("receiver.udp.port", "must be 1-65535"));
            }
            "capture" if self.receiver.capture.file_path.trim().is_empty() => {
                return Err(invalid(
                    "receiver.capture.file_path",
                    "file path is required when autostart = \"capture\"",
                ));
            }
            _ => {}
        }

        if self.broadcast.channel_capacity == 0 {
            return Err(invalid("broadcast.channel_capacity", "must be greater than 0"));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be 1-65535"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> AsterixError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 수신기 공통 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverSettings {
    /// 데몬 기동 시 자동 시작할 모드 (none, udp, capture)
    pub autostart: String,
    /// 소스 정지 대기 제한 시간 (초)
    pub stop_timeout_secs: u64,
    /// 소켓 수신 버퍼 크기 (SO_RCVBUF, 바이트)
    pub recv_buffer_size: usize,
    /// 최대 데이터그램 크기 (바이트)
    pub max_datagram_size: usize,
    /// 수신 중 소켓 에러 발생 시 재시도 대기 (밀리초)
    pub error_backoff_ms: u64,
    /// UDP 모드 설정
    #[serde(default)]
    pub udp: UdpSettings,
    /// 캡처 파일 모드 설정
    #[serde(default)]
    pub capture: CaptureSettings,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            autostart: "none".to_owned(),
            stop_timeout_secs: 5,
            recv_buffer_size: 256 * 1024, // 256KB
            max_datagram_size: 65_507,
            error_backoff_ms: 100,
            udp: UdpSettings::default(),
            capture: CaptureSettings::default(),
        }
    }
}

/// UDP 수신 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpSettings {
    /// 수신 포트
    pub port: u16,
    /// 바인드 주소
    pub bind_address: String,
    /// 멀티캐스트 그룹 가입 여부
    pub join_multicast: bool,
    /// 멀티캐스트 그룹 주소
    pub multicast_address: String,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_address: "0.0.0.0".to_owned(),
            join_multicast: false,
            multicast_address: String::new(),
        }
    }
}

/// 캡처 파일 재생 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// 캡처 파일 경로 (.pcap, .pcapng)
    pub file_path: String,
    /// 캡처 필터 또는 필터 표현식 (빈 문자열이면 필터 없음)
    pub filter: String,
}

/// 레코드 저장소 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 최대 보관 레코드 수 (0 = 무제한, 초과 시 가장 오래된 레코드 제거)
    pub max_records: usize,
}

/// 브로드캐스트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// 구독자별 채널 용량 (초과 시 느린 구독자는 레코드를 놓침)
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
