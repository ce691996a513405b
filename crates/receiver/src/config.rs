//! 수신기 설정
//!
//! [`ReceiverConfig`]는 시작 요청 하나에 대응하는 불변 설정입니다.
//! UDP 모드([`UdpReceiverConfig`])와 캡처 파일 모드([`CaptureReceiverConfig`]) 중
//! 하나를 담는 태그드 유니온이며, 소스에 넘겨진 뒤에는 변경되지 않습니다.
//!
//! [`SourceOptions`]는 모드와 무관한 튜닝 값(정지 대기 시간, 버퍼 크기 등)으로
//! core의 [`ReceiverSettings`]에서 파생됩니다.
//!
//! # 사용 예시
//! ```ignore
//! use asterix_core::config::AsterixConfig;
//! use asterix_receiver::config::{SourceOptions, UdpReceiverConfig};
//!
//! let core = AsterixConfig::default();
//! let options = SourceOptions::from_core(&core.receiver);
//! let udp = UdpReceiverConfig::from_core(&core.receiver.udp);
//! udp.validate()?;
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use asterix_core::config::{CaptureSettings, ReceiverSettings, UdpSettings};
use asterix_core::types::ReceiverMode;

use crate::error::ReceiverError;

/// 캡처 파일로 허용되는 확장자 (대소문자 무시)
pub const SUPPORTED_CAPTURE_EXTENSIONS: &[&str] = &["pcap", "pcapng", "cap"];

/// 시작 요청 설정 (UDP 또는 캡처 파일)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "UPPERCASE")]
pub enum ReceiverConfig {
    /// UDP 소켓 수신
    Udp(UdpReceiverConfig),
    /// 캡처 파일 재생
    Capture(CaptureReceiverConfig),
}

impl ReceiverConfig {
    /// 설정이 나타내는 수신 모드를 반환합니다.
    pub fn mode(&self) -> ReceiverMode {
        match self {
            Self::Udp(_) => ReceiverMode::Udp,
            Self::Capture(_) => ReceiverMode::Capture,
        }
    }

    /// 모드별 설정 검증을 수행합니다.
    pub fn validate(&self) -> Result<(), ReceiverError> {
        match self {
            Self::Udp(cfg) => cfg.validate(),
            Self::Capture(cfg) => cfg.validate(),
        }
    }

    /// core 설정에서 지정한 모드의 시작 설정을 생성합니다.
    pub fn from_core(settings: &ReceiverSettings, mode: ReceiverMode) -> Self {
        match mode {
            ReceiverMode::Udp => Self::Udp(UdpReceiverConfig::from_core(&settings.udp)),
            ReceiverMode::Capture => {
                Self::Capture(CaptureReceiverConfig::from_core(&settings.capture))
            }
        }
    }
}

/// UDP 수신 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpReceiverConfig {
    /// 수신 포트 (1-65535)
    pub port: u16,
    /// 바인드 주소 (IPv4 또는 IPv6 리터럴)
    pub bind_address: String,
    /// 멀티캐스트 그룹 가입 여부
    #[serde(default)]
    pub join_multicast: bool,
    /// 멀티캐스트 그룹 주소
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicast_address: Option<String>,
}

impl UdpReceiverConfig {
    /// 모든 인터페이스(0.0.0.0)에 바인드하는 설정을 생성합니다.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            bind_address: "0.0.0.0".to_owned(),
            join_multicast: false,
            multicast_address: None,
        }
    }

    /// 바인드 주소를 지정합니다.
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = addr.into();
        self
    }

    /// 멀티캐스트 그룹 가입을 설정합니다.
    pub fn with_multicast(mut self, group: impl Into<String>) -> Self {
        self.join_multicast = true;
        self.multicast_address = Some(group.into());
        self
    }

    /// core의 `UdpSettings`에서 설정을 생성합니다.
    ///
    /// 빈 멀티캐스트 주소는 `None`으로 취급합니다.
    pub fn from_core(core: &UdpSettings) -> Self {
        let group = core.multicast_address.trim();
        Self {
            port: core.port,
            bind_address: core.bind_address.clone(),
            join_multicast: core.join_multicast,
            multicast_address: (!group.is_empty()).then(|| group.to_owned()),
        }
    }

    /// 설정 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    /// - 포트는 1-65535
    /// - 바인드 주소는 필수이며 IP 리터럴이어야 함
    /// - 멀티캐스트 가입 시 그룹 주소 필수, 224.0.0.0/4 또는 ff00::/8 범위
    /// - 그룹 주소와 바인드 주소의 주소 체계가 같아야 함
    pub fn validate(&self) -> Result<(), ReceiverError> {
        self.socket_addr()?;
        self.multicast_group()?;
        Ok(())
    }

    /// 바인드할 소켓 주소를 반환합니다.
    pub fn socket_addr(&self) -> Result<SocketAddr, ReceiverError> {
        if self.port == 0 {
            return Err(ReceiverError::config("udp.port", "must be 1-65535"));
        }

        let addr = self.bind_address.trim();
        if addr.is_empty() {
            return Err(ReceiverError::config(
                "udp.bind_address",
                "bind address is required",
            ));
        }

        let ip: IpAddr = addr.parse().map_err(|_| {
            ReceiverError::config(
                "udp.bind_address",
                format!("'{addr}' is not a valid IP address"),
            )
        })?;

        Ok(SocketAddr::new(ip, self.port))
    }

    /// 가입할 멀티캐스트 그룹을 반환합니다. 가입하지 않으면 `None`.
    pub fn multicast_group(&self) -> Result<Option<IpAddr>, ReceiverError> {
        if !self.join_multicast {
            return Ok(None);
        }

        let raw = self
            .multicast_address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ReceiverError::config(
                    "udp.multicast_address",
                    "multicast address is required when join_multicast is enabled",
                )
            })?;

        let group: IpAddr = raw.parse().map_err(|_| {
            ReceiverError::config(
                "udp.multicast_address",
                format!("'{raw}' is not a valid IP address"),
            )
        })?;

        if !group.is_multicast() {
            return Err(ReceiverError::config(
                "udp.multicast_address",
                format!("'{raw}' is not a multicast address (224.0.0.0-239.255.255.255 or ff00::/8)"),
            ));
        }

        let bind = self.socket_addr()?;
        if bind.is_ipv4() != group.is_ipv4() {
            return Err(ReceiverError::config(
                "udp.multicast_address",
                "multicast group and bind address must use the same address family",
            ));
        }

        Ok(Some(group))
    }
}

/// 캡처 파일 재생 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReceiverConfig {
    /// 캡처 파일 경로
    pub file_path: PathBuf,
    /// 캡처 필터 또는 필터 표현식
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,
}

impl CaptureReceiverConfig {
    /// 필터 없는 캡처 설정을 생성합니다.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            filter_expression: None,
        }
    }

    /// 필터 문자열을 지정합니다. 공백뿐인 문자열은 필터 없음으로 취급합니다.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.filter_expression = (!filter.trim().is_empty()).then_some(filter);
        self
    }

    /// core의 `CaptureSettings`에서 설정을 생성합니다.
    pub fn from_core(core: &CaptureSettings) -> Self {
        Self::new(core.file_path.trim()).with_filter(core.filter.clone())
    }

    /// 정리된 필터 문자열을 반환합니다.
    pub fn filter(&self) -> Option<&str> {
        self.filter_expression
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// 설정 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    /// - 경로가 비어 있지 않아야 함
    /// - 확장자가 `.pcap`, `.pcapng`, `.cap` 중 하나여야 함
    /// - 파일이 실제로 존재해야 함
    pub fn validate(&self) -> Result<(), ReceiverError> {
        if self.file_path.as_os_str().is_empty() {
            return Err(ReceiverError::config(
                "capture.file_path",
                "file path is required",
            ));
        }

        if !has_supported_extension(&self.file_path) {
            return Err(ReceiverError::config(
                "capture.file_path",
                format!(
                    "unsupported extension for {}, expected one of: {}",
                    self.file_path.display(),
                    SUPPORTED_CAPTURE_EXTENSIONS.join(", ")
                ),
            ));
        }

        if !self.file_path.is_file() {
            return Err(ReceiverError::config(
                "capture.file_path",
                format!("file not found: {}", self.file_path.display()),
            ));
        }

        Ok(())
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_CAPTURE_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// 모드와 무관한 소스 튜닝 옵션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// 소스 정지 대기 제한 시간
    pub stop_timeout: Duration,
    /// 소켓 수신 버퍼 크기 (SO_RCVBUF)
    pub recv_buffer_size: usize,
    /// 최대 데이터그램 크기
    pub max_datagram_size: usize,
    /// 수신 에러 후 재시도 대기 시간
    pub error_backoff: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self::from_core(&ReceiverSettings::default())
    }
}

impl SourceOptions {
    /// core의 `ReceiverSettings`에서 튜닝 옵션을 생성합니다.
    pub fn from_core(core: &ReceiverSettings) -> Self {
        Self {
            stop_timeout: Duration::from_secs(core.stop_timeout_secs),
            recv_buffer_size: core.recv_buffer_size,
            max_datagram_size: core.max_datagram_size.max(1),
            error_backoff: Duration::from_millis(core.error_backoff_ms),
        }
    }
}
