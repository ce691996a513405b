//! 도메인 타입 -- 수신기와 협력자들이 공유하는 공통 타입
//!
//! [`IngestedRecord`]는 수집 파이프라인이 생성하여 스토리지와 브로드캐스트
//! 협력자에게 넘기는 단위입니다. 생성 이후에는 변경되지 않습니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

/// 수신기 동작 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiverMode {
    /// 네트워크 소켓(UDP) 수신
    #[serde(rename = "UDP")]
    Udp,
    /// 캡처 파일(pcap/pcapng) 재생
    #[serde(rename = "CAPTURE")]
    Capture,
}

impl ReceiverMode {
    /// 메트릭 레이블 등에 쓰이는 소문자 이름
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Capture => "capture",
        }
    }
}

impl fmt::Display for ReceiverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "UDP"),
            Self::Capture => write!(f, "CAPTURE"),
        }
    }
}

impl FromStr for ReceiverMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "capture" | "pcap" => Ok(Self::Capture),
            other => Err(ConfigError::InvalidValue {
                field: "receiver.mode".to_owned(),
                reason: format!("unknown receiver mode '{other}', expected 'udp' or 'capture'"),
            }),
        }
    }
}

/// 수집된 레코드
///
/// 수신한 페이로드 하나당 하나씩 생성됩니다.
/// `data`는 구조화된 JSON 값, `json_data`는 그 정규 직렬화 문자열입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedRecord {
    /// 레코드 고유 ID
    pub id: Uuid,
    /// 수집 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 파생 메타데이터 요약
    pub metadata: String,
    /// 구조화된 레코드 본문
    pub data: serde_json::Value,
    /// `data`의 직렬화 형태
    pub json_data: String,
}

impl IngestedRecord {
    /// 새 ID와 현재 시각으로 레코드를 생성합니다.
    pub fn new(data: serde_json::Value, json_data: String, metadata: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            metadata: metadata.into(),
            data,
            json_data,
        }
    }
}

impl fmt::Display for IngestedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.timestamp.to_rfc3339(), self.id, self.metadata)
    }
}
