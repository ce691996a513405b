#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`manager`]: 단일 활성 슬롯 관리 (start/stop/status, 원자적 교체)
//! - [`source`]: UDP 소켓 소스와 캡처 파일 소스
//! - [`filter`]: 필터 표현식 파서/평가기와 필터 분류
//! - [`capture_filter`]: tcpdump 스타일 캡처 필터
//! - [`decode`]: 링크/네트워크/전송 계층 디코딩
//! - [`pipeline`]: 페이로드 정규화, 저장, 브로드캐스트
//! - [`store`]: 인메모리 레코드 저장소
//! - [`broadcast`]: 레코드 브로드캐스트 허브
//! - [`config`]: 시작 요청 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입

pub mod broadcast;
pub mod capture_filter;
pub mod config;
pub mod decode;
pub mod error;
pub mod filter;
pub mod manager;
pub mod pipeline;
pub mod source;
pub mod store;

// --- 주요 타입 re-export ---

// 관리자
pub use manager::{ReceiverManager, ReceiverStatus, StopOutcome};

// 설정
pub use config::{CaptureReceiverConfig, ReceiverConfig, SourceOptions, UdpReceiverConfig};

// 에러
pub use error::ReceiverError;

// 소스
pub use source::{
    CaptureFileSource, IngestSource, PayloadCallback, SocketSource, SourceState,
    SourceStatsSnapshot, StopReason,
};

// 필터
pub use capture_filter::CaptureFilter;
pub use filter::{FilterExpression, PacketFilter};

// 파이프라인
pub use broadcast::BroadcastHub;
pub use pipeline::IngestionPipeline;
pub use store::MemoryRecordStore;

// 디코딩
pub use decode::PacketView;
