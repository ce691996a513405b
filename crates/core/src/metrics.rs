//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `asterix_`
//! - 모듈명: `receiver_`, `pipeline_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(asterix_core::metrics::RECEIVER_PACKETS_RECEIVED_TOTAL, "mode" => "udp").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 수신 모드 레이블 키 (udp, capture)
pub const LABEL_MODE: &str = "mode";

/// 페이로드 형식 레이블 키 (json, binary)
pub const LABEL_FORMAT: &str = "format";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Receiver 메트릭 ────────────────────────────────────────────────

/// Receiver: 수신된 패킷/데이터그램 수 (counter, label: mode)
pub const RECEIVER_PACKETS_RECEIVED_TOTAL: &str = "asterix_receiver_packets_received_total";

/// Receiver: 수신된 페이로드 바이트 수 (counter, label: mode)
pub const RECEIVER_BYTES_RECEIVED_TOTAL: &str = "asterix_receiver_bytes_received_total";

/// Receiver: 필터에 의해 제외된 패킷 수 (counter)
pub const RECEIVER_PACKETS_FILTERED_TOTAL: &str = "asterix_receiver_packets_filtered_total";

/// Receiver: 수신 중 발생한 에러 수 (counter, label: mode)
pub const RECEIVER_RECEIVE_ERRORS_TOTAL: &str = "asterix_receiver_receive_errors_total";

/// Receiver: 시작 요청 수 (counter, labels: mode, result)
pub const RECEIVER_STARTS_TOTAL: &str = "asterix_receiver_starts_total";

/// Receiver: 현재 동작 중 여부 (gauge, 0 또는 1)
pub const RECEIVER_RUNNING: &str = "asterix_receiver_running";

// ─── Pipeline 메트릭 ────────────────────────────────────────────────

/// Pipeline: 저장된 레코드 수 (counter, label: format)
pub const PIPELINE_RECORDS_INGESTED_TOTAL: &str = "asterix_pipeline_records_ingested_total";

/// Pipeline: 처리 실패 수 (counter)
pub const PIPELINE_FAILURES_TOTAL: &str = "asterix_pipeline_failures_total";

/// Pipeline: 페이로드 하나의 처리 지연 시간 (histogram, 초)
pub const PIPELINE_PROCESSING_DURATION_SECONDS: &str =
    "asterix_pipeline_processing_duration_seconds";

/// Pipeline: 저장소 내 레코드 수 (gauge)
pub const PIPELINE_STORED_RECORDS: &str = "asterix_pipeline_stored_records";

/// Pipeline: 브로드캐스트를 수신한 구독자 수 누계 (counter)
pub const PIPELINE_BROADCAST_DELIVERIES_TOTAL: &str =
    "asterix_pipeline_broadcast_deliveries_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "asterix_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "asterix_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 페이로드 처리 지연 시간 히스토그램 버킷 (초)
///
/// 10us ~ 100ms 범위 (JSON 디코딩 + 저장 + 브로드캐스트)
pub const PROCESSING_DURATION_BUCKETS: [f64; 9] = [
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `asterix-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Receiver
    describe_counter!(
        RECEIVER_PACKETS_RECEIVED_TOTAL,
        "Total number of datagrams or capture packets accepted by the active source"
    );
    describe_counter!(
        RECEIVER_BYTES_RECEIVED_TOTAL,
        "Total payload bytes handed to the ingestion pipeline"
    );
    describe_counter!(
        RECEIVER_PACKETS_FILTERED_TOTAL,
        "Total number of capture packets rejected by the packet filter"
    );
    describe_counter!(
        RECEIVER_RECEIVE_ERRORS_TOTAL,
        "Total number of transient receive errors"
    );
    describe_counter!(
        RECEIVER_STARTS_TOTAL,
        "Total number of receiver start requests by mode and result"
    );
    describe_gauge!(
        RECEIVER_RUNNING,
        "Whether an ingestion source is currently running (0 or 1)"
    );

    // Pipeline
    describe_counter!(
        PIPELINE_RECORDS_INGESTED_TOTAL,
        "Total number of records stored and broadcast by payload format"
    );
    describe_counter!(
        PIPELINE_FAILURES_TOTAL,
        "Total number of payloads dropped due to pipeline failures"
    );
    describe_histogram!(
        PIPELINE_PROCESSING_DURATION_SECONDS,
        "Time to process a single payload in seconds"
    );
    describe_gauge!(
        PIPELINE_STORED_RECORDS,
        "Current number of records held by the record store"
    );
    describe_counter!(
        PIPELINE_BROADCAST_DELIVERIES_TOTAL,
        "Total number of record deliveries to broadcast subscribers"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Asterix daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
