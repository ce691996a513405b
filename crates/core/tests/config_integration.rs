//! asterix.toml 통합 설정 테스트
//!
//! - asterix.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 파일 로딩 / 잘못된 형식 에러 테스트

use std::io::Write;

use asterix_core::config::AsterixConfig;
use asterix_core::error::{AsterixError, ConfigError};

const EXAMPLE: &str = include_str!("../../../asterix.toml.example");

// =============================================================================
// asterix.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let config = AsterixConfig::parse(EXAMPLE).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.receiver.autostart, "none");
    assert_eq!(config.receiver.udp.port, 5000);
}

#[test]
fn example_config_matches_code_defaults() {
    let from_file = AsterixConfig::parse(EXAMPLE).expect("should parse");
    let from_code = AsterixConfig::default();

    assert_eq!(from_file.general.log_level, from_code.general.log_level);
    assert_eq!(from_file.general.log_format, from_code.general.log_format);

    assert_eq!(from_file.receiver.autostart, from_code.receiver.autostart);
    assert_eq!(
        from_file.receiver.stop_timeout_secs,
        from_code.receiver.stop_timeout_secs
    );
    assert_eq!(
        from_file.receiver.recv_buffer_size,
        from_code.receiver.recv_buffer_size
    );
    assert_eq!(
        from_file.receiver.max_datagram_size,
        from_code.receiver.max_datagram_size
    );
    assert_eq!(
        from_file.receiver.error_backoff_ms,
        from_code.receiver.error_backoff_ms
    );
    assert_eq!(from_file.receiver.udp.port, from_code.receiver.udp.port);
    assert_eq!(
        from_file.receiver.udp.bind_address,
        from_code.receiver.udp.bind_address
    );
    assert_eq!(
        from_file.receiver.udp.join_multicast,
        from_code.receiver.udp.join_multicast
    );
    assert_eq!(
        from_file.receiver.capture.file_path,
        from_code.receiver.capture.file_path
    );
    assert_eq!(
        from_file.receiver.capture.filter,
        from_code.receiver.capture.filter
    );

    assert_eq!(from_file.storage.max_records, from_code.storage.max_records);
    assert_eq!(
        from_file.broadcast.channel_capacity,
        from_code.broadcast.channel_capacity
    );

    assert_eq!(from_file.metrics.enabled, from_code.metrics.enabled);
    assert_eq!(from_file.metrics.listen_addr, from_code.metrics.listen_addr);
    assert_eq!(from_file.metrics.port, from_code.metrics.port);
    assert_eq!(from_file.metrics.endpoint, from_code.metrics.endpoint);
}

// =============================================================================
// 부분 설정 로딩 테스트
// =============================================================================

#[test]
fn partial_config_capture_section_only() {
    let toml = r#"
[receiver]
autostart = "capture"

[receiver.capture]
file_path = "/data/radar.pcap"
filter = "udp port 8600"
"#;
    let config = AsterixConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.receiver.capture.file_path, "/data/radar.pcap");
    assert_eq!(config.receiver.capture.filter, "udp port 8600");
    // UDP 섹션은 기본값
    assert_eq!(config.receiver.udp.port, 5000);
}

#[test]
fn partial_config_storage_and_broadcast() {
    let toml = r#"
[storage]
max_records = 10000

[broadcast]
channel_capacity = 64
"#;
    let config = AsterixConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.storage.max_records, 10000);
    assert_eq!(config.broadcast.channel_capacity, 64);
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn zero_channel_capacity_fails_validation() {
    let toml = r#"
[broadcast]
channel_capacity = 0
"#;
    let config = AsterixConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        AsterixError::Config(ConfigError::InvalidValue { ref field, .. })
            if field == "broadcast.channel_capacity"
    ));
}

#[test]
fn wrong_value_type_fails_parse() {
    let toml = r#"
[receiver.udp]
port = "five thousand"
"#;
    let err = AsterixConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        AsterixError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[receiver.udp]
bind_address = "127.0.0.1"
"#;

    let original = std::env::var("ASTERIX_RECEIVER_UDP_BIND_ADDRESS").ok();
    // SAFETY: serial 테스트로 환경변수 조작이 직렬화됩니다.
    unsafe {
        std::env::set_var("ASTERIX_RECEIVER_UDP_BIND_ADDRESS", "10.0.0.5");
    }

    let mut config = AsterixConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.receiver.udp.bind_address.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("ASTERIX_RECEIVER_UDP_BIND_ADDRESS", val),
            None => std::env::remove_var("ASTERIX_RECEIVER_UDP_BIND_ADDRESS"),
        }
    }

    assert_eq!(result, "10.0.0.5");
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let original = std::env::var("ASTERIX_RECEIVER_UDP_JOIN_MULTICAST").ok();
    // SAFETY: serial 테스트로 환경변수 조작이 직렬화됩니다.
    unsafe {
        std::env::set_var("ASTERIX_RECEIVER_UDP_JOIN_MULTICAST", "true");
    }

    let mut config = AsterixConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.receiver.udp.join_multicast;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("ASTERIX_RECEIVER_UDP_JOIN_MULTICAST", val),
            None => std::env::remove_var("ASTERIX_RECEIVER_UDP_JOIN_MULTICAST"),
        }
    }

    assert!(result);
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let original = std::env::var("ASTERIX_STORAGE_MAX_RECORDS").ok();
    // SAFETY: serial 테스트로 환경변수 조작이 직렬화됩니다.
    unsafe {
        std::env::set_var("ASTERIX_STORAGE_MAX_RECORDS", "250");
    }

    let mut config = AsterixConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.storage.max_records;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("ASTERIX_STORAGE_MAX_RECORDS", val),
            None => std::env::remove_var("ASTERIX_STORAGE_MAX_RECORDS"),
        }
    }

    assert_eq!(result, 250);
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
#[serial_test::serial]
async fn load_reads_file_and_validates() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "[general]\nlog_level = \"debug\"\n\n[receiver.udp]\nport = 7100"
    )
    .expect("write");

    let config = AsterixConfig::load(file.path()).await.expect("should load");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.receiver.udp.port, 7100);
}

#[tokio::test]
#[serial_test::serial]
async fn load_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[general]\nlog_level = \"loud\"").expect("write");

    let err = AsterixConfig::load(file.path()).await.unwrap_err();
    assert!(err.to_string().contains("log_level"));
}
