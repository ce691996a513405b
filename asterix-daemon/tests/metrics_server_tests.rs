//! Integration tests for the Prometheus metrics endpoint.

use std::net::TcpStream;
use std::time::{Duration, Instant};

use asterix_core::config::MetricsConfig;
use asterix_core::metrics as m;
use asterix_daemon::metrics_server;
use serial_test::serial;

fn metrics_config(listen_addr: &str, port: u16) -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        listen_addr: listen_addr.to_string(),
        port,
        endpoint: "/metrics".to_string(),
    }
}

#[test]
fn listen_addr_accepts_ipv4_and_ipv6_literals() {
    let v4 = metrics_server::listen_addr(&metrics_config("127.0.0.1", 9100)).unwrap();
    assert_eq!(v4.to_string(), "127.0.0.1:9100");

    let v6 = metrics_server::listen_addr(&metrics_config("::1", 9100)).unwrap();
    assert_eq!(v6.to_string(), "[::1]:9100");

    let bracketed = metrics_server::listen_addr(&metrics_config("[::1]", 9100)).unwrap();
    assert_eq!(bracketed, v6);
}

#[test]
fn listen_addr_rejects_bad_address_and_endpoint() {
    let err = metrics_server::listen_addr(&metrics_config("999.999.999.999", 9100)).unwrap_err();
    assert!(err.to_string().contains("999.999.999.999"));

    let mut custom = metrics_config("127.0.0.1", 9100);
    custom.endpoint = "/custom".to_string();
    let err = metrics_server::listen_addr(&custom).unwrap_err();
    assert!(err.to_string().contains("/custom"));
}

#[test]
fn processing_duration_is_exported_as_buckets() {
    // Given: a local recorder built with the daemon's bucket override
    let recorder = metrics_server::exporter_builder().unwrap().build_recorder();
    let handle = recorder.handle();

    // When: the pipeline records a processing duration
    metrics::with_local_recorder(&recorder, || {
        metrics::histogram!(
            m::PIPELINE_PROCESSING_DURATION_SECONDS,
            m::LABEL_FORMAT => "json"
        )
        .record(0.002);
    });

    // Then: rendered as a histogram, not a summary
    let rendered = handle.render();
    let bucket_line = format!("{}_bucket", m::PIPELINE_PROCESSING_DURATION_SECONDS);
    assert!(rendered.contains(&bucket_line), "{rendered}");
    assert!(rendered.contains("le=\"+Inf\""), "{rendered}");
    assert!(!rendered.contains("quantile="), "{rendered}");
}

#[test]
fn build_info_carries_package_version() {
    let recorder = metrics_server::exporter_builder().unwrap().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, metrics_server::register_daemon_metrics);

    let rendered = handle.render();
    let expected = format!(
        "{}{{version=\"{}\"}} 1",
        m::DAEMON_BUILD_INFO,
        env!("CARGO_PKG_VERSION")
    );
    assert!(rendered.contains(&expected), "{rendered}");
}

#[test]
#[serial]
fn installed_recorder_serves_http() {
    let port = 19180;
    metrics_server::install_metrics_recorder(&metrics_config("127.0.0.1", port)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            break;
        }
        assert!(Instant::now() < deadline, "metrics listener never came up");
        std::thread::sleep(Duration::from_millis(50));
    }
}
