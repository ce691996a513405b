//! Prometheus metrics HTTP endpoint.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`.
//! After installation every `metrics::counter!()` / `gauge!()` / `histogram!()`
//! call in the receiver crates is exported.

use std::net::{IpAddr, SocketAddr};

use anyhow::Result;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use asterix_core::config::MetricsConfig;
use asterix_core::metrics as m;

/// Install the global metrics recorder and start the HTTP listener.
///
/// Call once per process.
///
/// # Errors
///
/// - The endpoint path is not `/metrics`
/// - The listen address does not parse
/// - Socket binding fails or a global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_addr(config)?;

    exporter_builder()?
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    register_daemon_metrics();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}

/// Resolve the listener address. IPv6 literals are accepted without brackets.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        ));
    }

    let ip: IpAddr = config
        .listen_addr
        .trim_matches(|c| c == '[' || c == ']')
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "invalid metrics listen address '{}': {}",
                config.listen_addr,
                e
            )
        })?;
    let addr = SocketAddr::new(ip, config.port);

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    Ok(addr)
}

/// Exporter builder with the payload processing histogram bucketed.
///
/// Without explicit buckets the exporter renders histograms as summaries.
pub fn exporter_builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(m::PIPELINE_PROCESSING_DURATION_SECONDS.to_owned()),
            &m::PROCESSING_DURATION_BUCKETS,
        )
        .map_err(|e| anyhow::anyhow!("invalid histogram buckets: {}", e))
}

/// Register metric descriptions and the build info gauge on the current recorder.
pub fn register_daemon_metrics() {
    m::describe_all();
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}
