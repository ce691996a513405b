//! Logging initialization for asterix-daemon.
//!
//! The configured level applies to the asterix crates; dependencies
//! (tokio, metrics exporter, hyper) stay at `warn` unless the level is a
//! full directive string or `RUST_LOG` is set.
//!
//! Before the config is fully loaded a bootstrap subscriber prints
//! warnings (e.g. unparsable `ASTERIX_*` env values) to stderr.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use asterix_core::config::GeneralConfig;

/// Crates whose events follow `general.log_level`.
const CRATE_TARGETS: [&str; 3] = ["asterix_core", "asterix_receiver", "asterix_daemon"];

/// Level for every other target.
const DEPENDENCY_LEVEL: &str = "warn";

/// Build the `EnvFilter` directive string for a configured level.
///
/// A plain level (`"debug"`) is scoped to the asterix crates. A value that
/// already contains directives (`"asterix_receiver=trace,info"`) is used as is.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_owned();
    }

    std::iter::once(DEPENDENCY_LEVEL.to_owned())
        .chain(CRATE_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Subscriber used while the configuration is still being assembled.
///
/// Only warnings and errors are printed, without ANSI colors.
pub fn bootstrap_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_target(false)
        .finish()
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once. `RUST_LOG` takes precedence over
/// `config.log_level`.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(&config.log_level)).map_err(|e| {
            anyhow::anyhow!("invalid log level '{}': {}", config.log_level, e)
        })?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e))?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| {
                anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)
            })?,
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use asterix_core::AsterixConfig;
    use serial_test::serial;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn plain_level_is_scoped_to_asterix_crates() {
        assert_eq!(
            filter_directives("debug"),
            "warn,asterix_core=debug,asterix_receiver=debug,asterix_daemon=debug"
        );
        assert!(EnvFilter::try_new(filter_directives(" info ")).is_ok());
    }

    #[test]
    fn directive_strings_pass_through() {
        assert_eq!(
            filter_directives("asterix_receiver=trace,info"),
            "asterix_receiver=trace,info"
        );
        assert_eq!(filter_directives("tokio=debug"), "tokio=debug");
    }

    #[test]
    fn bootstrap_subscriber_drops_info() {
        let captured = Captured::default();
        let writer = captured.clone();
        tracing::subscriber::with_default(bootstrap_subscriber(move || writer.clone()), || {
            tracing::info!("loading configuration");
            tracing::warn!("ignored bad value");
        });

        let text = captured.text();
        assert!(text.contains("ignored bad value"));
        assert!(!text.contains("loading configuration"));
    }

    #[test]
    #[serial]
    fn env_override_warnings_reach_bootstrap_subscriber() {
        let key = "ASTERIX_RECEIVER_UDP_PORT";
        let original = std::env::var(key).ok();
        // SAFETY: #[serial] keeps env mutation single-threaded.
        unsafe {
            std::env::set_var(key, "not-a-port");
        }

        let captured = Captured::default();
        let writer = captured.clone();
        let mut config = AsterixConfig::default();
        let default_port = config.receiver.udp.port;
        tracing::subscriber::with_default(bootstrap_subscriber(move || writer.clone()), || {
            config.apply_env_overrides();
        });

        // SAFETY: same as above, restoring the original value.
        unsafe {
            match original {
                Some(val) => std::env::set_var(key, val),
                None => std::env::remove_var(key),
            }
        }

        assert_eq!(config.receiver.udp.port, default_port);
        let text = captured.text();
        assert!(text.contains("failed to parse u16 from env var"), "{text}");
        assert!(text.contains(key), "{text}");
    }
}
