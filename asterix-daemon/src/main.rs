use anyhow::Result;
use clap::Parser;

use asterix_core::AsterixConfig;
use asterix_daemon::cli::DaemonCli;
use asterix_daemon::logging;
use asterix_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file -> env -> CLI, then validate
    let mut config = AsterixConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    // The real subscriber depends on the final config, so override
    // warnings go through a stderr bootstrap subscriber.
    tracing::subscriber::with_default(logging::bootstrap_subscriber(std::io::stderr), || {
        config.apply_env_overrides();
    });
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        config = %cli.config.display(),
        version = env!("CARGO_PKG_VERSION"),
        "asterix-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await
}
