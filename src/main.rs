use keepa_relay::config::RelayConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics go to stderr; stdout carries one line per relayed alert.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = RelayConfig::from_env()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        sender = %config.alert_sender,
        token = %config.token_path.display(),
        messaging_config = %config.messaging_config_path.display(),
        policy = ?config.on_send_failure,
        "Keepa relay starting"
    );

    let mut stdout = std::io::stdout().lock();
    keepa_relay::relay::run(&config, &mut stdout).await?;

    Ok(())
}
